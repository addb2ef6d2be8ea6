//! Domain types for the SKU fulfillment engine.
//!
//! Entities never hold pointers to each other. A secret knows its `product_id` and
//! `sku_id`, a SKU knows its `product_id`, and anything else is an explicit lookup through
//! the store. Every entity can be loaded on its own by identifier.

use crate::error::{FulfillmentError, Result};
use crate::ledger::StockCounters;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw database identifier.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Raw database identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a product.
    ProductId
);
id_type!(
    /// Identifier of a product variant.
    ///
    /// `0` is reserved for rows written before SKUs existed; see [`SkuId::LEGACY`].
    SkuId
);
id_type!(
    /// Identifier of a card secret.
    SecretId
);
id_type!(
    /// Identifier of a card secret batch.
    BatchId
);
id_type!(
    /// Identifier of an order.
    OrderId
);
id_type!(
    /// Identifier of an order line.
    OrderItemId
);
id_type!(
    /// Identifier of a customer.
    UserId
);
id_type!(
    /// Identifier of a fulfillment record.
    FulfillmentId
);

impl SkuId {
    /// Sentinel carried by rows that predate the SKU model.
    pub const LEGACY: Self = Self(0);

    /// Whether this is the unmigrated sentinel rather than a real SKU.
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        self.0 == 0
    }
}

/// Round a money amount to the two decimal places stored in the database.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

// ============================================================================
// Fulfillment mode
// ============================================================================

/// How an order line is delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMode {
    /// A counted quota is decremented; delivery happens outside this engine.
    Manual,
    /// One pre-provisioned secret is handed out per sold unit.
    Auto,
}

impl FulfillmentMode {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }

    /// Parse a stored fulfillment type. An empty value means manual.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] for unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            other => Err(FulfillmentError::InvalidState(format!(
                "unknown fulfillment type: {other}"
            ))),
        }
    }
}

impl fmt::Display for FulfillmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// A product as far as fulfillment cares about it.
///
/// The stock counters on the product are the pre-SKU snapshot; they are only read by the
/// legacy migration, which copies them onto the synthesized default SKU.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier
    pub id: ProductId,
    /// Unique slug
    pub slug: String,
    /// List price before SKUs existed
    pub price_amount: Decimal,
    /// Delivery mode shared by every SKU of the product
    pub fulfillment_mode: FulfillmentMode,
    /// Legacy stock counters
    pub legacy_stock: StockCounters,
    /// Whether the product can be bought
    pub is_active: bool,
}

/// A purchasable variant of a product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSku {
    /// SKU identifier (never `0`)
    pub id: SkuId,
    /// Owning product
    pub product_id: ProductId,
    /// Code, unique per product
    pub code: String,
    /// Unit price
    pub price_amount: Decimal,
    /// Manual stock counters (informational for auto SKUs)
    pub stock: StockCounters,
    /// Whether the SKU can be bought
    pub is_active: bool,
    /// Display order
    pub sort_order: i32,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the row was last written
    pub updated_at: DateTime<Utc>,
}

/// Fields of a SKU about to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSku {
    /// Owning product
    pub product_id: ProductId,
    /// Code, unique per product
    pub code: String,
    /// Unit price
    pub price_amount: Decimal,
    /// Initial counters
    pub stock: StockCounters,
    /// Whether the SKU can be bought
    pub is_active: bool,
    /// Display order
    pub sort_order: i32,
}

// ============================================================================
// Secrets
// ============================================================================

/// Lifecycle of a card secret. Transitions only leave `Available`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretStatus {
    /// Can be allocated
    Available,
    /// Handed out to an order item
    Used,
    /// Withdrawn by an administrator
    Disabled,
}

impl SecretStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Used => "used",
            Self::Disabled => "disabled",
        }
    }

    /// Parse a stored status.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] for unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(Self::Available),
            "used" => Ok(Self::Used),
            "disabled" => Ok(Self::Disabled),
            other => Err(FulfillmentError::InvalidState(format!(
                "unknown secret status: {other}"
            ))),
        }
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Available, Self::Used) | (Self::Available, Self::Disabled)
        )
    }
}

/// One individually addressable deliverable unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSecret {
    /// Secret identifier
    pub id: SecretId,
    /// Owning product
    pub product_id: ProductId,
    /// Owning SKU ([`SkuId::LEGACY`] before migration)
    pub sku_id: SkuId,
    /// Provenance batch
    pub batch_id: Option<BatchId>,
    /// Payload, globally unique
    pub secret: String,
    /// Current status
    pub status: SecretStatus,
    /// Order item the secret was delivered to
    pub used_by_order_item: Option<OrderItemId>,
    /// When the secret was delivered
    pub used_at: Option<DateTime<Utc>>,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the row was last written
    pub updated_at: DateTime<Utc>,
}

/// Where a batch of secrets came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretSource {
    /// Typed or pasted by an administrator
    Manual,
    /// Uploaded from a file
    Import,
}

impl SecretSource {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Import => "import",
        }
    }

    /// Parse a stored source.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] for unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(Self::Manual),
            "import" => Ok(Self::Import),
            other => Err(FulfillmentError::InvalidState(format!(
                "unknown secret source: {other}"
            ))),
        }
    }
}

/// Provenance group of secrets created together.
///
/// `total_count` is a snapshot for display; allocation always reads live secret rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBatch {
    /// Batch identifier
    pub id: BatchId,
    /// Owning product
    pub product_id: ProductId,
    /// Owning SKU ([`SkuId::LEGACY`] before migration)
    pub sku_id: SkuId,
    /// Human-facing batch number, unique
    pub batch_no: String,
    /// Where the secrets came from
    pub source: SecretSource,
    /// Number of secrets inserted with the batch
    pub total_count: u32,
    /// When the batch was created
    pub created_at: DateTime<Utc>,
}

/// Fields of a batch about to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSecretBatch {
    /// Owning product
    pub product_id: ProductId,
    /// Owning SKU
    pub sku_id: SkuId,
    /// Human-facing batch number
    pub batch_no: String,
    /// Where the secrets came from
    pub source: SecretSource,
    /// Number of secrets inserted with the batch
    pub total_count: u32,
}

// ============================================================================
// Orders and carts
// ============================================================================

/// Order lifecycle as seen by fulfillment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, waiting for payment
    PendingPayment,
    /// Payment confirmed by the payment collaborator
    Paid,
    /// Every item has a fulfillment row
    Fulfilled,
    /// Abandoned before delivery
    Cancelled,
}

impl OrderStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::Fulfilled => "fulfilled",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a stored status.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] for unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending_payment" => Ok(Self::PendingPayment),
            "paid" => Ok(Self::Paid),
            "fulfilled" => Ok(Self::Fulfilled),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(FulfillmentError::InvalidState(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier
    pub id: OrderId,
    /// Human-facing order number
    pub order_no: String,
    /// Buyer
    pub user_id: UserId,
    /// Current status
    pub status: OrderStatus,
    /// Whether the manual items hold locked stock from [`reserve_order`]
    ///
    /// [`reserve_order`]: crate::FulfillmentService::reserve_order
    pub stock_reserved: bool,
}

/// One line of an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Item identifier
    pub id: OrderItemId,
    /// Owning order
    pub order_id: OrderId,
    /// Product bought
    pub product_id: ProductId,
    /// Variant bought ([`SkuId::LEGACY`] before migration)
    pub sku_id: SkuId,
    /// Units bought
    pub quantity: u32,
    /// Price per unit at checkout
    pub unit_price: Decimal,
    /// Delivery mode captured at checkout
    pub fulfillment_mode: FulfillmentMode,
}

/// A cart line, unique per `(user_id, product_id, sku_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Cart owner
    pub user_id: UserId,
    /// Product in the cart
    pub product_id: ProductId,
    /// Variant in the cart
    pub sku_id: SkuId,
    /// Units wanted
    pub quantity: u32,
    /// Delivery mode at the time the line was added
    pub fulfillment_mode: FulfillmentMode,
    /// When the line was first added
    pub created_at: DateTime<Utc>,
    /// When the line was last written
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Fulfillment
// ============================================================================

/// What was delivered for an order item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "secrets", rename_all = "snake_case")]
pub enum FulfillmentContent {
    /// Secrets handed out, one per unit
    Auto(Vec<String>),
    /// Stock committed; the delivery itself happens outside the engine
    Manual,
}

impl FulfillmentContent {
    /// Mode this content was produced by.
    #[must_use]
    pub const fn mode(&self) -> FulfillmentMode {
        match self {
            Self::Auto(_) => FulfillmentMode::Auto,
            Self::Manual => FulfillmentMode::Manual,
        }
    }

    /// Newline-joined payload, `None` for manual deliveries.
    #[must_use]
    pub fn payload(&self) -> Option<String> {
        match self {
            Self::Auto(secrets) => Some(secrets.join("\n")),
            Self::Manual => None,
        }
    }

    /// Rebuild content from its stored `(kind, payload)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] if an auto row has no payload.
    pub fn from_stored(mode: FulfillmentMode, payload: Option<&str>) -> Result<Self> {
        match (mode, payload) {
            (FulfillmentMode::Manual, _) => Ok(Self::Manual),
            (FulfillmentMode::Auto, Some(payload)) => Ok(Self::Auto(
                payload.lines().map(str::to_string).collect(),
            )),
            (FulfillmentMode::Auto, None) => Err(FulfillmentError::InvalidState(
                "auto fulfillment stored without payload".to_string(),
            )),
        }
    }
}

/// One delivered order item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    /// Fulfillment identifier
    pub id: FulfillmentId,
    /// Owning order
    pub order_id: OrderId,
    /// Delivered item (unique)
    pub order_item_id: OrderItemId,
    /// What was delivered
    pub content: FulfillmentContent,
    /// When the item was delivered
    pub delivered_at: DateTime<Utc>,
}

/// Fields of a fulfillment about to be inserted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFulfillment {
    /// Owning order
    pub order_id: OrderId,
    /// Delivered item
    pub order_item_id: OrderItemId,
    /// What was delivered
    pub content: FulfillmentContent,
    /// When the item was delivered
    pub delivered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_sku_sentinel() {
        assert!(SkuId::LEGACY.is_legacy());
        assert!(!SkuId::new(1).is_legacy());
    }

    #[test]
    fn fulfillment_mode_parse_defaults_to_manual() {
        assert_eq!(FulfillmentMode::parse("").ok(), Some(FulfillmentMode::Manual));
        assert_eq!(FulfillmentMode::parse(" AUTO ").ok(), Some(FulfillmentMode::Auto));
        assert!(FulfillmentMode::parse("courier").is_err());
    }

    #[test]
    fn secret_transitions_only_leave_available() {
        use SecretStatus::{Available, Disabled, Used};
        assert!(Available.can_transition_to(Used));
        assert!(Available.can_transition_to(Disabled));
        assert!(!Used.can_transition_to(Available));
        assert!(!Used.can_transition_to(Disabled));
        assert!(!Disabled.can_transition_to(Used));
    }

    #[test]
    fn fulfillment_content_payload_round_trip() {
        let content = FulfillmentContent::Auto(vec!["A".to_string(), "B".to_string()]);
        let payload = content.payload();
        assert_eq!(payload.as_deref(), Some("A\nB"));
        let restored = FulfillmentContent::from_stored(FulfillmentMode::Auto, payload.as_deref());
        assert_eq!(restored.ok(), Some(content));
        assert_eq!(
            FulfillmentContent::from_stored(FulfillmentMode::Manual, None).ok(),
            Some(FulfillmentContent::Manual)
        );
    }
}
