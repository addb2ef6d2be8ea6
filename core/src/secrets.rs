//! Secret pool: ingestion, allocation and withdrawal of card secrets.
//!
//! Allocation is optimistic. A candidate is read without locking and then claimed with a
//! conditional update that only succeeds while the row is still `available`. Losing that
//! race costs one retry under the [`RetryPolicy`]; it can never hand the same payload to
//! two order items. The pool never substitutes a secret of another SKU of the same
//! product, so an exhausted SKU is reported even when its siblings have stock.

use crate::environment::Clock;
use crate::error::{FulfillmentError, Result};
use crate::metrics::FulfillmentMetrics;
use crate::resolver::resolve_for_ingest_in;
use crate::retry::RetryPolicy;
use crate::store::{CatalogRepository, SecretRepository, Store, UnitOfWork};
use crate::types::{
    CardSecret, NewSecretBatch, OrderItemId, ProductId, SecretBatch, SecretId, SecretSource,
    SecretStatus, SkuId,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::collections::HashSet;
use std::sync::Arc;

/// Secrets to add to the pool of one product/SKU pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestRequest {
    /// Product the secrets belong to
    pub product_id: ProductId,
    /// SKU the secrets belong to; [`SkuId::LEGACY`] picks the product's default SKU
    pub sku_id: SkuId,
    /// Batch number to record, generated when `None`
    pub batch_no: Option<String>,
    /// Provenance
    pub source: SecretSource,
    /// Raw payloads, one per deliverable unit
    pub secrets: Vec<String>,
}

impl IngestRequest {
    /// Manually entered secrets with a generated batch number.
    #[must_use]
    pub const fn manual(product_id: ProductId, sku_id: SkuId, secrets: Vec<String>) -> Self {
        Self {
            product_id,
            sku_id,
            batch_no: None,
            source: SecretSource::Manual,
            secrets,
        }
    }

    /// Use an explicit batch number.
    #[must_use]
    pub fn with_batch_no(mut self, batch_no: impl Into<String>) -> Self {
        self.batch_no = Some(batch_no.into());
        self
    }

    /// Set the provenance.
    #[must_use]
    pub const fn with_source(mut self, source: SecretSource) -> Self {
        self.source = source;
        self
    }
}

/// Outcome of a successful ingest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestReport {
    /// Batch created for the secrets
    pub batch: SecretBatch,
    /// Number of secrets inserted
    pub inserted: u64,
}

/// Card secret pool.
pub struct SecretPool<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S> Clone for SecretPool<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            retry: self.retry.clone(),
        }
    }
}

impl<S: Store> SecretPool<S> {
    /// Create a pool over the given store.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            retry,
        }
    }

    /// Retry policy applied to lost claims.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Add secrets to the pool as one batch.
    ///
    /// Payloads are trimmed, blanks dropped and repeats within the request collapsed.
    /// Either every remaining payload is inserted or none is.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::ProductUnavailable`] if the product does not exist
    /// - [`FulfillmentError::SkuInvalid`] / [`FulfillmentError::SkuRequired`] if the SKU
    ///   cannot be resolved
    /// - [`FulfillmentError::InvalidQuantity`] if no payload is left after trimming
    /// - [`FulfillmentError::DuplicateSecret`] if any payload already exists in the pool
    /// - [`FulfillmentError::MultilineSecret`] if a payload contains a line break
    #[tracing::instrument(
        skip(self, request),
        fields(product_id = %request.product_id, sku_id = %request.sku_id, submitted = request.secrets.len()),
        err
    )]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
        let payloads = normalize_payloads(&request.secrets);
        if payloads.is_empty() {
            return Err(FulfillmentError::InvalidQuantity);
        }
        // delivered secrets are stored newline-joined
        if let Some(payload) = payloads.iter().find(|p| p.contains(['\n', '\r'])) {
            return Err(FulfillmentError::MultilineSecret(payload.clone()));
        }
        let total_count = u32::try_from(payloads.len()).map_err(|_| {
            FulfillmentError::InvalidState(format!("batch of {} secrets", payloads.len()))
        })?;

        let mut tx = self.store.begin().await?;
        if tx.product(request.product_id).await?.is_none() {
            return Err(FulfillmentError::ProductUnavailable(request.product_id));
        }
        let sku = resolve_for_ingest_in(&mut tx, request.product_id, request.sku_id).await?;

        let duplicates = tx.existing_payloads(&payloads).await?;
        if !duplicates.is_empty() {
            tracing::warn!(duplicates = duplicates.len(), "Rejected ingest with duplicate secrets");
            return Err(FulfillmentError::DuplicateSecret {
                payloads: duplicates,
            });
        }

        let now = self.clock.now();
        let batch_no = request
            .batch_no
            .map(|no| no.trim().to_string())
            .filter(|no| !no.is_empty())
            .unwrap_or_else(|| generate_batch_no(now));
        let batch = tx
            .insert_batch(
                NewSecretBatch {
                    product_id: request.product_id,
                    sku_id: sku.id,
                    batch_no,
                    source: request.source,
                    total_count,
                },
                now,
            )
            .await?;
        let inserted = tx.insert_secrets(&batch, &payloads, now).await?;
        tx.commit().await?;

        FulfillmentMetrics::record_ingest(inserted);
        tracing::info!(batch_no = %batch.batch_no, sku_id = %sku.id, inserted, "Secrets ingested");
        Ok(IngestReport { batch, inserted })
    }

    /// Take one secret of exactly `(product_id, sku_id)` out of the pool.
    ///
    /// # Errors
    ///
    /// - [`FulfillmentError::PoolExhausted`] if no secret is available
    /// - [`FulfillmentError::AllocationConflict`] if every attempt lost its race
    #[tracing::instrument(skip(self), err)]
    pub async fn allocate(&self, product_id: ProductId, sku_id: SkuId) -> Result<CardSecret> {
        let mut tx = self.store.begin().await?;
        let secret = allocate_in(
            &mut tx,
            &self.retry,
            self.clock.now(),
            product_id,
            sku_id,
            None,
        )
        .await?;
        tx.commit().await?;
        Ok(secret)
    }

    /// Withdraw an available secret. Returns `false` (and changes nothing) when the secret
    /// is already used or disabled.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::InvalidState`] if the secret does not exist.
    #[tracing::instrument(skip(self), err)]
    pub async fn disable(&self, secret_id: SecretId) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let Some(secret) = tx.secret(secret_id).await? else {
            return Err(FulfillmentError::InvalidState(format!(
                "secret {secret_id} not found"
            )));
        };
        if !secret.status.can_transition_to(SecretStatus::Disabled) {
            tracing::debug!(status = secret.status.as_str(), "Secret not disabled");
            return Ok(false);
        }
        let disabled = tx.disable_secret(secret_id, self.clock.now()).await?;
        tx.commit().await?;
        Ok(disabled)
    }

    /// Number of secrets of exactly `(product_id, sku_id)` that can still be allocated.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    pub async fn available_count(&self, product_id: ProductId, sku_id: SkuId) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        let count = tx.count_available_secrets(product_id, sku_id).await?;
        tx.commit().await?;
        Ok(count)
    }
}

/// [`SecretPool::allocate`] inside an open unit of work, recording `order_item_id` as the
/// secret's consumer.
///
/// # Errors
///
/// See [`SecretPool::allocate`].
pub async fn allocate_in<U: SecretRepository>(
    tx: &mut U,
    retry: &RetryPolicy,
    now: DateTime<Utc>,
    product_id: ProductId,
    sku_id: SkuId,
    order_item_id: Option<OrderItemId>,
) -> Result<CardSecret> {
    let max_attempts = retry.max_attempts().max(1);
    let mut attempt = 0;
    while attempt < max_attempts {
        let Some(candidate) = tx.next_available_secret(product_id, sku_id).await? else {
            FulfillmentMetrics::record_exhausted();
            return Err(FulfillmentError::PoolExhausted { product_id, sku_id });
        };

        if tx.claim_secret(candidate.id, order_item_id, now).await? {
            FulfillmentMetrics::record_allocation();
            tracing::debug!(secret_id = %candidate.id, attempt, "Secret claimed");
            return Ok(CardSecret {
                status: SecretStatus::Used,
                used_by_order_item: order_item_id,
                used_at: Some(now),
                updated_at: now,
                ..candidate
            });
        }

        FulfillmentMetrics::record_conflict();
        tracing::debug!(secret_id = %candidate.id, attempt, "Secret claim lost, retrying");
        tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
        attempt += 1;
    }

    tracing::warn!(%product_id, %sku_id, attempts = max_attempts, "Allocation retries exhausted");
    Err(FulfillmentError::AllocationConflict {
        product_id,
        sku_id,
        attempts: max_attempts,
    })
}

/// Trim, drop blanks and collapse repeats, keeping first-seen order.
#[must_use]
pub fn normalize_payloads(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|payload| payload.trim())
        .filter(|payload| !payload.is_empty())
        .filter(|payload| seen.insert(*payload))
        .map(str::to_string)
        .collect()
}

/// `BATCH-<yyyymmddHHMMSS>-<4 random alphanumerics>`.
#[must_use]
pub fn generate_batch_no(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(|byte| char::from(byte).to_ascii_uppercase())
        .collect();
    format!("BATCH-{}-{suffix}", now.format("%Y%m%d%H%M%S"))
}
