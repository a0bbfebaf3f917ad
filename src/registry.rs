use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

use crate::allocator::IdentifierAllocator;
use crate::error::IdentifierError;
use crate::family::{EntityFamily, SequenceKey, TypeCode};
use crate::identifier_format::{Identifier, IdentifierFormat, ParsedIdentifier};
use crate::metrics::AllocationMetrics;

/// How often `new_identifier` retries when the store is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Entry point for account opening, card issuance and customer onboarding.
///
/// `new_identifier` durably advances the counter of its key even when the
/// caller later fails to persist the owning entity. That value is lost, it is
/// never handed out again.
pub struct EntityRegistry {
    allocator: IdentifierAllocator,
    retry: RetryPolicy,
    metrics: Option<Arc<AllocationMetrics>>,
}

impl EntityRegistry {
    pub fn new(allocator: IdentifierAllocator) -> Self {
        EntityRegistry {
            allocator,
            retry: RetryPolicy::default(),
            metrics: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AllocationMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn format(&self) -> &IdentifierFormat {
        self.allocator.format()
    }

    #[instrument(skip(self))]
    pub async fn new_identifier(
        &self,
        family: EntityFamily,
        type_code: Option<TypeCode>,
    ) -> Result<Identifier, IdentifierError> {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;
        loop {
            match self.allocator.allocate(family, type_code).await {
                Ok(identifier) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_allocation(&SequenceKey::new(family, type_code));
                    }
                    return Ok(identifier);
                }
                Err(err) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_failure(&err);
                    }
                    if !err.is_retryable() || attempt >= self.retry.max_attempts {
                        return Err(err);
                    }
                    warn!(attempt, ?backoff, error = %err, "sequence store unavailable, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.retry.max_backoff);
                    attempt += 1;
                }
            }
        }
    }

    /// Resolves a code string such as `"SB"` or `"DR"` before allocating.
    /// An empty code means "no type code", which only customers accept.
    pub async fn new_identifier_for_code(
        &self,
        family: EntityFamily,
        type_code: &str,
    ) -> Result<Identifier, IdentifierError> {
        let type_code = resolve_type_code(family, type_code)?;
        self.new_identifier(family, type_code).await
    }

    pub fn parse(&self, identifier: &str) -> Result<ParsedIdentifier, IdentifierError> {
        self.allocator.format().parse(identifier)
    }

    pub fn parse_as(
        &self,
        family: EntityFamily,
        identifier: &str,
    ) -> Result<ParsedIdentifier, IdentifierError> {
        self.allocator.format().parse_as(family, identifier)
    }

    pub async fn current_counter(
        &self,
        family: EntityFamily,
        type_code: Option<TypeCode>,
    ) -> Result<u64, IdentifierError> {
        self.allocator.current(family, type_code).await
    }

    pub async fn advance_floor(
        &self,
        family: EntityFamily,
        type_code: Option<TypeCode>,
        floor: u64,
    ) -> Result<u64, IdentifierError> {
        self.allocator.advance_to(family, type_code, floor).await
    }

    /// Adopts an identifier issued outside this allocator so later
    /// allocations for its key start above it.
    pub async fn import_existing(&self, identifier: &str) -> Result<ParsedIdentifier, IdentifierError> {
        let parsed = self.parse(identifier)?;
        self.allocator
            .advance_to(parsed.family, parsed.type_code, parsed.counter)
            .await?;
        Ok(parsed)
    }
}

/// Maps an optional code string onto a [`TypeCode`] of `family`.
pub fn resolve_type_code(
    family: EntityFamily,
    type_code: &str,
) -> Result<Option<TypeCode>, IdentifierError> {
    if type_code.trim().is_empty() {
        return Ok(None);
    }
    TypeCode::from_code(family, type_code).map(Some)
}
