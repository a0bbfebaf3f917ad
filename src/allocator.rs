use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::error::IdentifierError;
use crate::family::{EntityFamily, TypeCode};
use crate::identifier_format::{Identifier, IdentifierFormat};
use crate::sequence_store::SequenceStore;

/// Hands out the next identifier for a family and type code by reserving a
/// counter value in the store and formatting it.
pub struct IdentifierAllocator {
    store: Arc<dyn SequenceStore>,
    format: IdentifierFormat,
}

impl IdentifierAllocator {
    pub fn new(store: Arc<dyn SequenceStore>, format: IdentifierFormat) -> Self {
        IdentifierAllocator { store, format }
    }

    pub fn format(&self) -> &IdentifierFormat {
        &self.format
    }

    /// Allocates a fresh identifier.
    ///
    /// Type codes are validated before touching the store, so an invalid
    /// request consumes nothing. A `CounterOverflow` on the other hand means
    /// the store has already advanced past the last representable value; the
    /// numbering space for that key is exhausted and stays so.
    #[instrument(skip(self), fields(key = tracing::field::Empty))]
    pub async fn allocate(
        &self,
        family: EntityFamily,
        type_code: Option<TypeCode>,
    ) -> Result<Identifier, IdentifierError> {
        let key = self.format.validate(family, type_code)?;
        tracing::Span::current().record("key", tracing::field::display(&key));

        let counter = self.store.next(&key).await?;
        match self.format.format(family, type_code, counter) {
            Ok(identifier) => {
                debug!(%identifier, counter, "allocated identifier");
                Ok(identifier)
            }
            Err(err @ IdentifierError::CounterOverflow { .. }) => {
                error!(%key, counter, "numbering space exhausted");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn current(
        &self,
        family: EntityFamily,
        type_code: Option<TypeCode>,
    ) -> Result<u64, IdentifierError> {
        let key = self.format.validate(family, type_code)?;
        self.store.current(&key).await
    }

    /// Moves the counter of a key forward to at least `floor`. A floor that
    /// no longer fits the family's field is rejected before the store is
    /// touched.
    #[instrument(skip(self))]
    pub async fn advance_to(
        &self,
        family: EntityFamily,
        type_code: Option<TypeCode>,
        floor: u64,
    ) -> Result<u64, IdentifierError> {
        let key = self.format.validate(family, type_code)?;
        if floor > family.max_counter() {
            return Err(IdentifierError::CounterOverflow { key, counter: floor });
        }
        let counter = self.store.advance_to(&key, floor).await?;
        debug!(%key, counter, "advanced sequence floor");
        Ok(counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier_format::FormatOptions;
    use crate::sequence_store::InMemorySequenceStore;
    use std::collections::HashSet;

    fn allocator() -> IdentifierAllocator {
        IdentifierAllocator::new(
            Arc::new(InMemorySequenceStore::new()),
            IdentifierFormat::default(),
        )
    }

    #[tokio::test]
    async fn test_accounts_for_two_customers() {
        let allocator = allocator();
        let savings = Some(TypeCode::Savings);

        let first = allocator.allocate(EntityFamily::Account, savings).await.unwrap();
        let second = allocator.allocate(EntityFamily::Account, savings).await.unwrap();
        let current = allocator
            .allocate(EntityFamily::Account, Some(TypeCode::Current))
            .await
            .unwrap();

        assert_eq!(first.as_str(), "SB000000000000000001");
        assert_eq!(second.as_str(), "SB000000000000000002");
        assert_eq!(current.as_str(), "CA000000000000000001");
    }

    #[tokio::test]
    async fn test_cards_use_independent_prefixes() {
        let allocator = allocator();

        let debit = allocator
            .allocate(EntityFamily::Card, Some(TypeCode::Debit))
            .await
            .unwrap();
        let credit = allocator
            .allocate(EntityFamily::Card, Some(TypeCode::Credit))
            .await
            .unwrap();

        assert_eq!(debit.as_str(), "1231000000000001");
        assert_eq!(credit.as_str(), "1232000000000001");
    }

    #[tokio::test]
    async fn test_customers_count_without_prefix() {
        let allocator = allocator();
        for expected in ["1", "2", "3"] {
            let id = allocator.allocate(EntityFamily::Customer, None).await.unwrap();
            assert_eq!(id.as_str(), expected);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocations_are_distinct_and_contiguous() {
        let allocator = Arc::new(allocator());
        let base = allocator
            .advance_to(EntityFamily::Account, Some(TypeCode::Savings), 500)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..100 {
            let allocator = Arc::clone(&allocator);
            handles.push(tokio::spawn(async move {
                allocator
                    .allocate(EntityFamily::Account, Some(TypeCode::Savings))
                    .await
                    .unwrap()
            }));
        }

        let mut suffixes = HashSet::new();
        for handle in handles {
            let id = handle.await.unwrap();
            assert!(id.as_str().starts_with("SB"));
            suffixes.insert(id.as_str()[2..].parse::<u64>().unwrap());
        }
        let expected: HashSet<u64> = (base + 1..=base + 100).collect();
        assert_eq!(suffixes, expected);
    }

    #[tokio::test]
    async fn test_invalid_type_code_consumes_nothing() {
        let allocator = IdentifierAllocator::new(
            Arc::new(InMemorySequenceStore::new()),
            IdentifierFormat::new(FormatOptions {
                legacy_card_types: false,
                legacy_account_types: false,
            }),
        );

        let err = allocator
            .allocate(EntityFamily::Card, Some(TypeCode::Atm))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentifierError::InvalidTypeCode { .. }));
        assert!(allocator
            .allocate(EntityFamily::Account, Some(TypeCode::Debit))
            .await
            .is_err());
        assert!(allocator
            .current(EntityFamily::Card, Some(TypeCode::Atm))
            .await
            .is_err());
        assert_eq!(
            allocator
                .current(EntityFamily::Card, Some(TypeCode::Debit))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_floor_beyond_field_width_is_rejected() {
        let allocator = allocator();
        let card = Some(TypeCode::Debit);
        allocator.advance_to(EntityFamily::Card, card, 7).await.unwrap();

        for floor in [1_000_000_000_000, u64::MAX - 1] {
            assert!(matches!(
                allocator.advance_to(EntityFamily::Card, card, floor).await,
                Err(IdentifierError::CounterOverflow { counter, .. }) if counter == floor
            ));
        }
        assert_eq!(allocator.current(EntityFamily::Card, card).await.unwrap(), 7);

        let next = allocator.allocate(EntityFamily::Card, card).await.unwrap();
        assert_eq!(next.as_str(), "1231000000000008");

        assert!(allocator
            .advance_to(EntityFamily::Card, card, 999_999_999_999)
            .await
            .is_ok());
        assert!(allocator
            .advance_to(EntityFamily::Customer, None, u64::MAX - 1)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_overflow_keeps_counter_consumed() {
        let allocator = allocator();
        let card = Some(TypeCode::Debit);
        allocator
            .advance_to(EntityFamily::Card, card, 999_999_999_998)
            .await
            .unwrap();

        let last = allocator.allocate(EntityFamily::Card, card).await.unwrap();
        assert_eq!(last.as_str(), "1231999999999999");

        for _ in 0..2 {
            assert!(matches!(
                allocator.allocate(EntityFamily::Card, card).await,
                Err(IdentifierError::CounterOverflow { .. })
            ));
        }
        assert_eq!(
            allocator.current(EntityFamily::Card, card).await.unwrap(),
            1_000_000_000_001
        );
    }
}
