pub mod allocator;
pub mod config;
pub mod error;
pub mod family;
pub mod identifier_format;
pub mod metrics;
pub mod redis_sequence_store;
pub mod registry;
pub mod sequence_store;

pub use allocator::IdentifierAllocator;
pub use error::IdentifierError;
pub use family::{EntityFamily, SequenceKey, TypeCode};
pub use identifier_format::{FormatOptions, Identifier, IdentifierFormat, ParsedIdentifier};
pub use registry::{EntityRegistry, RetryPolicy};
pub use sequence_store::{InMemorySequenceStore, SequenceStore};
