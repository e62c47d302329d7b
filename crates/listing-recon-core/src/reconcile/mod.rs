pub mod identifiers;
pub mod upsert;

pub use identifiers::{classify, ChangeType, ClearedIdentifierPolicy, IdentifierType, Identifiers};
pub use upsert::{upsert_chunk, ChunkContext, ChunkOutcome};
