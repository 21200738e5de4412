//! Index construction: document ingestion and validation.

mod builder;

pub use builder::{check_text, IndexBuilder, DEFAULT_MAX_TRIGRAM_COUNT};
