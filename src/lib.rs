//! prefvault - durable vector storage for travel-preference interview answers
//!
//! Callers embed answer text into fixed-width vectors, file them with
//! [`VectorStore::store`], and later pull back the closest matches with
//! [`VectorStore::search`]. [`AnswerArchive`] wraps the common interview
//! workflow on top of an injected store and [`Embedder`].

pub mod answers;
pub mod config;
pub mod embedding;
pub mod error;
pub mod vector;

pub use crate::answers::{AnswerArchive, ArchivedAnswer};
pub use crate::config::{ConfigManager, CorruptPolicy, VaultConfig, VectorConfig};
pub use crate::embedding::{Embedder, HashEmbedder};
pub use crate::error::{Result, VaultError};
pub use crate::vector::{Metadata, SearchResult, SharedVectorStore, StoreStats, VectorRecord, VectorStore};
