//! Vector storage: embeddings plus caller metadata, searchable by cosine similarity

pub mod index;
pub mod math;
pub mod metadata;
pub mod shared;
pub mod store;

pub use index::FlatIndex;
pub use metadata::{Metadata, MetadataTable};
pub use shared::SharedVectorStore;
pub use store::{SearchResult, StoreStats, VectorRecord, VectorStore};
