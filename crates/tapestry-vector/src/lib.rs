//! The Vector Store Adapter (§4.6) and the embedding/rerank/answer providers
//! (§4.7) that feed it.

pub mod decay;
pub mod providers;
pub mod store;

pub use decay::{DecayConfig, DecayKind};
pub use store::{EmbeddedVector, PayloadFilter, SearchHit, SearchMethod, SparseEmbedding, VectorStore};
