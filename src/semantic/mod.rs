pub mod describer;
pub mod document;
pub mod embedder;
pub mod metric;
pub mod model;
pub mod qdrant;
pub mod retriever;
pub mod vector_store;

pub use describer::*;
pub use document::*;
pub use embedder::*;
pub use metric::*;
pub use model::*;
pub use qdrant::*;
pub use retriever::*;
pub use vector_store::*;
