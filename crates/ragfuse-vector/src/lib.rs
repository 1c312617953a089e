//! ragfuse-vector
//!
//! Implementations of `ragfuse_core::traits::VectorIndex`:
//! - `MemoryVectorIndex`: exact cosine search over an in-memory map
//! - `LanceVectorIndex` (feature `lance`): persistent LanceDB table

pub mod memory;

#[cfg(feature = "lance")]
pub mod lance;
#[cfg(feature = "lance")]
pub mod schema;

pub use memory::{cosine, MemoryVectorIndex};

#[cfg(feature = "lance")]
pub use lance::LanceVectorIndex;
