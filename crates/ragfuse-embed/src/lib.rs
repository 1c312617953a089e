//! ragfuse-embed
//!
//! Embedding providers: a deterministic `HashEmbedder` and the candle-based
//! BGE-M3 `XlmRobertaEmbedder`. `default_embedder` picks one from the
//! environment.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ragfuse_core::traits::EmbeddingProvider;

pub mod blocking;
pub mod device;
pub mod hash;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use blocking::offload;
pub use hash::HashEmbedder;
pub use model::{XlmRobertaEmbedder, BGE_M3_DIM};
pub use pool::masked_mean_l2;

/// `APP_USE_FAKE_EMBEDDINGS=1` selects a `HashEmbedder` of the model's dimension;
/// otherwise the BGE-M3 model is loaded from the resolved model directory.
pub fn default_embedder() -> Result<Arc<dyn EmbeddingProvider>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake {
        tracing::info!("using HashEmbedder");
        return Ok(Arc::new(HashEmbedder::new(BGE_M3_DIM)));
    }
    Ok(Arc::new(XlmRobertaEmbedder::load(&resolve_model_dir()?)?))
}

fn resolve_model_dir() -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() { tracing::info!(dir = %p.display(), source = var, "model dir"); return Ok(p); }
        }
    }
    for candidate in ["../models/bge-m3", "models/bge-m3"] {
        let p = Path::new(candidate);
        if p.exists() { tracing::info!(dir = %p.display(), "model dir"); return Ok(p.to_path_buf()); }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
