use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use ragfuse_core::traits::EmbeddingProvider;
use ragfuse_core::ProviderError;

use crate::blocking::offload;
use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

pub const BGE_M3_DIM: usize = 1024;
const MAX_LEN: usize = 256;

struct Encoder { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device }

/// BGE-M3 (XLM-RoBERTa) sentence embedder: mean pooling + L2 normalization.
///
/// Forward passes run on the blocking pool; the async methods only await them.
pub struct XlmRobertaEmbedder { encoder: Arc<Encoder> }

impl XlmRobertaEmbedder {
    /// Load `tokenizer.json`, `config.json` and `pytorch_model.bin` from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "loading BGE-M3 model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(model_dir.join("config.json"))?)?;
        let weights = candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        tracing::info!("BGE-M3 model loaded");
        Ok(Self { encoder: Arc::new(Encoder { model, tokenizer, device }) })
    }

    /// Synchronous single-text embedding. Blocks the calling thread.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> { self.encoder.embed(text) }
}

impl Encoder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, MAX_LEN, &self.device)?;
        let token_type_ids = Tensor::zeros((1, MAX_LEN), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1::<f32>()?;
        if emb.len() != BGE_M3_DIM { return Err(anyhow!("expected {BGE_M3_DIM} dims, model produced {}", emb.len())); }
        if start.elapsed().as_millis() > 100 { tracing::warn!(ms = start.elapsed().as_millis() as u64, "slow embedding"); }
        Ok(emb)
    }
}

#[async_trait]
impl EmbeddingProvider for XlmRobertaEmbedder {
    fn dim(&self) -> usize { BGE_M3_DIM }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let encoder = Arc::clone(&self.encoder);
        let text = text.to_string();
        offload(move || encoder.embed(&text)).await
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let encoder = Arc::clone(&self.encoder);
        let texts = texts.to_vec();
        offload(move || texts.iter().map(|t| encoder.embed(t)).collect()).await
    }
}
