//! Configuration loader, pipeline knobs and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Nested keys come from double underscores (`APP_PIPELINE__ALPHA=0.3`).

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Load from the current working directory.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load `config.toml` and the environment overlay found in `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.pipeline()?;
        tracing::debug!(env = %env_name, dir = %dir.display(), "configuration loaded");
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[pipeline]` section, or defaults when absent. Always validated.
    pub fn pipeline(&self) -> anyhow::Result<PipelineConfig> {
        let pipeline = if self.figment.contains("pipeline") {
            self.get::<PipelineConfig>("pipeline")?
        } else {
            PipelineConfig::default()
        };
        pipeline.validate()?;
        Ok(pipeline)
    }
}

/// How the original query is turned into search queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    #[default]
    Passthrough,
    Reformulate,
    Expand,
    Hyde,
}

/// Per-list score normalization applied before fusion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `(s - min) / (max - min)`; a list with one distinct score maps to 1.0.
    #[default]
    MinMax,
    /// `(n - rank) / n` using the list's own order.
    Rank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Dense weight in fusion; lexical gets `1 - alpha`.
    pub alpha: f32,
    /// Depth of each retriever call and size of the rerank funnel.
    pub top_k_retrieve: usize,
    /// Number of contexts returned after (optional) reranking.
    pub top_k_rerank: usize,
    pub enable_lexical: bool,
    pub enable_rerank: bool,
    pub expansion_count: usize,
    pub transform_mode: TransformMode,
    pub normalization: Normalization,
    /// Upper bound on concurrent reranker calls.
    pub rerank_parallelism: usize,
    pub deadline_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            top_k_retrieve: 10,
            top_k_rerank: 3,
            enable_lexical: true,
            enable_rerank: false,
            expansion_count: 3,
            transform_mode: TransformMode::Passthrough,
            normalization: Normalization::MinMax,
            rerank_parallelism: 4,
            deadline_ms: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::InvalidConfig(format!("alpha must be within [0, 1], got {}", self.alpha)));
        }
        let positive = [
            ("top_k_retrieve", self.top_k_retrieve),
            ("top_k_rerank", self.top_k_rerank),
            ("expansion_count", self.expansion_count),
            ("rerank_parallelism", self.rerank_parallelism),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("{name} must be greater than zero")));
        }
        if self.deadline_ms == Some(0) {
            return Err(Error::InvalidConfig("deadline_ms must be greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Option<Duration> { self.deadline_ms.map(Duration::from_millis) }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
