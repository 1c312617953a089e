//! Turns a directory of `.txt` files into ingestible documents.
//!
//! Each paragraph becomes one document; paragraphs above the token budget are
//! split into overlapping word windows. Ids are `<relative path without
//! extension>:<n>` with `/` separators, so `hr/notes.txt` yields `hr/notes:0`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{Document, MetaValue};

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub window_words: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 500, window_words: 300, overlap_percent: 0.2 }
    }
}

#[derive(Default)]
pub struct DocumentLoader {
    chunking: ChunkingConfig,
}

impl DocumentLoader {
    pub fn new() -> Self { Self::default() }

    pub fn with_chunking(chunking: ChunkingConfig) -> Self { Self { chunking } }

    pub fn load_directory(&self, data_dir: &Path) -> Result<Vec<Document>> {
        self.load_directory_limited(data_dir, usize::MAX)
    }

    pub fn load_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<Document>> {
        let mut files = list_txt_files(data_dir);
        if files.is_empty() {
            tracing::warn!(dir = %data_dir.display(), "no .txt files found");
            return Ok(vec![]);
        }
        if files.len() > limit {
            files.truncate(limit);
            tracing::info!(limit, "limited to first files");
        }
        let mut documents = Vec::new();
        for (i, file_path) in files.iter().enumerate() {
            tracing::debug!(file = %file_path.display(), n = i + 1, total = files.len(), "loading");
            let content = read_file_content(file_path)?;
            let key = document_key(file_path, data_dir)?;
            let category = category_from_path(file_path, data_dir);
            documents.extend(self.chunk(&content, &key, file_path, &category));
        }
        tracing::info!(files = files.len(), documents = documents.len(), "directory loaded");
        Ok(documents)
    }

    fn chunk(&self, content: &str, key: &str, file_path: &Path, category: &str) -> Vec<Document> {
        let mut pieces = Vec::new();
        for paragraph in content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            if count_tokens(paragraph) <= self.chunking.max_tokens {
                pieces.push(paragraph.to_string());
            } else {
                pieces.extend(self.split_with_overlap(paragraph));
            }
        }
        let path = file_path.to_string_lossy().to_string();
        pieces
            .into_iter()
            .enumerate()
            .map(|(n, text)| {
                Document::new(format!("{key}:{n}"), text)
                    .with_meta("category", category)
                    .with_meta("path", path.as_str())
                    .with_meta("chunk_index", MetaValue::Integer(n as i64))
            })
            .collect()
    }

    fn split_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let window = self.chunking.window_words.max(1);
        let overlap = ((window as f32 * self.chunking.overlap_percent) as usize).min(window - 1);
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + window).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            start = end - overlap;
        }
        chunks
    }
}

fn count_tokens(text: &str) -> usize { (text.split_whitespace().count() as f32 / 0.75) as usize }

fn read_file_content(file_path: &Path) -> Result<String> {
    let bytes = fs::read(file_path).map_err(|source| Error::Io { path: file_path.to_path_buf(), source })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Path of `file_path` under `data_dir`, extension dropped, joined with `/`.
fn document_key(file_path: &Path, data_dir: &Path) -> Result<String> {
    let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path).with_extension("");
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return Err(Error::Validation(format!("no file name in {}", file_path.display())));
    }
    Ok(parts.join("/"))
}

fn category_from_path(file_path: &Path, data_dir: &Path) -> String {
    let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
    match relative.parent().and_then(Path::to_str) {
        Some(parent) if !parent.is_empty() => parent.to_string(),
        _ => "misc".to_string(),
    }
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("txt"))
        .map(|e| e.path().to_path_buf())
        .collect();
    txt_files.sort();
    txt_files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_failure_is_an_io_error() {
        let missing = Path::new("/nonexistent/ragfuse/ghost.txt");
        let err = read_file_content(missing).unwrap_err();
        assert!(matches!(err, Error::Io { ref path, .. } if path == missing), "got {err:?}");
    }

    #[test]
    fn document_key_uses_forward_slashes_and_drops_extension() {
        let root = Path::new("/data");
        assert_eq!(document_key(&root.join("hr").join("notes.txt"), root).unwrap(), "hr/notes");
        assert_eq!(document_key(&root.join("a.txt"), root).unwrap(), "a");
    }
}
