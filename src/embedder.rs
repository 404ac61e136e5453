// src/embedder.rs
//! Text to embeddings in one call: a [`Tokenizer`] feeding an [`Embeddings`]
//! model, both built from files on disk.

use std::fs;
use std::path::Path;

use log::info;

use crate::abi::ForeignAbi;
use crate::config::EmbedderConfig;
use crate::embedding::{EmbeddingMatrix, Embeddings};
use crate::error::{Result, RtenkitError};
use crate::tokenizer::Tokenizer;

#[derive(Debug)]
pub struct Embedder {
    tokenizer: Tokenizer,
    embeddings: Embeddings,
}

impl Embedder {
    /// Loads the model and tokenizer files with the default provider.
    #[cfg(any(feature = "native", feature = "linked"))]
    pub fn new(model_path: impl AsRef<Path>, tokenizer_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_abi(ForeignAbi::default(), model_path, tokenizer_path)
    }

    #[cfg(any(feature = "native", feature = "linked"))]
    pub fn from_config(config: &EmbedderConfig) -> Result<Self> {
        Self::new(&config.model_path, &config.tokenizer_path)
    }

    /// Loads the model and tokenizer files.
    ///
    /// Both files are read and checked before any foreign handle is created,
    /// so a missing (`Io`) or empty (`InvalidInput`) file never costs a
    /// foreign call.
    pub fn with_abi(abi: ForeignAbi, model_path: impl AsRef<Path>, tokenizer_path: impl AsRef<Path>) -> Result<Self> {
        let model = read_blob(model_path.as_ref())?;
        let tokenizer = read_blob(tokenizer_path.as_ref())?;
        let embedder = Self::from_bytes(abi, &model, &tokenizer)?;
        info!(
            "embedder loaded from {} and {}",
            model_path.as_ref().display(),
            tokenizer_path.as_ref().display()
        );
        Ok(embedder)
    }

    /// Builds an embedder from serialized model and tokenizer data.
    pub fn from_bytes(abi: ForeignAbi, model: &[u8], tokenizer: &[u8]) -> Result<Self> {
        let embeddings = Embeddings::with_abi(abi, model)?;
        // On failure `embeddings` drops here and releases its handle.
        let tokenizer = Tokenizer::with_abi(abi, tokenizer)?;
        Ok(Self { tokenizer, embeddings })
    }

    /// Tokenizes `text` and embeds the tokens: one row per token.
    pub fn embed(&self, text: &str) -> Result<EmbeddingMatrix> {
        let tokens = self.tokenizer.encode(text)?;
        self.embeddings.embed(&tokens)
    }

    /// Embeds each text in order, stopping at the first failure.
    pub fn embed_batch<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<EmbeddingMatrix>> {
        texts.iter().map(|text| self.embed(text.as_ref())).collect()
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn embeddings(&self) -> &Embeddings {
        &self.embeddings
    }

    pub fn is_closed(&self) -> bool {
        self.tokenizer.is_closed() && self.embeddings.is_closed()
    }

    /// Releases both foreign handles. Calling it again is a no-op.
    pub fn close(&mut self) {
        self.tokenizer.close();
        self.embeddings.close();
    }
}

fn read_blob(path: &Path) -> Result<Vec<u8>> {
    let data = fs::read(path).map_err(|source| RtenkitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if data.is_empty() {
        return Err(RtenkitError::InvalidInput(format!("{} is empty", path.display())));
    }
    Ok(data)
}
