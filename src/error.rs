//! Error types for the rtenkit facade.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the tokenizer, embedding and embedder facades.
///
/// Every kind is recoverable: construction errors mean the instance never
/// existed, per-call errors leave the instance usable.
#[derive(Debug, Error)]
pub enum RtenkitError {
    /// Empty or otherwise unusable data supplied to construction
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The foreign constructor rejected the serialized data
    #[error("failed to construct {0}")]
    ConstructionFailed(&'static str),
    /// Operation attempted after the owning facade was closed
    #[error("{0} is closed")]
    ClosedResource(&'static str),
    #[error("encoding failed: {0}")]
    EncodingFailed(String),
    #[error("decoding failed: {0}")]
    DecodingFailed(String),
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),
    /// Reading a serialized artefact or configuration file failed
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RtenkitError>;
