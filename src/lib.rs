// This is the main library file.
//
// Safe tokenizer and embedding facades over a foreign C ABI. The `native`
// feature compiles the provider of that ABI into this crate; `linked` imports
// it from a prebuilt library.

#[cfg(all(feature = "native", feature = "linked"))]
compile_error!("features `native` and `linked` both provide the rtenkit_* symbols; enable only one");

pub mod abi;
mod bridge;
pub mod config;
pub mod embedder;
pub mod embedding;
pub mod error;
mod handle;
pub mod tokenizer;

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
mod test_fixtures;

pub use abi::ForeignAbi;
pub use config::EmbedderConfig;
pub use embedder::Embedder;
pub use embedding::{EmbeddingMatrix, Embeddings};
pub use error::{Result, RtenkitError};
pub use handle::FacadeState;
pub use tokenizer::Tokenizer;
