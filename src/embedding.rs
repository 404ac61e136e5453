use log::warn;

use crate::abi::ForeignAbi;
use crate::bridge;
use crate::error::{Result, RtenkitError};
use crate::handle::{EmbeddingsKind, FacadeState, ForeignHandle};

/// Row-major `count × dimension` embedding output, one row per input token.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    count: usize,
    dimension: usize,
}

impl EmbeddingMatrix {
    /// An empty matrix. Its dimension is 0 because no row was produced.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a flat buffer. Returns `None` unless `data.len() == count * dimension`.
    pub fn from_flat(data: Vec<f32>, count: usize, dimension: usize) -> Option<Self> {
        if count.checked_mul(dimension)? != data.len() {
            return None;
        }
        Some(Self { data, count, dimension })
    }

    /// Number of rows (input tokens).
    pub fn count(&self) -> usize {
        self.count
    }

    /// Length of each row.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.count, self.dimension)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.count {
            return None;
        }
        let start = index * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        // chunks_exact rejects 0; an empty matrix has no data to chunk anyway.
        self.data.chunks_exact(self.dimension.max(1))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Column-wise mean of all rows, i.e. a single vector for the whole input.
    /// `None` for an empty matrix.
    pub fn mean_pool(&self) -> Option<Vec<f32>> {
        if self.is_empty() {
            return None;
        }
        let mut pooled = vec![0.0f32; self.dimension];
        for row in self.rows() {
            for (acc, value) in pooled.iter_mut().zip(row) {
                *acc += value;
            }
        }
        let n = self.count as f32;
        pooled.iter_mut().for_each(|v| *v /= n);
        Some(pooled)
    }
}

/// Safe wrapper over a foreign embedding model handle.
///
/// Same lifecycle as [`crate::Tokenizer`]: usable until [`Embeddings::close`]
/// or drop, movable between threads, never shared by them.
pub struct Embeddings {
    handle: ForeignHandle<EmbeddingsKind>,
}

impl Embeddings {
    /// Builds an embedding model from serialized model data using the default
    /// provider.
    #[cfg(any(feature = "native", feature = "linked"))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::with_abi(ForeignAbi::default(), data)
    }

    /// Builds an embedding model from serialized model data.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for empty data, `ConstructionFailed` when the foreign
    /// side rejects it.
    pub fn with_abi(abi: ForeignAbi, data: &[u8]) -> Result<Self> {
        let handle = ForeignHandle::create(abi, data)?;
        Ok(Self { handle })
    }

    pub fn state(&self) -> FacadeState {
        self.handle.state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == FacadeState::Closed
    }

    /// Looks up one embedding row per token id, in input order.
    ///
    /// An empty token sequence yields [`EmbeddingMatrix::empty`] without
    /// calling the foreign side.
    pub fn embed(&self, tokens: &[u32]) -> Result<EmbeddingMatrix> {
        let handle = self.handle.live()?;
        if tokens.is_empty() {
            return Ok(EmbeddingMatrix::empty());
        }
        let output = bridge::embed(handle, tokens).map_err(|fault| {
            warn!("embed of {} tokens failed: {}", tokens.len(), fault);
            RtenkitError::EmbeddingFailed(fault.to_string())
        })?;
        if output.count != tokens.len() {
            warn!("foreign model returned {} rows for {} tokens", output.count, tokens.len());
            return Err(RtenkitError::EmbeddingFailed(format!(
                "expected {} rows, foreign model returned {}",
                tokens.len(),
                output.count
            )));
        }
        if output.dimension == 0 {
            warn!("foreign model returned zero-width rows for {} tokens", tokens.len());
            return Err(RtenkitError::EmbeddingFailed(
                "foreign model returned rows of dimension 0".to_string(),
            ));
        }
        EmbeddingMatrix::from_flat(output.data, output.count, output.dimension).ok_or_else(|| {
            RtenkitError::EmbeddingFailed("foreign output does not match its reported shape".to_string())
        })
    }

    /// Releases the foreign handle. Calling it again is a no-op.
    pub fn close(&mut self) {
        self.handle.release();
    }
}

impl std::fmt::Debug for Embeddings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embeddings").field("state", &self.state()).finish()
    }
}
