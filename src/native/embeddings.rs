use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};

use super::{NativeError, NativeResult};

const TABLE_NAME: &str = "embeddings";

/// A static `vocab × dimension` embedding table.
pub struct NativeEmbeddings {
    table: Vec<f32>,
    vocab_size: usize,
    dimension: usize,
}

impl NativeEmbeddings {
    /// Reads the table from safetensors bytes: the tensor named `embeddings`,
    /// or the only 2-D tensor when none has that name. It must be `F32`.
    pub fn from_bytes(data: &[u8]) -> NativeResult<Self> {
        let tensors = SafeTensors::deserialize(data).map_err(|e| NativeError::SafeTensors(e.to_string()))?;
        let view = select_table(&tensors)?;

        if view.dtype() != Dtype::F32 {
            return Err(NativeError::UnsupportedDtype(format!("{:?}", view.dtype())));
        }
        let (vocab_size, dimension) = match view.shape() {
            [vocab, dim] if *vocab > 0 && *dim > 0 => (*vocab, *dim),
            other => return Err(NativeError::BadShape(other.to_vec())),
        };

        // Tensor data is little-endian and not necessarily 4-byte aligned.
        let mut table: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
        if cfg!(target_endian = "big") {
            for v in table.iter_mut() {
                *v = f32::from_bits(v.to_bits().swap_bytes());
            }
        }

        log::debug!("native embedding table loaded: {}x{}", vocab_size, dimension);
        Ok(Self {
            table,
            vocab_size,
            dimension,
        })
    }

    /// Row-major `ids.len() × dimension` values, one row per id.
    pub fn embed(&self, ids: &[i32]) -> NativeResult<Vec<f32>> {
        let mut out = Vec::with_capacity(ids.len() * self.dimension);
        for &id in ids {
            let row = usize::try_from(id)
                .ok()
                .filter(|&row| row < self.vocab_size)
                .ok_or(NativeError::TokenOutOfRange {
                    id,
                    vocab_size: self.vocab_size,
                })?;
            let start = row * self.dimension;
            out.extend_from_slice(&self.table[start..start + self.dimension]);
        }
        Ok(out)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

fn select_table<'a>(tensors: &'a SafeTensors<'a>) -> NativeResult<TensorView<'a>> {
    if let Ok(view) = tensors.tensor(TABLE_NAME) {
        return Ok(view);
    }
    let mut matrices = tensors.tensors().into_iter().filter(|(_, view)| view.shape().len() == 2);
    match (matrices.next(), matrices.next()) {
        (Some((name, view)), None) => {
            log::debug!("no '{}' tensor, using '{}'", TABLE_NAME, name);
            Ok(view)
        }
        (None, _) => Err(NativeError::MissingTable("no 2-D tensor".to_string())),
        (Some(_), Some(_)) => Err(NativeError::MissingTable(format!(
            "several 2-D tensors and none named '{}'",
            TABLE_NAME
        ))),
    }
}
