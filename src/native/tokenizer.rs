use tokenizers::Tokenizer;

use super::{NativeError, NativeResult};

/// A HuggingFace tokenizer loaded from `tokenizer.json` contents.
pub struct NativeTokenizer {
    inner: Tokenizer,
}

impl NativeTokenizer {
    pub fn from_bytes(data: &[u8]) -> NativeResult<Self> {
        let inner = Tokenizer::from_bytes(data).map_err(|e| NativeError::Tokenizer(e.to_string()))?;
        log::debug!("native tokenizer loaded, vocab size {}", inner.get_vocab_size(true));
        Ok(Self { inner })
    }

    /// Encodes without adding special tokens, so ids map one-to-one onto the
    /// text.
    pub fn encode(&self, text: &str) -> NativeResult<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| NativeError::Tokenizer(e.to_string()))?;
        #[cfg(feature = "tokenizer-debug-logs")]
        log::trace!("native encode {:?} -> {:?}", text, encoding.get_ids());
        Ok(encoding.get_ids().to_vec())
    }

    /// Decodes keeping special tokens in the output.
    pub fn decode(&self, ids: &[u32]) -> NativeResult<String> {
        self.inner
            .decode(ids, false)
            .map_err(|e| NativeError::Tokenizer(e.to_string()))
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}
