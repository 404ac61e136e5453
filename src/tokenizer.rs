use log::warn;

use crate::abi::ForeignAbi;
use crate::bridge;
use crate::error::{Result, RtenkitError};
use crate::handle::{FacadeState, ForeignHandle, TokenizerKind};

/// Safe wrapper over a foreign tokenizer handle.
///
/// The handle is released by [`Tokenizer::close`] or on drop, whichever comes
/// first. A `Tokenizer` can move between threads but cannot be shared by them:
/// the foreign handle is not reentrant.
pub struct Tokenizer {
    handle: ForeignHandle<TokenizerKind>,
}

impl Tokenizer {
    /// Builds a tokenizer from serialized tokenizer data using the default
    /// provider.
    #[cfg(any(feature = "native", feature = "linked"))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::with_abi(ForeignAbi::default(), data)
    }

    /// Builds a tokenizer from serialized tokenizer data.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for empty data (the foreign side is not called),
    /// `ConstructionFailed` when the foreign side rejects it.
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

    /// Encodes UTF-8 text into token ids. Empty text yields no ids.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let handle = self.handle.live()?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let ids = bridge::encode(handle, text.as_bytes()).map_err(|fault| {
            warn!("encode of {} bytes failed: {}", text.len(), fault);
            RtenkitError::EncodingFailed(fault.to_string())
        })?;
        #[cfg(feature = "tokenizer-debug-logs")]
        log::trace!("encoded {:?} into {:?}", text, ids);
        Ok(ids)
    }

    /// Decodes token ids into text.
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD rather than
    /// rejected; use [`Tokenizer::decode_bytes`] to get them untouched.
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        let bytes = self.decode_bytes(tokens)?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(err) => {
                warn!("decoded bytes are not valid UTF-8: {}", err.utf8_error());
                Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
            }
        }
    }

    /// Decodes token ids into the raw bytes the foreign tokenizer produced.
    pub fn decode_bytes(&self, tokens: &[u32]) -> Result<Vec<u8>> {
        let handle = self.handle.live()?;
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let bytes = bridge::decode(handle, tokens).map_err(|fault| {
            warn!("decode of {} tokens failed: {}", tokens.len(), fault);
            RtenkitError::DecodingFailed(fault.to_string())
        })?;
        #[cfg(feature = "tokenizer-debug-logs")]
        log::trace!("decoded {:?} into {} bytes", tokens, bytes.len());
        Ok(bytes)
    }

    /// Releases the foreign handle. Calling it again is a no-op.
    pub fn close(&mut self) {
        self.handle.release();
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer").field("state", &self.state()).finish()
    }
}
