//! Ownership and lifecycle of opaque foreign handles.

use std::mem;
use std::ptr::NonNull;

use log::{debug, warn};

use crate::abi::{ConstructFn, DestroyFn, ForeignAbi, RawEmbeddings, RawTokenizer};
use crate::bridge;
use crate::error::{Result, RtenkitError};

/// Observable state of a facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeState {
    /// The foreign handle is live and accepts calls.
    Usable,
    /// The foreign handle has been released; every call fails.
    Closed,
}

/// Selects the constructor/destructor pair of one kind of foreign handle.
pub(crate) trait HandleKind {
    type Raw;
    /// Used in logs and error messages.
    const NAME: &'static str;

    fn constructor(abi: &ForeignAbi) -> ConstructFn<Self::Raw>;
    fn destructor(abi: &ForeignAbi) -> DestroyFn<Self::Raw>;
}

pub(crate) enum TokenizerKind {}

impl HandleKind for TokenizerKind {
    type Raw = RawTokenizer;
    const NAME: &'static str = "tokenizer";

    fn constructor(abi: &ForeignAbi) -> ConstructFn<RawTokenizer> {
        abi.tokenizer_new
    }

    fn destructor(abi: &ForeignAbi) -> DestroyFn<RawTokenizer> {
        abi.tokenizer_free
    }
}

pub(crate) enum EmbeddingsKind {}

impl HandleKind for EmbeddingsKind {
    type Raw = RawEmbeddings;
    const NAME: &'static str = "embeddings";

    fn constructor(abi: &ForeignAbi) -> ConstructFn<RawEmbeddings> {
        abi.embeddings_new
    }

    fn destructor(abi: &ForeignAbi) -> DestroyFn<RawEmbeddings> {
        abi.embeddings_free
    }
}

enum HandleState<R> {
    Live(NonNull<R>),
    Released,
}

/// Exclusive owner of one foreign handle.
///
/// The handle is destroyed exactly once: by [`ForeignHandle::release`] or,
/// failing that, when the owner is dropped.
pub(crate) struct ForeignHandle<K: HandleKind> {
    abi: ForeignAbi,
    state: HandleState<K::Raw>,
}

// SAFETY: the foreign handle is owned exclusively and has no thread affinity;
// it is only non-reentrant, which `!Sync` already guarantees.
unsafe impl<K: HandleKind> Send for ForeignHandle<K> {}

impl<K: HandleKind> ForeignHandle<K> {
    pub(crate) fn create(abi: ForeignAbi, blob: &[u8]) -> Result<Self> {
        if blob.is_empty() {
            return Err(RtenkitError::InvalidInput(format!("empty {} data", K::NAME)));
        }
        match bridge::construct::<K>(&abi, blob) {
            Some(raw) => {
                debug!("{} handle created from {} bytes", K::NAME, blob.len());
                Ok(Self {
                    abi,
                    state: HandleState::Live(raw),
                })
            }
            None => {
                warn!("foreign side rejected {} bytes of {} data", blob.len(), K::NAME);
                Err(RtenkitError::ConstructionFailed(K::NAME))
            }
        }
    }

    pub(crate) fn state(&self) -> FacadeState {
        match self.state {
            HandleState::Live(_) => FacadeState::Usable,
            HandleState::Released => FacadeState::Closed,
        }
    }

    /// Borrows the live handle for one foreign call.
    pub(crate) fn live(&self) -> Result<Live<'_, K>> {
        match self.state {
            HandleState::Live(raw) => Ok(Live { abi: &self.abi, raw }),
            HandleState::Released => Err(RtenkitError::ClosedResource(K::NAME)),
        }
    }

    /// Destroys the foreign handle. Later calls are no-ops.
    pub(crate) fn release(&mut self) {
        if let HandleState::Live(raw) = mem::replace(&mut self.state, HandleState::Released) {
            // SAFETY: `raw` came from the constructor of this ABI and the state
            // swap above guarantees it is destroyed only here.
            unsafe { bridge::destroy::<K>(&self.abi, raw) };
            debug!("{} handle released", K::NAME);
        }
    }
}

impl<K: HandleKind> Drop for ForeignHandle<K> {
    fn drop(&mut self) {
        if matches!(self.state, HandleState::Live(_)) {
            debug!("{} handle still live at drop, releasing", K::NAME);
            self.release();
        }
    }
}

/// A handle known to be live for the duration of the borrow.
pub(crate) struct Live<'h, K: HandleKind> {
    abi: &'h ForeignAbi,
    raw: NonNull<K::Raw>,
}

impl<K: HandleKind> Live<'_, K> {
    pub(crate) fn abi(&self) -> &ForeignAbi {
        self.abi
    }

    pub(crate) fn as_ptr(&self) -> *mut K::Raw {
        self.raw.as_ptr()
    }
}
