//! The foreign C ABI the facades are written against.
//!
//! A [`ForeignAbi`] is a table of `extern "C"` entry points. The facades never
//! name a foreign symbol directly; they call through the table copied into each
//! handle, which keeps the provider (in-process, prebuilt library, or a test
//! double) a construction-time choice.

use std::marker::{PhantomData, PhantomPinned};

/// Opaque foreign tokenizer state.
#[repr(C)]
pub struct RawTokenizer {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Opaque foreign embedding model state.
#[repr(C)]
pub struct RawEmbeddings {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Builds a handle from `data_len` bytes at `data_ptr`. Null signals failure.
pub type ConstructFn<R> = unsafe extern "C" fn(data_ptr: *const u8, data_len: usize) -> *mut R;

/// Destroys a handle. Must accept null.
pub type DestroyFn<R> = unsafe extern "C" fn(ptr: *mut R);

/// Encodes UTF-8 text into a foreign-allocated `u32` buffer. Returns 0 on success.
pub type EncodeFn = unsafe extern "C" fn(
    ptr: *mut RawTokenizer,
    text_ptr: *const u8,
    text_len: usize,
    out_tokens_ptr: *mut *mut u32,
    out_len_ptr: *mut usize,
) -> i32;

/// Decodes token ids into a foreign-allocated byte buffer. Returns 0 on success.
pub type DecodeFn = unsafe extern "C" fn(
    ptr: *mut RawTokenizer,
    tokens_ptr: *const u32,
    tokens_len: usize,
    out_ptr: *mut *mut u8,
    out_len_ptr: *mut usize,
) -> i32;

/// Embeds token ids into a foreign-allocated `count × dim` float buffer.
/// Returns 0 on success.
pub type EmbedFn = unsafe extern "C" fn(
    ptr: *mut RawEmbeddings,
    ids_ptr: *const i32,
    len: usize,
    out_ptr: *mut *mut f32,
    out_count_ptr: *mut usize,
    out_dim_ptr: *mut usize,
) -> i32;

/// Releases a byte-addressed buffer (bytes or `u32` ids); `size` is in bytes.
pub type DeallocFn = unsafe extern "C" fn(ptr: *mut u8, size: usize);

/// Releases a float buffer; `len` is an element count.
pub type DeallocF32Fn = unsafe extern "C" fn(ptr: *mut f32, len: usize);

/// Entry points of one foreign tokenizer/embedding provider.
///
/// Every buffer returned by `tokenizer_encode` or `tokenizer_decode` must go
/// back through `dealloc`, every buffer returned by `embeddings_embed` through
/// `dealloc_f32`. Nothing in the buffers themselves says which is which, so
/// the pairing is fixed at the call site.
#[derive(Debug, Clone, Copy)]
pub struct ForeignAbi {
    pub tokenizer_new: ConstructFn<RawTokenizer>,
    pub tokenizer_free: DestroyFn<RawTokenizer>,
    pub tokenizer_encode: EncodeFn,
    pub tokenizer_decode: DecodeFn,
    pub embeddings_new: ConstructFn<RawEmbeddings>,
    pub embeddings_free: DestroyFn<RawEmbeddings>,
    pub embeddings_embed: EmbedFn,
    pub dealloc: DeallocFn,
    pub dealloc_f32: DeallocF32Fn,
}

impl ForeignAbi {
    /// The in-process provider compiled into this crate.
    #[cfg(feature = "native")]
    pub fn native() -> Self {
        use crate::native;
        Self {
            tokenizer_new: native::rtenkit_tokenizer_new,
            tokenizer_free: native::rtenkit_tokenizer_free,
            tokenizer_encode: native::rtenkit_tokenizer_encode,
            tokenizer_decode: native::rtenkit_tokenizer_decode,
            embeddings_new: native::rtenkit_embeddings_new,
            embeddings_free: native::rtenkit_embeddings_free,
            embeddings_embed: native::rtenkit_embeddings_embed,
            dealloc: native::rtenkit_dealloc,
            dealloc_f32: native::rtenkit_dealloc_f32,
        }
    }

    /// The provider resolved at link time from a prebuilt `rtenkit` library.
    #[cfg(feature = "linked")]
    pub fn linked() -> Self {
        Self {
            tokenizer_new: sys::rtenkit_tokenizer_new,
            tokenizer_free: sys::rtenkit_tokenizer_free,
            tokenizer_encode: sys::rtenkit_tokenizer_encode,
            tokenizer_decode: sys::rtenkit_tokenizer_decode,
            embeddings_new: sys::rtenkit_embeddings_new,
            embeddings_free: sys::rtenkit_embeddings_free,
            embeddings_embed: sys::rtenkit_embeddings_embed,
            dealloc: sys::rtenkit_dealloc,
            dealloc_f32: sys::rtenkit_dealloc_f32,
        }
    }
}

#[cfg(feature = "native")]
impl Default for ForeignAbi {
    fn default() -> Self {
        Self::native()
    }
}

#[cfg(all(feature = "linked", not(feature = "native")))]
impl Default for ForeignAbi {
    fn default() -> Self {
        Self::linked()
    }
}

#[cfg(feature = "linked")]
mod sys {
    use super::{RawEmbeddings, RawTokenizer};

    extern "C" {
        pub fn rtenkit_tokenizer_new(data_ptr: *const u8, data_len: usize) -> *mut RawTokenizer;
        pub fn rtenkit_tokenizer_free(ptr: *mut RawTokenizer);
        pub fn rtenkit_tokenizer_encode(
            ptr: *mut RawTokenizer,
            text_ptr: *const u8,
            text_len: usize,
            out_tokens_ptr: *mut *mut u32,
            out_len_ptr: *mut usize,
        ) -> i32;
        pub fn rtenkit_tokenizer_decode(
            ptr: *mut RawTokenizer,
            tokens_ptr: *const u32,
            tokens_len: usize,
            out_ptr: *mut *mut u8,
            out_len_ptr: *mut usize,
        ) -> i32;
        pub fn rtenkit_embeddings_new(data_ptr: *const u8, data_len: usize) -> *mut RawEmbeddings;
        pub fn rtenkit_embeddings_free(ptr: *mut RawEmbeddings);
        pub fn rtenkit_embeddings_embed(
            ptr: *mut RawEmbeddings,
            ids_ptr: *const i32,
            len: usize,
            out_ptr: *mut *mut f32,
            out_count_ptr: *mut usize,
            out_dim_ptr: *mut usize,
        ) -> i32;
        pub fn rtenkit_dealloc(ptr: *mut u8, size: usize);
        pub fn rtenkit_dealloc_f32(ptr: *mut f32, len: usize);
    }
}
