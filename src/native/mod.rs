// src/native/mod.rs
//! In-process implementation of the `rtenkit_*` C ABI.
//!
//! The same functions back [`crate::ForeignAbi::native`] and are exported
//! unmangled from the `cdylib`/`staticlib` builds. Errors never cross the
//! boundary as values: they are logged and collapsed into [`STATUS_ERROR`] or
//! a null handle. Panics are caught before they reach the caller.

mod buffers;
mod embeddings;
mod tokenizer;

use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;

use log::{error, warn};
use thiserror::Error;

use crate::abi::{RawEmbeddings, RawTokenizer};

pub use embeddings::NativeEmbeddings;
pub use tokenizer::NativeTokenizer;

pub const STATUS_OK: i32 = 0;
pub const STATUS_ERROR: i32 = -1;

#[derive(Debug, Error)]
pub enum NativeError {
    #[error("null pointer passed for {0}")]
    NullPointer(&'static str),
    #[error("input text is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("safetensors error: {0}")]
    SafeTensors(String),
    #[error("no embedding table in model data: {0}")]
    MissingTable(String),
    #[error("embedding table has unsupported dtype {0}")]
    UnsupportedDtype(String),
    #[error("embedding table has shape {0:?}, expected [vocab, dimension]")]
    BadShape(Vec<usize>),
    #[error("token id {id} is outside the vocabulary of {vocab_size}")]
    TokenOutOfRange { id: i32, vocab_size: usize },
    #[error("cannot allocate {0} bytes")]
    Allocation(usize),
    #[error("panic in native component: {0}")]
    Panic(String),
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Runs `f`, turning a panic into [`NativeError::Panic`].
fn guarded<T>(op: &'static str, f: impl FnOnce() -> NativeResult<T>) -> NativeResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("{} panicked: {}", op, message);
            Err(NativeError::Panic(message))
        }
    }
}

fn status(op: &'static str, result: NativeResult<()>) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => {
            warn!("{} failed: {}", op, e);
            STATUS_ERROR
        }
    }
}

/// # Safety
/// `ptr` must be null or point to `len` readable elements.
unsafe fn input_slice<'a, T>(ptr: *const T, len: usize, what: &'static str) -> NativeResult<&'a [T]> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(NativeError::NullPointer(what));
    }
    Ok(slice::from_raw_parts(ptr, len))
}

fn check_out<T>(ptr: *mut T, what: &'static str) -> NativeResult<()> {
    if ptr.is_null() {
        Err(NativeError::NullPointer(what))
    } else {
        Ok(())
    }
}

/// Builds a tokenizer from `tokenizer.json` bytes. Returns null on failure.
///
/// # Safety
/// `data_ptr` must point to `data_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn rtenkit_tokenizer_new(data_ptr: *const u8, data_len: usize) -> *mut RawTokenizer {
    let result = guarded("rtenkit_tokenizer_new", || {
        let data = input_slice(data_ptr, data_len, "tokenizer data")?;
        NativeTokenizer::from_bytes(data)
    });
    match result {
        Ok(tokenizer) => Box::into_raw(Box::new(tokenizer)).cast(),
        Err(e) => {
            warn!("rtenkit_tokenizer_new failed: {}", e);
            ptr::null_mut()
        }
    }
}

/// # Safety
/// `ptr` must be null or a handle from [`rtenkit_tokenizer_new`] not yet freed.
#[no_mangle]
pub unsafe extern "C" fn rtenkit_tokenizer_free(ptr: *mut RawTokenizer) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr.cast::<NativeTokenizer>()));
    }
}

/// Encodes UTF-8 text. On success the ids are returned in a buffer to be
/// released with [`rtenkit_dealloc`] using a byte size of `len * 4`.
///
/// # Safety
/// `ptr` must be a live tokenizer handle; `text_ptr` must point to `text_len`
/// readable bytes; both out-pointers must be writable.
#[no_mangle]
pub unsafe extern "C" fn rtenkit_tokenizer_encode(
    ptr: *mut RawTokenizer,
    text_ptr: *const u8,
    text_len: usize,
    out_tokens_ptr: *mut *mut u32,
    out_len_ptr: *mut usize,
) -> i32 {
    let result = guarded("rtenkit_tokenizer_encode", || {
        let tokenizer = ptr.cast::<NativeTokenizer>().as_ref().ok_or(NativeError::NullPointer("tokenizer"))?;
        check_out(out_tokens_ptr, "output tokens")?;
        check_out(out_len_ptr, "output length")?;
        let text = std::str::from_utf8(input_slice(text_ptr, text_len, "text")?)?;
        let ids = tokenizer.encode(text)?;
        let (out, len) = buffers::export_pod(ids)?;
        *out_tokens_ptr = out;
        *out_len_ptr = len;
        Ok(())
    });
    status("rtenkit_tokenizer_encode", result)
}

/// Decodes token ids into UTF-8 bytes, released with [`rtenkit_dealloc`].
///
/// # Safety
/// `ptr` must be a live tokenizer handle; `tokens_ptr` must point to
/// `tokens_len` ids; both out-pointers must be writable.
#[no_mangle]
pub unsafe extern "C" fn rtenkit_tokenizer_decode(
    ptr: *mut RawTokenizer,
    tokens_ptr: *const u32,
    tokens_len: usize,
    out_ptr: *mut *mut u8,
    out_len_ptr: *mut usize,
) -> i32 {
    let result = guarded("rtenkit_tokenizer_decode", || {
        let tokenizer = ptr.cast::<NativeTokenizer>().as_ref().ok_or(NativeError::NullPointer("tokenizer"))?;
        check_out(out_ptr, "output bytes")?;
        check_out(out_len_ptr, "output length")?;
        let tokens = input_slice(tokens_ptr, tokens_len, "tokens")?;
        let text = tokenizer.decode(tokens)?;
        let (out, len) = buffers::export_pod(text.into_bytes())?;
        *out_ptr = out;
        *out_len_ptr = len;
        Ok(())
    });
    status("rtenkit_tokenizer_decode", result)
}

/// Builds an embedding table from safetensors bytes. Returns null on failure.
///
/// # Safety
/// `data_ptr` must point to `data_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn rtenkit_embeddings_new(data_ptr: *const u8, data_len: usize) -> *mut RawEmbeddings {
    let result = guarded("rtenkit_embeddings_new", || {
        let data = input_slice(data_ptr, data_len, "model data")?;
        NativeEmbeddings::from_bytes(data)
    });
    match result {
        Ok(model) => Box::into_raw(Box::new(model)).cast(),
        Err(e) => {
            warn!("rtenkit_embeddings_new failed: {}", e);
            ptr::null_mut()
        }
    }
}

/// # Safety
/// `ptr` must be null or a handle from [`rtenkit_embeddings_new`] not yet freed.
#[no_mangle]
pub unsafe extern "C" fn rtenkit_embeddings_free(ptr: *mut RawEmbeddings) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr.cast::<NativeEmbeddings>()));
    }
}

/// Gathers one row per id into a `count × dim` buffer, released with
/// [`rtenkit_dealloc_f32`] using `count * dim` as the length.
///
/// # Safety
/// `ptr` must be a live embeddings handle; `ids_ptr` must point to `len` ids;
/// all three out-pointers must be writable.
#[no_mangle]
pub unsafe extern "C" fn rtenkit_embeddings_embed(
    ptr: *mut RawEmbeddings,
    ids_ptr: *const i32,
    len: usize,
    out_ptr: *mut *mut f32,
    out_count_ptr: *mut usize,
    out_dim_ptr: *mut usize,
) -> i32 {
    let result = guarded("rtenkit_embeddings_embed", || {
        let model = ptr.cast::<NativeEmbeddings>().as_ref().ok_or(NativeError::NullPointer("embeddings"))?;
        check_out(out_ptr, "output values")?;
        check_out(out_count_ptr, "output count")?;
        check_out(out_dim_ptr, "output dimension")?;
        let ids = input_slice(ids_ptr, len, "ids")?;
        let values = model.embed(ids)?;
        let (out, _) = buffers::export_floats(values);
        *out_ptr = out;
        *out_count_ptr = ids.len();
        *out_dim_ptr = model.dimension();
        Ok(())
    });
    status("rtenkit_embeddings_embed", result)
}

/// Allocates `size` bytes that the caller may fill and later release with
/// [`rtenkit_dealloc`]. Returns null for a zero size or on failure.
#[no_mangle]
pub extern "C" fn rtenkit_alloc(size: usize) -> *mut u8 {
    match buffers::alloc_generic(size) {
        Ok(ptr) => ptr,
        Err(e) => {
            warn!("rtenkit_alloc failed: {}", e);
            ptr::null_mut()
        }
    }
}

/// Releases a byte or id buffer. `size` is in bytes.
///
/// # Safety
/// `ptr` must be null or a buffer this module handed out with that byte size.
#[no_mangle]
pub unsafe extern "C" fn rtenkit_dealloc(ptr: *mut u8, size: usize) {
    buffers::release_generic(ptr, size)
}

/// Releases a float buffer. `len` is an element count.
///
/// # Safety
/// `ptr` must be null or a float buffer this module handed out with that length.
#[no_mangle]
pub unsafe extern "C" fn rtenkit_dealloc_f32(ptr: *mut f32, len: usize) {
    buffers::release_floats(ptr, len)
}
