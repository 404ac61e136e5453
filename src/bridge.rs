// src/bridge.rs
//! Buffer marshaling across the foreign boundary.
//!
//! This is the only module that hands pointers to the foreign side or reads
//! memory the foreign side allocated. Outbound data is lent as a pointer/length
//! view for the duration of one call. Inbound buffers are adopted by a guard
//! that copies them into a `Vec` and then returns them to the foreign
//! allocator exactly once, through the deallocation primitive fixed by the
//! element type.

use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::slice;

use log::error;
use thiserror::Error;

use crate::abi::ForeignAbi;
use crate::handle::{EmbeddingsKind, HandleKind, Live, TokenizerKind};

/// A foreign call completed but its result cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum BoundaryFault {
    #[error("foreign call returned status {0}")]
    Status(i32),
    #[error("foreign call reported {0} elements in a null buffer")]
    NullBuffer(usize),
    /// The reported shape has no representable size, so the foreign buffer
    /// cannot be handed back and is leaked.
    #[error("foreign output shape {count}x{dimension} overflows")]
    Overflow { count: usize, dimension: usize },
}

/// Flat embedding output as the foreign side shaped it.
#[derive(Debug)]
pub(crate) struct ForeignMatrix {
    pub(crate) data: Vec<f32>,
    pub(crate) count: usize,
    pub(crate) dimension: usize,
}

/// Caller-owned memory lent to a single foreign call.
struct Outbound<'a, T> {
    ptr: *const T,
    len: usize,
    _borrow: PhantomData<&'a [T]>,
}

impl<'a, T> Outbound<'a, T> {
    fn new(items: &'a [T]) -> Self {
        Self {
            ptr: items.as_ptr(),
            len: items.len(),
            _borrow: PhantomData,
        }
    }
}

/// Element types the foreign side hands back, each tied to its deallocator.
trait InboundElement: Copy {
    /// # Safety
    /// `ptr` must be a live buffer of `len` elements allocated by `abi`.
    unsafe fn reclaim(abi: &ForeignAbi, ptr: *mut Self, len: usize);
}

impl InboundElement for u8 {
    unsafe fn reclaim(abi: &ForeignAbi, ptr: *mut u8, len: usize) {
        (abi.dealloc)(ptr, len)
    }
}

impl InboundElement for u32 {
    unsafe fn reclaim(abi: &ForeignAbi, ptr: *mut u32, len: usize) {
        // The generic deallocator takes a byte size.
        (abi.dealloc)(ptr.cast::<u8>(), len * mem::size_of::<u32>())
    }
}

impl InboundElement for f32 {
    unsafe fn reclaim(abi: &ForeignAbi, ptr: *mut f32, len: usize) {
        (abi.dealloc_f32)(ptr, len)
    }
}

/// A foreign-allocated buffer, reclaimed when dropped.
struct ForeignBuffer<'a, T: InboundElement> {
    abi: &'a ForeignAbi,
    ptr: *mut T,
    len: usize,
}

impl<'a, T: InboundElement> ForeignBuffer<'a, T> {
    /// # Safety
    /// `ptr` and `len` must come from a call into `abi` that just succeeded and
    /// transferred the buffer to the caller. Null means nothing was allocated.
    unsafe fn adopt(abi: &'a ForeignAbi, ptr: *mut T, len: usize) -> Self {
        Self { abi, ptr, len }
    }

    /// Copies the contents out, then reclaims the buffer.
    fn into_vec(self) -> Result<Vec<T>, BoundaryFault> {
        if self.ptr.is_null() {
            return if self.len == 0 {
                Ok(Vec::new())
            } else {
                Err(BoundaryFault::NullBuffer(self.len))
            };
        }
        let items = if self.len == 0 {
            Vec::new()
        } else {
            // SAFETY: non-null buffer of `len` elements owned by this guard and
            // not yet reclaimed.
            unsafe { slice::from_raw_parts(self.ptr, self.len) }.to_vec()
        };
        drop(self);
        Ok(items)
    }
}

impl<T: InboundElement> Drop for ForeignBuffer<'_, T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            let ptr = mem::replace(&mut self.ptr, ptr::null_mut());
            // SAFETY: the buffer was adopted from `abi` and is reclaimed once.
            unsafe { T::reclaim(self.abi, ptr, self.len) };
        }
    }
}

pub(crate) fn construct<K: HandleKind>(abi: &ForeignAbi, blob: &[u8]) -> Option<NonNull<K::Raw>> {
    let data = Outbound::new(blob);
    // SAFETY: `data` stays borrowed for the whole call; the constructor copies
    // what it keeps.
    let raw = unsafe { (K::constructor(abi))(data.ptr, data.len) };
    NonNull::new(raw)
}

/// # Safety
/// `raw` must have been produced by `construct::<K>` with the same `abi` and
/// not destroyed before.
pub(crate) unsafe fn destroy<K: HandleKind>(abi: &ForeignAbi, raw: NonNull<K::Raw>) {
    (K::destructor(abi))(raw.as_ptr())
}

pub(crate) fn encode(handle: Live<'_, TokenizerKind>, text: &[u8]) -> Result<Vec<u32>, BoundaryFault> {
    let input = Outbound::new(text);
    let mut out_ptr: *mut u32 = ptr::null_mut();
    let mut out_len: usize = 0;
    // SAFETY: live handle, input lent for the call, out-params are locals.
    let status = unsafe {
        (handle.abi().tokenizer_encode)(handle.as_ptr(), input.ptr, input.len, &mut out_ptr, &mut out_len)
    };
    if status != 0 {
        return Err(BoundaryFault::Status(status));
    }
    // SAFETY: a zero status transfers the id buffer to us.
    unsafe { ForeignBuffer::adopt(handle.abi(), out_ptr, out_len) }.into_vec()
}

pub(crate) fn decode(handle: Live<'_, TokenizerKind>, tokens: &[u32]) -> Result<Vec<u8>, BoundaryFault> {
    let input = Outbound::new(tokens);
    let mut out_ptr: *mut u8 = ptr::null_mut();
    let mut out_len: usize = 0;
    // SAFETY: live handle, input lent for the call, out-params are locals.
    let status = unsafe {
        (handle.abi().tokenizer_decode)(handle.as_ptr(), input.ptr, input.len, &mut out_ptr, &mut out_len)
    };
    if status != 0 {
        return Err(BoundaryFault::Status(status));
    }
    // SAFETY: a zero status transfers the byte buffer to us.
    unsafe { ForeignBuffer::adopt(handle.abi(), out_ptr, out_len) }.into_vec()
}

/// Token ids cross as `i32`; ids above `i32::MAX` keep their bit pattern.
pub(crate) fn embed(handle: Live<'_, EmbeddingsKind>, tokens: &[u32]) -> Result<ForeignMatrix, BoundaryFault> {
    let ids: &[i32] = bytemuck::cast_slice(tokens);
    let input = Outbound::new(ids);
    let mut out_ptr: *mut f32 = ptr::null_mut();
    let mut count: usize = 0;
    let mut dimension: usize = 0;
    // SAFETY: live handle, input lent for the call, out-params are locals.
    let status = unsafe {
        (handle.abi().embeddings_embed)(
            handle.as_ptr(),
            input.ptr,
            input.len,
            &mut out_ptr,
            &mut count,
            &mut dimension,
        )
    };
    if status != 0 {
        return Err(BoundaryFault::Status(status));
    }
    let Some(total) = count.checked_mul(dimension) else {
        // The allocation size is unknowable, so the buffer cannot be returned.
        error!("foreign embedding output {}x{} overflows, buffer leaked", count, dimension);
        return Err(BoundaryFault::Overflow { count, dimension });
    };
    // SAFETY: a zero status transfers the `count * dimension` float buffer to us.
    let data = unsafe { ForeignBuffer::adopt(handle.abi(), out_ptr, total) }.into_vec()?;
    Ok(ForeignMatrix { data, count, dimension })
}
