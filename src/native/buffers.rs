//! Allocation of the buffers handed across the C ABI.
//!
//! Generic buffers (bytes and `u32` ids) share one layout rule, `size` bytes
//! at [`GENERIC_ALIGN`], so `rtenkit_dealloc(ptr, size)` can rebuild the layout
//! from the byte size alone. Float buffers are boxed `[f32]` slices.

use std::alloc::{self, Layout};
use std::mem;
use std::ptr;

use bytemuck::Pod;

use super::{NativeError, NativeResult};

pub(super) const GENERIC_ALIGN: usize = 8;

fn generic_layout(size: usize) -> NativeResult<Layout> {
    Layout::from_size_align(size, GENERIC_ALIGN).map_err(|_| NativeError::Allocation(size))
}

pub(super) fn alloc_generic(size: usize) -> NativeResult<*mut u8> {
    if size == 0 {
        return Ok(ptr::null_mut());
    }
    let layout = generic_layout(size)?;
    // SAFETY: layout has a non-zero size.
    let ptr = unsafe { alloc::alloc(layout) };
    if ptr.is_null() {
        return Err(NativeError::Allocation(size));
    }
    Ok(ptr)
}

/// Copies `items` into a generic buffer. Empty input yields `(null, 0)`.
pub(super) fn export_pod<T: Pod>(items: Vec<T>) -> NativeResult<(*mut T, usize)> {
    debug_assert!(mem::align_of::<T>() <= GENERIC_ALIGN);
    if items.is_empty() {
        return Ok((ptr::null_mut(), 0));
    }
    let bytes: &[u8] = bytemuck::cast_slice(items.as_slice());
    let ptr = alloc_generic(bytes.len())?;
    // SAFETY: `ptr` was just allocated with room for `bytes.len()` bytes.
    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len()) };
    Ok((ptr.cast::<T>(), items.len()))
}

/// # Safety
/// `ptr` must be null or come from [`alloc_generic`]/[`export_pod`] with a
/// total of `size` bytes, and must not be released twice.
pub(super) unsafe fn release_generic(ptr: *mut u8, size: usize) {
    if ptr.is_null() || size == 0 {
        return;
    }
    match generic_layout(size) {
        Ok(layout) => alloc::dealloc(ptr, layout),
        Err(e) => log::error!("rtenkit_dealloc with impossible size, buffer leaked: {}", e),
    }
}

/// Hands out a float buffer. Empty input yields `(null, 0)`.
pub(super) fn export_floats(values: Vec<f32>) -> (*mut f32, usize) {
    if values.is_empty() {
        return (ptr::null_mut(), 0);
    }
    let len = values.len();
    (Box::into_raw(values.into_boxed_slice()).cast::<f32>(), len)
}

/// # Safety
/// `ptr` must be null or come from [`export_floats`] with the same `len`, and
/// must not be released twice.
pub(super) unsafe fn release_floats(ptr: *mut f32, len: usize) {
    if ptr.is_null() {
        return;
    }
    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len)));
}
