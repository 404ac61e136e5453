//! Test doubles for the foreign ABI.
//!
//! The mock provider is byte-level: every UTF-8 byte encodes to one id and
//! decodes back, and the mock model maps id `k` to `[k, k / 2, -k]`. Every
//! handle and buffer it hands out is recorded in a thread-local ledger so tests
//! can check that each is released exactly once, through the right primitive.

use std::ptr;
use std::slice;

use crate::abi::{ForeignAbi, RawEmbeddings, RawTokenizer};

pub(crate) const TOKENIZER_BLOB: &[u8] = b"mock-tokenizer";
pub(crate) const EMBEDDINGS_BLOB: &[u8] = b"mock-embeddings";
pub(crate) const MOCK_DIMENSION: usize = 3;
/// Text containing this marker makes the mock encoder fail.
pub(crate) const FAIL_MARKER: &str = "<fail>";

const ENCODE_FAILURE: i32 = 3;
const DECODE_FAILURE: i32 = 4;
const EMBED_FAILURE: i32 = 5;
const DEAD_HANDLE: i32 = -9;

pub(crate) fn mock_abi() -> ForeignAbi {
    ForeignAbi {
        tokenizer_new: mock_tokenizer_new,
        tokenizer_free: mock_tokenizer_free,
        tokenizer_encode: mock_tokenizer_encode,
        tokenizer_decode: mock_tokenizer_decode,
        embeddings_new: mock_embeddings_new,
        embeddings_free: mock_embeddings_free,
        embeddings_embed: mock_embeddings_embed,
        dealloc: mock_dealloc,
        dealloc_f32: mock_dealloc_f32,
    }
}

/// Row the mock model produces for token `id`.
pub(crate) fn mock_row(id: u32) -> [f32; MOCK_DIMENSION] {
    let v = id as f32;
    [v, v * 0.5, -v]
}

pub(crate) mod ledger {
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum BufferKind {
        Bytes,
        Ids,
        Floats,
    }

    #[derive(Debug, Clone, Copy)]
    pub(crate) struct Allocation {
        pub(crate) kind: BufferKind,
        /// Length reported across the boundary.
        pub(crate) reported: usize,
        /// Length of the backing allocation (at least 1).
        pub(crate) actual: usize,
    }

    #[derive(Default)]
    struct Ledger {
        handles: HashMap<usize, &'static str>,
        buffers: HashMap<usize, Allocation>,
        boundary_calls: usize,
        constructed: usize,
        destroyed: usize,
        violations: Vec<String>,
    }

    thread_local! {
        static LEDGER: RefCell<Ledger> = RefCell::new(Ledger::default());
    }

    #[derive(Debug, Clone)]
    pub(crate) struct Snapshot {
        pub(crate) boundary_calls: usize,
        pub(crate) live_handles: usize,
        pub(crate) live_buffers: usize,
        pub(crate) constructed: usize,
        pub(crate) destroyed: usize,
        pub(crate) violations: Vec<String>,
    }

    /// Forgets everything recorded on this thread.
    pub(crate) fn reset() {
        LEDGER.with(|l| *l.borrow_mut() = Ledger::default());
    }

    pub(crate) fn snapshot() -> Snapshot {
        LEDGER.with(|l| {
            let l = l.borrow();
            Snapshot {
                boundary_calls: l.boundary_calls,
                live_handles: l.handles.len(),
                live_buffers: l.buffers.len(),
                constructed: l.constructed,
                destroyed: l.destroyed,
                violations: l.violations.clone(),
            }
        })
    }

    pub(super) fn record_call() {
        LEDGER.with(|l| l.borrow_mut().boundary_calls += 1);
    }

    pub(super) fn violation(message: String) {
        LEDGER.with(|l| l.borrow_mut().violations.push(message));
    }

    pub(super) fn track_handle(addr: usize, kind: &'static str) {
        LEDGER.with(|l| {
            let mut l = l.borrow_mut();
            l.constructed += 1;
            l.handles.insert(addr, kind);
        });
    }

    pub(super) fn is_live_handle(addr: usize, kind: &'static str) -> bool {
        LEDGER.with(|l| l.borrow().handles.get(&addr) == Some(&kind))
    }

    /// Returns true when `addr` was a live handle of `kind` and is now forgotten.
    pub(super) fn forget_handle(addr: usize, kind: &'static str) -> bool {
        if !is_live_handle(addr, kind) {
            violation(format!("destroy of unknown {} handle {:#x}", kind, addr));
            return false;
        }
        LEDGER.with(|l| {
            let mut l = l.borrow_mut();
            l.handles.remove(&addr);
            l.destroyed += 1;
        });
        true
    }

    pub(super) fn track_buffer(addr: usize, allocation: Allocation) {
        LEDGER.with(|l| l.borrow_mut().buffers.insert(addr, allocation));
    }

    pub(super) fn take_buffer(addr: usize) -> Option<Allocation> {
        LEDGER.with(|l| l.borrow_mut().buffers.remove(&addr))
    }
}

use ledger::{Allocation, BufferKind};

struct MockTokenizer;

struct MockEmbeddings {
    dimension: usize,
}

/// Hands `items` out as a tracked foreign buffer. Empty outputs still get a
/// real allocation so the zero-length release path is exercised.
fn leak_slice<T: Copy + Default>(mut items: Vec<T>, kind: BufferKind) -> (*mut T, usize) {
    let reported = items.len();
    if items.is_empty() {
        items.push(T::default());
    }
    let actual = items.len();
    let ptr = Box::into_raw(items.into_boxed_slice()).cast::<T>();
    ledger::track_buffer(ptr as usize, Allocation { kind, reported, actual });
    (ptr, reported)
}

unsafe fn free_slice<T>(ptr: *mut T, actual: usize) {
    drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, actual)));
}

/// A tracked byte buffer, as if returned by a foreign call.
pub(crate) fn track_bytes(bytes: Vec<u8>) -> (*mut u8, usize) {
    leak_slice(bytes, BufferKind::Bytes)
}

unsafe extern "C" fn mock_tokenizer_new(data_ptr: *const u8, data_len: usize) -> *mut RawTokenizer {
    ledger::record_call();
    if data_ptr.is_null() || slice::from_raw_parts(data_ptr, data_len) != TOKENIZER_BLOB {
        return ptr::null_mut();
    }
    let raw = Box::into_raw(Box::new(MockTokenizer));
    ledger::track_handle(raw as usize, "tokenizer");
    raw.cast()
}

unsafe extern "C" fn mock_tokenizer_free(ptr: *mut RawTokenizer) {
    if ptr.is_null() {
        return;
    }
    ledger::record_call();
    if ledger::forget_handle(ptr as usize, "tokenizer") {
        drop(Box::from_raw(ptr.cast::<MockTokenizer>()));
    }
}

unsafe extern "C" fn mock_tokenizer_encode(
    ptr: *mut RawTokenizer,
    text_ptr: *const u8,
    text_len: usize,
    out_tokens_ptr: *mut *mut u32,
    out_len_ptr: *mut usize,
) -> i32 {
    ledger::record_call();
    if !ledger::is_live_handle(ptr as usize, "tokenizer") {
        ledger::violation("encode on a dead tokenizer handle".to_string());
        return DEAD_HANDLE;
    }
    let text = slice::from_raw_parts(text_ptr, text_len);
    let marker = FAIL_MARKER.as_bytes();
    if text.windows(marker.len()).any(|w| w == marker) {
        return ENCODE_FAILURE;
    }
    let ids: Vec<u32> = text.iter().map(|&b| u32::from(b)).collect();
    let (out, len) = leak_slice(ids, BufferKind::Ids);
    *out_tokens_ptr = out;
    *out_len_ptr = len;
    0
}

unsafe extern "C" fn mock_tokenizer_decode(
    ptr: *mut RawTokenizer,
    tokens_ptr: *const u32,
    tokens_len: usize,
    out_ptr: *mut *mut u8,
    out_len_ptr: *mut usize,
) -> i32 {
    ledger::record_call();
    if !ledger::is_live_handle(ptr as usize, "tokenizer") {
        ledger::violation("decode on a dead tokenizer handle".to_string());
        return DEAD_HANDLE;
    }
    let tokens = slice::from_raw_parts(tokens_ptr, tokens_len);
    let mut bytes = Vec::with_capacity(tokens.len());
    for &id in tokens {
        match u8::try_from(id) {
            Ok(b) => bytes.push(b),
            Err(_) => return DECODE_FAILURE,
        }
    }
    let (out, len) = leak_slice(bytes, BufferKind::Bytes);
    *out_ptr = out;
    *out_len_ptr = len;
    0
}

unsafe extern "C" fn mock_embeddings_new(data_ptr: *const u8, data_len: usize) -> *mut RawEmbeddings {
    ledger::record_call();
    if data_ptr.is_null() || slice::from_raw_parts(data_ptr, data_len) != EMBEDDINGS_BLOB {
        return ptr::null_mut();
    }
    let raw = Box::into_raw(Box::new(MockEmbeddings {
        dimension: MOCK_DIMENSION,
    }));
    ledger::track_handle(raw as usize, "embeddings");
    raw.cast()
}

unsafe extern "C" fn mock_embeddings_free(ptr: *mut RawEmbeddings) {
    if ptr.is_null() {
        return;
    }
    ledger::record_call();
    if ledger::forget_handle(ptr as usize, "embeddings") {
        drop(Box::from_raw(ptr.cast::<MockEmbeddings>()));
    }
}

unsafe extern "C" fn mock_embeddings_embed(
    ptr: *mut RawEmbeddings,
    ids_ptr: *const i32,
    len: usize,
    out_ptr: *mut *mut f32,
    out_count_ptr: *mut usize,
    out_dim_ptr: *mut usize,
) -> i32 {
    ledger::record_call();
    if !ledger::is_live_handle(ptr as usize, "embeddings") {
        ledger::violation("embed on a dead embeddings handle".to_string());
        return DEAD_HANDLE;
    }
    let model = &*ptr.cast::<MockEmbeddings>();
    let ids = slice::from_raw_parts(ids_ptr, len);
    let mut values = Vec::with_capacity(ids.len() * model.dimension);
    for &id in ids {
        let Ok(id) = u32::try_from(id) else {
            return EMBED_FAILURE;
        };
        values.extend_from_slice(&mock_row(id));
    }
    let (out, _) = leak_slice(values, BufferKind::Floats);
    *out_ptr = out;
    *out_count_ptr = ids.len();
    *out_dim_ptr = model.dimension;
    0
}

/// Reports `count = len, dimension = 0` with no buffer.
pub(crate) unsafe extern "C" fn zero_width_embed(
    _ptr: *mut RawEmbeddings,
    _ids_ptr: *const i32,
    len: usize,
    out_ptr: *mut *mut f32,
    out_count_ptr: *mut usize,
    out_dim_ptr: *mut usize,
) -> i32 {
    ledger::record_call();
    *out_ptr = ptr::null_mut();
    *out_count_ptr = len;
    *out_dim_ptr = 0;
    0
}

/// Returns one row fewer than there are ids, in a tracked float buffer.
pub(crate) unsafe extern "C" fn short_count_embed(
    _ptr: *mut RawEmbeddings,
    ids_ptr: *const i32,
    len: usize,
    out_ptr: *mut *mut f32,
    out_count_ptr: *mut usize,
    out_dim_ptr: *mut usize,
) -> i32 {
    ledger::record_call();
    let ids = slice::from_raw_parts(ids_ptr, len);
    let count = len.saturating_sub(1);
    let values: Vec<f32> = ids[..count].iter().flat_map(|&id| mock_row(id as u32)).collect();
    let (out, _) = leak_slice(values, BufferKind::Floats);
    *out_ptr = out;
    *out_count_ptr = count;
    *out_dim_ptr = MOCK_DIMENSION;
    0
}

/// Reports a shape whose element count overflows `usize`, with no buffer.
pub(crate) unsafe extern "C" fn overflowing_embed(
    _ptr: *mut RawEmbeddings,
    _ids_ptr: *const i32,
    _len: usize,
    out_ptr: *mut *mut f32,
    out_count_ptr: *mut usize,
    out_dim_ptr: *mut usize,
) -> i32 {
    ledger::record_call();
    *out_ptr = ptr::null_mut();
    *out_count_ptr = usize::MAX;
    *out_dim_ptr = 2;
    0
}

unsafe extern "C" fn mock_dealloc(ptr: *mut u8, size: usize) {
    if ptr.is_null() {
        return;
    }
    ledger::record_call();
    match ledger::take_buffer(ptr as usize) {
        Some(a) if a.kind == BufferKind::Bytes && size == a.reported => free_slice(ptr, a.actual),
        Some(a) if a.kind == BufferKind::Ids && size == a.reported * 4 => {
            free_slice(ptr.cast::<u32>(), a.actual)
        }
        // Mismatched buffers are leaked rather than freed with the wrong layout.
        Some(a) => ledger::violation(format!(
            "generic dealloc of {:?} buffer with size {} (reported {})",
            a.kind, size, a.reported
        )),
        None => ledger::violation(format!("generic dealloc of unknown pointer {:#x}", ptr as usize)),
    }
}

unsafe extern "C" fn mock_dealloc_f32(ptr: *mut f32, len: usize) {
    if ptr.is_null() {
        return;
    }
    ledger::record_call();
    match ledger::take_buffer(ptr as usize) {
        Some(a) if a.kind == BufferKind::Floats && len == a.reported => free_slice(ptr, a.actual),
        Some(a) => ledger::violation(format!(
            "float dealloc of {:?} buffer with len {} (reported {})",
            a.kind, len, a.reported
        )),
        None => ledger::violation(format!("float dealloc of unknown pointer {:#x}", ptr as usize)),
    }
}

/// Serialized artefacts for the native provider.
#[cfg(feature = "native")]
pub(crate) mod native {
    /// Word-level tokenizer over a five-word vocabulary.
    pub(crate) const TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "[UNK]": 0, "hello": 1, "world": 2, "rust": 3, "embeddings": 4 },
            "unk_token": "[UNK]"
        }
    }"#;

    pub(crate) const VOCAB_SIZE: usize = 5;
    pub(crate) const DIMENSION: usize = 4;

    /// Value stored at `[row, col]` of the fixture table.
    pub(crate) fn table_value(row: usize, col: usize) -> f32 {
        row as f32 * 10.0 + col as f32
    }

    /// A single-tensor safetensors file.
    pub(crate) fn safetensors_bytes(name: &str, dtype: &str, shape: &[usize], data: &[u8]) -> Vec<u8> {
        let shape = shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ");
        let header = format!(
            r#"{{"{}": {{"dtype": "{}", "shape": [{}], "data_offsets": [0, {}]}}}}"#,
            name,
            dtype,
            shape,
            data.len()
        );
        let mut bytes = Vec::with_capacity(8 + header.len() + data.len());
        bytes.extend_from_slice(&(header.len() as u64).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(data);
        bytes
    }

    /// The fixture model: a `VOCAB_SIZE x DIMENSION` table named `embeddings`.
    pub(crate) fn model_bytes() -> Vec<u8> {
        model_bytes_named("embeddings")
    }

    pub(crate) fn model_bytes_named(name: &str) -> Vec<u8> {
        let mut data = Vec::with_capacity(VOCAB_SIZE * DIMENSION * 4);
        for row in 0..VOCAB_SIZE {
            for col in 0..DIMENSION {
                data.extend_from_slice(&table_value(row, col).to_le_bytes());
            }
        }
        safetensors_bytes(name, "F32", &[VOCAB_SIZE, DIMENSION], &data)
    }
}
