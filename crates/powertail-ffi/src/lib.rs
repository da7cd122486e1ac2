//! C ABI wrapper for the powertail streaming filter.
//!
//! Exposes a small set of functions to create/destroy a filter, process
//! f64 blocks, retune the decay exponent, and inspect or clear the
//! carried overlap tail.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`.
//! - Opaque handle type: `PowertailFilter` (heap-allocated; you own/delete it).
//! - Buffer lengths are passed explicitly and re-checked on every call;
//!   a mismatch returns an error code and leaves the stream untouched.
//!
//! Threading
//! - One handle is NOT thread-safe; drive it from one thread at a time.
//!   Distinct handles are fully independent.

use lib_powertail::StreamConvolver;

/// Call completed.
pub const POWERTAIL_OK: i32 = 0;
/// A required pointer was null.
pub const POWERTAIL_ERR_NULL: i32 = -1;
/// Buffer length does not match the filter's block length.
pub const POWERTAIL_ERR_LENGTH: i32 = -2;

/// Opaque filter wrapper we hand to C.
#[repr(C)]
pub struct PowertailFilter {
    inner: StreamConvolver,
}

// --- Creation / destruction -------------------------------------------------------

/// Create a filter for `block_len`-sample blocks with decay exponent `decay`.
/// Returns a non-null handle on success, or null if `block_len` is zero.
#[no_mangle]
pub extern "C" fn powertail_create(block_len: u32, decay: f64) -> *mut PowertailFilter {
    match StreamConvolver::new(block_len as usize, decay) {
        Ok(inner) => Box::into_raw(Box::new(PowertailFilter { inner })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Destroy a filter previously returned by `powertail_create`.
/// Safe to call with null.
#[no_mangle]
pub extern "C" fn powertail_destroy(filter: *mut PowertailFilter) {
    if !filter.is_null() {
        unsafe {
            drop(Box::from_raw(filter));
        }
    }
}

// --- Processing --------------------------------------------------------------------

/// Filter one block of `len` samples from `input` into `output`.
///
/// `len` must equal the block length the filter was created with; both
/// buffers must hold at least `len` f64 values. On any error the stream
/// state is untouched.
#[no_mangle]
pub extern "C" fn powertail_process(
    filter: *mut PowertailFilter,
    input: *const f64,
    output: *mut f64,
    len: usize,
) -> i32 {
    if filter.is_null() || input.is_null() || output.is_null() {
        return POWERTAIL_ERR_NULL;
    }
    let f = unsafe { &mut *filter };
    let input = unsafe { std::slice::from_raw_parts(input, len) };
    let output = unsafe { std::slice::from_raw_parts_mut(output, len) };

    match f.inner.process(input, output) {
        Ok(()) => POWERTAIL_OK,
        Err(_) => POWERTAIL_ERR_LENGTH,
    }
}

/// Update the decay exponent on the fly.
///
/// Setting the current value again is a no-op; the carried tail survives
/// the change either way.
#[no_mangle]
pub extern "C" fn powertail_set_decay(filter: *mut PowertailFilter, decay: f64) {
    if filter.is_null() {
        return;
    }
    let f = unsafe { &mut *filter };
    f.inner.set_decay(decay);
}

// --- Tail inspection ----------------------------------------------------------------

/// Borrow the carried tail buffer (block-length f64 values).
///
/// The pointer stays valid until the next `powertail_process`,
/// `powertail_reset`, or `powertail_destroy` call on this handle.
/// Returns null for a null handle.
#[no_mangle]
pub extern "C" fn powertail_overflow(filter: *const PowertailFilter) -> *const f64 {
    if filter.is_null() {
        return std::ptr::null();
    }
    let f = unsafe { &*filter };
    f.inner.overflow().as_ptr()
}

/// Block length of the filter (also the length of the overflow buffer).
/// Returns 0 for a null handle.
#[no_mangle]
pub extern "C" fn powertail_block_len(filter: *const PowertailFilter) -> usize {
    if filter.is_null() {
        return 0;
    }
    let f = unsafe { &*filter };
    f.inner.block_len()
}

/// Zero the carried tail, as if no blocks had been processed.
#[no_mangle]
pub extern "C" fn powertail_reset(filter: *mut PowertailFilter) {
    if filter.is_null() {
        return;
    }
    let f = unsafe { &mut *filter };
    f.inner.reset();
}
