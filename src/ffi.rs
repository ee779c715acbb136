//! C ABI for programs that mark points from C or C++
//!
//! ```c
//! extern int covpoint(const char *msg, int cond);
//! extern void covpoint_assert(const char *msg);
//!
//! if (covpoint("parse_error", len == 0)) { ... }
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_int};

use crate::emitter;

unsafe fn point_name<'a>(msg: *const c_char) -> Option<Cow<'a, str>> {
    if msg.is_null() {
        return None;
    }
    // SAFETY: caller guarantees a NUL-terminated string that outlives the call
    Some(unsafe { CStr::from_ptr(msg) }.to_string_lossy())
}

/// Observe `msg`; returns 1 if `cond == 1`, otherwise 0
///
/// # Safety
///
/// `msg` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn covpoint(msg: *const c_char, cond: c_int) -> c_int {
    match unsafe { point_name(msg) } {
        Some(id) => emitter::observe_int(&id, cond),
        None => c_int::from(cond == 1),
    }
}

/// Observe `msg`, then abort
///
/// # Safety
///
/// `msg` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn covpoint_assert(msg: *const c_char) -> ! {
    match unsafe { point_name(msg) } {
        Some(id) => emitter::observe_assert(&id),
        None => emitter::unreachable_point("<null>"),
    }
}
