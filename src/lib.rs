//! First-hit coverage tracing
//!
//! Mark interesting program points by hand and get one `COV: <id>` line on
//! stdout the first time each one runs:
//!
//! ```no_run
//! use covtrace::{covpoint, covpoint_assert};
//!
//! fn parse(input: &str) -> Option<u32> {
//!     if covpoint!("parse_empty", input.is_empty()) {
//!         return None;
//!     }
//!     match input.parse() {
//!         Ok(n) => Some(n),
//!         Err(_) if input.len() > 64 => covpoint_assert!("parse_huge"),
//!         Err(_) => None,
//!     }
//! }
//! ```
//!
//! A `covfilter.txt` in the working directory restricts which points print.

pub mod config;
pub mod emitter;
pub mod ffi;
pub mod filter;
pub mod report;

pub use emitter::{Emitter, observe, observe_assert, observe_int, reset, set_filter_path, unreachable_point};
pub use filter::{DEFAULT_FILTER_FILE, Filter, FilterMode};
pub use report::{CoverageReport, TraceLog};

/// Observe a point on the process-wide emitter
///
/// `covpoint!(id)` evaluates to `true`; `covpoint!(id, cond)` evaluates to `cond`.
#[macro_export]
macro_rules! covpoint {
    ($id:expr) => {
        $crate::emitter::observe($id, true)
    };
    ($id:expr, $cond:expr) => {
        $crate::emitter::observe($id, $cond)
    };
}

/// Observe a point that must never run, then abort
#[macro_export]
macro_rules! covpoint_assert {
    ($id:expr) => {
        $crate::emitter::observe_assert($id)
    };
}
