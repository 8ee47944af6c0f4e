//! Isolation of user-supplied closures.
//!
//! A panicking callback is logged and swallowed so that queue advancement
//! and completion bookkeeping always continue.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Runs `f`, logging and swallowing a panic. Returns false if it panicked.
pub(crate) fn guarded<F: FnOnce()>(context: &'static str, f: F) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!(
                context,
                panic = %panic_message(payload.as_ref()),
                "user callback panicked"
            );
            false
        }
    }
}

/// Runs `f`, converting a panic into `Err(message)`.
pub(crate) fn catch<R, F: FnOnce() -> R>(f: F) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
