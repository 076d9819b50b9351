//! Process-wide panic policy.
//!
//! A panic anywhere means the runtime's invariants can no longer be trusted,
//! so the process logs the panic with a backtrace and aborts instead of
//! unwinding into a half-updated tree.

use std::backtrace::Backtrace;

use tracing::error;

/// Install the abort-on-panic hook.
pub fn install() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(%location, %message, %backtrace, "panic, aborting");
        eprintln!("panic at {location}: {message}\n{backtrace}");
        std::process::abort();
    }));
}
