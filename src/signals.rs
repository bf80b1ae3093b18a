//! Interrupt/signal handling for graceful shutdown
//!
//! The Ctrl+C handler flips a global flag and, when a load run is active,
//! cancels it through the registered token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;

/// Global flag for Ctrl+C interrupt handling
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Token of the load run currently in flight, if any
static ACTIVE_RUN: Lazy<Mutex<Option<CancellationToken>>> = Lazy::new(|| Mutex::new(None));

/// Check if the application was interrupted (Ctrl+C pressed)
#[inline]
pub fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Set the interrupted flag and cancel the active run (called from signal handler)
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
    if let Ok(guard) = ACTIVE_RUN.lock() {
        if let Some(token) = guard.as_ref() {
            token.cancel();
        }
    }
}

/// Reset the interrupted flag
#[inline]
pub fn reset_interrupted() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Register the cancellation token of a run so Ctrl+C can stop it
pub fn register_run(token: CancellationToken) {
    if let Ok(mut guard) = ACTIVE_RUN.lock() {
        *guard = Some(token);
    }
}

/// Forget the active run token
pub fn clear_run() {
    if let Ok(mut guard) = ACTIVE_RUN.lock() {
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_flag_cancels_registered_run() {
        reset_interrupted();
        assert!(!was_interrupted());

        let token = CancellationToken::new();
        register_run(token.clone());
        set_interrupted();
        assert!(was_interrupted());
        assert!(token.is_cancelled());

        clear_run();
        reset_interrupted();
        assert!(!was_interrupted());
    }
}
