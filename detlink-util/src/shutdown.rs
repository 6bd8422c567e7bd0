//! Process-wide cooperative shutdown flag (SPEC_FULL.md §4.I).
//!
//! `SIGINT`/`SIGTERM` flip the flag; both the server and client readiness
//! loops check it once per 1-second poll iteration and exit cleanly rather
//! than being torn down mid-operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Installs a `SIGINT`/`SIGTERM` handler and returns the flag it flips.
/// Call once per process, before the readiness loop starts.
pub fn install() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();

    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })
    .expect("failed to install SIGINT/SIGTERM handler");

    running
}

#[inline]
pub fn is_running(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_starts_true_and_can_be_flipped_manually() {
        let flag = Arc::new(AtomicBool::new(true));
        assert!(is_running(&flag));
        flag.store(false, Ordering::SeqCst);
        assert!(!is_running(&flag));
    }
}
