//! Operator interrupts during a COMMIT run.
//!
//! Hooking Ctrl+C for the grace period replaces the default SIGINT action for
//! the rest of the process, so a COMMIT run keeps listening until it ends.
//! The first Ctrl+C raises the [`Interrupt`] and the scanner stops after the
//! document in flight; a second one exits the process at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

/// Exit status of a forced stop, as a shell reports death by SIGINT.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Whether a raise was the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Raised {
    First,
    Repeated,
}

/// Shared stop flag for one run. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    raised: Arc<AtomicUsize>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) -> Raised {
        match self.raised.fetch_add(1, Ordering::SeqCst) {
            0 => Raised::First,
            _ => Raised::Repeated,
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst) > 0
    }

    /// Spawns a Ctrl+C listener that lives as long as the returned guard.
    pub fn listen(&self) -> Listener {
        let interrupt = self.clone();
        let task = tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Cannot listen for Ctrl+C during the run");
                    return;
                }
                match interrupt.raise() {
                    Raised::First => tracing::warn!(
                        "Interrupt received; stopping after the current document (Ctrl+C again to exit now)"
                    ),
                    Raised::Repeated => {
                        tracing::error!("Second interrupt; exiting without finishing the current document");
                        std::process::exit(FORCED_EXIT_CODE);
                    }
                }
            }
        });
        Listener { task }
    }
}

/// Stops the Ctrl+C listener when dropped.
#[derive(Debug)]
pub struct Listener {
    task: JoinHandle<()>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_raise_then_repeated() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.is_raised());

        let shared = interrupt.clone();
        assert_eq!(shared.raise(), Raised::First);
        assert!(interrupt.is_raised());
        assert_eq!(interrupt.raise(), Raised::Repeated);
    }
}
