//! CPU affinity for the packet loops
//!
//! Pinning reduces scheduling jitter and cache migration for the hot loops.
//! Failure to pin is a soft degradation: the loop runs unpinned and a
//! warning is logged, startup never fails because of it.

use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Pinning errors
#[derive(Error, Debug)]
pub enum AffinityError {
    #[error("core id {0} is out of range for this host")]
    InvalidCore(usize),

    #[error("sched_setaffinity failed: {0}")]
    Syscall(std::io::Error),

    #[error("CPU pinning is not supported on this platform")]
    Unsupported,
}

/// Bind the calling thread to a single core
#[cfg(target_os = "linux")]
pub fn pin_current_thread(core: usize) -> Result<(), AffinityError> {
    if core >= libc::CPU_SETSIZE as usize {
        return Err(AffinityError::InvalidCore(core));
    }
    // SAFETY: cpu_set_t is plain data; CPU_ZERO/CPU_SET only write into it.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(AffinityError::Syscall(std::io::Error::last_os_error()));
        }
    }
    Ok(())
}

/// Bind the calling thread to a single core
#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(_core: usize) -> Result<(), AffinityError> {
    Err(AffinityError::Unsupported)
}

/// Pin the calling thread if a core was assigned, logging the outcome
pub fn pin_or_warn(loop_name: &str, core: Option<usize>) {
    let Some(core) = core else {
        return;
    };
    match pin_current_thread(core) {
        Ok(()) => tracing::debug!(target: "wire", "{} loop pinned to core {}", loop_name, core),
        Err(e) => tracing::warn!(
            target: "wire",
            "{} loop could not be pinned to core {}: {} - continuing unpinned",
            loop_name,
            core,
            e
        ),
    }
}

/// Round-robin allocator over the configured affinity core list
///
/// Hands out core labels for connections and fixed cores for the loops. A
/// label is a scheduling hint; it only means something when the loop that
/// services the connection is itself pinned.
pub struct CoreAllocator {
    cores: Vec<usize>,
    next: AtomicUsize,
}

impl CoreAllocator {
    pub fn new(cores: Vec<usize>) -> Self {
        Self {
            cores,
            next: AtomicUsize::new(0),
        }
    }

    /// Next core label, round-robin; None when no affinity is configured
    pub fn next_label(&self) -> Option<usize> {
        if self.cores.is_empty() {
            return None;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.cores.len();
        Some(self.cores[idx])
    }

    /// Fixed core for a loop by position in the configured list
    pub fn loop_core(&self, slot: usize) -> Option<usize> {
        self.cores.get(slot).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }
}
