//! TCP server - listener, per-connection handler, settings

pub mod handler;
pub mod listener;
pub mod state;

pub use handler::Connection;
pub use listener::{start_test_server, Server, ServerError, ServerHandle};
pub use state::{ProgressCounters, QueryState};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Connection-level tunables
#[derive(Debug, Clone)]
pub struct Settings {
    /// Deadline for receiving one packet
    pub receive_timeout: Duration,
    /// Deadline for sending one packet
    pub send_timeout: Duration,
    /// Idle-wait slice between shutdown checks
    pub poll_interval: Duration,
    /// Minimum interval between progress packets and cancellation polls
    pub interactive_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            receive_timeout: Duration::from_secs(300),
            send_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(10),
            interactive_delay: Duration::from_millis(100),
        }
    }
}

/// Process-wide "stop accepting work" flag, shared with every connection
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        ShutdownSignal::default()
    }

    /// Ask all connections to wind down at their next idle check
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
