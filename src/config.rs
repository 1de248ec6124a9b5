// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! Cross-cutting execution knobs gathered into one place rather than
//! threaded through every constructor argument list.

use std::time::Duration;

/// Execution mode toggle: whether an idle process parks or spins.
///
/// In `Reactive` mode a process with an unready first layer marks itself
/// idle and exits its worker thread; a monitor thread respawns it the next
/// time one of its first-layer methods receives data. In `Continuous` mode
/// the worker keeps spinning over its layers regardless, never parking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Reactive,
    Continuous,
}

/// Configuration for an [`crate::graph::ExecutionGraph`] run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long `execute`'s shutdown join waits for each worker before
    /// abandoning it.
    pub grace_timeout: Duration,
    pub mode: ExecutionMode,
    /// Install a SIGINT/SIGTERM handler that raises the shutdown flag.
    /// Only meaningful when calling `execute_catching_signals`.
    pub install_signal_handler: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            grace_timeout: Duration::from_secs(5),
            mode: ExecutionMode::default(),
            install_signal_handler: true,
        }
    }
}

impl EngineConfig {
    pub fn reactive(grace_timeout: Duration) -> Self {
        EngineConfig {
            grace_timeout,
            mode: ExecutionMode::Reactive,
            ..Default::default()
        }
    }

    pub fn continuous(grace_timeout: Duration) -> Self {
        EngineConfig {
            grace_timeout,
            mode: ExecutionMode::Continuous,
            ..Default::default()
        }
    }
}
