use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;

/// State of one run, as seen by its control loop and node bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Paused,
    Killed,
}

/// Cooperative pause/kill switch shared by a run's control loop and every
/// node body it dispatches.
///
/// Transitions: `Running <-> Paused`, anything `-> Killed`. `Killed` is
/// terminal and also cancels [`RunController::cancel_token`].
#[derive(Clone)]
pub struct RunController {
    state: Arc<watch::Sender<RunState>>,
    cancel: CancellationToken,
}

impl RunController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(RunState::Running);
        Self {
            state: Arc::new(tx),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn is_killed(&self) -> bool {
        self.state() == RunState::Killed
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RunState::Paused
    }

    /// `Running -> Paused`. Returns whether the state changed.
    pub fn pause(&self) -> bool {
        self.state.send_if_modified(|s| {
            if *s == RunState::Running {
                *s = RunState::Paused;
                true
            } else {
                false
            }
        })
    }

    /// `Paused -> Running`. Returns whether the state changed.
    pub fn resume(&self) -> bool {
        self.state.send_if_modified(|s| {
            if *s == RunState::Paused {
                *s = RunState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Move to the terminal `Killed` state. Observable as soon as this returns.
    pub fn kill(&self) {
        self.state.send_replace(RunState::Killed);
        self.cancel.cancel();
    }

    /// Token cancelled on kill, for bodies that `select!` on cancellation.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves once the run is killed.
    pub async fn killed(&self) {
        self.cancel.cancelled().await
    }

    /// Wait until the run is no longer paused. Returns the state that ended
    /// the wait (`Running` or `Killed`).
    pub async fn wait_while_paused(&self) -> RunState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|s| *s != RunState::Paused).await {
            Ok(state) => *state,
            Err(_) => RunState::Killed,
        };
        state
    }

    /// Suspension point for async node bodies: blocks while paused and
    /// fails with [`NodeError::Aborted`] once killed.
    pub async fn checkpoint(&self) -> Result<(), NodeError> {
        match self.wait_while_paused().await {
            RunState::Killed => Err(NodeError::Aborted),
            _ => Ok(()),
        }
    }

    /// Blocking variant of [`RunController::checkpoint`] for node bodies
    /// running on the worker pool.
    pub fn suspend(&self) -> Result<(), NodeError> {
        match self.state() {
            RunState::Killed => Err(NodeError::Aborted),
            RunState::Running => Ok(()),
            RunState::Paused => futures::executor::block_on(self.checkpoint()),
        }
    }
}

impl Default for RunController {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("state", &self.state())
            .finish()
    }
}
