//! Per-Direction Stream State Machine
//!
//! ```text
//! Idle ──start──▶ Started ──quit──▶ Quitting ──┐
//!   │                │   └──abort──▶ Aborting ──┼──▶ Closed
//!   └──quit/abort────┼──────────────────────────┘
//!                    └──engine end of input─────────▶ Closed
//! ```
//!
//! Transitions go through a `watch` channel so shutdown can await `Closed`
//! without polling.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::engine::QuitMode;

/// Data direction of a stream half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Capture (recording)
    Input,
    /// Playback
    Output,
}

/// Lifecycle of one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Idle,
    Started,
    Quitting,
    Aborting,
    Closed,
}

impl StreamState {
    /// Engine requests may be issued only in this state
    pub fn is_running(self) -> bool {
        matches!(self, StreamState::Started)
    }

    pub fn is_shutting_down(self) -> bool {
        matches!(self, StreamState::Quitting | StreamState::Aborting)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, StreamState::Closed)
    }
}

/// Shared state cell for one direction
pub(crate) struct DirectionState {
    direction: Direction,
    tx: watch::Sender<StreamState>,
}

impl DirectionState {
    pub(crate) fn new(direction: Direction) -> Self {
        let (tx, _rx) = watch::channel(StreamState::Idle);
        Self { direction, tx }
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn current(&self) -> StreamState {
        *self.tx.borrow()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.current().is_running()
    }

    /// Late engine results are dropped in these states
    pub(crate) fn discards_results(&self) -> bool {
        matches!(self.current(), StreamState::Aborting | StreamState::Closed)
    }

    /// `Idle → Started`; returns whether the transition happened
    pub(crate) fn start(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == StreamState::Idle {
                *state = StreamState::Started;
                true
            } else {
                false
            }
        })
    }

    /// Enter `Quitting`/`Aborting` from `Idle` or `Started`
    ///
    /// Returns false when a shutdown already began or the direction is closed.
    pub(crate) fn begin_shutdown(&self, mode: QuitMode) -> bool {
        self.tx.send_if_modified(|state| match state {
            StreamState::Idle | StreamState::Started => {
                *state = match mode {
                    QuitMode::Wait => StreamState::Quitting,
                    QuitMode::Abort => StreamState::Aborting,
                };
                true
            }
            _ => false,
        })
    }

    /// `Started → Closed` without a shutdown (engine reported end of input)
    pub(crate) fn close_if_running(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == StreamState::Started {
                *state = StreamState::Closed;
                true
            } else {
                false
            }
        })
    }

    /// Any state `→ Closed`; returns whether the transition happened
    pub(crate) fn close(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == StreamState::Closed {
                false
            } else {
                *state = StreamState::Closed;
                true
            }
        })
    }

    /// Resolve once the direction is `Closed`
    pub(crate) async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the wait cannot fail
        let _ = rx.wait_for(|state| state.is_closed()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = DirectionState::new(Direction::Input);
        assert_eq!(state.current(), StreamState::Idle);
        assert_eq!(state.direction(), Direction::Input);
        assert!(!state.is_running());
    }

    #[test]
    fn test_start_is_one_shot() {
        let state = DirectionState::new(Direction::Output);
        assert!(state.start());
        assert!(!state.start());
        assert!(state.is_running());
    }

    #[test]
    fn test_single_shutdown_sequence() {
        let state = DirectionState::new(Direction::Input);
        state.start();

        assert!(state.begin_shutdown(QuitMode::Wait));
        assert_eq!(state.current(), StreamState::Quitting);
        assert!(!state.begin_shutdown(QuitMode::Abort));
        assert_eq!(state.current(), StreamState::Quitting);
        assert!(!state.discards_results());

        assert!(state.close());
        assert!(!state.close());
        assert!(!state.start());
    }

    #[test]
    fn test_abort_discards_results() {
        let state = DirectionState::new(Direction::Input);
        state.start();
        assert!(state.begin_shutdown(QuitMode::Abort));
        assert_eq!(state.current(), StreamState::Aborting);
        assert!(state.discards_results());
    }

    #[test]
    fn test_shutdown_from_idle() {
        let state = DirectionState::new(Direction::Output);
        assert!(state.begin_shutdown(QuitMode::Wait));
        assert!(state.current().is_shutting_down());
    }

    #[test]
    fn test_close_if_running_only_from_started() {
        let state = DirectionState::new(Direction::Input);
        assert!(!state.close_if_running());

        state.start();
        state.begin_shutdown(QuitMode::Wait);
        assert!(!state.close_if_running());
        assert_eq!(state.current(), StreamState::Quitting);

        let running = DirectionState::new(Direction::Input);
        running.start();
        assert!(running.close_if_running());
        assert!(running.current().is_closed());
    }

    #[tokio::test]
    async fn test_closed_wakes_waiter() {
        let state = std::sync::Arc::new(DirectionState::new(Direction::Input));
        state.start();

        let waiter = {
            let state = std::sync::Arc::clone(&state);
            tokio::spawn(async move { state.closed().await })
        };
        tokio::task::yield_now().await;
        state.close();

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve")
            .unwrap();
    }
}
