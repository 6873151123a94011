//! Flow-Controlled Channel
//!
//! A byte-counted queue between one producing side and one consuming side.
//! The producer asks for demand with [`FlowControlledChannel::ready`], which
//! holds it back while `high_water_mark` bytes or more are buffered; the
//! consumer pulls items in order.
//!
//! Both stream directions are built on it:
//!
//! ```text
//! capture:  engine.read ──push──▶ channel ──pull──▶ application
//! playback: application ──push──▶ channel ──pull──▶ engine.write
//! ```

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{StreamError, StreamResult};

struct Inner<T> {
    queue: VecDeque<(T, usize)>,
    buffered: usize,
    /// No more demand; pushes are still accepted
    halted: bool,
    /// End of stream; queued items are still delivered
    ended: bool,
    failure: Option<StreamError>,
}

pub struct FlowControlledChannel<T> {
    inner: Mutex<Inner<T>>,
    high_water_mark: usize,
    /// Wakes the consuming side
    readable: Notify,
    /// Wakes the producing side
    writable: Notify,
}

impl<T> FlowControlledChannel<T> {
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                buffered: 0,
                halted: false,
                ended: false,
                failure: None,
            }),
            high_water_mark: high_water_mark.max(1),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Bytes currently queued
    pub fn buffered(&self) -> usize {
        self.inner.lock().buffered
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().ended
    }

    /// Wait for demand
    ///
    /// Resolves `true` once fewer than `high_water_mark` bytes are queued and
    /// `false` as soon as the channel is halted or ended.
    pub async fn ready(&self) -> bool {
        loop {
            let notified = self.writable.notified();
            {
                let inner = self.inner.lock();
                if inner.halted || inner.ended {
                    return false;
                }
                if inner.buffered < self.high_water_mark {
                    return true;
                }
            }
            notified.await;
        }
    }

    /// Queue an item of `len` bytes; refused once the channel has ended
    pub fn push(&self, item: T, len: usize) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.ended {
                return false;
            }
            inner.queue.push_back((item, len));
            inner.buffered += len;
        }
        self.readable.notify_waiters();
        true
    }

    /// Next item in order, a stored failure (once), or `None` at end of stream
    pub async fn pull(&self) -> Option<StreamResult<T>> {
        loop {
            let notified = self.readable.notified();
            if let Some(next) = self.try_pull_inner() {
                return next;
            }
            notified.await;
        }
    }

    /// Non-suspending [`pull`](Self::pull); `None` means nothing is available yet
    pub fn try_pull(&self) -> Option<Option<StreamResult<T>>> {
        self.try_pull_inner()
    }

    fn try_pull_inner(&self) -> Option<Option<StreamResult<T>>> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.failure.take() {
            return Some(Some(Err(err)));
        }
        if let Some((item, len)) = inner.queue.pop_front() {
            inner.buffered -= len;
            drop(inner);
            self.writable.notify_waiters();
            return Some(Some(Ok(item)));
        }
        if inner.ended {
            return Some(None);
        }
        None
    }

    /// Stop demand without ending the stream
    pub fn halt(&self) {
        self.inner.lock().halted = true;
        self.writable.notify_waiters();
    }

    /// Signal end of stream; queued items are still delivered
    pub fn end(&self) {
        {
            let mut inner = self.inner.lock();
            inner.ended = true;
            inner.halted = true;
        }
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    /// Discard queued items, report `err` to the consumer once, then end
    pub fn fail(&self, err: StreamError) -> Vec<T> {
        let discarded = {
            let mut inner = self.inner.lock();
            inner.failure = Some(err);
            inner.ended = true;
            inner.halted = true;
            inner.buffered = 0;
            inner.queue.drain(..).map(|(item, _)| item).collect()
        };
        self.readable.notify_waiters();
        self.writable.notify_waiters();
        discarded
    }

    /// Discard and return everything queued
    pub fn clear(&self) -> Vec<T> {
        let discarded = {
            let mut inner = self.inner.lock();
            inner.buffered = 0;
            inner.queue.drain(..).map(|(item, _)| item).collect()
        };
        self.writable.notify_waiters();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_items_are_pulled_in_order() {
        let channel = FlowControlledChannel::new(1024);
        assert!(channel.push("a", 3));
        assert!(channel.push("b", 5));
        assert_eq!(channel.buffered(), 8);

        assert_eq!(channel.pull().await, Some(Ok("a")));
        assert_eq!(channel.pull().await, Some(Ok("b")));
        assert_eq!(channel.buffered(), 0);
        assert!(channel.try_pull().is_none());
    }

    #[tokio::test]
    async fn test_ready_holds_at_high_water_mark() {
        let channel = Arc::new(FlowControlledChannel::new(8));
        assert!(channel.ready().await);
        channel.push(1u8, 8);

        let waiting = tokio::time::timeout(Duration::from_millis(20), channel.ready()).await;
        assert!(waiting.is_err(), "ready() must wait while the channel is full");

        let producer = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.ready().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(channel.pull().await, Some(Ok(1)));

        let ready = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .expect("pull should release the producer")
            .unwrap();
        assert!(ready);
    }

    #[tokio::test]
    async fn test_end_delivers_remaining_items() {
        let channel = FlowControlledChannel::new(16);
        channel.push(7, 4);
        channel.end();

        assert!(!channel.push(8, 4));
        assert!(!channel.ready().await);
        assert_eq!(channel.pull().await, Some(Ok(7)));
        assert_eq!(channel.pull().await, None);
        assert_eq!(channel.pull().await, None);
    }

    #[tokio::test]
    async fn test_end_wakes_pending_pull() {
        let channel = Arc::new(FlowControlledChannel::<u8>::new(16));
        let consumer = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.pull().await })
        };
        tokio::task::yield_now().await;
        channel.end();

        let pulled = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pulled, None);
    }

    #[tokio::test]
    async fn test_fail_reports_error_once() {
        let channel = FlowControlledChannel::new(16);
        channel.push(1, 4);
        let discarded = channel.fail(StreamError::Closed);

        assert_eq!(discarded, vec![1]);
        assert_eq!(channel.pull().await, Some(Err(StreamError::Closed)));
        assert_eq!(channel.pull().await, None);
    }

    #[tokio::test]
    async fn test_halt_stops_demand_but_accepts_in_flight_push() {
        let channel = FlowControlledChannel::new(16);
        channel.halt();

        assert!(!channel.ready().await);
        assert!(channel.push(3, 2));
        assert_eq!(channel.try_pull(), Some(Some(Ok(3))));
        assert!(!channel.is_ended());
    }

    #[test]
    fn test_clear_returns_queued_items() {
        let channel = FlowControlledChannel::new(16);
        channel.push('x', 10);
        channel.push('y', 10);

        assert_eq!(channel.clear(), vec!['x', 'y']);
        assert_eq!(channel.buffered(), 0);
        assert!(channel.is_empty());
    }
}
