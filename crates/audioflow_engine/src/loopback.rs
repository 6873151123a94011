//! In-memory passthrough engine
//!
//! Every written chunk comes back out of `read()` in order. The queue holds at
//! most `maxQueue` chunks, so a writer outrunning the reader is held back the
//! way a device ring would hold it back. A graceful quit still queues the
//! write that was waiting for room. Useful for tests and for exercising a
//! duplex stream without hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use audioflow_core::{
    AudioBuffer, AudioEngine, AudioOptions, EngineError, EngineResult, QuitMode, ReadResult,
    WriteOutcome,
};

pub struct LoopbackEngine {
    queue: Mutex<VecDeque<Bytes>>,
    max_queue: usize,
    /// Bytes per second of the capture side, for timestamps
    byte_rate: f64,
    bytes_read: AtomicU64,
    stopped: AtomicBool,
    aborted: AtomicBool,
    changed: Notify,
}

impl LoopbackEngine {
    pub fn new(options: &AudioOptions) -> EngineResult<Self> {
        let config = options
            .input
            .as_ref()
            .or(options.output.as_ref())
            .ok_or(EngineError::NoDevicesFound)?;
        let max_queue = options
            .output
            .as_ref()
            .map_or(config.max_queue, |output| output.max_queue);

        Ok(Self {
            queue: Mutex::new(VecDeque::new()),
            max_queue: max_queue.max(1),
            byte_rate: f64::from(config.sample_rate) * config.bytes_per_frame() as f64,
            bytes_read: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            changed: Notify::new(),
        })
    }

    /// Chunks written but not yet read back
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    async fn wait_until<T>(&self, mut check: impl FnMut() -> Option<T>) -> T {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(value) = check() {
                return value;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl AudioEngine for LoopbackEngine {
    async fn read(&self, size: usize) -> ReadResult {
        let result = self
            .wait_until(|| {
                let mut queue = self.queue.lock();
                if let Some(mut chunk) = queue.pop_front() {
                    if chunk.len() > size {
                        queue.push_front(chunk.split_off(size.max(1)));
                    }
                    let first = self.bytes_read.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                    let timestamp = first as f64 / self.byte_rate;
                    return Some(ReadResult::Buffer(AudioBuffer::with_timestamp(chunk, timestamp)));
                }
                self.stopped
                    .load(Ordering::SeqCst)
                    .then_some(ReadResult::Finished)
            })
            .await;
        self.changed.notify_waiters();
        result
    }

    async fn write(&self, buffer: Bytes) -> WriteOutcome {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(EngineError::NotRunning);
        }
        let mut pending = Some(buffer);
        let result = self
            .wait_until(|| {
                if self.aborted.load(Ordering::SeqCst) {
                    return Some(Err(EngineError::NotRunning));
                }
                let mut queue = self.queue.lock();
                // Past a graceful quit the outstanding write goes in over the bound
                if queue.len() >= self.max_queue && !self.stopped.load(Ordering::SeqCst) {
                    return None;
                }
                queue.extend(pending.take());
                Some(Ok(()))
            })
            .await;
        self.changed.notify_waiters();
        result
    }

    fn start(&self) -> EngineResult<()> {
        debug!(max_queue = self.max_queue, "Loopback engine started");
        Ok(())
    }

    async fn quit(&self, mode: QuitMode) -> EngineResult<()> {
        if mode == QuitMode::Abort {
            self.aborted.store(true, Ordering::SeqCst);
            self.queue.lock().clear();
        }
        self.stopped.store(true, Ordering::SeqCst);
        self.changed.notify_waiters();
        debug!(?mode, "Loopback engine stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use audioflow_core::StreamConfig;

    use super::*;

    fn engine(max_queue: usize) -> LoopbackEngine {
        let config = StreamConfig {
            max_queue,
            ..StreamConfig::default()
        };
        LoopbackEngine::new(&AudioOptions::duplex(config.clone(), config)).unwrap()
    }

    #[tokio::test]
    async fn test_chunks_come_back_in_order() {
        let engine = engine(4);
        engine.write(Bytes::from_static(b"first")).await.unwrap();
        engine.write(Bytes::from_static(b"second")).await.unwrap();

        let ReadResult::Buffer(first) = engine.read(1024).await else {
            panic!("expected a buffer");
        };
        assert_eq!(first.as_ref(), b"first");
        assert_eq!(first.timestamp(), Some(0.0));

        let ReadResult::Buffer(second) = engine.read(1024).await else {
            panic!("expected a buffer");
        };
        assert_eq!(second.as_ref(), b"second");
    }

    #[tokio::test]
    async fn test_read_splits_large_chunks() {
        let engine = engine(4);
        engine.write(Bytes::from(vec![1u8; 10])).await.unwrap();

        let ReadResult::Buffer(head) = engine.read(4).await else {
            panic!("expected a buffer");
        };
        assert_eq!(head.len(), 4);
        assert_eq!(engine.queued(), 1);

        let ReadResult::Buffer(tail) = engine.read(64).await else {
            panic!("expected a buffer");
        };
        assert_eq!(tail.len(), 6);
    }

    #[tokio::test]
    async fn test_write_waits_for_queue_room() {
        let engine = Arc::new(engine(1));
        engine.write(Bytes::from_static(b"a")).await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), engine.write(Bytes::from_static(b"b")))
                .await;
        assert!(blocked.is_err());

        let writer = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.write(Bytes::from_static(b"b")).await })
        };
        assert!(matches!(engine.read(16).await, ReadResult::Buffer(_)));
        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_quit_finishes_reads_after_queue_empties() {
        let engine = engine(4);
        engine.write(Bytes::from_static(b"tail")).await.unwrap();
        engine.quit(QuitMode::Wait).await.unwrap();

        assert!(matches!(engine.read(16).await, ReadResult::Buffer(_)));
        assert_eq!(engine.read(16).await, ReadResult::Finished);
        assert_eq!(
            engine.write(Bytes::from_static(b"late")).await,
            Err(EngineError::NotRunning)
        );
    }

    #[tokio::test]
    async fn test_graceful_quit_admits_waiting_write() {
        let engine = Arc::new(engine(1));
        engine.write(Bytes::from_static(b"held")).await.unwrap();

        let waiting = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.write(Bytes::from_static(b"waiting")).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        engine.quit(QuitMode::Wait).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("quit must release the waiting write")
            .unwrap();
        assert_eq!(outcome, Ok(()));
        assert_eq!(engine.queued(), 2);
    }

    #[tokio::test]
    async fn test_abort_fails_waiting_write() {
        let engine = Arc::new(engine(1));
        engine.write(Bytes::from_static(b"held")).await.unwrap();

        let waiting = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.write(Bytes::from_static(b"waiting")).await })
        };
        tokio::task::yield_now().await;

        engine.quit(QuitMode::Abort).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, Err(EngineError::NotRunning));
    }

    #[tokio::test]
    async fn test_abort_discards_queue() {
        let engine = engine(4);
        engine.write(Bytes::from_static(b"dropped")).await.unwrap();
        engine.quit(QuitMode::Abort).await.unwrap();

        assert_eq!(engine.read(16).await, ReadResult::Finished);
    }
}
