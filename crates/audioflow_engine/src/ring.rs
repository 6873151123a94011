//! Byte rings between the device callbacks and the async engine side
//!
//! Each direction gets one rtrb SPSC ring of raw sample bytes. The device
//! callback never blocks or allocates; it copies what fits and wakes the
//! async side through [`RingSignal`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rtrb::{Consumer, Producer};
use tokio::sync::Notify;

use audioflow_core::EngineError;

/// Wakeups and out-of-band status for one ring
pub(crate) struct RingSignal {
    notify: Notify,
    closed: AtomicBool,
    fault: Mutex<Option<String>>,
    xruns: AtomicU64,
}

impl RingSignal {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            fault: Mutex::new(None),
            xruns: AtomicU64::new(0),
        })
    }

    /// Wake whoever waits on this ring
    pub(crate) fn wake(&self) {
        self.notify.notify_waiters();
    }

    /// No more data will flow; waiters are released
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wake();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Record a native stream error; surfaced by the next read or write
    pub(crate) fn report_fault(&self, message: String) {
        *self.fault.lock() = Some(message);
        self.wake();
    }

    pub(crate) fn take_fault(&self) -> Option<EngineError> {
        self.fault.lock().take().map(EngineError::Hardware)
    }

    /// Callback could not move a whole buffer (overrun or underrun)
    pub(crate) fn count_xrun(&self) {
        self.xruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn take_xruns(&self) -> u64 {
        self.xruns.swap(0, Ordering::Relaxed)
    }

    /// Re-run `check` after every wakeup until it yields a value
    pub(crate) async fn wait_until<T>(&self, mut check: impl FnMut() -> Option<T>) -> T {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(value) = check() {
                return value;
            }
            notified.await;
        }
    }
}

/// Capture callback: copy whole frames into the ring, returns bytes stored
pub(crate) fn push_frames(producer: &mut Producer<u8>, data: &[u8], bytes_per_frame: usize) -> usize {
    let room = producer.slots() / bytes_per_frame * bytes_per_frame;
    let len = data.len().min(room);
    if len == 0 {
        return 0;
    }
    match producer.write_chunk_uninit(len) {
        Ok(chunk) => chunk.fill_from_iter(data[..len].iter().copied()),
        Err(_) => 0,
    }
}

/// Playback callback: copy queued bytes out, silence for the rest
pub(crate) fn pull_into(consumer: &mut Consumer<u8>, out: &mut [u8]) -> usize {
    let len = out.len().min(consumer.slots());
    if let Ok(chunk) = consumer.read_chunk(len) {
        let (first, second) = chunk.as_slices();
        out[..first.len()].copy_from_slice(first);
        out[first.len()..first.len() + second.len()].copy_from_slice(second);
        chunk.commit_all();
    }
    out[len..].fill(0);
    len
}

/// Async side: take up to `max` bytes of whole frames from the capture ring
pub(crate) fn take_frames(
    consumer: &mut Consumer<u8>,
    max: usize,
    bytes_per_frame: usize,
) -> Option<Vec<u8>> {
    let len = consumer.slots().min(max.max(bytes_per_frame)) / bytes_per_frame * bytes_per_frame;
    if len == 0 {
        return None;
    }
    let chunk = consumer.read_chunk(len).ok()?;
    let (first, second) = chunk.as_slices();
    let mut bytes = Vec::with_capacity(len);
    bytes.extend_from_slice(first);
    bytes.extend_from_slice(second);
    chunk.commit_all();
    Some(bytes)
}

/// Async side: queue as much of `data` as fits into the playback ring
pub(crate) fn put_bytes(producer: &mut Producer<u8>, data: &[u8]) -> usize {
    let len = data.len().min(producer.slots());
    if len == 0 {
        return 0;
    }
    match producer.write_chunk_uninit(len) {
        Ok(chunk) => chunk.fill_from_iter(data[..len].iter().copied()),
        Err(_) => 0,
    }
}
