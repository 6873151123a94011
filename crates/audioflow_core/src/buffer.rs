//! Audio Buffers

use bytes::Bytes;

/// Raw audio bytes in the stream's sample format
///
/// Immutable once produced. Capture buffers carry the engine-clock time (in
/// seconds) of their first sample.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    data: Bytes,
    timestamp: Option<f64>,
}

impl AudioBuffer {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(data: impl Into<Bytes>, timestamp: f64) -> Self {
        Self {
            data: data.into(),
            timestamp: Some(timestamp),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for AudioBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<AudioBuffer> for Bytes {
    fn from(buffer: AudioBuffer) -> Self {
        buffer.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_accessors() {
        let buffer = AudioBuffer::with_timestamp(vec![1u8, 2, 3, 4], 0.5);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.timestamp(), Some(0.5));
        assert_eq!(buffer.as_ref(), &[1, 2, 3, 4]);

        let plain = AudioBuffer::new(Bytes::from_static(b""));
        assert!(plain.is_empty());
        assert!(plain.timestamp().is_none());
    }
}
