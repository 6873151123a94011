//! Audioflow Core - Audio Stream Bridge
//!
//! This crate adapts an asynchronous audio engine to backpressure-aware
//! byte streams:
//! - Readable streams pull captured buffers from the engine on demand
//! - Writable streams submit chunks one at a time, in order, with per-chunk acks
//! - Duplex streams pair both over a single engine
//! - One graceful (`quit`) or immediate (`abort`) shutdown per stream
//!
//! The engine itself (hardware callback, device ring buffers) lives behind
//! the [`AudioEngine`] trait; see the `audioflow_engine` crate.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Application                           │
//! │   read() ◀── channel ◀── pump         write() ──▶ channel   │
//! │                           │                         │       │
//! │             events ◀──────┼─────── crossbeam ───────┤       │
//! └───────────────────────────┼─────────────────────────┼───────┘
//!                             │ engine.read(hwm)        │ engine.write(chunk)
//!                             ▼  (one outstanding)      ▼  (one outstanding)
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  AudioEngine (async trait)                  │
//! │        start ── read / write ── quit(Wait | Abort)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod bridge;
mod buffer;
mod capture;
mod channel;
mod config;
mod duplex;
mod engine;
mod error;
mod io;
mod message;
mod pipe;
mod playback;
mod readable;
mod state;
mod writable;

#[cfg(test)]
mod testing;

pub use buffer::AudioBuffer;
pub use channel::FlowControlledChannel;
pub use config::{AudioOptions, SampleFormat, StreamConfig, DEFAULT_DEVICE};
pub use duplex::DuplexAudioStream;
pub use engine::{AudioEngine, QuitMode, ReadResult, WriteOutcome};
pub use error::{EngineError, EngineResult, StreamError, StreamResult};
pub use io::{open_with, AudioIo};
pub use message::{StreamEvent, StreamEvents};
pub use pipe::{pipe, AudioReader, AudioWriter};
pub use playback::WriteAck;
pub use readable::ReadableAudioStream;
pub use state::{Direction, StreamState};
pub use writable::WritableAudioStream;

// Engine implementors need these to write the trait impl
pub use async_trait::async_trait;
pub use bytes::Bytes;
