//! Audioflow Engine - Native Audio I/O
//!
//! Engines behind the [`audioflow_core::AudioEngine`] contract:
//! - [`CpalEngine`] streams raw sample bytes to and from host devices (via CPAL)
//! - [`LoopbackEngine`] plays every written chunk back into its read side
//!
//! plus device and host API discovery, and [`open`] to build a stream over
//! the native engine in one call.

mod cpal_engine;
mod device;
mod loopback;
mod ring;

pub use cpal_engine::CpalEngine;
pub use device::{get_devices, get_host_apis, DeviceInfo, HostApiInfo, HostApis};
pub use loopback::LoopbackEngine;

use audioflow_core::{open_with, AudioIo, AudioOptions, StreamResult};

/// Open a stream over the host's audio devices
///
/// Options are validated before any device is touched.
pub fn open(options: AudioOptions) -> StreamResult<AudioIo<CpalEngine>> {
    open_with(options, CpalEngine::new)
}
