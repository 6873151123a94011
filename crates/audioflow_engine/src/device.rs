//! Audio Device and Host API Discovery
//!
//! Device ids are positions in one enumeration over every available host,
//! in host order. `DEFAULT_DEVICE` (-1) selects the default host's default
//! device instead.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use tracing::debug;

use audioflow_core::{Direction, EngineError, EngineResult, DEFAULT_DEVICE};

/// One audio device as seen by its host API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Value to pass as `deviceId`
    pub id: i32,

    pub name: String,

    /// Host API the device belongs to (ALSA, JACK, WASAPI, CoreAudio, ...)
    pub host_api: String,

    pub max_input_channels: u16,
    pub max_output_channels: u16,

    /// Sample rate of the device's default config (0 if unknown)
    pub default_sample_rate: u32,

    /// Common sample rates within the supported ranges
    pub sample_rates: Vec<u32>,

    pub default_input: bool,
    pub default_output: bool,
}

/// One host API with its device counts and defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostApiInfo {
    pub id: usize,
    pub name: String,
    pub device_count: usize,
    /// Device id of the host's default input, if any
    pub default_input: Option<i32>,
    pub default_output: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostApis {
    /// Index into `host_apis` of the platform default host
    pub default_host_api: usize,
    pub host_apis: Vec<HostApiInfo>,
}

/// Every device on every available host
pub fn get_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();
    let mut next_id = 0i32;

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            debug!(host = host_id.name(), "Host API unavailable");
            continue;
        };
        let default_input = host.default_input_device().and_then(|d| d.name().ok());
        let default_output = host.default_output_device().and_then(|d| d.name().ok());

        let Ok(host_devices) = host.devices() else {
            continue;
        };
        for device in host_devices {
            let name = device.name().unwrap_or_else(|_| format!("Device {next_id}"));
            let (input_rates, max_input_channels) = device
                .supported_input_configs()
                .map(extract_config_info)
                .unwrap_or_default();
            let (output_rates, max_output_channels) = device
                .supported_output_configs()
                .map(extract_config_info)
                .unwrap_or_default();

            let mut sample_rates = input_rates;
            for rate in output_rates {
                if !sample_rates.contains(&rate) {
                    sample_rates.push(rate);
                }
            }
            sample_rates.sort_unstable();

            devices.push(DeviceInfo {
                id: next_id,
                default_sample_rate: default_sample_rate(&device),
                default_input: default_input.as_deref() == Some(name.as_str()),
                default_output: default_output.as_deref() == Some(name.as_str()),
                name,
                host_api: host_id.name().to_string(),
                max_input_channels,
                max_output_channels,
                sample_rates,
            });
            next_id += 1;
        }
    }

    devices
}

/// Available host APIs and which one is the default
pub fn get_host_apis() -> HostApis {
    let default_name = cpal::default_host().id().name();
    let devices = get_devices();

    let host_apis: Vec<HostApiInfo> = cpal::available_hosts()
        .into_iter()
        .enumerate()
        .map(|(id, host_id)| {
            let name = host_id.name().to_string();
            let on_host = || devices.iter().filter(|d| d.host_api == name);
            HostApiInfo {
                id,
                device_count: on_host().count(),
                default_input: on_host().find(|d| d.default_input).map(|d| d.id),
                default_output: on_host().find(|d| d.default_output).map(|d| d.id),
                name: name.clone(),
            }
        })
        .collect();

    let default_host_api = host_apis
        .iter()
        .position(|host| host.name == default_name)
        .unwrap_or(0);

    HostApis {
        default_host_api,
        host_apis,
    }
}

/// Resolve a `deviceId` for one direction
pub(crate) fn find_device(device_id: i32, direction: Direction) -> EngineResult<cpal::Device> {
    if device_id == DEFAULT_DEVICE {
        let host = cpal::default_host();
        let device = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        };
        return device.ok_or(EngineError::NoDevicesFound);
    }

    let index = usize::try_from(device_id)
        .map_err(|_| EngineError::DeviceNotFound(device_id.to_string()))?;
    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| host.devices().ok())
        .flatten()
        .nth(index)
        .ok_or_else(|| EngineError::DeviceNotFound(device_id.to_string()))
}

fn default_sample_rate(device: &cpal::Device) -> u32 {
    device
        .default_output_config()
        .or_else(|_| device.default_input_config())
        .map(|config| config.sample_rate().0)
        .unwrap_or(0)
}

fn extract_config_info(
    configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
) -> (Vec<u32>, u16) {
    let mut sample_rates = Vec::new();
    let mut max_channels = 0u16;

    const COMMON_RATES: [u32; 8] = [8000, 16000, 22050, 44100, 48000, 88200, 96000, 192000];

    for config in configs {
        max_channels = max_channels.max(config.channels());

        let min = config.min_sample_rate().0;
        let max = config.max_sample_rate().0;
        for &rate in &COMMON_RATES {
            if rate >= min && rate <= max && !sample_rates.contains(&rate) {
                sample_rates.push(rate);
            }
        }
    }

    sample_rates.sort_unstable();
    (sample_rates, max_channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_serialization() {
        let device = DeviceInfo {
            id: 3,
            name: "USB Interface".to_string(),
            host_api: "ALSA".to_string(),
            max_input_channels: 2,
            max_output_channels: 2,
            default_sample_rate: 48000,
            sample_rates: vec![44100, 48000],
            default_input: false,
            default_output: true,
        };

        let json = serde_json::to_string(&device).unwrap();
        assert!(json.contains("\"maxInputChannels\":2"));
        assert!(json.contains("\"hostApi\":\"ALSA\""));

        let deserialized: DeviceInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(device, deserialized);
    }

    #[test]
    fn test_negative_device_id_is_not_found() {
        let result = find_device(-7, Direction::Output);
        assert!(matches!(result, Err(EngineError::DeviceNotFound(id)) if id == "-7"));
    }

    #[test]
    fn test_host_apis_are_listed() {
        let apis = get_host_apis();
        assert_eq!(apis.host_apis.len(), cpal::available_hosts().len());
        if !apis.host_apis.is_empty() {
            assert!(apis.default_host_api < apis.host_apis.len());
        }
    }

    // Note: Hardware-dependent tests are marked with #[ignore]
    // Run them with: cargo test -- --ignored

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_enumerate_devices() {
        let devices = get_devices();
        assert!(!devices.is_empty());
        for (index, device) in devices.iter().enumerate() {
            assert_eq!(device.id, index as i32);
        }
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_default_output_resolves() {
        let device = find_device(DEFAULT_DEVICE, Direction::Output);
        assert!(device.is_ok());
    }
}
