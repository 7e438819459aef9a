//! Output device discovery
//!
//! Lists output devices across every cpal host and checks each one against
//! what a trial needs: f32 output (the only format the stream is built for),
//! one device channel per stimulus channel, and the stimuli's sample rate.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::SampleFormat;

use listen_core::{validate_output_channels, DeviceError};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Channel count and sample rate a trial needs from its device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialNeeds {
    pub channels: usize,
    pub sample_rate: u32,
}

/// Why a device cannot play a trial as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceIssue {
    /// No f32 output configuration at all
    NoFloatOutput,
    /// Fewer outputs than stimulus channels
    Channels(DeviceError),
    /// The stimuli's rate is outside every f32 configuration
    SampleRate(u32),
}

impl std::fmt::Display for DeviceIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceIssue::NoFloatOutput => write!(f, "no f32 output"),
            DeviceIssue::Channels(DeviceError::InsufficientOutputChannels { required, available }) => {
                write!(f, "needs {} outputs, has {}", required, available)
            }
            DeviceIssue::SampleRate(rate) => write!(f, "{}Hz would be resampled by the device", rate),
        }
    }
}

/// f32 output capability of a device, folded over its supported configs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputCapability {
    pub max_channels: usize,
    /// Inclusive sample-rate ranges
    pub rate_ranges: Vec<(u32, u32)>,
}

impl OutputCapability {
    /// Fold `(channels, min_rate, max_rate, format)` tuples; non-f32 entries are skipped
    fn from_ranges(ranges: impl IntoIterator<Item = (u16, u32, u32, SampleFormat)>) -> Self {
        let mut capability = Self::default();
        for (channels, min, max, format) in ranges {
            if format != SampleFormat::F32 {
                continue;
            }
            capability.max_channels = capability.max_channels.max(channels as usize);
            capability.rate_ranges.push((min, max));
        }
        capability
    }

    pub fn supports_rate(&self, rate: u32) -> bool {
        self.rate_ranges
            .iter()
            .any(|&(min, max)| (min..=max).contains(&rate))
    }

    /// Everything standing between this device and the trial
    pub fn issues(&self, needs: TrialNeeds) -> Vec<DeviceIssue> {
        if self.rate_ranges.is_empty() {
            return vec![DeviceIssue::NoFloatOutput];
        }
        let mut issues = Vec::new();
        if let Err(e) = validate_output_channels(needs.channels, self.max_channels) {
            issues.push(DeviceIssue::Channels(e));
        }
        if !self.supports_rate(needs.sample_rate) {
            issues.push(DeviceIssue::SampleRate(needs.sample_rate));
        }
        issues
    }
}

/// An output device as shown by `--list-devices`
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub id: DeviceId,
    pub is_default: bool,
    pub capability: OutputCapability,
    /// Empty when no trial was given or the device fits it
    pub issues: Vec<DeviceIssue>,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} ch f32)", self.id.display_label(), self.capability.max_channels)?;
        if self.is_default {
            write!(f, " *default*")?;
        }
        for issue in &self.issues {
            write!(f, " [{}]", issue)?;
        }
        Ok(())
    }
}

fn capability_of(device: &cpal::Device) -> Option<OutputCapability> {
    let configs = device.supported_output_configs().ok()?;
    Some(OutputCapability::from_ranges(configs.map(|c| {
        (
            c.channels(),
            c.min_sample_rate().0,
            c.max_sample_rate().0,
            c.sample_format(),
        )
    })))
}

/// List output devices from every host, checked against `needs` when given
///
/// Devices that fit come first, then defaults, then by name.
pub fn get_output_devices(needs: Option<TrialNeeds>) -> AudioResult<Vec<AudioDevice>> {
    let mut devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            log::debug!("Could not initialize host {:?}", host_id);
            continue;
        };
        let host_label = format!("{:?}", host_id);
        let default_name = host
            .default_output_device()
            .and_then(|d: cpal::Device| d.name().ok());

        let Ok(outputs) = host.output_devices() else {
            continue;
        };
        for device in outputs {
            let (Ok(name), Some(capability)) = (device.name(), capability_of(&device)) else {
                continue;
            };
            let issues = needs.map(|n| capability.issues(n)).unwrap_or_default();
            devices.push(AudioDevice {
                is_default: default_name.as_deref() == Some(name.as_str()),
                id: DeviceId::with_host(&name, &host_label),
                capability,
                issues,
            });
        }
    }

    if devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    devices.sort_by(|a, b| {
        a.issues
            .len()
            .cmp(&b.issues.len())
            .then_with(|| b.is_default.cmp(&a.is_default))
            .then_with(|| a.id.display_label().cmp(&b.id.display_label()))
    });
    Ok(devices)
}

/// Resolve a configured device, falling back to the system default
///
/// A device id with a host only searches that host (matched by cpal's host
/// name, e.g. "Alsa", "Jack").
pub fn open_output_device(id: Option<&DeviceId>) -> AudioResult<cpal::Device> {
    let Some(id) = id else {
        return cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()));
    };

    cpal::available_hosts()
        .into_iter()
        .filter(|host_id| {
            id.host
                .as_deref()
                .map_or(true, |h| h.eq_ignore_ascii_case(&format!("{:?}", host_id)))
        })
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| host.output_devices().ok())
        .flatten()
        .find(|d: &cpal::Device| d.name().is_ok_and(|n| n == id.name))
        .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}
