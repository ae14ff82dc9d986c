//! Audio device discovery.
//!
//! System audio is captured from a loopback-capable input: a device whose name
//! marks it as a loopback or monitor of an output. The one mirroring the active
//! output wins; any loopback device is the fallback. On Windows the default
//! output device itself can be opened for capture (WASAPI loopback).

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use super::recorder::AudioError;

/// How the system-audio device was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopbackKind {
    /// Loopback input mirroring the default output device
    Matched,
    /// Some other loopback input
    Fallback,
    /// The output device opened in loopback mode
    OutputDevice,
}

pub fn is_loopback_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("loopback") || lower.starts_with("monitor of")
}

/// Pick the loopback candidate for `output_name` among input device names.
pub fn pick_loopback(input_names: &[String], output_name: Option<&str>) -> Option<(usize, LoopbackKind)> {
    if let Some(output) = output_name.filter(|o| !o.is_empty()) {
        let matched = input_names
            .iter()
            .position(|n| is_loopback_name(n) && n.contains(output));
        if let Some(idx) = matched {
            return Some((idx, LoopbackKind::Matched));
        }
    }

    input_names
        .iter()
        .position(|n| is_loopback_name(n))
        .map(|idx| (idx, LoopbackKind::Fallback))
}

/// Find the device to capture system output from, if any.
pub fn find_loopback_device(host: &Host) -> Option<(Device, LoopbackKind)> {
    let output = host.default_output_device();
    let output_name = output.as_ref().and_then(|d| d.name().ok());

    let mut inputs: Vec<(String, Device)> = match host.input_devices() {
        Ok(devices) => devices
            .filter_map(|d| d.name().ok().map(|name| (name, d)))
            .collect(),
        Err(e) => {
            log::warn!("Failed to enumerate input devices: {}", e);
            Vec::new()
        }
    };

    let names: Vec<String> = inputs.iter().map(|(name, _)| name.clone()).collect();
    if let Some((idx, kind)) = pick_loopback(&names, output_name.as_deref()) {
        let (name, device) = inputs.swap_remove(idx);
        log::info!("System audio device: {} ({:?})", name, kind);
        return Some((device, kind));
    }

    if cfg!(target_os = "windows") {
        if let Some(device) = output {
            log::info!(
                "System audio device: {} (output loopback)",
                output_name.as_deref().unwrap_or("default output")
            );
            return Some((device, LoopbackKind::OutputDevice));
        }
    }

    None
}

pub fn default_microphone(host: &Host) -> Option<Device> {
    host.default_input_device()
}

/// Audio device listing for diagnostics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default_input: bool,
    pub is_loopback: bool,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
}

pub fn list_audio_devices() -> Result<Vec<AudioDeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let default_input = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| AudioError::DeviceEnumeration(e.to_string()))?;

    Ok(devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            let config = device.default_input_config().ok();
            Some(AudioDeviceInfo {
                is_default_input: default_input.as_deref() == Some(name.as_str()),
                is_loopback: is_loopback_name(&name),
                channels: config.as_ref().map(|c| c.channels()),
                sample_rate: config.as_ref().map(|c| c.sample_rate().0),
                name,
            })
        })
        .collect())
}
