//! Audio device enumeration, independent of any session.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioDeviceType {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioDevice {
    pub name: String,
    /// Identifier accepted by `set_audio_input_device` / `set_audio_output_device`
    pub guid: String,
}

/// Lists the devices of `device_type` on the default audio host.
/// Host errors are logged and produce an empty list.
pub fn audio_devices(device_type: AudioDeviceType) -> Vec<AudioDevice> {
    match enumerate(device_type) {
        Ok(devices) => {
            tracing::debug!("Found {} {device_type:?} devices", devices.len());
            devices
        }
        Err(e) => {
            tracing::warn!("Unable to enumerate {device_type:?} devices: {e:#}");
            Vec::new()
        }
    }
}

#[cfg(feature = "cpal")]
#[allow(deprecated)]
fn enumerate(device_type: AudioDeviceType) -> anyhow::Result<Vec<AudioDevice>> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let devices: Vec<cpal::Device> = match device_type {
        AudioDeviceType::Input => host.input_devices()?.collect(),
        AudioDeviceType::Output => host.output_devices()?.collect(),
    };
    let mut listed = Vec::with_capacity(devices.len());
    for device in devices {
        match device.name() {
            // cpal opens devices by name, so the name doubles as the identifier.
            Ok(name) => listed.push(AudioDevice {
                guid: name.clone(),
                name,
            }),
            Err(e) => tracing::debug!("Skipping unnamed device: {e}"),
        }
    }
    Ok(listed)
}

#[cfg(not(feature = "cpal"))]
fn enumerate(_device_type: AudioDeviceType) -> anyhow::Result<Vec<AudioDevice>> {
    tracing::debug!("Built without the `cpal` feature, no audio host to query");
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "cpal")]
    #[test]
    fn listed_devices_can_be_selected_by_guid() {
        // No assumption about the machine's hardware beyond listing succeeding.
        for device_type in [AudioDeviceType::Input, AudioDeviceType::Output] {
            let devices = audio_devices(device_type);
            assert!(devices.iter().all(|d| !d.guid.is_empty() && d.guid == d.name));
        }
    }

    #[cfg(not(feature = "cpal"))]
    #[test]
    fn no_devices_without_an_audio_host() {
        assert!(audio_devices(AudioDeviceType::Input).is_empty());
        assert!(audio_devices(AudioDeviceType::Output).is_empty());
    }
}
