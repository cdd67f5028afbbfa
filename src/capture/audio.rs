use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Device;

use super::{CaptureError, CaptureResult, MediaTrack, TrackKind};

/// Substring that marks a virtual input mirroring system audio output.
pub const LOOPBACK_LABEL: &str = "Loopback";

/// An audio input device as reported by the host.
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// Which input device acquisition should request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSelection {
    /// A device whose label marked it as a system-audio loopback.
    Loopback(String),
    /// No loopback device found; use the default microphone.
    Default,
}

/// Enumerate the host's audio input devices.
pub fn list_input_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => devices
            .filter_map(|d| d.name().ok())
            .map(|name| AudioDeviceInfo {
                is_default: Some(&name) == default_name.as_ref(),
                name,
            })
            .collect(),
        Err(e) => {
            tracing::warn!("audio device enumeration failed: {}", e);
            Vec::new()
        }
    }
}

/// Pick the input device to record from.
///
/// Prefers the first device whose label contains [`LOOPBACK_LABEL`] so the
/// recording carries what the screen is playing; otherwise falls back to the
/// default microphone with a warning. The fallback is not an error.
pub fn select_input_device(devices: &[AudioDeviceInfo]) -> InputSelection {
    match devices.iter().find(|d| d.name.contains(LOOPBACK_LABEL)) {
        Some(device) => InputSelection::Loopback(device.name.clone()),
        None => {
            tracing::warn!("loopback device not found, defaulting to microphone");
            InputSelection::Default
        }
    }
}

fn resolve_device(selection: &InputSelection) -> CaptureResult<Device> {
    let host = cpal::default_host();
    match selection {
        InputSelection::Loopback(name) => {
            let mut devices = host
                .input_devices()
                .map_err(|e| CaptureError::Audio(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or(CaptureError::NoAudioDevice)
        }
        InputSelection::Default => host.default_input_device().ok_or(CaptureError::NoAudioDevice),
    }
}

/// Live audio-input track.
///
/// `cpal::Stream` is not `Send`, so a dedicated thread owns the stream and
/// keeps it alive until the track is stopped; samples flow out through a
/// channel from the stream callback.
pub struct AudioInputTrack {
    label: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioInputTrack {
    /// Open the selected device and start capturing.
    ///
    /// Returns the track, the sample receiver, and the stream's sample rate
    /// and channel count. Any failure to open or start the stream is a hard
    /// error; acquisition treats it as fatal for the whole start.
    pub fn open(
        selection: &InputSelection,
    ) -> CaptureResult<(Self, Receiver<Vec<f32>>, u32, u16)> {
        let (sample_tx, sample_rx) = channel::<Vec<f32>>();
        let (ready_tx, ready_rx) = channel::<Result<(String, u32, u16), String>>();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let selection = selection.clone();

        let handle = std::thread::spawn(move || {
            let device = match resolve_device(&selection) {
                Ok(d) => d,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let label = device.name().unwrap_or_else(|_| "unknown input".to_string());

            let config = match device.default_input_config() {
                Ok(c) => c,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("no input config: {}", e)));
                    return;
                }
            };
            let sample_rate = config.sample_rate().0;
            let channels = config.channels();

            let stream = match device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = sample_tx.send(data.to_vec());
                },
                |err| tracing::error!("audio input stream error: {}", err),
                None,
            ) {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to build input stream: {}", e)));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(format!("failed to start input stream: {}", e)));
                return;
            }

            let _ = ready_tx.send(Ok((label, sample_rate, channels)));

            // Keep the thread (and with it the stream) alive until stopped.
            while thread_running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
        });

        match ready_rx.recv() {
            Ok(Ok((label, sample_rate, channels))) => Ok((
                Self {
                    label,
                    running,
                    handle: Some(handle),
                },
                sample_rx,
                sample_rate,
                channels,
            )),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(CaptureError::Audio(e))
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(CaptureError::Audio("audio thread died during setup".into()))
            }
        }
    }
}

impl MediaTrack for AudioInputTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, is_default: bool) -> AudioDeviceInfo {
        AudioDeviceInfo {
            name: name.to_string(),
            is_default,
        }
    }

    #[test]
    fn test_loopback_device_wins() {
        let devices = vec![
            device("Built-in Microphone", true),
            device("Monitor of Speakers (Loopback)", false),
        ];
        assert_eq!(
            select_input_device(&devices),
            InputSelection::Loopback("Monitor of Speakers (Loopback)".to_string())
        );
    }

    #[test]
    fn test_first_loopback_wins_when_several_match() {
        let devices = vec![
            device("Loopback A", false),
            device("Loopback B", false),
        ];
        assert_eq!(
            select_input_device(&devices),
            InputSelection::Loopback("Loopback A".to_string())
        );
    }

    #[test]
    fn test_falls_back_to_default_microphone() {
        let devices = vec![device("Built-in Microphone", true)];
        assert_eq!(select_input_device(&devices), InputSelection::Default);
    }

    #[test]
    fn test_empty_enumeration_falls_back() {
        assert_eq!(select_input_device(&[]), InputSelection::Default);
    }

    #[test]
    fn test_label_match_is_case_sensitive() {
        // The heuristic matches the literal substring, not a normalized form.
        let devices = vec![device("loopback capture", false)];
        assert_eq!(select_input_device(&devices), InputSelection::Default);
    }
}
