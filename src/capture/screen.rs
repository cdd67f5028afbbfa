use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::RgbaImage;
use xcap::Monitor;

use super::{CaptureError, CaptureResult, MediaTrack, TrackKind, VideoFrame};

// Frames waiting to be encoded; beyond this the grabber drops frames rather
// than growing without bound when the encoder stalls.
const FRAME_QUEUE_DEPTH: usize = 8;

fn capture_monitor(id: u32) -> CaptureResult<RgbaImage> {
    let monitors = Monitor::all().map_err(|e| CaptureError::Screen(e.to_string()))?;
    let monitor = monitors
        .into_iter()
        .find(|m| m.id() == id)
        .ok_or(CaptureError::NoMonitor)?;
    monitor
        .capture_image()
        .map_err(|e| CaptureError::Screen(e.to_string()))
}

/// Live display-capture track over the primary monitor.
///
/// A grabber thread captures frames at the requested rate and pushes them
/// into a bounded channel until the track is stopped or the receiver goes
/// away.
pub struct DisplayTrack {
    label: String,
    width: u32,
    height: u32,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DisplayTrack {
    /// Open the track. The first frame is captured synchronously: it both
    /// validates that screen capture is actually permitted and pins the frame
    /// dimensions for the rest of the recording.
    pub fn open(fps: u32) -> CaptureResult<(Self, Receiver<VideoFrame>)> {
        let monitors = Monitor::all().map_err(|e| CaptureError::Screen(e.to_string()))?;
        let monitor = monitors
            .into_iter()
            .find(|m| m.is_primary())
            .ok_or(CaptureError::NoMonitor)?;
        let monitor_id = monitor.id();
        let label = monitor.name().to_string();

        let first = monitor
            .capture_image()
            .map_err(|e| CaptureError::Screen(e.to_string()))?;
        let (width, height) = (first.width(), first.height());

        let (tx, rx) = sync_channel(FRAME_QUEUE_DEPTH);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let fps = fps.max(1);

        let handle = std::thread::spawn(move || {
            let frame_duration = Duration::from_secs_f64(1.0 / fps as f64);

            let mut pending = Some(first);
            while thread_running.load(Ordering::SeqCst) {
                let frame_start = Instant::now();

                let image = match pending.take() {
                    Some(img) => Ok(img),
                    None => capture_monitor(monitor_id),
                };

                match image {
                    Ok(img) if img.width() == width && img.height() == height => {
                        let frame = VideoFrame {
                            data: img.into_raw(),
                            width,
                            height,
                        };
                        // Full queue: drop the frame. Disconnected: the
                        // encoder is gone, nothing left to feed.
                        match tx.try_send(frame) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                tracing::trace!("frame queue full, dropping frame");
                            }
                            Err(TrySendError::Disconnected(_)) => break,
                        }
                    }
                    Ok(img) => {
                        // Resolution changed mid-recording (display
                        // reconfigured); skip rather than feed a frame the
                        // encoder's fixed geometry cannot accept.
                        tracing::warn!(
                            "skipping {}x{} frame, expected {}x{}",
                            img.width(),
                            img.height(),
                            width,
                            height
                        );
                    }
                    Err(e) => {
                        tracing::warn!("screen capture error: {}", e);
                    }
                }

                let elapsed = frame_start.elapsed();
                if elapsed < frame_duration {
                    std::thread::sleep(frame_duration - elapsed);
                }
            }
        });

        Ok((
            Self {
                label,
                width,
                height,
                running,
                handle: Some(handle),
            },
            rx,
        ))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl MediaTrack for DisplayTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
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
