mod audio;
mod screen;

pub use audio::{list_input_devices, select_input_device, AudioDeviceInfo, AudioInputTrack,
    InputSelection};
pub use screen::DisplayTrack;

use std::sync::mpsc::Receiver;
use thiserror::Error;

/// Errors raised while acquiring capture streams.
///
/// All of these abort the whole start attempt; the UI collapses them into a
/// single generic message and keeps the detail in the log.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no monitor available for capture")]
    NoMonitor,

    #[error("screen capture failed: {0}")]
    Screen(String),

    #[error("no audio input device available")]
    NoAudioDevice,

    #[error("audio capture failed: {0}")]
    Audio(String),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// A live capture source owned by a [`CombinedStream`].
///
/// `stop` shuts the source down and must be safe to call more than once;
/// the stream guarantees it is invoked exactly once per track.
pub trait MediaTrack: Send {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> &str;

    fn stop(&mut self);
}

/// One raw RGBA frame from the display track.
#[derive(Debug)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Format of the acquired streams, as the encoder needs to see it.
#[derive(Debug, Clone, Copy)]
pub struct StreamFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Exclusive owner of the live tracks backing one recording.
///
/// Tracks are released exactly once, either through an explicit `release`
/// (normal stop, or acquisition-failure cleanup) or on drop as a leak
/// backstop.
pub struct CombinedStream {
    tracks: Vec<Box<dyn MediaTrack>>,
    released: bool,
}

impl CombinedStream {
    pub fn new(tracks: Vec<Box<dyn MediaTrack>>) -> Self {
        Self {
            tracks,
            released: false,
        }
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for track in &mut self.tracks {
            tracing::debug!("stopping {:?} track '{}'", track.kind(), track.label());
            track.stop();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for CombinedStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Everything acquisition hands to the encoder session.
pub struct AcquiredStreams {
    pub stream: CombinedStream,
    pub format: StreamFormat,
    pub frames: Receiver<VideoFrame>,
    pub samples: Receiver<Vec<f32>>,
}

/// Acquire the display and audio tracks and merge them into one stream.
///
/// Video is required and opened first. The audio device is chosen by the
/// loopback-label heuristic (see [`select_input_device`]); a missing loopback
/// device falls back to the default input with a warning, but any hard
/// failure on either leg aborts the whole acquisition and releases whatever
/// was already open.
pub fn acquire(fps: u32) -> CaptureResult<AcquiredStreams> {
    let (mut display, frames) = DisplayTrack::open(fps)?;
    let (width, height) = display.dimensions();

    let devices = list_input_devices();
    let selection = select_input_device(&devices);

    let (audio, samples, sample_rate, channels) = match AudioInputTrack::open(&selection) {
        Ok(opened) => opened,
        Err(e) => {
            display.stop();
            return Err(e);
        }
    };

    tracing::info!(
        "acquired streams: {}x{}@{}fps video, {}Hz {}ch audio from '{}'",
        width,
        height,
        fps,
        sample_rate,
        channels,
        audio.label()
    );

    Ok(AcquiredStreams {
        stream: CombinedStream::new(vec![Box::new(display), Box::new(audio)]),
        format: StreamFormat {
            width,
            height,
            fps,
            sample_rate,
            channels,
        },
        frames,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTrack {
        kind: TrackKind,
        stops: Arc<AtomicUsize>,
    }

    impl MediaTrack for CountingTrack {
        fn kind(&self) -> TrackKind {
            self.kind
        }

        fn label(&self) -> &str {
            "test"
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_stream() -> (CombinedStream, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let video_stops = Arc::new(AtomicUsize::new(0));
        let audio_stops = Arc::new(AtomicUsize::new(0));
        let stream = CombinedStream::new(vec![
            Box::new(CountingTrack {
                kind: TrackKind::Video,
                stops: video_stops.clone(),
            }),
            Box::new(CountingTrack {
                kind: TrackKind::Audio,
                stops: audio_stops.clone(),
            }),
        ]);
        (stream, video_stops, audio_stops)
    }

    #[test]
    fn test_release_stops_every_track_once() {
        let (mut stream, video_stops, audio_stops) = counting_stream();

        stream.release();
        stream.release();

        assert!(stream.is_released());
        assert_eq!(video_stops.load(Ordering::SeqCst), 1);
        assert_eq!(audio_stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_unreleased_stream() {
        let (stream, video_stops, audio_stops) = counting_stream();

        drop(stream);

        assert_eq!(video_stops.load(Ordering::SeqCst), 1);
        assert_eq!(audio_stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_after_release_does_not_double_stop() {
        let (mut stream, video_stops, _) = counting_stream();

        stream.release();
        drop(stream);

        assert_eq!(video_stops.load(Ordering::SeqCst), 1);
    }
}
