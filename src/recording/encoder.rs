use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::capture::{StreamFormat, VideoFrame};

use super::session::EncoderBackend;
use super::{RecordError, RecordResult};

const VIDEO_CODEC: &str = "libvpx";
const AUDIO_CODEC: &str = "libopus";
const CHUNK_READ_SIZE: usize = 64 * 1024;
const FEED_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STDERR_TAIL_LEN: usize = 2000;

/// WebM encoder over an ffmpeg child process.
///
/// Raw RGBA frames go in on stdin and raw f32le samples on fd 3; the muxed
/// VP8+Opus container streams out of stdout and is surfaced as ordered binary
/// fragments. Pausing discards input at the feed threads, so the child stalls
/// on empty pipes and emits nothing until resumed. Closing both inputs makes
/// ffmpeg flush the container and exit, which is how `finish` drains the
/// final fragments.
pub struct FfmpegEncoder {
    child: Child,
    paused: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    chunk_rx: Receiver<Vec<u8>>,
    feeders: Vec<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<String>>,
    finished: bool,
}

/// Verify the ffmpeg build carries the codec pairing before committing to a
/// recording. A missing encoder is fatal here; there is no fallback pairing.
fn probe_encoders() -> RecordResult<()> {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| RecordError::EncoderUnavailable(format!("ffmpeg not found: {}", e)))?;

    let listing = String::from_utf8_lossy(&output.stdout);
    for codec in [VIDEO_CODEC, AUDIO_CODEC] {
        if !listing.contains(codec) {
            return Err(RecordError::EncoderUnavailable(format!(
                "ffmpeg build lacks the {} encoder",
                codec
            )));
        }
    }
    Ok(())
}

fn run_video_feed(
    format: StreamFormat,
    frames: Receiver<VideoFrame>,
    mut sink: std::process::ChildStdin,
    paused: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
) {
    use std::io::Write;
    use std::sync::mpsc::RecvTimeoutError;

    loop {
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        match frames.recv_timeout(FEED_POLL_INTERVAL) {
            Ok(frame) => {
                if paused.load(Ordering::SeqCst) {
                    continue;
                }
                // The rawvideo input has fixed geometry; a frame of any
                // other size would shear the whole stream.
                if frame.width != format.width || frame.height != format.height {
                    continue;
                }
                if let Err(e) = sink.write_all(&frame.data) {
                    tracing::warn!("video feed closed: {}", e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    // Dropping the sink signals EOF on the video input.
}

#[cfg(unix)]
fn run_audio_feed(
    samples: Receiver<Vec<f32>>,
    mut sink: std::io::PipeWriter,
    paused: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
) {
    use std::io::Write;
    use std::sync::mpsc::RecvTimeoutError;

    loop {
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        match samples.recv_timeout(FEED_POLL_INTERVAL) {
            Ok(block) => {
                if paused.load(Ordering::SeqCst) {
                    continue;
                }
                let mut bytes = Vec::with_capacity(block.len() * 4);
                for sample in block {
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }
                if let Err(e) = sink.write_all(&bytes) {
                    tracing::warn!("audio feed closed: {}", e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn run_chunk_reader(mut source: std::process::ChildStdout, chunk_tx: Sender<Vec<u8>>) {
    let mut buf = vec![0u8; CHUNK_READ_SIZE];
    loop {
        match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if chunk_tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("encoder output read error: {}", e);
                break;
            }
        }
    }
}

fn run_stderr_tail(mut source: std::process::ChildStderr) -> String {
    let mut text = String::new();
    let _ = source.read_to_string(&mut text);
    if text.len() > STDERR_TAIL_LEN {
        let mut cut = text.len() - STDERR_TAIL_LEN;
        while !text.is_char_boundary(cut) {
            cut += 1;
        }
        text.split_off(cut)
    } else {
        text
    }
}

impl FfmpegEncoder {
    /// Launch the encoder over the acquired streams.
    #[cfg(unix)]
    pub fn spawn(
        format: StreamFormat,
        frames: Receiver<VideoFrame>,
        samples: Receiver<Vec<f32>>,
    ) -> RecordResult<Self> {
        use std::os::unix::io::AsRawFd;
        use std::os::unix::process::CommandExt;

        probe_encoders()?;

        let (audio_read, audio_write) = std::io::pipe()?;
        let audio_fd = audio_read.as_raw_fd();

        let video_size = format!("{}x{}", format.width, format.height);
        let framerate = format.fps.to_string();
        let sample_rate = format.sample_rate.to_string();
        let channels = format.channels.to_string();

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
            .args(["-video_size", video_size.as_str()])
            .args(["-framerate", framerate.as_str()])
            .args(["-i", "pipe:0"])
            .args(["-f", "f32le"])
            .args(["-ar", sample_rate.as_str()])
            .args(["-ac", channels.as_str()])
            .args(["-i", "pipe:3"])
            .args(["-c:v", VIDEO_CODEC, "-deadline", "realtime", "-cpu-used", "5"])
            .args(["-c:a", AUDIO_CODEC])
            .args(["-f", "webm", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Hand the audio pipe's read end to the child as fd 3. dup2 clears
        // close-on-exec, so the fd survives into ffmpeg.
        unsafe {
            cmd.pre_exec(move || {
                if libc::dup2(audio_fd, 3) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| RecordError::EncoderUnavailable(format!("failed to launch ffmpeg: {}", e)))?;
        // The parent's copy of the read end is no longer needed.
        drop(audio_read);

        let video_sink = child
            .stdin
            .take()
            .ok_or_else(|| RecordError::EncoderFailed("missing encoder stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecordError::EncoderFailed("missing encoder stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RecordError::EncoderFailed("missing encoder stderr".into()))?;

        let paused = Arc::new(AtomicBool::new(false));
        let stopping = Arc::new(AtomicBool::new(false));
        let (chunk_tx, chunk_rx) = channel();

        let feeders = vec![
            {
                let paused = paused.clone();
                let stopping = stopping.clone();
                std::thread::spawn(move || {
                    run_video_feed(format, frames, video_sink, paused, stopping)
                })
            },
            {
                let paused = paused.clone();
                let stopping = stopping.clone();
                std::thread::spawn(move || run_audio_feed(samples, audio_write, paused, stopping))
            },
        ];
        let reader = std::thread::spawn(move || run_chunk_reader(stdout, chunk_tx));
        let stderr = std::thread::spawn(move || run_stderr_tail(stderr));

        tracing::info!(
            "ffmpeg encoder started: {}x{}@{}fps, {}Hz {}ch, {}+{}",
            format.width,
            format.height,
            format.fps,
            format.sample_rate,
            format.channels,
            VIDEO_CODEC,
            AUDIO_CODEC
        );

        Ok(Self {
            child,
            paused,
            stopping,
            chunk_rx,
            feeders,
            reader: Some(reader),
            stderr: Some(stderr),
            finished: false,
        })
    }

    #[cfg(not(unix))]
    pub fn spawn(
        _format: StreamFormat,
        _frames: Receiver<VideoFrame>,
        _samples: Receiver<Vec<f32>>,
    ) -> RecordResult<Self> {
        Err(RecordError::EncoderUnavailable(
            "streaming audio into the encoder requires a unix platform".into(),
        ))
    }

    fn shut_down_threads(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        for handle in self.feeders.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl EncoderBackend for FfmpegEncoder {
    fn pause(&mut self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn poll_chunks(&mut self) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        loop {
            match self.chunk_rx.try_recv() {
                Ok(chunk) => chunks.push(chunk),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        chunks
    }

    fn finish(&mut self) -> RecordResult<Vec<Vec<u8>>> {
        self.finished = true;

        // Feeders exit and drop their pipes; ffmpeg sees EOF on both inputs,
        // flushes the container, and exits, which ends the reader at EOF.
        self.shut_down_threads();
        let status = self.child.wait()?;

        let mut tail = Vec::new();
        while let Ok(chunk) = self.chunk_rx.try_recv() {
            tail.push(chunk);
        }

        if !status.success() {
            let detail = self
                .stderr
                .take()
                .and_then(|h| h.join().ok())
                .unwrap_or_default();
            return Err(RecordError::EncoderFailed(format!(
                "ffmpeg exited with {}: {}",
                status,
                detail.trim()
            )));
        }

        tracing::debug!("encoder flushed {} trailing fragments", tail.len());
        Ok(tail)
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Abandoned without a stop; don't leave the child running.
        let _ = self.child.kill();
        self.shut_down_threads();
        let _ = self.child.wait();
    }
}
