use crate::capture::CombinedStream;

use super::{Artifact, RecordResult};

/// State of an active encoder session.
///
/// Idle and stopped have no variant here: idle is the absence of a session
/// handle, and `stop` consumes the session, so a finalized session cannot be
/// touched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Recording,
    Paused,
}

/// The chunk-emitting encoder behind a session.
///
/// Implementations own their transport; the session only requires that
/// fragments come back in the order they were produced.
pub trait EncoderBackend: Send {
    /// Suspend encoding without discarding anything already buffered.
    fn pause(&mut self);

    /// Resume encoding after a pause.
    fn resume(&mut self);

    /// Drain whatever fragments are ready right now, without blocking.
    fn poll_chunks(&mut self) -> Vec<Vec<u8>>;

    /// Flush, shut the encoder down, and return any remaining fragments.
    fn finish(&mut self) -> RecordResult<Vec<Vec<u8>>>;
}

/// One in-flight recording: the encoder, its chunk buffer, and exclusive
/// ownership of the captured stream.
///
/// Fragments are appended in arrival order; zero-size fragments are dropped.
/// `stop` concatenates the buffer into the final artifact and releases every
/// stream track exactly once, success or not.
pub struct EncoderSession {
    state: SessionState,
    backend: Box<dyn EncoderBackend>,
    stream: CombinedStream,
    chunks: Vec<Vec<u8>>,
}

impl EncoderSession {
    pub fn new(stream: CombinedStream, backend: Box<dyn EncoderBackend>) -> Self {
        tracing::info!("encoder session started");
        Self {
            state: SessionState::Recording,
            backend,
            stream,
            chunks: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == SessionState::Paused
    }

    /// Total bytes buffered so far.
    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Move any pending fragments from the backend into the buffer.
    pub fn pump(&mut self) {
        for chunk in self.backend.poll_chunks() {
            if !chunk.is_empty() {
                self.chunks.push(chunk);
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state != SessionState::Recording {
            return;
        }
        self.pump();
        self.backend.pause();
        self.state = SessionState::Paused;
        tracing::info!("recording paused");
    }

    pub fn resume(&mut self) {
        if self.state != SessionState::Paused {
            return;
        }
        self.backend.resume();
        self.state = SessionState::Recording;
        tracing::info!("recording resumed");
    }

    /// Finalize the recording into an immutable artifact.
    pub fn stop(mut self) -> RecordResult<Artifact> {
        self.pump();
        let flushed = self.backend.finish();

        // Tracks go down exactly once whether or not the flush succeeded.
        self.stream.release();

        for chunk in flushed? {
            if !chunk.is_empty() {
                self.chunks.push(chunk);
            }
        }

        let total: usize = self.chunks.iter().map(Vec::len).sum();
        let mut data = Vec::with_capacity(total);
        for chunk in &self.chunks {
            data.extend_from_slice(chunk);
        }

        tracing::info!(
            "recording stopped: {} bytes in {} fragments",
            total,
            self.chunks.len()
        );
        Ok(Artifact::new(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MediaTrack, TrackKind};
    use crate::recording::RecordError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct CountingTrack {
        stops: Arc<AtomicUsize>,
    }

    impl MediaTrack for CountingTrack {
        fn kind(&self) -> TrackKind {
            TrackKind::Video
        }

        fn label(&self) -> &str {
            "test"
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct ScriptedBackend {
        pending: Arc<Mutex<VecDeque<Vec<u8>>>>,
        tail: Vec<Vec<u8>>,
        fail_on_finish: bool,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self::default()
        }

        // Handle for injecting fragments after the session owns the backend.
        fn feed(&self) -> Arc<Mutex<VecDeque<Vec<u8>>>> {
            self.pending.clone()
        }
    }

    impl EncoderBackend for ScriptedBackend {
        fn pause(&mut self) {}

        fn resume(&mut self) {}

        fn poll_chunks(&mut self) -> Vec<Vec<u8>> {
            self.pending.lock().unwrap().drain(..).collect()
        }

        fn finish(&mut self) -> RecordResult<Vec<Vec<u8>>> {
            if self.fail_on_finish {
                return Err(RecordError::EncoderFailed("scripted failure".into()));
            }
            Ok(std::mem::take(&mut self.tail))
        }
    }

    fn session_with(
        backend: ScriptedBackend,
    ) -> (EncoderSession, Arc<AtomicUsize>) {
        let stops = Arc::new(AtomicUsize::new(0));
        let stream = CombinedStream::new(vec![Box::new(CountingTrack {
            stops: stops.clone(),
        })]);
        (EncoderSession::new(stream, Box::new(backend)), stops)
    }

    // Feed fragments before and after a pause/resume cycle and check the
    // artifact preserves all of them in arrival order.
    #[test]
    fn test_pause_resume_keeps_fragments_in_order() {
        let backend = ScriptedBackend::new();
        let feed = backend.feed();
        let (mut session, _) = session_with(backend);

        feed.lock().unwrap().push_back(b"aa".to_vec());
        feed.lock().unwrap().push_back(b"bb".to_vec());
        session.pump();

        session.pause();
        assert!(session.is_paused());
        session.resume();
        assert_eq!(session.state(), SessionState::Recording);

        feed.lock().unwrap().push_back(b"cc".to_vec());
        session.pump();

        let artifact = session.stop().unwrap();
        assert_eq!(artifact.as_bytes(), b"aabbcc");
    }

    #[test]
    fn test_zero_size_fragments_are_dropped() {
        let mut backend = ScriptedBackend::new();
        backend.tail.push(Vec::new());
        let feed = backend.feed();
        let (mut session, _) = session_with(backend);

        feed.lock().unwrap().push_back(Vec::new());
        feed.lock().unwrap().push_back(b"data".to_vec());
        session.pump();
        assert_eq!(session.buffered_bytes(), 4);

        let artifact = session.stop().unwrap();
        assert_eq!(artifact.as_bytes(), b"data");
    }

    #[test]
    fn test_stop_appends_flushed_tail_after_buffer() {
        let mut backend = ScriptedBackend::new();
        backend.tail.push(b"tail".to_vec());
        backend
            .feed()
            .lock()
            .unwrap()
            .push_back(b"head".to_vec());
        let (session, _) = session_with(backend);

        // stop() pumps before finishing, so the pending fragment lands first.
        let artifact = session.stop().unwrap();
        assert_eq!(artifact.as_bytes(), b"headtail");
    }

    #[test]
    fn test_stop_releases_tracks_exactly_once() {
        let (session, stops) = session_with(ScriptedBackend::new());

        let _ = session.stop().unwrap();

        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_finish_still_releases_tracks() {
        let mut backend = ScriptedBackend::new();
        backend.fail_on_finish = true;
        let (session, stops) = session_with(backend);

        assert!(session.stop().is_err());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pause_is_noop_unless_recording() {
        let (mut session, _) = session_with(ScriptedBackend::new());

        session.pause();
        session.pause();
        assert!(session.is_paused());

        session.resume();
        session.resume();
        assert_eq!(session.state(), SessionState::Recording);
    }
}
