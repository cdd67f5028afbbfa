pub mod style;
pub mod views;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use iced::{Element, Subscription, Task, Theme};

use crate::capture::{self, AcquiredStreams};
use crate::config::Config;
use crate::recording::{Artifact, EncoderSession, FfmpegEncoder};

use self::style::MonochromeTheme;

/// The one user-facing message for any failed start, regardless of which leg
/// of acquisition or encoder setup failed. The precise cause goes to the log.
pub const START_FAILURE_MESSAGE: &str =
    "Failed to start recording. Please ensure you have granted necessary permissions.";

const MAX_NOTIFICATION_LEN: usize = 256;

#[derive(Debug, Clone)]
pub enum Message {
    StartPressed,
    CountdownTick,
    ElapsedTick,
    PauseToggled,
    StopPressed,
    SessionReady(SessionHandle),
    SessionFailed(String),
    SavePressed,
    SaveTo(Option<PathBuf>),
    SaveComplete(Result<String, String>),
    PreviewPressed,
}

/// Carries the freshly started session through an iced message.
///
/// Messages must be `Clone`, and a session is not, so the task parks it in a
/// shared slot and `update` takes it out exactly once.
#[derive(Clone)]
pub struct SessionHandle(Arc<Mutex<Option<EncoderSession>>>);

impl SessionHandle {
    fn new(session: EncoderSession) -> Self {
        Self(Arc::new(Mutex::new(Some(session))))
    }

    fn take(&self) -> Option<EncoderSession> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionHandle(..)")
    }
}

pub struct App {
    config: Config,
    theme: MonochromeTheme,
    countdown: u32,
    elapsed_secs: u64,
    acquiring: bool,
    session: Option<EncoderSession>,
    artifact: Option<Artifact>,
    error: Option<String>,
    last_saved: Option<PathBuf>,
    preview_file: Option<tempfile::TempPath>,
}

impl App {
    pub fn new() -> (Self, Task<Message>) {
        let config = Config::load().unwrap_or_default();
        let theme = match config.ui.theme {
            crate::config::Theme::Dark => MonochromeTheme::dark(),
            crate::config::Theme::Light => MonochromeTheme::light(),
        };

        let app = Self {
            config,
            theme,
            countdown: 0,
            elapsed_secs: 0,
            acquiring: false,
            session: None,
            artifact: None,
            error: None,
            last_saved: None,
            preview_file: None,
        };

        (app, Task::none())
    }

    pub fn title(&self) -> String {
        match &self.session {
            Some(session) if session.is_paused() => String::from("screenrec - paused"),
            Some(_) => String::from("screenrec - recording"),
            None if self.countdown > 0 => String::from("screenrec - starting"),
            None => String::from("screenrec"),
        }
    }

    pub fn theme(&self) -> Theme {
        if self.theme.is_dark {
            Theme::Dark
        } else {
            Theme::Light
        }
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::StartPressed => {
                if self.session.is_some() || self.acquiring || self.countdown > 0 {
                    return Task::none();
                }
                self.elapsed_secs = 0;
                self.error = None;
                self.artifact = None;
                self.last_saved = None;
                // Dropping the handle deletes any lingering preview file.
                self.preview_file = None;
                self.countdown = self.config.capture.countdown_secs;
                if self.countdown == 0 {
                    return self.begin_recording();
                }
            }
            Message::CountdownTick => {
                if self.countdown > 0 {
                    self.countdown -= 1;
                    // The session starts on the 1 -> 0 transition only, and
                    // only when no session exists and none is being set up.
                    // A stray tick at zero can never re-trigger it.
                    if self.countdown == 0 && self.session.is_none() && !self.acquiring {
                        return self.begin_recording();
                    }
                }
            }
            Message::ElapsedTick => {
                if let Some(session) = &mut self.session {
                    if !session.is_paused() {
                        self.elapsed_secs += 1;
                    }
                    session.pump();
                }
            }
            Message::PauseToggled => {
                if let Some(session) = &mut self.session {
                    if session.is_paused() {
                        session.resume();
                    } else {
                        session.pause();
                    }
                }
            }
            Message::StopPressed => {
                let Some(session) = self.session.take() else {
                    return Task::none();
                };
                match session.stop() {
                    Ok(artifact) => {
                        tracing::info!("recording finalized: {} bytes", artifact.len());
                        self.artifact = Some(artifact);
                    }
                    Err(e) => {
                        tracing::error!("failed to finalize recording: {}", e);
                        self.error = Some(String::from("Recording failed while finalizing."));
                    }
                }
            }
            Message::SessionReady(handle) => {
                self.acquiring = false;
                match handle.take() {
                    Some(session) if self.session.is_none() => {
                        self.error = None;
                        self.session = Some(session);
                    }
                    Some(_) => {
                        // A session already exists; dropping the new one
                        // releases its stream and encoder.
                        tracing::warn!("discarding duplicate session");
                    }
                    None => {}
                }
            }
            Message::SessionFailed(detail) => {
                tracing::error!("failed to start recording: {}", detail);
                self.acquiring = false;
                self.countdown = 0;
                self.session = None;
                self.error = Some(START_FAILURE_MESSAGE.to_string());
            }
            Message::SavePressed => {
                if let Some(artifact) = &self.artifact {
                    let filename = artifact.suggested_filename();
                    let directory = self.config.output.directory.clone();
                    return Task::perform(
                        async move {
                            rfd::AsyncFileDialog::new()
                                .set_directory(&directory)
                                .add_filter("WebM video", &["webm"])
                                .set_file_name(filename)
                                .save_file()
                                .await
                                .map(|h| h.path().to_path_buf())
                        },
                        Message::SaveTo,
                    );
                }
            }
            Message::SaveTo(path) => {
                if let (Some(path), Some(artifact)) = (path, self.artifact.clone()) {
                    return Task::perform(
                        async move {
                            match artifact.write_to(&path) {
                                Ok(()) => Ok(path.to_string_lossy().to_string()),
                                Err(e) => Err(e.to_string()),
                            }
                        },
                        Message::SaveComplete,
                    );
                }
            }
            Message::SaveComplete(result) => match result {
                Ok(path) => {
                    tracing::info!("recording saved to {}", path);
                    self.last_saved = Some(PathBuf::from(&path));
                    if self.config.ui.show_notifications {
                        let _ = show_notification("Recording Saved", &path);
                    }
                }
                Err(e) => {
                    tracing::error!("failed to save recording: {}", e);
                    if self.config.ui.show_notifications {
                        let _ = show_notification("Save Failed", &e);
                    }
                }
            },
            Message::PreviewPressed => {
                if let Some(artifact) = &self.artifact {
                    match artifact.materialize_preview() {
                        Ok(path) => {
                            open_with_system(&path);
                            // Replacing the handle deletes the previous
                            // preview file.
                            self.preview_file = Some(path);
                        }
                        Err(e) => tracing::warn!("failed to materialize preview: {}", e),
                    }
                }
            }
        }
        Task::none()
    }

    fn begin_recording(&mut self) -> Task<Message> {
        self.acquiring = true;
        let fps = self.config.capture.fps;
        Task::perform(async move { start_session(fps) }, |result| match result {
            Ok(handle) => Message::SessionReady(handle),
            Err(detail) => Message::SessionFailed(detail),
        })
    }

    pub fn view(&self) -> Element<'_, Message> {
        views::RecorderView::view(
            &self.theme,
            self.countdown,
            self.elapsed_secs,
            self.session.as_ref().map(|s| s.state()),
            self.artifact.as_ref(),
            self.error.as_deref(),
        )
    }

    /// Two mutually exclusive one-second tickers: the countdown runs only
    /// while counting down, the elapsed ticker only while recording unpaused.
    pub fn subscription(&self) -> Subscription<Message> {
        let mut subs = Vec::with_capacity(2);
        if self.countdown > 0 {
            subs.push(iced::time::every(Duration::from_secs(1)).map(|_| Message::CountdownTick));
        }
        if self.session.as_ref().is_some_and(|s| !s.is_paused()) {
            subs.push(iced::time::every(Duration::from_secs(1)).map(|_| Message::ElapsedTick));
        }
        Subscription::batch(subs)
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new().0
    }
}

/// Acquire the streams and bring up the encoder, all-or-nothing.
fn start_session(fps: u32) -> Result<SessionHandle, String> {
    let AcquiredStreams {
        mut stream,
        format,
        frames,
        samples,
    } = capture::acquire(fps).map_err(|e| e.to_string())?;

    match FfmpegEncoder::spawn(format, frames, samples) {
        Ok(backend) => Ok(SessionHandle::new(EncoderSession::new(
            stream,
            Box::new(backend),
        ))),
        Err(e) => {
            stream.release();
            Err(e.to_string())
        }
    }
}

fn open_with_system(path: &Path) {
    #[cfg(target_os = "macos")]
    let result = std::process::Command::new("open").arg(path).spawn();

    #[cfg(target_os = "windows")]
    let result = std::process::Command::new("cmd")
        .args(["/C", "start", ""])
        .arg(path)
        .spawn();

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let result = std::process::Command::new("xdg-open").arg(path).spawn();

    match result {
        Ok(_) => {}
        Err(e) => tracing::warn!("failed to open {} with system handler: {}", path.display(), e),
    }
}

fn sanitize_notification_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .take(MAX_NOTIFICATION_LEN)
        .collect()
}

fn show_notification(title: &str, body: &str) -> Result<()> {
    let safe_title = sanitize_notification_text(title);
    let safe_body = sanitize_notification_text(body);

    #[cfg(not(target_os = "macos"))]
    {
        notify_rust::Notification::new()
            .summary(&safe_title)
            .body(&safe_body)
            .timeout(notify_rust::Timeout::Milliseconds(3000))
            .show()?;
    }

    #[cfg(target_os = "macos")]
    {
        notify_rust::Notification::new()
            .summary(&safe_title)
            .body(&safe_body)
            .show()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CombinedStream;
    use crate::recording::{EncoderBackend, RecordResult};

    struct NullBackend;

    impl EncoderBackend for NullBackend {
        fn pause(&mut self) {}

        fn resume(&mut self) {}

        fn poll_chunks(&mut self) -> Vec<Vec<u8>> {
            Vec::new()
        }

        fn finish(&mut self) -> RecordResult<Vec<Vec<u8>>> {
            Ok(vec![b"bytes".to_vec()])
        }
    }

    fn test_app() -> App {
        App {
            config: Config::default(),
            theme: MonochromeTheme::dark(),
            countdown: 0,
            elapsed_secs: 0,
            acquiring: false,
            session: None,
            artifact: None,
            error: None,
            last_saved: None,
            preview_file: None,
        }
    }

    fn null_session() -> EncoderSession {
        EncoderSession::new(CombinedStream::new(Vec::new()), Box::new(NullBackend))
    }

    #[test]
    fn test_start_runs_full_countdown_then_triggers_once() {
        let mut app = test_app();

        let _ = app.update(Message::StartPressed);
        assert_eq!(app.countdown, 3);
        assert_eq!(app.elapsed_secs, 0);
        assert!(!app.acquiring);

        let _ = app.update(Message::CountdownTick);
        assert_eq!(app.countdown, 2);
        let _ = app.update(Message::CountdownTick);
        assert_eq!(app.countdown, 1);
        assert!(!app.acquiring);

        let _ = app.update(Message::CountdownTick);
        assert_eq!(app.countdown, 0);
        assert!(app.acquiring);

        // A stray tick at zero must not re-trigger the start.
        let _ = app.update(Message::CountdownTick);
        assert_eq!(app.countdown, 0);
        assert!(app.session.is_none());
    }

    #[test]
    fn test_start_is_ignored_while_counting_or_acquiring() {
        let mut app = test_app();

        let _ = app.update(Message::StartPressed);
        let _ = app.update(Message::CountdownTick);
        assert_eq!(app.countdown, 2);

        // Pressing start again mid-countdown does not reset the counter.
        let _ = app.update(Message::StartPressed);
        assert_eq!(app.countdown, 2);

        let _ = app.update(Message::CountdownTick);
        let _ = app.update(Message::CountdownTick);
        assert!(app.acquiring);
        let _ = app.update(Message::StartPressed);
        assert_eq!(app.countdown, 0);
        assert!(app.acquiring);
    }

    #[test]
    fn test_acquisition_failure_resets_ui_state() {
        let mut app = test_app();

        let _ = app.update(Message::StartPressed);
        for _ in 0..3 {
            let _ = app.update(Message::CountdownTick);
        }
        assert!(app.acquiring);

        let _ = app.update(Message::SessionFailed(String::from("permission denied")));

        assert!(!app.acquiring);
        assert_eq!(app.countdown, 0);
        assert!(app.session.is_none());
        assert!(app.artifact.is_none());
        assert_eq!(app.error.as_deref(), Some(START_FAILURE_MESSAGE));

        // Nothing left that could restart the session on its own.
        let _ = app.update(Message::CountdownTick);
        assert!(!app.acquiring);
        assert!(app.session.is_none());
    }

    #[test]
    fn test_session_ready_installs_session() {
        let mut app = test_app();
        app.acquiring = true;

        let _ = app.update(Message::SessionReady(SessionHandle::new(null_session())));

        assert!(!app.acquiring);
        assert!(app.session.is_some());
        assert!(app.error.is_none());
    }

    #[test]
    fn test_stop_finalizes_and_second_stop_is_noop() {
        let mut app = test_app();
        app.session = Some(null_session());

        let _ = app.update(Message::StopPressed);
        assert!(app.session.is_none());
        let size = app.artifact.as_ref().map(|a| a.len());
        assert_eq!(size, Some(5));

        let _ = app.update(Message::StopPressed);
        assert!(app.session.is_none());
        assert_eq!(app.artifact.as_ref().map(|a| a.len()), size);
    }

    #[test]
    fn test_stop_without_session_is_noop() {
        let mut app = test_app();

        let _ = app.update(Message::StopPressed);

        assert!(app.session.is_none());
        assert!(app.artifact.is_none());
        assert!(app.error.is_none());
    }

    #[test]
    fn test_pause_toggle_flips_session_state() {
        let mut app = test_app();
        app.session = Some(null_session());

        let _ = app.update(Message::PauseToggled);
        assert!(app.session.as_ref().unwrap().is_paused());

        let _ = app.update(Message::PauseToggled);
        assert!(!app.session.as_ref().unwrap().is_paused());

        // Without a session the toggle does nothing.
        app.session = None;
        let _ = app.update(Message::PauseToggled);
        assert!(app.session.is_none());
    }

    #[test]
    fn test_elapsed_tick_counts_only_while_unpaused() {
        let mut app = test_app();

        let _ = app.update(Message::ElapsedTick);
        assert_eq!(app.elapsed_secs, 0);

        app.session = Some(null_session());
        let _ = app.update(Message::ElapsedTick);
        let _ = app.update(Message::ElapsedTick);
        assert_eq!(app.elapsed_secs, 2);

        let _ = app.update(Message::PauseToggled);
        let _ = app.update(Message::ElapsedTick);
        assert_eq!(app.elapsed_secs, 2);
    }

    #[test]
    fn test_new_start_discards_previous_artifact_and_error() {
        let mut app = test_app();
        app.session = Some(null_session());
        let _ = app.update(Message::StopPressed);
        assert!(app.artifact.is_some());
        app.error = Some(String::from("stale"));
        app.elapsed_secs = 42;

        let _ = app.update(Message::StartPressed);

        assert!(app.artifact.is_none());
        assert!(app.error.is_none());
        assert_eq!(app.elapsed_secs, 0);
        assert_eq!(app.countdown, 3);
    }
}
