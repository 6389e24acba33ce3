//! Recording session controller.
//!
//! Owns the single capture session and the single playback buffer, and exposes
//! the start/pause/resume/stop/play operations as a guarded state machine:
//!
//! ```text
//! Idle --start--> Recording --pause--> Paused --resume--> Recording
//!                 Recording/Paused --stop--> Idle (+ playback buffer)
//! ```
//!
//! Operations requested in the wrong mode are logged and ignored.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::error::RecorderError;
use super::service::{AudioService, Permission, QualityPreset, SessionOptions};

/// Which operations are currently valid. Derived from the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Idle,
    Recording,
    Paused,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Recording => write!(f, "recording"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// An in-progress microphone recording.
struct CaptureSession<H> {
    handle: H,
    started_at: Instant,
    paused_total: Duration,
    paused_at: Option<Instant>,
}

impl<H> CaptureSession<H> {
    fn new(handle: H) -> Self {
        Self {
            handle,
            started_at: Instant::now(),
            paused_total: Duration::ZERO,
            paused_at: None,
        }
    }

    fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    fn mark_paused(&mut self) {
        self.paused_at = Some(Instant::now());
    }

    fn mark_resumed(&mut self) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += paused_at.elapsed();
        }
    }

    /// Recorded time, excluding pauses.
    fn elapsed(&self) -> Duration {
        let mut paused = self.paused_total;
        if let Some(paused_at) = self.paused_at {
            paused += paused_at.elapsed();
        }
        self.started_at.elapsed().saturating_sub(paused)
    }
}

/// A loaded recording ready to be replayed.
struct PlaybackBuffer<B> {
    handle: B,
    source: PathBuf,
}

/// Mediates between user intents and an [`AudioService`].
///
/// Every operation borrows the controller mutably, so two operations can never
/// run at the same time; a second start arriving after the first resolved finds
/// a live session and is ignored.
pub struct RecordingController<S: AudioService> {
    service: S,
    options: SessionOptions,
    preset: QualityPreset,
    session: Option<CaptureSession<S::Session>>,
    buffer: Option<PlaybackBuffer<S::Buffer>>,
    last_recording: Option<PathBuf>,
}

impl<S: AudioService> RecordingController<S> {
    pub fn new(service: S, options: SessionOptions, preset: QualityPreset) -> Self {
        Self {
            service,
            options,
            preset,
            session: None,
            buffer: None,
            last_recording: None,
        }
    }

    pub fn mode(&self) -> SessionMode {
        match &self.session {
            None => SessionMode::Idle,
            Some(session) if session.is_paused() => SessionMode::Paused,
            Some(_) => SessionMode::Recording,
        }
    }

    /// Whether a play request would be carried out now.
    pub fn can_play(&self) -> bool {
        self.buffer.is_some()
            && (self.mode() == SessionMode::Idle || !self.options.exclusive_capture_during_recording)
    }

    /// Location of the most recently finalized recording.
    pub fn last_recording(&self) -> Option<&Path> {
        self.last_recording.as_deref()
    }

    /// Source of the loaded playback buffer, if any.
    pub fn playback_source(&self) -> Option<&Path> {
        self.buffer.as_ref().map(|buffer| buffer.source.as_path())
    }

    /// Recorded time of the live session, excluding pauses.
    pub fn elapsed(&self) -> Duration {
        self.session
            .as_ref()
            .map(CaptureSession::elapsed)
            .unwrap_or_default()
    }

    /// Samples from the last `window` of the live session, for level metering.
    pub fn meter_samples(&self, window: Duration) -> Vec<i16> {
        match &self.session {
            Some(session) if !session.is_paused() => {
                self.service.recent_samples(&session.handle, window)
            }
            _ => Vec::new(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn request_start(&mut self) -> Result<(), RecorderError> {
        absorb_invalid(self.start().await)
    }

    pub fn request_pause(&mut self) -> Result<(), RecorderError> {
        absorb_invalid(self.pause())
    }

    pub fn request_resume(&mut self) -> Result<(), RecorderError> {
        absorb_invalid(self.resume())
    }

    /// Single pause/resume intent.
    pub fn toggle_pause(&mut self) -> Result<(), RecorderError> {
        match self.mode() {
            SessionMode::Recording => self.request_pause(),
            SessionMode::Paused => self.request_resume(),
            SessionMode::Idle => absorb_invalid(Err(RecorderError::InvalidTransition {
                operation: "pause",
                mode: SessionMode::Idle,
            })),
        }
    }

    pub async fn request_stop(&mut self) -> Result<(), RecorderError> {
        absorb_invalid(self.stop().await)
    }

    pub fn request_play(&mut self) -> Result<(), RecorderError> {
        absorb_invalid(self.play())
    }

    /// Finalizes a live session without loading it for playback.
    ///
    /// Used when leaving the recorder: the file is kept, the buffer is never
    /// needed. No-op while idle.
    pub async fn finish(&mut self) -> Result<(), RecorderError> {
        absorb_invalid(self.finalize_session().await.map(|_| ()))
    }

    /// Releases the live session (without finalizing it) and the playback buffer.
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!("Discarding live capture session on shutdown");
            self.service.release_session(session.handle);
        }
        if let Some(buffer) = self.buffer.take() {
            tracing::debug!("Releasing playback buffer {}", buffer.source.display());
            self.service.release_buffer(buffer.handle);
        }
    }

    async fn start(&mut self) -> Result<(), RecorderError> {
        self.expect_mode("start", &[SessionMode::Idle])?;

        match self.service.request_microphone_permission().await {
            Ok(Permission::Granted) => {}
            Ok(Permission::Denied) => {
                tracing::warn!("Microphone permission denied");
                return Err(RecorderError::PermissionDenied);
            }
            Err(e) => {
                tracing::error!("Microphone permission request failed: {}", e);
                return Err(e);
            }
        }

        self.service
            .configure_session(&self.options)
            .await
            .inspect_err(|e| tracing::error!("Failed to configure audio session: {}", e))?;

        let handle = self
            .service
            .begin_capture(self.preset)
            .await
            .inspect_err(|e| tracing::error!("Failed to start recording: {}", e))?;

        self.session = Some(CaptureSession::new(handle));
        tracing::info!("Recording started ({} quality)", self.preset);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), RecorderError> {
        self.expect_mode("pause", &[SessionMode::Recording])?;
        if let Some(session) = self.session.as_mut() {
            self.service.pause(&mut session.handle)?;
            session.mark_paused();
            tracing::debug!("Recording paused at {:.1}s", session.elapsed().as_secs_f32());
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), RecorderError> {
        self.expect_mode("resume", &[SessionMode::Paused])?;
        if let Some(session) = self.session.as_mut() {
            self.service.resume(&mut session.handle)?;
            session.mark_resumed();
            tracing::debug!("Recording resumed");
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RecorderError> {
        let location = self.finalize_session().await?;

        if let Some(previous) = self.buffer.take() {
            tracing::debug!("Releasing previous playback buffer {}", previous.source.display());
            self.service.release_buffer(previous.handle);
        }

        let handle = self
            .service
            .load_buffer(&location)
            .await
            .inspect_err(|e| tracing::error!("Failed to load recording for playback: {}", e))?;
        self.buffer = Some(PlaybackBuffer {
            handle,
            source: location,
        });
        Ok(())
    }

    /// Takes the live session and finalizes it, recording where it landed.
    async fn finalize_session(&mut self) -> Result<PathBuf, RecorderError> {
        self.expect_mode("stop", &[SessionMode::Recording, SessionMode::Paused])?;
        let Some(session) = self.session.take() else {
            return Err(RecorderError::InvalidTransition {
                operation: "stop",
                mode: SessionMode::Idle,
            });
        };

        let duration = session.elapsed();
        let location = self
            .service
            .finalize(session.handle)
            .await
            .inspect_err(|e| tracing::error!("Failed to finalize recording: {}", e))?;
        tracing::info!(
            "Recording saved at: {} ({:.2}s)",
            location.display(),
            duration.as_secs_f32()
        );
        self.last_recording = Some(location.clone());
        Ok(location)
    }

    fn play(&mut self) -> Result<(), RecorderError> {
        let mode = self.mode();
        if self.options.exclusive_capture_during_recording && mode != SessionMode::Idle {
            return Err(RecorderError::InvalidTransition {
                operation: "play",
                mode,
            });
        }
        let Some(buffer) = self.buffer.as_ref() else {
            return Err(RecorderError::InvalidTransition {
                operation: "play",
                mode,
            });
        };
        self.service
            .play(&buffer.handle)
            .inspect_err(|e| tracing::error!("Playback failed: {}", e))?;
        tracing::info!("Playing {}", buffer.source.display());
        Ok(())
    }

    fn expect_mode(
        &self,
        operation: &'static str,
        allowed: &[SessionMode],
    ) -> Result<(), RecorderError> {
        let mode = self.mode();
        if allowed.contains(&mode) {
            Ok(())
        } else {
            Err(RecorderError::InvalidTransition { operation, mode })
        }
    }
}

impl<S: AudioService> Drop for RecordingController<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Turns a precondition violation into a logged no-op.
fn absorb_invalid(result: Result<(), RecorderError>) -> Result<(), RecorderError> {
    match result {
        Err(RecorderError::InvalidTransition { operation, mode }) => {
            tracing::debug!("Ignoring {} request while {}", operation, mode);
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Permission,
        Configure(SessionOptions),
        Begin(QualityPreset),
        Pause(u32),
        Resume(u32),
        Finalize(u32),
        Load(PathBuf),
        Play(u32),
        ReleaseSession(u32),
        ReleaseBuffer(u32),
    }

    /// Scripted in-memory service recording every call it receives.
    #[derive(Default)]
    struct FakeService {
        calls: Rc<RefCell<Vec<Call>>>,
        deny_permission: bool,
        fail_configure: bool,
        fail_begin: bool,
        fail_pause: bool,
        fail_finalize: bool,
        fail_load: bool,
        next_id: u32,
    }

    impl FakeService {
        fn new() -> (Self, Rc<RefCell<Vec<Call>>>) {
            let service = Self::default();
            let calls = Rc::clone(&service.calls);
            (service, calls)
        }

        fn record(&self, call: Call) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl AudioService for FakeService {
        type Session = u32;
        type Buffer = u32;

        async fn request_microphone_permission(&mut self) -> Result<Permission, RecorderError> {
            self.record(Call::Permission);
            tokio::task::yield_now().await;
            Ok(if self.deny_permission {
                Permission::Denied
            } else {
                Permission::Granted
            })
        }

        async fn configure_session(&mut self, options: &SessionOptions) -> Result<(), RecorderError> {
            self.record(Call::Configure(*options));
            if self.fail_configure {
                return Err(RecorderError::DeviceUnavailable("session busy".into()));
            }
            Ok(())
        }

        async fn begin_capture(&mut self, preset: QualityPreset) -> Result<u32, RecorderError> {
            self.record(Call::Begin(preset));
            if self.fail_begin {
                return Err(RecorderError::DeviceUnavailable("no input device".into()));
            }
            self.next_id += 1;
            Ok(self.next_id)
        }

        fn pause(&mut self, session: &mut u32) -> Result<(), RecorderError> {
            self.record(Call::Pause(*session));
            if self.fail_pause {
                return Err(RecorderError::DeviceUnavailable("stream lost".into()));
            }
            Ok(())
        }

        fn resume(&mut self, session: &mut u32) -> Result<(), RecorderError> {
            self.record(Call::Resume(*session));
            if self.fail_pause {
                return Err(RecorderError::DeviceUnavailable("stream lost".into()));
            }
            Ok(())
        }

        async fn finalize(&mut self, session: u32) -> Result<PathBuf, RecorderError> {
            self.record(Call::Finalize(session));
            if self.fail_finalize {
                return Err(RecorderError::Storage("disk full".into()));
            }
            Ok(PathBuf::from(format!("/tmp/take-{session}.wav")))
        }

        async fn load_buffer(&mut self, location: &Path) -> Result<u32, RecorderError> {
            self.record(Call::Load(location.to_path_buf()));
            if self.fail_load {
                return Err(RecorderError::Storage("unreadable".into()));
            }
            self.next_id += 1;
            Ok(self.next_id)
        }

        fn play(&mut self, buffer: &u32) -> Result<(), RecorderError> {
            self.record(Call::Play(*buffer));
            Ok(())
        }

        fn release_session(&mut self, session: u32) {
            self.record(Call::ReleaseSession(session));
        }

        fn release_buffer(&mut self, buffer: u32) {
            self.record(Call::ReleaseBuffer(buffer));
        }
    }

    fn controller(service: FakeService) -> RecordingController<FakeService> {
        RecordingController::new(service, SessionOptions::default(), QualityPreset::High)
    }

    fn count(calls: &Rc<RefCell<Vec<Call>>>, pred: impl Fn(&Call) -> bool) -> usize {
        calls.borrow().iter().filter(|c| pred(c)).count()
    }

    #[tokio::test]
    async fn test_full_cycle_then_single_play() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);

        ctl.request_start().await.unwrap();
        assert_eq!(ctl.mode(), SessionMode::Recording);
        ctl.request_pause().unwrap();
        assert_eq!(ctl.mode(), SessionMode::Paused);
        ctl.request_resume().unwrap();
        assert_eq!(ctl.mode(), SessionMode::Recording);
        ctl.request_stop().await.unwrap();

        assert_eq!(ctl.mode(), SessionMode::Idle);
        assert!(ctl.can_play());
        assert_eq!(ctl.last_recording(), Some(Path::new("/tmp/take-1.wav")));

        ctl.request_play().unwrap();
        assert_eq!(count(&calls, |c| matches!(c, Call::Play(_))), 1);
        assert_eq!(
            *calls.borrow(),
            vec![
                Call::Permission,
                Call::Configure(SessionOptions::default()),
                Call::Begin(QualityPreset::High),
                Call::Pause(1),
                Call::Resume(1),
                Call::Finalize(1),
                Call::Load(PathBuf::from("/tmp/take-1.wav")),
                Call::Play(2),
            ]
        );
    }

    #[tokio::test]
    async fn test_permission_denied_stays_idle() {
        let (mut service, calls) = FakeService::new();
        service.deny_permission = true;
        let mut ctl = controller(service);

        let result = ctl.request_start().await;

        assert_eq!(result, Err(RecorderError::PermissionDenied));
        assert_eq!(ctl.mode(), SessionMode::Idle);
        assert_eq!(count(&calls, |c| matches!(c, Call::Begin(_))), 0);
        assert_eq!(count(&calls, |c| matches!(c, Call::Configure(_))), 0);
    }

    #[tokio::test]
    async fn test_begin_failure_leaves_no_session() {
        let (mut service, _calls) = FakeService::new();
        service.fail_begin = true;
        let mut ctl = controller(service);

        let result = ctl.request_start().await;

        assert!(matches!(result, Err(RecorderError::DeviceUnavailable(_))));
        assert_eq!(ctl.mode(), SessionMode::Idle);
        assert!(ctl.request_stop().await.is_ok());
        assert!(!ctl.can_play());
    }

    #[tokio::test]
    async fn test_second_start_is_ignored() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);

        ctl.request_start().await.unwrap();
        ctl.request_start().await.unwrap();

        assert_eq!(ctl.mode(), SessionMode::Recording);
        assert_eq!(count(&calls, |c| matches!(c, Call::Begin(_))), 1);
        assert_eq!(count(&calls, |c| matches!(c, Call::Permission)), 1);
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_noop() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);

        ctl.request_stop().await.unwrap();

        assert!(calls.borrow().is_empty());
        assert!(!ctl.can_play());
        assert_eq!(ctl.last_recording(), None);
    }

    #[tokio::test]
    async fn test_stop_while_idle_keeps_existing_buffer() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);
        ctl.request_start().await.unwrap();
        ctl.request_stop().await.unwrap();
        let before = calls.borrow().len();

        ctl.request_stop().await.unwrap();

        assert_eq!(calls.borrow().len(), before);
        assert_eq!(ctl.playback_source(), Some(Path::new("/tmp/take-1.wav")));
    }

    #[tokio::test]
    async fn test_new_buffer_releases_previous() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);

        ctl.request_start().await.unwrap();
        ctl.request_stop().await.unwrap();
        ctl.request_start().await.unwrap();
        ctl.request_stop().await.unwrap();

        // Sessions get ids 1 and 3, buffers 2 and 4.
        assert_eq!(
            count(&calls, |c| matches!(c, Call::ReleaseBuffer(_))),
            1
        );
        let position = |target: &Call| calls.borrow().iter().position(|c| c == target);
        assert!(position(&Call::ReleaseBuffer(2)) < position(&Call::Load(PathBuf::from("/tmp/take-3.wav"))));
        assert_eq!(ctl.playback_source(), Some(Path::new("/tmp/take-3.wav")));

        ctl.request_play().unwrap();
        assert_eq!(calls.borrow().last(), Some(&Call::Play(4)));
    }

    #[tokio::test]
    async fn test_play_without_buffer_does_nothing() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);

        assert!(ctl.request_play().is_ok());
        assert!(calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_play_restarts_same_buffer() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);
        ctl.request_start().await.unwrap();
        ctl.request_stop().await.unwrap();

        ctl.request_play().unwrap();
        ctl.request_play().unwrap();
        ctl.request_play().unwrap();

        assert_eq!(count(&calls, |c| *c == Call::Play(2)), 3);
    }

    #[tokio::test]
    async fn test_pause_and_resume_guards() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);

        ctl.request_pause().unwrap();
        ctl.request_resume().unwrap();
        assert_eq!(ctl.mode(), SessionMode::Idle);

        ctl.request_start().await.unwrap();
        ctl.request_resume().unwrap();
        assert_eq!(ctl.mode(), SessionMode::Recording);
        ctl.request_pause().unwrap();
        ctl.request_pause().unwrap();
        assert_eq!(ctl.mode(), SessionMode::Paused);

        assert_eq!(count(&calls, |c| matches!(c, Call::Pause(_))), 1);
        assert_eq!(count(&calls, |c| matches!(c, Call::Resume(_))), 0);
    }

    #[tokio::test]
    async fn test_toggle_pause() {
        let (service, _calls) = FakeService::new();
        let mut ctl = controller(service);

        ctl.toggle_pause().unwrap();
        assert_eq!(ctl.mode(), SessionMode::Idle);

        ctl.request_start().await.unwrap();
        ctl.toggle_pause().unwrap();
        assert_eq!(ctl.mode(), SessionMode::Paused);
        ctl.toggle_pause().unwrap();
        assert_eq!(ctl.mode(), SessionMode::Recording);
    }

    #[tokio::test]
    async fn test_stop_from_paused() {
        let (service, _calls) = FakeService::new();
        let mut ctl = controller(service);

        ctl.request_start().await.unwrap();
        ctl.request_pause().unwrap();
        ctl.request_stop().await.unwrap();

        assert_eq!(ctl.mode(), SessionMode::Idle);
        assert!(ctl.can_play());
    }

    #[tokio::test]
    async fn test_exclusive_capture_blocks_play_while_recording() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);
        ctl.request_start().await.unwrap();
        ctl.request_stop().await.unwrap();
        ctl.request_start().await.unwrap();

        ctl.request_play().unwrap();
        assert_eq!(count(&calls, |c| matches!(c, Call::Play(_))), 0);
    }

    #[tokio::test]
    async fn test_shared_audio_allows_play_while_recording() {
        let (service, calls) = FakeService::new();
        let options = SessionOptions {
            exclusive_capture_during_recording: false,
            ..SessionOptions::default()
        };
        let mut ctl = RecordingController::new(service, options, QualityPreset::Low);
        ctl.request_start().await.unwrap();
        ctl.request_stop().await.unwrap();
        ctl.request_start().await.unwrap();

        ctl.request_play().unwrap();
        assert_eq!(count(&calls, |c| matches!(c, Call::Play(_))), 1);
    }

    #[tokio::test]
    async fn test_load_failure_keeps_location_without_buffer() {
        let (mut service, _calls) = FakeService::new();
        service.fail_load = true;
        let mut ctl = controller(service);
        ctl.request_start().await.unwrap();

        let result = ctl.request_stop().await;

        assert!(matches!(result, Err(RecorderError::Storage(_))));
        assert_eq!(ctl.mode(), SessionMode::Idle);
        assert!(!ctl.can_play());
        assert_eq!(ctl.last_recording(), Some(Path::new("/tmp/take-1.wav")));
    }

    #[tokio::test]
    async fn test_mode_stays_within_known_states() {
        let (service, _calls) = FakeService::new();
        let mut ctl = controller(service);
        let mut previous = ctl.mode();

        for step in 0..40u32 {
            match step % 5 {
                0 => ctl.request_start().await.unwrap(),
                1 => ctl.request_pause().unwrap(),
                2 => ctl.toggle_pause().unwrap(),
                3 => ctl.request_play().unwrap(),
                _ if step % 3 == 0 => ctl.request_stop().await.unwrap(),
                _ => ctl.request_resume().unwrap(),
            }
            let mode = ctl.mode();
            if mode == SessionMode::Paused && previous != SessionMode::Paused {
                assert_eq!(previous, SessionMode::Recording);
            }
            previous = mode;
        }
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);
        ctl.request_start().await.unwrap();
        ctl.request_stop().await.unwrap();
        ctl.request_start().await.unwrap();

        ctl.shutdown();

        assert_eq!(ctl.mode(), SessionMode::Idle);
        assert!(!ctl.can_play());
        assert!(calls.borrow().contains(&Call::ReleaseSession(3)));
        assert!(calls.borrow().contains(&Call::ReleaseBuffer(2)));
    }

    #[tokio::test]
    async fn test_drop_releases_buffer() {
        let (service, calls) = FakeService::new();
        {
            let mut ctl = controller(service);
            ctl.request_start().await.unwrap();
            ctl.request_stop().await.unwrap();
        }
        assert_eq!(calls.borrow().last(), Some(&Call::ReleaseBuffer(2)));
    }

    #[tokio::test]
    async fn test_elapsed_is_zero_when_idle() {
        let (service, _calls) = FakeService::new();
        let ctl = controller(service);
        assert_eq!(ctl.elapsed(), Duration::ZERO);
        assert!(ctl.meter_samples(Duration::from_millis(50)).is_empty());
    }

    #[tokio::test]
    async fn test_configure_failure_stays_idle() {
        let (mut service, calls) = FakeService::new();
        service.fail_configure = true;
        let mut ctl = controller(service);

        let result = ctl.request_start().await;

        assert!(matches!(result, Err(RecorderError::DeviceUnavailable(_))));
        assert_eq!(ctl.mode(), SessionMode::Idle);
        assert_eq!(count(&calls, |c| matches!(c, Call::Begin(_))), 0);
    }

    #[tokio::test]
    async fn test_finalize_failure_keeps_previous_buffer() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);
        ctl.request_start().await.unwrap();
        ctl.request_stop().await.unwrap();
        ctl.request_start().await.unwrap();

        // Session 3 fails to finalize; buffer 2 must survive untouched.
        ctl.service.fail_finalize = true;
        let result = ctl.request_stop().await;

        assert!(matches!(result, Err(RecorderError::Storage(_))));
        assert_eq!(ctl.mode(), SessionMode::Idle);
        assert_eq!(ctl.playback_source(), Some(Path::new("/tmp/take-1.wav")));
        assert_eq!(ctl.last_recording(), Some(Path::new("/tmp/take-1.wav")));
        assert_eq!(count(&calls, |c| matches!(c, Call::ReleaseBuffer(_))), 0);
        assert_eq!(count(&calls, |c| matches!(c, Call::Load(_))), 1);

        ctl.request_play().unwrap();
        assert_eq!(calls.borrow().last(), Some(&Call::Play(2)));
    }

    #[tokio::test]
    async fn test_pause_failure_keeps_recording() {
        let (service, _calls) = FakeService::new();
        let mut ctl = controller(service);
        ctl.request_start().await.unwrap();

        ctl.service.fail_pause = true;
        assert!(matches!(
            ctl.request_pause(),
            Err(RecorderError::DeviceUnavailable(_))
        ));
        assert_eq!(ctl.mode(), SessionMode::Recording);

        ctl.service.fail_pause = false;
        ctl.request_pause().unwrap();
        ctl.service.fail_pause = true;
        assert!(ctl.toggle_pause().is_err());
        assert_eq!(ctl.mode(), SessionMode::Paused);
    }

    #[tokio::test]
    async fn test_can_play_follows_exclusive_capture() {
        let (service, _calls) = FakeService::new();
        let mut ctl = controller(service);
        assert!(!ctl.can_play());

        ctl.request_start().await.unwrap();
        ctl.request_stop().await.unwrap();
        assert!(ctl.can_play());

        ctl.request_start().await.unwrap();
        assert!(!ctl.can_play());
        ctl.request_pause().unwrap();
        assert!(!ctl.can_play());
    }

    #[tokio::test]
    async fn test_can_play_while_recording_with_shared_audio() {
        let (service, _calls) = FakeService::new();
        let options = SessionOptions {
            exclusive_capture_during_recording: false,
            ..SessionOptions::default()
        };
        let mut ctl = RecordingController::new(service, options, QualityPreset::High);
        ctl.request_start().await.unwrap();
        ctl.request_stop().await.unwrap();
        ctl.request_start().await.unwrap();

        assert!(ctl.can_play());
    }

    #[tokio::test]
    async fn test_finish_saves_without_loading() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);
        ctl.request_start().await.unwrap();

        ctl.finish().await.unwrap();

        assert_eq!(ctl.mode(), SessionMode::Idle);
        assert_eq!(ctl.last_recording(), Some(Path::new("/tmp/take-1.wav")));
        assert!(!ctl.can_play());
        assert_eq!(count(&calls, |c| matches!(c, Call::Load(_))), 0);
        assert_eq!(count(&calls, |c| matches!(c, Call::Finalize(1))), 1);
    }

    #[tokio::test]
    async fn test_finish_while_idle_is_noop() {
        let (service, calls) = FakeService::new();
        let mut ctl = controller(service);

        ctl.finish().await.unwrap();

        assert!(calls.borrow().is_empty());
        assert_eq!(ctl.last_recording(), None);
    }
}
