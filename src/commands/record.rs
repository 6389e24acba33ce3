//! Interactive recorder screen.
//!
//! Reads intents from the keyboard (and SIGUSR1 as an external start/stop
//! trigger), forwards them to the recording controller one at a time, and
//! redraws the screen between key presses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RecorderConfig;
use crate::recording::{
    AudioService, CpalAudioService, RecorderError, RecorderIntent, RecorderTui, RecorderView,
    RecordingController, SessionMode, StatusLine,
};
use crate::ui::ErrorScreen;

/// Span of audio the level meter averages over.
const METER_WINDOW: Duration = Duration::from_millis(50);

/// Runs the recorder until the user quits.
///
/// # Errors
/// - If the configuration cannot be loaded
/// - If the terminal cannot be driven
pub async fn handle_record() -> Result<(), anyhow::Error> {
    tracing::info!("=== yarec recorder started ===");

    let config = match RecorderConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err:#}");
            let message = format!(
                "Configuration Error:\n\n{err:#}\n\nPlease check your ~/.config/yarec/yarec.toml file and try again."
            );
            let mut error_screen = ErrorScreen::new()?;
            error_screen.show_error(&message)?;
            error_screen.cleanup()?;
            return Err(anyhow::anyhow!("Configuration error: {err}"));
        }
    };

    tracing::info!(
        "Configuration loaded: device={}, sample_rate={}Hz, quality={}, peak_threshold={}%, reference_level={}dBFS",
        config.audio.device,
        config.audio.sample_rate,
        config.audio.quality,
        config.audio.peak_volume_threshold,
        config.audio.reference_level_db
    );

    let service = CpalAudioService::new(&config.audio);
    let mut controller = RecordingController::new(service, config.session, config.audio.quality);

    let trigger = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&trigger))
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;

    let mut tui = RecorderTui::new(
        config.audio.peak_volume_threshold,
        config.audio.reference_level_db,
    )?;
    let result = run_loop(&mut controller, &mut tui, &trigger).await;

    // Keep what was recorded when quitting mid-session.
    if let Err(e) = controller.finish().await {
        tracing::warn!("Failed to save recording on exit: {}", e);
    }
    controller.shutdown();

    tui.cleanup()?;

    if let Some(path) = controller.last_recording() {
        eprintln!("Recording saved at: {}", path.display());
    }
    tracing::info!("=== yarec recorder exited ===");
    result
}

async fn run_loop<S: AudioService>(
    controller: &mut RecordingController<S>,
    tui: &mut RecorderTui,
    trigger: &AtomicBool,
) -> anyhow::Result<()> {
    let mut status: Option<StatusLine> = None;

    loop {
        let mut intent = tui.handle_input()?;
        if intent == RecorderIntent::Continue && trigger.swap(false, Ordering::Relaxed) {
            tracing::info!("Received SIGUSR1: external start/stop trigger");
            intent = external_trigger_intent(controller.mode());
        }

        if intent == RecorderIntent::Quit {
            return Ok(());
        }
        if let Some(update) = dispatch(controller, intent).await {
            status = Some(update);
        }

        let view = RecorderView {
            mode: controller.mode(),
            elapsed: controller.elapsed(),
            can_play: controller.can_play(),
            saved_at: controller.last_recording(),
            status: status.as_ref(),
        };
        tui.render(&view, &controller.meter_samples(METER_WINDOW))?;
    }
}

/// Start when idle, stop otherwise.
fn external_trigger_intent(mode: SessionMode) -> RecorderIntent {
    match mode {
        SessionMode::Idle => RecorderIntent::Start,
        SessionMode::Recording | SessionMode::Paused => RecorderIntent::Stop,
    }
}

/// Applies one intent. Returns a new status line when there is something to tell.
async fn dispatch<S: AudioService>(
    controller: &mut RecordingController<S>,
    intent: RecorderIntent,
) -> Option<StatusLine> {
    let result = match intent {
        RecorderIntent::Continue | RecorderIntent::Quit => return None,
        RecorderIntent::Start => controller.request_start().await,
        RecorderIntent::TogglePause => controller.toggle_pause(),
        RecorderIntent::Stop => {
            let was_active = controller.mode() != SessionMode::Idle;
            let result = controller.request_stop().await;
            if was_active && result.is_ok() {
                let saved = chrono::Local::now().format("%H:%M:%S");
                return Some(StatusLine::Info(format!("Recording saved {saved}")));
            }
            result
        }
        RecorderIntent::Play => controller.request_play(),
    };
    result
        .err()
        .filter(RecorderError::is_user_visible)
        .map(status_for_error)
}

fn status_for_error(error: RecorderError) -> StatusLine {
    match error {
        RecorderError::PermissionDenied => {
            StatusLine::Error("Permission to access microphone is required!".to_string())
        }
        other => StatusLine::Error(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_trigger_toggles_recording() {
        assert_eq!(external_trigger_intent(SessionMode::Idle), RecorderIntent::Start);
        assert_eq!(external_trigger_intent(SessionMode::Recording), RecorderIntent::Stop);
        assert_eq!(external_trigger_intent(SessionMode::Paused), RecorderIntent::Stop);
    }

    #[test]
    fn test_permission_denied_status() {
        assert_eq!(
            status_for_error(RecorderError::PermissionDenied),
            StatusLine::Error("Permission to access microphone is required!".to_string())
        );
        assert_eq!(
            status_for_error(RecorderError::DeviceUnavailable("no input".into())),
            StatusLine::Error("audio device unavailable: no input".to_string())
        );
    }
}
