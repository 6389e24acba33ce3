//! Replay the last saved recording without opening the recorder screen.

use crate::config::RecorderConfig;
use crate::recording::{recording_path, AudioService, CpalAudioService};

/// Plays the recording left by the last `yarec record` session and waits for it to end.
///
/// # Errors
/// - If no recording has been saved yet
/// - If the file cannot be decoded or the output device cannot be opened
pub async fn handle_replay() -> Result<(), anyhow::Error> {
    tracing::info!("=== yarec replay ===");

    let location = recording_path();
    if !location.exists() {
        return Err(anyhow::anyhow!(
            "No recording found at {}. Record one first with 'yarec record'.",
            location.display()
        ));
    }

    let config = RecorderConfig::load()?;
    let mut service = CpalAudioService::new(&config.audio);
    let buffer = service.load_buffer(&location).await?;

    tracing::info!(
        "Playing {} ({:.1}s)",
        location.display(),
        buffer.duration_secs()
    );
    println!("Playing {} ({:.1}s)", location.display(), buffer.duration_secs());

    service.play(&buffer)?;
    tokio::task::block_in_place(|| service.wait_for_playback());
    service.release_buffer(buffer);

    tracing::info!("Playback finished");
    Ok(())
}
