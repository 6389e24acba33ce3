//! Application orchestration and command routing.
//!
//! Handles command-line argument parsing and delegates to appropriate command handlers.

use crate::commands;
use crate::logging;
use crate::setup;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;

/// A single-screen terminal audio recorder with pause/resume and instant playback
#[derive(Parser)]
#[command(name = "yarec")]
#[command(version)]
#[command(about = "Single-screen terminal audio recorder")]
#[command(long_about = "Single-screen terminal audio recorder with pause/resume and instant playback.\n\nDEFAULT COMMAND:\n    If no command is specified, 'record' is used by default.\n\nKEYS:\n    r / Enter    Start recording\n    Space        Pause / resume\n    s            Stop and save\n    p            Play the last recording\n    q / Esc      Quit (a live recording is saved first)\n\nSIGNALS:\n    SIGUSR1 starts recording when idle and stops it otherwise:\n    $ pkill -USR1 yarec")]
#[command(
    after_help = "CONFIGURATION:\n    Config file:        ~/.config/yarec/yarec.toml\n    Logs:               ~/.local/state/yarec/yarec.log.*"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the recorder screen (default)
    #[command(visible_alias = "r")]
    Record,

    /// Play the last saved recording
    #[command(visible_alias = "rp")]
    Replay,

    /// Edit yarec.toml with $EDITOR (nano or vi when unset)
    #[command(visible_alias = "c")]
    Config,

    /// Print input devices with the IDs and names accepted by `audio.device`
    #[command(name = "list-devices")]
    ListDevices,

    /// Print the tail of the newest log file
    Logs,

    /// Print a shell completion script, e.g. `yarec completions zsh > _yarec`
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Runs the application based on command-line arguments.
///
/// # Errors
/// - If setup fails
/// - If logging initialization fails
/// - If command execution fails
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Commands that need neither logging nor a config file
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "yarec", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => return commands::handle_list_devices(),
        Some(Commands::Logs) => return commands::handle_logs(),
        _ => {}
    }

    logging::init_logging()?;
    setup::ensure_config().inspect_err(|e| tracing::error!("Setup failed: {e:#}"))?;

    match cli.command {
        None | Some(Commands::Record) => commands::handle_record().await?,
        Some(Commands::Replay) => commands::handle_replay().await?,
        Some(Commands::Config) => commands::handle_config()?,
        Some(Commands::Completions { .. } | Commands::ListDevices | Commands::Logs) => {
            unreachable!("These commands are handled earlier")
        }
    }

    Ok(())
}
