//! Terminal screen for the recorder.
//!
//! Shows the input level, the session mode and elapsed time, which controls
//! are available, and where the last recording was saved. Key presses are
//! turned into [`RecorderIntent`]s; the screen holds no recording state itself.

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Sparkline},
};
use std::io::{stdout, Stdout};
use std::path::Path;
use std::time::{Duration, Instant};

use super::controller::SessionMode;
use super::visualizations::{resize_waveform, update_waveform, LevelMeter};

/// User intent read from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderIntent {
    /// No key, or a key without a binding
    Continue,
    Start,
    TogglePause,
    Stop,
    Play,
    Quit,
}

/// Maps a key press to an intent.
pub fn intent_for_key(key: KeyEvent) -> RecorderIntent {
    if key.kind == KeyEventKind::Release {
        return RecorderIntent::Continue;
    }
    match key.code {
        KeyCode::Char('r') | KeyCode::Enter => RecorderIntent::Start,
        KeyCode::Char(' ') => RecorderIntent::TogglePause,
        KeyCode::Char('s') => RecorderIntent::Stop,
        KeyCode::Char('p') => RecorderIntent::Play,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => RecorderIntent::Quit,
        KeyCode::Char('q') | KeyCode::Esc => RecorderIntent::Quit,
        _ => RecorderIntent::Continue,
    }
}

/// One-line message under the controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    Info(String),
    Error(String),
}

/// Snapshot of controller state for one frame.
pub struct RecorderView<'a> {
    pub mode: SessionMode,
    pub elapsed: Duration,
    pub can_play: bool,
    pub saved_at: Option<&'a Path>,
    pub status: Option<&'a StatusLine>,
}

/// Full-screen recorder UI.
pub struct RecorderTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    volume_history: Vec<u64>,
    last_sample_time: Instant,
    sample_interval: Duration,
    terminal_width: usize,
    meter: LevelMeter,
    peak_volume_threshold: u8,
}

impl RecorderTui {
    /// Creates the screen and enters alternate screen mode.
    ///
    /// # Errors
    /// - If terminal cannot be initialized
    /// - If raw mode cannot be enabled
    pub fn new(peak_volume_threshold: u8, reference_level_db: i8) -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        let terminal_width = terminal.size()?.width as usize;

        Ok(RecorderTui {
            terminal,
            volume_history: vec![0; terminal_width],
            last_sample_time: Instant::now(),
            sample_interval: Duration::from_millis(50),
            terminal_width,
            meter: LevelMeter::new(reference_level_db),
            peak_volume_threshold,
        })
    }

    /// Draws one frame from the view and the latest input samples.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn render(&mut self, view: &RecorderView<'_>, samples: &[i16]) -> anyhow::Result<()> {
        if view.mode == SessionMode::Recording {
            let level = self.meter.measure(samples);
            if self.last_sample_time.elapsed() >= self.sample_interval {
                update_waveform(&mut self.volume_history, level, self.terminal_width);
                self.last_sample_time = Instant::now();
            }
        } else {
            self.meter.reset();
        }

        let current_width = self.terminal.size()?.width as usize;
        if current_width != self.terminal_width {
            self.terminal_width = current_width;
            resize_waveform(&mut self.volume_history, current_width);
        }

        let footer = footer_line(
            view,
            self.meter.level(),
            self.meter.peak(),
            self.peak_volume_threshold,
        );
        let hints = hints_line(view);
        let info = info_lines(view);
        let history = &self.volume_history;

        self.terminal.draw(|frame| {
            let [meter_area, info_area, hints_area, footer_area] = Layout::vertical([
                Constraint::Min(3),
                Constraint::Length(2),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .areas(frame.area());

            let sparkline = Sparkline::default().data(history).max(80).style(
                Style::default()
                    .bg(Color::Rgb(0, 0, 0))
                    .fg(Color::Rgb(206, 224, 220)),
            );
            frame.render_widget(sparkline, meter_area);
            frame.render_widget(Paragraph::new(info), info_area);
            frame.render_widget(Paragraph::new(hints), hints_area);
            frame.render_widget(
                Paragraph::new(footer).style(
                    Style::default()
                        .fg(Color::Rgb(185, 207, 212))
                        .bg(Color::Rgb(0, 0, 0)),
                ),
                footer_area,
            );
        })?;

        Ok(())
    }

    /// Polls the keyboard for up to 50ms.
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self) -> anyhow::Result<RecorderIntent> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                let intent = intent_for_key(key);
                if intent != RecorderIntent::Continue {
                    tracing::debug!("Key {:?} -> {:?}", key.code, intent);
                }
                return Ok(intent);
            }
        }
        Ok(RecorderIntent::Continue)
    }

    /// Restores the terminal.
    ///
    /// # Errors
    /// - If terminal mode cannot be disabled
    /// - If cursor cannot be shown
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn footer_line(view: &RecorderView<'_>, level: u8, peak: u8, peak_threshold: u8) -> Line<'static> {
    let indicator = match view.mode {
        SessionMode::Recording => Span::styled("● ", Style::default().fg(Color::Red)),
        SessionMode::Paused => Span::styled("⏸ ", Style::default().fg(Color::Yellow)),
        SessionMode::Idle => Span::styled("■ ", Style::default().fg(Color::Gray)),
    };

    let peak_style = if peak >= peak_threshold {
        Style::default().bg(Color::Red).fg(Color::Rgb(255, 255, 255))
    } else {
        Style::default()
    };

    Line::from(vec![
        indicator,
        Span::raw(format_duration(view.elapsed)),
        Span::raw(" / "),
        Span::raw(format!("{level}%")),
        Span::raw(" / "),
        Span::styled(format!("{peak}%"), peak_style),
    ])
}

/// Key hints; only the controls valid for the current mode are highlighted.
fn hints_line(view: &RecorderView<'_>) -> Line<'static> {
    let hint = |key: &str, label: &str, enabled: bool| {
        let style = if enabled {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Span::styled(format!("[{key}] {label}  "), style)
    };

    let recording = view.mode != SessionMode::Idle;
    let toggle_label = if view.mode == SessionMode::Paused {
        "Resume"
    } else {
        "Pause"
    };

    Line::from(vec![
        hint("r", "Record", !recording),
        hint("space", toggle_label, recording),
        hint("s", "Stop", recording),
        hint("p", "Play", view.can_play),
        hint("q", "Quit", true),
    ])
}

fn info_lines(view: &RecorderView<'_>) -> Vec<Line<'static>> {
    let mut lines = Vec::with_capacity(2);
    if let Some(path) = view.saved_at {
        lines.push(Line::from(Span::styled(
            format!("Saved at: {}", path.display()),
            Style::default().fg(Color::Rgb(187, 187, 187)),
        )));
    }
    match view.status {
        Some(StatusLine::Info(message)) => lines.push(Line::from(message.clone())),
        Some(StatusLine::Error(message)) => lines.push(Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        ))),
        None => {}
    }
    lines
}
