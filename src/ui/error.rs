//! Full-screen error view.
//!
//! Used when the recorder cannot start at all (for example a broken config
//! file), before any recorder screen exists.

use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{prelude::*, widgets::Paragraph};
use std::io::{self, Stdout};
use std::time::Duration;

/// Red full-screen message, dismissed by any key.
pub struct ErrorScreen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    active: bool,
}

impl ErrorScreen {
    /// Creates an error screen and enters alternate screen mode.
    ///
    /// # Errors
    /// - If terminal cannot be initialized
    pub fn new() -> anyhow::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(ErrorScreen {
            terminal,
            active: true,
        })
    }

    /// Shows `message` centered on a red background until a key is pressed.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn show_error(&mut self, message: &str) -> anyhow::Result<()> {
        let style = Style::default()
            .fg(Color::Rgb(255, 255, 255))
            .bg(Color::Rgb(255, 0, 0));
        let lines: Vec<Line> = message.lines().map(|line| Line::from(line.to_string())).collect();
        let line_count = lines.len() as u16;

        loop {
            let text = lines.clone();
            self.terminal.draw(|frame| {
                let area = frame.area();
                frame.render_widget(Paragraph::new("").style(style), area);

                let padding_x = area.width / 10;
                let top = area.height.saturating_sub(line_count) / 2;
                let centered_area = Rect {
                    x: area.x + padding_x,
                    y: area.y + top,
                    width: area.width.saturating_sub(padding_x * 2),
                    height: area.height.saturating_sub(top),
                };

                let paragraph = Paragraph::new(text)
                    .style(style)
                    .alignment(Alignment::Center)
                    .wrap(ratatui::widgets::Wrap { trim: true });
                frame.render_widget(paragraph, centered_area);
            })?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(_) = event::read()? {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Restores the terminal. Safe to call more than once.
    ///
    /// # Errors
    /// - If terminal mode cannot be disabled
    pub fn cleanup(&mut self) -> anyhow::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for ErrorScreen {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}
