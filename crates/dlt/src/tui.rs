// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Interactive panel: an editable tag filter above a scrolling log view.
//!
//! The terminal loop runs on a blocking thread. A [`LiveTail`] task polls the
//! API and hands formatted lines over a channel.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dd_log_tail::{Config, FilterHandle, Formatter, LiveLine, LiveTail, LiveUpdate, LogsClient};

const INPUT_POLL: Duration = Duration::from_millis(100);
const MAX_LINES: usize = 5_000;
const PLACEHOLDER: &str = "Enter tags (e.g., service:web,env:prod)";
const FILTER_UPDATED: &str = "Filter updated. New logs will appear here...";
const INSTRUCTIONS: [&str; 8] = [
    "TUI Mode - Real-time Datadog Log Tail",
    "Instructions:",
    "- Type filter tags in the input field above",
    "- Press Tab to switch between input and log view",
    "- Press Ctrl+C to exit",
    "- Use arrow keys to scroll in log view, End to follow",
    "",
    "Waiting for logs...",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Input,
    Logs,
}

fn level_color(level: &str) -> Color {
    match level.to_ascii_lowercase().as_str() {
        "error" => Color::Red,
        "warn" | "warning" => Color::Yellow,
        "info" => Color::Green,
        "debug" => Color::Gray,
        _ => Color::Reset,
    }
}

struct App {
    input: String,
    lines: Vec<Line<'static>>,
    focus: Focus,
    /// First visible line when not following.
    scroll: usize,
    follow: bool,
    /// Rows of the log panel at the last draw.
    viewport: usize,
    filter: FilterHandle,
}

impl App {
    fn new(filter: FilterHandle) -> Self {
        let input = filter.filter();
        Self {
            input,
            lines: INSTRUCTIONS.iter().map(|line| Line::raw(*line)).collect(),
            focus: Focus::Input,
            scroll: 0,
            follow: true,
            viewport: 0,
            filter,
        }
    }

    /// Appends an update unless it was fetched under an older filter.
    fn apply(&mut self, update: LiveUpdate) {
        if update.generation() != self.filter.generation() {
            return;
        }
        match update {
            LiveUpdate::Lines { lines, .. } => {
                self.lines.extend(lines.into_iter().map(|LiveLine { level, text }| {
                    Line::styled(text, Style::default().fg(level_color(&level)))
                }));
            }
            LiveUpdate::Error { message, .. } => self.lines.push(Line::styled(
                format!("Error fetching logs: {message}"),
                Style::default().fg(Color::Red),
            )),
        }
        if self.lines.len() > MAX_LINES {
            let excess = self.lines.len() - MAX_LINES;
            self.lines.drain(..excess);
            self.scroll = self.scroll.saturating_sub(excess);
        }
    }

    /// Publishes the edited filter and restarts the view from a fresh window.
    fn filter_changed(&mut self) {
        self.filter.set(&self.input);
        self.lines = vec![Line::raw(FILTER_UPDATED)];
        self.scroll = 0;
        self.follow = true;
    }

    /// Returns `true` when the application should exit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }

        match (self.focus, key.code) {
            (_, KeyCode::Tab) => {
                self.focus = match self.focus {
                    Focus::Input => Focus::Logs,
                    Focus::Logs => Focus::Input,
                };
            }
            (_, KeyCode::Esc) => self.focus = Focus::Input,
            (Focus::Input, KeyCode::Char(c)) => {
                self.input.push(c);
                self.filter_changed();
            }
            (Focus::Input, KeyCode::Backspace) => {
                if self.input.pop().is_some() {
                    self.filter_changed();
                }
            }
            (Focus::Logs, KeyCode::Up) => self.scroll_up(1),
            (Focus::Logs, KeyCode::Down) => self.scroll_down(1),
            (Focus::Logs, KeyCode::PageUp) => self.scroll_up(10),
            (Focus::Logs, KeyCode::PageDown) => self.scroll_down(10),
            (Focus::Logs, KeyCode::Home) => {
                self.follow = false;
                self.scroll = 0;
            }
            (Focus::Logs, KeyCode::End) => self.follow = true,
            _ => {}
        }
        false
    }

    fn scroll_up(&mut self, lines: usize) {
        if self.follow {
            self.follow = false;
            self.scroll = self.lines.len().saturating_sub(self.viewport);
        }
        self.scroll = self.scroll.saturating_sub(lines);
    }

    fn scroll_down(&mut self, lines: usize) {
        if !self.follow {
            self.scroll = self.scroll.saturating_add(lines);
        }
    }

    /// First line to render in a panel of `height` rows.
    fn offset(&mut self, height: usize) -> usize {
        self.viewport = height;
        let max = self.lines.len().saturating_sub(height);
        if self.follow {
            return max;
        }
        if self.scroll >= max {
            self.scroll = max;
        }
        self.scroll
    }

    fn draw(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(3)])
            .split(frame.area());

        let label_style = if self.focus == Focus::Input {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let input = if self.input.is_empty() {
            Span::styled(PLACEHOLDER, Style::default().fg(Color::DarkGray))
        } else {
            Span::raw(self.input.clone())
        };
        frame.render_widget(
            Paragraph::new(Line::from(vec![Span::styled("Filter: ", label_style), input])),
            chunks[0],
        );

        let height = usize::from(chunks[1].height.saturating_sub(2));
        let offset = self.offset(height);
        let title = if self.follow { " Logs " } else { " Logs [SCROLL] " };
        let border_style = if self.focus == Focus::Logs {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };
        let visible: Vec<Line<'static>> = self
            .lines
            .iter()
            .skip(offset)
            .take(height)
            .cloned()
            .collect();
        frame.render_widget(
            Paragraph::new(visible).block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .border_style(border_style),
            ),
            chunks[1],
        );

        if self.focus == Focus::Input {
            let typed = self.input.chars().count();
            let x = chunks[0]
                .x
                .saturating_add(u16::try_from("Filter: ".len() + typed).unwrap_or(u16::MAX));
            frame.set_cursor_position((x.min(chunks[0].right().saturating_sub(1)), chunks[0].y));
        }
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    updates: &mut mpsc::Receiver<LiveUpdate>,
    cancel: &CancellationToken,
) -> io::Result<()> {
    loop {
        while let Ok(update) = updates.try_recv() {
            app.apply(update);
        }

        terminal.draw(|frame| app.draw(frame))?;

        if cancel.is_cancelled() {
            return Ok(());
        }

        if event::poll(INPUT_POLL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key(key) {
                    return Ok(());
                }
            }
        }
    }
}

fn run_terminal(
    mut app: App,
    mut updates: mpsc::Receiver<LiveUpdate>,
    cancel: CancellationToken,
) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app, &mut updates, &cancel);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

/// Runs the panel until Ctrl+C, then stops the poller.
pub async fn run(client: LogsClient, config: &Config, cancel: CancellationToken) -> Result<()> {
    let live = LiveTail::new(
        client,
        config.query_levels(),
        Formatter::from_name(&config.output_format),
        config.tags.clone(),
    );
    let app = App::new(live.handle());

    let (tx, rx) = mpsc::channel(64);
    let poller = tokio::spawn(live.run(tx, cancel.clone()));

    let ui_cancel = cancel.clone();
    let result = tokio::task::spawn_blocking(move || run_terminal(app, rx, ui_cancel))
        .await
        .context("terminal thread failed")?;

    cancel.cancel();
    poller.await.context("log poller failed")?;
    result.context("terminal error")
}
