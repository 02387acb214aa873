//! Main TUI application state and logic

use crate::stress::{CorruptionError, Operation, StressRun};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

/// Operations kept for the log pane
const LOG_CAPACITY: usize = 1000;

/// Playback tick
const TICK: Duration = Duration::from_millis(100);

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Layout,
    Allocations,
    Log,
}

impl FocusedPane {
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Layout => FocusedPane::Allocations,
            FocusedPane::Allocations => FocusedPane::Log,
            FocusedPane::Log => FocusedPane::Layout,
        }
    }
}

/// The main application state
pub struct App {
    /// The stress run being visualized
    pub run: StressRun,

    /// Recent operations with their step numbers
    pub log: VecDeque<(usize, Operation)>,

    pub focused_pane: FocusedPane,

    /// Per-pane scroll offsets
    pub allocations_scroll: usize,
    pub log_scroll: usize,

    pub should_quit: bool,

    /// Status message to display
    pub status_message: String,

    /// First corruption found; stepping stops once set
    pub error: Option<CorruptionError>,

    pub is_playing: bool,

    /// Steps taken per playback tick
    pub steps_per_tick: usize,

    pub last_play_time: Instant,
}

impl App {
    pub fn new(run: StressRun) -> Self {
        App {
            run,
            log: VecDeque::with_capacity(LOG_CAPACITY),
            focused_pane: FocusedPane::Layout,
            allocations_scroll: 0,
            log_scroll: usize::MAX,
            should_quit: false,
            status_message: String::from("Ready!"),
            error: None,
            is_playing: false,
            steps_per_tick: 1,
            last_play_time: Instant::now(),
        }
    }

    /// Run the TUI application
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if self.is_playing && self.last_play_time.elapsed() >= TICK {
                let taken = self.step(self.steps_per_tick);
                if taken < self.steps_per_tick {
                    self.is_playing = false;
                }
                self.last_play_time = Instant::now();
            }

            // Poll with a timeout so playback keeps running
            if event::poll(Duration::from_millis(20))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }
        }

        Ok(())
    }

    fn render(&mut self, frame: &mut Frame) {
        let size = frame.area();

        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(size);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(main_chunks[0]);

        // Left column: map (top) | log (bottom)
        let left_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(columns[0]);

        super::panes::render_layout_pane(
            frame,
            left_rows[0],
            self.run.heap(),
            self.focused_pane == FocusedPane::Layout,
        );

        super::panes::render_log_pane(
            frame,
            left_rows[1],
            &self.log,
            self.focused_pane == FocusedPane::Log,
            &mut self.log_scroll,
        );

        super::panes::render_allocations_pane(
            frame,
            columns[1],
            self.run.heap(),
            self.focused_pane == FocusedPane::Allocations,
            &mut self.allocations_scroll,
        );

        super::panes::render_status_bar(
            frame,
            main_chunks[1],
            super::panes::StatusRenderData {
                message: &self.status_message,
                current_step: self.run.steps(),
                total_steps: self.run.config().operations,
                free_space: self.run.heap().free_space(),
                is_playing: self.is_playing,
                steps_per_tick: self.steps_per_tick,
                has_error: self.error.is_some(),
            },
        );
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            // Number keys step N times
            KeyCode::Char(c @ '1'..='9') => {
                self.is_playing = false;
                let n = c.to_digit(10).map_or(1, |n| n as usize);
                let taken = self.step(n);
                if self.error.is_none() {
                    self.status_message = format!("Stepped {} time(s)", taken);
                }
            }
            KeyCode::Right | KeyCode::Char('s') => {
                self.is_playing = false;
                self.step(1);
            }
            KeyCode::Char(' ') => {
                if self.error.is_some() || self.run.is_finished() {
                    return;
                }
                self.is_playing = !self.is_playing;
                self.status_message = if self.is_playing {
                    "Playing...".to_string()
                } else {
                    "Paused".to_string()
                };
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.steps_per_tick = (self.steps_per_tick * 10).min(10_000);
            }
            KeyCode::Char('-') => {
                self.steps_per_tick = (self.steps_per_tick / 10).max(1);
            }
            KeyCode::Char('d') => self.defrag(),
            KeyCode::Char('v') => {
                self.status_message = match self.run.heap().verify_all() {
                    Ok(()) => "Heap verified".to_string(),
                    Err(e) => {
                        let message = format!("Corruption: {}", e);
                        self.error = Some(e);
                        message
                    }
                };
            }
            KeyCode::Enter => {
                // Run to the end, then verify
                self.is_playing = false;
                let remaining = self.run.config().operations - self.run.steps();
                self.step(remaining);
                if self.error.is_none() {
                    self.status_message = match self.run.finish() {
                        Ok(()) => "Run complete, heap verified".to_string(),
                        Err(e) => {
                            let message = format!("Corruption: {}", e);
                            self.error = Some(e);
                            message
                        }
                    };
                }
            }
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::Up => match self.focused_pane {
                FocusedPane::Allocations => {
                    self.allocations_scroll = self.allocations_scroll.saturating_sub(1);
                }
                FocusedPane::Log => {
                    self.log_scroll = self.log_scroll.saturating_sub(1);
                }
                FocusedPane::Layout => {}
            },
            KeyCode::Down => match self.focused_pane {
                FocusedPane::Allocations => {
                    self.allocations_scroll = self.allocations_scroll.saturating_add(1);
                }
                FocusedPane::Log => {
                    self.log_scroll = self.log_scroll.saturating_add(1);
                }
                FocusedPane::Layout => {}
            },
            _ => {}
        }
    }

    /// Take up to `n` steps; returns how many were taken
    fn step(&mut self, n: usize) -> usize {
        if self.error.is_some() {
            return 0;
        }
        let mut taken = 0;
        while taken < n {
            match self.run.step() {
                Ok(Some(op)) => {
                    if self.log.len() == LOG_CAPACITY {
                        self.log.pop_front();
                    }
                    self.status_message = op.to_string();
                    self.log.push_back((self.run.steps(), op));
                    taken += 1;
                }
                Ok(None) => {
                    self.status_message = "Run complete".to_string();
                    break;
                }
                Err(e) => {
                    self.status_message = format!("Corruption: {}", e);
                    self.error = Some(e);
                    break;
                }
            }
        }
        // Follow the newest entry
        self.log_scroll = usize::MAX;
        taken
    }

    fn defrag(&mut self) {
        self.status_message = match self.run.defrag() {
            Ok(true) => "Defragmented".to_string(),
            Ok(false) => "Nothing to defragment".to_string(),
            Err(e) => {
                let message = format!("Corruption: {}", e);
                self.error = Some(e);
                message
            }
        };
    }
}
