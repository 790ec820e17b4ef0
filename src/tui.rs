use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};
use std::{
    sync::{Arc, Mutex},
    thread,
};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::TrialmineError;

const EVENTS_MAX: usize = 8;
const SPINNER: &[char] = &['|', '/', '-', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Discover,
    Harvest,
    Extract,
    Filter,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Discover => "Discover",
            Phase::Harvest => "Harvest",
            Phase::Extract => "Extract",
            Phase::Filter => "Filter",
        }
    }

    fn index(self) -> usize {
        match self {
            Phase::Discover => 0,
            Phase::Harvest => 1,
            Phase::Extract => 2,
            Phase::Filter => 3,
        }
    }

    fn all() -> [Phase; 4] {
        [Phase::Discover, Phase::Harvest, Phase::Extract, Phase::Filter]
    }
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let (prefix, payload) = message.split_once(';')?;
    let phase = match prefix.trim() {
        "discover" => Phase::Discover,
        "harvest" => Phase::Harvest,
        "extract" => Phase::Extract,
        "filter" => Phase::Filter,
        _ => return None,
    };
    Some((phase, payload.trim()))
}

#[derive(Debug)]
struct AppState {
    status: String,
    phase: Phase,
    fraction: f64,
    events: VecDeque<String>,
    started: Instant,
    active: bool,
}

pub struct Tui {
    state: Arc<Mutex<AppState>>,
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some((phase, payload)) = parse_phase(&message) {
                if phase != state.phase {
                    state.fraction = 0.0;
                }
                state.phase = phase;
                state.status = payload.to_string();
            } else {
                state.status = message.clone();
            }
            if let Some(fraction) = event.fraction {
                state.fraction = fraction.clamp(0.0, 1.0);
            }
            push_event(&mut state.events, message);
        }
    }
}

fn push_event(events: &mut VecDeque<String>, message: String) {
    if events.len() == EVENTS_MAX {
        events.pop_front();
    }
    events.push_back(message);
}

impl Tui {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AppState {
                status: "ready".to_string(),
                phase: Phase::Discover,
                fraction: 0.0,
                events: VecDeque::new(),
                started: Instant::now(),
                active: false,
            })),
        }
    }

    /// Drive the pipeline on a worker thread while rendering progress.
    /// Returns the pipeline result, or an abort error if the user quits.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, TrialmineError> + Send + 'static,
        R: Send + 'static,
    {
        if let Ok(mut state) = self.state.lock() {
            state.active = true;
            state.started = Instant::now();
        }

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                let elapsed = state.started.elapsed();
                terminal
                    .draw(|frame| draw_ui(frame, &state, tick, elapsed))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                disable_raw_mode().into_diagnostic()?;
                let mut stdout = io::stdout();
                stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if is_abort(key) {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        Err(miette::Report::msg("aborted"))
    }
}

impl Default for Tui {
    fn default() -> Self {
        Self::new()
    }
}

fn is_abort(key: KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

fn draw_ui(frame: &mut ratatui::Frame, state: &AppState, tick: usize, elapsed: Duration) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(4),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let spinner = if state.active {
        SPINNER[tick % SPINNER.len()]
    } else {
        ' '
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            " trialmine ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{spinner} ")),
        Span::raw(format!("elapsed {:>3}s", elapsed.as_secs())),
    ]))
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, chunks[0]);

    let mut phase_spans = Vec::new();
    for phase in Phase::all() {
        let style = if phase == state.phase {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else if phase.index() < state.phase.index() {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        phase_spans.push(Span::styled(phase.label(), style));
        if phase != Phase::Filter {
            phase_spans.push(Span::raw("  →  "));
        }
    }
    let phases = Paragraph::new(Line::from(phase_spans))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Pipeline"));
    frame.render_widget(phases, chunks[1]);

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(state.phase.label()),
        )
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(state.fraction.clamp(0.0, 1.0))
        .label(format!("{:>3.0}%", state.fraction * 100.0));
    frame.render_widget(gauge, chunks[2]);

    let mut lines = vec![Line::from(Span::styled(
        state.status.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    for event in state.events.iter().rev() {
        lines.push(Line::from(Span::styled(
            event.clone(),
            Style::default().fg(Color::DarkGray),
        )));
    }
    let events = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Events"));
    frame.render_widget(events, chunks[3]);

    let footer = Paragraph::new(Line::from(Span::styled(
        " q / Esc: abort ",
        Style::default().fg(Color::DarkGray),
    )));
    frame.render_widget(footer, chunks[4]);
}
