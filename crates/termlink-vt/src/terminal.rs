use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alacritty_terminal::event::{Event, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::term::{Config, Term};
use alacritty_terminal::vte::ansi;
use termlink_session::Geometry;

use crate::screen::{CursorPosition, ScreenView};

/// Events the terminal raised while parsing.
#[derive(Default)]
struct EventState {
    title: Option<String>,
    bell: bool,
    pty_writes: Vec<String>,
}

/// Captures terminal events. `Term` clones its listener, so state lives
/// behind an `Arc<Mutex<_>>`.
#[derive(Clone)]
pub struct EventProxy {
    state: Arc<Mutex<EventState>>,
}

impl EventProxy {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EventState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventListener for EventProxy {
    fn send_event(&self, event: Event) {
        let mut state = self.lock();
        match event {
            Event::Title(title) => state.title = Some(title),
            Event::ResetTitle => state.title = None,
            Event::Bell => state.bell = true,
            Event::PtyWrite(data) => state.pty_writes.push(data),
            _ => {}
        }
    }
}

struct TermSize {
    columns: usize,
    screen_lines: usize,
}

impl From<Geometry> for TermSize {
    fn from(geometry: Geometry) -> Self {
        Self {
            columns: usize::from(geometry.cols),
            screen_lines: usize::from(geometry.rows),
        }
    }
}

impl Dimensions for TermSize {
    fn total_lines(&self) -> usize {
        self.screen_lines
    }

    fn screen_lines(&self) -> usize {
        self.screen_lines
    }

    fn columns(&self) -> usize {
        self.columns
    }
}

/// Terminal emulator state fed by remote PTY output.
pub struct VtTerminal {
    term: Term<EventProxy>,
    parser: ansi::Processor,
    events: EventProxy,
}

impl VtTerminal {
    /// Create a terminal with `geometry` and 1,000 lines of scrollback.
    pub fn new(geometry: Geometry) -> Self {
        let config = Config {
            scrolling_history: 1_000,
            ..Config::default()
        };

        let events = EventProxy::new();
        let term = Term::new(config, &TermSize::from(geometry), events.clone());

        Self {
            term,
            parser: ansi::Processor::new(),
            events,
        }
    }

    /// Parse PTY output into the grid.
    pub fn write(&mut self, bytes: &[u8]) {
        self.parser.advance(&mut self.term, bytes);
    }

    pub fn resize(&mut self, geometry: Geometry) {
        self.term.resize(TermSize::from(geometry));
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::new(
            u16::try_from(self.term.screen_lines()).unwrap_or(u16::MAX),
            u16::try_from(self.term.columns()).unwrap_or(u16::MAX),
        )
    }

    pub fn screen(&self) -> ScreenView<'_> {
        ScreenView::new(&self.term)
    }

    pub fn cursor(&self) -> CursorPosition {
        let cursor = self.term.renderable_content().cursor;
        CursorPosition {
            row: cursor.point.line.0.max(0) as u16,
            col: cursor.point.column.0 as u16,
            visible: cursor.shape != ansi::CursorShape::Hidden,
        }
    }

    /// Window title set by OSC escape sequences.
    pub fn title(&self) -> Option<String> {
        self.events.lock().title.clone()
    }

    /// Check and clear the bell flag.
    pub fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.events.lock().bell)
    }

    /// Drain replies the terminal owes the PTY (device status reports and the like).
    pub fn take_pty_writes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.events.lock().pty_writes)
    }
}
