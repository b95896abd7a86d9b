use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::cell::Flags;
use alacritty_terminal::term::Term;

use crate::terminal::EventProxy;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorPosition {
    pub row: u16,
    pub col: u16,
    pub visible: bool,
}

/// A read-only view of the visible screen.
pub struct ScreenView<'a> {
    term: &'a Term<EventProxy>,
}

impl<'a> ScreenView<'a> {
    pub(crate) fn new(term: &'a Term<EventProxy>) -> Self {
        Self { term }
    }

    pub fn rows(&self) -> u16 {
        self.term.screen_lines() as u16
    }

    pub fn cols(&self) -> u16 {
        self.term.columns() as u16
    }

    /// Character at `row`, `col`. Row 0 is the top of the visible screen;
    /// out-of-range positions read as a blank.
    pub fn char_at(&self, row: u16, col: u16) -> char {
        if usize::from(row) >= self.term.screen_lines() || usize::from(col) >= self.term.columns() {
            return ' ';
        }
        self.term.grid()[Line(i32::from(row))][Column(usize::from(col))].c
    }

    /// Text of one row with trailing blanks removed.
    pub fn row_text(&self, row: u16) -> String {
        if usize::from(row) >= self.term.screen_lines() {
            return String::new();
        }

        let line = &self.term.grid()[Line(i32::from(row))];
        let mut text: String = (0..self.term.columns())
            .map(|col| &line[Column(col)])
            // The second half of a wide character holds no glyph of its own.
            .filter(|cell| !cell.flags.contains(Flags::WIDE_CHAR_SPACER))
            .map(|cell| cell.c)
            .collect();
        text.truncate(text.trim_end().len());
        text
    }

    /// The whole screen as text, one line per row, trailing blank rows dropped.
    pub fn text(&self) -> String {
        let mut lines: Vec<String> = (0..self.rows()).map(|row| self.row_text(row)).collect();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use termlink_session::Geometry;

    use crate::terminal::VtTerminal;

    #[test]
    fn test_char_at() {
        let mut term = VtTerminal::new(Geometry::new(24, 80));
        term.write(b"hello");

        let screen = term.screen();
        assert_eq!(screen.char_at(0, 0), 'h');
        assert_eq!(screen.char_at(0, 4), 'o');
        assert_eq!(screen.char_at(0, 5), ' ');
        assert_eq!(screen.char_at(99, 0), ' ');
    }

    #[test]
    fn test_text_drops_trailing_blank_rows() {
        let mut term = VtTerminal::new(Geometry::new(5, 20));
        term.write(b"$ ls\r\nCargo.toml  src\r\n$ ");

        assert_eq!(term.screen().text(), "$ ls\nCargo.toml  src\n$");
    }

    #[test]
    fn test_escape_sequences_are_not_text() {
        let mut term = VtTerminal::new(Geometry::new(5, 20));
        term.write(b"\x1b[1;31mred\x1b[0m plain");

        assert_eq!(term.screen().row_text(0), "red plain");
    }

    #[test]
    fn test_wide_characters() {
        let mut term = VtTerminal::new(Geometry::new(5, 20));
        term.write("日本".as_bytes());

        assert_eq!(term.screen().row_text(0), "日本");
    }

    #[test]
    fn test_empty_screen() {
        let term = VtTerminal::new(Geometry::new(5, 20));
        assert_eq!(term.screen().text(), "");
    }
}
