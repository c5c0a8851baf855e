use std::io::{self, Write, stdout};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{self, ClearType},
};
use unicode_width::UnicodeWidthStr;

pub enum ReadLineResult {
    Line(String),
    Interrupted,
    Eof,
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

enum Action {
    Continue,
    Submit,
    Interrupt,
    Eof,
}

/// Editable input line with prefix-filtered history navigation.
///
/// `cursor` counts chars, not bytes.
#[derive(Debug, Default)]
struct LineBuffer<'h> {
    history: &'h [String],
    input: String,
    cursor: usize,
    history_index: Option<usize>,
    draft: String,
}

impl<'h> LineBuffer<'h> {
    fn new(history: &'h [String]) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    fn apply(&mut self, key: KeyEvent) -> Action {
        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => return Action::Interrupt,
            (KeyModifiers::CONTROL, KeyCode::Char('d')) if self.input.is_empty() => {
                return Action::Eof;
            }
            (_, KeyCode::Enter) => return Action::Submit,
            (KeyModifiers::CONTROL, KeyCode::Char('a')) | (_, KeyCode::Home) => self.cursor = 0,
            (KeyModifiers::CONTROL, KeyCode::Char('e')) | (_, KeyCode::End) => {
                self.cursor = self.len();
            }
            (KeyModifiers::CONTROL, KeyCode::Char('u')) => {
                self.input.clear();
                self.cursor = 0;
            }
            (KeyModifiers::CONTROL, KeyCode::Char('w')) | (KeyModifiers::ALT, KeyCode::Backspace) => {
                self.delete_word();
            }
            (_, KeyCode::Backspace) if self.cursor > 0 => {
                self.cursor -= 1;
                let off = self.byte_offset(self.cursor);
                self.input.remove(off);
            }
            (_, KeyCode::Delete) if self.cursor < self.len() => {
                let off = self.byte_offset(self.cursor);
                self.input.remove(off);
            }
            (_, KeyCode::Left) => self.cursor = self.cursor.saturating_sub(1),
            (_, KeyCode::Right) => self.cursor = (self.cursor + 1).min(self.len()),
            (_, KeyCode::Up) => self.history_up(),
            (_, KeyCode::Down) => self.history_down(),
            (m, KeyCode::Char(c)) if !m.contains(KeyModifiers::CONTROL) => {
                let off = self.byte_offset(self.cursor);
                self.input.insert(off, c);
                self.cursor += 1;
            }
            _ => {}
        }
        Action::Continue
    }

    fn len(&self) -> usize {
        self.input.chars().count()
    }

    fn byte_offset(&self, char_idx: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_idx)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn delete_word(&mut self) {
        let chars: Vec<char> = self.input.chars().collect();
        let mut start = self.cursor;
        while start > 0 && !chars[start - 1].is_alphanumeric() {
            start -= 1;
        }
        while start > 0 && chars[start - 1].is_alphanumeric() {
            start -= 1;
        }
        let from = self.byte_offset(start);
        let to = self.byte_offset(self.cursor);
        self.input.drain(from..to);
        self.cursor = start;
    }

    fn matches_draft(&self, entry: &str) -> bool {
        self.draft.is_empty() || entry.starts_with(&self.draft)
    }

    fn history_up(&mut self) {
        let end = match self.history_index {
            None => {
                self.draft.clone_from(&self.input);
                self.history.len()
            }
            Some(i) => i,
        };
        let Some(idx) = self.history[..end]
            .iter()
            .rposition(|e| self.matches_draft(e))
        else {
            return;
        };
        self.history_index = Some(idx);
        self.input.clone_from(&self.history[idx]);
        self.cursor = self.len();
    }

    fn history_down(&mut self) {
        let Some(i) = self.history_index else { return };
        let next = self.history[i + 1..]
            .iter()
            .position(|e| self.matches_draft(e))
            .map(|offset| i + 1 + offset);
        if let Some(idx) = next {
            self.history_index = Some(idx);
            self.input.clone_from(&self.history[idx]);
        } else {
            self.history_index = None;
            self.input = std::mem::take(&mut self.draft);
        }
        self.cursor = self.len();
    }

    fn render(&self, prompt: &str) -> io::Result<()> {
        let mut out = stdout();
        let before: String = self.input.chars().take(self.cursor).collect();
        let column = prompt.width() + before.width();
        write!(
            out,
            "\r{}{prompt}{}{}",
            terminal::Clear(ClearType::CurrentLine),
            self.input,
            cursor::MoveToColumn(u16::try_from(column).unwrap_or(u16::MAX)),
        )?;
        out.flush()
    }
}

/// Read one line in raw mode. Ctrl-C returns [`ReadLineResult::Interrupted`].
pub fn read_line(prompt: &str, history: &[String]) -> io::Result<ReadLineResult> {
    let _guard = RawModeGuard::enter()?;
    let mut line = LineBuffer::new(history);
    line.render(prompt)?;

    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let result = match line.apply(key) {
            Action::Continue => {
                line.render(prompt)?;
                continue;
            }
            Action::Submit => ReadLineResult::Line(std::mem::take(&mut line.input)),
            Action::Interrupt => ReadLineResult::Interrupted,
            Action::Eof => ReadLineResult::Eof,
        };
        write!(stdout(), "\r\n")?;
        stdout().flush()?;
        return Ok(result);
    }
}
