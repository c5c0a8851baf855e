use std::collections::VecDeque;
use std::io::{IsTerminal, Write};

use crossterm::style::{Stylize, style};
use docqa_core::channel::{Channel, ChannelError, ChannelMessage};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::line_editor::{self, ReadLineResult};

const PROMPT: &str = "> ";
const MAX_HISTORY: usize = 1000;

/// In-memory input history, newest last.
#[derive(Debug, Default)]
struct InputHistory {
    entries: VecDeque<String>,
}

impl InputHistory {
    fn add(&mut self, line: &str) {
        if line.is_empty() || self.entries.back().is_some_and(|last| last == line) {
            return;
        }
        if self.entries.len() == MAX_HISTORY {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_owned());
    }

    fn snapshot(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}

/// Terminal channel: a line editor when stdin is a TTY, plain line reads otherwise.
#[derive(Debug)]
pub struct CliChannel {
    history: InputHistory,
    piped: Option<Lines<BufReader<Stdin>>>,
}

impl CliChannel {
    #[must_use]
    pub fn new() -> Self {
        let piped = if std::io::stdin().is_terminal() {
            None
        } else {
            tracing::debug!("stdin is not a terminal, reading plain lines");
            Some(BufReader::new(tokio::io::stdin()).lines())
        };
        Self {
            history: InputHistory::default(),
            piped,
        }
    }

    fn is_interactive(&self) -> bool {
        self.piped.is_none()
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for CliChannel {
    async fn recv(&mut self) -> Result<Option<ChannelMessage>, ChannelError> {
        if let Some(lines) = &mut self.piped {
            return Ok(lines.next_line().await?.map(|line| ChannelMessage {
                text: line.trim().to_owned(),
            }));
        }

        let entries = self.history.snapshot();
        let result = tokio::task::spawn_blocking(move || line_editor::read_line(PROMPT, &entries))
            .await
            .map_err(|e| ChannelError::Other(e.to_string()))??;

        let line = match result {
            ReadLineResult::Interrupted | ReadLineResult::Eof => return Ok(None),
            ReadLineResult::Line(l) => l,
        };
        let text = line.trim().to_owned();
        self.history.add(&text);
        Ok(Some(ChannelMessage { text }))
    }

    async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{text}")?;
        out.flush()?;
        Ok(())
    }

    async fn send_status(&mut self, text: &str) -> Result<(), ChannelError> {
        let mut out = std::io::stdout().lock();
        if self.is_interactive() {
            writeln!(out, "{}", style(text).dim())?;
        } else {
            writeln!(out, "{text}")?;
        }
        out.flush()?;
        Ok(())
    }
}
