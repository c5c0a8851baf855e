use std::path::PathBuf;

pub const HELP_TEXT: &str = "\
Commands:
  /upload <path>  index a PDF or text file, replacing the current document
  /status         show session state and the indexed document
  /help           show this help
  exit, quit      leave
Any other line is a question about the uploaded document.
Press Ctrl-C while indexing or answering to cancel.";

/// One line of user input, interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(PathBuf),
    Status,
    Help,
    Quit,
    Ask(String),
    /// A recognised command used wrongly; carries the usage hint.
    Usage(&'static str),
    Empty,
}

impl Command {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if line == "exit" || line == "quit" {
            return Self::Quit;
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Self::Ask(line.to_owned());
        };
        let (name, arg) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(n, a)| (n, a.trim()));

        match name {
            "upload" if arg.is_empty() => Self::Usage("Usage: /upload <path>"),
            "upload" => Self::Upload(PathBuf::from(unquote(arg))),
            "status" => Self::Status,
            "help" => Self::Help,
            _ => Self::Ask(line.to_owned()),
        }
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_upload() {
        assert_eq!(
            Command::parse("/upload ./docs/paper.pdf"),
            Command::Upload(PathBuf::from("./docs/paper.pdf"))
        );
        assert_eq!(
            Command::parse("/upload   \"my notes.txt\"  "),
            Command::Upload(PathBuf::from("my notes.txt"))
        );
    }

    #[test]
    fn parse_upload_without_path() {
        assert!(matches!(Command::parse("/upload"), Command::Usage(_)));
        assert!(matches!(Command::parse("/upload   "), Command::Usage(_)));
    }

    #[test]
    fn parse_simple_commands() {
        assert_eq!(Command::parse("/status"), Command::Status);
        assert_eq!(Command::parse("/help"), Command::Help);
        assert_eq!(Command::parse(" exit "), Command::Quit);
        assert_eq!(Command::parse("quit"), Command::Quit);
        assert_eq!(Command::parse("   "), Command::Empty);
    }

    #[test]
    fn other_lines_are_questions() {
        assert_eq!(
            Command::parse("What is the capital of France?"),
            Command::Ask("What is the capital of France?".into())
        );
        assert_eq!(
            Command::parse("/unknown thing"),
            Command::Ask("/unknown thing".into())
        );
        assert_eq!(
            Command::parse("quit smoking tips?"),
            Command::Ask("quit smoking tips?".into())
        );
    }
}
