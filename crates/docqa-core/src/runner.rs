use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use docqa_llm::provider::LlmProvider;

use crate::channel::{Channel, ChannelError};
use crate::commands::{Command, HELP_TEXT};
use crate::session::{Answer, Session, SessionStatus};
use crate::upload::UploadedFile;

/// Drives a [`Session`] from a [`Channel`] until the user quits or input ends.
pub struct Runner<C, P> {
    channel: C,
    session: Arc<Session<P>>,
}

impl<C, P> Runner<C, P>
where
    C: Channel,
    P: LlmProvider + Clone + 'static,
{
    pub fn new(channel: C, session: Arc<Session<P>>) -> Self {
        Self { channel, session }
    }

    /// # Errors
    ///
    /// Returns an error only if the channel fails. Session errors are reported to the user.
    pub async fn run(&mut self) -> Result<(), ChannelError> {
        while let Some(message) = self.channel.recv().await? {
            match Command::parse(&message.text) {
                Command::Quit => break,
                Command::Empty => {}
                Command::Help => self.channel.send(HELP_TEXT).await?,
                Command::Usage(hint) => self.channel.send(hint).await?,
                Command::Status => {
                    let text = format_status(&self.session.status());
                    self.channel.send(&text).await?;
                }
                Command::Upload(path) => self.handle_upload(&path).await?,
                Command::Ask(question) => self.handle_question(&question).await?,
            }
        }
        tracing::debug!("input closed, leaving");
        Ok(())
    }

    async fn handle_upload(&mut self, path: &Path) -> Result<(), ChannelError> {
        let file = match UploadedFile::from_path(path).await {
            Ok(file) => file,
            Err(e) => {
                return self
                    .channel
                    .send(&format!("Cannot read {}: {e}", path.display()))
                    .await;
            }
        };

        self.channel
            .send_status(&format!("Indexing {}...", file.name))
            .await?;
        match self.session.upload(file).await {
            Ok(info) => {
                self.channel
                    .send(&format!(
                        "Indexed {}: {} chunks from {} {}.",
                        info.name,
                        info.chunks,
                        info.records,
                        if info.records == 1 { "record" } else { "records" }
                    ))
                    .await
            }
            Err(e) => self.channel.send(&format!("Upload failed: {e}")).await,
        }
    }

    async fn handle_question(&mut self, question: &str) -> Result<(), ChannelError> {
        self.channel.send_status("Thinking...").await?;
        match self.session.ask(question).await {
            Ok(answer) => self.channel.send(&format_answer(&answer)).await,
            Err(e) => self.channel.send(&format!("Error: {e}")).await,
        }
    }
}

fn format_answer(answer: &Answer) -> String {
    let mut out = answer.text.trim_end().to_owned();
    if answer.sources.is_empty() {
        return out;
    }
    out.push_str("\n\nSources:");
    for (i, source) in answer.sources.iter().enumerate() {
        let name = Path::new(&source.source)
            .file_name()
            .map_or_else(|| source.source.clone(), |n| n.to_string_lossy().into_owned());
        let _ = write!(out, "\n  [{}] {name}", i + 1);
        if let Some(page) = source.page {
            let _ = write!(out, " p.{page}");
        }
        let _ = write!(out, " (score {:.2})", source.score);
    }
    out
}

fn format_status(status: &SessionStatus) -> String {
    let mut out = format!(
        "State: {}\nEmbedding model: {}",
        status.state, status.embedding_model
    );
    match &status.document {
        Some(doc) => {
            let _ = write!(
                out,
                "\nDocument: {} ({} chunks, {} records)",
                doc.name, doc.chunks, doc.records
            );
            match &doc.path {
                Some(path) => {
                    let _ = write!(out, "\nStored at: {}", path.display());
                }
                None => out.push_str("\nStored file was overwritten by a failed upload"),
            }
        }
        None => out.push_str("\nDocument: none, use /upload <path>"),
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use docqa_llm::mock::MockProvider;
    use docqa_memory::RetrievedChunk;

    use super::*;
    use crate::channel::ChannelMessage;
    use crate::config::Config;
    use crate::session::{DocumentInfo, SessionSettings, SessionState};

    struct MockChannel {
        messages: Vec<String>,
        sent: Arc<Mutex<Vec<String>>>,
        statuses: Arc<Mutex<Vec<String>>>,
    }

    impl MockChannel {
        fn new(messages: Vec<String>) -> Self {
            Self {
                messages,
                sent: Arc::new(Mutex::new(Vec::new())),
                statuses: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Channel for MockChannel {
        async fn recv(&mut self) -> Result<Option<ChannelMessage>, ChannelError> {
            if self.messages.is_empty() {
                Ok(None)
            } else {
                Ok(Some(ChannelMessage {
                    text: self.messages.remove(0),
                }))
            }
        }

        async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(text.to_owned());
            Ok(())
        }

        async fn send_status(&mut self, text: &str) -> Result<(), ChannelError> {
            self.statuses.lock().unwrap().push(text.to_owned());
            Ok(())
        }
    }

    fn session(dir: &Path, mock: MockProvider) -> Arc<Session<MockProvider>> {
        let mut settings = SessionSettings::from(&Config::default());
        settings.dir = dir.join("session");
        Arc::new(Session::new(settings, mock.clone(), mock).unwrap())
    }

    #[tokio::test]
    async fn upload_then_question_flow() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("facts.txt");
        std::fs::write(&doc, "The capital of France is Paris.").unwrap();

        let channel = MockChannel::new(vec![
            format!("/upload {}", doc.display()),
            "What is the capital of France?".into(),
            "/status".into(),
            "quit".into(),
            "never reached".into(),
        ]);
        let sent = Arc::clone(&channel.sent);
        let statuses = Arc::clone(&channel.statuses);
        let session = session(dir.path(), MockProvider::with_responses(vec!["Paris.".into()]));

        Runner::new(channel, Arc::clone(&session)).run().await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], "Indexed facts.txt: 1 chunks from 1 record.");
        assert!(sent[1].starts_with("Paris.\n\nSources:\n  [1] uploaded.txt (score "));
        assert!(sent[2].contains("State: ready"));
        assert!(sent[2].contains("Document: facts.txt"));
        assert_eq!(
            *statuses.lock().unwrap(),
            vec!["Indexing facts.txt...".to_owned(), "Thinking...".to_owned()]
        );
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn question_before_upload_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new(vec!["hello?".into()]);
        let sent = Arc::clone(&channel.sent);

        Runner::new(channel, session(dir.path(), MockProvider::default()))
            .run()
            .await
            .unwrap();

        assert_eq!(
            sent.lock().unwrap()[0],
            "Error: no document indexed yet, upload one first"
        );
    }

    #[tokio::test]
    async fn rejected_upload_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("x.docx");
        std::fs::write(&doc, b"PK").unwrap();
        let channel = MockChannel::new(vec![format!("/upload {}", doc.display())]);
        let sent = Arc::clone(&channel.sent);

        Runner::new(channel, session(dir.path(), MockProvider::default()))
            .run()
            .await
            .unwrap();

        let sent = sent.lock().unwrap();
        assert!(sent[0].starts_with("Upload failed: unsupported file type: docx"));
        assert!(!dir.path().join("session").exists());
    }

    #[tokio::test]
    async fn missing_file_and_help() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new(vec![
            "/upload /nonexistent/doc.pdf".into(),
            "/upload".into(),
            "/help".into(),
            String::new(),
        ]);
        let sent = Arc::clone(&channel.sent);

        Runner::new(channel, session(dir.path(), MockProvider::default()))
            .run()
            .await
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].starts_with("Cannot read /nonexistent/doc.pdf"));
        assert_eq!(sent[1], "Usage: /upload <path>");
        assert_eq!(sent[2], HELP_TEXT);
    }

    #[test]
    fn format_answer_lists_pages() {
        let answer = Answer {
            text: "It is Paris.\n".into(),
            sources: vec![RetrievedChunk {
                ordinal: 3,
                text: "Paris".into(),
                score: 0.8765,
                source: "/tmp/s/uploaded.pdf".into(),
                page: Some(2),
                chunk_index: 0,
            }],
        };
        assert_eq!(
            format_answer(&answer),
            "It is Paris.\n\nSources:\n  [1] uploaded.pdf p.2 (score 0.88)"
        );
    }

    #[test]
    fn format_status_without_document() {
        let status = SessionStatus {
            state: SessionState::Idle,
            document: None,
            embedding_model: "all-minilm:33m".into(),
        };
        assert_eq!(
            format_status(&status),
            "State: idle\nEmbedding model: all-minilm:33m\nDocument: none, use /upload <path>"
        );
    }

    #[test]
    fn format_status_with_overwritten_file() {
        let status = SessionStatus {
            state: SessionState::Ready,
            document: Some(DocumentInfo {
                name: "facts.txt".into(),
                path: None,
                records: 1,
                chunks: 2,
                document_hash: "h".into(),
            }),
            embedding_model: "mock".into(),
        };
        assert_eq!(
            format_status(&status),
            "State: ready\nEmbedding model: mock\nDocument: facts.txt (2 chunks, 1 records)\n\
             Stored file was overwritten by a failed upload"
        );
    }
}
