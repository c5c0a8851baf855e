/// Typed error for channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for front-end specific errors.
    #[error("{0}")]
    Other(String),
}

/// Incoming line from a channel.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub text: String,
}

/// Bidirectional front-end for a document session.
pub trait Channel: Send {
    /// Receive the next message. Returns `None` on EOF or shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn recv(&mut self)
    -> impl Future<Output = Result<Option<ChannelMessage>, ChannelError>> + Send;

    /// Send a text response.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn send(&mut self, text: &str) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Send a transient status label, e.g. while indexing. No-op by default.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn send_status(
        &mut self,
        _text: &str,
    ) -> impl Future<Output = Result<(), ChannelError>> + Send {
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_message_creation() {
        let msg = ChannelMessage {
            text: "hello".to_string(),
        };
        assert_eq!(msg.text, "hello");
    }

    struct StubChannel {
        sent: Vec<String>,
    }

    impl Channel for StubChannel {
        async fn recv(&mut self) -> Result<Option<ChannelMessage>, ChannelError> {
            Ok(None)
        }

        async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
            self.sent.push(text.to_owned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_status_default_is_noop() {
        let mut ch = StubChannel { sent: Vec::new() };
        ch.send_status("indexing...").await.unwrap();
        assert!(ch.sent.is_empty());
    }

    #[tokio::test]
    async fn recv_none_on_eof() {
        let mut ch = StubChannel { sent: Vec::new() };
        assert!(ch.recv().await.unwrap().is_none());
    }

    #[test]
    fn channel_error_display() {
        assert_eq!(ChannelError::Other("boom".into()).to_string(), "boom");
    }
}
