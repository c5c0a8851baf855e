//! Session state machine, configuration, upload handling and answering.

pub mod channel;
pub mod commands;
pub mod config;
pub mod error;
pub mod prompt;
pub mod runner;
pub mod session;
pub mod upload;

pub use channel::{Channel, ChannelError, ChannelMessage};
pub use commands::Command;
pub use config::Config;
pub use error::SessionError;
pub use runner::Runner;
pub use session::{Answer, DocumentInfo, Session, SessionSettings, SessionState, SessionStatus};
pub use upload::UploadedFile;
