//! Terminal front-end for docqa sessions.

pub mod cli;
mod line_editor;

pub use cli::CliChannel;
