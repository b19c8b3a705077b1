//! CLI module
//!
//! This module provides the interactive side of ChatDB: the REPL loop,
//! command parsing and the browser preview.

pub mod commands;
pub mod preview;
pub mod repl;

// Re-exports
pub use commands::Command;
pub use preview::{BrowserLauncher, PreviewWriter, SystemBrowser};
pub use repl::{EditorReader, LineReader, LoopControl, ReadOutcome, Repl};
