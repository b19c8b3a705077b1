//! REPL implementation
//!
//! This module implements the interactive chat loop: read a line, act on
//! commands, send everything else to the agent and show the answer.

use crate::agent::QueryAgent;
use crate::cli::commands::{format_error, Command};
use crate::cli::preview::PreviewWriter;
use crate::error::{ChatDbError, Result};
use crossterm::style::Stylize;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::Context;
use rustyline::Helper;
use rustyline::{CompletionType, Config, Editor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

/// Prompt shown before every line
pub const PROMPT: &str = "You: ";

/// Characters of HTML printed when the preview is off
pub const PREVIEW_CHARS: usize = 500;

const FAREWELL: &str = "Bye 👋";

/// Result of reading one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// Ctrl-C
    Interrupted,
    /// Ctrl-D or closed input
    Eof,
}

/// Source of user input lines
pub trait LineReader {
    fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome>;

    /// Persist history, if the reader keeps any
    fn save_history(&mut self) {}
}

/// Completes the loop commands
struct ChatDbHelper;

impl Completer for ChatDbHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &Context<'_>,
    ) -> std::result::Result<(usize, Vec<String>), ReadlineError> {
        let typed = line.trim_start().to_lowercase();
        if typed.is_empty() {
            return Ok((0, vec![]));
        }

        let matches = ["exit", "quit", "html", "nohtml"]
            .into_iter()
            .filter(|cmd| cmd.starts_with(&typed))
            .map(|s| s.to_string())
            .collect();
        Ok((0, matches))
    }
}

impl Hinter for ChatDbHelper {
    type Hint = String;
}

impl Highlighter for ChatDbHelper {}

impl Validator for ChatDbHelper {}

impl Helper for ChatDbHelper {}

/// Rustyline-backed reader with persistent history
pub struct EditorReader {
    editor: Editor<ChatDbHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl EditorReader {
    pub fn new() -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .auto_add_history(true)
            .build();

        let mut editor = Editor::<ChatDbHelper, DefaultHistory>::with_config(config)
            .map_err(|e| ChatDbError::Readline(format!("Failed to initialize editor: {}", e)))?;
        editor.set_helper(Some(ChatDbHelper));

        let history_path = dirs::home_dir()
            .map(|p| p.join(".chatdb").join("history"))
            .unwrap_or_else(|| ".chatdb-history".into());

        if let Err(e) = editor.load_history(&history_path) {
            debug!("Could not load history from {}: {}", history_path.display(), e);
        }

        Ok(Self {
            editor,
            history_path,
        })
    }
}

impl LineReader for EditorReader {
    fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadOutcome::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(e) => Err(ChatDbError::Readline(e.to_string())),
        }
    }

    fn save_history(&mut self) {
        if let Some(dir) = self.history_path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = self.editor.save_history(&self.history_path) {
            debug!("Could not save history: {}", e);
        }
    }
}

/// Whether the loop keeps going after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

/// ChatDB REPL
pub struct Repl {
    reader: Box<dyn LineReader>,
    agent: Arc<dyn QueryAgent>,
    preview: PreviewWriter,
    /// Whether answers go to the browser; toggled by `html` / `nohtml`
    html_enabled: bool,
}

impl Repl {
    pub fn new(
        reader: Box<dyn LineReader>,
        agent: Arc<dyn QueryAgent>,
        preview: PreviewWriter,
        html_enabled: bool,
    ) -> Self {
        Self {
            reader,
            agent,
            preview,
            html_enabled,
        }
    }

    pub fn html_enabled(&self) -> bool {
        self.html_enabled
    }

    /// Run the loop until the user quits or input ends
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        let result = loop {
            match self.reader.read_line(PROMPT) {
                Ok(ReadOutcome::Line(line)) => {
                    if self.handle_line(&line).await == LoopControl::Exit {
                        break Ok(());
                    }
                }
                Ok(ReadOutcome::Interrupted) | Ok(ReadOutcome::Eof) => {
                    println!("\n{}", FAREWELL);
                    break Ok(());
                }
                Err(e) => {
                    report_error(&e);
                    break Err(e);
                }
            }
        };

        self.reader.save_history();
        result
    }

    /// Act on one line of input
    pub async fn handle_line(&mut self, line: &str) -> LoopControl {
        match Command::parse(line) {
            Command::Quit => {
                println!("{}", FAREWELL);
                return LoopControl::Exit;
            }
            Command::EnableHtml => {
                self.html_enabled = true;
                println!("🌐  Browser preview enabled.");
            }
            Command::DisableHtml => {
                self.html_enabled = false;
                println!("🔕  Browser preview disabled.");
            }
            Command::Empty => {}
            Command::Query(text) => self.answer(&text).await,
        }

        LoopControl::Continue
    }

    async fn answer(&self, question: &str) {
        let html = match self.agent.submit_query(question).await {
            Ok(html) => html,
            Err(e) => return report_error(&e),
        };

        if self.html_enabled {
            match self.preview.write(&html) {
                Ok(path) => {
                    debug!("Preview written to {}", path.display());
                    println!("(Opened {})", self.preview.path().display());
                }
                Err(e) => report_error(&e),
            }
        } else {
            println!("\nAssistant (HTML):\n{} …", truncate_chars(&html, PREVIEW_CHARS));
        }
    }

    fn print_welcome(&self) {
        println!(
            "📊  ChatDB v{} ready! (type 'exit' to quit, 'nohtml' to disable preview)",
            env!("CARGO_PKG_VERSION")
        );
    }
}

fn report_error(e: &ChatDbError) {
    error!("{}", e);
    eprintln!("{}", format_error(e).red());
}

/// First `max` characters of `text`, never splitting a character
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::preview::BrowserLauncher;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedReader {
        lines: VecDeque<ReadOutcome>,
        saved: Arc<AtomicUsize>,
    }

    impl ScriptedReader {
        fn boxed(lines: &[&str], end: ReadOutcome, saved: Arc<AtomicUsize>) -> Box<Self> {
            let mut outcomes: VecDeque<ReadOutcome> = lines
                .iter()
                .map(|l| ReadOutcome::Line(l.to_string()))
                .collect();
            outcomes.push_back(end);
            Box::new(Self {
                lines: outcomes,
                saved,
            })
        }
    }

    impl LineReader for ScriptedReader {
        fn read_line(&mut self, _prompt: &str) -> Result<ReadOutcome> {
            Ok(self.lines.pop_front().unwrap_or(ReadOutcome::Eof))
        }

        fn save_history(&mut self) {
            self.saved.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Answers every question with a fixed document, counting calls
    #[derive(Default)]
    struct CountingAgent {
        questions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryAgent for CountingAgent {
        async fn submit_query(&self, text: &str) -> Result<String> {
            self.questions.lock().unwrap().push(text.to_string());
            Ok(format!("<!doctype html><p>{}</p>", text))
        }
    }

    struct FailingAgent;

    #[async_trait]
    impl QueryAgent for FailingAgent {
        async fn submit_query(&self, _text: &str) -> Result<String> {
            Err(ChatDbError::LLMResponse("model unavailable".to_string()))
        }
    }

    #[derive(Default, Clone)]
    struct CountingLauncher {
        opened: Arc<AtomicUsize>,
    }

    impl BrowserLauncher for CountingLauncher {
        fn open(&self, _uri: &str) -> Result<()> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        dir: TempDir,
        launcher: CountingLauncher,
        agent: Arc<CountingAgent>,
        saved: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                launcher: CountingLauncher::default(),
                agent: Arc::new(CountingAgent::default()),
                saved: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn preview_path(&self) -> PathBuf {
            self.dir.path().join("preview.html")
        }

        fn repl(&self, lines: &[&str], end: ReadOutcome, html_enabled: bool) -> Repl {
            Repl::new(
                ScriptedReader::boxed(lines, end, self.saved.clone()),
                self.agent.clone(),
                PreviewWriter::with_launcher(self.preview_path(), Box::new(self.launcher.clone())),
                html_enabled,
            )
        }

        fn questions(&self) -> Vec<String> {
            self.agent.questions.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_query_writes_preview() {
        let fx = Fixture::new();
        let mut repl = fx.repl(&["How many artists?", "exit"], ReadOutcome::Eof, true);

        repl.run().await.unwrap();

        assert_eq!(fx.questions(), vec!["How many artists?"]);
        assert_eq!(
            std::fs::read_to_string(fx.preview_path()).unwrap(),
            "<!doctype html><p>How many artists?</p>"
        );
        assert_eq!(fx.launcher.opened.load(Ordering::SeqCst), 1);
        assert_eq!(fx.saved.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_quit_stops_before_remaining_lines() {
        let fx = Fixture::new();
        let mut repl = fx.repl(&["QUIT", "never asked"], ReadOutcome::Eof, true);

        repl.run().await.unwrap();
        assert!(fx.questions().is_empty());
    }

    #[tokio::test]
    async fn test_empty_lines_are_ignored() {
        let fx = Fixture::new();
        let mut repl = fx.repl(&["", "   ", "\t"], ReadOutcome::Eof, true);

        repl.run().await.unwrap();
        assert!(fx.questions().is_empty());
        assert!(!fx.preview_path().exists());
    }

    #[tokio::test]
    async fn test_nohtml_then_html_toggles_preview() {
        let fx = Fixture::new();
        let mut repl = fx.repl(&[], ReadOutcome::Eof, true);

        assert_eq!(repl.handle_line("nohtml").await, LoopControl::Continue);
        assert!(!repl.html_enabled());
        repl.handle_line("first").await;
        assert!(!fx.preview_path().exists());

        assert_eq!(repl.handle_line("HTML").await, LoopControl::Continue);
        assert!(repl.html_enabled());
        repl.handle_line("second").await;
        assert_eq!(
            std::fs::read_to_string(fx.preview_path()).unwrap(),
            "<!doctype html><p>second</p>"
        );
        assert_eq!(fx.launcher.opened.load(Ordering::SeqCst), 1);
        assert_eq!(fx.questions(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_startup_flag_matches_runtime_toggle() {
        let fx = Fixture::new();
        let mut repl = fx.repl(&[], ReadOutcome::Eof, false);
        assert!(!repl.html_enabled());

        repl.handle_line("question").await;
        assert!(!fx.preview_path().exists());
        assert_eq!(fx.launcher.opened.load(Ordering::SeqCst), 0);

        repl.handle_line("html").await;
        assert!(repl.html_enabled());
    }

    #[tokio::test]
    async fn test_agent_error_keeps_loop_alive() {
        let fx = Fixture::new();
        let mut repl = Repl::new(
            ScriptedReader::boxed(&[], ReadOutcome::Eof, fx.saved.clone()),
            Arc::new(FailingAgent),
            PreviewWriter::with_launcher(fx.preview_path(), Box::new(fx.launcher.clone())),
            true,
        );

        assert_eq!(repl.handle_line("anything").await, LoopControl::Continue);
        assert!(!fx.preview_path().exists());
        assert_eq!(repl.handle_line("exit").await, LoopControl::Exit);
    }

    #[test]
    fn test_interrupt_ends_loop_cleanly() {
        let fx = Fixture::new();
        let mut repl = fx.repl(&["nohtml"], ReadOutcome::Interrupted, true);

        assert!(tokio_test::block_on(repl.run()).is_ok());
        assert!(!repl.html_enabled());
        assert_eq!(fx.saved.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 2), "he");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        let long = "x".repeat(PREVIEW_CHARS + 20);
        assert_eq!(truncate_chars(&long, PREVIEW_CHARS).len(), PREVIEW_CHARS);
    }
}
