//! Browser preview of answers
//!
//! Each answer replaces the preview file, which is then opened in the
//! user's default browser.

use crate::error::{ChatDbError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;
use url::Url;

/// Opens a URI outside the process
pub trait BrowserLauncher: Send + Sync {
    /// Open the URI, returning once the launch has been handed off
    fn open(&self, uri: &str) -> Result<()>;
}

/// Launches the platform's default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, uri: &str) -> Result<()> {
        let mut command = if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.arg(uri);
            c
        } else if cfg!(target_os = "windows") {
            // Empty title so `start` does not treat the URI as one
            let mut c = Command::new("cmd");
            c.args(["/C", "start", "", uri]);
            c
        } else {
            let mut c = Command::new("xdg-open");
            c.arg(uri);
            c
        };

        command
            .spawn()
            .map(|_| ())
            .map_err(|e| ChatDbError::Browser(format!("{}: {}", uri, e)))
    }
}

/// Writes answers to the preview file and opens them
pub struct PreviewWriter {
    path: PathBuf,
    launcher: Box<dyn BrowserLauncher>,
}

impl PreviewWriter {
    /// Preview writer that opens the system browser
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_launcher(path, Box::new(SystemBrowser))
    }

    pub fn with_launcher(path: impl Into<PathBuf>, launcher: Box<dyn BrowserLauncher>) -> Self {
        Self {
            path: path.into(),
            launcher,
        }
    }

    /// Configured preview path, possibly relative
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the preview file with `html` and open it
    ///
    /// Returns the absolute path that was opened.
    pub fn write(&self, html: &str) -> Result<PathBuf> {
        std::fs::write(&self.path, html)?;
        let absolute = self.path.canonicalize()?;

        let uri = file_uri(&absolute)?;
        debug!("Opening {}", uri);
        self.launcher.open(&uri)?;

        Ok(absolute)
    }
}

/// `file://` URI for an absolute path
pub fn file_uri(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|_| ChatDbError::Browser(format!("not an absolute path: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Default, Clone)]
    struct RecordingLauncher {
        opened: Arc<Mutex<Vec<String>>>,
    }

    impl BrowserLauncher for RecordingLauncher {
        fn open(&self, uri: &str) -> Result<()> {
            self.opened.lock().unwrap().push(uri.to_string());
            Ok(())
        }
    }

    struct BrokenLauncher;

    impl BrowserLauncher for BrokenLauncher {
        fn open(&self, _uri: &str) -> Result<()> {
            Err(ChatDbError::Browser("no display".to_string()))
        }
    }

    #[test]
    fn test_write_overwrites_and_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preview.html");
        std::fs::write(&path, "<p>old answer that is longer</p>").unwrap();

        let launcher = RecordingLauncher::default();
        let writer = PreviewWriter::with_launcher(&path, Box::new(launcher.clone()));

        let opened = writer.write("<html>new</html>").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<html>new</html>");
        assert!(opened.is_absolute());

        let uris = launcher.opened.lock().unwrap();
        assert_eq!(uris.len(), 1);
        assert!(uris[0].starts_with("file://"));
        assert!(uris[0].ends_with("/preview.html"));
    }

    #[test]
    fn test_launch_failure_keeps_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preview.html");
        let writer = PreviewWriter::with_launcher(&path, Box::new(BrokenLauncher));

        let err = writer.write("<html></html>").unwrap_err();
        assert!(matches!(err, ChatDbError::Browser(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<html></html>");
    }

    #[test]
    fn test_unwritable_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("preview.html");
        let writer = PreviewWriter::with_launcher(&path, Box::new(RecordingLauncher::default()));
        assert!(matches!(writer.write("x").unwrap_err(), ChatDbError::Io(_)));
    }

    #[test]
    fn test_file_uri_escapes_spaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().canonicalize().unwrap().join("my answer.html");
        let uri = file_uri(&path).unwrap();
        assert!(uri.ends_with("/my%20answer.html"));
        assert!(file_uri(Path::new("relative.html")).is_err());
    }
}
