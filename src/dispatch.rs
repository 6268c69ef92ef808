use std::path::PathBuf;

use chrono::Utc;
use tracing::info;

use crate::error::{Result, ReviewError};

/// Delivery collaborator: takes a finished message and hands it off.
pub trait Dispatcher {
    fn dispatch(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Writes each message as a markdown file into an outbox directory, where
/// a mail relay picks it up.
pub struct OutboxDispatcher {
    dir: PathBuf,
}

impl OutboxDispatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_name(recipient: &str) -> String {
        let slug: String = recipient
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}-{}.md", Utc::now().format("%Y%m%dT%H%M%S%.3f"), slug)
    }
}

impl Dispatcher for OutboxDispatcher {
    fn dispatch(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        if recipient.trim().is_empty() {
            return Err(ReviewError::Dispatch("recipient must not be empty".to_string()));
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| ReviewError::Dispatch(format!("cannot create outbox: {e}")))?;
        let path = self.dir.join(Self::file_name(recipient));
        let message = format!("To: {recipient}\nSubject: {subject}\n\n{body}\n");
        std::fs::write(&path, message)
            .map_err(|e| ReviewError::Dispatch(format!("cannot write {}: {e}", path.display())))?;

        info!(recipient, path = %path.display(), "message queued in outbox");
        Ok(())
    }
}

/// Prints messages instead of delivering them.
pub struct StdoutDispatcher;

impl Dispatcher for StdoutDispatcher {
    fn dispatch(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        println!("To: {recipient}\nSubject: {subject}\n\n{body}");
        Ok(())
    }
}
