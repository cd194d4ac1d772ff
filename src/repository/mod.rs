//! Remote content repository collaborator
//!
//! The repository's wire protocol is out of scope; embedders implement
//! [`Repository`] for their backend. [`memory::InMemoryRepository`] is a
//! complete in-process implementation used by tests and dry runs.
//!
//! A run owns exactly one [`Session`]: it logs in before the first row is
//! dispatched and logs out when the run terminates.

pub mod memory;

use crate::config::Credentials;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use memory::InMemoryRepository;

/// An authenticated repository session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Backend-specific session identifier
    pub id: String,
    /// Account the session belongs to
    pub username: String,
    /// When the session was opened
    pub opened_at: DateTime<Utc>,
}

/// Metadata of a file stored in the repository
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileHandle {
    /// Name under which the file is stored
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Description text, including any category marker
    pub text: String,
}

/// Everything the repository needs to store one file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishRequest {
    /// Final (sanitized, resolved) name
    pub name: String,
    /// Local file to send
    pub file: PathBuf,
    /// Description text with the category marker appended
    pub text: String,
    /// Edit summary
    pub comment: String,
    /// Accept despite repository warnings
    pub ignore_warnings: bool,
}

/// Remote repository that stores published files
///
/// Implementations must be safe to call from many workers at once.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Open a session
    ///
    /// # Errors
    ///
    /// [`crate::Error::Auth`] when the credentials are refused.
    async fn login(&self, credentials: &Credentials) -> Result<Session>;

    /// Close a session opened by [`Repository::login`]
    async fn logout(&self, session: &Session) -> Result<()>;

    /// Whether a file with this name is already stored
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Store one file
    ///
    /// Returns `Ok(false)` when the backend reports failure without detail.
    ///
    /// # Errors
    ///
    /// [`crate::Error::PublishRejected`] for warnings the backend refused to
    /// ignore, [`crate::Error::Publish`] for anything else.
    async fn publish(&self, session: &Session, request: &PublishRequest) -> Result<bool>;

    /// Look up a stored file
    async fn fetch_metadata(&self, name: &str) -> Result<RemoteFileHandle>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
