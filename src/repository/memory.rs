//! In-process repository backed by a map
//!
//! Besides storing files it can be scripted to refuse logins, fail a number
//! of publish calls, or slow publishing down, which is what orchestrator tests
//! need to exercise retries, pause and stop.

use super::{PublishRequest, RemoteFileHandle, Repository, Session};
use crate::config::Credentials;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How a scripted publish failure surfaces
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishFailure {
    /// Backend refuses with a warning
    Rejected(String),
    /// Backend errors
    Error(String),
    /// Backend returns `false`
    Declined,
}

#[derive(Default)]
struct State {
    files: HashMap<String, RemoteFileHandle>,
    sessions: HashSet<String>,
    failures: VecDeque<PublishFailure>,
}

/// Map-backed [`Repository`]
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
    refuse_login: bool,
    publish_delay: Duration,
    publish_calls: AtomicUsize,
    session_counter: AtomicUsize,
}

impl InMemoryRepository {
    /// Empty repository that accepts any credentials
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate names so they count as taken
    pub fn with_existing<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.lock();
            for name in names {
                let name = name.into();
                state.files.insert(
                    name.clone(),
                    RemoteFileHandle {
                        name,
                        size: 0,
                        text: String::new(),
                    },
                );
            }
        }
        self
    }

    /// Refuse every login
    pub fn refusing_login(mut self) -> Self {
        self.refuse_login = true;
        self
    }

    /// Fail the next publish calls in order
    pub fn with_failures<I>(self, failures: I) -> Self
    where
        I: IntoIterator<Item = PublishFailure>,
    {
        self.lock().failures.extend(failures);
        self
    }

    /// Make each publish call take at least `delay`
    pub fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = delay;
        self
    }

    /// Stored file by name
    pub fn stored(&self, name: &str) -> Option<RemoteFileHandle> {
        self.lock().files.get(name).cloned()
    }

    /// Every stored name, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().files.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of publish calls, including failed ones
    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Overwrite the stored description of `name` (to provoke verification mismatches)
    pub fn set_text(&self, name: &str, text: &str) {
        if let Some(file) = self.lock().files.get_mut(name) {
            file.text = text.to_string();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned map is still consistent: every mutation is a single insert/remove
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn login(&self, credentials: &Credentials) -> Result<Session> {
        if self.refuse_login {
            return Err(Error::Auth(format!(
                "credentials refused for {}",
                credentials.username
            )));
        }

        let n = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Session {
            id: format!("memory-{}", n),
            username: credentials.username.clone(),
            opened_at: Utc::now(),
        };
        self.lock().sessions.insert(session.id.clone());
        Ok(session)
    }

    async fn logout(&self, session: &Session) -> Result<()> {
        self.lock().sessions.remove(&session.id);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.lock().files.contains_key(name))
    }

    async fn publish(&self, session: &Session, request: &PublishRequest) -> Result<bool> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);

        if !self.publish_delay.is_zero() {
            tokio::time::sleep(self.publish_delay).await;
        }

        let size = tokio::fs::metadata(&request.file)
            .await
            .map_err(|e| Error::Publish(format!("cannot read {}: {}", request.file.display(), e)))?
            .len();

        let mut state = self.lock();
        if !state.sessions.contains(&session.id) {
            return Err(Error::Auth(format!("session {} is not open", session.id)));
        }

        if let Some(failure) = state.failures.pop_front() {
            return match failure {
                PublishFailure::Rejected(msg) => Err(Error::PublishRejected(msg)),
                PublishFailure::Error(msg) => Err(Error::Publish(msg)),
                PublishFailure::Declined => Ok(false),
            };
        }

        let name = request.name.clone();
        if state.files.contains_key(&name) && !request.ignore_warnings {
            return Err(Error::PublishRejected(format!("{} already exists", name)));
        }

        state.files.insert(
            name.clone(),
            RemoteFileHandle {
                name,
                size,
                text: request.text.clone(),
            },
        );
        Ok(true)
    }

    async fn fetch_metadata(&self, name: &str) -> Result<RemoteFileHandle> {
        self.lock()
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Other(format!("no file named {} in repository", name)))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
