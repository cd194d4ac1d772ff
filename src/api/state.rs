//! Shared state for route handlers

use crate::BatchUploader;
use std::sync::Arc;

/// Handed to every handler; cloning only bumps the `Arc`
#[derive(Clone)]
pub struct AppState {
    /// The uploader whose run the API controls
    pub uploader: Arc<BatchUploader>,
}

impl AppState {
    /// Wrap an uploader for the router
    pub fn new(uploader: Arc<BatchUploader>) -> Self {
        Self { uploader }
    }
}
