//! Route handlers for the control API
//!
//! - [`run`]: start, pause, resume, stop, reset, progress and results
//! - [`system`]: health, network probe and the event stream

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod run;
mod system;

pub use run::*;
pub use system::*;

/// Request body for `POST /run/start`
#[derive(Debug, Deserialize, Serialize)]
pub struct StartRunRequest {
    /// Input table (CSV, TSV, spreadsheet or JSON)
    pub input: PathBuf,
    /// Where to write results; defaults to `<input stem>_results.<ext>`
    #[serde(default)]
    pub output: Option<PathBuf>,
}
