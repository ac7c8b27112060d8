//! Settings file for the lampview binary
//!
//! A single JSON document with optional `session` and `tsne` sections. Missing
//! fields take their library defaults.
//!
//! ```json
//! {
//!   "session": { "technique": "plmp", "force_scheme": { "max_iter": 100 } },
//!   "tsne": { "perplexity": 10.0 }
//! }
//! ```

use std::fs;
use std::path::Path;

use lampview_core::{SessionConfig, TsneConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session: SessionConfig,
    pub tsne: TsneConfig,
}

impl Settings {
    /// Read settings from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }
}
