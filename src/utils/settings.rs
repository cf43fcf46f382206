use std::{io::ErrorKind, path::Path};

use anyhow::Result;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::time::hms;

pub const SETTINGS_FILE: &str = "settings.json";

/// Expected working hours. Clock-in after `expected_clock_in` is late, clock-out before
/// `expected_clock_out` is early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(with = "hms")]
    pub expected_clock_in: NaiveTime,
    #[serde(with = "hms")]
    pub expected_clock_out: NaiveTime,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            expected_clock_in: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            expected_clock_out: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl Settings {
    /// Reads `settings.json` from the application directory. A missing file means defaults.
    pub async fn load(application_dir: &Path) -> Result<Self> {
        let path = application_dir.join(SETTINGS_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!("Loading settings from {path:?}");
                Ok(serde_json::from_str(&content)?)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn with_overrides(
        self,
        expected_clock_in: Option<NaiveTime>,
        expected_clock_out: Option<NaiveTime>,
    ) -> Self {
        Self {
            expected_clock_in: expected_clock_in.unwrap_or(self.expected_clock_in),
            expected_clock_out: expected_clock_out.unwrap_or(self.expected_clock_out),
        }
    }
}
