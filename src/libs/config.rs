//! Client configuration.
//!
//! Collects the small set of knobs the core recognizes: the API endpoint,
//! the retry budget shared by the request layer and the chunk workers, the
//! transfer parallelism, and the per-exchange HTTP timeout. Values not set
//! explicitly fall back to the same defaults the original client ships with.
//!
//! ## Usage
//!
//! ```rust
//! use megalite::libs::config::Config;
//!
//! let mut config = Config::default();
//! config.dl_workers = 4;
//! config.validate()?;
//! # Ok::<(), megalite::libs::error::Error>(())
//! ```

use crate::libs::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://eu.api.mega.co.nz/cs";

/// Default retry budget for transient failures.
pub const DEFAULT_RETRIES: u32 = 5;

/// Default number of parallel download workers.
pub const DEFAULT_DL_WORKERS: usize = 3;

/// Default number of parallel upload workers.
pub const DEFAULT_UL_WORKERS: usize = 1;

/// Hard ceiling on transfer workers of either kind.
pub const MAX_WORKERS: usize = 6;

/// Default timeout applied to each HTTP exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables recognized by the client core.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Base URL of the JSON command endpoint.
    pub base_url: String,

    /// How many times a transient failure is retried before surfacing.
    ///
    /// Applies both to API requests (transport failure, "try again") and to
    /// individual chunk fetches inside a transfer.
    pub retries: u32,

    /// Parallel workers per download, capped at [`MAX_WORKERS`].
    pub dl_workers: usize,

    /// Parallel workers per upload, capped at [`MAX_WORKERS`].
    pub ul_workers: usize,

    /// Timeout for a single HTTP exchange.
    #[serde(with = "timeout_secs")]
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            retries: DEFAULT_RETRIES,
            dl_workers: DEFAULT_DL_WORKERS,
            ul_workers: DEFAULT_UL_WORKERS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Config {
    /// Rejects configurations the transfer engine refuses to run with.
    pub fn validate(&self) -> Result<()> {
        if self.dl_workers == 0 || self.dl_workers > MAX_WORKERS {
            return Err(Error::WorkerLimitExceeded(self.dl_workers, MAX_WORKERS));
        }
        if self.ul_workers == 0 || self.ul_workers > MAX_WORKERS {
            return Err(Error::WorkerLimitExceeded(self.ul_workers, MAX_WORKERS));
        }
        if self.base_url.is_empty() {
            return Err(Error::BadArgs("base_url"));
        }
        Ok(())
    }
}

/// Serialize the HTTP timeout as whole seconds.
mod timeout_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(de)?))
    }
}
