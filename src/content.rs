//! Place name and quote shown under the clock, from a text-generation backend.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{CONTENT_BASE_DELAY_MS, CONTENT_MAX_ATTEMPTS, FALLBACK_PLACE, FALLBACK_QUOTE};
use crate::error::ProviderError;
use crate::position::Position;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inspiration {
    pub place_name: String,
    pub quote: String,
}

impl Inspiration {
    pub fn fallback() -> Self {
        Self {
            place_name: FALLBACK_PLACE.to_string(),
            quote: FALLBACK_QUOTE.to_string(),
        }
    }
}

pub trait ContentProvider {
    fn name(&self) -> &str;

    fn fetch(&self, position: &Position) -> Result<Inspiration, ProviderError>;
}

/// A JSON file with `place_name` and `quote`, refreshed by another process.
/// A missing file is treated like a network failure and retried.
pub struct QuoteFile(pub PathBuf);

impl ContentProvider for QuoteFile {
    fn name(&self) -> &str {
        "quote file"
    }

    fn fetch(&self, _position: &Position) -> Result<Inspiration, ProviderError> {
        let json = fs::read_to_string(&self.0)
            .map_err(|e| ProviderError::Network(format!("{}: {}", self.0.display(), e)))?;
        serde_json::from_str(&json).map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: CONTENT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(CONTENT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed attempt `attempt` (0-based): base × 2^attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Ask the provider until it answers, the error is not worth retrying, or
/// the attempts run out. Never fails: the static fallback covers every error.
pub fn fetch_with_retry(
    provider: &dyn ContentProvider,
    position: &Position,
    policy: &RetryPolicy,
    mut sleep: impl FnMut(Duration),
) -> Inspiration {
    for attempt in 0..policy.max_attempts {
        match provider.fetch(position) {
            Ok(inspiration) => {
                info!("{} answered on attempt {}", provider.name(), attempt + 1);
                return inspiration;
            }
            Err(e) if !e.is_retryable() => {
                warn!("{} failed: {}, not retrying", provider.name(), e);
                break;
            }
            Err(e) => {
                warn!(
                    "{} attempt {}/{} failed: {}",
                    provider.name(),
                    attempt + 1,
                    policy.max_attempts,
                    e
                );
                if attempt + 1 < policy.max_attempts {
                    sleep(policy.delay(attempt));
                }
            }
        }
    }

    Inspiration::fallback()
}
