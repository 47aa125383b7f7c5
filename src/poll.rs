//! Freshness polling for the active page.
//!
//! The poll interval is self-tuning: it drops to the minimum right after a
//! change is seen and grows by a fixed step, capped at the maximum, every
//! round nothing changes. The timer loop itself lives in the coordinator;
//! this module holds the schedule and the check.

use crate::config::PollConfig;
use crate::markdown::MarkdownPattern;
use crate::source::{BlobOpener, Locator};
use crate::stamp::EntryStamp;
use crate::tree::{MarkdownDoc, TreeEntry};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    current: Duration,
    min: Duration,
    max: Duration,
    step: Duration,
}

impl PollSchedule {
    pub fn new(min: Duration, max: Duration, step: Duration) -> Self {
        Self {
            current: min,
            min,
            max,
            step,
        }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_interval_ms),
            Duration::from_millis(config.max_interval_ms),
            Duration::from_millis(config.step_ms),
        )
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Nothing changed: wait a little longer next time.
    pub fn back_off(&mut self) {
        self.current = (self.current + self.step).min(self.max);
    }

    /// A change was seen: poll fast again.
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Outcome of re-checking one document against its source.
#[derive(Debug)]
pub enum FreshnessCheck {
    Changed(TreeEntry),
    Unchanged,
    Unavailable,
}

/// Compare the source's current stamp with `prior`, reading the document
/// only when the stamps differ.
pub async fn check_freshness(
    opener: &dyn BlobOpener,
    origin: &Locator,
    prior: &EntryStamp,
    pattern: &MarkdownPattern,
) -> FreshnessCheck {
    let source = opener.open(origin);
    match source.probe().await {
        Ok(meta) if meta.stamp == *prior => return FreshnessCheck::Unchanged,
        Ok(_) => {}
        Err(e) => {
            tracing::debug!(origin = %origin, error = %e, "freshness probe failed");
            return FreshnessCheck::Unavailable;
        }
    }
    match source.read_text().await {
        Ok(blob) if blob.meta.stamp == *prior => FreshnessCheck::Unchanged,
        Ok(blob) => FreshnessCheck::Changed(TreeEntry::Markdown(MarkdownDoc::parse(
            blob.text,
            blob.meta.stamp,
            origin.clone(),
            pattern,
        ))),
        Err(e) => {
            tracing::debug!(origin = %origin, error = %e, "freshness read failed");
            FreshnessCheck::Unavailable
        }
    }
}
