//! Waiting for the indexing service to catch up with the daemons.
//!
//! Every failed poll, whether refused, an error status, or a height still
//! short of the target, counts the same: retry after the interval until the
//! attempt budget runs out.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::insight::{InsightClient, InsightError};
use crate::retry::{Probe, RetryError, RetryPolicy};

/// Log target for sync waits.
pub(crate) const SYNC_TARGET: &str = "regtest_harness::sync";

/// Something that reports how far it has indexed.
pub trait ChainHeightSource {
    /// Failure reported by a single poll.
    type Error: fmt::Display;

    /// Current indexed height.
    ///
    /// # Errors
    ///
    /// Returns the source's error when the height cannot be read.
    fn chain_height(&self) -> Result<u64, Self::Error>;
}

impl ChainHeightSource for InsightClient {
    type Error = InsightError;

    fn chain_height(&self) -> Result<u64, Self::Error> {
        self.status().map(|status| status.info.blocks)
    }
}

/// The indexing service never reached the target height.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "indexed height did not reach {target} after {attempts} polls (last: {})",
    .last_observed.map_or_else(|| "unreachable".to_owned(), |height| height.to_string())
)]
pub struct TimeoutError {
    /// Height waited for.
    pub target: u64,
    /// Polls made.
    pub attempts: u32,
    /// Last height reported, if any poll succeeded.
    pub last_observed: Option<u64>,
}

/// Polls `source` until it reports at least `target`.
///
/// Returns the first height at or above the target.
///
/// # Errors
///
/// Returns [`TimeoutError`] after exactly `policy.max_attempts()` polls
/// without success.
pub fn wait_for_height<S: ChainHeightSource + ?Sized>(
    source: &S,
    target: u64,
    policy: &RetryPolicy,
) -> Result<u64, TimeoutError> {
    let mut last_observed = None;
    let outcome = policy.poll(|attempt| match source.chain_height() {
        Ok(height) if height >= target => Probe::Ready(height),
        Ok(height) => {
            last_observed = Some(height);
            debug!(target: SYNC_TARGET, attempt, height, target, "indexer behind");
            Probe::Retry(())
        }
        Err(error) => {
            debug!(target: SYNC_TARGET, attempt, %error, "indexer not answering");
            Probe::Retry(())
        }
    });
    match outcome {
        Ok(height) => {
            info!(target: SYNC_TARGET, height, target, "indexer caught up");
            Ok(height)
        }
        Err(RetryError::Exhausted { attempts, .. }) => Err(TimeoutError {
            target,
            attempts,
            last_observed,
        }),
        Err(RetryError::Fatal(())) => Err(TimeoutError {
            target,
            attempts: 1,
            last_observed,
        }),
    }
}
