//! Blocking wait for the next change event on an attribute
//!
//! Waiters sleep on the attribute's condition variable and are woken by the
//! event callback right after it bumps the attribute's counter. The counter
//! predicate is re-checked under the session lock before every sleep and
//! after every wake-up, so an event applied between reading the baseline
//! and going to sleep is never missed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{ProxyError, Result};
use crate::session::DeviceSession;

/// Block until `attribute` receives an event newer than the call, or time out
///
/// Without a subscription no event can arrive, so the call always ends in
/// [`ProxyError::Timeout`].
pub(crate) fn wait_for_next(
    session: &DeviceSession,
    attribute: &str,
    timeout: Duration,
) -> Result<()> {
    // Durations too large for an Instant mean "wait forever"
    let deadline = Instant::now().checked_add(timeout);

    let mut state = session.lock_state();
    let entry = state.attributes.entry(attribute.to_string()).or_default();
    let baseline = entry.count;
    let signal = Arc::clone(&entry.signal);

    loop {
        if state.count(attribute) > baseline {
            return Ok(());
        }
        let timed_out = match deadline {
            Some(deadline) => signal.wait_until(&mut state, deadline).timed_out(),
            None => {
                signal.wait(&mut state);
                false
            }
        };
        if timed_out {
            if state.count(attribute) > baseline {
                return Ok(());
            }
            drop(signal);
            state.release_idle(attribute);
            debug!(
                device = %session.name(),
                attribute,
                timeout_ms = timeout.as_millis() as u64,
                "wait for next event timed out"
            );
            return Err(ProxyError::Timeout {
                device: session.name().clone(),
                attribute: attribute.to_string(),
                timeout,
            });
        }
    }
}

impl DeviceSession {
    /// Block until the next successful change event for `attribute`
    ///
    /// Returns `Ok(())` as soon as the attribute's event counter moves past
    /// its value at call time; fails with [`ProxyError::Timeout`] otherwise.
    /// No lock is held while blocked.
    pub fn wait_for_next(&self, attribute: &str, timeout: Duration) -> Result<()> {
        wait_for_next(self, attribute, timeout)
    }
}
