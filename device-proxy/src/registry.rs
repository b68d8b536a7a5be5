//! Name to session registry
//!
//! Sessions are created lazily on first reference and live until
//! [`DeviceRegistry::reset`]. Each name owns a slot with its own lock, so
//! the first connection to a device happens exactly once even under
//! concurrent access while unrelated devices never wait on each other.
//!
//! A registry-wide read/write lock separates ordinary operations (shared)
//! from reset (exclusive): callers observe either the state before a reset
//! or the state after it, never a half-cleared registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use device_transport::{DeviceName, SubscriptionId, Transport};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{ProxyError, Result};
use crate::event_log::Journal;
use crate::session::DeviceSession;

#[derive(Default)]
struct SessionSlot {
    session: Mutex<Option<Arc<DeviceSession>>>,
}

/// Outcome of a registry reset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// Sessions discarded
    pub devices: usize,
    /// Subscriptions cancelled on the remote side
    pub subscriptions_released: usize,
    /// Subscriptions the transport failed to cancel
    pub failures: Vec<String>,
}

impl ResetReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn unreleased subscriptions into an error
    pub fn into_result(self) -> Result<Self> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(ProxyError::ResetIncomplete {
                failures: self.failures,
            })
        }
    }
}

/// Owns every [`DeviceSession`], keyed by device name
pub struct DeviceRegistry {
    transport: Arc<dyn Transport>,
    journal: Arc<Journal>,
    sessions: DashMap<DeviceName, Arc<SessionSlot>>,
    lifecycle: RwLock<()>,
    generation: AtomicU64,
}

impl DeviceRegistry {
    pub(crate) fn new(transport: Arc<dyn Transport>, journal: Arc<Journal>) -> Self {
        Self {
            transport,
            journal,
            sessions: DashMap::new(),
            lifecycle: RwLock::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Get the session for a device, connecting on first use
    pub fn get_or_create(&self, name: &DeviceName) -> Result<Arc<DeviceSession>> {
        let _lifecycle = self.lifecycle.read();
        self.get_or_create_locked(name)
    }

    /// Get the session for a device without connecting
    pub fn get(&self, name: &DeviceName) -> Option<Arc<DeviceSession>> {
        let _lifecycle = self.lifecycle.read();
        self.existing(name)
    }

    /// Subscribe an attribute, creating the session if needed
    ///
    /// Runs entirely inside the shared lifecycle lock so a concurrent reset
    /// waits for the subscription to be recorded before discarding it.
    pub fn subscribe(&self, name: &DeviceName, attribute: &str) -> Result<SubscriptionId> {
        let _lifecycle = self.lifecycle.read();
        self.get_or_create_locked(name)?.subscribe(attribute)
    }

    /// Cancel a subscription; no-op for unknown devices and attributes
    pub fn unsubscribe(&self, name: &DeviceName, attribute: &str) -> Result<()> {
        let _lifecycle = self.lifecycle.read();
        match self.existing(name) {
            Some(session) => session.unsubscribe(attribute),
            None => {
                debug!(device = %name, attribute, "unsubscribe for unknown device");
                Ok(())
            }
        }
    }

    /// Names of devices with an established session
    pub fn devices(&self) -> Vec<DeviceName> {
        let _lifecycle = self.lifecycle.read();
        let slots: Vec<(DeviceName, Arc<SessionSlot>)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        // Slots are locked outside the map so a slow connect holds no shard
        let mut names: Vec<_> = slots
            .into_iter()
            .filter(|(_, slot)| slot.session.lock().is_some())
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names
    }

    /// Current registry generation; bumped by every reset
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cancel every subscription, discard every session and clear the logs
    ///
    /// Best-effort: a subscription the transport fails to cancel is logged
    /// and reported, and the reset carries on with the rest.
    pub fn reset(&self) -> ResetReport {
        let _lifecycle = self.lifecycle.write();

        let sessions: Vec<Arc<DeviceSession>> = self
            .sessions
            .iter()
            .filter_map(|entry| entry.value().session.lock().clone())
            .collect();

        let mut report = ResetReport {
            devices: sessions.len(),
            ..Default::default()
        };

        for session in &sessions {
            for (attribute, id) in session.retire() {
                match session.connection.unsubscribe(id) {
                    Ok(()) => report.subscriptions_released += 1,
                    Err(err) => {
                        warn!(
                            device = %session.name(),
                            attribute = %attribute,
                            subscription = %id,
                            error = %err,
                            "failed to unsubscribe during reset"
                        );
                        report
                            .failures
                            .push(format!("{}: {}", session.name().attribute_path(&attribute), err));
                    }
                }
            }
        }

        self.sessions.clear();
        self.journal.reset();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        info!(
            devices = report.devices,
            released = report.subscriptions_released,
            failed = report.failures.len(),
            generation,
            "registry reset"
        );
        report
    }

    fn existing(&self, name: &DeviceName) -> Option<Arc<DeviceSession>> {
        let slot = self.sessions.get(name).map(|entry| Arc::clone(entry.value()))?;
        let session = slot.session.lock().clone();
        session
    }

    fn get_or_create_locked(&self, name: &DeviceName) -> Result<Arc<DeviceSession>> {
        let slot = Arc::clone(&*self.sessions.entry(name.clone()).or_default());

        let mut guard = slot.session.lock();
        if let Some(session) = guard.as_ref() {
            return Ok(Arc::clone(session));
        }

        let connection = self
            .transport
            .connect(name)
            .map_err(|err| ProxyError::from_transport(name, err))?;

        let generation = self.generation();
        let session = DeviceSession::new(
            name.clone(),
            generation,
            connection,
            Arc::clone(&self.journal),
        );
        *guard = Some(Arc::clone(&session));

        info!(device = %name, generation, "device session created");
        Ok(session)
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("sessions", &self.sessions.len())
            .field("generation", &self.generation())
            .finish()
    }
}
