//! Outward-facing status reporting
//!
//! The original front-end rendered state into DOM elements; here that
//! coupling is replaced by [`StatusSink`], which any rendering technology
//! can implement.

use tracing::{debug, info};

use crate::types::DiscoveryState;

/// Consumer of state transitions, device display events and the trigger
/// surface, decoupled from any specific UI.
pub trait StatusSink: Send + Sync + 'static {
    /// A state transition together with its human-readable status line.
    fn status(&self, state: DiscoveryState, message: &str);

    /// Emitted after a successful connect: lower-cased model name and
    /// truncated session id, ready for display.
    fn device_connected(&self, model: &str, session: &str);

    /// The user trigger surface: disabled (`false`) while a cycle runs,
    /// re-enabled (`true`) once the user may act again. Re-enabled on every
    /// exit path, otherwise the workflow deadlocks from the user's
    /// perspective.
    fn trigger(&self, enabled: bool);
}

/// Sink that reports through the `tracing` log stream.
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn status(&self, state: DiscoveryState, message: &str) {
        info!("state={state:?} {message}");
    }

    fn device_connected(&self, model: &str, session: &str) {
        info!("device connected: model={model} session={session}");
    }

    fn trigger(&self, enabled: bool) {
        debug!("trigger enabled: {enabled}");
    }
}
