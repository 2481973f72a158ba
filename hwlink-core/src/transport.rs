//! Collaborator device-layer contract
//!
//! The vendor device layer (USB/HID SDK, daemon, or simulator) is reached
//! exclusively through [`DeviceTransport`]: one cancellable discovery stream
//! and three single-outcome calls. Implementations are injected into
//! [`DeviceLink`](crate::DeviceLink) so tests can substitute a fake.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::Result;
use crate::types::{DeviceInfo, DiscoveredDevice, SessionId};

/// Options for opening a discovery stream.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Restrict discovery to one transport kind (e.g. "usb", "hid"),
    /// interpreted by the implementation. `None` means all transports.
    pub transport: Option<String>,
}

/// One event on a discovery stream.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A device candidate appeared
    Discovered(DiscoveredDevice),
    /// Terminal stream failure; no further events follow
    Error(String),
}

/// Cancellable stream of discovery events.
///
/// Wraps an event channel plus a cancellation handle for the producing task.
/// Dropping the stream cancels it as well, since the producer observes the
/// closed cancellation channel.
pub struct DeviceStream {
    events: mpsc::Receiver<DeviceEvent>,
    cancel: Option<oneshot::Sender<()>>,
}

impl DeviceStream {
    pub fn new(events: mpsc::Receiver<DeviceEvent>, cancel: oneshot::Sender<()>) -> Self {
        Self {
            events,
            cancel: Some(cancel),
        }
    }

    /// Next event, or `None` once the stream has completed.
    pub async fn next(&mut self) -> Option<DeviceEvent> {
        self.events.recv().await
    }

    /// Cancel the subscription. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
            debug!("discovery subscription cancelled");
        }
        self.events.close();
    }

    /// Whether the subscription has already been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }
}

/// Abstract device layer providing discovery, connect, device-info and
/// disconnect primitives.
#[async_trait]
pub trait DeviceTransport: Send + Sync + 'static {
    /// Open a discovery stream. Emits zero or more devices and possibly a
    /// terminal error.
    async fn discover(&self, options: DiscoveryOptions) -> Result<DeviceStream>;

    /// Request a connection to a discovered device.
    async fn connect(&self, device: &DiscoveredDevice) -> Result<SessionId>;

    /// Metadata for an established session.
    async fn device_info(&self, session: &SessionId) -> Result<DeviceInfo>;

    /// Tear down an established session.
    async fn disconnect(&self, session: &SessionId) -> Result<()>;
}

#[async_trait]
impl<T: DeviceTransport> DeviceTransport for std::sync::Arc<T> {
    async fn discover(&self, options: DiscoveryOptions) -> Result<DeviceStream> {
        (**self).discover(options).await
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<SessionId> {
        (**self).connect(device).await
    }

    async fn device_info(&self, session: &SessionId) -> Result<DeviceInfo> {
        (**self).device_info(session).await
    }

    async fn disconnect(&self, session: &SessionId) -> Result<()> {
        (**self).disconnect(session).await
    }
}
