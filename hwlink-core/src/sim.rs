//! Scripted in-process device layer
//!
//! A fake collaborator implementing [`DeviceTransport`], used by the test
//! suite and the demo CLI. The discovery script, connect/disconnect outcomes
//! and session metadata are all configured up front through the builder
//! methods.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::sleep;
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::{DeviceEvent, DeviceStream, DeviceTransport, DiscoveryOptions};
use crate::types::{DeviceInfo, DiscoveredDevice, SessionId};

#[derive(Debug, Clone)]
enum Step {
    Emit {
        device: DiscoveredDevice,
        after: Duration,
    },
    Fail {
        message: String,
        after: Duration,
    },
}

/// Shareable record of the `connect` calls a [`SimTransport`] received.
#[derive(Clone, Default)]
pub struct ConnectLog {
    calls: Arc<Mutex<Vec<DiscoveredDevice>>>,
}

impl ConnectLog {
    pub async fn count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn devices(&self) -> Vec<DiscoveredDevice> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, device: DiscoveredDevice) {
        self.calls.lock().await.push(device);
    }
}

/// Builder-configured fake device layer.
pub struct SimTransport {
    script: Vec<Step>,
    emit_once: bool,
    consumed: AtomicBool,
    discover_failure: Option<String>,
    connect_failure: Option<String>,
    disconnect_failure: Option<String>,
    fixed_session: Option<String>,
    sessions: Mutex<HashMap<SessionId, DeviceInfo>>,
    log: ConnectLog,
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            script: Vec::new(),
            emit_once: false,
            consumed: AtomicBool::new(false),
            discover_failure: None,
            connect_failure: None,
            disconnect_failure: None,
            fixed_session: None,
            sessions: Mutex::new(HashMap::new()),
            log: ConnectLog::default(),
        }
    }

    /// Append a device emission to the discovery script, delayed by `after`
    /// relative to the previous step.
    pub fn with_device(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        model_id: impl Into<String>,
        after: Duration,
    ) -> Self {
        self.script.push(Step::Emit {
            device: DiscoveredDevice::new(id, name, model_id),
            after,
        });
        self
    }

    /// Append a terminal stream error to the discovery script.
    pub fn failing_stream(mut self, message: impl Into<String>, after: Duration) -> Self {
        self.script.push(Step::Fail {
            message: message.into(),
            after,
        });
        self
    }

    /// Make `discover` itself fail to open.
    pub fn failing_discover(mut self, message: impl Into<String>) -> Self {
        self.discover_failure = Some(message.into());
        self
    }

    /// Make every `connect` call fail with the given message.
    pub fn failing_connect(mut self, message: impl Into<String>) -> Self {
        self.connect_failure = Some(message.into());
        self
    }

    /// Make every `disconnect` call fail with the given message.
    pub fn failing_disconnect(mut self, message: impl Into<String>) -> Self {
        self.disconnect_failure = Some(message.into());
        self
    }

    /// Use a fixed session token instead of a random one.
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.fixed_session = Some(id.into());
        self
    }

    /// Play the discovery script on the first `discover` call only; later
    /// cycles get an empty stream.
    pub fn emit_script_once(mut self) -> Self {
        self.emit_once = true;
        self
    }

    /// Handle onto the record of `connect` calls.
    pub fn connect_log(&self) -> ConnectLog {
        self.log.clone()
    }
}

#[async_trait]
impl DeviceTransport for SimTransport {
    async fn discover(&self, _options: DiscoveryOptions) -> Result<DeviceStream> {
        if let Some(message) = &self.discover_failure {
            return Err(Error::Discovery(message.clone()));
        }

        let script = if self.emit_once && self.consumed.swap(true, Ordering::SeqCst) {
            Vec::new()
        } else {
            self.script.clone()
        };

        let (event_tx, event_rx) = mpsc::channel(16);
        let (cancel_tx, mut cancel_rx) = oneshot::channel();

        tokio::spawn(async move {
            for step in script {
                let (after, event) = match step {
                    Step::Emit { device, after } => (after, DeviceEvent::Discovered(device)),
                    Step::Fail { message, after } => (after, DeviceEvent::Error(message)),
                };
                tokio::select! {
                    _ = sleep(after) => {
                        if event_tx.send(event).await.is_err() {
                            // Receiver gone, nobody is listening anymore
                            return;
                        }
                    }
                    _ = &mut cancel_rx => {
                        debug!("simulated discovery cancelled");
                        return;
                    }
                }
            }
            // Dropping event_tx completes the stream
        });

        Ok(DeviceStream::new(event_rx, cancel_tx))
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<SessionId> {
        self.log.record(device.clone()).await;

        if let Some(message) = &self.connect_failure {
            return Err(Error::Connect(message.clone()));
        }

        let token = match &self.fixed_session {
            Some(id) => id.clone(),
            None => hex::encode(rand::random::<[u8; 16]>()),
        };
        let session = SessionId::new(token);
        self.sessions
            .lock()
            .await
            .insert(session.clone(), DeviceInfo::new(device.model_id.clone()));
        Ok(session)
    }

    async fn device_info(&self, session: &SessionId) -> Result<DeviceInfo> {
        self.sessions
            .lock()
            .await
            .get(session)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session.clone()))
    }

    async fn disconnect(&self, session: &SessionId) -> Result<()> {
        if let Some(message) = &self.disconnect_failure {
            return Err(Error::Disconnect(message.clone()));
        }
        self.sessions.lock().await.remove(session);
        Ok(())
    }
}
