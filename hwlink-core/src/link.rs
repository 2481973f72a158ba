//! Discovery controller and pairing workflow

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::status::StatusSink;
use crate::transport::{DeviceEvent, DeviceStream, DeviceTransport, DiscoveryOptions};
use crate::types::{DiscoveredDevice, DiscoveryState, SessionId};

/// How long a discovery cycle scans before giving up
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Model name reported when the device-info lookup fails after connect
const UNKNOWN_MODEL: &str = "unknown_model";

/// How a discovery cycle's wait ended.
enum CycleOutcome {
    /// A stream event, or `None` when the stream completed
    Event(Option<DeviceEvent>),
    /// The discovery deadline passed
    Deadline,
    /// `stop_discovery` was called
    Stopped,
}

/// State shared between the handle and the running cycle task.
struct Shared {
    state: DiscoveryState,
    session: Option<SessionId>,
    /// Cancellation handle for the active discovery cycle, if any
    cycle: Option<oneshot::Sender<()>>,
    /// Monotonic cycle counter; a cycle task only touches the handle while
    /// its own generation is still the current one
    generation: u64,
}

/// Orchestrates device discovery and pairing against an injected
/// [`DeviceTransport`], reporting through an injected [`StatusSink`].
///
/// A cheaply clonable handle. At most one discovery cycle and at most one
/// session are active at a time; starting a new cycle cancels the previous
/// one first. Every asynchronous failure is caught here and converted into a
/// sink emission; nothing propagates to the caller.
pub struct DeviceLink<T, S> {
    transport: Arc<T>,
    sink: Arc<S>,
    timeout: Duration,
    shared: Arc<Mutex<Shared>>,
}

impl<T, S> Clone for DeviceLink<T, S> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            sink: self.sink.clone(),
            timeout: self.timeout,
            shared: self.shared.clone(),
        }
    }
}

impl<T: DeviceTransport, S: StatusSink> DeviceLink<T, S> {
    /// Create a link with the default 30 second discovery timeout.
    pub fn new(transport: T, sink: S) -> Self {
        Self::with_timeout(transport, sink, DISCOVERY_TIMEOUT)
    }

    pub fn with_timeout(transport: T, sink: S, timeout: Duration) -> Self {
        Self {
            transport: Arc::new(transport),
            sink: Arc::new(sink),
            timeout,
            shared: Arc::new(Mutex::new(Shared {
                state: DiscoveryState::Idle,
                session: None,
                cycle: None,
                generation: 0,
            })),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> DiscoveryState {
        self.shared.lock().await.state
    }

    /// Currently held session, if any.
    pub async fn session(&self) -> Option<SessionId> {
        self.shared.lock().await.session.clone()
    }

    /// Start a discovery cycle.
    ///
    /// Any active cycle is cancelled first, so a restart never leaves two
    /// live subscriptions. The cycle acts on the first discovered device
    /// only, hands it to the pairing workflow, and gives up after the
    /// configured timeout if no session has been established.
    pub async fn start_discovery(&self) {
        self.stop_discovery().await;
        self.sink.trigger(false);
        self.set_state(DiscoveryState::Searching).await;

        let mut stream = match self
            .transport
            .discover(DiscoveryOptions::default())
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(&e.to_string()).await;
                return;
            }
        };

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let generation = {
            let mut shared = self.shared.lock().await;
            shared.generation += 1;
            shared.cycle = Some(cancel_tx);
            shared.generation
        };

        let link = self.clone();
        let deadline = Instant::now() + self.timeout;
        tokio::spawn(async move {
            link.run_cycle(stream, cancel_rx, deadline, generation)
                .await;
        });
    }

    /// One discovery cycle: wait for the first stream event, the deadline or
    /// an external stop, whichever comes first.
    async fn run_cycle(
        &self,
        mut stream: DeviceStream,
        mut cancel_rx: oneshot::Receiver<()>,
        deadline: Instant,
        generation: u64,
    ) {
        let outcome = tokio::select! {
            event = stream.next() => CycleOutcome::Event(event),
            _ = sleep_until(deadline) => CycleOutcome::Deadline,
            _ = &mut cancel_rx => CycleOutcome::Stopped,
        };

        match outcome {
            CycleOutcome::Event(Some(DeviceEvent::Discovered(device))) => {
                // Single-shot: cancel before pairing so any later device
                // events in this cycle are never read.
                self.set_state(DiscoveryState::Found).await;
                stream.cancel();
                self.clear_cycle(generation).await;
                self.pair(&device).await;
            }
            CycleOutcome::Event(Some(DeviceEvent::Error(message))) => {
                stream.cancel();
                self.clear_cycle(generation).await;
                self.fail(&message).await;
            }
            CycleOutcome::Event(None) => {
                // Stream completed without a device; the cycle stays live
                // until the deadline or an explicit stop.
                debug!("discovery stream completed without a device");
                let outcome = tokio::select! {
                    _ = sleep_until(deadline) => CycleOutcome::Deadline,
                    _ = &mut cancel_rx => CycleOutcome::Stopped,
                };
                match outcome {
                    CycleOutcome::Deadline => self.expire(&mut stream, generation).await,
                    _ => stream.cancel(),
                }
            }
            CycleOutcome::Deadline => self.expire(&mut stream, generation).await,
            CycleOutcome::Stopped => stream.cancel(),
        }
    }

    /// Cancel the active discovery cycle, if any. No-op when idle.
    pub async fn stop_discovery(&self) {
        let cycle = self.shared.lock().await.cycle.take();
        if let Some(cancel) = cycle {
            let _ = cancel.send(());
            debug!("discovery stopped");
        }
    }

    /// Tear down the current session.
    ///
    /// A failed transport disconnect is logged, never surfaced; the local
    /// session reference is cleared regardless. No-op on the session side if
    /// none is held.
    pub async fn disconnect(&self) {
        let session = self.shared.lock().await.session.take();
        if let Some(session) = session {
            match self.transport.disconnect(&session).await {
                Ok(()) => info!("session terminated: {session}"),
                Err(e) => warn!("disconnect failed for {session}: {e}"),
            }
        }
        self.set_state(DiscoveryState::Disconnected).await;
        self.sink.trigger(true);
    }

    /// Pairing workflow: turn a discovered device into a session.
    async fn pair(&self, device: &DiscoveredDevice) {
        // Release any previous session rather than silently overwriting it.
        let previous = self.shared.lock().await.session.take();
        if let Some(old) = previous {
            if let Err(e) = self.transport.disconnect(&old).await {
                warn!("failed to release previous session {old}: {e}");
            }
        }

        let session = match self.transport.connect(device).await {
            Ok(session) => session,
            Err(e) => {
                self.fail(&e.to_string()).await;
                return;
            }
        };
        info!("session established: {session}");
        self.shared.lock().await.session = Some(session.clone());

        let model = match self.transport.device_info(&session).await {
            Ok(info) => info.display_model(),
            Err(e) => {
                warn!("device info unavailable for {session}: {e}");
                UNKNOWN_MODEL.to_string()
            }
        };

        self.set_state(DiscoveryState::Connected).await;
        self.sink.device_connected(&model, &session.short());
        self.sink.trigger(true);
    }

    /// Deadline handler: cancel the subscription and, unless a session
    /// exists, report the timeout. The trigger is re-enabled either way.
    async fn expire(&self, stream: &mut DeviceStream, generation: u64) {
        stream.cancel();
        let has_session = {
            let mut shared = self.shared.lock().await;
            if shared.generation != generation {
                // A newer cycle owns the state now; this one just goes away.
                return;
            }
            shared.cycle = None;
            shared.session.is_some()
        };
        if has_session {
            // Session wins over the timer; its firing has no visible effect.
            debug!("discovery deadline passed with a session held");
        } else {
            self.set_state(DiscoveryState::TimedOut).await;
        }
        self.sink.trigger(true);
    }

    async fn set_state(&self, state: DiscoveryState) {
        self.shared.lock().await.state = state;
        self.sink.status(state, state.message());
    }

    async fn fail(&self, message: &str) {
        self.shared.lock().await.state = DiscoveryState::Error;
        let status = format!("{} // {message}", DiscoveryState::Error.message());
        self.sink.status(DiscoveryState::Error, &status);
        self.sink.trigger(true);
    }

    async fn clear_cycle(&self, generation: u64) {
        let mut shared = self.shared.lock().await;
        if shared.generation == generation {
            shared.cycle = None;
        }
    }
}
