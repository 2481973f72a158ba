//! Discovery and pairing orchestration for USB/WebHID hardware devices
//!
//! This crate turns a vendor device layer into a small, observable pairing
//! workflow: start a discovery stream, act on the first device it reports,
//! establish a session, surface device metadata, and tear the session down
//! again. The device layer itself is an injected [`DeviceTransport`]; state
//! transitions are reported through an injected [`StatusSink`].
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use hwlink_core::{DeviceLink, SimTransport, TracingSink};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = SimTransport::new().with_device(
//!     "usb-0",
//!     "Nano X",
//!     "NanoX",
//!     Duration::from_millis(200),
//! );
//! let link = DeviceLink::new(transport, TracingSink);
//!
//! // Scans, pairs with the first device found, reports through the sink.
//! link.start_discovery().await;
//! # }
//! ```

mod error;
mod link;
#[cfg(feature = "simulator")]
mod sim;
mod status;
mod transport;
mod types;

pub use error::{Error, Result};
pub use link::{DISCOVERY_TIMEOUT, DeviceLink};
#[cfg(feature = "simulator")]
pub use sim::{ConnectLog, SimTransport};
pub use status::{StatusSink, TracingSink};
pub use transport::{DeviceEvent, DeviceStream, DeviceTransport, DiscoveryOptions};
pub use types::{DeviceInfo, DiscoveredDevice, DiscoveryState, SessionId};
