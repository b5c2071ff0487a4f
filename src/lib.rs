//! Bridge a Bluetooth Low Energy blood pressure monitor to web clients.
//!
//! Tested with an iHealth KN-550BT.
//!
//! The monitor pushes each measurement as a BLE notification. Its payload format is
//! proprietary and has only been partially worked out, so decoding is deliberately
//! conservative: only two candidate layouts are recognised and implausible values
//! are discarded.
//!
//! Each accepted measurement is:
//!
//! - Classified against the AHA blood pressure categories
//! - Stored as the latest reading, served by `GET /api/status`
//! - Pushed to every client connected to `GET /ws`
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use bpbridge::{Broadcaster, ConnectionState, Decoder, Outcome, Pipeline};
//!
//! let state = Arc::new(ConnectionState::new(Arc::new(Broadcaster::new())));
//! let (_, mut frames) = state.broadcaster().open_channel();
//! let pipeline = Pipeline::new(Decoder::default(), state.clone(), None);
//!
//! let session = state.begin_session();
//! let outcome = pipeline.process(session, &[0xFD, 0x96, 0x00, 0x50, 0x00, 0x48]);
//! assert!(matches!(outcome, Outcome::Recorded(_)));
//! println!("{}", frames.try_recv().unwrap());
//! ```

mod broadcaster;
mod classification;
mod config;
mod connection_state;
mod device_session;
mod error;
mod message;
mod pipeline;
mod reading;
mod reading_log;
pub mod server;

pub use broadcaster::Broadcaster;
pub use broadcaster::Frame;
pub use broadcaster::Sink;
pub use broadcaster::SinkId;
pub use classification::classify;
pub use classification::SeverityTier;
pub use config::BridgeConfig;
pub use connection_state::ConnectionState;
pub use connection_state::SessionId;
pub use connection_state::Snapshot;
pub use device_session::DeviceSession;
pub use device_session::DiscoveredDevice;
pub use error::ConnectionFailure;
pub use error::DeviceUnavailable;
pub use error::TransportFailure;
pub use message::decode;
pub use message::DecodeFailure;
pub use message::Decoder;
pub use message::Measurement;
pub use pipeline::Outcome;
pub use pipeline::Pipeline;
pub use reading::Reading;
pub use reading_log::ReadingLog;
