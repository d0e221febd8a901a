//! `rdt-over-udp`: reliable, in-order data transfer over an unreliable
//! datagram channel (stop-and-wait and Go-Back-N).
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   DATA / FIN   ┌──────────┐
//!  │  Sender  │───────────────▶│ Receiver │
//!  └────┬─────┘                └─────┬────┘
//!       │◀───────── ACK ─────────────┘
//!       │                            │
//!  ┌────▼────────────┐        ┌──────▼─────────┐
//!  │ ImpairedChannel │        │ ImpairedChannel│   loss / bit errors
//!  └────┬────────────┘        └──────┬─────────┘
//!       │ raw datagrams              │
//!  ┌────▼────────────────────────────▼────┐
//!  │  Transport (UdpTransport / Memory)   │
//!  └──────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]:        wire format (encode / decode, checksum)
//! - [`socket`]:        transport trait and async UDP implementation
//! - [`memory`]:        in-process transport pair for tests and experiments
//! - [`simulator`]:     loss and bit-error injection on the send path
//! - [`timer`]:         retransmission deadline and RTT estimation
//! - [`gbn_sender`]:    send-side window state machine
//! - [`gbn_receiver`]:  receive-side cumulative-ACK state machine
//! - [`sender`]:        sender engine (control loop over the window)
//! - [`receiver`]:      receiver engine
//! - [`state`]:         session lifecycle states
//! - [`config`]:        per-session parameters
//! - [`events`]:        transfer events, sinks and statistics
//! - [`error`]:         error types
//! - [`experiment`]:    impairment sweeps over in-process links

pub mod config;
pub mod error;
pub mod events;
pub mod experiment;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod memory;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use config::{TimeoutPolicy, TransferConfig};
pub use error::{TransferError, TransportError};
pub use receiver::{Delivery, Receiver};
pub use sender::Sender;
pub use simulator::{ImpairedChannel, ImpairmentConfig};
pub use socket::{Transport, UdpTransport};
