// SPDX-License-Identifier: MIT OR Apache-2.0
//! chainrpc-client
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! OCAN (spec §3/§4.3): a lazy operation-chain recorder standing in for a
//! transparent proxy, an explicit/auto-flush batcher matching the tick
//! semantics of a dynamic-dispatch host, and HTTP/WebSocket transports
//! speaking exactly the wire shapes `chainrpc-transport` exposes
//! server-side.
//!
//! A session starts from [`Client::connect`]; every further call descends
//! from [`Client::root`], which returns a [`ChainHandle`]. Calling
//! [`ChainHandle::get`]/[`ChainHandle::apply`] only ever records — nothing
//! reaches the network until [`Client::batch`], [`Client::resolve`], or
//! [`ChainHandle::resolve`] flushes.

mod batch;
mod client;
mod config;
mod error;
mod handle;
mod transport;

pub use batch::dedupe_nested_markers;
pub use client::{BatchScope, Client};
pub use config::{ClientConfig, DEFAULT_QUEUE_BUDGET_BYTES, DEFAULT_TIMEOUT, TransportKind};
pub use error::ClientError;
pub use handle::{ArgValue, ChainHandle, filter_to_leaves};
pub use transport::{ClientTransport, DownstreamCallback, HttpTransport, WebSocketTransport, HEARTBEAT_PING, HEARTBEAT_PONG};
