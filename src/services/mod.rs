// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod connection;
pub mod mapper;
pub mod sync;
pub mod terra;

pub use connection::{ConnectOutcome, ConnectionService, DisconnectOutcome};
pub use sync::{BatchSummary, SyncService};
pub use terra::{ActivityProvider, TerraClient};
