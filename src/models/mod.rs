// SPDX-License-Identifier: MIT

//! Domain models for the ingestion pipeline.

pub mod activity;
pub mod connection;
pub mod payload;

pub use activity::{ActivityRecord, ActivityType};
pub use connection::{Connection, ConnectionState};
pub use payload::{PayloadStatus, QueuedPayload};
