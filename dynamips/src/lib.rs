// Dynamips Control: Driving the Dynamips Hypervisor
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Dynamips Hypervisor Control
//!
//! This crate launches and drives the Dynamips hypervisor, a process that emulates Cisco routers
//! and simple virtual switches. It talks to the hypervisor using its line-based text protocol,
//! supervises the process, allocates the resources (instance IDs, console and UDP ports) and
//! exposes virtual routers, ATM switches, Frame Relay switches, Ethernet switches and Ethernet
//! hubs as objects, whose ports can be connected using NIOs (Network Input/Output bindings).
//!
//! The main entry point is the [`Dynamips`] manager. It is created once, and passed by reference to
//! every component that needs it.
//!
//! ```no_run
//! use dynamips::{Dynamips, DynamipsConfig, Project};
//! use dynamips::devices::DeviceSettings;
//! use dynamips::nio::NioKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = Dynamips::new(DynamipsConfig::default());
//!     let project = Project::new(uuid::Uuid::new_v4(), "/tmp/example-project");
//!
//!     // create an ethernet hub with the default 8 ports
//!     let hub = manager
//!         .create_device(&project, None, "hub", DeviceSettings::ethernet_hub())
//!         .await?;
//!
//!     // connect port 3 to a UDP tunnel
//!     let lport = manager.allocate_udp_port(&project).await?;
//!     let nio = NioKind::Udp { lport, rhost: "127.0.0.1".to_string(), rport: 20000 };
//!     manager.device_add_nio(hub.node_id, 3, nio).await?;
//!
//!     // tear everything down
//!     manager.close_project(&project).await?;
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub mod adapters;
pub mod config;
pub mod devices;
pub mod ghost;
pub mod hypervisor;
pub mod idlepc;
pub mod manager;
pub mod nio;
pub mod platform;
pub mod protocol;
pub mod resources;
pub mod router;
mod types;

#[cfg(test)]
mod test;

pub use config::DynamipsConfig;
pub use hypervisor::{Hypervisor, ProcessSupervisor};
pub use manager::Dynamips;
pub use types::*;

use std::path::PathBuf;
use thiserror::Error;

/// # Dynamips Error type
#[derive(Debug, Error)]
pub enum Error {
    /// The hypervisor answered a command with an error code (`2xx-`).
    #[error("Dynamips error when running command `{command}`: {message}")]
    Protocol {
        /// Command that was sent
        command: String,
        /// Message returned by the hypervisor
        message: String,
    },
    /// The hypervisor did not return any data.
    #[error("No data returned from {host}:{port}, is the Dynamips process still running?")]
    NoData {
        /// Hypervisor host
        host: String,
        /// Hypervisor port
        port: u16,
    },
    /// Communication with the hypervisor broke down.
    #[error("Could not communicate with {host}:{port}: {reason}")]
    Communication {
        /// Hypervisor host
        host: String,
        /// Hypervisor port
        port: u16,
        /// Description of the failure
        reason: String,
    },
    /// Cannot establish the connection to the hypervisor.
    #[error("Could not connect to the hypervisor on {host}:{port}: {reason}")]
    Connect {
        /// Hypervisor host
        host: String,
        /// Hypervisor port
        port: u16,
        /// Last error seen while trying to connect
        reason: String,
    },
    /// A command was sent on a closed connection.
    #[error("Not connected to the hypervisor")]
    NotConnected,
    /// The hypervisor is too old.
    #[error("Dynamips version must be >= {required}, detected version is {found}")]
    UnsupportedVersion {
        /// Version reported by the hypervisor
        found: String,
        /// Minimum version
        required: String,
    },
    /// No free instance ID or port is left.
    #[error("{0}")]
    Exhausted(String),
    /// The resource is already used (occupied port or slot, reserved ID, active capture).
    #[error("{0}")]
    Conflict(String),
    /// The operation is not allowed in the current state.
    #[error("{0}")]
    Precondition(String),
    /// The image does not carry the ELF header of an IOS image.
    #[error("\"{}\" is not a valid IOS image", .0.display())]
    InvalidImage(PathBuf),
    /// Slot, port or identifier out of range.
    #[error("{0}")]
    Index(String),
    /// Unknown node
    #[error("{0}")]
    NotFound(String),
    /// Invalid virtual circuit mapping
    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),
    /// IO Error, together with the operation that failed
    #[error("{context}: {source}")]
    Io {
        /// What was done when the error happened
        context: String,
        /// OS error
        #[source]
        source: std::io::Error,
    },
    /// The hypervisor process could not be spawned.
    #[error("Could not start Dynamips: {0}")]
    Spawn(#[source] std::io::Error),
    /// Cannot (de)serialize JSON
    #[error("Cannot parse JSON: {0}")]
    Json(#[from] serde_json::error::Error),
    /// A background task panicked or was aborted.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Wrap an IO error with a description of what was done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }
}

/// Dynamips Result type
pub type Result<T> = core::result::Result<T, Error>;
