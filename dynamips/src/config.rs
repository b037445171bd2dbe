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

//! # Configuration
//!
//! All knobs of the manager are collected in [`DynamipsConfig`]. The structure can be read from a
//! JSON file, where every missing field takes its default value.

use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration of the Dynamips manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamipsConfig {
    /// Path to the dynamips executable
    pub dynamips_path: PathBuf,
    /// Host on which the hypervisors listen
    pub host: String,
    /// Host on which the router consoles are bound
    pub console_host: String,
    /// Range of TCP ports used for consoles (inclusive)
    pub console_port_range: (u16, u16),
    /// Range of UDP ports used for tunnels (inclusive)
    pub udp_port_range: (u16, u16),
    /// Allocate an AUX console port for every new router
    pub allocate_aux_console_ports: bool,
    /// Share one ghost RAM image between routers running the same image
    pub ghost_ios_support: bool,
    /// Allow routers to use mmap for their RAM
    pub mmap_support: bool,
    /// Allow routers to use sparse memory
    pub sparse_memory_support: bool,
    /// Refuse to start a router if the host does not have enough RAM available
    pub check_host_ram: bool,
    /// Bind a port before handing it out, to make sure no other program uses it
    pub probe_ports: bool,
    /// Time to wait for a hypervisor to accept connections, in milliseconds
    pub connect_timeout_ms: u64,
    /// Time to wait for a hypervisor to exit gracefully before killing it, in milliseconds
    pub stop_timeout_ms: u64,
    /// Time to wait after booting a router before asking for idle-PC proposals, in milliseconds
    pub idlepc_boot_delay_ms: u64,
    /// Time during which the CPU usage of an idle-PC candidate is measured, in milliseconds
    pub idlepc_probe_interval_ms: u64,
    /// Poll interval of the NVRAM watcher, in milliseconds
    pub memory_watch_interval_ms: u64,
}

impl Default for DynamipsConfig {
    fn default() -> Self {
        Self {
            dynamips_path: PathBuf::from("dynamips"),
            host: String::from("127.0.0.1"),
            console_host: String::from("127.0.0.1"),
            console_port_range: (5000, 10000),
            udp_port_range: (10000, 20000),
            allocate_aux_console_ports: false,
            ghost_ios_support: true,
            mmap_support: true,
            sparse_memory_support: true,
            check_host_ram: true,
            probe_ports: true,
            connect_timeout_ms: 10_000,
            stop_timeout_ms: 3_000,
            idlepc_boot_delay_ms: 20_000,
            idlepc_probe_interval_ms: 3_000,
            memory_watch_interval_ms: 30_000,
        }
    }
}

impl DynamipsConfig {
    /// Read the configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("Cannot read {}", path.display()), e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Timeout for connecting to a freshly spawned hypervisor
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Timeout for a hypervisor to exit after `hypervisor stop`
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Delay between starting a router and asking for idle-PC proposals
    pub fn idlepc_boot_delay(&self) -> Duration {
        Duration::from_millis(self.idlepc_boot_delay_ms)
    }

    /// Duration of a single idle-PC measurement
    pub fn idlepc_probe_interval(&self) -> Duration {
        Duration::from_millis(self.idlepc_probe_interval_ms)
    }

    /// Poll interval of the memory watcher
    pub fn memory_watch_interval(&self) -> Duration {
        Duration::from_millis(self.memory_watch_interval_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"dynamips_path": "/usr/bin/dynamips", "udp_port_range": [30000, 30100]}}"#)
            .unwrap();
        let config = DynamipsConfig::from_file(file.path()).unwrap();
        assert_eq!(config.dynamips_path, PathBuf::from("/usr/bin/dynamips"));
        assert_eq!(config.udp_port_range, (30000, 30100));
        assert_eq!(config.console_port_range, (5000, 10000));
        assert!(config.ghost_ios_support);
    }

    #[test]
    fn broken_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(DynamipsConfig::from_file(file.path()), Err(Error::Json(_))));
        assert!(matches!(
            DynamipsConfig::from_file("/nonexistent/dynamips.json"),
            Err(Error::Io { .. })
        ));
    }
}
