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

//! # Ethernet Hub
//!
//! Implemented with a NIO bridge, which repeats every frame to all other NIOs.

use super::{delete_all_nios, DeviceBase};
use crate::nio::Nio;
use crate::{Error, Result};

use log::*;
use serde::{Deserialize, Serialize};

/// Port of an Ethernet hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubPort {
    /// Name of the port
    #[serde(default)]
    pub name: String,
    /// Port number
    pub port_number: u32,
}

impl HubPort {
    /// Port named `Ethernet<port_number>`
    pub fn new(port_number: u32) -> Self {
        Self { name: format!("Ethernet{}", port_number), port_number }
    }
}

pub(crate) fn default_ports() -> Vec<HubPort> {
    (0..8).map(HubPort::new).collect()
}

/// # Ethernet Hub
#[derive(Debug)]
pub struct EthernetHub {
    base: DeviceBase,
    ports: Vec<HubPort>,
}

impl EthernetHub {
    /// Prepare the hub. Nothing is sent until [`EthernetHub::create`] is called.
    pub fn new(base: DeviceBase) -> Self {
        Self { base, ports: Vec::new() }
    }

    /// Shared part of the device
    pub fn base(&self) -> &DeviceBase {
        &self.base
    }

    pub(crate) fn base_mut(&mut self) -> &mut DeviceBase {
        &mut self.base
    }

    /// Name of the hub
    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// All ports
    pub fn ports(&self) -> &[HubPort] {
        &self.ports
    }

    /// Create the bridge on the hypervisor
    pub async fn create(&mut self) -> Result<()> {
        self.base.send(format!("nio_bridge create \"{}\"", self.name())).await?;
        self.base.hypervisor().register_device(self.base.id());
        info!("Ethernet hub \"{}\" [{}] has been created", self.name(), self.base.id());
        Ok(())
    }

    /// Rename the hub
    pub async fn set_name(&mut self, new_name: String) -> Result<()> {
        self.base.send(format!("nio_bridge rename \"{}\" \"{}\"", self.name(), new_name)).await?;
        info!("Ethernet hub \"{}\" renamed to \"{}\"", self.name(), new_name);
        self.base.set_name(new_name);
        Ok(())
    }

    /// Replace the port list. Ports are renumbered and renamed in order. The number of ports
    /// cannot change while NIOs are bound.
    pub fn set_ports_mapping(&mut self, ports: Vec<HubPort>) -> Result<()> {
        let ports: Vec<HubPort> = (0..ports.len() as u32).map(HubPort::new).collect();
        if ports == self.ports {
            return Ok(());
        }
        if !self.base.nios().is_empty() {
            return Err(Error::Conflict(String::from("Can't modify a hub already connected.")));
        }
        self.ports = ports;
        Ok(())
    }

    /// Bind a NIO to the port
    pub async fn add_nio(&mut self, nio: Nio, port: u32) -> Result<()> {
        if !self.ports.iter().any(|p| p.port_number == port) {
            return Err(Error::Index(format!("Port {} doesn't exist", port)));
        }
        self.base.check_free(port)?;
        self.base.send(format!("nio_bridge add_nio \"{}\" {}", self.name(), nio)).await?;
        info!("Ethernet hub \"{}\": NIO {} bound to port {}", self.name(), nio, port);
        self.base.insert_nio(port, nio);
        Ok(())
    }

    /// Unbind the NIO from the port, and return it.
    pub async fn remove_nio(&mut self, port: u32) -> Result<Nio> {
        self.base.allocated(port)?;
        self.base.stop_capture(port).await?;
        let command = format!("nio_bridge remove_nio \"{}\" {}", self.name(), self.base.allocated(port)?);
        self.base.send(command).await?;
        let nio = self.base.take_nio(port)?;
        info!("Ethernet hub \"{}\": NIO {} removed from port {}", self.name(), nio, port);
        Ok(nio)
    }

    /// Delete the hub, including all NIOs. Failures are only logged.
    pub async fn delete(&mut self) -> Vec<Nio> {
        let name = self.name().to_string();
        let nios = delete_all_nios(&mut self.base, Some("nio_bridge remove_nio")).await;
        if let Err(e) = self.base.send(format!("nio_bridge delete \"{}\"", name)).await {
            warn!("Could not delete Ethernet hub \"{}\": {}", name, e);
        }
        info!("Ethernet hub \"{}\" [{}] has been deleted", name, self.base.id());
        self.base.release_hypervisor().await;
        nios
    }
}
