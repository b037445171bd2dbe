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

//! # Ethernet Switch
//!
//! A VLAN aware learning switch. Every port is either an access port, an 802.1Q trunk, or a QinQ
//! tunnel port.

use super::{delete_all_nios, DeviceBase};
use crate::nio::Nio;
use crate::{Error, Result};

use log::*;
use serde::{Deserialize, Serialize};

/// EtherType used by QinQ unless configured otherwise
pub const DEFAULT_QINQ_ETHERTYPE: &str = "0x8100";

/// Port mode of an Ethernet switch port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PortMode {
    /// Untagged port in a single VLAN
    Access {
        /// VLAN ID
        vlan: u16,
    },
    /// 802.1Q trunk
    Dot1q {
        /// Native VLAN
        vlan: u16,
    },
    /// QinQ tunnel port
    Qinq {
        /// Outer VLAN
        vlan: u16,
        /// EtherType of the outer tag
        #[serde(default = "default_ethertype")]
        ethertype: String,
    },
}

fn default_ethertype() -> String {
    String::from(DEFAULT_QINQ_ETHERTYPE)
}

/// Port of an Ethernet switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetPort {
    /// Name of the port. Ports are always named `Ethernet<port_number>`.
    #[serde(default)]
    pub name: String,
    /// Port number
    pub port_number: u32,
    /// Mode of the port
    #[serde(flatten)]
    pub mode: PortMode,
}

impl EthernetPort {
    /// Access port in the VLAN
    pub fn access(port_number: u32, vlan: u16) -> Self {
        Self { name: format!("Ethernet{}", port_number), port_number, mode: PortMode::Access { vlan } }
    }
}

/// Eight access ports in VLAN 1
pub(crate) fn default_ports() -> Vec<EthernetPort> {
    (0..8).map(|i| EthernetPort::access(i, 1)).collect()
}

/// # Ethernet Switch
#[derive(Debug)]
pub struct EthernetSwitch {
    base: DeviceBase,
    ports: Vec<EthernetPort>,
}

impl EthernetSwitch {
    /// Prepare the switch. Nothing is sent until [`EthernetSwitch::create`] is called.
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

    /// Name of the switch
    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// All ports with their mode
    pub fn ports(&self) -> &[EthernetPort] {
        &self.ports
    }

    /// Create the switch on the hypervisor
    pub async fn create(&mut self) -> Result<()> {
        self.base.send(format!("ethsw create \"{}\"", self.name())).await?;
        self.base.hypervisor().register_device(self.base.id());
        info!("Ethernet switch \"{}\" [{}] has been created", self.name(), self.base.id());
        Ok(())
    }

    /// Rename the switch
    pub async fn set_name(&mut self, new_name: String) -> Result<()> {
        self.base.send(format!("ethsw rename \"{}\" \"{}\"", self.name(), new_name)).await?;
        info!("Ethernet switch \"{}\" renamed to \"{}\"", self.name(), new_name);
        self.base.set_name(new_name);
        Ok(())
    }

    /// Replace the port list. Ports are renumbered in the given order, and named
    /// `Ethernet<number>`. The number of ports cannot change while NIOs are bound.
    pub async fn set_ports_mapping(&mut self, mut ports: Vec<EthernetPort>) -> Result<()> {
        for (i, port) in ports.iter_mut().enumerate() {
            port.port_number = i as u32;
            port.name = format!("Ethernet{}", i);
        }
        if ports == self.ports {
            return Ok(());
        }
        if ports.len() != self.ports.len() && !self.base.nios().is_empty() {
            return Err(Error::Conflict(String::from("Can't modify a switch already connected.")));
        }
        self.ports = ports;

        let bound: Vec<(u32, PortMode)> = self
            .ports
            .iter()
            .filter(|p| self.base.nio(p.port_number).is_some())
            .map(|p| (p.port_number, p.mode.clone()))
            .collect();
        for (port, mode) in bound {
            self.set_port_mode(port, &mode).await?;
        }
        Ok(())
    }

    /// Bind a NIO to the port, and configure the port mode.
    pub async fn add_nio(&mut self, nio: Nio, port: u32) -> Result<()> {
        let mode = match self.ports.iter().find(|p| p.port_number == port) {
            Some(p) => p.mode.clone(),
            None => return Err(Error::Index(format!("Port {} doesn't exist", port))),
        };
        self.base.check_free(port)?;
        self.base.send(format!("ethsw add_nio \"{}\" {}", self.name(), nio)).await?;
        info!("Ethernet switch \"{}\": NIO {} bound to port {}", self.name(), nio, port);
        self.base.insert_nio(port, nio);
        self.set_port_mode(port, &mode).await
    }

    /// Unbind the NIO from the port, and return it.
    pub async fn remove_nio(&mut self, port: u32) -> Result<Nio> {
        self.base.allocated(port)?;
        self.base.stop_capture(port).await?;
        let command = format!("ethsw remove_nio \"{}\" {}", self.name(), self.base.allocated(port)?);
        self.base.send(command).await?;
        let nio = self.base.take_nio(port)?;
        info!("Ethernet switch \"{}\": NIO {} removed from port {}", self.name(), nio, port);
        Ok(nio)
    }

    /// Configure the mode of a bound port
    pub async fn set_port_mode(&mut self, port: u32, mode: &PortMode) -> Result<()> {
        let nio = self.base.allocated(port)?;
        let command = match mode {
            PortMode::Access { vlan } => {
                format!("ethsw set_access_port \"{}\" {} {}", self.name(), nio, vlan)
            }
            PortMode::Dot1q { vlan } => {
                format!("ethsw set_dot1q_port \"{}\" {} {}", self.name(), nio, vlan)
            }
            PortMode::Qinq { vlan, ethertype } => {
                if ethertype == DEFAULT_QINQ_ETHERTYPE {
                    format!("ethsw set_qinq_port \"{}\" {} {}", self.name(), nio, vlan)
                } else if self.base.hypervisor().version_at_least("0.2.16") {
                    format!("ethsw set_qinq_port \"{}\" {} {} {}", self.name(), nio, vlan, ethertype)
                } else {
                    return Err(Error::UnsupportedVersion {
                        found: self.base.hypervisor().version().to_string(),
                        required: String::from("0.2.16"),
                    });
                }
            }
        };
        self.base.send(command).await?;
        debug!("Ethernet switch \"{}\": port {} set to {:?}", self.name(), port, mode);
        Ok(())
    }

    /// Entries of the MAC address table
    pub async fn get_mac_addr_table(&self) -> Result<Vec<String>> {
        self.base.send(format!("ethsw show_mac_addr_table \"{}\"", self.name())).await
    }

    /// Flush the MAC address table
    pub async fn clear_mac_addr_table(&self) -> Result<()> {
        self.base.send(format!("ethsw clear_mac_addr_table \"{}\"", self.name())).await?;
        Ok(())
    }

    /// Delete the switch, including all NIOs. Failures are only logged.
    pub async fn delete(&mut self) -> Vec<Nio> {
        let name = self.name().to_string();
        let nios = delete_all_nios(&mut self.base, Some("ethsw remove_nio")).await;
        if let Err(e) = self.base.send(format!("ethsw delete \"{}\"", name)).await {
            warn!("Could not delete Ethernet switch \"{}\": {}", name, e);
        }
        info!("Ethernet switch \"{}\" [{}] has been deleted", name, self.base.id());
        self.base.release_hypervisor().await;
        nios
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn port_json() {
        let port: EthernetPort =
            serde_json::from_str(r#"{"name": "x", "port_number": 3, "type": "dot1q", "vlan": 1}"#).unwrap();
        assert_eq!(port.mode, PortMode::Dot1q { vlan: 1 });
        let port: EthernetPort =
            serde_json::from_str(r#"{"port_number": 1, "type": "qinq", "vlan": 100}"#).unwrap();
        assert_eq!(port.mode, PortMode::Qinq { vlan: 100, ethertype: String::from("0x8100") });
    }

    #[test]
    fn defaults() {
        let ports = default_ports();
        assert_eq!(ports.len(), 8);
        assert_eq!(ports[7], EthernetPort::access(7, 1));
        assert_eq!(ports[7].name, "Ethernet7");
    }
}
