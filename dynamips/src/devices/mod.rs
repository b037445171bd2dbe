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

//! # Switching Devices
//!
//! Besides routers, dynamips emulates four simple devices: an ATM switch, a Frame Relay switch,
//! an Ethernet switch and an Ethernet hub. They have no slots, only numbered ports to which NIOs
//! are bound. [`Device`] wraps all four, and is what the manager stores.

mod atm_switch;
mod circuits;
mod ethernet_hub;
mod ethernet_switch;
mod frame_relay_switch;

pub use atm_switch::{AtmCircuit, AtmSwitch};
pub use circuits::{Circuit, CircuitSwitch};
pub use ethernet_hub::{EthernetHub, HubPort};
pub use ethernet_switch::{EthernetPort, EthernetSwitch, PortMode};
pub use frame_relay_switch::{FrCircuit, FrameRelaySwitch};

use crate::hypervisor::Hypervisor;
use crate::nio::{create_capture_file, Nio};
use crate::{Error, Project, Result};

use log::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Kind of switching device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// ATM switch
    AtmSwitch,
    /// Frame Relay switch
    FrameRelaySwitch,
    /// Ethernet switch
    EthernetSwitch,
    /// Ethernet hub
    EthernetHub,
}

impl DeviceKind {
    /// Data link type used when capturing on a port of this device
    pub fn data_link_type(&self) -> &'static str {
        match self {
            Self::AtmSwitch => "DLT_ATM_RFC1483",
            Self::FrameRelaySwitch => "DLT_FRELAY",
            Self::EthernetSwitch | Self::EthernetHub => "DLT_EN10MB",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AtmSwitch => "ATM switch",
            Self::FrameRelaySwitch => "Frame Relay switch",
            Self::EthernetSwitch => "Ethernet switch",
            Self::EthernetHub => "Ethernet hub",
        };
        f.write_str(s)
    }
}

/// Settings of a device. The kind of the device follows from the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "device_type", rename_all = "snake_case")]
pub enum DeviceSettings {
    /// VP and VC mappings, like `"1:10:100" -> "2:20:200"`
    AtmSwitch {
        /// Source circuit to destination circuit
        #[serde(default)]
        mappings: BTreeMap<String, String>,
    },
    /// DLCI mappings, like `"1:101" -> "2:202"`
    FrameRelaySwitch {
        /// Source circuit to destination circuit
        #[serde(default)]
        mappings: BTreeMap<String, String>,
    },
    /// Port modes
    EthernetSwitch {
        /// All ports of the switch
        #[serde(default = "ethernet_switch::default_ports")]
        ports_mapping: Vec<EthernetPort>,
    },
    /// Hub ports
    EthernetHub {
        /// All ports of the hub
        #[serde(default = "ethernet_hub::default_ports")]
        ports_mapping: Vec<HubPort>,
    },
}

impl DeviceSettings {
    /// ATM switch with the given mappings
    pub fn atm_switch(mappings: BTreeMap<String, String>) -> Self {
        Self::AtmSwitch { mappings }
    }

    /// Frame Relay switch with the given mappings
    pub fn frame_relay_switch(mappings: BTreeMap<String, String>) -> Self {
        Self::FrameRelaySwitch { mappings }
    }

    /// Ethernet switch with 8 access ports in VLAN 1
    pub fn ethernet_switch() -> Self {
        Self::EthernetSwitch { ports_mapping: ethernet_switch::default_ports() }
    }

    /// Ethernet hub with 8 ports
    pub fn ethernet_hub() -> Self {
        Self::EthernetHub { ports_mapping: ethernet_hub::default_ports() }
    }

    /// Kind of device described by the settings
    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::AtmSwitch { .. } => DeviceKind::AtmSwitch,
            Self::FrameRelaySwitch { .. } => DeviceKind::FrameRelaySwitch,
            Self::EthernetSwitch { .. } => DeviceKind::EthernetSwitch,
            Self::EthernetHub { .. } => DeviceKind::EthernetHub,
        }
    }
}

/// Public state of a device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// Node ID
    pub node_id: Uuid,
    /// Project ID
    pub project_id: Uuid,
    /// Name of the device
    pub name: String,
    /// Kind of the device
    pub kind: DeviceKind,
    /// Current settings
    pub settings: DeviceSettings,
    /// Names of the NIOs bound to the ports
    pub nios: BTreeMap<u32, String>,
}

/// # Device Base
///
/// Identity and bound NIOs, shared by all devices.
#[derive(Debug)]
pub struct DeviceBase {
    id: Uuid,
    name: String,
    project: Project,
    hypervisor: Arc<Hypervisor>,
    nios: BTreeMap<u32, Nio>,
}

impl DeviceBase {
    /// Create the base of a device living on the hypervisor
    pub fn new(id: Uuid, name: impl Into<String>, project: Project, hypervisor: Arc<Hypervisor>) -> Self {
        Self { id, name: name.into(), project, hypervisor, nios: BTreeMap::new() }
    }

    /// Node ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the device
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Project of the device
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Hypervisor of the device
    pub fn hypervisor(&self) -> &Arc<Hypervisor> {
        &self.hypervisor
    }

    /// All bound NIOs, by port
    pub fn nios(&self) -> &BTreeMap<u32, Nio> {
        &self.nios
    }

    /// NIO bound to the port
    pub fn nio(&self, port: u32) -> Option<&Nio> {
        self.nios.get(&port)
    }

    pub(crate) async fn send(&self, command: String) -> Result<Vec<String>> {
        self.hypervisor.send(command).await
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn check_free(&self, port: u32) -> Result<()> {
        if self.nios.contains_key(&port) {
            return Err(Error::Conflict(format!("Port {} isn't free", port)));
        }
        Ok(())
    }

    pub(crate) fn allocated(&self, port: u32) -> Result<&Nio> {
        self.nios.get(&port).ok_or_else(|| not_allocated(port))
    }

    pub(crate) fn insert_nio(&mut self, port: u32, nio: Nio) {
        self.nios.insert(port, nio);
    }

    pub(crate) fn take_nio(&mut self, port: u32) -> Result<Nio> {
        self.nios.remove(&port).ok_or_else(|| not_allocated(port))
    }

    /// Start capturing the packets of a port
    pub(crate) async fn start_capture(&mut self, port: u32, output_file: &Path, data_link_type: &str) -> Result<()> {
        let nio = self.nios.get_mut(&port).ok_or_else(|| not_allocated(port))?;
        if nio.has_filter() {
            return Err(Error::Conflict(format!("Port {} has already a filter applied", port)));
        }
        create_capture_file(output_file).await?;
        nio.start_packet_capture(&self.hypervisor, output_file, data_link_type).await?;
        info!("{}: capture started on port {}", self.name, port);
        Ok(())
    }

    /// Stop the capture of a port. Does nothing if no capture runs.
    pub(crate) async fn stop_capture(&mut self, port: u32) -> Result<()> {
        let nio = self.nios.get_mut(&port).ok_or_else(|| not_allocated(port))?;
        if nio.is_capturing() {
            nio.stop_packet_capture(&self.hypervisor).await?;
            info!("{}: capture stopped on port {}", self.name, port);
        }
        Ok(())
    }

    /// Unregister from the hypervisor, and stop it if no other device uses it.
    pub(crate) async fn release_hypervisor(&self) {
        if self.hypervisor.unregister_device(self.id) == 0 {
            self.hypervisor.stop().await;
        }
    }
}

fn not_allocated(port: u32) -> Error {
    Error::Conflict(format!("Port {} is not allocated", port))
}

/// # Device
///
/// Any of the four switching devices.
#[derive(Debug)]
pub enum Device {
    /// ATM switch
    AtmSwitch(AtmSwitch),
    /// Frame Relay switch
    FrameRelaySwitch(FrameRelaySwitch),
    /// Ethernet switch
    EthernetSwitch(EthernetSwitch),
    /// Ethernet hub
    EthernetHub(EthernetHub),
}

impl Device {
    /// Create the device on the hypervisor, and apply the settings. The kind of the device is
    /// chosen by the settings.
    pub async fn create(base: DeviceBase, settings: DeviceSettings) -> Result<Self> {
        let mut device = match settings.kind() {
            DeviceKind::AtmSwitch => Self::AtmSwitch(AtmSwitch::new(base)),
            DeviceKind::FrameRelaySwitch => Self::FrameRelaySwitch(FrameRelaySwitch::new(base)),
            DeviceKind::EthernetSwitch => Self::EthernetSwitch(EthernetSwitch::new(base)),
            DeviceKind::EthernetHub => Self::EthernetHub(EthernetHub::new(base)),
        };
        match &mut device {
            Self::AtmSwitch(d) => d.create().await?,
            Self::FrameRelaySwitch(d) => d.create().await?,
            Self::EthernetSwitch(d) => d.create().await?,
            Self::EthernetHub(d) => d.create().await?,
        }
        if let Err(e) = device.update(settings).await {
            device.delete().await;
            return Err(e);
        }
        Ok(device)
    }

    /// Kind of the device
    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::AtmSwitch(_) => DeviceKind::AtmSwitch,
            Self::FrameRelaySwitch(_) => DeviceKind::FrameRelaySwitch,
            Self::EthernetSwitch(_) => DeviceKind::EthernetSwitch,
            Self::EthernetHub(_) => DeviceKind::EthernetHub,
        }
    }

    /// Shared part of the device
    pub fn base(&self) -> &DeviceBase {
        match self {
            Self::AtmSwitch(d) => d.base(),
            Self::FrameRelaySwitch(d) => d.base(),
            Self::EthernetSwitch(d) => d.base(),
            Self::EthernetHub(d) => d.base(),
        }
    }

    fn base_mut(&mut self) -> &mut DeviceBase {
        match self {
            Self::AtmSwitch(d) => d.base_mut(),
            Self::FrameRelaySwitch(d) => d.base_mut(),
            Self::EthernetSwitch(d) => d.base_mut(),
            Self::EthernetHub(d) => d.base_mut(),
        }
    }

    /// Node ID
    pub fn id(&self) -> Uuid {
        self.base().id()
    }

    /// Name of the device
    pub fn name(&self) -> &str {
        self.base().name()
    }

    /// Current settings
    pub fn settings(&self) -> DeviceSettings {
        match self {
            Self::AtmSwitch(d) => DeviceSettings::AtmSwitch { mappings: d.mappings().clone() },
            Self::FrameRelaySwitch(d) => DeviceSettings::FrameRelaySwitch { mappings: d.mappings().clone() },
            Self::EthernetSwitch(d) => DeviceSettings::EthernetSwitch { ports_mapping: d.ports().to_vec() },
            Self::EthernetHub(d) => DeviceSettings::EthernetHub { ports_mapping: d.ports().to_vec() },
        }
    }

    /// Apply new settings. The settings must describe the same kind of device.
    pub async fn update(&mut self, settings: DeviceSettings) -> Result<()> {
        match (self, settings) {
            (Self::AtmSwitch(d), DeviceSettings::AtmSwitch { mappings }) => d.set_mappings(mappings).await,
            (Self::FrameRelaySwitch(d), DeviceSettings::FrameRelaySwitch { mappings }) => {
                d.set_mappings(mappings).await
            }
            (Self::EthernetSwitch(d), DeviceSettings::EthernetSwitch { ports_mapping }) => {
                d.set_ports_mapping(ports_mapping).await
            }
            (Self::EthernetHub(d), DeviceSettings::EthernetHub { ports_mapping }) => {
                d.set_ports_mapping(ports_mapping)
            }
            (device, settings) => Err(Error::Precondition(format!(
                "Cannot apply {} settings to {} \"{}\"",
                settings.kind(),
                device.kind(),
                device.name()
            ))),
        }
    }

    /// Rename the device
    pub async fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        match self {
            Self::AtmSwitch(d) => d.set_name(name).await,
            Self::FrameRelaySwitch(d) => d.set_name(name).await,
            Self::EthernetSwitch(d) => d.set_name(name).await,
            Self::EthernetHub(d) => d.set_name(name).await,
        }
    }

    /// Bind a NIO to the port
    pub async fn add_nio(&mut self, nio: Nio, port: u32) -> Result<()> {
        match self {
            Self::AtmSwitch(d) => d.add_nio(nio, port).await,
            Self::FrameRelaySwitch(d) => d.add_nio(nio, port).await,
            Self::EthernetSwitch(d) => d.add_nio(nio, port).await,
            Self::EthernetHub(d) => d.add_nio(nio, port).await,
        }
    }

    /// Unbind the NIO from the port, and return it. The NIO still exists on the hypervisor.
    pub async fn remove_nio(&mut self, port: u32) -> Result<Nio> {
        match self {
            Self::AtmSwitch(d) => d.remove_nio(port).await,
            Self::FrameRelaySwitch(d) => d.remove_nio(port).await,
            Self::EthernetSwitch(d) => d.remove_nio(port).await,
            Self::EthernetHub(d) => d.remove_nio(port).await,
        }
    }

    /// Capture the packets of a port. Without a data link type, the default of the device kind is
    /// used.
    pub async fn start_capture(&mut self, port: u32, output_file: &Path, data_link_type: Option<&str>) -> Result<()> {
        let dlt = data_link_type.unwrap_or_else(|| self.kind().data_link_type()).to_string();
        self.base_mut().start_capture(port, output_file, &dlt).await
    }

    /// Stop the capture on a port
    pub async fn stop_capture(&mut self, port: u32) -> Result<()> {
        self.base_mut().stop_capture(port).await
    }

    /// Delete the device from the hypervisor. All bound NIOs are deleted and returned. Failures
    /// are only logged.
    pub async fn delete(&mut self) -> Vec<Nio> {
        match self {
            Self::AtmSwitch(d) => d.delete().await,
            Self::FrameRelaySwitch(d) => d.delete().await,
            Self::EthernetSwitch(d) => d.delete().await,
            Self::EthernetHub(d) => d.delete().await,
        }
    }

    /// Public state of the device
    pub fn info(&self) -> DeviceInfo {
        let base = self.base();
        DeviceInfo {
            node_id: base.id(),
            project_id: base.project().id,
            name: base.name().to_string(),
            kind: self.kind(),
            settings: self.settings(),
            nios: base.nios().iter().map(|(port, nio)| (*port, nio.name().to_string())).collect(),
        }
    }
}

/// Remove every NIO of a device, delete it from the hypervisor and return it. If given,
/// `unbind` is the command detaching a NIO from the device (like `ethsw remove_nio`).
pub(crate) async fn delete_all_nios(base: &mut DeviceBase, unbind: Option<&str>) -> Vec<Nio> {
    let mut nios = Vec::new();
    let ports: Vec<u32> = base.nios.keys().copied().collect();
    for port in ports {
        if let Err(e) = base.stop_capture(port).await {
            warn!("{}: could not stop the capture on port {}: {}", base.name, port, e);
        }
        let mut nio = match base.nios.remove(&port) {
            Some(nio) => nio,
            None => continue,
        };
        if let Some(unbind) = unbind {
            if let Err(e) = base.send(format!("{} \"{}\" {}", unbind, base.name, nio)).await {
                debug!("{}: could not unbind port {}: {}", base.name, port, e);
            }
        }
        if let Err(e) = nio.delete(&base.hypervisor).await {
            warn!("Could not delete NIO {}: {}", nio, e);
        }
        nios.push(nio);
    }
    nios
}
