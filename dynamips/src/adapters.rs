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

//! # Adapters
//!
//! Router slots hold adapters (network modules, port adapters or mainboards), and some adapters
//! have sub-slots for WAN interface cards (WICs). Each adapter has a fixed set of ports, each of
//! which can be bound to a single NIO.

use crate::nio::Nio;
use crate::{Error, Result};

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

macro_rules! adapter_kinds {
    ($($variant:ident => $name:literal, $interfaces:literal, $wics:literal, $kind:literal;)*) => {
        /// Adapter model
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum AdapterKind {
            $(
                #[doc = $name]
                #[serde(rename = $name)]
                $variant,
            )*
        }

        impl AdapterKind {
            /// All known adapters
            pub const ALL: &'static [AdapterKind] = &[$(AdapterKind::$variant),*];

            /// Model name, as used by the hypervisor
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            /// Number of ports
            pub fn interfaces(&self) -> u32 {
                match self {
                    $(Self::$variant => $interfaces,)*
                }
            }

            /// Number of WIC sub-slots
            pub fn wic_slots(&self) -> usize {
                match self {
                    $(Self::$variant => $wics,)*
                }
            }

            /// Interface type of the ports (e.g., `FastEthernet`)
            pub fn interface_type(&self) -> &'static str {
                match self {
                    $(Self::$variant => $kind,)*
                }
            }
        }
    };
}

adapter_kinds! {
    C7200IoFe => "C7200-IO-FE", 1, 0, "FastEthernet";
    C7200Io2Fe => "C7200-IO-2FE", 2, 0, "FastEthernet";
    C7200IoGeE => "C7200-IO-GE-E", 1, 0, "GigabitEthernet";
    PaA1 => "PA-A1", 1, 0, "ATM";
    PaFeTx => "PA-FE-TX", 1, 0, "FastEthernet";
    Pa2FeTx => "PA-2FE-TX", 2, 0, "FastEthernet";
    PaGe => "PA-GE", 1, 0, "GigabitEthernet";
    Pa4T => "PA-4T+", 4, 0, "Serial";
    Pa8T => "PA-8T", 8, 0, "Serial";
    Pa4E => "PA-4E", 4, 0, "Ethernet";
    Pa8E => "PA-8E", 8, 0, "Ethernet";
    PaPosOc3 => "PA-POS-OC3", 1, 0, "POS";
    Nm1E => "NM-1E", 1, 0, "Ethernet";
    Nm4E => "NM-4E", 4, 0, "Ethernet";
    Nm1FeTx => "NM-1FE-TX", 1, 0, "FastEthernet";
    Nm16Esw => "NM-16ESW", 16, 0, "FastEthernet";
    Nm4T => "NM-4T", 4, 0, "Serial";
    Gt96100Fe => "GT96100-FE", 2, 3, "FastEthernet";
    Leopard2Fe => "Leopard-2FE", 2, 0, "FastEthernet";
    C2600Mb1E => "C2600-MB-1E", 1, 3, "Ethernet";
    C2600Mb2E => "C2600-MB-2E", 2, 3, "Ethernet";
    C2600Mb1Fe => "C2600-MB-1FE", 1, 3, "FastEthernet";
    C2600Mb2Fe => "C2600-MB-2FE", 2, 3, "FastEthernet";
    C1700Mb1Fe => "C1700-MB-1FE", 1, 2, "FastEthernet";
}

impl FromStr for AdapterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.name() == s)
            .ok_or_else(|| Error::Precondition(format!("Unknown adapter {}", s)))
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// WAN interface card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WicKind {
    /// One serial port
    #[serde(rename = "WIC-1T")]
    Wic1T,
    /// Two serial ports
    #[serde(rename = "WIC-2T")]
    Wic2T,
    /// One ethernet port
    #[serde(rename = "WIC-1ENET")]
    Wic1Enet,
}

impl WicKind {
    /// All known WICs
    pub const ALL: &'static [WicKind] = &[WicKind::Wic1T, WicKind::Wic2T, WicKind::Wic1Enet];

    /// Model name, as used by the hypervisor
    pub fn name(&self) -> &'static str {
        match self {
            Self::Wic1T => "WIC-1T",
            Self::Wic2T => "WIC-2T",
            Self::Wic1Enet => "WIC-1ENET",
        }
    }

    /// Number of ports
    pub fn interfaces(&self) -> u32 {
        match self {
            Self::Wic1T | Self::Wic1Enet => 1,
            Self::Wic2T => 2,
        }
    }
}

impl FromStr for WicKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|w| w.name() == s)
            .ok_or_else(|| Error::Precondition(format!("Unknown WIC {}", s)))
    }
}

impl fmt::Display for WicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Slot number used by the hypervisor to address the WIC sub-slot `wic_index`. The ports of the
/// WIC are numbered starting from the same value.
pub fn wic_slot_id(wic_index: usize) -> u32 {
    16 * (wic_index as u32 + 1)
}

/// # Adapter
///
/// Adapter installed in a router slot, with its WICs and the NIOs bound to its ports.
#[derive(Debug, Clone, PartialEq)]
pub struct Adapter {
    kind: AdapterKind,
    wics: Vec<Option<WicKind>>,
    ports: BTreeMap<u32, Option<Nio>>,
}

impl Adapter {
    /// Create a new adapter without any WIC and with all ports free
    pub fn new(kind: AdapterKind) -> Self {
        Self {
            kind,
            wics: vec![None; kind.wic_slots()],
            ports: (0..kind.interfaces()).map(|p| (p, None)).collect(),
        }
    }

    /// Model of the adapter
    pub fn kind(&self) -> AdapterKind {
        self.kind
    }

    /// Installed WICs, one entry per sub-slot
    pub fn wics(&self) -> &[Option<WicKind>] {
        &self.wics
    }

    /// Returns true if the port exists on the adapter (including the ports of installed WICs)
    pub fn port_exists(&self, port: u32) -> bool {
        self.ports.contains_key(&port)
    }

    /// All port numbers
    pub fn ports(&self) -> impl Iterator<Item = u32> + '_ {
        self.ports.keys().copied()
    }

    /// All bound NIOs, together with their port number
    pub fn nios(&self) -> impl Iterator<Item = (u32, &Nio)> + '_ {
        self.ports.iter().filter_map(|(p, n)| n.as_ref().map(|n| (*p, n)))
    }

    /// Returns true if at least one port holds a NIO
    pub fn has_nios(&self) -> bool {
        self.nios().next().is_some()
    }

    /// NIO bound to the port
    pub fn get_nio(&self, port: u32) -> Option<&Nio> {
        self.ports.get(&port).and_then(|n| n.as_ref())
    }

    /// NIO bound to the port
    pub fn get_nio_mut(&mut self, port: u32) -> Option<&mut Nio> {
        self.ports.get_mut(&port).and_then(|n| n.as_mut())
    }

    /// Bind the NIO to an existing port
    pub fn add_nio(&mut self, port: u32, nio: Nio) -> Result<()> {
        match self.ports.get_mut(&port) {
            Some(slot) => {
                *slot = Some(nio);
                Ok(())
            }
            None => Err(Error::Index(format!("Port {} does not exist on adapter {}", port, self.kind))),
        }
    }

    /// Unbind the NIO from the port
    pub fn remove_nio(&mut self, port: u32) -> Option<Nio> {
        self.ports.get_mut(&port).and_then(|n| n.take())
    }

    /// Returns true if the WIC sub-slot exists and is empty
    pub fn wic_slot_available(&self, wic_index: usize) -> bool {
        matches!(self.wics.get(wic_index), Some(None))
    }

    /// Install the WIC, adding its ports
    pub fn install_wic(&mut self, wic_index: usize, wic: WicKind) -> Result<()> {
        if !self.wic_slot_available(wic_index) {
            return Err(Error::Conflict(format!(
                "WIC slot {} is not available on adapter {}",
                wic_index, self.kind
            )));
        }
        self.wics[wic_index] = Some(wic);
        let base = wic_slot_id(wic_index);
        for port in base..base + wic.interfaces() {
            self.ports.insert(port, None);
        }
        Ok(())
    }

    /// Remove the WIC and its ports. Returns the WIC that was installed.
    pub fn uninstall_wic(&mut self, wic_index: usize) -> Option<WicKind> {
        let wic = self.wics.get_mut(wic_index)?.take()?;
        let base = wic_slot_id(wic_index);
        for port in base..base + wic.interfaces() {
            self.ports.remove(&port);
        }
        Some(wic)
    }

    /// Returns true if any port of the WIC holds a NIO
    pub fn wic_has_nios(&self, wic_index: usize) -> bool {
        match self.wics.get(wic_index).copied().flatten() {
            Some(wic) => {
                let base = wic_slot_id(wic_index);
                (base..base + wic.interfaces()).any(|p| self.get_nio(p).is_some())
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn adapter_names() {
        assert_eq!(AdapterKind::from_str("PA-4T+").unwrap(), AdapterKind::Pa4T);
        assert_eq!(AdapterKind::Nm16Esw.interfaces(), 16);
        assert!(AdapterKind::from_str("PA-99").is_err());
        let json = serde_json::to_string(&AdapterKind::C7200IoFe).unwrap();
        assert_eq!(json, "\"C7200-IO-FE\"");
    }

    #[test]
    fn wic_ports() {
        let mut adapter = Adapter::new(AdapterKind::Gt96100Fe);
        assert_eq!(adapter.ports().collect::<Vec<_>>(), vec![0, 1]);
        adapter.install_wic(1, WicKind::Wic2T).unwrap();
        assert_eq!(adapter.ports().collect::<Vec<_>>(), vec![0, 1, 32, 33]);
        assert!(adapter.install_wic(1, WicKind::Wic1T).is_err());
        assert!(adapter.install_wic(3, WicKind::Wic1T).is_err());
        assert_eq!(adapter.uninstall_wic(1), Some(WicKind::Wic2T));
        assert_eq!(adapter.uninstall_wic(1), None);
        assert_eq!(adapter.ports().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(wic_slot_id(0), 16);
        assert_eq!(wic_slot_id(2), 48);
    }
}
