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

//! # Router Platforms
//!
//! Every emulated platform differs in its default memory sizes, chassis, slot layout and the
//! adapters it accepts. All of these are captured in a static [`PlatformProfile`].

use crate::adapters::{AdapterKind, WicKind};
use crate::{Error, Result};

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Router platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Cisco 1700 series
    C1700,
    /// Cisco 2600 series
    C2600,
    /// Cisco 2691
    C2691,
    /// Cisco 3600 series
    C3600,
    /// Cisco 3725
    C3725,
    /// Cisco 3745
    C3745,
    /// Cisco 7200 series
    C7200,
}

impl Platform {
    /// All platforms
    pub const ALL: &'static [Platform] = &[
        Platform::C1700,
        Platform::C2600,
        Platform::C2691,
        Platform::C3600,
        Platform::C3725,
        Platform::C3745,
        Platform::C7200,
    ];

    /// Name of the platform, as used by the hypervisor
    pub fn name(&self) -> &'static str {
        self.profile().name
    }

    /// Static profile of the platform
    pub fn profile(&self) -> &'static PlatformProfile {
        match self {
            Self::C1700 => &PROFILES[0],
            Self::C2600 => &PROFILES[1],
            Self::C2691 => &PROFILES[2],
            Self::C3600 => &PROFILES[3],
            Self::C3725 => &PROFILES[4],
            Self::C3745 => &PROFILES[5],
            Self::C7200 => &PROFILES[6],
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| Error::Precondition(format!("Unknown platform {}", s)))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// # Platform Profile
///
/// Defaults and capabilities of a platform.
#[derive(Debug, PartialEq, Eq)]
pub struct PlatformProfile {
    /// Name of the platform
    pub name: &'static str,
    /// Default RAM in MB
    pub ram: u32,
    /// Default NVRAM in KB
    pub nvram: u32,
    /// Default size of disk0 in MB
    pub disk0: u32,
    /// Default size of disk1 in MB
    pub disk1: u32,
    /// Default clock divisor
    pub clock_divisor: u32,
    /// Default I/O memory in percent of the RAM, if the platform supports it
    pub iomem: Option<u32>,
    /// Supported chassis. The first one is the default.
    pub chassis: &'static [&'static str],
    /// Adapters accepted in slot 0, if slot 0 is not fixed
    pub slot0_adapters: &'static [AdapterKind],
    /// Adapters accepted in all other slots
    pub slot_adapters: &'static [AdapterKind],
    /// Supported WICs
    pub wics: &'static [WicKind],
}

const NETWORK_MODULES: &[AdapterKind] =
    &[AdapterKind::Nm1FeTx, AdapterKind::Nm4T, AdapterKind::Nm16Esw];
const C2600_MODULES: &[AdapterKind] =
    &[AdapterKind::Nm1E, AdapterKind::Nm4E, AdapterKind::Nm1FeTx, AdapterKind::Nm16Esw];
const C3600_MODULES: &[AdapterKind] = &[
    AdapterKind::Nm1E,
    AdapterKind::Nm4E,
    AdapterKind::Nm1FeTx,
    AdapterKind::Nm16Esw,
    AdapterKind::Nm4T,
];
const C7200_IO_CARDS: &[AdapterKind] =
    &[AdapterKind::C7200IoFe, AdapterKind::C7200Io2Fe, AdapterKind::C7200IoGeE];
const C7200_PORT_ADAPTERS: &[AdapterKind] = &[
    AdapterKind::PaA1,
    AdapterKind::PaFeTx,
    AdapterKind::Pa2FeTx,
    AdapterKind::PaGe,
    AdapterKind::Pa4T,
    AdapterKind::Pa8T,
    AdapterKind::Pa4E,
    AdapterKind::Pa8E,
    AdapterKind::PaPosOc3,
];
const SERIAL_WICS: &[WicKind] = &[WicKind::Wic1T, WicKind::Wic2T];
const ALL_WICS: &[WicKind] = &[WicKind::Wic1T, WicKind::Wic2T, WicKind::Wic1Enet];

static PROFILES: [PlatformProfile; 7] = [
    PlatformProfile {
        name: "c1700",
        ram: 160,
        nvram: 128,
        disk0: 0,
        disk1: 0,
        clock_divisor: 8,
        iomem: Some(15),
        chassis: &["1720", "1721", "1750", "1751", "1760"],
        slot0_adapters: &[],
        slot_adapters: &[],
        wics: ALL_WICS,
    },
    PlatformProfile {
        name: "c2600",
        ram: 160,
        nvram: 128,
        disk0: 0,
        disk1: 0,
        clock_divisor: 8,
        iomem: Some(15),
        chassis: &[
            "2610", "2611", "2620", "2621", "2610XM", "2611XM", "2620XM", "2621XM", "2650XM",
            "2651XM",
        ],
        slot0_adapters: &[],
        slot_adapters: C2600_MODULES,
        wics: SERIAL_WICS,
    },
    PlatformProfile {
        name: "c2691",
        ram: 192,
        nvram: 256,
        disk0: 16,
        disk1: 0,
        clock_divisor: 8,
        iomem: Some(5),
        chassis: &[],
        slot0_adapters: &[],
        slot_adapters: NETWORK_MODULES,
        wics: SERIAL_WICS,
    },
    PlatformProfile {
        name: "c3600",
        ram: 192,
        nvram: 256,
        disk0: 0,
        disk1: 0,
        clock_divisor: 4,
        iomem: Some(5),
        chassis: &["3640", "3620", "3660"],
        slot0_adapters: C3600_MODULES,
        slot_adapters: C3600_MODULES,
        wics: &[],
    },
    PlatformProfile {
        name: "c3725",
        ram: 128,
        nvram: 256,
        disk0: 16,
        disk1: 0,
        clock_divisor: 8,
        iomem: Some(5),
        chassis: &[],
        slot0_adapters: &[],
        slot_adapters: NETWORK_MODULES,
        wics: SERIAL_WICS,
    },
    PlatformProfile {
        name: "c3745",
        ram: 256,
        nvram: 256,
        disk0: 16,
        disk1: 0,
        clock_divisor: 8,
        iomem: Some(5),
        chassis: &[],
        slot0_adapters: &[],
        slot_adapters: NETWORK_MODULES,
        wics: SERIAL_WICS,
    },
    PlatformProfile {
        name: "c7200",
        ram: 512,
        nvram: 512,
        disk0: 64,
        disk1: 0,
        clock_divisor: 4,
        iomem: None,
        chassis: &[],
        slot0_adapters: C7200_IO_CARDS,
        slot_adapters: C7200_PORT_ADAPTERS,
        wics: &[],
    },
];

/// Processor engines of the c7200
pub const C7200_NPES: &[&str] =
    &["npe-100", "npe-150", "npe-175", "npe-200", "npe-225", "npe-300", "npe-400", "npe-g2"];
/// Midplanes of the c7200
pub const C7200_MIDPLANES: &[&str] = &["std", "vxr"];

impl PlatformProfile {
    /// Default chassis, if the platform has any
    pub fn default_chassis(&self) -> Option<&'static str> {
        self.chassis.first().copied()
    }

    /// Check that the chassis is valid for the platform, and fill in the default one.
    pub fn validate_chassis(&self, chassis: Option<&str>) -> Result<Option<String>> {
        match chassis {
            Some(c) if self.chassis.iter().any(|x| *x == c) => Ok(Some(c.to_string())),
            Some(c) => Err(Error::Precondition(format!(
                "Chassis {} is not supported on platform {}",
                c, self.name
            ))),
            None => Ok(self.default_chassis().map(String::from)),
        }
    }

    /// Number of slots, depending on the chassis
    pub fn num_slots(&self, chassis: Option<&str>) -> usize {
        match (self.name, chassis) {
            ("c3600", Some("3620")) => 2,
            ("c3600", Some("3660")) => 7,
            ("c3600", _) => 4,
            ("c1700", _) => 1,
            ("c2600", _) | ("c2691", _) => 2,
            ("c3725", _) => 3,
            ("c3745", _) => 5,
            _ => 7,
        }
    }

    /// Adapter installed in slot 0 when the router is created
    pub fn mainboard(&self, chassis: Option<&str>) -> Option<AdapterKind> {
        match (self.name, chassis) {
            ("c1700", _) => Some(AdapterKind::C1700Mb1Fe),
            ("c2600", Some("2610")) => Some(AdapterKind::C2600Mb1E),
            ("c2600", Some("2611")) => Some(AdapterKind::C2600Mb2E),
            ("c2600", Some("2611XM")) | ("c2600", Some("2621XM")) | ("c2600", Some("2651XM")) => {
                Some(AdapterKind::C2600Mb2Fe)
            }
            ("c2600", Some("2621")) => Some(AdapterKind::C2600Mb2Fe),
            ("c2600", _) => Some(AdapterKind::C2600Mb1Fe),
            ("c2691", _) | ("c3725", _) | ("c3745", _) => Some(AdapterKind::Gt96100Fe),
            ("c3600", Some("3660")) => Some(AdapterKind::Leopard2Fe),
            ("c7200", _) => Some(AdapterKind::C7200IoFe),
            _ => None,
        }
    }

    /// Returns true if the adapter can be installed in the slot
    pub fn accepts(&self, slot: usize, adapter: AdapterKind, chassis: Option<&str>) -> bool {
        if slot >= self.num_slots(chassis) {
            return false;
        }
        if slot == 0 {
            if self.name == "c3600" && chassis == Some("3660") {
                return false;
            }
            return self.slot0_adapters.contains(&adapter);
        }
        self.slot_adapters.contains(&adapter)
    }

    /// Returns true if the adapter in slot 0 can be removed
    pub fn slot0_removable(&self, chassis: Option<&str>) -> bool {
        !self.slot0_adapters.is_empty() && !(self.name == "c3600" && chassis == Some("3660"))
    }

    /// Returns true if the platform supports the WIC
    pub fn accepts_wic(&self, wic: WicKind) -> bool {
        self.wics.contains(&wic)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let c7200 = Platform::C7200.profile();
        assert_eq!((c7200.ram, c7200.nvram), (512, 512));
        assert_eq!(c7200.mainboard(None), Some(AdapterKind::C7200IoFe));
        let c3745 = Platform::from_str("c3745").unwrap().profile();
        assert_eq!((c3745.ram, c3745.nvram), (256, 256));
        assert_eq!(Platform::C3600.profile().default_chassis(), Some("3640"));
        assert!(Platform::from_str("c9999").is_err());
    }

    #[test]
    fn chassis_dependent_slots() {
        let c3600 = Platform::C3600.profile();
        assert_eq!(c3600.num_slots(Some("3620")), 2);
        assert_eq!(c3600.num_slots(Some("3640")), 4);
        assert_eq!(c3600.num_slots(Some("3660")), 7);
        assert_eq!(c3600.mainboard(Some("3660")), Some(AdapterKind::Leopard2Fe));
        assert_eq!(c3600.mainboard(Some("3640")), None);
        assert!(c3600.accepts(0, AdapterKind::Nm4T, Some("3640")));
        assert!(!c3600.accepts(0, AdapterKind::Nm4T, Some("3660")));
        assert!(!c3600.accepts(4, AdapterKind::Nm4T, Some("3640")));
        assert!(c3600.validate_chassis(Some("3700")).is_err());
    }

    #[test]
    fn adapter_matrix() {
        let c7200 = Platform::C7200.profile();
        assert!(c7200.accepts(0, AdapterKind::C7200IoGeE, None));
        assert!(!c7200.accepts(0, AdapterKind::PaA1, None));
        assert!(c7200.accepts(6, AdapterKind::PaA1, None));
        assert!(!c7200.accepts(7, AdapterKind::PaA1, None));
        assert!(!Platform::C3725.profile().accepts(1, AdapterKind::PaA1, None));
        assert!(Platform::C2691.profile().accepts_wic(WicKind::Wic2T));
        assert!(!Platform::C7200.profile().accepts_wic(WicKind::Wic2T));
    }
}
