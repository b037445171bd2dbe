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

//! # ATM Switch

use super::circuits::{Circuit, CircuitSwitch};
use crate::nio::Nio;
use crate::{Error, Result};

use lazy_static::lazy_static;
use regex::Regex;

use std::fmt;

lazy_static! {
    static ref VC_RE: Regex = Regex::new(r"^([0-9]+):([0-9]+):([0-9]+)$").unwrap();
    static ref VP_RE: Regex = Regex::new(r"^([0-9]+):([0-9]+)$").unwrap();
}

/// ATM switch, forwarding virtual paths and virtual channels
pub type AtmSwitch = CircuitSwitch<AtmCircuit>;

/// Virtual path (`port:vpi`) or virtual channel (`port:vpi:vci`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AtmCircuit {
    /// Virtual path
    Vp {
        /// Port
        port: u32,
        /// Virtual path identifier
        vpi: u32,
    },
    /// Virtual channel
    Vc {
        /// Port
        port: u32,
        /// Virtual path identifier
        vpi: u32,
        /// Virtual channel identifier
        vci: u32,
    },
}

impl Circuit for AtmCircuit {
    const FAMILY: &'static str = "atmsw";

    fn port(&self) -> u32 {
        match self {
            Self::Vp { port, .. } | Self::Vc { port, .. } => *port,
        }
    }

    fn parse(s: &str) -> Result<Self> {
        let number = |x: &str| {
            x.parse::<u32>()
                .map_err(|_| Error::InvalidMapping(format!("{} is not a valid VP or VC", s)))
        };
        let s = s.trim();
        if let Some(caps) = VC_RE.captures(s) {
            Ok(Self::Vc { port: number(&caps[1])?, vpi: number(&caps[2])?, vci: number(&caps[3])? })
        } else if let Some(caps) = VP_RE.captures(s) {
            Ok(Self::Vp { port: number(&caps[1])?, vpi: number(&caps[2])? })
        } else {
            Err(Error::InvalidMapping(format!("{} is not a valid VP or VC", s)))
        }
    }

    fn compatible(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Vp { .. }, Self::Vp { .. }) | (Self::Vc { .. }, Self::Vc { .. })
        )
    }

    fn create_command(&self, switch: &str, source_nio: &Nio, dest: &Self, dest_nio: &Nio) -> String {
        format!("atmsw create_{} \"{}\" {} {}", self.kind(), switch, self.args(source_nio), dest.args(dest_nio))
    }

    fn delete_command(&self, switch: &str, source_nio: &Nio, dest: &Self, dest_nio: &Nio) -> String {
        format!("atmsw delete_{} \"{}\" {} {}", self.kind(), switch, self.args(source_nio), dest.args(dest_nio))
    }
}

impl AtmCircuit {
    fn kind(&self) -> &'static str {
        match self {
            Self::Vp { .. } => "vpc",
            Self::Vc { .. } => "vcc",
        }
    }

    fn args(&self, nio: &Nio) -> String {
        match self {
            Self::Vp { vpi, .. } => format!("{} {}", nio, vpi),
            Self::Vc { vpi, vci, .. } => format!("{} {} {}", nio, vpi, vci),
        }
    }
}

impl fmt::Display for AtmCircuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vp { port, vpi } => write!(f, "{}:{}", port, vpi),
            Self::Vc { port, vpi, vci } => write!(f, "{}:{}:{}", port, vpi, vci),
        }
    }
}
