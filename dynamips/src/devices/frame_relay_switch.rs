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

//! # Frame Relay Switch

use super::circuits::{Circuit, CircuitSwitch};
use crate::nio::Nio;
use crate::{Error, Result};

use std::fmt;

/// Frame Relay switch, forwarding between DLCIs
pub type FrameRelaySwitch = CircuitSwitch<FrCircuit>;

/// Virtual circuit `port:dlci`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrCircuit {
    /// Port
    pub port: u32,
    /// Data link connection identifier
    pub dlci: u32,
}

impl Circuit for FrCircuit {
    const FAMILY: &'static str = "frsw";

    fn port(&self) -> u32 {
        self.port
    }

    fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidMapping(format!("{} is not a valid DLCI", s));
        let mut parts = s.trim().split(':');
        let port = parts.next().and_then(|x| x.parse().ok()).ok_or_else(invalid)?;
        let dlci = parts.next().and_then(|x| x.parse().ok()).ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self { port, dlci })
    }

    fn compatible(&self, _other: &Self) -> bool {
        true
    }

    fn create_command(&self, switch: &str, source_nio: &Nio, dest: &Self, dest_nio: &Nio) -> String {
        format!("frsw create_vc \"{}\" {} {} {} {}", switch, source_nio, self.dlci, dest_nio, dest.dlci)
    }

    fn delete_command(&self, switch: &str, source_nio: &Nio, dest: &Self, dest_nio: &Nio) -> String {
        format!("frsw delete_vc \"{}\" {} {} {} {}", switch, source_nio, self.dlci, dest_nio, dest.dlci)
    }
}

impl fmt::Display for FrCircuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.port, self.dlci)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse() {
        assert_eq!(FrCircuit::parse("1:101").unwrap(), FrCircuit { port: 1, dlci: 101 });
        assert!(FrCircuit::parse("1:101:3").is_err());
        assert!(FrCircuit::parse("1").is_err());
        assert!(FrCircuit::parse("x:101").is_err());
    }
}
