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

//! # Circuit Switches
//!
//! The ATM and the Frame Relay switch both forward between virtual circuits of two ports. A
//! circuit is only created on the hypervisor once both ports have a NIO bound, and always in both
//! directions.

use super::{delete_all_nios, DeviceBase};
use crate::nio::Nio;
use crate::{Error, Result};

use log::*;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// Virtual circuit on a port of a circuit switch
pub trait Circuit: Copy + Eq + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static {
    /// Command family on the hypervisor (`atmsw` or `frsw`)
    const FAMILY: &'static str;

    /// Port of the circuit
    fn port(&self) -> u32;

    /// Parse a circuit from the mapping syntax.
    fn parse(s: &str) -> Result<Self>;

    /// Returns true if both circuits can be connected to each other
    fn compatible(&self, other: &Self) -> bool;

    /// Arguments describing a circuit from `self` over `source_nio` to `dest` over `dest_nio`.
    fn create_command(&self, switch: &str, source_nio: &Nio, dest: &Self, dest_nio: &Nio) -> String;

    /// Command deleting the circuit created by [`Circuit::create_command`].
    fn delete_command(&self, switch: &str, source_nio: &Nio, dest: &Self, dest_nio: &Nio) -> String;
}

/// # Circuit Switch
///
/// The `mappings` are the desired circuits as given by the user (only one direction). The active
/// circuits are those created on the hypervisor, and always contain both directions.
#[derive(Debug)]
pub struct CircuitSwitch<C: Circuit> {
    base: DeviceBase,
    mappings: BTreeMap<String, String>,
    active: BTreeMap<C, C>,
}

impl<C: Circuit> CircuitSwitch<C> {
    /// Prepare the switch. Nothing is sent until [`CircuitSwitch::create`] is called.
    pub fn new(base: DeviceBase) -> Self {
        Self { base, mappings: BTreeMap::new(), active: BTreeMap::new() }
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

    /// Desired mappings
    pub fn mappings(&self) -> &BTreeMap<String, String> {
        &self.mappings
    }

    /// Circuits that exist on the hypervisor, in both directions
    pub fn active_mappings(&self) -> &BTreeMap<C, C> {
        &self.active
    }

    /// Create the switch on the hypervisor
    pub async fn create(&mut self) -> Result<()> {
        self.base.send(format!("{} create \"{}\"", C::FAMILY, self.name())).await?;
        self.base.hypervisor().register_device(self.base.id());
        info!("{} switch \"{}\" [{}] has been created", C::FAMILY, self.name(), self.base.id());
        Ok(())
    }

    /// Rename the switch
    pub async fn set_name(&mut self, new_name: String) -> Result<()> {
        self.base
            .send(format!("{} rename \"{}\" \"{}\"", C::FAMILY, self.name(), new_name))
            .await?;
        info!("{} switch \"{}\" renamed to \"{}\"", C::FAMILY, self.name(), new_name);
        self.base.set_name(new_name);
        Ok(())
    }

    /// Delete the switch, including all circuits and NIOs. Failures are only logged.
    pub async fn delete(&mut self) -> Vec<Nio> {
        let active: Vec<(C, C)> = self.active.iter().map(|(s, d)| (*s, *d)).collect();
        for (source, dest) in active {
            if let Err(e) = self.unmap(source, dest).await {
                debug!("Could not delete circuit {} -> {}: {}", source, dest, e);
            }
        }
        let nios = delete_all_nios(&mut self.base, None).await;
        if let Err(e) = self.base.send(format!("{} delete \"{}\"", C::FAMILY, self.name())).await {
            warn!("Could not delete {} switch \"{}\": {}", C::FAMILY, self.name(), e);
        }
        info!("{} switch \"{}\" [{}] has been deleted", C::FAMILY, self.name(), self.base.id());
        self.base.release_hypervisor().await;
        nios
    }

    /// Bind a NIO to the port, and create all circuits that became possible.
    pub async fn add_nio(&mut self, nio: Nio, port: u32) -> Result<()> {
        self.base.check_free(port)?;
        info!("{} switch \"{}\": NIO {} bound to port {}", C::FAMILY, self.name(), nio, port);
        self.base.insert_nio(port, nio);
        self.apply_mappings().await
    }

    /// Unbind the NIO from the port, and remove all circuits using it.
    pub async fn remove_nio(&mut self, port: u32) -> Result<Nio> {
        self.base.allocated(port)?;
        self.base.stop_capture(port).await?;

        let touching: Vec<(C, C)> = self
            .active
            .iter()
            .filter(|(s, d)| s.port() == port || d.port() == port)
            .map(|(s, d)| (*s, *d))
            .collect();
        for (source, dest) in touching {
            self.unmap(source, dest).await?;
        }

        let nio = self.base.take_nio(port)?;
        info!("{} switch \"{}\": NIO {} removed from port {}", C::FAMILY, self.name(), nio, port);
        Ok(nio)
    }

    /// Replace the desired mappings. Circuits that are no longer wanted are removed, and all
    /// possible new ones are created.
    pub async fn set_mappings(&mut self, mappings: BTreeMap<String, String>) -> Result<()> {
        let wanted: HashSet<(C, C)> = parse_mappings::<C>(&mappings)?
            .into_iter()
            .flat_map(|(s, d)| vec![(s, d), (d, s)])
            .collect();

        let stale: Vec<(C, C)> = self
            .active
            .iter()
            .map(|(s, d)| (*s, *d))
            .filter(|pair| !wanted.contains(pair))
            .collect();
        for (source, dest) in stale {
            self.unmap(source, dest).await?;
        }

        self.mappings = mappings;
        self.apply_mappings().await
    }

    /// Create all mirrored circuits of the desired mappings, whose ports are both bound.
    async fn apply_mappings(&mut self) -> Result<()> {
        for (source, dest) in parse_mappings::<C>(&self.mappings)? {
            if self.base.nio(source.port()).is_none() || self.base.nio(dest.port()).is_none() {
                continue;
            }
            if self.active.contains_key(&source) || self.active.contains_key(&dest) {
                continue;
            }
            self.map(source, dest).await?;
            // a circuit looping back onto itself has a single direction
            if source == dest {
                continue;
            }
            if let Err(e) = self.map(dest, source).await {
                if let Err(e) = self.unmap(source, dest).await {
                    debug!("Could not delete circuit {} -> {}: {}", source, dest, e);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Create a single direction of a circuit on the hypervisor.
    pub async fn map(&mut self, source: C, dest: C) -> Result<()> {
        if !source.compatible(&dest) {
            return Err(Error::InvalidMapping(format!("cannot connect {} to {}", source, dest)));
        }
        let command = {
            let (source_nio, dest_nio) = self.circuit_nios(source, dest)?;
            source.create_command(self.name(), source_nio, &dest, dest_nio)
        };
        self.base.send(command).await?;
        debug!("{} switch \"{}\": circuit {} -> {} created", C::FAMILY, self.name(), source, dest);
        self.active.insert(source, dest);
        Ok(())
    }

    /// Delete a single direction of a circuit. The circuit must exist.
    pub async fn unmap(&mut self, source: C, dest: C) -> Result<()> {
        if self.active.get(&source) != Some(&dest) {
            return Err(Error::InvalidMapping(format!("{} -> {} does not exist", source, dest)));
        }
        let command = {
            let (source_nio, dest_nio) = self.circuit_nios(source, dest)?;
            source.delete_command(self.name(), source_nio, &dest, dest_nio)
        };
        self.base.send(command).await?;
        debug!("{} switch \"{}\": circuit {} -> {} deleted", C::FAMILY, self.name(), source, dest);
        self.active.remove(&source);
        Ok(())
    }

    fn circuit_nios(&self, source: C, dest: C) -> Result<(&Nio, &Nio)> {
        match (self.base.nio(source.port()), self.base.nio(dest.port())) {
            (Some(s), Some(d)) => Ok((s, d)),
            _ => Err(Error::InvalidMapping(format!(
                "{} -> {}: both ports must have a NIO bound",
                source, dest
            ))),
        }
    }
}

/// Parse all mappings, checking that both sides of each can be connected.
pub(super) fn parse_mappings<C: Circuit>(mappings: &BTreeMap<String, String>) -> Result<Vec<(C, C)>> {
    mappings
        .iter()
        .map(|(source, dest)| {
            let source = C::parse(source)?;
            let dest = C::parse(dest)?;
            if !source.compatible(&dest) {
                return Err(Error::InvalidMapping(format!("cannot connect {} to {}", source, dest)));
            }
            Ok((source, dest))
        })
        .collect()
}
