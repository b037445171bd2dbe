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

//! # Resource Allocation
//!
//! Dynamips instance identifiers are unique per project, in the range 1 to 4096. Console ports
//! (TCP) and tunnel ports (UDP) are unique per host. Every allocation is tracked per project, such
//! that closing a project returns all of its resources.

use crate::config::DynamipsConfig;
use crate::{Error, Result};

use log::*;
use uuid::Uuid;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::{TcpListener, UdpSocket};

/// Largest dynamips instance identifier
pub const MAX_INSTANCE_ID: u32 = 4096;

/// Kind of port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Transport {
    Tcp,
    Udp,
}

/// Set of ports of a single transport
#[derive(Debug, Clone)]
struct PortPool {
    transport: Transport,
    range: (u16, u16),
    used: HashSet<u16>,
    projects: HashMap<Uuid, HashSet<u16>>,
}

impl PortPool {
    fn new(transport: Transport, range: (u16, u16)) -> Self {
        Self { transport, range, used: HashSet::new(), projects: HashMap::new() }
    }

    fn get_free(&mut self, project: Uuid, host: &str, probe: bool) -> Result<u16> {
        let (start, end) = self.range;
        let port = (start..=end)
            .filter(|p| !self.used.contains(p))
            .find(|p| !probe || self.bindable(host, *p))
            .ok_or_else(|| {
                Error::Exhausted(format!(
                    "Could not find a free {:?} port between {} and {} on host {}",
                    self.transport, start, end, host
                ))
            })?;
        self.mark(port, project);
        Ok(port)
    }

    fn reserve(&mut self, port: u16, project: Uuid, host: &str) -> Result<()> {
        if self.used.contains(&port) {
            return Err(Error::Conflict(format!(
                "{:?} port {} already in use on host {}",
                self.transport, port, host
            )));
        }
        self.mark(port, project);
        Ok(())
    }

    fn mark(&mut self, port: u16, project: Uuid) {
        self.used.insert(port);
        self.projects.entry(project).or_default().insert(port);
        debug!("{:?} port {} has been allocated", self.transport, port);
    }

    /// Only the project holding the port can release it.
    fn release(&mut self, port: u16, project: Uuid) {
        let owned = self.projects.get_mut(&project).map(|ports| ports.remove(&port)).unwrap_or(false);
        if !owned {
            if self.used.contains(&port) {
                warn!("{:?} port {} is not held by project {}", self.transport, port, project);
            }
            return;
        }
        if self.used.remove(&port) {
            debug!("{:?} port {} has been released", self.transport, port);
        }
    }

    fn release_project(&mut self, project: Uuid) {
        for port in self.projects.remove(&project).unwrap_or_default() {
            self.used.remove(&port);
        }
    }

    fn bindable(&self, host: &str, port: u16) -> bool {
        match self.transport {
            Transport::Tcp => TcpListener::bind((host, port)).is_ok(),
            Transport::Udp => UdpSocket::bind((host, port)).is_ok(),
        }
    }
}

/// # Resource Allocator
///
/// Hands out instance IDs and ports, and takes them back.
#[derive(Debug, Clone)]
pub struct ResourceAllocator {
    host: String,
    probe: bool,
    instance_ids: HashMap<Uuid, BTreeSet<u32>>,
    tcp: PortPool,
    udp: PortPool,
}

impl ResourceAllocator {
    /// Create a new allocator for the host. If `probe` is set, ports are bound once before they
    /// are handed out, to skip ports used by other programs.
    pub fn new(
        host: impl Into<String>,
        console_port_range: (u16, u16),
        udp_port_range: (u16, u16),
        probe: bool,
    ) -> Self {
        Self {
            host: host.into(),
            probe,
            instance_ids: HashMap::new(),
            tcp: PortPool::new(Transport::Tcp, console_port_range),
            udp: PortPool::new(Transport::Udp, udp_port_range),
        }
    }

    /// Create a new allocator from the configuration
    pub fn from_config(config: &DynamipsConfig) -> Self {
        Self::new(
            config.host.clone(),
            config.console_port_range,
            config.udp_port_range,
            config.probe_ports,
        )
    }

    /// Return the lowest free instance ID of the project, and mark it as used.
    pub fn get_instance_id(&mut self, project: Uuid) -> Result<u32> {
        let used = self.instance_ids.entry(project).or_default();
        let id = (1..=MAX_INSTANCE_ID)
            .find(|id| !used.contains(id))
            .ok_or_else(|| Error::Exhausted(String::from("Maximum number of Dynamips instances reached")))?;
        used.insert(id);
        Ok(id)
    }

    /// Mark a specific instance ID as used.
    pub fn take_instance_id(&mut self, project: Uuid, id: u32) -> Result<()> {
        if id == 0 || id > MAX_INSTANCE_ID {
            return Err(Error::Index(format!(
                "Dynamips identifier {} must be between 1 and {}",
                id, MAX_INSTANCE_ID
            )));
        }
        let used = self.instance_ids.entry(project).or_default();
        if !used.insert(id) {
            return Err(Error::Conflict(format!(
                "Dynamips identifier {} is already used by another router",
                id
            )));
        }
        Ok(())
    }

    /// Return the instance ID to the project pool. Releasing a free ID does nothing.
    pub fn release_instance_id(&mut self, project: Uuid, id: u32) {
        if let Some(used) = self.instance_ids.get_mut(&project) {
            used.remove(&id);
        }
    }

    /// Returns true if the instance ID is used within the project
    pub fn instance_id_used(&self, project: Uuid, id: u32) -> bool {
        self.instance_ids.get(&project).map(|used| used.contains(&id)).unwrap_or(false)
    }

    /// Get a free console port
    pub fn get_free_tcp_port(&mut self, project: Uuid) -> Result<u16> {
        self.tcp.get_free(project, &self.host, self.probe)
    }

    /// Reserve a specific console port
    pub fn reserve_tcp_port(&mut self, port: u16, project: Uuid) -> Result<()> {
        self.tcp.reserve(port, project, &self.host)
    }

    /// Release a console port. Releasing a free port does nothing.
    pub fn release_tcp_port(&mut self, port: u16, project: Uuid) {
        self.tcp.release(port, project)
    }

    /// Get a free tunnel port
    pub fn get_free_udp_port(&mut self, project: Uuid) -> Result<u16> {
        self.udp.get_free(project, &self.host, self.probe)
    }

    /// Reserve a specific tunnel port
    pub fn reserve_udp_port(&mut self, port: u16, project: Uuid) -> Result<()> {
        self.udp.reserve(port, project, &self.host)
    }

    /// Release a tunnel port. Releasing a free port does nothing.
    pub fn release_udp_port(&mut self, port: u16, project: Uuid) {
        self.udp.release(port, project)
    }

    /// Returns true if the port is in use, either as console port or as tunnel port.
    pub fn port_used(&self, port: u16) -> bool {
        self.tcp.used.contains(&port) || self.udp.used.contains(&port)
    }

    /// Release all instance IDs and ports held by the project
    pub fn release_project(&mut self, project: Uuid) {
        self.instance_ids.remove(&project);
        self.tcp.release_project(project);
        self.udp.release_project(project);
        info!("Released all resources of project {}", project);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn allocator() -> ResourceAllocator {
        ResourceAllocator::new("127.0.0.1", (5000, 5002), (10000, 10001), false)
    }

    #[test]
    fn instance_ids() {
        let mut alloc = allocator();
        let p = Uuid::new_v4();
        let q = Uuid::new_v4();
        assert_eq!(alloc.get_instance_id(p).unwrap(), 1);
        assert_eq!(alloc.get_instance_id(p).unwrap(), 2);
        // IDs are unique per project
        assert_eq!(alloc.get_instance_id(q).unwrap(), 1);
        alloc.release_instance_id(p, 1);
        assert_eq!(alloc.get_instance_id(p).unwrap(), 1);
        // release twice
        alloc.release_instance_id(p, 2);
        alloc.release_instance_id(p, 2);
        assert_eq!(alloc.get_instance_id(p).unwrap(), 2);
    }

    #[test]
    fn take_instance_id() {
        let mut alloc = allocator();
        let p = Uuid::new_v4();
        alloc.take_instance_id(p, 1).unwrap();
        match alloc.take_instance_id(p, 1) {
            Err(Error::Conflict(msg)) => {
                assert_eq!(msg, "Dynamips identifier 1 is already used by another router")
            }
            r => panic!("unexpected result: {:?}", r),
        }
        assert!(matches!(alloc.take_instance_id(p, 0), Err(Error::Index(_))));
        assert!(matches!(alloc.take_instance_id(p, 4097), Err(Error::Index(_))));
        assert_eq!(alloc.get_instance_id(p).unwrap(), 2);
    }

    #[test]
    fn instance_id_exhaustion() {
        let mut alloc = allocator();
        let p = Uuid::new_v4();
        for i in 1..=MAX_INSTANCE_ID {
            assert_eq!(alloc.get_instance_id(p).unwrap(), i);
        }
        match alloc.get_instance_id(p) {
            Err(Error::Exhausted(msg)) => assert_eq!(msg, "Maximum number of Dynamips instances reached"),
            r => panic!("unexpected result: {:?}", r),
        }
        alloc.release_instance_id(p, 42);
        assert_eq!(alloc.get_instance_id(p).unwrap(), 42);
    }

    #[test]
    fn ports() {
        let mut alloc = allocator();
        let p = Uuid::new_v4();
        assert_eq!(alloc.get_free_tcp_port(p).unwrap(), 5000);
        alloc.reserve_tcp_port(5001, p).unwrap();
        assert!(matches!(alloc.reserve_tcp_port(5001, p), Err(Error::Conflict(_))));
        assert_eq!(alloc.get_free_tcp_port(p).unwrap(), 5002);
        assert!(matches!(alloc.get_free_tcp_port(p), Err(Error::Exhausted(_))));
        alloc.release_tcp_port(5001, p);
        alloc.release_tcp_port(5001, p);
        assert_eq!(alloc.get_free_tcp_port(p).unwrap(), 5001);

        assert_eq!(alloc.get_free_udp_port(p).unwrap(), 10000);
        assert_eq!(alloc.get_free_udp_port(p).unwrap(), 10001);
        assert!(alloc.port_used(10001));
        alloc.release_udp_port(10000, p);
        assert!(!alloc.port_used(10000));
    }

    #[test]
    fn release_by_other_project() {
        let mut alloc = allocator();
        let p = Uuid::new_v4();
        let q = Uuid::new_v4();
        assert_eq!(alloc.get_free_udp_port(p).unwrap(), 10000);
        alloc.release_udp_port(10000, q);
        assert!(alloc.port_used(10000));
        assert_eq!(alloc.get_free_udp_port(q).unwrap(), 10001);
        assert!(matches!(alloc.get_free_udp_port(q), Err(Error::Exhausted(_))));

        // q still holds 10001 once p is closed
        alloc.release_project(p);
        assert!(!alloc.port_used(10000));
        assert!(alloc.port_used(10001));
        let r = Uuid::new_v4();
        assert_eq!(alloc.get_free_udp_port(r).unwrap(), 10000);
        assert!(matches!(alloc.get_free_udp_port(r), Err(Error::Exhausted(_))));
    }

    #[test]
    fn release_project() {
        let mut alloc = allocator();
        let p = Uuid::new_v4();
        let q = Uuid::new_v4();
        alloc.get_instance_id(p).unwrap();
        alloc.get_free_tcp_port(p).unwrap();
        alloc.get_free_udp_port(p).unwrap();
        assert_eq!(alloc.get_free_tcp_port(q).unwrap(), 5001);
        alloc.release_project(p);
        assert!(!alloc.instance_id_used(p, 1));
        assert!(!alloc.port_used(5000));
        assert!(!alloc.port_used(10000));
        assert!(alloc.port_used(5001));
    }
}
