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

//! # Network Input/Output
//!
//! A NIO is the endpoint of a virtual link. It lives on a hypervisor under a unique name, and is
//! bound to a port of a router or switch. Packet filters can be attached to both directions of a
//! NIO, which is how packet capture and link suspension are implemented.

use crate::hypervisor::Hypervisor;
use crate::{Error, Result};

use log::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Kind of NIO, together with its transport parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NioKind {
    /// UDP tunnel
    #[serde(rename = "nio_udp")]
    Udp {
        /// Local port
        lport: u16,
        /// Remote host
        rhost: String,
        /// Remote port
        rport: u16,
    },
    /// UNIX domain socket
    #[serde(rename = "nio_unix")]
    Unix {
        /// Local socket file
        local_file: PathBuf,
        /// Remote socket file
        remote_file: PathBuf,
    },
    /// TAP interface
    #[serde(rename = "nio_tap")]
    Tap {
        /// Name of the TAP device
        tap_device: String,
    },
    /// VDE switch
    #[serde(rename = "nio_vde")]
    Vde {
        /// Control socket of the switch
        control_file: PathBuf,
        /// Local socket file
        local_file: PathBuf,
    },
    /// Generic Ethernet interface (pcap)
    #[serde(rename = "nio_generic_ethernet")]
    GenericEthernet {
        /// Name of the host interface
        ethernet_device: String,
    },
    /// Linux Ethernet interface (raw socket)
    #[serde(rename = "nio_linux_ethernet")]
    LinuxEthernet {
        /// Name of the host interface
        ethernet_device: String,
    },
    /// Endpoint that drops everything
    #[serde(rename = "nio_null")]
    Null,
}

impl NioKind {
    /// Prefix of the NIO name
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Udp { .. } => "udp",
            Self::Unix { .. } => "unix",
            Self::Tap { .. } => "tap",
            Self::Vde { .. } => "vde",
            Self::GenericEthernet { .. } => "generic_ethernet",
            Self::LinuxEthernet { .. } => "linux_ethernet",
            Self::Null => "null",
        }
    }

    /// Local UDP port, if this is a UDP tunnel
    pub fn udp_port(&self) -> Option<u16> {
        match self {
            Self::Udp { lport, .. } => Some(*lport),
            _ => None,
        }
    }

    /// Command creating a NIO of this kind, with the given name.
    pub fn create_command(&self, name: &str) -> String {
        match self {
            Self::Udp { lport, rhost, rport } => {
                format!("nio create_udp {} {} {} {}", name, lport, rhost, rport)
            }
            Self::Unix { local_file, remote_file } => format!(
                "nio create_unix {} \"{}\" \"{}\"",
                name,
                local_file.display(),
                remote_file.display()
            ),
            Self::Tap { tap_device } => format!("nio create_tap {} {}", name, tap_device),
            Self::Vde { control_file, local_file } => format!(
                "nio create_vde {} \"{}\" \"{}\"",
                name,
                control_file.display(),
                local_file.display()
            ),
            Self::GenericEthernet { ethernet_device } => {
                format!("nio create_gen_eth {} \"{}\"", name, ethernet_device)
            }
            Self::LinuxEthernet { ethernet_device } => {
                format!("nio create_linux_eth {} \"{}\"", name, ethernet_device)
            }
            Self::Null => format!("nio create_null {}", name),
        }
    }

    /// Check the parameters before creating the NIO. The remote host of a UDP tunnel must resolve.
    pub async fn validate(&self) -> Result<()> {
        if let Self::Udp { rhost, rport, .. } = self {
            let resolved = tokio::net::lookup_host((rhost.as_str(), *rport))
                .await
                .map(|mut addrs| addrs.next().is_some())
                .unwrap_or(false);
            if !resolved {
                return Err(Error::Precondition(format!(
                    "Unknown remote host {} for the UDP tunnel",
                    rhost
                )));
            }
        }
        Ok(())
    }
}

/// Direction of a packet filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterDirection {
    /// Incoming packets
    In,
    /// Outgoing packets
    Out,
    /// Both directions
    Both,
}

impl FilterDirection {
    /// Code used by the hypervisor
    pub fn code(&self) -> u8 {
        match self {
            Self::In => 0,
            Self::Out => 1,
            Self::Both => 2,
        }
    }
}

impl FromStr for FilterDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            "both" => Ok(Self::Both),
            _ => Err(Error::Precondition(format!("Unknown filter direction: {}", s))),
        }
    }
}

/// Filter bound on a single direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Filter {
    /// Name of the filter (e.g., `capture` or `freq_drop`)
    pub name: String,
    /// Options passed with `setup_filter`
    pub options: Option<String>,
}

/// Traffic counters of a NIO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NioStats {
    /// Packets received
    pub packets_in: u64,
    /// Packets sent
    pub packets_out: u64,
    /// Bytes received
    pub bytes_in: u64,
    /// Bytes sent
    pub bytes_out: u64,
}

/// # NIO
///
/// A NIO created on a hypervisor. The name is unique on the hypervisor, and has the form
/// `<kind>-<uuid>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Nio {
    name: String,
    kind: NioKind,
    input_filter: Option<Filter>,
    output_filter: Option<Filter>,
    capture_file: Option<PathBuf>,
    suspended: bool,
    bandwidth: Option<u32>,
}

impl Nio {
    /// Create a new NIO on the hypervisor
    pub async fn create(hypervisor: &Hypervisor, kind: NioKind) -> Result<Self> {
        let name = format!("{}-{}", kind.prefix(), Uuid::new_v4());
        hypervisor.send(kind.create_command(&name)).await?;
        info!("NIO {} created", name);
        Ok(Self {
            name,
            kind,
            input_filter: None,
            output_filter: None,
            capture_file: None,
            suspended: false,
            bandwidth: None,
        })
    }

    /// Name of the NIO on the hypervisor
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of the NIO
    pub fn kind(&self) -> &NioKind {
        &self.kind
    }

    /// Filter on incoming packets
    pub fn input_filter(&self) -> Option<&Filter> {
        self.input_filter.as_ref()
    }

    /// Filter on outgoing packets
    pub fn output_filter(&self) -> Option<&Filter> {
        self.output_filter.as_ref()
    }

    /// Returns true if a filter is bound in any direction
    pub fn has_filter(&self) -> bool {
        self.input_filter.is_some() || self.output_filter.is_some()
    }

    /// File to which packets are captured
    pub fn capture_file(&self) -> Option<&Path> {
        self.capture_file.as_deref()
    }

    /// Returns true if a packet capture is running
    pub fn is_capturing(&self) -> bool {
        self.capture_file.is_some()
    }

    /// Returns true if the link is suspended
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Bandwidth limit, in kbps
    pub fn bandwidth(&self) -> Option<u32> {
        self.bandwidth
    }

    /// Delete the NIO from the hypervisor, unbinding all filters first.
    pub async fn delete(&mut self, hypervisor: &Hypervisor) -> Result<()> {
        if self.has_filter() {
            self.unbind_filter(hypervisor, FilterDirection::Both).await?;
        }
        hypervisor.send(format!("nio delete {}", self.name)).await?;
        info!("NIO {} deleted", self.name);
        Ok(())
    }

    /// Rename the NIO
    pub async fn rename(&mut self, hypervisor: &Hypervisor, new_name: impl Into<String>) -> Result<()> {
        let new_name = new_name.into();
        hypervisor.send(format!("nio rename {} {}", self.name, new_name)).await?;
        info!("NIO {} renamed to {}", self.name, new_name);
        self.name = new_name;
        Ok(())
    }

    /// Bind a filter to a direction
    pub async fn bind_filter(
        &mut self,
        hypervisor: &Hypervisor,
        direction: FilterDirection,
        filter: &str,
    ) -> Result<()> {
        hypervisor
            .send(format!("nio bind_filter {} {} {}", self.name, direction.code(), filter))
            .await?;
        let filter = Filter { name: filter.to_string(), options: None };
        match direction {
            FilterDirection::In => self.input_filter = Some(filter),
            FilterDirection::Out => self.output_filter = Some(filter),
            FilterDirection::Both => {
                self.input_filter = Some(filter.clone());
                self.output_filter = Some(filter);
            }
        }
        Ok(())
    }

    /// Remove the filter from a direction
    pub async fn unbind_filter(&mut self, hypervisor: &Hypervisor, direction: FilterDirection) -> Result<()> {
        hypervisor
            .send(format!("nio unbind_filter {} {}", self.name, direction.code()))
            .await?;
        match direction {
            FilterDirection::In => self.input_filter = None,
            FilterDirection::Out => self.output_filter = None,
            FilterDirection::Both => {
                self.input_filter = None;
                self.output_filter = None;
            }
        }
        Ok(())
    }

    /// Pass options to the filter bound to a direction
    pub async fn setup_filter(
        &mut self,
        hypervisor: &Hypervisor,
        direction: FilterDirection,
        options: &str,
    ) -> Result<()> {
        hypervisor
            .send(format!("nio setup_filter {} {} {}", self.name, direction.code(), options))
            .await?;
        let filters = match direction {
            FilterDirection::In => vec![&mut self.input_filter],
            FilterDirection::Out => vec![&mut self.output_filter],
            FilterDirection::Both => vec![&mut self.input_filter, &mut self.output_filter],
        };
        for filter in filters.into_iter().flatten() {
            filter.options = Some(options.to_string());
        }
        Ok(())
    }

    /// Start capturing all packets into `path` as pcap, using the data link type (like
    /// `DLT_EN10MB`).
    pub async fn start_packet_capture(
        &mut self,
        hypervisor: &Hypervisor,
        path: &Path,
        data_link_type: &str,
    ) -> Result<()> {
        if self.has_filter() {
            return Err(Error::Conflict(format!("NIO {} has already a filter applied", self.name)));
        }
        let dlt = normalize_data_link_type(data_link_type);
        self.bind_filter(hypervisor, FilterDirection::Both, "capture").await?;
        self.setup_filter(hypervisor, FilterDirection::Both, &format!("{} \"{}\"", dlt, path.display()))
            .await?;
        self.capture_file = Some(path.to_path_buf());
        info!("Started packet capture on NIO {} into {}", self.name, path.display());
        Ok(())
    }

    /// Stop the packet capture
    pub async fn stop_packet_capture(&mut self, hypervisor: &Hypervisor) -> Result<()> {
        self.unbind_filter(hypervisor, FilterDirection::Both).await?;
        self.capture_file = None;
        info!("Stopped packet capture on NIO {}", self.name);
        Ok(())
    }

    /// Suspend or resume the link. A suspended link drops all packets.
    pub async fn set_suspend(&mut self, hypervisor: &Hypervisor, suspend: bool) -> Result<()> {
        if suspend == self.suspended {
            return Ok(());
        }
        if suspend {
            if self.has_filter() {
                return Err(Error::Conflict(format!("NIO {} has already a filter applied", self.name)));
            }
            self.bind_filter(hypervisor, FilterDirection::Both, "freq_drop").await?;
            self.setup_filter(hypervisor, FilterDirection::Both, "-1").await?;
        } else {
            self.unbind_filter(hypervisor, FilterDirection::Both).await?;
        }
        self.suspended = suspend;
        Ok(())
    }

    /// Read the traffic counters
    pub async fn get_stats(&self, hypervisor: &Hypervisor) -> Result<NioStats> {
        let command = format!("nio get_stats {}", self.name);
        let reply = hypervisor.send(&command).await?;
        let values: Vec<u64> = reply
            .first()
            .map(|line| line.split_whitespace().filter_map(|x| x.parse().ok()).collect())
            .unwrap_or_default();
        match values.as_slice() {
            [packets_in, packets_out, bytes_in, bytes_out, ..] => Ok(NioStats {
                packets_in: *packets_in,
                packets_out: *packets_out,
                bytes_in: *bytes_in,
                bytes_out: *bytes_out,
            }),
            _ => Err(Error::Protocol { command, message: format!("invalid statistics: {:?}", reply) }),
        }
    }

    /// Reset the traffic counters
    pub async fn reset_stats(&self, hypervisor: &Hypervisor) -> Result<()> {
        hypervisor.send(format!("nio reset_stats {}", self.name)).await?;
        Ok(())
    }

    /// Limit the bandwidth of the NIO, in kbps
    pub async fn set_bandwidth(&mut self, hypervisor: &Hypervisor, bandwidth: u32) -> Result<()> {
        hypervisor.send(format!("nio set_bandwidth {} {}", self.name, bandwidth)).await?;
        self.bandwidth = Some(bandwidth);
        Ok(())
    }
}

impl fmt::Display for Nio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Turn `DLT_EN10MB` into `en10mb`, as expected by the capture filter.
pub fn normalize_data_link_type(data_link_type: &str) -> String {
    let dlt = data_link_type.to_lowercase();
    match dlt.strip_prefix("dlt_") {
        Some(stripped) => stripped.to_string(),
        None => dlt,
    }
}

/// Create (or truncate) the file receiving a packet capture
pub(crate) async fn create_capture_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(format!("Cannot create {}", parent.display()), e))?;
    }
    tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::io(format!("Can not write capture to \"{}\"", path.display()), e))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn serde_tag() {
        let nio: NioKind =
            serde_json::from_str(r#"{"type": "nio_udp", "lport": 10000, "rhost": "127.0.0.1", "rport": 10001}"#)
                .unwrap();
        assert_eq!(nio, NioKind::Udp { lport: 10000, rhost: String::from("127.0.0.1"), rport: 10001 });
        assert_eq!(nio.udp_port(), Some(10000));
        let nio: NioKind = serde_json::from_str(r#"{"type": "nio_null"}"#).unwrap();
        assert_eq!(nio, NioKind::Null);
        assert_eq!(nio.udp_port(), None);
    }

    #[test]
    fn create_commands() {
        let nio = NioKind::Udp { lport: 10000, rhost: String::from("127.0.0.1"), rport: 10001 };
        assert_eq!(nio.create_command("udp-1"), "nio create_udp udp-1 10000 127.0.0.1 10001");
        let nio = NioKind::Tap { tap_device: String::from("tap0") };
        assert_eq!(nio.create_command("tap-1"), "nio create_tap tap-1 tap0");
        let nio = NioKind::LinuxEthernet { ethernet_device: String::from("eth0") };
        assert_eq!(nio.create_command("linux_ethernet-1"), "nio create_linux_eth linux_ethernet-1 \"eth0\"");
    }

    #[test]
    fn data_link_type() {
        assert_eq!(normalize_data_link_type("DLT_EN10MB"), "en10mb");
        assert_eq!(normalize_data_link_type("DLT_FRELAY"), "frelay");
        assert_eq!(normalize_data_link_type("c_hdlc"), "c_hdlc");
    }

    #[tokio::test]
    async fn validate_udp() {
        let nio = NioKind::Udp { lport: 10000, rhost: String::from("127.0.0.1"), rport: 10001 };
        assert!(nio.validate().await.is_ok());
        let nio = NioKind::Udp { lport: 10000, rhost: String::from("no-such-host.invalid"), rport: 10001 };
        assert!(matches!(nio.validate().await, Err(Error::Precondition(_))));
    }
}
