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


#[cfg(test)]
mod test_ethernet_hub;
#[cfg(test)]
mod test_ethernet_switch;
#[cfg(test)]
mod test_frame_relay;
#[cfg(test)]
mod test_ghost;
#[cfg(test)]
mod test_idlepc;

pub(crate) use fake_hypervisor::FakeHypervisor;

use crate::config::DynamipsConfig;
use crate::devices::{Device, DeviceBase, DeviceSettings};
use crate::hypervisor::Hypervisor;
use crate::nio::{Nio, NioKind};
use crate::platform::Platform;
use crate::router::{Router, RouterIdentity, RouterOptions, RouterParams};
use crate::Project;

use uuid::Uuid;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Configuration without host checks, and with short idle-PC delays
pub(crate) fn test_config() -> DynamipsConfig {
    DynamipsConfig {
        check_host_ram: false,
        probe_ports: false,
        idlepc_boot_delay_ms: 0,
        idlepc_probe_interval_ms: 10,
        memory_watch_interval_ms: 3_600_000,
        ..DynamipsConfig::default()
    }
}

pub(crate) fn test_options() -> RouterOptions {
    RouterOptions { check_host_ram: false, memory_watch_interval: Duration::from_secs(3600) }
}

pub(crate) fn test_project(dir: &Path) -> Project {
    Project::new(Uuid::new_v4(), dir)
}

/// Write a file starting with the header of an IOS image
pub(crate) fn ios_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let mut content = b"\x7fELF\x01\x02\x01".to_vec();
    content.extend_from_slice(&[0u8; 64]);
    std::fs::write(&path, content).unwrap();
    path
}

/// Create a router with instance ID `dynamips_id` on the hypervisor
pub(crate) async fn test_router(
    hypervisor: &Arc<Hypervisor>,
    project: &Project,
    name: &str,
    dynamips_id: u32,
    platform: Platform,
    image: &Path,
) -> Router {
    let identity = RouterIdentity {
        id: Uuid::new_v4(),
        project: project.clone(),
        dynamips_id,
        console: Some(5000 + dynamips_id as u16),
        aux: None,
    };
    let params = RouterParams::new(name, platform, image);
    let mut router = Router::new(identity, &params, Arc::clone(hypervisor), test_options()).unwrap();
    router.create().await.unwrap();
    router
}

/// Create a switching device on the hypervisor
pub(crate) async fn test_device(
    hypervisor: &Arc<Hypervisor>,
    project: &Project,
    name: &str,
    settings: DeviceSettings,
) -> Device {
    let base = DeviceBase::new(Uuid::new_v4(), name, project.clone(), Arc::clone(hypervisor));
    Device::create(base, settings).await.unwrap()
}

pub(crate) async fn null_nio(hypervisor: &Hypervisor) -> Nio {
    Nio::create(hypervisor, NioKind::Null).await.unwrap()
}
