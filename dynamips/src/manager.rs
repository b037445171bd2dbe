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

//! # Dynamips Manager
//!
//! The [`Dynamips`] manager owns all hypervisors, routers and devices, together with the resource
//! allocator and the ghost image cache. Every node gets its own hypervisor process, unless it is
//! created explicitly on an existing one with [`Dynamips::create_router_on`] or
//! [`Dynamips::create_device_on`].
//!
//! All registries are behind async locks. A node is locked for the whole duration of an
//! operation, so two operations on the same node never interleave.

use crate::config::DynamipsConfig;
use crate::devices::{Device, DeviceBase, DeviceInfo, DeviceSettings};
use crate::ghost::GhostImageCache;
use crate::hypervisor::{Hypervisor, ProcessSupervisor};
use crate::idlepc::IdlePcCalibrator;
use crate::nio::{Nio, NioKind};
use crate::resources::ResourceAllocator;
use crate::router::{Router, RouterIdentity, RouterInfo, RouterOptions, RouterParams, RouterSetting};
use crate::{Error, Project, Result, RouterStatus};

use log::*;
use tokio::sync::Mutex;
use uuid::Uuid;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Data link type used for captures on router ports, unless given otherwise
pub const DEFAULT_DATA_LINK_TYPE: &str = "DLT_EN10MB";

/// # Dynamips Manager
#[derive(Debug)]
pub struct Dynamips {
    config: DynamipsConfig,
    supervisor: ProcessSupervisor,
    calibrator: IdlePcCalibrator,
    resources: Mutex<ResourceAllocator>,
    hypervisors: Mutex<Vec<Arc<Hypervisor>>>,
    routers: Mutex<HashMap<Uuid, Arc<Mutex<Router>>>>,
    devices: Mutex<HashMap<Uuid, Arc<Mutex<Device>>>>,
    ghosts: Mutex<GhostImageCache>,
}

impl Dynamips {
    /// Create the manager. No hypervisor is started until the first node is created.
    pub fn new(config: DynamipsConfig) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(&config),
            calibrator: IdlePcCalibrator::from_config(&config),
            resources: Mutex::new(ResourceAllocator::from_config(&config)),
            hypervisors: Mutex::new(Vec::new()),
            routers: Mutex::new(HashMap::new()),
            devices: Mutex::new(HashMap::new()),
            ghosts: Mutex::new(GhostImageCache::new()),
            config,
        }
    }

    /// Configuration of the manager
    pub fn config(&self) -> &DynamipsConfig {
        &self.config
    }

    /// Spawn a new hypervisor in the working directory of the project.
    pub async fn start_new_hypervisor(&self, project: &Project) -> Result<Arc<Hypervisor>> {
        let hypervisor = Arc::new(self.supervisor.start(&project.module_working_directory()).await?);
        self.hypervisors.lock().await.push(Arc::clone(&hypervisor));
        Ok(hypervisor)
    }

    /// Connect to a hypervisor that was started by someone else.
    pub async fn attach_hypervisor(
        &self,
        host: impl Into<String>,
        port: u16,
        working_dir: impl Into<PathBuf>,
    ) -> Result<Arc<Hypervisor>> {
        let hypervisor =
            Arc::new(Hypervisor::connect(host, port, working_dir, self.config.connect_timeout()).await?);
        self.hypervisors.lock().await.push(Arc::clone(&hypervisor));
        Ok(hypervisor)
    }

    /// All hypervisors known to the manager
    pub async fn hypervisors(&self) -> Vec<Arc<Hypervisor>> {
        self.hypervisors.lock().await.clone()
    }

    /// Drop hypervisors without any device from the list.
    async fn forget_idle_hypervisors(&self) {
        self.hypervisors.lock().await.retain(|h| !h.is_empty());
    }

    /// Allocate a UDP port for a tunnel of the project
    pub async fn allocate_udp_port(&self, project: &Project) -> Result<u16> {
        self.resources.lock().await.get_free_udp_port(project.id)
    }

    /// Release a UDP port of the project
    pub async fn release_udp_port(&self, project: &Project, port: u16) {
        self.resources.lock().await.release_udp_port(port, project.id)
    }

    async fn release_nios(&self, project: Uuid, nios: &[Nio]) {
        let mut resources = self.resources.lock().await;
        for port in nios.iter().filter_map(|n| n.kind().udp_port()) {
            resources.release_udp_port(port, project);
        }
    }

    async fn check_new_node(&self, id: Uuid) -> Result<()> {
        if self.routers.lock().await.contains_key(&id) || self.devices.lock().await.contains_key(&id) {
            return Err(Error::Conflict(format!("Node {} already exists", id)));
        }
        Ok(())
    }

    // Routers

    /// Create a new router on its own hypervisor.
    pub async fn create_router(
        &self,
        project: &Project,
        node_id: Option<Uuid>,
        params: RouterParams,
    ) -> Result<RouterInfo> {
        let hypervisor = self.start_new_hypervisor(project).await?;
        let result = self.create_router_on(Arc::clone(&hypervisor), project, node_id, params).await;
        if result.is_err() && hypervisor.is_empty() {
            hypervisor.stop().await;
            self.forget_idle_hypervisors().await;
        }
        result
    }

    /// Create a new router on an existing hypervisor.
    pub async fn create_router_on(
        &self,
        hypervisor: Arc<Hypervisor>,
        project: &Project,
        node_id: Option<Uuid>,
        params: RouterParams,
    ) -> Result<RouterInfo> {
        let id = node_id.unwrap_or_else(Uuid::new_v4);
        self.check_new_node(id).await?;

        let identity = self.allocate_identity(id, project, &params).await?;
        let options = RouterOptions::from_config(&self.config);
        let mut router = match Router::new(identity.clone(), &params, hypervisor, options) {
            Ok(router) => router,
            Err(e) => {
                self.release_identity(&identity).await;
                return Err(e);
            }
        };
        if let Err(e) = router.create().await {
            self.release_identity(&identity).await;
            return Err(e);
        }

        let mut settings = Vec::new();
        if !self.config.mmap_support {
            settings.push(RouterSetting::Mmap(false));
        }
        if !self.config.sparse_memory_support {
            settings.push(RouterSetting::Sparsemem(false));
        }
        settings.extend(params.settings.iter().cloned());
        if let Err(e) = self.apply_router_settings(&mut router, settings).await {
            warn!("Could not configure router \"{}\": {}", router.name(), e);
            router.delete().await;
            self.release_identity(&RouterIdentity { console: router.console(), aux: router.aux(), ..identity })
                .await;
            return Err(e);
        }

        let info = router.info();
        self.routers.lock().await.insert(id, Arc::new(Mutex::new(router)));
        Ok(info)
    }

    async fn allocate_identity(&self, id: Uuid, project: &Project, params: &RouterParams) -> Result<RouterIdentity> {
        let mut resources = self.resources.lock().await;
        let dynamips_id = match params.dynamips_id {
            Some(dynamips_id) => {
                resources.take_instance_id(project.id, dynamips_id)?;
                dynamips_id
            }
            None => resources.get_instance_id(project.id)?,
        };

        let console = match params.console {
            Some(port) => resources.reserve_tcp_port(port, project.id).map(|_| port),
            None => resources.get_free_tcp_port(project.id),
        };
        let console = match console {
            Ok(port) => port,
            Err(e) => {
                resources.release_instance_id(project.id, dynamips_id);
                return Err(e);
            }
        };

        let aux = match params.aux {
            Some(port) => resources.reserve_tcp_port(port, project.id).map(|_| Some(port)),
            None if self.config.allocate_aux_console_ports => resources.get_free_tcp_port(project.id).map(Some),
            None => Ok(None),
        };
        let aux = match aux {
            Ok(port) => port,
            Err(e) => {
                resources.release_tcp_port(console, project.id);
                resources.release_instance_id(project.id, dynamips_id);
                return Err(e);
            }
        };

        Ok(RouterIdentity { id, project: project.clone(), dynamips_id, console: Some(console), aux })
    }

    async fn release_identity(&self, identity: &RouterIdentity) {
        let mut resources = self.resources.lock().await;
        let project = identity.project.id;
        resources.release_instance_id(project, identity.dynamips_id);
        for port in identity.console.iter().chain(identity.aux.iter()) {
            resources.release_tcp_port(*port, project);
        }
    }

    /// Apply settings to a router. Console and AUX ports are reserved before they are used, and
    /// the old ports are released.
    async fn apply_router_settings(&self, router: &mut Router, settings: Vec<RouterSetting>) -> Result<()> {
        let project = router.project().id;
        for setting in settings {
            match setting {
                RouterSetting::Console(port) if router.console() != Some(port) => {
                    let old = router.console();
                    self.resources.lock().await.reserve_tcp_port(port, project)?;
                    if let Err(e) = router.set_console(port).await {
                        self.resources.lock().await.release_tcp_port(port, project);
                        return Err(e);
                    }
                    if let Some(old) = old {
                        self.resources.lock().await.release_tcp_port(old, project);
                    }
                }
                RouterSetting::Aux(port) if router.aux() != Some(port) => {
                    let old = router.aux();
                    self.resources.lock().await.reserve_tcp_port(port, project)?;
                    if let Err(e) = router.set_aux(port).await {
                        self.resources.lock().await.release_tcp_port(port, project);
                        return Err(e);
                    }
                    if let Some(old) = old {
                        self.resources.lock().await.release_tcp_port(old, project);
                    }
                }
                setting => router.apply_setting(setting).await?,
            }
        }
        Ok(())
    }

    /// Get the router with the ID
    pub async fn router(&self, id: Uuid) -> Result<Arc<Mutex<Router>>> {
        self.routers
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Router {} doesn't exist", id)))
    }

    /// Public state of the router
    pub async fn router_info(&self, id: Uuid) -> Result<RouterInfo> {
        let router = self.router(id).await?;
        let mut router = router.lock().await;
        router.refresh_status().await?;
        Ok(router.info())
    }

    /// Apply the settings to the router, in order.
    pub async fn update_router(&self, id: Uuid, settings: Vec<RouterSetting>) -> Result<RouterInfo> {
        let router = self.router(id).await?;
        let mut router = router.lock().await;
        self.apply_router_settings(&mut router, settings).await?;
        Ok(router.info())
    }

    /// Delete the router, and release all its resources.
    pub async fn delete_router(&self, id: Uuid) -> Result<()> {
        let router = self
            .routers
            .lock()
            .await
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("Router {} doesn't exist", id)))?;
        let mut router = router.lock().await;
        let nios = router.delete().await;
        let project = router.project().id;
        self.release_nios(project, &nios).await;
        self.release_identity(&RouterIdentity {
            id,
            project: router.project().clone(),
            dynamips_id: router.dynamips_id(),
            console: router.console(),
            aux: router.aux(),
        })
        .await;
        self.forget_idle_hypervisors().await;
        Ok(())
    }

    /// Copy the configuration of one router onto another.
    pub async fn duplicate_router(&self, source: Uuid, destination: Uuid) -> Result<()> {
        let source = self.router(source).await?;
        let destination = self.router(destination).await?;
        let (startup, private) = {
            let source = source.lock().await;
            if let Err(e) = source.save_configs().await {
                debug!("Could not save the configs of \"{}\": {}", source.name(), e);
            }
            (
                tokio::fs::read_to_string(source.startup_config_path()).await.ok(),
                tokio::fs::read_to_string(source.private_config_path()).await.ok(),
            )
        };
        let destination = destination.lock().await;
        destination.set_configs(startup.as_deref(), private.as_deref()).await?;
        destination.refresh_hostname().await?;
        info!("Configs copied onto router \"{}\"", destination.name());
        Ok(())
    }

    /// Start the router. If enabled, the router is prepared to use a ghost image first.
    pub async fn start_router(&self, id: Uuid) -> Result<()> {
        let router = self.router(id).await?;
        let mut router = router.lock().await;
        if self.config.ghost_ios_support && router.refresh_status().await? == RouterStatus::Inactive {
            self.ghosts.lock().await.prepare(&mut router).await?;
        }
        router.start().await
    }

    /// Stop the router
    pub async fn stop_router(&self, id: Uuid) -> Result<()> {
        self.router(id).await?.lock().await.stop().await
    }

    /// Suspend the router
    pub async fn suspend_router(&self, id: Uuid) -> Result<()> {
        self.router(id).await?.lock().await.suspend().await
    }

    /// Resume the router
    pub async fn resume_router(&self, id: Uuid) -> Result<()> {
        self.router(id).await?.lock().await.resume().await
    }

    /// Reload the router. The router is prepared to use a ghost image before it boots again.
    pub async fn reload_router(&self, id: Uuid) -> Result<()> {
        let router = self.router(id).await?;
        let mut router = router.lock().await;
        router.stop().await?;
        if self.config.ghost_ios_support {
            self.ghosts.lock().await.prepare(&mut router).await?;
        }
        router.start().await
    }

    /// Create a NIO and bind it to the port of the router.
    pub async fn router_add_nio(&self, id: Uuid, slot: usize, port: u32, kind: NioKind) -> Result<()> {
        let router = self.router(id).await?;
        let mut router = router.lock().await;
        kind.validate().await?;
        let hypervisor = Arc::clone(router.hypervisor());
        let nio = Nio::create(&hypervisor, kind).await?;
        let mut spare = nio.clone();
        if let Err(e) = router.slot_add_nio_binding(slot, port, nio).await {
            if let Err(e) = spare.delete(&hypervisor).await {
                warn!("Could not delete NIO {}: {}", spare, e);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Unbind the NIO from the port of the router, and delete it.
    pub async fn router_remove_nio(&self, id: Uuid, slot: usize, port: u32) -> Result<()> {
        let router = self.router(id).await?;
        let mut router = router.lock().await;
        let mut nio = router.slot_remove_nio_binding(slot, port).await?;
        let deleted = nio.delete(router.hypervisor()).await;
        self.release_nios(router.project().id, &[nio]).await;
        deleted
    }

    /// Capture the packets of a router port
    pub async fn router_start_capture(
        &self,
        id: Uuid,
        slot: usize,
        port: u32,
        output_file: &Path,
        data_link_type: Option<&str>,
    ) -> Result<()> {
        let router = self.router(id).await?;
        let mut router = router.lock().await;
        router
            .start_capture(slot, port, output_file, data_link_type.unwrap_or(DEFAULT_DATA_LINK_TYPE))
            .await
    }

    /// Stop the capture on a router port
    pub async fn router_stop_capture(&self, id: Uuid, slot: usize, port: u32) -> Result<()> {
        self.router(id).await?.lock().await.stop_capture(slot, port).await
    }

    /// Idle-PC proposals of the router
    pub async fn idle_pc_proposals(&self, id: Uuid) -> Result<Vec<String>> {
        let router = self.router(id).await?;
        let mut router = router.lock().await;
        self.calibrator.proposals(&mut router).await
    }

    /// Compute an idle-PC value for the router and configure it.
    pub async fn auto_idle_pc(&self, id: Uuid) -> Result<String> {
        let router = self.router(id).await?;
        let mut router = router.lock().await;
        self.calibrator.calibrate(&mut router).await
    }

    // Devices

    /// Create a new device on its own hypervisor.
    pub async fn create_device(
        &self,
        project: &Project,
        node_id: Option<Uuid>,
        name: impl Into<String>,
        settings: DeviceSettings,
    ) -> Result<DeviceInfo> {
        let hypervisor = self.start_new_hypervisor(project).await?;
        let result = self.create_device_on(Arc::clone(&hypervisor), project, node_id, name, settings).await;
        if result.is_err() && hypervisor.is_empty() {
            hypervisor.stop().await;
            self.forget_idle_hypervisors().await;
        }
        result
    }

    /// Create a new device on an existing hypervisor.
    pub async fn create_device_on(
        &self,
        hypervisor: Arc<Hypervisor>,
        project: &Project,
        node_id: Option<Uuid>,
        name: impl Into<String>,
        settings: DeviceSettings,
    ) -> Result<DeviceInfo> {
        let id = node_id.unwrap_or_else(Uuid::new_v4);
        self.check_new_node(id).await?;
        let base = DeviceBase::new(id, name, project.clone(), hypervisor);
        let device = Device::create(base, settings).await?;
        let info = device.info();
        self.devices.lock().await.insert(id, Arc::new(Mutex::new(device)));
        Ok(info)
    }

    /// Get the device with the ID
    pub async fn device(&self, id: Uuid) -> Result<Arc<Mutex<Device>>> {
        self.devices
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Device {} doesn't exist", id)))
    }

    /// Public state of the device
    pub async fn device_info(&self, id: Uuid) -> Result<DeviceInfo> {
        Ok(self.device(id).await?.lock().await.info())
    }

    /// Rename the device and/or apply new settings.
    pub async fn update_device(
        &self,
        id: Uuid,
        name: Option<&str>,
        settings: Option<DeviceSettings>,
    ) -> Result<DeviceInfo> {
        let device = self.device(id).await?;
        let mut device = device.lock().await;
        if let Some(name) = name {
            if name != device.name() {
                device.set_name(name).await?;
            }
        }
        if let Some(settings) = settings {
            device.update(settings).await?;
        }
        Ok(device.info())
    }

    /// Delete the device, and release its tunnel ports.
    pub async fn delete_device(&self, id: Uuid) -> Result<()> {
        let device = self
            .devices
            .lock()
            .await
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("Device {} doesn't exist", id)))?;
        let mut device = device.lock().await;
        let nios = device.delete().await;
        self.release_nios(device.base().project().id, &nios).await;
        self.forget_idle_hypervisors().await;
        Ok(())
    }

    /// Copy the settings of one device onto another of the same kind.
    pub async fn duplicate_device(&self, source: Uuid, destination: Uuid) -> Result<()> {
        let settings = self.device(source).await?.lock().await.settings();
        self.device(destination).await?.lock().await.update(settings).await
    }

    /// Create a NIO and bind it to the port of the device.
    pub async fn device_add_nio(&self, id: Uuid, port: u32, kind: NioKind) -> Result<()> {
        let device = self.device(id).await?;
        let mut device = device.lock().await;
        kind.validate().await?;
        let hypervisor = Arc::clone(device.base().hypervisor());
        let nio = Nio::create(&hypervisor, kind).await?;
        let mut spare = nio.clone();
        if let Err(e) = device.add_nio(nio, port).await {
            if let Err(e) = spare.delete(&hypervisor).await {
                warn!("Could not delete NIO {}: {}", spare, e);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Unbind the NIO from the port of the device, and delete it.
    pub async fn device_remove_nio(&self, id: Uuid, port: u32) -> Result<()> {
        let device = self.device(id).await?;
        let mut device = device.lock().await;
        let mut nio = device.remove_nio(port).await?;
        let deleted = nio.delete(device.base().hypervisor()).await;
        self.release_nios(device.base().project().id, &[nio]).await;
        deleted
    }

    /// Capture the packets of a device port
    pub async fn device_start_capture(
        &self,
        id: Uuid,
        port: u32,
        output_file: &Path,
        data_link_type: Option<&str>,
    ) -> Result<()> {
        self.device(id).await?.lock().await.start_capture(port, output_file, data_link_type).await
    }

    /// Stop the capture on a device port
    pub async fn device_stop_capture(&self, id: Uuid, port: u32) -> Result<()> {
        self.device(id).await?.lock().await.stop_capture(port).await
    }

    /// MAC address table of an Ethernet switch
    pub async fn mac_address_table(&self, id: Uuid) -> Result<Vec<String>> {
        let device = self.device(id).await?;
        let device = device.lock().await;
        match &*device {
            Device::EthernetSwitch(switch) => switch.get_mac_addr_table().await,
            other => Err(not_a_switch(other)),
        }
    }

    /// Flush the MAC address table of an Ethernet switch
    pub async fn clear_mac_address_table(&self, id: Uuid) -> Result<()> {
        let device = self.device(id).await?;
        let device = device.lock().await;
        match &*device {
            Device::EthernetSwitch(switch) => switch.clear_mac_addr_table().await,
            other => Err(not_a_switch(other)),
        }
    }

    // Projects

    /// Delete every node of the project, release its resources and remove the files the
    /// hypervisors leave behind.
    pub async fn close_project(&self, project: &Project) -> Result<()> {
        info!("Closing project {}", project.id);

        let routers: Vec<Uuid> = {
            let mut ids = Vec::new();
            for (id, router) in self.routers.lock().await.iter() {
                if router.lock().await.project().id == project.id {
                    ids.push(*id);
                }
            }
            ids
        };
        for id in routers {
            if let Err(e) = self.delete_router(id).await {
                warn!("Could not delete router {}: {}", id, e);
            }
        }

        let devices: Vec<Uuid> = {
            let mut ids = Vec::new();
            for (id, device) in self.devices.lock().await.iter() {
                if device.lock().await.base().project().id == project.id {
                    ids.push(*id);
                }
            }
            ids
        };
        for id in devices {
            if let Err(e) = self.delete_device(id).await {
                warn!("Could not delete device {}: {}", id, e);
            }
        }

        self.resources.lock().await.release_project(project.id);

        let working_dir = project.module_working_directory();
        let ghost_files = self.ghosts.lock().await.forget_dir(&working_dir);
        for file in ghost_files {
            if file.exists() {
                if let Err(e) = tokio::fs::remove_file(&file).await {
                    warn!("Could not delete ghost file {}: {}", file.display(), e);
                }
            }
        }
        remove_leftovers(&working_dir).await
    }

    /// Stop every router, and every hypervisor.
    pub async fn shutdown(&self) {
        let routers: Vec<Arc<Mutex<Router>>> = self.routers.lock().await.values().cloned().collect();
        for router in routers {
            let mut router = router.lock().await;
            if let Err(e) = router.stop().await {
                warn!("Could not stop router \"{}\": {}", router.name(), e);
            }
        }
        let hypervisors: Vec<Arc<Hypervisor>> = self.hypervisors.lock().await.drain(..).collect();
        for hypervisor in hypervisors {
            self.supervisor.stop(&hypervisor).await;
        }
        info!("All Dynamips hypervisors have been stopped");
    }
}

fn not_a_switch(device: &Device) -> Error {
    Error::Precondition(format!(
        "\"{}\" is an {}, only Ethernet switches have a MAC address table",
        device.name(),
        device.kind()
    ))
}

/// Returns true for the lock, log and temporary files a hypervisor leaves in its working directory
fn is_leftover(file_name: &str) -> bool {
    file_name.ends_with("_lock")
        || file_name.ends_with("_log.txt")
        || file_name.starts_with("ilt_")
        || file_name.ends_with("_rommon_vars")
}

async fn remove_leftovers(working_dir: &Path) -> Result<()> {
    let mut entries = match tokio::fs::read_dir(working_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(format!("Cannot read {}", working_dir.display()), e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io(format!("Cannot read {}", working_dir.display()), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_leftover(&name) {
            continue;
        }
        debug!("Deleting leftover file {}", name);
        if let Err(e) = tokio::fs::remove_file(entry.path()).await {
            warn!("Could not delete {}: {}", entry.path().display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn leftovers() {
        assert!(is_leftover("c7200_i1_lock"));
        assert!(is_leftover("dynamips_i1_log.txt"));
        assert!(is_leftover("ilt_atm"));
        assert!(is_leftover("c3600_i2_rommon_vars"));
        assert!(!is_leftover("c7200_i1_nvram"));
        assert!(!is_leftover("configs"));
    }
}
