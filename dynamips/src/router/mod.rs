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

//! # Virtual Router
//!
//! A [`Router`] is a single emulated Cisco router on a hypervisor. All platforms share the same
//! structure, and differ only in their [`PlatformProfile`](crate::platform::PlatformProfile).
//!
//! The router state machine is `inactive -> running <-> suspended`, with `running -> shutting
//! down -> inactive`. The state is always read back from the hypervisor before acting on it.

mod configs;
mod settings;

pub use configs::{
    normalize_config, private_config_relative, startup_config_relative, write_config,
    write_config_template,
};
pub use settings::RouterSetting;

use configs::{ConfigSaver, MemoryWatcher};

use crate::adapters::{wic_slot_id, Adapter, AdapterKind, WicKind};
use crate::config::DynamipsConfig;
use crate::hypervisor::Hypervisor;
use crate::nio::{create_capture_file, Nio};
use crate::platform::{Platform, PlatformProfile, C7200_MIDPLANES, C7200_NPES};
use crate::{Error, Project, Result, RouterStatus};

use log::*;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// First bytes of every IOS image (32 bit big endian ELF)
const IOS_MAGIC: &[u8; 7] = b"\x7fELF\x01\x02\x01";

/// Parameters for creating a new router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterParams {
    /// Name of the router
    pub name: String,
    /// Platform
    pub platform: Platform,
    /// Path to the IOS image
    pub image: PathBuf,
    /// Dynamips instance ID. If not given, the lowest free one is picked.
    #[serde(default)]
    pub dynamips_id: Option<u32>,
    /// Chassis (c1700, c2600 and c3600 only)
    #[serde(default)]
    pub chassis: Option<String>,
    /// Console port. If not given, a free one is picked.
    #[serde(default)]
    pub console: Option<u16>,
    /// AUX port
    #[serde(default)]
    pub aux: Option<u16>,
    /// Processor engine (c7200 only)
    #[serde(default)]
    pub npe: Option<String>,
    /// Midplane (c7200 only)
    #[serde(default)]
    pub midplane: Option<String>,
    /// Settings applied right after the router is created
    #[serde(default)]
    pub settings: Vec<RouterSetting>,
}

impl RouterParams {
    /// Create the parameters with all optional values unset
    pub fn new(name: impl Into<String>, platform: Platform, image: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            platform,
            image: image.into(),
            dynamips_id: None,
            chassis: None,
            console: None,
            aux: None,
            npe: None,
            midplane: None,
            settings: Vec::new(),
        }
    }
}

/// Identity and resources of a router, as allocated by the manager
#[derive(Debug, Clone, PartialEq)]
pub struct RouterIdentity {
    /// Node ID
    pub id: Uuid,
    /// Project of the router
    pub project: Project,
    /// Dynamips instance ID
    pub dynamips_id: u32,
    /// Console port
    pub console: Option<u16>,
    /// AUX port
    pub aux: Option<u16>,
}

/// Host dependent behavior of routers
#[derive(Debug, Clone, PartialEq)]
pub struct RouterOptions {
    /// Check the available host memory before starting
    pub check_host_ram: bool,
    /// Poll interval of the memory watcher
    pub memory_watch_interval: Duration,
}

impl RouterOptions {
    /// Take the options from the configuration
    pub fn from_config(config: &DynamipsConfig) -> Self {
        Self {
            check_host_ram: config.check_host_ram,
            memory_watch_interval: config.memory_watch_interval(),
        }
    }
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self::from_config(&DynamipsConfig::default())
    }
}

/// Public state of a router
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterInfo {
    /// Node ID
    pub node_id: Uuid,
    /// Project ID
    pub project_id: Uuid,
    /// Name of the router
    pub name: String,
    /// Dynamips instance ID
    pub dynamips_id: u32,
    /// Platform
    pub platform: Platform,
    /// Chassis
    pub chassis: Option<String>,
    /// IOS image
    pub image: PathBuf,
    /// Status
    pub status: RouterStatus,
    /// RAM in MB
    pub ram: u32,
    /// NVRAM in KB
    pub nvram: u32,
    /// disk0 in MB
    pub disk0: u32,
    /// disk1 in MB
    pub disk1: u32,
    /// mmap enabled
    pub mmap: bool,
    /// sparse memory enabled
    pub sparsemem: bool,
    /// Clock divisor
    pub clock_divisor: u32,
    /// Exec area in MB
    pub exec_area: Option<u32>,
    /// I/O memory in percent
    pub iomem: Option<u32>,
    /// Idle-PC value
    pub idlepc: String,
    /// Idle max
    pub idlemax: u32,
    /// Idle sleep time in ms
    pub idlesleep: u32,
    /// Processor engine
    pub npe: Option<String>,
    /// Midplane
    pub midplane: Option<String>,
    /// Base MAC address
    pub mac_addr: Option<String>,
    /// System ID
    pub system_id: Option<String>,
    /// Console port
    pub console: Option<u16>,
    /// AUX port
    pub aux: Option<u16>,
    /// Ghost file used by the router
    pub ghost_file: Option<PathBuf>,
    /// Ghost status (0: none, 1: creating, 2: using)
    pub ghost_status: u8,
    /// Delete the disks when deleting the router
    pub auto_delete_disks: bool,
    /// Adapter in every slot
    pub slots: Vec<Option<AdapterKind>>,
    /// WICs in slot 0
    pub wics: Vec<Option<WicKind>>,
}

/// # Router
#[derive(Debug)]
pub struct Router {
    id: Uuid,
    name: String,
    project: Project,
    hypervisor: Arc<Hypervisor>,
    dynamips_id: u32,
    platform: Platform,
    chassis: Option<String>,
    image: PathBuf,
    ram: u32,
    nvram: u32,
    disk0: u32,
    disk1: u32,
    mmap: bool,
    sparsemem: bool,
    clock_divisor: u32,
    exec_area: Option<u32>,
    iomem: Option<u32>,
    idlepc: String,
    idlemax: u32,
    idlesleep: u32,
    npe: Option<String>,
    midplane: Option<String>,
    mac_addr: Option<String>,
    system_id: Option<String>,
    console: Option<u16>,
    aux: Option<u16>,
    ghost_flag: bool,
    ghost_file: Option<PathBuf>,
    ghost_status: u8,
    auto_delete_disks: bool,
    slots: Vec<Option<Adapter>>,
    status: RouterStatus,
    options: RouterOptions,
    watcher: Option<MemoryWatcher>,
}

impl Router {
    /// Prepare a new router on the hypervisor. Nothing is sent until [`Router::create`] is called.
    pub fn new(
        identity: RouterIdentity,
        params: &RouterParams,
        hypervisor: Arc<Hypervisor>,
        options: RouterOptions,
    ) -> Result<Self> {
        let profile = params.platform.profile();
        let chassis = profile.validate_chassis(params.chassis.as_deref())?;

        let (npe, midplane) = if params.platform == Platform::C7200 {
            let npe = params.npe.clone().unwrap_or_else(|| String::from("npe-400"));
            let midplane = params.midplane.clone().unwrap_or_else(|| String::from("vxr"));
            check_c7200_option("NPE", &npe, C7200_NPES)?;
            check_c7200_option("midplane", &midplane, C7200_MIDPLANES)?;
            (Some(npe), Some(midplane))
        } else if params.npe.is_some() || params.midplane.is_some() {
            return Err(Error::Precondition(format!(
                "NPE and midplane are only available on platform c7200, not on {}",
                params.platform
            )));
        } else {
            (None, None)
        };

        let mut slots: Vec<Option<Adapter>> = vec![None; profile.num_slots(chassis.as_deref())];
        slots[0] = profile.mainboard(chassis.as_deref()).map(Adapter::new);

        Ok(Self {
            id: identity.id,
            name: params.name.clone(),
            project: identity.project,
            hypervisor,
            dynamips_id: identity.dynamips_id,
            platform: params.platform,
            chassis,
            image: params.image.clone(),
            ram: profile.ram,
            nvram: profile.nvram,
            disk0: profile.disk0,
            disk1: profile.disk1,
            mmap: true,
            sparsemem: true,
            clock_divisor: profile.clock_divisor,
            exec_area: None,
            iomem: profile.iomem,
            idlepc: String::new(),
            idlemax: 500,
            idlesleep: 30,
            npe,
            midplane,
            mac_addr: None,
            system_id: None,
            console: identity.console,
            aux: identity.aux,
            ghost_flag: false,
            ghost_file: None,
            ghost_status: 0,
            auto_delete_disks: false,
            slots,
            status: RouterStatus::Inactive,
            options,
            watcher: None,
        })
    }

    /// Prepare the throwaway router used to create a ghost file for `parent`. It lives on the same
    /// hypervisor, uses instance ID 0 and has no console.
    pub fn ghost(parent: &Router, name: impl Into<String>) -> Self {
        let profile = parent.platform.profile();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            project: parent.project.clone(),
            hypervisor: Arc::clone(&parent.hypervisor),
            dynamips_id: 0,
            platform: parent.platform,
            chassis: parent.chassis.clone(),
            image: parent.image.clone(),
            ram: parent.ram,
            nvram: parent.nvram,
            disk0: 0,
            disk1: 0,
            mmap: parent.mmap,
            sparsemem: parent.sparsemem,
            clock_divisor: parent.clock_divisor,
            exec_area: None,
            iomem: None,
            idlepc: String::new(),
            idlemax: parent.idlemax,
            idlesleep: parent.idlesleep,
            npe: parent.npe.clone(),
            midplane: parent.midplane.clone(),
            mac_addr: None,
            system_id: None,
            console: None,
            aux: None,
            ghost_flag: true,
            ghost_file: None,
            ghost_status: 0,
            auto_delete_disks: false,
            slots: vec![None; profile.num_slots(parent.chassis.as_deref())],
            status: RouterStatus::Inactive,
            options: RouterOptions { check_host_ram: false, ..parent.options.clone() },
            watcher: None,
        }
    }

    /// Create the router on the hypervisor and push its initial settings.
    pub async fn create(&mut self) -> Result<()> {
        self.send(format!("vm create \"{}\" {} {}", self.name, self.dynamips_id, self.platform))
            .await?;
        self.hypervisor.register_device(self.id);

        let pushed = if self.ghost_flag {
            self.push_ghost_settings().await
        } else {
            self.push_initial_settings().await
        };
        if let Err(e) = pushed {
            warn!("Could not configure router \"{}\": {}", self.name, e);
            if let Err(e) = self.send(format!("vm delete \"{}\"", self.name)).await {
                debug!("Could not delete \"{}\": {}", self.name, e);
            }
            self.hypervisor.unregister_device(self.id);
            return Err(e);
        }

        if self.ghost_flag {
            debug!("Ghost router \"{}\" has been created", self.name);
        } else {
            info!(
                "Router {} \"{}\" [{}] has been created",
                self.platform, self.name, self.id
            );
        }
        Ok(())
    }

    /// Chassis, NPE and midplane
    async fn push_hardware(&self) -> Result<()> {
        let name = &self.name;
        if let Some(chassis) = self.chassis.as_ref() {
            self.send(format!("{} set_chassis \"{}\" {}", self.platform, name, chassis)).await?;
        }
        if let Some(npe) = self.npe.as_ref() {
            self.send(format!("c7200 set_npe \"{}\" {}", name, npe)).await?;
        }
        if let Some(midplane) = self.midplane.as_ref() {
            self.send(format!("c7200 set_midplane \"{}\" {}", name, midplane)).await?;
        }
        Ok(())
    }

    /// The ghost runs the image of its parent on the same hardware and RAM size.
    async fn push_ghost_settings(&self) -> Result<()> {
        self.push_hardware().await?;
        self.send(format!("vm set_ios \"{}\" \"{}\"", self.name, self.image.display())).await?;
        self.send(format!("vm set_ram \"{}\" {}", self.name, self.ram)).await?;
        Ok(())
    }

    async fn push_initial_settings(&mut self) -> Result<()> {
        let name = self.name.clone();
        let platform = self.platform;

        if let Some(console) = self.console {
            self.send(format!("vm set_con_tcp_port \"{}\" {}", name, console)).await?;
        }
        if let Some(aux) = self.aux {
            self.send(format!("vm set_aux_tcp_port \"{}\" {}", name, aux)).await?;
        }
        self.push_hardware().await?;

        self.send(format!("vm set_ios \"{}\" \"{}\"", name, self.image.display())).await?;
        self.send(format!("vm set_ram \"{}\" {}", name, self.ram)).await?;
        self.send(format!("vm set_nvram \"{}\" {}", name, self.nvram)).await?;
        self.send(format!("vm set_disk0 \"{}\" {}", name, self.disk0)).await?;
        self.send(format!("vm set_disk1 \"{}\" {}", name, self.disk1)).await?;
        self.send(format!("vm set_ram_mmap \"{}\" {}", name, self.mmap as u8)).await?;
        self.send(format!("vm set_sparse_mem \"{}\" {}", name, self.sparsemem as u8)).await?;
        self.send(format!("vm set_clock_divisor \"{}\" {}", name, self.clock_divisor)).await?;
        if let Some(iomem) = self.iomem {
            self.send(format!("{} set_iomem \"{}\" {}", platform, name, iomem)).await?;
        }
        self.send(format!("vm set_idle_max \"{}\" 0 {}", name, self.idlemax)).await?;
        self.send(format!("vm set_idle_sleep_time \"{}\" 0 {}", name, self.idlesleep)).await?;

        // base MAC address chosen by the hypervisor
        let reply = self.send(format!("{} get_mac_addr \"{}\"", platform, name)).await?;
        self.mac_addr = reply.into_iter().next();
        Ok(())
    }

    /// Send a command to the hypervisor of the router
    pub(crate) async fn send(&self, command: String) -> Result<Vec<String>> {
        self.hypervisor.send(command).await
    }

    /// Node ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the router
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Project of the router
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Hypervisor of the router
    pub fn hypervisor(&self) -> &Arc<Hypervisor> {
        &self.hypervisor
    }

    /// Dynamips instance ID
    pub fn dynamips_id(&self) -> u32 {
        self.dynamips_id
    }

    /// Platform
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Platform profile
    pub fn profile(&self) -> &'static PlatformProfile {
        self.platform.profile()
    }

    /// Chassis
    pub fn chassis(&self) -> Option<&str> {
        self.chassis.as_deref()
    }

    /// IOS image
    pub fn image(&self) -> &Path {
        &self.image
    }

    /// RAM in MB
    pub fn ram(&self) -> u32 {
        self.ram
    }

    /// mmap enabled
    pub fn mmap(&self) -> bool {
        self.mmap
    }

    /// Processor engine (c7200 only)
    pub fn npe(&self) -> Option<&str> {
        self.npe.as_deref()
    }

    /// Current idle-PC value
    pub fn idlepc(&self) -> &str {
        &self.idlepc
    }

    /// Console port
    pub fn console(&self) -> Option<u16> {
        self.console
    }

    /// AUX port
    pub fn aux(&self) -> Option<u16> {
        self.aux
    }

    /// Ghost file in use
    pub fn ghost_file(&self) -> Option<&Path> {
        self.ghost_file.as_deref()
    }

    /// Ghost status
    pub fn ghost_status(&self) -> u8 {
        self.ghost_status
    }

    /// Returns true if this router only exists to create a ghost file
    pub fn is_ghost(&self) -> bool {
        self.ghost_flag
    }

    /// Last known status
    pub fn status(&self) -> RouterStatus {
        self.status
    }

    /// Working directory of the router (shared with its hypervisor)
    pub fn working_dir(&self) -> &Path {
        self.hypervisor.working_dir()
    }

    /// Adapter in the slot
    pub fn adapter(&self, slot: usize) -> Option<&Adapter> {
        self.slots.get(slot).and_then(|a| a.as_ref())
    }

    /// Name of the ghost file for the current image and RAM size
    pub fn formatted_ghost_file(&self) -> String {
        let image = self
            .image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}-{}.ghost", image, self.ram).replace(' ', "_")
    }

    /// Path of the startup config
    pub fn startup_config_path(&self) -> PathBuf {
        self.working_dir().join(startup_config_relative(self.dynamips_id))
    }

    /// Path of the private config
    pub fn private_config_path(&self) -> PathBuf {
        self.working_dir().join(private_config_relative(self.dynamips_id))
    }

    /// Files holding the NVRAM and ROM of the router
    pub fn memory_files(&self) -> Vec<PathBuf> {
        vec![
            self.working_dir().join(format!("{}_i{}_rom", self.platform, self.dynamips_id)),
            self.working_dir().join(format!("{}_i{}_nvram", self.platform, self.dynamips_id)),
        ]
    }

    fn config_saver(&self) -> ConfigSaver {
        ConfigSaver {
            hypervisor: Arc::clone(&self.hypervisor),
            name: self.name.clone(),
            working_dir: self.working_dir().to_path_buf(),
            dynamips_id: self.dynamips_id,
        }
    }

    /// Read the status from the hypervisor
    pub async fn refresh_status(&mut self) -> Result<RouterStatus> {
        let command = format!("vm get_status \"{}\"", self.name);
        let reply = self.send(command.clone()).await?;
        let status = reply
            .first()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .and_then(RouterStatus::from_code)
            .ok_or_else(|| Error::Protocol { command, message: format!("invalid status: {:?}", reply) })?;
        self.status = status;
        Ok(status)
    }

    /// Returns true if the router is running, as reported by the hypervisor
    pub async fn is_running(&mut self) -> Result<bool> {
        Ok(self.refresh_status().await?.is_running())
    }

    /// Start the router. A suspended router is resumed, and a running router is left alone.
    pub async fn start(&mut self) -> Result<()> {
        match self.refresh_status().await? {
            RouterStatus::Suspended => self.resume().await,
            RouterStatus::Inactive => self.boot().await,
            _ => Ok(()),
        }
    }

    async fn boot(&mut self) -> Result<()> {
        check_ios_image(&self.image).await?;
        if !self.ghost_flag && self.options.check_host_ram {
            check_available_ram(&self.name, self.ram)?;
        }

        let startup = startup_config_relative(self.dynamips_id);
        let mut private = private_config_relative(self.dynamips_id);
        // an empty private config can prevent the router from booting
        let private_size = tokio::fs::metadata(self.working_dir().join(&private))
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if private_size == 0 {
            private = PathBuf::new();
        }
        self.send(format!(
            "vm set_config \"{}\" \"{}\" \"{}\"",
            self.name,
            startup.display(),
            private.display()
        ))
        .await?;

        self.send(format!("vm start \"{}\"", self.name)).await?;
        self.status = RouterStatus::Running;
        info!("router \"{}\" [{}] has been started", self.name, self.id);

        if !self.ghost_flag {
            self.watcher = Some(MemoryWatcher::spawn(
                self.config_saver(),
                self.memory_files(),
                self.options.memory_watch_interval,
            ));
        }
        Ok(())
    }

    /// Stop the router, and save its configuration.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.refresh_status().await?.is_inactive() {
            if let Err(e) = self.send(format!("vm stop \"{}\"", self.name)).await {
                warn!("Could not stop router \"{}\": {}", self.name, e);
            }
            self.status = RouterStatus::Inactive;
            info!("router \"{}\" [{}] has been stopped", self.name, self.id);
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.stop().await;
        }
        if self.ghost_flag {
            return Ok(());
        }
        self.save_configs().await
    }

    /// Suspend a running router
    pub async fn suspend(&mut self) -> Result<()> {
        if !self.refresh_status().await?.is_running() {
            return Err(Error::Precondition(format!(
                "Cannot suspend router \"{}\": it is {}",
                self.name, self.status
            )));
        }
        self.send(format!("vm suspend \"{}\"", self.name)).await?;
        self.status = RouterStatus::Suspended;
        info!("router \"{}\" [{}] has been suspended", self.name, self.id);
        Ok(())
    }

    /// Resume a suspended router
    pub async fn resume(&mut self) -> Result<()> {
        if !self.refresh_status().await?.is_suspended() {
            return Err(Error::Precondition(format!(
                "Cannot resume router \"{}\": it is {}",
                self.name, self.status
            )));
        }
        self.send(format!("vm resume \"{}\"", self.name)).await?;
        self.status = RouterStatus::Running;
        info!("router \"{}\" [{}] has been resumed", self.name, self.id);
        Ok(())
    }

    /// Stop and start the router
    pub async fn reload(&mut self) -> Result<()> {
        self.stop().await?;
        self.start().await
    }

    /// Extract the configuration from NVRAM and store it in the config files
    pub async fn save_configs(&self) -> Result<()> {
        self.config_saver().save().await
    }

    /// Extract the startup and private configuration from NVRAM, without storing them.
    pub async fn extract_config(&self) -> Result<(Option<String>, Option<String>)> {
        self.config_saver().extract().await
    }

    /// Write the startup and private configuration files. Carriage returns are removed, a `!`
    /// line is put in front, and `%h` is replaced by the router name.
    pub async fn set_configs(&self, startup: Option<&str>, private: Option<&str>) -> Result<()> {
        if let Some(content) = startup {
            write_config_template(&self.startup_config_path(), content, &self.name).await?;
        }
        if let Some(content) = private {
            write_config_template(&self.private_config_path(), content, &self.name).await?;
        }
        Ok(())
    }

    /// CPU time consumed by the router, in seconds
    pub async fn get_cpu_usage(&self) -> Result<u64> {
        let command = format!("vm cpu_usage \"{}\" 0", self.name);
        let reply = self.send(command.clone()).await?;
        reply
            .first()
            .and_then(|x| x.trim().parse().ok())
            .ok_or_else(|| Error::Protocol { command, message: format!("invalid CPU usage: {:?}", reply) })
    }

    /// Idle-PC proposals of the running router
    pub async fn idle_pc_proposals(&self) -> Result<Vec<String>> {
        self.send(format!("vm get_idle_pc_prop \"{}\" 0", self.name)).await
    }

    /// Idle-PC proposals computed earlier
    pub async fn show_idle_pc_prop(&self) -> Result<Vec<String>> {
        self.send(format!("vm show_idle_pc_prop \"{}\" 0", self.name)).await
    }

    /// Install an adapter in the slot.
    pub async fn slot_add_binding(&mut self, slot: usize, adapter: AdapterKind) -> Result<()> {
        match self.slots.get(slot) {
            None => return Err(self.no_such_slot(slot)),
            Some(Some(current)) => {
                return Err(Error::Conflict(format!(
                    "Slot {} is already occupied by adapter {} on router \"{}\"",
                    slot,
                    current.kind(),
                    self.name
                )))
            }
            Some(None) => {}
        }
        if !self.profile().accepts(slot, adapter, self.chassis()) {
            return Err(Error::Precondition(format!(
                "Adapter {} is not supported in slot {} of platform {}",
                adapter, slot, self.platform
            )));
        }
        let running = self.is_running().await?;
        if running && !self.supports_oir(adapter) {
            return Err(Error::Precondition(format!(
                "Adapter {} cannot be added while router \"{}\" is running",
                adapter, self.name
            )));
        }

        self.send(format!("vm slot_add_binding \"{}\" {} 0 {}", self.name, slot, adapter)).await?;
        self.slots[slot] = Some(Adapter::new(adapter));
        info!("Router \"{}\": adapter {} inserted into slot {}", self.name, adapter, slot);

        if running {
            self.send(format!("vm slot_oir_start \"{}\" {} 0", self.name, slot)).await?;
            debug!("Router \"{}\": OIR start event sent to slot {}", self.name, slot);
        }
        Ok(())
    }

    /// Remove the adapter from the slot. The adapter must not hold any NIO.
    pub async fn slot_remove_binding(&mut self, slot: usize) -> Result<AdapterKind> {
        let adapter = match self.slots.get(slot) {
            None => return Err(self.no_such_slot(slot)),
            Some(None) => {
                return Err(Error::Conflict(format!(
                    "No adapter in slot {} on router \"{}\"",
                    slot, self.name
                )))
            }
            Some(Some(adapter)) => adapter,
        };
        let kind = adapter.kind();
        if adapter.has_nios() {
            return Err(Error::Conflict(format!(
                "Adapter {} in slot {} on router \"{}\" still has NIOs bound",
                kind, slot, self.name
            )));
        }
        if slot == 0 && !self.profile().slot0_removable(self.chassis()) {
            return Err(Error::Precondition(format!(
                "Adapter {} in slot 0 of router \"{}\" cannot be removed",
                kind, self.name
            )));
        }
        let running = self.is_running().await?;
        if running && !self.supports_oir(kind) {
            return Err(Error::Precondition(format!(
                "Adapter {} cannot be removed while router \"{}\" is running",
                kind, self.name
            )));
        }

        if running {
            self.send(format!("vm slot_oir_stop \"{}\" {} 0", self.name, slot)).await?;
            debug!("Router \"{}\": OIR stop event sent to slot {}", self.name, slot);
        }
        self.send(format!("vm slot_remove_binding \"{}\" {} 0", self.name, slot)).await?;
        self.slots[slot] = None;
        info!("Router \"{}\": adapter {} removed from slot {}", self.name, kind, slot);
        Ok(kind)
    }

    /// Online insertion and removal. The c3660 and c3745 exclusions are nested inside the c7200
    /// check, so only c7200 port adapters pass.
    fn supports_oir(&self, adapter: AdapterKind) -> bool {
        let c7200_port_adapter =
            self.platform == Platform::C7200 && !adapter.name().starts_with("C7200");
        let c3660 = self.platform == Platform::C3600 && self.chassis() == Some("3660");
        let c3745_nm4t = self.platform == Platform::C3745 && adapter == AdapterKind::Nm4T;
        c7200_port_adapter && !c3660 && !c3745_nm4t
    }

    /// Install a WIC into a sub-slot of slot 0. The router must be stopped.
    pub async fn install_wic(&mut self, wic_index: usize, wic: WicKind) -> Result<()> {
        if !self.profile().accepts_wic(wic) {
            return Err(Error::Precondition(format!(
                "WIC {} is not supported on platform {}",
                wic, self.platform
            )));
        }
        let running = self.is_running().await?;
        let name = self.name.clone();
        let adapter = self.wic_adapter()?;
        if wic_index >= adapter.wics().len() {
            return Err(Error::Index(format!("WIC slot {} doesn't exist", wic_index)));
        }
        if !adapter.wic_slot_available(wic_index) {
            return Err(Error::Conflict(format!(
                "WIC slot {} is already occupied by another WIC",
                wic_index
            )));
        }
        if running {
            return Err(Error::Precondition(format!(
                "WIC {} cannot be added while router \"{}\" is running",
                wic, name
            )));
        }

        self.send(format!(
            "vm slot_add_binding \"{}\" 0 {} {}",
            name,
            wic_slot_id(wic_index),
            wic
        ))
        .await?;
        self.wic_adapter()?.install_wic(wic_index, wic)?;
        info!("Router \"{}\": {} inserted into WIC slot {}", name, wic, wic_index);
        Ok(())
    }

    /// Remove the WIC from a sub-slot of slot 0. The router must be stopped.
    pub async fn uninstall_wic(&mut self, wic_index: usize) -> Result<WicKind> {
        let running = self.is_running().await?;
        let name = self.name.clone();
        let adapter = self.wic_adapter()?;
        if wic_index >= adapter.wics().len() {
            return Err(Error::Index(format!("WIC slot {} doesn't exist", wic_index)));
        }
        if adapter.wic_slot_available(wic_index) {
            return Err(Error::Conflict(format!("No WIC is installed in WIC slot {}", wic_index)));
        }
        if adapter.wic_has_nios(wic_index) {
            return Err(Error::Conflict(format!(
                "WIC in WIC slot {} still has NIOs bound",
                wic_index
            )));
        }
        if running {
            return Err(Error::Precondition(format!(
                "Cannot remove a WIC while router \"{}\" is running",
                name
            )));
        }

        self.send(format!("vm slot_remove_binding \"{}\" 0 {}", name, wic_slot_id(wic_index)))
            .await?;
        let wic = self.wic_adapter()?.uninstall_wic(wic_index).ok_or_else(|| {
            Error::Conflict(format!("No WIC is installed in WIC slot {}", wic_index))
        })?;
        info!("Router \"{}\": {} removed from WIC slot {}", name, wic, wic_index);
        Ok(wic)
    }

    fn wic_adapter(&mut self) -> Result<&mut Adapter> {
        let name = &self.name;
        self.slots
            .get_mut(0)
            .and_then(|a| a.as_mut())
            .ok_or_else(|| Error::Precondition(format!("No adapter in slot 0 of router \"{}\" to hold WICs", name)))
    }

    fn no_such_slot(&self, slot: usize) -> Error {
        Error::Index(format!(
            "Slot {} doesn't exist on router \"{}\" (platform {})",
            slot, self.name, self.platform
        ))
    }

    fn port_adapter(&self, slot: usize, port: u32) -> Result<&Adapter> {
        let adapter = match self.slots.get(slot) {
            None => return Err(self.no_such_slot(slot)),
            Some(None) => {
                return Err(Error::Precondition(format!(
                    "Adapter is missing in slot {} on router \"{}\"",
                    slot, self.name
                )))
            }
            Some(Some(adapter)) => adapter,
        };
        if !adapter.port_exists(port) {
            return Err(Error::Index(format!(
                "Port {} does not exist on adapter {} in slot {}",
                port,
                adapter.kind(),
                slot
            )));
        }
        Ok(adapter)
    }

    fn port_adapter_mut(&mut self, slot: usize, port: u32) -> Result<&mut Adapter> {
        self.port_adapter(slot, port)?;
        self.slots
            .get_mut(slot)
            .and_then(|a| a.as_mut())
            .ok_or_else(|| Error::Index(format!("Slot {} doesn't exist", slot)))
    }

    /// NIO bound to the port
    pub fn get_nio(&self, slot: usize, port: u32) -> Option<&Nio> {
        self.adapter(slot).and_then(|a| a.get_nio(port))
    }

    /// Bind the NIO to the port of the adapter in the slot.
    pub async fn slot_add_nio_binding(&mut self, slot: usize, port: u32, nio: Nio) -> Result<()> {
        let adapter = self.port_adapter(slot, port)?;
        if adapter.get_nio(port).is_some() {
            return Err(Error::Conflict(format!(
                "Port {}/{} is already connected on router \"{}\"",
                slot, port, self.name
            )));
        }

        let add = format!("vm slot_add_nio_binding \"{}\" {} {} {}", self.name, slot, port, nio);
        if let Err(e) = self.send(add.clone()).await {
            // the binding may be left over, so remove it and try once more
            debug!("Could not bind {} on router \"{}\" ({}), retrying", nio, self.name, e);
            self.send(format!("vm slot_remove_nio_binding \"{}\" {} {}", self.name, slot, port))
                .await?;
            self.send(add).await?;
        }
        info!("Router \"{}\": NIO {} bound to port {}/{}", self.name, nio, slot, port);

        if self.is_running().await? {
            self.send(format!("vm slot_enable_nio \"{}\" {} {}", self.name, slot, port)).await?;
        }
        self.port_adapter_mut(slot, port)?.add_nio(port, nio)
    }

    /// Unbind the NIO from the port, and return it. The NIO still exists on the hypervisor.
    pub async fn slot_remove_nio_binding(&mut self, slot: usize, port: u32) -> Result<Nio> {
        if self.port_adapter(slot, port)?.get_nio(port).is_none() {
            return Err(Error::Conflict(format!(
                "Port {}/{} is not allocated on router \"{}\"",
                slot, port, self.name
            )));
        }
        self.stop_capture(slot, port).await?;
        if self.is_running().await? {
            self.send(format!("vm slot_disable_nio \"{}\" {} {}", self.name, slot, port)).await?;
        }
        self.send(format!("vm slot_remove_nio_binding \"{}\" {} {}", self.name, slot, port))
            .await?;
        let name = self.name.clone();
        let nio = self
            .port_adapter_mut(slot, port)?
            .remove_nio(port)
            .ok_or_else(|| Error::Conflict(format!("Port {}/{} is not allocated", slot, port)))?;
        info!("Router \"{}\": NIO {} removed from port {}/{}", name, nio, slot, port);
        Ok(nio)
    }

    /// Capture the packets of a port into `output_file`.
    pub async fn start_capture(
        &mut self,
        slot: usize,
        port: u32,
        output_file: &Path,
        data_link_type: &str,
    ) -> Result<()> {
        let name = self.name.clone();
        let hypervisor = Arc::clone(&self.hypervisor);
        let nio = self
            .port_adapter_mut(slot, port)?
            .get_nio_mut(port)
            .ok_or_else(|| Error::Conflict(format!("Port {}/{} is not connected", slot, port)))?;
        if nio.has_filter() {
            return Err(Error::Conflict(format!(
                "Port {}/{} has already a filter applied on router \"{}\"",
                slot, port, name
            )));
        }
        create_capture_file(output_file).await?;
        nio.start_packet_capture(&hypervisor, output_file, data_link_type).await?;
        info!("Router \"{}\": capture started on port {}/{}", name, slot, port);
        Ok(())
    }

    /// Stop the capture on a port. Does nothing if no capture runs.
    pub async fn stop_capture(&mut self, slot: usize, port: u32) -> Result<()> {
        let hypervisor = Arc::clone(&self.hypervisor);
        if let Some(nio) = self.port_adapter_mut(slot, port)?.get_nio_mut(port) {
            if nio.is_capturing() {
                nio.stop_packet_capture(&hypervisor).await?;
            }
        }
        Ok(())
    }

    /// Delete the router from the hypervisor. All NIOs bound to its ports are deleted as well, and
    /// returned. The hypervisor is stopped if no other device uses it. Failures are logged only.
    pub async fn delete(&mut self) -> Vec<Nio> {
        if let Err(e) = self.stop().await {
            warn!("Could not stop router \"{}\": {}", self.name, e);
        }

        let mut nios = Vec::new();
        for adapter in self.slots.iter_mut().flatten() {
            let ports: Vec<u32> = adapter.ports().collect();
            for port in ports {
                if let Some(mut nio) = adapter.remove_nio(port) {
                    if let Err(e) = nio.delete(&self.hypervisor).await {
                        warn!("Could not delete NIO {}: {}", nio, e);
                    }
                    nios.push(nio);
                }
            }
        }

        if let Err(e) = self.send(format!("vm delete \"{}\"", self.name)).await {
            warn!("Could not delete router \"{}\": {}", self.name, e);
        }
        info!("router \"{}\" [{}] has been deleted", self.name, self.id);

        if self.auto_delete_disks {
            self.delete_disks().await;
        }

        if self.hypervisor.unregister_device(self.id) == 0 {
            self.hypervisor.stop().await;
        }
        nios
    }

    /// Delete a ghost router, including all files the hypervisor created for it.
    pub async fn clean_delete(&mut self) -> Result<()> {
        let result = self.send(format!("vm clean_delete \"{}\"", self.name)).await;
        self.hypervisor.unregister_device(self.id);
        result?;
        debug!("router \"{}\" has been deleted (including associated files)", self.name);
        Ok(())
    }

    async fn delete_disks(&self) {
        for disk in &["disk0", "disk1"] {
            let path = self
                .working_dir()
                .join(format!("{}_i{}_{}", self.platform, self.dynamips_id, disk));
            if path.exists() {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("Could not delete {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Public state of the router
    pub fn info(&self) -> RouterInfo {
        RouterInfo {
            node_id: self.id,
            project_id: self.project.id,
            name: self.name.clone(),
            dynamips_id: self.dynamips_id,
            platform: self.platform,
            chassis: self.chassis.clone(),
            image: self.image.clone(),
            status: self.status,
            ram: self.ram,
            nvram: self.nvram,
            disk0: self.disk0,
            disk1: self.disk1,
            mmap: self.mmap,
            sparsemem: self.sparsemem,
            clock_divisor: self.clock_divisor,
            exec_area: self.exec_area,
            iomem: self.iomem,
            idlepc: self.idlepc.clone(),
            idlemax: self.idlemax,
            idlesleep: self.idlesleep,
            npe: self.npe.clone(),
            midplane: self.midplane.clone(),
            mac_addr: self.mac_addr.clone(),
            system_id: self.system_id.clone(),
            console: self.console,
            aux: self.aux,
            ghost_file: self.ghost_file.clone(),
            ghost_status: self.ghost_status,
            auto_delete_disks: self.auto_delete_disks,
            slots: self.slots.iter().map(|a| a.as_ref().map(|a| a.kind())).collect(),
            wics: self.adapter(0).map(|a| a.wics().to_vec()).unwrap_or_default(),
        }
    }
}

fn check_c7200_option(what: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.iter().any(|x| *x == value) {
        Ok(())
    } else {
        Err(Error::Precondition(format!("Unknown {} {} for platform c7200", what, value)))
    }
}

/// Check that the image exists and starts with the ELF header of an IOS image.
pub async fn check_ios_image(image: &Path) -> Result<()> {
    let mut file = tokio::fs::File::open(image).await.map_err(|e| {
        Error::io(format!("IOS image \"{}\" is not accessible", image.display()), e)
    })?;
    let mut header = [0u8; 7];
    match file.read_exact(&mut header).await {
        Ok(_) if &header == IOS_MAGIC => Ok(()),
        _ => Err(Error::InvalidImage(image.to_path_buf())),
    }
}

/// Check that the host has at least `ram` MB of memory available. Hosts without
/// `/proc/meminfo` are not checked.
fn check_available_ram(name: &str, ram: u32) -> Result<()> {
    let available = match host_available_ram() {
        Some(available) => available,
        None => {
            debug!("Cannot determine the available memory of the host");
            return Ok(());
        }
    };
    if u64::from(ram) > available {
        return Err(Error::Precondition(format!(
            "\"{}\" requires {}MB of RAM to run but there is only {}MB left",
            name, ram, available
        )));
    }
    Ok(())
}

/// Available memory in MB
fn host_available_ram() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    meminfo
        .lines()
        .find(|l| l.starts_with("MemAvailable:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb / 1024)
}
