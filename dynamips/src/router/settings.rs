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

//! # Router Settings
//!
//! Every setting is sent to the hypervisor first, and only stored on the router once the
//! hypervisor acknowledged it.

use super::configs::MemoryWatcher;
use super::{check_c7200_option, Router};
use crate::adapters::{AdapterKind, WicKind};
use crate::platform::{Platform, C7200_MIDPLANES, C7200_NPES};
use crate::{Error, Result};

use lazy_static::lazy_static;
use log::*;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

lazy_static! {
    static ref HOSTNAME: Regex = Regex::new(r"(?m)^hostname .+$").unwrap();
}

/// A single router setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "setting", content = "value", rename_all = "snake_case")]
pub enum RouterSetting {
    /// Rename the router
    Name(String),
    /// IOS image
    Image(PathBuf),
    /// RAM in MB
    Ram(u32),
    /// NVRAM in KB
    Nvram(u32),
    /// Size of disk0 in MB
    Disk0(u32),
    /// Size of disk1 in MB
    Disk1(u32),
    /// Use mmap for the RAM
    Mmap(bool),
    /// Use sparse memory
    Sparsemem(bool),
    /// Clock divisor
    ClockDivisor(u32),
    /// Exec area in MB
    ExecArea(u32),
    /// I/O memory in percent
    Iomem(u32),
    /// Idle-PC value
    Idlepc(String),
    /// Idle max
    Idlemax(u32),
    /// Idle sleep time in ms
    Idlesleep(u32),
    /// Base MAC address
    MacAddr(String),
    /// System ID
    SystemId(String),
    /// Processor engine (c7200 only)
    Npe(String),
    /// Midplane (c7200 only)
    Midplane(String),
    /// Console port
    Console(u16),
    /// AUX port
    Aux(u16),
    /// Delete the disks when deleting the router
    AutoDeleteDisks(bool),
    /// Adapter in a slot (`None` removes the adapter)
    Slot {
        /// Slot number
        slot: usize,
        /// Adapter
        adapter: Option<AdapterKind>,
    },
    /// WIC in a sub-slot of slot 0 (`None` removes the WIC)
    Wic {
        /// WIC sub-slot
        wic_slot: usize,
        /// WIC
        wic: Option<WicKind>,
    },
    /// Content of the startup config
    StartupConfigContent(String),
    /// Content of the private config
    PrivateConfigContent(String),
}

impl Router {
    /// Apply a single setting. Settings equal to the current value are skipped.
    pub async fn apply_setting(&mut self, setting: RouterSetting) -> Result<()> {
        match setting {
            RouterSetting::Name(name) => self.set_name(name).await,
            RouterSetting::Image(image) => self.set_image(image).await,
            RouterSetting::Ram(ram) => self.set_ram(ram).await,
            RouterSetting::Nvram(nvram) => self.set_nvram(nvram).await,
            RouterSetting::Disk0(size) => self.set_disk0(size).await,
            RouterSetting::Disk1(size) => self.set_disk1(size).await,
            RouterSetting::Mmap(mmap) => self.set_mmap(mmap).await,
            RouterSetting::Sparsemem(sparsemem) => self.set_sparsemem(sparsemem).await,
            RouterSetting::ClockDivisor(divisor) => self.set_clock_divisor(divisor).await,
            RouterSetting::ExecArea(exec_area) => self.set_exec_area(exec_area).await,
            RouterSetting::Iomem(iomem) => self.set_iomem(iomem).await,
            RouterSetting::Idlepc(idlepc) => self.set_idlepc(&idlepc).await,
            RouterSetting::Idlemax(idlemax) => self.set_idlemax(idlemax).await,
            RouterSetting::Idlesleep(idlesleep) => self.set_idlesleep(idlesleep).await,
            RouterSetting::MacAddr(mac) => self.set_mac_addr(mac).await,
            RouterSetting::SystemId(system_id) => self.set_system_id(system_id).await,
            RouterSetting::Npe(npe) => self.set_npe(npe).await,
            RouterSetting::Midplane(midplane) => self.set_midplane(midplane).await,
            RouterSetting::Console(port) => self.set_console(port).await,
            RouterSetting::Aux(port) => self.set_aux(port).await,
            RouterSetting::AutoDeleteDisks(auto) => {
                self.auto_delete_disks = auto;
                Ok(())
            }
            RouterSetting::Slot { slot, adapter } => {
                let current = self.adapter(slot).map(|a| a.kind());
                if current == adapter {
                    return Ok(());
                }
                if current.is_some() {
                    self.slot_remove_binding(slot).await?;
                }
                match adapter {
                    Some(adapter) => self.slot_add_binding(slot, adapter).await,
                    None => Ok(()),
                }
            }
            RouterSetting::Wic { wic_slot, wic } => {
                let current = self.adapter(0).and_then(|a| a.wics().get(wic_slot).copied().flatten());
                if current == wic {
                    return Ok(());
                }
                if current.is_some() {
                    self.uninstall_wic(wic_slot).await?;
                }
                match wic {
                    Some(wic) => self.install_wic(wic_slot, wic).await,
                    None => Ok(()),
                }
            }
            RouterSetting::StartupConfigContent(content) => self.set_configs(Some(&content), None).await,
            RouterSetting::PrivateConfigContent(content) => self.set_configs(None, Some(&content)).await,
        }
    }

    /// Rename the router. The hostname in the startup config is updated as well.
    pub async fn set_name(&mut self, new_name: impl Into<String>) -> Result<()> {
        let new_name = new_name.into();
        if new_name == self.name {
            return Ok(());
        }

        self.send(format!("vm rename \"{}\" \"{}\"", self.name, new_name)).await?;
        rewrite_hostname(&self.startup_config_path(), &new_name).await?;
        info!("Router \"{}\" [{}]: renamed to \"{}\"", self.name, self.id, new_name);
        self.name = new_name;

        // the watcher saves under the old name
        if let Some(watcher) = self.watcher.take() {
            watcher.stop().await;
            self.watcher = Some(MemoryWatcher::spawn(
                self.config_saver(),
                self.memory_files(),
                self.options.memory_watch_interval,
            ));
        }
        Ok(())
    }

    /// Make the hostname in the startup config match the router name
    pub async fn refresh_hostname(&self) -> Result<()> {
        rewrite_hostname(&self.startup_config_path(), &self.name).await
    }

    /// Set the IOS image
    pub async fn set_image(&mut self, image: impl AsRef<Path>) -> Result<()> {
        let image = image.as_ref();
        if image == self.image {
            return Ok(());
        }
        self.send(format!("vm set_ios \"{}\" \"{}\"", self.name, image.display())).await?;
        info!("Router \"{}\": image set to {}", self.name, image.display());
        self.image = image.to_path_buf();
        Ok(())
    }

    /// Set the RAM in MB
    pub async fn set_ram(&mut self, ram: u32) -> Result<()> {
        if ram == self.ram {
            return Ok(());
        }
        self.send(format!("vm set_ram \"{}\" {}", self.name, ram)).await?;
        info!("Router \"{}\": RAM updated from {}MB to {}MB", self.name, self.ram, ram);
        self.ram = ram;
        Ok(())
    }

    /// Set the NVRAM in KB
    pub async fn set_nvram(&mut self, nvram: u32) -> Result<()> {
        if nvram == self.nvram {
            return Ok(());
        }
        self.send(format!("vm set_nvram \"{}\" {}", self.name, nvram)).await?;
        info!("Router \"{}\": NVRAM updated from {}KB to {}KB", self.name, self.nvram, nvram);
        self.nvram = nvram;
        Ok(())
    }

    /// Set the size of disk0 in MB
    pub async fn set_disk0(&mut self, size: u32) -> Result<()> {
        if size == self.disk0 {
            return Ok(());
        }
        self.send(format!("vm set_disk0 \"{}\" {}", self.name, size)).await?;
        self.disk0 = size;
        Ok(())
    }

    /// Set the size of disk1 in MB
    pub async fn set_disk1(&mut self, size: u32) -> Result<()> {
        if size == self.disk1 {
            return Ok(());
        }
        self.send(format!("vm set_disk1 \"{}\" {}", self.name, size)).await?;
        self.disk1 = size;
        Ok(())
    }

    /// Enable or disable mmap
    pub async fn set_mmap(&mut self, mmap: bool) -> Result<()> {
        if mmap == self.mmap {
            return Ok(());
        }
        self.send(format!("vm set_ram_mmap \"{}\" {}", self.name, mmap as u8)).await?;
        info!("Router \"{}\": mmap {}", self.name, if mmap { "enabled" } else { "disabled" });
        self.mmap = mmap;
        Ok(())
    }

    /// Enable or disable sparse memory
    pub async fn set_sparsemem(&mut self, sparsemem: bool) -> Result<()> {
        if sparsemem == self.sparsemem {
            return Ok(());
        }
        self.send(format!("vm set_sparse_mem \"{}\" {}", self.name, sparsemem as u8)).await?;
        self.sparsemem = sparsemem;
        Ok(())
    }

    /// Set the clock divisor
    pub async fn set_clock_divisor(&mut self, divisor: u32) -> Result<()> {
        if divisor == self.clock_divisor {
            return Ok(());
        }
        self.send(format!("vm set_clock_divisor \"{}\" {}", self.name, divisor)).await?;
        self.clock_divisor = divisor;
        Ok(())
    }

    /// Set the exec area in MB
    pub async fn set_exec_area(&mut self, exec_area: u32) -> Result<()> {
        if Some(exec_area) == self.exec_area {
            return Ok(());
        }
        self.send(format!("vm set_exec_area \"{}\" {}", self.name, exec_area)).await?;
        self.exec_area = Some(exec_area);
        Ok(())
    }

    /// Set the I/O memory in percent of the RAM
    pub async fn set_iomem(&mut self, iomem: u32) -> Result<()> {
        if self.profile().iomem.is_none() {
            return Err(Error::Precondition(format!(
                "I/O memory cannot be set on platform {}",
                self.platform
            )));
        }
        if Some(iomem) == self.iomem {
            return Ok(());
        }
        self.send(format!("{} set_iomem \"{}\" {}", self.platform, self.name, iomem)).await?;
        self.iomem = Some(iomem);
        Ok(())
    }

    /// Set the idle-PC value. A running router is updated online.
    pub async fn set_idlepc(&mut self, idlepc: &str) -> Result<()> {
        if self.is_running().await? {
            self.send(format!("vm set_idle_pc_online \"{}\" 0 {}", self.name, idlepc)).await?;
        } else {
            self.send(format!("vm set_idle_pc \"{}\" {}", self.name, idlepc)).await?;
        }
        info!("Router \"{}\": idle-PC set to {}", self.name, idlepc);
        self.idlepc = idlepc.to_string();
        Ok(())
    }

    /// Set the idle max value
    pub async fn set_idlemax(&mut self, idlemax: u32) -> Result<()> {
        if idlemax == self.idlemax {
            return Ok(());
        }
        self.send(format!("vm set_idle_max \"{}\" 0 {}", self.name, idlemax)).await?;
        self.idlemax = idlemax;
        Ok(())
    }

    /// Set the idle sleep time in ms
    pub async fn set_idlesleep(&mut self, idlesleep: u32) -> Result<()> {
        if idlesleep == self.idlesleep {
            return Ok(());
        }
        self.send(format!("vm set_idle_sleep_time \"{}\" 0 {}", self.name, idlesleep)).await?;
        self.idlesleep = idlesleep;
        Ok(())
    }

    /// Set the ghost file
    pub async fn set_ghost_file(&mut self, ghost_file: impl AsRef<Path>) -> Result<()> {
        let ghost_file = ghost_file.as_ref();
        self.send(format!("vm set_ghost_file \"{}\" \"{}\"", self.name, ghost_file.display()))
            .await?;
        debug!("Router \"{}\": ghost file set to {}", self.name, ghost_file.display());
        self.ghost_file = Some(ghost_file.to_path_buf());
        Ok(())
    }

    /// Set the ghost status (0: none, 1: create the ghost file, 2: use the ghost file)
    pub async fn set_ghost_status(&mut self, status: u8) -> Result<()> {
        self.send(format!("vm set_ghost_status \"{}\" {}", self.name, status)).await?;
        self.ghost_status = status;
        Ok(())
    }

    /// Set the base MAC address
    pub async fn set_mac_addr(&mut self, mac: impl Into<String>) -> Result<()> {
        let mac = mac.into();
        if Some(&mac) == self.mac_addr.as_ref() {
            return Ok(());
        }
        self.send(format!("{} set_mac_addr \"{}\" {}", self.platform, self.name, mac)).await?;
        info!("Router \"{}\": MAC address set to {}", self.name, mac);
        self.mac_addr = Some(mac);
        Ok(())
    }

    /// Set the system ID
    pub async fn set_system_id(&mut self, system_id: impl Into<String>) -> Result<()> {
        let system_id = system_id.into();
        if Some(&system_id) == self.system_id.as_ref() {
            return Ok(());
        }
        self.send(format!("{} set_system_id \"{}\" {}", self.platform, self.name, system_id))
            .await?;
        self.system_id = Some(system_id);
        Ok(())
    }

    /// Set the processor engine. The router must be stopped.
    pub async fn set_npe(&mut self, npe: impl Into<String>) -> Result<()> {
        let npe = npe.into();
        self.require_c7200()?;
        check_c7200_option("NPE", &npe, C7200_NPES)?;
        if Some(&npe) == self.npe.as_ref() {
            return Ok(());
        }
        if self.is_running().await? {
            return Err(Error::Precondition(format!(
                "Cannot change the NPE on running router \"{}\"",
                self.name
            )));
        }
        self.send(format!("c7200 set_npe \"{}\" {}", self.name, npe)).await?;
        info!("Router \"{}\": NPE set to {}", self.name, npe);
        self.npe = Some(npe);
        Ok(())
    }

    /// Set the midplane
    pub async fn set_midplane(&mut self, midplane: impl Into<String>) -> Result<()> {
        let midplane = midplane.into();
        self.require_c7200()?;
        check_c7200_option("midplane", &midplane, C7200_MIDPLANES)?;
        if Some(&midplane) == self.midplane.as_ref() {
            return Ok(());
        }
        self.send(format!("c7200 set_midplane \"{}\" {}", self.name, midplane)).await?;
        self.midplane = Some(midplane);
        Ok(())
    }

    fn require_c7200(&self) -> Result<()> {
        if self.platform != Platform::C7200 {
            return Err(Error::Precondition(format!(
                "Router \"{}\" is a {}, only c7200 routers have an NPE and a midplane",
                self.name, self.platform
            )));
        }
        Ok(())
    }

    /// Set the console port. The port must already be reserved.
    pub async fn set_console(&mut self, port: u16) -> Result<()> {
        if Some(port) == self.console {
            return Ok(());
        }
        self.send(format!("vm set_con_tcp_port \"{}\" {}", self.name, port)).await?;
        self.console = Some(port);
        Ok(())
    }

    /// Set the AUX port. The port must already be reserved.
    pub async fn set_aux(&mut self, port: u16) -> Result<()> {
        if Some(port) == self.aux {
            return Ok(());
        }
        self.send(format!("vm set_aux_tcp_port \"{}\" {}", self.name, port)).await?;
        self.aux = Some(port);
        Ok(())
    }
}

/// Replace every `hostname` line of the config file. A missing file is left alone.
async fn rewrite_hostname(startup: &Path, name: &str) -> Result<()> {
    if !startup.exists() {
        return Ok(());
    }
    let content = tokio::fs::read_to_string(startup)
        .await
        .map_err(|e| Error::io(format!("Cannot read {}", startup.display()), e))?;
    let replacement = format!("hostname {}", name);
    let content = HOSTNAME.replace_all(&content, NoExpand(&replacement));
    tokio::fs::write(startup, content.as_bytes())
        .await
        .map_err(|e| Error::io(format!("Cannot write {}", startup.display()), e))
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn hostname_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i1_startup-config.cfg");
        std::fs::write(&path, "!\nhostname R1\ninterface f0/0\n").unwrap();
        rewrite_hostname(&path, "R$2").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "!\nhostname R$2\ninterface f0/0\n");
        rewrite_hostname(&dir.path().join("missing.cfg"), "R2").await.unwrap();
    }

    #[test]
    fn setting_json() {
        let setting: RouterSetting = serde_json::from_str(r#"{"setting": "ram", "value": 256}"#).unwrap();
        assert_eq!(setting, RouterSetting::Ram(256));
    }
}
