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

//! # Router Configuration Files
//!
//! The startup and private configuration of a router live in the `configs` directory of the
//! module working directory. While the router runs, the configuration is stored in its NVRAM, and
//! extracted again with `vm extract_config`.

use crate::hypervisor::Hypervisor;
use crate::{Error, Result};

use base64::Engine;
use log::*;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Private config that dynamips returns when none was ever written
const EMPTY_PRIVATE_CONFIG: &str = "\nkerberos password \nend\n";

/// Startup config, relative to the working directory
pub fn startup_config_relative(dynamips_id: u32) -> PathBuf {
    Path::new("configs").join(format!("i{}_startup-config.cfg", dynamips_id))
}

/// Private config, relative to the working directory
pub fn private_config_relative(dynamips_id: u32) -> PathBuf {
    Path::new("configs").join(format!("i{}_private-config.cfg", dynamips_id))
}

/// Bring a config into the form stored on disk: carriage returns removed, and starting with a
/// `!` line.
pub fn normalize_config(content: &str) -> String {
    let content = content.replace('\r', "");
    if content.starts_with('!') {
        content
    } else {
        format!("!\n{}", content)
    }
}

/// Write a configuration file as it is.
pub async fn write_config(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(format!("Cannot create {}", parent.display()), e))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| Error::io(format!("Cannot write config file {}", path.display()), e))
}

/// Write a config given by the user. The config is normalized, and `%h` is replaced by the router
/// name.
pub async fn write_config_template(path: &Path, content: &str, name: &str) -> Result<()> {
    write_config(path, &normalize_config(content).replace("%h", name)).await
}

/// # Config Saver
///
/// Everything needed to pull the configuration out of a router and store it on disk. The saver
/// is cloned into the memory watcher, which runs detached from the router.
#[derive(Debug, Clone)]
pub(crate) struct ConfigSaver {
    pub hypervisor: Arc<Hypervisor>,
    pub name: String,
    pub working_dir: PathBuf,
    pub dynamips_id: u32,
}

impl ConfigSaver {
    /// Extract the startup and private configuration from NVRAM. The configs are returned with
    /// carriage returns removed. `None` means the router had nothing stored.
    pub async fn extract(&self) -> Result<(Option<String>, Option<String>)> {
        let reply = self.hypervisor.send(format!("vm extract_config \"{}\"", self.name)).await?;
        let line = match reply.first() {
            Some(line) => line,
            None => return Ok((None, None)),
        };
        let mut parts = line.rsplitn(3, ' ');
        let private = parts.next().map(decode_config).transpose()?.flatten();
        let startup = parts.next().map(decode_config).transpose()?.flatten();
        Ok((startup, private))
    }

    /// Extract the configuration and write it to the config files.
    pub async fn save(&self) -> Result<()> {
        let (startup, private) = self.extract().await?;
        if let Some(startup) = startup {
            let path = self.working_dir.join(startup_config_relative(self.dynamips_id));
            write_config(&path, &normalize_config(&startup)).await?;
            info!("saved startup-config of \"{}\" to {}", self.name, path.display());
        }
        if let Some(private) = private {
            if private != EMPTY_PRIVATE_CONFIG {
                let path = self.working_dir.join(private_config_relative(self.dynamips_id));
                write_config(&path, &normalize_config(&private)).await?;
                info!("saved private-config of \"{}\" to {}", self.name, path.display());
            }
        }
        Ok(())
    }
}

/// Decode a quoted base64 blob. An empty blob means no config.
fn decode_config(blob: &str) -> Result<Option<String>> {
    let blob = blob.trim().trim_matches('\'');
    if blob.is_empty() {
        return Ok(None);
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(blob).map_err(|e| {
        Error::Precondition(format!("Cannot decode the configuration returned by dynamips: {}", e))
    })?;
    Ok(Some(String::from_utf8_lossy(&bytes).replace('\r', "")))
}

/// # Memory Watcher
///
/// Background task that polls the NVRAM and ROM files of a running router, and saves the
/// configuration whenever they change.
#[derive(Debug)]
pub(crate) struct MemoryWatcher {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MemoryWatcher {
    /// Spawn the watcher
    pub fn spawn(saver: ConfigSaver, files: Vec<PathBuf>, interval: Duration) -> Self {
        let (cancel, mut cancelled) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut last = fingerprint(&files).await;
            loop {
                tokio::select! {
                    _ = cancelled.changed() => break,
                    _ = sleep(interval) => {
                        let current = fingerprint(&files).await;
                        if current != last {
                            last = current;
                            debug!("memory of \"{}\" has changed, saving the configs", saver.name);
                            if let Err(e) = saver.save().await {
                                warn!("Could not save the configs of \"{}\": {}", saver.name, e);
                            }
                        }
                    }
                }
            }
        });
        Self { cancel, handle }
    }

    /// Stop the watcher, and wait until it has exited
    pub async fn stop(self) {
        // the receiver is gone if the task already exited
        let _ = self.cancel.send(true);
        if let Err(e) = self.handle.await {
            warn!("Memory watcher failed: {}", e);
        }
    }
}

/// Size and modification time of every file
async fn fingerprint(files: &[PathBuf]) -> Vec<Option<(u64, SystemTime)>> {
    let mut result = Vec::with_capacity(files.len());
    for file in files {
        let entry = match tokio::fs::metadata(file).await {
            Ok(meta) => meta.modified().ok().map(|t| (meta.len(), t)),
            Err(_) => None,
        };
        result.push(entry);
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn relative_paths() {
        assert_eq!(startup_config_relative(3), PathBuf::from("configs/i3_startup-config.cfg"));
        assert_eq!(private_config_relative(3), PathBuf::from("configs/i3_private-config.cfg"));
    }

    #[test]
    fn decode() {
        assert_eq!(decode_config("''").unwrap(), None);
        assert_eq!(decode_config("'aG9zdG5hbWUgUjENCg=='").unwrap(), Some(String::from("hostname R1\n")));
        assert!(decode_config("'not base64!'").is_err());
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_config("hostname R1\r\n"), "!\nhostname R1\n");
        assert_eq!(normalize_config("!\nhostname R1\n"), "!\nhostname R1\n");
        assert_eq!(normalize_config(""), "!\n");
    }

    #[tokio::test]
    async fn template_replaces_hostname() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs").join("i1_startup-config.cfg");
        write_config_template(&path, "hostname %h\r\n", "R1").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "!\nhostname R1\n");

        write_config(&path, "!\nbanner motd %h\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "!\nbanner motd %h\n");
    }
}
