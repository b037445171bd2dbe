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

//! # Hypervisor
//!
//! A [`Hypervisor`] is a connected Dynamips process, together with the list of devices it hosts.
//! The [`ProcessSupervisor`] spawns new processes, and hands out connected hypervisors.

use crate::config::DynamipsConfig;
use crate::protocol::ProtocolClient;
use crate::{Error, Result, Version};

use log::*;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Oldest supported Dynamips version
pub const MINIMUM_VERSION: &str = "0.2.11";

/// # Hypervisor
///
/// Handle of a single Dynamips hypervisor. Devices keep a shared reference to the hypervisor they
/// live on, and register themselves in its device list. Once the list is empty, the hypervisor can
/// be stopped.
#[derive(Debug)]
pub struct Hypervisor {
    id: u32,
    client: ProtocolClient,
    working_dir: PathBuf,
    version: String,
    stop_timeout: Duration,
    stdout_file: Option<PathBuf>,
    process: Mutex<Option<Child>>,
    devices: std::sync::Mutex<Vec<Uuid>>,
}

impl Hypervisor {
    /// Connect to an already running hypervisor, check its version and set its working directory.
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        working_dir: impl Into<PathBuf>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut hypervisor = Self {
            id: 0,
            client: ProtocolClient::new(host, port),
            working_dir: working_dir.into(),
            version: String::new(),
            stop_timeout: Duration::from_secs(3),
            stdout_file: None,
            process: Mutex::new(None),
            devices: std::sync::Mutex::new(Vec::new()),
        };
        if let Err(e) = hypervisor.handshake(connect_timeout).await {
            hypervisor.client.close().await;
            return Err(e);
        }
        Ok(hypervisor)
    }

    /// Connect, read the version and set the working directory.
    async fn handshake(&mut self, connect_timeout: Duration) -> Result<()> {
        self.client.connect(connect_timeout).await?;

        let reply = self.client.send("hypervisor version").await?;
        self.version = reply
            .first()
            .and_then(|v| v.split('-').next())
            .unwrap_or_default()
            .to_string();
        info!(
            "Connected to Dynamips hypervisor on {}:{} with version {}",
            self.host(),
            self.port(),
            self.version
        );
        if Version::parse(&self.version) < Version::parse(MINIMUM_VERSION) {
            return Err(Error::UnsupportedVersion {
                found: self.version.clone(),
                required: MINIMUM_VERSION.to_string(),
            });
        }

        self.client
            .send(format!("hypervisor working_dir \"{}\"", self.working_dir.display()))
            .await?;
        Ok(())
    }

    /// Instance number of the hypervisor (0 if not spawned by a [`ProcessSupervisor`])
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Host of the hypervisor
    pub fn host(&self) -> &str {
        self.client.host()
    }

    /// Port of the hypervisor
    pub fn port(&self) -> u16 {
        self.client.port()
    }

    /// Version reported by the hypervisor
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns true if the hypervisor version is at least `version`
    pub fn version_at_least(&self, version: &str) -> bool {
        Version::parse(&self.version) >= Version::parse(version)
    }

    /// Working directory of the hypervisor
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Send a command to the hypervisor
    pub async fn send(&self, command: impl AsRef<str>) -> Result<Vec<String>> {
        self.client.send(command).await
    }

    /// Register a device on the hypervisor
    pub fn register_device(&self, device: Uuid) {
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        if !devices.contains(&device) {
            devices.push(device);
        }
    }

    /// Remove a device from the hypervisor. Returns the number of remaining devices.
    pub fn unregister_device(&self, device: Uuid) -> usize {
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        devices.retain(|d| *d != device);
        devices.len()
    }

    /// List of all devices registered on the hypervisor
    pub fn devices(&self) -> Vec<Uuid> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Returns true if no device is registered on the hypervisor
    pub fn is_empty(&self) -> bool {
        self.devices.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// Returns true if the hypervisor process is still alive. A hypervisor that was not spawned
    /// by us is alive as long as we are connected to it.
    pub async fn is_running(&self) -> bool {
        match self.process.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => self.client.is_connected().await,
        }
    }

    /// Reset the hypervisor, removing all devices it hosts.
    pub async fn reset(&self) -> Result<()> {
        self.send("hypervisor reset").await?;
        self.devices.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }

    /// Close the control connection, keeping the hypervisor running.
    pub async fn close(&self) {
        if self.client.is_connected().await {
            if let Err(e) = self.send("hypervisor close").await {
                debug!("Could not close the connection gracefully: {}", e);
            }
            self.client.close().await;
        }
    }

    /// Read the output of the hypervisor process.
    pub async fn read_stdout(&self) -> String {
        match self.stdout_file.as_ref() {
            Some(path) => match tokio::fs::read(path).await {
                Ok(content) => String::from_utf8_lossy(&content).into_owned(),
                Err(e) => {
                    warn!("Could not read {}: {}", path.display(), e);
                    String::new()
                }
            },
            None => String::new(),
        }
    }

    /// Stop the hypervisor. First, ask it to stop gracefully, and kill it if it is still running
    /// after the stop timeout. Finally, remove the file with the process output.
    pub async fn stop(&self) {
        let mut process = self.process.lock().await;
        let running = match process.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };

        if self.client.is_connected().await {
            if let Err(e) = self.send("hypervisor stop").await {
                debug!("Hypervisor {}:{} did not acknowledge the stop: {}", self.host(), self.port(), e);
            }
            self.client.close().await;
        }

        if let Some(mut child) = process.take() {
            if running {
                sleep(Duration::from_millis(10)).await;
                let pid = child.id().unwrap_or_default();
                match timeout(self.stop_timeout, child.wait()).await {
                    Ok(Ok(status)) => info!("Dynamips process {} has stopped ({})", pid, status),
                    Ok(Err(e)) => warn!("Cannot wait for Dynamips process {}: {}", pid, e),
                    Err(_) => {
                        warn!("Dynamips process {} is still running... killing it", pid);
                        if let Err(e) = child.kill().await {
                            error!("Cannot stop the Dynamips process {}: {}", pid, e);
                        }
                    }
                }
            }

            if let Some(path) = self.stdout_file.as_ref() {
                if path.exists() {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        warn!("Could not delete {}: {}", path.display(), e);
                    }
                }
            }
        }
    }
}

/// # Process Supervisor
///
/// Spawns new hypervisor processes. Every process gets its own instance number, which is used in
/// the names of its log and output files.
#[derive(Debug)]
pub struct ProcessSupervisor {
    dynamips_path: PathBuf,
    host: String,
    console_host: String,
    connect_timeout: Duration,
    stop_timeout: Duration,
    instance_count: AtomicU32,
}

impl ProcessSupervisor {
    /// Create a new supervisor from the configuration
    pub fn new(config: &DynamipsConfig) -> Self {
        Self {
            dynamips_path: config.dynamips_path.clone(),
            host: config.host.clone(),
            console_host: config.console_host.clone(),
            connect_timeout: config.connect_timeout(),
            stop_timeout: config.stop_timeout(),
            instance_count: AtomicU32::new(0),
        }
    }

    /// Build the arguments for the process with instance number `id`, listening on `port`.
    pub fn build_command(&self, id: u32, port: u16) -> Vec<String> {
        let mut args = vec![
            String::from("-N1"),
            String::from("-l"),
            format!("dynamips_i{}_log.txt", id),
            String::from("-H"),
        ];
        if self.console_host != "0.0.0.0" && self.console_host != "::" {
            args.push(format!("{}:{}", self.host, port));
            args.push(String::from("--console-binding-addr"));
            args.push(self.console_host.clone());
        } else {
            args.push(port.to_string());
        }
        args
    }

    /// Spawn a new hypervisor inside `working_dir`, and connect to it.
    pub async fn start(&self, working_dir: &Path) -> Result<Hypervisor> {
        let port = self.find_free_port()?;
        let id = self.instance_count.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::fs::create_dir_all(working_dir).await.map_err(|e| {
            Error::io(format!("Cannot create the working directory {}", working_dir.display()), e)
        })?;

        let stdout_file = working_dir.join(format!("dynamips_i{}_stdout.txt", id));
        let stdout = std::fs::File::create(&stdout_file)
            .map_err(|e| Error::io(format!("Cannot create {}", stdout_file.display()), e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| Error::io(format!("Cannot create {}", stdout_file.display()), e))?;

        let args = self.build_command(id, port);
        info!("Starting Dynamips: {} {}", self.dynamips_path.display(), args.join(" "));
        let child = Command::new(&self.dynamips_path)
            .args(&args)
            .current_dir(working_dir)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(Error::Spawn)?;
        info!("Dynamips process started with PID {}", child.id().unwrap_or_default());

        let mut hypervisor = Hypervisor {
            id,
            client: ProtocolClient::new(self.host.clone(), port),
            working_dir: working_dir.to_path_buf(),
            version: String::new(),
            stop_timeout: self.stop_timeout,
            stdout_file: Some(stdout_file),
            process: Mutex::new(Some(child)),
            devices: std::sync::Mutex::new(Vec::new()),
        };

        if let Err(e) = hypervisor.handshake(self.connect_timeout).await {
            error!("Could not start Dynamips: {}\n{}", e, hypervisor.read_stdout().await);
            hypervisor.stop().await;
            return Err(e);
        }
        Ok(hypervisor)
    }

    /// Stop the hypervisor
    pub async fn stop(&self, hypervisor: &Hypervisor) {
        hypervisor.stop().await
    }

    /// Ask the OS for a free port on the host
    fn find_free_port(&self) -> Result<u16> {
        let listener = TcpListener::bind((self.host.as_str(), 0))
            .map_err(|e| Error::io(format!("Cannot find a free port on {}", self.host), e))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::io(format!("Cannot find a free port on {}", self.host), e))?
            .port();
        Ok(port)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_line() {
        let mut config = DynamipsConfig::default();
        config.host = String::from("127.0.0.1");
        config.console_host = String::from("127.0.0.1");
        let supervisor = ProcessSupervisor::new(&config);
        assert_eq!(
            supervisor.build_command(1, 7200),
            vec![
                "-N1",
                "-l",
                "dynamips_i1_log.txt",
                "-H",
                "127.0.0.1:7200",
                "--console-binding-addr",
                "127.0.0.1"
            ]
        );

        config.console_host = String::from("0.0.0.0");
        let supervisor = ProcessSupervisor::new(&config);
        assert_eq!(
            supervisor.build_command(3, 7201),
            vec!["-N1", "-l", "dynamips_i3_log.txt", "-H", "7201"]
        );
    }

    #[tokio::test]
    async fn missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DynamipsConfig::default();
        config.dynamips_path = dir.path().join("no-such-dynamips");
        let supervisor = ProcessSupervisor::new(&config);
        assert!(matches!(supervisor.start(dir.path()).await, Err(Error::Spawn(_))));
    }
}
