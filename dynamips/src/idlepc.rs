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

//! # Idle-PC Calibration
//!
//! An emulated router burns a full host CPU unless dynamips knows the program counter of the IOS
//! idle loop. Dynamips proposes candidate values, and the calibrator tries them one after the
//! other until the CPU usage of the router drops.

use crate::config::DynamipsConfig;
use crate::router::Router;
use crate::{Error, Result};

use itertools::Itertools;
use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use tokio::time::{sleep, Instant};

use std::time::Duration;

/// CPU usage (in percent) below which an idle-PC value is accepted
pub const ACCEPTED_CPU_USAGE: f64 = 70.0;

lazy_static! {
    static ref IDLEPC_RE: Regex = Regex::new(r"^0x[0-9a-f]{8}$").unwrap();
}

/// # Idle-PC Calibrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePcCalibrator {
    boot_delay: Duration,
    probe_interval: Duration,
}

impl IdlePcCalibrator {
    /// Create a calibrator. `boot_delay` is the time a router gets to boot before asking for
    /// proposals, and `probe_interval` is the duration of a single CPU measurement.
    pub fn new(boot_delay: Duration, probe_interval: Duration) -> Self {
        Self { boot_delay, probe_interval }
    }

    /// Take the delays from the configuration
    pub fn from_config(config: &DynamipsConfig) -> Self {
        Self::new(config.idlepc_boot_delay(), config.idlepc_probe_interval())
    }

    /// Get the idle-PC proposals of the router. A stopped router is started for the measurement,
    /// and stopped again afterwards.
    pub async fn proposals(&self, router: &mut Router) -> Result<Vec<String>> {
        let auto_started = self.ensure_running(router).await?;
        let result = router.idle_pc_proposals().await;
        if auto_started {
            router.stop().await?;
        }
        let proposals = result?;
        info!("Router \"{}\" has {} idle-PC proposals", router.name(), proposals.len());
        Ok(proposals)
    }

    /// Find an idle-PC value for which the router stays below 70% CPU, and keep it configured.
    /// The router is left in the state it was in before.
    pub async fn calibrate(&self, router: &mut Router) -> Result<String> {
        router.set_idlepc("0x0").await?;
        let auto_started = self.ensure_running(router).await?;

        let result = self.find_idlepc(router).await;

        if auto_started {
            if let Err(e) = router.stop().await {
                warn!("Could not stop router \"{}\" after the idle-PC calibration: {}", router.name(), e);
            }
        }
        result
    }

    async fn ensure_running(&self, router: &mut Router) -> Result<bool> {
        if router.is_running().await? {
            return Ok(false);
        }
        router.start().await?;
        debug!("Router \"{}\" started to compute the idle-PC, waiting for it to boot", router.name());
        sleep(self.boot_delay).await;
        Ok(true)
    }

    async fn find_idlepc(&self, router: &mut Router) -> Result<String> {
        let proposals = router.idle_pc_proposals().await?;
        if proposals.is_empty() {
            return Err(Error::Precondition(String::from("No Idle-PC values found")));
        }
        debug!("Idle-PC proposals of \"{}\": {}", router.name(), proposals.iter().join(", "));

        for proposal in proposals {
            let idlepc = match proposal.split_whitespace().next() {
                Some(x) if IDLEPC_RE.is_match(x) => x.to_string(),
                _ => continue,
            };
            router.set_idlepc(&idlepc).await?;

            let start = Instant::now();
            let initial = router.get_cpu_usage().await?;
            sleep(self.probe_interval).await;
            let current = router.get_cpu_usage().await?;
            let usage = cpu_percent(initial, current, start.elapsed());
            debug!("Router \"{}\": idle-PC {} gives {:.1}% CPU", router.name(), idlepc, usage);

            if usage < ACCEPTED_CPU_USAGE {
                info!("Router \"{}\": idle-PC {} is suitable", router.name(), idlepc);
                return Ok(idlepc);
            }
        }
        Err(Error::Precondition(String::from("Sorry, no idle-pc value was suitable")))
    }
}

/// CPU usage in percent, from two readings of the consumed CPU seconds. Capped at 100.
fn cpu_percent(initial: u64, current: u64, elapsed: Duration) -> f64 {
    let elapsed = elapsed.as_secs_f64();
    if elapsed <= 0.0 {
        return 100.0;
    }
    let delta = (current as f64 - initial as f64).abs();
    (delta * 100.0 / elapsed).min(100.0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn usage() {
        assert_eq!(cpu_percent(42, 42, Duration::from_secs(3)), 0.0);
        assert_eq!(cpu_percent(10, 13, Duration::from_secs(3)), 100.0);
        assert_eq!(cpu_percent(10, 11, Duration::from_secs(4)), 25.0);
        assert_eq!(cpu_percent(10, 11, Duration::from_secs(0)), 100.0);
    }

    #[test]
    fn proposal_format() {
        assert!(IDLEPC_RE.is_match("0x60606f54"));
        assert!(!IDLEPC_RE.is_match("0x6060"));
        assert!(!IDLEPC_RE.is_match("60606f54"));
    }
}
