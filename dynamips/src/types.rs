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

//! # Dynamips Types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Project to which the nodes belong.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct Project {
    /// ID of the project
    #[serde(rename = "project_id")]
    pub id: Uuid,
    /// Path of the project
    pub path: PathBuf,
}

impl Project {
    /// Create a new project handle
    pub fn new(id: Uuid, path: impl Into<PathBuf>) -> Self {
        Self { id, path: path.into() }
    }

    /// Directory shared by all Dynamips nodes of the project. The hypervisors are started inside
    /// this directory, and all files they create (NVRAM, ROM, disks, ghost files and configs)
    /// end up in here.
    pub fn module_working_directory(&self) -> PathBuf {
        self.path.join("project-files").join("dynamips")
    }
}

/// Router status, as reported by `vm get_status`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum RouterStatus {
    /// Router is stopped
    #[serde(rename = "stopped")]
    Inactive,
    /// Router is stopping
    #[serde(rename = "shutting_down")]
    ShuttingDown,
    /// Router is started
    #[serde(rename = "started")]
    Running,
    /// Router is suspended
    #[serde(rename = "suspended")]
    Suspended,
}

impl RouterStatus {
    /// Decode the status code returned by the hypervisor
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Inactive),
            1 => Some(Self::ShuttingDown),
            2 => Some(Self::Running),
            3 => Some(Self::Suspended),
            _ => None,
        }
    }
    /// Returns true if the router is running
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
    /// Returns true if the router is stopped
    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Inactive)
    }
    /// Returns true if the router is suspended
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended)
    }
}

impl fmt::Display for RouterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "stopped"),
            Self::ShuttingDown => write!(f, "shutting down"),
            Self::Running => write!(f, "started"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// Dynamips version, compared numerically component by component.
///
/// Anything after the numeric part (like `-amd64` or `-RC3`) is ignored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(Vec<u32>);

impl Version {
    /// Parse a version string like `0.2.17` or `0.2.8-RC3-amd64`.
    pub fn parse(version: &str) -> Self {
        let numeric = version.split(|c: char| c == '-' || c.is_whitespace()).next().unwrap_or("");
        Self(numeric.split('.').map_while(|part| part.parse().ok()).collect())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|x| x.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_ordering() {
        assert!(Version::parse("0.2.17") >= Version::parse("0.2.11"));
        assert!(Version::parse("0.2.8-RC3-amd64") < Version::parse("0.2.11"));
        assert!(Version::parse("0.2.16") >= Version::parse("0.2.16"));
        assert!(Version::parse("0.3") > Version::parse("0.2.22"));
        assert_eq!(Version::parse("0.2.21-amd64/Linux").to_string(), "0.2.21");
    }

    #[test]
    fn working_directory() {
        let project = Project::new(Uuid::nil(), "/tmp/project");
        assert_eq!(
            project.module_working_directory(),
            PathBuf::from("/tmp/project/project-files/dynamips")
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(RouterStatus::from_code(0), Some(RouterStatus::Inactive));
        assert_eq!(RouterStatus::from_code(2), Some(RouterStatus::Running));
        assert_eq!(RouterStatus::from_code(3), Some(RouterStatus::Suspended));
        assert_eq!(RouterStatus::from_code(7), None);
    }
}
