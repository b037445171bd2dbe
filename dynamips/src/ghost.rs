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

//! # Ghost IOS Images
//!
//! Routers running the same image with the same amount of RAM can share a single memory-mapped
//! copy of the decompressed image, called the ghost file. The first router that needs the file
//! creates it with a throwaway router, and every later router only points to it.

use crate::platform::Platform;
use crate::router::Router;
use crate::{Error, Result};

use log::*;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// # Ghost Image Cache
///
/// Remembers which ghost files were already created. The manager keeps it behind a single lock,
/// so two routers never prime the same file at once.
#[derive(Debug, Default)]
pub struct GhostImageCache {
    created: HashSet<PathBuf>,
}

impl GhostImageCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the ghost file was created by this cache
    pub fn contains(&self, ghost_file: &Path) -> bool {
        self.created.contains(ghost_file)
    }

    /// All ghost files created so far
    pub fn files(&self) -> impl Iterator<Item = &Path> + '_ {
        self.created.iter().map(|p| p.as_path())
    }

    /// Forget all ghost files below `dir`, and return them.
    pub fn forget_dir(&mut self, dir: &Path) -> Vec<PathBuf> {
        let forgotten: Vec<PathBuf> = self.created.iter().filter(|p| p.starts_with(dir)).cloned().collect();
        for file in forgotten.iter() {
            self.created.remove(file);
        }
        forgotten
    }

    /// Make the router use a ghost file, creating the file first if necessary.
    ///
    /// Creating the ghost file may fail (for instance if the image does not boot). This is only
    /// logged, and the router boots without a ghost file.
    pub async fn prepare(&mut self, router: &mut Router) -> Result<()> {
        if !router.mmap() {
            return Err(Error::Precondition(String::from(
                "mmap support is required to enable ghost IOS support",
            )));
        }
        if router.platform() == Platform::C7200 && router.npe() == Some("npe-g2") {
            warn!("Ghost IOS is not supported on c7200 with NPE-G2 (router \"{}\")", router.name());
            return Ok(());
        }

        let ghost_file = router.formatted_ghost_file();
        let ghost_path = router.working_dir().join(&ghost_file);

        if !self.created.contains(&ghost_path) {
            match prime(router, &ghost_file, &ghost_path).await {
                Ok(()) => {
                    self.created.insert(ghost_path.clone());
                }
                Err(e) => {
                    warn!("Could not create ghost instance {}: {}", ghost_file, e);
                }
            }
        }

        if router.ghost_file() != Some(ghost_path.as_path())
            && (self.created.contains(&ghost_path) || ghost_path.exists())
        {
            router.set_ghost_status(2).await?;
            router.set_ghost_file(&ghost_path).await?;
        }
        Ok(())
    }
}

/// Boot a throwaway router once, which makes dynamips write the ghost file. The router is
/// deleted in any case.
async fn prime(parent: &Router, ghost_file: &str, ghost_path: &Path) -> Result<()> {
    info!("Creating ghost instance {}", ghost_file);
    let mut ghost = Router::ghost(parent, format!("ghost-{}", ghost_file));
    ghost.create().await?;

    let result = async {
        ghost.set_ghost_status(1).await?;
        ghost.set_ghost_file(ghost_path).await?;
        ghost.start().await?;
        ghost.stop().await
    }
    .await;

    if let Err(e) = ghost.clean_delete().await {
        warn!("Could not delete ghost router \"{}\": {}", ghost.name(), e);
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn forget_only_below_dir() {
        let mut cache = GhostImageCache::new();
        cache.created.insert(PathBuf::from("/a/project-files/dynamips/c7200.image-512.ghost"));
        cache.created.insert(PathBuf::from("/b/project-files/dynamips/c7200.image-512.ghost"));
        let forgotten = cache.forget_dir(Path::new("/a"));
        assert_eq!(forgotten, vec![PathBuf::from("/a/project-files/dynamips/c7200.image-512.ghost")]);
        assert_eq!(cache.files().count(), 1);
        assert!(cache.contains(Path::new("/b/project-files/dynamips/c7200.image-512.ghost")));
    }
}
