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

use super::*;
use crate::ghost::GhostImageCache;
use crate::Error;

#[tokio::test]
async fn ghost_file_is_shared() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let image = ios_image(dir.path(), "c7200.bin");
    let mut cache = GhostImageCache::new();

    let mut r1 = test_router(&hv, &project, "R1", 1, Platform::C7200, &image).await;
    let mut r2 = test_router(&hv, &project, "R2", 2, Platform::C7200, &image).await;
    let ghost_path = dir.path().join("c7200.bin-512.ghost");
    assert_eq!(r1.formatted_ghost_file(), "c7200.bin-512.ghost");

    cache.prepare(&mut r1).await.unwrap();
    cache.prepare(&mut r2).await.unwrap();

    // a single ghost router was booted, and removed afterwards
    assert_eq!(fake.count("vm create \"ghost-"), 1);
    assert_eq!(fake.commands_starting_with("vm create \"ghost-"), vec!["vm create \"ghost-c7200.bin-512.ghost\" 0 c7200"]);
    // the ghost runs on the hardware of its parent
    assert_eq!(fake.count("c7200 set_npe \"ghost-c7200.bin-512.ghost\" npe-400"), 1);
    assert_eq!(fake.count("c7200 set_midplane \"ghost-c7200.bin-512.ghost\" vxr"), 1);
    assert_eq!(fake.count("vm set_ghost_status \"ghost-c7200.bin-512.ghost\" 1"), 1);
    assert_eq!(fake.count("vm start \"ghost-"), 1);
    assert_eq!(fake.count("vm clean_delete \"ghost-c7200.bin-512.ghost\""), 1);
    assert_eq!(fake.status_of("ghost-c7200.bin-512.ghost"), None);
    assert_eq!(hv.devices(), vec![r1.id(), r2.id()]);

    assert!(cache.contains(&ghost_path));
    for router in [&r1, &r2].iter() {
        assert_eq!(router.ghost_file(), Some(ghost_path.as_path()));
        assert_eq!(router.ghost_status(), 2);
    }

    // preparing again changes nothing
    fake.clear_commands();
    cache.prepare(&mut r1).await.unwrap();
    assert!(fake.commands().is_empty());
}

#[tokio::test]
async fn ghost_file_per_ram_size() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let image = ios_image(dir.path(), "c7200.bin");
    let mut cache = GhostImageCache::new();

    let mut r1 = test_router(&hv, &project, "R1", 1, Platform::C7200, &image).await;
    let mut r2 = test_router(&hv, &project, "R2", 2, Platform::C7200, &image).await;
    r2.set_ram(256).await.unwrap();

    cache.prepare(&mut r1).await.unwrap();
    cache.prepare(&mut r2).await.unwrap();
    assert_eq!(fake.count("vm create \"ghost-"), 2);
    assert_eq!(r2.ghost_file(), Some(dir.path().join("c7200.bin-256.ghost").as_path()));
    assert_eq!(cache.files().count(), 2);
}

#[tokio::test]
async fn ghost_requires_mmap() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let image = ios_image(dir.path(), "c3600.bin");
    let mut cache = GhostImageCache::new();

    let mut router = test_router(&hv, &project, "R1", 1, Platform::C3600, &image).await;
    router.set_mmap(false).await.unwrap();
    let err = cache.prepare(&mut router).await.unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));
    assert_eq!(fake.count("vm create \"ghost-"), 0);
}

#[tokio::test]
async fn failed_priming_is_not_fatal() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let image = ios_image(dir.path(), "c3600.bin");
    let mut cache = GhostImageCache::new();
    fake.fail_on("vm set_ghost_file \"ghost-");

    let mut router = test_router(&hv, &project, "R1", 1, Platform::C3600, &image).await;
    cache.prepare(&mut router).await.unwrap();

    // the ghost router is cleaned up, and the router boots without a ghost file
    assert_eq!(fake.count("vm clean_delete \"ghost-"), 1);
    assert_eq!(fake.count("vm start"), 0);
    assert_eq!(router.ghost_file(), None);
    assert_eq!(cache.files().count(), 0);
    assert_eq!(hv.devices(), vec![router.id()]);
}
