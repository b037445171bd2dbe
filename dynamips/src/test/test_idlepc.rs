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
use crate::idlepc::IdlePcCalibrator;
use crate::{Error, RouterStatus};

fn calibrator() -> IdlePcCalibrator {
    IdlePcCalibrator::new(Duration::from_millis(0), Duration::from_millis(10))
}

#[tokio::test]
async fn calibrate_stopped_router() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let image = ios_image(dir.path(), "c3725.bin");
    let mut router = test_router(&hv, &project, "R1", 1, Platform::C3725, &image).await;

    let idlepc = calibrator().calibrate(&mut router).await.unwrap();
    assert_eq!(idlepc, "0x60606f54");
    assert_eq!(router.idlepc(), "0x60606f54");

    // the router was started for the measurement only
    assert_eq!(router.status(), RouterStatus::Inactive);
    assert_eq!(fake.status_of("R1"), Some(0));

    let commands = fake.commands();
    let position = |c: &str| commands.iter().position(|x| x == c).unwrap();
    let reset = position("vm set_idle_pc \"R1\" 0x0");
    let start = position("vm start \"R1\"");
    let online = position("vm set_idle_pc_online \"R1\" 0 0x60606f54");
    let stop = position("vm stop \"R1\"");
    assert!(reset < start && start < online && online < stop);
    assert_eq!(fake.count("vm set_idle_pc_online"), 1);
}

#[tokio::test]
async fn calibrate_running_router() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let image = ios_image(dir.path(), "c3725.bin");
    let mut router = test_router(&hv, &project, "R1", 1, Platform::C3725, &image).await;
    router.start().await.unwrap();

    let idlepc = calibrator().calibrate(&mut router).await.unwrap();
    assert_eq!(idlepc, "0x60606f54");
    assert_eq!(router.status(), RouterStatus::Running);
    assert_eq!(fake.count("vm stop"), 0);
    // the reset happens online as well
    assert_eq!(fake.count("vm set_idle_pc_online \"R1\" 0 0x0"), 1);
}

#[tokio::test]
async fn no_proposals() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let image = ios_image(dir.path(), "c3725.bin");
    let mut router = test_router(&hv, &project, "R1", 1, Platform::C3725, &image).await;
    fake.set_proposals(vec![]);

    let err = calibrator().calibrate(&mut router).await.unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));
    assert_eq!(err.to_string(), "No Idle-PC values found");
    assert_eq!(fake.status_of("R1"), Some(0));
}

#[tokio::test]
async fn malformed_proposals_are_skipped() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let image = ios_image(dir.path(), "c3725.bin");
    let mut router = test_router(&hv, &project, "R1", 1, Platform::C3725, &image).await;
    fake.set_proposals(vec!["0x6060 [12]", "not-an-address"]);

    let err = calibrator().calibrate(&mut router).await.unwrap_err();
    assert_eq!(err.to_string(), "Sorry, no idle-pc value was suitable");
    assert_eq!(fake.count("vm set_idle_pc_online"), 0);
    assert_eq!(router.idlepc(), "0x0");
}

#[tokio::test]
async fn proposals_of_stopped_router() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let image = ios_image(dir.path(), "c3725.bin");
    let mut router = test_router(&hv, &project, "R1", 1, Platform::C3725, &image).await;

    let proposals = calibrator().proposals(&mut router).await.unwrap();
    assert_eq!(proposals, vec!["0x60606f54 [25]", "0x60606f74 [33]"]);
    assert_eq!(fake.count("vm start"), 1);
    assert_eq!(fake.status_of("R1"), Some(0));
}
