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
use crate::devices::{FrCircuit, FrameRelaySwitch};
use crate::Error;

use maplit::btreemap;

async fn fr_switch(hv: &Arc<Hypervisor>, project: &Project) -> FrameRelaySwitch {
    let mappings = btreemap! {
        String::from("1:101") => String::from("2:202"),
        String::from("1:102") => String::from("3:302"),
    };
    match test_device(hv, project, "FR1", DeviceSettings::frame_relay_switch(mappings)).await {
        Device::FrameRelaySwitch(sw) => sw,
        d => panic!("expected a Frame Relay switch, got {:?}", d.kind()),
    }
}

#[tokio::test]
async fn mirrored_circuits() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let mut sw = fr_switch(&hv, &project).await;
    assert_eq!(fake.count("frsw create \"FR1\""), 1);

    let n1 = null_nio(&hv).await;
    let n2 = null_nio(&hv).await;
    let (n1_name, n2_name) = (n1.name().to_string(), n2.name().to_string());
    sw.add_nio(n1, 1).await.unwrap();
    sw.add_nio(n2, 2).await.unwrap();

    // only the circuit between port 1 and 2 can exist
    assert_eq!(
        fake.commands_starting_with("frsw create_vc"),
        vec![
            format!("frsw create_vc \"FR1\" {} 101 {} 202", n1_name, n2_name),
            format!("frsw create_vc \"FR1\" {} 202 {} 101", n2_name, n1_name),
        ]
    );

    sw.add_nio(null_nio(&hv).await, 3).await.unwrap();
    assert_eq!(fake.count("frsw create_vc"), 4);
    assert_eq!(sw.active_mappings().len(), 4);
    assert_eq!(
        sw.active_mappings().get(&FrCircuit { port: 3, dlci: 302 }),
        Some(&FrCircuit { port: 1, dlci: 102 })
    );

    // a port cannot be bound twice
    let err = sw.add_nio(null_nio(&hv).await, 3).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(err.to_string(), "Port 3 isn't free");
}

#[tokio::test]
async fn clearing_mappings_deletes_circuits() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let mut sw = fr_switch(&hv, &project).await;
    sw.add_nio(null_nio(&hv).await, 1).await.unwrap();
    sw.add_nio(null_nio(&hv).await, 2).await.unwrap();

    sw.set_mappings(Default::default()).await.unwrap();
    assert_eq!(fake.count("frsw delete_vc \"FR1\""), 2);
    assert!(sw.active_mappings().is_empty());
    assert!(sw.mappings().is_empty());

    // the NIOs stay bound
    assert_eq!(sw.base().nios().len(), 2);
}

#[tokio::test]
async fn rename_and_delete() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let mut sw = fr_switch(&hv, &project).await;
    sw.add_nio(null_nio(&hv).await, 1).await.unwrap();
    sw.add_nio(null_nio(&hv).await, 2).await.unwrap();

    sw.set_name(String::from("FR2")).await.unwrap();
    assert_eq!(fake.count("frsw rename \"FR1\" \"FR2\""), 1);
    assert_eq!(sw.name(), "FR2");

    let nios = sw.delete().await;
    assert_eq!(nios.len(), 2);
    assert_eq!(fake.count("frsw delete_vc \"FR2\""), 2);
    assert_eq!(fake.count("nio delete"), 2);
    assert_eq!(fake.count("frsw delete \"FR2\""), 1);
    assert_eq!(fake.count("hypervisor stop"), 1);
}

#[tokio::test]
async fn circuit_onto_itself() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let mappings = btreemap! {String::from("1:101") => String::from("1:101")};
    let settings = DeviceSettings::frame_relay_switch(mappings);
    let mut sw = match test_device(&hv, &project, "FR1", settings).await {
        Device::FrameRelaySwitch(sw) => sw,
        d => panic!("expected a Frame Relay switch, got {:?}", d.kind()),
    };

    let nio = null_nio(&hv).await;
    let name = nio.name().to_string();
    sw.add_nio(nio, 1).await.unwrap();
    assert_eq!(
        fake.commands_starting_with("frsw create_vc"),
        vec![format!("frsw create_vc \"FR1\" {} 101 {} 101", name, name)]
    );
    assert_eq!(sw.active_mappings().len(), 1);

    sw.remove_nio(1).await.unwrap();
    assert_eq!(fake.count("frsw delete_vc"), 1);
    assert!(sw.active_mappings().is_empty());
}
