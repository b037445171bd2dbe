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
use crate::devices::{DeviceKind, HubPort};
use crate::{Dynamips, Error};

fn udp(lport: u16) -> NioKind {
    NioKind::Udp { lport, rhost: String::from("127.0.0.1"), rport: 20000 }
}

#[tokio::test]
async fn hub_through_manager() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let project = test_project(dir.path());
    let manager = Dynamips::new(test_config());
    let hv = manager
        .attach_hypervisor("127.0.0.1", fake.port(), project.module_working_directory())
        .await
        .unwrap();

    let hub = manager
        .create_device_on(Arc::clone(&hv), &project, None, "HUB1", DeviceSettings::ethernet_hub())
        .await
        .unwrap();
    assert_eq!(hub.kind, DeviceKind::EthernetHub);
    assert_eq!(hub.settings, DeviceSettings::EthernetHub { ports_mapping: (0..8).map(HubPort::new).collect() });
    assert_eq!(fake.count("nio_bridge create \"HUB1\""), 1);

    let lport = manager.allocate_udp_port(&project).await.unwrap();
    assert_eq!(lport, 10000);
    manager.device_add_nio(hub.node_id, 3, udp(lport)).await.unwrap();
    let created = fake.commands_starting_with("nio create_udp");
    assert_eq!(created.len(), 1);
    assert!(created[0].ends_with(" 10000 127.0.0.1 20000"));
    assert_eq!(fake.count("nio_bridge add_nio \"HUB1\" udp-"), 1);

    let info = manager.device_info(hub.node_id).await.unwrap();
    assert_eq!(info.nios.keys().copied().collect::<Vec<u32>>(), vec![3]);

    // ports outside of the mapping do not exist, and the new NIO is deleted again
    let lport2 = manager.allocate_udp_port(&project).await.unwrap();
    let err = manager.device_add_nio(hub.node_id, 8, udp(lport2)).await.unwrap_err();
    assert!(matches!(err, Error::Index(_)));
    assert_eq!(err.to_string(), "Port 8 doesn't exist");
    assert_eq!(fake.count("nio delete"), 1);

    // the port mapping cannot change while connected
    let err = manager
        .update_device(hub.node_id, None, Some(DeviceSettings::EthernetHub { ports_mapping: vec![HubPort::new(0)] }))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Can't modify a hub already connected.");

    // MAC address tables only exist on Ethernet switches
    assert!(matches!(manager.mac_address_table(hub.node_id).await, Err(Error::Precondition(_))));

    manager.device_remove_nio(hub.node_id, 3).await.unwrap();
    assert_eq!(fake.count("nio_bridge remove_nio \"HUB1\""), 1);
    assert_eq!(fake.count("nio delete"), 2);
    let err = manager.device_remove_nio(hub.node_id, 3).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert!(err.to_string().contains("is not allocated"));

    // the tunnel port of the removed NIO is free again
    manager.release_udp_port(&project, lport2).await;
    assert_eq!(manager.allocate_udp_port(&project).await.unwrap(), 10000);

    let info = manager.update_device(hub.node_id, Some("HUB2"), None).await.unwrap();
    assert_eq!(info.name, "HUB2");
    assert_eq!(fake.count("nio_bridge rename \"HUB1\" \"HUB2\""), 1);

    manager.delete_device(hub.node_id).await.unwrap();
    assert_eq!(fake.count("nio_bridge delete \"HUB2\""), 1);
    assert_eq!(fake.count("hypervisor stop"), 1);
    assert!(manager.hypervisors().await.is_empty());
    assert!(matches!(manager.device_info(hub.node_id).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn duplicate_settings() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let project = test_project(dir.path());
    let manager = Dynamips::new(test_config());
    let hv = manager
        .attach_hypervisor("127.0.0.1", fake.port(), project.module_working_directory())
        .await
        .unwrap();

    let four_ports = DeviceSettings::EthernetHub { ports_mapping: (0..4).map(HubPort::new).collect() };
    let hub1 = manager.create_device_on(Arc::clone(&hv), &project, None, "HUB1", four_ports.clone()).await.unwrap();
    let hub2 = manager
        .create_device_on(Arc::clone(&hv), &project, None, "HUB2", DeviceSettings::ethernet_hub())
        .await
        .unwrap();
    let switch = manager
        .create_device_on(Arc::clone(&hv), &project, None, "SW1", DeviceSettings::ethernet_switch())
        .await
        .unwrap();

    manager.duplicate_device(hub1.node_id, hub2.node_id).await.unwrap();
    assert_eq!(manager.device_info(hub2.node_id).await.unwrap().settings, four_ports);

    // settings of another kind of device are refused
    assert!(matches!(
        manager.duplicate_device(hub1.node_id, switch.node_id).await,
        Err(Error::Precondition(_))
    ));

    // a node ID can only be used once
    let err = manager
        .create_device_on(Arc::clone(&hv), &project, Some(hub1.node_id), "HUB3", DeviceSettings::ethernet_hub())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(fake.count("nio_bridge create \"HUB3\""), 0);
}
