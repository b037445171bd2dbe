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
use crate::devices::{EthernetPort, EthernetSwitch, PortMode};
use crate::Error;

async fn ethernet_switch(hv: &Arc<Hypervisor>, project: &Project) -> EthernetSwitch {
    match test_device(hv, project, "SW1", DeviceSettings::ethernet_switch()).await {
        Device::EthernetSwitch(sw) => sw,
        d => panic!("expected an Ethernet switch, got {:?}", d.kind()),
    }
}

fn port(mode: PortMode) -> EthernetPort {
    EthernetPort { name: String::new(), port_number: 0, mode }
}

#[tokio::test]
async fn access_port_by_default() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let mut sw = ethernet_switch(&hv, &project).await;
    assert_eq!(fake.count("ethsw create \"SW1\""), 1);
    assert_eq!(sw.ports().len(), 8);

    let nio = null_nio(&hv).await;
    let name = nio.name().to_string();
    sw.add_nio(nio, 2).await.unwrap();
    assert_eq!(
        fake.commands_starting_with("ethsw "),
        vec![
            String::from("ethsw create \"SW1\""),
            format!("ethsw add_nio \"SW1\" {}", name),
            format!("ethsw set_access_port \"SW1\" {} 1", name),
        ]
    );

    let nio = sw.remove_nio(2).await.unwrap();
    assert_eq!(nio.name(), name);
    assert_eq!(fake.count(&format!("ethsw remove_nio \"SW1\" {}", name)), 1);
}

#[tokio::test]
async fn ports_mapping_while_connected() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let mut sw = ethernet_switch(&hv, &project).await;
    let nio = null_nio(&hv).await;
    let name = nio.name().to_string();
    sw.add_nio(nio, 0).await.unwrap();

    // changing the number of ports is refused
    let err = sw.set_ports_mapping(vec![port(PortMode::Access { vlan: 1 })]).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(err.to_string(), "Can't modify a switch already connected.");
    assert_eq!(sw.ports().len(), 8);

    // changing the mode of the ports is fine
    let mut ports: Vec<EthernetPort> = (0..8).map(|_| port(PortMode::Access { vlan: 1 })).collect();
    ports[0].mode = PortMode::Dot1q { vlan: 10 };
    sw.set_ports_mapping(ports).await.unwrap();
    assert_eq!(fake.count(&format!("ethsw set_dot1q_port \"SW1\" {} 10", name)), 1);
    assert_eq!(sw.ports()[0].mode, PortMode::Dot1q { vlan: 10 });
}

#[tokio::test]
async fn ports_are_renumbered() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let mut sw = ethernet_switch(&hv, &project).await;

    let ports = vec![
        EthernetPort { name: String::from("uplink"), port_number: 7, mode: PortMode::Dot1q { vlan: 1 } },
        EthernetPort { name: String::from("host"), port_number: 3, mode: PortMode::Access { vlan: 20 } },
    ];
    sw.set_ports_mapping(ports).await.unwrap();
    assert_eq!(sw.ports().len(), 2);
    assert_eq!(sw.ports()[0].name, "Ethernet0");
    assert_eq!(sw.ports()[0].port_number, 0);
    assert_eq!(sw.ports()[1].name, "Ethernet1");
    assert_eq!(sw.ports()[1].mode, PortMode::Access { vlan: 20 });
    // nothing is bound, so nothing is sent
    assert_eq!(fake.count("ethsw set_"), 0);

    // ports outside of the mapping do not exist
    let err = sw.add_nio(null_nio(&hv).await, 2).await.unwrap_err();
    assert!(matches!(err, Error::Index(_)));
    assert_eq!(err.to_string(), "Port 2 doesn't exist");
    assert_eq!(fake.count("ethsw add_nio"), 0);
}

#[tokio::test]
async fn qinq_ethertype() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let mut sw = ethernet_switch(&hv, &project).await;
    let n0 = null_nio(&hv).await;
    let n1 = null_nio(&hv).await;
    let (n0_name, n1_name) = (n0.name().to_string(), n1.name().to_string());
    sw.add_nio(n0, 0).await.unwrap();
    sw.add_nio(n1, 1).await.unwrap();

    sw.set_port_mode(0, &PortMode::Qinq { vlan: 100, ethertype: String::from("0x8100") }).await.unwrap();
    sw.set_port_mode(1, &PortMode::Qinq { vlan: 200, ethertype: String::from("0x88A8") }).await.unwrap();
    assert_eq!(
        fake.commands_starting_with("ethsw set_qinq_port"),
        vec![
            format!("ethsw set_qinq_port \"SW1\" {} 100", n0_name),
            format!("ethsw set_qinq_port \"SW1\" {} 200 0x88A8", n1_name),
        ]
    );

    // only bound ports can be configured
    let err = sw.set_port_mode(5, &PortMode::Access { vlan: 1 }).await.unwrap_err();
    assert_eq!(err.to_string(), "Port 5 is not allocated");
}

#[tokio::test]
async fn mac_address_table() {
    let fake = FakeHypervisor::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hv = fake.connect(dir.path()).await;
    let project = test_project(dir.path());
    let mut sw = ethernet_switch(&hv, &project).await;

    let table = sw.get_mac_addr_table().await.unwrap();
    assert_eq!(table, vec!["c201.0000.0001 1 udp-00000000"]);
    sw.clear_mac_addr_table().await.unwrap();
    assert_eq!(fake.count("ethsw clear_mac_addr_table \"SW1\""), 1);

    sw.add_nio(null_nio(&hv).await, 4).await.unwrap();
    let nios = sw.delete().await;
    assert_eq!(nios.len(), 1);
    assert_eq!(fake.count("ethsw remove_nio \"SW1\""), 1);
    assert_eq!(fake.count("ethsw delete \"SW1\""), 1);
}
