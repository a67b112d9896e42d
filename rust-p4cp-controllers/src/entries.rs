//! Builders for the entities the controllers install.
//!
//! Every builder takes semantic values and encodes them at the width the P4
//! programs declare for the field. Match fields and action parameters are
//! added in ascending id order.

use rust_p4cp_common::{
    bitstring::to_bitstring,
    p4rt::{
        Action, CloneSessionEntry, DigestConfig, DigestEntry, Entity, MulticastGroupEntry, Replica,
        TableEntry,
    },
    types::{
        AsAddr, Flag, IsdAddr, LinkUtil, MacAddr, NodeId, Port, AS_BYTES, FLAG_BYTES, ISD_BYTES,
        LINK_UTIL_BYTES, MAC_ADDR_BYTES, NODE_ID_BYTES, PORT_BYTES,
    },
};

/* ---------------------------------------------------------------- *
 * Address learning
 * ---------------------------------------------------------------- */

/// Ids of the L2 switch program.
pub mod l2 {
    pub const ACTION_NONE: u32 = 0x0100_0001;
    pub const ACTION_FORWARD: u32 = 0x0100_0003;
    pub const TABLE_LEARN: u32 = 0x0200_0001;
    pub const TABLE_FORWARD: u32 = 0x0200_0002;
}

/// Entry for the learn table. Packets from a known source MAC execute
/// `action` instead of generating a digest.
pub fn learn_entry(mac: MacAddr, action: u32) -> Entity {
    Entity::TableEntry(
        TableEntry::new(l2::TABLE_LEARN)
            .exact(1, to_bitstring::<MAC_ADDR_BYTES, _>(mac))
            .action(Action::new(action)),
    )
}

/// Entry for the forward table sending packets for `mac` out of `port`.
pub fn forward_entry(mac: MacAddr, port: Port) -> Entity {
    Entity::TableEntry(
        TableEntry::new(l2::TABLE_FORWARD)
            .exact(1, to_bitstring::<MAC_ADDR_BYTES, _>(mac))
            .action(Action::new(l2::ACTION_FORWARD).param(1, to_bitstring::<PORT_BYTES, _>(port))),
    )
}

/// Multicast group flooding packets received on `ingress` to all other ports.
///
/// The group id is `ingress + 1`, since group 0 is invalid.
pub fn flood_group(ingress: Port, num_ports: Port) -> Entity {
    let replicas = (0..num_ports)
        .filter(|&port| port != ingress)
        .enumerate()
        .map(|(instance, egress_port)| Replica {
            egress_port,
            instance: instance as u32,
        })
        .collect();

    Entity::MulticastGroupEntry(MulticastGroupEntry {
        multicast_group_id: ingress + 1,
        replicas,
    })
}

/// Digest delivery without batching: every digest is sent immediately and
/// must be acknowledged within 1 ms.
pub fn immediate_digest(digest_id: u32) -> Entity {
    Entity::DigestEntry(DigestEntry {
        digest_id,
        config: DigestConfig {
            max_timeout_ns: 0,
            max_list_size: 1,
            ack_timeout_ns: 1_000_000,
        },
    })
}

/* ---------------------------------------------------------------- *
 * In-band telemetry
 * ---------------------------------------------------------------- */

/// Ids of the INT program.
pub mod int {
    pub const ACTION_INSERT_INT: u32 = 0x0100_2001;
    pub const ACTION_CLONE_INT: u32 = 0x0100_2002;
    pub const ACTION_INSERT_NODE_ID: u32 = 0x0100_2003;
    pub const ACTION_INSERT_TX_UTIL: u32 = 0x0100_2004;
    pub const ACTION_INSERT_AS_ADDR: u32 = 0x0100_2005;
    pub const TABLE_SCION_INT: u32 = 0x0200_2001;
    pub const TABLE_NODE_ID: u32 = 0x0200_2002;
    pub const TABLE_TX_UTIL: u32 = 0x0200_2003;
    pub const TABLE_AS_ADDR: u32 = 0x0200_2004;
}

/// Width of the AS parameter of the insert AS address action.
const AS_PARAM_BYTES: usize = 8;

const FLAG_SET: Flag = 1;

fn scion_int_match(isd: IsdAddr, asn: AsAddr) -> TableEntry {
    TableEntry::new(int::TABLE_SCION_INT)
        .exact(1, to_bitstring::<ISD_BYTES, _>(isd))
        .exact(2, to_bitstring::<AS_BYTES, _>(asn))
}

/// Rule adding a telemetry header to packets destined to `isd`-`asn`.
pub fn insert_int_entry(isd: IsdAddr, asn: AsAddr, int_bitmask: u16, scion_bitmask: u16) -> Entity {
    Entity::TableEntry(
        scion_int_match(isd, asn).action(
            Action::new(int::ACTION_INSERT_INT)
                .param(1, to_bitstring::<2, _>(int_bitmask))
                .param(2, to_bitstring::<2, _>(scion_bitmask)),
        ),
    )
}

/// Sink rule cloning packets destined to `isd`-`asn` to the controller.
pub fn clone_int_entry(isd: IsdAddr, asn: AsAddr) -> Entity {
    Entity::TableEntry(scion_int_match(isd, asn).action(Action::new(int::ACTION_CLONE_INT)))
}

pub fn node_id_entry(node_id: NodeId) -> Entity {
    Entity::TableEntry(
        TableEntry::new(int::TABLE_NODE_ID)
            .exact(1, to_bitstring::<FLAG_BYTES, _>(FLAG_SET))
            .action(
                Action::new(int::ACTION_INSERT_NODE_ID)
                    .param(1, to_bitstring::<NODE_ID_BYTES, _>(node_id)),
            ),
    )
}

pub fn as_addr_entry(asn: AsAddr) -> Entity {
    Entity::TableEntry(
        TableEntry::new(int::TABLE_AS_ADDR)
            .exact(1, to_bitstring::<FLAG_BYTES, _>(FLAG_SET))
            .action(
                Action::new(int::ACTION_INSERT_AS_ADDR)
                    .param(1, to_bitstring::<AS_PARAM_BYTES, _>(asn)),
            ),
    )
}

/// Egress link utilization reported for packets leaving on `port`.
pub fn tx_util_entry(port: Port, util: LinkUtil) -> Entity {
    Entity::TableEntry(
        TableEntry::new(int::TABLE_TX_UTIL)
            .exact(1, to_bitstring::<FLAG_BYTES, _>(FLAG_SET))
            .exact(2, to_bitstring::<PORT_BYTES, _>(port))
            .action(
                Action::new(int::ACTION_INSERT_TX_UTIL)
                    .param(1, to_bitstring::<LINK_UTIL_BYTES, _>(util)),
            ),
    )
}

/// Clone session copying whole packets to `cpu_port`.
pub fn cpu_clone_session(session_id: u32, cpu_port: Port) -> Entity {
    Entity::CloneSessionEntry(CloneSessionEntry {
        session_id,
        replicas: vec![Replica {
            egress_port: cpu_port,
            instance: 1,
        }],
        class_of_service: 0,
        packet_length_bytes: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rust_p4cp_common::p4rt::FieldMatch;

    fn table_entry(entity: Entity) -> TableEntry {
        match entity {
            Entity::TableEntry(entry) => entry,
            other => panic!("not a table entry: {:?}", other),
        }
    }

    #[test]
    fn test_learn_and_forward() {
        let entry = table_entry(learn_entry(0x0011_2233_4455, l2::ACTION_NONE));
        assert_eq!(entry.table_id, l2::TABLE_LEARN);
        assert_eq!(
            entry.matches,
            vec![FieldMatch {
                field_id: 1,
                exact: Bytes::from_static(b"\x00\x11\x22\x33\x44\x55"),
            }]
        );
        assert_eq!(entry.action.unwrap().action_id, l2::ACTION_NONE);

        let entry = table_entry(forward_entry(0x0011_2233_4455, 3));
        let action = entry.action.unwrap();
        assert_eq!(action.action_id, l2::ACTION_FORWARD);
        assert_eq!(action.params.len(), 1);
        assert_eq!(&action.params[0].value[..], &[0x00, 0x03]);
    }

    #[test]
    fn test_flood_group_excludes_ingress() {
        let Entity::MulticastGroupEntry(group) = flood_group(2, 8) else {
            panic!("not a multicast group");
        };
        assert_eq!(group.multicast_group_id, 3);
        assert_eq!(group.replicas.len(), 7);
        assert!(group.replicas.iter().all(|r| r.egress_port != 2));
        let instances: Vec<u32> = group.replicas.iter().map(|r| r.instance).collect();
        assert_eq!(instances, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_immediate_digest() {
        let Entity::DigestEntry(digest) = immediate_digest(42) else {
            panic!("not a digest entry");
        };
        assert_eq!(digest.digest_id, 42);
        assert_eq!(digest.config.max_timeout_ns, 0);
        assert_eq!(digest.config.max_list_size, 1);
        assert_eq!(digest.config.ack_timeout_ns, 1_000_000);
    }

    #[test]
    fn test_int_entries() {
        let entry = table_entry(insert_int_entry(0xfa, 0xff00_0000_0100, 0x8d00, 0x0001));
        assert_eq!(entry.table_id, int::TABLE_SCION_INT);
        assert_eq!(&entry.matches[0].exact[..], &[0x00, 0xfa]);
        assert_eq!(&entry.matches[1].exact[..], &[0xff, 0x00, 0x00, 0x00, 0x01, 0x00]);
        let action = entry.action.unwrap();
        assert_eq!(action.action_id, int::ACTION_INSERT_INT);
        assert_eq!(&action.params[0].value[..], &[0x8d, 0x00]);
        assert_eq!(&action.params[1].value[..], &[0x00, 0x01]);

        let entry = table_entry(clone_int_entry(1, 0xff00_0000_0110));
        let action = entry.action.unwrap();
        assert_eq!(action.action_id, int::ACTION_CLONE_INT);
        assert!(action.params.is_empty());

        let entry = table_entry(as_addr_entry(0xff00_0000_0110));
        assert_eq!(&entry.matches[0].exact[..], &[0x01]);
        assert_eq!(entry.action.unwrap().params[0].value.len(), 8);

        let entry = table_entry(tx_util_entry(511, 0));
        assert_eq!(&entry.matches[1].exact[..], &[0x01, 0xff]);
        assert_eq!(&entry.action.unwrap().params[0].value[..], &[0, 0, 0, 0]);

        let entry = table_entry(node_id_entry(0xdead_beef));
        assert_eq!(
            &entry.action.unwrap().params[0].value[..],
            &[0xde, 0xad, 0xbe, 0xef]
        );
    }

    #[test]
    fn test_clone_session() {
        let Entity::CloneSessionEntry(session) = cpu_clone_session(1, 128) else {
            panic!("not a clone session");
        };
        assert_eq!(session.session_id, 1);
        assert_eq!(
            session.replicas,
            vec![Replica {
                egress_port: 128,
                instance: 1
            }]
        );
        assert_eq!(session.packet_length_bytes, 0);
    }
}
