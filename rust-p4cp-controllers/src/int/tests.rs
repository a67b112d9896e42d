use super::*;
use bytes::Bytes;
use super::report::PacketType;
use rust_p4cp_common::p4rt::{Entity, Status};
use rust_p4cp_runtime::MockChannel;
use std::sync::{Arc, Mutex};

type Published = Arc<Mutex<Vec<(String, Vec<u8>, Vec<u8>)>>>;

struct RecordingPublisher(Published);

#[async_trait]
impl ReportPublisher for RecordingPublisher {
    async fn publish(&mut self, topic: &str, key: &[u8], report: &[u8]) -> Result<()> {
        self.0
            .lock()
            .unwrap()
            .push((topic.to_string(), key.to_vec(), report.to_vec()));
        Ok(())
    }
}

const P4INFO: &str = r#"{
    "counters": [ { "preamble": { "id": 302055425, "name": "MyEgress.txCounter", "alias": "txCounter" } } ]
}"#;

const HOST: &str = "1-ff00:0:110";

fn table() -> StaticRuleSet {
    StaticRuleSet::parse(
        "# ISD-AS INT SCION\n\
         1-ff00:0:111 8d00 0001\n\
         1-ff00:0:110 ffff 0001\n\
         1-ff00:0:112 ff80 0000\n",
    )
    .unwrap()
}

fn controller(published: &Published) -> IntController {
    let p4info = P4Info::from_json(P4INFO).unwrap();
    IntController::new(
        &p4info,
        HOST,
        0x2a,
        table(),
        &SwitchSettings::default(),
        Box::new(RecordingPublisher(published.clone())),
    )
    .unwrap()
}

fn primary() -> MasterArbitrationUpdate {
    MasterArbitrationUpdate {
        device_id: 1,
        election_id: 1.into(),
        status: Status::default(),
    }
}

/// Telemetry packet towards 1-ff00:0:110 with a single hop carrying only
/// the node id.
fn telemetry_payload() -> Bytes {
    let mut headers = vec![0u8; 40];
    headers[0..4].copy_from_slice(&7u32.to_be_bytes());
    headers[12..20].copy_from_slice(&0x0001_ff00_0000_0110u64.to_be_bytes());
    headers[40 - 15] = 3 + 4;
    headers[40 - 10] = 4;
    headers[40 - 8..40 - 6].copy_from_slice(&0x8000u16.to_be_bytes());

    let mut payload = 40u64.to_be_bytes().to_vec();
    payload.extend_from_slice(&headers);
    payload.extend_from_slice(&0x0000_0005u32.to_be_bytes());
    payload.into()
}

#[test]
fn test_missing_counter() {
    let p4info = P4Info::from_json("{}").unwrap();
    let result = IntController::new(
        &p4info,
        HOST,
        1,
        table(),
        &SwitchSettings::default(),
        Box::new(LogPublisher::new("localhost:9092")),
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_invalid_host_address() {
    let p4info = P4Info::from_json(P4INFO).unwrap();
    let result = IntController::new(
        &p4info,
        "ff00:0:110",
        1,
        table(),
        &SwitchSettings::default(),
        Box::new(LogPublisher::new("localhost:9092")),
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_arbitration_installs_static_rules() {
    let published = Published::default();
    let mut ctrl = controller(&published);
    assert_eq!(ctrl.counter_tx_id(), 302055425);
    assert_eq!(ctrl.host(), IsdAs::new(1, 0xff00_0000_0110));

    let mut con = MockChannel::new(1, 1);
    let log = con.log();
    ctrl.handle_arbitration_update(&mut con, &primary())
        .await
        .unwrap();

    let writes = log.writes();
    // sink, two remote ASes, node rules, clone session
    assert_eq!(writes.len(), 5);

    assert_eq!(
        writes[0].updates[0].entity,
        entries::clone_int_entry(1, 0xff00_0000_0110)
    );
    assert_eq!(
        writes[1].updates[0].entity,
        entries::insert_int_entry(1, 0xff00_0000_0111, 0x8d00, 0x0001)
    );
    assert_eq!(
        writes[2].updates[0].entity,
        entries::insert_int_entry(1, 0xff00_0000_0112, 0xff80, 0x0000)
    );

    let node_rules = &writes[3];
    assert_eq!(node_rules.len(), 2 + 512);
    assert_eq!(node_rules.updates[0].entity, entries::node_id_entry(0x2a));
    assert_eq!(
        node_rules.updates[1].entity,
        entries::as_addr_entry(0xff00_0000_0110)
    );
    assert_eq!(node_rules.updates[513].entity, entries::tx_util_entry(511, 0));

    let Entity::CloneSessionEntry(session) = &writes[4].updates[0].entity else {
        panic!("not a clone session");
    };
    assert_eq!(session.session_id, 1);
    assert_eq!(session.replicas[0].egress_port, 128);

    // Re-election repeats the whole setup.
    ctrl.handle_arbitration_update(&mut con, &primary())
        .await
        .unwrap();
    let again = log.writes();
    assert_eq!(again.len(), 10);
    assert_eq!(&again[5..], &writes[..]);
}

#[tokio::test]
async fn test_backup_installs_nothing() {
    let published = Published::default();
    let mut ctrl = controller(&published);
    let mut con = MockChannel::new(1, 1);
    let log = con.log();

    let mut backup = primary();
    backup.status.code = 6;
    ctrl.handle_arbitration_update(&mut con, &backup)
        .await
        .unwrap();
    assert!(log.writes().is_empty());
}

#[tokio::test]
async fn test_packet_in_publishes_report() {
    let published = Published::default();
    let mut ctrl = controller(&published);
    let mut con = MockChannel::new(1, 1);

    let packet = PacketIn {
        payload: telemetry_payload(),
        metadata: Vec::new(),
    };
    assert!(ctrl.handle_packet_in(&mut con, &packet).await.unwrap());

    let published = published.lock().unwrap();
    assert_eq!(published.len(), 1);
    let (topic, key, report) = &published[0];
    assert_eq!(topic, "ASff00_0_110-2a");
    assert_eq!(FlowKey::decode(key.as_slice()).unwrap().flow_id, 7);

    let report = Report::decode(report.as_slice()).unwrap();
    assert_eq!(report.packet_type(), PacketType::Scion);
    assert_eq!(report.truncated_packet, &packet.payload[8..48]);
    assert_eq!(report.hops.len(), 1);
    assert_eq!(report.hops[0].node_id, 5);
    assert!(report.hops[0].metadata.is_empty());
}

#[tokio::test]
async fn test_malformed_packet_not_handled() {
    let published = Published::default();
    let mut ctrl = controller(&published);
    let mut con = MockChannel::new(1, 1);

    let packet = PacketIn {
        payload: Bytes::from_static(b"\x00\x00\x00\x00"),
        metadata: Vec::new(),
    };
    assert!(!ctrl.handle_packet_in(&mut con, &packet).await.unwrap());

    let mut truncated = telemetry_payload().to_vec();
    truncated.pop();
    let packet = PacketIn {
        payload: truncated.into(),
        metadata: Vec::new(),
    };
    assert!(!ctrl.handle_packet_in(&mut con, &packet).await.unwrap());

    assert!(published.lock().unwrap().is_empty());
}
