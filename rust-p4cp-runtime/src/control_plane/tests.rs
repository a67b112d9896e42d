use super::*;
use crate::MockChannel;
use async_trait::async_trait;
use bytes::Bytes;
use rust_p4cp_common::{
    p4rt::{DigestList, PacketIn, Status, StreamError},
    Error,
};
use std::sync::{Arc, Mutex};

type Trace = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Copy)]
enum Outcome {
    Pass,
    Handle,
    Fail,
    Fatal,
}

struct Recorder {
    name: String,
    outcome: Outcome,
    trace: Trace,
}

impl Recorder {
    fn new(name: &str, outcome: Outcome, trace: &Trace) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            trace: trace.clone(),
        }
    }

    fn record(&self, event: &str) -> Result<bool> {
        self.trace
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, event));
        match self.outcome {
            Outcome::Pass => Ok(false),
            Outcome::Handle => Ok(true),
            Outcome::Fail => Err(Error::Transport("write failed".into())),
            Outcome::Fatal => Err(Error::Protocol("bad digest".into())),
        }
    }
}

#[async_trait]
impl Controller for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle_arbitration_update(
        &mut self,
        con: &mut dyn DeviceChannel,
        arb_update: &MasterArbitrationUpdate,
    ) -> Result<()> {
        self.record("arb")?;
        if arb_update.is_primary() {
            let request = con.create_write_request();
            con.send_write_request(&request).await?;
        }
        Ok(())
    }

    async fn handle_packet_in(
        &mut self,
        _con: &mut dyn DeviceChannel,
        _packet: &PacketIn,
    ) -> Result<bool> {
        self.record("packet")
    }

    async fn handle_digest(
        &mut self,
        _con: &mut dyn DeviceChannel,
        _digest_list: &DigestList,
    ) -> Result<bool> {
        self.record("digest")
    }
}

fn p4info() -> P4Info {
    P4Info::from_json("{}").unwrap()
}

fn arbitration(code: i32) -> StreamMessage {
    StreamMessage::Arbitration(MasterArbitrationUpdate {
        device_id: 1,
        election_id: 1.into(),
        status: Status {
            code,
            message: String::new(),
        },
    })
}

fn packet() -> StreamMessage {
    StreamMessage::Packet(PacketIn {
        payload: Bytes::from_static(b"\x00\x01"),
        metadata: Vec::new(),
    })
}

fn digest() -> StreamMessage {
    StreamMessage::Digest(DigestList {
        digest_id: 5,
        list_id: 1,
        data: Vec::new(),
        timestamp: 0,
    })
}

fn take(trace: &Trace) -> Vec<String> {
    std::mem::take(&mut *trace.lock().unwrap())
}

fn stack(con: MockChannel, outcomes: &[(&str, Outcome)], trace: &Trace) -> ControlPlane<MockChannel> {
    let mut cp = ControlPlane::new(con, p4info(), Bytes::new());
    for (name, outcome) in outcomes {
        cp.add_controller(Recorder::new(name, *outcome, trace));
    }
    cp
}

#[tokio::test]
async fn test_events_offered_top_down_until_handled() {
    let trace = Trace::default();
    let mut cp = stack(
        MockChannel::new(1, 1),
        &[("a", Outcome::Pass), ("b", Outcome::Handle), ("c", Outcome::Pass)],
        &trace,
    );
    assert_eq!(cp.controllers(), vec!["a", "b", "c"]);

    cp.dispatch(&packet()).await.unwrap();
    assert_eq!(take(&trace), vec!["c:packet", "b:packet"]);

    cp.dispatch(&digest()).await.unwrap();
    assert_eq!(take(&trace), vec!["c:digest", "b:digest"]);
}

#[tokio::test]
async fn test_unhandled_event_reaches_bottom() {
    let trace = Trace::default();
    let mut cp = stack(
        MockChannel::new(1, 1),
        &[("a", Outcome::Pass), ("b", Outcome::Pass)],
        &trace,
    );
    cp.dispatch(&packet()).await.unwrap();
    assert_eq!(take(&trace), vec!["b:packet", "a:packet"]);

    // Controllers without a handler for an event never see it.
    let error = StreamMessage::Error(StreamError {
        canonical_code: 3,
        message: "invalid".into(),
    });
    cp.dispatch(&error).await.unwrap();
    cp.dispatch(&StreamMessage::Unknown).await.unwrap();
    assert!(take(&trace).is_empty());
}

#[tokio::test]
async fn test_arbitration_bottom_up_after_pipeline() {
    let trace = Trace::default();
    let con = MockChannel::new(1, 1);
    let log = con.log();
    let mut cp = stack(
        con,
        &[("a", Outcome::Handle), ("b", Outcome::Pass), ("c", Outcome::Handle)],
        &trace,
    );

    cp.dispatch(&arbitration(0)).await.unwrap();
    assert_eq!(take(&trace), vec!["a:arb", "b:arb", "c:arb"]);
    assert_eq!(log.pipeline_pushes(), 1);
    assert_eq!(log.writes().len(), 3);

    // Not primary: controllers are told, but nothing is pushed.
    cp.dispatch(&arbitration(5)).await.unwrap();
    assert_eq!(take(&trace), vec!["a:arb", "b:arb", "c:arb"]);
    assert_eq!(log.pipeline_pushes(), 1);
    assert_eq!(log.writes().len(), 3);

    // Re-election repeats the configuration.
    cp.dispatch(&arbitration(0)).await.unwrap();
    assert_eq!(log.pipeline_pushes(), 2);
    assert_eq!(log.writes().len(), 6);
}

#[tokio::test]
async fn test_pipeline_failure_does_not_stop_arbitration() {
    let trace = Trace::default();
    let con = MockChannel::new(1, 1).fail_pipeline();
    let log = con.log();
    let mut cp = stack(con, &[("a", Outcome::Pass)], &trace);

    cp.dispatch(&arbitration(0)).await.unwrap();
    assert_eq!(take(&trace), vec!["a:arb"]);
    assert_eq!(log.pipeline_pushes(), 0);
    assert_eq!(log.writes().len(), 1);
}

#[tokio::test]
async fn test_non_fatal_error_counts_as_handled() {
    let trace = Trace::default();
    let mut cp = stack(
        MockChannel::new(1, 1),
        &[("a", Outcome::Handle), ("b", Outcome::Fail)],
        &trace,
    );
    cp.dispatch(&packet()).await.unwrap();
    assert_eq!(take(&trace), vec!["b:packet"]);
}

#[tokio::test]
async fn test_run_until_stream_closes() {
    let trace = Trace::default();
    let con = MockChannel::new(1, 1).with_events(vec![arbitration(0), packet(), digest()]);
    let log = con.log();
    let mut cp = stack(con, &[("a", Outcome::Handle)], &trace);
    assert_eq!(cp.state(), DispatcherState::Unarbitrated);

    cp.run().await.unwrap();

    assert_eq!(cp.state(), DispatcherState::Terminated);
    assert_eq!(log.arbitrations(), 1);
    assert_eq!(take(&trace), vec!["a:arb", "a:packet", "a:digest"]);
}

#[tokio::test]
async fn test_run_fails_when_announce_fails() {
    let trace = Trace::default();
    let con = MockChannel::new(1, 1)
        .with_events(vec![packet()])
        .fail_arbitration();
    let mut cp = stack(con, &[("a", Outcome::Handle)], &trace);

    let result = cp.run().await;
    assert!(matches!(result, Err(Error::Transport(_))));
    assert_eq!(cp.state(), DispatcherState::Terminated);
    assert!(take(&trace).is_empty());
}

#[tokio::test]
async fn test_fatal_error_stops_loop() {
    let trace = Trace::default();
    let con = MockChannel::new(1, 1).with_events(vec![digest(), packet()]);
    let mut cp = stack(con, &[("a", Outcome::Handle), ("b", Outcome::Fatal)], &trace);

    let result = cp.run().await;
    assert!(matches!(result, Err(Error::Protocol(_))));
    assert_eq!(cp.state(), DispatcherState::Terminated);
    // The remaining packet-in is never read.
    assert_eq!(take(&trace), vec!["b:digest"]);
}
