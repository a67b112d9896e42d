//! Scripted in-memory device channel for tests.

use async_trait::async_trait;
use rust_p4cp_common::{
    p4info::P4Info,
    p4rt::{StreamMessage, WriteRequest},
    types::{DeviceConfig, DeviceId, ElectionId},
    Error, Result,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::DeviceChannel;

#[derive(Debug, Default)]
struct Recorded {
    arbitrations: usize,
    pipeline_pushes: usize,
    writes: Vec<WriteRequest>,
    acks: Vec<(u32, u64)>,
}

/// Everything a [`MockChannel`] was asked to send. Clones share the record,
/// so a test can keep one while the channel is owned by a control plane.
#[derive(Debug, Clone, Default)]
pub struct MockLog(Arc<Mutex<Recorded>>);

impl MockLog {
    fn lock(&self) -> MutexGuard<'_, Recorded> {
        // A panicking test poisons the lock; the record is still readable.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn arbitrations(&self) -> usize {
        self.lock().arbitrations
    }

    pub fn pipeline_pushes(&self) -> usize {
        self.lock().pipeline_pushes
    }

    pub fn writes(&self) -> Vec<WriteRequest> {
        self.lock().writes.clone()
    }

    pub fn acks(&self) -> Vec<(u32, u64)> {
        self.lock().acks.clone()
    }
}

/// A [`DeviceChannel`] replaying a fixed list of stream messages.
///
/// Once the script is exhausted the stream reports closed.
#[derive(Debug)]
pub struct MockChannel {
    device_id: DeviceId,
    election_id: ElectionId,
    script: VecDeque<StreamMessage>,
    log: MockLog,
    fail_arbitration: bool,
    fail_pipeline: bool,
    fail_writes: bool,
}

impl MockChannel {
    pub fn new(device_id: DeviceId, election_id: ElectionId) -> Self {
        Self {
            device_id,
            election_id,
            script: VecDeque::new(),
            log: MockLog::default(),
            fail_arbitration: false,
            fail_pipeline: false,
            fail_writes: false,
        }
    }

    /// Queue a message to be returned by `read_stream`.
    pub fn push_event(&mut self, msg: StreamMessage) {
        self.script.push_back(msg);
    }

    pub fn with_events<I: IntoIterator<Item = StreamMessage>>(mut self, events: I) -> Self {
        self.script.extend(events);
        self
    }

    pub fn fail_arbitration(mut self) -> Self {
        self.fail_arbitration = true;
        self
    }

    pub fn fail_pipeline(mut self) -> Self {
        self.fail_pipeline = true;
        self
    }

    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn log(&self) -> MockLog {
        self.log.clone()
    }
}

#[async_trait]
impl DeviceChannel for MockChannel {
    fn device_id(&self) -> DeviceId {
        self.device_id
    }

    fn election_id(&self) -> ElectionId {
        self.election_id
    }

    async fn send_master_arbitration_update(&mut self) -> Result<()> {
        if self.fail_arbitration {
            return Err(Error::Transport("Stream write failed: broken pipe".into()));
        }
        self.log.lock().arbitrations += 1;
        Ok(())
    }

    async fn set_pipeline_config(&mut self, _p4info: &P4Info, _config: &DeviceConfig) -> Result<()> {
        if self.fail_pipeline {
            return Err(Error::Transport("Setting pipeline config failed".into()));
        }
        self.log.lock().pipeline_pushes += 1;
        Ok(())
    }

    async fn send_write_request(&mut self, request: &WriteRequest) -> Result<()> {
        if self.fail_writes {
            return Err(Error::Transport("Write request failed".into()));
        }
        self.log.lock().writes.push(request.clone());
        Ok(())
    }

    async fn read_stream(&mut self) -> Result<Option<StreamMessage>> {
        Ok(self.script.pop_front())
    }

    async fn ack_digest_list(&mut self, digest_id: u32, list_id: u64) -> Result<()> {
        self.log.lock().acks.push((digest_id, list_id));
        Ok(())
    }
}
