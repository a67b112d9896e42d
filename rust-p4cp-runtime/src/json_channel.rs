//! Device channel speaking newline-delimited JSON over TCP.
//!
//! Each line is one serialized [`ChannelRequest`] (controller to device) or
//! [`ChannelResponse`] (device to controller). The peer is a P4Runtime proxy
//! next to the switch which maps these documents onto the gRPC stream and
//! unary RPCs.
//!
//! Stream writes (arbitration, digest acknowledgements) are fire-and-forget.
//! Unary calls (pipeline config, writes) wait for the next `Reply`; stream
//! messages that arrive in the meantime are queued and handed out by later
//! [`DeviceChannel::read_stream`] calls in arrival order.

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, trace, warn};
use rust_p4cp_common::{
    p4info::P4Info,
    p4rt::{Status, StreamMessage, Uint128, WriteRequest},
    types::{DeviceConfig, DeviceId, ElectionId},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};

use crate::DeviceChannel;

/// Messages sent to the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum ChannelRequest {
    /// Master arbitration update on the stream. The role is left unset to
    /// request full access.
    Arbitration {
        device_id: DeviceId,
        election_id: Uint128,
    },
    /// SetForwardingPipelineConfig with action VERIFY_AND_COMMIT.
    SetPipelineConfig {
        device_id: DeviceId,
        election_id: Uint128,
        p4info: serde_json::Value,
        p4_device_config: Bytes,
    },
    Write(WriteRequest),
    DigestAck { digest_id: u32, list_id: u64 },
}

/// Messages received from the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum ChannelResponse {
    Stream(StreamMessage),
    /// Completion of the oldest outstanding unary call.
    Reply(Status),
}

/// [`DeviceChannel`] over a TCP connection to a P4Runtime proxy.
pub struct JsonStreamChannel {
    device_id: DeviceId,
    election_id: ElectionId,
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    pending: VecDeque<StreamMessage>,
    closed: bool,
}

impl JsonStreamChannel {
    /// Connect to the switch and open the stream channel.
    pub async fn connect(
        address: &str,
        device_id: DeviceId,
        election_id: ElectionId,
        connect_timeout: Duration,
    ) -> Result<Self> {
        debug!("Connecting to {}", address);

        let stream = timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| Error::Transport(format!("Not connected: {} timed out", address)))?
            .map_err(|e| Error::Transport(format!("Not connected: {}: {}", address, e)))?;

        info!("Connected to switch at {}", address);

        Ok(Self::from_stream(stream, device_id, election_id))
    }

    /// Wrap an established connection.
    pub fn from_stream(stream: TcpStream, device_id: DeviceId, election_id: ElectionId) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            device_id,
            election_id,
            reader: BufReader::new(read_half).lines(),
            writer: write_half,
            pending: VecDeque::new(),
            closed: false,
        }
    }

    async fn send(&mut self, request: &ChannelRequest) -> Result<()> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');

        trace!("Sending {} bytes", line.len());

        self.writer
            .write_all(&line)
            .await
            .map_err(|e| Error::Transport(format!("Stream write failed: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| Error::Transport(format!("Stream write failed: {}", e)))
    }

    async fn next_response(&mut self) -> Result<Option<ChannelResponse>> {
        loop {
            let line = self
                .reader
                .next_line()
                .await
                .map_err(|e| Error::Transport(format!("Stream read failed: {}", e)))?;

            match line {
                None => {
                    self.closed = true;
                    return Ok(None);
                }
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => match serde_json::from_str(&line) {
                    Ok(response) => return Ok(Some(response)),
                    Err(e) => warn!("Ignoring invalid message from switch: {}", e),
                },
            }
        }
    }

    /// Send a unary request and wait for its reply.
    async fn call(&mut self, request: &ChannelRequest) -> Result<()> {
        self.send(request).await?;
        loop {
            match self.next_response().await? {
                None => {
                    return Err(Error::Transport(
                        "Stream closed while waiting for a reply".into(),
                    ))
                }
                Some(ChannelResponse::Stream(msg)) => self.pending.push_back(msg),
                Some(ChannelResponse::Reply(status)) if status.is_ok() => return Ok(()),
                Some(ChannelResponse::Reply(status)) => {
                    return Err(Error::Transport(format!(
                        "{} (code {})",
                        status.message, status.code
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl DeviceChannel for JsonStreamChannel {
    fn device_id(&self) -> DeviceId {
        self.device_id
    }

    fn election_id(&self) -> ElectionId {
        self.election_id
    }

    async fn send_master_arbitration_update(&mut self) -> Result<()> {
        let request = ChannelRequest::Arbitration {
            device_id: self.device_id,
            election_id: self.election_id.into(),
        };
        self.send(&request).await
    }

    async fn set_pipeline_config(&mut self, p4info: &P4Info, config: &DeviceConfig) -> Result<()> {
        let request = ChannelRequest::SetPipelineConfig {
            device_id: self.device_id,
            election_id: self.election_id.into(),
            p4info: p4info.raw().clone(),
            p4_device_config: config.clone(),
        };
        self.call(&request)
            .await
            .map_err(|e| Error::Transport(format!("Setting pipeline config failed: {}", e)))
    }

    async fn send_write_request(&mut self, request: &WriteRequest) -> Result<()> {
        // The request is cloned into the envelope; batches are small apart
        // from the one-off static setup.
        self.call(&ChannelRequest::Write(request.clone()))
            .await
            .map_err(|e| Error::Transport(format!("Write request failed: {}", e)))
    }

    async fn read_stream(&mut self) -> Result<Option<StreamMessage>> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Some(msg));
        }
        while !self.closed {
            match self.next_response().await? {
                Some(ChannelResponse::Stream(msg)) => return Ok(Some(msg)),
                Some(ChannelResponse::Reply(status)) => {
                    warn!("Unexpected reply without outstanding request: {:?}", status);
                }
                None => break,
            }
        }
        Ok(None)
    }

    async fn ack_digest_list(&mut self, digest_id: u32, list_id: u64) -> Result<()> {
        self.send(&ChannelRequest::DigestAck { digest_id, list_id })
            .await
    }
}
