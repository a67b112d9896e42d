//! In-band network telemetry for SCION traffic.
//!
//! On election the controller programs the INT tables: packets towards the
//! local AS are cloned to the CPU port (this node is the INT sink), packets
//! towards the ASes of the static rule table get a telemetry header with the
//! configured bitmasks. The clones arrive as packet-ins; their INT stack is
//! decoded into a report that is published to the message queue and, if
//! configured, to a raw TCP stream.

use async_trait::async_trait;
use log::{debug, info, warn};
use prost::Message;
use rust_p4cp_common::{
    p4info::P4Info,
    p4rt::{MasterArbitrationUpdate, PacketIn, UpdateType, WriteRequest},
    types::{IsdAs, NodeId},
    Error, Result,
};
use rust_p4cp_runtime::{Controller, DeviceChannel};

use crate::entries;
use crate::SwitchSettings;

pub mod decode;
pub mod report;
pub mod sink;
pub mod table;

pub use decode::{TelemetryHop, TelemetryPacket};
pub use report::{FlowKey, Node, Report};
pub use sink::{KafkaPublisher, LogPublisher, ReportPublisher, TcpReportStream};
pub use table::{StaticRule, StaticRuleSet};

/// Counter of transmitted bytes per egress port.
pub const COUNTER_TX_BYTE_NAME: &str = "txCounter";

pub struct IntController {
    counter_tx_id: u32,
    host: IsdAs,
    node_id: NodeId,
    table: StaticRuleSet,
    settings: SwitchSettings,
    publisher: Box<dyn ReportPublisher>,
    tcp: TcpReportStream,
}

impl IntController {
    /// Create the controller for the node `node_id` in AS `host_as`
    /// (`"<isd>-<as>"`).
    ///
    /// Fails with [`Error::Config`] if `p4info` lacks the tx byte counter or
    /// `host_as` is not a valid ISD-AS address.
    pub fn new(
        p4info: &P4Info,
        host_as: &str,
        node_id: NodeId,
        table: StaticRuleSet,
        settings: &SwitchSettings,
        publisher: Box<dyn ReportPublisher>,
    ) -> Result<Self> {
        let counter_tx_id = p4info.counter_id(COUNTER_TX_BYTE_NAME).ok_or_else(|| {
            Error::Config(format!(
                "P4Info does not contain a counter of the name {}",
                COUNTER_TX_BYTE_NAME
            ))
        })?;
        let host: IsdAs = host_as.parse()?;
        debug!("tx byte counter id is {:#x}", counter_tx_id);

        Ok(Self {
            counter_tx_id,
            host,
            node_id,
            table,
            settings: *settings,
            publisher,
            tcp: TcpReportStream::disabled(),
        })
    }

    /// Additionally send every report to `tcp`.
    pub fn with_tcp_stream(mut self, tcp: TcpReportStream) -> Self {
        self.tcp = tcp;
        self
    }

    pub fn counter_tx_id(&self) -> u32 {
        self.counter_tx_id
    }

    pub fn host(&self) -> IsdAs {
        self.host
    }

    /// Clone packets towards the local AS to the controller.
    fn sink_rule(&self, con: &dyn DeviceChannel) -> WriteRequest {
        info!("Node serves as sink for AS {}", self.host);

        let mut request = con.create_write_request();
        request.add_update(
            UpdateType::Insert,
            entries::clone_int_entry(self.host.isd, self.host.asn),
        );
        request
    }

    /// One batch per remote AS of the static table.
    fn remote_rules(&self, con: &dyn DeviceChannel) -> Vec<WriteRequest> {
        self.table
            .iter()
            .filter(|rule| rule.isd_as != self.host)
            .map(|rule| {
                debug!(
                    "Write INT bitmask {:#06x} and SCION bitmask {:#06x} for AS {}",
                    rule.int_bitmask, rule.scion_bitmask, rule.isd_as
                );
                let mut request = con.create_write_request();
                request.add_update(
                    UpdateType::Insert,
                    entries::insert_int_entry(
                        rule.isd_as.isd,
                        rule.isd_as.asn,
                        rule.int_bitmask,
                        rule.scion_bitmask,
                    ),
                );
                request
            })
            .collect()
    }

    /// Node id, AS address and zeroed link utilization of every port.
    fn node_rules(&self, con: &dyn DeviceChannel) -> WriteRequest {
        let mut request = con.create_write_request();
        request.add_update(UpdateType::Insert, entries::node_id_entry(self.node_id));
        request.add_update(UpdateType::Insert, entries::as_addr_entry(self.host.asn));
        for port in 0..self.settings.tx_util_entries {
            request.add_update(UpdateType::Insert, entries::tx_util_entry(port, 0));
        }
        request
    }

    fn clone_session(&self, con: &dyn DeviceChannel) -> WriteRequest {
        let mut request = con.create_write_request();
        request.add_update(
            UpdateType::Insert,
            entries::cpu_clone_session(self.settings.clone_session_id, self.settings.cpu_port),
        );
        request
    }
}

#[async_trait]
impl Controller for IntController {
    fn name(&self) -> &str {
        "int"
    }

    async fn handle_arbitration_update(
        &mut self,
        con: &mut dyn DeviceChannel,
        arb_update: &MasterArbitrationUpdate,
    ) -> Result<()> {
        if !arb_update.is_primary() {
            return Ok(());
        }

        let mut batches = vec![self.sink_rule(con)];
        batches.extend(self.remote_rules(con));
        batches.push(self.node_rules(con));
        batches.push(self.clone_session(con));

        for request in &batches {
            if let Err(e) = con.send_write_request(request).await {
                warn!("Installing INT table entries failed: {}", e);
            }
        }
        Ok(())
    }

    async fn handle_packet_in(
        &mut self,
        _con: &mut dyn DeviceChannel,
        packet_in: &PacketIn,
    ) -> Result<bool> {
        let packet = match TelemetryPacket::decode(&packet_in.payload) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping telemetry packet: {}", e);
                return Ok(false);
            }
        };

        let key = FlowKey {
            flow_id: packet.flow_key(),
        }
        .encode_to_vec();
        let report = packet.to_report().encode_to_vec();
        let topic = packet.topic(self.node_id);
        debug!(
            "INT report for flow {:#x} with {} hops",
            packet.flow_key(),
            packet.hops.len()
        );

        if let Err(e) = self.publisher.publish(&topic, &key, &report).await {
            warn!("Failed to send message to topic {}: {}", topic, e);
        }
        self.tcp.send(&report).await;

        Ok(true)
    }
}

#[cfg(test)]
mod tests;
