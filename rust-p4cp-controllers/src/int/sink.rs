//! Destinations for telemetry reports.

use async_trait::async_trait;
use log::{debug, info, trace, warn};
use rdkafka::{
    config::ClientConfig,
    producer::{FutureProducer, FutureRecord},
};
use rust_p4cp_common::{types::split_ip_address, Error, Result};
use std::time::Duration;
use tokio::{io::AsyncWriteExt, net::TcpStream, time::timeout};

/// Keyed message queue the reports are published to.
#[async_trait]
pub trait ReportPublisher: Send {
    async fn publish(&mut self, topic: &str, key: &[u8], report: &[u8]) -> Result<()>;
}

/// How long the producer keeps undelivered reports before giving up.
const KAFKA_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Publisher producing every report to a Kafka cluster.
///
/// Producing only enqueues the report; delivery happens in the background
/// and failures are logged.
pub struct KafkaPublisher {
    producer: FutureProducer,
}

impl KafkaPublisher {
    /// Create a producer for the brokers in `bootstrap_servers`
    /// (`host:port[,host:port...]`). No connection is made yet.
    pub fn new(bootstrap_servers: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set(
                "message.timeout.ms",
                KAFKA_MESSAGE_TIMEOUT.as_millis().to_string(),
            )
            .create()
            .map_err(|e| Error::Config(format!("Failed to create Kafka producer: {}", e)))?;

        info!("Publishing telemetry reports to Kafka at {}", bootstrap_servers);
        Ok(Self { producer })
    }
}

#[async_trait]
impl ReportPublisher for KafkaPublisher {
    async fn publish(&mut self, topic: &str, key: &[u8], report: &[u8]) -> Result<()> {
        let record = FutureRecord::to(topic).key(key).payload(report);
        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| Error::Transport(format!("Producing to {} failed: {}", topic, e)))?;

        let topic = topic.to_string();
        tokio::spawn(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => {
                    trace!("Report delivered to {} [{}] at {}", topic, partition, offset)
                }
                Ok(Err((e, _))) => warn!("Report to {} not delivered: {}", topic, e),
                Err(_) => warn!("Report to {} dropped by the producer", topic),
            }
        });
        Ok(())
    }
}

/// Publisher that only logs what it would send to the broker.
#[derive(Debug, Clone)]
pub struct LogPublisher {
    broker: String,
    published: u64,
}

impl LogPublisher {
    pub fn new(broker: &str) -> Self {
        info!("Publishing telemetry reports for broker {}", broker);
        Self {
            broker: broker.to_string(),
            published: 0,
        }
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}

#[async_trait]
impl ReportPublisher for LogPublisher {
    async fn publish(&mut self, topic: &str, key: &[u8], report: &[u8]) -> Result<()> {
        self.published += 1;
        debug!(
            "[{}] {}: key {} bytes, report {} bytes",
            self.broker,
            topic,
            key.len(),
            report.len()
        );
        Ok(())
    }
}

/// Raw byte stream of reports. Every report is preceded by its length as a
/// little-endian `u32`.
///
/// The stream is connected once. If that fails, or the peer goes away
/// later, the sink disables itself and further reports are dropped.
#[derive(Debug)]
pub struct TcpReportStream {
    stream: Option<TcpStream>,
}

impl TcpReportStream {
    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self { stream: None }
    }

    /// Connect to `address` (`ip:port`). An empty address disables the sink.
    pub async fn connect(address: &str, connect_timeout: Duration) -> Self {
        if address.is_empty() {
            return Self::disabled();
        }

        let (ip, port) = match split_ip_address(address) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("Invalid TCP report address: {}. TCP server is not used.", e);
                return Self::disabled();
            }
        };

        match timeout(connect_timeout, TcpStream::connect((ip.as_str(), port))).await {
            Ok(Ok(stream)) => {
                info!("Streaming telemetry reports to {}", address);
                Self {
                    stream: Some(stream),
                }
            }
            Ok(Err(e)) => {
                warn!("Could not connect to TCP server {}: {}. TCP server is not used.", address, e);
                Self::disabled()
            }
            Err(_) => {
                warn!("Connecting to TCP server {} timed out. TCP server is not used.", address);
                Self::disabled()
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub async fn send(&mut self, report: &[u8]) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        let Some(prefix) = length_prefix(report.len()) else {
            warn!("Report of {} bytes exceeds the frame size, dropped", report.len());
            return;
        };

        let mut frame = Vec::with_capacity(4 + report.len());
        frame.extend_from_slice(&prefix);
        frame.extend_from_slice(report);

        if let Err(e) = stream.write_all(&frame).await {
            info!("TCP connection was closed: {}", e);
            self.stream = None;
        }
    }
}

/// Frame header for a report of `len` bytes, if the length fits.
fn length_prefix(len: usize) -> Option<[u8; 4]> {
    u32::try_from(len).ok().map(u32::to_le_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_length_prefixed_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut sink = TcpReportStream::connect(&addr, Duration::from_secs(5)).await;
        assert!(sink.is_active());
        sink.send(b"abc").await;
        sink.send(b"").await;
        drop(sink);

        let received = server.await.unwrap();
        assert_eq!(received, b"\x03\x00\x00\x00abc\x00\x00\x00\x00");
    }

    #[test]
    fn test_length_prefix() {
        assert_eq!(length_prefix(3), Some([3, 0, 0, 0]));
        assert_eq!(length_prefix(u32::MAX as usize), Some([0xff; 4]));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(length_prefix(u32::MAX as usize + 1), None);
    }

    #[tokio::test]
    async fn test_unreachable_sink_is_disabled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut sink = TcpReportStream::connect(&addr, Duration::from_secs(5)).await;
        assert!(!sink.is_active());
        sink.send(b"dropped").await;

        assert!(!TcpReportStream::connect("", Duration::from_secs(1)).await.is_active());
        assert!(!TcpReportStream::connect("localhost", Duration::from_secs(1)).await.is_active());
    }

    #[tokio::test]
    async fn test_kafka_publisher_enqueues_without_broker() {
        // Nothing listens on port 1; producing only queues the report.
        let mut publisher = KafkaPublisher::new("127.0.0.1:1").unwrap();
        publisher
            .publish("ASff00_0_110-1", b"\x08\x01", b"report")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_log_publisher() {
        let mut publisher = LogPublisher::new("localhost:9092");
        publisher.publish("ASff00_0_110-1", b"\x08\x01", b"report").await.unwrap();
        assert_eq!(publisher.published(), 1);
    }
}
