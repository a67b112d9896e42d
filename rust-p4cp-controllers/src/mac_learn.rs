//! L2 address learning driven by data plane digests.
//!
//! The switch sends a digest for every packet whose source MAC is not yet in
//! the learn table. The controller installs the address in the learn table,
//! so no further digests are generated, and in the forward table, so traffic
//! towards the address leaves on the port it was learned on. Unknown
//! destinations are flooded through per-port multicast groups.

use async_trait::async_trait;
use log::{debug, info, warn};
use rust_p4cp_common::{
    bitstring::from_bitstring,
    p4info::P4Info,
    p4rt::{DigestList, MasterArbitrationUpdate, P4Data, UpdateType, WriteRequest},
    types::{MacAddr, Port, BROADCAST_MAC, MAC_ADDR_BYTES, PORT_BYTES},
    Error, Result,
};
use rust_p4cp_runtime::{Controller, DeviceChannel};

use crate::entries::{self, l2};
use crate::SwitchSettings;

/// Name of the digest carrying newly seen source addresses.
pub const DIGEST_MAC_LEARN_NAME: &str = "macLearnMsg_t";

pub struct MacLearningCtrl {
    digest_id: u32,
    num_ports: Port,
}

impl MacLearningCtrl {
    /// Resolve the learning digest from `p4info`.
    ///
    /// Fails with [`Error::Config`] if the program has no such digest.
    pub fn new(p4info: &P4Info, settings: &SwitchSettings) -> Result<Self> {
        let digest_id = p4info.digest_id(DIGEST_MAC_LEARN_NAME).ok_or_else(|| {
            Error::Config(format!(
                "P4Info does not contain a digest of the name {}",
                DIGEST_MAC_LEARN_NAME
            ))
        })?;
        debug!("MAC learn digest id is {:#x}", digest_id);

        Ok(Self {
            digest_id,
            num_ports: settings.num_switch_ports,
        })
    }

    pub fn digest_id(&self) -> u32 {
        self.digest_id
    }

    /// Multicast groups for flooding: group n+1 reaches all ports but n.
    fn flood_groups(&self, con: &dyn DeviceChannel) -> WriteRequest {
        let mut request = con.create_write_request();
        for port in 0..self.num_ports {
            request.add_update(UpdateType::Insert, entries::flood_group(port, self.num_ports));
        }
        request
    }

    /// Entries known a priori which must not be learned.
    fn static_entries(&self, con: &dyn DeviceChannel) -> WriteRequest {
        let mut request = con.create_write_request();
        request.add_update(
            UpdateType::Insert,
            entries::learn_entry(BROADCAST_MAC, l2::ACTION_NONE),
        );
        request
    }

    fn digest_config(&self, con: &dyn DeviceChannel) -> WriteRequest {
        let mut request = con.create_write_request();
        request.add_update(UpdateType::Insert, entries::immediate_digest(self.digest_id));
        request
    }
}

/// Extract source MAC and ingress port from one digest entry.
///
/// Both members must be bitstrings of exactly the declared widths.
fn parse_learn_msg(data: &P4Data) -> Result<(MacAddr, Port)> {
    match data {
        P4Data::Struct(members) if members.len() == 2 => match (&members[0], &members[1]) {
            (P4Data::Bitstring(mac), P4Data::Bitstring(port))
                if mac.len() == MAC_ADDR_BYTES && port.len() == PORT_BYTES =>
            {
                Ok((
                    from_bitstring::<MAC_ADDR_BYTES, MacAddr>(mac),
                    from_bitstring::<PORT_BYTES, Port>(port),
                ))
            }
            (P4Data::Bitstring(mac), P4Data::Bitstring(port)) => Err(Error::Protocol(format!(
                "Invalid digest format: got {} byte MAC and {} byte port, expected {} and {}",
                mac.len(),
                port.len(),
                MAC_ADDR_BYTES,
                PORT_BYTES
            ))),
            _ => Err(Error::Protocol("Invalid digest format: members must be bitstrings".into())),
        },
        _ => Err(Error::Protocol("Invalid digest format".into())),
    }
}

#[async_trait]
impl Controller for MacLearningCtrl {
    fn name(&self) -> &str {
        "mac-learning"
    }

    async fn handle_arbitration_update(
        &mut self,
        con: &mut dyn DeviceChannel,
        arb_update: &MasterArbitrationUpdate,
    ) -> Result<()> {
        if !arb_update.is_primary() {
            return Ok(());
        }

        let batches = [
            ("flood multicast groups", self.flood_groups(con)),
            ("static table entries", self.static_entries(con)),
            ("digest config", self.digest_config(con)),
        ];
        for (what, request) in batches {
            if let Err(e) = con.send_write_request(&request).await {
                warn!("Installing {} failed: {}", what, e);
            }
        }
        Ok(())
    }

    async fn handle_digest(
        &mut self,
        con: &mut dyn DeviceChannel,
        digest_list: &DigestList,
    ) -> Result<bool> {
        if digest_list.digest_id != self.digest_id {
            return Ok(false);
        }

        let mut request = con.create_write_request();
        for data in &digest_list.data {
            let (mac, port) = parse_learn_msg(data)?;
            info!("Learned: MAC {:#014x} is behind port {}", mac, port);

            request.add_update(UpdateType::Insert, entries::learn_entry(mac, l2::ACTION_NONE));
            request.add_update(UpdateType::Insert, entries::forward_entry(mac, port));
        }

        if request.is_empty() {
            debug!("Digest list {} carries no entries", digest_list.list_id);
        } else if let Err(e) = con.send_write_request(&request).await {
            warn!("Installing learned addresses failed: {}", e);
        }
        con.ack_digest_list(digest_list.digest_id, digest_list.list_id)
            .await?;

        Ok(true)
    }
}
