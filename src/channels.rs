//! Channel eligibility for one swap attempt.
//!
//! The inventory is split into channels that carry only native balance and
//! channels that carry asset balance, restricted to active channels with the
//! requested counter-party. The first entry of each list is the one used.

use tracing::debug;

use crate::errors::{AppError, Result};
use crate::models::{AssetChannelData, ChannelCandidate, ChannelKind};
use crate::rpc::{AliasMap, ChannelInfo, ChannelInventory};

/// Classify one raw listing entry. Any custom data makes the channel asset-capable.
pub fn parse_channel(info: &ChannelInfo) -> Result<ChannelCandidate> {
    let kind = if info.custom_channel_data.is_empty() {
        ChannelKind::SatsOnly
    } else {
        let data: AssetChannelData = serde_json::from_slice(&info.custom_channel_data)
            .map_err(|source| AppError::ChannelData {
                chan_id: info.chan_id,
                source,
            })?;
        ChannelKind::AssetCapable(data)
    };
    Ok(ChannelCandidate {
        chan_id: info.chan_id,
        channel_point: info.channel_point.clone(),
        remote_pubkey: info.remote_pubkey.clone(),
        active: info.active,
        local_balance: info.local_balance,
        remote_balance: info.remote_balance,
        peer_scid_alias: info.peer_scid_alias,
        kind,
    })
}

/// Disjoint, inventory-ordered eligible channels toward one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSelection {
    pub sats: Vec<ChannelCandidate>,
    pub assets: Vec<ChannelCandidate>,
}

impl ChannelSelection {
    /// Pure partition of `channels`.
    ///
    /// With `funded_with` set, asset channels must have been funded with that
    /// asset id. Fails with [`AppError::NoEligibleChannel`] when either side is empty.
    pub fn from_inventory(
        channels: &[ChannelInfo],
        peer_pubkey: &str,
        funded_with: Option<&str>,
    ) -> Result<Self> {
        let mut sats = Vec::new();
        let mut assets = Vec::new();

        for info in channels {
            if !info.active || info.remote_pubkey != peer_pubkey {
                continue;
            }
            let candidate = parse_channel(info)?;
            match &candidate.kind {
                ChannelKind::SatsOnly => sats.push(candidate),
                ChannelKind::AssetCapable(data) => {
                    if funded_with.is_none_or(|id| data.is_funded_with(id)) {
                        assets.push(candidate);
                    }
                }
            }
        }
        debug!(
            peer = peer_pubkey,
            sats = sats.len(),
            assets = assets.len(),
            "[SWAP] channel inventory partitioned"
        );

        if sats.is_empty() {
            return Err(AppError::NoEligibleChannel(format!(
                "no active sats-only channel with {peer_pubkey}"
            )));
        }
        if assets.is_empty() {
            return Err(AppError::NoEligibleChannel(format!(
                "no active asset channel with {peer_pubkey}"
            )));
        }
        Ok(Self { sats, assets })
    }

    /// List the node's channels and partition them.
    pub async fn fetch(
        inventory: &dyn ChannelInventory,
        peer_pubkey: &str,
        funded_with: Option<&str>,
    ) -> Result<Self> {
        let channels = inventory.list_channels().await?;
        Self::from_inventory(&channels, peer_pubkey, funded_with)
    }

    pub fn first_sats(&self) -> Result<&ChannelCandidate> {
        self.sats
            .first()
            .ok_or_else(|| AppError::NoEligibleChannel("no sats channel selected".into()))
    }

    pub fn first_asset(&self) -> Result<&ChannelCandidate> {
        self.assets
            .first()
            .ok_or_else(|| AppError::NoEligibleChannel("no asset channel selected".into()))
    }

    pub fn sats_chan_ids(&self) -> Vec<u64> {
        self.sats.iter().map(|c| c.chan_id).collect()
    }
}

/// Highest most-recent alias recorded for `base_scid`, if any.
pub fn resolve_alias_scid(aliases: &[AliasMap], base_scid: u64) -> Option<u64> {
    aliases
        .iter()
        .filter(|m| m.base_scid == base_scid)
        .filter_map(|m| m.aliases.last().copied())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PEER: &str = "02aa";
    const OTHER: &str = "03bb";
    const ASSET: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";

    fn asset_data(asset_id: &str) -> Vec<u8> {
        format!(
            r#"{{"funding_assets":[{{"asset_genesis":{{"asset_id":"{asset_id}"}},"amount":1000}}],"local_balance":600,"remote_balance":400}}"#
        )
        .into_bytes()
    }

    fn chan(id: u64, peer: &str, active: bool, custom: Vec<u8>) -> ChannelInfo {
        ChannelInfo {
            chan_id: id,
            channel_point: format!("tx{id}:0"),
            remote_pubkey: peer.to_string(),
            active,
            local_balance: 100_000,
            remote_balance: 100_000,
            peer_scid_alias: 16_000_000 + id,
            custom_channel_data: custom,
        }
    }

    #[test]
    fn partitions_by_kind_state_and_peer() {
        let inv = vec![
            chan(1, PEER, false, vec![]),
            chan(2, OTHER, true, vec![]),
            chan(3, PEER, true, asset_data(ASSET)),
            chan(4, PEER, true, vec![]),
            chan(5, PEER, true, vec![]),
        ];
        let sel = ChannelSelection::from_inventory(&inv, PEER, None).unwrap();
        assert_eq!(sel.sats_chan_ids(), vec![4, 5]);
        assert_eq!(sel.first_asset().unwrap().chan_id, 3);
        assert_eq!(sel.first_sats().unwrap().peer_scid_alias, 16_000_004);
        assert!(sel.first_asset().unwrap().is_asset_capable());
    }

    #[test]
    fn missing_side_is_no_eligible_channel() {
        let only_sats = vec![chan(1, PEER, true, vec![])];
        let err = ChannelSelection::from_inventory(&only_sats, PEER, None).unwrap_err();
        assert!(matches!(err, AppError::NoEligibleChannel(_)));

        let only_assets = vec![chan(1, PEER, true, asset_data(ASSET))];
        let err = ChannelSelection::from_inventory(&only_assets, PEER, None).unwrap_err();
        assert!(matches!(err, AppError::NoEligibleChannel(_)));
    }

    #[test]
    fn funding_asset_filter() {
        let inv = vec![
            chan(1, PEER, true, vec![]),
            chan(2, PEER, true, asset_data(&"ff".repeat(32))),
            chan(3, PEER, true, asset_data(ASSET)),
        ];
        let sel = ChannelSelection::from_inventory(&inv, PEER, Some(ASSET)).unwrap();
        assert_eq!(sel.assets.len(), 1);
        assert_eq!(sel.first_asset().unwrap().chan_id, 3);

        let none = ChannelSelection::from_inventory(&inv[..2], PEER, Some(ASSET));
        assert!(none.is_err());
    }

    #[test]
    fn malformed_custom_data_fails() {
        let inv = vec![
            chan(1, PEER, true, vec![]),
            chan(2, PEER, true, b"{not json".to_vec()),
        ];
        let err = ChannelSelection::from_inventory(&inv, PEER, None).unwrap_err();
        assert!(matches!(err, AppError::ChannelData { chan_id: 2, .. }));
        assert_eq!(err.kind(), crate::errors::ErrorKind::Execution);
    }

    #[test]
    fn alias_resolution_takes_highest_last_alias() {
        let maps = vec![
            AliasMap {
                base_scid: 7,
                aliases: vec![100, 300],
            },
            AliasMap {
                base_scid: 9,
                aliases: vec![999],
            },
            AliasMap {
                base_scid: 7,
                aliases: vec![500, 200],
            },
        ];
        assert_eq!(resolve_alias_scid(&maps, 7), Some(300));
        assert_eq!(resolve_alias_scid(&maps, 8), None);
    }

    fn arb_channel() -> impl Strategy<Value = ChannelInfo> {
        (
            1u64..50,
            prop::bool::ANY,
            prop::bool::ANY,
            prop::bool::ANY,
        )
            .prop_map(|(id, active, same_peer, asset)| {
                let peer = if same_peer { PEER } else { OTHER };
                let custom = if asset { asset_data(ASSET) } else { vec![] };
                chan(id, peer, active, custom)
            })
    }

    proptest! {
        #[test]
        fn selection_is_disjoint_active_and_peer_bound(inv in prop::collection::vec(arb_channel(), 0..20)) {
            if let Ok(sel) = ChannelSelection::from_inventory(&inv, PEER, None) {
                for c in sel.sats.iter().chain(sel.assets.iter()) {
                    prop_assert!(c.active);
                    prop_assert_eq!(c.remote_pubkey.as_str(), PEER);
                }
                prop_assert!(sel.sats.iter().all(|c| !c.is_asset_capable()));
                prop_assert!(sel.assets.iter().all(|c| c.is_asset_capable()));
            }
        }
    }
}
