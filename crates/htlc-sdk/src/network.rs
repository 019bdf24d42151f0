//! Per-network parameters: policy asset, address encoding and the default
//! Electrum endpoint.

use std::fmt;
use std::str::FromStr;

use lwk_wollet::ElementsNetwork;
use lwk_wollet::elements::{AddressParams, AssetId};
use serde::{Deserialize, Serialize};

/// Liquid chain a swap lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Liquid,
    LiquidTestnet,
    LiquidRegtest,
}

impl Network {
    pub const ALL: [Network; 3] = [
        Network::Liquid,
        Network::LiquidTestnet,
        Network::LiquidRegtest,
    ];

    /// Regtest uses the default elementsd policy asset.
    pub fn lwk_network(self) -> ElementsNetwork {
        match self {
            Network::Liquid => ElementsNetwork::Liquid,
            Network::LiquidTestnet => ElementsNetwork::LiquidTestnet,
            Network::LiquidRegtest => ElementsNetwork::default_regtest(),
        }
    }

    /// Asset swap amounts and sweep fees are denominated in.
    pub fn policy_asset(self) -> AssetId {
        self.lwk_network().policy_asset()
    }

    pub fn is_mainnet(self) -> bool {
        self == Network::Liquid
    }

    pub fn address_params(self) -> &'static AddressParams {
        match self {
            Network::Liquid => &AddressParams::LIQUID,
            Network::LiquidTestnet => &AddressParams::LIQUID_TESTNET,
            Network::LiquidRegtest => &AddressParams::ELEMENTS,
        }
    }

    pub fn default_electrum_url(self) -> &'static str {
        match self {
            Network::Liquid => "ssl://blockstream.info:995",
            Network::LiquidTestnet => "ssl://blockstream.info:465",
            Network::LiquidRegtest => "tcp://localhost:50001",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Network::Liquid => "liquid",
            Network::LiquidTestnet => "liquid-testnet",
            Network::LiquidRegtest => "liquid-regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = String;

    /// Accepts the display name, the serde name and the bare chain names
    /// (`mainnet`, `testnet`, `regtest`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('_', "-");
        let bare = match wanted.as_str() {
            "mainnet" => Some(Network::Liquid),
            "testnet" => Some(Network::LiquidTestnet),
            "regtest" => Some(Network::LiquidRegtest),
            _ => None,
        };
        bare.or_else(|| {
            Network::ALL
                .into_iter()
                .find(|n| n.name() == wanted || n.name().replace('-', "") == wanted)
        })
        .ok_or_else(|| format!("unknown network: {s}"))
    }
}
