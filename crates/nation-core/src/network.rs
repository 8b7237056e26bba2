//! Per-network ledger constants

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::NationError;

/// Block the dev nation contract was deployed in
pub const DEV_CONTRACT_CREATION_BLOCK: u64 = 2_516_200;

/// Block the prod nation contract was deployed in
pub const PROD_CONTRACT_CREATION_BLOCK: u64 = 5_918_740;

pub const DEV_CONTRACT_ADDRESS: &str = "0x559f57f7dbe737319f8d28f8a94f1dcee9f468ad";
pub const PROD_CONTRACT_ADDRESS: &str = "0xa014847cff475826804f2e0a178096b10eeed7a7";

/// Ledger network the account talks to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Dev,
    Prod,
}

impl Network {
    /// Event cursor reset point for a full history replay
    pub fn contract_creation_block(self) -> u64 {
        match self {
            Network::Dev => DEV_CONTRACT_CREATION_BLOCK,
            Network::Prod => PROD_CONTRACT_CREATION_BLOCK,
        }
    }

    pub fn contract_address(self) -> &'static str {
        match self {
            Network::Dev => DEV_CONTRACT_ADDRESS,
            Network::Prod => PROD_CONTRACT_ADDRESS,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Dev => f.write_str("dev"),
            Network::Prod => f.write_str("prod"),
        }
    }
}

impl FromStr for Network {
    type Err = NationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Network::Dev),
            "prod" => Ok(Network::Prod),
            other => Err(NationError::InvalidConfig(format!("unknown network: {other}"))),
        }
    }
}
