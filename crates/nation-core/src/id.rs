//! Identity types for nation records
//!
//! Local ids are allocated by this process and are unique per account.
//! Contract ids are assigned by the ledger and are authoritative once set.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Local record identity - monotonically allocated, unique per account
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LocalId(pub u64);

impl LocalId {
    /// The first id handed out on an empty store
    pub const FIRST: LocalId = LocalId(1);

    #[inline]
    pub fn new(id: u64) -> Self {
        LocalId(id)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }

    /// The id directly after this one
    #[inline]
    pub fn next(self) -> Self {
        LocalId(self.0 + 1)
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Local({})", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger-assigned record identity (`idInSmartContract`)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ContractId(pub u64);

impl ContractId {
    #[inline]
    pub fn new(id: u64) -> Self {
        ContractId(id)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Contract({})", self.0)
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning account identity
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger transaction hash
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        TxHash(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tx({})", self.0)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxHash {
    fn from(hash: &str) -> Self {
        TxHash(hash.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_id_next() {
        assert_eq!(LocalId::FIRST.next(), LocalId::new(2));
        assert!(LocalId::new(3) < LocalId::new(5));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(format!("{:?}", LocalId::new(7)), "Local(7)");
        assert_eq!(format!("{}", ContractId::new(42)), "42");
        assert_eq!(format!("{:?}", TxHash::from("0xabc")), "Tx(0xabc)");
    }

    #[test]
    fn test_ids_serialize_transparently_as_numbers() {
        let json = serde_json::to_string(&ContractId::new(9)).unwrap();
        assert_eq!(json, "9");
    }
}
