use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::Deref;

// HolderId identifies an account on the ledger: a token holder, an operator,
// an issuer or any other participant. It is a 32 byte identifier, resembling
// a public key. The all-zero id is the "zero address" and never holds tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HolderId([u8; 32]);

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Format as a hex string with a prefix of the first 6 bytes
        let prefix = hex::encode(&self.0[0..6]);
        write!(f, "holder:{}", prefix)
    }
}

impl Ord for HolderId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for HolderId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for HolderId {
    fn default() -> Self {
        HolderId::ZERO
    }
}

impl Deref for HolderId {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl HolderId {
    /// The zero address. Issuance is reported as a transfer from it and
    /// redemption as a transfer to it.
    pub const ZERO: HolderId = HolderId([0; 32]);

    pub fn new(uid: [u8; 32]) -> Self {
        HolderId(uid)
    }

    /// Create a HolderId from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        HolderId(bytes)
    }

    /// Get a reference to the internal bytes
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 32]
    }

    /// Derive a deterministic HolderId from a list of seeds.
    ///
    /// Useful for naming well-known accounts (issuer, escrow wallets) and for
    /// tests, where the same seeds must always map to the same holder.
    pub fn from_seeds(seeds: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();

        // Domain separator
        hasher.update(b"TRANCHE_Holder");

        for seed in seeds {
            hasher.update((seed.len() as u64).to_le_bytes());
            hasher.update(seed);
        }

        HolderId(hasher.finalize().into())
    }

    /// Derive a HolderId from a human readable name
    pub fn named(name: &str) -> Self {
        Self::from_seeds(&[name.as_bytes()])
    }

    /// Parse a `0x`-prefixed (or bare) 64 digit hex string
    pub fn from_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(digits).ok()?;
        let bytes: [u8; 32] = raw.try_into().ok()?;
        Some(HolderId(bytes))
    }

    /// Full hex representation with a `0x` prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}
