use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker that opens a partition-change request inside transfer data.
///
/// Data of the form `[0xff; 32] ++ partition` asks an operator transfer to
/// credit the recipient in `partition` instead of the source partition.
pub const CHANGE_PARTITION_FLAG: [u8; 32] = [0xff; 32];

/// A 32 byte tag naming a balance sleeve ("reserved", "issued", "locked", ...)
///
/// Labels are stored as ASCII, right-padded with zeros. The textual form of a
/// partition is its label when it has one, otherwise `0x` followed by the hex
/// encoding of all 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Partition([u8; 32]);

/// Reasons a string cannot be turned into a partition tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionParseError {
    #[error("partition label is empty")]
    Empty,
    #[error("partition label is {0} bytes, the maximum is 32")]
    TooLong(usize),
    #[error("invalid partition hex: {0}")]
    InvalidHex(String),
}

impl Partition {
    pub fn new(bytes: [u8; 32]) -> Self {
        Partition(bytes)
    }

    /// Build a partition from a short ASCII label such as `"reserved"`
    pub fn from_label(label: &str) -> Result<Self, PartitionParseError> {
        let raw = label.as_bytes();
        if raw.is_empty() {
            return Err(PartitionParseError::Empty);
        }
        if raw.len() > 32 {
            return Err(PartitionParseError::TooLong(raw.len()));
        }
        let mut bytes = [0u8; 32];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Partition(bytes))
    }

    /// Build a partition from a label known to be valid at compile time.
    ///
    /// # Panics
    /// Panics if the label is empty or longer than 32 bytes.
    pub fn label(label: &'static str) -> Self {
        match Self::from_label(label) {
            Ok(partition) => partition,
            Err(e) => panic!("invalid partition label {:?}: {}", label, e),
        }
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The ASCII label, if the tag is printable text followed by zero padding
    pub fn as_label(&self) -> Option<&str> {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(32);
        if end == 0 || self.0[end..].iter().any(|b| *b != 0) {
            return None;
        }
        let text = &self.0[..end];
        if !text.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return None;
        }
        std::str::from_utf8(text).ok()
    }

    /// Extract a requested destination partition from transfer data.
    ///
    /// Returns `None` unless the data starts with [`CHANGE_PARTITION_FLAG`]
    /// and carries a full 32 byte partition after it.
    pub fn change_request(data: &[u8]) -> Option<Partition> {
        if data.len() < 64 || data[..32] != CHANGE_PARTITION_FLAG {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&data[32..64]);
        Some(Partition(bytes))
    }

    /// Encode a partition-change request for use as transfer data
    pub fn change_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&CHANGE_PARTITION_FLAG);
        data.extend_from_slice(&self.0);
        data
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_label() {
            Some(label) => write!(f, "{}", label),
            None => write!(f, "0x{}", hex::encode(self.0)),
        }
    }
}

impl FromStr for Partition {
    type Err = PartitionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(digits) = s.strip_prefix("0x") {
            if digits.len() == 64 {
                let raw = hex::decode(digits)
                    .map_err(|e| PartitionParseError::InvalidHex(e.to_string()))?;
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&raw);
                return Ok(Partition(bytes));
            }
        }
        Partition::from_label(s)
    }
}

impl TryFrom<String> for Partition {
    type Error = PartitionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Partition> for String {
    fn from(partition: Partition) -> Self {
        partition.to_string()
    }
}
