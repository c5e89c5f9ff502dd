use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Puzzle instance handed to every worker. The header is opaque bytes; a
/// header belongs to exactly one generation for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub generation: u64,
    #[serde(with = "hex_bytes")]
    pub header: Vec<u8>,
    pub difficulty_bits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sequential,
    Batch,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sequential => write!(f, "sequential"),
            Role::Batch => write!(f, "batch"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Role::Sequential),
            "batch" => Ok(Role::Batch),
            other => Err(format!("unknown role '{other}' (expected 'sequential' or 'batch')")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub generation: u64,
    pub miner_id: String,
    pub nonce: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Accepted,
    RejectedStale,
    RejectedInvalid,
}

impl fmt::Display for SubmitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitStatus::Accepted => write!(f, "accepted"),
            SubmitStatus::RejectedStale => write!(f, "rejected_stale"),
            SubmitStatus::RejectedInvalid => write!(f, "rejected_invalid"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: SubmitStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerRecord {
    pub miner_id: String,
    pub role: Role,
    pub total_attempts: u64,
    pub accepted_solutions: u64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationLogEntry {
    pub generation: u64,
    pub winning_miner_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view served to the monitoring side. Records are sorted by
/// miner id so successive polls diff cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub records: Vec<MinerRecord>,
    pub current_generation: u64,
    pub difficulty_bits: u32,
    pub generations_closed: u64,
    pub recent_log_entries: Vec<GenerationLogEntry>,
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
