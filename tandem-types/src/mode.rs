//! Operating modes and conflict strategies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which endpoints the application currently works against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// Local store only (outage or operator choice).
    Local,
    /// Cloud store only (operator choice).
    Cloud,
    /// Both stores, reconciled periodically.
    Hybrid,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "Local"),
            Self::Cloud => write!(f, "Cloud"),
            Self::Hybrid => write!(f, "Hybrid"),
        }
    }
}

impl FromStr for ConnectionMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "cloud" => Ok(Self::Cloud),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(crate::Error::InvalidValue(format!("connection mode: {other}"))),
        }
    }
}

/// How a conflict between a local and a cloud version is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConflictStrategy {
    /// The most recently written side wins; exact ties go to local.
    #[default]
    LastWriteWins,
    /// The earliest created side wins.
    FirstWriteWins,
    KeepLocal,
    KeepCloud,
    /// Never resolved automatically; left for an operator.
    Manual,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastWriteWins => write!(f, "LastWriteWins"),
            Self::FirstWriteWins => write!(f, "FirstWriteWins"),
            Self::KeepLocal => write!(f, "KeepLocal"),
            Self::KeepCloud => write!(f, "KeepCloud"),
            Self::Manual => write!(f, "Manual"),
        }
    }
}

impl FromStr for ConflictStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LastWriteWins" => Ok(Self::LastWriteWins),
            "FirstWriteWins" => Ok(Self::FirstWriteWins),
            "KeepLocal" => Ok(Self::KeepLocal),
            "KeepCloud" => Ok(Self::KeepCloud),
            "Manual" => Ok(Self::Manual),
            other => Err(crate::Error::InvalidValue(format!("conflict strategy: {other}"))),
        }
    }
}
