//! Event type tags and their same-time evaluation priority

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Contractual meaning of a dated occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    /// Administrative "as-of" marker
    AD,
    /// Initial exchange
    IED,
    /// Boundary monitoring
    ME,
    /// Fee payment
    FP,
    /// Principal redemption
    PR,
    /// Principal increase
    PI,
    /// Principal redemption amount fixing
    PRF,
    /// Penalty payment
    PY,
    /// Principal prepayment
    PP,
    /// Interest payment
    IP,
    /// Fixed-leg interest payment
    IPFX,
    /// Floating-leg interest payment
    IPFL,
    /// Interest capitalization
    IPCI,
    /// Credit event
    CE,
    /// Rate reset with a fixed, already known rate
    RRF,
    /// Rate reset observed from the market
    RR,
    /// Dividend payment
    DV,
    /// Purchase
    PRD,
    /// Margin call
    MR,
    /// Termination
    TD,
    /// Scaling index fixing
    SC,
    /// Interest calculation base fixing
    IPCB,
    /// Exercise
    XD,
    /// Settlement
    STD,
    /// Maturity
    MD,
}

impl EventType {
    /// Rank among events sharing one time; lower evaluates first
    pub fn priority(&self) -> u8 {
        match self {
            EventType::AD => 0,
            EventType::IED => 1,
            EventType::ME => 2,
            EventType::FP => 3,
            EventType::PR => 4,
            EventType::PI => 5,
            EventType::PY => 6,
            EventType::PP => 7,
            EventType::IPCI => 8,
            EventType::IP => 9,
            EventType::IPFX => 10,
            EventType::IPFL => 11,
            EventType::CE => 12,
            EventType::RRF => 13,
            EventType::RR => 14,
            EventType::PRF => 15,
            EventType::DV => 16,
            EventType::PRD => 17,
            EventType::MR => 18,
            EventType::TD => 19,
            EventType::SC => 20,
            EventType::IPCB => 21,
            EventType::XD => 22,
            EventType::STD => 23,
            EventType::MD => 24,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AD => "AD",
            EventType::IED => "IED",
            EventType::ME => "ME",
            EventType::FP => "FP",
            EventType::PR => "PR",
            EventType::PI => "PI",
            EventType::PRF => "PRF",
            EventType::PY => "PY",
            EventType::PP => "PP",
            EventType::IP => "IP",
            EventType::IPFX => "IPFX",
            EventType::IPFL => "IPFL",
            EventType::IPCI => "IPCI",
            EventType::CE => "CE",
            EventType::RRF => "RRF",
            EventType::RR => "RR",
            EventType::DV => "DV",
            EventType::PRD => "PRD",
            EventType::MR => "MR",
            EventType::TD => "TD",
            EventType::SC => "SC",
            EventType::IPCB => "IPCB",
            EventType::XD => "XD",
            EventType::STD => "STD",
            EventType::MD => "MD",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            EventType::AD,
            EventType::IED,
            EventType::ME,
            EventType::FP,
            EventType::PR,
            EventType::PI,
            EventType::PRF,
            EventType::PY,
            EventType::PP,
            EventType::IP,
            EventType::IPFX,
            EventType::IPFL,
            EventType::IPCI,
            EventType::CE,
            EventType::RRF,
            EventType::RR,
            EventType::DV,
            EventType::PRD,
            EventType::MR,
            EventType::TD,
            EventType::SC,
            EventType::IPCB,
            EventType::XD,
            EventType::STD,
            EventType::MD,
        ];
        let tag = s.trim().to_ascii_uppercase();
        all.into_iter()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| format!("unknown event type `{s}`"))
    }
}
