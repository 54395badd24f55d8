use std::fmt;

use serde::{Deserialize, Serialize};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Amount of native SOL expressed in its smallest unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Lamports(pub u64);

impl Lamports {
    pub const ZERO: Lamports = Lamports(0);

    /// Converts a SOL amount as entered by a user or stored in metadata.
    /// Negative and non-finite inputs clamp to zero.
    pub fn from_sol(sol: f64) -> Self {
        if !sol.is_finite() || sol <= 0.0 {
            return Self::ZERO;
        }
        Self((sol * LAMPORTS_PER_SOL as f64).round() as u64)
    }

    pub fn as_sol(self) -> f64 {
        self.0 as f64 / LAMPORTS_PER_SOL as f64
    }

    pub fn saturating_add(self, other: Lamports) -> Lamports {
        Lamports(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Lamports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} SOL", self.as_sol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Ongoing,
    Funded,
    Failed,
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CampaignStatus::Ongoing => "Ongoing",
            CampaignStatus::Funded => "Funded",
            CampaignStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Newest,
    EndingSoon,
    MostFunded,
    Goal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}
