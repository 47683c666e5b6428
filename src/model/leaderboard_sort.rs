use std::{fmt, str::FromStr};

use crate::error::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LeaderboardSort {
    #[default]
    Volume,
    New,
    Soon,
}

impl LeaderboardSort {
    /// Value of the `sort` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardSort::Volume => "",
            LeaderboardSort::New => "new",
            LeaderboardSort::Soon => "soon",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            LeaderboardSort::Volume => "Volume (+10% Top 10)",
            LeaderboardSort::New => "New Referral",
            LeaderboardSort::Soon => "Rewards Soon",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LeaderboardSort::Volume => {
                "Top 10 by traded volume referral links will reward 10% of \
                 traded fees volume from total platform value."
            },
            LeaderboardSort::New => {
                "Join to Just Created referral links to PVP with a small \
                 number of opponents for easy reward."
            },
            LeaderboardSort::Soon => {
                "Join to Reward Soon referral links to have chance to get \
                 instant reward."
            },
        }
    }

    pub fn is_ranked(&self) -> bool {
        matches!(self, LeaderboardSort::Volume)
    }
}

impl fmt::Display for LeaderboardSort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LeaderboardSort::Volume => write!(f, "volume"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl FromStr for LeaderboardSort {
    type Err = Error;

    fn from_str(value: &str) -> Result<LeaderboardSort, Self::Err> {
        match value {
            "" | "volume" => Ok(LeaderboardSort::Volume),
            "new" => Ok(LeaderboardSort::New),
            "soon" => Ok(LeaderboardSort::Soon),
            other => Err(Error::InvalidOption {
                option: format!(
                    "sort '{}'. Valid options: volume, new, soon",
                    other
                ),
            }),
        }
    }
}
