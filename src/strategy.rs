//! Mining strategies understood by the controller

use std::{fmt::Display, str::FromStr};

/// How a miner treats newly found blocks.
///
/// The three selfish variants only differ in which uncle blocks the miner
/// would reference when assembling new work. The controller treats them
/// identically and only asks [`Strategy::withholds`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Publish every block as soon as it is found.
    #[default]
    Honest,
    /// Withhold blocks and reference no uncles.
    SelfishNoUncles,
    /// Withhold blocks and only reference uncles we mined ourselves.
    SelfishOwnUncles,
    /// Withhold blocks and reference any available uncle.
    SelfishAllUncles,
}

/// Which uncle blocks new work may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnclePolicy {
    None,
    Own,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mining strategy \"{0}\"")]
pub struct ParseStrategyError(String);

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Honest,
        Strategy::SelfishNoUncles,
        Strategy::SelfishOwnUncles,
        Strategy::SelfishAllUncles,
    ];

    /// Returns true iff newly mined blocks go to the private ledger.
    #[inline]
    pub fn withholds(&self) -> bool {
        !matches!(self, Strategy::Honest)
    }

    /// Uncle policy for block assembly. `None` for [`Strategy::Honest`],
    /// which follows the chain's default rules.
    pub fn uncle_policy(&self) -> Option<UnclePolicy> {
        match self {
            Strategy::Honest => None,
            Strategy::SelfishNoUncles => Some(UnclePolicy::None),
            Strategy::SelfishOwnUncles => Some(UnclePolicy::Own),
            Strategy::SelfishAllUncles => Some(UnclePolicy::All),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Honest => "honest",
            Strategy::SelfishNoUncles => "selfish-no-uncles",
            Strategy::SelfishOwnUncles => "selfish-own-uncles",
            Strategy::SelfishAllUncles => "selfish-all-uncles",
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == lower)
            .ok_or(ParseStrategyError(s.to_string()))
    }
}
