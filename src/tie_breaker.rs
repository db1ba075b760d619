//! Utilities for describing tie-breaking behavior of honest participants

use rand::Rng;

use crate::{
    block::{Block, MinerId},
    ledger::Ledger,
};

/// Breaks ties between multiple blocks of the same height at the tip of a
/// ledger.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum TieBreaker {
    /// Use the block appended earliest.
    #[default]
    EarliestPublished,
    /// Use the earliest block mined by the specified miner, if such a block
    /// exists. Otherwise, use the earliest block mined by any miner.
    FavorMiner(MinerId),
    /// With the given probability, use the earliest block mined by the
    /// specified miner, if such a block exists. Otherwise, use the earliest
    /// block mined by any *other* miner.
    FavorMinerProb(MinerId, f64),
}

impl TieBreaker {
    /// Returns the tip block of `ledger` chosen by this rule, or `None` if the
    /// ledger is empty.
    pub fn choose(&self, ledger: &dyn Ledger) -> Option<Block> {
        self.choose_with(ledger, &mut rand::thread_rng())
    }

    /// Same as [`TieBreaker::choose`], drawing randomness from `rng`.
    pub fn choose_with<R: Rng + ?Sized>(
        &self,
        ledger: &dyn Ledger,
        rng: &mut R,
    ) -> Option<Block> {
        let mut tip = ledger.tip();
        if tip.len() <= 1 {
            return tip.pop();
        }

        match *self {
            Self::EarliestPublished => tip.into_iter().next(),
            Self::FavorMiner(miner) => {
                let idx = tip.iter().position(|b| b.miner == miner).unwrap_or(0);
                Some(tip.swap_remove(idx))
            }
            Self::FavorMinerProb(miner, prob) => {
                assert!(
                    (0.0..=1.0).contains(&prob),
                    "probability must be between 0 and 1"
                );

                let favored = tip.iter().position(|b| b.miner == miner);
                let not_favored = tip.iter().position(|b| b.miner != miner);

                let idx = match (favored, not_favored) {
                    (Some(idx), None) | (None, Some(idx)) => idx,
                    (Some(favored), Some(not_favored)) => {
                        if rng.gen_bool(prob) {
                            favored
                        } else {
                            not_favored
                        }
                    }
                    (None, None) => unreachable!("ledger tip cannot be empty"),
                };
                Some(tip.swap_remove(idx))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::ledger::MemoryLedger;

    fn forked() -> (MemoryLedger, Block, Block) {
        let mut ledger = MemoryLedger::with_genesis();
        let genesis = ledger.head().unwrap();
        let first = genesis.child(1.into(), MinerId(2));
        let second = genesis.child(2.into(), MinerId(1));
        ledger.append(&[first.clone()], None).unwrap();
        ledger.append(&[second.clone()], None).unwrap();

        (ledger, first, second)
    }

    #[test]
    fn single_tip_is_always_chosen() {
        let ledger = MemoryLedger::with_genesis();

        assert_eq!(
            TieBreaker::FavorMiner(MinerId(5)).choose(&ledger).map(|b| b.id),
            Some(0.into())
        );
        assert!(TieBreaker::default().choose(&MemoryLedger::new()).is_none());
    }

    #[test]
    fn earliest_and_favored() {
        let (ledger, first, second) = forked();

        assert_eq!(TieBreaker::EarliestPublished.choose(&ledger), Some(first));
        assert_eq!(TieBreaker::FavorMiner(MinerId(1)).choose(&ledger), Some(second));
    }

    #[test]
    fn probability_extremes() {
        let (ledger, first, second) = forked();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..20 {
            assert_eq!(
                TieBreaker::FavorMinerProb(MinerId(1), 1.0)
                    .choose_with(&ledger, &mut rng),
                Some(second.clone())
            );
            assert_eq!(
                TieBreaker::FavorMinerProb(MinerId(1), 0.0)
                    .choose_with(&ledger, &mut rng),
                Some(first.clone())
            );
        }
    }
}
