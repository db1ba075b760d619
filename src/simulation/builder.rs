use std::num::NonZeroUsize;

use crate::strategy::Strategy;

use super::{PowerValue, SimulationGroup};

/// Builds a [`SimulationGroup`].
#[derive(Debug, Default)]
pub struct SimulationBuilder {
    pub strategy: Strategy,
    pub gamma: Option<f64>,
    pub powers: Vec<PowerValue>,
    pub repeat_all: Option<usize>,
    pub rounds: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationBuildError {
    #[error("number of simulation rounds must be greater than 0")]
    ZeroRounds,
    #[error("cannot repeat simulations 0 times")]
    ZeroRepeats,
    #[error("power value {0} is not in the range 0.0..=1.0")]
    BadPowerValue(PowerValue),
    #[error("gamma {0} is not in the range 0.0..=1.0")]
    BadGamma(f64),
}

impl SimulationBuilder {
    /// Creates a new [`SimulationBuilder`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the strategy followed by the attacker ([`Strategy::Honest`]
    /// otherwise).
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;

        self
    }

    /// Sets the probability that an honest miner facing a tie mines on the
    /// attacker's block (default 0).
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = Some(gamma);

        self
    }

    /// Run a simulation in which the attacker holds `power` of the total
    /// mining power. If never called, power is split equally between the
    /// attacker and the network.
    pub fn attacker_power(mut self, power: PowerValue) -> Self {
        self.powers.push(power);

        self
    }

    /// Call [`SimulationBuilder::attacker_power`] once for each element of
    /// `values`.
    pub fn attacker_power_iter<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = PowerValue>,
    {
        self.powers.extend(values);

        self
    }

    /// Each simulation is repeated `num` times (default 1).
    pub fn repeat_all(mut self, num: usize) -> Self {
        self.repeat_all = Some(num);

        self
    }

    /// Sets the number of rounds each simulation lasts for (default 1).
    pub fn rounds(mut self, rounds: usize) -> Self {
        self.rounds = Some(rounds);

        self
    }

    /// Seeds every simulation's random number generator, making results
    /// reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);

        self
    }

    /// Creates a [`SimulationGroup`] from the specified parameters.
    pub fn build(self) -> Result<SimulationGroup, SimulationBuildError> {
        use SimulationBuildError::*;

        let SimulationBuilder { strategy, gamma, mut powers, repeat_all, rounds, seed } =
            self;

        let rounds = match rounds {
            Some(x) => NonZeroUsize::new(x).ok_or(ZeroRounds)?,
            None => NonZeroUsize::MIN,
        };
        let repeat_all = match repeat_all {
            Some(x) => NonZeroUsize::new(x).ok_or(ZeroRepeats)?,
            None => NonZeroUsize::MIN,
        };

        let gamma = gamma.unwrap_or_default();
        if gamma.is_nan() || !(0.0..=1.0).contains(&gamma) {
            return Err(BadGamma(gamma));
        }

        if powers.is_empty() {
            powers.push(0.5);
        }
        if let Some(&power) =
            powers.iter().find(|x| x.is_nan() || !(0.0..=1.0).contains(*x))
        {
            return Err(BadPowerValue(power));
        }

        Ok(SimulationGroup { strategy, gamma, powers, repeat_all, rounds, seed })
    }
}
