/*!
Monte-Carlo evaluation of mining strategies

A simulation plays one [`StrategyController`] (the "attacker") against an
honest network for a fixed number of rounds. In each round exactly one block
is found: by the attacker with probability equal to its mining power, and by
the honest network otherwise. Attacker blocks go through
[`StrategyController::on_self_mined_block`]; honest blocks extend a tip of
the public ledger and go through
[`StrategyController::on_external_blocks_observed`].

# Examples

```
use selfish_miner::prelude::*;

let sim = SimulationBuilder::new()
    .strategy(Strategy::SelfishNoUncles)
    .rounds(500)
    .repeat_all(2)
    .attacker_power_iter([0.25, 0.4])
    .gamma(0.5)
    .build()
    .unwrap();

let results = sim.run_all().unwrap().all().average(Average::Mean).build();

println!("{}", results);
```
*/

use std::{collections::HashMap, num::NonZeroUsize};

use rand::{
    distributions::{WeightedError, WeightedIndex},
    prelude::Distribution,
    rngs::StdRng,
    SeedableRng,
};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::debug;

use crate::{
    block::{BlockId, ExecutionResult, MinerId},
    broadcast::NullBus,
    controller::{ControllerBuildError, ControllerError, StrategyController},
    ledger::MemoryLedger,
    results::ResultsBuilder,
    strategy::Strategy,
    tie_breaker::TieBreaker,
};

pub mod builder;

pub use builder::{SimulationBuildError, SimulationBuilder};

/// Numeric type used to represent mining power.
pub type PowerValue = f64;

/// [`MinerId`] of the simulated attacker.
pub const ATTACKER: MinerId = MinerId(1);
/// [`MinerId`] shared by every honest network participant.
pub const NETWORK: MinerId = MinerId(2);

/// Container for a group of simulations which run the same strategy over a
/// range of attacker mining power values. Simulations should be run using
/// this struct's `run_all` method.
#[derive(Debug, Clone)]
pub struct SimulationGroup {
    strategy: Strategy,
    gamma: f64,
    powers: Vec<PowerValue>,
    repeat_all: NonZeroUsize,
    rounds: NonZeroUsize,
    seed: Option<u64>,
}

impl SimulationGroup {
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::new()
    }

    /// Runs every configured simulation, `repeat_all` times each.
    pub fn run_all(self) -> Result<ResultsBuilder, SimulationError> {
        let SimulationGroup { strategy, gamma, powers, repeat_all, rounds, seed } =
            self;

        let sims: Vec<_> = powers
            .into_iter()
            // Repeated runs of the same power value stay adjacent
            .flat_map(|attacker_power| {
                std::iter::repeat(attacker_power).take(repeat_all.get())
            })
            .enumerate()
            .map(|(i, attacker_power)| Simulation {
                strategy,
                gamma,
                attacker_power,
                rounds: rounds.get(),
                seed: seed.map(|s| s.wrapping_add(i as u64)),
            })
            .collect();

        #[cfg(feature = "rayon")]
        let outputs: Result<Vec<_>, _> =
            sims.into_par_iter().map(Simulation::run).collect();
        #[cfg(not(feature = "rayon"))]
        let outputs: Result<Vec<_>, _> =
            sims.into_iter().map(Simulation::run).collect();

        Ok(ResultsBuilder::new(outputs?, repeat_all))
    }
}

/// A single simulated race between the attacker and the honest network.
#[derive(Debug, Clone)]
struct Simulation {
    strategy: Strategy,
    gamma: f64,
    attacker_power: PowerValue,
    rounds: usize,
    seed: Option<u64>,
}

/// Contains the output data from a simulation.
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub strategy: Strategy,
    pub attacker_power: PowerValue,
    pub gamma: f64,
    pub rounds: usize,
    /// Number of blocks each miner has on the final canonical chain,
    /// excluding genesis.
    pub canonical_blocks: HashMap<MinerId, usize>,
    /// Length of the final canonical chain, excluding genesis.
    pub canonical_length: usize,
    /// Number of blocks in the public ledger, on every fork, excluding
    /// genesis.
    pub blocks_published: usize,
    /// Number of blocks the attacker found.
    pub attacker_blocks_mined: usize,
}

impl SimulationOutput {
    /// Share of the canonical chain mined by the attacker.
    pub fn attacker_revenue(&self) -> f64 {
        if self.canonical_length == 0 {
            return 0.0;
        }

        let attacker =
            self.canonical_blocks.get(&ATTACKER).copied().unwrap_or_default();
        attacker as f64 / self.canonical_length as f64
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("could not create rand::distributions::WeightedIndex")]
    WeightedIndexError(#[from] WeightedError),
    #[error("could not build the attacker's controller")]
    Build(#[from] ControllerBuildError),
    #[error("controller rejected a simulated block")]
    Controller(#[from] ControllerError),
    #[error("ledger has no block to mine on")]
    EmptyLedger,
}

impl Simulation {
    /// Executes the configured simulation.
    fn run(self) -> Result<SimulationOutput, SimulationError> {
        let Simulation { strategy, gamma, attacker_power, rounds, seed } = self;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let proposer = WeightedIndex::new([1.0 - attacker_power, attacker_power])?;
        let tie_breaker = TieBreaker::FavorMinerProb(ATTACKER, gamma);

        let controller = StrategyController::builder()
            .strategy(strategy)
            .public_ledger(MemoryLedger::with_genesis())
            .broadcast(NullBus)
            .miner(ATTACKER)
            .build()?;

        let mut attacker_blocks_mined = 0;
        for round in 1..=rounds {
            let id = BlockId(round as u64);

            if proposer.sample(&mut rng) == 1 {
                let base =
                    controller.mining_base().ok_or(SimulationError::EmptyLedger)?;
                controller.on_self_mined_block(
                    base.child(id, ATTACKER),
                    ExecutionResult::default(),
                )?;
                attacker_blocks_mined += 1;
            } else {
                let parent = controller
                    .with_public(|ledger| tie_breaker.choose_with(ledger, &mut rng))
                    .ok_or(SimulationError::EmptyLedger)?;
                controller
                    .on_external_blocks_observed(vec![parent.child(id, NETWORK)])?;
            }
        }

        let (chain, num_blocks) = controller
            .with_public(|ledger| (ledger.canonical_chain(), ledger.entries().len()));

        let mut canonical_blocks: HashMap<MinerId, usize> = HashMap::new();
        for block in chain.iter().skip(1) {
            *canonical_blocks.entry(block.miner).or_default() += 1;
        }

        debug!(
            %strategy,
            attacker_power,
            rounds,
            canonical_length = chain.len().saturating_sub(1),
            "simulation finished"
        );

        Ok(SimulationOutput {
            strategy,
            attacker_power,
            gamma,
            rounds,
            canonical_blocks,
            canonical_length: chain.len().saturating_sub(1),
            blocks_published: num_blocks.saturating_sub(1),
            attacker_blocks_mined,
        })
    }
}
