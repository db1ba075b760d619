use std::{error::Error, time::Instant};

use selfish_miner::prelude::*;
use tracing_subscriber::EnvFilter;

const GAMMA: f64 = 0.5;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,selfish_miner::controller=warn")),
        )
        .init();

    let strategy: Strategy = match std::env::args().nth(1) {
        Some(name) => name.parse()?,
        None => Strategy::SelfishNoUncles,
    };

    let start = Instant::now();

    let alpha = (1..10).map(|n| n as PowerValue / 20.0);
    let simulation = SimulationBuilder::new()
        .strategy(strategy)
        .rounds(5_000)
        .repeat_all(4)
        .attacker_power_iter(alpha)
        .gamma(GAMMA)
        .build()?;

    tracing::info!(%strategy, "running simulations");
    let data = simulation.run_all()?;

    let results = data
        .all()
        .average(Average::Mean)
        .mining_power_func("Ideal SM Revenue", selfish_revenue(GAMMA))
        .build();

    println!("{}", results);
    println!("Elapsed time: {:.4} secs", start.elapsed().as_secs_f64());

    Ok(())
}
