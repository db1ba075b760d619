/*!
Fork-race decision engine for a selfish proof-of-work miner.

The [`StrategyController`](controller::StrategyController) decides, whenever
the local miner finds a block or the network reveals blocks mined by others,
whether to keep new work in a private branch, release part of that branch,
or abandon it and follow the public chain. A Monte-Carlo harness in
[`simulation`] measures what a strategy earns against an honest network.
*/

pub mod block;
pub mod broadcast;
pub mod controller;
pub mod ledger;
pub mod prelude;
pub mod results;
pub mod simulation;
pub mod strategy;
pub mod tie_breaker;

pub(crate) mod utils;
