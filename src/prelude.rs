/*!
Re-export of common values and datatypes used for driving controllers and
running simulations. Must be imported manually.

```
use selfish_miner::prelude::*;
```
*/

use crate::{
    block, broadcast, controller, ledger, results, simulation, strategy,
    tie_breaker,
};

pub use block::{Block, BlockId, ExecutionResult, MinerId, Receipt};

pub use broadcast::{BroadcastBus, BusEvent, NullBus, PublishError, RecordingBus};

pub use controller::{
    ControllerBuildError, ControllerBuilder, ControllerError, ForkState,
    StrategyController,
};

pub use ledger::{Ledger, LedgerEntry, LedgerError, MemoryLedger};

pub use results::{selfish_revenue, Average, Format, ResultsBuilder, ResultsTable};

pub use simulation::{
    PowerValue, SimulationBuildError, SimulationBuilder, SimulationError,
    SimulationGroup, SimulationOutput,
};

pub use strategy::{Strategy, UnclePolicy};

pub use tie_breaker::TieBreaker;
