/*!
Control the appearance of simulation result data

# Working with [`ResultsBuilder`]

## Examples

Creating a [`ResultsTable`] after running a simulation group:

```
use selfish_miner::prelude::*;

let sim = SimulationBuilder::new()
    .strategy(Strategy::SelfishNoUncles)
    .repeat_all(5)
    .rounds(300)
    .attacker_power(0.3)
    .build()
    .unwrap();

let results_builder = sim.run_all().unwrap();

let results = results_builder
    .average(Average::Median) // Take the median of repeated simulations' results
    .revenue()                // Include the attacker's share of the chain
    .format(Format::CSV)      // Output results as CSV
    .build();

println!("{}", results);
```
*/

use std::{collections::BTreeSet, fmt::Display, num::NonZeroUsize};

use crate::{
    simulation::{PowerValue, SimulationOutput},
    utils::{median_of_floats, wrap, WrapFunc},
};

/// Floating point precision of results data.
pub const FLOAT_PRECISION_DIGITS: usize = 6;

/// Builder for [`ResultsTable`]. Typically produced by running a
/// [`SimulationGroup`](crate::simulation::SimulationGroup).
#[derive(Debug, Clone)]
pub struct ResultsBuilder {
    average: Average,
    columns: BTreeSet<Column>,
    data: Vec<SimulationOutput>,
    format: Format,
    repeated: NonZeroUsize,
}

/// Describes the appearance of a [`ResultsTable`] table as given by its
/// [`Display`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub enum Format {
    /// Comma-separated, without extra whitespace.
    CSV,
    /// Human-readable.
    #[default]
    PrettyPrint,
}

impl ResultsBuilder {
    pub(crate) fn new(data: Vec<SimulationOutput>, repeated: NonZeroUsize) -> Self {
        Self {
            data,
            repeated,
            average: Average::default(),
            columns: BTreeSet::default(),
            format: Format::default(),
        }
    }

    /// Include the "Strategy", "Gamma", "Attacker Revenue",
    /// "Simulated Rounds", "Blocks Published", and "Longest Chain Length"
    /// columns.
    ///
    /// [`ResultsBuilder::average`] must still be called separately
    /// to create averaged data.
    pub fn all(self) -> Self {
        self.strategy_name()
            .gamma()
            .revenue()
            .rounds()
            .blocks_published()
            .longest_chain_length()
    }

    /// Average the results of repeated simulations based on the given
    /// [`Average`] type. For types other than [`Average::None`], a column
    /// describing the averaging method will be included in the results table.
    pub fn average(mut self, average: Average) -> Self {
        self.average = average;

        self
    }

    /// Include the "Blocks Published" column in the results table.
    pub fn blocks_published(mut self) -> Self {
        self.columns.insert(Column::BlocksPublished);

        self
    }

    /// Include a column with title `title` which only contains the given
    /// value.
    pub fn constant<T>(mut self, title: T, value: f64) -> Self
    where
        T: Into<String>,
    {
        self.columns.insert(Column::Constant(wrap!(title, move |_| value)));

        self
    }

    /// Extract the raw [`SimulationOutput`] data from this [`ResultsBuilder`].
    ///
    /// # Ordering
    /// Outputs follow the order in which attacker power values were given to
    /// the [`SimulationBuilder`](crate::simulation::SimulationBuilder), with
    /// repeated runs grouped together.
    pub fn data(self) -> Vec<SimulationOutput> {
        self.data
    }

    /// Include the "Gamma" column in the results table.
    pub fn gamma(mut self) -> Self {
        self.columns.insert(Column::Gamma);

        self
    }

    /// Include the "Longest Chain Length" column in the results table.
    pub fn longest_chain_length(mut self) -> Self {
        self.columns.insert(Column::LongestChainLength);

        self
    }

    /// Use the attacker's mining power as input to `func`, and present the
    /// output in a table column with the given title.
    pub fn mining_power_func<T, F>(mut self, title: T, func: F) -> Self
    where
        T: Into<String>,
        F: Fn(PowerValue) -> f64 + Send + Sync + 'static,
    {
        self.columns.insert(Column::MiningPowerFunction(wrap!(title, func)));

        self
    }

    /// Include the "Attacker Revenue" column in the results table.
    pub fn revenue(mut self) -> Self {
        self.columns.insert(Column::AttackerRevenue);

        self
    }

    /// Include the "Simulated Rounds" column in the results table.
    pub fn rounds(mut self) -> Self {
        self.columns.insert(Column::Rounds);

        self
    }

    /// Include the "Strategy" column in the results table.
    pub fn strategy_name(mut self) -> Self {
        self.columns.insert(Column::StrategyName);

        self
    }

    /// Specify the [`Format`] of the results table.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;

        self
    }

    /// Create new [`ResultsTable`].
    pub fn build(self) -> ResultsTable {
        let ResultsBuilder { average, mut columns, data, format, repeated } = self;

        columns.insert(Column::AttackerPower);
        if average != Average::None {
            columns.insert(Column::AverageOf(average));
        }

        let columns = Vec::from_iter(columns);
        let rows = match average {
            Average::None => data
                .iter()
                .map(|output| {
                    columns.iter().map(|col| col.get_value(output)).collect()
                })
                .collect(),
            _ => data
                .chunks(repeated.get())
                .map(|outputs| {
                    columns
                        .iter()
                        .map(|col| col.get_average_value(average, outputs))
                        .collect()
                })
                .collect(),
        };

        ResultsTable { columns, format, rows }
    }
}

/// Formatted results from the completion of a
/// [`SimulationGroup`](crate::simulation::SimulationGroup). The results table
/// is given by the struct's [`Display`] implementation, as specified by
/// its [`Format`].
#[derive(Debug)]
pub struct ResultsTable {
    columns: Vec<Column>,
    format: Format,
    rows: Vec<Vec<ColumnValue>>,
}

impl ResultsTable {
    const SEPARATOR_VERTICAL: char = '|';
    const SEPARATOR_HORIZONTAL: char = '-';

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    /// Number of data rows in the table.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

impl Display for ResultsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let titles: Vec<_> = self.columns.iter().map(|col| col.to_string()).collect();

        match self.format {
            Format::CSV => {
                write!(f, "{}", titles.join(","))?;

                for row in self.rows.iter() {
                    writeln!(f)?;

                    let row: Vec<_> = row.iter().map(|val| val.to_string()).collect();

                    write!(f, "{}", row.join(","))?;
                }
            }
            Format::PrettyPrint => {
                let mut text_widths: Vec<_> =
                    titles.iter().map(|title| title.len()).collect();

                for row in self.rows.iter() {
                    for (i, val) in row.iter().enumerate() {
                        let val = val.to_string();
                        text_widths[i] = text_widths[i].max(val.len());
                    }
                }

                for (i, title) in titles.into_iter().enumerate() {
                    write!(
                        f,
                        " {:1$} {2}",
                        title,
                        text_widths[i],
                        Self::SEPARATOR_VERTICAL
                    )?;
                }
                writeln!(f)?;

                let total_width = text_widths.iter().map(|x| x + 3).sum();
                for _ in 0..total_width {
                    write!(f, "{}", Self::SEPARATOR_HORIZONTAL)?;
                }

                for row in self.rows.iter() {
                    writeln!(f)?;

                    for (i, val) in row.iter().enumerate() {
                        write!(
                            f,
                            " {:1$} {2}",
                            val.to_string(),
                            text_widths[i],
                            Self::SEPARATOR_VERTICAL
                        )?;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Methods of extracting an average/central value from a set of repeated
/// simulations.
///
/// Only applied to the values of columns which vary between runs.
#[repr(u8)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Average {
    #[default]
    /// Include all repeated values.
    None,
    /// Arithmetic mean of all values.
    Mean,
    /// Median of all values.
    Median,
    /// Maximum of all values.
    Max,
    /// Minimum of all values.
    Min,
}

/// Type of column that can appear in a data table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Column {
    // Variant order determines the order of columns in results tables
    StrategyName,
    AttackerPower,
    Gamma,
    AttackerRevenue,
    MiningPowerFunction(WrapFunc<PowerValue, f64>),
    Constant(WrapFunc<(), f64>),
    Rounds,
    AverageOf(Average),
    BlocksPublished,
    LongestChainLength,
}

/// Value which corresponds to a [`Column`].
#[derive(Debug, Clone)]
enum ColumnValue {
    Text(String),
    Int(usize),
    Float(f64),
}

impl Column {
    /// Returns the value of a column which varies between repeated runs.
    fn sample(&self, output: &SimulationOutput) -> Option<f64> {
        match &self {
            Self::AttackerRevenue => Some(output.attacker_revenue()),
            Self::BlocksPublished => Some(output.blocks_published as f64),
            Self::LongestChainLength => Some(output.canonical_length as f64),
            _ => None,
        }
    }

    fn get_value(&self, output: &SimulationOutput) -> ColumnValue {
        if let Some(value) = self.sample(output) {
            return ColumnValue::Float(value);
        }

        match &self {
            Self::StrategyName => ColumnValue::Text(output.strategy.to_string()),
            Self::AttackerPower => ColumnValue::Float(output.attacker_power),
            Self::Gamma => ColumnValue::Float(output.gamma),
            Self::MiningPowerFunction(func) => {
                ColumnValue::Float(func.call(output.attacker_power))
            }
            Self::Constant(func) => ColumnValue::Float(func.call(())),
            Self::Rounds => ColumnValue::Int(output.rounds),
            Self::AverageOf(_) => unreachable!(
                "never need the single value of the average descriptor column"
            ),
            Self::AttackerRevenue | Self::BlocksPublished | Self::LongestChainLength => {
                unreachable!("sampled columns are handled above")
            }
        }
    }

    fn get_average_value(&self, method: Average, data: &[SimulationOutput]) -> ColumnValue {
        if let Self::AverageOf(_) = self {
            return ColumnValue::Int(data.len());
        }

        let values: Vec<_> = data.iter().filter_map(|out| self.sample(out)).collect();
        if values.is_empty() {
            return self.get_value(&data[0]);
        }

        let avg = match method {
            Average::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Average::Median => median_of_floats(values),
            Average::Max => values.into_iter().fold(f64::NEG_INFINITY, f64::max),
            Average::Min => values.into_iter().fold(f64::INFINITY, f64::min),
            Average::None => unreachable!("averaging requires a method"),
        };

        ColumnValue::Float(avg)
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Self::AverageOf(method) => match method {
                Average::Mean => write!(f, "Mean Of"),
                Average::Median => write!(f, "Median Of"),
                Average::Max => write!(f, "Max Of"),
                Average::Min => write!(f, "Min Of"),
                Average::None => unreachable!(),
            },
            Self::AttackerPower => write!(f, "Attacker Power"),
            Self::AttackerRevenue => write!(f, "Attacker Revenue"),
            Self::BlocksPublished => write!(f, "Blocks Published"),
            Self::Constant(func) => write!(f, "{}", func.name()),
            Self::MiningPowerFunction(func) => write!(f, "{}", func.name()),
            Self::Gamma => write!(f, "Gamma"),
            Self::LongestChainLength => write!(f, "Longest Chain Length"),
            Self::Rounds => write!(f, "Simulated Rounds"),
            Self::StrategyName => write!(f, "Strategy"),
        }
    }
}

impl Display for ColumnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Self::Text(t) => write!(f, "{}", t),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{:.1$}", fl, FLOAT_PRECISION_DIGITS),
        }
    }
}

/// Returns an instance of the ideal Selfish Miner revenue function from Eyal
/// and Sirer's paper which can be used as input to
/// [`ResultsBuilder::mining_power_func`].
pub fn selfish_revenue(gamma: f64) -> impl Fn(PowerValue) -> f64 {
    move |a: PowerValue| -> f64 {
        (a * (1.0 - a).powi(2) * (4.0 * a + gamma * (1.0 - 2.0 * a)) - a.powi(3))
            / (1.0 - a * (1.0 + a * (2.0 - a)))
    }
}
