//! # Worklist exploration of abstract machine states
//!
//! The model checker steps a seed state until every path it can take has halted. Whenever
//! the stepper forks on an unknown condition, both resulting states are put back onto the
//! worklist. After every step the [`Property`] maps the current state to a value, and all
//! values are joined into one result for the whole program.
//!
//! States are never merged. Programs that loop forever on concrete values only terminate
//! with [`ModelCheckOptions::deduplicate`] or a step budget.

use super::{
    abstract_avr::{AbstractAvr, MachineError, Step},
    property::Property,
    system::PINB_ADDRESS,
};
use crate::ternary::ConcretizationError;
use bytesize::ByteSize;
use log::{debug, info, trace, warn};
use std::{
    collections::{HashSet, VecDeque},
    fmt,
};
use strum::{EnumString, EnumVariantNames, IntoStaticStr};
use thiserror::Error;

pub mod defaults {
    use super::*;

    pub const STRATEGY: ExplorationStrategy = ExplorationStrategy::DepthFirst;
    pub const MAX_STEPS: Option<u64> = None;
    pub const DEDUPLICATE: bool = false;
    pub const EXTERNAL_INPUTS: [u16; 1] = [PINB_ADDRESS];
}

/// Order in which pending states are picked from the worklist.
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumString, EnumVariantNames, IntoStaticStr)]
#[strum(serialize_all = "kebab_case")]
pub enum ExplorationStrategy {
    /// Last in, first out. Keeps the worklist small.
    DepthFirst,
    /// First in, first out.
    BreadthFirst,
}

#[derive(Clone, Debug)]
pub struct ModelCheckOptions {
    pub strategy: ExplorationStrategy,
    /// Total number of instructions executed over all paths before giving up
    pub max_steps: Option<u64>,
    /// Drop states that have been seen before at a loop back edge or a fork
    pub deduplicate: bool,
    /// Data space addresses driven from outside, reset to unknown before every step
    pub external_inputs: Vec<u16>,
}

impl Default for ModelCheckOptions {
    fn default() -> Self {
        Self {
            strategy: defaults::STRATEGY,
            max_steps: defaults::MAX_STEPS,
            deduplicate: defaults::DEDUPLICATE,
            external_inputs: defaults::EXTERNAL_INPUTS.to_vec(),
        }
    }
}

/// Result of a model checking run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict<T> {
    /// Every path has been explored.
    Complete(T),
    /// The step budget ran out; `partial` only covers the states visited so far.
    Incomplete { partial: T, steps: u64 },
}

impl<T> Verdict<T> {
    pub fn value(&self) -> &T {
        match self {
            Verdict::Complete(value) => value,
            Verdict::Incomplete { partial, .. } => partial,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Verdict::Complete(value) => value,
            Verdict::Incomplete { partial, .. } => partial,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Verdict::Complete(_))
    }
}

impl<T: fmt::Display> fmt::Display for Verdict<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Verdict::Complete(value) => write!(f, "{}", value),
            Verdict::Incomplete { partial, steps } => {
                write!(f, "at least {} (incomplete after {} steps)", partial, steps)
            }
        }
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ModelCheckError {
    #[error("machine fault: {0}")]
    Machine(#[from] MachineError),

    #[error("property cannot be evaluated at pc {pc:#06x}: {source}")]
    Property {
        pc: u16,
        source: ConcretizationError,
    },
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    pub steps: u64,
    pub forks: u64,
    pub halted: u64,
    pub duplicates: u64,
    pub peak_pending: usize,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "steps={} forks={} halted={} duplicates={} peak_pending={}",
            self.steps, self.forks, self.halted, self.duplicates, self.peak_pending
        )
    }
}

pub struct ModelChecker<P: Property> {
    property: P,
    options: ModelCheckOptions,
    statistics: Statistics,
}

impl<P: Property> ModelChecker<P> {
    pub fn new(property: P, options: ModelCheckOptions) -> Self {
        Self {
            property,
            options,
            statistics: Statistics::default(),
        }
    }

    pub fn property(&self) -> &P {
        &self.property
    }

    /// Statistics of the last call to [`apply`](Self::apply).
    pub fn statistics(&self) -> Statistics {
        self.statistics
    }

    /// Explores every path starting at `seed` and joins the property over all visited states.
    pub fn apply(&mut self, seed: AbstractAvr) -> Result<Verdict<P::Value>, ModelCheckError> {
        self.statistics = Statistics::default();

        let mut value = self.map(&seed)?;
        let mut visited = HashSet::new();
        let mut pending = VecDeque::new();
        let state_size = seed.data().allocated();

        self.enqueue(&mut pending, &mut visited, seed)?;

        while let Some(mut state) = self.dequeue(&mut pending) {
            loop {
                if let Some(max_steps) = self.options.max_steps {
                    if self.statistics.steps >= max_steps {
                        warn!(
                            "step budget of {} exhausted with {} pending states => result is a lower bound",
                            max_steps,
                            pending.len() + 1
                        );
                        self.report(state_size);

                        return Ok(Verdict::Incomplete {
                            partial: value,
                            steps: self.statistics.steps,
                        });
                    }
                }

                state.reset_inputs(&self.options.external_inputs)?;

                let before = state.pc();
                let step = state.clock()?;
                self.statistics.steps += 1;

                value = self.property.join(value, self.map(&state)?);

                match step {
                    Step::Continue => {
                        // every loop passes a back edge, checking there is enough to terminate
                        if self.options.deduplicate && state.pc() <= before {
                            state.reset_inputs(&self.options.external_inputs)?;
                            if !visited.insert(state.clone()) {
                                trace!("[{:#06x}] state seen before => dropping", state.pc());
                                self.statistics.duplicates += 1;
                                break;
                            }
                        }
                    }
                    Step::Fork(sibling) => {
                        self.statistics.forks += 1;
                        self.enqueue(&mut pending, &mut visited, state)?;
                        self.enqueue(&mut pending, &mut visited, *sibling)?;
                        break;
                    }
                    Step::Halted => {
                        trace!(
                            "[{:#06x}] path halted with {} unknown cells",
                            state.pc(),
                            state.data().unknown_count()
                        );
                        self.statistics.halted += 1;
                        break;
                    }
                }
            }
        }

        self.report(state_size);

        Ok(Verdict::Complete(value))
    }

    fn map(&self, state: &AbstractAvr) -> Result<P::Value, ModelCheckError> {
        self.property
            .map(state)
            .map_err(|source| ModelCheckError::Property {
                pc: state.pc(),
                source,
            })
    }

    fn enqueue(
        &mut self,
        pending: &mut VecDeque<AbstractAvr>,
        visited: &mut HashSet<AbstractAvr>,
        mut state: AbstractAvr,
    ) -> Result<(), ModelCheckError> {
        if self.options.deduplicate {
            state.reset_inputs(&self.options.external_inputs)?;
            if !visited.insert(state.clone()) {
                trace!("[{:#06x}] pending state seen before => dropping", state.pc());
                self.statistics.duplicates += 1;
                return Ok(());
            }
        }

        pending.push_back(state);
        self.statistics.peak_pending = self.statistics.peak_pending.max(pending.len());

        Ok(())
    }

    fn dequeue(&self, pending: &mut VecDeque<AbstractAvr>) -> Option<AbstractAvr> {
        match self.options.strategy {
            ExplorationStrategy::DepthFirst => pending.pop_back(),
            ExplorationStrategy::BreadthFirst => pending.pop_front(),
        }
    }

    fn report(&self, state_size: ByteSize) {
        let peak = ByteSize::b(state_size.as_u64() * self.statistics.peak_pending as u64);

        info!("explored program: {}", self.statistics);
        debug!("peak worklist footprint: {}", peak);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn strategy_from_kebab_case() {
        assert_eq!(
            ExplorationStrategy::from_str("breadth-first"),
            Ok(ExplorationStrategy::BreadthFirst)
        );
        let name: &'static str = ExplorationStrategy::DepthFirst.into();
        assert_eq!(name, "depth-first");
        assert!(ExplorationStrategy::from_str("random").is_err());
    }

    #[test]
    fn default_options_drive_pinb() {
        let options = ModelCheckOptions::default();

        assert_eq!(options.strategy, ExplorationStrategy::DepthFirst);
        assert_eq!(options.max_steps, None);
        assert!(!options.deduplicate);
        assert_eq!(options.external_inputs, vec![0x36]);
    }

    #[test]
    fn verdict_accessors() {
        let complete = Verdict::Complete(3);
        let incomplete = Verdict::Incomplete {
            partial: 2,
            steps: 10,
        };

        assert!(complete.is_complete());
        assert_eq!(*incomplete.value(), 2);
        assert_eq!(incomplete.to_string(), "at least 2 (incomplete after 10 steps)");
        assert_eq!(complete.into_value(), 3);
    }
}
