#[macro_use]
pub mod util;

pub mod assemble;
pub mod decode;
pub mod disassemble;
pub mod engine;
pub mod firmware;
pub mod instruction;
pub mod ternary;

use engine::{
    AbstractAvr, Device, MachineError, ModelCheckError, ModelCheckOptions, ModelChecker,
    StackHeight, Step, Verdict,
};
use log::debug;
use thiserror::Error;

pub mod defaults {
    /// Instructions the start-up code may take to set up the stack pointer.
    pub const MAX_INIT_STEPS: u64 = 100_000;
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum AnalysisError {
    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error(transparent)]
    ModelCheck(#[from] ModelCheckError),

    #[error("machine halted at pc {pc:#06x} before the stack pointer was initialized")]
    HaltedBeforeInit { pc: u16 },

    #[error("execution forked at pc {pc:#06x} before the stack pointer was initialized")]
    ForkedBeforeInit { pc: u16 },

    #[error("stack pointer not initialized within {0} steps")]
    InitTimeout(u64),
}

/// Clocks `avr` until its stack pointer holds `ramend`. External inputs are unknown
/// throughout, as they are during exploration. Returns the number of executed steps.
pub fn initialize_stack(
    avr: &mut AbstractAvr,
    ramend: u16,
    external_inputs: &[u16],
) -> Result<u64, AnalysisError> {
    let mut steps = 0;

    loop {
        let sp = avr
            .stack_pointer()
            .to_int()
            .map_err(|source| MachineError::Concretization {
                pc: avr.pc(),
                source,
            })?;

        if sp == ramend {
            debug!("stack pointer initialized after {} steps", steps);
            return Ok(steps);
        }

        if steps >= defaults::MAX_INIT_STEPS {
            return Err(AnalysisError::InitTimeout(steps));
        }

        avr.reset_inputs(external_inputs)?;

        let pc = avr.pc();
        match avr.clock()? {
            Step::Continue => steps += 1,
            Step::Fork(_) => return Err(AnalysisError::ForkedBeforeInit { pc }),
            Step::Halted => return Err(AnalysisError::HaltedBeforeInit { pc }),
        }
    }
}

/// Computes an upper bound on the number of stack bytes `image` uses on `device`.
pub fn compute_stack_usage(
    image: &[u8],
    device: Device,
    options: ModelCheckOptions,
) -> Result<Verdict<i32>, AnalysisError> {
    let ramend = device.ramend();
    let mut seed = AbstractAvr::new(device);

    seed.upload(image)?;

    time_info!("initializing stack pointer", {
        initialize_stack(&mut seed, ramend, &options.external_inputs)
    })?;

    let mut checker = ModelChecker::new(StackHeight::new(ramend), options);

    let verdict = time_info!("exploring all paths", { checker.apply(seed) })?;

    Ok(verdict)
}
