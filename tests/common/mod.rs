#![allow(dead_code)]

use avrmc::{
    assemble::assemble,
    compute_stack_usage,
    engine::{AbstractAvr, Device, ModelCheckOptions, Verdict},
    instruction::Instruction,
    AnalysisError,
};
use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

pub fn init() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Points the stack to `RAMEND` (0x025f) of an ATtiny85 through r29:r28.
pub fn prologue() -> Vec<Instruction> {
    vec![
        Instruction::Ldi { d: 28, k: 0x5f },
        Instruction::Ldi { d: 29, k: 0x02 },
        Instruction::Out { a: 0x3e, r: 29 },
        Instruction::Out { a: 0x3d, r: 28 },
    ]
}

pub fn with_prologue(body: &[Instruction]) -> Vec<Instruction> {
    let mut program = prologue();
    program.extend_from_slice(body);
    program
}

/// Machine loaded with `program`, positioned at its first instruction.
pub fn machine(program: &[Instruction]) -> AbstractAvr {
    let mut avr = AbstractAvr::new(Device::ATTINY85);
    avr.upload(&assemble(program).expect("program is encodable"))
        .expect("program fits into flash");
    avr
}

pub fn stack_usage_with(
    body: &[Instruction],
    options: ModelCheckOptions,
) -> Result<Verdict<i32>, AnalysisError> {
    init();

    let image = assemble(&with_prologue(body)).expect("program is encodable");

    compute_stack_usage(&image, Device::ATTINY85, options)
}

/// Stack usage of `body` run after [`prologue`], requiring a complete exploration.
pub fn stack_usage(body: &[Instruction]) -> i32 {
    match stack_usage_with(body, ModelCheckOptions::default()) {
        Ok(Verdict::Complete(usage)) => usage,
        other => panic!("expected a complete analysis, got {:?}", other),
    }
}
