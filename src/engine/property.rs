use super::abstract_avr::AbstractAvr;
use crate::ternary::ConcretizationError;
use std::fmt;

/// Observation folded over every explored state.
///
/// `join` has to be associative and commutative, the order in which paths are explored
/// is an implementation detail of the model checker.
pub trait Property {
    type Value: Clone + fmt::Debug;

    fn map(&self, state: &AbstractAvr) -> Result<Self::Value, ConcretizationError>;

    fn join(&self, left: Self::Value, right: Self::Value) -> Self::Value;
}

/// Maximum number of bytes occupied on the stack, measured down from `ramend`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StackHeight {
    ramend: u16,
}

impl StackHeight {
    pub fn new(ramend: u16) -> Self {
        Self { ramend }
    }
}

impl Property for StackHeight {
    type Value = i32;

    fn map(&self, state: &AbstractAvr) -> Result<i32, ConcretizationError> {
        let sp = state.stack_pointer().to_int()?;

        Ok(self.ramend as i32 - sp as i32)
    }

    fn join(&self, left: i32, right: i32) -> i32 {
        left.max(right)
    }
}

/// Whether any explored state reaches the word address `pc`, e.g. a failure handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReachesAddress {
    pc: u16,
}

impl ReachesAddress {
    pub fn new(pc: u16) -> Self {
        Self { pc }
    }
}

impl Property for ReachesAddress {
    type Value = bool;

    fn map(&self, state: &AbstractAvr) -> Result<bool, ConcretizationError> {
        Ok(state.pc() == self.pc)
    }

    fn join(&self, left: bool, right: bool) -> bool {
        left || right
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::system::Device, ternary::Word};

    #[test]
    fn stack_height_is_measured_from_ramend() {
        let device = Device::ATTINY85;
        let property = StackHeight::new(device.ramend());
        let mut avr = AbstractAvr::new(device);

        avr.set_stack_pointer(Word::Known(0x25a));
        assert_eq!(property.map(&avr), Ok(5));
        assert_eq!(property.join(5, 3), 5);

        avr.set_stack_pointer(Word::Unknown);
        assert!(property.map(&avr).is_err());
    }

    #[test]
    fn reaches_address_compares_program_counter() {
        let property = ReachesAddress::new(3);
        let mut avr = AbstractAvr::new(Device::ATTINY85);

        assert_eq!(property.map(&avr), Ok(false));
        avr.set_pc(3);
        assert_eq!(property.map(&avr), Ok(true));
        assert!(property.join(false, true));
        assert!(!property.join(false, false));
    }
}
