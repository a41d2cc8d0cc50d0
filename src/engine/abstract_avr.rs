use super::{
    memory::AbstractMemory,
    system::{io_to_data, sreg, Device, SPH_ADDRESS, SPL_ADDRESS, SREG_ADDRESS},
};
use crate::{
    decode::{decode, fetch, is_two_word, DecodeError},
    instruction::{AddressMode, Instruction, Pointer, Register},
    ternary::{Bit, Byte, ConcretizationError, Word},
};
use log::{debug, trace};
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};
use thiserror::Error;

/// Outcome of executing a single instruction.
#[derive(Debug)]
pub enum Step {
    Continue,
    /// The receiver followed the taken branch; the boxed sibling continues on the other one.
    Fork(Box<AbstractAvr>),
    Halted,
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum MachineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{source} at pc {pc:#06x}")]
    Concretization {
        pc: u16,
        source: ConcretizationError,
    },

    #[error("data address {address:#x} out of range at pc {pc:#06x}")]
    OutOfRange { pc: u16, address: u32 },

    #[error("program counter {target:#x} outside the code image (from pc {pc:#06x})")]
    ProgramCounterOutOfRange { pc: u16, target: i64 },

    #[error("firmware image of {size} bytes exceeds {capacity} bytes of program memory")]
    ImageTooLarge { size: usize, capacity: usize },
}

/// AVR core executing over the three-valued domain.
///
/// The status register is kept as eight separate [`Bit`]s so that flags survive even when
/// neighbouring flags are unknown. It is still reachable through its data space address.
#[derive(Clone, Debug)]
pub struct AbstractAvr {
    device: Device,
    code: Arc<Vec<u8>>,
    data: AbstractMemory,
    sreg: [Bit; 8],
    pc: u16,
}

// The code image is immutable after upload, two states are the same if their mutable
// parts agree.
impl PartialEq for AbstractAvr {
    fn eq(&self, other: &Self) -> bool {
        self.pc == other.pc
            && self.sreg == other.sreg
            && self.data == other.data
            && (Arc::ptr_eq(&self.code, &other.code) || self.code == other.code)
    }
}

impl Eq for AbstractAvr {}

impl Hash for AbstractAvr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pc.hash(state);
        self.sreg.hash(state);
        self.data.hash(state);
    }
}

impl fmt::Display for AbstractAvr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "pc={:#06x} sp={} sreg=", self.pc, self.stack_pointer())?;
        for (flag, name) in self.sreg.iter().zip(sreg::NAMES.iter()).rev() {
            write!(f, "{}{}", name, flag)?;
        }
        Ok(())
    }
}

impl AbstractAvr {
    /// Creates a machine with zeroed memory, cleared flags and an empty code image.
    pub fn new(device: Device) -> Self {
        debug!(
            "initializing {} with {} bytes of data space and {} bytes of flash",
            device.name,
            device.data_size(),
            device.flash_size
        );

        Self {
            device,
            code: Arc::new(vec![0; device.flash_size]),
            data: AbstractMemory::new(device.data_size()),
            sreg: [Bit::False; 8],
            pc: 0,
        }
    }

    /// Copies `image` to the start of program memory. The rest of the flash is zeroed.
    pub fn upload(&mut self, image: &[u8]) -> Result<(), MachineError> {
        let capacity = self.device.flash_size;
        if image.len() > capacity {
            return Err(MachineError::ImageTooLarge {
                size: image.len(),
                capacity,
            });
        }

        let code = Arc::make_mut(&mut self.code);
        code[..image.len()].copy_from_slice(image);
        code[image.len()..].iter_mut().for_each(|b| *b = 0);

        debug!("uploaded {} bytes of firmware", image.len());

        Ok(())
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn data(&self) -> &AbstractMemory {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut AbstractMemory {
        &mut self.data
    }

    /// Program counter in 16-bit words.
    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    pub fn flag(&self, s: u8) -> Bit {
        self.sreg[s as usize]
    }

    pub fn set_flag(&mut self, s: u8, value: Bit) {
        self.sreg[s as usize] = value;
    }

    pub fn register(&self, r: Register) -> Byte {
        self.data[r as usize]
    }

    pub fn set_register(&mut self, r: Register, value: Byte) {
        self.data[r as usize] = value;
    }

    fn register_pair(&self, low: Register) -> Word {
        Word::from_bytes(self.register(low + 1), self.register(low))
    }

    fn set_register_pair(&mut self, low: Register, value: Word) {
        self.set_register(low, value.low());
        self.set_register(low + 1, value.high());
    }

    pub fn stack_pointer(&self) -> Word {
        Word::from_bytes(
            self.data[SPH_ADDRESS as usize],
            self.data[SPL_ADDRESS as usize],
        )
    }

    pub fn set_stack_pointer(&mut self, value: Word) {
        self.data[SPL_ADDRESS as usize] = value.low();
        self.data[SPH_ADDRESS as usize] = value.high();
    }

    /// Reads the data space. The status register is assembled from its flags.
    pub fn load(&self, address: u16) -> Result<Byte, MachineError> {
        if address == SREG_ADDRESS {
            return Ok(Byte::from_bits(self.sreg));
        }

        self.data
            .read(address as usize)
            .ok_or(MachineError::OutOfRange {
                pc: self.pc,
                address: address as u32,
            })
    }

    /// Writes the data space. Writing the status register updates every flag.
    pub fn store(&mut self, address: u16, value: Byte) -> Result<(), MachineError> {
        if address == SREG_ADDRESS {
            for (index, flag) in self.sreg.iter_mut().enumerate() {
                *flag = value.get(index as u32);
            }
            return Ok(());
        }

        if self.data.write(address as usize, value) {
            Ok(())
        } else {
            Err(MachineError::OutOfRange {
                pc: self.pc,
                address: address as u32,
            })
        }
    }

    /// Forgets the contents of data space cells driven from outside the core.
    pub fn reset_inputs(&mut self, addresses: &[u16]) -> Result<(), MachineError> {
        for address in addresses {
            self.store(*address, Byte::Unknown)?;
        }

        Ok(())
    }

    /// Executes the instruction at the program counter.
    pub fn clock(&mut self) -> Result<Step, MachineError> {
        if self.pc as usize >= self.device.flash_words() {
            return Err(MachineError::ProgramCounterOutOfRange {
                pc: self.pc,
                target: self.pc as i64,
            });
        }

        let instruction = decode(&self.code, self.pc)?;

        self.execute(instruction)
    }

    fn execute(&mut self, instruction: Instruction) -> Result<Step, MachineError> {
        use Instruction::*;

        trace!("[{:#06x}] {}", self.pc, instruction);

        match instruction {
            Nop | Sleep | Wdr => {}
            Break => {
                debug!("[{:#06x}] break => halting", self.pc);
                return Ok(Step::Halted);
            }
            // two byte copies, a known half stays known
            Movw { d, r } => {
                self.assign(d, self.register(r));
                self.assign(d + 1, self.register(r + 1));
            }
            Mov { d, r } => self.assign(d, self.register(r)),
            Ldi { d, k } => self.assign(d, Byte::Known(k)),
            Add { d, r } => {
                let (rd, rr) = (self.register(d), self.register(r));
                let result = rd + rr;
                self.add_flags(rd, rr, result);
                self.assign(d, result);
            }
            Adc { d, r } => {
                let (rd, rr) = (self.register(d), self.register(r));
                let result = rd + rr + self.carry();
                self.add_flags(rd, rr, result);
                self.assign(d, result);
            }
            Sub { d, r } => self.execute_subtract(d, self.register(r), false, true),
            Subi { d, k } => self.execute_subtract(d, Byte::Known(k), false, true),
            Sbc { d, r } => self.execute_subtract(d, self.register(r), true, true),
            Sbci { d, k } => self.execute_subtract(d, Byte::Known(k), true, true),
            Cp { d, r } => self.execute_subtract(d, self.register(r), false, false),
            Cpc { d, r } => self.execute_subtract(d, self.register(r), true, false),
            Cpi { d, k } => self.execute_subtract(d, Byte::Known(k), false, false),
            And { d, r } => self.execute_logic(d, self.register(d) & self.register(r)),
            Andi { d, k } => self.execute_logic(d, self.register(d) & Byte::Known(k)),
            Or { d, r } => self.execute_logic(d, self.register(d) | self.register(r)),
            Ori { d, k } => self.execute_logic(d, self.register(d) | Byte::Known(k)),
            Eor { d, r } => self.execute_logic(d, self.register(d) ^ self.register(r)),
            Com { d } => {
                self.sreg[sreg::C as usize] = Bit::True;
                self.execute_logic(d, !self.register(d));
            }
            Neg { d } => {
                let rd = self.register(d);
                let result = -rd;
                self.sreg[sreg::H as usize] = result.get(3) | rd.get(3);
                self.sreg[sreg::C as usize] = result.is_not_zero();
                self.set_nzs(result, result.is_least());
                self.assign(d, result);
            }
            Swap { d } => self.assign(d, self.register(d).swap()),
            Inc { d } => {
                let result = self.register(d).inc();
                self.set_nzs(result, result.is_least());
                self.assign(d, result);
            }
            Dec { d } => {
                let rd = self.register(d);
                let result = rd.sub_imm(1);
                self.set_nzs(result, rd.is_least());
                self.assign(d, result);
            }
            Asr { d } => self.execute_shift(d, self.register(d).shr(1)),
            Lsr { d } => self.execute_shift(d, self.register(d).ushr(1)),
            Ror { d } => {
                let carry = self.sreg[sreg::C as usize];
                self.execute_shift(d, self.register(d).ushr(1).set_to(7, carry));
            }
            Adiw { d, k } => self.execute_word_arithmetic(d, k, true),
            Sbiw { d, k } => self.execute_word_arithmetic(d, k, false),
            Bset { s } => self.sreg[s as usize] = Bit::True,
            Bclr { s } => self.sreg[s as usize] = Bit::False,
            Bst { d, b } => self.sreg[sreg::T as usize] = self.register(d).get(b as u32),
            Bld { d, b } => {
                let t = self.sreg[sreg::T as usize];
                self.assign(d, self.register(d).set_to(b as u32, t));
            }
            Sbi { a, b } | Cbi { a, b } => {
                let address = io_to_data(a);
                let value = self.load(address)?;
                let value = if matches!(instruction, Sbi { .. }) {
                    value.set(b as u32)
                } else {
                    value.clear(b as u32)
                };
                self.store(address, value)?;
            }
            Sbrc { r, b } => return self.skip_if(!self.register(r).get(b as u32)),
            Sbrs { r, b } => return self.skip_if(self.register(r).get(b as u32)),
            Sbic { a, b } => return self.skip_if(!self.load(io_to_data(a))?.get(b as u32)),
            Sbis { a, b } => return self.skip_if(self.load(io_to_data(a))?.get(b as u32)),
            Cpse { d, r } => return self.skip_if(self.register(d).equals(self.register(r))),
            Brbs { s, k } => return self.branch_if(s, true, k),
            Brbc { s, k } => return self.branch_if(s, false, k),
            Rjmp { k } => {
                if k == -1 {
                    debug!("[{:#06x}] rjmp to itself => halting", self.pc);
                    return Ok(Step::Halted);
                }
                self.pc = self.target(self.pc as i64 + 1 + k as i64)?;
                return Ok(Step::Continue);
            }
            Jmp { k } => {
                if k == self.pc as u32 {
                    debug!("[{:#06x}] jmp to itself => halting", self.pc);
                    return Ok(Step::Halted);
                }
                self.pc = self.target(k as i64)?;
                return Ok(Step::Continue);
            }
            Ijmp => {
                let z = self.concrete(self.register_pair(Pointer::Z.low_register()))?;
                self.pc = self.target(z as i64)?;
                return Ok(Step::Continue);
            }
            Rcall { k } => {
                let target = self.target(self.pc as i64 + 1 + k as i64)?;
                return self.call(target, 1);
            }
            Call { k } => {
                let target = self.target(k as i64)?;
                return self.call(target, 2);
            }
            Icall => {
                let z = self.concrete(self.register_pair(Pointer::Z.low_register()))?;
                let target = self.target(z as i64)?;
                return self.call(target, 1);
            }
            Ret | Reti => {
                let high = self.pop()?;
                let low = self.pop()?;
                let address = self.concrete(Word::from_bytes(high, low))?;
                if matches!(instruction, Reti) {
                    self.sreg[sreg::I as usize] = Bit::True;
                }
                trace!("[{:#06x}] return to {:#06x}", self.pc, address);
                self.pc = self.target(address as i64)?;
                return Ok(Step::Continue);
            }
            Push { r } => self.push(self.register(r))?,
            Pop { d } => {
                let value = self.pop()?;
                self.assign(d, value);
            }
            In { d, a } => {
                let value = self.load(io_to_data(a))?;
                self.assign(d, value);
            }
            Out { a, r } => self.store(io_to_data(a), self.register(r))?,
            Lds { d, k } => {
                let value = self.load(k)?;
                self.assign(d, value);
            }
            Sts { k, r } => self.store(k, self.register(r))?,
            Ld { d, ptr, mode } => {
                let address = self.indirect(ptr, mode)?;
                let value = self.load(address)?;
                self.assign(d, value);
            }
            St { ptr, mode, r } => {
                let value = self.register(r);
                let address = self.indirect(ptr, mode)?;
                self.store(address, value)?;
            }
            Ldd { d, ptr, q } => {
                let address = self.displaced(ptr, q)?;
                let value = self.load(address)?;
                self.assign(d, value);
            }
            Std { ptr, q, r } => {
                let address = self.displaced(ptr, q)?;
                self.store(address, self.register(r))?;
            }
            Lpm { d, post_increment } => {
                let low = Pointer::Z.low_register();
                let z = self.register_pair(low);
                let address = self.concrete(z)?;
                let value = self
                    .code
                    .get(address as usize)
                    .copied()
                    .ok_or(MachineError::OutOfRange {
                        pc: self.pc,
                        address: address as u32,
                    })?;
                self.assign(d, Byte::Known(value));
                if post_increment {
                    self.set_register_pair(low, z.inc());
                }
            }
        }

        self.pc = self.target(self.pc as i64 + instruction.size() as i64)?;

        Ok(Step::Continue)
    }

    fn assign(&mut self, d: Register, value: Byte) {
        trace!("[{:#06x}] r{} <- {}", self.pc, d, value);
        self.set_register(d, value);
    }

    fn concrete(&self, value: Word) -> Result<u16, MachineError> {
        value.to_int().map_err(|source| self.concretization(source))
    }

    fn concretization(&self, source: ConcretizationError) -> MachineError {
        MachineError::Concretization {
            pc: self.pc,
            source,
        }
    }

    fn target(&self, target: i64) -> Result<u16, MachineError> {
        if (0..self.device.flash_words() as i64).contains(&target) {
            Ok(target as u16)
        } else {
            Err(MachineError::ProgramCounterOutOfRange {
                pc: self.pc,
                target,
            })
        }
    }

    fn carry(&self) -> Byte {
        let mut bits = [Bit::False; 8];
        bits[0] = self.sreg[sreg::C as usize];
        Byte::from_bits(bits)
    }

    fn set_nzs(&mut self, result: Byte, overflow: Bit) {
        let negative = result.get(7);
        self.sreg[sreg::N as usize] = negative;
        self.sreg[sreg::V as usize] = overflow;
        self.sreg[sreg::S as usize] = negative ^ overflow;
        self.sreg[sreg::Z as usize] = result.is_zero();
    }

    fn add_flags(&mut self, rd: Byte, rr: Byte, result: Byte) {
        let (d3, r3, s3) = (rd.get(3), rr.get(3), result.get(3));
        let (d7, r7, s7) = (rd.get(7), rr.get(7), result.get(7));

        self.sreg[sreg::H as usize] = (d3 & r3) | (r3 & !s3) | (!s3 & d3);
        self.sreg[sreg::C as usize] = (d7 & r7) | (r7 & !s7) | (!s7 & d7);
        self.set_nzs(result, (d7 & r7 & !s7) | (!d7 & !r7 & s7));
    }

    fn execute_subtract(&mut self, d: Register, rr: Byte, with_carry: bool, write_back: bool) {
        let rd = self.register(d);
        let result = if with_carry {
            rd - rr - self.carry()
        } else {
            rd - rr
        };

        let (d3, r3, s3) = (rd.get(3), rr.get(3), result.get(3));
        let (d7, r7, s7) = (rd.get(7), rr.get(7), result.get(7));
        let previous_zero = self.sreg[sreg::Z as usize];

        self.sreg[sreg::H as usize] = (!d3 & r3) | (r3 & s3) | (s3 & !d3);
        self.sreg[sreg::C as usize] = (!d7 & r7) | (r7 & s7) | (s7 & !d7);
        self.set_nzs(result, (d7 & !r7 & !s7) | (!d7 & r7 & s7));

        // with carry the zero flag can only stay set
        if with_carry {
            self.sreg[sreg::Z as usize] = result.is_zero() & previous_zero;
        }

        if write_back {
            self.assign(d, result);
        }
    }

    fn execute_logic(&mut self, d: Register, result: Byte) {
        self.set_nzs(result, Bit::False);
        self.assign(d, result);
    }

    fn execute_shift(&mut self, d: Register, result: Byte) {
        let carry = self.register(d).get(0);
        let negative = result.get(7);

        self.sreg[sreg::C as usize] = carry;
        self.set_nzs(result, negative ^ carry);
        self.assign(d, result);
    }

    fn execute_word_arithmetic(&mut self, d: Register, k: u8, add: bool) {
        let rd = self.register_pair(d);
        let rdh7 = self.register(d + 1).get(7);
        let result = if add {
            rd.add(k as i8)
        } else {
            rd.sub(k as i8)
        };
        let r15 = result.get(15);

        let (overflow, carry) = if add {
            (!rdh7 & r15, !r15 & rdh7)
        } else {
            (rdh7 & !r15, r15 & !rdh7)
        };

        self.sreg[sreg::C as usize] = carry;
        self.sreg[sreg::V as usize] = overflow;
        self.sreg[sreg::N as usize] = r15;
        self.sreg[sreg::S as usize] = r15 ^ overflow;
        self.sreg[sreg::Z as usize] = result.is_zero();

        trace!("[{:#06x}] r{}:r{} <- {}", self.pc, d + 1, d, result);
        self.set_register_pair(d, result);
    }

    fn skip_if(&mut self, condition: Bit) -> Result<Step, MachineError> {
        let next = self.pc as i64 + 1;
        let following = fetch(&self.code, next as u16).map_or(1, |opcode| {
            if is_two_word(opcode) {
                2
            } else {
                1
            }
        });
        let skip = next + following;

        match condition {
            Bit::True => self.pc = self.target(skip)?,
            Bit::False => self.pc = self.target(next)?,
            Bit::Unknown => {
                debug!("[{:#06x}] skip condition unknown => forking", self.pc);

                let mut sibling = self.clone();
                sibling.pc = self.target(next)?;
                self.pc = self.target(skip)?;

                return Ok(Step::Fork(Box::new(sibling)));
            }
        }

        Ok(Step::Continue)
    }

    fn branch_if(&mut self, s: u8, taken_when: bool, k: i8) -> Result<Step, MachineError> {
        let flag = self.sreg[s as usize];
        let condition = if taken_when { flag } else { !flag };
        let next = self.pc as i64 + 1;
        let taken = next + k as i64;

        match condition {
            Bit::True => self.pc = self.target(taken)?,
            Bit::False => self.pc = self.target(next)?,
            Bit::Unknown => {
                debug!(
                    "[{:#06x}] flag {} unknown => forking",
                    self.pc,
                    sreg::NAMES[s as usize]
                );

                let mut sibling = self.clone();
                sibling.sreg[s as usize] = Bit::from(!taken_when);
                sibling.pc = self.target(next)?;
                self.sreg[s as usize] = Bit::from(taken_when);
                self.pc = self.target(taken)?;

                return Ok(Step::Fork(Box::new(sibling)));
            }
        }

        Ok(Step::Continue)
    }

    fn call(&mut self, target: u16, size: u16) -> Result<Step, MachineError> {
        let ret = self.pc + size;

        // low byte first, the return address ends up big-endian in ascending addresses
        self.push(Byte::Known(ret as u8))?;
        self.push(Byte::Known((ret >> 8) as u8))?;

        trace!("[{:#06x}] call {:#06x}, return to {:#06x}", self.pc, target, ret);

        self.pc = target;

        Ok(Step::Continue)
    }

    fn push(&mut self, value: Byte) -> Result<(), MachineError> {
        let sp = self.concrete(self.stack_pointer())?;
        self.store(sp, value)?;
        self.set_stack_pointer(Word::Known(sp.wrapping_sub(1)));

        Ok(())
    }

    fn pop(&mut self) -> Result<Byte, MachineError> {
        let sp = self.concrete(self.stack_pointer())?.wrapping_add(1);
        self.set_stack_pointer(Word::Known(sp));

        self.load(sp)
    }

    fn indirect(&mut self, ptr: Pointer, mode: AddressMode) -> Result<u16, MachineError> {
        let low = ptr.low_register();
        let mut pointer = self.register_pair(low);

        if mode == AddressMode::PreDecrement {
            pointer = pointer.dec();
            self.set_register_pair(low, pointer);
        }

        let address = self.concrete(pointer)?;

        if mode == AddressMode::PostIncrement {
            self.set_register_pair(low, pointer.inc());
        }

        Ok(address)
    }

    fn displaced(&self, ptr: Pointer, q: u8) -> Result<u16, MachineError> {
        let base = self.concrete(self.register_pair(ptr.low_register()))?;

        base.checked_add(q as u16)
            .ok_or(MachineError::OutOfRange {
                pc: self.pc,
                address: base as u32 + q as u32,
            })
    }
}
