//! Encoder producing flash images from [`Instruction`] sequences.
//!
//! The encodings mirror the ones accepted by [`crate::decode::decode`], so an assembled
//! program can be uploaded to the abstract machine directly.

use crate::instruction::{AddressMode, Instruction, Pointer};
use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("operands of \"{0}\" cannot be encoded")]
pub struct EncodeError(pub Instruction);

/// Encodes a single instruction into one or two 16-bit words.
pub fn encode(instruction: &Instruction) -> Result<Vec<u16>, EncodeError> {
    use Instruction::*;

    let error = EncodeError(*instruction);
    let check = |condition: bool| if condition { Ok(()) } else { Err(error) };

    let words = match *instruction {
        Nop => vec![0x0000],
        Movw { d, r } => {
            check(d % 2 == 0 && r % 2 == 0 && d < 32 && r < 32)?;
            vec![0x0100 | (d as u16 / 2) << 4 | r as u16 / 2]
        }
        Cpc { d, r } => vec![two_registers(0x0400, d, r, error)?],
        Sbc { d, r } => vec![two_registers(0x0800, d, r, error)?],
        Add { d, r } => vec![two_registers(0x0c00, d, r, error)?],
        Cpse { d, r } => vec![two_registers(0x1000, d, r, error)?],
        Cp { d, r } => vec![two_registers(0x1400, d, r, error)?],
        Sub { d, r } => vec![two_registers(0x1800, d, r, error)?],
        Adc { d, r } => vec![two_registers(0x1c00, d, r, error)?],
        And { d, r } => vec![two_registers(0x2000, d, r, error)?],
        Eor { d, r } => vec![two_registers(0x2400, d, r, error)?],
        Or { d, r } => vec![two_registers(0x2800, d, r, error)?],
        Mov { d, r } => vec![two_registers(0x2c00, d, r, error)?],
        Cpi { d, k } => vec![immediate(0x3000, d, k, error)?],
        Sbci { d, k } => vec![immediate(0x4000, d, k, error)?],
        Subi { d, k } => vec![immediate(0x5000, d, k, error)?],
        Ori { d, k } => vec![immediate(0x6000, d, k, error)?],
        Andi { d, k } => vec![immediate(0x7000, d, k, error)?],
        Ldi { d, k } => vec![immediate(0xe000, d, k, error)?],
        Com { d } => vec![one_register(0x9400, d, error)?],
        Neg { d } => vec![one_register(0x9401, d, error)?],
        Swap { d } => vec![one_register(0x9402, d, error)?],
        Inc { d } => vec![one_register(0x9403, d, error)?],
        Asr { d } => vec![one_register(0x9405, d, error)?],
        Lsr { d } => vec![one_register(0x9406, d, error)?],
        Ror { d } => vec![one_register(0x9407, d, error)?],
        Dec { d } => vec![one_register(0x940a, d, error)?],
        Pop { d } => vec![one_register(0x900f, d, error)?],
        Push { r } => vec![one_register(0x920f, r, error)?],
        Adiw { d, k } | Sbiw { d, k } => {
            check(matches!(d, 24 | 26 | 28 | 30) && k < 64)?;
            let base = if matches!(instruction, Adiw { .. }) { 0x9600 } else { 0x9700 };
            let k = k as u16;
            vec![base | (k & 0x30) << 2 | ((d as u16 - 24) / 2) << 4 | k & 0xf]
        }
        Bset { s } => {
            check(s < 8)?;
            vec![0x9408 | (s as u16) << 4]
        }
        Bclr { s } => {
            check(s < 8)?;
            vec![0x9488 | (s as u16) << 4]
        }
        Bld { d, b } => vec![register_bit(0xf800, d, b, error)?],
        Bst { d, b } => vec![register_bit(0xfa00, d, b, error)?],
        Sbrc { r, b } => vec![register_bit(0xfc00, r, b, error)?],
        Sbrs { r, b } => vec![register_bit(0xfe00, r, b, error)?],
        Cbi { a, b } => vec![io_bit(0x9800, a, b, error)?],
        Sbic { a, b } => vec![io_bit(0x9900, a, b, error)?],
        Sbi { a, b } => vec![io_bit(0x9a00, a, b, error)?],
        Sbis { a, b } => vec![io_bit(0x9b00, a, b, error)?],
        Brbs { s, k } | Brbc { s, k } => {
            check(s < 8 && (-64..=63).contains(&k))?;
            let base = if matches!(instruction, Brbs { .. }) { 0xf000 } else { 0xf400 };
            vec![base | ((k as u16) & 0x7f) << 3 | s as u16]
        }
        Rjmp { k } | Rcall { k } => {
            check((-2048..=2047).contains(&k))?;
            let base = if matches!(instruction, Rjmp { .. }) { 0xc000 } else { 0xd000 };
            vec![base | (k as u16) & 0x0fff]
        }
        Jmp { k } | Call { k } => {
            check(k < 1 << 22)?;
            let base = if matches!(instruction, Jmp { .. }) { 0x940c } else { 0x940e };
            let high = (k >> 16) as u16;
            vec![base | (high & 0x3e) << 3 | high & 0x1, k as u16]
        }
        Ijmp => vec![0x9409],
        Icall => vec![0x9509],
        Ret => vec![0x9508],
        Reti => vec![0x9518],
        Sleep => vec![0x9588],
        Break => vec![0x9598],
        Wdr => vec![0x95a8],
        In { d, a } | Out { a, r: d } => {
            check(d < 32 && a < 64)?;
            let base = if matches!(instruction, In { .. }) { 0xb000 } else { 0xb800 };
            let a = a as u16;
            vec![base | (a & 0x30) << 5 | (d as u16) << 4 | a & 0xf]
        }
        Lds { d, k } => vec![one_register(0x9000, d, error)?, k],
        Sts { k, r } => vec![one_register(0x9200, r, error)?, k],
        Ld { d, ptr, mode } => vec![indirect(0x8000, 0x9000, d, ptr, mode, error)?],
        St { ptr, mode, r } => vec![indirect(0x8200, 0x9200, r, ptr, mode, error)?],
        Ldd { d, ptr, q } => vec![displacement(0x8000, d, ptr, q, error)?],
        Std { ptr, q, r } => vec![displacement(0x8200, r, ptr, q, error)?],
        Lpm { d, post_increment } => {
            vec![one_register(0x9004 | post_increment as u16, d, error)?]
        }
    };

    Ok(words)
}

/// Encodes a program into a little-endian flash image.
pub fn assemble(program: &[Instruction]) -> Result<Vec<u8>, EncodeError> {
    let mut words = Vec::with_capacity(program.len());

    for instruction in program {
        words.extend(encode(instruction)?);
    }

    let mut image = vec![0; words.len() * 2];
    LittleEndian::write_u16_into(&words, &mut image);

    Ok(image)
}

fn one_register(base: u16, d: u8, error: EncodeError) -> Result<u16, EncodeError> {
    if d < 32 {
        Ok(base | (d as u16) << 4)
    } else {
        Err(error)
    }
}

fn two_registers(base: u16, d: u8, r: u8, error: EncodeError) -> Result<u16, EncodeError> {
    if r < 32 {
        let r = r as u16;
        Ok(one_register(base, d, error)? | (r & 0x10) << 5 | r & 0xf)
    } else {
        Err(error)
    }
}

fn immediate(base: u16, d: u8, k: u8, error: EncodeError) -> Result<u16, EncodeError> {
    if (16..32).contains(&d) {
        let k = k as u16;
        Ok(base | (k & 0xf0) << 4 | (d as u16 - 16) << 4 | k & 0xf)
    } else {
        Err(error)
    }
}

fn register_bit(base: u16, d: u8, b: u8, error: EncodeError) -> Result<u16, EncodeError> {
    if b < 8 {
        Ok(one_register(base, d, error)? | b as u16)
    } else {
        Err(error)
    }
}

fn io_bit(base: u16, a: u8, b: u8, error: EncodeError) -> Result<u16, EncodeError> {
    if a < 32 && b < 8 {
        Ok(base | (a as u16) << 3 | b as u16)
    } else {
        Err(error)
    }
}

fn indirect(
    displaced: u16,
    base: u16,
    register: u8,
    ptr: Pointer,
    mode: AddressMode,
    error: EncodeError,
) -> Result<u16, EncodeError> {
    let suffix = match (ptr, mode) {
        (Pointer::Z, AddressMode::Plain) => return one_register(displaced, register, error),
        (Pointer::Y, AddressMode::Plain) => return one_register(displaced | 0x8, register, error),
        (Pointer::Z, AddressMode::PostIncrement) => 0x1,
        (Pointer::Z, AddressMode::PreDecrement) => 0x2,
        (Pointer::Y, AddressMode::PostIncrement) => 0x9,
        (Pointer::Y, AddressMode::PreDecrement) => 0xa,
        (Pointer::X, AddressMode::Plain) => 0xc,
        (Pointer::X, AddressMode::PostIncrement) => 0xd,
        (Pointer::X, AddressMode::PreDecrement) => 0xe,
    };

    one_register(base | suffix, register, error)
}

fn displacement(
    base: u16,
    register: u8,
    ptr: Pointer,
    q: u8,
    error: EncodeError,
) -> Result<u16, EncodeError> {
    let y = match ptr {
        Pointer::X => return Err(error),
        Pointer::Y => 0x8,
        Pointer::Z => 0x0,
    };
    if q >= 64 {
        return Err(error);
    }
    let q = q as u16;

    Ok(one_register(base | y, register, error)? | (q & 0x20) << 8 | (q & 0x18) << 7 | q & 0x7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;

    #[test]
    fn encodes_known_opcodes() {
        assert_eq!(encode(&Instruction::Ldi { d: 28, k: 0x02 }), Ok(vec![0xe0c2]));
        assert_eq!(encode(&Instruction::Out { a: 0x3e, r: 29 }), Ok(vec![0xbfde]));
        assert_eq!(encode(&Instruction::Rjmp { k: -1 }), Ok(vec![0xcfff]));
        assert_eq!(encode(&Instruction::brne(-3)), Ok(vec![0xf7e9]));
        assert_eq!(
            encode(&Instruction::Call { k: 0x10 }),
            Ok(vec![0x940e, 0x0010])
        );
    }

    #[test]
    fn rejects_unencodable_operands() {
        let ldi = Instruction::Ldi { d: 3, k: 0 };
        assert_eq!(encode(&ldi), Err(EncodeError(ldi)));

        let branch = Instruction::breq(64);
        assert_eq!(encode(&branch), Err(EncodeError(branch)));

        let ldd = Instruction::Ldd {
            d: 0,
            ptr: Pointer::X,
            q: 1,
        };
        assert_eq!(encode(&ldd), Err(EncodeError(ldd)));
    }

    #[test]
    fn decoder_accepts_assembled_programs() {
        let program = [
            Instruction::Ldi { d: 16, k: 0xa5 },
            Instruction::Lds { d: 1, k: 0x0123 },
            Instruction::Sts { k: 0x0200, r: 31 },
            Instruction::Ldd {
                d: 7,
                ptr: Pointer::Z,
                q: 63,
            },
            Instruction::St {
                ptr: Pointer::X,
                mode: AddressMode::PreDecrement,
                r: 2,
            },
            Instruction::Sbiw { d: 30, k: 63 },
            Instruction::Sbic { a: 0x1f, b: 7 },
            Instruction::Cpse { d: 31, r: 17 },
            Instruction::Lpm {
                d: 5,
                post_increment: true,
            },
            Instruction::Jmp { k: 0x3fffff },
        ];

        let image = assemble(&program).expect("program is encodable");

        let mut pc = 0;
        for expected in program.iter() {
            assert_eq!(decode(&image, pc), Ok(*expected));
            pc += expected.size();
        }
        assert_eq!(pc as usize * 2, image.len());
    }
}
