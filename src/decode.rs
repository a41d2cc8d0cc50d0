use crate::instruction::{AddressMode, Instruction, Pointer};
use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum DecodeError {
    #[error("unknown instruction encoding {opcode:#06x} at pc {pc:#06x}")]
    UnknownEncoding { pc: u16, opcode: u16 },

    #[error("instruction at pc {pc:#06x} runs past the end of the code image")]
    Truncated { pc: u16 },
}

/// Reads the 16-bit word at word address `pc` of a little-endian code image.
pub fn fetch(code: &[u8], pc: u16) -> Option<u16> {
    let offset = pc as usize * 2;
    code.get(offset..offset + 2).map(LittleEndian::read_u16)
}

/// Whether `opcode` is the first word of a two-word instruction (`LDS`, `STS`, `JMP`, `CALL`).
pub fn is_two_word(opcode: u16) -> bool {
    opcode & 0xfe0f == 0x9000 || opcode & 0xfe0f == 0x9200 || opcode & 0xfe0c == 0x940c
}

/// Decodes the instruction starting at word address `pc`.
pub fn decode(code: &[u8], pc: u16) -> Result<Instruction, DecodeError> {
    let opcode = fetch(code, pc).ok_or(DecodeError::Truncated { pc })?;
    let second = || fetch(code, pc.wrapping_add(1)).ok_or(DecodeError::Truncated { pc });
    let unknown = DecodeError::UnknownEncoding { pc, opcode };

    let instruction = match opcode >> 12 {
        0x0 => match opcode >> 8 {
            0x00 if opcode == 0 => Instruction::Nop,
            0x01 => Instruction::Movw {
                d: (((opcode >> 4) & 0xf) * 2) as u8,
                r: ((opcode & 0xf) * 2) as u8,
            },
            _ => {
                let (d, r) = (d5(opcode), r5(opcode));
                match (opcode >> 10) & 3 {
                    1 => Instruction::Cpc { d, r },
                    2 => Instruction::Sbc { d, r },
                    3 => Instruction::Add { d, r },
                    _ => return Err(unknown),
                }
            }
        },
        0x1 | 0x2 => {
            let (d, r) = (d5(opcode), r5(opcode));
            match opcode >> 10 {
                0x4 => Instruction::Cpse { d, r },
                0x5 => Instruction::Cp { d, r },
                0x6 => Instruction::Sub { d, r },
                0x7 => Instruction::Adc { d, r },
                0x8 => Instruction::And { d, r },
                0x9 => Instruction::Eor { d, r },
                0xa => Instruction::Or { d, r },
                _ => Instruction::Mov { d, r },
            }
        }
        0x3..=0x7 | 0xe => {
            let (d, k) = (d4(opcode), k8(opcode));
            match opcode >> 12 {
                0x3 => Instruction::Cpi { d, k },
                0x4 => Instruction::Sbci { d, k },
                0x5 => Instruction::Subi { d, k },
                0x6 => Instruction::Ori { d, k },
                0x7 => Instruction::Andi { d, k },
                _ => Instruction::Ldi { d, k },
            }
        }
        0x8 | 0xa => {
            let q = (((opcode >> 8) & 0x20) | ((opcode >> 7) & 0x18) | (opcode & 0x7)) as u8;
            let ptr = if opcode & 0x8 != 0 { Pointer::Y } else { Pointer::Z };
            let register = d5(opcode);
            let store = opcode & 0x0200 != 0;

            match (store, q) {
                (false, 0) => Instruction::Ld {
                    d: register,
                    ptr,
                    mode: AddressMode::Plain,
                },
                (true, 0) => Instruction::St {
                    ptr,
                    mode: AddressMode::Plain,
                    r: register,
                },
                (false, q) => Instruction::Ldd { d: register, ptr, q },
                (true, q) => Instruction::Std { ptr, q, r: register },
            }
        }
        0x9 => decode_9xxx(opcode, second, unknown)?,
        0xb => {
            let a = (((opcode >> 5) & 0x30) | (opcode & 0xf)) as u8;
            let register = d5(opcode);
            if opcode & 0x0800 == 0 {
                Instruction::In { d: register, a }
            } else {
                Instruction::Out { a, r: register }
            }
        }
        0xc => Instruction::Rjmp { k: k12(opcode) },
        0xd => Instruction::Rcall { k: k12(opcode) },
        _ => {
            let b = (opcode & 0x7) as u8;
            match (opcode >> 9) & 0x7 {
                0 | 1 => Instruction::Brbs {
                    s: b,
                    k: k7(opcode),
                },
                2 | 3 => Instruction::Brbc {
                    s: b,
                    k: k7(opcode),
                },
                _ if opcode & 0x8 != 0 => return Err(unknown),
                4 => Instruction::Bld { d: d5(opcode), b },
                5 => Instruction::Bst { d: d5(opcode), b },
                6 => Instruction::Sbrc { r: d5(opcode), b },
                _ => Instruction::Sbrs { r: d5(opcode), b },
            }
        }
    };

    Ok(instruction)
}

fn decode_9xxx<F>(opcode: u16, second: F, unknown: DecodeError) -> Result<Instruction, DecodeError>
where
    F: Fn() -> Result<u16, DecodeError>,
{
    let register = d5(opcode);

    let instruction = match (opcode >> 9) & 0x7 {
        0 => match opcode & 0xf {
            0x0 => Instruction::Lds {
                d: register,
                k: second()?,
            },
            0x4 | 0x5 => Instruction::Lpm {
                d: register,
                post_increment: opcode & 0x1 != 0,
            },
            0xf => Instruction::Pop { d: register },
            _ => {
                let (ptr, mode) = pointer_mode(opcode).ok_or(unknown)?;
                Instruction::Ld {
                    d: register,
                    ptr,
                    mode,
                }
            }
        },
        1 => match opcode & 0xf {
            0x0 => Instruction::Sts {
                k: second()?,
                r: register,
            },
            0xf => Instruction::Push { r: register },
            _ => {
                let (ptr, mode) = pointer_mode(opcode).ok_or(unknown)?;
                Instruction::St {
                    ptr,
                    mode,
                    r: register,
                }
            }
        },
        2 => match opcode & 0xf {
            0x0 => Instruction::Com { d: register },
            0x1 => Instruction::Neg { d: register },
            0x2 => Instruction::Swap { d: register },
            0x3 => Instruction::Inc { d: register },
            0x5 => Instruction::Asr { d: register },
            0x6 => Instruction::Lsr { d: register },
            0x7 => Instruction::Ror { d: register },
            0xa => Instruction::Dec { d: register },
            0x8 => match opcode {
                _ if opcode & 0xff8f == 0x9408 => Instruction::Bset {
                    s: ((opcode >> 4) & 0x7) as u8,
                },
                _ if opcode & 0xff8f == 0x9488 => Instruction::Bclr {
                    s: ((opcode >> 4) & 0x7) as u8,
                },
                0x9508 => Instruction::Ret,
                0x9518 => Instruction::Reti,
                0x9588 => Instruction::Sleep,
                0x9598 => Instruction::Break,
                0x95a8 => Instruction::Wdr,
                0x95c8 => Instruction::Lpm {
                    d: 0,
                    post_increment: false,
                },
                _ => return Err(unknown),
            },
            0x9 => match opcode {
                0x9409 => Instruction::Ijmp,
                0x9509 => Instruction::Icall,
                _ => return Err(unknown),
            },
            0xc..=0xf => {
                let k = ((((opcode >> 3) & 0x3e) | (opcode & 0x1)) as u32) << 16 | second()? as u32;
                if opcode & 0x2 == 0 {
                    Instruction::Jmp { k }
                } else {
                    Instruction::Call { k }
                }
            }
            _ => return Err(unknown),
        },
        3 => {
            let d = 24 + ((opcode >> 4) & 0x3) as u8 * 2;
            let k = (((opcode >> 2) & 0x30) | (opcode & 0xf)) as u8;
            if opcode & 0x0100 == 0 {
                Instruction::Adiw { d, k }
            } else {
                Instruction::Sbiw { d, k }
            }
        }
        4 | 5 => {
            let a = ((opcode >> 3) & 0x1f) as u8;
            let b = (opcode & 0x7) as u8;
            match (opcode >> 8) & 0x3 {
                0 => Instruction::Cbi { a, b },
                1 => Instruction::Sbic { a, b },
                2 => Instruction::Sbi { a, b },
                _ => Instruction::Sbis { a, b },
            }
        }
        // MUL is not part of the AVRe core
        _ => return Err(unknown),
    };

    Ok(instruction)
}

fn pointer_mode(opcode: u16) -> Option<(Pointer, AddressMode)> {
    match opcode & 0xf {
        0x1 => Some((Pointer::Z, AddressMode::PostIncrement)),
        0x2 => Some((Pointer::Z, AddressMode::PreDecrement)),
        0x9 => Some((Pointer::Y, AddressMode::PostIncrement)),
        0xa => Some((Pointer::Y, AddressMode::PreDecrement)),
        0xc => Some((Pointer::X, AddressMode::Plain)),
        0xd => Some((Pointer::X, AddressMode::PostIncrement)),
        0xe => Some((Pointer::X, AddressMode::PreDecrement)),
        _ => None,
    }
}

fn d5(opcode: u16) -> u8 {
    ((opcode >> 4) & 0x1f) as u8
}

fn r5(opcode: u16) -> u8 {
    ((opcode & 0xf) | ((opcode >> 5) & 0x10)) as u8
}

fn d4(opcode: u16) -> u8 {
    16 + ((opcode >> 4) & 0xf) as u8
}

fn k8(opcode: u16) -> u8 {
    (((opcode >> 4) & 0xf0) | (opcode & 0xf)) as u8
}

fn k7(opcode: u16) -> i8 {
    ((((opcode >> 3) & 0x7f) as u8) << 1) as i8 >> 1
}

fn k12(opcode: u16) -> i16 {
    ((opcode & 0x0fff) << 4) as i16 >> 4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_words(words: &[u16]) -> Result<Instruction, DecodeError> {
        let mut code = vec![0; words.len() * 2];
        LittleEndian::write_u16_into(words, &mut code);
        decode(&code, 0)
    }

    #[test]
    fn decodes_datasheet_encodings() {
        // encodings as emitted by avr-as
        let cases = [
            (0x0000, Instruction::Nop),
            (0x0fe0, Instruction::Add { d: 30, r: 16 }),
            (0xe0c2, Instruction::Ldi { d: 28, k: 0x02 }),
            (0xbfde, Instruction::Out { a: 0x3e, r: 29 }),
            (0xb386, Instruction::In { d: 24, a: 0x16 }),
            (0x920f, Instruction::Push { r: 0 }),
            (0x91ff, Instruction::Pop { d: 31 }),
            (0xcfff, Instruction::Rjmp { k: -1 }),
            (0xd003, Instruction::Rcall { k: 3 }),
            (0x9508, Instruction::Ret),
            (0x9518, Instruction::Reti),
            (0x9478, Instruction::sei()),
            (0x94f8, Instruction::cli()),
            (0xf011, Instruction::breq(2)),
            (0xf7e9, Instruction::brne(-3)),
            (0x3082, Instruction::Cpi { d: 24, k: 0x02 }),
            (0xfd80, Instruction::Sbrc { r: 24, b: 0 }),
            (0x9bb0, Instruction::Sbis { a: 0x16, b: 0 }),
            (0x9701, Instruction::Sbiw { d: 24, k: 1 }),
            (0x9601, Instruction::Adiw { d: 24, k: 1 }),
            (0x01fc, Instruction::Movw { d: 30, r: 24 }),
            (0x9598, Instruction::Break),
            (
                0x8188,
                Instruction::Ld {
                    d: 24,
                    ptr: Pointer::Y,
                    mode: AddressMode::Plain,
                },
            ),
            (
                0x918d,
                Instruction::Ld {
                    d: 24,
                    ptr: Pointer::X,
                    mode: AddressMode::PostIncrement,
                },
            ),
            (
                0x8389,
                Instruction::Std {
                    ptr: Pointer::Y,
                    q: 1,
                    r: 24,
                },
            ),
        ];

        for (opcode, expected) in cases.iter() {
            assert_eq!(
                decode_words(&[*opcode]),
                Ok(*expected),
                "decoding {:#06x}",
                opcode
            );
        }
    }

    #[test]
    fn decodes_two_word_instructions() {
        assert_eq!(
            decode_words(&[0x9180, 0x0060]),
            Ok(Instruction::Lds { d: 24, k: 0x60 })
        );
        assert_eq!(
            decode_words(&[0x9380, 0x0060]),
            Ok(Instruction::Sts { k: 0x60, r: 24 })
        );
        assert_eq!(
            decode_words(&[0x940c, 0x0034]),
            Ok(Instruction::Jmp { k: 0x34 })
        );
        assert_eq!(
            decode_words(&[0x940e, 0x0010]),
            Ok(Instruction::Call { k: 0x10 })
        );

        assert!(is_two_word(0x9180));
        assert!(is_two_word(0x940e));
        assert!(!is_two_word(0x9508));
    }

    #[test]
    fn rejects_unknown_and_truncated_encodings() {
        // mul r1, r2 is not available on AVRe
        assert_eq!(
            decode_words(&[0x9c12]),
            Err(DecodeError::UnknownEncoding {
                pc: 0,
                opcode: 0x9c12
            })
        );
        assert_eq!(
            decode_words(&[0x9180]),
            Err(DecodeError::Truncated { pc: 0 })
        );
        assert_eq!(decode(&[], 0), Err(DecodeError::Truncated { pc: 0 }));
    }

    #[test]
    fn sign_extends_relative_offsets() {
        assert_eq!(k12(0x0800), -2048);
        assert_eq!(k12(0x07ff), 2047);
        assert_eq!(k7(0x0200), -64);
        assert_eq!(k7(0x01f8), 63);
    }
}
