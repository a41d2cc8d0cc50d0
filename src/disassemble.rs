use crate::decode::{decode, fetch, DecodeError};
use crate::instruction::Instruction;
use std::io::{self, Write};

/// Walks a code image front to back. Undecodable words are reported and skipped.
pub fn instructions(code: &[u8]) -> impl Iterator<Item = (u16, Result<Instruction, DecodeError>)> + '_ {
    let words = (code.len() / 2) as u16;
    let mut pc = 0_u16;

    std::iter::from_fn(move || {
        if pc >= words {
            return None;
        }

        let decoded = decode(code, pc);
        let at = pc;
        pc += decoded.as_ref().map_or(1, |i| i.size());

        Some((at, decoded))
    })
}

/// Prints one line per instruction: byte address, raw words, mnemonic.
pub fn disassemble<W: Write>(code: &[u8], out: &mut W) -> io::Result<()> {
    for (pc, decoded) in instructions(code) {
        let raw = fetch(code, pc).unwrap_or_default();

        match decoded {
            Ok(instruction) if instruction.size() == 2 => {
                let second = fetch(code, pc + 1).unwrap_or_default();
                writeln!(out, "{:#06x}: {:04x} {:04x}  {}", pc * 2, raw, second, instruction)?
            }
            Ok(instruction) => writeln!(out, "{:#06x}: {:04x}       {}", pc * 2, raw, instruction)?,
            Err(_) => writeln!(out, "{:#06x}: {:04x}       .word {:#06x}", pc * 2, raw, raw)?,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::assemble;

    #[test]
    fn lists_program() {
        let image = assemble(&[
            Instruction::Ldi { d: 16, k: 1 },
            Instruction::Sts { k: 0x60, r: 16 },
            Instruction::Rjmp { k: -1 },
        ])
        .unwrap();

        let mut out = Vec::new();
        disassemble(&image, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0x0000: e001       ldi r16, 0x01\n\
             0x0002: 9300 0060  sts 0x0060, r16\n\
             0x0006: cfff       rjmp .-1\n"
        );
    }

    #[test]
    fn skips_unknown_words() {
        let listed: Vec<_> = instructions(&[0x12, 0x9c, 0x00, 0x00]).collect();

        assert_eq!(listed.len(), 2);
        assert!(listed[0].1.is_err());
        assert_eq!(listed[1], (1, Ok(Instruction::Nop)));
    }
}
