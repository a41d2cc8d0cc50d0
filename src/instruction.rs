use crate::engine::system::sreg;
use std::fmt;

/// Index of a general purpose register `r0` - `r31`.
pub type Register = u8;

/// The three indirect address registers `X` (r27:r26), `Y` (r29:r28) and `Z` (r31:r30).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Pointer {
    X,
    Y,
    Z,
}

impl Pointer {
    /// Register holding the low byte of the pointer.
    pub fn low_register(self) -> Register {
        match self {
            Pointer::X => 26,
            Pointer::Y => 28,
            Pointer::Z => 30,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AddressMode {
    Plain,
    PostIncrement,
    PreDecrement,
}

/// AVR instructions supported by the decoder and the abstract machine. Relative offsets
/// (`k`) are in 16-bit words, relative to the instruction following the branch.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Instruction {
    Nop,
    Movw { d: Register, r: Register },
    Add { d: Register, r: Register },
    Adc { d: Register, r: Register },
    Sub { d: Register, r: Register },
    Sbc { d: Register, r: Register },
    And { d: Register, r: Register },
    Or { d: Register, r: Register },
    Eor { d: Register, r: Register },
    Mov { d: Register, r: Register },
    Cp { d: Register, r: Register },
    Cpc { d: Register, r: Register },
    Cpse { d: Register, r: Register },
    Ldi { d: Register, k: u8 },
    Cpi { d: Register, k: u8 },
    Subi { d: Register, k: u8 },
    Sbci { d: Register, k: u8 },
    Ori { d: Register, k: u8 },
    Andi { d: Register, k: u8 },
    Com { d: Register },
    Neg { d: Register },
    Swap { d: Register },
    Inc { d: Register },
    Dec { d: Register },
    Asr { d: Register },
    Lsr { d: Register },
    Ror { d: Register },
    Adiw { d: Register, k: u8 },
    Sbiw { d: Register, k: u8 },
    Bset { s: u8 },
    Bclr { s: u8 },
    Bst { d: Register, b: u8 },
    Bld { d: Register, b: u8 },
    Sbrc { r: Register, b: u8 },
    Sbrs { r: Register, b: u8 },
    Sbi { a: u8, b: u8 },
    Cbi { a: u8, b: u8 },
    Sbic { a: u8, b: u8 },
    Sbis { a: u8, b: u8 },
    Brbs { s: u8, k: i8 },
    Brbc { s: u8, k: i8 },
    Rjmp { k: i16 },
    Rcall { k: i16 },
    Jmp { k: u32 },
    Call { k: u32 },
    Ijmp,
    Icall,
    Ret,
    Reti,
    Push { r: Register },
    Pop { d: Register },
    In { d: Register, a: u8 },
    Out { a: u8, r: Register },
    Lds { d: Register, k: u16 },
    Sts { k: u16, r: Register },
    Ld { d: Register, ptr: Pointer, mode: AddressMode },
    St { ptr: Pointer, mode: AddressMode, r: Register },
    Ldd { d: Register, ptr: Pointer, q: u8 },
    Std { ptr: Pointer, q: u8, r: Register },
    Lpm { d: Register, post_increment: bool },
    Sleep,
    Wdr,
    Break,
}

impl Instruction {
    /// Size of the encoded instruction in 16-bit words.
    pub fn size(&self) -> u16 {
        match self {
            Instruction::Lds { .. }
            | Instruction::Sts { .. }
            | Instruction::Jmp { .. }
            | Instruction::Call { .. } => 2,
            _ => 1,
        }
    }

    pub fn breq(k: i8) -> Self {
        Instruction::Brbs { s: sreg::Z, k }
    }

    pub fn brne(k: i8) -> Self {
        Instruction::Brbc { s: sreg::Z, k }
    }

    pub fn brlo(k: i8) -> Self {
        Instruction::Brbs { s: sreg::C, k }
    }

    pub fn brsh(k: i8) -> Self {
        Instruction::Brbc { s: sreg::C, k }
    }

    pub fn brlt(k: i8) -> Self {
        Instruction::Brbs { s: sreg::S, k }
    }

    pub fn brge(k: i8) -> Self {
        Instruction::Brbc { s: sreg::S, k }
    }

    pub fn brie(k: i8) -> Self {
        Instruction::Brbs { s: sreg::I, k }
    }

    pub fn brts(k: i8) -> Self {
        Instruction::Brbs { s: sreg::T, k }
    }

    pub fn brtc(k: i8) -> Self {
        Instruction::Brbc { s: sreg::T, k }
    }

    pub fn brhc(k: i8) -> Self {
        Instruction::Brbc { s: sreg::H, k }
    }

    pub fn sei() -> Self {
        Instruction::Bset { s: sreg::I }
    }

    pub fn cli() -> Self {
        Instruction::Bclr { s: sreg::I }
    }

    pub fn sez() -> Self {
        Instruction::Bset { s: sreg::Z }
    }

    pub fn clz() -> Self {
        Instruction::Bclr { s: sreg::Z }
    }

    pub fn clc() -> Self {
        Instruction::Bclr { s: sreg::C }
    }
}

const BRANCH_SET: [&str; 8] = ["brcs", "breq", "brmi", "brvs", "brlt", "brhs", "brts", "brie"];
const BRANCH_CLEAR: [&str; 8] = ["brcc", "brne", "brpl", "brvc", "brge", "brhc", "brtc", "brid"];

fn pointer_to_str(ptr: Pointer, mode: AddressMode) -> String {
    let name = match ptr {
        Pointer::X => "X",
        Pointer::Y => "Y",
        Pointer::Z => "Z",
    };
    match mode {
        AddressMode::Plain => name.to_string(),
        AddressMode::PostIncrement => format!("{}+", name),
        AddressMode::PreDecrement => format!("-{}", name),
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match *self {
            Nop => write!(f, "nop"),
            Movw { d, r } => write!(f, "movw r{}, r{}", d, r),
            Add { d, r } => write!(f, "add r{}, r{}", d, r),
            Adc { d, r } => write!(f, "adc r{}, r{}", d, r),
            Sub { d, r } => write!(f, "sub r{}, r{}", d, r),
            Sbc { d, r } => write!(f, "sbc r{}, r{}", d, r),
            And { d, r } => write!(f, "and r{}, r{}", d, r),
            Or { d, r } => write!(f, "or r{}, r{}", d, r),
            Eor { d, r } => write!(f, "eor r{}, r{}", d, r),
            Mov { d, r } => write!(f, "mov r{}, r{}", d, r),
            Cp { d, r } => write!(f, "cp r{}, r{}", d, r),
            Cpc { d, r } => write!(f, "cpc r{}, r{}", d, r),
            Cpse { d, r } => write!(f, "cpse r{}, r{}", d, r),
            Ldi { d, k } => write!(f, "ldi r{}, {:#04x}", d, k),
            Cpi { d, k } => write!(f, "cpi r{}, {:#04x}", d, k),
            Subi { d, k } => write!(f, "subi r{}, {:#04x}", d, k),
            Sbci { d, k } => write!(f, "sbci r{}, {:#04x}", d, k),
            Ori { d, k } => write!(f, "ori r{}, {:#04x}", d, k),
            Andi { d, k } => write!(f, "andi r{}, {:#04x}", d, k),
            Com { d } => write!(f, "com r{}", d),
            Neg { d } => write!(f, "neg r{}", d),
            Swap { d } => write!(f, "swap r{}", d),
            Inc { d } => write!(f, "inc r{}", d),
            Dec { d } => write!(f, "dec r{}", d),
            Asr { d } => write!(f, "asr r{}", d),
            Lsr { d } => write!(f, "lsr r{}", d),
            Ror { d } => write!(f, "ror r{}", d),
            Adiw { d, k } => write!(f, "adiw r{}, {}", d, k),
            Sbiw { d, k } => write!(f, "sbiw r{}, {}", d, k),
            Bset { s } => write!(f, "se{}", sreg::NAMES[s as usize].to_ascii_lowercase()),
            Bclr { s } => write!(f, "cl{}", sreg::NAMES[s as usize].to_ascii_lowercase()),
            Bst { d, b } => write!(f, "bst r{}, {}", d, b),
            Bld { d, b } => write!(f, "bld r{}, {}", d, b),
            Sbrc { r, b } => write!(f, "sbrc r{}, {}", r, b),
            Sbrs { r, b } => write!(f, "sbrs r{}, {}", r, b),
            Sbi { a, b } => write!(f, "sbi {:#04x}, {}", a, b),
            Cbi { a, b } => write!(f, "cbi {:#04x}, {}", a, b),
            Sbic { a, b } => write!(f, "sbic {:#04x}, {}", a, b),
            Sbis { a, b } => write!(f, "sbis {:#04x}, {}", a, b),
            Brbs { s, k } => write!(f, "{} .{:+}", BRANCH_SET[s as usize], k),
            Brbc { s, k } => write!(f, "{} .{:+}", BRANCH_CLEAR[s as usize], k),
            Rjmp { k } => write!(f, "rjmp .{:+}", k),
            Rcall { k } => write!(f, "rcall .{:+}", k),
            Jmp { k } => write!(f, "jmp {:#06x}", k),
            Call { k } => write!(f, "call {:#06x}", k),
            Ijmp => write!(f, "ijmp"),
            Icall => write!(f, "icall"),
            Ret => write!(f, "ret"),
            Reti => write!(f, "reti"),
            Push { r } => write!(f, "push r{}", r),
            Pop { d } => write!(f, "pop r{}", d),
            In { d, a } => write!(f, "in r{}, {:#04x}", d, a),
            Out { a, r } => write!(f, "out {:#04x}, r{}", a, r),
            Lds { d, k } => write!(f, "lds r{}, {:#06x}", d, k),
            Sts { k, r } => write!(f, "sts {:#06x}, r{}", k, r),
            Ld { d, ptr, mode } => write!(f, "ld r{}, {}", d, pointer_to_str(ptr, mode)),
            St { ptr, mode, r } => write!(f, "st {}, r{}", pointer_to_str(ptr, mode), r),
            Ldd { d, ptr, q } => write!(f, "ldd r{}, {}+{}", d, pointer_to_str(ptr, AddressMode::Plain), q),
            Std { ptr, q, r } => write!(f, "std {}+{}, r{}", pointer_to_str(ptr, AddressMode::Plain), q, r),
            Lpm { d, post_increment } => {
                write!(f, "lpm r{}, Z{}", d, if post_increment { "+" } else { "" })
            }
            Sleep => write!(f, "sleep"),
            Wdr => write!(f, "wdr"),
            Break => write!(f, "break"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_aliases_print_their_mnemonic() {
        assert_eq!(Instruction::breq(5).to_string(), "breq .+5");
        assert_eq!(Instruction::brne(-3).to_string(), "brne .-3");
        assert_eq!(Instruction::brge(0).to_string(), "brge .+0");
        assert_eq!(Instruction::sei().to_string(), "sei");
        assert_eq!(Instruction::clz().to_string(), "clz");
    }

    #[test]
    fn two_word_instructions() {
        assert_eq!(Instruction::Lds { d: 16, k: 0x60 }.size(), 2);
        assert_eq!(Instruction::Call { k: 0 }.size(), 2);
        assert_eq!(Instruction::Rcall { k: 0 }.size(), 1);
    }

    #[test]
    fn pointer_operands() {
        let ld = Instruction::Ld {
            d: 24,
            ptr: Pointer::X,
            mode: AddressMode::PostIncrement,
        };
        assert_eq!(ld.to_string(), "ld r24, X+");

        let std = Instruction::Std {
            ptr: Pointer::Y,
            q: 3,
            r: 1,
        };
        assert_eq!(std.to_string(), "std Y+3, r1");
        assert_eq!(Pointer::Z.low_register(), 30);
    }
}
