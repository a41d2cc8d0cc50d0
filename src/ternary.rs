//! Three-valued abstract values
//!
//! Every value in this module is either fully known or [`Unknown`](Bit::Unknown), the latter
//! standing for "any concrete value". Operators propagate unknown-ness strictly: a single
//! unknown operand makes the result unknown. There are exactly two exceptions, both on
//! [`Byte`]: [`Byte::is_least`] and [`Byte::clear`] produce known results for an unknown
//! receiver. Downstream flag computations depend on this, so it is kept as is.
//!
//! Concretisation ([`Bit::to_bool`], [`Byte::to_byte`], [`Word::to_int`]) is the only
//! fallible operation and fails with [`ConcretizationError`].

use std::fmt;
use std::ops::{Add, BitAnd, BitOr, BitXor, Neg, Not, Sub};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("cannot concretize unknown {0}")]
pub struct ConcretizationError(pub &'static str);

/// A single bit which is `True`, `False` or `Unknown` (either of the two).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Bit {
    False,
    True,
    Unknown,
}

impl Bit {
    pub fn is_unknown(self) -> bool {
        self == Bit::Unknown
    }

    pub fn to_bool(self) -> Result<bool, ConcretizationError> {
        match self {
            Bit::False => Ok(false),
            Bit::True => Ok(true),
            Bit::Unknown => Err(ConcretizationError("bit")),
        }
    }
}

impl From<bool> for Bit {
    fn from(b: bool) -> Self {
        if b {
            Bit::True
        } else {
            Bit::False
        }
    }
}

impl Not for Bit {
    type Output = Bit;

    fn not(self) -> Self::Output {
        match self {
            Bit::False => Bit::True,
            Bit::True => Bit::False,
            Bit::Unknown => Bit::Unknown,
        }
    }
}

impl BitAnd for Bit {
    type Output = Bit;

    fn bitand(self, rhs: Bit) -> Self::Output {
        match (self, rhs) {
            (Bit::Unknown, _) | (_, Bit::Unknown) => Bit::Unknown,
            (l, r) => Bit::from(l == Bit::True && r == Bit::True),
        }
    }
}

impl BitOr for Bit {
    type Output = Bit;

    fn bitor(self, rhs: Bit) -> Self::Output {
        match (self, rhs) {
            (Bit::Unknown, _) | (_, Bit::Unknown) => Bit::Unknown,
            (l, r) => Bit::from(l == Bit::True || r == Bit::True),
        }
    }
}

impl BitXor for Bit {
    type Output = Bit;

    fn bitxor(self, rhs: Bit) -> Self::Output {
        match (self, rhs) {
            (Bit::Unknown, _) | (_, Bit::Unknown) => Bit::Unknown,
            (l, r) => Bit::from(l != r),
        }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bit::False => write!(f, "0"),
            Bit::True => write!(f, "1"),
            Bit::Unknown => write!(f, "?"),
        }
    }
}

/// An 8-bit value which is either exactly known or entirely unknown.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Byte {
    Known(u8),
    Unknown,
}

impl Default for Byte {
    fn default() -> Self {
        Byte::Known(0)
    }
}

impl From<u8> for Byte {
    fn from(v: u8) -> Self {
        Byte::Known(v)
    }
}

impl Byte {
    /// Builds a byte from its bits, `bits[i]` being bit `i`. A single unknown bit makes the
    /// whole byte unknown.
    pub fn from_bits(bits: [Bit; 8]) -> Self {
        bits.iter()
            .enumerate()
            .try_fold(0_u8, |acc, (i, bit)| match bit {
                Bit::True => Some(acc | (1 << i)),
                Bit::False => Some(acc),
                Bit::Unknown => None,
            })
            .map_or(Byte::Unknown, Byte::Known)
    }

    pub fn is_unknown(self) -> bool {
        self == Byte::Unknown
    }

    pub fn to_byte(self) -> Result<u8, ConcretizationError> {
        match self {
            Byte::Known(v) => Ok(v),
            Byte::Unknown => Err(ConcretizationError("byte")),
        }
    }

    fn map(self, f: impl FnOnce(u8) -> u8) -> Byte {
        match self {
            Byte::Known(v) => Byte::Known(f(v)),
            Byte::Unknown => Byte::Unknown,
        }
    }

    fn zip(self, rhs: Byte, f: impl FnOnce(u8, u8) -> u8) -> Byte {
        match (self, rhs) {
            (Byte::Known(l), Byte::Known(r)) => Byte::Known(f(l, r)),
            _ => Byte::Unknown,
        }
    }

    fn test(self, f: impl FnOnce(u8) -> bool) -> Bit {
        match self {
            Byte::Known(v) => Bit::from(f(v)),
            Byte::Unknown => Bit::Unknown,
        }
    }

    /// Subtracts a concrete constant.
    pub fn sub_imm(self, rhs: u8) -> Byte {
        self.map(|v| v.wrapping_sub(rhs))
    }

    pub fn inc(self) -> Byte {
        self.map(|v| v.wrapping_add(1))
    }

    /// Arithmetic (sign-preserving) shift right.
    pub fn shr(self, n: u32) -> Byte {
        self.map(|v| ((v as i8) >> n) as u8)
    }

    /// Logical shift right.
    pub fn ushr(self, n: u32) -> Byte {
        self.map(|v| v >> n)
    }

    /// Exchanges high and low nibble.
    pub fn swap(self) -> Byte {
        self.map(|v| v.rotate_left(4))
    }

    pub fn get(self, index: u32) -> Bit {
        self.test(|v| v & (1 << index) != 0)
    }

    pub fn set(self, index: u32) -> Byte {
        self.map(|v| v | (1 << index))
    }

    /// Clears bit `index`. An unknown receiver is treated as zero, so the result is a known
    /// zero rather than unknown.
    pub fn clear(self, index: u32) -> Byte {
        match self {
            Byte::Known(v) => Byte::Known(v & !(1 << index)),
            Byte::Unknown => Byte::Known(0),
        }
    }

    /// Writes `bit` into position `index`; unknown if either the byte or the bit is.
    pub fn set_to(self, index: u32, bit: Bit) -> Byte {
        match (self, bit) {
            (Byte::Unknown, _) | (_, Bit::Unknown) => Byte::Unknown,
            (b, Bit::True) => b.set(index),
            (b, _) => b.clear(index),
        }
    }

    pub fn equals(self, rhs: Byte) -> Bit {
        match (self, rhs) {
            (Byte::Known(l), Byte::Known(r)) => Bit::from(l == r),
            _ => Bit::Unknown,
        }
    }

    pub fn is_zero(self) -> Bit {
        self.test(|v| v == 0)
    }

    pub fn is_not_zero(self) -> Bit {
        self.test(|v| v != 0)
    }

    /// Tests for the least signed value `0x80`. An unknown receiver yields `False`.
    pub fn is_least(self) -> Bit {
        Bit::from(self == Byte::Known(0x80))
    }
}

impl Add for Byte {
    type Output = Byte;

    fn add(self, rhs: Byte) -> Self::Output {
        self.zip(rhs, u8::wrapping_add)
    }
}

impl Sub for Byte {
    type Output = Byte;

    fn sub(self, rhs: Byte) -> Self::Output {
        self.zip(rhs, u8::wrapping_sub)
    }
}

impl BitAnd for Byte {
    type Output = Byte;

    fn bitand(self, rhs: Byte) -> Self::Output {
        self.zip(rhs, |l, r| l & r)
    }
}

impl BitOr for Byte {
    type Output = Byte;

    fn bitor(self, rhs: Byte) -> Self::Output {
        self.zip(rhs, |l, r| l | r)
    }
}

impl BitXor for Byte {
    type Output = Byte;

    fn bitxor(self, rhs: Byte) -> Self::Output {
        self.zip(rhs, |l, r| l ^ r)
    }
}

/// One's complement.
impl Not for Byte {
    type Output = Byte;

    fn not(self) -> Self::Output {
        self.map(|v| 0xFF - v)
    }
}

/// Two's complement.
impl Neg for Byte {
    type Output = Byte;

    fn neg(self) -> Self::Output {
        self.map(u8::wrapping_neg)
    }
}

impl fmt::Display for Byte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Byte::Known(v) => write!(f, "{:02X}", v),
            Byte::Unknown => write!(f, "??"),
        }
    }
}

/// A 16-bit value, typically an address, which is either exactly known or unknown.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Word {
    Known(u16),
    Unknown,
}

impl From<u16> for Word {
    fn from(v: u16) -> Self {
        Word::Known(v)
    }
}

impl Word {
    pub fn from_bytes(high: Byte, low: Byte) -> Self {
        match (high, low) {
            (Byte::Known(h), Byte::Known(l)) => Word::Known(u16::from_be_bytes([h, l])),
            _ => Word::Unknown,
        }
    }

    pub fn is_unknown(self) -> bool {
        self == Word::Unknown
    }

    pub fn to_int(self) -> Result<u16, ConcretizationError> {
        match self {
            Word::Known(v) => Ok(v),
            Word::Unknown => Err(ConcretizationError("word")),
        }
    }

    /// Adds a signed delta, wrapping at 16 bits.
    pub fn add(self, delta: i8) -> Word {
        match self {
            Word::Known(v) => Word::Known(v.wrapping_add_signed(i16::from(delta))),
            Word::Unknown => Word::Unknown,
        }
    }

    /// Subtracts a signed delta, wrapping at 16 bits.
    pub fn sub(self, delta: i8) -> Word {
        match self {
            Word::Known(v) => Word::Known(v.wrapping_add_signed(-i16::from(delta))),
            Word::Unknown => Word::Unknown,
        }
    }

    pub fn inc(self) -> Word {
        self.add(1)
    }

    pub fn dec(self) -> Word {
        self.add(-1)
    }

    pub fn get(self, index: u32) -> Bit {
        match self {
            Word::Known(v) => Bit::from(v & (1 << index) != 0),
            Word::Unknown => Bit::Unknown,
        }
    }

    pub fn low(self) -> Byte {
        match self {
            Word::Known(v) => Byte::Known(v as u8),
            Word::Unknown => Byte::Unknown,
        }
    }

    pub fn high(self) -> Byte {
        match self {
            Word::Known(v) => Byte::Known((v >> 8) as u8),
            Word::Unknown => Byte::Unknown,
        }
    }

    pub fn is_zero(self) -> Bit {
        match self {
            Word::Known(v) => Bit::from(v == 0),
            Word::Unknown => Bit::Unknown,
        }
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Word::Known(v) => write!(f, "{:04X}", v),
            Word::Unknown => write!(f, "????"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BITS: [Bit; 3] = [Bit::False, Bit::True, Bit::Unknown];

    fn known(b: Byte) -> u8 {
        b.to_byte().expect("byte is known")
    }

    #[test]
    fn unary_byte_operators_match_reference() {
        for v in 0..=255_u8 {
            let b = Byte::from(v);
            let s = v as i8;

            assert_eq!(b.is_zero(), Bit::from(v == 0));
            assert_eq!(b.is_not_zero(), Bit::from(v != 0));
            assert_eq!(b.is_least(), Bit::from(s == i8::MIN));
            assert_eq!(known(-b), s.wrapping_neg() as u8);
            assert_eq!(known(!b), 0xFF - v);
            assert_eq!(known(b.swap()), (v << 4) | (v >> 4));
            assert_eq!(known(b.inc()), v.wrapping_add(1));

            for i in 0..8 {
                assert_eq!(b.get(i), Bit::from(v & (1 << i) != 0));
                assert_eq!(known(b.clear(i)), v & !(1 << i));
                assert_eq!(known(b.set(i)), v | (1 << i));
                assert_eq!(known(b.set_to(i, Bit::True)), v | (1 << i));
                assert_eq!(known(b.set_to(i, Bit::False)), v & !(1 << i));
                assert_eq!(known(b.shr(i)), (s >> i) as u8);
                assert_eq!(known(b.ushr(i)), v >> i);
            }
        }
    }

    #[test]
    fn binary_byte_operators_match_reference() {
        for l in 0..=255_u8 {
            let lb = Byte::from(l);

            for r in 0..=255_u8 {
                let rb = Byte::from(r);

                assert_eq!(known(lb + rb), l.wrapping_add(r));
                assert_eq!(known(lb - rb), l.wrapping_sub(r));
                assert_eq!(known(lb.sub_imm(r)), l.wrapping_sub(r));
                assert_eq!(known(lb & rb), l & r);
                assert_eq!(known(lb | rb), l | r);
                assert_eq!(known(lb ^ rb), l ^ r);
                assert_eq!(lb.equals(rb), Bit::from(l == r));
                assert_eq!(
                    Word::from_bytes(lb, rb).to_int(),
                    Ok((u16::from(l) << 8) | u16::from(r))
                );
            }
        }
    }

    #[test]
    fn unary_word_operators_match_reference() {
        for v in 0..=u16::MAX {
            let w = Word::from(v);

            assert_eq!(w.inc(), Word::from(v.wrapping_add(1)));
            assert_eq!(w.dec(), Word::from(v.wrapping_sub(1)));
            assert_eq!(w.low(), Byte::from(v as u8));
            assert_eq!(w.high(), Byte::from((v >> 8) as u8));
            assert_eq!(w.is_zero(), Bit::from(v == 0));

            for i in 0..16 {
                assert_eq!(w.get(i), Bit::from(v & (1 << i) != 0));
            }
        }
    }

    #[test]
    fn word_add_sub_match_reference() {
        for v in 0..=u16::MAX {
            let w = Word::from(v);

            for d in i8::MIN..=i8::MAX {
                let expected_add = (i32::from(v) + i32::from(d)).rem_euclid(0x1_0000) as u16;
                let expected_sub = (i32::from(v) - i32::from(d)).rem_euclid(0x1_0000) as u16;

                assert_eq!(w.add(d), Word::from(expected_add));
                assert_eq!(w.sub(d), Word::from(expected_sub));
            }
        }
    }

    #[test]
    fn unknown_propagates_through_byte_operators() {
        let u = Byte::Unknown;

        for v in [0_u8, 1, 0x7F, 0x80, 0xFF] {
            let b = Byte::from(v);

            for (l, r) in [(u, b), (b, u), (u, u)] {
                assert!((l + r).is_unknown());
                assert!((l - r).is_unknown());
                assert!((l & r).is_unknown());
                assert!((l | r).is_unknown());
                assert!((l ^ r).is_unknown());
                assert_eq!(l.equals(r), Bit::Unknown);
            }
        }

        assert!((-u).is_unknown());
        assert!((!u).is_unknown());
        assert!(u.swap().is_unknown());
        assert!(u.inc().is_unknown());
        assert!(u.sub_imm(1).is_unknown());
        assert_eq!(u.is_zero(), Bit::Unknown);
        assert_eq!(u.is_not_zero(), Bit::Unknown);

        for i in 0..8 {
            assert_eq!(u.get(i), Bit::Unknown);
            assert!(u.set(i).is_unknown());
            assert!(u.shr(i).is_unknown());
            assert!(u.ushr(i).is_unknown());
            assert!(u.set_to(i, Bit::True).is_unknown());
            assert!(Byte::from(0x55).set_to(i, Bit::Unknown).is_unknown());
        }
    }

    #[test]
    fn least_test_is_known_on_unknown_byte() {
        assert_eq!(Byte::Unknown.is_least(), Bit::False);
        assert_eq!(Byte::from(0x80).is_least(), Bit::True);
        assert_eq!(Byte::from(0x7F).is_least(), Bit::False);
    }

    #[test]
    fn clear_of_unknown_byte_is_known_zero() {
        for i in 0..8 {
            assert_eq!(Byte::Unknown.clear(i), Byte::from(0));
        }
        assert_eq!(Byte::from(0xFF).clear(3), Byte::from(0xF7));
    }

    #[test]
    fn unknown_propagates_through_word_operators() {
        let u = Word::Unknown;

        assert!(u.add(3).is_unknown());
        assert!(u.sub(3).is_unknown());
        assert!(u.inc().is_unknown());
        assert!(u.dec().is_unknown());
        assert!(u.low().is_unknown());
        assert!(u.high().is_unknown());
        assert_eq!(u.is_zero(), Bit::Unknown);
        assert_eq!(u.get(15), Bit::Unknown);
        assert!(Word::from_bytes(Byte::Unknown, Byte::from(1)).is_unknown());
        assert!(Word::from_bytes(Byte::from(1), Byte::Unknown).is_unknown());
    }

    #[test]
    fn concretization_of_unknown_fails() {
        assert_eq!(Byte::Unknown.to_byte(), Err(ConcretizationError("byte")));
        assert_eq!(Word::Unknown.to_int(), Err(ConcretizationError("word")));
        assert_eq!(Bit::Unknown.to_bool(), Err(ConcretizationError("bit")));
        assert_eq!(Byte::from(0).to_byte(), Ok(0));
    }

    #[test]
    fn bit_logic_is_strict_in_unknown() {
        for l in BITS {
            for r in BITS {
                let unknown = l.is_unknown() || r.is_unknown();

                assert_eq!((l & r).is_unknown(), unknown);
                assert_eq!((l | r).is_unknown(), unknown);
                assert_eq!((l ^ r).is_unknown(), unknown);

                if !unknown {
                    let (a, b) = (l == Bit::True, r == Bit::True);
                    assert_eq!(l & r, Bit::from(a && b));
                    assert_eq!(l | r, Bit::from(a || b));
                    assert_eq!(l ^ r, Bit::from(a != b));
                }
            }
        }
        assert_eq!(!Bit::Unknown, Bit::Unknown);
    }

    #[test]
    fn byte_from_bits() {
        let mut bits = [Bit::False; 8];
        bits[0] = Bit::True;
        bits[7] = Bit::True;
        assert_eq!(Byte::from_bits(bits), Byte::from(0x81));

        bits[4] = Bit::Unknown;
        assert_eq!(Byte::from_bits(bits), Byte::Unknown);
    }

    #[test]
    fn unknown_is_distinct_from_zero() {
        assert_ne!(Byte::Unknown, Byte::from(0));
        assert_ne!(Word::Unknown, Word::from(0));
        assert_eq!(format!("{}", Byte::Unknown), "??");
        assert_eq!(format!("{}", Byte::from(0x0A)), "0A");
    }
}
