//! Arbitrary-width two's-complement bit strings.
//!
//! [`Bits`] is the storage type of the reference [`Evaluator`](super::Evaluator).
//! A value is a little-endian array of 64-bit words; bits at or above
//! `width` are always zero.

use std::fmt;

/// A fixed-width bit string with wrapping integer arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bits {
    width: u32,
    words: Vec<u64>,
}

fn words_for(width: u32) -> usize {
    width.div_ceil(64) as usize
}

impl Bits {
    /// All-zero value of the given width.
    ///
    /// # Panics
    ///
    /// Panics if `width` is 0.
    pub fn zero(width: u32) -> Self {
        assert!(width > 0, "bit width must be non-zero");
        Self {
            width,
            words: vec![0; words_for(width)],
        }
    }

    /// All-ones value of the given width.
    pub fn ones(width: u32) -> Self {
        let mut bits = Self::zero(width);
        bits.words.iter_mut().for_each(|w| *w = u64::MAX);
        bits.normalize();
        bits
    }

    /// Value holding `value` in its low word, truncated to `width`.
    pub fn from_u64(width: u32, value: u64) -> Self {
        let mut bits = Self::zero(width);
        bits.words[0] = value;
        bits.normalize();
        bits
    }

    /// Value built from little-endian words, truncated or zero-padded to `width`.
    pub fn from_words(width: u32, words: &[u64]) -> Self {
        let mut bits = Self::zero(width);
        for (dst, src) in bits.words.iter_mut().zip(words) {
            *dst = *src;
        }
        bits.normalize();
        bits
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Little-endian words.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// The low 64 bits.
    pub fn low_u64(&self) -> u64 {
        self.words[0]
    }

    /// Shift or index amount carried by this value; anything that does not
    /// fit in 64 bits saturates.
    pub fn as_amount(&self) -> u64 {
        if self.words[1..].iter().any(|w| *w != 0) {
            u64::MAX
        } else {
            self.words[0]
        }
    }

    pub fn bit(&self, index: u32) -> bool {
        debug_assert!(index < self.width);
        (self.words[(index / 64) as usize] >> (index % 64)) & 1 == 1
    }

    pub fn set_bit(&mut self, index: u32, value: bool) {
        debug_assert!(index < self.width);
        let word = &mut self.words[(index / 64) as usize];
        let mask = 1u64 << (index % 64);
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    pub fn sign_bit(&self) -> bool {
        self.bit(self.width - 1)
    }

    /// Copy out `width` bits starting at bit `offset`.
    pub fn field(&self, offset: u32, width: u32) -> Bits {
        assert!(offset + width <= self.width, "field out of range");
        if offset % 64 == 0 && width % 64 == 0 {
            let start = (offset / 64) as usize;
            return Bits::from_words(width, &self.words[start..start + words_for(width)]);
        }
        let mut out = Bits::zero(width);
        for i in 0..width {
            if self.bit(offset + i) {
                out.set_bit(i, true);
            }
        }
        out
    }

    /// Overwrite the bits starting at `offset` with `value`.
    pub fn set_field(&mut self, offset: u32, value: &Bits) {
        assert!(offset + value.width <= self.width, "field out of range");
        if offset % 64 == 0 && value.width % 64 == 0 {
            let start = (offset / 64) as usize;
            self.words[start..start + value.words.len()].copy_from_slice(&value.words);
            return;
        }
        for i in 0..value.width {
            self.set_bit(offset + i, value.bit(i));
        }
    }

    /// Zero-extend or truncate to `width`.
    pub fn resize(&self, width: u32) -> Bits {
        Bits::from_words(width, &self.words)
    }

    /// Sign-extend or truncate to `width`.
    pub fn sext(&self, width: u32) -> Bits {
        let mut out = self.resize(width);
        if width > self.width && self.sign_bit() {
            for i in self.width..width {
                out.set_bit(i, true);
            }
        }
        out
    }

    pub fn not(&self) -> Bits {
        let mut out = self.clone();
        out.words.iter_mut().for_each(|w| *w = !*w);
        out.normalize();
        out
    }

    pub fn and(&self, other: &Bits) -> Bits {
        self.zip_words(other, |a, b| a & b)
    }

    pub fn or(&self, other: &Bits) -> Bits {
        self.zip_words(other, |a, b| a | b)
    }

    pub fn xor(&self, other: &Bits) -> Bits {
        self.zip_words(other, |a, b| a ^ b)
    }

    /// Wrapping addition.
    pub fn add(&self, other: &Bits) -> Bits {
        self.check_width(other);
        let mut out = Bits::zero(self.width);
        let mut carry = false;
        for (i, dst) in out.words.iter_mut().enumerate() {
            let (sum, c1) = self.words[i].overflowing_add(other.words[i]);
            let (sum, c2) = sum.overflowing_add(carry as u64);
            *dst = sum;
            carry = c1 || c2;
        }
        out.normalize();
        out
    }

    /// Wrapping subtraction.
    pub fn sub(&self, other: &Bits) -> Bits {
        self.add(&other.negate())
    }

    /// Two's-complement negation.
    pub fn negate(&self) -> Bits {
        self.not().add(&Bits::from_u64(self.width, 1))
    }

    /// Wrapping multiplication.
    pub fn mul(&self, other: &Bits) -> Bits {
        self.check_width(other);
        let n = self.words.len();
        let mut acc = vec![0u64; n];
        for i in 0..n {
            let mut carry: u128 = 0;
            for j in 0..(n - i) {
                let cur = acc[i + j] as u128
                    + (self.words[i] as u128) * (other.words[j] as u128)
                    + carry;
                acc[i + j] = cur as u64;
                carry = cur >> 64;
            }
        }
        Bits::from_words(self.width, &acc)
    }

    /// Left shift; amounts at or beyond the width give zero.
    pub fn shl(&self, amount: u64) -> Bits {
        let mut out = Bits::zero(self.width);
        if amount >= self.width as u64 {
            return out;
        }
        let word_shift = (amount / 64) as usize;
        let bit_shift = (amount % 64) as u32;
        for i in (word_shift..out.words.len()).rev() {
            let src = i - word_shift;
            let mut word = self.words[src] << bit_shift;
            if bit_shift > 0 && src > 0 {
                word |= self.words[src - 1] >> (64 - bit_shift);
            }
            out.words[i] = word;
        }
        out.normalize();
        out
    }

    /// Logical right shift; amounts at or beyond the width give zero.
    pub fn lshr(&self, amount: u64) -> Bits {
        let mut out = Bits::zero(self.width);
        if amount >= self.width as u64 {
            return out;
        }
        let word_shift = (amount / 64) as usize;
        let bit_shift = (amount % 64) as u32;
        let len = self.words.len();
        for i in 0..(len - word_shift) {
            let src = i + word_shift;
            let mut word = self.words[src] >> bit_shift;
            if bit_shift > 0 && src + 1 < len {
                word |= self.words[src + 1] << (64 - bit_shift);
            }
            out.words[i] = word;
        }
        out
    }

    /// Arithmetic right shift; amounts at or beyond the width give the sign fill.
    pub fn ashr(&self, amount: u64) -> Bits {
        if !self.sign_bit() {
            return self.lshr(amount);
        }
        if amount >= self.width as u64 {
            return Bits::ones(self.width);
        }
        let fill = Bits::ones(self.width).shl(self.width as u64 - amount);
        self.lshr(amount).or(&fill)
    }

    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Unsigned less-than.
    pub fn ult(&self, other: &Bits) -> bool {
        self.check_width(other);
        for i in (0..self.words.len()).rev() {
            if self.words[i] != other.words[i] {
                return self.words[i] < other.words[i];
            }
        }
        false
    }

    /// Signed less-than.
    pub fn slt(&self, other: &Bits) -> bool {
        match (self.sign_bit(), other.sign_bit()) {
            (true, false) => true,
            (false, true) => false,
            _ => self.ult(other),
        }
    }

    fn zip_words(&self, other: &Bits, f: impl Fn(u64, u64) -> u64) -> Bits {
        self.check_width(other);
        let words: Vec<u64> = self
            .words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| f(*a, *b))
            .collect();
        Bits::from_words(self.width, &words)
    }

    fn check_width(&self, other: &Bits) {
        assert_eq!(
            self.width, other.width,
            "operand widths differ: {} vs {}",
            self.width, other.width
        );
    }

    fn normalize(&mut self) {
        let rem = self.width % 64;
        if rem != 0 {
            if let Some(top) = self.words.last_mut() {
                *top &= (1u64 << rem) - 1;
            }
        }
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for (i, word) in self.words.iter().rev().enumerate() {
            if i == 0 {
                write!(f, "{:x}", word)?;
            } else {
                write!(f, "_{:016x}", word)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_truncates() {
        let b = Bits::from_u64(8, 0x1ff);
        assert_eq!(b.low_u64(), 0xff);
        assert_eq!(Bits::ones(12).low_u64(), 0xfff);
    }

    #[test]
    fn test_add_carries_across_words() {
        let a = Bits::from_words(128, &[u64::MAX, 0]);
        let b = Bits::from_u64(128, 1);
        assert_eq!(a.add(&b).words(), &[0, 1]);
    }

    #[test]
    fn test_add_wraps() {
        let a = Bits::ones(64);
        let b = Bits::from_u64(64, 2);
        assert_eq!(a.add(&b).low_u64(), 1);
    }

    #[test]
    fn test_sub_and_negate() {
        let a = Bits::from_u64(16, 3);
        let b = Bits::from_u64(16, 5);
        assert_eq!(a.sub(&b).low_u64(), 0xfffe);
        assert_eq!(Bits::from_u64(32, 1).negate().low_u64(), 0xffff_ffff);
    }

    #[test]
    fn test_mul_wide() {
        let a = Bits::from_words(128, &[1 << 63, 0]);
        let b = Bits::from_u64(128, 4);
        assert_eq!(a.mul(&b).words(), &[0, 2]);
    }

    #[test]
    fn test_shifts() {
        let a = Bits::from_words(128, &[0x8000_0000_0000_0001, 0]);
        assert_eq!(a.shl(1).words(), &[2, 1]);
        assert_eq!(a.shl(64).words(), &[0, 0x8000_0000_0000_0001]);
        assert_eq!(a.shl(128).words(), &[0, 0]);
        assert_eq!(a.shl(1).lshr(1).words(), a.words());
        assert_eq!(a.lshr(200).words(), &[0, 0]);
    }

    #[test]
    fn test_ashr_sign_fill() {
        let a = Bits::from_u64(8, 0x80);
        assert_eq!(a.ashr(3).low_u64(), 0xf0);
        assert_eq!(a.ashr(8).low_u64(), 0xff);
        assert_eq!(Bits::from_u64(8, 0x40).ashr(3).low_u64(), 0x08);
    }

    #[test]
    fn test_field_round_trip() {
        let mut a = Bits::zero(256);
        a.set_field(60, &Bits::from_u64(8, 0xa5));
        assert_eq!(a.field(60, 8).low_u64(), 0xa5);
        assert_eq!(a.words()[0] >> 60, 0x5);
        assert_eq!(a.words()[1], 0xa);
    }

    #[test]
    fn test_comparisons() {
        let small = Bits::from_u64(8, 0x01);
        let neg = Bits::from_u64(8, 0xff);
        assert!(small.ult(&neg));
        assert!(neg.slt(&small));
        assert!(!small.slt(&small));
    }

    #[test]
    fn test_sext() {
        assert_eq!(Bits::from_u64(4, 0x8).sext(8).low_u64(), 0xf8);
        assert_eq!(Bits::from_u64(4, 0x7).sext(8).low_u64(), 0x07);
    }

    #[test]
    fn test_display() {
        let a = Bits::from_words(128, &[0xff, 1]);
        assert_eq!(a.to_string(), "0x1_00000000000000ff");
    }
}
