//! Indexed advance.
//!
//! Each machine word of the stream is compressed to the bits its index
//! word selects, shifted as a dense run together with the bits carried from
//! earlier words, and scattered back to the selected positions. The regime
//! is fixed per call by the shift amount: below the word width the carry
//! fits in one word; up to the block width it is kept as one block-wide
//! integer; beyond that the whole selected subsequence is shifted out and
//! the result is drawn from the incoming carry alone.

use super::dispatcher::IdisaBuilder;
use crate::backend::{Backend, BinOp, CmpPred, Intrinsic, ValueType};
use crate::error::{IdisaError, Result};
use log::error;

/// How selected bits are compressed and scattered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BitGather {
    /// BMI2 `pext`/`pdep`.
    Bmi2,
    /// Bit-serial extract/deposit from shifts and masks.
    Portable,
}

/// Word widths an indexed advance can run with.
pub(crate) fn check_word_width(width: u32, shift: u32) -> Result<()> {
    match width {
        64 => Ok(()),
        32 if shift < 32 => Ok(()),
        _ => {
            error!(
                "indexed advance unsupported for {}-bit words with shift amount {}",
                width, shift
            );
            Err(IdisaError::UnsupportedWordWidth { width, shift })
        }
    }
}

impl BitGather {
    fn extract<B: Backend>(self, b: &mut IdisaBuilder<B>, src: &B::Value, mask: &B::Value) -> B::Value {
        match self {
            BitGather::Bmi2 => {
                let pext = match b.tier().word_width() {
                    32 => Intrinsic::Pext32,
                    _ => Intrinsic::Pext64,
                };
                let f = b.backend.declare(pext);
                b.backend.call(&f, &[src.clone(), mask.clone()])
            }
            BitGather::Portable => serial_gather(b, src, mask, true),
        }
    }

    fn deposit<B: Backend>(self, b: &mut IdisaBuilder<B>, src: &B::Value, mask: &B::Value) -> B::Value {
        match self {
            BitGather::Bmi2 => {
                let pdep = match b.tier().word_width() {
                    32 => Intrinsic::Pdep32,
                    _ => Intrinsic::Pdep64,
                };
                let f = b.backend.declare(pdep);
                b.backend.call(&f, &[src.clone(), mask.clone()])
            }
            BitGather::Portable => serial_gather(b, src, mask, false),
        }
    }
}

/// Walk the mask bit by bit, keeping the dense position in a running count.
/// Extracting moves bit `j` of `src` to the dense position; depositing moves
/// the dense bit to position `j`.
fn serial_gather<B: Backend>(
    b: &mut IdisaBuilder<B>,
    src: &B::Value,
    mask: &B::Value,
    extract: bool,
) -> B::Value {
    let width = b.tier().word_width();
    let one = b.backend.const_int(width, 1);
    let mut out = b.backend.const_int(width, 0);
    let mut dense = b.backend.const_int(width, 0);
    for j in 0..width {
        let pos = b.backend.const_int(width, j as u64);
        let selected = b.scalar(BinOp::LShr, mask, &pos);
        let selected = b.scalar(BinOp::And, &selected, &one);
        let (from, to) = if extract { (&pos, &dense) } else { (&dense, &pos) };
        let bit = b.scalar(BinOp::LShr, src, from);
        let bit = b.scalar(BinOp::And, &bit, &selected);
        let placed = b.scalar(BinOp::Shl, &bit, to);
        out = b.scalar(BinOp::Or, &out, &placed);
        dense = b.scalar(BinOp::Add, &dense, &selected);
    }
    out
}

/// One word of the stream and its index.
struct Word<V> {
    index: V,
    popcount: V,
    bits: V,
}

fn load_word<B: Backend>(
    b: &mut IdisaBuilder<B>,
    gather: BitGather,
    strm: &B::Value,
    index_strm: &B::Value,
    i: u32,
) -> Word<B::Value> {
    let width = b.tier().word_width();
    let s = b.mvmd_extract(width, strm, i);
    let index = b.mvmd_extract(width, index_strm, i);
    let ctpop = b.backend.declare(Intrinsic::Ctpop);
    let popcount = b.backend.call(&ctpop, &[index.clone()]);
    let bits = gather.extract(b, &s, &index);
    Word {
        index,
        popcount,
        bits,
    }
}

/// Returns `(carry_out, result)`, both as bit blocks. The word width must
/// have passed [`check_word_width`].
pub(crate) fn indexed_advance<B: Backend>(
    b: &mut IdisaBuilder<B>,
    gather: BitGather,
    strm: &B::Value,
    index_strm: &B::Value,
    shift_in: &B::Value,
    shift: u32,
) -> (B::Value, B::Value) {
    let width = b.tier().word_width();
    let block = b.block_width();
    let words = block / width;
    let shift_val = b.backend.const_int(width, shift as u64);
    let mut result = b.all_zeroes();

    if shift < width {
        let mut carry = b.mvmd_extract(width, shift_in, 0);
        for i in 0..words {
            let w = load_word(b, gather, strm, index_strm, i);
            let shifted = b.scalar(BinOp::Shl, &w.bits, &shift_val);
            let advanced = b.scalar(BinOp::Or, &shifted, &carry);
            // Fewer selected bits than the shift: part of the old carry
            // stays in flight.
            let small = b.backend.compare(CmpPred::Ult, &w.popcount, &shift_val);
            let room = b.scalar(BinOp::Sub, &shift_val, &w.popcount);
            let kept = b.scalar(BinOp::Shl, &w.bits, &room);
            let remaining = b.scalar(BinOp::LShr, &carry, &w.popcount);
            let carry_small = b.scalar(BinOp::Or, &kept, &remaining);
            let excess = b.scalar(BinOp::Sub, &w.popcount, &shift_val);
            let carry_large = b.scalar(BinOp::LShr, &w.bits, &excess);
            carry = b.backend.select(&small, &carry_small, &carry_large);
            let deposited = gather.deposit(b, &advanced, &w.index);
            result = b.mvmd_insert(width, &result, &deposited, i);
        }
        let zero = b.all_zeroes();
        let carry_out = b.mvmd_insert(width, &zero, &carry, 0);
        (b.bit_cast(&carry_out), b.bit_cast(&result))
    } else if shift <= block {
        let mut carry = b.backend.bitcast(shift_in, ValueType::int(block));
        for i in 0..words {
            let w = load_word(b, gather, strm, index_strm, i);
            let front = b.backend.zext_or_trunc(&carry, width);
            let deposited = gather.deposit(b, &front, &w.index);
            result = b.mvmd_insert(width, &result, &deposited, i);
            let consumed = b.backend.zext_or_trunc(&w.popcount, block);
            carry = b.scalar(BinOp::LShr, &carry, &consumed);
            let room = b.scalar(BinOp::Sub, &shift_val, &w.popcount);
            let room = b.backend.zext_or_trunc(&room, block);
            let appended = b.backend.zext_or_trunc(&w.bits, block);
            let appended = b.scalar(BinOp::Shl, &appended, &room);
            carry = b.scalar(BinOp::Or, &carry, &appended);
        }
        (b.bit_cast(&carry), b.bit_cast(&result))
    } else {
        let mut carry = b.backend.bitcast(shift_in, ValueType::int(block));
        let mut carry_out = b.backend.const_int(block, 0);
        let mut generated = b.backend.const_int(width, 0);
        for i in 0..words {
            let w = load_word(b, gather, strm, index_strm, i);
            let front = b.backend.zext_or_trunc(&carry, width);
            let deposited = gather.deposit(b, &front, &w.index);
            result = b.mvmd_insert(width, &result, &deposited, i);
            let consumed = b.backend.zext_or_trunc(&w.popcount, block);
            carry = b.scalar(BinOp::LShr, &carry, &consumed);
            let offset = b.backend.zext_or_trunc(&generated, block);
            let bits = b.backend.zext_or_trunc(&w.bits, block);
            let bits = b.scalar(BinOp::Shl, &bits, &offset);
            carry_out = b.scalar(BinOp::Or, &carry_out, &bits);
            generated = b.scalar(BinOp::Add, &generated, &w.popcount);
        }
        (b.bit_cast(&carry_out), b.bit_cast(&result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EvalValue, Evaluator};
    use crate::tier::{BlockWidth, CpuFeatures, Tier, TierKind};

    fn builder(word_width: u32) -> IdisaBuilder<Evaluator> {
        let tier = Tier::new(TierKind::Base, BlockWidth::W128, 128, CpuFeatures::none())
            .with_word_width(word_width);
        IdisaBuilder::new(Evaluator::new(), tier)
    }

    fn run(
        gather: BitGather,
        strm: [u64; 2],
        ix: [u64; 2],
        shift_in: [u64; 2],
        shift: u32,
    ) -> (Vec<u64>, Vec<u64>) {
        let mut b = builder(64);
        let (carry, result) = indexed_advance(
            &mut b,
            gather,
            &Evaluator::block(&strm),
            &Evaluator::block(&ix),
            &Evaluator::block(&shift_in),
            shift,
        );
        (carry.limbs(), result.limbs())
    }

    #[test]
    fn test_check_word_width() {
        assert!(check_word_width(64, 500).is_ok());
        assert!(check_word_width(32, 31).is_ok());
        assert!(matches!(
            check_word_width(32, 32),
            Err(IdisaError::UnsupportedWordWidth { width: 32, shift: 32 })
        ));
        assert!(check_word_width(16, 0).is_err());
    }

    #[test]
    fn test_serial_gather_matches_bmi2() {
        let mut b = builder(64);
        let src = Evaluator::scalar(64, 0xdead_beef_0123_4567);
        let mask = Evaluator::scalar(64, 0x0f0f_ff00_1248_8421);
        let portable = BitGather::Portable.extract(&mut b, &src, &mask);
        let native = BitGather::Bmi2.extract(&mut b, &src, &mask);
        assert_eq!(portable, native);
        let portable = BitGather::Portable.deposit(&mut b, &src, &mask);
        let native = BitGather::Bmi2.deposit(&mut b, &src, &mask);
        assert_eq!(portable, native);
    }

    #[test]
    fn test_regimes_hand_computed() {
        for gather in [BitGather::Bmi2, BitGather::Portable] {
            assert_eq!(
                run(gather, [0b1010, 0], [0b1111, 0b1], [1, 0], 1),
                (vec![0, 0], vec![0b0101, 1])
            );
            assert_eq!(
                run(gather, [u64::MAX, 0], [0xf, 0], [0, 0], 63),
                (vec![0x7800_0000_0000_0000, 0], vec![0, 0])
            );
            assert_eq!(
                run(gather, [0b11, 0], [0b11, 0b1], [5, 0], 64),
                (vec![0x6000_0000_0000_0000, 0], vec![1, 1])
            );
            assert_eq!(
                run(gather, [1, 0], [1, 0], [0, 0], 65),
                (vec![0, 1], vec![0, 0])
            );
            assert_eq!(
                run(gather, [0, 1 << 63], [0, 1 << 63], [7, 0], 128),
                (vec![3, 1 << 63], vec![0, 1 << 63])
            );
            assert_eq!(
                run(gather, [0b10, 0b1], [0b11, 0b1], [0b101, 0], 129),
                (vec![0b110, 0], vec![0b01, 1])
            );
        }
    }

    #[test]
    fn test_thirty_two_bit_words() {
        let mut b = builder(32);
        let strm: EvalValue = Evaluator::block(&[0xffff_0000_1234_5678, 0x8000_0000_0000_0001]);
        let ix = Evaluator::block(&[0x0f0f_0f0f_ffff_ffff, u64::MAX]);
        let zero = Evaluator::block(&[0, 0]);
        let (carry, result) = indexed_advance(&mut b, BitGather::Portable, &strm, &ix, &zero, 0);
        assert_eq!(result.limbs(), vec![0x0f0f_0000_1234_5678, 0x8000_0000_0000_0001]);
        assert_eq!(carry.limbs(), vec![0, 0]);
    }
}
