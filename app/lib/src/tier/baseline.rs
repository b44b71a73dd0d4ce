//! Generic implementations of every primitive.
//!
//! Built only from structural backend requests (casts, shuffles, lane
//! access, constants and elementwise arithmetic) plus the backend's generic
//! population count. Correct at every block width and every field width
//! that partitions the block; every dispatch chain ends here.

use super::advance::{self, BitGather};
use super::dispatcher::{Carry, IdisaBuilder};
use crate::backend::{Backend, BinOp, CmpPred, Intrinsic, ScalarKind};

/// Width of the scalar a sign mask over `count` fields is returned in.
fn signmask_width(count: u32) -> u32 {
    count.max(32)
}

pub(crate) fn hsimd_signmask<B: Backend>(b: &mut IdisaBuilder<B>, fw: u32, a: &B::Value) -> B::Value {
    let count = b.block_width() / fw;
    let width = signmask_width(count);
    let fields = b.fw_cast(a, fw);
    let top = b.backend.const_int(fw, (fw - 1) as u64);
    let mut mask = b.backend.const_int(width, 0);
    for i in 0..count {
        let field = b.backend.extract_element(&fields, i);
        let sign = b.scalar(BinOp::LShr, &field, &top);
        let sign = b.backend.zext_or_trunc(&sign, width);
        let pos = b.backend.const_int(width, i as u64);
        let bit = b.scalar(BinOp::Shl, &sign, &pos);
        mask = b.scalar(BinOp::Or, &mask, &bit);
    }
    mask
}

fn pack<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
    high: bool,
) -> B::Value {
    assert!(fw >= 2, "cannot pack {}-bit fields", fw);
    let half = fw / 2;
    let a = b.fw_cast(a, half);
    let c = b.fw_cast(c, half);
    let count = 2 * b.block_width() / fw;
    let indices: Vec<u32> = (0..count).map(|i| 2 * i + high as u32).collect();
    let packed = b.backend.shuffle(&a, Some(&c), &indices);
    b.bit_cast(&packed)
}

pub(crate) fn hsimd_packh<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> B::Value {
    pack(b, fw, a, c, true)
}

pub(crate) fn hsimd_packl<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> B::Value {
    pack(b, fw, a, c, false)
}

fn merge<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
    high: bool,
) -> B::Value {
    let count = b.block_width() / fw;
    assert!(count >= 2, "cannot merge {}-bit fields of a {}-bit block", fw, b.block_width());
    let base = if high { count / 2 } else { 0 };
    let mut indices = Vec::with_capacity(count as usize);
    for i in 0..count / 2 {
        indices.push(base + i);
        indices.push(base + i + count);
    }
    let a = b.fw_cast(a, fw);
    let c = b.fw_cast(c, fw);
    let merged = b.backend.shuffle(&a, Some(&c), &indices);
    b.bit_cast(&merged)
}

pub(crate) fn esimd_mergeh<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> B::Value {
    merge(b, fw, a, c, true)
}

pub(crate) fn esimd_mergel<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> B::Value {
    merge(b, fw, a, c, false)
}

fn pack_in_lanes<B: Backend>(
    b: &mut IdisaBuilder<B>,
    lanes: u32,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
    high: bool,
) -> B::Value {
    let half = fw / 2;
    let width = b.block_width();
    assert!(
        half >= 1 && lanes >= 1 && width % (half * lanes) == 0,
        "cannot pack {}-bit fields in {} lanes of a {}-bit block",
        fw,
        lanes,
        width
    );
    // Output fields per lane; each lane takes half from `a` and half from `c`.
    let per_lane = width / (half * lanes);
    assert!(per_lane >= 2, "lanes narrower than two {}-bit fields", fw);
    let count = width / half;
    let mut indices = vec![0u32; count as usize];
    for lane in 0..lanes {
        for i in 0..per_lane / 2 {
            let source = 2 * (lane * per_lane / 2 + i) + high as u32;
            indices[(lane * per_lane + i) as usize] = source;
            indices[(lane * per_lane + per_lane / 2 + i) as usize] = source + count;
        }
    }
    let a = b.fw_cast(a, half);
    let c = b.fw_cast(c, half);
    let packed = b.backend.shuffle(&a, Some(&c), &indices);
    b.bit_cast(&packed)
}

pub(crate) fn hsimd_packh_in_lanes<B: Backend>(
    b: &mut IdisaBuilder<B>,
    lanes: u32,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> B::Value {
    pack_in_lanes(b, lanes, fw, a, c, true)
}

pub(crate) fn hsimd_packl_in_lanes<B: Backend>(
    b: &mut IdisaBuilder<B>,
    lanes: u32,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> B::Value {
    pack_in_lanes(b, lanes, fw, a, c, false)
}

/// Convert a carry in either representation to an `i32`.
pub(crate) fn carry_in_bit<B: Backend>(b: &mut IdisaBuilder<B>, carry: &Carry<B::Value>) -> B::Value {
    match carry {
        Carry::Bit(v) => b.backend.zext_or_trunc(v, 32),
        Carry::Block(v) => b.mvmd_extract(32, v, 0),
    }
}

/// Wrap an `i32` carry in the representation of `like`.
pub(crate) fn carry_out_as<B: Backend>(
    b: &mut IdisaBuilder<B>,
    bit: B::Value,
    like: &Carry<B::Value>,
) -> Carry<B::Value> {
    match like {
        Carry::Bit(_) => Carry::Bit(bit),
        Carry::Block(_) => {
            let wide = b.backend.zext_or_trunc(&bit, b.block_width());
            Carry::Block(b.bit_cast(&wide))
        }
    }
}

/// Limb-by-limb ripple addition.
pub(crate) fn bitblock_add_with_carry<B: Backend>(
    b: &mut IdisaBuilder<B>,
    e1: &B::Value,
    e2: &B::Value,
    carry_in: &Carry<B::Value>,
) -> (Carry<B::Value>, B::Value) {
    let bit = carry_in_bit(b, carry_in);
    let mut carry = b.backend.zext_or_trunc(&bit, 1);
    let mut sum = b.all_zeroes();
    for i in 0..b.block_width() / 64 {
        let x = b.mvmd_extract(64, e1, i);
        let y = b.mvmd_extract(64, e2, i);
        let partial = b.scalar(BinOp::Add, &x, &y);
        let overflow = b.backend.compare(CmpPred::Ult, &partial, &x);
        let incoming = b.backend.zext_or_trunc(&carry, 64);
        let limb = b.scalar(BinOp::Add, &partial, &incoming);
        let wrapped = b.backend.compare(CmpPred::Ult, &limb, &partial);
        carry = b.scalar(BinOp::Or, &overflow, &wrapped);
        sum = b.mvmd_insert(64, &sum, &limb, i);
    }
    let carry_out = b.backend.zext_or_trunc(&carry, 32);
    let sum = b.bit_cast(&sum);
    (carry_out_as(b, carry_out, carry_in), sum)
}

pub(crate) fn bitblock_indexed_advance<B: Backend>(
    b: &mut IdisaBuilder<B>,
    strm: &B::Value,
    index_strm: &B::Value,
    shift_in: &B::Value,
    shift_amount: u32,
) -> (B::Value, B::Value) {
    advance::indexed_advance(b, BitGather::Portable, strm, index_strm, shift_in, shift_amount)
}

pub(crate) fn esimd_bitspread<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    bitmask: &B::Value,
) -> B::Value {
    let count = b.block_width() / fw;
    if count <= fw {
        // Broadcast, isolate bit i in field i, move it to the sign, smear it.
        let mask = b.backend.zext_or_trunc(bitmask, fw);
        let ty = b.fw_type(fw);
        let undef = b.backend.undef(ty);
        let seeded = b.backend.insert_element(&undef, &mask, 0);
        let broadcast = b.backend.shuffle(&seeded, None, &vec![0; count as usize]);
        let selectors: Vec<u64> = (0..count).map(|i| 1u64 << i).collect();
        let selectors = b.backend.const_vector(ScalarKind::Int(fw), &selectors);
        let isolated = b.backend.binary(BinOp::And, &broadcast, &selectors);
        let amounts: Vec<u64> = (0..count).map(|i| (fw - 1 - i) as u64).collect();
        let amounts = b.backend.const_vector(ScalarKind::Int(fw), &amounts);
        let signs = b.backend.binary(BinOp::Shl, &isolated, &amounts);
        let spread = b.simd_srai(fw, &signs, fw - 1);
        b.bit_cast(&spread)
    } else {
        // More fields than a field has bits: build each field from its bit.
        let mask = b.backend.zext_or_trunc(bitmask, count);
        let one = b.backend.const_int(count, 1);
        let zero = b.backend.const_int(count, 0);
        let mut spread = b.all_zeroes();
        for i in 0..count {
            let pos = b.backend.const_int(count, i as u64);
            let shifted = b.scalar(BinOp::LShr, &mask, &pos);
            let bit = b.scalar(BinOp::And, &shifted, &one);
            let smeared = b.scalar(BinOp::Sub, &zero, &bit);
            let field = b.backend.zext_or_trunc(&smeared, fw);
            spread = b.mvmd_insert(fw, &spread, &field, i);
        }
        b.bit_cast(&spread)
    }
}

pub(crate) fn simd_popcount<B: Backend>(b: &mut IdisaBuilder<B>, fw: u32, a: &B::Value) -> B::Value {
    let ctpop = b.backend.declare(Intrinsic::Ctpop);
    let fields = b.fw_cast(a, fw);
    let counts = b.backend.call(&ctpop, &[fields]);
    b.bit_cast(&counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EvalValue, Evaluator, ValueType};
    use crate::tier::{BlockWidth, CpuFeatures, Tier, TierKind};

    fn builder(width: BlockWidth) -> IdisaBuilder<Evaluator> {
        let tier = Tier::new(TierKind::Base, width, width.bits(), CpuFeatures::none());
        IdisaBuilder::new(Evaluator::new(), tier)
    }

    fn bytes(v: &EvalValue) -> Vec<u8> {
        v.limbs().iter().flat_map(|l| l.to_le_bytes()).collect()
    }

    #[test]
    fn test_signmask_bytes() {
        let mut b = builder(BlockWidth::W128);
        let a = Evaluator::block(&[0x8000_0000_0000_0080, 0x0080_0000_0000_0000]);
        let mask = hsimd_signmask(&mut b, 8, &a);
        assert_eq!(mask.ty(), ValueType::int(32));
        assert_eq!(mask.to_u64(), (1 << 0) | (1 << 7) | (1 << 14));
    }

    #[test]
    fn test_signmask_wide_result() {
        let mut b = builder(BlockWidth::W512);
        let a = Evaluator::block(&[u64::MAX; 8]);
        let mask = hsimd_signmask(&mut b, 8, &a);
        assert_eq!(mask.ty(), ValueType::int(64));
        assert_eq!(mask.to_u64(), u64::MAX);
    }

    #[test]
    fn test_packh_packl() {
        let mut b = builder(BlockWidth::W128);
        let a = Evaluator::block(&[0x0403_0201_1413_1211, 0]);
        let c = Evaluator::block(&[0, 0xaabb_ccdd_eeff_0011]);
        let h = hsimd_packh(&mut b, 16, &a, &c);
        assert_eq!(bytes(&h), vec![0x12, 0x14, 0x02, 0x04, 0, 0, 0, 0, 0, 0, 0, 0, 0x00, 0xee, 0xcc, 0xaa]);
        let l = hsimd_packl(&mut b, 16, &a, &c);
        assert_eq!(bytes(&l), vec![0x11, 0x13, 0x01, 0x03, 0, 0, 0, 0, 0, 0, 0, 0, 0x11, 0xff, 0xdd, 0xbb]);
    }

    #[test]
    fn test_merge() {
        let mut b = builder(BlockWidth::W256);
        let a = Evaluator::block(&[1, 2, 3, 4]);
        let c = Evaluator::block(&[5, 6, 7, 8]);
        assert_eq!(esimd_mergel(&mut b, 64, &a, &c).limbs(), vec![1, 5, 2, 6]);
        assert_eq!(esimd_mergeh(&mut b, 64, &a, &c).limbs(), vec![3, 7, 4, 8]);
        assert_eq!(esimd_mergeh(&mut b, 128, &a, &c).limbs(), vec![3, 4, 7, 8]);
    }

    #[test]
    fn test_pack_in_lanes() {
        let mut b = builder(BlockWidth::W256);
        let a = Evaluator::block(&[0x0001_0002_0003_0004, 0, 0x0005_0006_0007_0008, 0]);
        let c = Evaluator::block(&[0, 0x0009_000a_000b_000c, 0, 0]);
        let l = hsimd_packl_in_lanes(&mut b, 2, 16, &a, &c);
        assert_eq!(
            l.limbs(),
            vec![0x0000_0000_0102_0304, 0x090a_0b0c_0000_0000, 0x0000_0000_0506_0708, 0]
        );
        let h = hsimd_packh_in_lanes(&mut b, 2, 16, &a, &c);
        assert_eq!(h.limbs(), vec![0; 4]);
    }

    #[test]
    fn test_add_with_carry_ripples() {
        let mut b = builder(BlockWidth::W256);
        let e1 = Evaluator::block(&[u64::MAX, u64::MAX, 5, u64::MAX]);
        let e2 = Evaluator::block(&[1, 0, 0, 0]);
        let carry = Carry::Bit(Evaluator::scalar(32, 0));
        let (out, sum) = bitblock_add_with_carry(&mut b, &e1, &e2, &carry);
        assert_eq!(sum.limbs(), vec![0, 0, 6, u64::MAX]);
        assert_eq!(out.value().to_u64(), 0);

        let carry = Carry::Block(Evaluator::block(&[1, 0, 0, 0]));
        let e1 = Evaluator::block(&[u64::MAX; 4]);
        let zero = Evaluator::block(&[0; 4]);
        let (out, sum) = bitblock_add_with_carry(&mut b, &e1, &zero, &carry);
        assert_eq!(sum.limbs(), vec![0; 4]);
        assert!(out.is_block());
        assert_eq!(out.value().limbs(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_bitspread_both_shapes() {
        let mut b = builder(BlockWidth::W256);
        let mask = Evaluator::scalar(32, 0b1010);
        assert_eq!(
            esimd_bitspread(&mut b, 64, &mask).limbs(),
            vec![0, u64::MAX, 0, u64::MAX]
        );
        let mask = Evaluator::scalar(32, 0x8000_0001);
        let spread = esimd_bitspread(&mut b, 8, &mask);
        assert_eq!(spread.limbs(), vec![0xff, 0, 0, 0xff00_0000_0000_0000]);
    }

    #[test]
    fn test_popcount() {
        let mut b = builder(BlockWidth::W128);
        let a = Evaluator::block(&[0xff00_0000_0000_0001, 0x0f0f]);
        assert_eq!(simd_popcount(&mut b, 64, &a).limbs(), vec![9, 8]);
        assert_eq!(simd_popcount(&mut b, 32, &a).limbs(), vec![1 | (8 << 32), 8]);
        assert_eq!(b.backend().calls_to(Intrinsic::Ctpop), 2);
    }
}
