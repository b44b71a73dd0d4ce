//! AVX2 overrides.
//!
//! Byte sign masks, recursive packs, 128-bit lane merges, the saturating
//! lane pack, carry-save addition and the BMI2 indexed advance.

use super::advance::{self, BitGather};
use super::carry;
use super::dispatcher::{Carry, IdisaBuilder};
use crate::backend::{Backend, Intrinsic, ValueType};

pub(crate) fn hsimd_signmask<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
) -> Option<B::Value> {
    if b.block_width() != 256 || fw != 8 {
        return None;
    }
    let movmsk = b.backend.declare(Intrinsic::Pmovmskb256);
    let bytes = b.backend.bitcast(a, ValueType::int_vector(8, 32));
    Some(b.backend.call(&movmsk, &[bytes]))
}

/// Shuffle the `fw/2` halves of every field so that each half of the block
/// holds first the low halves and then the high halves of its fields.
/// Packing the result at field width `BW/2` then selects the wanted halves.
fn group_halves<B: Backend>(b: &mut IdisaBuilder<B>, fw: u32, a: &B::Value) -> B::Value {
    let count = 2 * b.block_width() / fw;
    let half = count / 2;
    let quarter = count / 4;
    let mut indices = vec![0u32; count as usize];
    for i in 0..quarter {
        indices[i as usize] = 2 * i;
        indices[(i + quarter) as usize] = 2 * i + 1;
        indices[(i + half) as usize] = 2 * i + half;
        indices[(i + half + quarter) as usize] = 2 * i + 1 + half;
    }
    let v = b.fw_cast(a, fw / 2);
    b.backend.shuffle(&v, None, &indices)
}

fn handles_pack(width: u32, fw: u32) -> bool {
    // Below 2 * fw the regrouped pack would recurse at the same width.
    fw > 8 && fw <= 64 && 2 * fw < width
}

pub(crate) fn hsimd_packh<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> Option<B::Value> {
    if !handles_pack(b.block_width(), fw) {
        return None;
    }
    let a = group_halves(b, fw, a);
    let c = group_halves(b, fw, c);
    let half_block = b.block_width() / 2;
    Some(b.hsimd_packh(half_block, &a, &c))
}

pub(crate) fn hsimd_packl<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> Option<B::Value> {
    if !handles_pack(b.block_width(), fw) {
        return None;
    }
    let a = group_halves(b, fw, a);
    let c = group_halves(b, fw, c);
    let half_block = b.block_width() / 2;
    Some(b.hsimd_packl(half_block, &a, &c))
}

fn lane_permute<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
    imm: u64,
) -> Option<B::Value> {
    if b.block_width() != 256 || fw != 128 || !b.tier().backend_caps().native_lane_permute {
        return None;
    }
    let vperm = b.backend.declare(Intrinsic::Vperm2i128);
    let a = b.fw_cast(a, 64);
    let c = b.fw_cast(c, 64);
    let imm = b.backend.const_int(8, imm);
    let merged = b.backend.call(&vperm, &[a, c, imm]);
    Some(b.bit_cast(&merged))
}

pub(crate) fn esimd_mergeh<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> Option<B::Value> {
    lane_permute(b, fw, a, c, 0x31)
}

pub(crate) fn esimd_mergel<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> Option<B::Value> {
    lane_permute(b, fw, a, c, 0x20)
}

fn packuswb<B: Backend>(b: &mut IdisaBuilder<B>, a: B::Value, c: B::Value) -> B::Value {
    let pack = b.backend.declare(Intrinsic::Packuswb256);
    let packed = b.backend.call(&pack, &[a, c]);
    b.bit_cast(&packed)
}

fn handles_lane_pack(width: u32, lanes: u32, fw: u32) -> bool {
    width == 256 && lanes == 2 && fw == 16
}

pub(crate) fn hsimd_packh_in_lanes<B: Backend>(
    b: &mut IdisaBuilder<B>,
    lanes: u32,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> Option<B::Value> {
    if !handles_lane_pack(b.block_width(), lanes, fw) {
        return None;
    }
    let a = b.simd_srli(fw, a, fw / 2);
    let c = b.simd_srli(fw, c, fw / 2);
    Some(packuswb(b, a, c))
}

pub(crate) fn hsimd_packl_in_lanes<B: Backend>(
    b: &mut IdisaBuilder<B>,
    lanes: u32,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> Option<B::Value> {
    if !handles_lane_pack(b.block_width(), lanes, fw) {
        return None;
    }
    let mask = b.simd_lomask(fw);
    let a = b.simd_and(a, &mask);
    let a = b.fw_cast(&a, fw);
    let c = b.simd_and(c, &mask);
    let c = b.fw_cast(&c, fw);
    Some(packuswb(b, a, c))
}

pub(crate) fn bitblock_add_with_carry<B: Backend>(
    b: &mut IdisaBuilder<B>,
    e1: &B::Value,
    e2: &B::Value,
    carry_in: &Carry<B::Value>,
) -> Option<(Carry<B::Value>, B::Value)> {
    Some(carry::add_with_carry(b, e1, e2, carry_in))
}

pub(crate) fn bitblock_indexed_advance<B: Backend>(
    b: &mut IdisaBuilder<B>,
    strm: &B::Value,
    index_strm: &B::Value,
    shift_in: &B::Value,
    shift_amount: u32,
) -> Option<(B::Value, B::Value)> {
    if !b.features().bmi2 {
        return None;
    }
    Some(advance::indexed_advance(
        b,
        BitGather::Bmi2,
        strm,
        index_strm,
        shift_in,
        shift_amount,
    ))
}
