//! AVX-512F overrides.
//!
//! Truncating packs (gated on AVX-512BW/DQ), the masked 256-bit broadcast
//! for bit spreading, and population counts.

use super::baseline;
use super::dispatcher::IdisaBuilder;
use crate::backend::{Backend, Intrinsic, ScalarKind, ValueType};

/// Always the generic sign mask, never the inherited movemask path.
pub(crate) fn hsimd_signmask<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
) -> Option<B::Value> {
    Some(baseline::hsimd_signmask(b, fw, a))
}

/// Truncating convert for `fw`-bit fields and its all-lanes mask.
fn narrowing<B: Backend>(b: &IdisaBuilder<B>, fw: u32) -> Option<(Intrinsic, u32, u64)> {
    if b.block_width() != 512 {
        return None;
    }
    let features = b.features();
    match fw {
        16 if features.avx512bw => Some((Intrinsic::PmovWb512, 32, 0xffff_ffff)),
        32 if features.avx512dq => Some((Intrinsic::PmovDw512, 16, 0xffff)),
        64 if features.avx512dq => Some((Intrinsic::PmovQd512, 8, 0xff)),
        _ => None,
    }
}

fn truncating_pack<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
    high: bool,
) -> Option<B::Value> {
    let (intrinsic, mask_width, mask) = narrowing(b, fw)?;
    let convert = b.backend.declare(intrinsic);
    let mask = b.backend.const_int(mask_width, mask);
    let count = b.block_width() / fw;
    let passthru = b.backend.undef(ValueType::int_vector(fw / 2, count));
    let narrow = |b: &mut IdisaBuilder<B>, v: &B::Value| {
        let v = if high {
            b.simd_srai(fw, v, fw / 2)
        } else {
            b.fw_cast(v, fw)
        };
        b.backend.call(&convert, &[v, passthru.clone(), mask.clone()])
    };
    let a = narrow(b, a);
    let c = narrow(b, c);
    let indices: Vec<u32> = (0..2 * count).collect();
    let packed = b.backend.shuffle(&a, Some(&c), &indices);
    Some(b.bit_cast(&packed))
}

pub(crate) fn hsimd_packh<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> Option<B::Value> {
    truncating_pack(b, fw, a, c, true)
}

pub(crate) fn hsimd_packl<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
    c: &B::Value,
) -> Option<B::Value> {
    truncating_pack(b, fw, a, c, false)
}

pub(crate) fn esimd_bitspread<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    bitmask: &B::Value,
) -> Option<B::Value> {
    if b.block_width() != 512 || fw != 64 {
        return None;
    }
    let broadcast = b.backend.declare(Intrinsic::MaskBroadcastI64x4_512);
    let ones = b.backend.const_vector(ScalarKind::Int(64), &[u64::MAX; 4]);
    let zeroes = b.backend.const_vector(ScalarKind::Int(64), &[0; 8]);
    let mask = b.backend.zext_or_trunc(bitmask, 8);
    Some(b.backend.call(&broadcast, &[ones, zeroes, mask]))
}

pub(crate) fn simd_popcount<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
) -> Option<B::Value> {
    if b.features().avx512vpopcntdq && (fw == 32 || fw == 64) {
        let vpopcnt = b.backend.declare(Intrinsic::Vpopcnt);
        let fields = b.fw_cast(a, fw);
        let counts = b.backend.call(&vpopcnt, &[fields]);
        return Some(b.bit_cast(&counts));
    }
    if b.block_width() != 512 || fw != 64 {
        return None;
    }
    let m1 = b.splat(64, 0x5555_5555_5555_5555);
    let m2 = b.splat(64, 0x3333_3333_3333_3333);
    let m4 = b.splat(64, 0x0f0f_0f0f_0f0f_0f0f);
    let h01 = b.splat(64, 0x0101_0101_0101_0101);

    let pairs = b.simd_srli(64, a, 1);
    let pairs = b.simd_and(&pairs, &m1);
    let x = b.simd_sub(64, a, &pairs);
    let low = b.simd_and(&x, &m2);
    let high = b.simd_srli(64, &x, 2);
    let high = b.simd_and(&high, &m2);
    let x = b.simd_add(64, &low, &high);
    let nibbles = b.simd_srli(64, &x, 4);
    let x = b.simd_add(64, &x, &nibbles);
    let x = b.simd_and(&x, &m4);
    let x = b.simd_mult(64, &x, &h01);
    let counts = b.simd_srli(64, &x, 56);
    Some(b.bit_cast(&counts))
}
