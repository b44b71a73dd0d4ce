//! Carry-save wide addition.
//!
//! The block is added as one unsigned integer of 64-bit limbs without a
//! per-limb carry loop: every limb is summed independently, the limb carries
//! and the saturated ("bubble") limbs are collected as scalar bitmasks, and a
//! single scalar addition ripples the carries across bubble runs. Limbs that
//! receive a carry are then incremented in one vector operation.

use super::baseline::{carry_in_bit, carry_out_as};
use super::dispatcher::{Carry, IdisaBuilder};
use crate::backend::{Backend, BinOp};

pub(crate) fn add_with_carry<B: Backend>(
    b: &mut IdisaBuilder<B>,
    e1: &B::Value,
    e2: &B::Value,
    carry_in: &Carry<B::Value>,
) -> (Carry<B::Value>, B::Value) {
    let carry_bit = carry_in_bit(b, carry_in);

    let carrygen = b.simd_and(e1, e2);
    let carryprop = b.simd_or(e1, e2);
    let digitsum = b.simd_add(64, e1, e2);
    // Sign bit of each lane: carry out of that limb.
    let not_sum = b.simd_not(&digitsum);
    let propagated = b.simd_and(&carryprop, &not_sum);
    let digitcarry = b.simd_or(&carrygen, &propagated);
    let carry_mask = b.hsimd_signmask(64, &digitcarry);
    let carry_mask = b.backend.zext_or_trunc(&carry_mask, 32);
    let doubled = b.scalar(BinOp::Add, &carry_mask, &carry_mask);
    let carry_mask2 = b.scalar(BinOp::Or, &doubled, &carry_bit);

    let ones = b.all_ones();
    let bubble = b.simd_eq(64, &digitsum, &ones);
    let bubble_mask = b.hsimd_signmask(64, &bubble);
    let bubble_mask = b.backend.zext_or_trunc(&bubble_mask, 32);
    let rippled = b.scalar(BinOp::Add, &bubble_mask, &carry_mask2);
    let increment_mask = b.scalar(BinOp::Xor, &rippled, &bubble_mask);

    // Each selected limb of the spread is all-ones, i.e. -1, so the
    // increment is a subtraction. Adding would need a spread of 1 per limb.
    let increments = b.esimd_bitspread(64, &increment_mask);
    let sum = b.simd_sub(64, &digitsum, &increments);
    let sum = b.bit_cast(&sum);

    let limbs = b.backend.const_int(32, (b.block_width() / 64) as u64);
    let carry_out = b.scalar(BinOp::LShr, &increment_mask, &limbs);
    (carry_out_as(b, carry_out, carry_in), sum)
}
