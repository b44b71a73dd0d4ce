//! Structural helpers shared by every tier.
//!
//! These wrap the raw backend requests with the field-width casts the
//! primitives need. Every vector helper accepts a value of any vector type
//! spanning the block and returns either a `fw`-typed vector or, for the
//! bitwise helpers, the block type `<BW/64 x i64>`.

use super::dispatcher::IdisaBuilder;
use crate::backend::{Backend, BinOp, CmpPred, ScalarKind, ValueType};

impl<B: Backend> IdisaBuilder<B> {
    /// The canonical bit block type, `<BW/64 x i64>`.
    pub fn block_type(&self) -> ValueType {
        ValueType::int_vector(64, self.block_width() / 64)
    }

    /// The block viewed as `BW/fw` fields of `fw` bits.
    pub fn fw_type(&self, fw: u32) -> ValueType {
        ValueType::int_vector(fw, self.block_width() / fw)
    }

    pub(crate) fn fw_cast(&mut self, a: &B::Value, fw: u32) -> B::Value {
        let ty = self.fw_type(fw);
        self.backend.bitcast(a, ty)
    }

    /// Normalize to the block type.
    pub(crate) fn bit_cast(&mut self, a: &B::Value) -> B::Value {
        let ty = self.block_type();
        self.backend.bitcast(a, ty)
    }

    pub(crate) fn all_ones(&mut self) -> B::Value {
        self.splat(64, u64::MAX)
    }

    pub(crate) fn all_zeroes(&mut self) -> B::Value {
        self.splat(64, 0)
    }

    /// Every `fw` field set to `value`. Values wider than 64 bits are
    /// zero-extended.
    pub(crate) fn splat(&mut self, fw: u32, value: u64) -> B::Value {
        let lanes = vec![value; (self.block_width() / fw) as usize];
        self.backend.const_vector(ScalarKind::Int(fw), &lanes)
    }

    /// Fields with their low `fw/2` bits set.
    pub(crate) fn simd_lomask(&mut self, fw: u32) -> B::Value {
        let half = fw / 2;
        let low = if half >= 64 { u64::MAX } else { (1u64 << half) - 1 };
        self.splat(fw, low)
    }

    fn bitwise(&mut self, op: BinOp, a: &B::Value, b: &B::Value) -> B::Value {
        let a = self.bit_cast(a);
        let b = self.bit_cast(b);
        self.backend.binary(op, &a, &b)
    }

    pub(crate) fn simd_and(&mut self, a: &B::Value, b: &B::Value) -> B::Value {
        self.bitwise(BinOp::And, a, b)
    }

    pub(crate) fn simd_or(&mut self, a: &B::Value, b: &B::Value) -> B::Value {
        self.bitwise(BinOp::Or, a, b)
    }

    pub(crate) fn simd_not(&mut self, a: &B::Value) -> B::Value {
        let a = self.bit_cast(a);
        self.backend.not(&a)
    }

    fn fieldwise(&mut self, op: BinOp, fw: u32, a: &B::Value, b: &B::Value) -> B::Value {
        let a = self.fw_cast(a, fw);
        let b = self.fw_cast(b, fw);
        self.backend.binary(op, &a, &b)
    }

    pub(crate) fn simd_add(&mut self, fw: u32, a: &B::Value, b: &B::Value) -> B::Value {
        self.fieldwise(BinOp::Add, fw, a, b)
    }

    pub(crate) fn simd_sub(&mut self, fw: u32, a: &B::Value, b: &B::Value) -> B::Value {
        self.fieldwise(BinOp::Sub, fw, a, b)
    }

    pub(crate) fn simd_mult(&mut self, fw: u32, a: &B::Value, b: &B::Value) -> B::Value {
        self.fieldwise(BinOp::Mul, fw, a, b)
    }

    /// All-ones fields where `a == b`.
    pub(crate) fn simd_eq(&mut self, fw: u32, a: &B::Value, b: &B::Value) -> B::Value {
        let a = self.fw_cast(a, fw);
        let b = self.fw_cast(b, fw);
        self.backend.compare(CmpPred::Eq, &a, &b)
    }

    fn shift_fields(&mut self, op: BinOp, fw: u32, a: &B::Value, shift: u32) -> B::Value {
        let amount = self.splat(fw, shift as u64);
        let a = self.fw_cast(a, fw);
        self.backend.binary(op, &a, &amount)
    }

    pub(crate) fn simd_srli(&mut self, fw: u32, a: &B::Value, shift: u32) -> B::Value {
        self.shift_fields(BinOp::LShr, fw, a, shift)
    }

    pub(crate) fn simd_srai(&mut self, fw: u32, a: &B::Value, shift: u32) -> B::Value {
        self.shift_fields(BinOp::AShr, fw, a, shift)
    }

    /// Field `index` of width `fw` as an `fw`-bit scalar.
    pub(crate) fn mvmd_extract(&mut self, fw: u32, a: &B::Value, index: u32) -> B::Value {
        let v = self.fw_cast(a, fw);
        self.backend.extract_element(&v, index)
    }

    /// Replace field `index` of width `fw`; returns an `fw`-typed vector.
    pub(crate) fn mvmd_insert(
        &mut self,
        fw: u32,
        a: &B::Value,
        element: &B::Value,
        index: u32,
    ) -> B::Value {
        let v = self.fw_cast(a, fw);
        self.backend.insert_element(&v, element, index)
    }

    /// Scalar binary operation on two same-width integers.
    pub(crate) fn scalar(&mut self, op: BinOp, a: &B::Value, b: &B::Value) -> B::Value {
        self.backend.binary(op, a, b)
    }
}
