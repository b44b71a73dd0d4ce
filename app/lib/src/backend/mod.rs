//! Code generation backend surface.
//!
//! The tier dispatcher never emits machine code itself. Every value it
//! produces comes from a [`Backend`]: named hardware instructions, structural
//! vector operations (bitcast, shuffle, lane extract/insert), constants, and
//! elementwise arithmetic. A backend may lower these requests to real IR or
//! execute them directly; [`Evaluator`] does the latter and is what the test
//! suite and the CLI self-check run against.

mod bits;
mod eval;

pub use bits::Bits;
pub use eval::{EvalValue, Evaluator};

use std::fmt;

/// Element or scalar kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// Integer of the given bit width.
    Int(u32),
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
}

impl ScalarKind {
    pub const fn bits(self) -> u32 {
        match self {
            ScalarKind::Int(width) => width,
            ScalarKind::Float => 32,
            ScalarKind::Double => 64,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Int(width) => write!(f, "i{}", width),
            ScalarKind::Float => write!(f, "float"),
            ScalarKind::Double => write!(f, "double"),
        }
    }
}

/// Type of a backend value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Scalar(ScalarKind),
    Vector { elem: ScalarKind, count: u32 },
}

impl ValueType {
    /// Integer scalar of `width` bits.
    pub const fn int(width: u32) -> Self {
        ValueType::Scalar(ScalarKind::Int(width))
    }

    /// Vector of `count` integers of `width` bits.
    pub const fn int_vector(width: u32, count: u32) -> Self {
        ValueType::Vector {
            elem: ScalarKind::Int(width),
            count,
        }
    }

    pub const fn vector(elem: ScalarKind, count: u32) -> Self {
        ValueType::Vector { elem, count }
    }

    /// Total width in bits.
    pub const fn bit_width(self) -> u32 {
        match self {
            ValueType::Scalar(kind) => kind.bits(),
            ValueType::Vector { elem, count } => elem.bits() * count,
        }
    }

    /// Element kind (the scalar kind itself for scalars).
    pub const fn element(self) -> ScalarKind {
        match self {
            ValueType::Scalar(kind) => kind,
            ValueType::Vector { elem, .. } => elem,
        }
    }

    /// Number of elements; 1 for scalars.
    pub const fn lanes(self) -> u32 {
        match self {
            ValueType::Scalar(_) => 1,
            ValueType::Vector { count, .. } => count,
        }
    }

    pub const fn is_vector(self) -> bool {
        matches!(self, ValueType::Vector { .. })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Scalar(kind) => write!(f, "{}", kind),
            ValueType::Vector { elem, count } => write!(f, "<{} x {}>", count, elem),
        }
    }
}

/// Named hardware instructions the tiers may reference.
///
/// `Ctpop` is the backend's generic population count and is what the
/// baseline uses; every other entry is a target-specific instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// `<4 x double>` sign bits to `i32`.
    MovmskPd256,
    /// `<8 x float>` sign bits to `i32`.
    MovmskPs256,
    /// `<32 x i8>` sign bits to `i32`.
    Pmovmskb256,
    /// 128-bit lane permute of two `<4 x i64>` under an `i8` immediate.
    Vperm2i128,
    /// Per-lane unsigned-saturating pack of two `<16 x i16>` into `<32 x i8>`.
    Packuswb256,
    /// Masked truncate `<32 x i16>` to `<32 x i8>`.
    PmovWb512,
    /// Masked truncate `<16 x i32>` to `<16 x i16>`.
    PmovDw512,
    /// Masked truncate `<8 x i64>` to `<8 x i32>`.
    PmovQd512,
    /// Masked broadcast of `<4 x i64>` into `<8 x i64>` over a merge source.
    MaskBroadcastI64x4_512,
    Pext32,
    Pext64,
    Pdep32,
    Pdep64,
    /// Generic population count, scalar or per element.
    Ctpop,
    /// Hardware per-element population count of 32- or 64-bit elements.
    Vpopcnt,
}

impl Intrinsic {
    /// Backend symbol of the instruction.
    pub const fn symbol(self) -> &'static str {
        match self {
            Intrinsic::MovmskPd256 => "llvm.x86.avx.movmsk.pd.256",
            Intrinsic::MovmskPs256 => "llvm.x86.avx.movmsk.ps.256",
            Intrinsic::Pmovmskb256 => "llvm.x86.avx2.pmovmskb",
            Intrinsic::Vperm2i128 => "llvm.x86.avx2.vperm2i128",
            Intrinsic::Packuswb256 => "llvm.x86.avx2.packuswb",
            Intrinsic::PmovWb512 => "llvm.x86.avx512.mask.pmov.wb.512",
            Intrinsic::PmovDw512 => "llvm.x86.avx512.mask.pmov.dw.512",
            Intrinsic::PmovQd512 => "llvm.x86.avx512.mask.pmov.qd.512",
            Intrinsic::MaskBroadcastI64x4_512 => "llvm.x86.avx512.mask.broadcasti64x4.512",
            Intrinsic::Pext32 => "llvm.x86.bmi.pext.32",
            Intrinsic::Pext64 => "llvm.x86.bmi.pext.64",
            Intrinsic::Pdep32 => "llvm.x86.bmi.pdep.32",
            Intrinsic::Pdep64 => "llvm.x86.bmi.pdep.64",
            Intrinsic::Ctpop => "llvm.ctpop",
            Intrinsic::Vpopcnt => "llvm.x86.avx512.vpopcnt",
        }
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Elementwise binary operators. Both operands share one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Shl,
    LShr,
    AShr,
}

/// Comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpPred {
    Eq,
    /// Unsigned less-than.
    Ult,
    /// Signed less-than.
    Slt,
}

/// The code generation service the tiers call into.
///
/// Vector comparisons yield a vector of the operand type whose lanes are
/// all-ones or all-zero; scalar comparisons yield an `i1`. Shift amounts at or
/// beyond the element width yield zero (or the sign fill for `AShr`).
pub trait Backend {
    /// Opaque result of any request.
    type Value: Clone + fmt::Debug;
    /// Callable handle for a named instruction.
    type Function: Clone + fmt::Debug;

    /// Reference a named instruction for the current target.
    fn declare(&mut self, intrinsic: Intrinsic) -> Self::Function;

    /// Invoke a declared instruction with ordered operands.
    fn call(&mut self, callee: &Self::Function, args: &[Self::Value]) -> Self::Value;

    fn type_of(&self, value: &Self::Value) -> ValueType;

    /// Reinterpret `value` as `ty`; total widths must match.
    fn bitcast(&mut self, value: &Self::Value, ty: ValueType) -> Self::Value;

    /// Select elements of `a` (indices below its lane count) and `b` (the
    /// rest). A missing `b` is undefined.
    fn shuffle(&mut self, a: &Self::Value, b: Option<&Self::Value>, indices: &[u32])
        -> Self::Value;

    fn extract_element(&mut self, vector: &Self::Value, index: u32) -> Self::Value;

    fn insert_element(
        &mut self,
        vector: &Self::Value,
        element: &Self::Value,
        index: u32,
    ) -> Self::Value;

    /// Integer scalar constant.
    fn const_int(&mut self, width: u32, value: u64) -> Self::Value;

    /// Vector constant; each lane is given by its raw bits.
    fn const_vector(&mut self, elem: ScalarKind, lanes: &[u64]) -> Self::Value;

    fn undef(&mut self, ty: ValueType) -> Self::Value;

    fn binary(&mut self, op: BinOp, a: &Self::Value, b: &Self::Value) -> Self::Value;

    fn not(&mut self, a: &Self::Value) -> Self::Value;

    fn compare(&mut self, pred: CmpPred, a: &Self::Value, b: &Self::Value) -> Self::Value;

    /// Scalar select on an `i1` condition.
    fn select(
        &mut self,
        cond: &Self::Value,
        if_true: &Self::Value,
        if_false: &Self::Value,
    ) -> Self::Value;

    /// Zero-extend or truncate an integer scalar to `width` bits.
    fn zext_or_trunc(&mut self, value: &Self::Value, width: u32) -> Self::Value;
}
