//! Reference backend that executes every request immediately.
//!
//! Values are concrete bit strings tagged with their type. Named
//! instructions are executed with the semantics of the corresponding x86
//! instruction, and every call is appended to a trace so callers can see
//! which instructions a primitive actually used.

use super::{Backend, BinOp, Bits, CmpPred, Intrinsic, ScalarKind, ValueType};
use log::trace;

/// A typed, concrete value produced by the [`Evaluator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalValue {
    ty: ValueType,
    bits: Bits,
}

impl EvalValue {
    /// # Panics
    ///
    /// Panics if the width of `bits` does not match `ty`.
    pub fn new(ty: ValueType, bits: Bits) -> Self {
        assert_eq!(
            ty.bit_width(),
            bits.width(),
            "value of type {} built from {} bits",
            ty,
            bits.width()
        );
        Self { ty, bits }
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }

    pub fn bits(&self) -> &Bits {
        &self.bits
    }

    /// Element `index`, or the whole value for scalars.
    pub fn lane(&self, index: u32) -> Bits {
        let width = self.ty.element().bits();
        self.bits.field(index * width, width)
    }

    /// The low 64 bits.
    pub fn to_u64(&self) -> u64 {
        self.bits.low_u64()
    }

    /// The value as little-endian 64-bit limbs.
    pub fn limbs(&self) -> Vec<u64> {
        self.bits.words().to_vec()
    }
}

/// In-process [`Backend`] over [`EvalValue`]s.
#[derive(Debug, Default)]
pub struct Evaluator {
    trace: Vec<Intrinsic>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bit block of `64 * limbs.len()` bits, typed `<n x i64>`.
    pub fn block(limbs: &[u64]) -> EvalValue {
        let width = 64 * limbs.len() as u32;
        EvalValue::new(
            ValueType::int_vector(64, limbs.len() as u32),
            Bits::from_words(width, limbs),
        )
    }

    /// An integer scalar.
    pub fn scalar(width: u32, value: u64) -> EvalValue {
        EvalValue::new(ValueType::int(width), Bits::from_u64(width, value))
    }

    /// Instructions invoked so far, in call order.
    pub fn trace(&self) -> &[Intrinsic] {
        &self.trace
    }

    /// Number of times `intrinsic` has been invoked.
    pub fn calls_to(&self, intrinsic: Intrinsic) -> usize {
        self.trace.iter().filter(|i| **i == intrinsic).count()
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }
}

fn check_args(intrinsic: Intrinsic, args: &[EvalValue], arity: usize) {
    assert_eq!(
        args.len(),
        arity,
        "{} expects {} operands, got {}",
        intrinsic,
        arity,
        args.len()
    );
}

fn check_width(intrinsic: Intrinsic, arg: &EvalValue, width: u32) {
    assert_eq!(
        arg.ty.bit_width(),
        width,
        "{} operand of type {} is not {} bits wide",
        intrinsic,
        arg.ty,
        width
    );
}

fn sign_mask(value: &EvalValue, lane_width: u32) -> EvalValue {
    let count = value.bits.width() / lane_width;
    let mut out = Bits::zero(32);
    for i in 0..count {
        if value.bits.bit(i * lane_width + lane_width - 1) {
            out.set_bit(i, true);
        }
    }
    EvalValue::new(ValueType::int(32), out)
}

fn vperm2i128(a: &EvalValue, b: &EvalValue, imm: u8) -> EvalValue {
    let halves = [
        a.bits.field(0, 128),
        a.bits.field(128, 128),
        b.bits.field(0, 128),
        b.bits.field(128, 128),
    ];
    let mut out = Bits::zero(256);
    for half in 0..2u32 {
        let sel = (imm >> (4 * half)) & 0x0f;
        if sel & 0x08 == 0 {
            out.set_field(half * 128, &halves[(sel & 0x03) as usize]);
        }
    }
    EvalValue::new(ValueType::int_vector(64, 4), out)
}

fn saturate_u8(word: &Bits) -> u64 {
    let signed = word.low_u64() as u16 as i16;
    signed.clamp(0, 255) as u64
}

fn packuswb(a: &EvalValue, b: &EvalValue) -> EvalValue {
    let mut out = Bits::zero(256);
    for lane in 0..2u32 {
        for (half, src) in [a, b].into_iter().enumerate() {
            for i in 0..8u32 {
                let word = src.bits.field((lane * 8 + i) * 16, 16);
                let byte = Bits::from_u64(8, saturate_u8(&word));
                out.set_field((lane * 16 + half as u32 * 8 + i) * 8, &byte);
            }
        }
    }
    EvalValue::new(ValueType::int_vector(8, 32), out)
}

fn masked_narrow(
    a: &EvalValue,
    passthru: &EvalValue,
    mask: &EvalValue,
    from: u32,
    to: u32,
) -> EvalValue {
    let count = a.bits.width() / from;
    let mut out = Bits::zero(count * to);
    for i in 0..count {
        let lane = if mask.bits.bit(i) {
            a.bits.field(i * from, from).resize(to)
        } else {
            passthru.bits.field(i * to, to)
        };
        out.set_field(i * to, &lane);
    }
    EvalValue::new(ValueType::int_vector(to, count), out)
}

fn mask_broadcast(a: &EvalValue, src: &EvalValue, mask: &EvalValue) -> EvalValue {
    let mut out = Bits::zero(512);
    for i in 0..8u32 {
        let lane = if mask.bits.bit(i) {
            a.bits.field((i % 4) * 64, 64)
        } else {
            src.bits.field(i * 64, 64)
        };
        out.set_field(i * 64, &lane);
    }
    EvalValue::new(ValueType::int_vector(64, 8), out)
}

fn pext(src: &Bits, mask: &Bits) -> Bits {
    let mut out = Bits::zero(src.width());
    let mut k = 0;
    for i in 0..src.width() {
        if mask.bit(i) {
            if src.bit(i) {
                out.set_bit(k, true);
            }
            k += 1;
        }
    }
    out
}

fn pdep(src: &Bits, mask: &Bits) -> Bits {
    let mut out = Bits::zero(src.width());
    let mut k = 0;
    for i in 0..src.width() {
        if mask.bit(i) {
            if src.bit(k) {
                out.set_bit(i, true);
            }
            k += 1;
        }
    }
    out
}

fn map_lanes(value: &EvalValue, f: impl Fn(&Bits) -> Bits) -> EvalValue {
    let width = value.ty.element().bits();
    let mut out = Bits::zero(value.ty.bit_width());
    for i in 0..value.ty.lanes() {
        out.set_field(i * width, &f(&value.lane(i)));
    }
    EvalValue::new(value.ty, out)
}

fn zip_lanes(a: &EvalValue, b: &EvalValue, f: impl Fn(&Bits, &Bits) -> Bits) -> EvalValue {
    assert_eq!(
        (a.ty.lanes(), a.ty.bit_width()),
        (b.ty.lanes(), b.ty.bit_width()),
        "operand types differ: {} vs {}",
        a.ty,
        b.ty
    );
    let width = a.ty.element().bits();
    let mut out = Bits::zero(a.ty.bit_width());
    for i in 0..a.ty.lanes() {
        out.set_field(i * width, &f(&a.lane(i), &b.lane(i)));
    }
    EvalValue::new(a.ty, out)
}

fn popcount(bits: &Bits) -> Bits {
    Bits::from_u64(bits.width(), bits.count_ones() as u64)
}

impl Backend for Evaluator {
    type Value = EvalValue;
    type Function = Intrinsic;

    fn declare(&mut self, intrinsic: Intrinsic) -> Intrinsic {
        intrinsic
    }

    fn call(&mut self, callee: &Intrinsic, args: &[EvalValue]) -> EvalValue {
        trace!("call {} with {} operands", callee, args.len());
        self.trace.push(*callee);
        let intrinsic = *callee;
        match intrinsic {
            Intrinsic::MovmskPd256 | Intrinsic::MovmskPs256 | Intrinsic::Pmovmskb256 => {
                check_args(intrinsic, args, 1);
                check_width(intrinsic, &args[0], 256);
                let lane_width = match intrinsic {
                    Intrinsic::MovmskPd256 => 64,
                    Intrinsic::MovmskPs256 => 32,
                    _ => 8,
                };
                sign_mask(&args[0], lane_width)
            }
            Intrinsic::Vperm2i128 => {
                check_args(intrinsic, args, 3);
                check_width(intrinsic, &args[0], 256);
                check_width(intrinsic, &args[1], 256);
                vperm2i128(&args[0], &args[1], args[2].to_u64() as u8)
            }
            Intrinsic::Packuswb256 => {
                check_args(intrinsic, args, 2);
                check_width(intrinsic, &args[0], 256);
                check_width(intrinsic, &args[1], 256);
                packuswb(&args[0], &args[1])
            }
            Intrinsic::PmovWb512 | Intrinsic::PmovDw512 | Intrinsic::PmovQd512 => {
                check_args(intrinsic, args, 3);
                check_width(intrinsic, &args[0], 512);
                check_width(intrinsic, &args[1], 256);
                let from = match intrinsic {
                    Intrinsic::PmovWb512 => 16,
                    Intrinsic::PmovDw512 => 32,
                    _ => 64,
                };
                masked_narrow(&args[0], &args[1], &args[2], from, from / 2)
            }
            Intrinsic::MaskBroadcastI64x4_512 => {
                check_args(intrinsic, args, 3);
                check_width(intrinsic, &args[0], 256);
                check_width(intrinsic, &args[1], 512);
                mask_broadcast(&args[0], &args[1], &args[2])
            }
            Intrinsic::Pext32 | Intrinsic::Pext64 | Intrinsic::Pdep32 | Intrinsic::Pdep64 => {
                check_args(intrinsic, args, 2);
                let width = match intrinsic {
                    Intrinsic::Pext32 | Intrinsic::Pdep32 => 32,
                    _ => 64,
                };
                check_width(intrinsic, &args[0], width);
                check_width(intrinsic, &args[1], width);
                let bits = match intrinsic {
                    Intrinsic::Pext32 | Intrinsic::Pext64 => pext(&args[0].bits, &args[1].bits),
                    _ => pdep(&args[0].bits, &args[1].bits),
                };
                EvalValue::new(ValueType::int(width), bits)
            }
            Intrinsic::Ctpop => {
                check_args(intrinsic, args, 1);
                map_lanes(&args[0], popcount)
            }
            Intrinsic::Vpopcnt => {
                check_args(intrinsic, args, 1);
                let elem = args[0].ty.element().bits();
                assert!(
                    args[0].ty.is_vector() && (elem == 32 || elem == 64),
                    "{} needs a vector of 32- or 64-bit elements, got {}",
                    intrinsic,
                    args[0].ty
                );
                map_lanes(&args[0], popcount)
            }
        }
    }

    fn type_of(&self, value: &EvalValue) -> ValueType {
        value.ty
    }

    fn bitcast(&mut self, value: &EvalValue, ty: ValueType) -> EvalValue {
        EvalValue::new(ty, value.bits.clone())
    }

    fn shuffle(&mut self, a: &EvalValue, b: Option<&EvalValue>, indices: &[u32]) -> EvalValue {
        let elem = a.ty.element();
        let width = elem.bits();
        let count = a.ty.lanes();
        if let Some(b) = b {
            assert_eq!(a.ty, b.ty, "shuffle operand types differ");
        }
        let mut out = Bits::zero(width * indices.len() as u32);
        for (k, &index) in indices.iter().enumerate() {
            assert!(index < 2 * count, "shuffle index {} out of range", index);
            let lane = if index < count {
                a.lane(index)
            } else {
                match b {
                    Some(b) => b.lane(index - count),
                    None => Bits::zero(width),
                }
            };
            out.set_field(k as u32 * width, &lane);
        }
        EvalValue::new(ValueType::vector(elem, indices.len() as u32), out)
    }

    fn extract_element(&mut self, vector: &EvalValue, index: u32) -> EvalValue {
        assert!(index < vector.ty.lanes(), "lane {} out of range", index);
        EvalValue::new(ValueType::Scalar(vector.ty.element()), vector.lane(index))
    }

    fn insert_element(&mut self, vector: &EvalValue, element: &EvalValue, index: u32) -> EvalValue {
        let width = vector.ty.element().bits();
        assert!(index < vector.ty.lanes(), "lane {} out of range", index);
        assert_eq!(element.bits.width(), width, "inserted element width mismatch");
        let mut bits = vector.bits.clone();
        bits.set_field(index * width, &element.bits);
        EvalValue::new(vector.ty, bits)
    }

    fn const_int(&mut self, width: u32, value: u64) -> EvalValue {
        Evaluator::scalar(width, value)
    }

    fn const_vector(&mut self, elem: ScalarKind, lanes: &[u64]) -> EvalValue {
        let width = elem.bits();
        let mut bits = Bits::zero(width * lanes.len() as u32);
        for (i, lane) in lanes.iter().enumerate() {
            bits.set_field(i as u32 * width, &Bits::from_u64(width, *lane));
        }
        EvalValue::new(ValueType::vector(elem, lanes.len() as u32), bits)
    }

    fn undef(&mut self, ty: ValueType) -> EvalValue {
        EvalValue::new(ty, Bits::zero(ty.bit_width()))
    }

    fn binary(&mut self, op: BinOp, a: &EvalValue, b: &EvalValue) -> EvalValue {
        zip_lanes(a, b, |x, y| match op {
            BinOp::And => x.and(y),
            BinOp::Or => x.or(y),
            BinOp::Xor => x.xor(y),
            BinOp::Add => x.add(y),
            BinOp::Sub => x.sub(y),
            BinOp::Mul => x.mul(y),
            BinOp::Shl => x.shl(y.as_amount()),
            BinOp::LShr => x.lshr(y.as_amount()),
            BinOp::AShr => x.ashr(y.as_amount()),
        })
    }

    fn not(&mut self, a: &EvalValue) -> EvalValue {
        EvalValue::new(a.ty, a.bits.not())
    }

    fn compare(&mut self, pred: CmpPred, a: &EvalValue, b: &EvalValue) -> EvalValue {
        let holds = |x: &Bits, y: &Bits| match pred {
            CmpPred::Eq => x == y,
            CmpPred::Ult => x.ult(y),
            CmpPred::Slt => x.slt(y),
        };
        if a.ty.is_vector() {
            zip_lanes(a, b, |x, y| {
                if holds(x, y) {
                    Bits::ones(x.width())
                } else {
                    Bits::zero(x.width())
                }
            })
        } else {
            assert_eq!(a.ty.bit_width(), b.ty.bit_width(), "compare operand widths differ");
            Evaluator::scalar(1, holds(&a.bits, &b.bits) as u64)
        }
    }

    fn select(&mut self, cond: &EvalValue, if_true: &EvalValue, if_false: &EvalValue) -> EvalValue {
        assert_eq!(if_true.ty, if_false.ty, "select arm types differ");
        if cond.bits.bit(0) {
            if_true.clone()
        } else {
            if_false.clone()
        }
    }

    fn zext_or_trunc(&mut self, value: &EvalValue, width: u32) -> EvalValue {
        assert!(!value.ty.is_vector(), "zext_or_trunc needs a scalar, got {}", value.ty);
        EvalValue::new(ValueType::int(width), value.bits.resize(width))
    }
}
