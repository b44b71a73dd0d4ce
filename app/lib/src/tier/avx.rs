//! AVX overrides: sign masks through the floating-point movemask
//! instructions.

use super::dispatcher::IdisaBuilder;
use crate::backend::{Backend, Intrinsic, ScalarKind, ValueType};

pub(crate) fn hsimd_signmask<B: Backend>(
    b: &mut IdisaBuilder<B>,
    fw: u32,
    a: &B::Value,
) -> Option<B::Value> {
    match (b.block_width(), fw) {
        (256, 64) => {
            let movmsk = b.backend.declare(Intrinsic::MovmskPd256);
            let pd = b.backend.bitcast(a, ValueType::vector(ScalarKind::Double, 4));
            Some(b.backend.call(&movmsk, &[pd]))
        }
        (256, 32) => {
            let movmsk = b.backend.declare(Intrinsic::MovmskPs256);
            let ps = b.backend.bitcast(a, ValueType::vector(ScalarKind::Float, 8));
            Some(b.backend.call(&movmsk, &[ps]))
        }
        (512, 64) => {
            // The odd floats carry the 64-bit sign bits; gather them into
            // one 256-bit register.
            let movmsk = b.backend.declare(Intrinsic::MovmskPs256);
            let ps = b.backend.bitcast(a, ValueType::vector(ScalarKind::Float, 16));
            let odd: Vec<u32> = (0..8).map(|i| 2 * i + 1).collect();
            let packed = b.backend.shuffle(&ps, None, &odd);
            Some(b.backend.call(&movmsk, &[packed]))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Evaluator;
    use crate::tier::{BlockWidth, CpuFeatures, Tier, TierKind};

    fn builder(width: BlockWidth) -> IdisaBuilder<Evaluator> {
        let tier = Tier::new(TierKind::Avx, width, width.bits(), CpuFeatures::none());
        IdisaBuilder::new(Evaluator::new(), tier)
    }

    #[test]
    fn test_movmsk_pd() {
        let mut b = builder(BlockWidth::W256);
        let a = Evaluator::block(&[1 << 63, 0, 1 << 63, 1]);
        let mask = b.hsimd_signmask(64, &a);
        assert_eq!(mask.to_u64(), 0b0101);
        assert_eq!(b.backend().trace(), &[Intrinsic::MovmskPd256]);
    }

    #[test]
    fn test_movmsk_ps() {
        let mut b = builder(BlockWidth::W256);
        let a = Evaluator::block(&[0x8000_0000_0000_0000, 0x0000_0000_8000_0000, 0, u64::MAX]);
        let mask = b.hsimd_signmask(32, &a);
        assert_eq!(mask.to_u64(), 0b1100_0110);
        assert_eq!(b.backend().calls_to(Intrinsic::MovmskPs256), 1);
    }

    #[test]
    fn test_movmsk_512_odd_floats() {
        let mut b = builder(BlockWidth::W512);
        let a = Evaluator::block(&[1 << 63, 0x8000_0000, 0, 0, 0, 0, 0, u64::MAX]);
        let mask = b.hsimd_signmask(64, &a);
        assert_eq!(mask.to_u64(), 0b1000_0001);
        assert_eq!(b.unique_name(), "AVX_512");
    }

    #[test]
    fn test_other_widths_delegate() {
        let mut b = builder(BlockWidth::W128);
        let a = Evaluator::block(&[1 << 63, 0]);
        assert_eq!(b.hsimd_signmask(64, &a).to_u64(), 1);
        assert!(b.backend().trace().is_empty());
        let mut b = builder(BlockWidth::W256);
        assert!(hsimd_signmask(&mut b, 8, &Evaluator::block(&[0; 4])).is_none());
    }
}
