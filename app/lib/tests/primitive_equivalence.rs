//! Property-based tests for tier equivalence.
//!
//! Every tier, at every block width and with and without its optional
//! features, must produce exactly what the plain-Rust models in
//! `bitblock_idisa::scalar` produce.

use bitblock_idisa::{
    scalar, BackendCaps, BlockWidth, Carry, CpuFeatures, Evaluator, IdisaBuilder, Tier, TierKind,
};
use proptest::prelude::*;

/// Every tier configuration worth distinguishing at one width.
fn builders(width: BlockWidth) -> Vec<IdisaBuilder<Evaluator>> {
    let mut out = Vec::new();
    for kind in TierKind::ALL {
        for features in [CpuFeatures::all(), CpuFeatures::none()] {
            for permute in [true, false] {
                let caps = BackendCaps::default().with_native_lane_permute(permute);
                let tier = Tier::new(kind, width, width.bits(), features).with_backend_caps(caps);
                out.push(IdisaBuilder::new(Evaluator::new(), tier));
            }
        }
    }
    out
}

fn width_strategy() -> impl Strategy<Value = BlockWidth> {
    prop::sample::select(BlockWidth::ALL.to_vec())
}

fn field_width() -> impl Strategy<Value = u32> {
    prop::sample::select(vec![8u32, 16, 32, 64])
}

/// Block contents biased toward runs of zeros and ones.
fn block(width: BlockWidth) -> impl Strategy<Value = Vec<u64>> {
    let limb = prop_oneof![
        4 => any::<u64>(),
        1 => Just(0u64),
        1 => Just(u64::MAX),
        1 => Just(0x8000_0000_0000_0000u64),
    ];
    prop::collection::vec(limb, (width.bits() / 64) as usize)
}

fn two_blocks() -> impl Strategy<Value = (BlockWidth, Vec<u64>, Vec<u64>)> {
    width_strategy().prop_flat_map(|width| (Just(width), block(width), block(width)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn signmask_matches_model((width, a, _) in two_blocks(), fw in field_width()) {
        let want = scalar::signmask(&a, fw);
        for mut builder in builders(width) {
            let got = builder.hsimd_signmask(fw, &Evaluator::block(&a));
            prop_assert_eq!(&got.limbs(), &want, "{}", builder.unique_name());
        }
    }

    #[test]
    fn packs_match_model((width, a, b) in two_blocks(), fw in field_width()) {
        let (va, vb) = (Evaluator::block(&a), Evaluator::block(&b));
        for mut builder in builders(width) {
            let high = builder.hsimd_packh(fw, &va, &vb);
            prop_assert_eq!(high.limbs(), scalar::pack(&a, &b, fw, true), "{}", builder.unique_name());
            let low = builder.hsimd_packl(fw, &va, &vb);
            prop_assert_eq!(low.limbs(), scalar::pack(&a, &b, fw, false), "{}", builder.unique_name());
        }
    }

    #[test]
    fn merges_match_model(
        (width, a, b) in two_blocks(),
        fw in prop::sample::select(vec![8u32, 16, 32, 64, 128]),
    ) {
        prop_assume!(fw < width.bits());
        let (va, vb) = (Evaluator::block(&a), Evaluator::block(&b));
        for mut builder in builders(width) {
            let high = builder.esimd_mergeh(fw, &va, &vb);
            prop_assert_eq!(high.limbs(), scalar::merge(&a, &b, fw, true), "{}", builder.unique_name());
            let low = builder.esimd_mergel(fw, &va, &vb);
            prop_assert_eq!(low.limbs(), scalar::merge(&a, &b, fw, false), "{}", builder.unique_name());
        }
    }

    #[test]
    fn lane_packs_match_model(
        (width, a, b) in two_blocks(),
        lanes in prop::sample::select(vec![1u32, 2, 4]),
        fw in prop::sample::select(vec![16u32, 32, 64]),
    ) {
        // Lanes of at least one limb, holding at least one field.
        prop_assume!(width.bits() / lanes >= fw.max(64));
        let (va, vb) = (Evaluator::block(&a), Evaluator::block(&b));
        for mut builder in builders(width) {
            let high = builder.hsimd_packh_in_lanes(lanes, fw, &va, &vb);
            prop_assert_eq!(
                high.limbs(),
                scalar::pack_in_lanes(&a, &b, lanes, fw, true),
                "{}", builder.unique_name()
            );
            let low = builder.hsimd_packl_in_lanes(lanes, fw, &va, &vb);
            prop_assert_eq!(
                low.limbs(),
                scalar::pack_in_lanes(&a, &b, lanes, fw, false),
                "{}", builder.unique_name()
            );
        }
    }

    #[test]
    fn popcount_matches_model((width, a, _) in two_blocks(), fw in field_width()) {
        let want = scalar::popcount(&a, fw);
        for mut builder in builders(width) {
            let got = builder.simd_popcount(fw, &Evaluator::block(&a));
            prop_assert_eq!(&got.limbs(), &want, "{}", builder.unique_name());
        }
    }

    #[test]
    fn popcount_total_is_preserved((width, a, _) in two_blocks(), fw in field_width()) {
        let total: u32 = a.iter().map(|limb| limb.count_ones()).sum();
        let count = width.bits() / fw;
        for mut builder in builders(width) {
            let counts = builder.simd_popcount(fw, &Evaluator::block(&a)).limbs();
            let sum: u64 = (0..count).map(|i| scalar::field(&counts, fw, i)).sum();
            prop_assert_eq!(sum, total as u64);
        }
    }

    #[test]
    fn bitspread_matches_model(
        width in width_strategy(),
        fw in field_width(),
        mask in any::<u64>(),
    ) {
        let count = width.bits() / fw;
        let mask = if count >= 64 { mask } else { mask & ((1u64 << count) - 1) };
        let want = scalar::bitspread(mask, fw, (width.bits() / 64) as usize);
        for mut builder in builders(width) {
            let got = builder.esimd_bitspread(fw, &Evaluator::scalar(64, mask));
            prop_assert_eq!(&got.limbs(), &want, "{}", builder.unique_name());
        }
    }

    #[test]
    fn signmask_inverts_bitspread(width in width_strategy(), fw in field_width(), mask in any::<u64>()) {
        let count = width.bits() / fw;
        let mask = if count >= 64 { mask } else { mask & ((1u64 << count) - 1) };
        for mut builder in builders(width) {
            let spread = builder.esimd_bitspread(fw, &Evaluator::scalar(64, mask));
            let back = builder.hsimd_signmask(fw, &spread);
            prop_assert_eq!(back.limbs()[0], mask, "{}", builder.unique_name());
        }
    }

    #[test]
    fn add_with_carry_matches_schoolbook((width, a, b) in two_blocks(), carry_in in any::<bool>()) {
        let (want_carry, want_sum) = scalar::add_with_carry(&a, &b, carry_in);
        let (va, vb) = (Evaluator::block(&a), Evaluator::block(&b));
        for mut builder in builders(width) {
            let bit = Carry::Bit(Evaluator::scalar(32, carry_in as u64));
            let (carry, sum) = builder.bitblock_add_with_carry(&va, &vb, &bit);
            prop_assert!(!carry.is_block());
            prop_assert_eq!(carry.value().to_u64(), want_carry as u64, "{}", builder.unique_name());
            prop_assert_eq!(&sum.limbs(), &want_sum, "{}", builder.unique_name());
        }
    }

    #[test]
    fn indexed_advance_matches_model(
        (width, strm, index) in two_blocks(),
        shift_in in any::<u64>(),
        shift in 0u32..=513,
    ) {
        let limbs = (width.bits() / 64) as usize;
        let mut incoming = vec![0u64; limbs];
        incoming[0] = if shift >= 64 { shift_in } else { shift_in & ((1u64 << shift) - 1) };
        let want = scalar::indexed_advance(&strm, &index, &incoming, shift);
        for mut builder in builders(width) {
            let (carry, out) = builder
                .bitblock_indexed_advance(
                    &Evaluator::block(&strm),
                    &Evaluator::block(&index),
                    &Evaluator::block(&incoming),
                    shift,
                )
                .unwrap();
            prop_assert_eq!((carry.limbs(), out.limbs()), want.clone(), "{}", builder.unique_name());
        }
    }
}
