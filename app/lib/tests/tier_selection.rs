//! Tier selection, naming, configuration and override resolution.

use bitblock_idisa::backend::Intrinsic;
use bitblock_idisa::{
    BackendCaps, BlockWidth, BuilderConfig, CpuFeatures, Evaluator, IdisaBuilder, IdisaError,
    Tier, TierConfig, TierKind,
};
use std::collections::HashSet;
use std::io::Write;
use tempfile::NamedTempFile;

fn builder(kind: TierKind, width: BlockWidth, features: CpuFeatures) -> IdisaBuilder<Evaluator> {
    IdisaBuilder::new(
        Evaluator::new(),
        Tier::new(kind, width, width.bits(), features),
    )
}

#[test]
fn test_unique_names() {
    let expected = [
        (TierKind::Base, BlockWidth::W128, "BASE"),
        (TierKind::Base, BlockWidth::W256, "BASE_256"),
        (TierKind::Avx, BlockWidth::W256, "AVX"),
        (TierKind::Avx, BlockWidth::W512, "AVX_512"),
        (TierKind::Avx2, BlockWidth::W256, "AVX2"),
        (TierKind::Avx2, BlockWidth::W128, "AVX2_128"),
        (TierKind::Avx512F, BlockWidth::W512, "AVX512F"),
        (TierKind::Avx512F, BlockWidth::W256, "AVX512F_256"),
    ];
    for (kind, width, name) in expected {
        let tier = Tier::new(kind, width, width.bits(), CpuFeatures::all());
        assert_eq!(tier.unique_name(), name);
    }
}

#[test]
fn test_unique_names_are_distinct_and_stable() {
    let mut seen = HashSet::new();
    for kind in TierKind::ALL {
        for width in BlockWidth::ALL {
            let first = Tier::new(kind, width, width.bits(), CpuFeatures::all());
            let second = Tier::new(kind, width, 2 * width.bits(), CpuFeatures::none());
            assert_eq!(first.unique_name(), second.unique_name());
            assert!(seen.insert(first.unique_name().to_string()));
        }
    }
    assert_eq!(seen.len(), 12);
}

#[test]
fn test_select_respects_config() {
    let features = CpuFeatures::all();
    assert_eq!(TierKind::select(&features, &TierConfig::new()), TierKind::Avx512F);
    assert_eq!(
        TierKind::select(&features, &TierConfig::new().with_avx512f(false)),
        TierKind::Avx2
    );
    assert_eq!(
        TierKind::select(&features, &TierConfig::new().with_avx512f(false).with_avx2(false)),
        TierKind::Avx
    );
    assert_eq!(TierKind::select(&features, &TierConfig::disabled()), TierKind::Base);
    assert_eq!(
        TierKind::select(&CpuFeatures::none(), &TierConfig::new()),
        TierKind::Base
    );
}

#[test]
fn test_config_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"block_width": 512, "stride": 1024, "word_width": 32,
            "tiers": {{"enable_avx512f": false}},
            "backend": {{"native_lane_permute": true}}}}"#
    )
    .unwrap();

    let config = BuilderConfig::from_file(file.path()).unwrap();
    assert_eq!(config.block_width, BlockWidth::W512);
    assert_eq!(config.stride, 1024);
    assert_eq!(config.word_width, 32);
    assert!(!config.tiers.enable_avx512f);
    assert!(config.tiers.enable_avx2);
    assert!(config.backend.native_lane_permute);

    let tier = Tier::from_config(TierKind::Avx2, &config, CpuFeatures::all());
    assert_eq!(tier.unique_name(), "AVX2_512");
    assert_eq!(tier.word_width(), 32);
}

#[test]
fn test_config_rejects_bad_values() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"block_width": 384}}"#).unwrap();
    assert!(matches!(
        BuilderConfig::from_file(file.path()),
        Err(IdisaError::Json(_))
    ));

    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"block_width": 256, "stride": 384}}"#).unwrap();
    assert!(matches!(
        BuilderConfig::from_file(file.path()),
        Err(IdisaError::Config(_))
    ));

    assert!(matches!(
        BuilderConfig::from_file("/nonexistent/bitblock.json"),
        Err(IdisaError::Io(_))
    ));
}

#[test]
fn test_avx512_signmask_skips_movemask() {
    // The AVX-512F tier answers sign masks itself with the generic lowering.
    let a = Evaluator::block(&[1 << 63, 0, 1 << 63, 0]);
    let mut avx = builder(TierKind::Avx, BlockWidth::W256, CpuFeatures::all());
    let mut avx512 = builder(TierKind::Avx512F, BlockWidth::W256, CpuFeatures::all());

    let via_avx = avx.hsimd_signmask(64, &a);
    let via_avx512 = avx512.hsimd_signmask(64, &a);
    assert_eq!(via_avx.to_u64(), 0b0101);
    assert_eq!(via_avx512.to_u64(), 0b0101);
    assert_eq!(avx.backend().calls_to(Intrinsic::MovmskPd256), 1);
    assert_eq!(avx512.backend().calls_to(Intrinsic::MovmskPd256), 0);
}

#[test]
fn test_avx2_signmask_uses_byte_movemask() {
    let mut avx2 = builder(TierKind::Avx2, BlockWidth::W256, CpuFeatures::all());
    let a = Evaluator::block(&[0x80, 0, 0, 1 << 63]);
    assert_eq!(avx2.hsimd_signmask(8, &a).to_u64(), 0x8000_0001);
    assert_eq!(avx2.backend().calls_to(Intrinsic::Pmovmskb256), 1);
}

#[test]
fn test_lane_merge_needs_backend_permute() {
    let a = Evaluator::block(&[1, 2, 3, 4]);
    let b = Evaluator::block(&[5, 6, 7, 8]);
    for (permute, calls) in [(true, 1), (false, 0)] {
        let tier = Tier::new(TierKind::Avx2, BlockWidth::W256, 256, CpuFeatures::all())
            .with_backend_caps(BackendCaps::default().with_native_lane_permute(permute));
        let mut builder = IdisaBuilder::new(Evaluator::new(), tier);
        assert_eq!(builder.esimd_mergeh(128, &a, &b).limbs(), vec![3, 4, 7, 8]);
        assert_eq!(builder.esimd_mergel(128, &a, &b).limbs(), vec![1, 2, 5, 6]);
        assert_eq!(builder.backend().calls_to(Intrinsic::Vperm2i128), 2 * calls);
    }
}

#[test]
fn test_avx512_popcount_gated_on_vpopcntdq() {
    let a = Evaluator::block(&[u64::MAX, 1, 3, 7, 0, 0, 0, 0xff]);
    let mut with = builder(TierKind::Avx512F, BlockWidth::W512, CpuFeatures::all());
    let mut without = builder(
        TierKind::Avx512F,
        BlockWidth::W512,
        CpuFeatures {
            avx512vpopcntdq: false,
            ..CpuFeatures::all()
        },
    );
    let want = vec![64, 1, 2, 3, 0, 0, 0, 8];
    assert_eq!(with.simd_popcount(64, &a).limbs(), want);
    assert_eq!(without.simd_popcount(64, &a).limbs(), want);
    assert_eq!(with.backend().calls_to(Intrinsic::Vpopcnt), 1);
    assert_eq!(without.backend().calls_to(Intrinsic::Vpopcnt), 0);
}

#[test]
fn test_indexed_advance_gated_on_bmi2() {
    let strm = Evaluator::block(&[0xdead_beef, 0, 0x1234, u64::MAX]);
    let index = Evaluator::block(&[0xffff_0000_ffff, u64::MAX, 0xf0, 0x8000_0000_0000_0001]);
    let shift_in = Evaluator::block(&[0x5, 0, 0, 0]);
    let mut with = builder(TierKind::Avx2, BlockWidth::W256, CpuFeatures::all());
    let mut without = builder(
        TierKind::Avx2,
        BlockWidth::W256,
        CpuFeatures {
            bmi2: false,
            ..CpuFeatures::all()
        },
    );
    let a = with.bitblock_indexed_advance(&strm, &index, &shift_in, 3).unwrap();
    let b = without.bitblock_indexed_advance(&strm, &index, &shift_in, 3).unwrap();
    assert_eq!(a, b);
    assert!(with.backend().calls_to(Intrinsic::Pext64) > 0);
    assert_eq!(without.backend().calls_to(Intrinsic::Pext64), 0);
}

#[test]
fn test_for_host_uses_config() {
    let config = BuilderConfig::new()
        .with_block_width(BlockWidth::W128)
        .with_tiers(TierConfig::disabled());
    let builder = IdisaBuilder::for_host(Evaluator::new(), &config);
    assert_eq!(builder.tier().kind(), TierKind::Base);
    assert_eq!(builder.unique_name(), "BASE");
}
