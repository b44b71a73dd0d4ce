//! Self-test of every tier against the plain-Rust models.
//!
//! Each `(tier, block width)` pair is built over the [`Evaluator`] and
//! driven with seeded Xoshiro256++ blocks plus the edge patterns
//! that matter for each primitive (all-ones chains, zero limbs, boundary
//! shift amounts). Pairs are independent and checked in parallel when the
//! `parallel` feature is enabled.

use crate::backend::Evaluator;
use crate::config::BackendCaps;
use crate::error::Result;
use crate::scalar;
use crate::tier::{BlockWidth, Carry, CpuFeatures, IdisaBuilder, Tier, TierKind};
use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Failures kept per check; further failures are only counted.
const MAX_REPORTED: usize = 4;

/// What to check.
#[derive(Debug, Clone)]
pub struct SelfTestOptions {
    /// Block widths to build every tier at.
    pub widths: Vec<BlockWidth>,
    /// Capability snapshot handed to every tier.
    pub features: CpuFeatures,
    pub backend_caps: BackendCaps,
    /// Random inputs per check, on top of the fixed edge patterns.
    pub rounds: usize,
    /// Worker threads; 0 uses the default pool.
    pub parallelism: usize,
    pub seed: u64,
}

impl Default for SelfTestOptions {
    fn default() -> Self {
        Self {
            widths: BlockWidth::ALL.to_vec(),
            features: CpuFeatures::all(),
            backend_caps: BackendCaps::default().with_native_lane_permute(true),
            rounds: 8,
            parallelism: 0,
            seed: 0x5eed_b10c,
        }
    }
}

/// Result of one primitive on one tier.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub tier: String,
    pub primitive: &'static str,
    pub cases: usize,
    pub failed: usize,
    /// Descriptions of the first failing cases.
    pub failures: Vec<String>,
}

impl CheckOutcome {
    fn new(tier: &str, primitive: &'static str) -> Self {
        Self {
            tier: tier.to_string(),
            primitive,
            cases: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, ok: bool, describe: impl FnOnce() -> String) {
        self.cases += 1;
        if !ok {
            self.failed += 1;
            if self.failures.len() < MAX_REPORTED {
                self.failures.push(describe());
            }
        }
    }

    pub fn passed(&self) -> bool {
        self.failed == 0
    }
}

/// All outcomes of a self-test run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SelfTestReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(CheckOutcome::passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    pub fn total_cases(&self) -> usize {
        self.outcomes.iter().map(|o| o.cases).sum()
    }
}

/// `n` random limbs.
fn random_limbs(rng: &mut Xoshiro256PlusPlus, n: usize) -> Vec<u64> {
    (0..n).map(|_| rng.gen()).collect()
}

/// Fixed patterns followed by `rounds` random blocks.
fn inputs(rng: &mut Xoshiro256PlusPlus, n: usize, rounds: usize) -> Vec<Vec<u64>> {
    let mut blocks = vec![
        vec![0; n],
        vec![u64::MAX; n],
        vec![0x8000_0000_0000_0000; n],
        vec![0x5555_5555_5555_5555; n],
        (0..n as u64).map(|i| i.wrapping_mul(0x0101_0101_0101_0101)).collect(),
    ];
    blocks.extend((0..rounds).map(|_| random_limbs(rng, n)));
    blocks
}

fn hex(limbs: &[u64]) -> String {
    limbs
        .iter()
        .map(|l| format!("{:016x}", l))
        .collect::<Vec<_>>()
        .join("_")
}

/// Run every check.
///
/// # Errors
///
/// Fails only if the worker pool cannot be created.
pub fn run(options: &SelfTestOptions) -> Result<SelfTestReport> {
    let pairs: Vec<(TierKind, BlockWidth)> = TierKind::ALL
        .iter()
        .flat_map(|kind| options.widths.iter().map(move |width| (*kind, *width)))
        .collect();
    info!("self-test over {} tier/width pairs", pairs.len());

    let outcomes = collect_outcomes(&pairs, options)?;
    let report = SelfTestReport { outcomes };
    for outcome in report.failed() {
        warn!(
            "{} {} failed {} of {} cases",
            outcome.tier, outcome.primitive, outcome.failed, outcome.cases
        );
    }
    info!(
        "self-test finished: {} cases, {}",
        report.total_cases(),
        if report.passed() { "all passed" } else { "failures" }
    );
    Ok(report)
}

#[cfg(feature = "parallel")]
fn collect_outcomes(
    pairs: &[(TierKind, BlockWidth)],
    options: &SelfTestOptions,
) -> Result<Vec<CheckOutcome>> {
    let check = || {
        pairs
            .par_iter()
            .flat_map_iter(|(kind, width)| check_tier(*kind, *width, options))
            .collect::<Vec<_>>()
    };
    if options.parallelism > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.parallelism)
            .build()
            .map_err(|e| crate::error::IdisaError::Config(format!("failed to create thread pool: {}", e)))?;
        Ok(pool.install(check))
    } else {
        Ok(check())
    }
}

#[cfg(not(feature = "parallel"))]
fn collect_outcomes(
    pairs: &[(TierKind, BlockWidth)],
    options: &SelfTestOptions,
) -> Result<Vec<CheckOutcome>> {
    Ok(pairs
        .iter()
        .flat_map(|(kind, width)| check_tier(*kind, *width, options))
        .collect())
}

struct Harness {
    builder: IdisaBuilder<Evaluator>,
    name: String,
    limbs: usize,
}

impl Harness {
    fn width(&self) -> u32 {
        self.limbs as u32 * 64
    }
}

fn check_tier(kind: TierKind, width: BlockWidth, options: &SelfTestOptions) -> Vec<CheckOutcome> {
    let tier = Tier::new(kind, width, width.bits(), options.features)
        .with_backend_caps(options.backend_caps);
    let mut h = Harness {
        name: tier.unique_name().to_string(),
        builder: IdisaBuilder::new(Evaluator::new(), tier),
        limbs: (width.bits() / 64) as usize,
    };
    debug!("checking {}", h.name);
    // Same data for every tier at a width.
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(options.seed ^ width.bits() as u64);
    let blocks = inputs(&mut rng, h.limbs, options.rounds);

    vec![
        check_signmask(&mut h, &blocks),
        check_packs(&mut h, &blocks),
        check_merges(&mut h, &blocks),
        check_lane_packs(&mut h, &blocks),
        check_bitspread(&mut h, &mut rng, options.rounds),
        check_popcount(&mut h, &blocks),
        check_add_with_carry(&mut h, &blocks),
        check_indexed_advance(&mut h, &blocks, &mut rng),
    ]
}

fn check_signmask(h: &mut Harness, blocks: &[Vec<u64>]) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(&h.name, "hsimd_signmask");
    for fw in [8, 16, 32, 64] {
        for a in blocks {
            let got = h.builder.hsimd_signmask(fw, &Evaluator::block(a)).limbs();
            let want = scalar::signmask(a, fw);
            outcome.record(got == want, || format!("fw={} a={}", fw, hex(a)));
        }
    }
    outcome
}

fn check_packs(h: &mut Harness, blocks: &[Vec<u64>]) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(&h.name, "hsimd_packh/packl");
    for fw in [8, 16, 32, 64] {
        for pair in blocks.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let (va, vb) = (Evaluator::block(a), Evaluator::block(b));
            let got = h.builder.hsimd_packh(fw, &va, &vb).limbs();
            outcome.record(got == scalar::pack(a, b, fw, true), || {
                format!("packh fw={} a={} b={}", fw, hex(a), hex(b))
            });
            let got = h.builder.hsimd_packl(fw, &va, &vb).limbs();
            outcome.record(got == scalar::pack(a, b, fw, false), || {
                format!("packl fw={} a={} b={}", fw, hex(a), hex(b))
            });
        }
    }
    outcome
}

fn check_merges(h: &mut Harness, blocks: &[Vec<u64>]) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(&h.name, "esimd_mergeh/mergel");
    let fws: Vec<u32> = [8, 16, 32, 64, 128]
        .into_iter()
        .filter(|fw| *fw < h.width())
        .collect();
    for fw in fws {
        for pair in blocks.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let (va, vb) = (Evaluator::block(a), Evaluator::block(b));
            let got = h.builder.esimd_mergeh(fw, &va, &vb).limbs();
            outcome.record(got == scalar::merge(a, b, fw, true), || {
                format!("mergeh fw={} a={} b={}", fw, hex(a), hex(b))
            });
            let got = h.builder.esimd_mergel(fw, &va, &vb).limbs();
            outcome.record(got == scalar::merge(a, b, fw, false), || {
                format!("mergel fw={} a={} b={}", fw, hex(a), hex(b))
            });
        }
    }
    outcome
}

fn check_lane_packs(h: &mut Harness, blocks: &[Vec<u64>]) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(&h.name, "hsimd_pack*_in_lanes");
    let lanes = h.width() / 128;
    let mut shapes = vec![(2, 16), (2, 32), (lanes, 16)];
    shapes.sort_unstable();
    shapes.dedup();
    for (lanes, fw) in shapes {
        for pair in blocks.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let (va, vb) = (Evaluator::block(a), Evaluator::block(b));
            let got = h.builder.hsimd_packh_in_lanes(lanes, fw, &va, &vb).limbs();
            outcome.record(got == scalar::pack_in_lanes(a, b, lanes, fw, true), || {
                format!("packh lanes={} fw={} a={} b={}", lanes, fw, hex(a), hex(b))
            });
            let got = h.builder.hsimd_packl_in_lanes(lanes, fw, &va, &vb).limbs();
            outcome.record(got == scalar::pack_in_lanes(a, b, lanes, fw, false), || {
                format!("packl lanes={} fw={} a={} b={}", lanes, fw, hex(a), hex(b))
            });
        }
    }
    outcome
}

fn check_bitspread(h: &mut Harness, rng: &mut Xoshiro256PlusPlus, rounds: usize) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(&h.name, "esimd_bitspread");
    for fw in [8, 16, 32, 64] {
        let count = h.width() / fw;
        let live = if count >= 64 { u64::MAX } else { (1u64 << count) - 1 };
        let mut masks = vec![0, live, 1, 1u64 << (count.min(64) - 1)];
        masks.extend((0..rounds).map(|_| rng.gen::<u64>() & live));
        for mask in masks {
            let value = Evaluator::scalar(64, mask);
            let got = h.builder.esimd_bitspread(fw, &value).limbs();
            let want = scalar::bitspread(mask, fw, h.limbs);
            outcome.record(got == want, || format!("fw={} mask={:#x}", fw, mask));
        }
    }
    outcome
}

fn check_popcount(h: &mut Harness, blocks: &[Vec<u64>]) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(&h.name, "simd_popcount");
    for fw in [8, 16, 32, 64] {
        for a in blocks {
            let got = h.builder.simd_popcount(fw, &Evaluator::block(a)).limbs();
            outcome.record(got == scalar::popcount(a, fw), || {
                format!("fw={} a={}", fw, hex(a))
            });
        }
    }
    outcome
}

fn check_add_with_carry(h: &mut Harness, blocks: &[Vec<u64>]) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(&h.name, "bitblock_add_with_carry");
    for pair in blocks.windows(2) {
        for (a, b) in [(&pair[0], &pair[1]), (&pair[0], &pair[0])] {
            for carry_in in [false, true] {
                let want = scalar::add_with_carry(a, b, carry_in);
                let (va, vb) = (Evaluator::block(a), Evaluator::block(b));

                let bit = Carry::Bit(Evaluator::scalar(32, carry_in as u64));
                let (carry, sum) = h.builder.bitblock_add_with_carry(&va, &vb, &bit);
                let got = (carry.value().to_u64() == 1, sum.limbs());
                outcome.record(got == want && !carry.is_block(), || {
                    format!("bit carry={} a={} b={}", carry_in, hex(a), hex(b))
                });

                let mut block = vec![0u64; h.limbs];
                block[0] = carry_in as u64;
                let block = Carry::Block(Evaluator::block(&block));
                let (carry, sum) = h.builder.bitblock_add_with_carry(&va, &vb, &block);
                let mut expected_carry = vec![0u64; h.limbs];
                expected_carry[0] = want.0 as u64;
                let ok = carry.is_block()
                    && carry.value().limbs() == expected_carry
                    && sum.limbs() == want.1;
                outcome.record(ok, || {
                    format!("block carry={} a={} b={}", carry_in, hex(a), hex(b))
                });
            }
        }
    }
    outcome
}

fn check_indexed_advance(
    h: &mut Harness,
    blocks: &[Vec<u64>],
    rng: &mut Xoshiro256PlusPlus,
) -> CheckOutcome {
    let mut outcome = CheckOutcome::new(&h.name, "bitblock_indexed_advance");
    let width = h.width();
    for shift in [0, 1, 7, 63, 64, 65, width, width + 1] {
        for pair in blocks.windows(2) {
            let (strm, index) = (&pair[0], &pair[1]);
            // Incoming bits at or above the shift are not part of the carry.
            let mut shift_in = random_limbs(rng, h.limbs);
            for (i, limb) in shift_in.iter_mut().enumerate() {
                let base = 64 * i as u32;
                if shift <= base {
                    *limb = 0;
                } else if shift < base + 64 {
                    *limb &= (1u64 << (shift - base)) - 1;
                }
            }
            let want = scalar::indexed_advance(strm, index, &shift_in, shift);
            let result = h.builder.bitblock_indexed_advance(
                &Evaluator::block(strm),
                &Evaluator::block(index),
                &Evaluator::block(&shift_in),
                shift,
            );
            let ok = match result {
                Ok((carry, out)) => (carry.limbs(), out.limbs()) == want,
                Err(_) => false,
            };
            outcome.record(ok, || {
                format!(
                    "shift={} strm={} index={} shift_in={}",
                    shift,
                    hex(strm),
                    hex(index),
                    hex(&shift_in)
                )
            });
        }
    }
    outcome
}
