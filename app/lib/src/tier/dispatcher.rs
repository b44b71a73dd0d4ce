//! Tier hierarchy and primitive dispatch.
//!
//! A [`Tier`] fixes the instruction-set level, the block geometry, and the
//! capability snapshot. An [`IdisaBuilder`] pairs a tier with a backend and
//! exposes the primitive catalog. Every primitive walks the tier's chain
//! from the most specialized level down; the first level whose handler
//! accepts the `(block width, field width)` case produces the value, and the
//! generic baseline closes every chain.

use super::{advance, avx, avx2, avx512, baseline, features::CpuFeatures};
use crate::backend::Backend;
use crate::config::{BackendCaps, BuilderConfig, TierConfig};
use crate::error::{IdisaError, Result};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a bit block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BlockWidth {
    W128,
    W256,
    W512,
}

impl BlockWidth {
    pub const ALL: [Self; 3] = [Self::W128, Self::W256, Self::W512];

    pub const fn bits(self) -> u32 {
        match self {
            BlockWidth::W128 => 128,
            BlockWidth::W256 => 256,
            BlockWidth::W512 => 512,
        }
    }

    /// Number of `fw`-bit fields in a block.
    ///
    /// Fails unless `fw` is a power of two no wider than the block.
    pub fn field_count(self, fw: u32) -> Result<u32> {
        if fw.is_power_of_two() && fw <= self.bits() {
            Ok(self.bits() / fw)
        } else {
            Err(IdisaError::UnsupportedFieldWidth {
                fw,
                block_width: self.bits(),
            })
        }
    }
}

impl TryFrom<u32> for BlockWidth {
    type Error = IdisaError;

    fn try_from(bits: u32) -> Result<Self> {
        match bits {
            128 => Ok(BlockWidth::W128),
            256 => Ok(BlockWidth::W256),
            512 => Ok(BlockWidth::W512),
            other => Err(IdisaError::UnsupportedBlockWidth(other)),
        }
    }
}

impl From<BlockWidth> for u32 {
    fn from(width: BlockWidth) -> u32 {
        width.bits()
    }
}

impl fmt::Display for BlockWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Instruction-set level of a tier.
///
/// Ordered from least to most specialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TierKind {
    /// Generic baseline; no overrides.
    Base,
    /// AVX: movemask sign masks.
    Avx,
    /// AVX2: packs, lane packs, merges, carry-save addition, indexed advance.
    Avx2,
    /// AVX-512F: truncating packs, masked bit broadcast, population count.
    Avx512F,
}

impl TierKind {
    pub const ALL: [Self; 4] = [Self::Base, Self::Avx, Self::Avx2, Self::Avx512F];

    /// Tag used in unique names.
    pub const fn tag(self) -> &'static str {
        match self {
            TierKind::Base => "BASE",
            TierKind::Avx => "AVX",
            TierKind::Avx2 => "AVX2",
            TierKind::Avx512F => "AVX512F",
        }
    }

    /// The block width the tier's instructions are native to.
    pub const fn canonical_width(self) -> BlockWidth {
        match self {
            TierKind::Base => BlockWidth::W128,
            TierKind::Avx | TierKind::Avx2 => BlockWidth::W256,
            TierKind::Avx512F => BlockWidth::W512,
        }
    }

    /// The next less specialized tier.
    pub const fn parent(self) -> Option<TierKind> {
        match self {
            TierKind::Base => None,
            TierKind::Avx => Some(TierKind::Base),
            TierKind::Avx2 => Some(TierKind::Avx),
            TierKind::Avx512F => Some(TierKind::Avx2),
        }
    }

    /// Specialized levels tried for a primitive, most specialized first.
    /// The baseline is implicit after the last entry.
    pub const fn chain(self) -> &'static [TierKind] {
        match self {
            TierKind::Base => &[],
            TierKind::Avx => &[TierKind::Avx],
            TierKind::Avx2 => &[TierKind::Avx2, TierKind::Avx],
            TierKind::Avx512F => &[TierKind::Avx512F, TierKind::Avx2, TierKind::Avx],
        }
    }

    /// Cache key for code generated by this tier at `width`.
    ///
    /// The bare tag at the canonical width, `<TAG>_<width>` otherwise.
    pub fn unique_name(self, width: BlockWidth) -> String {
        if width == self.canonical_width() {
            self.tag().to_string()
        } else {
            format!("{}_{}", self.tag(), width.bits())
        }
    }

    /// Select the most specialized tier the features support and the
    /// configuration allows.
    pub fn select(features: &CpuFeatures, config: &TierConfig) -> Self {
        // Priority: AVX-512F > AVX2 > AVX > baseline
        if features.avx512f && config.enable_avx512f {
            TierKind::Avx512F
        } else if features.avx2 && config.enable_avx2 {
            TierKind::Avx2
        } else if features.avx && config.enable_avx {
            TierKind::Avx
        } else {
            TierKind::Base
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A tier built for one block geometry.
///
/// Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    kind: TierKind,
    block_width: BlockWidth,
    stride: u32,
    word_width: u32,
    features: CpuFeatures,
    backend_caps: BackendCaps,
    name: String,
}

impl Tier {
    /// Build a tier. Construction never fails, whatever the width.
    pub fn new(kind: TierKind, block_width: BlockWidth, stride: u32, features: CpuFeatures) -> Self {
        let tier = Self {
            kind,
            block_width,
            stride,
            word_width: 64,
            features,
            backend_caps: BackendCaps::default(),
            name: kind.unique_name(block_width),
        };
        debug!(
            "constructed tier {} (stride {}, chain {:?}, features {:?})",
            tier.name,
            stride,
            kind.chain(),
            features.names()
        );
        tier
    }

    /// Build a tier from a configuration.
    pub fn from_config(kind: TierKind, config: &BuilderConfig, features: CpuFeatures) -> Self {
        Self::new(kind, config.block_width, config.stride, features)
            .with_word_width(config.word_width)
            .with_backend_caps(config.backend)
    }

    /// Set the machine word width used by the indexed advance.
    pub fn with_word_width(mut self, word_width: u32) -> Self {
        self.word_width = word_width;
        self
    }

    pub fn with_backend_caps(mut self, backend_caps: BackendCaps) -> Self {
        self.backend_caps = backend_caps;
        self
    }

    pub fn kind(&self) -> TierKind {
        self.kind
    }

    pub fn block_width(&self) -> BlockWidth {
        self.block_width
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn word_width(&self) -> u32 {
        self.word_width
    }

    pub fn features(&self) -> &CpuFeatures {
        &self.features
    }

    pub fn backend_caps(&self) -> BackendCaps {
        self.backend_caps
    }

    /// Unique name, see [`TierKind::unique_name`].
    pub fn unique_name(&self) -> &str {
        &self.name
    }

    /// The parent tier at the same geometry.
    pub fn parent(&self) -> Option<Tier> {
        self.kind.parent().map(|kind| Tier {
            kind,
            name: kind.unique_name(self.block_width),
            ..self.clone()
        })
    }
}

/// Carry of a wide addition, in the representation the caller chose.
///
/// Outputs always use the same representation as the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Carry<V> {
    /// A 32-bit integer holding the carry in bit 0.
    Bit(V),
    /// A bit block whose limb 0 holds the carry in bit 0.
    Block(V),
}

impl<V> Carry<V> {
    pub fn value(&self) -> &V {
        match self {
            Carry::Bit(v) | Carry::Block(v) => v,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            Carry::Bit(v) | Carry::Block(v) => v,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Carry::Block(_))
    }
}

/// Primitive catalog over a backend at one tier.
#[derive(Debug)]
pub struct IdisaBuilder<B: Backend> {
    pub(crate) backend: B,
    tier: Tier,
}

impl<B: Backend> IdisaBuilder<B> {
    pub fn new(backend: B, tier: Tier) -> Self {
        Self { backend, tier }
    }

    /// Detect host features once, select a tier, and build it.
    pub fn for_host(backend: B, config: &BuilderConfig) -> Self {
        let features = CpuFeatures::detect();
        let kind = TierKind::select(&features, &config.tiers);
        Self::new(backend, Tier::from_config(kind, config, features))
    }

    pub fn tier(&self) -> &Tier {
        &self.tier
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn unique_name(&self) -> &str {
        self.tier.unique_name()
    }

    /// Block width in bits.
    pub fn block_width(&self) -> u32 {
        self.tier.block_width.bits()
    }

    pub(crate) fn features(&self) -> &CpuFeatures {
        &self.tier.features
    }

    fn chain(&self) -> &'static [TierKind] {
        self.tier.kind.chain()
    }

    fn check_field_width(&self, fw: u32) {
        if let Err(e) = self.tier.block_width.field_count(fw) {
            panic!("{}", e);
        }
    }

    /// Sign bit of every field, packed into a scalar integer.
    pub fn hsimd_signmask(&mut self, fw: u32, a: &B::Value) -> B::Value {
        self.check_field_width(fw);
        for &level in self.chain() {
            let handled = match level {
                TierKind::Avx512F => avx512::hsimd_signmask(self, fw, a),
                TierKind::Avx2 => avx2::hsimd_signmask(self, fw, a),
                TierKind::Avx => avx::hsimd_signmask(self, fw, a),
                TierKind::Base => None,
            };
            if let Some(mask) = handled {
                trace!("hsimd_signmask fw={} handled by {}", fw, level);
                return mask;
            }
        }
        baseline::hsimd_signmask(self, fw, a)
    }

    /// High halves of every field of `a` then of `b`.
    pub fn hsimd_packh(&mut self, fw: u32, a: &B::Value, b: &B::Value) -> B::Value {
        self.check_field_width(fw);
        for &level in self.chain() {
            let handled = match level {
                TierKind::Avx512F => avx512::hsimd_packh(self, fw, a, b),
                TierKind::Avx2 => avx2::hsimd_packh(self, fw, a, b),
                TierKind::Avx | TierKind::Base => None,
            };
            if let Some(packed) = handled {
                trace!("hsimd_packh fw={} handled by {}", fw, level);
                return packed;
            }
        }
        baseline::hsimd_packh(self, fw, a, b)
    }

    /// Low halves of every field of `a` then of `b`.
    pub fn hsimd_packl(&mut self, fw: u32, a: &B::Value, b: &B::Value) -> B::Value {
        self.check_field_width(fw);
        for &level in self.chain() {
            let handled = match level {
                TierKind::Avx512F => avx512::hsimd_packl(self, fw, a, b),
                TierKind::Avx2 => avx2::hsimd_packl(self, fw, a, b),
                TierKind::Avx | TierKind::Base => None,
            };
            if let Some(packed) = handled {
                trace!("hsimd_packl fw={} handled by {}", fw, level);
                return packed;
            }
        }
        baseline::hsimd_packl(self, fw, a, b)
    }

    /// Interleave the fields of the high halves of `a` and `b`.
    pub fn esimd_mergeh(&mut self, fw: u32, a: &B::Value, b: &B::Value) -> B::Value {
        self.check_field_width(fw);
        for &level in self.chain() {
            let handled = match level {
                TierKind::Avx2 => avx2::esimd_mergeh(self, fw, a, b),
                TierKind::Avx512F | TierKind::Avx | TierKind::Base => None,
            };
            if let Some(merged) = handled {
                trace!("esimd_mergeh fw={} handled by {}", fw, level);
                return merged;
            }
        }
        baseline::esimd_mergeh(self, fw, a, b)
    }

    /// Interleave the fields of the low halves of `a` and `b`.
    pub fn esimd_mergel(&mut self, fw: u32, a: &B::Value, b: &B::Value) -> B::Value {
        self.check_field_width(fw);
        for &level in self.chain() {
            let handled = match level {
                TierKind::Avx2 => avx2::esimd_mergel(self, fw, a, b),
                TierKind::Avx512F | TierKind::Avx | TierKind::Base => None,
            };
            if let Some(merged) = handled {
                trace!("esimd_mergel fw={} handled by {}", fw, level);
                return merged;
            }
        }
        baseline::esimd_mergel(self, fw, a, b)
    }

    /// [`hsimd_packh`](Self::hsimd_packh) applied independently within each
    /// of `lanes` equal lanes.
    pub fn hsimd_packh_in_lanes(
        &mut self,
        lanes: u32,
        fw: u32,
        a: &B::Value,
        b: &B::Value,
    ) -> B::Value {
        self.check_field_width(fw);
        for &level in self.chain() {
            let handled = match level {
                TierKind::Avx2 => avx2::hsimd_packh_in_lanes(self, lanes, fw, a, b),
                TierKind::Avx512F | TierKind::Avx | TierKind::Base => None,
            };
            if let Some(packed) = handled {
                trace!("hsimd_packh_in_lanes lanes={} fw={} handled by {}", lanes, fw, level);
                return packed;
            }
        }
        baseline::hsimd_packh_in_lanes(self, lanes, fw, a, b)
    }

    /// [`hsimd_packl`](Self::hsimd_packl) applied independently within each
    /// of `lanes` equal lanes.
    pub fn hsimd_packl_in_lanes(
        &mut self,
        lanes: u32,
        fw: u32,
        a: &B::Value,
        b: &B::Value,
    ) -> B::Value {
        self.check_field_width(fw);
        for &level in self.chain() {
            let handled = match level {
                TierKind::Avx2 => avx2::hsimd_packl_in_lanes(self, lanes, fw, a, b),
                TierKind::Avx512F | TierKind::Avx | TierKind::Base => None,
            };
            if let Some(packed) = handled {
                trace!("hsimd_packl_in_lanes lanes={} fw={} handled by {}", lanes, fw, level);
                return packed;
            }
        }
        baseline::hsimd_packl_in_lanes(self, lanes, fw, a, b)
    }

    /// Add `e1` and `e2` as one unsigned integer of 64-bit limbs.
    ///
    /// Returns `(carry_out, sum)`; `carry_out` uses the representation of
    /// `carry_in`.
    pub fn bitblock_add_with_carry(
        &mut self,
        e1: &B::Value,
        e2: &B::Value,
        carry_in: &Carry<B::Value>,
    ) -> (Carry<B::Value>, B::Value) {
        for &level in self.chain() {
            let handled = match level {
                TierKind::Avx2 => avx2::bitblock_add_with_carry(self, e1, e2, carry_in),
                TierKind::Avx512F | TierKind::Avx | TierKind::Base => None,
            };
            if let Some(result) = handled {
                trace!("bitblock_add_with_carry handled by {}", level);
                return result;
            }
        }
        baseline::bitblock_add_with_carry(self, e1, e2, carry_in)
    }

    /// Advance the bits of `strm` selected by `index_strm` by `shift_amount`
    /// positions within the selected subsequence, shifting in `shift_in`.
    ///
    /// Returns `(carry_out, result)`.
    ///
    /// # Errors
    ///
    /// [`IdisaError::UnsupportedWordWidth`] when the tier's word width is
    /// neither 32 nor 64, or is 32 with `shift_amount >= 32`.
    pub fn bitblock_indexed_advance(
        &mut self,
        strm: &B::Value,
        index_strm: &B::Value,
        shift_in: &B::Value,
        shift_amount: u32,
    ) -> Result<(B::Value, B::Value)> {
        advance::check_word_width(self.tier.word_width, shift_amount)?;
        for &level in self.chain() {
            let handled = match level {
                TierKind::Avx2 => {
                    avx2::bitblock_indexed_advance(self, strm, index_strm, shift_in, shift_amount)
                }
                TierKind::Avx512F | TierKind::Avx | TierKind::Base => None,
            };
            if let Some(result) = handled {
                trace!("bitblock_indexed_advance shift={} handled by {}", shift_amount, level);
                return Ok(result);
            }
        }
        Ok(baseline::bitblock_indexed_advance(
            self,
            strm,
            index_strm,
            shift_in,
            shift_amount,
        ))
    }

    /// Field `i` all-ones iff bit `i` of `bitmask` is set.
    pub fn esimd_bitspread(&mut self, fw: u32, bitmask: &B::Value) -> B::Value {
        self.check_field_width(fw);
        for &level in self.chain() {
            let handled = match level {
                TierKind::Avx512F => avx512::esimd_bitspread(self, fw, bitmask),
                TierKind::Avx2 | TierKind::Avx | TierKind::Base => None,
            };
            if let Some(spread) = handled {
                trace!("esimd_bitspread fw={} handled by {}", fw, level);
                return spread;
            }
        }
        baseline::esimd_bitspread(self, fw, bitmask)
    }

    /// Number of set bits in every field.
    pub fn simd_popcount(&mut self, fw: u32, a: &B::Value) -> B::Value {
        self.check_field_width(fw);
        for &level in self.chain() {
            let handled = match level {
                TierKind::Avx512F => avx512::simd_popcount(self, fw, a),
                TierKind::Avx2 | TierKind::Avx | TierKind::Base => None,
            };
            if let Some(counts) = handled {
                trace!("simd_popcount fw={} handled by {}", fw, level);
                return counts;
            }
        }
        baseline::simd_popcount(self, fw, a)
    }
}
