//! Tiered bit-block primitives.
//!
//! Four tiers model the instruction-set levels, each a strict superset of
//! the one below:
//!
//! - **BASE**: generic implementations, canonical at 128 bits
//! - **AVX**: movemask sign masks, canonical at 256 bits
//! - **AVX2**: packs, merges, lane packs, carry-save addition and the BMI2
//!   indexed advance, canonical at 256 bits
//! - **AVX512F**: truncating packs, masked bit broadcast and population
//!   count, canonical at 512 bits
//!
//! A primitive call walks the tier's chain from the most specialized level
//! down; each level either handles the `(block width, field width)` case
//! completely or passes, and the generic baseline closes every chain.
//!
//! # Example
//!
//! ```rust
//! use bitblock_idisa::backend::Evaluator;
//! use bitblock_idisa::tier::{BlockWidth, CpuFeatures, IdisaBuilder, Tier, TierKind};
//!
//! let tier = Tier::new(TierKind::Avx2, BlockWidth::W256, 256, CpuFeatures::none());
//! let mut builder = IdisaBuilder::new(Evaluator::new(), tier);
//! let a = Evaluator::block(&[1 << 63, 0, 1 << 63, 0]);
//! let mask = builder.hsimd_signmask(64, &a);
//! assert_eq!(mask.to_u64(), 0b0101);
//! ```

mod advance;
mod avx;
mod avx2;
mod avx512;
mod baseline;
mod carry;
mod dispatcher;
mod features;
mod ops;

pub use dispatcher::{BlockWidth, Carry, IdisaBuilder, Tier, TierKind};
pub use features::CpuFeatures;
