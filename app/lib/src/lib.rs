//! # Bit-block IDISA tiers
//!
//! Code generation for the innermost primitives of a bit-parallel text
//! processing engine: sign masks, half-width packs, element merges,
//! carry-propagating addition, indexed bit advance, bit broadcast and
//! population count.
//!
//! Each primitive is generated through a [`Backend`](backend::Backend), the
//! service that emits vector instructions. A [`Tier`](tier::Tier) fixes the
//! instruction-set level and block width; the
//! [`IdisaBuilder`](tier::IdisaBuilder) resolves every call to the most
//! specialized implementation that handles it.
//!
//! ## Quick Start
//!
//! ```rust
//! use bitblock_idisa::backend::Evaluator;
//! use bitblock_idisa::config::BuilderConfig;
//! use bitblock_idisa::tier::{BlockWidth, Carry, IdisaBuilder};
//!
//! let config = BuilderConfig::new().with_block_width(BlockWidth::W128);
//! let mut builder = IdisaBuilder::for_host(Evaluator::new(), &config);
//!
//! let e1 = Evaluator::block(&[u64::MAX, 1]);
//! let e2 = Evaluator::block(&[1, 2]);
//! let carry = Carry::Bit(Evaluator::scalar(32, 0));
//! let (carry_out, sum) = builder.bitblock_add_with_carry(&e1, &e2, &carry);
//! assert_eq!(sum.limbs(), vec![0, 4]);
//! assert_eq!(carry_out.value().to_u64(), 0);
//! ```
//!
//! ## Backends
//!
//! The crate ships [`Evaluator`](backend::Evaluator), a backend that
//! executes every request immediately on concrete values and records which
//! named instructions were used. Code generators implement
//! [`Backend`](backend::Backend) to emit real instructions instead.
//!
//! ## Self-test
//!
//! [`selftest::run`] checks every tier at every block width against the
//! plain-Rust models in [`scalar`], in parallel when the `parallel` feature is
//! enabled (the default).
//!
//! ```
//! use bitblock_idisa::selftest::{self, SelfTestOptions};
//! use bitblock_idisa::BlockWidth;
//!
//! let options = SelfTestOptions {
//!     widths: vec![BlockWidth::W128],
//!     rounds: 1,
//!     ..SelfTestOptions::default()
//! };
//! let report = selftest::run(&options).unwrap();
//! assert!(report.passed());
//! ```
//!
//! ## Thread Safety
//!
//! Tiers are immutable after construction. Builders hold their backend
//! mutably, so concurrent compilation uses one builder per thread.

pub mod backend;
pub mod config;
pub mod error;
pub mod scalar;
pub mod selftest;
pub mod tier;

pub use backend::{Backend, Evaluator};
pub use config::{BackendCaps, BuilderConfig, TierConfig};
pub use error::{IdisaError, Result};
pub use tier::{BlockWidth, Carry, CpuFeatures, IdisaBuilder, Tier, TierKind};
