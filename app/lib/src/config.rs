//! Configuration types for tier construction.
//!
//! This module provides the configuration structs that decide which tiers
//! may be selected, the block geometry a tier is built for, and the
//! capabilities of the code generation backend.

use crate::error::{IdisaError, Result};
use crate::tier::BlockWidth;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for building a tier.
///
/// Serializable so it can be loaded from a JSON file; missing fields take
/// their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Width of one bit block.
    ///
    /// Default: 256 bits
    pub block_width: BlockWidth,

    /// Number of bits processed per stride of the consuming engine.
    ///
    /// Must be a non-zero multiple of the block width.
    ///
    /// Default: 256 bits
    pub stride: u32,

    /// Machine word width used by the indexed advance.
    ///
    /// Default: 64 bits
    pub word_width: u32,

    /// Which specialized tiers may be selected.
    pub tiers: TierConfig,

    /// Capabilities of the code generation backend.
    pub backend: BackendCaps,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            block_width: BlockWidth::W256,
            stride: 256,
            word_width: 64,
            tiers: TierConfig::default(),
            backend: BackendCaps::default(),
        }
    }
}

impl BuilderConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block width.
    pub fn with_block_width(mut self, block_width: BlockWidth) -> Self {
        self.block_width = block_width;
        self
    }

    /// Set the stride.
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    /// Set the machine word width.
    pub fn with_word_width(mut self, word_width: u32) -> Self {
        self.word_width = word_width;
        self
    }

    /// Set the tier configuration.
    pub fn with_tiers(mut self, tiers: TierConfig) -> Self {
        self.tiers = tiers;
        self
    }

    /// Set the backend capabilities.
    pub fn with_backend_caps(mut self, backend: BackendCaps) -> Self {
        self.backend = backend;
        self
    }

    /// Check the stride against the block width.
    pub fn validate(&self) -> Result<()> {
        let width = self.block_width.bits();
        if self.stride == 0 || self.stride % width != 0 {
            return Err(IdisaError::Config(format!(
                "stride {} is not a non-zero multiple of the {}-bit block width",
                self.stride, width
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: BuilderConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// Tier enablement.
///
/// The most specialized tier that the hardware supports and that is
/// enabled here is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Enable the AVX tier.
    ///
    /// Default: true
    pub enable_avx: bool,

    /// Enable the AVX2 tier.
    ///
    /// Default: true
    pub enable_avx2: bool,

    /// Enable the AVX-512F tier.
    ///
    /// Default: true
    pub enable_avx512f: bool,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            enable_avx: true,
            enable_avx2: true,
            enable_avx512f: true,
        }
    }
}

impl TierConfig {
    /// Create a new tier configuration with all tiers enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration that only allows the baseline tier.
    pub fn disabled() -> Self {
        Self {
            enable_avx: false,
            enable_avx2: false,
            enable_avx512f: false,
        }
    }

    /// Enable or disable the AVX tier.
    pub fn with_avx(mut self, enable: bool) -> Self {
        self.enable_avx = enable;
        self
    }

    /// Enable or disable the AVX2 tier.
    pub fn with_avx2(mut self, enable: bool) -> Self {
        self.enable_avx2 = enable;
        self
    }

    /// Enable or disable the AVX-512F tier.
    pub fn with_avx512f(mut self, enable: bool) -> Self {
        self.enable_avx512f = enable;
        self
    }

    /// Check if any specialized tier is enabled.
    pub fn is_any_enabled(&self) -> bool {
        self.enable_avx || self.enable_avx2 || self.enable_avx512f
    }
}

/// Capabilities of the code generation backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendCaps {
    /// The backend lowers a direct 128-bit lane permute instruction.
    ///
    /// Gates the AVX2 merge overrides for 128-bit fields.
    ///
    /// Default: false
    pub native_lane_permute: bool,
}

impl BackendCaps {
    pub fn with_native_lane_permute(mut self, enable: bool) -> Self {
        self.native_lane_permute = enable;
        self
    }
}
