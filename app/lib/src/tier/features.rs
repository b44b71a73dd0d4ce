//! Capability snapshot of the executing hardware.
//!
//! A [`CpuFeatures`] is computed once and handed to tier construction; it is
//! never refreshed and never cached behind a global.

use serde::{Deserialize, Serialize};

/// Detected CPU features relevant to the tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CpuFeatures {
    pub avx: bool,
    pub avx2: bool,
    /// Parallel bit extract/deposit.
    pub bmi2: bool,
    pub avx512f: bool,
    pub avx512cd: bool,
    /// Byte/word instructions; gates the 16-bit truncating pack.
    pub avx512bw: bool,
    /// Doubleword/quadword instructions; gates the 32/64-bit truncating packs.
    pub avx512dq: bool,
    pub avx512vl: bool,
    pub avx512vbmi: bool,
    pub avx512vbmi2: bool,
    /// Per-element population count of 32/64-bit elements.
    pub avx512vpopcntdq: bool,
}

impl CpuFeatures {
    /// Feature names, in the order [`from_lookup`](Self::from_lookup) queries them.
    pub const NAMES: [&'static str; 11] = [
        "avx",
        "avx2",
        "bmi2",
        "avx512f",
        "avx512cd",
        "avx512bw",
        "avx512dq",
        "avx512vl",
        "avx512vbmi",
        "avx512vbmi2",
        "avx512vpopcntdq",
    ];

    /// Build a snapshot from a feature-name lookup. Each name is queried
    /// exactly once.
    pub fn from_lookup(mut lookup: impl FnMut(&str) -> bool) -> Self {
        let mut features = Self::none();
        for name in Self::NAMES {
            let present = lookup(name);
            *features.flag_mut(name) = present;
        }
        features
    }

    /// Detect CPU features at runtime.
    #[cfg(target_arch = "x86_64")]
    pub fn detect() -> Self {
        Self {
            avx: std::arch::is_x86_feature_detected!("avx"),
            avx2: std::arch::is_x86_feature_detected!("avx2"),
            bmi2: std::arch::is_x86_feature_detected!("bmi2"),
            avx512f: std::arch::is_x86_feature_detected!("avx512f"),
            avx512cd: std::arch::is_x86_feature_detected!("avx512cd"),
            avx512bw: std::arch::is_x86_feature_detected!("avx512bw"),
            avx512dq: std::arch::is_x86_feature_detected!("avx512dq"),
            avx512vl: std::arch::is_x86_feature_detected!("avx512vl"),
            avx512vbmi: std::arch::is_x86_feature_detected!("avx512vbmi"),
            avx512vbmi2: std::arch::is_x86_feature_detected!("avx512vbmi2"),
            avx512vpopcntdq: std::arch::is_x86_feature_detected!("avx512vpopcntdq"),
        }
    }

    /// Detect CPU features at runtime (fallback for other architectures).
    #[cfg(not(target_arch = "x86_64"))]
    pub fn detect() -> Self {
        Self::none()
    }

    /// A snapshot with no features present.
    pub fn none() -> Self {
        Self::default()
    }

    /// A snapshot with every feature present.
    pub fn all() -> Self {
        Self::from_lookup(|_| true)
    }

    /// Look up a flag by name.
    pub fn has(&self, name: &str) -> bool {
        match name {
            "avx" => self.avx,
            "avx2" => self.avx2,
            "bmi2" => self.bmi2,
            "avx512f" => self.avx512f,
            "avx512cd" => self.avx512cd,
            "avx512bw" => self.avx512bw,
            "avx512dq" => self.avx512dq,
            "avx512vl" => self.avx512vl,
            "avx512vbmi" => self.avx512vbmi,
            "avx512vbmi2" => self.avx512vbmi2,
            "avx512vpopcntdq" => self.avx512vpopcntdq,
            _ => false,
        }
    }

    /// Names of the features present.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES.into_iter().filter(|name| self.has(name)).collect()
    }

    fn flag_mut(&mut self, name: &str) -> &mut bool {
        match name {
            "avx" => &mut self.avx,
            "avx2" => &mut self.avx2,
            "bmi2" => &mut self.bmi2,
            "avx512f" => &mut self.avx512f,
            "avx512cd" => &mut self.avx512cd,
            "avx512bw" => &mut self.avx512bw,
            "avx512dq" => &mut self.avx512dq,
            "avx512vl" => &mut self.avx512vl,
            "avx512vbmi" => &mut self.avx512vbmi,
            "avx512vbmi2" => &mut self.avx512vbmi2,
            _ => &mut self.avx512vpopcntdq,
        }
    }
}
