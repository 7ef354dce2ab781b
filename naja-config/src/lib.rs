//! Naja Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all Naja crates.

use serde::{Deserialize, Serialize};

/// Newest format version whose wire behavior differs from its predecessor
pub const CURRENT_VERSION: u8 = 4;

/// Highest format version accepted by the codec
pub const MAX_VERSION: u8 = 5;

/// Lowest format version with back-reference support
pub const REF_VERSION: u8 = 3;

/// Lowest format version with compact tuple and ASCII string forms
pub const COMPACT_VERSION: u8 = 4;

/// Bytecode backend that produced (and can consume) a code unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeBackend {
    /// In-tree stack bytecode interpreter; code units carry structured tables
    Bytecode,
    /// IR engine with its own serializer; code units carry an opaque blob
    Ir,
}

impl CodeBackend {
    /// Get the string name of the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeBackend::Bytecode => "bytecode",
            CodeBackend::Ir => "ir",
        }
    }
}

impl std::fmt::Display for CodeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for CodeBackend {
    fn default() -> Self {
        CodeBackend::Bytecode
    }
}

/// Configuration for codec limits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Maximum marshal recursion depth (hostile-input defense, not a
    /// semantic limit on legitimate data)
    pub max_marshal_depth: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_marshal_depth: 200,
        }
    }
}

/// Configuration for one marshal encode or decode call
///
/// The version is out-of-band context: it is never written to the stream and
/// both sides of a transfer must supply the same value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarshalOptions {
    /// Format version (0..=MAX_VERSION)
    pub version: u8,
    /// Bytecode backend active in this process
    pub backend: CodeBackend,
    /// Codec limits
    #[serde(default)]
    pub limits: LimitConfig,
}

impl MarshalOptions {
    /// Options for a specific format version with the default backend
    pub fn with_version(version: u8) -> Self {
        Self {
            version,
            backend: CodeBackend::default(),
            limits: LimitConfig::default(),
        }
    }
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            backend: CodeBackend::default(),
            limits: LimitConfig::default(),
        }
    }
}
