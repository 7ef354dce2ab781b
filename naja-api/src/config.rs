//! API 层配置
//!
//! 包含全局默认 MarshalOptions 单例（供 CLI 使用）

use naja_config::MarshalOptions;
use once_cell::sync::OnceCell;

// Global options singleton for CLI convenience
static GLOBAL_OPTIONS: OnceCell<MarshalOptions> = OnceCell::new();

/// Initialize global options (must be called once before any operation)
///
/// # Panics
/// If options are already initialized
pub fn init(options: MarshalOptions) {
    GLOBAL_OPTIONS
        .set(options)
        .expect("Options already initialized");
}

/// Get global options
///
/// Falls back to the defaults when `init` was never called.
pub fn options() -> MarshalOptions {
    GLOBAL_OPTIONS.get().copied().unwrap_or_default()
}

/// Check if options are initialized
pub fn is_initialized() -> bool {
    GLOBAL_OPTIONS.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_fallback_to_default() {
        // 未初始化时返回默认值；全局状态下只验证可调用性
        let opts = options();
        assert!(opts.version <= naja_config::MAX_VERSION);
    }

    #[test]
    fn test_is_initialized_callable() {
        let _ = is_initialized();
    }
}
