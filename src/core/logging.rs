//! Logging initialization

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable, e.g. `RUST_LOG=volidx=debug`
/// to see per-phase build timings.
///
/// # Example
/// ```
/// volidx::core::logging::init();
/// log::info!("Building acceleration structures");
/// ```
pub fn init() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();
}
