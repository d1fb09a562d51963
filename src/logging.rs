/// Installs the platform logger. Safe to call more than once.
#[cfg(target_os = "android")]
pub fn init() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Debug)
            .with_tag("leafy"),
    );
}

/// Installs the platform logger. Safe to call more than once.
///
/// Defaults to `info`, `RUST_LOG` overrides.
#[cfg(not(target_os = "android"))]
pub fn init() {
    let env = env_logger::Env::default().default_filter_or("info");
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}
