/// Environment-driven tuning read once at startup (§9A.3, §6 "Environment
/// variables consumed"), in the same hand-rolled parse-and-validate
/// spirit as the teacher's own small parsers rather than a
/// config-framework crate for four variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// `APP_CHUNK_SIZE`, bytes per DATA container chunk.
    pub chunk_size: u64,
    /// `APP_PARALLEL`, bounded to `1..=16`.
    pub parallel: u8,
    /// `APP_IO_TIMEOUT_MS`.
    pub io_timeout_ms: u64,
    /// `APP_CONNECT_TIMEOUT_MS`.
    pub connect_timeout_ms: u64,
    /// `APP_VERBOSE`, `0` or `1`.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: 4 * 1024 * 1024,
            parallel: 4,
            io_timeout_ms: 15_000,
            connect_timeout_ms: 10_000,
            verbose: false,
        }
    }
}

impl Config {
    /// Read tuning from the process environment, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_env_reader(|key| std::env::var(key).ok())
    }

    /// Testable variant of [`Config::from_env`] taking a lookup
    /// function instead of the real environment.
    pub fn from_env_reader(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            chunk_size: get("APP_CHUNK_SIZE")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.chunk_size),
            parallel: get("APP_PARALLEL")
                .and_then(|v| v.parse::<u8>().ok())
                .map(|v| v.clamp(1, 16))
                .unwrap_or(defaults.parallel),
            io_timeout_ms: get("APP_IO_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.io_timeout_ms),
            connect_timeout_ms: get("APP_CONNECT_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.connect_timeout_ms),
            verbose: get("APP_VERBOSE").as_deref() == Some("1"),
        }
    }
}
