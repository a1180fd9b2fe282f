use std::env;

/// Framework settings, loaded from the environment.
///
/// Every knob has a default so `Settings::from_env()` never fails; unparsable
/// values fall back to the default.
///
/// | Variable                   | Default          |
/// |----------------------------|------------------|
/// | `PARAMETRA_DEBUG`          | `false`          |
/// | `PARAMETRA_MAX_BODY_SIZE`  | `1048576` (1MiB) |
/// | `PARAMETRA_WORKER_THREADS` | logical CPUs     |
#[derive(Debug, Clone)]
pub struct Settings {
    pub debug: bool,
    pub max_body_size: usize,
    pub worker_threads: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            max_body_size: 1024 * 1024,
            worker_threads: num_cpus::get(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            debug: env_parse("PARAMETRA_DEBUG").unwrap_or(defaults.debug),
            max_body_size: env_parse("PARAMETRA_MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            worker_threads: env_parse("PARAMETRA_WORKER_THREADS")
                .unwrap_or(defaults.worker_threads),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.parse().ok())
}
