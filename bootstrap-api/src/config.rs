use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(nested = true)]
    pub service: lifecycle::Config,

    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: bool,

    #[envconfig(from = "GREETING", default = "Hello")]
    pub greeting: String,

    /// Simulated warmup run inside `up`, to watch readiness flip.
    #[envconfig(from = "WARMUP_MS", default = "0")]
    pub warmup_ms: u64,
}

impl Config {
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
}
