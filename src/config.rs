use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    #[clap(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: String,

    /// cache ttl (default 7 days)
    #[clap(long, env = "CACHE_TTL_SECONDS", default_value_t = 604_800)]
    pub cache_ttl_seconds: u64,

    /// interval for the background purge of expired cache entries
    #[clap(long, env = "CACHE_SWEEP_SECONDS", default_value_t = 3600)]
    pub cache_sweep_seconds: u64,

    /// deadline for a single upstream fetch attempt
    #[clap(long, env = "FETCH_TIMEOUT_SECONDS", default_value_t = 30)]
    pub fetch_timeout_seconds: u64,
}

impl Config {
    pub fn load() -> Self {
        Config::parse()
    }
}
