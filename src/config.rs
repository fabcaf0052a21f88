#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the proxy will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // redis connection string; the registry keeps one JSON document per
    // channel under channel:{id}
    #[clap(long, env)]
    pub redis_url: Option<String>,

    // JSON array of channels loaded once at startup, takes precedence over
    // redis when both are set. Handy for single-box deployments and tests.
    #[clap(long, env)]
    pub channels_file: Option<String>,

    // origin stamped into rewritten playlist URLs, like
    // https://proxy.example.com when running behind a load balancer.
    // Derived from the request headers when unset.
    #[clap(long, env)]
    pub public_origin: Option<String>,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl Default for AppConfig {
    // defaults aren't really needed here but it's here as a bad fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            redis_url: None,
            channels_file: None,
            public_origin: None,
            sentry_dsn: None,
        }
    }
}
