use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    #[arg(long, env = "STRATUS_CONSOLE_ADDR", default_value = "0.0.0.0:18100")]
    pub listen_addr: String,

    /// etcd endpoint backing the metadata store. Empty selects the
    /// in-process store (single-node / demo mode).
    #[arg(long, env = "ETCD_ENDPOINT", default_value = "")]
    pub etcd_endpoint: String,

    /// Seconds between cluster summary refreshes.
    #[arg(long, env = "STRATUS_POLL_INTERVAL_SECS", default_value = "15")]
    pub poll_interval_secs: u64,

    #[arg(long, env = "STRATUS_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "STRATUS_OTLP_TOKEN")]
    pub otlp_token: Option<String>,
}
