use clap::Args;

#[derive(Args, Clone, Debug)]
pub struct PublishArgs {
    /// Stream endpoint address
    #[arg(long, default_value = "127.0.0.1:9750", env = "STREAM_ADDR")]
    pub addr: String,

    /// Number of simulated trucks per tick
    #[arg(long, default_value_t = 10)]
    pub trucks: u32,

    /// Number of ticks to publish (0 = run forever)
    #[arg(long, default_value_t = 30)]
    pub ticks: u64,

    /// Interval between ticks in ms
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// PRNG seed (0 = seed from current time)
    #[arg(long, default_value_t = 0)]
    pub seed: i64,
}
