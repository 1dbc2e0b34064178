use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use convoy_engine::{ConfigError, EngineConfig};
use serde::Deserialize;

use crate::error::ConsumerError;

#[derive(Parser)]
#[command(name = "convoy-consumer", about = "Telemetry stream-to-batch consumer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the stream listener and the batch accumulator
    Serve(ConsumerArgs),
    /// Idempotently create the target container and checkpoint directory
    Provision(ConsumerArgs),
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub stream_name: Option<String>,
    pub shard_count: Option<u32>,
    pub region: Option<String>,
    pub bucket_name: Option<String>,
    pub threshold: Option<usize>,
    pub listen_addr: Option<String>,
    pub data_root: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub invocation_max_records: Option<usize>,
    pub max_buffer_depth: Option<usize>,
    pub flush_timeout_ms: Option<u64>,
    pub key_prefix: Option<String>,
}

pub fn load_config(path: &str) -> Result<ConfigFile, ConsumerError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConsumerError::Config {
        context: "file",
        detail: format!("cannot read config {path}: {e}"),
    })?;
    toml::from_str(&content).map_err(|e| ConsumerError::Config {
        context: "file",
        detail: format!("bad config {path}: {e}"),
    })
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct ConsumerArgs {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml", env = "CONVOY_CONFIG")]
    pub config: String,

    /// Logical stream name (required)
    #[arg(long, env = "STREAM_NAME")]
    pub stream_name: Option<String>,

    /// Stream shard count (informational for the local listener)
    #[arg(long, env = "SHARD_COUNT")]
    pub shard_count: Option<u32>,

    /// Deployment region label (required)
    #[arg(long, env = "REGION")]
    pub region: Option<String>,

    /// Target container for flushed batches (required)
    #[arg(long, env = "BUCKET_NAME")]
    pub bucket_name: Option<String>,

    /// Flush threshold: events per batch
    #[arg(long, env = "FLUSH_THRESHOLD")]
    pub threshold: Option<usize>,

    /// Address the stream listener binds to
    #[arg(long, env = "LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// Root directory of the object store
    #[arg(long, env = "DATA_ROOT")]
    pub data_root: Option<String>,

    /// Invocation driver tick interval
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Most records handed to the accumulator per invocation
    #[arg(long)]
    pub invocation_max_records: Option<usize>,

    /// Hard buffer ceiling (defaults to 10x the threshold)
    #[arg(long)]
    pub max_buffer_depth: Option<usize>,

    /// Bound on a single durable write
    #[arg(long)]
    pub flush_timeout_ms: Option<u64>,

    /// Object key prefix for flushed batches
    #[arg(long)]
    pub key_prefix: Option<String>,
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Final configuration after the merge: config.toml < env/CLI.
///
/// Missing required values are a fatal startup error, not a runtime error.
#[derive(Debug)]
pub struct Effective {
    pub stream_name: String,
    pub shard_count: u32,
    pub region: String,
    pub bucket_name: String,
    pub threshold: usize,
    pub listen_addr: String,
    pub data_root: String,
    pub poll_interval_ms: u64,
    pub invocation_max_records: usize,
    pub max_buffer_depth: Option<usize>,
    pub flush_timeout_ms: Option<u64>,
    pub key_prefix: Option<String>,
}

impl Effective {
    pub fn new(args: &ConsumerArgs) -> Result<Self, ConsumerError> {
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&args.config).exists() {
                    return Err(e);
                }
                ConfigFile::default()
            }
        };
        Self::from_parts(args, cfg)
    }

    pub fn from_parts(args: &ConsumerArgs, cfg: ConfigFile) -> Result<Self, ConsumerError> {
        let stream_name = args
            .stream_name
            .clone()
            .or(cfg.stream_name)
            .ok_or(ConfigError::Missing("stream_name"))?;
        let region = args
            .region
            .clone()
            .or(cfg.region)
            .ok_or(ConfigError::Missing("region"))?;
        let bucket_name = args
            .bucket_name
            .clone()
            .or(cfg.bucket_name)
            .ok_or(ConfigError::Missing("bucket_name"))?;

        let shard_count = args.shard_count.or(cfg.shard_count).unwrap_or(1);
        if shard_count == 0 {
            return Err(ConfigError::Invalid {
                name: "shard_count",
                reason: "must be at least 1".into(),
            }
            .into());
        }

        let invocation_max_records = args
            .invocation_max_records
            .or(cfg.invocation_max_records)
            .unwrap_or(500);
        if invocation_max_records == 0 {
            return Err(ConfigError::Invalid {
                name: "invocation_max_records",
                reason: "must be at least 1".into(),
            }
            .into());
        }

        Ok(Self {
            stream_name,
            shard_count,
            region,
            bucket_name,
            threshold: args.threshold.or(cfg.threshold).unwrap_or(700),
            listen_addr: args
                .listen_addr
                .clone()
                .or(cfg.listen_addr)
                .unwrap_or_else(|| "127.0.0.1:9750".into()),
            data_root: args
                .data_root
                .clone()
                .or(cfg.data_root)
                .unwrap_or_else(|| "./data".into()),
            poll_interval_ms: args
                .poll_interval_ms
                .or(cfg.poll_interval_ms)
                .unwrap_or(1000)
                .max(1),
            invocation_max_records,
            max_buffer_depth: args.max_buffer_depth.or(cfg.max_buffer_depth),
            flush_timeout_ms: args.flush_timeout_ms.or(cfg.flush_timeout_ms),
            key_prefix: args.key_prefix.clone().or(cfg.key_prefix),
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig {
            flush_threshold: self.threshold,
            max_buffer_depth: self
                .max_buffer_depth
                .unwrap_or_else(|| self.threshold.saturating_mul(10)),
            ..EngineConfig::default()
        };
        if let Some(ms) = self.flush_timeout_ms {
            config.flush_timeout_ms = ms;
        }
        if let Some(prefix) = &self.key_prefix {
            config.key_prefix = prefix.clone();
        }
        config
    }

    /// Checkpoint file: one per stream, under the data root.
    pub fn checkpoint_path(&self) -> PathBuf {
        PathBuf::from(&self.data_root)
            .join("_checkpoints")
            .join(format!("{}.json", self.stream_name))
    }
}
