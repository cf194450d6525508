use std::{collections::BTreeMap, fs, path::{Path, PathBuf}, time::Duration};

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use mim_model::PoolSpec;
use mim_observe::{LoggerConfig, LoggerFormat, LoggerLevel};

/// Command line of the allocation agent.
#[derive(Debug, Parser)]
#[command(name = "mim-agentd", version, about = "Flash and benchmark a device pool")]
pub struct Cli {
    /// Path to the JSON agent config.
    #[arg(short, long, env = "MIM_CONFIG")]
    pub config: PathBuf,

    /// Override the configured log filter (e.g. "mim_core=debug,info").
    #[arg(long, env = "MIM_LOG")]
    pub log_level: Option<LoggerLevel>,

    /// Override the configured log format (text|json|journald).
    #[arg(long)]
    pub log_format: Option<LoggerFormat>,

    /// Print Prometheus metrics to stdout before exiting.
    #[arg(long)]
    pub metrics: bool,
}

impl Cli {
    /// Apply command line overrides on top of the file config.
    pub fn apply(&self, logger: &mut LoggerConfig) {
        if let Some(level) = &self.log_level {
            logger.level = level.clone();
        }
        if let Some(format) = self.log_format {
            logger.format = format;
        }
    }
}

fn default_flash_ms() -> u64 {
    500
}

fn default_run_ms() -> u64 {
    100
}

/// Agent config file.
///
/// ```json
/// {
///   "pool": {
///     "labels": [{"name": "vanilla"}, {"name": "patched", "remotes": ["dut-1"]}],
///     "devices": [{"name": "dut-1"}, {"name": "dut-2"}]
///   },
///   "workload": {"vanilla": 6, "patched": 3},
///   "flashMs": 500,
///   "runMs": 100
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub logger: LoggerConfig,
    pub pool: PoolSpec,
    /// Benchmark runs per label name; labels not listed get one run.
    #[serde(default)]
    pub workload: BTreeMap<String, usize>,
    /// Simulated time to flash one image.
    #[serde(default = "default_flash_ms")]
    pub flash_ms: u64,
    /// Simulated time of one benchmark run.
    #[serde(default = "default_run_ms")]
    pub run_ms: u64,
}

impl AgentConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let cfg: AgentConfig = serde_json::from_str(raw)?;
        for name in cfg.workload.keys() {
            if !cfg.pool.labels.iter().any(|l| l.name() == name) {
                anyhow::bail!("workload references unknown label {name:?}");
            }
        }
        Ok(cfg)
    }

    pub fn flash_time(&self) -> Duration {
        Duration::from_millis(self.flash_ms)
    }

    pub fn run_time(&self) -> Duration {
        Duration::from_millis(self.run_ms)
    }
}
