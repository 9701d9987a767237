use core::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use segid::{DEFAULT_SAFE_DISTANCE, DEFAULT_STEP, MAX_STEP};

/// Runtime configuration for the `segid` binary.
///
/// Every global option can also be supplied through the environment (or a
/// `.env` file in the working directory).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "segid",
    version,
    about = "Manage and draw from segment-allocated id sequences"
)]
pub struct CliArgs {
    /// SQLite database holding the `segment_id` table.
    ///
    /// A file path for the `sqlite` driver, a file path or `sqlite://` URL
    /// for the `sqlx` driver.
    ///
    /// Environment variable: `SEGID_DATABASE`
    #[arg(long, env = "SEGID_DATABASE", default_value_t = String::from("segid.db"))]
    pub database: String,

    /// Store driver: blocking `rusqlite` or the async `sqlx` pool.
    ///
    /// Environment variable: `SEGID_DRIVER`
    #[arg(long, env = "SEGID_DRIVER", value_enum, default_value_t = Driver::Sqlite)]
    pub driver: Driver,

    /// How long an idle prefetch worker parks between rounds, in
    /// milliseconds.
    ///
    /// Environment variable: `SEGID_PREFETCH_PERIOD_MS`
    #[arg(long, env = "SEGID_PREFETCH_PERIOD_MS", default_value_t = 1_000)]
    pub prefetch_period_ms: u64,

    /// Number of prefetch worker threads. Defaults to the CPU count.
    ///
    /// Environment variable: `SEGID_POOL_SIZE`
    #[arg(long, env = "SEGID_POOL_SIZE")]
    pub pool_size: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
    Sqlx,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the `segment_id` table if it does not exist.
    Init,

    /// Register a namespace.
    Add {
        namespace: String,

        /// Largest id already in use; the first id handed out is one above.
        #[arg(long, default_value_t = 0)]
        max_id: i64,

        /// Ids reserved per store round trip.
        #[arg(long, default_value_t = DEFAULT_STEP)]
        step: i64,

        /// Segments kept ahead of consumers by the prefetcher.
        #[arg(long, default_value_t = DEFAULT_SAFE_DISTANCE)]
        safe_distance: u32,
    },

    /// Print a namespace's stored row.
    Show { namespace: String },

    /// Draw ids from a namespace and print one per line.
    Next {
        namespace: String,

        /// Number of ids to draw.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u64,

        /// Seconds a fetched segment stays usable. Unset means forever.
        #[arg(long)]
        ttl: Option<i64>,
    },
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub database: String,
    pub driver: Driver,
    pub prefetch_period: Duration,
    pub pool_size: usize,
    pub command: Command,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.database.trim().is_empty() {
            bail!("SEGID_DATABASE must not be empty");
        }
        if args.prefetch_period_ms == 0 {
            bail!("SEGID_PREFETCH_PERIOD_MS must be greater than 0");
        }
        let pool_size = args.pool_size.unwrap_or_else(num_cpus::get);
        if pool_size == 0 {
            bail!("SEGID_POOL_SIZE must be greater than 0");
        }

        match &args.command {
            Command::Add { step, .. } if *step > MAX_STEP => {
                bail!("step ({step}) exceeds the maximum step of {MAX_STEP}")
            }
            Command::Next { count: 0, .. } => bail!("count must be greater than 0"),
            Command::Next { ttl: Some(ttl), .. } if *ttl <= 0 => {
                bail!("ttl ({ttl}) must be greater than 0")
            }
            _ => {}
        }

        Ok(Self {
            database: args.database,
            driver: args.driver,
            prefetch_period: Duration::from_millis(args.prefetch_period_ms),
            pool_size,
            command: args.command,
        })
    }
}

impl CliConfig {
    /// The database as an `sqlx` connection URL.
    pub fn sqlx_url(&self) -> String {
        if self.database.starts_with("sqlite:") {
            self.database.clone()
        } else {
            format!("sqlite://{}", self.database)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<CliConfig> {
        let args = CliArgs::try_parse_from(core::iter::once("segid").chain(args.iter().copied()))?;
        CliConfig::try_from(args)
    }

    #[test]
    fn defaults_apply() {
        let config = parse(&["--pool-size", "2", "next", "order"]).unwrap();
        assert_eq!(config.driver, Driver::Sqlite);
        assert_eq!(config.prefetch_period, Duration::from_secs(1));
        assert_eq!(config.pool_size, 2);
        assert_eq!(
            config.command,
            Command::Next {
                namespace: "order".into(),
                count: 1,
                ttl: None
            }
        );
    }

    #[test]
    fn add_takes_the_library_defaults() {
        let config = parse(&["add", "order"]).unwrap();
        assert_eq!(
            config.command,
            Command::Add {
                namespace: "order".into(),
                max_id: 0,
                step: DEFAULT_STEP,
                safe_distance: DEFAULT_SAFE_DISTANCE
            }
        );
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse(&["--prefetch-period-ms", "0", "init"]).is_err());
        assert!(parse(&["--pool-size", "0", "init"]).is_err());
        assert!(parse(&["add", "order", "--step", "10000"]).is_err());
        assert!(parse(&["next", "order", "-n", "0"]).is_err());
        assert!(parse(&["next", "order", "--ttl", "0"]).is_err());
    }

    #[test]
    fn sqlx_url_is_derived_from_a_path() {
        let config = parse(&["--database", "/tmp/ids.db", "init"]).unwrap();
        assert_eq!(config.sqlx_url(), "sqlite:///tmp/ids.db");

        let config = parse(&["--database", "sqlite::memory:", "init"]).unwrap();
        assert_eq!(config.sqlx_url(), "sqlite::memory:");
    }
}
