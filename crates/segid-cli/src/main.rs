#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use std::{
    io::{BufWriter, Write},
    sync::Arc,
};

use anyhow::Context;
use clap::Parser;
use config::{CliArgs, CliConfig, Command, Driver};
use segid::{
    AsyncSegmentStore, AsyncStoreSegmentDistributor, BlockOn, Namespace, PrefetchWorkerExecutor,
    SegmentChainId, SegmentDefinition, SegmentIdFactory, SegmentStore, SqliteSegmentStore,
    SqlxSegmentStore, TIME_TO_LIVE_FOREVER,
};
use telemetry::init_telemetry;
use tokio::runtime::Runtime;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    init_telemetry()?;
    tracing::debug!(?config, "starting");

    match config.driver {
        Driver::Sqlite => run_sqlite(&config),
        Driver::Sqlx => run_sqlx(&config),
    }
}

fn executor(config: &CliConfig) -> anyhow::Result<Arc<PrefetchWorkerExecutor>> {
    let executor = PrefetchWorkerExecutor::new(config.prefetch_period, config.pool_size, true)
        .context("failed to start the prefetch executor")?;
    Ok(Arc::new(executor))
}

fn run_sqlite(config: &CliConfig) -> anyhow::Result<()> {
    let store = Arc::new(
        SqliteSegmentStore::open(&config.database)
            .with_context(|| format!("failed to open {}", config.database))?,
    );

    match &config.command {
        Command::Init => {
            println!("initialized {}", config.database);
        }
        Command::Add {
            namespace,
            max_id,
            step,
            safe_distance,
        } => {
            let definition = SegmentDefinition::new(namespace, *max_id, *step, *safe_distance);
            store.add_segment(&definition)?;
            print_definition(&definition);
        }
        Command::Show { namespace } => {
            print_definition(&store.definition(namespace)?);
        }
        Command::Next {
            namespace,
            count,
            ttl,
        } => {
            let factory = SegmentIdFactory::new(store)
                .executor(executor(config)?)
                .ttl(ttl.unwrap_or(TIME_TO_LIVE_FOREVER));
            let sequence = factory.id_generator(namespace)?;
            draw(*count, || Ok(sequence.next_id()?))?;
        }
    }
    Ok(())
}

fn run_sqlx(config: &CliConfig) -> anyhow::Result<()> {
    let runtime = Runtime::new().context("failed to start the tokio runtime")?;
    let url = config.sqlx_url();
    let store = Arc::new(
        runtime
            .block_on(SqlxSegmentStore::connect(&url))
            .with_context(|| format!("failed to connect to {url}"))?,
    );

    match &config.command {
        Command::Init => {
            println!("initialized {url}");
        }
        Command::Add {
            namespace,
            max_id,
            step,
            safe_distance,
        } => {
            let definition = SegmentDefinition::new(namespace, *max_id, *step, *safe_distance);
            runtime.block_on(store.add_segment_async(&definition))?;
            print_definition(&definition);
        }
        Command::Show { namespace } => {
            print_definition(&runtime.block_on(store.definition_async(namespace))?);
        }
        Command::Next {
            namespace,
            count,
            ttl,
        } => {
            let definition = runtime.block_on(store.definition_async(namespace))?;
            let distributor = BlockOn::new(
                AsyncStoreSegmentDistributor::new(namespace, definition.step, store)?,
                runtime.handle().clone(),
            );
            tracing::debug!(namespace = distributor.namespace(), step = distributor.step(), "drawing");
            let sequence = SegmentChainId::builder(distributor)
                .ttl(ttl.unwrap_or(TIME_TO_LIVE_FOREVER))
                .safe_distance(definition.safe_distance)
                .executor(executor(config)?)
                .build()?;
            draw(*count, || Ok(sequence.next_id()?))?;
        }
    }
    Ok(())
}

fn draw(count: u64, mut next_id: impl FnMut() -> anyhow::Result<i64>) -> anyhow::Result<()> {
    let mut out = BufWriter::new(std::io::stdout().lock());
    for _ in 0..count {
        writeln!(out, "{}", next_id()?)?;
    }
    out.flush()?;
    Ok(())
}

fn print_definition(definition: &SegmentDefinition) {
    println!(
        "namespace={} max_id={} step={} safe_distance={}",
        definition.namespace, definition.max_id, definition.step, definition.safe_distance
    );
}
