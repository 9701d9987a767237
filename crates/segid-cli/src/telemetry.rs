//! Console logging for the `segid` binary.
//!
//! Events from the library (prefetch rounds, worker binding, synchronous
//! refills) and from the CLI itself go to stderr through a `fmt` layer. The
//! level is taken from `RUST_LOG`, defaulting to `warn` so that drawn ids on
//! stdout stay easy to pipe.
//!
//! ```bash
//! RUST_LOG=segid=debug segid next order -n 5
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        )
        .try_init()?;
    Ok(())
}
