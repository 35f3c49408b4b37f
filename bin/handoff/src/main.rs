use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use foundation_handoff::{Backing, Exchange, ExchangeConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackingKind {
    /// Mutex with explicit condition variables
    Manual,
    /// Blocking queue
    Queue,
}

#[derive(Parser, Debug)]
#[command(version, about = "Run one producer/consumer exchange", long_about = None)]
struct Args {
    /// TOML file holding the exchange configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store backing the exchange
    #[arg(short, long, value_enum)]
    backing: Option<BackingKind>,

    /// Store capacity; omit for an unbounded queue
    #[arg(long)]
    capacity: Option<usize>,

    /// Last value produced, also the consumer's terminal value
    #[arg(short = 'n', long)]
    count: Option<u64>,

    #[arg(long)]
    producer_delay_ms: Option<u64>,

    #[arg(long)]
    consumer_delay_ms: Option<u64>,

    /// Give up on a take after this many milliseconds
    #[arg(long)]
    patience_ms: Option<u64>,

    /// Stop only on the terminal value; the producer never closes the store
    #[arg(long)]
    sentinel_only: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn resolve_backing(&self, current: Backing) -> Backing {
        let kind = match (self.backing, current) {
            (Some(kind), _) => kind,
            (None, Backing::Manual { .. }) => BackingKind::Manual,
            (None, Backing::Queue { .. }) => BackingKind::Queue,
        };

        match (kind, current) {
            (BackingKind::Manual, Backing::Manual { capacity }) => Backing::Manual {
                capacity: self.capacity.unwrap_or(capacity),
            },
            (BackingKind::Manual, Backing::Queue { capacity }) => Backing::Manual {
                capacity: self.capacity.or(capacity).unwrap_or(1),
            },
            (BackingKind::Queue, Backing::Queue { capacity }) => Backing::Queue {
                capacity: self.capacity.or(capacity),
            },
            (BackingKind::Queue, Backing::Manual { .. }) => Backing::Queue {
                capacity: self.capacity,
            },
        }
    }

    fn into_config(self) -> anyhow::Result<ExchangeConfig> {
        let mut config = match &self.config {
            Some(path) => ExchangeConfig::from_path(path.as_path())?,
            None => ExchangeConfig::new(),
        };

        config = config.backing(self.resolve_backing(config.get_backing()));
        if let Some(count) = self.count {
            config = config.count(count);
        }
        if let Some(delay) = self.producer_delay_ms {
            config = config.producer_delay(Duration::from_millis(delay));
        }
        if let Some(delay) = self.consumer_delay_ms {
            config = config.consumer_delay(Duration::from_millis(delay));
        }
        if let Some(patience) = self.patience_ms {
            config = config.patience(Some(Duration::from_millis(patience)));
        }
        if self.sentinel_only {
            config = config.close_on_finish(false);
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.into_config()?;
    let exchange = Exchange::new(config);

    let producer_cancel = exchange.producer_cancel();
    let consumer_cancel = exchange.consumer_cancel();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupted, cancelling exchange");
        producer_cancel.cancel();
        consumer_cancel.cancel();
    })?;

    let report = exchange.run()?;
    tracing::info!(
        produced = report.produced,
        consumed = ?report.consumed,
        elapsed = ?report.elapsed,
        "consumer terminated"
    );

    Ok(())
}
