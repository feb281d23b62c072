//! Manual inspection/ops CLI for a running [`backupcore::BackupEngine`].
//!
//! This binary builds a fresh in-process engine per invocation (there is
//! no daemon to attach to); its value is exercising the coordinator's
//! size-estimate and cursor-drain paths from a shell, and as a smoke
//! test during development.

use backupcore::{BackupEngine, CursorType, Timestamp, WalOffset};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "backupcore-cli", about = "Inspect a backupcore engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mark a block dirty and report the engine's counters.
    MarkDirty {
        block_id: u64,
        wal_offset: u64,
        timestamp: i64,
    },
    /// Estimate the size of a backup over a WAL-offset range.
    EstimateSize { w_lo: u64, w_hi: u64 },
    /// Drain up to `max` dirty blocks in a WAL-offset range and print them.
    Drain {
        w_lo: u64,
        w_hi: u64,
        #[arg(default_value_t = 1000)]
        max: usize,
    },
}

fn main() -> backupcore::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let engine = BackupEngine::with_defaults()?;
    engine.start()?;

    match cli.command {
        Command::MarkDirty {
            block_id,
            wal_offset,
            timestamp,
        } => {
            engine.on_block_dirty(block_id, wal_offset, timestamp);
            std::thread::sleep(std::time::Duration::from_millis(50));
            let stats = engine.engine().get_stats();
            println!("{stats:?}");
        }
        Command::EstimateSize { w_lo, w_hi } => {
            let estimate = engine
                .coordinator()
                .estimate_size(WalOffset::new(w_lo), WalOffset::new(w_hi));
            println!("blocks={} bytes={}", estimate.blocks, estimate.bytes);
        }
        Command::Drain { w_lo, w_hi, max } => {
            let cursor = engine.coordinator().create_cursor(
                CursorType::Wal,
                Timestamp::new(0),
                Timestamp::new(i64::MAX),
                WalOffset::new(w_lo),
                WalOffset::new(w_hi),
            );
            let batch = engine.coordinator().get_next_batch(cursor, max)?;
            engine.coordinator().destroy_cursor(cursor);
            for block in &batch {
                println!(
                    "block_id={} wal_offset={} timestamp={} state={:?}",
                    block.block_id.get(),
                    block.wal_offset.get(),
                    block.timestamp.get(),
                    block.state
                );
            }
        }
    }

    engine.stop()?;
    Ok(())
}
