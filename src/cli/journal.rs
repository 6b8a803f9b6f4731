//! Handler for the `journal inspect` subcommand.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::journal::{FileJournal, Journal};

pub async fn execute(args: &crate::cli::JournalArgs) -> Result<()> {
    let crate::cli::JournalCommands::Inspect { path } = &args.command;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let journal = FileJournal::new(path.clone(), clock);
    let report = journal.restore().await?;

    println!();
    println!("Journal:  {}", path.display());
    println!("Entries:  {}", report.entries.len());
    println!("Corrupt:  {}", report.corrupt.len());
    println!();

    for entry in &report.entries {
        println!(
            "#{:<6} {:>15}ms  {:<20} {}",
            entry.sequence, entry.timestamp_ms, entry.kind, entry.payload
        );
    }

    if !report.corrupt.is_empty() {
        println!();
        println!("Corrupt lines:");
        for corrupt in &report.corrupt {
            println!("  line {}: {} ({})", corrupt.line_number, corrupt.reason, corrupt.raw);
        }
    }

    Ok(())
}
