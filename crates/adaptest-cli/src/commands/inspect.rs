//! The `adaptest inspect` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::snapshot::AttemptSnapshot;

use super::summary;

pub fn execute(snapshot_path: PathBuf) -> Result<()> {
    let snapshot = AttemptSnapshot::load_json(&snapshot_path)?;

    println!("Attempt:  {}", snapshot.attempt_id);
    println!("State:    {}", snapshot.state);
    println!(
        "Items:    {} of {}",
        snapshot.items_administered, snapshot.config.max_items
    );
    println!("Created:  {}", snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Updated:  {}", snapshot.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    match &snapshot.pending {
        Some(pending) => println!("Pending:  {} ({})", pending.item_id, pending.skill),
        None => println!("Pending:  none"),
    }

    println!("\n{}", summary::snapshot_table(&snapshot));
    if snapshot.response_count() > 0 {
        println!("\n{}", summary::responses_table(&snapshot));
    }

    Ok(())
}
