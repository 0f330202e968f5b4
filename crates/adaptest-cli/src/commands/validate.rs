//! The `adaptest validate` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::bank;

pub fn execute(bank_path: PathBuf) -> Result<()> {
    let banks = if bank_path.is_dir() {
        bank::load_bank_directory(&bank_path)?
    } else {
        vec![bank::parse_bank(&bank_path)?]
    };
    anyhow::ensure!(!banks.is_empty(), "no item banks found in {}", bank_path.display());

    let mut total_warnings = 0;

    for b in &banks {
        let skills = b.skills();
        println!(
            "Bank: {} ({} items, {} skills)",
            if b.name.is_empty() { &b.id } else { &b.name },
            b.items.len(),
            skills.len()
        );
        for skill in &skills {
            println!("  {skill}: {} items", b.items_for(skill).count());
        }

        let warnings = bank::validate_bank(b);
        for w in &warnings {
            let prefix = w
                .item_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
