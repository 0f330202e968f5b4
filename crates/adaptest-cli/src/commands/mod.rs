pub mod init;
pub mod inspect;
pub mod simulate;
pub mod summary;
pub mod take;
pub mod validate;

use std::path::Path;

use anyhow::Result;

use adaptest_core::bank::{self, ItemBank};

/// Split a comma-separated skill list.
pub(crate) fn parse_skills(skills: Option<&str>) -> Option<Vec<String>> {
    skills.map(|s| {
        s.split(',')
            .map(|skill| skill.trim().to_string())
            .filter(|skill| !skill.is_empty())
            .collect()
    })
}

/// Load a bank and keep only items at the requested Bloom levels.
pub(crate) fn load_bank_filtered(path: &Path, bloom: Option<&str>) -> Result<ItemBank> {
    let mut item_bank = bank::load_bank(path)?;
    if let Some(levels) = parse_skills(bloom) {
        item_bank.retain_bloom(&levels);
        anyhow::ensure!(
            !item_bank.items.is_empty(),
            "no items at Bloom level(s) {}",
            levels.join(", ")
        );
        tracing::debug!(items = item_bank.items.len(), "filtered bank by Bloom level");
    }
    Ok(item_bank)
}
