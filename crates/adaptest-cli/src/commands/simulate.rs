//! The `adaptest simulate` command.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use adaptest_core::attempt::Answer;
use adaptest_core::bank::ItemBank;
use adaptest_core::irt::probability_correct;
use adaptest_core::traits::SnapshotSink;
use adaptest_service::config::load_config_from;
use adaptest_service::{AttemptService, InitRequest, JsonDirectorySink, NoopSink};

use super::{load_bank_filtered, parse_skills, summary};

/// Parse `"Skill=value,Other=value"` into a map.
fn parse_true_theta(pairs: &str) -> Result<BTreeMap<String, f64>> {
    pairs.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (skill, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("expected Skill=value, got '{pair}'"))?;
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("invalid theta for {}: '{}'", skill.trim(), value.trim()))?;
            anyhow::ensure!(value.is_finite(), "theta for {} must be finite", skill.trim());
            Ok((skill.trim().to_string(), value))
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    bank_path: PathBuf,
    true_theta_str: String,
    seed: u64,
    max_items: Option<usize>,
    skills: Option<String>,
    bloom: Option<String>,
    config_path: Option<PathBuf>,
    format: String,
    snapshot_dir: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        format == "text" || format == "json",
        "unknown format '{format}' (expected text or json)"
    );
    let true_theta = parse_true_theta(&true_theta_str)?;
    let mut config = load_config_from(config_path.as_deref())?;
    // The summary reads the finished attempt back from the store.
    config.evict_finished = false;
    let item_bank: Arc<ItemBank> = Arc::new(load_bank_filtered(&bank_path, bloom.as_deref())?);

    let snapshot_dir = snapshot_dir.or_else(|| config.snapshot_dir.clone());
    let sink: Arc<dyn SnapshotSink> = match &snapshot_dir {
        Some(dir) => Arc::new(JsonDirectorySink::new(dir)),
        None => Arc::new(NoopSink),
    };
    let service = AttemptService::in_memory(item_bank.clone(), config).with_sink(sink);

    let mut view = service
        .init(InitRequest {
            skills: parse_skills(skills.as_deref()),
            max_items,
            ..InitRequest::default()
        })
        .await?;
    let attempt_id = view.attempt_id.clone();
    tracing::debug!(attempt = %attempt_id, seed, "simulating responses");

    for skill in true_theta.keys() {
        if !view.theta.contains_key(skill) {
            eprintln!("Warning: --true-theta names {skill}, which is not assessed");
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let text = format == "text";
    let mut turn = 0;

    while let Some(next) = view.next_item.clone() {
        turn += 1;
        let item = item_bank
            .find(&next.skill, &next.item_id)
            .with_context(|| format!("item {}/{} missing from bank", next.skill, next.item_id))?;
        let truth = true_theta.get(&next.skill).copied().unwrap_or(0.0);
        let p = &item.params;
        let correct = rng.gen::<f64>() < probability_correct(p.a, p.b, p.c, truth);

        view = service
            .step(
                &attempt_id,
                Some(Answer::Graded {
                    item_id: next.item_id.clone(),
                    correct,
                }),
            )
            .await?;

        if text {
            println!(
                "[{turn:>3}] {:<16} {:<12} {:<9} theta={:+.3}",
                next.skill,
                next.item_id,
                if correct { "correct" } else { "incorrect" },
                view.theta.get(&next.skill).copied().unwrap_or(f64::NAN),
            );
        }
    }

    let diagnostics = service.state(&attempt_id).await?;
    if text {
        println!("\nFinished after {} items.", diagnostics.items_administered);
        println!("{}", summary::diagnostics_table(&diagnostics, Some(&true_theta)));
    } else {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    }
    if let Some(dir) = snapshot_dir {
        eprintln!(
            "Snapshot: {}",
            JsonDirectorySink::new(dir).path_for(&attempt_id)?.display()
        );
    }

    Ok(())
}
