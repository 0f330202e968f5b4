//! Result tables shared by `simulate`, `take` and `inspect`.

use std::collections::BTreeMap;

use comfy_table::{Cell, Table};

use adaptest_core::attempt::AttemptDiagnostics;
use adaptest_core::snapshot::AttemptSnapshot;

/// Per-skill estimates of a live attempt, optionally next to the true abilities.
pub fn diagnostics_table(
    diagnostics: &AttemptDiagnostics,
    true_theta: Option<&BTreeMap<String, f64>>,
) -> Table {
    let mut table = Table::new();
    let mut header = vec!["Skill"];
    if true_theta.is_some() {
        header.push("True θ");
    }
    header.extend(["Estimate", "SE", "Items", "Remaining", "Mastered"]);
    table.set_header(header);

    for (skill, theta) in &diagnostics.theta {
        let mut row = vec![Cell::new(skill)];
        if let Some(truth) = true_theta {
            row.push(Cell::new(format!(
                "{:+.2}",
                truth.get(skill).copied().unwrap_or(0.0)
            )));
        }
        let count = |map: &BTreeMap<String, Vec<String>>| map.get(skill).map_or(0, Vec::len);
        row.extend([
            Cell::new(format!("{theta:+.3}")),
            Cell::new(format!(
                "{:.3}",
                diagnostics.standard_error.get(skill).copied().unwrap_or(f64::NAN)
            )),
            Cell::new(count(&diagnostics.administered)),
            Cell::new(count(&diagnostics.remaining)),
            Cell::new(yes_no(diagnostics.mastery.get(skill).copied().unwrap_or(false))),
        ]);
        table.add_row(row);
    }
    table
}

/// Per-skill state stored in a snapshot.
pub fn snapshot_table(snapshot: &AttemptSnapshot) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Skill", "Theta", "SE", "Prior", "Responses", "Correct", "Mastered",
    ]);
    for skill in &snapshot.skills {
        let prior = skill.prior();
        let correct = skill.responses.iter().filter(|r| r.correct).count();
        table.add_row(vec![
            Cell::new(&skill.skill),
            Cell::new(format!("{:+.3}", skill.theta)),
            Cell::new(format!("{:.3}", skill.standard_error)),
            Cell::new(format!("N({:.2}, {:.2})", prior.mu, prior.sigma2)),
            Cell::new(skill.responses.len()),
            Cell::new(correct),
            Cell::new(yes_no(
                snapshot.mastery.get(&skill.skill).copied().unwrap_or(false),
            )),
        ]);
    }
    table
}

/// Every recorded response of a snapshot, in answer order per skill.
pub fn responses_table(snapshot: &AttemptSnapshot) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Skill", "#", "Item", "Correct", "a", "b", "c"]);
    for skill in &snapshot.skills {
        for r in &skill.responses {
            table.add_row(vec![
                Cell::new(&r.skill),
                Cell::new(r.order + 1),
                Cell::new(&r.item_id),
                Cell::new(yes_no(r.correct)),
                Cell::new(format!("{:.2}", r.params.a)),
                Cell::new(format!("{:+.2}", r.params.b)),
                Cell::new(format!("{:.2}", r.params.c)),
            ]);
        }
    }
    table
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
