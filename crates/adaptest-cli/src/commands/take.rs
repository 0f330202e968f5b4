//! The `adaptest take` command.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use adaptest_core::attempt::Answer;
use adaptest_core::bank::ItemBank;
use adaptest_core::traits::SnapshotSink;
use adaptest_service::config::load_config_from;
use adaptest_service::{AttemptService, InitRequest, JsonDirectorySink, NoopSink};

use super::{load_bank_filtered, parse_skills, summary};

/// A parsed line of user input.
#[derive(Debug, PartialEq)]
enum Reply {
    Quit,
    Choice(usize),
    Graded(bool),
}

fn letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

/// Interpret `line` for an item with `options` options. Keyed items take a
/// letter, unkeyed ones a self-graded y/n.
fn parse_reply(line: &str, keyed: bool, options: usize) -> Option<Reply> {
    let reply = line.trim();
    if reply.eq_ignore_ascii_case("q") {
        return Some(Reply::Quit);
    }
    if keyed {
        let mut chars = reply.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return None;
        };
        let c = c.to_ascii_uppercase();
        if !c.is_ascii_uppercase() {
            return None;
        }
        let index = (c as u8 - b'A') as usize;
        (index < options).then_some(Reply::Choice(index))
    } else {
        match reply.to_ascii_lowercase().as_str() {
            "y" | "yes" => Some(Reply::Graded(true)),
            "n" | "no" => Some(Reply::Graded(false)),
            _ => None,
        }
    }
}

pub async fn execute(
    bank_path: PathBuf,
    skills: Option<String>,
    bloom: Option<String>,
    max_items: Option<usize>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    config.evict_finished = false;
    let item_bank = Arc::new(load_bank_filtered(&bank_path, bloom.as_deref())?);

    let sink: Arc<dyn SnapshotSink> = match &config.snapshot_dir {
        Some(dir) => Arc::new(JsonDirectorySink::new(dir)),
        None => Arc::new(NoopSink),
    };
    let service = AttemptService::in_memory(item_bank.clone(), config).with_sink(sink);
    let request = InitRequest {
        skills: parse_skills(skills.as_deref()),
        max_items,
        ..InitRequest::default()
    };

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    run_session(
        &service,
        &item_bank,
        request,
        &mut stdin.lock(),
        &mut stdout.lock(),
    )
    .await
}

async fn run_session<R: BufRead, W: Write>(
    service: &AttemptService,
    item_bank: &ItemBank,
    request: InitRequest,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let mut view = service.init(request).await?;
    let attempt_id = view.attempt_id.clone();
    let mut number = 0;
    let mut stopped = false;

    'items: while let Some(next) = view.next_item.clone() {
        number += 1;
        let keyed = !next.options.is_empty()
            && item_bank
                .find(&next.skill, &next.item_id)
                .is_some_and(|item| item.correct_index.is_some());

        writeln!(out, "\nQ{number} [{}] {}", next.skill, next.stem)?;
        for (i, option) in next.options.iter().enumerate() {
            writeln!(out, "  {}) {option}", letter(i))?;
        }

        let reply = loop {
            if keyed {
                write!(
                    out,
                    "Answer (A-{}, q to quit): ",
                    letter(next.options.len() - 1)
                )?;
            } else {
                write!(out, "Did you answer correctly? (y/n, q to quit): ")?;
            }
            out.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                stopped = true;
                break 'items;
            }
            match parse_reply(&line, keyed, next.options.len()) {
                Some(Reply::Quit) => {
                    stopped = true;
                    break 'items;
                }
                Some(reply) => break reply,
                None => writeln!(out, "Unrecognized answer: {}", line.trim())?,
            }
        };

        let answer = match reply {
            Reply::Choice(answer_index) => Answer::Choice {
                item_id: next.item_id.clone(),
                answer_index,
            },
            Reply::Graded(correct) => Answer::Graded {
                item_id: next.item_id.clone(),
                correct,
            },
            Reply::Quit => break,
        };
        view = service.step(&attempt_id, Some(answer)).await?;
        writeln!(
            out,
            "{} estimate: {:+.3}",
            next.skill,
            view.theta.get(&next.skill).copied().unwrap_or(f64::NAN)
        )?;
    }

    let diagnostics = service.state(&attempt_id).await?;
    if stopped {
        writeln!(out, "\nStopped after {} items.", diagnostics.items_administered)?;
    } else {
        writeln!(out, "\nFinished after {} items.", diagnostics.items_administered)?;
    }
    writeln!(out, "{}", summary::diagnostics_table(&diagnostics, None))?;
    Ok(())
}
