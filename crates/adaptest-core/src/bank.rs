//! Item bank loading.
//!
//! Loads item banks from TOML, JSON or CSV files and directories, groups them
//! into per-skill pools, and validates them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::EngineResult;
use crate::item::{Item, ItemParams, ItemPool};
use crate::traits::ItemSource;

/// Intermediate structure shared by the TOML and JSON bank formats.
#[derive(Debug, Deserialize)]
struct BankFile {
    bank: BankHeader,
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct BankHeader {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: String,
    skill: String,
    #[serde(default)]
    stem: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    correct_index: Option<usize>,
    #[serde(default)]
    a: Option<f64>,
    #[serde(default)]
    b: Option<f64>,
    #[serde(default)]
    c: Option<f64>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

/// A loaded item bank.
#[derive(Debug, Clone, Default)]
pub struct ItemBank {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Items in file order.
    pub items: Vec<Item>,
    /// Ids of items dropped because they had no IRT parameters.
    pub skipped: Vec<String>,
}

impl ItemBank {
    fn from_file(parsed: BankFile, source_path: &Path) -> Result<Self> {
        let mut items = Vec::with_capacity(parsed.items.len());
        let mut skipped = Vec::new();
        for raw in parsed.items {
            let (Some(a), Some(b), Some(c)) = (raw.a, raw.b, raw.c) else {
                tracing::warn!(
                    item_id = %raw.id,
                    "skipping item without IRT parameters in {}",
                    source_path.display()
                );
                skipped.push(raw.id);
                continue;
            };
            let mut item = Item::new(raw.id, raw.skill, ItemParams { a, b, c })
                .with_context(|| format!("invalid item in {}", source_path.display()))?
                .with_presentation(raw.stem, raw.options, raw.correct_index);
            item.metadata = raw.metadata;
            items.push(item);
        }
        Ok(Self {
            id: parsed.bank.id,
            name: parsed.bank.name,
            description: parsed.bank.description,
            items,
            skipped,
        })
    }

    /// Combine several banks into one, keeping file order.
    pub fn merge(banks: Vec<ItemBank>) -> Self {
        let mut merged = ItemBank {
            id: banks
                .iter()
                .map(|b| b.id.as_str())
                .collect::<Vec<_>>()
                .join("+"),
            ..ItemBank::default()
        };
        for bank in banks {
            merged.items.extend(bank.items);
            merged.skipped.extend(bank.skipped);
        }
        merged
    }

    /// Distinct skills in first-seen order.
    pub fn skills(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .filter(|item| seen.insert(item.skill.as_str()))
            .map(|item| item.skill.clone())
            .collect()
    }

    pub fn get(&self, item_id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.item_id == item_id)
    }

    /// Look up an item by skill and id. Merged banks may reuse an id across skills.
    pub fn find(&self, skill: &str, item_id: &str) -> Option<&Item> {
        self.items
            .iter()
            .find(|item| item.skill == skill && item.item_id == item_id)
    }

    /// Keep only items whose `bloom` metadata matches one of `levels`
    /// (case-insensitive). Items without a Bloom level are dropped.
    pub fn retain_bloom(&mut self, levels: &[String]) {
        self.items.retain(|item| {
            item.metadata
                .get("bloom")
                .and_then(|value| value.as_str())
                .is_some_and(|bloom| levels.iter().any(|l| l.eq_ignore_ascii_case(bloom.trim())))
        });
    }

    /// Items measuring `skill`, in bank order.
    pub fn items_for<'a>(&'a self, skill: &'a str) -> impl Iterator<Item = &'a Item> {
        self.items.iter().filter(move |item| item.skill == skill)
    }

    /// One pool per requested skill (all skills when `None`).
    pub fn pools(&self, skills: Option<&[String]>) -> EngineResult<Vec<ItemPool>> {
        let skills = match skills {
            Some(skills) => skills.to_vec(),
            None => self.skills(),
        };
        group_into_pools(&skills, self.items.clone())
    }
}

#[async_trait]
impl ItemSource for ItemBank {
    fn name(&self) -> &str {
        &self.id
    }

    async fn skills(&self) -> Result<Vec<String>> {
        Ok(ItemBank::skills(self))
    }

    async fn items(&self, skills: Option<&[String]>) -> Result<Vec<Item>> {
        Ok(match skills {
            None => self.items.clone(),
            Some(skills) => self
                .items
                .iter()
                .filter(|item| skills.contains(&item.skill))
                .cloned()
                .collect(),
        })
    }
}

/// Group `items` into one pool per skill in `skills`, preserving item order.
///
/// Skills with no items get an empty pool; items for other skills are dropped.
pub fn group_into_pools(skills: &[String], items: Vec<Item>) -> EngineResult<Vec<ItemPool>> {
    let mut grouped: HashMap<&str, Vec<Item>> =
        skills.iter().map(|s| (s.as_str(), Vec::new())).collect();
    for item in items {
        if let Some(bucket) = grouped.get_mut(item.skill.as_str()) {
            bucket.push(item);
        }
    }
    skills
        .iter()
        .map(|skill| {
            let items = grouped.remove(skill.as_str()).unwrap_or_default();
            ItemPool::new(skill.clone(), items)
        })
        .collect()
}

/// Parse a single bank file. `.json` files are read as JSON, `.csv` files as
/// a question sheet, anything else as TOML.
pub fn parse_bank(path: &Path) -> Result<ItemBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read bank file: {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_bank_json_str(&content, path),
        Some("csv") => parse_bank_csv_str(&content, path),
        _ => parse_bank_str(&content, path),
    }
}

/// Parse a TOML string into an `ItemBank`.
pub fn parse_bank_str(content: &str, source_path: &Path) -> Result<ItemBank> {
    let parsed: BankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    ItemBank::from_file(parsed, source_path)
}

/// Parse a JSON string into an `ItemBank`.
pub fn parse_bank_json_str(content: &str, source_path: &Path) -> Result<ItemBank> {
    let parsed: BankFile = serde_json::from_str(content)
        .with_context(|| format!("failed to parse JSON: {}", source_path.display()))?;
    ItemBank::from_file(parsed, source_path)
}

/// One row of a question sheet. Unknown columns are ignored.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Module")]
    module: String,
    #[serde(rename = "Question_ID")]
    id: String,
    #[serde(rename = "Stem", default)]
    stem: String,
    #[serde(rename = "Response_A", default)]
    response_a: String,
    #[serde(rename = "Response_B", default)]
    response_b: String,
    #[serde(rename = "Response_C", default)]
    response_c: String,
    #[serde(rename = "Response_D", default)]
    response_d: String,
    #[serde(rename = "Justification_A", default)]
    justification_a: String,
    #[serde(rename = "Justification_B", default)]
    justification_b: String,
    #[serde(rename = "Justification_C", default)]
    justification_c: String,
    #[serde(rename = "Justification_D", default)]
    justification_d: String,
    /// Letter of the keyed response.
    #[serde(rename = "Correct", default)]
    correct: String,
    #[serde(rename = "Bloom_Cat", default)]
    bloom: String,
    #[serde(rename = "Reference", default)]
    reference: String,
    #[serde(rename = "IRT_a", default, deserialize_with = "csv::invalid_option")]
    a: Option<f64>,
    #[serde(rename = "IRT_b", default, deserialize_with = "csv::invalid_option")]
    b: Option<f64>,
    #[serde(rename = "IRT_c", default, deserialize_with = "csv::invalid_option")]
    c: Option<f64>,
}

const OPTION_LABELS: [&str; 4] = ["A", "B", "C", "D"];

impl CsvRow {
    fn into_raw(self) -> Result<RawItem> {
        let correct_index = match self.correct.as_str() {
            "" => None,
            label => Some(
                OPTION_LABELS
                    .iter()
                    .position(|l| l.eq_ignore_ascii_case(label))
                    .with_context(|| {
                        format!("item {}: Correct must be one of A-D, got {label:?}", self.id)
                    })?,
            ),
        };

        let mut options = vec![self.response_a, self.response_b, self.response_c, self.response_d];
        while options.last().is_some_and(|o| o.is_empty()) {
            options.pop();
        }

        let justifications: serde_json::Map<String, serde_json::Value> = OPTION_LABELS
            .iter()
            .zip([
                self.justification_a,
                self.justification_b,
                self.justification_c,
                self.justification_d,
            ])
            .filter(|(_, text)| !text.is_empty())
            .map(|(label, text)| (label.to_string(), serde_json::Value::String(text)))
            .collect();

        let mut metadata = BTreeMap::new();
        metadata.insert("module".to_string(), self.module.clone().into());
        if !justifications.is_empty() {
            metadata.insert("justifications".to_string(), justifications.into());
        }
        if !self.bloom.is_empty() {
            metadata.insert("bloom".to_string(), self.bloom.into());
        }
        if !self.reference.is_empty() {
            metadata.insert("reference".to_string(), self.reference.into());
        }

        Ok(RawItem {
            id: self.id,
            skill: self.module,
            stem: self.stem,
            options,
            correct_index,
            a: self.a,
            b: self.b,
            c: self.c,
            metadata,
        })
    }
}

/// Parse a question sheet into an `ItemBank`.
///
/// Each row is one item: `Module` is the skill, `Response_A`..`Response_D`
/// the options, `IRT_a`/`IRT_b`/`IRT_c` the parameters. Justifications,
/// `Bloom_Cat` and `Reference` land in the item metadata. The bank id is the
/// file stem.
pub fn parse_bank_csv_str(content: &str, source_path: &Path) -> Result<ItemBank> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut items = Vec::new();
    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        // Row 1 is the header.
        let row = row.with_context(|| {
            format!("failed to parse CSV row {} in {}", index + 2, source_path.display())
        })?;
        items.push(
            row.into_raw()
                .with_context(|| format!("invalid row in {}", source_path.display()))?,
        );
    }

    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parsed = BankFile {
        bank: BankHeader {
            id: stem.clone(),
            name: stem,
            description: String::new(),
        },
        items,
    };
    ItemBank::from_file(parsed, source_path)
}

/// Recursively load all `.toml`, `.json` and `.csv` bank files from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<ItemBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path
            .extension()
            .is_some_and(|ext| ext == "toml" || ext == "json" || ext == "csv")
        {
            match parse_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// Load a bank from a file, or merge every bank found under a directory.
pub fn load_bank(path: &Path) -> Result<ItemBank> {
    if path.is_dir() {
        let banks = load_bank_directory(path)?;
        if banks.is_empty() {
            anyhow::bail!("no item banks found in {}", path.display());
        }
        Ok(ItemBank::merge(banks))
    } else {
        parse_bank(path)
    }
}

/// A warning from bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The item ID (if applicable).
    pub item_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a bank for common authoring issues.
pub fn validate_bank(bank: &ItemBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let warn = |warnings: &mut Vec<ValidationWarning>, item: &Item, message: String| {
        warnings.push(ValidationWarning {
            item_id: Some(item.item_id.clone()),
            message,
        });
    };

    for id in &bank.skipped {
        warnings.push(ValidationWarning {
            item_id: Some(id.clone()),
            message: "missing IRT parameters; item skipped".into(),
        });
    }

    let mut seen_ids = HashSet::new();
    for item in &bank.items {
        if !seen_ids.insert(&item.item_id) {
            warn(&mut warnings, item, format!("duplicate item ID: {}", item.item_id));
        }
    }

    for item in &bank.items {
        if item.stem.trim().is_empty() {
            warn(&mut warnings, item, "stem is empty".into());
        }
        if item.options.len() < 2 {
            warn(
                &mut warnings,
                item,
                format!("only {} option(s); expected at least 2", item.options.len()),
            );
        }
        match item.correct_index {
            None => warn(&mut warnings, item, "no correct_index; answers cannot be graded".into()),
            Some(idx) if idx >= item.options.len() => warn(
                &mut warnings,
                item,
                format!("correct_index {idx} is out of range"),
            ),
            Some(_) => {}
        }

        let p = &item.params;
        if p.a > 4.0 {
            warn(&mut warnings, item, format!("discrimination a = {} is unusually high", p.a));
        }
        if p.b.abs() > 4.0 {
            warn(&mut warnings, item, format!("difficulty b = {} is outside [-4, 4]", p.b));
        }
        if p.c >= 0.5 {
            warn(&mut warnings, item, format!("guessing c = {} is unusually high", p.c));
        }
    }

    warnings
}
