//! The `adaptest init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("adaptest.toml").exists() {
        println!("adaptest.toml already exists, skipping.");
    } else {
        std::fs::write("adaptest.toml", SAMPLE_CONFIG)?;
        println!("Created adaptest.toml");
    }

    std::fs::create_dir_all("banks")?;
    let example_path = std::path::Path::new("banks/example.toml");
    if example_path.exists() {
        println!("banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_BANK)?;
        println!("Created banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit banks/example.toml or add your own calibrated items");
    println!("  2. Run: adaptest validate --bank banks/example.toml");
    println!("  3. Run: adaptest simulate --bank banks/example.toml --true-theta Testing=0.5");
    println!("  4. Run: adaptest take --bank banks/example.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# adaptest configuration

max_items = 20
evict_finished = false
# What a spent [skill_max_items] budget does: "finish" the attempt or "retire" the skill
on_skill_budget = "finish"
# snapshot_dir = "${HOME}/.local/share/adaptest/snapshots"

[estimator]
type = "bayes_modal"
prior_mu = 0.0
prior_sigma2 = 1.0
lower = -4.0
upper = 4.0
max_iterations = 20
tolerance = 1e-6

[selector]
type = "max_info"
# type = "randomesque"
# top_k = 5
# seed = 0

[mastery]
default_threshold = 1.0  # or "none": only skills in [mastery.thresholds] can be mastered
retire_mastered = false

[mastery.thresholds]
# Testing = 0.8

[skill_max_items]
# Testing = 5
"#;

const EXAMPLE_BANK: &str = r#"[bank]
id = "example"
name = "Example Bank"
description = "A small calibrated bank to get started"

[[items]]
id = "ex-test-1"
skill = "Testing"
stem = "Which kind of test exercises a single function in isolation?"
options = ["Unit test", "Integration test", "System test", "Acceptance test"]
correct_index = 0
a = 1.1
b = -1.0
c = 0.2

[[items]]
id = "ex-test-2"
skill = "Testing"
stem = "A test double that returns canned answers is a"
options = ["Stub", "Spy", "Mock", "Dummy"]
correct_index = 0
a = 1.3
b = 0.2
c = 0.2

[[items]]
id = "ex-test-3"
skill = "Testing"
stem = "Which technique picks inputs at the edges of valid ranges?"
options = ["Equivalence partitioning", "Boundary value analysis", "Pairwise testing", "Fuzzing"]
correct_index = 1
a = 1.2
b = 1.0
c = 0.2

[[items]]
id = "ex-arch-1"
skill = "Architecture"
stem = "Which principle says a module should have one reason to change?"
options = ["Open/closed", "Single responsibility", "Liskov substitution", "Dependency inversion"]
correct_index = 1
a = 1.0
b = -0.8
c = 0.25

[[items]]
id = "ex-arch-2"
skill = "Architecture"
stem = "What does a message queue mainly provide between services?"
options = ["Encryption", "Temporal decoupling", "Schema validation", "Load balancing"]
correct_index = 1
a = 1.2
b = 0.3
c = 0.2

[[items]]
id = "ex-arch-3"
skill = "Architecture"
stem = "Event sourcing stores"
options = ["Only the latest state", "The sequence of state changes", "Only read models", "Configuration"]
correct_index = 1
a = 1.4
b = 1.2
c = 0.2
"#;
