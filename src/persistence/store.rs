// Golden prompt store

use anyhow::{bail, Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::optimizer::{IterationRecord, OptimizationResult, Outcome, QualityScore};

const STANDARD_FILE: &str = "golden_prompt.txt";
const TIMESTAMPED_PREFIX: &str = "golden_prompt_";

/// Facts about a run written into the prompt file header.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub use_case: String,
    pub case_count: usize,
    /// Score written to the header (usually from a final validation pass)
    pub score: QualityScore,
}

/// Paths written by one save
#[derive(Debug, Clone)]
pub struct SavedPrompt {
    pub timestamped: PathBuf,
    pub standard: PathBuf,
    pub history: PathBuf,
}

#[derive(Serialize)]
struct HistoryFile<'a> {
    generated_at: String,
    metadata: &'a RunMetadata,
    outcome: Outcome,
    best_prompt: &'a str,
    best_score: QualityScore,
    history: &'a [IterationRecord],
}

/// Writes golden prompts and run history under one directory.
pub struct PromptStore {
    dir: PathBuf,
}

impl PromptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Write `golden_prompt_<ts>.txt` (with a `#` header), `golden_prompt.txt`
    /// (prompt only) and `history_<ts>.json`.
    pub fn save(&self, meta: &RunMetadata, result: &OptimizationResult) -> Result<SavedPrompt> {
        let now = Local::now();
        let stamp = now.format("%Y%m%d_%H%M%S").to_string();
        let prompt = result.best.as_str();

        let header = format!(
            "# Golden Prompt Generated on {}\n\
             # Use Case: {}\n\
             # Test Cases: {}\n\
             # Final Success Rate: {:.1}%\n\
             # Quality Score: {:.1}/100\n\
             # Outcome: {}\n\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            meta.use_case.replace(['\r', '\n'], " "),
            meta.case_count,
            meta.score.success_rate,
            meta.score.overall_quality,
            result.outcome,
        );

        let timestamped = self.dir.join(format!("{TIMESTAMPED_PREFIX}{stamp}.txt"));
        fs::write(&timestamped, format!("{header}{prompt}\n"))
            .with_context(|| format!("Failed to write {}", timestamped.display()))?;

        let standard = self.dir.join(STANDARD_FILE);
        fs::write(&standard, prompt)
            .with_context(|| format!("Failed to write {}", standard.display()))?;

        let history = self.dir.join(format!("history_{stamp}.json"));
        let record = HistoryFile {
            generated_at: now.to_rfc3339(),
            metadata: meta,
            outcome: result.outcome,
            best_prompt: prompt,
            best_score: result.best_score,
            history: &result.history,
        };
        let json = serde_json::to_string_pretty(&record).context("Failed to serialize run history")?;
        fs::write(&history, json)
            .with_context(|| format!("Failed to write {}", history.display()))?;

        tracing::info!(path = %timestamped.display(), "Saved golden prompt");
        Ok(SavedPrompt {
            timestamped,
            standard,
            history,
        })
    }
}

/// Newest `golden_prompt_*.txt` in `dir` by modification time, else
/// `dir/golden_prompt.txt` if present.
pub fn find_latest_golden_prompt(dir: &Path) -> Option<PathBuf> {
    let latest = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(TIMESTAMPED_PREFIX) && name.ends_with(".txt")
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path);

    latest.or_else(|| {
        let standard = dir.join(STANDARD_FILE);
        standard.is_file().then_some(standard)
    })
}

/// Read a prompt file, dropping the leading `#` metadata block and blank lines.
pub fn load_golden_prompt(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read golden prompt: {}", path.display()))?;

    let prompt: String = content
        .lines()
        .skip_while(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#')
        })
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = prompt.trim();

    if prompt.is_empty() {
        bail!(
            "Golden prompt file '{}' is empty. Run `golden-prompt optimize` to generate one.",
            path.display()
        );
    }
    Ok(prompt.to_string())
}
