//! Intermediate artifacts handed from one stage to the next.
//!
//! Every run writes into its own directory:
//! - `comments.txt`   scraped comments
//! - `translated.txt` original/translated pairs
//! - `result.txt`     human-readable sentiment report
//!
//! The directory is removed when the run ends, successfully or not.

use anyhow::Context;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::models::{AnalysisOutcome, IndexedComment, RawComment, TranslationRecord};

pub const SEPARATOR_WIDTH: usize = 80;

const ORIGINAL_PREFIX: &str = "Original:";
const ORIGINAL_TRANSLATION_PREFIX: &str = "Original Translation:";
const ENHANCED_PREFIX: &str = "Enhanced (English):";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Comments,
    Translations,
    Report,
}

impl Artifact {
    pub const ALL: [Artifact; 3] = [Artifact::Comments, Artifact::Translations, Artifact::Report];

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Comments => "comments.txt",
            Artifact::Translations => "translated.txt",
            Artifact::Report => "result.txt",
        }
    }
}

fn separator(width: usize, ch: char) -> String {
    std::iter::repeat(ch).take(width).collect()
}

fn is_separator(line: &str) -> bool {
    let line = line.trim_end();
    line.len() == SEPARATOR_WIDTH && line.chars().all(|c| c == '-')
}

fn is_comment_header(line: &str) -> bool {
    line.trim()
        .strip_prefix("Comment ")
        .and_then(|rest| rest.strip_suffix(':'))
        .is_some_and(|n| n.parse::<usize>().is_ok())
}

/// A separator only ends a comment block when the next block header (after
/// one blank line) or the end of the file follows it. Anything else is text.
fn closes_comment(lines: &[&str], i: usize) -> bool {
    if !is_separator(lines[i]) {
        return false;
    }
    match lines.get(i + 1) {
        None => true,
        Some(next) if next.trim().is_empty() => lines
            .get(i + 2)
            .map_or(true, |header| is_comment_header(header)),
        Some(_) => false,
    }
}

/// A separator only ends a translation block when an `N.` header or the end
/// of the file follows it.
fn closes_translation(lines: &[&str], i: usize) -> bool {
    is_separator(lines[i])
        && lines
            .get(i + 1)
            .map_or(true, |next| block_number(next).is_some())
}

// ============================================================================
// Comments (artifact 1)
// ============================================================================

pub fn render_comments(comments: &[RawComment]) -> String {
    let rule = separator(SEPARATOR_WIDTH, '-');
    let mut out = String::new();
    for (i, comment) in comments.iter().enumerate() {
        let n = i + 1;
        let _ = writeln!(out, "Comment {}:", n);
        let _ = writeln!(out, "{} {}", ORIGINAL_PREFIX, comment);
        let _ = writeln!(out, "{}", rule);
        if n < comments.len() {
            out.push('\n');
        }
    }
    out
}

/// Reads comments back. A block runs up to its closing separator line; its
/// text is everything after `Original:`, including continuation lines.
pub fn parse_comments(content: &str) -> Vec<IndexedComment> {
    let mut comments = Vec::new();
    let mut block = 0;
    let mut current: Option<Vec<&str>> = None;
    let lines: Vec<&str> = content.lines().collect();

    for (i, &line) in lines.iter().enumerate() {
        if closes_comment(&lines, i) {
            block += 1;
            push_comment(&mut comments, block, current.take());
            continue;
        }
        if let Some(lines) = current.as_mut() {
            lines.push(line);
        } else if let Some(rest) = line.trim_start().strip_prefix(ORIGINAL_PREFIX) {
            current = Some(vec![rest]);
        }
    }
    // Unterminated trailing block
    if current.is_some() {
        push_comment(&mut comments, block + 1, current.take());
    }

    comments
}

fn push_comment(comments: &mut Vec<IndexedComment>, index: usize, lines: Option<Vec<&str>>) {
    if let Some(lines) = lines {
        let text = lines.join("\n").trim().to_string();
        if !text.is_empty() {
            comments.push(IndexedComment { index, text });
        }
    }
}

// ============================================================================
// Translations (artifact 2)
// ============================================================================

pub fn render_translations(records: &[TranslationRecord], method: &str) -> String {
    let rule = separator(SEPARATOR_WIDTH, '-');
    let mut out = String::new();
    out.push_str("=== Enhanced Translation Results ===\n\n");
    let _ = writeln!(out, "Total Items Processed: {}", records.len());
    let _ = writeln!(out, "Processing Method: {}\n", method);

    for record in records {
        let _ = writeln!(out, "{}.", record.index);
        let _ = writeln!(out, "{} {}", ORIGINAL_TRANSLATION_PREFIX, record.original);
        let _ = writeln!(out, "{} {}", ENHANCED_PREFIX, record.translated);
        let _ = writeln!(out, "{}", rule);
    }
    out
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Original,
    Translated,
}

struct PendingRecord<'a> {
    index: usize,
    original: Vec<&'a str>,
    translated: Vec<&'a str>,
    field: Option<Field>,
}

fn block_number(line: &str) -> Option<usize> {
    line.trim().strip_suffix('.')?.parse().ok()
}

pub fn parse_translations(content: &str) -> Vec<TranslationRecord> {
    let mut records = Vec::new();
    let mut pending: Option<PendingRecord> = None;
    let lines: Vec<&str> = content.lines().collect();

    for (i, &line) in lines.iter().enumerate() {
        if closes_translation(&lines, i) {
            if let Some(p) = pending.take() {
                if p.field == Some(Field::Translated) {
                    records.push(TranslationRecord {
                        index: p.index,
                        original: p.original.join("\n").trim().to_string(),
                        translated: p.translated.join("\n").trim().to_string(),
                    });
                }
            }
            continue;
        }

        let Some(p) = pending.as_mut() else {
            if let Some(index) = block_number(line) {
                pending = Some(PendingRecord {
                    index,
                    original: Vec::new(),
                    translated: Vec::new(),
                    field: None,
                });
            }
            continue;
        };

        match p.field {
            Some(Field::Translated) => p.translated.push(line),
            _ if line.starts_with(ENHANCED_PREFIX) => {
                p.field = Some(Field::Translated);
                p.translated.push(&line[ENHANCED_PREFIX.len()..]);
            }
            Some(Field::Original) => p.original.push(line),
            None => {
                if let Some(rest) = line.strip_prefix(ORIGINAL_TRANSLATION_PREFIX) {
                    p.field = Some(Field::Original);
                    p.original.push(rest);
                }
            }
        }
    }

    records
}

// ============================================================================
// Report (artifact 3)
// ============================================================================

pub fn render_report(outcome: &AnalysisOutcome, analyzed_at: DateTime<Local>) -> String {
    let banner = separator(SEPARATOR_WIDTH, '=');
    let rule = separator(SEPARATOR_WIDTH, '-');
    let counts = &outcome.counts;
    let mut out = String::new();

    let _ = writeln!(out, "{}", banner);
    out.push_str("SENTIMENT ANALYSIS RESULTS\n");
    let _ = writeln!(out, "{}", banner);
    let _ = writeln!(out, "Analysis Date: {}", analyzed_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Total Statements: {}\n", outcome.results.len());

    out.push_str("SENTIMENT DISTRIBUTION SUMMARY:\n");
    let _ = writeln!(out, "{}", separator(40, '-'));
    let _ = writeln!(out, "Positive Sentiment: {}", counts.positive);
    let _ = writeln!(out, "Negative Sentiment: {}", counts.negative);
    let _ = writeln!(out, "Neutral Sentiment: {}", counts.neutral);
    let _ = writeln!(out, "Dropped Statements: {}", outcome.dropped);
    let _ = writeln!(out, "\n{}", banner);
    out.push_str("DETAILED RESULTS:\n");
    let _ = writeln!(out, "{}\n", banner);

    for result in &outcome.results {
        let _ = writeln!(out, "Statement {}:", result.index);
        let _ = writeln!(out, "Text: \"{}\"", result.text);
        let _ = writeln!(out, "Overall Sentiment: {}", result.sentiment);
        let _ = writeln!(out, "Confidence: {}%", result.confidence);
        let _ = writeln!(out, "Key Words: {}", result.key_words);
        let _ = writeln!(
            out,
            "Logic Applied: Direct sentiment analysis - {} sentiment detected",
            result.sentiment
        );
        let _ = writeln!(out, "{}\n", rule);
    }
    out
}

// ============================================================================
// Store
// ============================================================================

/// Per-run artifact directory. Dropping the store deletes everything in it.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    cleaned: bool,
}

impl ArtifactStore {
    pub fn create(root: &Path, run_id: &str) -> PipelineResult<Self> {
        let dir = root.join(run_id);
        fs::create_dir_all(&dir).map_err(|source| PipelineError::Artifact {
            path: dir.clone(),
            source,
        })?;
        debug!("📁 Artifact directory ready: {}", dir.display());
        Ok(Self { dir, cleaned: false })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    fn write(&self, artifact: Artifact, content: &str) -> PipelineResult<()> {
        let path = self.path(artifact);
        fs::write(&path, content).map_err(|source| PipelineError::Artifact { path, source })
    }

    fn read(&self, artifact: Artifact) -> anyhow::Result<String> {
        let path = self.path(artifact);
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))
    }

    pub fn write_comments(&self, comments: &[RawComment]) -> PipelineResult<()> {
        self.write(Artifact::Comments, &render_comments(comments))
    }

    pub fn read_comments(&self) -> anyhow::Result<Vec<IndexedComment>> {
        Ok(parse_comments(&self.read(Artifact::Comments)?))
    }

    pub fn write_translations(&self, records: &[TranslationRecord], method: &str) -> PipelineResult<()> {
        self.write(Artifact::Translations, &render_translations(records, method))
    }

    pub fn read_translations(&self) -> anyhow::Result<Vec<TranslationRecord>> {
        Ok(parse_translations(&self.read(Artifact::Translations)?))
    }

    pub fn write_report(&self, outcome: &AnalysisOutcome, analyzed_at: DateTime<Local>) -> PipelineResult<()> {
        self.write(Artifact::Report, &render_report(outcome, analyzed_at))
    }

    /// Best-effort removal of all artifacts and the run directory.
    pub fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        for artifact in Artifact::ALL {
            let path = self.path(artifact);
            match fs::remove_file(&path) {
                Ok(()) => debug!("🧹 Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("⚠️ Could not remove {}: {}", path.display(), e),
            }
        }
        if let Err(e) = fs::remove_dir(&self.dir) {
            debug!("Run directory {} not removed: {}", self.dir.display(), e);
        }
        self.cleaned = true;
    }
}

impl Drop for ArtifactStore {
    fn drop(&mut self) {
        self.cleanup();
    }
}
