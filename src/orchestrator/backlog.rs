//! Backlog task files under `<project>/.agent/tasks/`.
//!
//! Files are named `TASK-<nn>-<slug>.md`, start with a `# TASK-<nn>: Title`
//! heading and may carry a `Status:` line.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::Result;

/// A task file from the backlog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogTask {
    /// Canonical identifier, e.g. `TASK-07`.
    pub id: String,
    /// Heading title.
    pub title: String,
    /// Value of the `Status:` line, if present.
    pub status: Option<String>,
    /// Full file content.
    pub body: String,
    /// Source file.
    pub path: PathBuf,
}

impl BacklogTask {
    /// Description handed to the executor.
    #[must_use]
    pub fn description(&self) -> String {
        format!("{}: {}\n\n{}", self.id, self.title, self.body.trim())
    }
}

/// Reader over a backlog directory.
#[derive(Debug, Clone)]
pub struct Backlog {
    dir: PathBuf,
    reference: Option<Regex>,
    bare_number: Option<Regex>,
}

impl Backlog {
    /// Backlog rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            reference: Regex::new(r"(?i)(?:\btask[- ]?|#)(\d{1,4})\b").ok(),
            bare_number: Regex::new(r"^\d{1,4}$").ok(),
        }
    }

    /// Directory being read.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Extract a zero-padded task number from free-form text.
    ///
    /// Accepts `07`, `7`, `task 07`, `task-07`, `TASK-07` and `#07`.
    #[must_use]
    pub fn parse_reference(&self, text: &str) -> Option<String> {
        let text = text.trim();
        let digits = if self.bare_number.as_ref().is_some_and(|re| re.is_match(text)) {
            text.to_owned()
        } else {
            self.reference
                .as_ref()?
                .captures(text)?
                .get(1)?
                .as_str()
                .to_owned()
        };
        let number: u32 = digits.parse().ok()?;
        Some(format!("{number:02}"))
    }

    /// Load the backlog task numbered `number`.
    ///
    /// Numbers compare by value, so `3`, `03` and a `TASK-3-*.md` file all match.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) if the directory exists
    /// but cannot be read.
    pub async fn find(&self, number: &str) -> Result<Option<BacklogTask>> {
        let Ok(wanted) = number.trim().parse::<u32>() else {
            return Ok(None);
        };
        for path in self.task_files().await? {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem_number(stem) == Some(wanted) {
                return Ok(Some(load(&path, &stem_id(stem)).await?));
            }
        }
        Ok(None)
    }

    /// Resolve a reference embedded in `text`, if any.
    ///
    /// Unreadable directories and unknown numbers resolve to `None`.
    pub async fn resolve(&self, text: &str) -> Option<BacklogTask> {
        let number = self.parse_reference(text)?;
        match self.find(&number).await {
            Ok(found) => found,
            Err(err) => {
                debug!(%err, "backlog lookup failed");
                None
            }
        }
    }

    /// Every task in the backlog, sorted by task number.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) if the directory exists
    /// but cannot be read.
    pub async fn list(&self) -> Result<Vec<BacklogTask>> {
        let mut tasks = Vec::new();
        for path in self.task_files().await? {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let number = stem_number(stem).unwrap_or(u32::MAX);
            tasks.push((number, load(&path, &stem_id(stem)).await?));
        }
        tasks.sort_by(|(a_num, a), (b_num, b)| a_num.cmp(b_num).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks.into_iter().map(|(_, task)| task).collect())
    }

    async fn task_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_task = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| {
                    let upper = n.to_ascii_uppercase();
                    upper.starts_with("TASK-") && upper.ends_with(".MD")
                });
            if is_task {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

async fn load(path: &Path, id: &str) -> Result<BacklogTask> {
    let body = tokio::fs::read_to_string(path).await?;
    let title = body
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|heading| {
            heading
                .split_once(':')
                .map_or(heading, |(_, title)| title)
                .trim()
                .to_owned()
        })
        .unwrap_or_default();
    let status = body.lines().find_map(status_value);
    Ok(BacklogTask {
        id: id.to_owned(),
        title,
        status,
        body,
        path: path.to_path_buf(),
    })
}

/// `TASK-07-slug` → `TASK-07`.
fn stem_id(stem: &str) -> String {
    stem.to_ascii_uppercase()
        .split('-')
        .take(2)
        .collect::<Vec<_>>()
        .join("-")
}

/// Numeric part of a `TASK-<n>-slug` file stem.
fn stem_number(stem: &str) -> Option<u32> {
    let upper = stem.to_ascii_uppercase();
    let digits: String = upper
        .strip_prefix("TASK-")?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Value of a `Status: x` line, also in `**Status**: x`, `**Status:** x`
/// and `- status: x` forms.
fn status_value(line: &str) -> Option<String> {
    let (key, value) = line.split_once(':')?;
    let key = key
        .trim()
        .trim_start_matches('-')
        .trim()
        .trim_matches(['*', '_']);
    if !key.eq_ignore_ascii_case("status") {
        return None;
    }
    let value = value.trim().trim_matches(['*', '_']).trim();
    (!value.is_empty()).then(|| value.to_owned())
}
