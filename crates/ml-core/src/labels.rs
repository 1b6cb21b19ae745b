use std::{
    borrow::Cow,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};

/// Class-id to label mapping for a detection model.
#[derive(Debug, Clone, Default)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Empty mapping; every id falls back to `class{N}`.
    pub fn generic() -> Self {
        Self::default()
    }

    /// Read one label per line, skipping blank lines.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut names = Vec::new();
        for line in reader.lines() {
            let line = line.context("failed to read labels")?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                names.push(trimmed.to_string());
            }
        }
        Ok(Self { names })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open labels file {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Label for `class_id`, or a generic `class{N}` name for unknown ids.
    pub fn name(&self, class_id: i64) -> Cow<'_, str> {
        usize::try_from(class_id)
            .ok()
            .and_then(|idx| self.names.get(idx))
            .map(|name| Cow::Borrowed(name.as_str()))
            .unwrap_or_else(|| Cow::Owned(format!("class{class_id}")))
    }
}
