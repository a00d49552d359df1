use crate::utils::error::VisionError;
use crate::Result;
use std::borrow::Cow;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Class names, index-aligned with the model's output positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Loads one label per line; lines that are blank after trimming are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VisionError::ModelLoad(format!(
                "Label file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| VisionError::ModelLoad(format!("Failed to read labels: {}", e)))?;
        let table: LabelTable = content.parse()?;

        tracing::info!("Loaded {} labels from {}", table.len(), path.display());
        tracing::debug!("First labels: {:?}", table.labels.iter().take(5).collect::<Vec<_>>());
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Label for `index`, or a synthetic `Unknown(index)` when the table is too short.
    pub fn label_for(&self, index: usize) -> Cow<'_, str> {
        match self.get(index) {
            Some(label) => Cow::Borrowed(label),
            None => {
                tracing::warn!(
                    "Class index {} is outside the label table ({} labels); model and labels may not match",
                    index,
                    self.labels.len()
                );
                Cow::Owned(format!("Unknown({index})"))
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl FromStr for LabelTable {
    type Err = VisionError;

    fn from_str(content: &str) -> Result<Self> {
        let labels: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if labels.is_empty() {
            return Err(VisionError::ModelLoad("Label file contains no labels".to_string()));
        }
        Ok(Self::new(labels))
    }
}
