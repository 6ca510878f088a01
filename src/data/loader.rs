// ============================================================
// Layer 4 — Feature Loader
// ============================================================
// Reads reading-comprehension features from a JSON Lines file:
// one `ReadingFeature` object per line, blank lines skipped.
//
//   {"unique_id": 1000000000, "word_ids": [101, ...], ...}
//   {"unique_id": 1000000001, "word_ids": [101, ...], ...}
//
// A malformed line is a hard error naming the line number; a
// silently dropped feature would leave a hole in the results.

use anyhow::{bail, Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use crate::domain::{feature::ReadingFeature, traits::FeatureSource};

pub struct JsonlFeatureLoader {
    path: PathBuf,
}

impl JsonlFeatureLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FeatureSource for JsonlFeatureLoader {
    fn load_all(&self) -> Result<Vec<ReadingFeature>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open feature file '{}'", self.path.display()))?;

        let mut features = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .with_context(|| format!("Cannot read '{}'", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }

            let feature: ReadingFeature = serde_json::from_str(&line).with_context(|| {
                format!("Bad feature on line {} of '{}'", i + 1, self.path.display())
            })?;
            if let Some(problem) = feature.consistency_error() {
                bail!("line {}: {}", i + 1, problem);
            }
            features.push(feature);
        }

        tracing::info!(
            "Loaded {} features from '{}'",
            features.len(),
            self.path.display()
        );
        Ok(features)
    }
}
