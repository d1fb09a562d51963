use crate::service::ModelLoadError;
use std::path::Path;

/// Reduces a raw model label to its canonical display text.
///
/// Labels often carry synonyms ("rose, flower"); only the first one is kept.
pub fn canonical_label(raw: &str) -> String {
    raw.split(',').next().unwrap_or_default().trim().to_string()
}

/// Parses a label list, one label per line, skipping blank lines
pub fn parse_labels(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Loads the label list that belongs to the model
pub fn load_labels(path: &Path) -> Result<Vec<String>, ModelLoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ModelLoadError::Labels(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let labels = parse_labels(&content);
    if labels.is_empty() {
        return Err(ModelLoadError::Labels(format!(
            "No labels found in {}",
            path.display()
        )));
    }

    log::debug!("Loaded {} labels from {}", labels.len(), path.display());
    Ok(labels)
}

/// Checks that the model emits one score per label, optionally preceded by a
/// background class
pub fn check_label_count(classes: usize, labels: usize) -> Result<(), ModelLoadError> {
    if classes == labels || classes == labels + 1 {
        return Ok(());
    }
    Err(ModelLoadError::Model(format!(
        "model has {} output classes but {} labels were loaded",
        classes, labels
    )))
}
