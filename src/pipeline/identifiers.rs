//! Identifier list loading.

use snafu::prelude::*;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{NoIdentifiersSnafu, PipelineError, ReadIdentifiersSnafu};

/// Identifiers to request, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierList {
    pub ids: Vec<i64>,
    /// Non-blank lines that are not integers.
    pub malformed: Vec<String>,
}

/// Parse newline-delimited identifiers. Blank lines are ignored.
pub fn parse_identifiers(text: &str) -> IdentifierList {
    let mut list = IdentifierList::default();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<i64>() {
            Ok(id) => list.ids.push(id),
            Err(_) => {
                warn!("Skipping malformed identifier on line {}: {:?}", line_no + 1, line);
                list.malformed.push(line.to_string());
            }
        }
    }
    list
}

/// Read the identifier list. Fails when it is unreadable or has no valid
/// identifiers.
pub async fn load_identifiers(path: &Path) -> Result<IdentifierList, PipelineError> {
    let display = path.display().to_string();
    let text = tokio::fs::read_to_string(path)
        .await
        .context(ReadIdentifiersSnafu { path: &display })?;

    let list = parse_identifiers(&text);
    ensure!(!list.ids.is_empty(), NoIdentifiersSnafu { path: display });

    info!("Loaded {} identifiers from {}", list.ids.len(), path.display());
    Ok(list)
}
