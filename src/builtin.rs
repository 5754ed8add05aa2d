//! Reference collaborators used by the `shardflow` binary.
//!
//! A document is plain text where each line reads `subject relation object...`.
//! These collaborators exist so the pipeline runs end to end; they carry no
//! domain knowledge beyond string normalization.

use crate::collaborator::{Consolidator, Extractor};
use crate::error::{CollaboratorError, ExtractError};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::io;
use std::path::Path;

pub const GROUNDING_NAMESPACE: &str = "TEXT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// File name of the document the statement came from.
    pub source: String,
    pub subject: String,
    pub relation: String,
    pub object: String,
    pub subject_id: Option<String>,
    pub object_id: Option<String>,
    /// Number of raw statements merged into this one.
    pub evidence: u32,
}

impl Statement {
    pub fn new(source: impl Into<String>, subject: impl Into<String>, relation: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            subject: subject.into(),
            relation: relation.into(),
            object: object.into(),
            subject_id: None,
            object_id: None,
            evidence: 1,
        }
    }

    /// Parse one document line. `None` for lines with fewer than three tokens.
    pub fn parse_line(source: &str, line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let subject = tokens.next()?;
        let relation = tokens.next()?;
        let object = tokens.join(" ");
        if object.is_empty() {
            return None;
        }
        Some(Self::new(source, subject, relation, object))
    }

    fn merge_key(&self) -> (Option<String>, String, Option<String>) {
        (self.subject_id.clone(), self.relation.clone(), self.object_id.clone())
    }
}

/// Lowercased, punctuation-free form of an entity name with single spaces.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .join(" ")
}

pub fn ground_name(name: &str) -> String {
    format!("{}:{}", GROUNDING_NAMESPACE, normalize_name(name))
}

pub fn canonical_relation(relation: &str) -> String {
    relation
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LineExtractor;

impl Extractor<Statement> for LineExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Statement>, ExtractError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !path.parent().is_some_and(Path::is_dir) => {
                return Err(ExtractError::EngineUnavailable(format!(
                    "input directory of {} is gone",
                    path.display()
                )));
            }
            Err(e) => return Err(ExtractError::FileFailed(e.to_string())),
        };
        let text = String::from_utf8(bytes).map_err(|e| ExtractError::FileFailed(e.to_string()))?;

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(text
            .lines()
            .filter_map(|line| Statement::parse_line(&source, line))
            .collect())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceConsolidator;

impl Consolidator<Statement> for ReferenceConsolidator {
    fn ground(&self, records: Vec<Statement>) -> Result<Vec<Statement>, CollaboratorError> {
        Ok(records
            .into_iter()
            .map(|mut s| {
                s.subject_id = Some(ground_name(&s.subject));
                s.object_id = Some(ground_name(&s.object));
                s
            })
            .collect())
    }

    fn map_sequence(&self, records: Vec<Statement>) -> Result<Vec<Statement>, CollaboratorError> {
        Ok(records
            .into_iter()
            .map(|mut s| {
                s.relation = canonical_relation(&s.relation);
                s
            })
            .collect())
    }

    fn preassemble(&self, records: Vec<Statement>) -> Result<Vec<Statement>, CollaboratorError> {
        let mut merged: Vec<Statement> = Vec::with_capacity(records.len());
        let mut positions = HashMap::new();

        for statement in records {
            match positions.entry(statement.merge_key()) {
                Entry::Occupied(entry) => {
                    let kept: &mut Statement = &mut merged[*entry.get()];
                    kept.evidence = kept.evidence.saturating_add(statement.evidence);
                }
                Entry::Vacant(entry) => {
                    entry.insert(merged.len());
                    merged.push(statement);
                }
            }
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::Stage;

    #[test]
    fn test_parse_line() {
        let s = Statement::parse_line("a.xml", "  BRAF  phosphorylates MAP2K1 protein ").unwrap();
        assert_eq!(s.subject, "BRAF");
        assert_eq!(s.relation, "phosphorylates");
        assert_eq!(s.object, "MAP2K1 protein");
        assert_eq!(s.evidence, 1);

        assert!(Statement::parse_line("a.xml", "too short").is_none());
        assert!(Statement::parse_line("a.xml", "   ").is_none());
    }

    #[test]
    fn test_normalization() {
        assert_eq!(ground_name("  The  MEK-1, kinase. "), "TEXT:the mek1 kinase");
        assert_eq!(canonical_relation("Up-Regulates"), "up_regulates");
    }

    #[test]
    fn test_extract_reads_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("doc.xml");
        fs::write(&path, "a binds b\n\nnoise\nc inhibits d e\n").unwrap();

        let statements = LineExtractor.extract(&path).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].object, "d e");
        assert!(statements.iter().all(|s| s.source == "doc.xml"));
    }

    #[test]
    fn test_extract_classifies_failures() {
        let temp_dir = tempfile::tempdir().unwrap();
        let binary = temp_dir.path().join("bin.xml");
        fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(LineExtractor.extract(&binary), Err(ExtractError::FileFailed(_))));

        let missing = temp_dir.path().join("missing.xml");
        assert!(matches!(LineExtractor.extract(&missing), Err(ExtractError::FileFailed(_))));

        let gone = temp_dir.path().join("gone").join("x.xml");
        assert!(matches!(LineExtractor.extract(&gone), Err(ExtractError::EngineUnavailable(_))));
    }

    #[test]
    fn test_consolidation_merges_equivalent_statements() {
        let records = vec![
            Statement::new("a", "BRAF", "Up-Regulates", "MEK"),
            Statement::new("b", "x", "binds", "y"),
            Statement::new("c", "braf.", "up regulates", "mek"),
        ];

        let mut records = records;
        for stage in Stage::ALL {
            records = stage.apply(&ReferenceConsolidator, records).unwrap();
        }

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "a");
        assert_eq!(records[0].evidence, 2);
        assert_eq!(records[0].relation, "up_regulates");
        assert_eq!(records[0].subject_id.as_deref(), Some("TEXT:braf"));
        assert_eq!(records[1].evidence, 1);
    }
}
