//! Contracts of the external collaborators driven by the pipeline.
//!
//! The extraction engine and the three consolidation sub-stages are opaque to
//! the coordination layer. They are plugged in through these traits.

use crate::error::{CollaboratorError, ExtractError};
use crate::record::Record;
use std::fmt;
use std::path::Path;

/// Turns one input document into records.
pub trait Extractor<R: Record> {
    fn extract(&self, path: &Path) -> Result<Vec<R>, ExtractError>;
}

impl<R: Record, E: Extractor<R> + ?Sized> Extractor<R> for &E {
    fn extract(&self, path: &Path) -> Result<Vec<R>, ExtractError> {
        (**self).extract(path)
    }
}

/// The three consolidation sub-stages. They always run in the order
/// grounding, sequence-mapping, preassembly.
pub trait Consolidator<R: Record> {
    fn ground(&self, records: Vec<R>) -> Result<Vec<R>, CollaboratorError>;
    fn map_sequence(&self, records: Vec<R>) -> Result<Vec<R>, CollaboratorError>;
    fn preassemble(&self, records: Vec<R>) -> Result<Vec<R>, CollaboratorError>;
}

impl<R: Record, C: Consolidator<R> + ?Sized> Consolidator<R> for &C {
    fn ground(&self, records: Vec<R>) -> Result<Vec<R>, CollaboratorError> {
        (**self).ground(records)
    }

    fn map_sequence(&self, records: Vec<R>) -> Result<Vec<R>, CollaboratorError> {
        (**self).map_sequence(records)
    }

    fn preassemble(&self, records: Vec<R>) -> Result<Vec<R>, CollaboratorError> {
        (**self).preassemble(records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Grounding,
    Sequence,
    Preassembly,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Grounding, Stage::Sequence, Stage::Preassembly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Grounding => "grounding",
            Stage::Sequence => "sequence",
            Stage::Preassembly => "preassembly",
        }
    }

    pub fn apply<R: Record, C: Consolidator<R> + ?Sized>(
        &self,
        consolidator: &C,
        records: Vec<R>,
    ) -> Result<Vec<R>, CollaboratorError> {
        match self {
            Stage::Grounding => consolidator.ground(records),
            Stage::Sequence => consolidator.map_sequence(records),
            Stage::Preassembly => consolidator.preassemble(records),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consolidation runs once per worker over its own records and once more on
/// the master over the union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Local,
    Final,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Local => "local",
            Phase::Final => "final",
        }
    }

    /// Key used for the stage's checkpoint file and its statistics column.
    pub fn stage_key(&self, stage: Stage) -> String {
        format!("{}_consolidation_{}", self.as_str(), stage.as_str())
    }

    pub fn total_key(&self) -> String {
        format!("{}_consolidation_total", self.as_str())
    }

    /// Name of the consolidated output file.
    pub fn output_file(&self) -> String {
        format!("{}_consolidation.json", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tagger;

    impl Consolidator<String> for Tagger {
        fn ground(&self, records: Vec<String>) -> Result<Vec<String>, CollaboratorError> {
            Ok(records.into_iter().map(|r| format!("{r}+g")).collect())
        }

        fn map_sequence(&self, records: Vec<String>) -> Result<Vec<String>, CollaboratorError> {
            Ok(records.into_iter().map(|r| format!("{r}+s")).collect())
        }

        fn preassemble(&self, records: Vec<String>) -> Result<Vec<String>, CollaboratorError> {
            Ok(records.into_iter().map(|r| format!("{r}+p")).collect())
        }
    }

    #[test]
    fn test_stage_apply_dispatches_in_declared_order() {
        let mut records = vec!["x".to_string()];
        for stage in Stage::ALL {
            records = stage.apply(&Tagger, records).unwrap();
        }
        assert_eq!(records, vec!["x+g+s+p"]);
    }

    #[test]
    fn test_phase_keys() {
        assert_eq!(Phase::Local.stage_key(Stage::Grounding), "local_consolidation_grounding");
        assert_eq!(Phase::Final.total_key(), "final_consolidation_total");
        assert_eq!(Phase::Final.output_file(), "final_consolidation.json");
    }
}
