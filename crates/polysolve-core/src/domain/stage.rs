//! Controller stages.

use serde::{Deserialize, Serialize};

/// States of the pipeline controller, in execution order.
///
/// `Failed` is terminal and reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    RoleIdentification,
    PromptGeneration,
    EvidenceCollection,
    Aggregation,
    FactCheck,
    Refinement,
    Formatting,
    Done,
    Failed,
}

impl Stage {
    /// The stage that follows on success, `None` for terminal stages.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Intake => Some(Stage::RoleIdentification),
            Stage::RoleIdentification => Some(Stage::PromptGeneration),
            Stage::PromptGeneration => Some(Stage::EvidenceCollection),
            Stage::EvidenceCollection => Some(Stage::Aggregation),
            Stage::Aggregation => Some(Stage::FactCheck),
            Stage::FactCheck => Some(Stage::Refinement),
            Stage::Refinement => Some(Stage::Formatting),
            Stage::Formatting => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::RoleIdentification => "role_identification",
            Stage::PromptGeneration => "prompt_generation",
            Stage::EvidenceCollection => "evidence_collection",
            Stage::Aggregation => "aggregation",
            Stage::FactCheck => "fact_check",
            Stage::Refinement => "refinement",
            Stage::Formatting => "formatting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
