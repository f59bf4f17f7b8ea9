//! Research prompt generation.

use serde::{Deserialize, Serialize};

use crate::domain::{ProblemStatement, Role, RoleId};

/// A role-specific research instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchPrompt {
    pub role_id: RoleId,
    pub text: String,
}

/// Build the research instruction for `role`.
///
/// Pure: the same role and problem always yield the same text. The role name
/// and rationale are carried verbatim, so roles differing in either get
/// distinct prompts.
pub fn generate_research_prompt(role: &Role, problem: &ProblemStatement) -> ResearchPrompt {
    let text = format!(
        "Research brief for the {name} ({id}).\n\
         Why this expertise matters: {rationale}\n\
         Problem: {problem}\n\
         Find statistics, case studies, benchmarks and established practice a {name} \
         would rely on for this problem. Report each finding as a single factual \
         statement with its source.",
        name = role.name,
        id = role.id,
        rationale = role.rationale,
        problem = problem.text().trim(),
    );
    ResearchPrompt {
        role_id: role.id,
        text,
    }
}

/// Search queries issued for one role: the full research prompt, then a
/// focused `"<role>: <problem>"` query. Capped at `max` queries.
pub fn research_queries(
    role: &Role,
    prompt: &ResearchPrompt,
    problem: &ProblemStatement,
    max: usize,
) -> Vec<String> {
    let focused = format!("{}: {}", role.name, problem.text().trim());
    let mut queries = vec![prompt.text.clone()];
    if focused != prompt.text {
        queries.push(focused);
    }
    queries.truncate(max);
    queries
}
