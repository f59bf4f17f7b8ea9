//! Role identification.
//!
//! Asks the text-generation capability which kinds of expertise a problem
//! needs, parses the answer, and normalizes it into an ordered, deduplicated
//! list of at most K roles. Never yields an empty list: when nothing usable
//! comes back, a single generalist role stands in.

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::capability::{call_with_retry, CancelSignal, TextGenerator};
use crate::config::PipelineConfig;
use crate::domain::{
    normalize_role_name, Diagnostic, DiagnosticKind, ProblemStatement, Role, RoleId, Stage,
};

/// Marker line opening every role-identification prompt.
pub const ROLE_IDENTIFICATION_TASK: &str = "TASK: IDENTIFY EXPERT ROLES";

/// Name of the role used when identification yields nothing.
pub const FALLBACK_ROLE_NAME: &str = "Generalist";

const FALLBACK_ROLE_RATIONALE: &str =
    "No specific expertise could be identified; covers the problem broadly.";

/// Longer "names" are sentences the parser mistook for list items.
const MAX_ROLE_NAME_CHARS: usize = 80;

/// A role as proposed by the generator, before ids and dedup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoleDraft {
    pub name: String,
    #[serde(default, alias = "reason", alias = "description")]
    pub rationale: String,
}

impl RoleDraft {
    pub fn new(name: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rationale: rationale.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoleListing {
    Bare(Vec<RoleDraft>),
    Wrapped { roles: Vec<RoleDraft> },
    Names(Vec<String>),
}

/// Roles plus whatever went wrong while producing them.
#[derive(Debug, Clone)]
pub struct RoleIdentification {
    pub roles: Vec<Role>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Prompt asking for up to `cap` expert roles.
pub fn role_identification_prompt(problem: &ProblemStatement, cap: usize) -> String {
    format!(
        "{ROLE_IDENTIFICATION_TASK}\n\
         Problem: {problem}\n\
         List at most {cap} distinct kinds of expertise needed to solve this problem, \
         most important first. Answer with a JSON array of objects with \"name\" and \
         \"rationale\" fields, or one bullet per role in the form \"- Name: rationale\".",
        problem = problem.text().trim(),
    )
}

/// Identify the roles for `problem`.
///
/// `prior_context` (e.g. a previous session summary) is passed to the
/// generator as conditioning context. Generation failures degrade to the
/// fallback role rather than failing the run.
#[instrument(skip_all, fields(cap = config.role_cap))]
pub async fn identify_roles(
    generator: &dyn TextGenerator,
    problem: &ProblemStatement,
    prior_context: Option<&str>,
    config: &PipelineConfig,
    cancel: &CancelSignal,
) -> RoleIdentification {
    let prompt = role_identification_prompt(problem, config.role_cap);
    let mut diagnostics = Vec::new();

    let drafts = match call_with_retry(&config.retry, cancel, "identify_roles", || {
        generator.generate(&prompt, prior_context)
    })
    .await
    {
        Ok(text) => parse_role_drafts(&text),
        Err(e) => {
            diagnostics.push(Diagnostic::warning(
                e.diagnostic_kind(),
                Stage::RoleIdentification,
                format!("role generation failed: {e}"),
            ));
            Vec::new()
        }
    };
    debug!(drafts = drafts.len(), "parsed role drafts");

    let (roles, normalized) = build_roles(drafts, config.role_cap);
    diagnostics.extend(normalized);
    RoleIdentification { roles, diagnostics }
}

/// Parse generator output into drafts, JSON first, then list items.
pub fn parse_role_drafts(text: &str) -> Vec<RoleDraft> {
    if let Ok(listing) = serde_json::from_str::<RoleListing>(strip_code_fence(text)) {
        return match listing {
            RoleListing::Bare(roles) | RoleListing::Wrapped { roles } => roles,
            RoleListing::Names(names) => names
                .into_iter()
                .map(|n| RoleDraft::new(n, ""))
                .collect(),
        };
    }
    text.lines().filter_map(parse_role_line).collect()
}

/// Dedup (case/whitespace-insensitive), cap at `cap`, assign ids, and fall
/// back to the generalist role when nothing survives.
pub fn build_roles(drafts: Vec<RoleDraft>, cap: usize) -> (Vec<Role>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut kept: Vec<RoleDraft> = Vec::new();

    for draft in drafts {
        let name = draft.name.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            continue;
        }
        if name.chars().count() > MAX_ROLE_NAME_CHARS {
            let preview: String = name.chars().take(40).collect();
            diagnostics.push(Diagnostic::info(
                DiagnosticKind::RoleNameRejected,
                Stage::RoleIdentification,
                format!("dropped role \"{preview}…\": name exceeds {MAX_ROLE_NAME_CHARS} characters"),
            ));
            continue;
        }
        if !seen.insert(normalize_role_name(&name)) {
            continue;
        }
        let rationale = match draft.rationale.trim() {
            "" => format!("Expertise as a {name} bears on the problem."),
            r => r.to_string(),
        };
        kept.push(RoleDraft::new(name, rationale));
    }

    if kept.len() > cap {
        diagnostics.push(Diagnostic::warning(
            DiagnosticKind::RolesTruncated,
            Stage::RoleIdentification,
            format!("kept the first {cap} of {} identified roles", kept.len()),
        ));
        kept.truncate(cap);
    }

    if kept.is_empty() {
        diagnostics.push(Diagnostic::info(
            DiagnosticKind::RoleIdentificationEmpty,
            Stage::RoleIdentification,
            format!("no usable roles identified; using the {FALLBACK_ROLE_NAME} role"),
        ));
        kept.push(RoleDraft::new(FALLBACK_ROLE_NAME, FALLBACK_ROLE_RATIONALE));
    }

    let roles = kept
        .into_iter()
        .zip(1u32..)
        .map(|(d, n)| Role::new(RoleId(n), d.name, d.rationale))
        .collect();
    (roles, diagnostics)
}

fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_role_line(line: &str) -> Option<RoleDraft> {
    let body = strip_list_marker(line.trim())?.replace("**", "");
    let (name, rationale) = split_name_rationale(body.trim());
    let name = name.trim().trim_end_matches(':').trim();
    if name.is_empty() {
        return None;
    }
    Some(RoleDraft::new(name, rationale.trim()))
}

fn strip_list_marker(line: &str) -> Option<&str> {
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return Some(rest);
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") "))
}

fn split_name_rationale(body: &str) -> (&str, &str) {
    for sep in [": ", " — ", " – ", " - "] {
        if let Some(split) = body.split_once(sep) {
            return split;
        }
    }
    if let (Some(open), true) = (body.find('('), body.ends_with(')')) {
        return (&body[..open], &body[open + 1..body.len() - 1]);
    }
    (body, "")
}
