//! Evidence vocabulary: `Source`, `Claim`, `EvidenceBag`, `EvidenceSet`.

use serde::{Deserialize, Serialize};

use super::role::RoleId;

/// A source record backing a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// URI or other stable identifier of the source.
    pub uri: String,
    pub snippet: String,
}

/// Identifier of a claim: the producing role plus a 1-based sequence number.
///
/// Rendered as `R<role>-C<seq>`; generated text cites a claim with the marker
/// `[R<role>-C<seq>]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClaimId {
    pub role: RoleId,
    pub seq: u32,
}

impl ClaimId {
    pub fn new(role: RoleId, seq: u32) -> Self {
        Self { role, seq }
    }

    /// Inline citation marker for this claim.
    pub fn marker(&self) -> String {
        format!("[{self}]")
    }

    /// Parse the `R<role>-C<seq>` form.
    pub fn parse(s: &str) -> Option<Self> {
        let (role, seq) = s.trim().split_once('-')?;
        let role = role.strip_prefix('R')?.parse().ok()?;
        let seq = seq.strip_prefix('C')?.parse().ok()?;
        Some(Self::new(RoleId(role), seq))
    }
}

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-C{}", self.role, self.seq)
    }
}

impl TryFrom<String> for ClaimId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ClaimId::parse(&s).ok_or_else(|| format!("invalid claim id: {s}"))
    }
}

impl From<ClaimId> for String {
    fn from(id: ClaimId) -> Self {
        id.to_string()
    }
}

/// A discrete factual assertion attributed to the role whose research found it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub role_id: RoleId,
    pub text: String,
    /// Ordered supporting sources; the first is the primary source.
    pub sources: Vec<Source>,
    /// Initial confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Claim {
    pub fn new(id: ClaimId, text: impl Into<String>, sources: Vec<Source>, confidence: f64) -> Self {
        Self {
            id,
            role_id: id.role,
            text: text.into(),
            sources,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Outcome of one role's evidence collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BagStatus {
    Ok,
    Degraded,
    Failed,
}

impl std::fmt::Display for BagStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BagStatus::Ok => "ok",
            BagStatus::Degraded => "degraded",
            BagStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-role evidence, owned by its collector task until aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBag {
    pub role_id: RoleId,
    pub claims: Vec<Claim>,
    pub status: BagStatus,
    pub diagnostic: Option<String>,
}

impl EvidenceBag {
    /// A bag for a role whose collection produced nothing usable.
    pub fn failed(role_id: RoleId, diagnostic: impl Into<String>) -> Self {
        Self {
            role_id,
            claims: Vec::new(),
            status: BagStatus::Failed,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// All evidence bags of a run, in role identification order.
///
/// Holds exactly one bag per role; a `Failed` bag carries no claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSet {
    bags: Vec<EvidenceBag>,
}

impl EvidenceSet {
    pub fn from_bags(bags: Vec<EvidenceBag>) -> Self {
        Self { bags }
    }

    pub fn bags(&self) -> &[EvidenceBag] {
        &self.bags
    }

    pub fn len(&self) -> usize {
        self.bags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bags.is_empty()
    }

    pub fn bag(&self, role_id: RoleId) -> Option<&EvidenceBag> {
        self.bags.iter().find(|b| b.role_id == role_id)
    }

    /// Every claim, in role order then collection order.
    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.bags.iter().flat_map(|b| b.claims.iter())
    }

    pub fn claim(&self, id: &ClaimId) -> Option<&Claim> {
        self.bag(id.role)?.claims.iter().find(|c| c.id == *id)
    }

    pub fn claim_count(&self) -> usize {
        self.bags.iter().map(|b| b.claims.len()).sum()
    }

    /// `true` when there is at least one bag and every bag failed.
    pub fn all_failed(&self) -> bool {
        !self.bags.is_empty() && self.bags.iter().all(|b| b.status == BagStatus::Failed)
    }
}
