use serde::{Deserialize, Serialize};

/// Role description the user supplies for one screening run.
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    pub role_title: String,
    pub description: String,
    pub startup_context: String,
    pub company: String,
}

/// Outcome tier assigned to a candidate by the analysis service.
///
/// Four tiers are rendered, but only the Rejected / not-Rejected split
/// changes behavior anywhere. New code should branch on `is_rejection()`
/// instead of matching individual tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShortlistingCategory {
    #[serde(rename = "Strongly Shortlisted")]
    StronglyShortlisted,
    #[serde(rename = "Shortlisted")]
    Shortlisted,
    #[serde(rename = "Backup")]
    Backup,
    #[serde(rename = "Rejected")]
    Rejected,
}

impl ShortlistingCategory {
    pub fn is_rejection(&self) -> bool {
        matches!(self, ShortlistingCategory::Rejected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ShortlistingCategory::StronglyShortlisted => "Strongly Shortlisted",
            ShortlistingCategory::Shortlisted => "Shortlisted",
            ShortlistingCategory::Backup => "Backup",
            ShortlistingCategory::Rejected => "Rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEvaluation {
    pub summary: String,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub red_flags: Vec<String>,
    pub startup_fit: String,
    pub interview_questions: Vec<String>,
    pub email_subject: String,
    pub email_body: String,
}

/// One deduplicated applicant, as returned by the analysis service.
///
/// `id` is the sole join key used by selection and sent-tracking. `email`
/// may be empty when no address could be extracted from the resume; that is
/// a valid state, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub email: String,
    pub score: u32,
    pub category: ShortlistingCategory,
    pub filename: String,
    pub evaluation: CandidateEvaluation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub processed_count: u32,
    pub duplicate_count: u32,
    pub shortlisted_count: u32,
    pub rejected_count: u32,
    pub recommended_cutoff: u32,
}

/// Result of one analysis run. Immutable once received; a new run fully
/// replaces it or leaves it untouched on failure. Candidates keep the order
/// the service returned them in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: AnalysisSummary,
    pub candidates: Vec<Candidate>,
}
