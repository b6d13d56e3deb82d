//! Domain Models
//! Mission: Define the core entities of the deposition rehearsal backend
//!
//! Every tenant-owned row carries `firm_id` redundantly so authorization
//! filtering happens at query time rather than via database policies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant boundary. A firm owns its users and cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Firm {
    pub id: Uuid,
    pub name: String,
    pub retention_days: i64,
    pub created_at: DateTime<Utc>,
}

/// Case type drives prompt composition and detector context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseType {
    #[serde(rename = "MEDICAL_MALPRACTICE")]
    MedicalMalpractice,
    #[serde(rename = "EMPLOYMENT_DISCRIMINATION")]
    EmploymentDiscrimination,
    #[serde(rename = "COMMERCIAL_DISPUTE")]
    CommercialDispute,
    #[serde(rename = "CONTRACT_BREACH")]
    ContractBreach,
    #[serde(rename = "OTHER")]
    Other,
}

impl CaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseType::MedicalMalpractice => "MEDICAL_MALPRACTICE",
            CaseType::EmploymentDiscrimination => "EMPLOYMENT_DISCRIMINATION",
            CaseType::CommercialDispute => "COMMERCIAL_DISPUTE",
            CaseType::ContractBreach => "CONTRACT_BREACH",
            CaseType::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MEDICAL_MALPRACTICE" => Some(CaseType::MedicalMalpractice),
            "EMPLOYMENT_DISCRIMINATION" => Some(CaseType::EmploymentDiscrimination),
            "COMMERCIAL_DISPUTE" => Some(CaseType::CommercialDispute),
            "CONTRACT_BREACH" => Some(CaseType::ContractBreach),
            "OTHER" => Some(CaseType::Other),
            _ => None,
        }
    }
}

/// A case holds the free-text attack surface the agents draw from.
/// Canonical field names are `case_name` and `opposing_party`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub owner_id: Uuid,
    pub case_name: String,
    pub case_type: CaseType,
    pub opposing_party: String,
    pub deposition_date: Option<DateTime<Utc>>,
    pub extracted_facts: String,
    pub prior_statements: String,
    pub exhibit_list: String,
    pub focus_areas: String,
    pub default_aggression: Aggression,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WitnessRole {
    #[serde(rename = "DEFENDANT")]
    Defendant,
    #[serde(rename = "PLAINTIFF")]
    Plaintiff,
    #[serde(rename = "EXPERT")]
    Expert,
    #[serde(rename = "CORPORATE_REPRESENTATIVE")]
    CorporateRepresentative,
    #[serde(rename = "OTHER")]
    Other,
}

impl WitnessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WitnessRole::Defendant => "DEFENDANT",
            WitnessRole::Plaintiff => "PLAINTIFF",
            WitnessRole::Expert => "EXPERT",
            WitnessRole::CorporateRepresentative => "CORPORATE_REPRESENTATIVE",
            WitnessRole::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEFENDANT" => Some(WitnessRole::Defendant),
            "PLAINTIFF" => Some(WitnessRole::Plaintiff),
            "EXPERT" => Some(WitnessRole::Expert),
            "CORPORATE_REPRESENTATIVE" => Some(WitnessRole::CorporateRepresentative),
            "OTHER" => Some(WitnessRole::Other),
            _ => None,
        }
    }
}

/// Witness under a case, with running progression counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Witness {
    pub id: Uuid,
    pub case_id: Uuid,
    pub firm_id: Uuid,
    pub name: String,
    pub role: WitnessRole,
    pub session_count: i64,
    pub latest_score: Option<i64>,
    pub baseline_score: Option<i64>,
    pub plateau: bool,
    pub created_at: DateTime<Utc>,
}

/// Session lifecycle. LOBBY is initial; COMPLETE and ABANDONED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "LOBBY")]
    Lobby,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "COMPLETE")]
    Complete,
    #[serde(rename = "ABANDONED")]
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Lobby => "LOBBY",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Paused => "PAUSED",
            SessionStatus::Complete => "COMPLETE",
            SessionStatus::Abandoned => "ABANDONED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOBBY" => Some(SessionStatus::Lobby),
            "ACTIVE" => Some(SessionStatus::Active),
            "PAUSED" => Some(SessionStatus::Paused),
            "COMPLETE" => Some(SessionStatus::Complete),
            "ABANDONED" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Abandoned)
    }
}

/// Pressure dial for the Interrogator. Legacy clients send Low/Medium/High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggression {
    #[serde(rename = "STANDARD")]
    Standard,
    #[serde(rename = "ELEVATED")]
    Elevated,
    #[serde(rename = "HIGH_STAKES")]
    HighStakes,
}

impl Aggression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggression::Standard => "STANDARD",
            Aggression::Elevated => "ELEVATED",
            Aggression::HighStakes => "HIGH_STAKES",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "STANDARD" | "LOW" => Some(Aggression::Standard),
            "ELEVATED" | "MEDIUM" | "MED" => Some(Aggression::Elevated),
            "HIGH_STAKES" | "HIGH" => Some(Aggression::HighStakes),
            _ => None,
        }
    }
}

/// A live or completed practice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub case_id: Uuid,
    pub witness_id: Uuid,
    pub firm_id: Uuid,
    pub attorney_id: Option<Uuid>,
    pub session_number: i64,
    pub status: SessionStatus,
    pub duration_minutes: i64,
    pub aggression: Aggression,
    pub focus_areas: Vec<String>,
    pub objection_copilot_enabled: bool,
    pub sentinel_enabled: bool,
    pub witness_token: Option<String>,
    pub witness_joined: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_pause_ms: i64,
    pub question_count: i64,
    pub session_score: Option<i64>,
    pub consistency_rate: Option<f64>,
    pub transcript_raw: Option<String>,
    /// Optional session-scoped retrieval namespace. Metadata only; every
    /// retrieval call scopes by `case_id`, never by this value.
    pub retrieval_namespace: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Wall-clock seconds elapsed since start, excluding accumulated pause.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        let Some(started) = self.started_at else {
            return 0;
        };
        let end = self.ended_at.unwrap_or(now);
        let raw = (end - started).num_seconds() - self.total_pause_ms / 1000;
        raw.max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "QUESTION")]
    Question,
    #[serde(rename = "ANSWER")]
    Answer,
    #[serde(rename = "ALERT_RAISED")]
    AlertRaised,
    #[serde(rename = "STATE_CHANGE")]
    StateChange,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Question => "QUESTION",
            EventType::Answer => "ANSWER",
            EventType::AlertRaised => "ALERT_RAISED",
            EventType::StateChange => "STATE_CHANGE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUESTION" => Some(EventType::Question),
            "ANSWER" => Some(EventType::Answer),
            "ALERT_RAISED" => Some(EventType::AlertRaised),
            "STATE_CHANGE" => Some(EventType::StateChange),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeakerRole {
    #[serde(rename = "INTERROGATOR")]
    Interrogator,
    #[serde(rename = "WITNESS")]
    Witness,
    #[serde(rename = "SYSTEM")]
    System,
}

impl SpeakerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::Interrogator => "INTERROGATOR",
            SpeakerRole::Witness => "WITNESS",
            SpeakerRole::System => "SYSTEM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INTERROGATOR" => Some(SpeakerRole::Interrogator),
            "WITNESS" => Some(SpeakerRole::Witness),
            "SYSTEM" => Some(SpeakerRole::System),
            _ => None,
        }
    }
}

/// Append-only child of a session. Totally ordered within a session by
/// (question_number, created_at).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub firm_id: Uuid,
    pub event_type: EventType,
    pub speaker_role: SpeakerRole,
    pub content: String,
    pub question_number: Option<i64>,
    pub audio_blob_key: Option<String>,
    pub duration_ms: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    #[serde(rename = "OBJECTION")]
    Objection,
    #[serde(rename = "INCONSISTENCY")]
    Inconsistency,
    #[serde(rename = "COMPOSURE")]
    Composure,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Objection => "OBJECTION",
            AlertType::Inconsistency => "INCONSISTENCY",
            AlertType::Composure => "COMPOSURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OBJECTION" => Some(AlertType::Objection),
            "INCONSISTENCY" => Some(AlertType::Inconsistency),
            "COMPOSURE" => Some(AlertType::Composure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "CONFIRMED")]
    Confirmed,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "PENDING",
            AlertStatus::Confirmed => "CONFIRMED",
            AlertStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(AlertStatus::Pending),
            "CONFIRMED" => Some(AlertStatus::Confirmed),
            "REJECTED" => Some(AlertStatus::Rejected),
            _ => None,
        }
    }
}

/// Objection category emitted by the classifier. Five categories only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectionCategory {
    #[serde(rename = "LEADING")]
    Leading,
    #[serde(rename = "HEARSAY")]
    Hearsay,
    #[serde(rename = "COMPOUND")]
    Compound,
    #[serde(rename = "ASSUMES_FACTS")]
    AssumesFacts,
    #[serde(rename = "SPECULATION")]
    Speculation,
}

impl ObjectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectionCategory::Leading => "LEADING",
            ObjectionCategory::Hearsay => "HEARSAY",
            ObjectionCategory::Compound => "COMPOUND",
            ObjectionCategory::AssumesFacts => "ASSUMES_FACTS",
            ObjectionCategory::Speculation => "SPECULATION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LEADING" => Some(ObjectionCategory::Leading),
            "HEARSAY" => Some(ObjectionCategory::Hearsay),
            "COMPOUND" => Some(ObjectionCategory::Compound),
            "ASSUMES_FACTS" => Some(ObjectionCategory::AssumesFacts),
            "SPECULATION" => Some(ObjectionCategory::Speculation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ImpeachmentRisk {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
}

impl ImpeachmentRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpeachmentRisk::Low => "LOW",
            ImpeachmentRisk::Medium => "MEDIUM",
            ImpeachmentRisk::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(ImpeachmentRisk::Low),
            "MEDIUM" => Some(ImpeachmentRisk::Medium),
            "HIGH" => Some(ImpeachmentRisk::High),
            _ => None,
        }
    }
}

/// Alert derived from an agent decision, owned by a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub session_id: Uuid,
    pub firm_id: Uuid,
    pub alert_type: AlertType,
    pub status: AlertStatus,
    pub confidence: f64,
    pub question_number: Option<i64>,
    pub current_quote: Option<String>,
    // OBJECTION fields; canonical rule key is `rule_id`
    pub rule_id: Option<String>,
    pub category: Option<ObjectionCategory>,
    pub explanation: Option<String>,
    // INCONSISTENCY fields
    pub prior_quote: Option<String>,
    pub prior_document_page: Option<i64>,
    pub prior_document_line: Option<i64>,
    pub impeachment_risk: Option<ImpeachmentRisk>,
    pub created_at: DateTime<Utc>,
}

/// Five-dimensional weakness map. All scores in [0, 100].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeaknessMap {
    pub composure: i64,
    pub tactical_discipline: i64,
    pub professionalism: i64,
    pub directness: i64,
    pub consistency: i64,
}

impl WeaknessMap {
    pub fn clamped(self) -> Self {
        Self {
            composure: self.composure.clamp(0, 100),
            tactical_discipline: self.tactical_discipline.clamp(0, 100),
            professionalism: self.professionalism.clamp(0, 100),
            directness: self.directness.clamp(0, 100),
            consistency: self.consistency.clamp(0, 100),
        }
    }
}

/// Zero-or-one coaching brief per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    pub id: Uuid,
    pub session_id: Uuid,
    pub firm_id: Uuid,
    pub witness_id: Uuid,
    pub session_score: i64,
    pub consistency_rate: f64,
    pub delta_vs_baseline: Option<i64>,
    pub confirmed_flags: i64,
    pub objection_count: i64,
    pub composure_alerts: i64,
    pub top_recommendations: Vec<String>,
    pub narrative_text: String,
    pub weakness_map: Option<WeaknessMap>,
    pub pdf_blob_key: Option<String>,
    pub share_token: Option<String>,
    pub share_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
