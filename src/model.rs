//! Domain model for case review.
//!
//! Everything here is plain data plus pure validation: remote calls and state
//! orchestration live in the sibling modules.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::ReviewError;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(CaseId);
typed_id!(PatientId);
typed_id!(SeriesId);
typed_id!(ImageId);
typed_id!(AnnotationId);
typed_id!(ReportId);
typed_id!(TemplateId);
typed_id!(RadiologistId);

/// Explicit timestamp unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        let ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self(ms)
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn is_before(self, other: Self) -> bool {
        self.0 < other.0
    }
}

// --- Workflow enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasePriority {
    High,
    Medium,
    Low,
}

impl CasePriority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyType {
    Mammogram,
    Ultrasound,
    Mri,
    Ct,
}

impl StudyType {
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Mammogram => "Mammogram",
            Self::Ultrasound => "Ultrasound",
            Self::Mri => "MRI",
            Self::Ct => "CT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CaseStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Referred,
}

impl CaseStatus {
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "pending" => Some(Self::Pending),
            "in-progress" | "inprogress" => Some(Self::InProgress),
            "completed" | "done" => Some(Self::Completed),
            "referred" => Some(Self::Referred),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Referred => "referred",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Referred => "Referred",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Referred)
    }

    /// Forward-only workflow; `Referred` is the escape hatch from any
    /// non-terminal status.
    #[must_use]
    pub fn valid_transitions(self) -> Vec<Self> {
        match self {
            Self::Pending => vec![Self::InProgress, Self::Referred],
            Self::InProgress => vec![Self::Completed, Self::Referred],
            Self::Completed | Self::Referred => vec![],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn validate_transition(self, to: Self) -> Result<(), TransitionError> {
        if self == to {
            return Err(TransitionError::SameStatus);
        }
        if self.is_terminal() {
            return Err(TransitionError::FromTerminalStatus { status: self });
        }
        if !self.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition { from: self, to });
        }
        Ok(())
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("case is already in that status")]
    SameStatus,
    #[error("cannot leave terminal status {status}")]
    FromTerminalStatus { status: CaseStatus },
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: CaseStatus, to: CaseStatus },
}

impl From<TransitionError> for ReviewError {
    fn from(e: TransitionError) -> Self {
        ReviewError::Validation(e.to_string())
    }
}

// --- BIRADS ---

/// BIRADS assessment category. Only the seven enumerated strings exist; there
/// is no numeric or free-form representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BiradsScore {
    #[default]
    #[serde(rename = "0")]
    Incomplete,
    #[serde(rename = "1")]
    Negative,
    #[serde(rename = "2")]
    Benign,
    #[serde(rename = "3")]
    ProbablyBenign,
    #[serde(rename = "4")]
    Suspicious,
    #[serde(rename = "5")]
    HighlySuggestive,
    #[serde(rename = "6")]
    KnownMalignancy,
}

impl BiradsScore {
    pub const ALL: [Self; 7] = [
        Self::Incomplete,
        Self::Negative,
        Self::Benign,
        Self::ProbablyBenign,
        Self::Suspicious,
        Self::HighlySuggestive,
        Self::KnownMalignancy,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incomplete => "0",
            Self::Negative => "1",
            Self::Benign => "2",
            Self::ProbablyBenign => "3",
            Self::Suspicious => "4",
            Self::HighlySuggestive => "5",
            Self::KnownMalignancy => "6",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.as_str() == s)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Incomplete => "Incomplete",
            Self::Negative => "Negative",
            Self::Benign => "Benign finding",
            Self::ProbablyBenign => "Probably benign",
            Self::Suspicious => "Suspicious abnormality",
            Self::HighlySuggestive => "Highly suggestive of malignancy",
            Self::KnownMalignancy => "Known biopsy-proven malignancy",
        }
    }
}

impl fmt::Display for BiradsScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Images & annotations ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("invalid image locator '{url}': {reason}")]
    Invalid { url: String, reason: String },
}

/// Validated http(s) locator for image and thumbnail resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageLocator(String);

impl ImageLocator {
    pub fn new(s: impl Into<String>) -> Result<Self, LocatorError> {
        let s = s.into();
        let parsed = Url::parse(&s).map_err(|e| LocatorError::Invalid {
            url: s.clone(),
            reason: e.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(LocatorError::Invalid {
                url: s,
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        Ok(Self(s))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Circle,
    Rectangle,
    Arrow,
    Text,
    Line,
    Polygon,
    Point,
}

impl AnnotationKind {
    pub const ALL: [Self; 7] = [
        Self::Circle,
        Self::Rectangle,
        Self::Arrow,
        Self::Text,
        Self::Line,
        Self::Polygon,
        Self::Point,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Measurements {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    /// Kind-dependent geometry in container-relative percentages;
    /// circle = `[x%, y%, radius]`.
    pub points: Vec<f64>,
    pub label: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurements: Option<Measurements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<RadiologistId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<UnixTimeMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<UnixTimeMs>,
}

/// Client-side annotation payload; the repository assigns id and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDraft {
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub points: Vec<f64>,
    pub label: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<RadiologistId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowLevel {
    pub center: f64,
    pub width: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DicomMetadata {
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub modality: String,
    #[serde(default)]
    pub body_part: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_thickness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kvp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_spacing: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalImage {
    pub id: ImageId,
    pub series_id: SeriesId,
    pub image_url: ImageLocator,
    pub thumbnail_url: ImageLocator,
    #[serde(default)]
    pub metadata: DicomMetadata,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub is_key_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_level: Option<WindowLevel>,
}

impl MedicalImage {
    /// Returns a copy of the image with the annotation appended to a freshly
    /// allocated list. The list is never pushed to in place so observers that
    /// compare snapshots see every mutation.
    #[must_use]
    pub fn with_annotation(&self, annotation: Annotation) -> Self {
        let mut annotations = Vec::with_capacity(self.annotations.len() + 1);
        annotations.extend(self.annotations.iter().cloned());
        annotations.push(annotation);
        Self {
            annotations,
            ..self.clone()
        }
    }

    /// Returns a copy with the annotation filtered out; unknown ids leave the
    /// image unchanged (idempotent delete).
    #[must_use]
    pub fn without_annotation(&self, annotation_id: &AnnotationId) -> Self {
        let annotations = self
            .annotations
            .iter()
            .filter(|a| &a.id != annotation_id)
            .cloned()
            .collect();
        Self {
            annotations,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_annotation_replaced(&self, annotation: Annotation) -> Self {
        let annotations = self
            .annotations
            .iter()
            .map(|a| {
                if a.id == annotation.id {
                    annotation.clone()
                } else {
                    a.clone()
                }
            })
            .collect();
        Self {
            annotations,
            ..self.clone()
        }
    }
}

// --- Cases ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientCase {
    pub id: CaseId,
    pub patient_id: PatientId,
    pub patient_name: String,
    pub age: u32,
    pub gender: Gender,
    pub priority: CasePriority,
    pub status: CaseStatus,
    pub study_type: StudyType,
    pub study_date: UnixTimeMs,
    pub due_date: UnixTimeMs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<RadiologistId>,
    #[serde(default)]
    pub images: Vec<MedicalImage>,
    /// Read-only prior studies for comparison; never mutated here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_studies: Vec<PatientCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referring_physician: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_changed_at: Option<UnixTimeMs>,
    pub created_at: UnixTimeMs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<UnixTimeMs>,
}

impl PatientCase {
    #[must_use]
    pub fn image(&self, image_id: &ImageId) -> Option<&MedicalImage> {
        self.images.iter().find(|i| &i.id == image_id)
    }

    /// Swaps an image value by id, used when its annotation list was replaced.
    pub fn replace_image(&mut self, image: MedicalImage) {
        if let Some(slot) = self.images.iter_mut().find(|i| i.id == image.id) {
            *slot = image;
        }
    }

    #[must_use]
    pub fn is_overdue(&self, now: UnixTimeMs) -> bool {
        !self.status.is_terminal() && self.due_date.is_before(now)
    }
}

// --- Reports ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub id: ReportId,
    pub case_id: CaseId,
    pub findings: String,
    pub impression: String,
    pub recommendations: String,
    pub birads_score: BiradsScore,
    pub is_final: bool,
    pub created_by: RadiologistId,
    pub created_at: UnixTimeMs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<UnixTimeMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<UnixTimeMs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTemplate {
    pub id: TemplateId,
    pub name: String,
    pub findings: String,
    pub impression: String,
    pub recommendations: String,
    pub birads_score: BiradsScore,
    pub created_by: RadiologistId,
    pub is_public: bool,
}

// --- List filter ---

/// Optional equality filters combined by AND; the empty filter matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasesFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CaseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<CasePriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_type: Option<StudyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<UnixTimeMs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<UnixTimeMs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<RadiologistId>,
}

impl CasesFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn matches(&self, case: &PatientCase) -> bool {
        if self.status.is_some_and(|s| s != case.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != case.priority) {
            return false;
        }
        if self.study_type.is_some_and(|t| t != case.study_type) {
            return false;
        }
        if self.date_from.is_some_and(|from| case.study_date.is_before(from)) {
            return false;
        }
        if self.date_to.is_some_and(|to| to.is_before(case.study_date)) {
            return false;
        }
        if let Some(assignee) = &self.assigned_to {
            if case.assigned_to.as_ref() != Some(assignee) {
                return false;
            }
        }
        true
    }

    #[must_use]
    pub fn with_status(mut self, status: CaseStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: CasePriority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_study_type(mut self, study_type: StudyType) -> Self {
        self.study_type = Some(study_type);
        self
    }

    #[must_use]
    pub fn with_assignee(mut self, radiologist: RadiologistId) -> Self {
        self.assigned_to = Some(radiologist);
        self
    }
}
