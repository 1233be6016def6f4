//! Remote repository seam.
//!
//! [`CaseRepository`] is the only collaborator the controller talks to; real
//! shells implement it over their transport of choice. [`memory`] provides a
//! seedable in-process backend with latency and failure injection for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    Annotation, AnnotationDraft, AnnotationId, AnnotationPatch, BiradsScore, CaseId, CasePriority,
    CaseStatus, CasesFilter, DiagnosticReport, ImageId, PatientCase, RadiologistId, ReportId,
    ReportTemplate,
};
use crate::ReviewError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected status {code}: {message}")]
    Status { code: u16, message: String },
}

impl From<RemoteError> for ReviewError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::NotFound { entity, id } => ReviewError::not_found(entity, id),
            RemoteError::Transport(_) | RemoteError::Status { .. } => {
                ReviewError::Remote(e.to_string())
            }
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// One page of the case list; `total` counts all matches, not just this page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasesPage {
    pub cases: Vec<PatientCase>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStatistics {
    pub total_cases: u64,
    pub pending_cases: u64,
    pub in_progress_cases: u64,
    pub completed_cases: u64,
    pub high_priority_cases: u64,
    /// Mean hours from case creation to completion.
    pub average_completion_time: f64,
    /// Cases handled per day over the trailing week, oldest first.
    pub weekly_workload: Vec<u64>,
}

/// Payload for creating a report; the repository assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraftPayload {
    pub case_id: CaseId,
    pub findings: String,
    pub impression: String,
    pub recommendations: String,
    pub birads_score: BiradsScore,
    pub is_final: bool,
    pub created_by: RadiologistId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birads_score: Option<BiradsScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Docx,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

/// The remote case repository. Every controller operation that needs the
/// network goes through here and nowhere else.
#[async_trait]
pub trait CaseRepository: Send + Sync {
    async fn list_cases(
        &self,
        filter: &CasesFilter,
        page: u32,
        page_size: u32,
    ) -> RemoteResult<CasesPage>;

    async fn get_case(&self, id: &CaseId) -> RemoteResult<PatientCase>;

    async fn search_cases(&self, query: &str) -> RemoteResult<Vec<PatientCase>>;

    async fn assign_case(
        &self,
        case_id: &CaseId,
        radiologist: &RadiologistId,
    ) -> RemoteResult<PatientCase>;

    async fn update_case_status(
        &self,
        case_id: &CaseId,
        status: CaseStatus,
    ) -> RemoteResult<PatientCase>;

    async fn update_case_priority(
        &self,
        case_id: &CaseId,
        priority: CasePriority,
    ) -> RemoteResult<PatientCase>;

    async fn get_report(&self, case_id: &CaseId) -> RemoteResult<Option<DiagnosticReport>>;

    async fn create_report(&self, draft: &ReportDraftPayload) -> RemoteResult<DiagnosticReport>;

    async fn update_report(
        &self,
        report_id: &ReportId,
        patch: &ReportPatch,
    ) -> RemoteResult<DiagnosticReport>;

    /// Superseded versions of the case's report, oldest first.
    async fn report_history(&self, case_id: &CaseId) -> RemoteResult<Vec<DiagnosticReport>>;

    async fn list_report_templates(&self) -> RemoteResult<Vec<ReportTemplate>>;

    async fn add_annotation(
        &self,
        case_id: &CaseId,
        image_id: &ImageId,
        draft: &AnnotationDraft,
    ) -> RemoteResult<Annotation>;

    async fn update_annotation(
        &self,
        case_id: &CaseId,
        image_id: &ImageId,
        annotation_id: &AnnotationId,
        patch: &AnnotationPatch,
    ) -> RemoteResult<Annotation>;

    async fn delete_annotation(
        &self,
        case_id: &CaseId,
        image_id: &ImageId,
        annotation_id: &AnnotationId,
    ) -> RemoteResult<()>;

    async fn export_report(&self, case_id: &CaseId, format: ExportFormat) -> RemoteResult<Vec<u8>>;

    async fn dashboard_statistics(&self) -> RemoteResult<DashboardStatistics>;
}

pub mod memory {
    //! Seedable in-process repository backing the integration tests.

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::{
        CaseRepository, CasesPage, DashboardStatistics, ExportFormat, RemoteError, RemoteResult,
        ReportDraftPayload, ReportPatch,
    };
    use crate::model::{
        Annotation, AnnotationDraft, AnnotationId, AnnotationPatch, CaseId, CasePriority,
        CaseStatus, CasesFilter, DiagnosticReport, ImageId, PatientCase, RadiologistId, ReportId,
        ReportTemplate, UnixTimeMs,
    };

    #[derive(Default)]
    struct State {
        cases: Vec<PatientCase>,
        reports: Vec<DiagnosticReport>,
        history: Vec<DiagnosticReport>,
        templates: Vec<ReportTemplate>,
        statistics: DashboardStatistics,
        calls: HashMap<&'static str, usize>,
        fail_next: HashMap<&'static str, RemoteError>,
        case_latency: HashMap<CaseId, Duration>,
        op_latency: HashMap<&'static str, Duration>,
    }

    /// In-memory [`CaseRepository`]. Latency injection keys off the case id or
    /// the operation name so tests can make an older selection's response
    /// arrive after a newer one.
    #[derive(Default)]
    pub struct InMemoryRepository {
        state: Mutex<State>,
    }

    impl InMemoryRepository {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn with_cases(self, cases: Vec<PatientCase>) -> Self {
            self.lock().cases = cases;
            self
        }

        #[must_use]
        pub fn with_templates(self, templates: Vec<ReportTemplate>) -> Self {
            self.lock().templates = templates;
            self
        }

        #[must_use]
        pub fn with_statistics(self, statistics: DashboardStatistics) -> Self {
            self.lock().statistics = statistics;
            self
        }

        #[must_use]
        pub fn with_reports(self, reports: Vec<DiagnosticReport>) -> Self {
            self.lock().reports = reports;
            self
        }

        /// The next call to `op` fails with `error` and clears the injection.
        pub fn fail_next(&self, op: &'static str, error: RemoteError) {
            self.lock().fail_next.insert(op, error);
        }

        /// Delays every `get_case` for this id.
        pub fn set_case_latency(&self, id: CaseId, latency: Duration) {
            self.lock().case_latency.insert(id, latency);
        }

        /// Delays every call to `op`.
        pub fn set_op_latency(&self, op: &'static str, latency: Duration) {
            self.lock().op_latency.insert(op, latency);
        }

        /// How many times `op` was invoked, injected failures included.
        #[must_use]
        pub fn calls(&self, op: &str) -> usize {
            self.lock().calls.get(op).copied().unwrap_or(0)
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, State> {
            match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }

        async fn enter(&self, op: &'static str) -> RemoteResult<()> {
            let (latency, injected) = {
                let mut state = self.lock();
                *state.calls.entry(op).or_insert(0) += 1;
                (state.op_latency.get(op).copied(), state.fail_next.remove(op))
            };
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            match injected {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        fn now() -> UnixTimeMs {
            UnixTimeMs::now()
        }

        fn with_case<T>(
            &self,
            id: &CaseId,
            f: impl FnOnce(&mut PatientCase) -> T,
        ) -> RemoteResult<T> {
            let mut state = self.lock();
            let case = state
                .cases
                .iter_mut()
                .find(|c| &c.id == id)
                .ok_or_else(|| RemoteError::NotFound {
                    entity: "case",
                    id: id.to_string(),
                })?;
            Ok(f(case))
        }
    }

    #[async_trait]
    impl CaseRepository for InMemoryRepository {
        async fn list_cases(
            &self,
            filter: &CasesFilter,
            page: u32,
            page_size: u32,
        ) -> RemoteResult<CasesPage> {
            self.enter("list_cases").await?;
            let state = self.lock();
            let matching: Vec<PatientCase> = state
                .cases
                .iter()
                .filter(|c| filter.matches(c))
                .cloned()
                .collect();
            let total = matching.len() as u64;
            let start = (page.saturating_sub(1) as usize) * page_size as usize;
            let cases = matching
                .into_iter()
                .skip(start)
                .take(page_size as usize)
                .collect();
            Ok(CasesPage {
                cases,
                total,
                page,
                page_size,
            })
        }

        async fn get_case(&self, id: &CaseId) -> RemoteResult<PatientCase> {
            self.enter("get_case").await?;
            let latency = self.lock().case_latency.get(id).copied();
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            let state = self.lock();
            state
                .cases
                .iter()
                .find(|c| &c.id == id)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound {
                    entity: "case",
                    id: id.to_string(),
                })
        }

        async fn search_cases(&self, query: &str) -> RemoteResult<Vec<PatientCase>> {
            self.enter("search_cases").await?;
            let needle = query.to_lowercase();
            let state = self.lock();
            Ok(state
                .cases
                .iter()
                .filter(|c| {
                    c.patient_name.to_lowercase().contains(&needle)
                        || c.patient_id.as_str().to_lowercase().contains(&needle)
                        || c.id.as_str().to_lowercase().contains(&needle)
                })
                .cloned()
                .collect())
        }

        async fn assign_case(
            &self,
            case_id: &CaseId,
            radiologist: &RadiologistId,
        ) -> RemoteResult<PatientCase> {
            self.enter("assign_case").await?;
            self.with_case(case_id, |case| {
                case.assigned_to = Some(radiologist.clone());
                case.updated_at = Some(Self::now());
                case.clone()
            })
        }

        async fn update_case_status(
            &self,
            case_id: &CaseId,
            status: CaseStatus,
        ) -> RemoteResult<PatientCase> {
            self.enter("update_case_status").await?;
            self.with_case(case_id, |case| {
                case.status = status;
                case.status_changed_at = Some(Self::now());
                case.updated_at = Some(Self::now());
                case.clone()
            })
        }

        async fn update_case_priority(
            &self,
            case_id: &CaseId,
            priority: CasePriority,
        ) -> RemoteResult<PatientCase> {
            self.enter("update_case_priority").await?;
            self.with_case(case_id, |case| {
                case.priority = priority;
                case.updated_at = Some(Self::now());
                case.clone()
            })
        }

        async fn get_report(&self, case_id: &CaseId) -> RemoteResult<Option<DiagnosticReport>> {
            self.enter("get_report").await?;
            let state = self.lock();
            Ok(state
                .reports
                .iter()
                .find(|r| &r.case_id == case_id)
                .cloned())
        }

        async fn create_report(
            &self,
            draft: &ReportDraftPayload,
        ) -> RemoteResult<DiagnosticReport> {
            self.enter("create_report").await?;
            let report = DiagnosticReport {
                id: ReportId::new(Uuid::new_v4().to_string()),
                case_id: draft.case_id.clone(),
                findings: draft.findings.clone(),
                impression: draft.impression.clone(),
                recommendations: draft.recommendations.clone(),
                birads_score: draft.birads_score,
                is_final: draft.is_final,
                created_by: draft.created_by.clone(),
                created_at: Self::now(),
                updated_at: None,
                signed_at: draft.is_final.then(Self::now),
            };
            self.lock().reports.push(report.clone());
            Ok(report)
        }

        async fn update_report(
            &self,
            report_id: &ReportId,
            patch: &ReportPatch,
        ) -> RemoteResult<DiagnosticReport> {
            self.enter("update_report").await?;
            let mut state = self.lock();
            let report = state
                .reports
                .iter_mut()
                .find(|r| &r.id == report_id)
                .ok_or_else(|| RemoteError::NotFound {
                    entity: "report",
                    id: report_id.to_string(),
                })?;
            let previous = report.clone();
            if let Some(findings) = &patch.findings {
                report.findings = findings.clone();
            }
            if let Some(impression) = &patch.impression {
                report.impression = impression.clone();
            }
            if let Some(recommendations) = &patch.recommendations {
                report.recommendations = recommendations.clone();
            }
            if let Some(score) = patch.birads_score {
                report.birads_score = score;
            }
            if let Some(is_final) = patch.is_final {
                report.is_final = is_final;
                if is_final && report.signed_at.is_none() {
                    report.signed_at = Some(Self::now());
                }
            }
            report.updated_at = Some(Self::now());
            let updated = report.clone();
            state.history.push(previous);
            Ok(updated)
        }

        async fn report_history(&self, case_id: &CaseId) -> RemoteResult<Vec<DiagnosticReport>> {
            self.enter("report_history").await?;
            let state = self.lock();
            Ok(state
                .history
                .iter()
                .filter(|r| &r.case_id == case_id)
                .cloned()
                .collect())
        }

        async fn list_report_templates(&self) -> RemoteResult<Vec<ReportTemplate>> {
            self.enter("list_report_templates").await?;
            Ok(self.lock().templates.clone())
        }

        async fn add_annotation(
            &self,
            case_id: &CaseId,
            image_id: &ImageId,
            draft: &AnnotationDraft,
        ) -> RemoteResult<Annotation> {
            self.enter("add_annotation").await?;
            let annotation = Annotation {
                id: AnnotationId::new(Uuid::new_v4().to_string()),
                kind: draft.kind,
                points: draft.points.clone(),
                label: draft.label.clone(),
                color: draft.color.clone(),
                description: None,
                measurements: None,
                created_by: draft.created_by.clone(),
                created_at: Some(Self::now()),
                updated_at: None,
            };
            let stored = annotation.clone();
            self.with_case(case_id, move |case| {
                let image = case
                    .images
                    .iter_mut()
                    .find(|i| &i.id == image_id)
                    .ok_or_else(|| RemoteError::NotFound {
                        entity: "image",
                        id: image_id.to_string(),
                    })?;
                *image = image.with_annotation(stored);
                Ok(())
            })??;
            Ok(annotation)
        }

        async fn update_annotation(
            &self,
            case_id: &CaseId,
            image_id: &ImageId,
            annotation_id: &AnnotationId,
            patch: &AnnotationPatch,
        ) -> RemoteResult<Annotation> {
            self.enter("update_annotation").await?;
            self.with_case(case_id, |case| {
                let image = case
                    .images
                    .iter_mut()
                    .find(|i| &i.id == image_id)
                    .ok_or_else(|| RemoteError::NotFound {
                        entity: "image",
                        id: image_id.to_string(),
                    })?;
                let mut annotation = image
                    .annotations
                    .iter()
                    .find(|a| &a.id == annotation_id)
                    .cloned()
                    .ok_or_else(|| RemoteError::NotFound {
                        entity: "annotation",
                        id: annotation_id.to_string(),
                    })?;
                if let Some(points) = &patch.points {
                    annotation.points = points.clone();
                }
                if let Some(label) = &patch.label {
                    annotation.label = label.clone();
                }
                if let Some(color) = &patch.color {
                    annotation.color = color.clone();
                }
                if let Some(description) = &patch.description {
                    annotation.description = Some(description.clone());
                }
                annotation.updated_at = Some(Self::now());
                *image = image.with_annotation_replaced(annotation.clone());
                Ok(annotation)
            })?
        }

        async fn delete_annotation(
            &self,
            case_id: &CaseId,
            image_id: &ImageId,
            annotation_id: &AnnotationId,
        ) -> RemoteResult<()> {
            self.enter("delete_annotation").await?;
            // Deleting an absent annotation succeeds; the operation is
            // idempotent end to end.
            self.with_case(case_id, |case| {
                if let Some(image) = case.images.iter_mut().find(|i| &i.id == image_id) {
                    *image = image.without_annotation(annotation_id);
                }
            })
        }

        async fn export_report(
            &self,
            case_id: &CaseId,
            format: ExportFormat,
        ) -> RemoteResult<Vec<u8>> {
            self.enter("export_report").await?;
            let state = self.lock();
            let report = state
                .reports
                .iter()
                .find(|r| &r.case_id == case_id)
                .ok_or_else(|| RemoteError::NotFound {
                    entity: "report",
                    id: case_id.to_string(),
                })?;
            let body = serde_json::to_vec(report)
                .map_err(|e| RemoteError::Transport(e.to_string()))?;
            let mut blob = format!("{}\n", format.mime_type()).into_bytes();
            blob.extend_from_slice(&body);
            Ok(blob)
        }

        async fn dashboard_statistics(&self) -> RemoteResult<DashboardStatistics> {
            self.enter("dashboard_statistics").await?;
            Ok(self.lock().statistics.clone())
        }
    }

}
