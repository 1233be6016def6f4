//! Diagnostic report lifecycle.
//!
//! The desk moves through `Absent -> Drafting -> Saved -> Finalized`. Saving
//! creates the report when the case has none yet and updates it otherwise;
//! the server-returned report becomes the new baseline. A failed save leaves
//! the draft untouched so nothing typed is lost.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::client::{CaseRepository, ReportDraftPayload, ReportPatch};
use crate::model::{BiradsScore, CaseId, DiagnosticReport, RadiologistId, ReportTemplate};
use crate::store::Observable;
use crate::{ReviewError, ReviewResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportPhase {
    /// The case has no report and no draft.
    #[default]
    Absent,
    /// An editable draft exists locally.
    Drafting,
    /// The baseline report is persisted and no local edits are pending.
    Saved,
    /// The persisted report is marked final. Terminal for this flow; the
    /// repository itself does not refuse further updates.
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} while report is {phase:?}")]
pub struct PhaseError {
    pub phase: ReportPhase,
    pub action: &'static str,
}

impl From<PhaseError> for ReviewError {
    fn from(e: PhaseError) -> Self {
        ReviewError::Validation(e.to_string())
    }
}

/// The editable fields of a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub findings: String,
    pub impression: String,
    pub recommendations: String,
    pub birads_score: BiradsScore,
}

impl ReportDraft {
    #[must_use]
    fn from_report(report: &DiagnosticReport) -> Self {
        Self {
            findings: report.findings.clone(),
            impression: report.impression.clone(),
            recommendations: report.recommendations.clone(),
            birads_score: report.birads_score,
        }
    }

    #[must_use]
    fn from_template(template: &ReportTemplate) -> Self {
        Self {
            findings: template.findings.clone(),
            impression: template.impression.clone(),
            recommendations: template.recommendations.clone(),
            birads_score: template.birads_score,
        }
    }
}

/// Phase, draft and baseline move together; observers never see a draft that
/// disagrees with the phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportState {
    pub case_id: Option<CaseId>,
    pub phase: ReportPhase,
    pub draft: Option<ReportDraft>,
    pub baseline: Option<DiagnosticReport>,
}

impl ReportState {
    fn require(&self, allowed: &[ReportPhase], action: &'static str) -> Result<(), PhaseError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(PhaseError {
                phase: self.phase,
                action,
            })
        }
    }
}

pub struct ReportDesk {
    repo: Arc<dyn CaseRepository>,
    state: Observable<ReportState>,
    templates: Observable<Vec<ReportTemplate>>,
    saving: Observable<bool>,
}

impl ReportDesk {
    #[must_use]
    pub fn new(repo: Arc<dyn CaseRepository>) -> Self {
        Self {
            repo,
            state: Observable::default(),
            templates: Observable::new(Vec::new()),
            saving: Observable::new(false),
        }
    }

    #[must_use]
    pub fn state(&self) -> &Observable<ReportState> {
        &self.state
    }

    #[must_use]
    pub fn templates(&self) -> &Observable<Vec<ReportTemplate>> {
        &self.templates
    }

    #[must_use]
    pub fn saving(&self) -> &Observable<bool> {
        &self.saving
    }

    /// Loads the case's report, if any, and enters `Saved` or `Absent`.
    pub async fn load_for_case(&self, case_id: &CaseId) -> ReviewResult<()> {
        let state = self.fetch_for_case(case_id).await?;
        self.state.set(state);
        Ok(())
    }

    /// Builds the desk state for a case without publishing it, so callers
    /// racing against newer selections can discard the result instead.
    pub async fn fetch_for_case(&self, case_id: &CaseId) -> ReviewResult<ReportState> {
        let report = self.repo.get_report(case_id).await.map_err(|e| {
            warn!(case = %case_id, error = %e, "report load failed");
            ReviewError::from(e)
        })?;
        Ok(match report {
            Some(report) => ReportState {
                case_id: Some(case_id.clone()),
                phase: if report.is_final {
                    ReportPhase::Finalized
                } else {
                    ReportPhase::Saved
                },
                draft: None,
                baseline: Some(report),
            },
            None => ReportState {
                case_id: Some(case_id.clone()),
                ..ReportState::default()
            },
        })
    }

    /// Publishes a state previously built by [`fetch_for_case`](Self::fetch_for_case).
    pub(crate) fn present(&self, state: ReportState) {
        self.state.set(state);
    }

    /// Starts an empty draft. Valid from `Absent` and, for a rewrite that
    /// keeps the persisted identity, from `Saved`.
    pub fn create_new(&self) -> ReviewResult<()> {
        let mut state = self.state.get();
        state.require(&[ReportPhase::Absent, ReportPhase::Saved], "start a draft")?;
        state.phase = ReportPhase::Drafting;
        state.draft = Some(ReportDraft::default());
        self.state.set(state);
        Ok(())
    }

    /// Starts a draft pre-filled from the saved baseline.
    pub fn edit_existing(&self) -> ReviewResult<()> {
        let mut state = self.state.get();
        state.require(&[ReportPhase::Saved], "edit the report")?;
        let Some(baseline) = &state.baseline else {
            return Err(ReviewError::Validation("no saved report to edit".into()));
        };
        state.draft = Some(ReportDraft::from_report(baseline));
        state.phase = ReportPhase::Drafting;
        self.state.set(state);
        Ok(())
    }

    /// Edits the draft fields in place.
    pub fn update_draft(&self, f: impl FnOnce(&mut ReportDraft)) -> ReviewResult<()> {
        let mut state = self.state.get();
        state.require(&[ReportPhase::Drafting], "edit the draft")?;
        if let Some(draft) = &mut state.draft {
            f(draft);
        }
        self.state.set(state);
        Ok(())
    }

    /// Overwrites the draft's text fields and BIRADS with the template's.
    /// Report identity (baseline) is unaffected.
    pub fn apply_template(&self, template: &ReportTemplate) -> ReviewResult<()> {
        let mut state = self.state.get();
        state.require(&[ReportPhase::Drafting], "apply a template")?;
        state.draft = Some(ReportDraft::from_template(template));
        self.state.set(state);
        Ok(())
    }

    /// Persists the draft. Creates the report when the case has none,
    /// updates it otherwise; the returned report becomes the baseline and the
    /// desk enters `Saved`. On failure phase and draft are untouched.
    pub async fn save(&self, author: &RadiologistId) -> ReviewResult<DiagnosticReport> {
        self.persist(author, false).await
    }

    /// Marks the report final and persists it, entering `Finalized`. Valid
    /// while `Drafting` (finalizes the draft) or `Saved` (finalizes as-is).
    pub async fn finalize(&self, author: &RadiologistId) -> ReviewResult<DiagnosticReport> {
        let state = self.state.get();
        if state.phase == ReportPhase::Saved {
            self.edit_existing()?;
        } else {
            state.require(&[ReportPhase::Drafting], "finalize the report")?;
        }
        self.persist(author, true).await
    }

    async fn persist(
        &self,
        author: &RadiologistId,
        finalize: bool,
    ) -> ReviewResult<DiagnosticReport> {
        let state = self.state.get();
        state.require(&[ReportPhase::Drafting], "save the report")?;
        let Some(case_id) = state.case_id.clone() else {
            return Err(ReviewError::NoActiveSelection);
        };
        let Some(draft) = state.draft.clone() else {
            return Err(ReviewError::Validation("nothing drafted".into()));
        };

        self.saving.set(true);
        let outcome = match &state.baseline {
            None => {
                self.repo
                    .create_report(&ReportDraftPayload {
                        case_id,
                        findings: draft.findings,
                        impression: draft.impression,
                        recommendations: draft.recommendations,
                        birads_score: draft.birads_score,
                        is_final: finalize,
                        created_by: author.clone(),
                    })
                    .await
            }
            Some(baseline) => {
                self.repo
                    .update_report(
                        &baseline.id,
                        &ReportPatch {
                            findings: Some(draft.findings),
                            impression: Some(draft.impression),
                            recommendations: Some(draft.recommendations),
                            birads_score: Some(draft.birads_score),
                            is_final: Some(finalize || baseline.is_final),
                        },
                    )
                    .await
            }
        };
        self.saving.set(false);

        match outcome {
            Ok(report) => {
                self.state.update(|s| {
                    s.phase = if report.is_final {
                        ReportPhase::Finalized
                    } else {
                        ReportPhase::Saved
                    };
                    s.baseline = Some(report.clone());
                    s.draft = None;
                });
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "report save failed, draft preserved");
                Err(ReviewError::from(e))
            }
        }
    }

    pub async fn load_templates(&self) -> ReviewResult<()> {
        let templates = self
            .repo
            .list_report_templates()
            .await
            .map_err(ReviewError::from)?;
        self.templates.set(templates);
        Ok(())
    }

    /// Superseded versions of the open case's report, read-only.
    pub async fn history(&self) -> ReviewResult<Vec<DiagnosticReport>> {
        let Some(case_id) = self.state.get().case_id else {
            return Err(ReviewError::NoActiveSelection);
        };
        self.repo
            .report_history(&case_id)
            .await
            .map_err(ReviewError::from)
    }

    /// Forgets the open case's report state, back to `Absent`.
    pub fn clear(&self) {
        self.state.set(ReportState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::InMemoryRepository;

    fn desk() -> ReportDesk {
        ReportDesk::new(Arc::new(InMemoryRepository::new()))
    }

    async fn desk_for_case(id: &str) -> ReportDesk {
        let desk = desk();
        desk.load_for_case(&CaseId::new(id)).await.unwrap();
        desk
    }

    #[tokio::test]
    async fn case_without_report_starts_absent() {
        let desk = desk_for_case("c-1").await;
        let state = desk.state().get();
        assert_eq!(state.phase, ReportPhase::Absent);
        assert!(state.baseline.is_none());
    }

    #[tokio::test]
    async fn drafting_is_rejected_twice() {
        let desk = desk_for_case("c-1").await;
        desk.create_new().unwrap();
        assert_eq!(desk.state().get().phase, ReportPhase::Drafting);

        let err = desk.create_new().unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }

    #[tokio::test]
    async fn template_only_applies_while_drafting() {
        let desk = desk_for_case("c-1").await;
        let template = ReportTemplate {
            id: crate::model::TemplateId::new("t-1"),
            name: "Screening, negative".into(),
            findings: "No suspicious mass.".into(),
            impression: "Negative screen.".into(),
            recommendations: "Routine follow-up.".into(),
            birads_score: BiradsScore::Negative,
            created_by: RadiologistId::new("r-1"),
            is_public: true,
        };

        assert!(desk.apply_template(&template).is_err());

        desk.create_new().unwrap();
        desk.apply_template(&template).unwrap();
        let draft = desk.state().get().draft.unwrap();
        assert_eq!(draft.findings, "No suspicious mass.");
        assert_eq!(draft.birads_score, BiradsScore::Negative);
    }

    #[tokio::test]
    async fn first_save_creates_then_updates() {
        let repo = Arc::new(InMemoryRepository::new());
        let desk = ReportDesk::new(repo.clone());
        desk.load_for_case(&CaseId::new("c-1")).await.unwrap();
        let author = RadiologistId::new("r-1");

        desk.create_new().unwrap();
        desk.update_draft(|d| d.findings = "first pass".into())
            .unwrap();
        let saved = desk.save(&author).await.unwrap();
        assert_eq!(desk.state().get().phase, ReportPhase::Saved);
        assert_eq!(repo.calls("create_report"), 1);

        desk.edit_existing().unwrap();
        desk.update_draft(|d| d.findings = "second pass".into())
            .unwrap();
        let updated = desk.save(&author).await.unwrap();
        assert_eq!(updated.id, saved.id);
        assert_eq!(repo.calls("create_report"), 1);
        assert_eq!(repo.calls("update_report"), 1);
    }

    #[tokio::test]
    async fn failed_save_preserves_the_draft() {
        let repo = Arc::new(InMemoryRepository::new());
        let desk = ReportDesk::new(repo.clone());
        desk.load_for_case(&CaseId::new("c-1")).await.unwrap();

        desk.create_new().unwrap();
        desk.update_draft(|d| d.impression = "do not lose this".into())
            .unwrap();
        repo.fail_next(
            "create_report",
            crate::client::RemoteError::Transport("down".into()),
        );

        let err = desk.save(&RadiologistId::new("r-1")).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Remote);

        let state = desk.state().get();
        assert_eq!(state.phase, ReportPhase::Drafting);
        assert_eq!(state.draft.unwrap().impression, "do not lose this");
        assert!(!desk.saving().get());
    }

    #[tokio::test]
    async fn finalize_from_saved_marks_final() {
        let desk = desk_for_case("c-1").await;
        let author = RadiologistId::new("r-1");

        desk.create_new().unwrap();
        desk.update_draft(|d| d.birads_score = BiradsScore::Benign)
            .unwrap();
        desk.save(&author).await.unwrap();

        let report = desk.finalize(&author).await.unwrap();
        assert!(report.is_final);
        assert!(report.signed_at.is_some());
        assert_eq!(desk.state().get().phase, ReportPhase::Finalized);
    }
}
