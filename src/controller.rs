//! Composition root wiring list, selection, annotations and report together.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::annotations::AnnotationEditor;
use crate::client::{CaseRepository, DashboardStatistics, ExportFormat};
use crate::list::CaseListState;
use crate::model::{CaseId, CasePriority, CaseStatus, PatientCase, RadiologistId};
use crate::report::ReportDesk;
use crate::selection::SelectionState;
use crate::store::Observable;
use crate::{ReviewError, ReviewResult};

pub struct CaseReviewController {
    repo: Arc<dyn CaseRepository>,
    list: CaseListState,
    selection: Arc<SelectionState>,
    annotations: AnnotationEditor,
    report: ReportDesk,
    statistics: Observable<Option<DashboardStatistics>>,
    updating: Observable<bool>,
    last_error: Observable<Option<ReviewError>>,
}

impl CaseReviewController {
    #[must_use]
    pub fn new(repo: Arc<dyn CaseRepository>) -> Self {
        let selection = Arc::new(SelectionState::new());
        Self {
            list: CaseListState::new(repo.clone()),
            annotations: AnnotationEditor::new(repo.clone(), selection.clone()),
            report: ReportDesk::new(repo.clone()),
            selection,
            statistics: Observable::new(None),
            updating: Observable::new(false),
            last_error: Observable::new(None),
            repo,
        }
    }

    #[must_use]
    pub fn list(&self) -> &CaseListState {
        &self.list
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    #[must_use]
    pub fn annotations(&self) -> &AnnotationEditor {
        &self.annotations
    }

    #[must_use]
    pub fn report(&self) -> &ReportDesk {
        &self.report
    }

    #[must_use]
    pub fn statistics(&self) -> &Observable<Option<DashboardStatistics>> {
        &self.statistics
    }

    #[must_use]
    pub fn updating(&self) -> &Observable<bool> {
        &self.updating
    }

    #[must_use]
    pub fn last_error(&self) -> &Observable<Option<ReviewError>> {
        &self.last_error
    }

    /// Initial load: statistics and the case list are independent failure
    /// domains. A statistics failure is logged and leaves the tiles empty;
    /// only a list failure is returned.
    pub async fn load_dashboard(&self) -> ReviewResult<()> {
        match self.repo.dashboard_statistics().await {
            Ok(stats) => self.statistics.set(Some(stats)),
            Err(e) => warn!(error = %e, "dashboard statistics unavailable"),
        }
        self.list.reload().await
    }

    /// Opens a case: publishes the summary immediately, fetches the detail,
    /// then loads the report and pre-selects the first image. A response for
    /// a selection that has since been superseded is discarded and surfaced
    /// as [`ReviewError::Stale`]; shells must not show it to the user.
    pub async fn select_case(&self, summary: PatientCase) -> ReviewResult<()> {
        let case_id = summary.id.clone();
        let epoch = self.selection.begin(summary);

        let detail = match self.repo.get_case(&case_id).await {
            Ok(detail) => detail,
            Err(e) => {
                self.selection.fail(epoch);
                if !self.selection.is_current(epoch) {
                    debug!(case = %case_id, "selection superseded during failed fetch");
                    return Err(ReviewError::Stale);
                }
                let err = ReviewError::from(e);
                self.last_error.set(Some(err.clone()));
                return Err(err);
            }
        };
        self.selection.publish(epoch, detail.clone())?;

        match detail.images.first() {
            Some(image) => self.annotations.select_image(case_id.clone(), image.clone()),
            None => self.annotations.clear(),
        }

        // Dependent step, independent failure domain: a missing report must
        // not tear down the opened case. The fetch runs under the same epoch
        // as the detail, so a result arriving after a newer selection is
        // discarded instead of overwriting that selection's report.
        let report_state = self.report.fetch_for_case(&case_id).await;
        if !self.selection.is_current(epoch) {
            debug!(case = %case_id, "discarding report for superseded selection");
            return Err(ReviewError::Stale);
        }
        match report_state {
            Ok(state) => self.report.present(state),
            Err(e) => warn!(case = %case_id, error = %e, "report unavailable for opened case"),
        }
        Ok(())
    }

    /// Closes the detail view and releases case, image and report state.
    pub fn close_case(&self) {
        self.selection.clear();
        self.annotations.clear();
        self.report.clear();
    }

    /// Assigns the case and propagates the confirmed value to the list and,
    /// when it is the open case, the detail view.
    pub async fn assign_case(
        &self,
        case_id: &CaseId,
        radiologist: &RadiologistId,
    ) -> ReviewResult<()> {
        self.mutate(case_id, self.repo.assign_case(case_id, radiologist))
            .await
    }

    /// Moves the case to `status` after validating the transition locally
    /// against the workflow table; invalid transitions never reach the
    /// repository.
    pub async fn update_status(&self, case_id: &CaseId, status: CaseStatus) -> ReviewResult<()> {
        let current = self.current_status_of(case_id).await?;
        current.validate_transition(status).map_err(|e| {
            let err = ReviewError::from(e);
            self.last_error.set(Some(err.clone()));
            err
        })?;
        self.mutate(case_id, self.repo.update_case_status(case_id, status))
            .await
    }

    pub async fn update_priority(
        &self,
        case_id: &CaseId,
        priority: CasePriority,
    ) -> ReviewResult<()> {
        self.mutate(case_id, self.repo.update_case_priority(case_id, priority))
            .await
    }

    /// Report blob for the open case.
    pub async fn export_report(&self, format: ExportFormat) -> ReviewResult<Vec<u8>> {
        let Some(case_id) = self.selection.selected_id() else {
            return Err(ReviewError::NoActiveSelection);
        };
        self.repo
            .export_report(&case_id, format)
            .await
            .map_err(|e| {
                let err = ReviewError::from(e);
                self.last_error.set(Some(err.clone()));
                err
            })
    }

    /// Runs a case mutation, then refreshes the list and the open detail
    /// from the confirmed response.
    async fn mutate(
        &self,
        case_id: &CaseId,
        op: impl std::future::Future<Output = crate::client::RemoteResult<PatientCase>>,
    ) -> ReviewResult<()> {
        self.updating.set(true);
        let outcome = op.await;
        self.updating.set(false);
        match outcome {
            Ok(updated) => {
                self.last_error.set(None);
                self.selection.apply_update(&updated);
                if let Err(e) = self.list.reload().await {
                    warn!(case = %case_id, error = %e, "list refresh after mutation failed");
                }
                Ok(())
            }
            Err(e) => {
                warn!(case = %case_id, error = %e, "case mutation failed");
                let err = ReviewError::from(e);
                self.last_error.set(Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Best local knowledge of the case's status: the open detail first, the
    /// list snapshot next, the repository as a last resort.
    async fn current_status_of(&self, case_id: &CaseId) -> ReviewResult<CaseStatus> {
        if let Some(open) = self.selection.current().get() {
            if &open.id == case_id {
                return Ok(open.status);
            }
        }
        if let Some(listed) = self
            .list
            .snapshot()
            .get()
            .cases
            .iter()
            .find(|c| &c.id == case_id)
        {
            return Ok(listed.status);
        }
        let case = self
            .repo
            .get_case(case_id)
            .await
            .map_err(ReviewError::from)?;
        Ok(case.status)
    }
}
