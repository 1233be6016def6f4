//! Case selection with stale-response protection.
//!
//! Every new selection bumps an epoch counter. Responses carry the epoch they
//! were requested under and are dropped when a newer selection has started in
//! the meantime, so a slow fetch can never overwrite a faster, newer one.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::model::{CaseId, MedicalImage, PatientCase};
use crate::store::Observable;
use crate::{ReviewError, ReviewResult};

/// Token identifying one selection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionEpoch(u64);

pub struct SelectionState {
    epoch: AtomicU64,
    current: Observable<Option<PatientCase>>,
    loading: Observable<bool>,
}

impl SelectionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            current: Observable::new(None),
            loading: Observable::new(false),
        }
    }

    /// The case currently open in the detail view, summary or full.
    #[must_use]
    pub fn current(&self) -> &Observable<Option<PatientCase>> {
        &self.current
    }

    #[must_use]
    pub fn loading(&self) -> &Observable<bool> {
        &self.loading
    }

    #[must_use]
    pub fn selected_id(&self) -> Option<CaseId> {
        self.current.get().map(|c| c.id)
    }

    /// Starts a new selection attempt, invalidating all earlier epochs, and
    /// optimistically publishes the summary.
    pub fn begin(&self, summary: PatientCase) -> SelectionEpoch {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.current.set(Some(summary));
        self.loading.set(true);
        SelectionEpoch(epoch)
    }

    #[must_use]
    pub fn is_current(&self, epoch: SelectionEpoch) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch.0
    }

    /// Publishes the fetched detail if the epoch is still current; otherwise
    /// the response is discarded as superseded.
    pub fn publish(&self, epoch: SelectionEpoch, case: PatientCase) -> ReviewResult<()> {
        if !self.is_current(epoch) {
            debug!(case = %case.id, "discarding detail for superseded selection");
            return Err(ReviewError::Stale);
        }
        self.current.set(Some(case));
        self.loading.set(false);
        Ok(())
    }

    /// Records a failed fetch; only clears the loading flag for the epoch
    /// that set it.
    pub fn fail(&self, epoch: SelectionEpoch) {
        if self.is_current(epoch) {
            self.loading.set(false);
        }
    }

    /// Closes the detail view and invalidates any in-flight fetch.
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.current.set(None);
        self.loading.set(false);
    }

    /// Applies a confirmed mutation to the open case, if it is the one that
    /// changed. In-flight selections are left alone.
    pub fn apply_update(&self, case: &PatientCase) {
        self.current.update(|slot| {
            if let Some(open) = slot {
                if open.id == case.id {
                    *open = case.clone();
                }
            }
        });
    }

    /// Swaps a single image of the open case, used when its annotation list
    /// was replaced.
    pub fn apply_image(&self, case_id: &CaseId, image: &MedicalImage) {
        self.current.update(|slot| {
            if let Some(open) = slot {
                if &open.id == case_id {
                    open.replace_image(image.clone());
                }
            }
        });
    }
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new()
    }
}
