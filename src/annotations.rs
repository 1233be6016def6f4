//! Image annotation editing.
//!
//! Geometry is stored in container-relative percentages so annotations render
//! correctly at any zoom level; pixel offsets from the shell are converted on
//! the way in. Annotation list changes always go through whole-list
//! replacement on the owning image.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::CaseRepository;
use crate::model::{
    Annotation, AnnotationDraft, AnnotationId, AnnotationKind, AnnotationPatch, CaseId,
    MedicalImage, RadiologistId,
};
use crate::selection::SelectionState;
use crate::store::Observable;
use crate::{ReviewError, ReviewResult, CIRCLE_ANNOTATION_RADIUS, DEFAULT_ANNOTATION_COLOR};

/// Converts a pixel offset into a percentage of the dimension, rounded to two
/// decimals.
#[must_use]
pub fn percent_of(offset: f64, dimension: f64) -> f64 {
    if dimension <= 0.0 {
        return 0.0;
    }
    let pct = offset / dimension * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Converts a click position into `(x%, y%)` of the displayed image.
#[must_use]
pub fn point_from_pixel(x: f64, y: f64, width: f64, height: f64) -> (f64, f64) {
    (percent_of(x, width), percent_of(y, height))
}

/// Circle geometry as stored in [`Annotation::points`]: center plus the fixed
/// click-to-place radius.
#[must_use]
pub fn circle_points(x_pct: f64, y_pct: f64) -> Vec<f64> {
    vec![x_pct, y_pct, CIRCLE_ANNOTATION_RADIUS]
}

/// Axis-aligned box in percent units, for positioning overlay elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Box around a circle annotation: side `2r` centered on `(x%, y%)`.
/// `None` when the annotation is not a circle or its points are malformed.
#[must_use]
pub fn bounding_box(annotation: &Annotation) -> Option<BoundingBox> {
    if annotation.kind != AnnotationKind::Circle {
        return None;
    }
    match annotation.points.as_slice() {
        [x, y, r] => Some(BoundingBox {
            left: x - r,
            top: y - r,
            width: 2.0 * r,
            height: 2.0 * r,
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveImage {
    pub case_id: CaseId,
    pub image: MedicalImage,
}

pub struct AnnotationEditor {
    repo: Arc<dyn CaseRepository>,
    selection: Arc<SelectionState>,
    active: Observable<Option<ActiveImage>>,
    tool: Observable<AnnotationKind>,
    color: Observable<String>,
    author: Observable<Option<RadiologistId>>,
}

impl AnnotationEditor {
    #[must_use]
    pub fn new(repo: Arc<dyn CaseRepository>, selection: Arc<SelectionState>) -> Self {
        Self {
            repo,
            selection,
            active: Observable::new(None),
            tool: Observable::new(AnnotationKind::Circle),
            color: Observable::new(DEFAULT_ANNOTATION_COLOR.to_owned()),
            author: Observable::new(None),
        }
    }

    #[must_use]
    pub fn active_image(&self) -> &Observable<Option<ActiveImage>> {
        &self.active
    }

    #[must_use]
    pub fn tool(&self) -> &Observable<AnnotationKind> {
        &self.tool
    }

    #[must_use]
    pub fn color(&self) -> &Observable<String> {
        &self.color
    }

    pub fn set_tool(&self, tool: AnnotationKind) {
        self.tool.set(tool);
    }

    pub fn set_color(&self, color: impl Into<String>) {
        self.color.set(color.into());
    }

    pub fn set_author(&self, author: Option<RadiologistId>) {
        self.author.set(author);
    }

    pub fn select_image(&self, case_id: CaseId, image: MedicalImage) {
        self.active.set(Some(ActiveImage { case_id, image }));
    }

    /// Drops the selected image, e.g. when the detail view closes.
    pub fn clear(&self) {
        self.active.set(None);
    }

    /// Persists an annotation with the current tool and color at `points`,
    /// labeled sequentially, and appends the server-confirmed value locally.
    pub async fn add_annotation(&self, points: Vec<f64>) -> ReviewResult<Annotation> {
        let Some(active) = self.active.get() else {
            return Err(ReviewError::NoActiveSelection);
        };
        let draft = AnnotationDraft {
            kind: self.tool.get(),
            points,
            label: format!("Annotation {}", active.image.annotations.len() + 1),
            color: self.color.get(),
            created_by: self.author.get(),
        };
        let annotation = self
            .repo
            .add_annotation(&active.case_id, &active.image.id, &draft)
            .await
            .map_err(|e| {
                warn!(error = %e, image = %active.image.id, "annotation create failed");
                ReviewError::from(e)
            })?;

        let updated = active.image.with_annotation(annotation.clone());
        self.install(&active.case_id, updated);
        Ok(annotation)
    }

    /// Click-to-annotate with the circle tool: converts the pixel offset to
    /// percentages of the displayed size and places a fixed-radius circle.
    pub async fn add_circle_at_pixel(
        &self,
        x: f64,
        y: f64,
        display_width: f64,
        display_height: f64,
    ) -> ReviewResult<Annotation> {
        let (x_pct, y_pct) = point_from_pixel(x, y, display_width, display_height);
        self.add_annotation(circle_points(x_pct, y_pct)).await
    }

    /// Deletes remotely, then filters locally. An id the local list does not
    /// contain still succeeds.
    pub async fn delete_annotation(&self, annotation_id: &AnnotationId) -> ReviewResult<()> {
        let Some(active) = self.active.get() else {
            return Err(ReviewError::NoActiveSelection);
        };
        self.repo
            .delete_annotation(&active.case_id, &active.image.id, annotation_id)
            .await
            .map_err(|e| {
                warn!(error = %e, annotation = %annotation_id, "annotation delete failed");
                ReviewError::from(e)
            })?;

        if !active.image.annotations.iter().any(|a| &a.id == annotation_id) {
            debug!(annotation = %annotation_id, "delete of locally absent annotation");
            return Ok(());
        }
        let updated = active.image.without_annotation(annotation_id);
        self.install(&active.case_id, updated);
        Ok(())
    }

    pub async fn update_annotation(
        &self,
        annotation_id: &AnnotationId,
        patch: &AnnotationPatch,
    ) -> ReviewResult<Annotation> {
        let Some(active) = self.active.get() else {
            return Err(ReviewError::NoActiveSelection);
        };
        let annotation = self
            .repo
            .update_annotation(&active.case_id, &active.image.id, annotation_id, patch)
            .await
            .map_err(ReviewError::from)?;

        let updated = active.image.with_annotation_replaced(annotation.clone());
        self.install(&active.case_id, updated);
        Ok(annotation)
    }

    /// Publishes the replaced image to the open case and, only while it is
    /// still the one selected, back to the editor. A completion that lands
    /// after the user moved to another image or case merges into the case but
    /// must not drag the editor back to the old image.
    fn install(&self, case_id: &CaseId, image: MedicalImage) {
        self.selection.apply_image(case_id, &image);
        self.active.update(|slot| match slot {
            Some(active) if active.case_id == *case_id && active.image.id == image.id => {
                active.image = image;
            }
            _ => {
                debug!(image = %image.id, "dropping completion for a superseded image selection");
            }
        });
    }
}
