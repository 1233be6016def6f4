//! Selecting, mutating and annotating cases.

mod common;

use std::sync::Arc;
use std::time::Duration;

use review_core::client::memory::InMemoryRepository;
use review_core::model::{
    AnnotationId, BiradsScore, CaseId, CasePriority, CaseStatus, DiagnosticReport, RadiologistId,
    ReportId, UnixTimeMs,
};
use review_core::report::ReportPhase;
use review_core::{CaseReviewController, ErrorKind, ReviewError};

use common::{case, seeded_repo, summary_of};

#[tokio::test]
async fn selecting_a_case_publishes_summary_then_detail() {
    let full = case("c-01", CaseStatus::Pending, CasePriority::High);
    let repo = Arc::new(InMemoryRepository::new().with_cases(vec![full.clone()]));
    let controller = CaseReviewController::new(repo);

    controller.select_case(summary_of(&full)).await.unwrap();

    let open = controller.selection().current().get().unwrap();
    assert_eq!(open.id.as_str(), "c-01");
    assert_eq!(open.images.len(), 2);
    assert!(!controller.selection().loading().get());

    // First image is pre-selected for annotation.
    let active = controller.annotations().active_image().get().unwrap();
    assert_eq!(active.image.id.as_str(), "c-01-img-1");
}

#[tokio::test(start_paused = true)]
async fn slow_response_for_a_superseded_selection_is_discarded() {
    let case_a = case("c-a", CaseStatus::Pending, CasePriority::Medium);
    let case_b = case("c-b", CaseStatus::Pending, CasePriority::Medium);
    let repo = Arc::new(InMemoryRepository::new().with_cases(vec![case_a.clone(), case_b.clone()]));
    repo.set_case_latency(CaseId::new("c-a"), Duration::from_millis(500));
    let controller = Arc::new(CaseReviewController::new(repo));

    let slow = {
        let controller = controller.clone();
        let summary = summary_of(&case_a);
        tokio::spawn(async move { controller.select_case(summary).await })
    };
    tokio::task::yield_now().await;

    controller.select_case(summary_of(&case_b)).await.unwrap();
    assert_eq!(
        controller.selection().selected_id().unwrap().as_str(),
        "c-b"
    );

    let outcome = slow.await.unwrap();
    assert_eq!(outcome, Err(ReviewError::Stale));
    assert!(!outcome.unwrap_err().kind().is_user_visible());

    // The late response did not overwrite the newer selection.
    let open = controller.selection().current().get().unwrap();
    assert_eq!(open.id.as_str(), "c-b");
    assert_eq!(open.images.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_report_load_for_a_superseded_selection_is_discarded() {
    let case_a = case("c-a", CaseStatus::Pending, CasePriority::Medium);
    let case_b = case("c-b", CaseStatus::Pending, CasePriority::Medium);
    let prior = DiagnosticReport {
        id: ReportId::new("r-a"),
        case_id: CaseId::new("c-a"),
        findings: "prior read".into(),
        impression: String::new(),
        recommendations: String::new(),
        birads_score: BiradsScore::Benign,
        is_final: false,
        created_by: RadiologistId::new("r-1"),
        created_at: UnixTimeMs(1_000),
        updated_at: None,
        signed_at: None,
    };
    let repo = Arc::new(
        InMemoryRepository::new()
            .with_cases(vec![case_a.clone(), case_b.clone()])
            .with_reports(vec![prior]),
    );
    repo.set_op_latency("get_report", Duration::from_millis(500));
    let controller = Arc::new(CaseReviewController::new(repo));

    let slow = {
        let controller = controller.clone();
        let summary = summary_of(&case_a);
        tokio::spawn(async move { controller.select_case(summary).await })
    };
    tokio::task::yield_now().await;

    controller.select_case(summary_of(&case_b)).await.unwrap();
    assert_eq!(slow.await.unwrap(), Err(ReviewError::Stale));

    // The first case's report never reaches the desk of the newer selection.
    let desk = controller.report().state().get();
    assert_eq!(desk.case_id.unwrap().as_str(), "c-b");
    assert_eq!(desk.phase, ReportPhase::Absent);
    assert!(desk.baseline.is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_annotation_save_does_not_steal_the_active_image() {
    let full = case("c-a", CaseStatus::Pending, CasePriority::Medium);
    let repo = Arc::new(InMemoryRepository::new().with_cases(vec![full.clone()]));
    repo.set_op_latency("add_annotation", Duration::from_millis(500));
    let controller = Arc::new(CaseReviewController::new(repo));
    controller.select_case(summary_of(&full)).await.unwrap();

    let pending = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .annotations()
                .add_circle_at_pixel(120.0, 80.0, 400.0, 300.0)
                .await
        })
    };
    tokio::task::yield_now().await;

    // The user moves to the second image while the save is in flight.
    let second = controller.selection().current().get().unwrap().images[1].clone();
    controller
        .annotations()
        .select_image(CaseId::new("c-a"), second);

    pending.await.unwrap().unwrap();

    let active = controller.annotations().active_image().get().unwrap();
    assert_eq!(active.image.id.as_str(), "c-a-img-2");
    assert!(active.image.annotations.is_empty());

    // The annotation still landed on the first image of the open case.
    let open = controller.selection().current().get().unwrap();
    assert_eq!(open.images[0].annotations.len(), 1);
    assert!(open.images[1].annotations.is_empty());
}

#[tokio::test]
async fn selecting_a_missing_case_surfaces_not_found() {
    let repo = Arc::new(InMemoryRepository::new());
    let controller = CaseReviewController::new(repo);

    let ghost = case("ghost", CaseStatus::Pending, CasePriority::Low);
    let err = controller.select_case(summary_of(&ghost)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn assignment_reaches_both_list_and_open_detail() {
    let repo = Arc::new(seeded_repo(3));
    let controller = CaseReviewController::new(repo);
    controller.load_dashboard().await.unwrap();

    let target = controller.list().snapshot().get().cases[0].clone();
    controller.select_case(target.clone()).await.unwrap();

    let radiologist = RadiologistId::new("r-7");
    controller
        .assign_case(&target.id, &radiologist)
        .await
        .unwrap();

    let open = controller.selection().current().get().unwrap();
    assert_eq!(open.assigned_to.as_ref(), Some(&radiologist));

    let listed = controller.list().snapshot().get().cases[0].clone();
    assert_eq!(listed.assigned_to, Some(radiologist));
}

#[tokio::test]
async fn status_walks_the_workflow_and_rejects_shortcuts() {
    let repo = Arc::new(seeded_repo(2));
    let controller = CaseReviewController::new(repo.clone());
    controller.load_dashboard().await.unwrap();
    let id = CaseId::new("c-00");

    let err = controller
        .update_status(&id, CaseStatus::Completed)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(repo.calls("update_case_status"), 0);

    controller
        .update_status(&id, CaseStatus::InProgress)
        .await
        .unwrap();
    controller
        .update_status(&id, CaseStatus::Completed)
        .await
        .unwrap();

    let listed = controller
        .list()
        .snapshot()
        .get()
        .cases
        .iter()
        .find(|c| c.id == id)
        .cloned()
        .unwrap();
    assert_eq!(listed.status, CaseStatus::Completed);

    // Terminal: no way back.
    let err = controller
        .update_status(&id, CaseStatus::InProgress)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn click_places_a_fixed_radius_circle_in_percent_space() {
    let repo = Arc::new(seeded_repo(1));
    let controller = CaseReviewController::new(repo);
    controller.load_dashboard().await.unwrap();
    let target = controller.list().snapshot().get().cases[0].clone();
    controller.select_case(target).await.unwrap();

    let annotation = controller
        .annotations()
        .add_circle_at_pixel(120.0, 80.0, 400.0, 300.0)
        .await
        .unwrap();

    assert_eq!(annotation.label, "Annotation 1");
    assert_eq!(annotation.points.len(), 3);
    assert!((annotation.points[0] - 30.0).abs() < 1e-9);
    assert!((annotation.points[1] - 26.67).abs() < 1e-9);
    assert!((annotation.points[2] - 10.0).abs() < 1e-9);

    // The open case sees the new annotation through list replacement.
    let open = controller.selection().current().get().unwrap();
    assert_eq!(open.images[0].annotations.len(), 1);

    let second = controller
        .annotations()
        .add_annotation(vec![50.0, 50.0, 10.0])
        .await
        .unwrap();
    assert_eq!(second.label, "Annotation 2");
}

#[tokio::test]
async fn annotation_delete_is_idempotent() {
    let repo = Arc::new(seeded_repo(1));
    let controller = CaseReviewController::new(repo);
    controller.load_dashboard().await.unwrap();
    let target = controller.list().snapshot().get().cases[0].clone();
    controller.select_case(target).await.unwrap();

    let annotation = controller
        .annotations()
        .add_circle_at_pixel(10.0, 10.0, 100.0, 100.0)
        .await
        .unwrap();

    controller
        .annotations()
        .delete_annotation(&annotation.id)
        .await
        .unwrap();
    controller
        .annotations()
        .delete_annotation(&annotation.id)
        .await
        .unwrap();
    controller
        .annotations()
        .delete_annotation(&AnnotationId::new("never-existed"))
        .await
        .unwrap();

    let active = controller.annotations().active_image().get().unwrap();
    assert!(active.image.annotations.is_empty());
}

#[tokio::test]
async fn annotating_without_a_selected_image_is_rejected() {
    let controller = CaseReviewController::new(Arc::new(InMemoryRepository::new()));
    let err = controller
        .annotations()
        .add_annotation(vec![10.0, 10.0, 10.0])
        .await
        .unwrap_err();
    assert_eq!(err, ReviewError::NoActiveSelection);
}

#[tokio::test]
async fn closing_a_case_releases_everything() {
    let repo = Arc::new(seeded_repo(1));
    let controller = CaseReviewController::new(repo);
    controller.load_dashboard().await.unwrap();
    let target = controller.list().snapshot().get().cases[0].clone();
    controller.select_case(target).await.unwrap();

    controller.close_case();

    assert!(controller.selection().current().get().is_none());
    assert!(controller.annotations().active_image().get().is_none());
    assert!(controller.report().state().get().case_id.is_none());
}
