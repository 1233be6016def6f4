//! Shared fixtures for the scenario tests.
#![allow(dead_code)]

use review_core::client::memory::InMemoryRepository;
use review_core::client::DashboardStatistics;
use review_core::model::{
    CaseId, CasePriority, CaseStatus, DicomMetadata, Gender, ImageId, ImageLocator, MedicalImage,
    PatientCase, PatientId, SeriesId, StudyType, UnixTimeMs,
};

#[must_use]
pub fn image(case_id: &str, n: u32) -> MedicalImage {
    MedicalImage {
        id: ImageId::new(format!("{case_id}-img-{n}")),
        series_id: SeriesId::new(format!("{case_id}-ser-1")),
        image_url: ImageLocator::new(format!("https://pacs.example.com/{case_id}/{n}"))
            .expect("fixture url"),
        thumbnail_url: ImageLocator::new(format!("https://pacs.example.com/{case_id}/{n}/thumb"))
            .expect("fixture url"),
        metadata: DicomMetadata {
            patient_name: "Fixture Patient".into(),
            modality: "MG".into(),
            body_part: "BREAST".into(),
            ..DicomMetadata::default()
        },
        annotations: vec![],
        is_key_image: n == 1,
        window_level: None,
    }
}

#[must_use]
pub fn case(id: &str, status: CaseStatus, priority: CasePriority) -> PatientCase {
    PatientCase {
        id: CaseId::new(id),
        patient_id: PatientId::new(format!("p-{id}")),
        patient_name: format!("Patient {id}"),
        age: 54,
        gender: Gender::Female,
        priority,
        status,
        study_type: StudyType::Mammogram,
        study_date: UnixTimeMs(1_700_000_000_000),
        due_date: UnixTimeMs(1_700_086_400_000),
        assigned_to: None,
        images: vec![image(id, 1), image(id, 2)],
        previous_studies: vec![],
        clinical_history: Some("Screening, no prior complaints.".into()),
        referring_physician: Some("Dr. Holt".into()),
        status_changed_at: None,
        created_at: UnixTimeMs(1_699_900_000_000),
        updated_at: None,
    }
}

/// `summary` strips the heavy fields, as a list endpoint would.
#[must_use]
pub fn summary_of(case: &PatientCase) -> PatientCase {
    PatientCase {
        images: vec![],
        previous_studies: vec![],
        clinical_history: None,
        ..case.clone()
    }
}

#[must_use]
pub fn seeded_repo(count: usize) -> InMemoryRepository {
    let cases = (0..count)
        .map(|i| {
            case(
                &format!("c-{i:02}"),
                CaseStatus::Pending,
                CasePriority::Medium,
            )
        })
        .collect();
    InMemoryRepository::new()
        .with_cases(cases)
        .with_statistics(DashboardStatistics {
            total_cases: count as u64,
            pending_cases: count as u64,
            in_progress_cases: 0,
            completed_cases: 0,
            high_priority_cases: 0,
            average_completion_time: 0.0,
            weekly_workload: vec![0; 7],
        })
}
