//! Property tests for pagination math and coordinate conversion.

use proptest::prelude::*;

use review_core::annotations::percent_of;
use review_core::list::CaseListSnapshot;
use review_core::model::CasesFilter;

fn snapshot(total: u64, page: u32, page_size: u32) -> CaseListSnapshot {
    CaseListSnapshot {
        cases: vec![],
        total,
        page,
        page_size,
        filter: CasesFilter::default(),
        query: None,
    }
}

proptest! {
    #[test]
    fn total_pages_covers_every_case(total in 0u64..100_000, page_size in 1u32..500) {
        let pages = snapshot(total, 1, page_size).total_pages();
        prop_assert!(pages * u64::from(page_size) >= total);
        if pages > 0 {
            prop_assert!((pages - 1) * u64::from(page_size) < total);
        } else {
            prop_assert_eq!(total, 0);
        }
    }

    #[test]
    fn displayed_range_stays_inside_the_list(
        total in 0u64..100_000,
        page in 1u32..200,
        page_size in 1u32..500,
    ) {
        let snap = snapshot(total, page, page_size);
        let (start, end) = snap.displayed_range();
        if total == 0 {
            prop_assert_eq!((start, end), (0, 0));
        } else if start <= total {
            prop_assert!(start >= 1);
            prop_assert!(end <= total);
            prop_assert!(end.saturating_sub(start) < u64::from(page_size));
        }
    }

    #[test]
    fn range_on_a_populated_page_matches_its_length(
        total in 1u64..10_000,
        page_size in 1u32..100,
    ) {
        // Last page: the range length equals the remainder of cases.
        let snap = snapshot(total, 1, page_size);
        let last = u32::try_from(snap.total_pages()).unwrap();
        let snap = snapshot(total, last, page_size);
        let (start, end) = snap.displayed_range();
        let on_page = total - u64::from(last - 1) * u64::from(page_size);
        prop_assert_eq!(end - start + 1, on_page);
    }

    #[test]
    fn percentages_stay_in_bounds_and_carry_two_decimals(
        offset in 0.0f64..5_000.0,
        dimension in 1.0f64..5_000.0,
    ) {
        prop_assume!(offset <= dimension);
        let pct = percent_of(offset, dimension);
        prop_assert!((0.0..=100.0).contains(&pct));
        // Two-decimal grid.
        let scaled = pct * 100.0;
        prop_assert!((scaled - scaled.round()).abs() < 1e-6);
    }
}
