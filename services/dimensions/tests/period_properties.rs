use chrono::{Datelike, Duration, NaiveDate};
use dimensions::period::{month_weeks, Granularity, PeriodDimensionBuilder};
use proptest::prelude::*;

proptest! {
    #[test]
    fn weeks_cover_month_exactly_once(year in 1900i32..2200, month in 1u32..=12) {
        let weeks = month_weeks(year, month).unwrap();
        let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();

        let mut expected = first;
        for (start, end) in &weeks {
            // contiguous, ordered, inside the month
            prop_assert_eq!(*start, expected);
            prop_assert!(start <= end);
            prop_assert_eq!(end.month(), month);
            prop_assert!((*end - *start).num_days() < 7);
            expected = *end + Duration::days(1);
        }
        prop_assert_ne!(expected.month(), month);
    }

    #[test]
    fn weeks_after_the_first_start_on_monday(year in 1900i32..2200, month in 1u32..=12) {
        let weeks = month_weeks(year, month).unwrap();
        for (start, _) in weeks.iter().skip(1) {
            prop_assert_eq!(start.weekday(), chrono::Weekday::Mon);
        }
    }

    #[test]
    fn year_span_shape(start in 1990i32..2050, span in 0i32..4) {
        let nodes = PeriodDimensionBuilder::new(start, start + span).unwrap().build().unwrap();
        let years = nodes.iter().filter(|n| n.granularity() == Granularity::Year).count();
        let months = nodes.iter().filter(|n| n.granularity() == Granularity::Month).count();
        prop_assert_eq!(years as i32, span + 1);
        prop_assert_eq!(months as i32, (span + 1) * 12);
        for (i, node) in nodes.iter().enumerate() {
            prop_assert_eq!(node.date_key as usize, i + 1);
        }
    }
}
