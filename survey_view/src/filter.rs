use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::*;

/// Keeps the submissions that satisfy all the filters.
///
/// Submissions without a timestamp are always kept by the date range filter.
pub fn apply<'a>(submissions: &'a [Submission], filters: &Filters) -> Vec<&'a Submission> {
    submissions
        .iter()
        .filter(|s| filters.surveyor.matches(&s.surveyor_name))
        .filter(|s| in_date_range(s, filters.date_range))
        .filter(|s| filters.province.matches(&s.province))
        .filter(|s| filters.district.matches(&s.district))
        .filter(|s| filters.village.matches(&s.village))
        .collect()
}

fn in_date_range(s: &Submission, range: Option<(NaiveDate, NaiveDate)>) -> bool {
    match (range, s.submitted_on()) {
        (None, _) => true,
        (Some(_), None) => true,
        (Some((start, end)), Some(d)) => start <= d && d <= end,
    }
}

/// The surveyors that can be selected, sorted.
pub fn surveyor_options(dataset: &Dataset) -> Vec<String> {
    dataset
        .submissions
        .iter()
        .map(|s| s.surveyor_name.clone())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

/// The first and last day with a submission, if any submission has a timestamp.
pub fn date_bounds(dataset: &Dataset) -> Option<(NaiveDate, NaiveDate)> {
    let mut days = dataset.submissions.iter().filter_map(|s| s.submitted_on());
    let first = days.next()?;
    Some(days.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}

/// The choices offered by the province, district and village selectors.
///
/// Each level only offers the values found under the current selection of the
/// levels above it.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct LocationOptions {
    pub provinces: Vec<String>,
    pub districts: Vec<String>,
    pub villages: Vec<String>,
}

impl LocationOptions {
    pub fn cascade(submissions: &[Submission], filters: &Filters) -> LocationOptions {
        let provinces: BTreeSet<String> =
            submissions.iter().map(|s| s.province.clone()).collect();
        let in_province: Vec<&Submission> = submissions
            .iter()
            .filter(|s| filters.province.matches(&s.province))
            .collect();
        let districts: BTreeSet<String> =
            in_province.iter().map(|s| s.district.clone()).collect();
        let villages: BTreeSet<String> = in_province
            .iter()
            .filter(|s| filters.district.matches(&s.district))
            .map(|s| s.village.clone())
            .collect();
        LocationOptions {
            provinces: provinces.into_iter().collect(),
            districts: districts.into_iter().collect(),
            villages: villages.into_iter().collect(),
        }
    }
}
