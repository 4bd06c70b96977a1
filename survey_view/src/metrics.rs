use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::*;

/// A percentage with one decimal, 0.0 when there is nothing to divide by.
///
/// Halves are rounded to the even decimal, like the durations.
pub fn percent(part: i64, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (1000.0 * part as f64 / whole as f64).round_ties_even() / 10.0
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Metrics {
    pub total: usize,
    /// The sum of the verification flags.
    pub verified: i64,
    pub percent_verified: f64,
    pub unique_provinces: usize,
    pub unique_villages: usize,
}

impl Metrics {
    pub fn compute(rows: &[&Submission]) -> Metrics {
        let total = rows.len();
        let verified: i64 = rows.iter().map(|s| s.external_verification).sum();
        Metrics {
            total,
            verified,
            percent_verified: percent(verified, total),
            unique_provinces: count_distinct(rows.iter().map(|s| s.province.as_str())),
            unique_villages: count_distinct(rows.iter().map(|s| s.village.as_str())),
        }
    }
}

fn count_distinct<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values
        .filter(|v| *v != NOT_PROVIDED)
        .collect::<BTreeSet<&str>>()
        .len()
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct SurveyorCount {
    pub surveyor: String,
    pub count: usize,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct DateCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct VerificationCount {
    pub verified: i64,
    pub label: String,
    pub count: usize,
}

/// Submission counts per surveyor, largest first.
pub fn submissions_by_surveyor(rows: &[&Submission]) -> Vec<SurveyorCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for s in rows.iter() {
        *counts.entry(s.surveyor_name.as_str()).or_insert(0) += 1;
    }
    let mut res: Vec<SurveyorCount> = counts
        .into_iter()
        .map(|(surveyor, count)| SurveyorCount {
            surveyor: surveyor.to_string(),
            count,
        })
        .collect();
    res.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.surveyor.cmp(&b.surveyor)));
    res
}

/// Submission counts per calendar day, in date order. Undated submissions are not counted.
pub fn submissions_by_date(rows: &[&Submission]) -> Vec<DateCount> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for d in rows.iter().filter_map(|s| s.submitted_on()) {
        *counts.entry(d).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(date, count)| DateCount { date, count })
        .collect()
}

pub fn verification_label(flag: i64) -> &'static str {
    if flag == 1 {
        "Externally Verified"
    } else {
        "Beneficiary Verified"
    }
}

/// The verified / not verified split. Both categories are always present.
pub fn verification_breakdown(rows: &[&Submission]) -> [VerificationCount; 2] {
    let verified = rows.iter().filter(|s| s.is_verified()).count();
    let entry = |flag: i64, count: usize| VerificationCount {
        verified: flag,
        label: verification_label(flag).to_string(),
        count,
    };
    [entry(0, rows.len() - verified), entry(1, verified)]
}
