use std::fmt;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::error::BatchError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(value: &str) -> Result<NaiveDate, BatchError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| BatchError::InvalidDate(value.to_string()))
}

/// A backward walk through the calendar: `count` dates starting at
/// `start_date`, each `step_days` earlier than the one before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateSpec {
    start_date: NaiveDate,
    step_days: u32,
    count: usize,
}

impl DateSpec {
    pub fn new(start_date: NaiveDate, step_days: u32, count: usize) -> Result<Self, BatchError> {
        if step_days == 0 {
            return Err(BatchError::InvalidDateSpec(
                "step_days must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            start_date,
            step_days,
            count,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn step_days(&self) -> u32 {
        self.step_days
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Stops early instead of panicking if the walk would leave chrono's
    /// representable range.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let step = Days::new(u64::from(self.step_days));
        std::iter::successors(Some(self.start_date), |date| date.checked_sub_days(step))
            .take(self.count)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchTask {
    pub date: NaiveDate,
    pub remote_locator: String,
    pub storage_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Fetched,
    Skipped,
    Failed,
    Pending,
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Fetched => write!(f, "fetched"),
            FetchStatus::Skipped => write!(f, "skipped"),
            FetchStatus::Failed => write!(f, "failed"),
            FetchStatus::Pending => write!(f, "pending"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Fetch,
    Timeout,
    Write,
}

impl FailureKind {
    pub fn of(error: &BatchError) -> Self {
        match error {
            BatchError::Timeout(_) => FailureKind::Timeout,
            BatchError::Write { .. } | BatchError::Filesystem(_) => FailureKind::Write,
            _ => FailureKind::Fetch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    pub task: FetchTask,
    pub status: FetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

impl FetchOutcome {
    pub fn fetched(task: FetchTask, bytes: usize) -> Self {
        Self {
            task,
            status: FetchStatus::Fetched,
            failure: None,
            error: None,
            bytes: Some(bytes as u64),
        }
    }

    pub fn skipped(task: FetchTask) -> Self {
        Self {
            task,
            status: FetchStatus::Skipped,
            failure: None,
            error: None,
            bytes: None,
        }
    }

    pub fn pending(task: FetchTask) -> Self {
        Self {
            task,
            status: FetchStatus::Pending,
            failure: None,
            error: None,
            bytes: None,
        }
    }

    pub fn failed(task: FetchTask, error: &BatchError) -> Self {
        Self {
            task,
            status: FetchStatus::Failed,
            failure: Some(FailureKind::of(error)),
            error: Some(error.to_string()),
            bytes: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub outcomes: Vec<FetchOutcome>,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn count(&self, status: FetchStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FetchOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == FetchStatus::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_walk_backward() {
        let start = NaiveDate::from_ymd_opt(2019, 11, 16).unwrap();
        let spec = DateSpec::new(start, 7, 3).unwrap();
        let dates = spec.dates();
        assert_eq!(
            dates,
            vec![
                start,
                NaiveDate::from_ymd_opt(2019, 11, 9).unwrap(),
                NaiveDate::from_ymd_opt(2019, 11, 2).unwrap(),
            ]
        );
    }

    #[test]
    fn zero_step_rejected() {
        let start = NaiveDate::from_ymd_opt(2019, 11, 16).unwrap();
        assert!(DateSpec::new(start, 0, 3).is_err());
    }

    #[test]
    fn dates_stop_at_calendar_floor() {
        let spec = DateSpec::new(NaiveDate::MIN, 1, 5).unwrap();
        assert_eq!(spec.dates(), vec![NaiveDate::MIN]);
    }
}
