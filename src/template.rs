use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde::Serialize;

use crate::domain::FetchTask;
use crate::error::BatchError;

/// `{date}` renders as YYYYMMDD, `{yymmdd}` as YYMMDD.
pub const DATE_PLACEHOLDER: &str = "date";
pub const SHORT_DATE_PLACEHOLDER: &str = "yymmdd";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("placeholder pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Templates {
    locator: String,
    key: String,
}

impl Templates {
    pub fn new(locator: impl Into<String>, key: impl Into<String>) -> Result<Self, BatchError> {
        let locator = locator.into();
        let key = key.into();
        validate(&locator)?;
        validate(&key)?;
        Ok(Self { locator, key })
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn task(&self, date: NaiveDate) -> FetchTask {
        FetchTask {
            date,
            remote_locator: render(&self.locator, date),
            storage_key: render(&self.key, date),
        }
    }

    pub fn tasks(&self, dates: &[NaiveDate]) -> Vec<FetchTask> {
        dates.iter().map(|date| self.task(*date)).collect()
    }
}

/// Maps a date to its `(remote_locator, storage_key)` pair.
pub fn map(
    date: NaiveDate,
    locator_template: &str,
    key_template: &str,
) -> Result<(String, String), BatchError> {
    let templates = Templates::new(locator_template, key_template)?;
    let task = templates.task(date);
    Ok((task.remote_locator, task.storage_key))
}

fn validate(template: &str) -> Result<(), BatchError> {
    let mut has_date = false;
    for caps in PLACEHOLDER.captures_iter(template) {
        match &caps[1] {
            DATE_PLACEHOLDER | SHORT_DATE_PLACEHOLDER => has_date = true,
            other => {
                return Err(BatchError::Template {
                    template: template.to_string(),
                    reason: format!("unknown placeholder {{{other}}}"),
                });
            }
        }
    }
    if !has_date {
        return Err(BatchError::Template {
            template: template.to_string(),
            reason: "missing date placeholder".to_string(),
        });
    }
    Ok(())
}

fn render(template: &str, date: NaiveDate) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            SHORT_DATE_PLACEHOLDER => date.format("%y%m%d").to_string(),
            _ => date.format("%Y%m%d").to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_formats() {
        let date = NaiveDate::from_ymd_opt(2019, 11, 16).unwrap();
        let (locator, key) = map(date, "https://host/turnstile_{yymmdd}.txt", "{date}.csv").unwrap();
        assert_eq!(locator, "https://host/turnstile_191116.txt");
        assert_eq!(key, "20191116.csv");
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let err = Templates::new("https://host/{day}.txt", "{date}.csv").unwrap_err();
        assert!(err.to_string().contains("unknown placeholder {day}"));
    }
}
