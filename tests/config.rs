use std::time::Duration;

use assert_matches::assert_matches;
use chrono::NaiveDate;

use dated_fetch::config::{Config, ConfigLoader, DEFAULT_URL_TEMPLATE};
use dated_fetch::error::BatchError;

#[test]
fn parse_config_file() {
    let config: Config = serde_json::from_str(
        r#"{
            "start_date": "2020-01-04",
            "step_days": 14,
            "count": 5,
            "storage_key_template": "weekly/{date}.csv",
            "output_dir": "data",
            "fetch_timeout_secs": 30,
            "max_parallel": 4
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(
        resolved.date_spec.start_date(),
        NaiveDate::from_ymd_opt(2020, 1, 4).unwrap()
    );
    assert_eq!(resolved.date_spec.step_days(), 14);
    assert_eq!(resolved.date_spec.count(), 5);
    assert_eq!(resolved.templates.locator(), DEFAULT_URL_TEMPLATE);
    assert_eq!(resolved.templates.key(), "weekly/{date}.csv");
    assert_eq!(resolved.output_dir, "data");
    assert_eq!(resolved.fetch_timeout, Some(Duration::from_secs(30)));
    assert_eq!(resolved.max_parallel, 4);
}

#[test]
fn overrides_win_over_file_values() {
    let file = Config {
        count: Some(10),
        max_parallel: Some(2),
        ..Config::default()
    };
    let cli = Config {
        count: Some(3),
        ..Config::default()
    };
    let merged = file.overlay(cli);
    assert_eq!(merged.count, Some(3));
    assert_eq!(merged.max_parallel, Some(2));
}

#[test]
fn load_reads_explicit_path() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("series.json");
    std::fs::write(&path, r#"{ "count": 2, "remote_url_template": "https://host/{date}.txt" }"#)
        .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str(), Config::default()).unwrap();
    assert_eq!(resolved.date_spec.count(), 2);
    assert_eq!(resolved.templates.locator(), "https://host/{date}.txt");
}

#[test]
fn missing_explicit_path_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::load(path.to_str()),
        Err(BatchError::ConfigRead(_))
    );
}

#[test]
fn invalid_values_are_rejected() {
    let bad_template = Config {
        remote_url_template: Some("https://host/latest.txt".to_string()),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(bad_template),
        Err(BatchError::Template { .. })
    );

    let zero_step = Config {
        step_days: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(zero_step),
        Err(BatchError::InvalidDateSpec(_))
    );

    let zero_parallel = Config {
        max_parallel: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(zero_parallel),
        Err(BatchError::InvalidConfig(_))
    );

    assert_matches!(
        serde_json::from_str::<Config>(r#"{ "step_days": -7 }"#),
        Err(_)
    );
}

#[test]
fn max_count_from_json_resolves_without_panicking() {
    let config: Config = serde_json::from_str(
        r#"{ "count": 18446744073709551615, "step_days": 36500 }"#,
    )
    .unwrap();
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.date_spec.count(), usize::MAX);

    let dates = resolved.date_spec.dates();
    assert_eq!(dates[0], NaiveDate::from_ymd_opt(2019, 11, 16).unwrap());
    assert!(dates.len() < 10_000);
}

#[test]
fn default_start_date_is_last_turnstile_week() {
    assert_eq!(
        dated_fetch::config::default_start_date(),
        NaiveDate::from_ymd_opt(2019, 11, 16).unwrap()
    );
}
