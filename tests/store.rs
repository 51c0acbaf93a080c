use camino::Utf8PathBuf;

use dated_fetch::store::{DirectorySink, StorageSink};

fn sink_in(temp: &tempfile::TempDir) -> DirectorySink {
    DirectorySink::new(Utf8PathBuf::from_path_buf(temp.path().join("turnstile_data")).unwrap())
}

#[test]
fn ensure_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let sink = sink_in(&temp);
    sink.ensure().unwrap();
    sink.ensure().unwrap();
    assert!(sink.root().as_std_path().is_dir());
}

#[test]
fn write_then_exists() {
    let temp = tempfile::tempdir().unwrap();
    let sink = sink_in(&temp);
    assert!(!sink.exists("20191116.csv"));

    sink.write("20191116.csv", b"first").unwrap();
    assert!(sink.exists("20191116.csv"));

    sink.write("20191116.csv", b"second").unwrap();
    let content = std::fs::read(sink.key_path("20191116.csv").unwrap().as_std_path()).unwrap();
    assert_eq!(content, b"second");
}

#[test]
fn nested_keys_create_directories() {
    let temp = tempfile::tempdir().unwrap();
    let sink = sink_in(&temp);
    sink.write("2019/11/20191116.csv", b"data").unwrap();
    assert!(sink.exists("2019/11/20191116.csv"));
}

#[test]
fn no_temp_files_left_behind() {
    let temp = tempfile::tempdir().unwrap();
    let sink = sink_in(&temp);
    sink.write("20191116.csv", b"data").unwrap();

    let names: Vec<String> = std::fs::read_dir(sink.root().as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["20191116.csv".to_string()]);
}

#[test]
fn traversal_keys_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let sink = sink_in(&temp);
    assert!(sink.write("../outside.csv", b"data").is_err());
    assert!(!sink.exists("../outside.csv"));
    assert!(!temp.path().join("outside.csv").exists());
}
