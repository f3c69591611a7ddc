use std::io::Write;

use pkgstream::error::{ConfigError, Error};
use pkgstream::infrastructure::config::settings::Config;
use pkgstream::infrastructure::config::source::RecordFormat;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

#[test]
fn config_loads_from_file() {
    let file = write_config(
        r#"
[source]
stream_env = "S2_OSS_PACKAGE_READER_STREAM"
endpoint = "http://localhost:4243/v1"
format = "base64"

[relay]
bind = "0.0.0.0:8088"
backlog = 25

[consumer]
endpoint = "http://localhost:8088/streams/oss/api/stream"
dedup_window_secs = 60
"#,
    );

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.source.stream_env, "S2_OSS_PACKAGE_READER_STREAM");
    assert_eq!(config.source.format, RecordFormat::Base64);
    assert_eq!(config.relay.backlog, 25);
    assert_eq!(config.consumer.dedup_window_secs, 60);
    assert_eq!(config.consumer.max_items, 1000);
}

#[test]
fn config_rejects_bad_endpoint_override() {
    let file = write_config("[source]\nendpoint = \"not a url\"\n");

    match Config::load(file.path()) {
        Err(Error::Config(ConfigError::InvalidValue {
            field: "source.endpoint",
            ..
        })) => {}
        other => panic!("expected invalid endpoint, got {other:?}"),
    }
}

#[test]
fn config_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    match Config::load_or_default(Some(&missing)) {
        Err(Error::Config(ConfigError::ReadFile(_))) => {}
        other => panic!("expected read error, got {other:?}"),
    }
}
