#![allow(clippy::unwrap_used)]
// Config file loading, migration and URL store tests.

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use thingurl_config::{Config, FileConfigStore, load_config, save_config};
use thingurl_core::{Authentication, ThingUrl, UrlStore};

fn write(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_config(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.poll_interval, 5);
    assert_eq!(config.timeout, 10);
    assert!(config.urls.is_empty());
}

#[test]
fn test_legacy_string_entries_are_migrated_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        r#"
poll_interval = 9
urls = ["http://lamp.local:8888"]
"#,
    );

    let config = load_config(&path).unwrap();
    assert_eq!(config.poll_interval, 9);
    assert_eq!(config.urls.len(), 1);
    assert_eq!(config.urls[0].href, "http://lamp.local:8888");
    assert_eq!(config.urls[0].authentication.method(), "none");

    let rewritten = fs::read_to_string(&path).unwrap();
    assert!(rewritten.contains("[[urls]]"), "file was rewritten: {rewritten}");
    assert!(rewritten.contains(r#"method = "none""#));
}

#[test]
fn test_current_entries_leave_file_untouched() {
    let dir = TempDir::new().unwrap();
    let body = r#"
[[urls]]
href = "http://plug.local"

[urls.authentication]
method = "jwt"
token = "secret"
"#;
    let path = write(&dir, body);

    let config = load_config(&path).unwrap();
    assert_eq!(config.urls[0].authentication.bearer_token(), Some("secret"));
    assert_eq!(fs::read_to_string(&path).unwrap(), body);
}

#[test]
fn test_zero_poll_interval_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "poll_interval = 0\n");
    assert!(load_config(&path).is_err());
}

#[test]
fn test_save_then_load_keeps_tokens() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let config = Config {
        urls: vec![
            ThingUrl::new("http://a.local"),
            ThingUrl::new("http://b.local").with_authentication(Authentication::jwt("t0k")),
        ],
        ..Config::default()
    };

    save_config(&path, &config).unwrap();
    let loaded = load_config(&path).unwrap();
    assert_eq!(loaded.urls.len(), 2);
    assert_eq!(loaded.urls[1].authentication.bearer_token(), Some("t0k"));
}

#[test]
fn test_store_removes_url_ignoring_trailing_slash() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        r#"urls = ["http://lamp.local/", "http://plug.local"]"#,
    );
    let store = FileConfigStore::new(&path);

    assert!(store.remove_url("http://lamp.local").unwrap());
    assert!(!store.remove_url("http://lamp.local").unwrap());

    let hrefs: Vec<String> = store
        .saved_urls()
        .unwrap()
        .into_iter()
        .map(|u| u.href)
        .collect();
    assert_eq!(hrefs, vec!["http://plug.local".to_owned()]);
}
