//! Loading reloader settings from files and the environment.

use reconfy::core::{ConfigLoader, Settings};
use reconfy::error::ReloadError;
use reconfy::sources::{EnvSource, FileSource};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_yaml_multi_reloader_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reloaders.yaml");
    fs::write(
        &path,
        r#"
ignoremissing: true
metrics:
  listen: ":9090"
  path: /internal/metrics
reloaders:
  - name: prometheus
    input: /templates/prometheus.yml.tmpl
    output: /etc/prometheus/prometheus.yml
    webhook: http://localhost:9090/-/reload
  - name: alertmanager
    input:
      - /templates/alertmanager.yml.tmpl
      - /templates/receivers.yml.tmpl
    output: /etc/alertmanager/alertmanager.yml
    filemode: 600
    watchfileonly: true
"#,
    )
    .unwrap();

    let settings = Settings::from_file(&path).unwrap();
    assert_eq!(settings.metrics.listen_addr(), Some(":9090"));
    assert_eq!(settings.metrics.path, "/internal/metrics");

    let names: Vec<&str> = settings.reloaders.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["prometheus", "alertmanager"]);
    assert!(settings.reloaders.iter().all(|r| r.ignore_missing));

    let alertmanager = &settings.reloaders[1];
    assert_eq!(alertmanager.inputs.len(), 2);
    assert_eq!(alertmanager.file_mode, 0o600);
    assert!(alertmanager.watch_file_only);
    assert!(alertmanager.webhook.is_none());
}

#[test]
fn test_toml_single_reloader_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reloader.toml");
    fs::write(
        &path,
        r#"
name = "app"
input = "/templates/app.tmpl"
output = "/etc/app/app.conf"
watchdirs = ["/run/secrets"]
filemode = "0640"

[webhook]
url = "http://localhost:8080/reload"
method = "PUT"
"#,
    )
    .unwrap();

    let settings = Settings::from_file(&path).unwrap();
    assert_eq!(settings.reloaders.len(), 1);
    let app = &settings.reloaders[0];
    assert_eq!(app.name, "app");
    assert_eq!(app.output, Some(PathBuf::from("/etc/app/app.conf")));
    assert_eq!(app.watch_dirs, vec![PathBuf::from("/run/secrets")]);
    assert_eq!(app.file_mode, 0o640);
    let webhook = app.webhook.as_ref().unwrap();
    assert_eq!(webhook.method, reqwest::Method::PUT);
    assert_eq!(webhook.url.as_str(), "http://localhost:8080/reload");
    assert_eq!(settings.metrics.listen_addr(), None);
}

#[test]
fn test_json_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reloader.json");
    fs::write(
        &path,
        r#"{ "input": "/templates/app.tmpl", "webhook": "http://localhost:8080" }"#,
    )
    .unwrap();

    let settings = Settings::from_file(&path).unwrap();
    let app = &settings.reloaders[0];
    assert!(app.output.is_none());
    assert_eq!(app.label(), "/templates/app.tmpl");
}

#[test]
fn test_invalid_files() {
    let temp_dir = TempDir::new().unwrap();

    let missing = temp_dir.path().join("missing.yaml");
    assert!(matches!(Settings::from_file(&missing), Err(ReloadError::Load(_))));

    // Neither an output nor a webhook.
    let useless = temp_dir.path().join("useless.yaml");
    fs::write(&useless, "input: /templates/app.tmpl\n").unwrap();
    assert!(matches!(
        Settings::from_file(&useless),
        Err(ReloadError::InvalidConfig(_))
    ));

    let colliding = temp_dir.path().join("colliding.yaml");
    fs::write(
        &colliding,
        r#"
reloaders:
  - input: /templates/a.tmpl
    output: /rendered/shared.conf
  - input: /templates/b.tmpl
    output: /rendered/shared.conf
"#,
    )
    .unwrap();
    assert!(matches!(
        Settings::from_file(&colliding),
        Err(ReloadError::InvalidConfig(_))
    ));
}

#[test]
#[allow(unsafe_code)] // For env var manipulation in tests
fn test_env_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reloader.yaml");
    fs::write(
        &path,
        r#"
input: /templates/app.tmpl
output: /rendered/app.conf
metrics:
  path: /custom
"#,
    )
    .unwrap();

    unsafe {
        std::env::set_var("CFGTEST_OUTPUT", "/rendered/override.conf");
        std::env::set_var("CFGTEST_METRICS__LISTEN", "127.0.0.1:9191");
        std::env::set_var("CFGTEST_WATCHDIRS", "/run/a,/run/b");
    }

    let mut loader = ConfigLoader::new();
    loader.add_source(Box::new(FileSource::new(&path)));
    loader.add_source(Box::new(EnvSource::new("CFGTEST", "__")));
    let settings = Settings::from_config(loader.build().unwrap()).unwrap();

    unsafe {
        std::env::remove_var("CFGTEST_OUTPUT");
        std::env::remove_var("CFGTEST_METRICS__LISTEN");
        std::env::remove_var("CFGTEST_WATCHDIRS");
    }

    let app = &settings.reloaders[0];
    assert_eq!(app.output, Some(PathBuf::from("/rendered/override.conf")));
    assert_eq!(
        app.watch_dirs,
        vec![PathBuf::from("/run/a"), PathBuf::from("/run/b")]
    );
    assert_eq!(settings.metrics.listen_addr(), Some("127.0.0.1:9191"));
    // Sibling keys of an overridden table survive.
    assert_eq!(settings.metrics.path, "/custom");
}
