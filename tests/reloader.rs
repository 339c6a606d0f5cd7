//! End-to-end tests of a single reloader against the real filesystem.

mod common;

use common::{StubWebhook, settle, start, stop, wait_for};
use reconfy::error::Stage;
use reconfy::prelude::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn reloader(spec: ReloaderSpec) -> Arc<Reloader> {
    Arc::new(Reloader::new(spec).unwrap())
}

#[tokio::test]
async fn test_missing_variable_leaves_output_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "URL=${RECONFY_IT_UNSET_API_URL}").unwrap();
    fs::write(&output, "previous").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    let status = reloader.last_reconcile();
    assert_eq!(status.failures, 1);
    let failure = status.last_failure.as_ref().unwrap();
    assert_eq!(failure.stage, Some(Stage::Render));
    assert!(failure.message.contains("RECONFY_IT_UNSET_API_URL"));
    assert_eq!(fs::read_to_string(&output).unwrap(), "previous");

    // The failure is contained: the reloader keeps watching.
    assert_eq!(reloader.state(), WatchState::Running);
    stop(&reloader, handle).await.unwrap();
    assert_eq!(reloader.state(), WatchState::Stopped);
}

#[tokio::test]
async fn test_missing_variable_without_prior_output() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "URL=${RECONFY_IT_UNSET_API_URL}").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    assert!(!reloader.last_reconcile().last_succeeded());
    assert!(!output.exists());
    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
async fn test_ignore_missing_renders_empty() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "URL=${RECONFY_IT_UNSET_API_URL}").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .ignore_missing(true)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    assert!(reloader.last_reconcile().last_succeeded());
    assert_eq!(fs::read_to_string(&output).unwrap(), "URL=");
    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
#[allow(unsafe_code)] // For env var manipulation in tests
async fn test_expands_environment() {
    unsafe {
        std::env::set_var("RECONFY_IT_LISTEN_PORT", "9093");
    }

    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(
        &input,
        "port: ${RECONFY_IT_LISTEN_PORT}\nhost: ${RECONFY_IT_UNSET_HOST:-localhost}\ncost: $$5\n",
    )
    .unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "port: 9093\nhost: localhost\ncost: $5\n"
    );
    stop(&reloader, handle).await.unwrap();

    unsafe {
        std::env::remove_var("RECONFY_IT_LISTEN_PORT");
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_output_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "secret").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .with_file_mode(0o600)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    let mode = fs::metadata(&output).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
async fn test_change_triggers_render() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "version: 1\n").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;
    assert_eq!(fs::read_to_string(&output).unwrap(), "version: 1\n");

    fs::write(&input, "version: 2\n").unwrap();
    wait_for("the changed output", || {
        fs::read_to_string(&output).is_ok_and(|s| s == "version: 2\n")
    })
    .await;
    assert!(reloader.last_reconcile().last_succeeded());

    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
async fn test_burst_of_writes_is_debounced() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "0").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    for i in 1..=10 {
        fs::write(&input, i.to_string()).unwrap();
    }
    wait_for("the last write", || {
        fs::read_to_string(&output).is_ok_and(|s| s == "10")
    })
    .await;
    settle().await;

    // One initial pass plus far fewer than one pass per write.
    let passes = reloader.last_reconcile().passes;
    assert!(passes >= 2 && passes < 11, "unexpected pass count {}", passes);

    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
async fn test_rename_onto_input_triggers_render() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "old").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    // The way editors and config management tools replace files.
    let staged = temp_dir.path().join(".app.tmpl.swp");
    fs::write(&staged, "new").unwrap();
    fs::rename(&staged, &input).unwrap();

    wait_for("the replaced output", || {
        fs::read_to_string(&output).is_ok_and(|s| s == "new")
    })
    .await;

    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
async fn test_unrelated_files_are_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "data").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    fs::write(temp_dir.path().join("unrelated.txt"), "noise").unwrap();
    settle().await;

    // Writing the output in the watched directory does not feed back either.
    assert_eq!(reloader.last_reconcile().passes, 1);
    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
async fn test_watch_file_only() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "a").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .watch_file_only(true)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    fs::write(&input, "b").unwrap();
    wait_for("the changed output", || {
        fs::read_to_string(&output).is_ok_and(|s| s == "b")
    })
    .await;

    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
async fn test_multiple_inputs_are_concatenated() {
    let temp_dir = TempDir::new().unwrap();
    let first = temp_dir.path().join("a.tmpl");
    let second = temp_dir.path().join("b.tmpl");
    let output = temp_dir.path().join("out.conf");
    fs::write(&first, "first\n").unwrap();
    fs::write(&second, "second\n").unwrap();

    let spec = ReloaderSpec::builder(&first)
        .with_input(&second)
        .with_output(&output)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;
    assert_eq!(fs::read_to_string(&output).unwrap(), "first\nsecond\n");

    // Either input triggers the whole pipeline.
    fs::write(&second, "changed\n").unwrap();
    wait_for("the changed output", || {
        fs::read_to_string(&output).is_ok_and(|s| s == "first\nchanged\n")
    })
    .await;

    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
async fn test_watch_dir_change_triggers_render() {
    let temp_dir = TempDir::new().unwrap();
    let templates = temp_dir.path().join("templates");
    let secrets = temp_dir.path().join("secrets");
    fs::create_dir(&templates).unwrap();
    fs::create_dir(&secrets).unwrap();
    let input = templates.join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "static").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .with_watch_dir(&secrets)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    fs::write(secrets.join("token"), "s3cr3t").unwrap();
    wait_for("a pass for the watch dir", || {
        reloader.last_reconcile().passes >= 2
    })
    .await;

    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
async fn test_webhook_failure_is_contained() {
    let webhook = StubWebhook::start(503).await;
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "v1").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .with_webhook(&webhook.url)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    // Written, notified, and recorded as a notification failure.
    assert_eq!(fs::read_to_string(&output).unwrap(), "v1");
    assert_eq!(webhook.hits(), 1);
    let status = reloader.last_reconcile();
    assert_eq!(
        status.last_failure.as_ref().and_then(|f| f.stage),
        Some(Stage::Notify)
    );
    assert_eq!(reloader.state(), WatchState::Running);

    // Still watching: the next change succeeds once the endpoint recovers.
    webhook.set_status(200);
    fs::write(&input, "v2").unwrap();
    wait_for("a successful pass", || {
        reloader.last_reconcile().last_succeeded()
    })
    .await;
    assert_eq!(fs::read_to_string(&output).unwrap(), "v2");
    assert!(webhook.hits() >= 2);

    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
async fn test_webhook_only_reloader() {
    let webhook = StubWebhook::start(200).await;
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.conf");
    fs::write(&input, "config").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_webhook(&webhook.url)
        .with_webhook_method("PUT")
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;
    assert_eq!(webhook.hits(), 1);

    fs::write(&input, "config changed").unwrap();
    wait_for("a second webhook call", || webhook.hits() >= 2).await;

    // Nothing else appeared next to the input.
    let entries = fs::read_dir(temp_dir.path()).unwrap().count();
    assert_eq!(entries, 1);

    stop(&reloader, handle).await.unwrap();
}

#[tokio::test]
async fn test_close_stops_watching() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("app.tmpl");
    let output = temp_dir.path().join("app.conf");
    fs::write(&input, "before").unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(&output)
        .build()
        .unwrap();
    let reloader = reloader(spec);
    let handle = start(&reloader).await;

    stop(&reloader, handle).await.unwrap();
    assert_eq!(reloader.state(), WatchState::Stopped);

    fs::write(&input, "after").unwrap();
    settle().await;
    assert_eq!(reloader.last_reconcile().passes, 1);
    assert_eq!(fs::read_to_string(&output).unwrap(), "before");

    // Closing again is harmless; watching again is not allowed.
    reloader.close();
    assert!(matches!(reloader.watch().await, Err(ReloadError::Other(_))));
}

#[tokio::test]
async fn test_directory_input_fails_watch() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("templates");
    fs::create_dir(&input).unwrap();

    let spec = ReloaderSpec::builder(&input)
        .with_output(temp_dir.path().join("out.conf"))
        .build()
        .unwrap();
    let reloader = reloader(spec);

    assert!(matches!(
        reloader.watch().await,
        Err(ReloadError::InvalidInput { .. })
    ));
    assert_eq!(reloader.last_reconcile().passes, 0);
}
