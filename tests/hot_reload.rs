//! End-to-end reload tests with the real file watcher.

use std::sync::Arc;
use std::time::Duration;

use hotvisor::config::JsonConfigLoader;
use hotvisor::engine::HttpEngine;
use hotvisor::lifecycle::ReloadPolicy;
use hotvisor::{App, RunArgs};
use tokio::sync::oneshot;

mod common;

use common::{write_config, RecordingBuilder};

const WAIT: Duration = Duration::from_secs(10);

async fn fetch_message(client: &reqwest::Client) -> Option<String> {
    let res = client.get("http://127.0.0.1:28391/").send().await.ok()?;
    let body: serde_json::Value = res.json().await.ok()?;
    body["message"].as_str().map(str::to_string)
}

fn run_args(config: std::path::PathBuf, policy: ReloadPolicy) -> RunArgs {
    RunArgs {
        config: vec![config],
        reload_policy: policy,
        // Coalesce the truncate + write pair produced by fs::write.
        reload_debounce_ms: 300,
        ..RunArgs::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_change_swaps_instance_stop_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "a.json", r#"{"x": 1}"#);
    let builder = RecordingBuilder::default();
    let app = App::new(Arc::new(JsonConfigLoader), Arc::new(builder.clone()));
    let args = run_args(path.clone(), ReloadPolicy::StopFirst);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serve = app.serve(&args, async {
        let _ = stop_rx.await;
    });

    let driver = async {
        assert!(builder.wait_for("start x=1", WAIT).await);
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(&path, r#"{"x": 2}"#).unwrap();
        assert!(builder.wait_for("start x=2", WAIT).await, "reload never happened");

        let _ = stop_tx.send(());
    };

    let (code, ()) = tokio::join!(serve, driver);
    assert_eq!(code, 0);

    let close_old = builder.position("close x=1").unwrap();
    let start_new = builder.position("start x=2").unwrap();
    assert!(close_old < start_new, "journal: {:?}", builder.entries());
    assert_eq!(builder.entries().last().map(String::as_str), Some("close x=2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broken_config_keeps_old_instance_start_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "a.json", r#"{"x": 1}"#);
    let builder = RecordingBuilder::default();
    let app = App::new(Arc::new(JsonConfigLoader), Arc::new(builder.clone()));
    let args = run_args(path.clone(), ReloadPolicy::StartFirst);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serve = app.serve(&args, async {
        let _ = stop_rx.await;
    });

    let driver = async {
        assert!(builder.wait_for("start x=1", WAIT).await);
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(&path, r#"{"x": 2, "fail": "build"}"#).unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(builder.position("close x=1").is_none(), "old instance was closed");

        std::fs::write(&path, r#"{"x": 3}"#).unwrap();
        assert!(builder.wait_for("close x=1", WAIT).await, "reload never happened");

        let _ = stop_tx.send(());
    };

    let (code, ()) = tokio::join!(serve, driver);
    assert_eq!(code, 0);

    let start_new = builder.position("start x=3").unwrap();
    let close_old = builder.position("close x=1").unwrap();
    assert!(start_new < close_old, "journal: {:?}", builder.entries());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_http_engine_serves_new_config_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let config = |message: &str| {
        format!(
            r#"{{ "inbounds": [{{ "tag": "web", "listen": "127.0.0.1:28391", "message": "{}" }}],
                 "timeouts": {{ "shutdown_ms": 1000 }} }}"#,
            message
        )
    };
    let path = write_config(dir.path(), "config.json", &config("one"));
    let app = App::new(Arc::new(JsonConfigLoader), Arc::new(HttpEngine));
    let args = run_args(path.clone(), ReloadPolicy::StartFirst);

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serve = app.serve(&args, async {
        let _ = stop_rx.await;
    });

    let driver = async {
        let mut first = None;
        for _ in 0..50 {
            first = fetch_message(&client).await;
            if first.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(first.as_deref(), Some("one"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(&path, config("two")).unwrap();

        let deadline = tokio::time::Instant::now() + WAIT;
        let mut seen = None;
        while tokio::time::Instant::now() < deadline {
            seen = fetch_message(&client).await;
            if seen.as_deref() == Some("two") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(seen.as_deref(), Some("two"));

        let _ = stop_tx.send(());
    };

    let (code, ()) = tokio::join!(serve, driver);
    assert_eq!(code, 0);

    let after = client.get("http://127.0.0.1:28391/healthz").send().await;
    assert!(after.is_err(), "listener still open after shutdown");
}
