//! Helpers shared by the integration tests.

#![allow(dead_code)]

use axum::Router;
use axum::http::StatusCode;
use axum::routing::any;
use reconfy::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// How long any condition may take to come true.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Local HTTP endpoint counting webhook calls and answering with a settable status.
pub struct StubWebhook {
    pub url: String,
    hits: Arc<AtomicUsize>,
    status: Arc<AtomicU16>,
    server: JoinHandle<()>,
}

impl StubWebhook {
    pub async fn start(status: u16) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let status = Arc::new(AtomicU16::new(status));

        let app = {
            let hits = Arc::clone(&hits);
            let status = Arc::clone(&status);
            Router::new().route(
                "/{*path}",
                any(move || {
                    let hits = Arc::clone(&hits);
                    let status = Arc::clone(&status);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        StatusCode::from_u16(status.load(Ordering::SeqCst))
                            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                    }
                }),
            )
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/-/reload", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url,
            hits,
            status,
            server,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }
}

impl Drop for StubWebhook {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Poll `condition` until it holds, panicking after [`WAIT_TIMEOUT`].
pub async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

/// Spawn `reloader.watch()` and wait until its first pass has run.
pub async fn start(reloader: &Arc<Reloader>) -> JoinHandle<Result<()>> {
    let handle = {
        let reloader = Arc::clone(reloader);
        tokio::spawn(async move { reloader.watch().await })
    };
    wait_for("the initial pass", || reloader.last_reconcile().passes >= 1).await;
    assert_eq!(reloader.state(), WatchState::Running);
    handle
}

/// Close `reloader` and return what `watch` returned.
pub async fn stop(reloader: &Reloader, handle: JoinHandle<Result<()>>) -> Result<()> {
    reloader.close();
    tokio::time::timeout(WAIT_TIMEOUT, handle)
        .await
        .expect("watch did not return after close")
        .expect("watch task panicked")
}

/// Give a quiet period for stray events to be (not) processed.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(400)).await;
}
