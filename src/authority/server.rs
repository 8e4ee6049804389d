use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::authority::handlers::{download, poll, AuthorityState};

pub fn router(state: AuthorityState) -> Router {
    Router::new()
        .route("/sections/poll", post(poll))
        .route("/sections/{name}", get(download))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the authority on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: AuthorityState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(
        address = %addr,
        directory = %state.directory().display(),
        "Configuration authority starting"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Configuration authority stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::document::DocumentVersion;
    use crate::remote::protocol::{RemoteSectionCollection, RemoteSectionParam};
    use crate::lifecycle::Shutdown;
    use tempfile::TempDir;

    async fn start(dir: &TempDir) -> (String, Shutdown) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let state = AuthorityState::new(dir.path(), &base);
        let shutdown = Shutdown::new();
        tokio::spawn(serve(listener, state, shutdown.subscribe()));
        (base, shutdown)
    }

    fn poll_request(sections: Vec<RemoteSectionParam>) -> RemoteSectionCollection {
        RemoteSectionCollection::new("host-1", "billing").with_sections(sections)
    }

    #[tokio::test]
    async fn test_poll_lists_only_newer_sections() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Fresh.config"), "majorVersion = 1\nminorVersion = 4\n").unwrap();
        std::fs::write(dir.path().join("current.config"), "majorVersion = 1\nminorVersion = 2\n").unwrap();
        let (base, _shutdown) = start(&dir).await;

        let response: RemoteSectionCollection = reqwest::Client::new()
            .post(format!("{base}/sections/poll"))
            .json(&poll_request(vec![
                RemoteSectionParam::request("fresh", DocumentVersion::new(1, 3)),
                RemoteSectionParam::request("current", DocumentVersion::new(1, 2)),
                RemoteSectionParam::request("unknown", DocumentVersion::new(1, -1)),
            ]))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(response.application_name, "billing");
        assert_eq!(response.sections.len(), 1);
        let fresh = &response.sections[0];
        assert_eq!(fresh.version(), DocumentVersion::new(1, 4));
        assert_eq!(fresh.download_url.as_deref(), Some(format!("{base}/sections/fresh").as_str()));
    }

    #[tokio::test]
    async fn test_poll_reports_other_major() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.config"), "majorVersion = 2\nminorVersion = 0\n").unwrap();
        let (base, _shutdown) = start(&dir).await;

        let response: RemoteSectionCollection = reqwest::Client::new()
            .post(format!("{base}/sections/poll"))
            .json(&poll_request(vec![RemoteSectionParam::request("app", DocumentVersion::new(1, 7))]))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(response.sections[0].major_version, 2);
    }

    #[tokio::test]
    async fn test_download_serves_document_text() {
        let dir = TempDir::new().unwrap();
        let text = "majorVersion = 1\nminorVersion = 1\nmode = \"blue\"\n";
        std::fs::write(dir.path().join("app.config"), text).unwrap();
        let (base, _shutdown) = start(&dir).await;

        let body = reqwest::get(format!("{base}/sections/APP")).await.unwrap().text().await.unwrap();
        assert_eq!(body, text);

        let missing = reqwest::get(format!("{base}/sections/absent")).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let bad = reqwest::get(format!("{base}/sections/a..b")).await.unwrap();
        assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);
    }
}
