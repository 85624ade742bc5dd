//! Control API for session lifecycle, job inspection, and export.
//!
//! Thin JSON layer over the service and repositories: every mutation goes
//! through `SessionService`, so the API enforces the same state-machine
//! rules as the CLI.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::browser::HttpBrowserProvider;
use crate::config::Settings;
use crate::repository::{JobRepository, PolicyRepository, SessionRepository};
use crate::services::SessionService;

/// Shared state for the control API.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SessionService>,
    pub sessions: SessionRepository,
    pub jobs: JobRepository,
    pub records: PolicyRepository,
    /// Default portal id for sessions started via the API.
    pub portal_id: String,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let sessions = SessionRepository::new(&settings.database_path)?;
        let jobs = JobRepository::new(&settings.database_path)?;
        let records = PolicyRepository::new(&settings.database_path)?;

        let provider = Arc::new(HttpBrowserProvider::new(settings.provider.api_url.clone()));
        let service = Arc::new(SessionService::new(
            sessions.clone(),
            jobs.clone(),
            provider,
            settings.provider.clone(),
        ));

        Ok(Self {
            service,
            sessions,
            jobs,
            records,
            portal_id: settings.portal.id.clone(),
        })
    }
}

/// Start the control API server.
pub async fn serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;
    let app = create_router(state);

    let addr: SocketAddr = bind.parse()?;
    tracing::info!("control API listening at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::browser::BrowserProvider;
    use crate::error::Result;
    use async_trait::async_trait;

    struct FakeProvider;

    #[async_trait]
    impl BrowserProvider for FakeProvider {
        async fn allocate(&self, _profile: Option<&str>) -> Result<String> {
            Ok("alloc-1".to_string())
        }
        async fn connection_endpoint(&self, _allocation_id: &str) -> Result<String> {
            Ok("http://127.0.0.1:9222".to_string())
        }
        async fn release(&self, _allocation_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn setup_test_app() -> (axum::Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let sessions = SessionRepository::new(&db_path).unwrap();
        let jobs = JobRepository::new(&db_path).unwrap();
        let records = PolicyRepository::new(&db_path).unwrap();
        let service = Arc::new(SessionService::new(
            sessions.clone(),
            jobs.clone(),
            Arc::new(FakeProvider),
            crate::config::ProviderSettings {
                retry_delay_secs: 0,
                ..Default::default()
            },
        ));

        let state = AppState {
            service,
            sessions,
            jobs,
            records,
            portal_id: "keystone".to_string(),
        };
        (create_router(state), dir)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn start_session(app: &axum::Router) -> serde_json::Value {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sessions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"job_name":"June book"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[tokio::test]
    async fn test_session_lifecycle_over_api() {
        let (app, _dir) = setup_test_app();

        let session = start_session(&app).await;
        assert_eq!(session["status"], "waiting_for_login");
        let id = session["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/sessions/{id}/confirm-ready"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ready");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/sessions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ready");
    }

    #[tokio::test]
    async fn test_scrape_claims_a_ready_session() {
        let (app, _dir) = setup_test_app();
        let session = start_session(&app).await;
        let id = session["id"].as_str().unwrap();

        // Not yet ready: the claim is rejected as a conflict.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/sessions/{id}/scrape"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/sessions/{id}/confirm-ready"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/sessions/{id}/scrape"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "scraping");

        // The claim is single-winner: a repeat is a conflict.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/sessions/{id}/scrape"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_confirm_ready_without_login_wait_conflicts() {
        let (app, _dir) = setup_test_app();
        let session = start_session(&app).await;
        let id = session["id"].as_str().unwrap();

        // Claim the session so it is no longer waiting or ready.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/sessions/{id}/confirm-ready"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Stopping and then confirming again is rejected, not applied.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/sessions/{id}/stop"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let (app, _dir) = setup_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/sessions/no-such-session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_job_records_and_export() {
        let (app, _dir) = setup_test_app();
        let session = start_session(&app).await;
        let job_id = session["job_id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/jobs/{job_id}/records"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 0);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/jobs/{job_id}/export"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        assert!(content_type.contains("text/csv"));
    }
}
