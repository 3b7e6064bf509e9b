//! The HTTP surface (spec §6): upload, status, result, media, export, and
//! admin-retry handlers over axum, grounded on the teacher's `dog-axum`
//! (`ensure_request_id`, `DogAxumError`-style error mapping, `TraceLayer`).

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::KlipAxumError;
pub use router::build_router;
pub use state::AppState;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use klipnote_core::{Config, JobId};
    use klipnote_media::LocalMediaStore;
    use klipnote_queue::Broker;
    use klipnote_store::MemoryJobStore;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> (AppState, std::path::PathBuf) {
        let root = std::env::temp_dir().join(format!("klipnote-http-test-{}", uuid::Uuid::new_v4()));
        let state = AppState {
            store: MemoryJobStore::new(),
            broker: Broker::new(Duration::from_secs(1800), 3),
            media: LocalMediaStore::new(&root),
            config: Config::new().snapshot(),
        };
        (state, root)
    }

    async fn json_body(res: axum::response::Response) -> serde_json::Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let (state, root) = test_state();
        let router = build_router(state);
        let res = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 200);
        assert!(res.headers().get("x-request-id").is_some());
        let body = json_body(res).await;
        assert_eq!(body["status"], "ok");
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn status_for_unknown_job_is_not_found() {
        let (state, root) = test_state();
        let router = build_router(state);
        let unknown = JobId::new();
        let res = router
            .oneshot(
                Request::builder()
                    .uri(format!("/status/{unknown}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 404);
        let body = json_body(res).await;
        assert_eq!(body["className"], "not-found");
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn status_for_malformed_job_id_is_not_found() {
        let (state, root) = test_state();
        let router = build_router(state);
        let res = router
            .oneshot(
                Request::builder()
                    .uri("/status/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 404);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn result_before_completion_is_not_ready() {
        let (state, root) = test_state();
        let job = klipnote_store::Job::new_pending(
            JobId::new(),
            klipnote_core::Model::WhisperX,
            None,
            root.join("x.wav"),
            10.0,
        );
        let id = job.id.clone();
        state.store.create(job).unwrap();
        state
            .store
            .update_status(&id, |j| {
                j.status = klipnote_store::JobState::Processing;
                j.progress = 40;
            })
            .unwrap();

        let router = build_router(state);
        let res = router
            .oneshot(
                Request::builder()
                    .uri(format!("/result/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 409);
        let body = json_body(res).await;
        assert_eq!(body["className"], "not-ready");
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn export_rejects_empty_segment_list() {
        let (state, root) = test_state();
        let job = klipnote_store::Job::new_pending(
            JobId::new(),
            klipnote_core::Model::WhisperX,
            None,
            root.join("x.wav"),
            10.0,
        );
        let id = job.id.clone();
        state.store.create(job).unwrap();

        let router = build_router(state);
        let res = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/export/{id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"segments":[],"format":"txt"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 400);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn retry_rejects_job_that_is_not_failed() {
        let (state, root) = test_state();
        let job = klipnote_store::Job::new_pending(
            JobId::new(),
            klipnote_core::Model::WhisperX,
            None,
            root.join("x.wav"),
            10.0,
        );
        let id = job.id.clone();
        state.store.create(job).unwrap();

        let router = build_router(state);
        let res = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/admin/retry/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 400);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn request_id_is_preserved_when_provided() {
        let (state, root) = test_state();
        let router = build_router(state);
        let res = router
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .header("x-request-id", "req-test-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.headers().get("x-request-id").unwrap(), "req-test-123");
        let _ = std::fs::remove_dir_all(root);
    }
}
