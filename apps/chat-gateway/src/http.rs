//! Chat submission surface (C7 Command Processor, exposed over HTTP).
//!
//! Pipeline per request: read sender identity from the auth context header
//! (C1) → validate the request (C1) → admission control (C5) → stamp the
//! event with the ambient clock/correlation id (C2) → append to the log
//! (C6) → respond with the `EnrichedEvent`. Any typed error short-circuits
//! the pipeline and is returned as-is; `ChatifyError`'s `IntoResponse` impl
//! does the §4.11 status mapping.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::post,
    Json, Router,
};
use chatify_core::{
    correlation_id_from_header, current_correlation_id, new_correlation_id, with_correlation_id,
    ChatEvent, ChatifyError, Clock, EnrichedEvent, SendRequest, SystemClock,
};
use chatify_producer::SharedEventProducer;
use chatify_ratelimit::{Decision, SharedRateLimiter};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const SENDER_HEADER: &str = "x-sender-id";
const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct GatewayState {
    pub producer: SharedEventProducer,
    pub rate_limiter: SharedRateLimiter,
    pub clock: Arc<dyn Clock>,
    pub replica_id: String,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/v1/messages", post(send_message))
        .layer(middleware::from_fn(correlation_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn correlation_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let header_value = req
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok());
    let correlation_id = correlation_id_from_header(header_value);
    let echoed = correlation_id.clone();
    let mut response = with_correlation_id(correlation_id, next.run(req)).await;
    if let Ok(value) = HeaderValue::from_str(&echoed) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-correlation-id"), value);
    }
    response
}

async fn send_message(
    State(state): State<Arc<GatewayState>>,
    headers: axum::http::HeaderMap,
    Json(req): Json<SendRequest>,
) -> Result<Json<EnrichedEvent>, ChatifyError> {
    let sender_id = headers
        .get(SENDER_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ChatifyError::AuthRequired)?
        .to_string();

    chatify_core::validate_send_request(&req, &sender_id)?;

    match state.rate_limiter.check_and_increment(&sender_id).await {
        Ok(Decision::Allowed) => {}
        Ok(Decision::Denied { retry_after }) => {
            metrics::counter!("chatify_rate_limit_denied_total").increment(1);
            return Err(ChatifyError::RateLimitExceeded {
                retry_after_secs: retry_after.as_secs(),
            });
        }
        Err(err) => return Err(ChatifyError::TransientStoreError(err)),
    }

    let event = ChatEvent {
        message_id: Uuid::new_v4(),
        scope_type: req.scope_type,
        scope_id: req.scope_id,
        sender_id,
        text: req.text,
        created_at_utc: state.clock.now_utc(),
        origin_pod_id: state.replica_id.clone(),
    };

    tracing::info!(
        correlation_id = %current_correlation_id(),
        component = "command_processor",
        message_id = %event.message_id,
        scope_id = %event.scope_id,
        "accepted chat event"
    );

    let position = state
        .producer
        .produce(&event)
        .await
        .map_err(|err| ChatifyError::EventProductionFailed(anyhow::Error::new(err)))?;

    Ok(Json(EnrichedEvent {
        event,
        partition: position.partition,
        offset: position.offset,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use chatify_producer::InMemoryEventProducer;
    use chatify_ratelimit::{LocalRateLimiter, RateLimit, RateLimits};
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> GatewayState {
        GatewayState {
            producer: Arc::new(InMemoryEventProducer::new(4)),
            rate_limiter: Arc::new(LocalRateLimiter::new(RateLimits {
                default: RateLimit {
                    limit_per_window: 5,
                    window: Duration::from_secs(1),
                },
                overrides: HashMap::new(),
            })),
            clock: Arc::new(SystemClock),
            replica_id: "replica-a".into(),
        }
    }

    fn post_json(body: serde_json::Value, sender: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .method("POST")
            .uri("/v1/messages")
            .header("content-type", "application/json");
        if let Some(sender) = sender {
            builder = builder.header(SENDER_HEADER, sender);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn happy_path_returns_enriched_event() {
        let router = build_router(test_state());
        let body = serde_json::json!({"scopeType": 0, "scopeId": "general", "text": "hi"});
        let response = router
            .oneshot(post_json(body, Some("u-1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["scopeId"], "general");
        assert_eq!(json["senderId"], "u-1");
        assert!(json["offset"].is_number());
    }

    #[tokio::test]
    async fn missing_sender_header_is_401() {
        let router = build_router(test_state());
        let body = serde_json::json!({"scopeType": 0, "scopeId": "general", "text": "hi"});
        let response = router.oneshot(post_json(body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn whitespace_scope_id_is_400() {
        let router = build_router(test_state());
        let body = serde_json::json!({"scopeType": 0, "scopeId": "   ", "text": "x"});
        let response = router
            .oneshot(post_json(body, Some("u-1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sixth_send_within_window_is_rate_limited() {
        let router = build_router(test_state());
        for _ in 0..5 {
            let body = serde_json::json!({"scopeType": 0, "scopeId": "general", "text": "hi"});
            let response = router
                .clone()
                .oneshot(post_json(body, Some("u-2")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let body = serde_json::json!({"scopeType": 0, "scopeId": "general", "text": "hi"});
        let response = router
            .oneshot(post_json(body, Some("u-2")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get("retry-after").is_some());
    }

    #[tokio::test]
    async fn correlation_id_is_echoed_back() {
        let router = build_router(test_state());
        let mut request = post_json(
            serde_json::json!({"scopeType": 0, "scopeId": "general", "text": "hi"}),
            Some("u-1"),
        );
        request
            .headers_mut()
            .insert(CORRELATION_HEADER, HeaderValue::from_static("corr-xyz"));
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(CORRELATION_HEADER).unwrap(),
            "corr-xyz"
        );
    }

    #[test]
    fn new_correlation_id_is_never_empty() {
        assert!(!new_correlation_id().is_empty());
    }
}
