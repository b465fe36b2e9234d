//! # Gateway HTTP Flows
//!
//! The REST convention through the full router: the demo services behind
//! the in-memory broker, driven request by request with `tower::oneshot`.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use switchboard_broker::{Broker, InMemoryBroker};
    use switchboard_client::RpcClient;
    use switchboard_dispatch::{DispatcherConfig, ServiceDispatcher};
    use switchboard_gateway::{GatewayConfig, GatewayService};
    use switchboard_runtime::demo;

    // =========================================================================
    // HARNESS
    // =========================================================================

    /// The demo services behind a gateway router with its full middleware
    /// stack, all rooted on one fresh broker.
    async fn demo_gateway(call_timeout: Duration) -> Router {
        let broker = Arc::new(InMemoryBroker::new());
        for (service, registry) in [
            ("inventory", demo::inventory_registry()),
            ("billing", demo::billing_registry()),
        ] {
            let dispatcher = ServiceDispatcher::new(
                Arc::clone(&broker) as Arc<dyn Broker>,
                service,
                registry,
                DispatcherConfig::default(),
            );
            dispatcher.start().await.expect("dispatcher start");
        }

        let client = RpcClient::new(Arc::clone(&broker) as Arc<dyn Broker>);
        let config = GatewayConfig {
            call_timeout,
            ..GatewayConfig::default()
        };
        GatewayService::new(client, config)
            .expect("gateway config")
            .router()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.expect("request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn with_json(method: Method, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    // =========================================================================
    // VERB MAPPING
    // =========================================================================

    #[tokio::test]
    async fn test_get_by_id_reaches_the_seeded_record() {
        let router = demo_gateway(Duration::from_secs(2)).await;

        let (status, body) = send(&router, get("/api/inventory/items/42")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"id": 42, "name": "Widget"}));
    }

    #[tokio::test]
    async fn test_collection_crud_conversation() {
        let router = demo_gateway(Duration::from_secs(2)).await;

        // Create: the store assigns the next id above the seeds.
        let (status, created) = send(
            &router,
            with_json(
                Method::POST,
                "/api/billing/invoices",
                &json!({"total": 17.5, "status": "open"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["id"], json!(3));
        assert_eq!(created["total"], json!(17.5));

        // Update merges fields into the stored record.
        let (status, updated) = send(
            &router,
            with_json(
                Method::PUT,
                "/api/billing/invoices/3",
                &json!({"status": "paid"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated, json!({"id": 3, "status": "paid", "total": 17.5}));

        // Query params travel as a string-valued filter object.
        let (status, paid) = send(&router, get("/api/billing/invoices?status=paid")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(paid.as_array().expect("array body").len(), 2);

        // Delete, then the record is gone.
        let (status, _) = send(
            &router,
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/billing/invoices/3")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&router, get("/api/billing/invoices/3")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().expect("error message");
        assert!(message.contains("no record with id 3"), "got: {message}");
    }

    #[tokio::test]
    async fn test_unmapped_verbs_are_rejected() {
        let router = demo_gateway(Duration::from_secs(2)).await;

        let patch = Request::builder()
            .method(Method::PATCH)
            .uri("/api/billing/invoices")
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&router, patch).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(body["error"].as_str().expect("error").contains("PATCH"));

        // POST addresses collections, not single resources.
        let (status, _) = send(
            &router,
            with_json(Method::POST, "/api/billing/invoices/1", &json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    // =========================================================================
    // FAILURE TRANSLATION
    // =========================================================================

    #[tokio::test]
    async fn test_unknown_controller_is_an_error_not_an_outage() {
        let router = demo_gateway(Duration::from_secs(2)).await;

        let (status, body) = send(&router, get("/api/inventory/ghosts")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().expect("error message");
        assert!(
            message.contains("action not found: ghosts.getAllAction"),
            "got: {message}"
        );

        // The service is still on the air.
        let (status, body) = send(&router, get("/api/inventory/items/42")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Widget");
    }

    #[tokio::test]
    async fn test_unknown_service_surfaces_a_timeout_body() {
        // Short deadline so the missing service answers quickly.
        let router = demo_gateway(Duration::from_millis(100)).await;

        let (status, body) = send(&router, get("/api/nowhere/things")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().expect("error message");
        assert!(message.contains("timed out"), "got: {message}");
    }

    // =========================================================================
    // MIDDLEWARE
    // =========================================================================

    #[tokio::test]
    async fn test_health_and_cors_through_the_middleware_stack() {
        let router = demo_gateway(Duration::from_secs(2)).await;

        let request = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .header(header::ORIGIN, "http://example.com")
            .body(Body::empty())
            .expect("request");
        let response = router.clone().oneshot(request).await.expect("request");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|value| value.to_str().ok()),
            Some("*")
        );

        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body, json!({"status": "ok"}));
    }
}
