#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{Body, Bytes},
        http::{header, Request, StatusCode},
        middleware::from_fn,
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::middleware::envelope::{
        envelope, envelope_middleware, skip_envelope, unreadable_body, EnvelopeMeta, Payload, SkipEnvelope,
    };
    use crate::reply::Reply;

    fn meta() -> EnvelopeMeta {
        EnvelopeMeta::new("req-1", Duration::from_micros(1500))
    }

    fn app() -> Router {
        Router::new()
            .route("/object", get(|| async { Json(json!({"a": 1, "b": [true]})) }))
            .route("/with-meta", get(|| async { Json(json!({"a": 1, "meta": {"page": 3, "request_id": "stale"}})) }))
            .route("/text", get(|| async { "pong!" }))
            .route("/number", get(|| async { Json(json!(42)) }))
            .route(
                "/broken",
                get(|| async { ([(header::CONTENT_TYPE, "application/json")], "{not json") }),
            )
            .route(
                "/binary",
                get(|| async { ([(header::CONTENT_TYPE, "application/octet-stream")], vec![0u8, 159, 146, 150]) }),
            )
            .route("/raw-route", get(|| async { "untouched" }).layer(from_fn(skip_envelope)))
            .route("/raw-part", get(|| async { (SkipEnvelope, "untouched") }))
            .route("/no-content", get(|| async { StatusCode::NO_CONTENT }))
            .route("/missing", get(|| async { Reply::not_found(None).into_response() }))
            .layer(from_fn(envelope_middleware))
    }

    async fn call(uri: &str, request_id: Option<&str>) -> (StatusCode, axum::http::HeaderMap, Bytes) {
        let mut req = Request::builder().uri(uri);
        if let Some(id) = request_id {
            req = req.header("x-request-id", id);
        }
        let res = app().oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    fn assert_meta(v: &Value) {
        let m = &v["meta"];
        assert!(m["timestamp"].is_string());
        assert!(m["request_id"].is_string());
        assert!(m["response_time"].as_str().unwrap().ends_with("ms"));
    }

    #[test]
    fn test_meta_format() {
        let m = meta();
        assert_eq!(m.request_id, "req-1");
        assert_eq!(m.response_time, "1.50ms");
        // YYYY-MM-DDTHH:mm:ss+HH:MM
        assert_eq!(m.timestamp.len(), 25);
        assert_eq!(&m.timestamp[10..11], "T");
    }

    #[test]
    fn test_classify() {
        let obj = Payload::classify(Some("application/json"), Bytes::from_static(b"{\"a\":1}"));
        assert!(matches!(obj, Payload::Object(_)));

        let arr = Payload::classify(Some("application/json; charset=utf-8"), Bytes::from_static(b"[1,2]"));
        assert_eq!(arr, Payload::Value(json!([1, 2])));

        let problem = Payload::classify(Some("application/problem+json"), Bytes::from_static(b"{}"));
        assert!(matches!(problem, Payload::Object(_)));

        let text = Payload::classify(Some("text/plain; charset=utf-8"), Bytes::from_static(b"hi"));
        assert_eq!(text, Payload::Value(json!("hi")));

        let empty = Payload::classify(None, Bytes::new());
        assert_eq!(empty, Payload::Value(Value::Null));

        let broken = Payload::classify(Some("application/json"), Bytes::from_static(b"{oops"));
        assert_eq!(broken, Payload::Raw(Bytes::from_static(b"{oops")));

        let html = Payload::classify(Some("text/html"), Bytes::from_static(b"<p>"));
        assert!(matches!(html, Payload::Raw(_)));
    }

    #[test]
    fn test_object_keeps_keys_and_gets_meta() {
        let payload = Payload::Object(json!({"a": 1, "nested": {"x": null}}).as_object().unwrap().clone());
        let out = envelope(payload, meta()).unwrap();
        assert_eq!(out["a"], 1);
        assert_eq!(out["nested"], json!({"x": null}));
        assert_eq!(out["meta"]["request_id"], "req-1");
        assert_meta(&out);
        assert_eq!(out.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_handler_meta_is_merged_but_injected_keys_are_fresh() {
        let payload = Payload::Object(
            json!({"meta": {"page": 1, "totalPage": 4, "request_id": "old", "timestamp": "old"}})
                .as_object()
                .unwrap()
                .clone(),
        );
        let out = envelope(payload, meta()).unwrap();
        assert_eq!(out["meta"]["page"], 1);
        assert_eq!(out["meta"]["totalPage"], 4);
        assert_eq!(out["meta"]["request_id"], "req-1");
        assert_ne!(out["meta"]["timestamp"], "old");
    }

    #[test]
    fn test_non_object_meta_is_replaced() {
        let payload = Payload::Object(json!({"meta": 5}).as_object().unwrap().clone());
        let out = envelope(payload, meta()).unwrap();
        assert_meta(&out);
    }

    #[test]
    fn test_scalar_is_wrapped() {
        let out = envelope(Payload::Value(json!("pong!")), meta()).unwrap();
        assert_eq!(out["data"], "pong!");
        assert_meta(&out);
        assert_eq!(out.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_raw_is_not_enveloped() {
        assert!(envelope(Payload::Raw(Bytes::from_static(b"\x00")), meta()).is_none());
    }

    #[tokio::test]
    async fn test_middleware_object_body() {
        let (status, headers, body) = call("/object", Some("abc-123")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["a"], 1);
        assert_eq!(v["b"], json!([true]));
        assert_eq!(v["meta"]["request_id"], "abc-123");
        assert_meta(&v);
    }

    #[tokio::test]
    async fn test_middleware_generates_request_id_when_absent() {
        let (_, _, body) = call("/object", None).await;
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert!(!v["meta"]["request_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_middleware_merges_handler_meta() {
        let (_, _, body) = call("/with-meta", Some("fresh")).await;
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["meta"]["page"], 3);
        assert_eq!(v["meta"]["request_id"], "fresh");
    }

    #[tokio::test]
    async fn test_middleware_wraps_text_and_scalars() {
        let (_, headers, body) = call("/text", None).await;
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["data"], "pong!");
        assert_meta(&v);

        let (_, _, body) = call("/number", None).await;
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["data"], 42);
    }

    #[tokio::test]
    async fn test_middleware_passes_through_malformed_json() {
        let (status, _, body) = call("/broken", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"{not json");
    }

    #[tokio::test]
    async fn test_middleware_passes_through_binary() {
        let (_, headers, body) = call("/binary", None).await;
        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert_eq!(&body[..], &[0u8, 159, 146, 150]);
    }

    #[tokio::test]
    async fn test_opt_out_via_route_layer_and_response_part() {
        let (_, _, body) = call("/raw-route", None).await;
        assert_eq!(&body[..], b"untouched");
        let (_, _, body) = call("/raw-part", None).await;
        assert_eq!(&body[..], b"untouched");
    }

    #[tokio::test]
    async fn test_no_content_stays_empty() {
        let (status, _, body) = call("/no-content", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_error_response_keeps_status_and_shape() {
        let (status, _, body) = call("/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["code"], 404);
        assert_eq!(v["error"]["message"], "Resource not found");
        assert_meta(&v);
    }

    #[tokio::test]
    async fn test_unreadable_body_becomes_enveloped_500() {
        let res = unreadable_body(meta());
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["code"], 500);
        assert_eq!(v["meta"]["request_id"], "req-1");
        assert_meta(&v);
    }
}
