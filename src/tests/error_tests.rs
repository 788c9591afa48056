#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::{json, Value};

    use crate::error::{AppError, OptionExt};
    use crate::reply::{Details, PaginationError};

    async fn render(err: AppError) -> (StatusCode, Value) {
        let res = err.into_response();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_status_codes() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::ValidationFailure(Details::new()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::Internal(anyhow::anyhow!("x")), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let (status, body) = render(err).await;
            assert_eq!(status, expected);
            assert_eq!(body["code"], expected.as_u16());
            assert_eq!(body["success"], false);
        }
    }

    #[tokio::test]
    async fn test_client_messages_pass_through() {
        let (_, body) = render(AppError::not_found("User")).await;
        assert_eq!(body["message"], "User not found");
        assert_eq!(body["error"], json!({"message": "User not found"}));
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (_, body) = render(AppError::Internal(anyhow::anyhow!("secret stack"))).await;
        assert_eq!(body["message"], "An internal server error occurred");
        assert!(body["error"]["details"]["error_id"].is_string());
        assert!(!body.to_string().contains("secret stack"));

        let (_, body) = render(AppError::Database("no such column: pwd".into())).await;
        assert_eq!(body["message"], "A database error occurred");
        assert!(!body.to_string().contains("pwd"));
    }

    #[tokio::test]
    async fn test_validation_failure_carries_fields() {
        let (_, body) = render(AppError::invalid_field("email", "must contain @")).await;
        assert_eq!(body["message"], "Validation Error");
        assert_eq!(body["error"]["details"], json!({"email": "must contain @"}));
    }

    #[test]
    fn test_sqlx_conversions() {
        assert!(matches!(AppError::from(sqlx::Error::RowNotFound), AppError::NotFound(_)));
        assert!(matches!(AppError::from(sqlx::Error::PoolTimedOut), AppError::ServiceUnavailable(_)));
        assert!(matches!(AppError::from(sqlx::Error::PoolClosed), AppError::ServiceUnavailable(_)));
        assert!(matches!(AppError::from(sqlx::Error::WorkerCrashed), AppError::Database(_)));
    }

    #[test]
    fn test_pagination_error_is_bad_request() {
        let err = AppError::from(PaginationError::InvalidArgument("limit must be greater than zero"));
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("limit")));
    }

    #[test]
    fn test_display_and_source() {
        use std::error::Error;

        assert_eq!(AppError::Conflict("taken".into()).to_string(), "Conflict: taken");
        assert!(AppError::Internal(anyhow::anyhow!("inner")).source().is_some());
        assert!(AppError::BadRequest("x".into()).source().is_none());
        assert_eq!(AppError::invalid_field("email", "bad").to_string(), "Validation failed for: email");
    }

    #[test]
    fn test_option_ext() {
        assert_eq!(Some(3).ok_or_not_found("Thing").unwrap(), 3);
        let err = None::<i32>.ok_or_not_found("Thing").unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "Thing not found"));
    }

    #[tokio::test]
    async fn test_extractor_rejections_are_bad_request() {
        use axum::extract::{FromRequestParts, Path, Query};
        use axum::http::Request;

        let (mut parts, _) = Request::get("/users?page=abc").body(()).unwrap().into_parts();
        let rejection = Query::<std::collections::HashMap<String, u64>>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        let (status, body) = render(AppError::from(rejection)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("query"));

        // No route params in the request extensions
        let (mut parts, _) = Request::get("/users/abc").body(()).unwrap().into_parts();
        let rejection = Path::<i64>::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(AppError::from(rejection), AppError::BadRequest(_)));
    }
}
