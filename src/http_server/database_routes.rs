//! Database HTTP Routes
//!
//! The database's wire surface. Handlers pass the bearer credential through
//! untouched; verification and row policies happen inside the database on
//! every statement.

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, patch},
    Json, Router,
};

use super::errors::{query_error, ApiError};
use super::state::AppState;
use crate::database::{NewTodo, QueryError, Todo, TodoPatch, TodoQuery};

pub fn database_routes(state: AppState) -> Router {
    Router::new()
        .route("/todos", get(list_todos).post(insert_todo))
        .route("/todos/:id", patch(update_todo).delete(delete_todo))
        .with_state(state)
}

/// Token from `Authorization: Bearer <token>`. The scheme is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let (scheme, token) = headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim_start()
        .split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

async fn list_todos(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TodoQuery>,
) -> Result<Json<Vec<Todo>>, ApiError> {
    let conn = state
        .database
        .connect(bearer_token(&headers))
        .map_err(query_error)?;
    conn.select_todos(&query).map(Json).map_err(query_error)
}

async fn insert_todo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new): Json<NewTodo>,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let conn = state
        .database
        .connect(bearer_token(&headers))
        .map_err(query_error)?;
    let todo = conn.insert_todo(&new).map_err(query_error)?;
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn update_todo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<TodoPatch>,
) -> Result<Json<Todo>, ApiError> {
    let conn = state
        .database
        .connect(bearer_token(&headers))
        .map_err(query_error)?;
    conn.update_todo(id, &patch)
        .map_err(query_error)?
        .map(Json)
        .ok_or_else(|| query_error(QueryError::NotFound))
}

async fn delete_todo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let conn = state
        .database
        .connect(bearer_token(&headers))
        .map_err(query_error)?;
    match conn.delete_todo(id).map_err(query_error)? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(query_error(QueryError::NotFound)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::config::AppConfig;
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn setup() -> (AppState, Router) {
        let state = AppState::from_config(&AppConfig::default()).unwrap();
        (state.clone(), database_routes(state))
    }

    fn token(state: &AppState, identity: Identity) -> String {
        state.signer().issue(identity, None).unwrap().into_string()
    }

    fn request(
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(bearer) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", bearer));
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, "bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, "BEARER  abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, "Bearerabc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_missing_credential_is_401() {
        let (_, router) = setup();
        let response = router.oneshot(request("GET", "/todos", None, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "credential_missing");
    }

    #[tokio::test]
    async fn test_expired_credential_is_rejected_not_empty() {
        let (state, router) = setup();
        let stale = state
            .signer()
            .issue_at(Identity::generate(), None, Utc::now() - Duration::hours(1))
            .unwrap()
            .into_string();

        let response = router
            .oneshot(request("GET", "/todos", Some(&stale), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "credential_rejected");
    }

    #[tokio::test]
    async fn test_insert_then_list() {
        let (state, router) = setup();
        let alice = Identity::generate();
        let bearer = token(&state, alice);

        let created = router
            .clone()
            .oneshot(request(
                "POST",
                "/todos",
                Some(&bearer),
                Some(serde_json::json!({"task": "buy milk"})),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let todo = json_body(created).await;
        assert_eq!(todo["user_id"], alice.to_string());

        let listed = router
            .oneshot(request("GET", "/todos", Some(&bearer), None))
            .await
            .unwrap();
        let rows = json_body(listed).await;
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["task"], "buy milk");
    }

    #[tokio::test]
    async fn test_insert_for_other_owner_is_403() {
        let (state, router) = setup();
        let bearer = token(&state, Identity::generate());

        let response = router
            .oneshot(request(
                "POST",
                "/todos",
                Some(&bearer),
                Some(serde_json::json!({"task": "x", "user_id": Identity::generate()})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["code"], "policy_violation");
    }

    #[tokio::test]
    async fn test_foreign_rows_are_not_found() {
        let (state, router) = setup();
        let alice = token(&state, Identity::generate());
        let bob = token(&state, Identity::generate());

        let created = router
            .clone()
            .oneshot(request(
                "POST",
                "/todos",
                Some(&alice),
                Some(serde_json::json!({"task": "alice's"})),
            ))
            .await
            .unwrap();
        let id = json_body(created).await["id"].as_i64().unwrap();
        let uri = format!("/todos/{}", id);

        let patched = router
            .clone()
            .oneshot(request(
                "PATCH",
                &uri,
                Some(&bob),
                Some(serde_json::json!({"is_complete": true})),
            ))
            .await
            .unwrap();
        assert_eq!(patched.status(), StatusCode::NOT_FOUND);

        let deleted = router
            .clone()
            .oneshot(request("DELETE", &uri, Some(&bob), None))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NOT_FOUND);

        let deleted = router
            .oneshot(request("DELETE", &uri, Some(&alice), None))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_completion_filter_in_query_string() {
        let (state, router) = setup();
        let bearer = token(&state, Identity::generate());

        for task in ["one", "two"] {
            router
                .clone()
                .oneshot(request(
                    "POST",
                    "/todos",
                    Some(&bearer),
                    Some(serde_json::json!({ "task": task })),
                ))
                .await
                .unwrap();
        }
        router
            .clone()
            .oneshot(request(
                "PATCH",
                "/todos/1",
                Some(&bearer),
                Some(serde_json::json!({"is_complete": true})),
            ))
            .await
            .unwrap();

        let response = router
            .oneshot(request(
                "GET",
                "/todos?owner=current&is_complete=false",
                Some(&bearer),
                None,
            ))
            .await
            .unwrap();
        let rows = json_body(response).await;
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["task"], "two");
    }
}
