use std::net::SocketAddr;
use axum::{http::StatusCode, Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::state::AppState;
use crate::{plans, users, voice, webhooks};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1",
              Router::new()
                  .merge(users::router())
                  .merge(plans::router())
                  .merge(webhooks::router())
                  .merge(voice::router())
                  .route("/health", get(|| async { "ok" }))
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
        .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn internal<E: std::error::Error>(e: E) -> (StatusCode, String) {
    tracing::error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::sign_for_tests;
    use crate::webhooks::signature;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn bearer(state: &AppState, sub: &str) -> String {
        format!("Bearer {}", sign_for_tests(&state.config.jwt, sub))
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn json_request(method: &str, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn plan_body(user_id: &str, name: &str) -> Value {
        json!({
            "userId": user_id,
            "name": name,
            "workoutPlan": {
                "schedule": ["Monday", "Wednesday", "Friday"],
                "exercises": [{
                    "day": "Monday",
                    "routines": [{"name": "Squat", "sets": 5, "reps": 5}]
                }]
            },
            "dietPlan": {
                "dailyCalories": 2400,
                "meals": [{"name": "Breakfast", "foods": ["Oats", "Eggs"]}]
            },
            "isActive": true
        })
    }

    fn clerk_event(kind: &str, id: &str, first: &str, email: &str) -> Value {
        json!({
            "type": kind,
            "data": {
                "id": id,
                "first_name": first,
                "last_name": "Doe",
                "email_addresses": [{"email_address": email}],
                "image_url": "https://img.clerk.com/avatar"
            }
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_app(AppState::fake());
        let (status, _) = send(&app, get("/api/v1/health", None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn webhook_upserts_instead_of_duplicating() {
        let app = build_app(AppState::fake());

        let (status, first) = send(
            &app,
            json_request("POST", "/api/v1/webhooks/clerk", None, clerk_event("user.created", "user_1", "Jane", "jane@x.io")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["created"], json!(true));

        let (_, second) = send(
            &app,
            json_request("POST", "/api/v1/webhooks/clerk", None, clerk_event("user.updated", "user_1", "Janet", "janet@x.io")),
        )
        .await;
        assert_eq!(second["created"], json!(false));
        assert_eq!(first["user_id"], second["user_id"]);

        let (status, user) = send(&app, get("/api/v1/users/user_1", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["name"], json!("Janet Doe"));
        assert_eq!(user["email"], json!("janet@x.io"));
    }

    #[tokio::test]
    async fn webhook_and_sync_store_the_same_email_form() {
        let state = AppState::fake();
        let auth = bearer(&state, "user_3");
        let app = build_app(state);

        let (status, _) = send(
            &app,
            json_request("POST", "/api/v1/webhooks/clerk", None, clerk_event("user.created", "user_3", "Kim", "Kim@X.io")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, user) = send(&app, get("/api/v1/users/user_3", None)).await;
        assert_eq!(user["email"], json!("kim@x.io"));

        let body = json!({"clerkId": "user_3", "name": "Kim Doe", "email": "KIM@x.io"});
        let (status, _) = send(&app, json_request("POST", "/api/v1/users/sync", Some(&auth), body)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, user) = send(&app, get("/api/v1/users/user_3", None)).await;
        assert_eq!(user["email"], json!("kim@x.io"));
    }

    #[tokio::test]
    async fn webhook_ignores_other_events_and_rejects_bad_json() {
        let app = build_app(AppState::fake());
        let (status, body) = send(
            &app,
            json_request("POST", "/api/v1/webhooks/clerk", None, json!({"type": "session.ended", "data": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ignored"));

        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/clerk")
            .body(Body::from("not json"))
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_checks_signature_when_secret_is_set() {
        let mut state = AppState::fake();
        let secret = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
        let mut config = (*state.config).clone();
        config.webhook_secret = Some(secret.into());
        state.config = Arc::new(config);
        let app = build_app(state);

        let body = clerk_event("user.created", "user_9", "Sam", "sam@x.io").to_string();
        let (status, _) = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/api/v1/webhooks/clerk")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let ts = time::OffsetDateTime::now_utc().unix_timestamp().to_string();
        let sig = signature::sign_for_tests(secret, "msg_1", &ts, body.as_bytes());
        let (status, body) = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/api/v1/webhooks/clerk")
                .header(signature::ID_HEADER, "msg_1")
                .header(signature::TIMESTAMP_HEADER, ts)
                .header(signature::SIGNATURE_HEADER, sig)
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
    }

    #[tokio::test]
    async fn sync_requires_matching_identity() {
        let state = AppState::fake();
        let auth = bearer(&state, "user_1");
        let app = build_app(state);

        let (status, _) = send(
            &app,
            json_request("POST", "/api/v1/users/sync", Some(&auth),
                json!({"name": "Ann", "email": "ann@x.io", "clerkId": "user_2"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            json_request("POST", "/api/v1/users/sync", Some(&auth),
                json!({"name": "Ann", "email": "not-an-email", "clerkId": "user_1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            json_request("POST", "/api/v1/users/sync", Some(&auth),
                json!({"name": "Ann", "email": "Ann@X.io", "clerkId": "user_1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], json!(true));

        let (_, me) = send(&app, get("/api/v1/me", Some(&auth))).await;
        assert_eq!(me["email"], json!("ann@x.io"));
    }

    #[tokio::test]
    async fn update_of_unknown_user_is_not_found() {
        let state = AppState::fake();
        let auth = bearer(&state, "user_1");
        let app = build_app(state);
        let (status, _) = send(
            &app,
            json_request("PUT", "/api/v1/users/user_1", Some(&auth), json!({"name": "Ann", "email": "a@x.io"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, get("/api/v1/users/user_1", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn second_plan_deactivates_first() {
        let state = AppState::fake();
        let auth = bearer(&state, "user_1");
        let app = build_app(state);

        let (status, first) = send(&app, json_request("POST", "/api/v1/plans", Some(&auth), plan_body("user_1", "A"))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, second) = send(&app, json_request("POST", "/api/v1/plans", Some(&auth), plan_body("user_1", "B"))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, plans) = send(&app, get("/api/v1/plans", Some(&auth))).await;
        assert_eq!(status, StatusCode::OK);
        let plans = plans.as_array().unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0]["id"], second["id"]);
        assert_eq!(plans[0]["is_active"], json!(true));
        assert_eq!(plans[1]["id"], first["id"]);
        assert_eq!(plans[1]["is_active"], json!(false));
        assert_eq!(plans[0]["diet_plan"]["daily_calories"], json!(2400));
    }

    #[tokio::test]
    async fn listing_without_owner_returns_empty_array() {
        let app = build_app(AppState::fake());
        let (status, body) = send(&app, get("/api/v1/plans", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, body) = send(&app, get("/api/v1/plans", Some("Bearer garbage"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn explicit_owner_lists_without_identity() {
        let app = build_app(AppState::fake());
        let create = Request::builder()
            .method("POST")
            .uri("/api/v1/plans")
            .header("content-type", "application/json")
            .header("x-service-key", "service-key")
            .body(Body::from(plan_body("user_7", "Voice plan").to_string()))
            .unwrap();
        let (status, _) = send(&app, create).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = send(&app, get("/api/v1/plans?userId=user_7", None)).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn plan_writes_are_restricted_to_owner_or_service() {
        let state = AppState::fake();
        let auth = bearer(&state, "user_1");
        let app = build_app(state);

        let (status, _) = send(&app, json_request("POST", "/api/v1/plans", Some(&auth), plan_body("user_2", "X"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, json_request("POST", "/api/v1/plans", None, plan_body("user_2", "X"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let bad_key = Request::builder()
            .method("POST")
            .uri("/api/v1/plans")
            .header("content-type", "application/json")
            .header("x-service-key", "wrong")
            .body(Body::from(plan_body("user_2", "X").to_string()))
            .unwrap();
        let (status, _) = send(&app, bad_key).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn patch_activity_and_owner_scoping() {
        let state = AppState::fake();
        let owner = bearer(&state, "user_1");
        let stranger = bearer(&state, "user_2");
        let app = build_app(state);

        let (_, first) = send(&app, json_request("POST", "/api/v1/plans", Some(&owner), plan_body("user_1", "A"))).await;
        let (_, second) = send(&app, json_request("POST", "/api/v1/plans", Some(&owner), plan_body("user_1", "B"))).await;
        let first_uri = format!("/api/v1/plans/{}", first["id"].as_str().unwrap());
        let second_uri = format!("/api/v1/plans/{}", second["id"].as_str().unwrap());

        let (status, _) = send(&app, get(&first_uri, Some(&stranger))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, patched) = send(&app, json_request("PATCH", &first_uri, Some(&owner), json!({"isActive": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["is_active"], json!(true));

        let (_, second) = send(&app, get(&second_uri, Some(&owner))).await;
        assert_eq!(second["is_active"], json!(false));

        let (status, _) = send(&app, json_request("PATCH", &first_uri, Some(&stranger), json!({"is_active": false}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn repair_moves_placeholder_plans() {
        let state = AppState::fake();
        let auth = bearer(&state, "user_1");
        let app = build_app(state);

        let create = Request::builder()
            .method("POST")
            .uri("/api/v1/plans")
            .header("content-type", "application/json")
            .header("x-service-key", "service-key")
            .body(Body::from(plan_body("{{user_id}}", "Orphan").to_string()))
            .unwrap();
        send(&app, create).await;

        let (status, _) = send(&app, json_request("POST", "/api/v1/plans/repair", Some(&auth), json!({"userId": "user_2"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, json_request("POST", "/api/v1/plans/repair", Some(&auth), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["repaired_count"], json!(1));

        let (_, plans) = send(&app, get("/api/v1/plans", Some(&auth))).await;
        assert_eq!(plans[0]["name"], json!("Orphan"));
    }

    #[tokio::test]
    async fn voice_config_uses_stored_name() {
        let state = AppState::fake();
        let auth = bearer(&state, "user_1");
        let app = build_app(state);

        let (_, body) = send(&app, get("/api/v1/voice/config", Some(&auth))).await;
        assert_eq!(body["assistant_id"], json!("assistant-123"));
        assert_eq!(body["overrides"]["recording_enabled"], json!(false));
        assert_eq!(body["overrides"]["variable_values"]["full_name"], json!("User"));
        assert_eq!(body["overrides"]["variable_values"]["user_id"], json!("user_1"));

        send(
            &app,
            json_request("POST", "/api/v1/webhooks/clerk", None, clerk_event("user.created", "user_1", "Jane", "jane@x.io")),
        )
        .await;
        let (_, body) = send(&app, get("/api/v1/voice/config", Some(&auth))).await;
        assert_eq!(body["overrides"]["variable_values"]["full_name"], json!("Jane Doe"));

        let (status, _) = send(&app, get("/api/v1/voice/config", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn voice_events_build_call_session() {
        let state = AppState::fake();
        let auth = bearer(&state, "user_1");
        let app = build_app(state);

        let events = [
            json!({"message": {"type": "status-update", "status": "in-progress", "call": {
                "id": "call_1",
                "assistantOverrides": {"variableValues": {"user_id": "user_1", "full_name": "Jane Doe"}}
            }}}),
            json!({"message": {"type": "speech-update", "status": "started", "role": "assistant", "call": {"id": "call_1"}}}),
            json!({"message": {"type": "transcript", "role": "assistant", "transcriptType": "final",
                               "transcript": "What are your goals?", "call": {"id": "call_1"}}}),
            json!({"message": {"type": "transcript", "role": "user", "transcriptType": "partial",
                               "transcript": "Lose", "call": {"id": "call_1"}}}),
            json!({"message": {"type": "error", "error": "Meeting has ended", "call": {"id": "call_1"}}}),
            json!({"message": {"type": "end-of-call-report", "call": {"id": "call_1"}}}),
        ];
        for event in events {
            let (status, _) = send(&app, json_request("POST", "/api/v1/voice/events", None, event)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, session) = send(&app, get("/api/v1/voice/calls/call_1", Some(&auth))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["status"], json!("ended"));
        assert_eq!(session["speaking"], json!(false));
        assert_eq!(session["last_error"], Value::Null);
        assert_eq!(
            session["transcript"],
            json!([{"role": "assistant", "content": "What are your goals?"}])
        );

        let (status, _) = send(&app, get("/api/v1/voice/calls/unknown", Some(&auth))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn call_transcript_is_hidden_from_other_users() {
        let state = AppState::fake();
        let stranger = bearer(&state, "user_2");
        let app = build_app(state);

        let event = json!({"message": {
            "type": "transcript", "role": "user", "transcriptType": "final",
            "transcript": "I weigh 120kg and have diabetes",
            "call": {"id": "call_of_user_1", "metadata": {"user_id": "user_1"}}
        }});
        let (status, _) = send(&app, json_request("POST", "/api/v1/voice/events", None, event)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, get("/api/v1/voice/calls/call_of_user_1", Some(&stranger))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, Value::Null);
    }
}
