//! HTTP-level tests over the in-memory gateway.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use theater_booking::{
    config::Config,
    controllers,
    gateway::MemoryGateway,
    models::Role,
    AppState,
};
use tower::ServiceExt; // For `oneshot` method

const PASSWORD: &str = "Palcoscenico1!";

struct TestApp {
    gateway: Arc<MemoryGateway>,
    router: Router,
}

async fn create_test_app(role_guards: bool) -> TestApp {
    let vars: HashMap<String, String> = [
        ("DATABASE_URL", "postgres://unused"),
        ("JWT_SECRET", "test-secret"),
        ("ENABLE_ROLE_GUARDS", if role_guards { "true" } else { "false" }),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let config = Config::from_map(&vars).unwrap();

    let gateway = Arc::new(MemoryGateway::new());
    let hash = bcrypt::hash(PASSWORD, 4).unwrap();
    gateway.add_account("admin@teatro.test", &hash, Some(Role::Admin)).await;
    gateway.add_account("cassa@teatro.test", &hash, Some(Role::Seller)).await;
    gateway
        .add_account("ingresso@teatro.test", &hash, Some(Role::CheckinStaff))
        .await;
    gateway.add_account("ospite@teatro.test", &hash, None).await;

    let state = AppState::with_gateway(config, gateway.clone()).await.unwrap();
    TestApp {
        gateway,
        router: controllers::app(state),
    }
}

impl TestApp {
    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn sign_in(&self, email: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/auth/sign-in",
                None,
                Some(json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn theater(&self, admin: &str, name: &str, rows: i32, seats_per_row: i32) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/theaters",
                Some(admin),
                Some(json!({ "name": name, "rows": rows, "seats_per_row": seats_per_row })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn event(&self, admin: &str, theater_id: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/api/events",
                Some(admin),
                Some(json!({ "name": "Rigoletto", "date": "2026-11-20", "theater_id": theater_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn book(&self, token: &str, event_id: &str, row: i32, seat: i32, code: &str) -> (StatusCode, Value) {
        self.call(
            "POST",
            &format!("/api/events/{event_id}/bookings"),
            Some(token),
            Some(json!({
                "row_number": row,
                "seat_number": seat,
                "first_name": "Marco",
                "last_name": "Rossi",
                "ticket_code": code
            })),
        )
        .await
    }
}

#[tokio::test]
async fn health_and_root_need_no_session() {
    let app = create_test_app(true).await;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, _) = app.call("GET", "/api/theaters", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_in_returns_a_session_with_role() {
    let app = create_test_app(true).await;
    let token = app.sign_in("cassa@teatro.test").await;

    let (status, body) = app.call("GET", "/api/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "cassa@teatro.test");
    assert_eq!(body["role"], "seller");

    let (status, body) = app
        .call(
            "POST",
            "/api/auth/sign-in",
            None,
            Some(json!({ "email": "cassa@teatro.test", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn session_token_is_accepted_from_an_encoded_query_string() {
    let app = create_test_app(true).await;
    let token = app.sign_in("cassa@teatro.test").await;
    let encoded = token.replace('.', "%2E");

    let (status, body) = app
        .call("GET", &format!("/api/auth/session?access_token={encoded}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["email"], "cassa@teatro.test");
}

#[tokio::test]
async fn sign_out_revokes_the_token() {
    let app = create_test_app(true).await;
    let token = app.sign_in("admin@teatro.test").await;

    let (status, _) = app.call("POST", "/api/auth/sign-out", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call("GET", "/api/auth/session", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn created_theater_is_listed_with_its_geometry() {
    let app = create_test_app(true).await;
    let admin = app.sign_in("admin@teatro.test").await;
    app.theater(&admin, "Teatro Verdi", 5, 8).await;

    let (status, body) = app.call("GET", "/api/theaters", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let theaters = body.as_array().unwrap();
    assert_eq!(theaters.len(), 1);
    assert_eq!(theaters[0]["rows"], 5);
    assert_eq!(theaters[0]["seats_per_row"], 8);
    assert_eq!(theaters[0]["capacity"], 40);
    assert_eq!(theaters[0]["unavailable_seats"], json!([]));
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_remote_call() {
    let app = create_test_app(true).await;
    let admin = app.sign_in("admin@teatro.test").await;

    // Baseline: one authenticated request costs one profile lookup.
    let before = app.gateway.call_count();
    app.call("GET", "/api/auth/session", Some(&admin), None).await;
    let per_request = app.gateway.call_count() - before;

    let before = app.gateway.call_count();
    let (status, body) = app
        .call(
            "POST",
            "/api/theaters",
            Some(&admin),
            Some(json!({ "name": "  ", "rows": 0, "seats_per_row": 8 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["message"].as_str().unwrap().contains("rows must be between 1 and 200"));
    assert_eq!(app.gateway.call_count() - before, per_request);

    let (_, body) = app.call("GET", "/api/theaters", Some(&admin), None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_theaters_are_rejected() {
    let app = create_test_app(true).await;
    let admin = app.sign_in("admin@teatro.test").await;

    let (status, body) = app
        .call(
            "POST",
            "/api/theaters",
            Some(&admin),
            Some(json!({ "name": "Arena", "rows": 2_000_000_000, "seats_per_row": 2_000_000_000 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["message"].as_str().unwrap().contains("seats_per_row must be between 1 and 200"));

    let (status, _) = app
        .call(
            "POST",
            "/api/theaters",
            Some(&admin),
            Some(json!({ "name": "Arena", "rows": 201, "seats_per_row": 10 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = app.call("GET", "/api/theaters", Some(&admin), None).await;
    assert!(body.as_array().unwrap().is_empty());

    app.theater(&admin, "Arena", 200, 200).await;
}

#[tokio::test]
async fn malformed_requests_get_the_json_error_body() {
    let app = create_test_app(true).await;
    let admin = app.sign_in("admin@teatro.test").await;
    let theater_id = app.theater(&admin, "Teatro Verdi", 2, 2).await;

    let (status, body) = app
        .call(
            "POST",
            "/api/events",
            Some(&admin),
            Some(json!({ "name": "Rigoletto", "date": "20 novembre", "theater_id": theater_id })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .call("GET", "/api/events/not-a-uuid/seats", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let request = Request::builder()
        .method("POST")
        .uri("/api/theaters")
        .header("authorization", format!("Bearer {admin}"))
        .body(Body::from(r#"{"name":"Piccolo","rows":1,"seats_per_row":1}"#))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn role_guards_reject_the_wrong_role() {
    let app = create_test_app(true).await;
    let seller = app.sign_in("cassa@teatro.test").await;
    let door = app.sign_in("ingresso@teatro.test").await;
    let guest = app.sign_in("ospite@teatro.test").await;

    let body = json!({ "name": "Piccolo", "rows": 2, "seats_per_row": 2 });
    let (status, err) = app.call("POST", "/api/theaters", Some(&seller), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["code"], "FORBIDDEN");
    let (status, _) = app.call("POST", "/api/theaters", Some(&guest), Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.call("POST", "/api/checkin/start", Some(&seller), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call("GET", "/api/users", Some(&door), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Reads only need a session.
    let (status, _) = app.call("GET", "/api/events", Some(&door), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn without_role_guards_any_session_may_mutate() {
    let app = create_test_app(false).await;
    let guest = app.sign_in("ospite@teatro.test").await;
    app.theater(&guest, "Sala Prove", 1, 4).await;
}

#[tokio::test]
async fn booking_fills_the_seat_grid() {
    let app = create_test_app(true).await;
    let admin = app.sign_in("admin@teatro.test").await;
    let seller = app.sign_in("cassa@teatro.test").await;
    let theater_id = app.theater(&admin, "Teatro Verdi", 3, 4).await;
    let event_id = app.event(&admin, &theater_id).await;

    let (status, _) = app
        .call(
            "PUT",
            &format!("/api/theaters/{theater_id}/unavailable-seats"),
            Some(&admin),
            Some(json!({ "unavailable_seats": ["1-1", "1-1", "3-4"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, booking) = app.book(&seller, &event_id, 2, 2, "TK-001").await;
    assert_eq!(status, StatusCode::CREATED, "{booking}");
    assert_eq!(booking["checked_in"], false);

    let (status, grid) = app
        .call("GET", &format!("/api/events/{event_id}/seats"), Some(&seller), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grid["cells"][0][0]["state"], "BLOCKED");
    assert_eq!(grid["cells"][1][1]["state"], "BOOKED");
    assert_eq!(grid["cells"][1][1]["interactive"], false);
    assert_eq!(grid["cells"][2][3]["state"], "BLOCKED");
    assert_eq!(grid["cells"][0][1]["state"], "AVAILABLE");
    assert_eq!(grid["summary"]["capacity"], 12);
    assert_eq!(grid["summary"]["blocked"], 2);
    assert_eq!(grid["summary"]["booked"], 1);
    assert_eq!(grid["summary"]["available"], 9);

    // Taken, blocked and out-of-range seats.
    let (status, _) = app.book(&seller, &event_id, 2, 2, "TK-002").await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app.book(&seller, &event_id, 1, 1, "TK-003").await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app.book(&seller, &event_id, 9, 1, "TK-004").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Same ticket code twice in one event hits the backend constraint.
    let (status, err) = app.book(&seller, &event_id, 3, 1, "TK-001").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "CONSTRAINT_VIOLATION");
}

#[tokio::test]
async fn blocked_seats_can_be_toggled_idempotently() {
    let app = create_test_app(true).await;
    let admin = app.sign_in("admin@teatro.test").await;
    let theater_id = app.theater(&admin, "Teatro Verdi", 2, 2).await;
    let uri = format!("/api/theaters/{theater_id}/unavailable-seats");

    app.call("PATCH", &uri, Some(&admin), Some(json!({ "block": ["1-2", "1-2"] })))
        .await;
    let (status, body) = app
        .call("PATCH", &uri, Some(&admin), Some(json!({ "block": ["1-2"], "toggle": ["2-1"] })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unavailable_seats"], json!(["1-2", "2-1"]));

    let (_, body) = app
        .call("PATCH", &uri, Some(&admin), Some(json!({ "unblock": ["1-2", "2-2"] })))
        .await;
    assert_eq!(body["unavailable_seats"], json!(["2-1"]));

    let (status, _) = app
        .call("PATCH", &uri, Some(&admin), Some(json!({ "block": ["3-1"] })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn check_in_round_trip_over_http() {
    let app = create_test_app(true).await;
    let admin = app.sign_in("admin@teatro.test").await;
    let door = app.sign_in("ingresso@teatro.test").await;
    let theater_id = app.theater(&admin, "Teatro Verdi", 3, 3).await;
    let event_id = app.event(&admin, &theater_id).await;
    app.book(&admin, &event_id, 1, 3, "QR-77").await;

    let (_, view) = app.call("GET", "/api/checkin", Some(&door), None).await;
    assert_eq!(view["state"], "IDLE");
    assert_eq!(view["facing_mode"], "environment");

    let (status, view) = app.call("POST", "/api/checkin/start", Some(&door), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["state"], "SCANNING");

    let (status, view) = app
        .call("POST", "/api/checkin/scan", Some(&door), Some(json!({ "ticket_code": "nope" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["state"], "RESULT_NOT_FOUND");

    let (_, view) = app.call("POST", "/api/checkin/dismiss", Some(&door), None).await;
    assert_eq!(view["state"], "SCANNING");

    // A stray space typed at the door still finds the ticket.
    let (_, view) = app
        .call("POST", "/api/checkin/scan", Some(&door), Some(json!({ "ticket_code": " QR-77 " })))
        .await;
    assert_eq!(view["state"], "RESULT_FOUND");
    assert_eq!(view["ticket"]["event_name"], "Rigoletto");
    assert_eq!(view["ticket"]["theater_name"], "Teatro Verdi");

    let (status, ack) = app.call("POST", "/api/checkin/confirm", Some(&door), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ticket_code"], "QR-77");
    assert_eq!(ack["checkin"]["state"], "IDLE");

    let (_, grid) = app
        .call("GET", &format!("/api/events/{event_id}/seats"), Some(&door), None)
        .await;
    assert_eq!(grid["cells"][0][2]["state"], "CHECKED_IN");

    app.call("POST", "/api/checkin/start", Some(&door), None).await;
    let (_, view) = app
        .call("POST", "/api/checkin/scan", Some(&door), Some(json!({ "ticket_code": "QR-77" })))
        .await;
    assert_eq!(view["state"], "RESULT_ALREADY_CHECKED_IN");

    // Confirming a used ticket is not a valid transition.
    let (status, _) = app.call("POST", "/api/checkin/confirm", Some(&door), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn event_edit_and_cascading_delete() {
    let app = create_test_app(true).await;
    let admin = app.sign_in("admin@teatro.test").await;
    let theater_id = app.theater(&admin, "Teatro Verdi", 2, 2).await;
    let event_id = app.event(&admin, &theater_id).await;
    app.book(&admin, &event_id, 1, 1, "DEL-1").await;

    let (status, _) = app
        .call("PATCH", &format!("/api/events/{event_id}"), Some(&admin), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, card) = app
        .call(
            "PATCH",
            &format!("/api/events/{event_id}"),
            Some(&admin),
            Some(json!({ "name": "Rigoletto (prima)" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["name"], "Rigoletto (prima)");
    assert_eq!(card["booked"], 1);

    let (status, _) = app
        .call("DELETE", &format!("/api/events/{event_id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .call("GET", &format!("/api/events/{event_id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let door = app.sign_in("ingresso@teatro.test").await;
    app.call("POST", "/api/checkin/start", Some(&door), None).await;
    let (_, view) = app
        .call("POST", "/api/checkin/scan", Some(&door), Some(json!({ "ticket_code": "DEL-1" })))
        .await;
    assert_eq!(view["state"], "RESULT_NOT_FOUND");
}

#[tokio::test]
async fn admins_manage_roles() {
    let app = create_test_app(true).await;
    let admin = app.sign_in("admin@teatro.test").await;
    let seller_token = app.sign_in("cassa@teatro.test").await;

    let (status, users) = app.call("GET", "/api/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let seller = users
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["email"] == "cassa@teatro.test")
        .unwrap()
        .clone();

    let (status, _) = app
        .call(
            "PUT",
            &format!("/api/users/{}/role", seller["id"].as_str().unwrap()),
            Some(&admin),
            Some(json!({ "role": "impresario" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, profile) = app
        .call(
            "PUT",
            &format!("/api/users/{}/role", seller["id"].as_str().unwrap()),
            Some(&admin),
            Some(json!({ "role": "checkin_staff" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["role"], "checkin_staff");

    // Roles are resolved per request, so the existing session sees it.
    let (status, _) = app
        .call("POST", "/api/checkin/start", Some(&seller_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}
