use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, Path, State},
    http::{Request, StatusCode},
    Router,
};
use axum_extra::TypedHeader;
use assert_matches::assert_matches;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::{cancel_appointment, get_appointment};
use appointment_cell::router::appointment_routes;
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

struct Harness {
    server: MockServer,
    app: Router,
    token: String,
    patient: TestUser,
    doctor_id: String,
}

impl Harness {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let config = TestConfig::with_url(&server.uri());
        let patient = TestUser::patient("patient@example.com");
        let token = JwtTestUtils::create_test_token(&patient, &config.jwt_secret, Some(1));

        Self {
            app: appointment_routes(config.to_arc()),
            server,
            token,
            patient,
            doctor_id: Uuid::new_v4().to_string(),
        }
    }

    async fn mount_doctor(&self) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("id", format!("eq.{}", self.doctor_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                MockSupabaseResponses::doctor_response(&self.doctor_id, "Sarah", "Johnson", "Cardiology")
            ])))
            .mount(&self.server)
            .await;
    }

    /// Mounts the slot-taken probe before the day listing so the narrower
    /// match wins.
    async fn mount_day(&self, booked: Vec<Value>, slot_taken: bool) {
        let probe = if slot_taken { json!([{ "id": Uuid::new_v4() }]) } else { json!([]) };
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("select", "id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(probe))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("doctor_id", format!("eq.{}", self.doctor_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(booked)))
            .mount(&self.server)
            .await;
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body).unwrap() };
        (status, json)
    }

    fn get(&self, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("Authorization", format!("Bearer {}", self.token))
            .body(Body::empty())
            .unwrap()
    }

    fn post(&self, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn booking(&self, start_time: &str, reason: &str) -> Value {
        json!({
            "doctor_id": self.doctor_id,
            "date": "2024-01-10",
            "start_time": start_time,
            "type": "video",
            "reason": reason,
            "agree_to_terms": true
        })
    }
}

#[tokio::test]
async fn test_routes_require_token() {
    let app = appointment_routes(TestConfig::default().to_arc());

    let response = app
        .oneshot(Request::builder().uri("/dashboard").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_slots_mark_booked_start() {
    let harness = Harness::start().await;
    harness.mount_doctor().await;
    harness.mount_day(vec![
        MockSupabaseResponses::appointment_response(&harness.patient.id, &harness.doctor_id, "2024-01-10", "10:00:00", "scheduled"),
        MockSupabaseResponses::appointment_response(&harness.patient.id, &harness.doctor_id, "2024-01-10", "11:00:00", "cancelled"),
    ], false).await;

    let uri = format!("/slots?doctor_id={}&date=2024-01-10", harness.doctor_id);
    let (status, body) = harness.send(harness.get(&uri)).await;

    assert_eq!(status, StatusCode::OK);
    let slots = body.as_array().unwrap();
    assert_eq!(slots.len(), 16);
    assert_eq!(slots[0], json!({ "start_time": "09:00", "end_time": "09:30", "is_available": true }));
    let unavailable: Vec<_> = slots
        .iter()
        .filter(|s| s["is_available"] == false)
        .map(|s| s["start_time"].as_str().unwrap())
        .collect();
    assert_eq!(unavailable, vec!["10:00"]);
}

#[tokio::test]
async fn test_slots_for_unknown_doctor() {
    let harness = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&harness.server)
        .await;

    let uri = format!("/slots?doctor_id={}&date=2024-01-10", harness.doctor_id);
    let (status, body) = harness.send(harness.get(&uri)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Doctor not found");
}

#[tokio::test]
async fn test_slots_when_store_is_down() {
    let harness = Harness::start().await;
    harness.mount_doctor().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&harness.server)
        .await;

    let uri = format!("/slots?doctor_id={}&date=2024-01-10", harness.doctor_id);
    let (status, _) = harness.send(harness.get(&uri)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_book_appointment() {
    let harness = Harness::start().await;
    harness.mount_doctor().await;
    harness.mount_day(vec![], false).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "patient_id": harness.patient.id,
            "doctor_id": harness.doctor_id,
            "date": "2024-01-10",
            "start_time": "09:30",
            "end_time": "10:00",
            "status": "scheduled",
            "type": "video",
            "payment": { "amount": 155.0, "currency": "USD", "status": "pending" }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response(&harness.patient.id, &harness.doctor_id, "2024-01-10", "09:30:00", "scheduled")
        ])))
        .expect(1)
        .mount(&harness.server)
        .await;

    let (status, body) = harness
        .send(harness.post("/book", harness.booking("09:30", "Follow-up on blood tests")))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["appointment"]["start_time"], "09:30");
    assert_eq!(body["payment"]["amount"], 155.0);
}

#[tokio::test]
async fn test_book_taken_slot_conflicts() {
    let harness = Harness::start().await;
    harness.mount_doctor().await;
    harness.mount_day(vec![], true).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&harness.server)
        .await;

    let (status, body) = harness
        .send(harness.post("/book", harness.booking("14:00", "Recurring migraines")))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Selected time slot is not available");
}

#[tokio::test]
async fn test_book_booked_slot_rejected_before_store() {
    let harness = Harness::start().await;
    harness.mount_doctor().await;
    harness.mount_day(vec![
        MockSupabaseResponses::appointment_response(&Uuid::new_v4().to_string(), &harness.doctor_id, "2024-01-10", "09:00:00", "scheduled"),
    ], false).await;

    let (status, _) = harness
        .send(harness.post("/book", harness.booking("09:00", "Annual check-up")))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_book_reports_invalid_fields() {
    let harness = Harness::start().await;
    harness.mount_doctor().await;
    harness.mount_day(vec![], false).await;

    let mut request = harness.booking("09:00", "Ache");
    request["agree_to_terms"] = json!(false);
    let (status, body) = harness.send(harness.post("/book", request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<_> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["reason", "agree_to_terms"]);
}

#[tokio::test]
async fn test_book_without_slot() {
    let harness = Harness::start().await;
    harness.mount_doctor().await;
    harness.mount_day(vec![], false).await;

    let mut request = harness.booking("09:00", "Persistent cough");
    request.as_object_mut().unwrap().remove("start_time");
    let (status, body) = harness.send(harness.post("/book", request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"][0]["field"], "start_time");
}

#[tokio::test]
async fn test_delete_appointment() {
    let harness = Harness::start().await;
    let mut appointment = MockSupabaseResponses::appointment_response(
        &harness.patient.id, &harness.doctor_id, "2024-01-10", "09:00:00", "scheduled",
    );
    let appointment_id = Uuid::new_v4();
    appointment["id"] = json!(appointment_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment.clone()])))
        .mount(&harness.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment])))
        .expect(1)
        .mount(&harness.server)
        .await;

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/{}", appointment_id))
        .header("Authorization", format!("Bearer {}", harness.token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = harness.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "message": "Appointment deleted successfully" }));
}

#[tokio::test]
async fn test_outsider_cannot_read_appointment() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_arc();
    let appointment_id = Uuid::new_v4();
    let mut appointment = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(), &Uuid::new_v4().to_string(), "2024-01-10", "09:00:00", "scheduled",
    );
    appointment["id"] = json!(appointment_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment])))
        .mount(&mock_server)
        .await;

    let outsider = TestUser::patient("outsider@example.com");
    let result = get_appointment(
        State(config),
        Path(appointment_id),
        TypedHeader(Authorization::bearer("test-token").unwrap()),
        Extension(outsider.to_user()),
    ).await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_cancel_paid_appointment_refunds() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_arc();
    let patient = TestUser::patient("patient@example.com");
    let appointment_id = Uuid::new_v4();

    let mut appointment = MockSupabaseResponses::appointment_response(
        &patient.id, &Uuid::new_v4().to_string(), "2024-01-10", "09:00:00", "scheduled",
    );
    appointment["id"] = json!(appointment_id);
    appointment["payment"]["status"] = json!("paid");
    let mut cancelled = appointment.clone();
    cancelled["status"] = json!("cancelled");
    cancelled["payment"]["status"] = json!("refunded");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment])))
        .mount(&mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "cancelled", "payment_status": "refunded" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = cancel_appointment(
        State(config),
        Path(appointment_id),
        TypedHeader(Authorization::bearer("test-token").unwrap()),
        Extension(patient.to_user()),
    ).await;

    let body = result.unwrap().0;
    assert_eq!(body["appointment"]["status"], "cancelled");
    assert_eq!(body["appointment"]["payment"]["status"], "refunded");
    assert_eq!(body["message"], "Appointment marked as cancelled");
}
