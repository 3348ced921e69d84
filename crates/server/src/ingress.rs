//! HTTP ingress for sheet triggers and reviewer tooling.
//!
//! `POST /api/v1/events` accepts the same tagged events the spreadsheet hooks emit;
//! `POST /api/v1/workflows/{workflow}/rows/{row}/review` writes a decision directly;
//! `GET /api/v1/chain` previews who a location would notify.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use fieldrelay_core::{
    ApplicationError, AuditContext, ChainRequest, EventOutcome, HierarchyLevel, InboundEvent,
    LocationQuery, NotificationChain, ReviewDecision, TransitionReceipt, WorkflowEngine,
    WorkflowKind,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const ACTOR_HEADER: &str = "x-actor";

#[derive(Clone)]
pub struct IngressState {
    engine: Arc<WorkflowEngine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    /// Only set for client errors; store and provider failures stay in the logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Clone, Debug, Deserialize)]
pub struct ChainQuery {
    pub location: String,
    #[serde(default)]
    pub level: Option<HierarchyLevel>,
    #[serde(default)]
    pub business_unit: Option<String>,
    /// When set, the workflow's level and role subset take precedence over `level`.
    #[serde(default)]
    pub workflow: Option<String>,
}

pub fn router(engine: Arc<WorkflowEngine>) -> Router {
    Router::new()
        .route("/api/v1/events", post(receive_event))
        .route("/api/v1/workflows/{workflow}/rows/{row}/review", post(review_row))
        .route("/api/v1/chain", get(preview_chain))
        .with_state(IngressState { engine })
}

pub async fn receive_event(
    State(state): State<IngressState>,
    headers: HeaderMap,
    Json(event): Json<InboundEvent>,
) -> ApiResult<EventOutcome> {
    let context = request_context(&headers, "sheet-trigger");
    info!(
        event_name = "ingress.event.received",
        correlation_id = %context.correlation_id,
        workflow = %event.workflow(),
        "inbound event received"
    );

    state.engine.handle(event, &context).await.map(Json).map_err(|error| reject(error, &context))
}

pub async fn review_row(
    State(state): State<IngressState>,
    Path((workflow, row)): Path<(String, usize)>,
    headers: HeaderMap,
    Json(decision): Json<ReviewDecision>,
) -> ApiResult<TransitionReceipt> {
    let context = request_context(&headers, &decision.reviewer);
    state
        .engine
        .review(&WorkflowKind::new(workflow), row, &decision, &context)
        .await
        .map(Json)
        .map_err(|error| reject(error, &context))
}

pub async fn preview_chain(
    State(state): State<IngressState>,
    headers: HeaderMap,
    Query(query): Query<ChainQuery>,
) -> ApiResult<NotificationChain> {
    let context = request_context(&headers, "preview");
    let request = match query.workflow.as_deref() {
        Some(workflow) => state
            .engine
            .workflow_chain_request(
                &WorkflowKind::new(workflow),
                &query.location,
                query.business_unit.as_deref(),
            )
            .map_err(|error| reject(error, &context))?,
        None => ChainRequest::new(
            LocationQuery::new(query.level.unwrap_or_default(), query.location.clone()),
            query.business_unit.clone(),
        ),
    };

    state.engine.preview_chain(&request).await.map(Json).map_err(|error| reject(error, &context))
}

fn request_context(headers: &HeaderMap, default_actor: &str) -> AuditContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    };

    let correlation_id =
        header(CORRELATION_HEADER).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let actor = header(ACTOR_HEADER).unwrap_or_else(|| default_actor.to_owned());
    AuditContext::new(correlation_id, actor)
}

fn reject(error: ApplicationError, context: &AuditContext) -> (StatusCode, Json<ApiError>) {
    let message = error.to_string();
    let interface = error.into_interface(context.correlation_id.clone());
    let status = match &interface {
        fieldrelay_core::InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        fieldrelay_core::InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        fieldrelay_core::InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        fieldrelay_core::InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    warn!(
        event_name = "ingress.request.rejected",
        correlation_id = %context.correlation_id,
        status = status.as_u16(),
        error = %message,
        "request rejected"
    );
    let detail = (status == StatusCode::BAD_REQUEST).then_some(message);

    (
        status,
        Json(ApiError {
            error: interface.user_message().to_owned(),
            detail,
            correlation_id: interface.correlation_id().to_owned(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Json, Router,
    };
    use chrono::DateTime;
    use fieldrelay_core::domain::employee::{
        Employee, EmployeeId, EmployeeLocation, EmployeeStatus, LocationAttribute, Role,
    };
    use fieldrelay_core::notify::{MessageRenderer, NotificationDispatcher, RecordingMessenger};
    use fieldrelay_core::store::records::{
        employee_headers, encode_employee, encode_location_node, location_map_headers,
    };
    use fieldrelay_core::store::{EMPLOYEES_TABLE, LOCATION_MAP_TABLE};
    use fieldrelay_core::{
        ApplicationError, AuditContext, FixedClock, InMemoryAuditSink, InMemoryStore, LocationNode,
        OrgPolicy, WorkflowCatalog, WorkflowEngine,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{reject, router, ApiError};

    fn employee(id: &str, role: &str, attribute: LocationAttribute, value: &str, phone: &str) -> Employee {
        Employee {
            id: EmployeeId(id.to_owned()),
            name: format!("Employee {id}"),
            role: Role::new(role),
            email: format!("{}@example.com", id.to_ascii_lowercase()),
            contact_number: phone.to_owned(),
            whatsapp_number: None,
            status: EmployeeStatus::Active,
            location: EmployeeLocation::default().with(attribute, value),
            business_unit: Some("ACL".to_owned()),
        }
    }

    async fn app() -> (Router, RecordingMessenger) {
        let store = InMemoryStore::new();
        let staff = [
            employee("SR001", "SR", LocationAttribute::Territory, "Kushtia-01", "8801711000001"),
            employee("ASM001", "ASM", LocationAttribute::Area, "Kushtia", "8801711000002"),
            employee("BDO001", "BDO", LocationAttribute::BdTerritory, "BD1", "8801711000004"),
        ];
        store
            .seed(EMPLOYEES_TABLE, employee_headers(), staff.iter().map(encode_employee).collect())
            .await;
        let node = LocationNode {
            zone: "Khulna".to_owned(),
            district: "Jhenaidah".to_owned(),
            area: "Kushtia".to_owned(),
            territory: "Kushtia-01".to_owned(),
            bd_territory: "BD1".to_owned(),
            business_unit: "ACL".to_owned(),
            ..LocationNode::default()
        };
        store.seed(LOCATION_MAP_TABLE, location_map_headers(), vec![encode_location_node(&node)]).await;

        let catalog = Arc::new(WorkflowCatalog::standard());
        let messenger = RecordingMessenger::new();
        let audit = Arc::new(InMemoryAuditSink::default());
        let renderer = Arc::new(MessageRenderer::new(&catalog).expect("templates compile"));
        let engine = WorkflowEngine::new(
            Arc::new(store),
            catalog,
            Arc::new(OrgPolicy::standard()),
            NotificationDispatcher::new(Arc::new(messenger.clone()), renderer, audit.clone()),
            Arc::new(FixedClock::new(
                DateTime::parse_from_rfc3339("2025-03-09T09:30:00+06:00").expect("timestamp"),
            )),
            audit,
        );
        engine.ensure_tables().await.expect("tables");

        (router(Arc::new(engine)), messenger)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-correlation-id", "req-42")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    fn point_request_submit() -> Value {
        json!({
            "type": "form_submit",
            "workflow": "point_request",
            "values": ["sr001@example.com", "D-100", "250", "", "Kushtia-01", "ACL"],
        })
    }

    #[tokio::test]
    async fn form_submit_creates_a_pending_record_and_notifies() {
        let (app, messenger) = app().await;

        let (status, body) = send(&app, post_json("/api/v1/events", point_request_submit())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["event"], "created");
        assert_eq!(body["row"], 0);
        assert_eq!(body["submission"]["id"], "PNT-20250309-001");
        assert_eq!(body["chain"]["tiers"].as_array().map(Vec::len), Some(3));
        assert_eq!(messenger.sent().len(), 4);
    }

    #[tokio::test]
    async fn review_approves_once_and_then_refuses() {
        let (app, messenger) = app().await;
        send(&app, post_json("/api/v1/events", point_request_submit())).await;
        let before = messenger.sent().len();

        let decision = json!({ "status": "Approved", "reviewer": "ASM001", "notes": "ok" });
        let (status, body) =
            send(&app, post_json("/api/v1/workflows/point_request/rows/0/review", decision.clone()))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Approved");
        assert!(messenger.sent().len() > before);

        let (status, body) =
            send(&app, post_json("/api/v1/workflows/point_request/rows/0/review", decision)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ApiError = serde_json::from_value(body).expect("api error");
        assert_eq!(error.correlation_id, "req-42");
    }

    #[tokio::test]
    async fn edits_to_unknown_rows_are_not_found() {
        let (app, _) = app().await;

        let edit = json!({
            "type": "cell_edit",
            "workflow": "point_request",
            "row": 12,
            "column": 8,
            "value": "Approved",
        });
        let (status, body) = send(&app, post_json("/api/v1/events", edit)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "The referenced record no longer exists.");
        assert!(body.get("detail").is_none());
    }

    #[test]
    fn store_failures_keep_their_cause_out_of_the_response() {
        let context = AuditContext::new("req-7", "api");
        let error = ApplicationError::Persistence(
            "sqlite:///srv/fieldrelay/sheets.db: database is locked".to_owned(),
        );

        let (status, Json(body)) = reject(error, &context);

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.detail, None);
        assert_eq!(body.correlation_id, "req-7");
        let encoded = serde_json::to_value(&body).expect("json");
        assert!(encoded.get("detail").is_none());
        assert!(!encoded.to_string().contains("sheets.db"));
    }

    #[tokio::test]
    async fn unknown_workflow_is_a_bad_request() {
        let (app, messenger) = app().await;

        let event = json!({ "type": "form_submit", "workflow": "payroll", "values": [] });
        let (status, body) = send(&app, post_json("/api/v1/events", event)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().is_some_and(|detail| detail.contains("payroll")));
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn chain_preview_follows_the_workflow_role_subset() {
        let (app, _) = app().await;

        let request = Request::builder()
            .uri("/api/v1/chain?location=Kushtia-01&workflow=point_request")
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resolution"]["kind"], "hierarchy");
        let roles: Vec<&str> = body["tiers"]
            .as_array()
            .expect("tiers")
            .iter()
            .filter_map(|tier| tier["role"].as_str())
            .collect();
        assert_eq!(roles, vec!["SR", "ASM", "BDO"]);
    }

    #[tokio::test]
    async fn chain_preview_for_an_unknown_area_falls_back() {
        let (app, messenger) = app().await;

        let request = Request::builder()
            .uri("/api/v1/chain?location=Nowhere&level=area&business_unit=ACL")
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resolution"]["kind"], "fallback");
        assert!(messenger.sent().is_empty());
    }
}
