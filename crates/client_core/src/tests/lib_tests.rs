use super::*;

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::{
        ws::{self, WebSocketUpgrade},
        Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use shared::actions::{Action, ActionType};
use tokio::{net::TcpListener, sync::broadcast};

use crate::{
    actions::keys,
    browser::BrowserCall,
    sagas::{auth, bookings, listings, reviews},
    transport::Attachment,
};

#[derive(Clone, Default)]
struct Backend {
    hits: Arc<Mutex<Vec<String>>>,
}

impl Backend {
    fn hit(&self, name: &str) {
        self.hits.lock().expect("hits").push(name.to_string());
    }

    fn count(&self, name: &str) -> usize {
        self.hits
            .lock()
            .expect("hits")
            .iter()
            .filter(|hit| hit.as_str() == name)
            .count()
    }
}

struct Harness {
    runtime: SagaRuntime,
    browser: Arc<RecordingBrowser>,
    events: broadcast::Receiver<SagaEvent>,
}

impl Harness {
    async fn start(app: Router, fields: Value) -> Self {
        let base_url = spawn_backend(app).await;
        let browser = Arc::new(RecordingBrowser::default());
        let fields = match fields {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        let services = SagaServices::new(Settings::for_base_url(&base_url), browser.clone())
            .expect("services")
            .with_store(Store::with_fields(fields));
        let runtime = sagas::start_runtime(services);
        let events = runtime.subscribe();
        Self {
            runtime,
            browser,
            events,
        }
    }

    async fn run(&mut self, action: Action) -> SagaEvent {
        let kind = action.kind;
        self.runtime.dispatch(action).expect("dispatch");
        self.finished(kind).await
    }

    async fn finished(&mut self, kind: ActionType) -> SagaEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = self.events.recv().await.expect("saga event");
                if event.kind() == kind && event.is_finished() {
                    return event;
                }
            }
        })
        .await
        .expect("saga finished in time")
    }

    async fn field(&self, key: &str) -> Option<Value> {
        self.runtime.store().get(key).await
    }

    /// Collects events until none arrive for `window`.
    async fn quiet_for(&mut self, window: Duration) -> Vec<SagaEvent> {
        let mut seen = Vec::new();
        while let Ok(Ok(event)) = tokio::time::timeout(window, self.events.recv()).await {
            seen.push(event);
        }
        seen
    }
}

fn started(events: &[SagaEvent], kind: ActionType) -> bool {
    events
        .iter()
        .any(|event| matches!(event, SagaEvent::Started { kind: k } if *k == kind))
}

const QUIET: Duration = Duration::from_millis(200);

async fn spawn_backend(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn assert_completed(event: &SagaEvent) {
    assert!(
        matches!(event, SagaEvent::Completed { .. }),
        "unexpected outcome: {event:?}"
    );
}

async fn login(State(backend): State<Backend>, Json(body): Json<Value>) -> impl IntoResponse {
    backend.hit("login");
    if body["email"] == "ada@example.com" && body["password"] == "secret" {
        (
            StatusCode::OK,
            Json(json!({ "token": "tok-1", "user": { "id": "u1" } })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": "unauthorized", "message": "bad credentials" })),
        )
    }
}

async fn current_user(State(backend): State<Backend>, headers: HeaderMap) -> impl IntoResponse {
    backend.hit("current_user");
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some("Bearer tok-1");
    if authorized {
        (StatusCode::OK, Json(json!({ "id": "u1", "firstName": "Ada" })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "code": "unauthorized" })))
    }
}

fn auth_backend(backend: Backend) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route(
            "/auth/signup",
            post(|| async {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "code": "conflict" })),
                )
            }),
        )
        .route("/auth/logout", post(|| async { Json(json!({})) }))
        .route(
            "/users/me",
            get(current_user).put(|| async {
                (StatusCode::CREATED, Json(json!({ "id": "u1", "firstName": "Grace" })))
            }),
        )
        .with_state(backend)
}

#[tokio::test]
async fn login_stores_session_and_loads_current_user() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        auth_backend(backend.clone()),
        json!({ keys::LOGIN_EPI: { "email": "ada@example.com", "password": "secret" } }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::Login)).await);
    assert_completed(&harness.finished(ActionType::GetCurrentUser).await);

    assert_eq!(harness.field(keys::AUTH_TOKEN).await, Some(json!("tok-1")));
    assert_eq!(
        harness.field(keys::CURRENT_USER).await,
        Some(json!({ "id": "u1", "firstName": "Ada" }))
    );
    assert_eq!(harness.field(keys::LOGIN_EPI).await, None);
    assert_eq!(harness.browser.navigations(), vec!["/dashboard".to_string()]);
    let events = harness.runtime.store().events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "login");
    assert_eq!(backend.count("current_user"), 1);
}

#[tokio::test]
async fn rejected_login_alerts_and_keeps_form() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        auth_backend(backend.clone()),
        json!({ keys::LOGIN_EPI: { "email": "ada@example.com", "password": "nope" } }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::Login)).await);

    assert_eq!(
        harness.browser.alerts(),
        vec![auth::INVALID_LOGIN_ALERT.to_string()]
    );
    assert!(harness.browser.navigations().is_empty());
    assert_eq!(harness.field(keys::AUTH_TOKEN).await, None);
    assert!(harness.field(keys::LOGIN_EPI).await.is_some());
    assert_eq!(backend.count("current_user"), 0);
}

#[tokio::test]
async fn payload_overrides_form_state_for_signup() {
    let mut harness = Harness::start(auth_backend(Backend::default()), json!({})).await;

    let signup = Action::new(ActionType::Signup).with_payload(json!({
        "email": "ada@example.com",
        "password": "secret",
        "firstName": "Ada",
        "lastName": "Lovelace",
    }));
    assert_completed(&harness.run(signup).await);

    assert_eq!(
        harness.browser.alerts(),
        vec![auth::SIGNUP_FAILED_ALERT.to_string()]
    );
    assert_eq!(harness.field(keys::CURRENT_USER).await, None);
}

#[tokio::test]
async fn missing_form_state_fails_the_saga() {
    let mut harness = Harness::start(auth_backend(Backend::default()), json!({})).await;

    let event = harness.run(Action::new(ActionType::Login)).await;
    match event {
        SagaEvent::Failed { error, .. } => assert!(error.contains(keys::LOGIN_EPI), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(harness.browser.calls().is_empty());
}

#[tokio::test]
async fn logout_clears_session() {
    let mut harness = Harness::start(
        auth_backend(Backend::default()),
        json!({ keys::AUTH_TOKEN: "tok-1", keys::CURRENT_USER: { "id": "u1" } }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::Logout)).await);

    assert_eq!(harness.field(keys::AUTH_TOKEN).await, None);
    assert_eq!(harness.field(keys::CURRENT_USER).await, None);
    assert_eq!(harness.browser.navigations(), vec!["/".to_string()]);
}

#[tokio::test]
async fn success_code_from_state_is_compared_loosely() {
    let mut harness = Harness::start(
        auth_backend(Backend::default()),
        json!({
            keys::HTTP_SUCCESS_CODE: "201",
            keys::UPDATE_PROFILE_EPI: { "firstName": "Grace" },
        }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::UpdateProfile)).await);

    assert_eq!(
        harness.browser.alerts(),
        vec![auth::PROFILE_SAVED_ALERT.to_string()]
    );
    assert_eq!(
        harness.field(keys::CURRENT_USER).await,
        Some(json!({ "id": "u1", "firstName": "Grace" }))
    );
}

#[tokio::test]
async fn default_success_code_rejects_created_status() {
    let mut harness = Harness::start(
        auth_backend(Backend::default()),
        json!({ keys::UPDATE_PROFILE_EPI: { "firstName": "Grace" } }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::UpdateProfile)).await);

    assert!(harness.browser.alerts().is_empty());
    assert_eq!(harness.field(keys::CURRENT_USER).await, None);
}

async fn listings_source(State(backend): State<Backend>) -> Json<Value> {
    backend.hit("listings_source");
    Json(json!({ "pageToken": "p1" }))
}

async fn listings_page(State(backend): State<Backend>, Path(token): Path<String>) -> Json<Value> {
    backend.hit("listings_page");
    let next = match token.as_str() {
        "p1" => "p2",
        "p2" => "p3",
        _ => "",
    };
    Json(json!({ "items": [token], "nextPageToken": next }))
}

async fn create_listing(
    State(backend): State<Backend>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    backend.hit("create_listing");
    if body.get("title").is_some() {
        (StatusCode::OK, Json(json!({ "id": "l-9" })))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": "validation", "message": "title is required" })),
        )
    }
}

fn listings_backend(backend: Backend) -> Router {
    Router::new()
        .route(
            "/listings",
            get(listings_source).post(create_listing),
        )
        .route("/listings/pages/:token", get(listings_page))
        .with_state(backend)
}

#[tokio::test]
async fn listings_follow_cached_page_tokens() {
    let backend = Backend::default();
    let mut harness = Harness::start(listings_backend(backend.clone()), json!({})).await;

    for expected in ["p1", "p2", "p3"] {
        assert_completed(&harness.run(Action::new(ActionType::GetListings)).await);
        assert_eq!(
            harness.field(keys::GET_LISTINGS_EPR).await,
            Some(json!({
                "items": [expected],
                "nextPageToken": match expected { "p1" => "p2", "p2" => "p3", _ => "" },
            }))
        );
    }

    assert_eq!(backend.count("listings_source"), 1);
    assert_eq!(backend.count("listings_page"), 3);
    assert_eq!(harness.field(keys::LOADING).await, Some(json!(false)));
}

#[tokio::test]
async fn created_listing_navigates_and_refreshes() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        listings_backend(backend.clone()),
        json!({ keys::CREATE_LISTING_EPI: { "title": "Harbour loft" } }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::CreateListing)).await);
    assert_completed(&harness.finished(ActionType::GetListings).await);

    assert_eq!(
        harness.field(keys::CREATE_LISTING_EPR).await,
        Some(json!({ "id": "l-9" }))
    );
    assert_eq!(harness.field(keys::CREATE_LISTING_EPI).await, None);
    assert_eq!(harness.browser.navigations(), vec!["/listings/l-9".to_string()]);
    let events = harness.runtime.store().events().await;
    assert_eq!(events[0].name, "listing_created");
    assert_eq!(events[0].data, json!({ "id": "l-9" }));
    assert_eq!(backend.count("listings_source"), 1);
}

#[tokio::test]
async fn rejected_listing_alerts() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        listings_backend(backend.clone()),
        json!({ keys::CREATE_LISTING_EPI: { "description": "no title" } }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::CreateListing)).await);

    assert_eq!(
        harness.browser.alerts(),
        vec![listings::CREATE_LISTING_FAILED_ALERT.to_string()]
    );
    assert!(harness.browser.navigations().is_empty());
    assert!(harness.field(keys::CREATE_LISTING_EPI).await.is_some());
    assert_eq!(backend.count("listings_source"), 0);
}

async fn upload_image(Path(listing_id): Path<String>, mut multipart: Multipart) -> Json<Value> {
    let mut result = Map::new();
    result.insert("listingId".into(), json!(listing_id));
    while let Some(field) = multipart.next_field().await.expect("field") {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            result.insert("filename".into(), json!(field.file_name().unwrap_or_default()));
            result.insert("contentType".into(), json!(field.content_type().unwrap_or_default()));
            let bytes = field.bytes().await.expect("bytes");
            result.insert("size".into(), json!(bytes.len()));
        } else {
            result.insert(name, json!(field.text().await.expect("text")));
        }
    }
    Json(Value::Object(result))
}

fn temp_image(name: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{}-{name}", std::process::id()));
    std::fs::write(&path, bytes).expect("write temp image");
    path
}

#[tokio::test]
async fn uploaded_image_refreshes_listing_and_reviews() {
    let app = Router::new()
        .route("/listings/:listing_id/images", post(upload_image))
        .route(
            "/listings/:listing_id",
            get(|Path(listing_id): Path<String>| async move { Json(json!({ "id": listing_id })) }),
        )
        .route(
            "/listings/:listing_id/reviews",
            get(|| async { Json(json!([{ "rating": 5 }])) }),
        );
    let mut harness = Harness::start(app, json!({})).await;
    let path = temp_image("front.png", b"\x89PNG");

    let upload = Action::new(ActionType::UploadListingImage)
        .with_param(keys::LISTING_ID, "l-1")
        .with_payload(json!({ "file": path.to_string_lossy(), "caption": "front" }));
    assert_completed(&harness.run(upload).await);
    assert_completed(&harness.finished(ActionType::GetReviews).await);
    let _ = std::fs::remove_file(&path);

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .expect("file name");
    assert_eq!(
        harness.field(keys::UPLOAD_LISTING_IMAGE_EPR).await,
        Some(json!({
            "listingId": "l-1",
            "filename": filename,
            "contentType": "image/png",
            "size": 4,
            "caption": "front",
        }))
    );
    assert_eq!(
        harness.field(keys::GET_LISTING_EPR).await,
        Some(json!({ "id": "l-1" }))
    );
    assert_eq!(
        harness.field(keys::GET_REVIEWS_EPR).await,
        Some(json!([{ "rating": 5 }]))
    );
}

async fn list_bookings(
    State(backend): State<Backend>,
    Query(query): Query<std::collections::HashMap<String, String>>,
) -> Json<Value> {
    backend.hit("list_bookings");
    Json(json!([{ "id": "b1", "status": query.get("status") }]))
}

async fn invoice(Path(booking_id): Path<String>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"invoice-{booking_id}.pdf\""),
            ),
        ],
        b"%PDF-1.7".to_vec(),
    )
}

fn bookings_backend(backend: Backend) -> Router {
    Router::new()
        .route(
            "/bookings",
            get(list_bookings).post(|State(backend): State<Backend>| async move {
                backend.hit("create_booking");
                Json(json!({ "id": "b2" }))
            }),
        )
        .route("/bookings/:booking_id/invoice", get(invoice))
        .with_state(backend)
}

#[tokio::test]
async fn invoice_download_is_handed_to_browser() {
    let mut harness = Harness::start(bookings_backend(Backend::default()), json!({})).await;

    let download = Action::new(ActionType::DownloadInvoice).with_param(keys::BOOKING_ID, 7);
    assert_completed(&harness.run(download).await);

    assert_eq!(
        harness.browser.calls(),
        vec![BrowserCall::Download(Attachment {
            filename: "invoice-7.pdf".to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: b"%PDF-1.7".to_vec(),
        })]
    );
}

#[tokio::test]
async fn booking_with_inverted_dates_never_reaches_backend() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        bookings_backend(backend.clone()),
        json!({ keys::CREATE_BOOKING_EPI: {
            "listingId": "l-1",
            "checkIn": "2026-05-10",
            "checkOut": "2026-05-10",
            "guests": 2,
        } }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::CreateBooking)).await);

    assert_eq!(
        harness.browser.alerts(),
        vec![bookings::INVALID_DATES_ALERT.to_string()]
    );
    assert_eq!(backend.count("create_booking"), 0);
}

#[tokio::test]
async fn booking_success_logs_and_refreshes_list() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        bookings_backend(backend.clone()),
        json!({ keys::CREATE_BOOKING_EPI: {
            "listingId": "l-1",
            "checkIn": "2026-05-10",
            "checkOut": "2026-05-12",
            "guests": 2,
        } }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::CreateBooking)).await);
    assert_completed(&harness.finished(ActionType::GetBookings).await);

    assert_eq!(
        harness.field(keys::CREATE_BOOKING_EPR).await,
        Some(json!({ "id": "b2" }))
    );
    assert_eq!(harness.browser.navigations(), vec!["/bookings".to_string()]);
    let events = harness.runtime.store().events().await;
    assert_eq!(events[0].name, "booking_created");
    assert_eq!(events[0].data["checkOut"], "2026-05-12");
    assert_eq!(backend.count("list_bookings"), 1);
}

#[tokio::test]
async fn socket_message_runs_the_named_action() {
    let backend = Backend::default();
    let mut harness = Harness::start(bookings_backend(backend.clone()), json!({})).await;
    let frame = json!({ "action": "GETBOOKINGS", "payload": { "status": "upcoming" } });

    assert_completed(
        &harness
            .run(Action::new(ActionType::SocketMessage).with_payload(frame.clone()))
            .await,
    );
    assert_completed(&harness.finished(ActionType::GetBookings).await);

    assert_eq!(harness.field(keys::LAST_SOCKET_MESSAGE).await, Some(frame));
    assert_eq!(
        harness.field(keys::GET_BOOKINGS_EPR).await,
        Some(json!([{ "id": "b1", "status": "upcoming" }]))
    );
}

#[tokio::test]
async fn socket_message_with_unknown_action_fails() {
    let mut harness = Harness::start(bookings_backend(Backend::default()), json!({})).await;
    let frame = json!({ "action": "NOPE" });

    let event = harness
        .run(Action::new(ActionType::SocketMessage).with_payload(frame.clone()))
        .await;

    assert!(matches!(event, SagaEvent::Failed { .. }), "{event:?}");
    assert_eq!(harness.field(keys::LAST_SOCKET_MESSAGE).await, Some(frame));
}

#[tokio::test]
async fn pushed_frames_are_bridged_into_the_runtime() {
    let backend = Backend::default();
    let app = bookings_backend(backend.clone()).route(
        "/events",
        get(|upgrade: WebSocketUpgrade| async move {
            upgrade.on_upgrade(|mut socket| async move {
                let frame = json!({ "action": "GETBOOKINGS" }).to_string();
                let _ = socket.send(ws::Message::Text(frame)).await;
                let _ = socket.send(ws::Message::Close(None)).await;
            })
        }),
    );
    let mut harness = Harness::start(app, json!({})).await;

    let channel = WsChannel::connect(&harness.runtime.services().settings, "/events")
        .expect("ws url");
    let bridge = spawn_socket_bridge(harness.runtime.handle(), channel);

    assert_completed(&harness.finished(ActionType::SocketMessage).await);
    assert_completed(&harness.finished(ActionType::GetBookings).await);
    tokio::time::timeout(Duration::from_secs(5), bridge)
        .await
        .expect("bridge drains")
        .expect("bridge task");

    assert_eq!(
        harness.field(keys::LAST_SOCKET_MESSAGE).await,
        Some(json!({ "action": "GETBOOKINGS" }))
    );
    assert_eq!(backend.count("list_bookings"), 1);
}

#[tokio::test]
async fn pushed_frames_cannot_trigger_file_actions() {
    let backend = Backend::default();
    let uploads = backend.clone();
    let app = bookings_backend(backend.clone()).route(
        "/listings/:listing_id/images",
        post(move || {
            let uploads = uploads.clone();
            async move {
                uploads.hit("upload_image");
                Json(json!({}))
            }
        }),
    );
    let mut harness = Harness::start(
        app,
        json!({ keys::LISTING_ID: "l-1", keys::BOOKING_ID: "b1" }),
    )
    .await;
    let secret = temp_image("pushed-secret.txt", b"top secret");

    let upload_frame = json!({
        "action": "UPLOADLISTINGIMAGE",
        "payload": { "file": secret.to_string_lossy() },
    });
    assert_completed(
        &harness
            .run(Action::new(ActionType::SocketMessage).with_payload(upload_frame.clone()))
            .await,
    );
    let invoice_frame = json!({ "action": "DOWNLOADINVOICE" });
    assert_completed(
        &harness
            .run(Action::new(ActionType::SocketMessage).with_payload(invoice_frame.clone()))
            .await,
    );
    let events = harness.quiet_for(QUIET).await;
    let _ = std::fs::remove_file(&secret);

    assert!(!started(&events, ActionType::UploadListingImage));
    assert!(!started(&events, ActionType::DownloadInvoice));
    assert_eq!(backend.count("upload_image"), 0);
    assert!(harness.browser.calls().is_empty());
    assert_eq!(
        harness.field(keys::LAST_SOCKET_MESSAGE).await,
        Some(invoice_frame)
    );
}

async fn list_properties(
    State(backend): State<Backend>,
    Query(query): Query<std::collections::HashMap<String, String>>,
) -> Json<Value> {
    backend.hit("list_properties");
    Json(json!({ "city": query.get("city"), "page": query.get("page") }))
}

async fn create_property(
    State(backend): State<Backend>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    backend.hit("create_property");
    if body.get("name").is_some() {
        (StatusCode::OK, Json(json!({ "id": "p-2" })))
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "code": "validation" })))
    }
}

async fn get_listing(State(backend): State<Backend>, Path(id): Path<String>) -> impl IntoResponse {
    backend.hit("get_listing");
    if id == "missing" {
        (StatusCode::NOT_FOUND, Json(json!({ "code": "not_found" })))
    } else {
        (StatusCode::OK, Json(json!({ "id": id })))
    }
}

async fn update_listing(Path(id): Path<String>, Json(mut body): Json<Value>) -> Json<Value> {
    body["id"] = json!(id);
    Json(body)
}

async fn list_reviews(State(backend): State<Backend>) -> Json<Value> {
    backend.hit("list_reviews");
    Json(json!([{ "rating": 4 }]))
}

async fn create_review(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    backend.hit(&format!("create_review:{id}:{}", body["rating"]));
    Json(json!({ "id": "r-1" }))
}

async fn search_source(State(backend): State<Backend>) -> Json<Value> {
    backend.hit("search_source");
    Json(json!({ "pageToken": "s1" }))
}

async fn search_page(Path(token): Path<String>) -> Json<Value> {
    let next = if token == "s1" { "s2" } else { "s3" };
    Json(json!({ "items": [token], "nextPageToken": next }))
}

async fn cancel_booking(State(backend): State<Backend>, Path(id): Path<String>) -> StatusCode {
    backend.hit("cancel_booking");
    if id == "b1" {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    }
}

fn catalog_backend(backend: Backend) -> Router {
    Router::new()
        .route("/properties", get(list_properties).post(create_property))
        .route(
            "/properties/:property_id",
            get(|Path(id): Path<String>| async move { Json(json!({ "id": id })) }),
        )
        .route("/listings", get(listings_source))
        .route(
            "/listings/:listing_id",
            get(get_listing)
                .put(update_listing)
                .delete(|| async { Json(json!({})) }),
        )
        .route(
            "/listings/:listing_id/reviews",
            get(list_reviews).post(create_review),
        )
        .route("/search", get(search_source))
        .route("/search/pages/:token", get(search_page))
        .route("/bookings", get(list_bookings))
        .route("/bookings/:booking_id/cancel", post(cancel_booking))
        .with_state(backend)
}

#[tokio::test]
async fn properties_query_merges_form_and_payload() {
    let mut harness = Harness::start(
        catalog_backend(Backend::default()),
        json!({ keys::GET_PROPERTIES_EPI: { "city": "Lisbon" } }),
    )
    .await;

    let fetch = Action::new(ActionType::GetProperties).with_payload(json!({ "page": 2 }));
    assert_completed(&harness.run(fetch).await);

    assert_eq!(
        harness.field(keys::GET_PROPERTIES_EPR).await,
        Some(json!({ "city": "Lisbon", "page": "2" }))
    );
}

#[tokio::test]
async fn property_is_fetched_by_id_param() {
    let mut harness = Harness::start(catalog_backend(Backend::default()), json!({})).await;

    let fetch = Action::new(ActionType::GetProperty).with_param(keys::PROPERTY_ID, "p-1");
    assert_completed(&harness.run(fetch).await);

    assert_eq!(
        harness.field(keys::GET_PROPERTY_EPR).await,
        Some(json!({ "id": "p-1" }))
    );
}

#[tokio::test]
async fn created_property_clears_form_and_refreshes() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        catalog_backend(backend.clone()),
        json!({ keys::CREATE_PROPERTY_EPI: { "name": "Villa Sol" } }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::CreateProperty)).await);
    assert_completed(&harness.finished(ActionType::GetProperties).await);

    assert_eq!(
        harness.field(keys::CREATE_PROPERTY_EPR).await,
        Some(json!({ "id": "p-2" }))
    );
    assert_eq!(harness.field(keys::CREATE_PROPERTY_EPI).await, None);
    assert!(harness.field(keys::GET_PROPERTIES_EPR).await.is_some());
    assert_eq!(backend.count("list_properties"), 1);
}

#[tokio::test]
async fn rejected_property_applies_no_effects() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        catalog_backend(backend.clone()),
        json!({ keys::CREATE_PROPERTY_EPI: { "rooms": 3 } }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::CreateProperty)).await);
    let events = harness.quiet_for(QUIET).await;

    assert!(!started(&events, ActionType::GetProperties));
    assert_eq!(harness.field(keys::CREATE_PROPERTY_EPR).await, None);
    assert!(harness.field(keys::CREATE_PROPERTY_EPI).await.is_some());
    assert_eq!(backend.count("create_property"), 1);
    assert_eq!(backend.count("list_properties"), 0);
    assert!(harness.browser.calls().is_empty());
}

#[tokio::test]
async fn listing_fetch_chains_its_reviews() {
    let mut harness = Harness::start(catalog_backend(Backend::default()), json!({})).await;

    let fetch = Action::new(ActionType::GetListing).with_param(keys::LISTING_ID, "l-1");
    assert_completed(&harness.run(fetch).await);
    assert_completed(&harness.finished(ActionType::GetReviews).await);

    assert_eq!(
        harness.field(keys::GET_LISTING_EPR).await,
        Some(json!({ "id": "l-1" }))
    );
    assert_eq!(
        harness.field(keys::GET_REVIEWS_EPR).await,
        Some(json!([{ "rating": 4 }]))
    );
}

#[tokio::test]
async fn missing_listing_stores_nothing_and_skips_reviews() {
    let backend = Backend::default();
    let mut harness = Harness::start(catalog_backend(backend.clone()), json!({})).await;

    let fetch = Action::new(ActionType::GetListing).with_param(keys::LISTING_ID, "missing");
    assert_completed(&harness.run(fetch).await);
    let events = harness.quiet_for(QUIET).await;

    assert!(!started(&events, ActionType::GetReviews));
    assert_eq!(harness.field(keys::GET_LISTING_EPR).await, None);
    assert_eq!(backend.count("list_reviews"), 0);
}

#[tokio::test]
async fn reviews_are_fetched_for_the_listing_in_state() {
    let mut harness = Harness::start(
        catalog_backend(Backend::default()),
        json!({ keys::LISTING_ID: "l-3" }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::GetReviews)).await);

    assert_eq!(
        harness.field(keys::GET_REVIEWS_EPR).await,
        Some(json!([{ "rating": 4 }]))
    );
}

#[tokio::test]
async fn updated_listing_replaces_the_shown_listing() {
    let mut harness = Harness::start(catalog_backend(Backend::default()), json!({})).await;

    let update = Action::new(ActionType::UpdateListing)
        .with_param(keys::LISTING_ID, "l-1")
        .with_payload(json!({ "title": "Quiet studio" }));
    assert_completed(&harness.run(update).await);

    assert_eq!(
        harness.field(keys::GET_LISTING_EPR).await,
        Some(json!({ "id": "l-1", "title": "Quiet studio" }))
    );
}

#[tokio::test]
async fn deleted_listing_is_forgotten_and_list_refreshed() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        catalog_backend(backend.clone()),
        json!({ keys::LISTING_ID: "l-1", keys::GET_LISTING_EPR: { "id": "l-1" } }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::DeleteListing)).await);
    harness.finished(ActionType::GetListings).await;

    assert_eq!(harness.field(keys::GET_LISTING_EPR).await, None);
    assert_eq!(harness.browser.navigations(), vec!["/listings".to_string()]);
    assert_eq!(backend.count("listings_source"), 1);
}

#[tokio::test]
async fn search_pages_are_tracked_per_search_id() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        catalog_backend(backend.clone()),
        json!({ keys::SEARCH_PAGER: "beach" }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::SearchListings)).await);
    assert_completed(&harness.run(Action::new(ActionType::SearchListings)).await);
    assert_eq!(
        harness.field(keys::SEARCH_LISTINGS_EPR).await,
        Some(json!({ "items": ["s2"], "nextPageToken": "s3" }))
    );
    assert_eq!(backend.count("search_source"), 1);

    let other = Action::new(ActionType::SearchListings).with_param(keys::SEARCH_PAGER, "city");
    assert_completed(&harness.run(other).await);
    assert_eq!(
        harness.field(keys::SEARCH_LISTINGS_EPR).await,
        Some(json!({ "items": ["s1"], "nextPageToken": "s2" }))
    );
    assert_eq!(backend.count("search_source"), 2);

    let pagination = &harness.runtime.services().pagination;
    assert_eq!(pagination.token("search:beach").await.as_deref(), Some("s3"));
    assert_eq!(pagination.token("search:city").await.as_deref(), Some("s2"));
}

#[tokio::test]
async fn cancelled_booking_refreshes_bookings() {
    let backend = Backend::default();
    let mut harness = Harness::start(catalog_backend(backend.clone()), json!({})).await;

    let cancel = Action::new(ActionType::CancelBooking).with_param(keys::BOOKING_ID, "b1");
    assert_completed(&harness.run(cancel).await);
    assert_completed(&harness.finished(ActionType::GetBookings).await);

    assert!(harness.field(keys::GET_BOOKINGS_EPR).await.is_some());
    assert_eq!(backend.count("list_bookings"), 1);
}

#[tokio::test]
async fn refused_cancellation_leaves_bookings_alone() {
    let backend = Backend::default();
    let mut harness = Harness::start(catalog_backend(backend.clone()), json!({})).await;

    let cancel = Action::new(ActionType::CancelBooking).with_param(keys::BOOKING_ID, "b9");
    assert_completed(&harness.run(cancel).await);
    let events = harness.quiet_for(QUIET).await;

    assert!(!started(&events, ActionType::GetBookings));
    assert_eq!(backend.count("cancel_booking"), 1);
    assert_eq!(backend.count("list_bookings"), 0);
}

#[tokio::test]
async fn posted_review_clears_form_and_reloads_reviews() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        catalog_backend(backend.clone()),
        json!({
            keys::LISTING_ID: "l-1",
            keys::CREATE_REVIEW_EPI: { "rating": 4, "comment": "Lovely view" },
        }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::CreateReview)).await);
    assert_completed(&harness.finished(ActionType::GetReviews).await);

    assert_eq!(backend.count("create_review:l-1:4"), 1);
    assert_eq!(harness.field(keys::CREATE_REVIEW_EPI).await, None);
    assert_eq!(
        harness.field(keys::GET_REVIEWS_EPR).await,
        Some(json!([{ "rating": 4 }]))
    );
}

#[tokio::test]
async fn out_of_range_rating_is_not_posted() {
    let backend = Backend::default();
    let mut harness = Harness::start(
        catalog_backend(backend.clone()),
        json!({
            keys::LISTING_ID: "l-1",
            keys::CREATE_REVIEW_EPI: { "rating": 7, "comment": "Too good" },
        }),
    )
    .await;

    assert_completed(&harness.run(Action::new(ActionType::CreateReview)).await);

    assert_eq!(
        harness.browser.alerts(),
        vec![reviews::INVALID_RATING_ALERT.to_string()]
    );
    assert_eq!(backend.count("create_review:l-1:7"), 0);
    assert!(harness.field(keys::CREATE_REVIEW_EPI).await.is_some());
}

#[tokio::test]
async fn accepted_listing_without_id_still_stores_response() {
    let app = Router::new().route(
        "/listings",
        post(|| async { Json(json!({ "status": "queued" })) }),
    );
    let mut harness = Harness::start(
        app,
        json!({ keys::CREATE_LISTING_EPI: { "title": "Harbour loft" } }),
    )
    .await;

    let event = harness.run(Action::new(ActionType::CreateListing)).await;

    assert!(matches!(event, SagaEvent::Failed { .. }), "{event:?}");
    assert_eq!(
        harness.field(keys::CREATE_LISTING_EPR).await,
        Some(json!({ "status": "queued" }))
    );
    assert!(harness.browser.navigations().is_empty());
}
