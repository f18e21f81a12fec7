//! HTTP API layer exposing the document tree to the note-taking UI.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::sse::{self, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use notehub_core::auth::TokenVerifier;
use notehub_core::cascade::{self, CascadeEngine};
use notehub_core::events::{Event, EventBus};
use notehub_core::store::{DocStoreError, Document, DocumentPatch, DocumentStore};

/// Authentication context extracted from request headers.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: String,
}

async fn auth_from_parts(parts: &Parts, state: &AppState) -> Option<AuthContext> {
    let headers = &parts.headers;
    if let Some(auth) = headers.get("Authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if let Some(claims) = state.verifier.verify(token).await {
                return Some(AuthContext {
                    user_id: claims.sub,
                });
            }
        }
    }
    headers
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| AuthContext {
            user_id: s.to_string(),
        })
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        auth_from_parts(parts, state)
            .await
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Like [`AuthContext`] but never rejects. The public preview path serves
/// published documents to anonymous readers.
pub struct MaybeAuthContext(pub Option<AuthContext>);

impl FromRequestParts<AppState> for MaybeAuthContext {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(auth_from_parts(parts, state).await))
    }
}

/// Shared application state containing the document store.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<DocumentStore>>,
    pub events: EventBus,
    pub verifier: Arc<dyn TokenVerifier>,
    pub cascade: CascadeEngine,
}

#[derive(Deserialize)]
struct CreateRequest {
    #[serde(default)]
    title: String,
    parent_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct UpdateRequest {
    title: Option<String>,
    content: Option<String>,
    icon: Option<String>,
    cover_image: Option<String>,
    is_published: Option<bool>,
}

#[derive(Deserialize)]
struct SidebarParams {
    parent_id: Option<Uuid>,
}

#[derive(Serialize)]
struct DocumentResponse {
    id: Uuid,
    owner_id: String,
    parent_id: Option<Uuid>,
    title: String,
    content: Option<String>,
    icon: Option<String>,
    cover_image: Option<String>,
    is_archived: bool,
    is_published: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Document> for DocumentResponse {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id(),
            owner_id: doc.owner_id().to_string(),
            parent_id: doc.parent_id(),
            title: doc.title().to_string(),
            content: doc.content().map(|s| s.to_string()),
            icon: doc.icon().map(|s| s.to_string()),
            cover_image: doc.cover_image().map(|s| s.to_string()),
            is_archived: doc.is_archived(),
            is_published: doc.is_published(),
            created_at: doc.created_at(),
            updated_at: doc.updated_at(),
        }
    }
}

fn status_for(err: &DocStoreError) -> StatusCode {
    match err {
        DocStoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
        DocStoreError::NotFound(_) => StatusCode::NOT_FOUND,
        DocStoreError::Unauthorized(_) => StatusCode::FORBIDDEN,
        DocStoreError::Io(_) | DocStoreError::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn router(
    store: Arc<RwLock<DocumentStore>>,
    events: EventBus,
    verifier: Arc<dyn TokenVerifier>,
    cascade_on_delete: bool,
) -> Router {
    let app_state = AppState {
        store,
        events,
        verifier,
        cascade: CascadeEngine::new(cascade_on_delete),
    };
    Router::new()
        .route("/documents", post(create_document).get(list_sidebar))
        .route("/documents/search", get(search_documents))
        .route("/documents/trash", get(list_trash))
        .route(
            "/documents/{id}",
            get(get_document)
                .patch(update_document)
                .delete(delete_document),
        )
        .route("/documents/{id}/archive", post(archive_document))
        .route("/documents/{id}/restore", post(restore_document))
        .route("/documents/{id}/icon", delete(remove_icon))
        .route("/documents/{id}/cover", delete(remove_cover_image))
        .route("/events", get(event_stream))
        .with_state(app_state)
}

async fn create_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateRequest>,
) -> Result<Json<DocumentResponse>, StatusCode> {
    let mut store = state.store.write().await;
    let id = store
        .insert(req.title, auth.user_id.clone(), req.parent_id)
        .map_err(|e| status_for(&e))?;
    let resp = store
        .get(id)
        .map(DocumentResponse::from)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    drop(store);
    state.events.send(Event::Created {
        id,
        owner: auth.user_id,
    });
    Ok(Json(resp))
}

async fn list_sidebar(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<SidebarParams>,
) -> Json<Vec<DocumentResponse>> {
    let store = state.store.read().await;
    let docs = store
        .sidebar(&auth.user_id, params.parent_id)
        .into_iter()
        .map(DocumentResponse::from)
        .collect();
    Json(docs)
}

async fn search_documents(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Json<Vec<DocumentResponse>> {
    let store = state.store.read().await;
    let docs = store
        .search(&auth.user_id)
        .into_iter()
        .map(DocumentResponse::from)
        .collect();
    Json(docs)
}

async fn list_trash(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Json<Vec<DocumentResponse>> {
    let store = state.store.read().await;
    let docs = store
        .trash(&auth.user_id)
        .into_iter()
        .map(DocumentResponse::from)
        .collect();
    Json(docs)
}

async fn get_document(
    State(state): State<AppState>,
    MaybeAuthContext(auth): MaybeAuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, StatusCode> {
    let store = state.store.read().await;
    let doc = store.get(id).ok_or(StatusCode::NOT_FOUND)?;
    // published, unarchived documents are readable by anyone
    if doc.is_published() && !doc.is_archived() {
        return Ok(Json(DocumentResponse::from(doc)));
    }
    match auth {
        Some(auth) if auth.user_id == doc.owner_id() => Ok(Json(DocumentResponse::from(doc))),
        Some(_) => Err(StatusCode::FORBIDDEN),
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn update_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<DocumentResponse>, StatusCode> {
    let mut store = state.store.write().await;
    cascade::authorize(&store, id, &auth.user_id).map_err(|e| status_for(&e))?;
    let updated = store
        .patch(
            id,
            DocumentPatch {
                title: req.title,
                content: req.content,
                icon: req.icon,
                cover_image: req.cover_image,
                is_published: req.is_published,
                ..Default::default()
            },
        )
        .map_err(|e| status_for(&e))?;
    drop(store);
    state.events.send(Event::Updated {
        id,
        owner: auth.user_id,
    });
    Ok(Json(DocumentResponse::from(&updated)))
}

async fn remove_icon(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let mut store = state.store.write().await;
    cascade::authorize(&store, id, &auth.user_id).map_err(|e| status_for(&e))?;
    store.remove_icon(id).map_err(|e| status_for(&e))?;
    drop(store);
    state.events.send(Event::Updated {
        id,
        owner: auth.user_id,
    });
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_cover_image(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let mut store = state.store.write().await;
    cascade::authorize(&store, id, &auth.user_id).map_err(|e| status_for(&e))?;
    store.remove_cover_image(id).map_err(|e| status_for(&e))?;
    drop(store);
    state.events.send(Event::Updated {
        id,
        owner: auth.user_id,
    });
    Ok(StatusCode::NO_CONTENT)
}

async fn archive_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, StatusCode> {
    let mut store = state.store.write().await;
    let updated = state
        .cascade
        .archive(&mut store, id, &auth.user_id)
        .map_err(|e| status_for(&e))?;
    drop(store);
    state.events.send(Event::Archived {
        id,
        owner: auth.user_id,
    });
    Ok(Json(DocumentResponse::from(&updated)))
}

async fn restore_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, StatusCode> {
    let mut store = state.store.write().await;
    let updated = state
        .cascade
        .restore(&mut store, id, &auth.user_id)
        .map_err(|e| status_for(&e))?;
    drop(store);
    state.events.send(Event::Restored {
        id,
        owner: auth.user_id,
    });
    Ok(Json(DocumentResponse::from(&updated)))
}

async fn delete_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let mut store = state.store.write().await;
    state
        .cascade
        .delete(&mut store, id, &auth.user_id)
        .map_err(|e| status_for(&e))?;
    drop(store);
    state.events.send(Event::Deleted {
        id,
        owner: auth.user_id,
    });
    Ok(StatusCode::NO_CONTENT)
}

async fn event_stream(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Sse<impl Stream<Item = Result<sse::Event, Infallible>>> {
    let rx = state.events.subscribe();
    let user = auth.user_id;
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(move |res| {
        let user = user.clone();
        async move {
            match res {
                Ok(evt) if evt.owner() == user => {
                    let data = serde_json::to_string(&evt).ok()?;
                    Some(Ok(sse::Event::default().data(data)))
                }
                _ => None,
            }
        }
    });
    Sse::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{self, Body},
        http::Request,
    };
    use notehub_core::auth::Hs256Verifier;
    use serde_json::json;
    use tower::util::ServiceExt;

    fn test_app(cascade_on_delete: bool) -> (tempfile::TempDir, Router) {
        let tempdir = tempfile::tempdir().unwrap();
        let store = Arc::new(RwLock::new(DocumentStore::new(tempdir.path()).unwrap()));
        let events = EventBus::new();
        let verifier = Arc::new(Hs256Verifier::new("secret".into()));
        let app = router(store, events, verifier, cascade_on_delete);
        (tempdir, app)
    }

    async fn create(app: &Router, user: &str, title: &str, parent: Option<&str>) -> String {
        let req = Request::builder()
            .method("POST")
            .uri("/documents")
            .header("X-User-Id", user)
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "title": title, "parent_id": parent }).to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        v["id"].as_str().unwrap().to_string()
    }

    async fn get_json(app: &Router, user: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .uri(uri)
            .header("X-User-Id", user)
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, v)
    }

    #[tokio::test]
    async fn crud_endpoints() {
        let (_tempdir, app) = test_app(false);

        let id = create(&app, "alice", "First note", None).await;

        let (status, doc) = get_json(&app, "alice", &format!("/documents/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["title"], "First note");
        assert_eq!(doc["is_archived"], false);

        let req = Request::builder()
            .method("PATCH")
            .uri(format!("/documents/{}", id))
            .header("X-User-Id", "alice")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "title": "Renamed", "content": "{\"blocks\":[]}", "icon": "📝" })
                    .to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["title"], "Renamed");
        assert_eq!(v["icon"], "📝");

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/documents/{}/icon", id))
            .header("X-User-Id", "alice")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/documents/{}", id))
            .header("X-User-Id", "alice")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let (status, _) = get_json(&app, "alice", &format!("/documents/{}", id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sidebar_trash_and_restore_flow() {
        let (_tempdir, app) = test_app(false);

        let root = create(&app, "alice", "Root", None).await;
        let _child = create(&app, "alice", "Child", Some(&root)).await;

        let (_, sidebar) = get_json(&app, "alice", "/documents").await;
        assert_eq!(sidebar.as_array().unwrap().len(), 1);
        let (_, children) = get_json(
            &app,
            "alice",
            &format!("/documents?parent_id={}", root),
        )
        .await;
        assert_eq!(children.as_array().unwrap().len(), 1);

        let req = Request::builder()
            .method("POST")
            .uri(format!("/documents/{}/archive", root))
            .header("X-User-Id", "alice")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let (_, sidebar) = get_json(&app, "alice", "/documents").await;
        assert!(sidebar.as_array().unwrap().is_empty());
        let (_, trash) = get_json(&app, "alice", "/documents/trash").await;
        assert_eq!(trash.as_array().unwrap().len(), 2);

        let req = Request::builder()
            .method("POST")
            .uri(format!("/documents/{}/restore", root))
            .header("X-User-Id", "alice")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let (_, trash) = get_json(&app, "alice", "/documents/trash").await;
        assert!(trash.as_array().unwrap().is_empty());
        let (_, sidebar) = get_json(&app, "alice", "/documents").await;
        assert_eq!(sidebar.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn authorization_is_enforced() {
        let (_tempdir, app) = test_app(false);
        let id = create(&app, "alice", "Private", None).await;

        // another principal cannot mutate
        for (method, uri) in [
            ("POST", format!("/documents/{}/archive", id)),
            ("POST", format!("/documents/{}/restore", id)),
            ("DELETE", format!("/documents/{}", id)),
        ] {
            let req = Request::builder()
                .method(method)
                .uri(uri)
                .header("X-User-Id", "mallory")
                .body(Body::empty())
                .unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        }

        // no principal at all
        let req = Request::builder()
            .method("POST")
            .uri(format!("/documents/{}/archive", id))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // the document is untouched
        let (status, doc) = get_json(&app, "alice", &format!("/documents/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["is_archived"], false);
    }

    #[tokio::test]
    async fn missing_documents_return_not_found() {
        let (_tempdir, app) = test_app(false);
        let ghost = Uuid::new_v4();

        for (method, uri) in [
            ("GET", format!("/documents/{}", ghost)),
            ("POST", format!("/documents/{}/archive", ghost)),
            ("DELETE", format!("/documents/{}", ghost)),
        ] {
            let req = Request::builder()
                .method(method)
                .uri(uri)
                .header("X-User-Id", "alice")
                .body(Body::empty())
                .unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn published_documents_are_publicly_readable() {
        let (_tempdir, app) = test_app(false);
        let id = create(&app, "alice", "Public note", None).await;

        // anonymous read of an unpublished document
        let req = Request::builder()
            .uri(format!("/documents/{}", id))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .method("PATCH")
            .uri(format!("/documents/{}", id))
            .header("X-User-Id", "alice")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "is_published": true }).to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder()
            .uri(format!("/documents/{}", id))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // archiving takes the preview down even while published
        let req = Request::builder()
            .method("POST")
            .uri(format!("/documents/{}/archive", id))
            .header("X-User-Id", "alice")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder()
            .uri(format!("/documents/{}", id))
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bearer_tokens_identify_the_user() {
        let (_tempdir, app) = test_app(false);

        #[derive(serde::Serialize)]
        struct TestClaims {
            sub: String,
        }
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &TestClaims {
                sub: "carol".into(),
            },
            &jsonwebtoken::EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let req = Request::builder()
            .method("POST")
            .uri("/documents")
            .header("Authorization", format!("Bearer {}", token))
            .header("content-type", "application/json")
            .body(Body::from(json!({ "title": "From token" }).to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["owner_id"], "carol");
    }

    #[tokio::test]
    async fn delete_cascade_follows_the_policy_flag() {
        let (_tempdir, app) = test_app(true);
        let root = create(&app, "alice", "Root", None).await;
        let child = create(&app, "alice", "Child", Some(&root)).await;

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/documents/{}", root))
            .header("X-User-Id", "alice")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let (status, _) = get_json(&app, "alice", &format!("/documents/{}", child)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
