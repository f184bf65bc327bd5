//! HTTP surface of a running game, served by `ovod`.
//!
//! Listings of the game's entities, registration and session login, and the write endpoints
//! players use during the game. Sessions travel in the `session_id` cookie that
//! `/api/authorize` sets. Writes that act on someone else's data need a captain. The server
//! exits once the stop sentinel appears in the game's files folder.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use crate::{
    Comment, EntityId, EntityStore, File, GameInfo, NewComment, NewUser, OvoError, SENTINEL,
    Solving, Task, TaskStatus, User, UserRole,
};

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session_id";

type ApiResult<T> = Result<Json<T>, StatusCode>;

/// What every handler of one game shares.
pub struct AppState<S> {
    pub store: Arc<S>,
    pub info: GameInfo,
}

type GameApp<S> = State<Arc<AppState<S>>>;

fn status_for(e: &OvoError) -> StatusCode {
    match e {
        OvoError::Validation(_) => StatusCode::BAD_REQUEST,
        OvoError::NotFound(_) => StatusCode::NOT_FOUND,
        OvoError::AlreadyExists(_) => StatusCode::CONFLICT,
        _ => {
            tracing::error!(error = %e, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

async fn session_user<S: EntityStore>(
    store: &S,
    session: Option<&str>,
) -> Result<User, StatusCode> {
    let session: EntityId = session
        .and_then(|s| s.parse().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    match store.user_for_session(&session).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(StatusCode::UNAUTHORIZED),
        Err(e) => Err(status_for(&e)),
    }
}

/// The user behind the request's session cookie; 401 without a live session.
async fn authorized<S: EntityStore>(store: &S, headers: &HeaderMap) -> Result<User, StatusCode> {
    session_user(store, session_cookie(headers)).await
}

fn require(allowed: bool) -> Result<(), StatusCode> {
    if allowed {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

// Listings

async fn get_users<S: EntityStore>(State(app): GameApp<S>) -> ApiResult<Vec<User>> {
    app.store
        .list_users()
        .await
        .map(Json)
        .map_err(|e| status_for(&e))
}

async fn get_tasks<S: EntityStore>(State(app): GameApp<S>) -> ApiResult<Vec<Task>> {
    app.store
        .list_tasks()
        .await
        .map(Json)
        .map_err(|e| status_for(&e))
}

async fn get_files<S: EntityStore>(State(app): GameApp<S>) -> ApiResult<Vec<File>> {
    app.store
        .list_files()
        .await
        .map(Json)
        .map_err(|e| status_for(&e))
}

async fn get_comments<S: EntityStore>(State(app): GameApp<S>) -> ApiResult<Vec<Comment>> {
    app.store
        .list_comments()
        .await
        .map(Json)
        .map_err(|e| status_for(&e))
}

async fn get_solvings<S: EntityStore>(State(app): GameApp<S>) -> ApiResult<Vec<Solving>> {
    app.store
        .list_solvings()
        .await
        .map(Json)
        .map_err(|e| status_for(&e))
}

// Sessions and registration

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: EntityId,
}

async fn authorize<S: EntityStore>(
    State(app): GameApp<S>,
    Json(request): Json<AuthorizeRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let verified = app
        .store
        .verify_user(&request.login, &request.password)
        .await
        .map_err(|e| status_for(&e))?;
    if !verified {
        tracing::info!(login = %request.login, "rejected login");
        return Err(StatusCode::UNAUTHORIZED);
    }
    let session_id = app
        .store
        .open_session(&request.login)
        .await
        .map_err(|e| status_for(&e))?;
    let cookie = format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, session_id);
    Ok(([(SET_COOKIE, cookie)], Json(SessionResponse { session_id })))
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

/// Resolves `?session_id=` or, failing that, the session cookie.
async fn whoami<S: EntityStore>(
    State(app): GameApp<S>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> ApiResult<User> {
    let session = query.session_id.as_deref().or(session_cookie(&headers));
    session_user(app.store.as_ref(), session).await.map(Json)
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub login: String,
    pub password: String,
    /// Must match the game's registration secret.
    pub register_pass: String,
    #[serde(default)]
    pub is_captain: bool,
    /// Must match the game's captain secret when `is_captain` is set.
    #[serde(default)]
    pub captain_pass: Option<String>,
    #[serde(default)]
    pub avatar: Option<EntityId>,
}

async fn add_user<S: EntityStore>(
    State(app): GameApp<S>,
    Json(request): Json<RegisterRequest>,
) -> Result<StatusCode, StatusCode> {
    let hasher = app.store.hasher();
    if !hasher.verify(&request.register_pass, &app.info.register_pass) {
        tracing::info!(login = %request.login, "rejected registration: wrong registration secret");
        return Err(StatusCode::FORBIDDEN);
    }
    if request.is_captain {
        let captain = request
            .captain_pass
            .as_deref()
            .is_some_and(|secret| hasher.verify(secret, &app.info.captain_pass));
        if !captain {
            tracing::info!(login = %request.login, "rejected registration: wrong captain secret");
            return Err(StatusCode::FORBIDDEN);
        }
    }
    let user = NewUser {
        login: request.login,
        password: request.password,
        is_captain: request.is_captain,
        avatar: request.avatar,
    };
    app.store
        .add_user(&user)
        .await
        .map_err(|e| status_for(&e))?;
    tracing::info!(login = %user.login, captain = user.is_captain, "registered user");
    Ok(StatusCode::CREATED)
}

// Files

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub name: String,
}

/// Stores the request body as a new file named by its id.
async fn add_file<S: EntityStore>(
    State(app): GameApp<S>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<EntityId> {
    authorized(app.store.as_ref(), &headers).await?;
    let id = app
        .store
        .add_file(&query.name)
        .await
        .map_err(|e| status_for(&e))?;
    let path = app.info.files_folder.join(id.as_str());
    if let Err(e) = tokio::fs::write(&path, &body).await {
        tracing::error!(path = %path.display(), error = %e, "cannot save uploaded file");
        if let Err(e) = app.store.remove_file(&id).await {
            tracing::warn!(file = %id, error = %e, "cannot remove row of unsaved file");
        }
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(id))
}

async fn file_contents<S: EntityStore>(
    app: &AppState<S>,
    id: &str,
) -> Result<(File, Vec<u8>), StatusCode> {
    let id: EntityId = id.parse().map_err(|_| StatusCode::NOT_FOUND)?;
    let file = app
        .store
        .get_file(&id)
        .await
        .map_err(|e| status_for(&e))?
        .ok_or(StatusCode::NOT_FOUND)?;
    let path = app.info.files_folder.join(id.as_str());
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok((file, bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "cannot read stored file");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn get_file<S: EntityStore>(
    State(app): GameApp<S>,
    UrlPath(id): UrlPath<String>,
) -> Result<Response, StatusCode> {
    let (_, bytes) = file_contents(&app, &id).await?;
    Ok(([(CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}

async fn download_file<S: EntityStore>(
    State(app): GameApp<S>,
    UrlPath(id): UrlPath<String>,
) -> Result<Response, StatusCode> {
    let (file, bytes) = file_contents(&app, &id).await?;
    let disposition = format!("attachment; filename=\"{}\"", attachment_name(&file.name));
    Ok((
        [
            (CONTENT_TYPE, "application/octet-stream".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// The file name reduced to characters that are safe inside a quoted header value.
fn attachment_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            let safe = c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\');
            if safe { c } else { '_' }
        })
        .collect()
}

// Comments

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub task_id: EntityId,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub files_ids: Vec<EntityId>,
}

/// Comments as the session's user.
async fn add_comment<S: EntityStore>(
    State(app): GameApp<S>,
    headers: HeaderMap,
    Json(request): Json<CommentRequest>,
) -> ApiResult<EntityId> {
    let user = authorized(app.store.as_ref(), &headers).await?;
    let comment = NewComment {
        task_id: request.task_id,
        user_id: user.login,
        text: request.text,
        attached_files: request.files_ids,
    };
    app.store
        .add_comment(&comment)
        .await
        .map(Json)
        .map_err(|e| status_for(&e))
}

#[derive(Debug, Deserialize)]
pub struct IdRequest {
    pub id: EntityId,
}

/// Only a captain or the comment's author may remove it.
async fn rm_comment<S: EntityStore>(
    State(app): GameApp<S>,
    headers: HeaderMap,
    Json(request): Json<IdRequest>,
) -> Result<StatusCode, StatusCode> {
    let user = authorized(app.store.as_ref(), &headers).await?;
    let comment = app
        .store
        .get_comment(&request.id)
        .await
        .map_err(|e| status_for(&e))?
        .ok_or(StatusCode::NOT_FOUND)?;
    require(user.is_captain || user.login == comment.user_id)?;
    app.store
        .remove_comment(&request.id)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

// Flags

#[derive(Debug, Deserialize)]
pub struct MarkRequest {
    pub id: String,
    pub new_type: String,
}

async fn mark_user<S: EntityStore>(
    State(app): GameApp<S>,
    headers: HeaderMap,
    Json(request): Json<MarkRequest>,
) -> Result<StatusCode, StatusCode> {
    let user = authorized(app.store.as_ref(), &headers).await?;
    require(user.is_captain)?;
    let role: UserRole = request.new_type.parse().map_err(|e| status_for(&e))?;
    app.store
        .mark_user(&request.id, role)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_task<S: EntityStore>(
    State(app): GameApp<S>,
    headers: HeaderMap,
    Json(request): Json<MarkRequest>,
) -> Result<StatusCode, StatusCode> {
    authorized(app.store.as_ref(), &headers).await?;
    let id: EntityId = request.id.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let status: TaskStatus = request.new_type.parse().map_err(|e| status_for(&e))?;
    app.store
        .mark_task(&id, status)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AvatarRequest {
    pub user_id: String,
    #[serde(default)]
    pub avatar_file_id: Option<EntityId>,
}

/// Users change only their own avatar.
async fn update_avatar<S: EntityStore>(
    State(app): GameApp<S>,
    headers: HeaderMap,
    Json(request): Json<AvatarRequest>,
) -> Result<StatusCode, StatusCode> {
    let user = authorized(app.store.as_ref(), &headers).await?;
    require(user.login == request.user_id)?;
    app.store
        .update_avatar(&request.user_id, request.avatar_file_id.as_ref())
        .await
        .map_err(|e| status_for(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

// Solvings

#[derive(Debug, Deserialize)]
pub struct SolvingRequest {
    pub task_id: EntityId,
    pub user_id: String,
}

/// A captain assigns anyone; everyone else only themselves.
async fn take_task<S: EntityStore>(
    State(app): GameApp<S>,
    headers: HeaderMap,
    Json(request): Json<SolvingRequest>,
) -> Result<StatusCode, StatusCode> {
    let user = authorized(app.store.as_ref(), &headers).await?;
    require(user.is_captain || user.login == request.user_id)?;
    app.store
        .take_task(&request.task_id, &request.user_id)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reject_task<S: EntityStore>(
    State(app): GameApp<S>,
    headers: HeaderMap,
    Json(request): Json<SolvingRequest>,
) -> Result<StatusCode, StatusCode> {
    let user = authorized(app.store.as_ref(), &headers).await?;
    require(user.is_captain || user.login == request.user_id)?;
    app.store
        .reject_task(&request.task_id, &request.user_id)
        .await
        .map_err(|e| status_for(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_game_router<S: EntityStore + 'static>(store: Arc<S>, info: GameInfo) -> Router {
    Router::new()
        .route("/api/get_users", get(get_users::<S>))
        .route("/api/get_tasks", get(get_tasks::<S>))
        .route("/api/get_files", get(get_files::<S>))
        .route("/api/get_comments", get(get_comments::<S>))
        .route("/api/get_solvings", get(get_solvings::<S>))
        .route("/api/get_file/:file_id", get(get_file::<S>))
        .route("/api/download_file/:file_id", get(download_file::<S>))
        .route("/api/authorize", post(authorize::<S>))
        .route("/api/whoami", get(whoami::<S>))
        .route("/api/add_user", post(add_user::<S>))
        .route("/api/add_file", post(add_file::<S>))
        .route("/api/add_comment", post(add_comment::<S>))
        .route("/api/rm_comment", post(rm_comment::<S>))
        .route("/api/mark_user", post(mark_user::<S>))
        .route("/api/mark_task", post(mark_task::<S>))
        .route("/api/update_avatar", post(update_avatar::<S>))
        .route("/api/take_task", post(take_task::<S>))
        .route("/api/reject_task", post(reject_task::<S>))
        .with_state(Arc::new(AppState { store, info }))
}

/// Resolves once `<folder>/exit` exists, checking every `poll`.
pub async fn wait_for_sentinel(folder: &Path, poll: Duration) {
    let sentinel = folder.join(SENTINEL);
    let mut interval = tokio::time::interval(poll);
    loop {
        interval.tick().await;
        match tokio::fs::try_exists(&sentinel).await {
            Ok(true) => {
                tracing::info!(sentinel = %sentinel.display(), "stop sentinel found");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(sentinel = %sentinel.display(), error = %e, "cannot check stop sentinel");
            }
        }
    }
}

/// Serves the game's API on `port` until `shutdown` resolves.
pub async fn serve_game<S, F>(
    store: Arc<S>,
    info: GameInfo,
    port: u16,
    shutdown: F,
) -> Result<(), OvoError>
where
    S: EntityStore + 'static,
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "game server listening");
    axum::serve(listener, create_game_router(store, info))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!(port, "game server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use super::*;
    use crate::test_utils::TempDir;
    use crate::{Bcrypt, IdAllocator, InMemoryEntityStore, NewTask, SecretHasher};

    fn store() -> Arc<InMemoryEntityStore> {
        Arc::new(InMemoryEntityStore::new(
            IdAllocator::default(),
            Arc::new(Bcrypt::CHEAPEST),
        ))
    }

    /// A game whose registration secret is "1" and captain secret is "2".
    fn info(folder: &Path) -> GameInfo {
        GameInfo {
            port: 5000,
            files_folder: folder.to_path_buf(),
            register_pass: Bcrypt::CHEAPEST.hash("1").unwrap(),
            captain_pass: Bcrypt::CHEAPEST.hash("2").unwrap(),
            judge_url: None,
            judge_login: None,
            judge_pass: None,
        }
    }

    fn server(store: Arc<InMemoryEntityStore>, folder: &Path) -> TestServer {
        TestServer::new(create_game_router(store, info(folder))).unwrap()
    }

    fn cookie(session: &EntityId) -> HeaderValue {
        HeaderValue::from_str(&format!("theme=dark; {}={}", SESSION_COOKIE, session)).unwrap()
    }

    async fn login(server: &TestServer, login: &str, password: &str) -> EntityId {
        let response = server
            .post("/api/authorize")
            .json(&json!({"login": login, "password": password}))
            .await;
        response.assert_status_ok();
        response.json::<SessionResponse>().session_id
    }

    async fn register(server: &TestServer, body: Value) -> StatusCode {
        server.post("/api/add_user").json(&body).await.status_code()
    }

    #[tokio::test]
    async fn listings_reflect_store() {
        let dir = TempDir::new("web");
        let store = store();
        let task = store.add_task(&NewTask::named("pwn100")).await.unwrap();
        let file = store.add_file("exploit.py").await.unwrap();
        store.add_user(&NewUser::new("alice", "pw")).await.unwrap();
        store.take_task(&task, "alice").await.unwrap();
        store
            .add_comment(&NewComment {
                task_id: task.clone(),
                user_id: "alice".into(),
                text: Some("see attachment".into()),
                attached_files: vec![file.clone()],
            })
            .await
            .unwrap();
        let server = server(store, dir.path());

        let users: Value = server.get("/api/get_users").await.json();
        assert_eq!(users[0]["login"], "alice");
        assert!(users[0].get("password_hash").is_none());

        let tasks: Value = server.get("/api/get_tasks").await.json();
        assert_eq!(tasks[0]["id"], task.as_str());

        let files: Value = server.get("/api/get_files").await.json();
        assert_eq!(files[0]["name"], "exploit.py");

        let comments: Value = server.get("/api/get_comments").await.json();
        assert_eq!(comments[0]["attached_files"], json!([file.as_str()]));

        let solvings: Value = server.get("/api/get_solvings").await.json();
        assert_eq!(solvings, json!([{"user_id": "alice", "task_id": task.as_str()}]));
    }

    #[tokio::test]
    async fn authorize_then_whoami() {
        let dir = TempDir::new("web");
        let store = store();
        store.add_user(&NewUser::new("alice", "pw")).await.unwrap();
        let server = server(store, dir.path());

        let rejected = server
            .post("/api/authorize")
            .json(&json!({"login": "alice", "password": "wrong"}))
            .await;
        rejected.assert_status(StatusCode::UNAUTHORIZED);

        let response = server
            .post("/api/authorize")
            .json(&json!({"login": "alice", "password": "pw"}))
            .await;
        response.assert_status_ok();
        let session: SessionResponse = response.json();
        let set_cookie = response.header(SET_COOKIE);
        assert!(
            set_cookie
                .to_str()
                .unwrap()
                .starts_with(&format!("session_id={};", session.session_id))
        );

        let me: Value = server
            .get("/api/whoami")
            .add_query_param("session_id", session.session_id.as_str())
            .await
            .json();
        assert_eq!(me["login"], "alice");

        let me: Value = server
            .get("/api/whoami")
            .add_header(COOKIE, cookie(&session.session_id))
            .await
            .json();
        assert_eq!(me["login"], "alice");

        server
            .get("/api/whoami")
            .add_query_param("session_id", "not-a-session")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn registration_checks_game_secrets() {
        let dir = TempDir::new("web");
        let store = store();
        let server = server(store.clone(), dir.path());

        let wrong = json!({"login": "alice", "password": "pw", "register_pass": "nope"});
        assert_eq!(register(&server, wrong).await, StatusCode::FORBIDDEN);

        let player = json!({"login": "alice", "password": "pw", "register_pass": "1"});
        assert_eq!(register(&server, player.clone()).await, StatusCode::CREATED);
        assert_eq!(register(&server, player).await, StatusCode::CONFLICT);

        let no_secret = json!({
            "login": "bob", "password": "pw", "register_pass": "1", "is_captain": true,
        });
        assert_eq!(register(&server, no_secret).await, StatusCode::FORBIDDEN);
        let wrong_secret = json!({
            "login": "bob", "password": "pw", "register_pass": "1",
            "is_captain": true, "captain_pass": "1",
        });
        assert_eq!(register(&server, wrong_secret).await, StatusCode::FORBIDDEN);
        let captain = json!({
            "login": "bob", "password": "pw", "register_pass": "1",
            "is_captain": true, "captain_pass": "2",
        });
        assert_eq!(register(&server, captain).await, StatusCode::CREATED);

        assert!(!store.get_user("alice").await.unwrap().unwrap().is_captain);
        assert!(store.get_user("bob").await.unwrap().unwrap().is_captain);
        assert!(store.verify_user("bob", "pw").await.unwrap());
    }

    #[tokio::test]
    async fn writes_need_a_session() {
        let dir = TempDir::new("web");
        let store = store();
        let task = store.add_task(&NewTask::named("web300")).await.unwrap();
        let server = server(store.clone(), dir.path());

        server
            .post("/api/add_comment")
            .json(&json!({"task_id": task.as_str(), "text": "hi"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/api/mark_task")
            .add_header(COOKIE, cookie(&EntityId::random()))
            .json(&json!({"id": task.as_str(), "new_type": "solved"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post("/api/add_file")
            .add_query_param("name", "x")
            .bytes(Bytes::from_static(b"x"))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        assert!(store.list_comments().await.unwrap().is_empty());
        assert!(store.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_then_fetch_file() {
        let dir = TempDir::new("web");
        let store = store();
        store.add_user(&NewUser::new("alice", "pw")).await.unwrap();
        let server = server(store.clone(), dir.path());
        let session = login(&server, "alice", "pw").await;

        let response = server
            .post("/api/add_file")
            .add_query_param("name", "dump \"1\".pcap")
            .add_header(COOKIE, cookie(&session))
            .bytes(Bytes::from_static(b"\x00pcap"))
            .await;
        response.assert_status_ok();
        let id: EntityId = response.json();
        assert_eq!(std::fs::read(dir.path().join(id.as_str())).unwrap(), b"\x00pcap");
        assert_eq!(store.get_file(&id).await.unwrap().unwrap().name, "dump \"1\".pcap");

        let inline = server.get(&format!("/api/get_file/{}", id)).await;
        inline.assert_status_ok();
        assert_eq!(inline.as_bytes().as_ref(), b"\x00pcap");

        let download = server.get(&format!("/api/download_file/{}", id)).await;
        download.assert_status_ok();
        assert_eq!(
            download.header(CONTENT_DISPOSITION),
            "attachment; filename=\"dump _1_.pcap\""
        );
        assert_eq!(download.as_bytes().as_ref(), b"\x00pcap");

        server
            .get(&format!("/api/get_file/{}", EntityId::random()))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .get("/api/download_file/not-an-id")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        let unsaved = store.add_file("never-uploaded").await.unwrap();
        server
            .get(&format!("/api/get_file/{}", unsaved))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_upload_leaves_no_row() {
        let dir = TempDir::new("web");
        let store = store();
        store.add_user(&NewUser::new("alice", "pw")).await.unwrap();
        let server = server(store.clone(), &dir.path().join("missing"));
        let session = login(&server, "alice", "pw").await;

        server
            .post("/api/add_file")
            .add_query_param("name", "a.txt")
            .add_header(COOKIE, cookie(&session))
            .bytes(Bytes::from_static(b"a"))
            .await
            .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(store.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn comments_are_removed_by_author_or_captain() {
        let dir = TempDir::new("web");
        let store = store();
        let task = store.add_task(&NewTask::named("rev200")).await.unwrap();
        let file = store.add_file("notes.txt").await.unwrap();
        store.add_user(&NewUser::new("alice", "pw")).await.unwrap();
        store.add_user(&NewUser::new("bob", "pw")).await.unwrap();
        let mut captain = NewUser::new("carol", "pw");
        captain.is_captain = true;
        store.add_user(&captain).await.unwrap();
        let server = server(store.clone(), dir.path());
        let alice = login(&server, "alice", "pw").await;
        let bob = login(&server, "bob", "pw").await;
        let carol = login(&server, "carol", "pw").await;

        let mut comments = Vec::new();
        for _ in 0..2 {
            let response = server
                .post("/api/add_comment")
                .add_header(COOKIE, cookie(&alice))
                .json(&json!({
                    "task_id": task.as_str(),
                    "text": "xor with 0x42",
                    "files_ids": [file.as_str()],
                }))
                .await;
            response.assert_status_ok();
            comments.push(response.json::<EntityId>());
        }
        let stored = store.get_comment(&comments[0]).await.unwrap().unwrap();
        assert_eq!(stored.user_id, "alice");
        assert_eq!(stored.attached_files, vec![file.clone()]);

        server
            .post("/api/rm_comment")
            .add_header(COOKIE, cookie(&bob))
            .json(&json!({"id": comments[0].as_str()}))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        server
            .post("/api/rm_comment")
            .add_header(COOKIE, cookie(&alice))
            .json(&json!({"id": comments[0].as_str()}))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .post("/api/rm_comment")
            .add_header(COOKIE, cookie(&carol))
            .json(&json!({"id": comments[1].as_str()}))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .post("/api/rm_comment")
            .add_header(COOKIE, cookie(&carol))
            .json(&json!({"id": comments[1].as_str()}))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        assert!(store.list_comments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn marks_and_avatars_respect_roles() {
        let dir = TempDir::new("web");
        let store = store();
        let task = store.add_task(&NewTask::named("crypto100")).await.unwrap();
        let avatar = store.add_file("me.png").await.unwrap();
        store.add_user(&NewUser::new("alice", "pw")).await.unwrap();
        store.add_user(&NewUser::new("bob", "pw")).await.unwrap();
        let server = server(store.clone(), dir.path());
        let alice = login(&server, "alice", "pw").await;

        server
            .post("/api/mark_user")
            .add_header(COOKIE, cookie(&alice))
            .json(&json!({"id": "bob", "new_type": "captain"}))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        store.mark_user("alice", UserRole::Captain).await.unwrap();
        server
            .post("/api/mark_user")
            .add_header(COOKIE, cookie(&alice))
            .json(&json!({"id": "bob", "new_type": "admin"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        server
            .post("/api/mark_user")
            .add_header(COOKIE, cookie(&alice))
            .json(&json!({"id": "bob", "new_type": "captain"}))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert!(store.get_user("bob").await.unwrap().unwrap().is_captain);

        server
            .post("/api/mark_task")
            .add_header(COOKIE, cookie(&alice))
            .json(&json!({"id": task.as_str(), "new_type": "solved"}))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert!(store.get_task(&task).await.unwrap().unwrap().solved);

        server
            .post("/api/update_avatar")
            .add_header(COOKIE, cookie(&alice))
            .json(&json!({"user_id": "bob", "avatar_file_id": avatar.as_str()}))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        server
            .post("/api/update_avatar")
            .add_header(COOKIE, cookie(&alice))
            .json(&json!({"user_id": "alice", "avatar_file_id": avatar.as_str()}))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert_eq!(
            store.get_user("alice").await.unwrap().unwrap().avatar,
            Some(avatar)
        );
        assert_eq!(store.get_user("bob").await.unwrap().unwrap().avatar, None);
    }

    #[tokio::test]
    async fn solvings_are_taken_by_self_or_captain() {
        let dir = TempDir::new("web");
        let store = store();
        let task = store.add_task(&NewTask::named("misc50")).await.unwrap();
        store.add_user(&NewUser::new("alice", "pw")).await.unwrap();
        store.add_user(&NewUser::new("bob", "pw")).await.unwrap();
        let mut captain = NewUser::new("carol", "pw");
        captain.is_captain = true;
        store.add_user(&captain).await.unwrap();
        let server = server(store.clone(), dir.path());
        let alice = login(&server, "alice", "pw").await;
        let carol = login(&server, "carol", "pw").await;
        let solving = |user: &str| json!({"task_id": task.as_str(), "user_id": user});

        server
            .post("/api/take_task")
            .add_header(COOKIE, cookie(&alice))
            .json(&solving("bob"))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        server
            .post("/api/take_task")
            .add_header(COOKIE, cookie(&alice))
            .json(&solving("alice"))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .post("/api/take_task")
            .add_header(COOKIE, cookie(&alice))
            .json(&solving("alice"))
            .await
            .assert_status(StatusCode::CONFLICT);
        server
            .post("/api/take_task")
            .add_header(COOKIE, cookie(&carol))
            .json(&solving("bob"))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert_eq!(store.list_solvings().await.unwrap().len(), 2);

        server
            .post("/api/reject_task")
            .add_header(COOKIE, cookie(&alice))
            .json(&solving("bob"))
            .await
            .assert_status(StatusCode::FORBIDDEN);
        server
            .post("/api/reject_task")
            .add_header(COOKIE, cookie(&carol))
            .json(&solving("bob"))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .post("/api/reject_task")
            .add_header(COOKIE, cookie(&alice))
            .json(&solving("alice"))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        assert!(store.list_solvings().await.unwrap().is_empty());
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; session_id=abc ;b=2"));
        assert_eq!(session_cookie(&headers), Some("abc"));
        headers.insert(COOKIE, HeaderValue::from_static("a=1"));
        assert_eq!(session_cookie(&headers), None);
    }

    #[tokio::test]
    async fn sentinel_ends_the_wait() {
        let dir = TempDir::new("web");
        let folder = dir.path().to_path_buf();
        let waiter = tokio::spawn(async move {
            wait_for_sentinel(&folder, Duration::from_millis(5)).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        std::fs::write(dir.path().join(SENTINEL), b"").unwrap();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
