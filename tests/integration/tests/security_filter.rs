//! The security filter mounted on an axum router.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use pl_core::AuditHelper;
use pl_http_security::{
    security_layer, Account, AuthenticationConfig, Credentials, IdentityManager,
    PathConfiguration, SecurityFilter, SecurityResult, SecurityState,
};
use pl_session::SessionStore;
use tower::ServiceExt;

use crate::common;

/// Users: `admin` (role admin) and `tomcat` (role manager), password equal
/// to the user name.
struct Users;

#[async_trait]
impl IdentityManager for Users {
    async fn authenticate(&self, credentials: &Credentials) -> SecurityResult<Option<Account>> {
        let Credentials::Password { username, password } = credentials else {
            return Ok(None);
        };
        let role = match username.as_str() {
            "admin" => "admin",
            "tomcat" => "manager",
            _ => return Ok(None),
        };
        Ok((password == username).then(|| Account::new(username.clone(), username.clone()).with_roles([role])))
    }
}

fn app(paths: Vec<PathConfiguration>, sessions: Arc<SessionStore>) -> anyhow::Result<Router> {
    let filter = paths
        .into_iter()
        .fold(
            SecurityFilter::builder(Arc::new(Users)).audit(AuditHelper::new("sales")),
            |builder, path| builder.path(path),
        )
        .build()?;
    let state = SecurityState::new(Arc::new(filter), sessions);

    Ok(Router::new()
        .route("/index.html", get(|| async { "index" }))
        .route("/admin", get(|| async { "admin" }))
        .route("/admin/panel", get(|| async { "panel" }))
        .route("/reports/monthly.jsp", get(|| async { "report" }))
        .route("/reports/monthly.html", get(|| async { "static report" }))
        .route("/api/orders", get(|| async { "orders" }).post(|| async { "created" }))
        .route("/protected/page", get(|| async { "protected" }))
        .layer(middleware::from_fn_with_state(state, security_layer)))
}

fn basic(user: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{user}")))
}

fn get_request(uri: &str) -> anyhow::Result<Request<Body>> {
    Ok(Request::get(uri).body(Body::empty())?)
}

fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::to_string)
}

fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
}

async fn body_text(response: Response) -> anyhow::Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn admin_paths() -> Vec<PathConfiguration> {
    vec![
        PathConfiguration::builder("/*").unprotected().build(),
        PathConfiguration::builder("/admin")
            .authentication(AuthenticationConfig::basic())
            .allowed_roles(["admin"])
            .build(),
    ]
}

#[tokio::test]
async fn basic_challenge_on_protected_path() -> anyhow::Result<()> {
    common::init_tracing();
    let response = app(admin_paths(), Arc::new(SessionStore::new()))?
        .oneshot(get_request("/admin")?)
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert_eq!(challenge, "Basic realm=\"PicketLink Default Realm\"");
    Ok(())
}

#[tokio::test]
async fn exact_path_wins_over_catch_all() -> anyhow::Result<()> {
    let sessions = Arc::new(SessionStore::new());

    let open = app(admin_paths(), Arc::clone(&sessions))?
        .oneshot(get_request("/index.html")?)
        .await?;
    assert_eq!(open.status(), StatusCode::OK);
    assert_eq!(body_text(open).await?, "index");

    let admin = app(admin_paths(), Arc::clone(&sessions))?
        .oneshot(
            Request::get("/admin")
                .header(header::AUTHORIZATION, basic("admin"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(admin.status(), StatusCode::OK);
    assert_eq!(body_text(admin).await?, "admin");
    Ok(())
}

#[tokio::test]
async fn authenticated_user_without_role_is_forbidden() -> anyhow::Result<()> {
    let response = app(admin_paths(), Arc::new(SessionStore::new()))?
        .oneshot(
            Request::get("/admin")
                .header(header::AUTHORIZATION, basic("tomcat"))
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_challenged_again() -> anyhow::Result<()> {
    let response = app(admin_paths(), Arc::new(SessionStore::new()))?
        .oneshot(
            Request::get("/admin")
                .header(header::AUTHORIZATION, format!("Basic {}", STANDARD.encode("admin:nope")))
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    Ok(())
}

#[tokio::test]
async fn suffix_pattern_protects_matching_files_only() -> anyhow::Result<()> {
    let paths = vec![
        PathConfiguration::builder("/*").unprotected().build(),
        PathConfiguration::builder("/*.jsp")
            .authentication(AuthenticationConfig::basic())
            .build(),
    ];
    let sessions = Arc::new(SessionStore::new());

    let jsp = app(paths.clone(), Arc::clone(&sessions))?
        .oneshot(get_request("/reports/monthly.jsp")?)
        .await?;
    assert_eq!(jsp.status(), StatusCode::UNAUTHORIZED);

    let html = app(paths, sessions)?
        .oneshot(get_request("/reports/monthly.html")?)
        .await?;
    assert_eq!(html.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn method_selects_configuration() -> anyhow::Result<()> {
    let paths = vec![
        PathConfiguration::builder("/api/*")
            .methods([Method::GET])
            .unprotected()
            .build(),
        PathConfiguration::builder("/api/*")
            .methods([Method::POST])
            .authentication(AuthenticationConfig::basic())
            .allowed_roles(["manager"])
            .build(),
    ];
    let sessions = Arc::new(SessionStore::new());

    let read = app(paths.clone(), Arc::clone(&sessions))?
        .oneshot(get_request("/api/orders")?)
        .await?;
    assert_eq!(read.status(), StatusCode::OK);

    let anonymous_write = app(paths.clone(), Arc::clone(&sessions))?
        .oneshot(Request::post("/api/orders").body(Body::empty())?)
        .await?;
    assert_eq!(anonymous_write.status(), StatusCode::UNAUTHORIZED);

    let write = app(paths, sessions)?
        .oneshot(
            Request::post("/api/orders")
                .header(header::AUTHORIZATION, basic("tomcat"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(write.status(), StatusCode::OK);
    assert_eq!(body_text(write).await?, "created");
    Ok(())
}

#[tokio::test]
async fn unconfigured_path_is_forbidden() -> anyhow::Result<()> {
    let paths = vec![PathConfiguration::builder("/admin")
        .authentication(AuthenticationConfig::basic())
        .build()];
    let response = app(paths, Arc::new(SessionStore::new()))?
        .oneshot(get_request("/index.html")?)
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn form_login_restores_original_page_and_logout_clears_it() -> anyhow::Result<()> {
    common::init_tracing();
    let paths = vec![
        PathConfiguration::builder("/protected/*")
            .authentication(AuthenticationConfig::form())
            .build(),
        PathConfiguration::builder("/logout").logout().build(),
    ];
    let sessions = Arc::new(SessionStore::new());

    let challenged = app(paths.clone(), Arc::clone(&sessions))?
        .oneshot(get_request("/protected/page?tab=orders&page=2")?)
        .await?;
    assert!(challenged.status().is_redirection());
    assert_eq!(location(&challenged), Some("/login.html"));
    let cookie = session_cookie(&challenged).ok_or_else(|| anyhow::anyhow!("no session cookie"))?;

    let login = app(paths.clone(), Arc::clone(&sessions))?
        .oneshot(
            Request::post("/j_security_check")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("j_username=tomcat&j_password=tomcat"))?,
        )
        .await?;
    assert!(login.status().is_redirection());
    assert_eq!(location(&login), Some("/protected/page?tab=orders&page=2"));

    let page = app(paths.clone(), Arc::clone(&sessions))?
        .oneshot(
            Request::get("/protected/page")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(page.status(), StatusCode::OK);
    assert_eq!(body_text(page).await?, "protected");

    let logout = app(paths.clone(), Arc::clone(&sessions))?
        .oneshot(
            Request::get("/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert!(logout.status().is_redirection());
    assert_eq!(location(&logout), Some("/"));

    let again = app(paths, sessions)?
        .oneshot(
            Request::get("/protected/page")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(location(&again), Some("/login.html"));
    Ok(())
}

#[tokio::test]
async fn idle_session_loses_its_login() -> anyhow::Result<()> {
    let paths = vec![PathConfiguration::builder("/protected/*")
        .authentication(AuthenticationConfig::form())
        .build()];
    let sessions = Arc::new(SessionStore::new().with_max_inactive(chrono::Duration::seconds(-1)));

    let challenged = app(paths.clone(), Arc::clone(&sessions))?
        .oneshot(get_request("/protected/page")?)
        .await?;
    let cookie = session_cookie(&challenged).ok_or_else(|| anyhow::anyhow!("no session cookie"))?;

    let login = app(paths.clone(), Arc::clone(&sessions))?
        .oneshot(
            Request::post("/j_security_check")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("j_username=tomcat&j_password=tomcat"))?,
        )
        .await?;
    let login_cookie = session_cookie(&login).ok_or_else(|| anyhow::anyhow!("no session cookie"))?;
    assert_ne!(login_cookie, cookie);

    let page = app(paths, Arc::clone(&sessions))?
        .oneshot(
            Request::get("/protected/page")
                .header(header::COOKIE, &login_cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(location(&page), Some("/login.html"));
    assert_eq!(sessions.len(), 1);
    Ok(())
}

#[tokio::test]
async fn ajax_logout_gets_no_content() -> anyhow::Result<()> {
    let paths = vec![
        PathConfiguration::builder("/admin")
            .authentication(AuthenticationConfig::basic())
            .build(),
        PathConfiguration::builder("/logout").logout().build(),
    ];
    let response = app(paths, Arc::new(SessionStore::new()))?
        .oneshot(
            Request::get("/logout")
                .header("X-Requested-With", "XMLHttpRequest")
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    Ok(())
}
