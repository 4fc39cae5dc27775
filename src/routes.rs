use axum::{
    Router,
    extract::{MatchedPath, Request},
    http::StatusCode,
    middleware,
    response::Redirect,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::Span;

use crate::{
    app_state::AppState,
    handlers::{
        auth, cards, dashboard,
        middleware::{require_device, require_session},
    },
};

/// Request span keyed by the route template. Raw URIs carry bearer tokens
/// (`/app/confirmemail/{token}`) and must stay out of the logs.
fn request_span(request: &Request) -> Span {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or("<unmatched>");

    tracing::debug_span!("request", method = %request.method(), path = %path)
}

pub fn build_router(state: AppState) -> Router {
    let timeout = state.config.request_timeout();

    // Device API, HTTP Basic
    let device_api = Router::new()
        .route("/api/cards/new", post(cards::create_card))
        .route("/api/cards/use", post(cards::use_card))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_device));

    // Dashboard, cookie session with silent refresh
    let dashboard = Router::new()
        .route("/app/dashboard", get(dashboard::show))
        .route("/app/dashboard/incrementopens/{card_id}", post(dashboard::increment_opens))
        .route("/app/dashboard/decrementopens/{card_id}", post(dashboard::decrement_opens))
        .route("/app/dashboard/setopens/{card_id}", post(dashboard::set_opens))
        .route(
            "/app/dashboard/updatefriendlyname/{card_id}",
            post(dashboard::update_friendly_name),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/", get(|| async { Redirect::to("/app/dashboard") }))
        .route("/app/login", get(auth::login_page).post(auth::login))
        .route("/app/logout", get(auth::logout))
        .route("/app/createaccount", get(auth::create_account_page).post(auth::create_account))
        .route("/app/confirmemail/{token}", get(auth::confirm_email))
        .merge(dashboard)
        .merge(device_api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Request, Response, StatusCode, header},
    };
    use base64::{Engine, engine::general_purpose::STANDARD};
    use http_body_util::BodyExt;
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };
    use tower::ServiceExt;
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt};
    use uuid::Uuid;

    use crate::{
        auth::password::{Argon2Hasher, PasswordHasher},
        db::{CardRepository, UserRepository, models::NewUser},
        testing::{DEVICE_PASSWORD, DEVICE_USER, TestApp, test_app},
    };

    const FORM: &str = "application/x-www-form-urlencoded";

    /// fmt writer target that keeps everything in memory
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn app(t: &TestApp) -> Router {
        build_router(t.state.clone()).layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 40000))))
    }

    async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn set_cookies(response: &Response<Body>) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    fn cookie_named<'a>(cookies: &'a [String], name: &str) -> Option<&'a String> {
        cookies.iter().find(|c| c.starts_with(&format!("{name}=")))
    }

    fn device_request(path: &str, body: String, password: &str) -> Request<Body> {
        let credentials = STANDARD.encode(format!("{DEVICE_USER}:{password}"));
        Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Basic {credentials}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn form_request(path: &str, body: &str, cookie: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, FORM);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(path: &str, cookie: Option<String>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn seed_user(t: &TestApp, email: &str, password: &str) {
        t.repo
            .create_user(NewUser {
                email: email.to_string(),
                password_hash: Argon2Hasher.hash(password).await.unwrap(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
            })
            .await
            .unwrap();
    }

    async fn access_cookie(t: &TestApp, email: &str, password: &str) -> String {
        let tokens = t.state.auth.login(email, password, false).await.unwrap();
        format!("access_token={}", tokens.access.value)
    }

    #[tokio::test]
    async fn test_device_api_requires_basic_auth() {
        let t = test_app().await;
        let app = app(&t);
        let body = format!(r#"{{"uuid":"{}"}}"#, Uuid::new_v4());

        let anonymous = Request::builder()
            .method("POST")
            .uri("/api/cards/new")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.clone()))
            .unwrap();
        let response = send(&app, anonymous).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let response = send(&app, device_request("/api/cards/new", body.clone(), "wrong")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        for user in ["intruder", "esp3", ""] {
            let credentials = STANDARD.encode(format!("{user}:{DEVICE_PASSWORD}"));
            let request = Request::builder()
                .method("POST")
                .uri("/api/cards/new")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Basic {credentials}"))
                .body(Body::from(body.clone()))
                .unwrap();
            let response = send(&app, request).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "user {user:?}");
        }

        assert!(t.repo.list_cards().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_device_provision_and_use() {
        let t = test_app().await;
        let app = app(&t);
        let id = Uuid::new_v4();
        let body = format!(r#"{{"uuid":"{id}"}}"#);

        let response = send(&app, device_request("/api/cards/new", body.clone(), DEVICE_PASSWORD)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, device_request("/api/cards/new", body.clone(), DEVICE_PASSWORD)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // New cards start disabled
        let response = send(&app, device_request("/api/cards/use", body.clone(), DEVICE_PASSWORD)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        t.repo.set_card_opens(id, 1).await.unwrap();
        let response = send(&app, device_request("/api/cards/use", body.clone(), DEVICE_PASSWORD)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&app, device_request("/api/cards/use", body, DEVICE_PASSWORD)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_device_rejects_bad_bodies() {
        let t = test_app().await;
        let app = app(&t);

        for body in ["{", r#"{"uuid":"not-a-uuid"}"#, "{}"] {
            let response = send(&app, device_request("/api/cards/use", body.to_string(), DEVICE_PASSWORD)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        }
    }

    #[tokio::test]
    async fn test_dashboard_without_credentials() {
        let t = test_app().await;
        let app = app(&t);

        let response = send(&app, get_request("/app/dashboard", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("action=\"/app/login\""));

        let response = send(&app, get_request("/app/dashboard", Some("access_token=garbage".into()))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let id = Uuid::new_v4();
        t.repo.create_card(id).await.unwrap();
        let response = send(&app, form_request(&format!("/app/dashboard/setopens/{id}"), "num=5", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(t.repo.get_card_opens(id).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_login_sets_session_cookies() {
        let t = test_app().await;
        seed_user(&t, "ada@example.com", "hunter2").await;
        let app = app(&t);

        let response = send(&app, form_request("/app/login", "email=ada@example.com&password=hunter2", None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/app/dashboard");

        let cookies = set_cookies(&response);
        let access = cookie_named(&cookies, "access_token").unwrap();
        let refresh = cookie_named(&cookies, "refresh_token").unwrap();
        assert!(access.contains("HttpOnly"));
        assert!(access.contains("Max-Age=900"));
        assert!(refresh.contains("HttpOnly"));
        assert!(refresh.contains("Max-Age=86400"));

        let response = send(
            &app,
            form_request("/app/login", "email=ada@example.com&password=hunter2&remember_me=on", None),
        )
        .await;
        let cookies = set_cookies(&response);
        assert!(cookie_named(&cookies, "refresh_token").unwrap().contains("Max-Age=2592000"));
    }

    #[tokio::test]
    async fn test_login_failures() {
        let t = test_app().await;
        seed_user(&t, "ada@example.com", "hunter2").await;
        let app = app(&t);

        let response = send(&app, form_request("/app/login", "email=ada@example.com&password=nope", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(set_cookies(&response).is_empty());
        let wrong_password = body_text(response).await;

        let response = send(&app, form_request("/app/login", "email=bob@example.com&password=nope", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let unknown_user = body_text(response).await;

        assert_eq!(wrong_password, unknown_user);
        assert!(unknown_user.contains("Invalid email and/or password"));

        let response = send(&app, form_request("/app/login", "email=&password=", None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dashboard_renders_with_access_cookie() {
        let t = test_app().await;
        seed_user(&t, "ada@example.com", "hunter2").await;
        let id = Uuid::new_v4();
        t.repo.create_card(id).await.unwrap();
        let app = app(&t);

        let cookie = access_cookie(&t, "ada@example.com", "hunter2").await;
        let response = send(&app, get_request("/app/dashboard", Some(cookie))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(cookie_named(&set_cookies(&response), "access_token").is_none());

        let page = body_text(response).await;
        assert!(page.contains("Ada Lovelace"));
        assert!(page.contains(&id.to_string()));
    }

    #[tokio::test]
    async fn test_dashboard_silently_refreshes() {
        let t = test_app().await;
        seed_user(&t, "ada@example.com", "hunter2").await;
        let app = app(&t);

        let tokens = t.state.auth.login("ada@example.com", "hunter2", false).await.unwrap();
        let cookie = format!("access_token=expired; refresh_token={}", tokens.refresh.value);

        let response = send(&app, get_request("/app/dashboard", Some(cookie))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookies = set_cookies(&response);
        let access = cookie_named(&cookies, "access_token").unwrap();
        assert!(access.contains("Max-Age=900"));
        assert!(access.contains("HttpOnly"));

        // A refresh token is not accepted in the access slot
        let misuse = format!("access_token={}", tokens.refresh.value);
        let response = send(&app, get_request("/app/dashboard", Some(misuse))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_dashboard_actions() {
        let t = test_app().await;
        seed_user(&t, "ada@example.com", "hunter2").await;
        let id = Uuid::new_v4();
        t.repo.create_card(id).await.unwrap();
        let app = app(&t);
        let cookie = access_cookie(&t, "ada@example.com", "hunter2").await;

        let post = |path: String, body: &'static str| form_request(&path, body, Some(cookie.clone()));

        let response = send(&app, post(format!("/app/dashboard/incrementopens/{id}"), "")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/app/dashboard");
        assert_eq!(t.repo.get_card_opens(id).await.unwrap(), Some(1));

        send(&app, post(format!("/app/dashboard/decrementopens/{id}"), "")).await;
        send(&app, post(format!("/app/dashboard/decrementopens/{id}"), "")).await;
        assert_eq!(t.repo.get_card_opens(id).await.unwrap(), Some(-1));

        let response = send(&app, post(format!("/app/dashboard/setopens/{id}"), "num=7")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(t.repo.get_card_opens(id).await.unwrap(), Some(7));

        for body in ["num=abc", "num=-2"] {
            let response = send(&app, post(format!("/app/dashboard/setopens/{id}"), body)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
        }
        assert_eq!(t.repo.get_card_opens(id).await.unwrap(), Some(7));

        let response = send(&app, post(format!("/app/dashboard/updatefriendlyname/{id}"), "name=Garage")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(t.repo.list_cards().await.unwrap()[0].friendly_name, "Garage");

        let response = send(&app, post("/app/dashboard/incrementopens/not-a-uuid".to_string(), "")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, post(format!("/app/dashboard/incrementopens/{}", Uuid::new_v4()), "")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_logout_clears_cookies() {
        let t = test_app().await;
        let app = app(&t);

        let response = send(&app, get_request("/app/logout", None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/app/login");

        let cookies = set_cookies(&response);
        assert!(cookie_named(&cookies, "access_token").unwrap().contains("Max-Age=0"));
        assert!(cookie_named(&cookies, "refresh_token").unwrap().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_registration_flow() {
        let t = test_app().await;
        let app = app(&t);
        let signup = "email=grace@example.com&password=cobol&first_name=Grace&last_name=Hopper";

        let response = send(&app, form_request("/app/createaccount", signup, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(t.repo.find_user_by_email("grace@example.com").await.unwrap().is_none());

        // Same client address inside the window
        let response = send(&app, form_request("/app/createaccount", signup, None)).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let sent = t.mailer.sent();
        assert_eq!(sent.len(), 1);
        let body = &sent[0].html_body;
        let start = body.find("/app/confirmemail/").unwrap() + "/app/confirmemail/".len();
        let token = &body[start..start + body[start..].find('"').unwrap()];

        let response = send(&app, get_request(&format!("/app/confirmemail/{token}"), None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/app/dashboard");
        let cookies = set_cookies(&response);
        assert!(cookie_named(&cookies, "access_token").is_some());
        assert!(cookie_named(&cookies, "refresh_token").is_some());

        let user = t.repo.find_user_by_email("grace@example.com").await.unwrap().unwrap();
        assert_eq!(user.first_name, "Grace");
        assert_ne!(user.password_hash, "cobol");

        let response = send(&app, get_request(&format!("/app/confirmemail/{token}"), None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_registration_rejections() {
        let t = test_app().await;
        let app = app(&t);

        let response = send(&app, form_request("/app/createaccount", "email=grace@example.com&password=", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("One or more fields are empty"));

        let response = send(&app, get_request("/app/confirmemail/forged.token.value", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(t.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_registration_token_stays_out_of_request_logs() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new("lockbox_server=debug,tower_http=debug"))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(move || writer.clone()),
            );
        let _guard = tracing::subscriber::set_default(subscriber);

        let t = test_app().await;
        let app = app(&t);
        let signup = "email=ada@example.com&password=analytical&first_name=Ada&last_name=Lovelace";
        let response = send(&app, form_request("/app/createaccount", signup, None)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = &t.mailer.sent()[0].html_body;
        let start = body.find("/app/confirmemail/").unwrap() + "/app/confirmemail/".len();
        let token = body[start..start + body[start..].find('"').unwrap()].to_string();

        let response = send(&app, get_request(&format!("/app/confirmemail/{token}"), None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let captured = logs.contents();
        assert!(captured.contains("path=/app/confirmemail/{token}"), "{captured}");
        assert!(!captured.contains(&token));
        assert!(!captured.contains("analytical"));
    }

    #[tokio::test]
    async fn test_slow_request_times_out() {
        let t = test_app().await;
        let mut config = (*t.state.config).clone();
        config.request_timeout_secs = 0;
        let state = AppState {
            config: Arc::new(config),
            ..t.state.clone()
        };
        let app = build_router(state).layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 40000))));

        // Password checks run off the runtime thread, so the handler is still pending at the deadline
        let response = send(&app, form_request("/app/login", "email=ada@example.com&password=hunter2", None)).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
