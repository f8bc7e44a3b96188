// ABOUTME: Integration tests for the browser consent flow and account resolution
// ABOUTME: Google endpoints are mocked, the browser is a background thread

mod common;

use common::{simulate_browser, Workspace};
use sheetkit::{
    accounts::STAGED_REFRESH_TOKEN_KEY,
    auth,
    config::Settings,
    google::GoogleOAuth,
    oauth::{AuthorizationFlow, FlowState},
    AccountProfile, AccountRecord, Error,
};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(base: &str) -> Settings {
    Settings::default()
        .with_base_url(base)
        .with_callback(0, Duration::from_secs(10))
}

async fn mock_google(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29-access",
            "refresh_token": "refresh-abc",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oauth2/v2/userinfo"))
        .and(header("Authorization", "Bearer ya29-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "1001",
            "email": "ada@example.com",
            "name": "Ada",
            "picture": "https://example.com/ada.png"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fresh_store_authorize_then_register() {
    let mock_server = MockServer::start().await;
    mock_google(&mock_server).await;
    let uri = mock_server.uri();

    tokio::task::spawn_blocking(move || {
        let ws = Workspace::new();
        let registry = ws.registry();
        let settings = settings(&uri);
        let oauth = GoogleOAuth::new(&settings).unwrap();
        let mut flow =
            AuthorizationFlow::new(&oauth, settings.callback_port, settings.callback_timeout);
        assert_eq!(flow.state(), FlowState::Idle);

        let browser: Mutex<Option<JoinHandle<(u16, String)>>> = Mutex::new(None);
        let authorized = flow
            .run(&registry, false, |url| {
                *browser.lock().unwrap() = Some(simulate_browser(url, "code=abc"));
                Ok(())
            })
            .unwrap();

        assert_eq!(flow.state(), FlowState::Completed);
        assert!(authorized.refresh_token_staged);
        assert_eq!(
            ws.store
                .get_as::<String>(STAGED_REFRESH_TOKEN_KEY)
                .as_deref(),
            Some("refresh-abc")
        );

        let (status, page) = browser.lock().unwrap().take().unwrap().join().unwrap();
        assert_eq!(status, 200);
        assert!(page.contains("Authorization complete"));

        let profile = authorized.client.profile().unwrap();
        let record = registry.connect(profile).unwrap();

        assert!(ws.store.get(STAGED_REFRESH_TOKEN_KEY).is_none());
        let all = registry.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["1001"], record);
        assert_eq!(record.refresh_token, "refresh-abc");
        assert_eq!(
            record.profile.image_url.as_deref(),
            Some("https://example.com/ada.png")
        );
        assert_eq!(registry.default_id().as_deref(), Some("1001"));
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_connect_local_writes_project_file() {
    let mock_server = MockServer::start().await;
    mock_google(&mock_server).await;
    let uri = mock_server.uri();

    tokio::task::spawn_blocking(move || {
        let ws = Workspace::new();
        let registry = ws.registry();
        let settings = settings(&uri);
        let oauth = GoogleOAuth::new(&settings).unwrap();
        let mut flow =
            AuthorizationFlow::new(&oauth, settings.callback_port, settings.callback_timeout);

        let browser: Mutex<Option<JoinHandle<(u16, String)>>> = Mutex::new(None);
        let record = auth::connect(&mut flow, &registry, true, true, |url| {
            assert!(url.contains("auth%2Fdrive&") || url.contains("auth%2Fdrive+"));
            *browser.lock().unwrap() = Some(simulate_browser(url, "code=abc"));
            Ok(())
        })
        .unwrap();
        browser.lock().unwrap().take().unwrap().join().unwrap();

        assert_eq!(record.id(), "1001");
        assert!(registry.get_all().is_none());
        assert!(ws.project.path().join(".googlerc.json").exists());
        assert_eq!(registry.get(None).unwrap(), record);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_provider_error_fails_flow() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;
    let uri = mock_server.uri();

    tokio::task::spawn_blocking(move || {
        let ws = Workspace::new();
        let registry = ws.registry();
        let settings = settings(&uri);
        let oauth = GoogleOAuth::new(&settings).unwrap();
        let mut flow =
            AuthorizationFlow::new(&oauth, settings.callback_port, settings.callback_timeout);

        let browser: Mutex<Option<JoinHandle<(u16, String)>>> = Mutex::new(None);
        let result = flow.run(&registry, false, |url| {
            *browser.lock().unwrap() = Some(simulate_browser(url, "error=access_denied"));
            Ok(())
        });

        assert!(matches!(result, Err(Error::AuthorizationFailed(_))));
        assert_eq!(flow.state(), FlowState::Failed);
        assert!(ws.store.get(STAGED_REFRESH_TOKEN_KEY).is_none());

        let (status, page) = browser.lock().unwrap().take().unwrap().join().unwrap();
        assert_eq!(status, 400);
        assert!(page.contains("access_denied"));
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_missing_code_fails_flow() {
    let mock_server = MockServer::start().await;
    let uri = mock_server.uri();

    tokio::task::spawn_blocking(move || {
        let ws = Workspace::new();
        let registry = ws.registry();
        let settings = settings(&uri);
        let oauth = GoogleOAuth::new(&settings).unwrap();
        let mut flow =
            AuthorizationFlow::new(&oauth, settings.callback_port, settings.callback_timeout);

        let browser: Mutex<Option<JoinHandle<(u16, String)>>> = Mutex::new(None);
        let result = flow.run(&registry, false, |url| {
            *browser.lock().unwrap() = Some(simulate_browser(url, "scope=email"));
            Ok(())
        });

        assert!(matches!(result, Err(Error::AuthorizationFailed(_))));
        assert_eq!(flow.state(), FlowState::Failed);
        let (status, _) = browser.lock().unwrap().take().unwrap().join().unwrap();
        assert_eq!(status, 400);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_code_exchange_failure_fails_flow() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Bad Request"
        })))
        .mount(&mock_server)
        .await;
    let uri = mock_server.uri();

    tokio::task::spawn_blocking(move || {
        let ws = Workspace::new();
        let registry = ws.registry();
        let settings = settings(&uri);
        let oauth = GoogleOAuth::new(&settings).unwrap();
        let mut flow =
            AuthorizationFlow::new(&oauth, settings.callback_port, settings.callback_timeout);

        let browser: Mutex<Option<JoinHandle<(u16, String)>>> = Mutex::new(None);
        let result = flow.run(&registry, false, |url| {
            *browser.lock().unwrap() = Some(simulate_browser(url, "code=abc"));
            Ok(())
        });

        match result {
            Err(Error::AuthorizationFailed(message)) => assert!(message.contains("invalid_grant")),
            Err(other) => panic!("expected AuthorizationFailed, got {}", other),
            Ok(_) => panic!("expected AuthorizationFailed, got success"),
        }
        assert_eq!(flow.state(), FlowState::Failed);
        browser.lock().unwrap().take().unwrap().join().unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_callback_timeout_fails_flow() {
    let mock_server = MockServer::start().await;
    let uri = mock_server.uri();

    tokio::task::spawn_blocking(move || {
        let ws = Workspace::new();
        let registry = ws.registry();
        let settings = settings(&uri).with_callback(0, Duration::from_millis(200));
        let oauth = GoogleOAuth::new(&settings).unwrap();
        let mut flow =
            AuthorizationFlow::new(&oauth, settings.callback_port, settings.callback_timeout);

        let result = flow.run(&registry, false, |_| Ok(()));
        assert!(matches!(result, Err(Error::AuthorizationFailed(_))));
        assert_eq!(flow.state(), FlowState::Failed);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_authorize_prefers_local_override() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=local-rt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29-local",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=global-rt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29-global",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    let uri = mock_server.uri();

    tokio::task::spawn_blocking(move || {
        let ws = Workspace::new();
        let registry = ws.registry();
        let oauth = GoogleOAuth::new(&settings(&uri)).unwrap();

        let profile = |id: &str| AccountProfile {
            id: id.into(),
            email: format!("{}@example.com", id),
            name: None,
            image_url: None,
        };
        registry
            .set(AccountRecord::new("global-rt", profile("g")))
            .unwrap();
        registry
            .local()
            .write(&AccountRecord::new("local-rt", profile("l")))
            .unwrap();

        let client = auth::authorize(&registry, &oauth, None).unwrap();
        assert_eq!(client.access_token(), "ya29-local");

        let client = auth::authorize(&registry, &oauth, Some("g")).unwrap();
        assert_eq!(client.access_token(), "ya29-global");
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_authorize_surfaces_revoked_refresh_token() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&mock_server)
        .await;
    let uri = mock_server.uri();

    tokio::task::spawn_blocking(move || {
        let ws = Workspace::new();
        let registry = ws.registry();
        let oauth = GoogleOAuth::new(&settings(&uri)).unwrap();
        registry
            .set(AccountRecord::new(
                "revoked",
                AccountProfile {
                    id: "1".into(),
                    email: "a@example.com".into(),
                    name: None,
                    image_url: None,
                },
            ))
            .unwrap();

        match auth::authorize(&registry, &oauth, None) {
            Err(Error::ExchangeFailed(message)) => assert!(message.contains("revoked")),
            Err(other) => panic!("expected ExchangeFailed, got {}", other),
            Ok(_) => panic!("expected ExchangeFailed, got success"),
        }
    })
    .await
    .unwrap();
}
