mod common;

use std::sync::Arc;

use common::{CODE_HASH, FakeTelegram, LOGIN_CODE, MockServer, PASSWORD_HINT, REJECTED_PHONE};
use tgmedia_client::{Client, ErrorKind, InMemorySessionStore, LoginError, LoginFlow, SessionStore};
use tgmedia_tl::functions;

#[tokio::test]
async fn malformed_phone_never_reaches_the_server() {
    let server = MockServer::start(FakeTelegram::new()).await;
    let client = Client::new(server.config(Arc::new(InMemorySessionStore::new())));

    for phone in ["", "phone", "+0123456", "+1 555 0100"] {
        let err = client.request_login_code(phone).await.unwrap_err();
        assert!(matches!(err, LoginError::InvalidPhoneFormat(_)), "{phone:?}: {err:?}");
        assert_eq!(err.kind(), ErrorKind::InvalidPhoneFormat);
    }
    assert_eq!(server.handshakes(), 0);
    assert_eq!(server.requests::<functions::auth::SendCode>(), 0);
}

#[tokio::test]
async fn server_rejected_phone_is_a_format_error() {
    let server = MockServer::start(FakeTelegram::new()).await;
    let client = Client::new(server.config(Arc::new(InMemorySessionStore::new())));

    let err = client.request_login_code(REJECTED_PHONE).await.unwrap_err();
    assert!(matches!(err, LoginError::InvalidPhoneFormat(_)), "{err:?}");
}

#[tokio::test]
async fn code_login_saves_the_session() {
    let server = MockServer::start(FakeTelegram::new()).await;
    let store = Arc::new(InMemorySessionStore::new());
    let client = Client::new(server.config(store.clone()));

    let token = client.request_login_code(" +15551234567 ").await.unwrap();
    assert_eq!(token.phone, "+15551234567");
    assert_eq!(token.phone_code_hash, CODE_HASH);

    let user = client.complete_login(&token, LOGIN_CODE, None).await.unwrap();
    assert_eq!(user.first_name, "Tess");
    assert!(user.is_self);
    assert!(client.is_authorized().await.unwrap());
    assert!(store.load().unwrap().is_some());

    // A new client on the same store is signed in without logging in again.
    let again = Client::connect(server.config(store.clone())).await.unwrap();
    assert!(again.is_authorized().await.unwrap());
    assert_eq!(server.handshakes(), 1);
}

#[tokio::test]
async fn wrong_or_empty_code_is_rejected() {
    let server = MockServer::start(FakeTelegram::new()).await;
    let client = Client::new(server.config(Arc::new(InMemorySessionStore::new())));
    let token = client.request_login_code("+15551234567").await.unwrap();

    let err = client.complete_login(&token, "00000", None).await.unwrap_err();
    assert!(matches!(err, LoginError::InvalidCode), "{err:?}");

    let err = client.complete_login(&token, "   ", None).await.unwrap_err();
    assert!(matches!(err, LoginError::InvalidCode), "{err:?}");
    assert_eq!(server.requests::<functions::auth::SignIn>(), 1);
    assert!(!client.is_authorized().await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cloud_password_is_verified_by_proof() {
    let server = MockServer::start(FakeTelegram::new().with_password("hunter2")).await;
    let client = Client::new(server.config(Arc::new(InMemorySessionStore::new())));
    let token = client.request_login_code("+15551234567").await.unwrap();

    let err = client.complete_login(&token, LOGIN_CODE, None).await.unwrap_err();
    match err {
        LoginError::TwoFactorRequired { hint } => assert_eq!(hint, PASSWORD_HINT),
        other => panic!("expected a password prompt, got {other:?}"),
    }

    let err = client.complete_login(&token, LOGIN_CODE, Some("hunter3")).await.unwrap_err();
    assert!(matches!(err, LoginError::InvalidPassword), "{err:?}");
    assert!(!client.is_authorized().await.unwrap());

    let user = client.complete_login(&token, LOGIN_CODE, Some("hunter2")).await.unwrap();
    assert_eq!(user.id, common::SELF_ID);
    assert!(client.is_authorized().await.unwrap());
    assert_eq!(server.requests::<functions::auth::CheckPassword>(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blank_password_asks_for_the_password_again() {
    let server = MockServer::start(FakeTelegram::new().with_password("hunter2")).await;
    let client = Client::new(server.config(Arc::new(InMemorySessionStore::new())));
    let token = client.request_login_code("+15551234567").await.unwrap();

    for blank in ["", "   "] {
        let err = client.complete_login(&token, LOGIN_CODE, Some(blank)).await.unwrap_err();
        assert!(matches!(err, LoginError::TwoFactorRequired { ref hint } if hint == PASSWORD_HINT), "{err:?}");
    }
    assert_eq!(server.requests::<functions::auth::CheckPassword>(), 0);
}
