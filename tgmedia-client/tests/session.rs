mod common;

use std::sync::Arc;

use common::{FakeTelegram, MockServer};
use tgmedia_client::{
    Client, ConnectionState, FileSessionStore, InMemorySessionStore, InvocationError, Session, SessionStore,
};
use tgmedia_mtproto::transport::Error as FrameError;
use tgmedia_tl::functions;

#[tokio::test]
async fn handshake_once_then_resume() {
    let server = MockServer::start(FakeTelegram::new().signed_in()).await;
    let store = Arc::new(InMemorySessionStore::new());

    let client = Client::connect(server.config(store.clone())).await.unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Ready);
    assert!(client.is_authorized().await.unwrap());
    assert_eq!(server.handshakes(), 1);

    let saved = store.load().unwrap().unwrap();
    assert!(server.knows_key(&saved.auth_key));
    assert_eq!(saved.dc_addr, server.addr);

    client.disconnect().await;
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    drop(client);

    let client = Client::connect(server.config(store.clone())).await.unwrap();
    assert!(client.is_authorized().await.unwrap());
    assert_eq!(server.handshakes(), 1);
    assert_eq!(store.load().unwrap().unwrap().auth_key, saved.auth_key);
}

#[tokio::test]
async fn session_file_survives_restart() {
    let server = MockServer::start(FakeTelegram::new().signed_in()).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.session");

    let client = Client::connect(server.config(Arc::new(FileSessionStore::new(&path)))).await.unwrap();
    client.ping().await.unwrap();
    client.disconnect().await;
    drop(client);
    assert!(path.exists());

    let client = Client::connect(server.config(Arc::new(FileSessionStore::new(&path)))).await.unwrap();
    client.ping().await.unwrap();
    assert_eq!(server.handshakes(), 1);
}

#[tokio::test]
async fn truncated_session_file_means_fresh_handshake() {
    let server = MockServer::start(FakeTelegram::new().signed_in()).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.session");
    std::fs::write(&path, [1u8, 2, 3, 4, 5]).unwrap();

    let store = Arc::new(FileSessionStore::new(&path));
    let client = Client::connect(server.config(store.clone())).await.unwrap();
    assert_eq!(server.handshakes(), 1);
    client.ping().await.unwrap();

    let saved = store.load().unwrap().unwrap();
    assert!(server.knows_key(&saved.auth_key));
}

#[tokio::test]
async fn resumed_session_never_reuses_sequence_numbers() {
    let server = MockServer::start(FakeTelegram::new().signed_in()).await;
    let store = Arc::new(InMemorySessionStore::new());
    let client = Client::connect(server.config(store.clone())).await.unwrap();
    for _ in 0..3 {
        client.ping().await.unwrap();
    }
    client.disconnect().await;
    let first = store.load().unwrap().unwrap();
    assert_eq!(first.sequence, 3);

    client.ping().await.unwrap();
    client.disconnect().await;
    let second = store.load().unwrap().unwrap();
    assert_eq!(second.auth_key, first.auth_key);
    assert_ne!(second.session_id, first.session_id);
    assert_eq!(second.sequence, 1);
    assert_eq!(server.handshakes(), 1);
}

#[tokio::test]
async fn dropping_the_client_saves_the_session() {
    let server = MockServer::start(FakeTelegram::new().signed_in()).await;
    let store = Arc::new(InMemorySessionStore::new());
    let client = Client::connect(server.config(store.clone())).await.unwrap();
    client.ping().await.unwrap();
    client.ping().await.unwrap();
    drop(client);

    assert_eq!(store.load().unwrap().unwrap().sequence, 2);
}

#[tokio::test]
async fn rotated_salt_is_adopted_and_persisted() {
    let server = MockServer::start(FakeTelegram::new().signed_in()).await;
    let store = Arc::new(InMemorySessionStore::new());
    let client = Client::connect(server.config(store.clone())).await.unwrap();
    assert!(client.is_authorized().await.unwrap());

    server.rotate_salt(0x0123_4567_89ab_cdef);
    assert!(client.is_authorized().await.unwrap());

    // First send, the rejected one, then the resend.
    assert_eq!(server.requests::<functions::updates::GetState>(), 3);
    assert_eq!(store.load().unwrap().unwrap().server_salt, 0x0123_4567_89ab_cdef);
    assert_eq!(server.handshakes(), 1);
}

#[tokio::test]
async fn unknown_auth_key_is_replaced() {
    let server = MockServer::start(FakeTelegram::new().signed_in()).await;
    let store = Arc::new(InMemorySessionStore::new());
    let stale = Session {
        auth_key:    [0x42; 256],
        server_salt: 1,
        sequence:    7,
        time_offset: 0,
        dc_addr:     server.addr.clone(),
        session_id:  99,
    };
    store.save(&stale).unwrap();

    let client = Client::connect(server.config(store.clone())).await.unwrap();
    assert_eq!(server.handshakes(), 0);

    let err = client.is_authorized().await.unwrap_err();
    assert!(
        matches!(err, InvocationError::Protocol(FrameError::ServerCode { code: -404 })),
        "{err:?}"
    );

    assert!(client.is_authorized().await.unwrap());
    assert_eq!(server.handshakes(), 1);
    let saved = store.load().unwrap().unwrap();
    assert_ne!(saved.auth_key, stale.auth_key);
    assert!(server.knows_key(&saved.auth_key));
}

#[tokio::test]
async fn integrity_failure_discards_the_key() {
    let server = MockServer::start(FakeTelegram::new().signed_in()).await;
    let store = Arc::new(InMemorySessionStore::new());
    let client = Client::connect(server.config(store.clone())).await.unwrap();
    client.ping().await.unwrap();
    let first = store.load().unwrap().unwrap().auth_key;

    server.corrupt_next_reply();
    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, InvocationError::Integrity(_)), "{err:?}");
    assert_eq!(err.kind(), tgmedia_client::ErrorKind::IntegrityFailure);

    client.ping().await.unwrap();
    assert_eq!(server.handshakes(), 2);
    assert_ne!(store.load().unwrap().unwrap().auth_key, first);
}

#[tokio::test]
async fn sign_out_forgets_the_session() {
    let server = MockServer::start(FakeTelegram::new().signed_in()).await;
    let store = Arc::new(InMemorySessionStore::new());
    let client = Client::connect(server.config(store.clone())).await.unwrap();

    assert_eq!(client.get_me().await.unwrap().first_name, "Tess");
    assert!(client.sign_out().await.unwrap());
    assert!(store.load().unwrap().is_none());
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}
