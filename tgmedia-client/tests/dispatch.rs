mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeTelegram, MockServer};
use tgmedia_client::{AutoSleep, Client, InMemorySessionStore, InvocationError, NoRetries, Update};
use tgmedia_tl::functions;
use tokio_util::sync::CancellationToken;

async fn connect(server: &MockServer) -> Client {
    Client::connect(server.config(Arc::new(InMemorySessionStore::new()))).await.unwrap()
}

#[tokio::test]
async fn replies_in_reverse_order_reach_their_callers() {
    let server = MockServer::start(FakeTelegram::new().signed_in().hold_batch(3)).await;
    let client = connect(&server).await;

    let (a, b, c) = tokio::join!(client.ping(), client.ping(), client.ping());
    a.unwrap();
    b.unwrap();
    c.unwrap();
    assert_eq!(server.requests::<functions::Ping>(), 3);
    assert_eq!(client.pending_calls().await, 0);
}

#[tokio::test]
async fn concurrent_calls_share_one_connection() {
    let server = MockServer::start(FakeTelegram::new().signed_in()).await;
    let client = connect(&server).await;

    let calls = (0..8).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { client.get_me().await })
    });
    for call in calls.collect::<Vec<_>>() {
        assert_eq!(call.await.unwrap().unwrap().first_name, "Tess");
    }
    assert_eq!(server.handshakes(), 1);
    assert_eq!(server.requests::<functions::users::GetUsers>(), 8);
}

#[tokio::test]
async fn silent_server_times_out_after_every_attempt() {
    let server = MockServer::start(FakeTelegram::new().signed_in().silent::<functions::updates::GetState>()).await;
    let mut config = server.config(Arc::new(InMemorySessionStore::new()));
    config.call_timeout = Duration::from_millis(150);
    let client = Client::connect(config).await.unwrap();

    let err = client.is_authorized().await.unwrap_err();
    assert!(matches!(err, InvocationError::TimedOut { attempts: 3 }), "{err:?}");
    assert_eq!(server.requests::<functions::updates::GetState>(), 3);
    assert_eq!(client.pending_calls().await, 0);
}

#[tokio::test]
async fn no_retries_means_one_send() {
    let server = MockServer::start(FakeTelegram::new().signed_in().silent::<functions::updates::GetState>()).await;
    let mut config = server.config(Arc::new(InMemorySessionStore::new()));
    config.call_timeout = Duration::from_millis(100);
    config.retry_policy = Arc::new(NoRetries);
    let client = Client::connect(config).await.unwrap();

    let err = client.is_authorized().await.unwrap_err();
    assert!(matches!(err, InvocationError::TimedOut { attempts: 1 }), "{err:?}");
    assert_eq!(server.requests::<functions::updates::GetState>(), 1);
}

#[tokio::test]
async fn cancelled_call_leaves_no_pending_entry() {
    let server = MockServer::start(FakeTelegram::new().signed_in().silent::<functions::updates::GetState>()).await;
    let client = connect(&server).await;

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        }
    });
    let err = client.invoke_cancellable(&functions::updates::GetState {}, &token).await.unwrap_err();
    assert!(matches!(err, InvocationError::Cancelled));
    assert_eq!(client.pending_calls().await, 0);

    // The connection is still usable.
    client.ping().await.unwrap();
}

#[tokio::test]
async fn short_flood_wait_is_slept_through() {
    let server = MockServer::start(FakeTelegram::new().signed_in().flood_once()).await;
    let client = connect(&server).await;

    assert!(client.is_authorized().await.unwrap());
    assert_eq!(server.requests::<functions::updates::GetState>(), 2);
}

#[tokio::test]
async fn flood_wait_surfaces_without_retries() {
    let server = MockServer::start(FakeTelegram::new().signed_in().flood_once()).await;
    let mut config = server.config(Arc::new(InMemorySessionStore::new()));
    config.retry_policy = Arc::new(AutoSleep { max_retries: 0, ..AutoSleep::default() });
    let client = Client::connect(config).await.unwrap();

    let err = client.is_authorized().await.unwrap_err();
    assert_eq!(err.flood_wait_seconds(), Some(0));
    assert!(err.is("FLOOD_WAIT"));
}

#[tokio::test]
async fn pushed_updates_are_delivered() {
    let server = MockServer::start(FakeTelegram::new().signed_in().push_update()).await;
    let client = connect(&server).await;

    assert!(client.is_authorized().await.unwrap());
    let update = tokio::time::timeout(Duration::from_secs(2), client.next_update())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(update, Update::NewMessage(_)));
    assert_eq!(update.message().unwrap().id, 10);
}

#[tokio::test]
async fn gzipped_results_inside_containers() {
    let server = MockServer::start(FakeTelegram::new().signed_in().containerize()).await;
    let client = connect(&server).await;

    assert_eq!(client.get_me().await.unwrap().id, common::SELF_ID);
    assert!(client.is_authorized().await.unwrap());
}

#[tokio::test]
async fn rpc_errors_are_parsed() {
    let server = MockServer::start(FakeTelegram::new()).await;
    let client = connect(&server).await;

    assert!(!client.is_authorized().await.unwrap());
    let err = client
        .invoke(&functions::contacts::ResolveUsername { username: "nobody".into() })
        .await
        .unwrap_err();
    match err {
        InvocationError::Rpc(e) => {
            assert_eq!(e.code, 400);
            assert_eq!(e.name, "USERNAME_NOT_OCCUPIED");
            assert!(e.is("USERNAME_*"));
        }
        other => panic!("expected rpc error, got {other:?}"),
    }
}
