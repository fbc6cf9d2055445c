//! # tgmedia-client
//!
//! Async MTProto client session layer with media listing and download.
//!
//! ## Features
//! - Key exchange against pinned server keys, resumable sessions
//! - Concurrent calls over one connection; replies are matched by msg_id
//! - Timeouts, backoff and `FLOOD_WAIT` handling through a [`RetryPolicy`]
//! - Phone-code login with cloud password (2FA SRP): [`LoginFlow`]
//! - Media listing with type filters and chunked parallel download: [`MediaAccess`]
//! - Pluggable session storage: [`SessionStore`]
//!
//! ```rust,no_run
//! use tgmedia_client::{Client, Config, DownloadTarget, MediaAccess, TypeFilter};
//!
//! # async fn f() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect(Config { api_id: 1, api_hash: "hash".into(), ..Config::default() }).await?;
//! for m in client.list_media("@media_channel", Some(TypeFilter::Video), 0, 20).await? {
//!     println!("{} {}", m.id, client.format_size(m.media.size_bytes as i64, 2));
//! }
//! client.download_media("@media_channel", 42, DownloadTarget::Directory("downloads".into())).await?;
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

mod dispatcher;
mod envelope;
mod errors;
mod format;
mod login;
pub mod media;
mod peers;
mod retry;
pub mod session;
pub mod session_backend;
mod transport;
pub mod two_factor_auth;
pub mod update;

pub use errors::{ErrorKind, InvocationError, LoginError, MediaError, RpcError};
pub use format::format_size;
pub use login::{LoginFlow, LoginToken, normalize_phone};
pub use media::{
    DownloadConfig, DownloadOutcome, DownloadTarget, MediaAccess, MediaDescriptor, MediaKind, MediaMessage,
    MediaPage, TypeFilter,
};
pub use peers::ChatReference;
pub use retry::{AutoSleep, NoRetries, RetryContext, RetryPolicy};
pub use session::{Session, SessionError};
pub use session_backend::{FileSessionStore, InMemorySessionStore, SessionStore};
#[cfg(feature = "sqlite-session")]
pub use session_backend::SqliteSessionStore;
pub use tgmedia_mtproto::PinnedKeys;
pub use update::Update;

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tgmedia_mtproto::EncryptedSession;
use tgmedia_mtproto::transport::DEFAULT_MAX_FRAME_LEN;
use tgmedia_tl::{Deserializable, RemoteCall, enums, functions, types};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dispatcher::{Connection, ConnectionOptions};

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`Client::new`] and [`Client::connect`].
#[derive(Clone)]
pub struct Config {
    pub api_id:           i32,
    pub api_hash:         String,
    /// Used when no session is stored (default: `149.154.167.51:443`).
    pub dc_addr:          String,
    /// Session persistence (default: file `"tgmedia.session"`).
    pub session_store:    Arc<dyn SessionStore>,
    pub retry_policy:     Arc<dyn RetryPolicy>,
    /// Deadline for one attempt of a call.
    pub call_timeout:     Duration,
    pub handshake_timeout: Duration,
    pub max_frame_len:    usize,
    /// Server keys the handshake accepts.
    pub pinned_keys:      PinnedKeys,
    /// Incoming msg_ids further than this from our clock reset the offset.
    pub drift_threshold:  Duration,
    /// Updates buffered before new ones are dropped.
    pub update_capacity:  usize,
    pub download:         DownloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_id:            0,
            api_hash:          String::new(),
            dc_addr:           "149.154.167.51:443".into(),
            session_store:     Arc::new(FileSessionStore::new("tgmedia.session")),
            retry_policy:      Arc::new(AutoSleep::default()),
            call_timeout:      Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(15),
            max_frame_len:     DEFAULT_MAX_FRAME_LEN,
            pinned_keys:       PinnedKeys::default(),
            drift_threshold:   Duration::from_secs(30),
            update_capacity:   256,
            download:          DownloadConfig::default(),
        }
    }
}

/// Lifecycle of the client's connection, observable via [`Client::state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Handshaking,
    Ready,
}

// ─── Client ───────────────────────────────────────────────────────────────────

pub(crate) struct ClientInner {
    conn:      Mutex<Option<Arc<Connection>>>,
    pub(crate) config: Config,
    state:     Arc<watch::Sender<ConnectionState>>,
    update_tx: mpsc::Sender<Update>,
    update_rx: Mutex<mpsc::Receiver<Update>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut() {
            if !conn.discards_key() {
                conn.persist();
            }
            conn.cancel();
        }
    }
}

/// The client. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl Client {
    // ── Construction ──────────────────────────────────────────────────────

    /// Build a client without connecting. The first call connects.
    pub fn new(config: Config) -> Self {
        let (update_tx, update_rx) = mpsc::channel(config.update_capacity.max(1));
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ClientInner {
                conn: Mutex::new(None),
                config,
                state: Arc::new(state),
                update_tx,
                update_rx: Mutex::new(update_rx),
            }),
        }
    }

    /// Build a client and connect, resuming the stored session when there
    /// is one.
    pub async fn connect(config: Config) -> Result<Self, InvocationError> {
        let client = Self::new(config);
        client.ensure_ready().await?;
        Ok(client)
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    // ── Connection ────────────────────────────────────────────────────────

    async fn ensure_ready(&self) -> Result<Arc<Connection>, InvocationError> {
        let mut slot = self.inner.conn.lock().await;
        let discard_key = match slot.as_ref() {
            Some(conn) if conn.is_open() => return Ok(Arc::clone(conn)),
            Some(conn) => conn.discards_key(),
            None => false,
        };
        *slot = None;

        self.inner.state.send_replace(ConnectionState::Handshaking);
        match self.open_connection(discard_key).await {
            Ok(conn) => {
                *slot = Some(Arc::clone(&conn));
                self.inner.state.send_replace(ConnectionState::Ready);
                Ok(conn)
            }
            Err(e) => {
                self.inner.state.send_replace(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn open_connection(&self, discard_key: bool) -> Result<Arc<Connection>, InvocationError> {
        let cfg = &self.inner.config;
        let store = &cfg.session_store;

        let stored = if discard_key {
            warn!("[tgmedia] Stored auth key is no longer usable, negotiating a new one");
            None
        } else {
            store.load().map_err(InvocationError::Storage)?
        };
        let addr = stored
            .as_ref()
            .map(|s| s.dc_addr.clone())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| cfg.dc_addr.clone());

        let (mut reader, mut writer) = transport::connect(&addr, cfg.max_frame_len).await?;
        let (enc, fresh) = match stored {
            Some(s) => {
                info!("[tgmedia] Resuming session on {addr}");
                // The stored counter may lag behind what was sent before a
                // crash, so a resumed key always opens a new session id.
                let mut enc = EncryptedSession::resume(s.auth_key, s.session_id, s.server_salt, s.time_offset, s.sequence);
                enc.reset_session()?;
                (enc, false)
            }
            None => {
                info!("[tgmedia] Connecting to {addr} (DH) …");
                let done = tokio::time::timeout(
                    cfg.handshake_timeout,
                    dispatcher::handshake(&mut reader, &mut writer, &cfg.pinned_keys),
                )
                .await
                .map_err(|_| InvocationError::HandshakeTimeout(cfg.handshake_timeout))??;
                info!("[tgmedia] DH complete ✓");
                (EncryptedSession::new(done.auth_key, done.first_salt, done.time_offset)?, true)
            }
        };

        let conn = Connection::start(reader, writer, enc, ConnectionOptions {
            dc_addr:         addr,
            store:           Arc::clone(store),
            drift_threshold: cfg.drift_threshold,
            max_frame_len:   cfg.max_frame_len,
            updates:         self.inner.update_tx.clone(),
            state:           Arc::clone(&self.inner.state),
        });
        if fresh {
            if let Err(e) = store.save(&conn.snapshot()) {
                conn.shutdown().await;
                return Err(InvocationError::Storage(e));
            }
            debug!("[tgmedia] new session saved to {} store", store.name());
        }
        Ok(conn)
    }

    /// Persist the current session.
    pub async fn save_session(&self) -> Result<(), InvocationError> {
        let slot = self.inner.conn.lock().await;
        let Some(conn) = slot.as_ref().filter(|c| !c.discards_key()) else {
            return Ok(());
        };
        self.inner.config.session_store.save(&conn.snapshot()).map_err(InvocationError::Storage)?;
        info!("[tgmedia] Session saved ✓");
        Ok(())
    }

    /// Save the session and close the connection. The next call reconnects.
    pub async fn disconnect(&self) {
        if let Some(conn) = self.inner.conn.lock().await.take() {
            if !conn.discards_key() {
                conn.persist();
            }
            conn.shutdown().await;
        }
        self.inner.state.send_replace(ConnectionState::Disconnected);
    }

    /// Calls waiting for a reply right now.
    pub async fn pending_calls(&self) -> usize {
        self.inner.conn.lock().await.as_ref().map_or(0, |c| c.pending_len())
    }

    // ── Invoke ────────────────────────────────────────────────────────────

    /// Invoke any TL function, retrying according to the configured policy.
    pub async fn invoke<R: RemoteCall>(&self, req: &R) -> Result<R::Return, InvocationError> {
        let body = self.invoke_raw(&req.to_bytes()).await?;
        Ok(R::Return::from_bytes(&body)?)
    }

    /// One attempt, bypassing the retry policy. For callers that keep their
    /// own retry budget.
    pub(crate) async fn invoke_once<R: RemoteCall>(&self, req: &R) -> Result<R::Return, InvocationError> {
        let conn = self.ensure_ready().await?;
        let body = conn.call(&req.to_bytes(), self.inner.config.call_timeout).await?;
        Ok(R::Return::from_bytes(&body)?)
    }

    /// Like [`invoke`](Self::invoke), abandoned as soon as `token` is
    /// cancelled. The pending entry is removed either way.
    pub async fn invoke_cancellable<R: RemoteCall>(
        &self,
        req:   &R,
        token: &CancellationToken,
    ) -> Result<R::Return, InvocationError> {
        tokio::select! {
            _ = token.cancelled() => Err(InvocationError::Cancelled),
            r = self.invoke(req) => r,
        }
    }

    pub(crate) async fn invoke_raw(&self, body: &[u8]) -> Result<Vec<u8>, InvocationError> {
        let mut fail_count    = NonZeroU32::MIN;
        let mut slept_so_far  = Duration::ZERO;
        let mut all_timed_out = true;
        loop {
            let result = match self.ensure_ready().await {
                Ok(conn) => conn.call(body, self.inner.config.call_timeout).await,
                Err(e) => Err(e),
            };
            let error = match result {
                Ok(reply) => return Ok(reply),
                Err(e) => e,
            };
            all_timed_out &= matches!(error, InvocationError::TimedOut { .. });

            let ctx = RetryContext { fail_count, slept_so_far, error };
            match self.inner.config.retry_policy.should_retry(&ctx) {
                ControlFlow::Continue(delay) => {
                    sleep(delay).await;
                    slept_so_far += delay;
                    fail_count = fail_count.saturating_add(1);
                }
                ControlFlow::Break(()) => {
                    return Err(retry::final_error(ctx.error, fail_count.get(), all_timed_out));
                }
            }
        }
    }

    /// Round trip to the server.
    pub async fn ping(&self) -> Result<Duration, InvocationError> {
        let mut id = [0u8; 8];
        getrandom::getrandom(&mut id)?;
        let ping_id = i64::from_le_bytes(id);

        let started = Instant::now();
        let pong = self.invoke(&functions::Ping { ping_id }).await?;
        if pong.ping_id != ping_id {
            return Err(InvocationError::Deserialize("pong for a different ping".into()));
        }
        Ok(started.elapsed())
    }

    // ── Updates ───────────────────────────────────────────────────────────

    /// Wait for the next unsolicited update.
    pub async fn next_update(&self) -> Option<Update> {
        self.inner.update_rx.lock().await.recv().await
    }

    // ── Account ───────────────────────────────────────────────────────────

    /// Whether the stored session belongs to a signed-in account.
    pub async fn is_authorized(&self) -> Result<bool, InvocationError> {
        match self.invoke(&functions::updates::GetState {}).await {
            Ok(_) => Ok(true),
            Err(InvocationError::Rpc(e)) if e.code == 401 => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The signed-in user.
    pub async fn get_me(&self) -> Result<types::User, InvocationError> {
        let req = functions::users::GetUsers { id: vec![types::InputUserSelf {}.into()] };
        self.invoke(&req)
            .await?
            .into_iter()
            .find_map(|u| match u {
                enums::User::User(u) => Some(u),
                enums::User::Empty(_) => None,
            })
            .ok_or_else(|| InvocationError::Deserialize("getUsers returned no user".into()))
    }

    /// Sign out and forget the stored session. Returns `false` when the
    /// server did not consider us signed in.
    pub async fn sign_out(&self) -> Result<bool, InvocationError> {
        let signed_in = match self.invoke(&functions::auth::LogOut {}).await {
            Ok(_) => true,
            Err(e) if e.is("AUTH_KEY_UNREGISTERED") => false,
            Err(e) => return Err(e),
        };
        self.disconnect().await;
        self.inner.config.session_store.delete().map_err(InvocationError::Storage)?;
        info!("[tgmedia] Signed out ✓");
        Ok(signed_in)
    }
}
