//! One live connection: a write lock, a reader task and the table of
//! in-flight calls keyed by the msg_id they were last sent under.
//!
//! Callers never read the socket. The reader task decrypts every frame,
//! unwraps containers and routes each reply to the waiting caller, so
//! replies may arrive in any order. Service messages (acks, salt changes,
//! clock corrections) are handled here and never reach callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tgmedia_mtproto::authentication::{self, Finished, PinnedKeys};
use tgmedia_mtproto::encrypted::DecryptError;
use tgmedia_mtproto::session::PlainError;
use tgmedia_mtproto::transport::Error as FrameError;
use tgmedia_mtproto::{EncryptedSession, Packet, Session as PlainSession};
use tgmedia_tl::{RemoteCall, Serializable, types};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ConnectionState;
use crate::envelope::{self, Incoming};
use crate::errors::InvocationError;
use crate::session::Session;
use crate::session_backend::SessionStore;
use crate::transport::{FrameReader, FrameWriter, ReadError};
use crate::update::{self, Update};

/// Transport code the server sends when it does not know our auth key.
const UNKNOWN_AUTH_KEY: i32 = -404;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Key exchange ─────────────────────────────────────────────────────────────

/// Run the three-step DH exchange over a freshly opened stream.
pub(crate) async fn handshake(
    reader: &mut FrameReader,
    writer: &mut FrameWriter,
    pinned: &PinnedKeys,
) -> Result<Finished, InvocationError> {
    let mut plain = PlainSession::new();

    let (req, s1) = authentication::step1()?;
    let res_pq = exchange(reader, writer, &mut plain, &req).await?;
    debug!("[tgmedia] res_pq received");

    let (req, s2) = authentication::step2(s1, res_pq, pinned)?;
    let dh = exchange(reader, writer, &mut plain, &req).await?;
    debug!("[tgmedia] server DH params received");

    let (req, s3) = authentication::step3(s2, dh)?;
    let answer = exchange(reader, writer, &mut plain, &req).await?;

    Ok(authentication::finish(s3, answer)?)
}

async fn exchange<R: RemoteCall>(
    reader: &mut FrameReader,
    writer: &mut FrameWriter,
    plain:  &mut PlainSession,
    req:    &R,
) -> Result<R::Return, InvocationError> {
    writer.send(&plain.pack(req).to_bytes()).await?;
    let packet = Packet::parse(reader.recv().await?)?;
    PlainSession::unpack(packet).map_err(|e| match e {
        PlainError::UnexpectedEncrypted => InvocationError::Protocol(FrameError::MalformedPacket {
            reason: "encrypted packet during key exchange",
        }),
        PlainError::Deserialize(e) => e.into(),
    })
}

// ─── Call bookkeeping ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CallState {
    Pending,
    Sent,
    Acknowledged,
    Completed,
    Failed,
    TimedOut,
}

struct PendingCall {
    call_id:      u64,
    body:         Vec<u8>,
    tx:           oneshot::Sender<Result<Vec<u8>, InvocationError>>,
    state:        CallState,
    submitted_at: Instant,
}

/// Why a connection stopped. The first reason recorded wins.
#[derive(Clone, Debug)]
pub(crate) enum Teardown {
    /// Closed locally or by the peer.
    Closed,
    Io(std::io::ErrorKind, String),
    Protocol(FrameError),
    Decrypt(DecryptError),
    Malformed(String),
}

impl Teardown {
    fn to_error(&self) -> InvocationError {
        match self {
            Self::Closed          => InvocationError::Dropped,
            Self::Io(kind, msg)   => InvocationError::Io(std::io::Error::new(*kind, msg.clone())),
            Self::Protocol(e)     => InvocationError::Protocol(e.clone()),
            Self::Decrypt(e)      => InvocationError::Integrity(e.clone()),
            Self::Malformed(s)    => InvocationError::Deserialize(s.clone()),
        }
    }

    /// The stored auth key must not be reused.
    fn discards_key(&self) -> bool {
        match self {
            Self::Decrypt(e) => e.is_integrity_failure(),
            Self::Protocol(FrameError::ServerCode { code }) => *code == UNKNOWN_AUTH_KEY,
            _ => false,
        }
    }

    fn from_read(e: ReadError) -> Self {
        match e {
            ReadError::Io(e)    => Self::Io(e.kind(), e.to_string()),
            ReadError::Frame(e) => Self::Protocol(e),
            ReadError::Closed   => Self::Closed,
        }
    }

    fn from_send(e: InvocationError) -> Self {
        match e {
            InvocationError::Io(e)       => Self::Io(e.kind(), e.to_string()),
            InvocationError::Protocol(e) => Self::Protocol(e),
            other                        => Self::Malformed(other.to_string()),
        }
    }
}

/// Removes the caller's entry however the call ends, including when the
/// caller's future is dropped.
struct PendingGuard<'a> {
    conn:    &'a Connection,
    call_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(&self.conn.pending).retain(|_, c| c.call_id != self.call_id);
    }
}

// ─── Connection ───────────────────────────────────────────────────────────────

pub(crate) struct ConnectionOptions {
    pub dc_addr:         String,
    pub store:           Arc<dyn SessionStore>,
    pub drift_threshold: Duration,
    pub max_frame_len:   usize,
    pub updates:         mpsc::Sender<Update>,
    pub state:           Arc<watch::Sender<ConnectionState>>,
}

pub(crate) struct Connection {
    writer:       tokio::sync::Mutex<FrameWriter>,
    enc:          Mutex<EncryptedSession>,
    pending:      Mutex<HashMap<i64, PendingCall>>,
    next_call_id: AtomicU64,
    closed:       Mutex<Option<Teardown>>,
    shutdown:     CancellationToken,
    opts:         ConnectionOptions,
}

impl Connection {
    /// Take ownership of an open stream and start its reader task.
    pub(crate) fn start(
        reader: FrameReader,
        writer: FrameWriter,
        enc:    EncryptedSession,
        opts:   ConnectionOptions,
    ) -> Arc<Self> {
        let conn = Arc::new(Self {
            writer:       tokio::sync::Mutex::new(writer),
            enc:          Mutex::new(enc),
            pending:      Mutex::new(HashMap::new()),
            next_call_id: AtomicU64::new(1),
            closed:       Mutex::new(None),
            shutdown:     CancellationToken::new(),
            opts,
        });
        tokio::spawn(Arc::clone(&conn).read_loop(reader));
        conn
    }

    pub(crate) fn is_open(&self) -> bool {
        lock(&self.closed).is_none()
    }

    pub(crate) fn discards_key(&self) -> bool {
        lock(&self.closed).as_ref().is_some_and(Teardown::discards_key)
    }

    pub(crate) fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub(crate) fn snapshot(&self) -> Session {
        let enc = lock(&self.enc);
        Session {
            auth_key:    enc.auth_key_bytes(),
            server_salt: enc.salt(),
            sequence:    enc.sequence(),
            time_offset: enc.time_offset(),
            dc_addr:     self.opts.dc_addr.clone(),
            session_id:  enc.session_id(),
        }
    }

    fn teardown_error(&self) -> Option<InvocationError> {
        lock(&self.closed).as_ref().map(Teardown::to_error)
    }

    /// Send one content-related call and wait up to `deadline` for its reply.
    pub(crate) async fn call(&self, body: &[u8], deadline: Duration) -> Result<Vec<u8>, InvocationError> {
        if let Some(e) = self.teardown_error() {
            return Err(e);
        }
        let (tx, rx) = oneshot::channel();
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let _guard = PendingGuard { conn: self, call_id };

        {
            let mut writer = self.writer.lock().await;
            let (packet, msg_id) = lock(&self.enc).pack(body, true)?;
            lock(&self.pending).insert(msg_id, PendingCall {
                call_id,
                body: body.to_vec(),
                tx,
                state: CallState::Pending,
                submitted_at: Instant::now(),
            });
            // The reader may have torn down between the first check and the insert.
            if let Some(e) = self.teardown_error() {
                return Err(e);
            }
            if let Err(e) = writer.send(&packet).await {
                if matches!(e, InvocationError::Io(_)) {
                    drop(writer);
                    self.close(Teardown::from_send(e));
                    return Err(self.teardown_error().unwrap_or(InvocationError::Dropped));
                }
                return Err(e);
            }
            self.set_state(call_id, CallState::Sent);
            debug!("[tgmedia] call {call_id} sent as msg_id {msg_id:#x}");
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(self.teardown_error().unwrap_or(InvocationError::Dropped)),
            Err(_) => {
                self.set_state(call_id, CallState::TimedOut);
                debug!("[tgmedia] call {call_id} timed out after {deadline:?}");
                Err(InvocationError::TimedOut { attempts: 1 })
            }
        }
    }

    fn set_state(&self, call_id: u64, state: CallState) {
        if let Some(call) = lock(&self.pending).values_mut().find(|c| c.call_id == call_id) {
            call.state = state;
        }
    }

    /// Stop the reader, fail every waiting call and mark the client
    /// disconnected. Only the first call has any effect.
    pub(crate) fn close(&self, reason: Teardown) {
        {
            let mut closed = lock(&self.closed);
            if closed.is_some() {
                return;
            }
            match &reason {
                Teardown::Closed => debug!("[tgmedia] connection closed"),
                other => warn!("[tgmedia] connection torn down: {}", other.to_error()),
            }
            *closed = Some(reason.clone());
        }
        self.shutdown.cancel();

        let drained: Vec<PendingCall> = lock(&self.pending).drain().map(|(_, c)| c).collect();
        for call in drained {
            let _ = call.tx.send(Err(reason.to_error()));
        }
        self.opts.state.send_replace(ConnectionState::Disconnected);
    }

    /// Close and flush the write half.
    pub(crate) async fn shutdown(&self) {
        self.close(Teardown::Closed);
        self.writer.lock().await.shutdown().await;
    }

    pub(crate) fn cancel(&self) {
        self.shutdown.cancel();
    }

    // ── Reader task ───────────────────────────────────────────────────────

    async fn read_loop(self: Arc<Self>, mut reader: FrameReader) {
        let reason = loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => break Teardown::Closed,
                r = reader.recv() => r,
            };
            let payload = match next {
                Ok(p) => p,
                Err(e) => break Teardown::from_read(e),
            };
            if let Err(reason) = self.on_payload(payload).await {
                break reason;
            }
        };
        self.close(reason);
    }

    async fn on_payload(&self, payload: Vec<u8>) -> Result<(), Teardown> {
        let Packet::Encrypted(mut packet) = Packet::parse(payload).map_err(Teardown::Protocol)? else {
            return Err(Teardown::Protocol(FrameError::MalformedPacket {
                reason: "plain packet on an encrypted session",
            }));
        };
        let msg = lock(&self.enc).unpack(&mut packet.bytes).map_err(Teardown::Decrypt)?;

        let mut dirty = false;
        {
            let threshold = self.opts.drift_threshold.as_secs() as i64;
            let mut enc = lock(&self.enc);
            if enc.is_drifted(msg.msg_id, threshold) {
                let offset = enc.sync_time(msg.msg_id);
                info!("[tgmedia] Clock drift detected, offset now {offset}s");
                dirty = true;
            }
        }

        let mut envelopes = Vec::new();
        envelope::unwrap(msg.msg_id, msg.seq_no, msg.body, self.opts.max_frame_len, &mut envelopes)
            .map_err(|e| Teardown::Malformed(e.to_string()))?;

        let mut acks = Vec::new();
        let mut resend = Vec::new();
        for env in envelopes {
            if env.is_content_related() {
                acks.push(env.msg_id);
            }
            match env.item {
                Incoming::Result { req_msg_id, outcome } => {
                    self.resolve(req_msg_id, outcome.map_err(InvocationError::Rpc));
                }
                Incoming::Ack(ids) => self.acknowledge(&ids),
                Incoming::BadServerSalt { bad_msg_id, new_salt } => {
                    debug!("[tgmedia] server salt rotated");
                    lock(&self.enc).set_salt(new_salt);
                    dirty = true;
                    resend.push(bad_msg_id);
                }
                Incoming::BadMsg { bad_msg_id, code: code @ (16 | 17) } => {
                    let offset = lock(&self.enc).sync_time(env.msg_id);
                    info!("[tgmedia] bad_msg_notification {code}, clock offset now {offset}s");
                    dirty = true;
                    resend.push(bad_msg_id);
                }
                Incoming::BadMsg { bad_msg_id, code } => {
                    self.resolve(bad_msg_id, Err(InvocationError::BadMessage { code }));
                }
                Incoming::NewSession { server_salt } => {
                    debug!("[tgmedia] new session created by server");
                    lock(&self.enc).set_salt(server_salt);
                    dirty = true;
                }
                Incoming::Updates(raw) => self.route_updates(raw),
                Incoming::Unknown(id) => debug!("[tgmedia] ignoring message {id:#010x}"),
            }
        }

        if dirty {
            self.persist();
        }
        for old in resend {
            self.resend(old).await?;
        }
        if !acks.is_empty() {
            let ack = types::MsgsAck { msg_ids: acks }.to_bytes();
            self.send_service(&ack).await?;
        }
        Ok(())
    }

    fn resolve(&self, req_msg_id: i64, outcome: Result<Vec<u8>, InvocationError>) {
        let Some(mut call) = lock(&self.pending).remove(&req_msg_id) else {
            debug!("[tgmedia] reply for unknown msg_id {req_msg_id:#x} dropped");
            return;
        };
        call.state = if outcome.is_ok() { CallState::Completed } else { CallState::Failed };
        debug!(
            "[tgmedia] call {} {:?} after {:?}",
            call.call_id,
            call.state,
            call.submitted_at.elapsed()
        );
        let _ = call.tx.send(outcome);
    }

    fn acknowledge(&self, ids: &[i64]) {
        let mut pending = lock(&self.pending);
        for id in ids {
            if let Some(call) = pending.get_mut(id) {
                if call.state == CallState::Sent {
                    call.state = CallState::Acknowledged;
                }
            }
        }
    }

    /// Send a rejected call again under a fresh msg_id.
    async fn resend(&self, old_msg_id: i64) -> Result<(), Teardown> {
        let mut writer = self.writer.lock().await;
        let packet = {
            let mut pending = lock(&self.pending);
            let Some(mut call) = pending.remove(&old_msg_id) else {
                return Ok(());
            };
            let (packet, msg_id) = match lock(&self.enc).pack(&call.body, true) {
                Ok(p) => p,
                Err(e) => {
                    let _ = call.tx.send(Err(e.into()));
                    return Ok(());
                }
            };
            debug!("[tgmedia] resending call {} as msg_id {msg_id:#x}", call.call_id);
            call.state = CallState::Sent;
            pending.insert(msg_id, call);
            packet
        };
        writer.send(&packet).await.map_err(Teardown::from_send)
    }

    async fn send_service(&self, body: &[u8]) -> Result<(), Teardown> {
        let mut writer = self.writer.lock().await;
        let (packet, _) = lock(&self.enc)
            .pack(body, false)
            .map_err(|e| Teardown::Io(std::io::ErrorKind::Other, e.to_string()))?;
        writer.send(&packet).await.map_err(Teardown::from_send)
    }

    fn route_updates(&self, raw: tgmedia_tl::enums::Updates) {
        for upd in update::from_raw(raw) {
            match self.opts.updates.try_send(upd) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("[tgmedia] update buffer full, dropping update");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Write the current session through to the store.
    pub(crate) fn persist(&self) {
        let snapshot = self.snapshot();
        if let Err(e) = self.opts.store.save(&snapshot) {
            warn!("[tgmedia] could not persist session ({}): {e}", self.opts.store.name());
        }
    }
}
