//! In-process server for the integration tests: a real key exchange and
//! encrypted session on a local TCP port, answering the API with a small
//! scripted account and channel.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use num_bigint::BigUint;
use sha2::{Digest, Sha256};
use tgmedia_client::two_factor_auth::{pad256, password_hash, proof};
use tgmedia_client::{AutoSleep, Config, DownloadConfig, SessionStore};
use tgmedia_crypto::AuthKey;
use tgmedia_mtproto::message::{MessageIdGenerator, PlainMessage};
use tgmedia_mtproto::server::{self, HandshakeServer};
use tgmedia_mtproto::{EncryptedSession, FrameCodec, Packet};
use tgmedia_tl::{Deserializable, Identifiable, Serializable, enums, functions, peek_constructor, types};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const CHANNEL_ID: i64 = 777;
pub const CHANNEL_HASH: i64 = 0x5eed;
pub const SELF_ID: i64 = 100;
pub const LOGIN_CODE: &str = "12345";
pub const CODE_HASH: &str = "code-hash";
pub const REJECTED_PHONE: &str = "+10000000000";
pub const PASSWORD_HINT: &str = "the usual";

// ─── Server ──────────────────────────────────────────────────────────────────

/// One decrypted API request.
pub struct Request {
    pub msg_id:      i64,
    pub constructor: u32,
    pub body:        Vec<u8>,
}

/// What the connection sends back for a request.
pub enum Outgoing {
    /// Content-related message, e.g. an `rpc_result`.
    Content(Vec<u8>),
    /// Service message such as `bad_server_salt`.
    Service(Vec<u8>),
    /// `msg_container` of content-related members.
    Container(Vec<Vec<u8>>),
}

/// Scripted API. `held` belongs to the connection and survives between
/// requests, so replies can be delayed and released out of order.
pub trait Behavior: Send + Sync + 'static {
    fn handle(&self, req: &Request, held: &mut Vec<Vec<u8>>) -> Vec<Outgoing>;
}

struct State {
    behavior:     Box<dyn Behavior>,
    keys:         Mutex<HashMap<[u8; 8], [u8; 256]>>,
    handshakes:   AtomicUsize,
    requests:     Mutex<HashMap<u32, usize>>,
    salt:         Mutex<Option<i64>>,
    corrupt_next: AtomicBool,
}

pub struct MockServer {
    pub addr: String,
    state:    Arc<State>,
    accept:   JoinHandle<()>,
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

impl MockServer {
    pub async fn start(behavior: impl Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(State {
            behavior:     Box::new(behavior),
            keys:         Mutex::new(HashMap::new()),
            handshakes:   AtomicUsize::new(0),
            requests:     Mutex::new(HashMap::new()),
            salt:         Mutex::new(None),
            corrupt_next: AtomicBool::new(false),
        });
        let accept = tokio::spawn({
            let state = Arc::clone(&state);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(stream, Arc::clone(&state)));
                }
            }
        });
        Self { addr, state, accept }
    }

    /// Client config pointed at this server, with short timeouts and small
    /// download chunks.
    pub fn config(&self, store: Arc<dyn SessionStore>) -> Config {
        Config {
            api_id:            4242,
            api_hash:          "test-hash".into(),
            dc_addr:           self.addr.clone(),
            session_store:     store,
            retry_policy:      Arc::new(AutoSleep {
                max_retries:     2,
                backoff_base:    Duration::from_millis(10),
                backoff_cap:     Duration::from_millis(50),
                flood_threshold: Duration::from_secs(5),
            }),
            call_timeout:      Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            pinned_keys:       server::test_pinned_keys(),
            download:          DownloadConfig { chunk_size: 4096, workers: 4, chunk_retries: 1 },
            ..Config::default()
        }
    }

    pub fn handshakes(&self) -> usize {
        self.state.handshakes.load(Ordering::SeqCst)
    }

    /// Requests received with this constructor, resends included.
    pub fn requests<R: Identifiable>(&self) -> usize {
        self.state.requests.lock().unwrap().get(&R::CONSTRUCTOR_ID).copied().unwrap_or(0)
    }

    pub fn knows_key(&self, key: &[u8; 256]) -> bool {
        self.state.keys.lock().unwrap().values().any(|k| k == key)
    }

    /// Reject every request not sent under `salt`.
    pub fn rotate_salt(&self, salt: i64) {
        *self.state.salt.lock().unwrap() = Some(salt);
    }

    /// Flip a ciphertext byte in the next encrypted reply.
    pub fn corrupt_next_reply(&self) {
        self.state.corrupt_next.store(true, Ordering::SeqCst);
    }
}

async fn read_frame(rd: &mut OwnedReadHalf, codec: &mut FrameCodec, buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    loop {
        if let Some(payload) = codec.decode_frame(buf).ok()? {
            return Some(payload);
        }
        let mut chunk = [0u8; 8192];
        let n = rd.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn write_frame(wr: &mut OwnedWriteHalf, codec: &mut FrameCodec, payload: &[u8]) -> Option<()> {
    let frame = codec.encode_frame(payload).ok()?;
    wr.write_all(&frame).await.ok()
}

async fn serve(stream: TcpStream, state: Arc<State>) -> Option<()> {
    let (mut rd, mut wr) = stream.into_split();
    let mut inbound = FrameCodec::default();
    let mut outbound = FrameCodec::default();
    let mut buf = Vec::new();
    let mut plain_ids = MessageIdGenerator::server();
    let mut handshake: Option<HandshakeServer> = None;
    let mut session: Option<EncryptedSession> = None;
    let mut held = Vec::new();

    loop {
        let payload = read_frame(&mut rd, &mut inbound, &mut buf).await?;
        let mut bytes = match Packet::parse(payload).ok()? {
            Packet::Plain(msg) => {
                let hs = handshake.get_or_insert_with(|| HandshakeServer::new(server::test_key().unwrap()));
                let reply = hs.handle(&msg.body).ok()?;
                if let Some(done) = hs.finished() {
                    let key = AuthKey::from_bytes(done.auth_key);
                    state.keys.lock().unwrap().insert(key.key_id(), done.auth_key);
                    state.handshakes.fetch_add(1, Ordering::SeqCst);
                    handshake = None;
                }
                let packet = Packet::Plain(PlainMessage { msg_id: plain_ids.next(), body: reply });
                write_frame(&mut wr, &mut outbound, &packet.to_bytes()).await?;
                continue;
            }
            Packet::Encrypted(p) => p.bytes,
        };

        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&bytes[..8]);
        let known = state.keys.lock().unwrap().get(&key_id).copied();
        let Some(key) = known else {
            write_frame(&mut wr, &mut outbound, &(-404i32).to_le_bytes()).await;
            return None;
        };

        let msg = match session.as_mut() {
            Some(s) => s.unpack(&mut bytes).ok()?,
            None => {
                let (s, msg) = EncryptedSession::accept(key, &mut bytes).ok()?;
                session = Some(s);
                msg
            }
        };
        let session = session.as_mut()?;

        let constructor = peek_constructor(&msg.body).ok()?;
        if constructor == types::MsgsAck::CONSTRUCTOR_ID {
            continue;
        }
        *state.requests.lock().unwrap().entry(constructor).or_default() += 1;

        let expected_salt = *state.salt.lock().unwrap();
        let replies = match expected_salt {
            Some(salt) if salt != msg.salt => {
                vec![Outgoing::Service(server::bad_server_salt(msg.msg_id, msg.seq_no, salt))]
            }
            _ => {
                let req = Request { msg_id: msg.msg_id, constructor, body: msg.body };
                state.behavior.handle(&req, &mut held)
            }
        };
        for out in replies {
            let (body, content_related) = match out {
                Outgoing::Content(b) => (b, true),
                Outgoing::Service(b) => (b, false),
                Outgoing::Container(members) => {
                    let members: Vec<(i64, i32, Vec<u8>)> = members
                        .into_iter()
                        .map(|b| {
                            let (id, seq) = session.next_message(true);
                            (id, seq, b)
                        })
                        .collect();
                    (server::container(&members), false)
                }
            };
            let (mut packet, _) = session.pack(&body, content_related).ok()?;
            if state.corrupt_next.swap(false, Ordering::SeqCst) {
                let last = packet.len() - 1;
                packet[last] ^= 0xff;
            }
            write_frame(&mut wr, &mut outbound, &packet).await?;
        }
    }
}

pub fn gzip(body: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(body).unwrap();
    types::GzipPacked { packed_data: enc.finish().unwrap() }.to_bytes()
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Deterministic content of a stored file.
pub fn file_bytes(media_id: i64, size: u64) -> Vec<u8> {
    (0..size).map(|i| ((i + media_id as u64) % 251) as u8).collect()
}

pub fn me() -> types::User {
    types::User {
        id:          SELF_ID,
        access_hash: 1,
        is_self:     true,
        first_name:  "Tess".into(),
        last_name:   String::new(),
        username:    "tess".into(),
        phone:       "15551234567".into(),
    }
}

pub fn channel() -> enums::Chat {
    types::Channel {
        id:          CHANNEL_ID,
        access_hash: CHANNEL_HASH,
        title:       "Media".into(),
        username:    "media_channel".into(),
        broadcast:   true,
        megagroup:   false,
    }
    .into()
}

fn post(id: i32, media: enums::MessageMedia) -> types::Message {
    types::Message {
        id,
        peer_id: types::PeerChannel { channel_id: CHANNEL_ID }.into(),
        date: 1_700_000_000 + id,
        message: format!("post {id}"),
        media,
    }
}

fn photo(id: i32, photo_id: i64, sizes: &[(&str, i32)]) -> types::Message {
    let sizes = sizes
        .iter()
        .map(|(kind, size)| types::PhotoSize { kind: kind.to_string(), w: 100, h: 100, size: *size }.into())
        .collect();
    let photo = types::Photo {
        id: photo_id,
        access_hash: photo_id * 3,
        file_reference: vec![1, 2, 3],
        date: 1_700_000_000,
        sizes,
    };
    post(id, types::MessageMediaPhoto { photo: photo.into() }.into())
}

fn document(id: i32, doc_id: i64, mime: &str, name: Option<&str>, size: i64) -> types::Message {
    let attributes = name
        .map(|n| types::DocumentAttributeFilename { file_name: n.into() }.into())
        .into_iter()
        .collect();
    let doc = types::Document {
        id: doc_id,
        access_hash: doc_id * 3,
        file_reference: vec![4, 5, 6],
        date: 1_700_000_000,
        mime_type: mime.into(),
        size,
        attributes,
    };
    post(id, types::MessageMediaDocument { document: doc.into() }.into())
}

/// Channel history, oldest first.
///
/// | id | media                                   |
/// |----|-----------------------------------------|
/// | 10 | photo 1001, largest size 20000          |
/// | 11 | `clip.mp4`, 7 full 4 KiB chunks + 100   |
/// | 12 | text only                               |
/// | 13 | `song.mp3`                              |
/// | 14 | `paper.pdf`                             |
/// | 15 | unnamed mp4                             |
/// | 16 | `broken.bin`, see [`FakeTelegram::fail_file`] |
pub fn history() -> Vec<types::Message> {
    vec![
        photo(10, 1001, &[("s", 1000), ("x", 20_000), ("m", 5000)]),
        document(11, 2001, "video/mp4", Some("clip.mp4"), 7 * 4096 + 100),
        post(12, types::MessageMediaEmpty {}.into()),
        document(13, 2002, "audio/mpeg", Some("song.mp3"), 2048),
        document(14, 2003, "application/pdf", Some("paper.pdf"), 9000),
        document(15, 2004, "video/mp4", None, 4096),
        document(16, 2005, "application/octet-stream", Some("broken.bin"), 3 * 4096),
    ]
}

struct Srp {
    salt1:  Vec<u8>,
    salt2:  Vec<u8>,
    p:      Vec<u8>,
    big_p:  BigUint,
    v:      BigUint,
    b:      BigUint,
    g_b:    [u8; 256],
    srp_id: i64,
}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new();
    for p in parts {
        h.update(p);
    }
    h.finalize().into()
}

impl Srp {
    fn new(password: &str) -> Self {
        let big_p = BigUint::parse_bytes(server::DH_PRIME_HEX.as_bytes(), 16).unwrap();
        let p = big_p.to_bytes_be();
        let g = BigUint::from(server::DH_G as u32);
        let salt1 = b"salt-one".to_vec();
        let salt2 = b"salt-two".to_vec();

        let x = BigUint::from_bytes_be(&password_hash(password.as_bytes(), &salt1, &salt2).unwrap());
        let v = g.modpow(&x, &big_p);
        let k = BigUint::from_bytes_be(&sha256(&[&p, &pad256(&g.to_bytes_be())]));
        let b = BigUint::from_bytes_be(&[0x3c; 64]);
        let g_b = pad256(&((k * &v + g.modpow(&b, &big_p)) % &big_p).to_bytes_be());

        Self { salt1, salt2, p, big_p, v, b, g_b, srp_id: 0x5151 }
    }

    fn verify(&self, check: &types::InputCheckPasswordSrp) -> bool {
        if check.srp_id != self.srp_id {
            return false;
        }
        let g_a = pad256(&check.a);
        let big_a = BigUint::from_bytes_be(&g_a);
        let u = BigUint::from_bytes_be(&sha256(&[&g_a, &self.g_b]));
        let s = (big_a * self.v.modpow(&u, &self.big_p)).modpow(&self.b, &self.big_p);
        let k = sha256(&[&pad256(&s.to_bytes_be())]);
        let g_pad = pad256(&[server::DH_G as u8]);
        check.m1 == proof(&self.p, &g_pad, &self.salt1, &self.salt2, &g_a, &self.g_b, &k)
    }
}

/// A signed-out account with a single channel, `@media_channel`.
pub struct FakeTelegram {
    messages:     Vec<types::Message>,
    hold_batch:   usize,
    silent:       Vec<u32>,
    flood_once:   AtomicBool,
    push_update:  bool,
    containerize: bool,
    fail_file:    Option<(i64, i64)>,
    authorized:   AtomicBool,
    password:     Option<Srp>,
}

type Answer = Result<Vec<u8>, (i32, &'static str)>;

impl FakeTelegram {
    pub fn new() -> Self {
        Self {
            messages:     history(),
            hold_batch:   0,
            silent:       Vec::new(),
            flood_once:   AtomicBool::new(false),
            push_update:  false,
            containerize: false,
            fail_file:    Some((2005, 4096)),
            authorized:   AtomicBool::new(false),
            password:     None,
        }
    }

    pub fn signed_in(self) -> Self {
        self.authorized.store(true, Ordering::SeqCst);
        self
    }

    /// Hold ping and `upload.getFile` replies until `n` are pending, then
    /// release them newest first.
    pub fn hold_batch(mut self, n: usize) -> Self {
        self.hold_batch = n;
        self
    }

    /// Never answer `R`.
    pub fn silent<R: Identifiable>(mut self) -> Self {
        self.silent.push(R::CONSTRUCTOR_ID);
        self
    }

    /// Answer the first `updates.getState` with `FLOOD_WAIT_0`.
    pub fn flood_once(self) -> Self {
        self.flood_once.store(true, Ordering::SeqCst);
        self
    }

    /// Push a new-message update ahead of every `updates.getState` reply.
    pub fn push_update(mut self) -> Self {
        self.push_update = true;
        self
    }

    /// Send results gzip-packed inside a container, next to an ack.
    pub fn containerize(mut self) -> Self {
        self.containerize = true;
        self
    }

    /// Fail every `upload.getFile` for `media_id` at `offset`.
    pub fn fail_file(mut self, media_id: i64, offset: i64) -> Self {
        self.fail_file = Some((media_id, offset));
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(Srp::new(password));
        self
    }

    fn file_size(&self, media_id: i64) -> Option<u64> {
        self.messages.iter().find_map(|m| match &m.media {
            enums::MessageMedia::Photo(p) => match &p.photo {
                enums::Photo::Photo(p) if p.id == media_id => p
                    .sizes
                    .iter()
                    .filter_map(|s| match s {
                        enums::PhotoSize::Size(s) => Some(s.size as u64),
                        enums::PhotoSize::Empty(_) => None,
                    })
                    .max(),
                _ => None,
            },
            enums::MessageMedia::Document(d) => match &d.document {
                enums::Document::Document(d) if d.id == media_id => Some(d.size as u64),
                _ => None,
            },
            _ => None,
        })
    }

    fn channel_messages(&self, messages: Vec<enums::Message>) -> Vec<u8> {
        types::messages::ChannelMessages {
            pts:      1,
            count:    self.messages.len() as i32,
            messages,
            chats:    vec![channel()],
            users:    Vec::new(),
        }
        .to_bytes()
    }

    fn is_channel(peer: &enums::InputPeer) -> bool {
        matches!(peer, enums::InputPeer::Channel(c) if c.channel_id == CHANNEL_ID)
    }

    fn by_ids(&self, ids: &[types::InputMessageId]) -> Vec<enums::Message> {
        ids.iter()
            .map(|i| match self.messages.iter().find(|m| m.id == i.id) {
                Some(m) => m.clone().into(),
                None => types::MessageEmpty { id: i.id }.into(),
            })
            .collect()
    }

    fn answer(&self, req: &Request) -> Answer {
        let bad = |_: tgmedia_tl::deserialize::Error| (400, "INPUT_REQUEST_INVALID");
        let body = &req.body;
        match req.constructor {
            functions::auth::SendCode::CONSTRUCTOR_ID => {
                let r = functions::auth::SendCode::from_bytes(body).map_err(bad)?;
                if r.phone_number == REJECTED_PHONE {
                    return Err((400, "PHONE_NUMBER_INVALID"));
                }
                Ok(types::auth::SentCode { phone_code_hash: CODE_HASH.into(), timeout: 60 }.to_bytes())
            }
            functions::auth::SignIn::CONSTRUCTOR_ID => {
                let r = functions::auth::SignIn::from_bytes(body).map_err(bad)?;
                if r.phone_code_hash != CODE_HASH || r.phone_code != LOGIN_CODE {
                    return Err((400, "PHONE_CODE_INVALID"));
                }
                if self.password.is_some() {
                    return Err((401, "SESSION_PASSWORD_NEEDED"));
                }
                self.authorized.store(true, Ordering::SeqCst);
                Ok(types::auth::Authorization { user: me().into() }.to_bytes())
            }
            functions::account::GetPassword::CONSTRUCTOR_ID => {
                let pw = match &self.password {
                    Some(srp) => types::account::Password {
                        has_password: true,
                        current_algo: types::PasswordKdfAlgoModPow {
                            salt1: srp.salt1.clone(),
                            salt2: srp.salt2.clone(),
                            g:     server::DH_G,
                            p:     srp.p.clone(),
                        }
                        .into(),
                        srp_b:  srp.g_b.to_vec(),
                        srp_id: srp.srp_id,
                        hint:   PASSWORD_HINT.into(),
                    },
                    None => types::account::Password {
                        has_password: false,
                        current_algo: types::PasswordKdfAlgoUnknown {}.into(),
                        srp_b:        Vec::new(),
                        srp_id:       0,
                        hint:         String::new(),
                    },
                };
                Ok(pw.to_bytes())
            }
            functions::auth::CheckPassword::CONSTRUCTOR_ID => {
                let r = functions::auth::CheckPassword::from_bytes(body).map_err(bad)?;
                match &self.password {
                    Some(srp) if srp.verify(&r.password) => {
                        self.authorized.store(true, Ordering::SeqCst);
                        Ok(types::auth::Authorization { user: me().into() }.to_bytes())
                    }
                    Some(_) => Err((400, "PASSWORD_HASH_INVALID")),
                    None => Err((400, "PASSWORD_EMPTY")),
                }
            }
            functions::auth::LogOut::CONSTRUCTOR_ID => {
                if !self.authorized.swap(false, Ordering::SeqCst) {
                    return Err((401, "AUTH_KEY_UNREGISTERED"));
                }
                Ok(types::auth::LoggedOut {}.to_bytes())
            }
            functions::updates::GetState::CONSTRUCTOR_ID => {
                if self.flood_once.swap(false, Ordering::SeqCst) {
                    return Err((420, "FLOOD_WAIT_0"));
                }
                if !self.authorized.load(Ordering::SeqCst) {
                    return Err((401, "AUTH_KEY_UNREGISTERED"));
                }
                Ok(types::updates::State { pts: 1, qts: 0, date: 1_700_000_000, seq: 1, unread_count: 0 }.to_bytes())
            }
            functions::users::GetUsers::CONSTRUCTOR_ID => {
                let r = functions::users::GetUsers::from_bytes(body).map_err(bad)?;
                let users: Vec<enums::User> = r
                    .id
                    .iter()
                    .filter_map(|u| match u {
                        enums::InputUser::UserSelf(_) => Some(me().into()),
                        enums::InputUser::User(u) if u.user_id == SELF_ID => Some(me().into()),
                        enums::InputUser::User(_) => None,
                    })
                    .collect();
                Ok(users.to_bytes())
            }
            functions::contacts::ResolveUsername::CONSTRUCTOR_ID => {
                let r = functions::contacts::ResolveUsername::from_bytes(body).map_err(bad)?;
                if r.username != "media_channel" {
                    return Err((400, "USERNAME_NOT_OCCUPIED"));
                }
                Ok(types::contacts::ResolvedPeer {
                    peer:  types::PeerChannel { channel_id: CHANNEL_ID }.into(),
                    chats: vec![channel()],
                    users: Vec::new(),
                }
                .to_bytes())
            }
            functions::contacts::ResolvePhone::CONSTRUCTOR_ID => Err((400, "PHONE_NOT_OCCUPIED")),
            functions::channels::GetChannels::CONSTRUCTOR_ID => {
                let r = functions::channels::GetChannels::from_bytes(body).map_err(bad)?;
                if !r.id.iter().any(|c| c.channel_id == CHANNEL_ID) {
                    return Err((400, "CHANNEL_INVALID"));
                }
                Ok(types::messages::Chats { chats: vec![channel()] }.to_bytes())
            }
            functions::messages::GetHistory::CONSTRUCTOR_ID => {
                let r = functions::messages::GetHistory::from_bytes(body).map_err(bad)?;
                if !Self::is_channel(&r.peer) {
                    return Err((400, "PEER_ID_INVALID"));
                }
                let page = self
                    .messages
                    .iter()
                    .rev()
                    .filter(|m| r.offset_id <= 0 || m.id < r.offset_id)
                    .take(r.limit.max(0) as usize)
                    .map(|m| m.clone().into())
                    .collect();
                Ok(self.channel_messages(page))
            }
            functions::messages::Search::CONSTRUCTOR_ID => {
                let r = functions::messages::Search::from_bytes(body).map_err(bad)?;
                if !Self::is_channel(&r.peer) {
                    return Err((400, "PEER_ID_INVALID"));
                }
                // Oldest first, and the video filter lets every document
                // through.
                let hit = |m: &types::Message| match (&r.filter, &m.media) {
                    (enums::MessagesFilter::Photos(_), enums::MessageMedia::Photo(_)) => true,
                    (enums::MessagesFilter::Video(_), enums::MessageMedia::Document(_)) => true,
                    (enums::MessagesFilter::Document(_), enums::MessageMedia::Document(_)) => true,
                    (enums::MessagesFilter::Music(_), enums::MessageMedia::Document(d)) => {
                        matches!(&d.document, enums::Document::Document(d) if d.mime_type.starts_with("audio"))
                    }
                    (enums::MessagesFilter::Empty(_), _) => true,
                    _ => false,
                };
                let page = self
                    .messages
                    .iter()
                    .filter(|m| r.offset_id <= 0 || m.id < r.offset_id)
                    .filter(|m| hit(m))
                    .take(r.limit.max(0) as usize)
                    .map(|m| m.clone().into())
                    .collect();
                Ok(self.channel_messages(page))
            }
            functions::channels::GetMessages::CONSTRUCTOR_ID => {
                let r = functions::channels::GetMessages::from_bytes(body).map_err(bad)?;
                if r.channel.channel_id != CHANNEL_ID {
                    return Err((400, "CHANNEL_INVALID"));
                }
                Ok(self.channel_messages(self.by_ids(&r.id)))
            }
            functions::messages::GetMessages::CONSTRUCTOR_ID => {
                let r = functions::messages::GetMessages::from_bytes(body).map_err(bad)?;
                let messages = r.id.iter().map(|i| types::MessageEmpty { id: i.id }.into()).collect();
                Ok(types::messages::Messages { messages, chats: Vec::new(), users: Vec::new() }.to_bytes())
            }
            functions::upload::GetFile::CONSTRUCTOR_ID => {
                let r = functions::upload::GetFile::from_bytes(body).map_err(bad)?;
                let id = match &r.location {
                    enums::InputFileLocation::Photo(l) => l.id,
                    enums::InputFileLocation::Document(l) => l.id,
                };
                if self.fail_file == Some((id, r.offset)) {
                    return Err((500, "FILE_PART_FAILED"));
                }
                let size = self.file_size(id).ok_or((400, "FILE_ID_INVALID"))?;
                let data = file_bytes(id, size);
                let start = (r.offset.max(0) as u64).min(size) as usize;
                let end = (r.offset.max(0) as u64 + r.limit.max(0) as u64).min(size) as usize;
                Ok(types::upload::File { mtime: 0, bytes: data[start..end].to_vec() }.to_bytes())
            }
            _ => Err((400, "METHOD_NOT_IMPLEMENTED")),
        }
    }

    fn release_held(&self, held: &mut Vec<Vec<u8>>, body: Vec<u8>) -> Vec<Outgoing> {
        held.push(body);
        if held.len() < self.hold_batch {
            return Vec::new();
        }
        held.drain(..).rev().map(Outgoing::Content).collect()
    }
}

impl Behavior for FakeTelegram {
    fn handle(&self, req: &Request, held: &mut Vec<Vec<u8>>) -> Vec<Outgoing> {
        if self.silent.contains(&req.constructor) {
            return Vec::new();
        }

        if req.constructor == functions::Ping::CONSTRUCTOR_ID {
            let Ok(ping) = functions::Ping::from_bytes(&req.body) else {
                return Vec::new();
            };
            let pong = types::Pong { msg_id: req.msg_id, ping_id: ping.ping_id }.to_bytes();
            if self.hold_batch > 0 {
                return self.release_held(held, pong);
            }
            return vec![Outgoing::Content(pong)];
        }

        let reply = match self.answer(req) {
            Ok(result) => server::rpc_result(req.msg_id, &result),
            Err((code, name)) => server::rpc_error(req.msg_id, code, name),
        };

        let mut out = Vec::new();
        if self.push_update && req.constructor == functions::updates::GetState::CONSTRUCTOR_ID {
            let update = types::UpdateShort {
                update: types::UpdateNewChannelMessage {
                    message:   self.messages[0].clone().into(),
                    pts:       2,
                    pts_count: 1,
                }
                .into(),
                date:   1_700_000_000,
            };
            out.push(Outgoing::Content(update.to_bytes()));
        }

        if self.hold_batch > 0 && req.constructor == functions::upload::GetFile::CONSTRUCTOR_ID {
            out.extend(self.release_held(held, reply));
        } else if self.containerize {
            let ack = types::MsgsAck { msg_ids: vec![req.msg_id] }.to_bytes();
            out.push(Outgoing::Container(vec![ack, gzip(&reply)]));
        } else {
            out.push(Outgoing::Content(reply));
        }
        out
    }
}
