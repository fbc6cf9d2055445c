//! Server half of the key exchange plus message builders, for in-process
//! test servers.
//!
//! Enabled by the `server` feature. The handshake side mirrors
//! [`crate::authentication`]: feed it each plain request body and send back
//! the body it returns.

use std::fmt;

use num_bigint::BigUint;
use sha1::{Digest, Sha1};
use tgmedia_crypto::{AuthKey, RandomError, aes, generate_key_data_from_nonce, random_array, rsa};
use tgmedia_tl::{Cursor, Deserializable, Serializable, functions, types};

use crate::authentication::{Finished, PinnedKeys, first_salt, key_from_biguint};
use crate::message::{MSG_CONTAINER, RPC_RESULT, unix_now};

/// 2048-bit RSA key used by test servers. Never pin it in production.
pub const TEST_RSA_N: &str = "27595255601468638678910006752293471007971259465182781924627329803760191363132653433968736706231943274465342196382252814013995725728309650773467006677726850291581683869498996551421306348701549149454800909317681710988609059946509055435609388957916964633826217750289788416997052442622669908055452846288417488905116114883054613079085514181145622134604457548414031737223758997920945658663839009147888688654873519662324227527227981071191560896372994616870350350742860473794410467339412667351077456415478640292024094625487454971934156441169084533746811642619516701297897069746000310334889761461462352784564647633253446130703";
pub const TEST_RSA_D: &str = "1681728655145425376254124646667685783692222871110060439247471737128922659022412039233885200797875725745984355895917081025556539490041789297484279485952073486192185259849840429473071662674733162990714784500584719375139304292634041341682162740099796401231394688415054319506328142207225591845422870562826181404179398092714126476935122714966254107419665498920946303217899696522792344880509316307970438719679345412048540628399671144188943630013791255995223570864095926680083067488553083347349698617555505872294498454639900211043759871509523515963246649463261467821292994882008591018584383793274418238559589516172476196609";

/// RFC 3526 group 14 safe prime, generator 2.
pub const DH_PRIME_HEX: &str = "ffffffffffffffffc90fdaa22168c234c4c6628b80dc1cd129024e088a67cc74020bbea63b139b22514a08798e3404ddef9519b3cd3a431b302b0a6df25f14374fe1356d6d51c245e485b576625e7ec6f44c42e9a637ed6b0bff5cb6f406b7edee386bfb5a899fa5ae9f24117c4b1fe649286651ece45b3dc2007cb8a163bf0598da48361c55d39a69163fa8fd24cf5f83655d23dca3ad961c62f356208552bb9ed529077096966d670c354e4abc9804f1746c08ca18217c32905e462e36ce3be39e772c180e86039b2783a2ec07a28fb5c55df06f4c52c9de2bcbf6955817183995497cea956ae515d2261898fa051015728e5a8aacaa68ffffffffffffffff";
pub const DH_G: i32 = 2;

/// `pq` handed out in `resPQ`: 1206429347 × 1218991343.
const MOCK_PQ: u64 = 1470626929934143021;

/// The test key pair.
pub fn test_key() -> Option<rsa::PrivateKey> {
    rsa::PrivateKey::new(TEST_RSA_N, "65537", TEST_RSA_D)
}

/// A pinned key set that trusts only [`test_key`].
pub fn test_pinned_keys() -> PinnedKeys {
    PinnedKeys::new(test_key().map(|k| k.public_key().clone()))
}

// ─── Error ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum ServerError {
    Deserialize(tgmedia_tl::deserialize::Error),
    /// A request arrived that does not belong to the current stage.
    UnexpectedStage,
    NonceMismatch,
    UnknownFingerprint { fingerprint: i64 },
    Rsa(rsa::Error),
    BadFactors,
    BadClientHash,
    BadDhPrime,
    Random(RandomError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deserialize(e) => write!(f, "request body: {e}"),
            Self::UnexpectedStage => write!(f, "request out of handshake order"),
            Self::NonceMismatch => write!(f, "nonce mismatch"),
            Self::UnknownFingerprint { fingerprint } => write!(f, "no key with fingerprint {fingerprint}"),
            Self::Rsa(e) => write!(f, "rsa: {e}"),
            Self::BadFactors => write!(f, "p*q does not match pq"),
            Self::BadClientHash => write!(f, "client DH inner data hash mismatch"),
            Self::BadDhPrime => write!(f, "built-in DH prime failed to parse"),
            Self::Random(e) => write!(f, "random source failed: {e}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<tgmedia_tl::deserialize::Error> for ServerError {
    fn from(e: tgmedia_tl::deserialize::Error) -> Self { Self::Deserialize(e) }
}

impl From<RandomError> for ServerError {
    fn from(e: RandomError) -> Self { Self::Random(e) }
}

// ─── Handshake ───────────────────────────────────────────────────────────────

enum Stage {
    AwaitPq,
    AwaitDhParams { nonce: [u8; 16], server_nonce: [u8; 16] },
    AwaitClientDh {
        nonce:        [u8; 16],
        server_nonce: [u8; 16],
        new_nonce:    [u8; 32],
        a:            BigUint,
        dh_prime:     BigUint,
    },
    Done(Finished),
}

/// Answers `req_pq_multi`, `req_DH_params` and `set_client_DH_params` in
/// order.
pub struct HandshakeServer {
    key:           rsa::PrivateKey,
    advertised:    Vec<i64>,
    clock_skew:    i64,
    tamper_answer: bool,
    stage:         Stage,
}

impl HandshakeServer {
    pub fn new(key: rsa::PrivateKey) -> Self {
        let advertised = vec![key.public_key().fingerprint()];
        Self { key, advertised, clock_skew: 0, tamper_answer: false, stage: Stage::AwaitPq }
    }

    /// Advertise these fingerprints in `resPQ` instead of the real one.
    pub fn advertise(mut self, fingerprints: Vec<i64>) -> Self {
        self.advertised = fingerprints;
        self
    }

    /// Report `server_time` shifted by `secs`.
    pub fn clock_skew(mut self, secs: i64) -> Self {
        self.clock_skew = secs;
        self
    }

    /// Corrupt the SHA-1 that prefixes the encrypted DH answer.
    pub fn tamper_answer_hash(mut self) -> Self {
        self.tamper_answer = true;
        self
    }

    /// The negotiated key, once `dh_gen_ok` has been produced.
    pub fn finished(&self) -> Option<&Finished> {
        match &self.stage {
            Stage::Done(f) => Some(f),
            _ => None,
        }
    }

    /// Process one plain request body and return the reply body.
    pub fn handle(&mut self, body: &[u8]) -> Result<Vec<u8>, ServerError> {
        let stage = std::mem::replace(&mut self.stage, Stage::AwaitPq);
        let (reply, next) = match stage {
            Stage::AwaitPq => self.on_req_pq(body)?,
            Stage::AwaitDhParams { nonce, server_nonce } => self.on_req_dh(body, nonce, server_nonce)?,
            Stage::AwaitClientDh { nonce, server_nonce, new_nonce, a, dh_prime } => {
                on_client_dh(body, nonce, server_nonce, new_nonce, &a, &dh_prime)?
            }
            Stage::Done(_) => return Err(ServerError::UnexpectedStage),
        };
        self.stage = next;
        Ok(reply)
    }

    fn on_req_pq(&self, body: &[u8]) -> Result<(Vec<u8>, Stage), ServerError> {
        let req = functions::ReqPqMulti::from_bytes(body)?;
        let server_nonce: [u8; 16] = random_array()?;
        let reply = types::ResPq {
            nonce: req.nonce,
            server_nonce,
            pq: MOCK_PQ.to_be_bytes().to_vec(),
            server_public_key_fingerprints: self.advertised.clone(),
        };
        log::debug!("[tgmedia] test server: resPQ sent");
        Ok((reply.to_bytes(), Stage::AwaitDhParams { nonce: req.nonce, server_nonce }))
    }

    fn on_req_dh(&self, body: &[u8], nonce: [u8; 16], server_nonce: [u8; 16]) -> Result<(Vec<u8>, Stage), ServerError> {
        let req = functions::ReqDhParams::from_bytes(body)?;
        if req.nonce != nonce || req.server_nonce != server_nonce {
            return Err(ServerError::NonceMismatch);
        }
        let fingerprint = self.key.public_key().fingerprint();
        if req.public_key_fingerprint != fingerprint {
            return Err(ServerError::UnknownFingerprint { fingerprint: req.public_key_fingerprint });
        }

        let data = self.key.decrypt_hashed(&req.encrypted_data).map_err(ServerError::Rsa)?;
        let inner = types::PQInnerData::deserialize(&mut Cursor::from_slice(&data))?;
        if inner.nonce != nonce || inner.server_nonce != server_nonce {
            return Err(ServerError::NonceMismatch);
        }
        let p = be_u64(&inner.p);
        let q = be_u64(&inner.q);
        if p.checked_mul(q) != Some(MOCK_PQ) {
            return Err(ServerError::BadFactors);
        }

        let dh_prime = BigUint::parse_bytes(DH_PRIME_HEX.as_bytes(), 16).ok_or(ServerError::BadDhPrime)?;
        let rnd: [u8; 256] = random_array()?;
        let a = BigUint::from_bytes_be(&rnd);
        let g_a = BigUint::from(DH_G as u32).modpow(&a, &dh_prime);

        let answer = types::ServerDhInnerData {
            nonce,
            server_nonce,
            g: DH_G,
            dh_prime: dh_prime.to_bytes_be(),
            g_a: g_a.to_bytes_be(),
            server_time: (unix_now() + self.clock_skew) as i32,
        }
        .to_bytes();

        let mut hash: [u8; 20] = Sha1::digest(&answer).into();
        if self.tamper_answer {
            hash[0] ^= 0xff;
        }
        let pad_len = (16 - ((20 + answer.len()) % 16)) % 16;
        let filler: [u8; 16] = random_array()?;
        let mut encrypted_answer = Vec::with_capacity(20 + answer.len() + pad_len);
        encrypted_answer.extend_from_slice(&hash);
        encrypted_answer.extend_from_slice(&answer);
        encrypted_answer.extend_from_slice(&filler[..pad_len]);

        let (key, iv) = generate_key_data_from_nonce(&server_nonce, &inner.new_nonce);
        aes::ige_encrypt(&mut encrypted_answer, &key, &iv);

        let reply = types::ServerDhParamsOk { nonce, server_nonce, encrypted_answer };
        Ok((
            reply.to_bytes(),
            Stage::AwaitClientDh { nonce, server_nonce, new_nonce: inner.new_nonce, a, dh_prime },
        ))
    }
}

fn on_client_dh(
    body:         &[u8],
    nonce:        [u8; 16],
    server_nonce: [u8; 16],
    new_nonce:    [u8; 32],
    a:            &BigUint,
    dh_prime:     &BigUint,
) -> Result<(Vec<u8>, Stage), ServerError> {
    let mut req = functions::SetClientDhParams::from_bytes(body)?;
    if req.nonce != nonce || req.server_nonce != server_nonce {
        return Err(ServerError::NonceMismatch);
    }

    let (key, iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
    aes::ige_decrypt(&mut req.encrypted_data, &key, &iv);
    let plain = req.encrypted_data;
    if plain.len() < 20 {
        return Err(ServerError::BadClientHash);
    }
    let mut cursor = Cursor::from_slice(&plain[20..]);
    let inner = types::ClientDhInnerData::deserialize(&mut cursor)?;
    let digest: [u8; 20] = Sha1::digest(&plain[20..20 + cursor.pos()]).into();
    if digest[..] != plain[..20] {
        return Err(ServerError::BadClientHash);
    }

    let g_b = BigUint::from_bytes_be(&inner.g_b);
    let auth_key = key_from_biguint(&g_b.modpow(a, dh_prime));
    let hash1 = AuthKey::from_bytes(auth_key).calc_new_nonce_hash(&new_nonce, 1);

    let reply = types::DhGenOk { nonce, server_nonce, new_nonce_hash1: hash1 };
    log::debug!("[tgmedia] test server: dh_gen_ok");
    let finished = Finished {
        auth_key,
        time_offset: 0,
        first_salt: first_salt(&new_nonce, &server_nonce),
    };
    Ok((reply.to_bytes(), Stage::Done(finished)))
}

fn be_u64(bytes: &[u8]) -> u64 {
    bytes.iter().take(8).fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

// ─── Message builders ────────────────────────────────────────────────────────

/// `rpc_result` carrying an already serialized result.
pub fn rpc_result(req_msg_id: i64, result: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + result.len());
    RPC_RESULT.serialize(&mut buf);
    req_msg_id.serialize(&mut buf);
    buf.extend_from_slice(result);
    buf
}

/// `rpc_result` carrying an `rpc_error`.
pub fn rpc_error(req_msg_id: i64, code: i32, message: &str) -> Vec<u8> {
    let err = types::RpcError { error_code: code, error_message: message.to_string() };
    rpc_result(req_msg_id, &err.to_bytes())
}

/// `msg_container` of `(msg_id, seq_no, body)` members.
pub fn container(messages: &[(i64, i32, Vec<u8>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    MSG_CONTAINER.serialize(&mut buf);
    (messages.len() as u32).serialize(&mut buf);
    for (msg_id, seq_no, body) in messages {
        msg_id.serialize(&mut buf);
        seq_no.serialize(&mut buf);
        (body.len() as u32).serialize(&mut buf);
        buf.extend_from_slice(body);
    }
    buf
}

/// `bad_server_salt` telling the client to resend `bad_msg_id` with
/// `new_salt`.
pub fn bad_server_salt(bad_msg_id: i64, bad_msg_seqno: i32, new_salt: i64) -> Vec<u8> {
    types::BadServerSalt {
        bad_msg_id,
        bad_msg_seqno,
        error_code: 48,
        new_server_salt: new_salt,
    }
    .to_bytes()
}
