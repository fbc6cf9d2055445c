//! Sans-IO authorization key generation.
//!
//! # Flow
//!
//! ```text
//! let (req, s1) = authentication::step1()?;
//! // send req, receive ResPq
//! let (req, s2) = authentication::step2(s1, res_pq, &pinned)?;
//! // send req, receive ServerDhParams
//! let (req, s3) = authentication::step3(s2, dh_params)?;
//! // send req, receive SetClientDhParamsAnswer
//! let done = authentication::finish(s3, answer)?;
//! // done.auth_key is ready
//! ```
//!
//! The step states are consumed by value, so an aborted exchange leaves
//! nothing behind to persist.

use std::fmt;

use num_bigint::BigUint;
use num_traits::One;
use sha1::{Digest, Sha1};
use tgmedia_crypto::{AuthKey, RandomError, aes, factorize, generate_key_data_from_nonce, random_array, rsa};
use tgmedia_tl::{Cursor, Deserializable, Serializable, enums, functions, types};

use crate::message::unix_now;

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors that can occur during auth key generation.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    InvalidNonce         { got: [u8; 16], expected: [u8; 16] },
    InvalidPqSize        { size: usize },
    Factorization        { pq: u64 },
    UnknownFingerprints  { fingerprints: Vec<i64> },
    Rsa(rsa::Error),
    DhParamsFail,
    InvalidServerNonce   { got: [u8; 16], expected: [u8; 16] },
    EncryptedResponseNotPadded { len: usize },
    InvalidDhInnerData   { error: tgmedia_tl::deserialize::Error },
    InvalidDhPrime       { bits: u64 },
    GParameterOutOfRange { value: BigUint, low: BigUint, high: BigUint },
    DhGenRetry,
    DhGenFail,
    InvalidAnswerHash    { got: [u8; 20], expected: [u8; 20] },
    InvalidNewNonceHash  { got: [u8; 16], expected: [u8; 16] },
    Random(RandomError),
}

impl Error {
    /// The server could not prove it holds one of the pinned keys.
    pub fn is_untrusted(&self) -> bool {
        matches!(self, Self::UnknownFingerprints { .. } | Self::InvalidAnswerHash { .. })
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNonce { got, expected }
                => write!(f, "nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::InvalidPqSize { size }
                => write!(f, "pq size {size} invalid (expected 8)"),
            Self::Factorization { pq }
                => write!(f, "could not factorize pq={pq}"),
            Self::UnknownFingerprints { fingerprints }
                => write!(f, "no pinned key matches fingerprints {fingerprints:?}"),
            Self::Rsa(e) => write!(f, "rsa: {e}"),
            Self::DhParamsFail
                => write!(f, "server returned DH params failure"),
            Self::InvalidServerNonce { got, expected }
                => write!(f, "server_nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::EncryptedResponseNotPadded { len }
                => write!(f, "encrypted answer len {len} is not 16-byte aligned"),
            Self::InvalidDhInnerData { error }
                => write!(f, "DH inner data deserialization error: {error}"),
            Self::InvalidDhPrime { bits }
                => write!(f, "dh_prime has {bits} bits (expected 2048)"),
            Self::GParameterOutOfRange { value, low, high }
                => write!(f, "g={value} not in range ({low}, {high})"),
            Self::DhGenRetry  => write!(f, "DH gen retry requested"),
            Self::DhGenFail   => write!(f, "DH gen failed"),
            Self::InvalidAnswerHash { got, expected }
                => write!(f, "answer hash mismatch: got {got:?}, expected {expected:?}"),
            Self::InvalidNewNonceHash { got, expected }
                => write!(f, "new nonce hash mismatch: got {got:?}, expected {expected:?}"),
            Self::Random(e) => write!(f, "random source failed: {e}"),
        }
    }
}

impl From<RandomError> for Error {
    fn from(e: RandomError) -> Self { Self::Random(e) }
}

// ─── Pinned keys ─────────────────────────────────────────────────────────────

/// Server RSA keys the client is willing to talk to, looked up by
/// fingerprint.
#[derive(Clone, Debug)]
pub struct PinnedKeys {
    keys: Vec<(i64, rsa::Key)>,
}

const TELEGRAM_PRODUCTION_N: &str = "29379598170669337022986177149456128565388431120058863768162556424047512191330847455146576344487764408661701890505066208632169112269581063774293102577308490531282748465986139880977280302242772832972539403531316010870401287642763009136156734339538042419388722777357134487746169093539093850251243897188928735903389451772730245253062963384108812842079887538976360465290946139638691491496062099570836476454855996319192747663615955633778034897140982517446405334423701359108810182097749467210509584293428076654573384828809574217079944388301239431309115013843331317877374435868468779972014486325557807783825502498215169806323";
const TELEGRAM_TEST_N: &str = "25342889448840415564971689590713473206898847759084779052582026594546022463853940585885215951168491965708222649399180603818074200620463776135424884632162512403163793083921641631564740959529419359595852941166848940585952337613333022396096584117954892216031229237302943701877588456738335398602461675225081791820393153757504952636234951323237820036543581047826906120927972487366805292115792231423684261262330394324750785450942589751755390156647751460719351439969059949569615302809050721500330239005077889855323917509948255722081644689442127297605422579707142646660768825302832201908302295573257427896031830742328565032949";

impl PinnedKeys {
    pub fn new(keys: impl IntoIterator<Item = rsa::Key>) -> Self {
        Self { keys: keys.into_iter().map(|k| (k.fingerprint(), k)).collect() }
    }

    /// Telegram's production and test DC keys.
    pub fn telegram() -> Self {
        Self::new(
            [TELEGRAM_PRODUCTION_N, TELEGRAM_TEST_N]
                .into_iter()
                .filter_map(|n| rsa::Key::new(n, "65537")),
        )
    }

    pub fn get(&self, fingerprint: i64) -> Option<&rsa::Key> {
        self.keys.iter().find(|(fp, _)| *fp == fingerprint).map(|(_, k)| k)
    }

    pub fn fingerprints(&self) -> Vec<i64> {
        self.keys.iter().map(|(fp, _)| *fp).collect()
    }
}

impl Default for PinnedKeys {
    fn default() -> Self { Self::telegram() }
}

// ─── Step state ──────────────────────────────────────────────────────────────

/// State after step 1.
pub struct Step1 { nonce: [u8; 16] }

/// State after step 2.
pub struct Step2 {
    nonce:        [u8; 16],
    server_nonce: [u8; 16],
    new_nonce:    [u8; 32],
}

/// State after step 3.
pub struct Step3 {
    nonce:        [u8; 16],
    server_nonce: [u8; 16],
    new_nonce:    [u8; 32],
    gab:          BigUint,
    time_offset:  i64,
}

/// The final output of a successful handshake.
#[derive(Clone, Debug, PartialEq)]
pub struct Finished {
    pub auth_key:    [u8; 256],
    /// Server clock minus local clock, in seconds.
    pub time_offset: i64,
    pub first_salt:  i64,
}

// ─── Step 1: req_pq_multi ────────────────────────────────────────────────────

pub fn step1() -> Result<(functions::ReqPqMulti, Step1), Error> {
    let nonce: [u8; 16] = random_array()?;
    Ok((functions::ReqPqMulti { nonce }, Step1 { nonce }))
}

// ─── Step 2: req_DH_params ───────────────────────────────────────────────────

/// Process `ResPQ` and generate `req_DH_params`.
pub fn step2(
    data:     Step1,
    response: types::ResPq,
    pinned:   &PinnedKeys,
) -> Result<(functions::ReqDhParams, Step2), Error> {
    let rnd: [u8; 256] = random_array()?;
    do_step2(data, response, pinned, &rnd)
}

fn do_step2(
    data:     Step1,
    res_pq:   types::ResPq,
    pinned:   &PinnedKeys,
    random:   &[u8; 256],
) -> Result<(functions::ReqDhParams, Step2), Error> {
    let Step1 { nonce } = data;
    check_nonce(&res_pq.nonce, &nonce)?;

    let pq_bytes: [u8; 8] = res_pq.pq.as_slice().try_into()
        .map_err(|_| Error::InvalidPqSize { size: res_pq.pq.len() })?;
    let pq = u64::from_be_bytes(pq_bytes);

    let (fingerprint, key) = res_pq.server_public_key_fingerprints
        .iter()
        .find_map(|&fp| pinned.get(fp).map(|k| (fp, k)))
        .ok_or_else(|| Error::UnknownFingerprints {
            fingerprints: res_pq.server_public_key_fingerprints.clone(),
        })?;
    log::debug!("[tgmedia] server offered pinned key {fingerprint}");

    let (p, q) = factorize(pq).ok_or(Error::Factorization { pq })?;

    let mut new_nonce = [0u8; 32];
    new_nonce.copy_from_slice(&random[..32]);
    let mut rsa_random = [0u8; 224];
    rsa_random.copy_from_slice(&random[32..]);

    let p_bytes = trim_be(p);
    let q_bytes = trim_be(q);

    let pq_inner = types::PQInnerData {
        pq: res_pq.pq.clone(),
        p: p_bytes.clone(),
        q: q_bytes.clone(),
        nonce,
        server_nonce: res_pq.server_nonce,
        new_nonce,
    }
    .to_bytes();

    let ciphertext = rsa::encrypt_hashed(&pq_inner, key, &rsa_random).map_err(Error::Rsa)?;

    Ok((
        functions::ReqDhParams {
            nonce,
            server_nonce: res_pq.server_nonce,
            p: p_bytes,
            q: q_bytes,
            public_key_fingerprint: fingerprint,
            encrypted_data: ciphertext,
        },
        Step2 { nonce, server_nonce: res_pq.server_nonce, new_nonce },
    ))
}

/// Big-endian bytes without leading zeros.
pub fn trim_be(v: u64) -> Vec<u8> {
    let b = v.to_be_bytes();
    let skip = b.iter().position(|&x| x != 0).unwrap_or(7);
    b[skip..].to_vec()
}

// ─── Step 3: set_client_DH_params ────────────────────────────────────────────

/// Process `ServerDhParams` and generate `set_client_DH_params`.
pub fn step3(
    data:     Step2,
    response: enums::ServerDhParams,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    // 256 bytes of DH exponent, 16 of padding
    let rnd: [u8; 272] = random_array()?;
    do_step3(data, response, &rnd, unix_now())
}

fn do_step3(
    data:     Step2,
    response: enums::ServerDhParams,
    random:   &[u8; 272],
    now:      i64,
) -> Result<(functions::SetClientDhParams, Step3), Error> {
    let Step2 { nonce, server_nonce, new_nonce } = data;

    let mut server_dh_ok = match response {
        enums::ServerDhParams::Fail(f) => {
            check_nonce(&f.nonce, &nonce)?;
            check_server_nonce(&f.server_nonce, &server_nonce)?;
            let digest: [u8; 20] = Sha1::digest(new_nonce).into();
            let mut expected_hash = [0u8; 16];
            expected_hash.copy_from_slice(&digest[4..]);
            check_new_nonce_hash(&f.new_nonce_hash, &expected_hash)?;
            return Err(Error::DhParamsFail);
        }
        enums::ServerDhParams::Ok(x) => x,
    };

    check_nonce(&server_dh_ok.nonce, &nonce)?;
    check_server_nonce(&server_dh_ok.server_nonce, &server_nonce)?;

    let answer_len = server_dh_ok.encrypted_answer.len();
    if answer_len % 16 != 0 || answer_len < 32 {
        return Err(Error::EncryptedResponseNotPadded { len: answer_len });
    }

    let (key, iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
    aes::ige_decrypt(&mut server_dh_ok.encrypted_answer, &key, &iv);
    let plain = server_dh_ok.encrypted_answer;

    let mut got_hash = [0u8; 20];
    got_hash.copy_from_slice(&plain[..20]);
    let mut cursor = Cursor::from_slice(&plain[20..]);
    let inner = types::ServerDhInnerData::deserialize(&mut cursor)
        .map_err(|error| Error::InvalidDhInnerData { error })?;

    let expected_hash: [u8; 20] = Sha1::digest(&plain[20..20 + cursor.pos()]).into();
    if got_hash != expected_hash {
        return Err(Error::InvalidAnswerHash { got: got_hash, expected: expected_hash });
    }

    check_nonce(&inner.nonce, &nonce)?;
    check_server_nonce(&inner.server_nonce, &server_nonce)?;

    let dh_prime = BigUint::from_bytes_be(&inner.dh_prime);
    if dh_prime.bits() != 2048 {
        return Err(Error::InvalidDhPrime { bits: dh_prime.bits() });
    }
    let g = BigUint::from(inner.g.max(0) as u32);
    let g_a = BigUint::from_bytes_be(&inner.g_a);
    let time_offset = i64::from(inner.server_time) - now;

    let one = BigUint::one();
    check_g_in_range(&g, &one, &BigUint::from(8u32))?;
    check_g_in_range(&g_a, &one, &(&dh_prime - &one))?;

    let b = BigUint::from_bytes_be(&random[..256]);
    let g_b = g.modpow(&b, &dh_prime);
    let gab = g_a.modpow(&b, &dh_prime);

    check_g_in_range(&g_b, &one, &(&dh_prime - &one))?;
    let safety = one.clone() << (2048 - 64);
    check_g_in_range(&g_a, &safety, &(&dh_prime - &safety))?;
    check_g_in_range(&g_b, &safety, &(&dh_prime - &safety))?;

    let client_dh_inner = types::ClientDhInnerData {
        nonce,
        server_nonce,
        retry_id: 0,
        g_b: g_b.to_bytes_be(),
    }
    .to_bytes();

    let digest: [u8; 20] = Sha1::digest(&client_dh_inner).into();
    let pad_len = (16 - ((20 + client_dh_inner.len()) % 16)) % 16;

    let mut hashed = Vec::with_capacity(20 + client_dh_inner.len() + pad_len);
    hashed.extend_from_slice(&digest);
    hashed.extend_from_slice(&client_dh_inner);
    hashed.extend_from_slice(&random[256..256 + pad_len]);

    aes::ige_encrypt(&mut hashed, &key, &iv);

    Ok((
        functions::SetClientDhParams { nonce, server_nonce, encrypted_data: hashed },
        Step3 { nonce, server_nonce, new_nonce, gab, time_offset },
    ))
}

// ─── finish: create_key ──────────────────────────────────────────────────────

/// Finalise the handshake. Returns the ready [`Finished`] on success.
pub fn finish(
    data:     Step3,
    response: enums::SetClientDhParamsAnswer,
) -> Result<Finished, Error> {
    let Step3 { nonce, server_nonce, new_nonce, gab, time_offset } = data;

    struct DhData { nonce: [u8; 16], server_nonce: [u8; 16], hash: [u8; 16], num: u8 }

    let dh = match response {
        enums::SetClientDhParamsAnswer::DhGenOk(x) =>
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash1, num: 1 },
        enums::SetClientDhParamsAnswer::DhGenRetry(x) =>
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash2, num: 2 },
        enums::SetClientDhParamsAnswer::DhGenFail(x) =>
            DhData { nonce: x.nonce, server_nonce: x.server_nonce, hash: x.new_nonce_hash3, num: 3 },
    };

    check_nonce(&dh.nonce, &nonce)?;
    check_server_nonce(&dh.server_nonce, &server_nonce)?;

    let auth_key = AuthKey::from_bytes(key_from_biguint(&gab));
    let expected_hash = auth_key.calc_new_nonce_hash(&new_nonce, dh.num);
    check_new_nonce_hash(&dh.hash, &expected_hash)?;

    match dh.num {
        1 => {
            log::debug!("[tgmedia] negotiated {auth_key:?}, clock offset {time_offset}s");
            Ok(Finished {
                auth_key: auth_key.to_bytes(),
                time_offset,
                first_salt: first_salt(&new_nonce, &server_nonce),
            })
        }
        2 => Err(Error::DhGenRetry),
        _ => Err(Error::DhGenFail),
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// `g^ab mod p` as a 256-byte big-endian key.
pub fn key_from_biguint(gab: &BigUint) -> [u8; 256] {
    let mut key_bytes = [0u8; 256];
    let gab_bytes = gab.to_bytes_be();
    let skip = 256usize.saturating_sub(gab_bytes.len());
    let take = gab_bytes.len().min(256);
    key_bytes[skip..].copy_from_slice(&gab_bytes[gab_bytes.len() - take..]);
    key_bytes
}

/// `substr(new_nonce, 0, 8) XOR substr(server_nonce, 0, 8)`
pub fn first_salt(new_nonce: &[u8; 32], server_nonce: &[u8; 16]) -> i64 {
    let mut buf = [0u8; 8];
    for ((dst, a), b) in buf.iter_mut().zip(&new_nonce[..8]).zip(&server_nonce[..8]) {
        *dst = a ^ b;
    }
    i64::from_le_bytes(buf)
}

fn check_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidNonce { got: *got, expected: *expected })
    }
}
fn check_server_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidServerNonce { got: *got, expected: *expected })
    }
}
fn check_new_nonce_hash(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidNewNonceHash { got: *got, expected: *expected })
    }
}
fn check_g_in_range(val: &BigUint, lo: &BigUint, hi: &BigUint) -> Result<(), Error> {
    if lo < val && val < hi { Ok(()) } else {
        Err(Error::GParameterOutOfRange { value: val.clone(), low: lo.clone(), high: hi.clone() })
    }
}
