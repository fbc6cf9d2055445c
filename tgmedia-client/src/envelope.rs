//! Unwrapping of decrypted message bodies: `rpc_result`, `msg_container`,
//! `gzip_packed` and the service messages the reader task reacts to.

use std::io::Read;

use tgmedia_mtproto::message::{GZIP_PACKED, MSG_CONTAINER, RPC_RESULT};
use tgmedia_tl::{Cursor, Deserializable, Identifiable, enums, peek_constructor, types};

use crate::errors::{InvocationError, RpcError};

/// Containers may not nest deeper than this.
const MAX_DEPTH: usize = 4;

/// One logical message, with the id and seq_no it arrived under.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub msg_id: i64,
    pub seq_no: i32,
    pub item:   Incoming,
}

impl Envelope {
    pub fn is_content_related(&self) -> bool {
        self.seq_no & 1 == 1
    }
}

#[derive(Debug)]
pub(crate) enum Incoming {
    /// Reply to one of our calls. `pong` is delivered this way too.
    Result { req_msg_id: i64, outcome: Result<Vec<u8>, RpcError> },
    Ack(Vec<i64>),
    BadServerSalt { bad_msg_id: i64, new_salt: i64 },
    BadMsg { bad_msg_id: i64, code: i32 },
    NewSession { server_salt: i64 },
    Updates(enums::Updates),
    Unknown(u32),
}

/// Flatten `body` into `out`. Gzip-packed parts may not inflate past
/// `max_len` bytes.
pub(crate) fn unwrap(
    msg_id:  i64,
    seq_no:  i32,
    body:    Vec<u8>,
    max_len: usize,
    out:     &mut Vec<Envelope>,
) -> Result<(), InvocationError> {
    unwrap_at(msg_id, seq_no, body, max_len, out, 0)
}

fn unwrap_at(
    msg_id: i64,
    seq_no: i32,
    body:    Vec<u8>,
    max_len: usize,
    out:     &mut Vec<Envelope>,
    depth:   usize,
) -> Result<(), InvocationError> {
    if depth > MAX_DEPTH {
        return Err(InvocationError::Deserialize("containers nested too deep".into()));
    }
    let id = peek_constructor(&body)?;
    let env = |item| Envelope { msg_id, seq_no, item };

    match id {
        RPC_RESULT => {
            let mut cur = Cursor::from_slice(&body);
            let _ = u32::deserialize(&mut cur)?;
            let req_msg_id = i64::deserialize(&mut cur)?;
            let mut result = Vec::new();
            cur.read_to_end(&mut result);
            out.push(env(Incoming::Result { req_msg_id, outcome: read_result(result, max_len)? }));
        }
        MSG_CONTAINER => {
            let mut cur = Cursor::from_slice(&body);
            let _ = u32::deserialize(&mut cur)?;
            let count = u32::deserialize(&mut cur)? as usize;
            let mut members = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let inner_id  = i64::deserialize(&mut cur)?;
                let inner_seq = i32::deserialize(&mut cur)?;
                let len       = u32::deserialize(&mut cur)? as usize;
                members.push((inner_id, inner_seq, cur.take(len)?.to_vec()));
            }
            for (inner_id, inner_seq, inner) in members {
                unwrap_at(inner_id, inner_seq, inner, max_len, out, depth + 1)?;
            }
        }
        GZIP_PACKED => {
            let packed = types::GzipPacked::from_bytes(&body)?;
            unwrap_at(msg_id, seq_no, inflate(&packed.packed_data, max_len)?, max_len, out, depth + 1)?;
        }
        types::Pong::CONSTRUCTOR_ID => {
            let pong = types::Pong::from_bytes(&body)?;
            out.push(env(Incoming::Result { req_msg_id: pong.msg_id, outcome: Ok(body) }));
        }
        types::MsgsAck::CONSTRUCTOR_ID => {
            out.push(env(Incoming::Ack(types::MsgsAck::from_bytes(&body)?.msg_ids)));
        }
        types::BadServerSalt::CONSTRUCTOR_ID => {
            let b = types::BadServerSalt::from_bytes(&body)?;
            out.push(env(Incoming::BadServerSalt { bad_msg_id: b.bad_msg_id, new_salt: b.new_server_salt }));
        }
        types::BadMsgNotification::CONSTRUCTOR_ID => {
            let b = types::BadMsgNotification::from_bytes(&body)?;
            out.push(env(Incoming::BadMsg { bad_msg_id: b.bad_msg_id, code: b.error_code }));
        }
        types::NewSessionCreated::CONSTRUCTOR_ID => {
            let n = types::NewSessionCreated::from_bytes(&body)?;
            out.push(env(Incoming::NewSession { server_salt: n.server_salt }));
        }
        types::UpdatesTooLong::CONSTRUCTOR_ID
        | types::UpdateShort::CONSTRUCTOR_ID
        | types::Updates::CONSTRUCTOR_ID => {
            out.push(env(Incoming::Updates(enums::Updates::from_bytes(&body)?)));
        }
        other => out.push(env(Incoming::Unknown(other))),
    }
    Ok(())
}

/// The `result` field of an `rpc_result`: a plain body, an `rpc_error`, or
/// either of them gzip-packed.
fn read_result(result: Vec<u8>, max_len: usize) -> Result<Result<Vec<u8>, RpcError>, InvocationError> {
    match peek_constructor(&result)? {
        GZIP_PACKED => {
            let packed = types::GzipPacked::from_bytes(&result)?;
            read_result(inflate(&packed.packed_data, max_len)?, max_len)
        }
        types::RpcError::CONSTRUCTOR_ID => {
            let e = types::RpcError::from_bytes(&result)?;
            Ok(Err(RpcError::from_telegram(e.error_code, &e.error_message)))
        }
        _ => Ok(Ok(result)),
    }
}

fn inflate(data: &[u8], max_len: usize) -> Result<Vec<u8>, InvocationError> {
    let limit = max_len as u64 + 1;
    let mut out = Vec::new();
    let gzip = flate2::read::GzDecoder::new(data).take(limit).read_to_end(&mut out);
    if gzip.is_err() || out.is_empty() {
        out.clear();
        flate2::read::ZlibDecoder::new(data)
            .take(limit)
            .read_to_end(&mut out)
            .map_err(|_| InvocationError::Deserialize("gzip_packed: decompression failed".into()))?;
    }
    if out.len() > max_len {
        return Err(InvocationError::Deserialize(format!("gzip_packed: inflates past {max_len} bytes")));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tgmedia_tl::Serializable;

    use super::*;

    const MAX: usize = 1024 * 1024;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        types::GzipPacked { packed_data: enc.finish().unwrap() }.to_bytes()
    }

    fn rpc_result(req: i64, body: &[u8]) -> Vec<u8> {
        let mut b = Vec::new();
        RPC_RESULT.serialize(&mut b);
        req.serialize(&mut b);
        b.extend_from_slice(body);
        b
    }

    fn container(items: &[(i64, i32, Vec<u8>)]) -> Vec<u8> {
        let mut b = Vec::new();
        MSG_CONTAINER.serialize(&mut b);
        (items.len() as u32).serialize(&mut b);
        for (id, seq, body) in items {
            id.serialize(&mut b);
            seq.serialize(&mut b);
            (body.len() as u32).serialize(&mut b);
            b.extend_from_slice(body);
        }
        b
    }

    #[test]
    fn container_members_keep_their_own_ids() {
        let ack = types::MsgsAck { msg_ids: vec![8] }.to_bytes();
        let res = rpc_result(8, &types::Pong { msg_id: 1, ping_id: 2 }.to_bytes());
        let body = container(&[(101, 2, ack), (105, 3, res)]);

        let mut out = Vec::new();
        unwrap(99, 0, body, MAX, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0].item, Incoming::Ack(ref ids) if ids == &[8]));
        assert_eq!(out[1].msg_id, 105);
        assert!(out[1].is_content_related());
        assert!(matches!(out[1].item, Incoming::Result { req_msg_id: 8, outcome: Ok(_) }));
    }

    #[test]
    fn gzipped_rpc_error_is_surfaced() {
        let err = types::RpcError { error_code: 420, error_message: "FLOOD_WAIT_3".into() }.to_bytes();
        let body = rpc_result(12, &gzip(&err));

        let mut out = Vec::new();
        unwrap(1, 1, body, MAX, &mut out).unwrap();
        match &out[0].item {
            Incoming::Result { req_msg_id: 12, outcome: Err(e) } => assert_eq!(e.flood_wait_seconds(), Some(3)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn gzipped_container_is_unwrapped() {
        let inner = container(&[(7, 1, rpc_result(4, &[1, 2, 3, 4]))]);
        let mut out = Vec::new();
        unwrap(1, 0, gzip(&inner), MAX, &mut out).unwrap();
        assert!(matches!(&out[0].item, Incoming::Result { req_msg_id: 4, outcome: Ok(b) } if b == &[1, 2, 3, 4]));
    }

    #[test]
    fn pong_resolves_the_ping() {
        let body = types::Pong { msg_id: 40, ping_id: 9 }.to_bytes();
        let mut out = Vec::new();
        unwrap(1, 1, body, MAX, &mut out).unwrap();
        assert!(matches!(out[0].item, Incoming::Result { req_msg_id: 40, .. }));
    }

    #[test]
    fn inflation_is_capped() {
        let body = rpc_result(3, &gzip(&vec![0u8; 64 * 1024]));
        assert!(unwrap(1, 1, body.clone(), 4096, &mut Vec::new()).is_err());
        assert!(unwrap(1, 1, body, MAX, &mut Vec::new()).is_ok());
    }

    #[test]
    fn truncated_container_is_an_error() {
        let mut body = container(&[(7, 1, vec![0; 16])]);
        body.truncate(body.len() - 4);
        assert!(unwrap(1, 0, body, MAX, &mut Vec::new()).is_err());
    }
}
