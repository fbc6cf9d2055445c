//! Async TCP transport over the sans-IO [`FrameCodec`].
//!
//! The stream is split once: the reader half belongs to the connection's
//! reader task, the writer half sits behind the dispatcher's write lock.

use tgmedia_mtproto::FrameCodec;
use tgmedia_mtproto::transport::Error as FrameError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::errors::InvocationError;

pub(crate) async fn connect(addr: &str, max_frame_len: usize) -> Result<(FrameReader, FrameWriter), InvocationError> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let (rd, wr) = stream.into_split();
    Ok((
        FrameReader { half: rd, codec: FrameCodec::new(max_frame_len), buf: Vec::new() },
        FrameWriter { half: wr, codec: FrameCodec::new(max_frame_len) },
    ))
}

pub(crate) struct FrameWriter {
    half:  OwnedWriteHalf,
    codec: FrameCodec,
}

impl FrameWriter {
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), InvocationError> {
        let frame = self.codec.encode_frame(payload)?;
        self.half.write_all(&frame).await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let _ = self.half.shutdown().await;
    }
}

pub(crate) struct FrameReader {
    half:  OwnedReadHalf,
    codec: FrameCodec,
    buf:   Vec<u8>,
}

impl FrameReader {
    /// Next frame payload. Frame errors come back as [`FrameError`] so the
    /// caller can tell a server error code from a broken peer.
    pub async fn recv(&mut self) -> Result<Vec<u8>, ReadError> {
        loop {
            if let Some(payload) = self.codec.decode_frame(&mut self.buf).map_err(ReadError::Frame)? {
                return Ok(payload);
            }
            let want = match self.codec.frame_len(&self.buf).map_err(ReadError::Frame)? {
                Some(total) => total - self.buf.len(),
                None => 4 - self.buf.len(),
            };
            let start = self.buf.len();
            self.buf.resize(start + want.max(1), 0);
            let n = self.half.read(&mut self.buf[start..]).await;
            let n = match n {
                Ok(n) => n,
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(ReadError::Io(e));
                }
            };
            self.buf.truncate(start + n);
            if n == 0 {
                return Err(ReadError::Closed);
            }
        }
    }
}

#[derive(Debug)]
pub(crate) enum ReadError {
    Io(std::io::Error),
    Frame(FrameError),
    /// The peer closed the stream.
    Closed,
}

impl From<ReadError> for InvocationError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Io(e)    => InvocationError::Io(e),
            ReadError::Frame(e) => InvocationError::Protocol(e),
            ReadError::Closed   => InvocationError::Dropped,
        }
    }
}
