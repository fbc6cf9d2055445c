//! Media listing and download.
//!
//! ## Listing
//! [`MediaAccess::list_media`] returns the media-bearing messages of a chat,
//! newest first. With a [`TypeFilter`] the server-side search filter is used
//! and every returned message is checked again locally, so a lenient server
//! cannot leak other media kinds into the result.
//!
//! ## Download
//! [`MediaAccess::download_media`] locates one message, then fetches its file
//! in fixed-size chunks with a bounded pool of workers. Chunks may complete
//! in any order; a reorder buffer keyed by offset keeps writes sequential.
//! A failed or cancelled download leaves no partial file behind.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tgmedia_tl::{enums, functions, types};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::Client;
use crate::errors::MediaError;
use crate::peers::ResolvedChat;

// ─── Constants ────────────────────────────────────────────────────────────────

/// Default download chunk size (512 KiB).
pub const DOWNLOAD_CHUNK_SIZE: u32 = 512 * 1024;

/// Chunk sizes must divide this.
const CHUNK_SIZE_DIVIDES: u32 = 1024 * 1024;
/// Chunk sizes must be a multiple of this.
const CHUNK_SIZE_ALIGN: u32 = 4096;

/// Largest page `messages.getHistory` and `messages.search` return.
pub const MAX_PAGE: i32 = 100;
const DEFAULT_PAGE: i32 = 20;

// ─── Filters ──────────────────────────────────────────────────────────────────

/// Media kinds a listing can be restricted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(rename_all = "lowercase"))]
pub enum TypeFilter {
    Photo,
    Video,
    Audio,
    Document,
}

impl TypeFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo    => "photo",
            Self::Video    => "video",
            Self::Audio    => "audio",
            Self::Document => "document",
        }
    }

    fn server_filter(self) -> enums::MessagesFilter {
        match self {
            Self::Photo    => types::InputMessagesFilterPhotos {}.into(),
            Self::Video    => types::InputMessagesFilterVideo {}.into(),
            Self::Audio    => types::InputMessagesFilterMusic {}.into(),
            Self::Document => types::InputMessagesFilterDocument {}.into(),
        }
    }

    /// Local guard applied to every listed message.
    pub fn matches(self, media: &MediaDescriptor) -> bool {
        let mime = media.mime_type.as_deref().unwrap_or_default();
        match (self, media.kind) {
            (Self::Photo, MediaKind::Photo)       => true,
            (Self::Document, MediaKind::Document) => true,
            (Self::Video, MediaKind::Document)    => mime.starts_with("video/"),
            (Self::Audio, MediaKind::Document)    => mime.starts_with("audio/"),
            _ => false,
        }
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeFilter {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "photo" | "photos"          => Ok(Self::Photo),
            "video" | "videos"          => Ok(Self::Video),
            "audio" | "music"           => Ok(Self::Audio),
            "document" | "documents"    => Ok(Self::Document),
            other => Err(MediaError::InvalidInput(format!("unknown media type {other:?}"))),
        }
    }
}

// ─── Descriptors ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(rename_all = "lowercase"))]
pub enum MediaKind {
    Photo,
    Document,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo    => "photo",
            Self::Document => "document",
        }
    }
}

/// Everything needed to download one file.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MediaDescriptor {
    pub kind:           MediaKind,
    pub id:             i64,
    pub access_hash:    i64,
    pub mime_type:      Option<String>,
    pub size_bytes:     u64,
    pub file_reference: Vec<u8>,
    pub file_name:      Option<String>,
    /// Photo size type; empty for documents.
    pub thumb_size:     String,
    pub date:           i32,
}

impl MediaDescriptor {
    /// `None` for empty, unsupported or undownloadable media.
    pub fn from_media(media: &enums::MessageMedia) -> Option<Self> {
        match media {
            enums::MessageMedia::Photo(m) => {
                let enums::Photo::Photo(p) = &m.photo else { return None };
                let largest = p
                    .sizes
                    .iter()
                    .filter_map(|s| match s {
                        enums::PhotoSize::Size(s) => Some(s),
                        enums::PhotoSize::Empty(_) => None,
                    })
                    .max_by_key(|s| s.size)?;
                Some(Self {
                    kind:           MediaKind::Photo,
                    id:             p.id,
                    access_hash:    p.access_hash,
                    mime_type:      Some("image/jpeg".into()),
                    size_bytes:     largest.size.max(0) as u64,
                    file_reference: p.file_reference.clone(),
                    file_name:      None,
                    thumb_size:     largest.kind.clone(),
                    date:           p.date,
                })
            }
            enums::MessageMedia::Document(m) => {
                let enums::Document::Document(d) = &m.document else { return None };
                let file_name = d.attributes.iter().find_map(|a| match a {
                    enums::DocumentAttribute::Filename(f) if !f.file_name.is_empty() => Some(f.file_name.clone()),
                    _ => None,
                });
                Some(Self {
                    kind:           MediaKind::Document,
                    id:             d.id,
                    access_hash:    d.access_hash,
                    mime_type:      (!d.mime_type.is_empty()).then(|| d.mime_type.clone()),
                    size_bytes:     d.size.max(0) as u64,
                    file_reference: d.file_reference.clone(),
                    file_name,
                    thumb_size:     String::new(),
                    date:           d.date,
                })
            }
            enums::MessageMedia::Empty(_) | enums::MessageMedia::Unsupported(_) => None,
        }
    }

    pub fn location(&self) -> enums::InputFileLocation {
        match self.kind {
            MediaKind::Photo => types::InputPhotoFileLocation {
                id:             self.id,
                access_hash:    self.access_hash,
                file_reference: self.file_reference.clone(),
                thumb_size:     self.thumb_size.clone(),
            }
            .into(),
            MediaKind::Document => types::InputDocumentFileLocation {
                id:             self.id,
                access_hash:    self.access_hash,
                file_reference: self.file_reference.clone(),
                thumb_size:     String::new(),
            }
            .into(),
        }
    }

    /// File name used when saving into a directory.
    pub fn suggested_name(&self) -> String {
        let attr = self
            .file_name
            .as_deref()
            .and_then(|n| Path::new(n).file_name())
            .and_then(|n| n.to_str())
            .filter(|n| !n.starts_with('.'));
        if let Some(name) = attr {
            return name.to_string();
        }
        match self.kind {
            MediaKind::Photo => format!("photo_{}.jpg", self.id),
            MediaKind::Document => {
                let ext = self
                    .mime_type
                    .as_deref()
                    .and_then(mime_guess::get_mime_extensions_str)
                    .and_then(|exts| exts.first())
                    .copied()
                    .unwrap_or("bin");
                format!("{}_{}.{ext}", self.kind.as_str(), self.id)
            }
        }
    }
}

/// A message that carries downloadable media.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MediaMessage {
    pub id:    i32,
    pub date:  i32,
    /// Caption.
    pub text:  String,
    pub media: MediaDescriptor,
}

impl MediaMessage {
    pub fn from_message(message: &enums::Message) -> Option<Self> {
        let enums::Message::Message(m) = message else { return None };
        Some(Self {
            id:    m.id,
            date:  m.date,
            text:  m.message.clone(),
            media: MediaDescriptor::from_media(&m.media)?,
        })
    }
}

/// One page of a listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaPage {
    /// Newest first.
    pub items:       Vec<MediaMessage>,
    /// Pass as `offset_id` to continue; `None` once the history is exhausted.
    pub next_offset: Option<i32>,
}

// ─── Destinations ─────────────────────────────────────────────────────────────

/// Where a download goes.
pub enum DownloadTarget {
    /// Save under [`MediaDescriptor::suggested_name`] in this directory.
    Directory(PathBuf),
    /// Save to exactly this path.
    File(PathBuf),
    /// Stream into a writer. Nothing is saved.
    Writer(Box<dyn AsyncWrite + Send + Unpin>),
}

impl Default for DownloadTarget {
    fn default() -> Self { Self::Directory(std::env::temp_dir()) }
}

impl fmt::Debug for DownloadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(p) => f.debug_tuple("Directory").field(p).finish(),
            Self::File(p)      => f.debug_tuple("File").field(p).finish(),
            Self::Writer(_)    => f.write_str("Writer(..)"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved { path: PathBuf, bytes: u64 },
    Streamed { bytes: u64 },
}

impl DownloadOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Saved { bytes, .. } | Self::Streamed { bytes } => *bytes,
        }
    }
}

/// Chunking and concurrency of downloads.
#[derive(Clone, Debug)]
pub struct DownloadConfig {
    /// Bytes per `upload.getFile`; a multiple of 4 KiB that divides 1 MiB.
    pub chunk_size:    u32,
    /// Chunks in flight at once.
    pub workers:       usize,
    /// Extra attempts per chunk after a timeout, a dropped connection or
    /// `FLOOD_WAIT`. Other errors fail the download at once.
    pub chunk_retries: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self { chunk_size: DOWNLOAD_CHUNK_SIZE, workers: 4, chunk_retries: 3 }
    }
}

impl DownloadConfig {
    pub fn validate(&self) -> Result<(), MediaError> {
        let size = self.chunk_size;
        if size == 0 || size % CHUNK_SIZE_ALIGN != 0 || CHUNK_SIZE_DIVIDES % size != 0 {
            return Err(MediaError::InvalidInput(format!(
                "chunk size {size} must be a multiple of 4096 that divides 1048576"
            )));
        }
        if self.workers == 0 {
            return Err(MediaError::InvalidInput("download needs at least one worker".into()));
        }
        Ok(())
    }
}

// ─── Partial files ────────────────────────────────────────────────────────────

/// A download in progress. Bytes go to `<name>.part` next to the
/// destination, which is only replaced on commit; on drop the `.part` file
/// is removed and the destination is left as it was.
struct PartialFile {
    file: tokio::fs::File,
    temp: PathBuf,
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    async fn create(path: PathBuf) -> Result<Self, MediaError> {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".part");
        let temp = path.with_file_name(name);
        let file = tokio::fs::File::create(&temp).await?;
        Ok(Self { file, temp, path, keep: false })
    }

    async fn commit(mut self) -> Result<PathBuf, MediaError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        tokio::fs::rename(&self.temp, &self.path).await?;
        self.keep = true;
        Ok(self.path.clone())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.keep {
            debug!("[tgmedia] removing partial file {}", self.temp.display());
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

enum Sink {
    File(PartialFile),
    Writer(Box<dyn AsyncWrite + Send + Unpin>),
}

impl Sink {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), MediaError> {
        match self {
            Self::File(f)   => f.file.write_all(bytes).await?,
            Self::Writer(w) => w.write_all(bytes).await?,
        }
        Ok(())
    }
}

// ─── Download task ────────────────────────────────────────────────────────────

/// One running download.
struct DownloadTask<'a> {
    descriptor:        &'a MediaDescriptor,
    sink:              Sink,
    bytes_transferred: u64,
}

impl DownloadTask<'_> {
    async fn run(mut self, client: &Client, cfg: &DownloadConfig) -> Result<DownloadOutcome, MediaError> {
        let chunk = u64::from(cfg.chunk_size);
        let known = self.descriptor.size_bytes;
        let mut end = (known > 0).then_some(known);
        let mut next_offset = 0u64;
        let mut reorder: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
        let mut workers = JoinSet::new();

        loop {
            while workers.len() < cfg.workers && next_offset < end.unwrap_or(u64::MAX) {
                let client   = client.clone();
                let location = self.descriptor.location();
                let offset   = next_offset;
                let limit    = cfg.chunk_size;
                let retries  = cfg.chunk_retries;
                workers.spawn(async move { (offset, client.fetch_chunk(location, offset, limit, retries).await) });
                next_offset += chunk;
            }

            let Some(joined) = workers.join_next().await else { break };
            let (offset, result) = joined.map_err(|e| MediaError::FetchFailed {
                offset: self.bytes_transferred,
                reason: format!("chunk worker: {e}"),
            })?;
            let bytes = result?;

            let len = bytes.len() as u64;
            if len < chunk {
                let stop = offset + len;
                end = Some(end.map_or(stop, |e| e.min(stop)));
            }
            if len > 0 {
                reorder.insert(offset, bytes);
            }
            while let Some(bytes) = reorder.remove(&self.bytes_transferred) {
                self.sink.write_all(&bytes).await?;
                self.bytes_transferred += bytes.len() as u64;
            }
        }

        let written = self.bytes_transferred;
        if written == 0 {
            return Err(MediaError::FetchFailed { offset: 0, reason: "server returned an empty file".into() });
        }
        if known > 0 && written != known {
            return Err(MediaError::FetchFailed {
                offset: written,
                reason: format!("expected {known} bytes, got {written}"),
            });
        }

        match self.sink {
            Sink::File(f) => {
                let path = f.commit().await?;
                Ok(DownloadOutcome::Saved { path, bytes: written })
            }
            Sink::Writer(mut w) => {
                w.flush().await?;
                Ok(DownloadOutcome::Streamed { bytes: written })
            }
        }
    }
}

// ─── MediaAccess ──────────────────────────────────────────────────────────────

/// Media listing and download.
pub trait MediaAccess {
    /// Media-bearing messages of `chat`, newest first.
    ///
    /// `limit` outside `1..=100` is replaced by 20. Starts below
    /// `offset_id` when it is non-zero.
    fn list_media(
        &self,
        chat:      &str,
        filter:    Option<TypeFilter>,
        offset_id: i32,
        limit:     i32,
    ) -> impl Future<Output = Result<Vec<MediaMessage>, MediaError>> + Send;

    /// Download the media of one message.
    fn download_media(
        &self,
        chat:       &str,
        message_id: i32,
        target:     DownloadTarget,
    ) -> impl Future<Output = Result<DownloadOutcome, MediaError>> + Send;

    fn format_size(&self, bytes: i64, precision: usize) -> String {
        crate::format::format_size(bytes, precision)
    }
}

impl MediaAccess for Client {
    async fn list_media(
        &self,
        chat:      &str,
        filter:    Option<TypeFilter>,
        offset_id: i32,
        limit:     i32,
    ) -> Result<Vec<MediaMessage>, MediaError> {
        Ok(self.list_media_page(chat, filter, offset_id, limit).await?.items)
    }

    async fn download_media(
        &self,
        chat:       &str,
        message_id: i32,
        target:     DownloadTarget,
    ) -> Result<DownloadOutcome, MediaError> {
        let descriptor = self.locate(chat, message_id).await?;
        self.fetch(&descriptor, target).await
    }
}

impl Client {
    /// Like [`MediaAccess::list_media`], with the offset of the next page.
    pub async fn list_media_page(
        &self,
        chat:      &str,
        filter:    Option<TypeFilter>,
        offset_id: i32,
        limit:     i32,
    ) -> Result<MediaPage, MediaError> {
        let resolved = self.resolve_chat(chat).await?;
        self.history_page(&resolved, filter, offset_id, limit).await
    }

    async fn history_page(
        &self,
        chat:      &ResolvedChat,
        filter:    Option<TypeFilter>,
        offset_id: i32,
        limit:     i32,
    ) -> Result<MediaPage, MediaError> {
        let limit = if (1..=MAX_PAGE).contains(&limit) { limit } else { DEFAULT_PAGE };
        let offset_id = offset_id.max(0);

        let raw = match filter {
            Some(f) => {
                let req = functions::messages::Search {
                    peer: chat.peer.clone(),
                    q: String::new(),
                    filter: f.server_filter(),
                    min_date: 0,
                    max_date: 0,
                    offset_id,
                    add_offset: 0,
                    limit,
                    max_id: 0,
                    min_id: 0,
                    hash: 0,
                };
                self.invoke(&req).await?
            }
            None => {
                let req = functions::messages::GetHistory {
                    peer: chat.peer.clone(),
                    offset_id,
                    offset_date: 0,
                    add_offset: 0,
                    limit,
                    max_id: 0,
                    min_id: 0,
                    hash: 0,
                };
                self.invoke(&req).await?
            }
        }
        .into_messages();

        let next_offset = if raw.len() >= limit as usize {
            raw.iter().map(enums::Message::id).min()
        } else {
            None
        };

        let mut items: Vec<MediaMessage> = raw
            .iter()
            .filter_map(MediaMessage::from_message)
            .filter(|m| filter.is_none_or(|f| f.matches(&m.media)))
            .collect();
        items.sort_by(|a, b| b.id.cmp(&a.id));
        debug!("[tgmedia] listed {} media message(s) of {} fetched", items.len(), raw.len());

        Ok(MediaPage { items, next_offset })
    }

    /// Find the media of one message.
    pub async fn locate(&self, chat: &str, message_id: i32) -> Result<MediaDescriptor, MediaError> {
        if message_id <= 0 {
            return Err(MediaError::InvalidInput(format!("message id must be positive, got {message_id}")));
        }
        let resolved = self.resolve_chat(chat).await?;
        let id = vec![types::InputMessageId { id: message_id }];
        let messages = match resolved.channel {
            Some(channel) => self.invoke(&functions::channels::GetMessages { channel, id }).await?,
            None => self.invoke(&functions::messages::GetMessages { id }).await?,
        }
        .into_messages();

        let message = messages
            .into_iter()
            .find(|m| m.id() == message_id && !matches!(m, enums::Message::Empty(_)))
            .ok_or(MediaError::MessageNotFound { message_id })?;
        let media = match &message {
            enums::Message::Message(m) => MediaDescriptor::from_media(&m.media),
            _ => None,
        };
        media.ok_or(MediaError::NoMediaPayload { message_id })
    }

    /// Download `descriptor` into `target`.
    pub async fn fetch(&self, descriptor: &MediaDescriptor, target: DownloadTarget) -> Result<DownloadOutcome, MediaError> {
        let cfg = &self.inner.config.download;
        cfg.validate()?;

        let sink = match target {
            DownloadTarget::Directory(dir) => {
                tokio::fs::create_dir_all(&dir).await?;
                Sink::File(PartialFile::create(dir.join(descriptor.suggested_name())).await?)
            }
            DownloadTarget::File(path) => Sink::File(PartialFile::create(path).await?),
            DownloadTarget::Writer(w) => Sink::Writer(w),
        };
        debug!(
            "[tgmedia] downloading {} {} ({} bytes)",
            descriptor.kind.as_str(),
            descriptor.id,
            descriptor.size_bytes
        );

        let task = DownloadTask { descriptor, sink, bytes_transferred: 0 };
        let outcome = task.run(self, cfg).await?;
        if let DownloadOutcome::Saved { path, bytes } = &outcome {
            info!("[tgmedia] Saved {} ({})", path.display(), crate::format::format_size(*bytes as i64, 2));
        }
        Ok(outcome)
    }

    /// Download every photo and document in `chat` into `dir`, walking the
    /// history 100 messages at a time. Chunks that keep failing are logged
    /// and skipped; other errors stop the walk.
    pub async fn download_all(
        &self,
        chat: &str,
        dir:  impl Into<PathBuf>,
    ) -> Result<Vec<(i32, Result<DownloadOutcome, MediaError>)>, MediaError> {
        let dir = dir.into();
        let resolved = self.resolve_chat(chat).await?;
        let mut results = Vec::new();
        let mut offset_id = 0;

        loop {
            let page = self.history_page(&resolved, None, offset_id, MAX_PAGE).await?;
            for item in &page.items {
                match self.fetch(&item.media, DownloadTarget::Directory(dir.clone())).await {
                    Err(e @ MediaError::FetchFailed { .. }) => {
                        warn!("[tgmedia] message {} skipped: {e}", item.id);
                        results.push((item.id, Err(e)));
                    }
                    Err(e) => return Err(e),
                    Ok(outcome) => results.push((item.id, Ok(outcome))),
                }
            }
            match page.next_offset {
                Some(next) => offset_id = next,
                None => break,
            }
        }
        Ok(results)
    }

    /// One chunk, with at most `retries` extra attempts. Only connection
    /// failures, timeouts and `FLOOD_WAIT` are retried.
    async fn fetch_chunk(
        &self,
        location: enums::InputFileLocation,
        offset:   u64,
        limit:    u32,
        retries:  u32,
    ) -> Result<Vec<u8>, MediaError> {
        let req = functions::upload::GetFile { location, offset: offset as i64, limit: limit as i32 };
        let mut attempt = 0u32;
        loop {
            let error = match self.invoke_once(&req).await {
                Ok(file) => return Ok(file.bytes),
                Err(e) => e,
            };
            let delay = match error.flood_wait_seconds() {
                Some(secs) => Duration::from_secs(secs),
                None if error.is_transient() => Duration::from_millis(100 * u64::from(attempt + 1)),
                None => return Err(MediaError::FetchFailed { offset, reason: error.to_string() }),
            };
            attempt += 1;
            if attempt > retries {
                return Err(MediaError::FetchFailed { offset, reason: error.to_string() });
            }
            debug!("[tgmedia] chunk at {offset} failed ({error}), retry {attempt}/{retries} in {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }
}
