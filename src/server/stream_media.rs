//! Audio streaming of prepared media

use super::{
    session::Session,
    state::{GuardedMediaLibrary, ServerState},
};
use crate::error::JukeboxError;
use axum::{
    body::Body,
    extract::{FromRequestParts, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, BufReader, SeekFrom},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

const HEADER_IS_NORMALIZED: &str = "x-is-normalized";
const STREAM_BUFFER: usize = 4096 * 16;

/// A single `bytes=` range as sent by the client. Both ends missing means
/// the whole file, a missing start is a suffix of `end_inclusive` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start_inclusive: Option<u64>,
    end_inclusive: Option<u64>,
}

impl ByteRange {
    pub fn new(start_inclusive: Option<u64>, end_inclusive: Option<u64>) -> ByteRange {
        ByteRange {
            start_inclusive,
            end_inclusive,
        }
    }

    fn parse<S: AsRef<str>>(s: S) -> Option<ByteRange> {
        let v = s.as_ref().strip_prefix("bytes=")?;
        let (start, end) = v.split_once('-')?;
        if end.contains('-') {
            return None;
        }

        Some(ByteRange {
            start_inclusive: start.trim().parse::<u64>().ok(),
            end_inclusive: end.trim().parse::<u64>().ok(),
        })
    }

    /// Absolute `(start, end)` within a file of `file_length` bytes, or
    /// `None` when the range cannot be satisfied.
    fn resolve(&self, file_length: u64) -> Option<(u64, u64)> {
        if file_length == 0 {
            return None;
        }
        let last = file_length - 1;
        match (self.start_inclusive, self.end_inclusive) {
            (None, None) => Some((0, last)),
            (None, Some(0)) => None,
            (None, Some(suffix)) => Some((file_length.saturating_sub(suffix), last)),
            (Some(start), None) if start <= last => Some((start, last)),
            (Some(start), Some(end)) if start <= end && start <= last => {
                Some((start, end.min(last)))
            }
            _ => None,
        }
    }
}

pub struct ByteRangeExtractionError {}

impl IntoResponse for ByteRangeExtractionError {
    fn into_response(self) -> Response {
        StatusCode::BAD_REQUEST.into_response()
    }
}

impl FromRequestParts<ServerState> for Option<ByteRange> {
    type Rejection = ByteRangeExtractionError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        Ok(parts
            .headers
            .get(header::RANGE)
            .and_then(|x| x.to_str().ok())
            .and_then(ByteRange::parse))
    }
}

fn unsatisfiable(file_length: u64) -> Response {
    (
        StatusCode::RANGE_NOT_SATISFIABLE,
        [(header::CONTENT_RANGE, format!("bytes */{}", file_length))],
    )
        .into_response()
}

/// Serves the audio of a prepared media item, normalized when available.
/// `HEAD` gets the same headers without a body.
pub async fn stream_media(
    _session: Session,
    byte_range: Option<ByteRange>,
    State(library): State<GuardedMediaLibrary>,
    Path(id): Path<String>,
) -> Response {
    let audio = match library.resolve(&id).await {
        Ok(audio) => audio,
        Err(JukeboxError::NotFound(msg)) => {
            debug!("Nothing to stream: {}", msg);
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            error!("Failed to resolve media {}: {}", id, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    debug!("Streaming media {} from {}", id, audio.path.display());

    let mut file = match File::open(&audio.path).await {
        Ok(x) => x,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Audio file {} is missing", audio.path.display());
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(e) => {
            error!("Failed to open {}: {}", audio.path.display(), e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let file_length = match file.metadata().await {
        Ok(x) => x.len(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let (status_code, start, end) = match byte_range {
        None
        | Some(ByteRange {
            start_inclusive: None,
            end_inclusive: None,
        }) => (StatusCode::OK, 0, file_length.saturating_sub(1)),
        Some(range) => match range.resolve(file_length) {
            Some((start, end)) => (StatusCode::PARTIAL_CONTENT, start, end),
            None => return unsatisfiable(file_length),
        },
    };
    let chunk_size = if file_length == 0 { 0 } else { end - start + 1 };

    if start > 0 && file.seek(SeekFrom::Start(start)).await.is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let file_reader = BufReader::with_capacity(STREAM_BUFFER, file).take(chunk_size);
    let stream = ReaderStream::with_capacity(file_reader, STREAM_BUFFER);

    let mut response = Response::builder()
        .status(status_code)
        .header(header::CONTENT_TYPE, audio.content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, chunk_size)
        .header(HEADER_IS_NORMALIZED, if audio.is_normalized { "1" } else { "0" });
    if status_code == StatusCode::PARTIAL_CONTENT {
        response = response.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", start, end, file_length),
        );
    }
    match response.body(Body::from_stream(stream)) {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to build stream response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
