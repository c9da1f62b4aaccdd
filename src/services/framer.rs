//! Builds stream responses: status, headers and a body fed by the transfer
//! engine. Never touches the catalog.

use crate::{
    errors::AppError,
    models::video::VideoRecord,
    services::{
        range::{ByteRange, RangeRequest},
        transfer::{TransferError, TransferPlan},
    },
};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::Stream;

/// The two successful response shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// 200 with the whole resource.
    Full { total: u64 },
    /// 206 with one interval.
    Partial(ByteRange),
}

impl Framing {
    pub fn new(request: RangeRequest, total: u64) -> Self {
        match request {
            RangeRequest::NoRange => Framing::Full { total },
            RangeRequest::Partial(range) => Framing::Partial(range),
        }
    }

    /// The transfer that produces this response's body.
    pub fn plan(&self) -> TransferPlan {
        match self {
            Framing::Full { total } => TransferPlan::whole(*total),
            Framing::Partial(range) => TransferPlan::for_range(range),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Framing::Full { .. } => StatusCode::OK,
            Framing::Partial(_) => StatusCode::PARTIAL_CONTENT,
        }
    }

    /// Value of `Content-Length`.
    pub fn content_length(&self) -> u64 {
        match self {
            Framing::Full { total } => *total,
            Framing::Partial(range) => range.len(),
        }
    }

    /// Assemble the response around `body`.
    pub fn into_response<S>(self, record: &VideoRecord, body: S) -> Response
    where
        S: Stream<Item = Result<Bytes, TransferError>> + Send + 'static,
    {
        let mut response = Response::new(Body::from_stream(body));
        *response.status_mut() = self.status();

        let headers = response.headers_mut();
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.content_length()));
        if let Framing::Partial(range) = self {
            if let Ok(value) = HeaderValue::from_str(&range.content_range()) {
                headers.insert(header::CONTENT_RANGE, value);
            }
        }
        set_video_headers(headers, record);

        response
    }
}

/// 416 with `Content-Range: bytes */{total}`.
pub fn unsatisfiable_response(total: u64) -> Response {
    let mut response = AppError::range_not_satisfiable(total).into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total)) {
        response.headers_mut().insert(header::CONTENT_RANGE, value);
    }
    response
        .headers_mut()
        .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response
}

fn set_video_headers(headers: &mut HeaderMap, record: &VideoRecord) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    let quoted = format!("\"{}\"", record.etag);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    let last_modified = record
        .created_at
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn record() -> VideoRecord {
        VideoRecord {
            id: Uuid::new_v4(),
            original_filename: "a.mp4".into(),
            stored_filename: "a.mp4".into(),
            size_bytes: 1000,
            content_type: "video/mp4".into(),
            etag: "abc".into(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn no_body() -> impl Stream<Item = Result<Bytes, TransferError>> + Send + 'static {
        futures::stream::empty()
    }

    fn header<'a>(response: &'a Response, name: header::HeaderName) -> &'a str {
        response.headers().get(name).unwrap().to_str().unwrap()
    }

    #[test]
    fn full_framing_headers() {
        let framing = Framing::new(RangeRequest::NoRange, 1000);
        assert_eq!(framing.plan(), TransferPlan::whole(1000));

        let response = framing.into_response(&record(), no_body());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, header::CONTENT_LENGTH), "1000");
        assert_eq!(header(&response, header::ACCEPT_RANGES), "bytes");
        assert_eq!(header(&response, header::CONTENT_TYPE), "video/mp4");
        assert_eq!(header(&response, header::ETAG), "\"abc\"");
        assert_eq!(
            header(&response, header::LAST_MODIFIED),
            "Fri, 01 Mar 2024 12:00:00 GMT"
        );
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
    }

    #[test]
    fn partial_framing_headers() {
        let range = ByteRange::new(100, 199, 1000).unwrap();
        let framing = Framing::new(RangeRequest::Partial(range), 1000);
        assert_eq!(framing.plan().len(), 100);

        let response = framing.into_response(&record(), no_body());
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(header(&response, header::CONTENT_LENGTH), "100");
        assert_eq!(header(&response, header::CONTENT_RANGE), "bytes 100-199/1000");
    }

    #[test]
    fn unsatisfiable_carries_total() {
        let response = unsatisfiable_response(1000);
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(header(&response, header::CONTENT_RANGE), "bytes */1000");
    }
}
