use std::io::Read;

use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::{debug, warn};

use crate::body::{BodyStream, PeekedBody, body_from_bytes};
use crate::headers::header_contains;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
/// Bodies that inflate past this are forwarded still compressed.
pub const MAX_DECOMPRESSED_BYTES: u64 = 64 * 1024 * 1024;

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

/// Decided from headers alone; the body is never inspected.
pub fn is_streaming_response(headers: &HeaderMap) -> bool {
    header_contains(headers, &CONTENT_TYPE, "text/event-stream")
        || header_contains(headers, &TRANSFER_ENCODING, "chunked")
}

/// Decompresses successful, non-streaming responses that carry a gzip body
/// without declaring `Content-Encoding`. Every other response, and every body
/// that fails to decompress, is forwarded byte for byte.
pub async fn normalize_response(mut resp: UpstreamResponse) -> UpstreamResponse {
    if !resp.status.is_success() {
        return resp;
    }
    if has_content_encoding(&resp.headers) {
        return resp;
    }
    if is_streaming_response(&resp.headers) {
        return resp;
    }

    let peeked = PeekedBody::peek(resp.body, GZIP_MAGIC.len()).await;
    if !peeked.starts_with(&GZIP_MAGIC) {
        resp.body = peeked.into_stream();
        return resp;
    }

    let compressed = match peeked.read_to_end().await {
        Ok(bytes) => bytes,
        Err(restored) => {
            resp.body = restored;
            return resp;
        }
    };

    match gunzip(&compressed, MAX_DECOMPRESSED_BYTES) {
        Ok(decompressed) => {
            debug!(
                event = "gzip_body_decompressed",
                compressed_bytes = compressed.len(),
                decompressed_bytes = decompressed.len()
            );
            resp.headers.remove(CONTENT_ENCODING);
            resp.headers
                .insert(CONTENT_LENGTH, HeaderValue::from(decompressed.len()));
            resp.body = body_from_bytes(Bytes::from(decompressed));
        }
        Err(err) => {
            warn!(
                event = "gzip_body_decompress_failed",
                bytes = compressed.len(),
                error = %err
            );
            resp.body = body_from_bytes(compressed);
        }
    }
    resp
}

fn has_content_encoding(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .any(|value| !value.as_bytes().is_empty())
}

fn gunzip(data: &[u8], limit: u64) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    MultiGzDecoder::new(data)
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)?;
    if out.len() as u64 > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("decompressed body exceeds {limit} bytes"),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;
    use crate::body::collect_body;

    fn gzip_bytes(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn mk_resp(status: u16, headers: &[(&'static str, &'static str)], body: &[u8]) -> UpstreamResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(value));
        }
        UpstreamResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: map,
            body: body_from_bytes(Bytes::copy_from_slice(body)),
        }
    }

    struct Case {
        name: &'static str,
        status: u16,
        headers: &'static [(&'static str, &'static str)],
        body: Vec<u8>,
        want_body: Vec<u8>,
        want_ce: Option<&'static str>,
    }

    #[tokio::test]
    async fn gzip_scenarios() {
        let good_json = br#"{"ok":true}"#.to_vec();
        let good = gzip_bytes(&good_json);
        let header_only = good[..10].to_vec();
        let truncated = good[..good.len() / 2].to_vec();
        let mut corrupted = vec![0x1f, 0x8b];
        corrupted.extend_from_slice(b"notgzip");

        let cases = vec![
            Case {
                name: "decompresses_valid_gzip_no_header",
                status: 200,
                headers: &[],
                body: good.clone(),
                want_body: good_json.clone(),
                want_ce: None,
            },
            Case {
                name: "skips_when_ce_present",
                status: 200,
                headers: &[("content-encoding", "gzip")],
                body: good.clone(),
                want_body: good.clone(),
                want_ce: Some("gzip"),
            },
            Case {
                name: "passes_header_only_unchanged",
                status: 200,
                headers: &[],
                body: header_only.clone(),
                want_body: header_only,
                want_ce: None,
            },
            Case {
                name: "passes_truncated_unchanged",
                status: 200,
                headers: &[],
                body: truncated.clone(),
                want_body: truncated,
                want_ce: None,
            },
            Case {
                name: "passes_corrupted_unchanged",
                status: 200,
                headers: &[],
                body: corrupted.clone(),
                want_body: corrupted,
                want_ce: None,
            },
            Case {
                name: "non_gzip_unchanged",
                status: 200,
                headers: &[],
                body: b"plain".to_vec(),
                want_body: b"plain".to_vec(),
                want_ce: None,
            },
            Case {
                name: "empty_body",
                status: 200,
                headers: &[],
                body: Vec::new(),
                want_body: Vec::new(),
                want_ce: None,
            },
            Case {
                name: "single_byte_body",
                status: 200,
                headers: &[],
                body: vec![0x1f],
                want_body: vec![0x1f],
                want_ce: None,
            },
            Case {
                name: "skips_non_2xx_status",
                status: 404,
                headers: &[],
                body: good.clone(),
                want_body: good.clone(),
                want_ce: None,
            },
        ];

        for case in cases {
            let resp = normalize_response(mk_resp(case.status, case.headers, &case.body)).await;
            let got = collect_body(resp.body).await.unwrap();
            assert_eq!(got.as_ref(), case.want_body.as_slice(), "case {}", case.name);
            let ce = resp
                .headers
                .get(CONTENT_ENCODING)
                .map(|value| value.to_str().unwrap());
            assert_eq!(ce, case.want_ce, "case {}", case.name);
        }
    }

    #[test]
    fn gunzip_stops_at_limit() {
        let bomb = gzip_bytes(&vec![0u8; 4096]);
        assert!(bomb.len() < 4096);
        assert_eq!(gunzip(&bomb, 4096).unwrap().len(), 4096);
        let err = gunzip(&bomb, 1024).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn decompression_updates_content_length() {
        let payload = b"hello hello hello hello hello".to_vec();
        let gz = gzip_bytes(&payload);
        let mut resp = mk_resp(200, &[("content-type", "application/json")], &gz);
        resp.headers
            .insert(CONTENT_LENGTH, HeaderValue::from(gz.len()));

        let resp = normalize_response(resp).await;
        assert_eq!(
            resp.headers.get(CONTENT_LENGTH).unwrap(),
            &HeaderValue::from(payload.len())
        );
        assert_eq!(resp.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(collect_body(resp.body).await.unwrap().as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn pass_through_keeps_headers_identical() {
        let gz = gzip_bytes(b"{}");
        let headers: &[(&str, &str)] = &[
            ("content-type", "text/event-stream"),
            ("content-length", "23"),
            ("x-upstream", "1"),
        ];
        let resp = mk_resp(200, headers, &gz);
        let before = resp.headers.clone();
        let resp = normalize_response(resp).await;
        assert_eq!(resp.headers, before);
        assert_eq!(collect_body(resp.body).await.unwrap().as_ref(), gz.as_slice());
    }

    #[tokio::test]
    async fn skips_streaming_responses() {
        let gz = gzip_bytes(br#"{"ok":true}"#);
        let cases: [&[(&'static str, &'static str)]; 3] = [
            &[("content-type", "text/event-stream")],
            &[("content-type", "text/event-stream; charset=utf-8")],
            &[("transfer-encoding", "chunked")],
        ];
        for headers in cases {
            let resp = normalize_response(mk_resp(200, headers, &gz)).await;
            let got = collect_body(resp.body).await.unwrap();
            assert_eq!(got.as_ref(), gz.as_slice(), "headers {headers:?}");
        }
    }

    #[test]
    fn streaming_classification() {
        let cases: &[(&[(&'static str, &'static str)], bool)] = &[
            (&[("content-type", "text/event-stream")], true),
            (&[("content-type", "Text/Event-Stream")], true),
            (&[("transfer-encoding", "chunked")], true),
            (&[("content-type", "application/json")], false),
            (&[], false),
        ];
        for (headers, want) in cases {
            let resp = mk_resp(200, headers, b"");
            assert_eq!(is_streaming_response(&resp.headers), *want, "headers {headers:?}");
        }
    }
}
