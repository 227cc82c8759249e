use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>;

pub fn body_from_bytes(bytes: Bytes) -> BodyStream {
    if bytes.is_empty() {
        return Box::pin(stream::empty());
    }
    Box::pin(stream::once(async move { Ok(bytes) }))
}

pub fn body_from_stream<S>(stream: S) -> BodyStream
where
    S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
{
    Box::pin(stream)
}

/// A body whose first bytes have been read ahead.
///
/// Nothing read during the peek is lost: [`PeekedBody::into_stream`] replays the
/// buffered chunks (and a read error, if one cut the peek short) before the
/// untouched remainder.
pub struct PeekedBody {
    chunks: Vec<Bytes>,
    len: usize,
    error: Option<io::Error>,
    rest: BodyStream,
}

impl PeekedBody {
    /// Reads until at least `want` bytes are buffered or the body ends.
    pub async fn peek(mut body: BodyStream, want: usize) -> Self {
        let mut chunks = Vec::new();
        let mut len = 0;
        let mut error = None;
        while len < want {
            match body.next().await {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    len += chunk.len();
                    chunks.push(chunk);
                }
                Some(Err(err)) => {
                    error = Some(err);
                    break;
                }
                None => break,
            }
        }
        Self {
            chunks,
            len,
            error,
            rest: body,
        }
    }

    /// Number of bytes read ahead. May exceed the requested amount when the
    /// underlying stream yields large chunks.
    pub fn buffered_len(&self) -> usize {
        self.len
    }

    /// True when at least `prefix.len()` bytes were read and they match.
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        if self.len < prefix.len() {
            return false;
        }
        let mut matched = 0;
        for chunk in &self.chunks {
            for byte in chunk.iter() {
                if matched == prefix.len() {
                    return true;
                }
                if *byte != prefix[matched] {
                    return false;
                }
                matched += 1;
            }
        }
        matched == prefix.len()
    }

    pub fn into_stream(self) -> BodyStream {
        let head = stream::iter(self.chunks.into_iter().map(Ok));
        match self.error {
            Some(err) => Box::pin(
                head.chain(stream::once(async move { Err(err) }))
                    .chain(self.rest),
            ),
            None => Box::pin(head.chain(self.rest)),
        }
    }

    /// Buffers the whole body. On a read error the returned stream replays
    /// everything read so far, then the error, then whatever the source still
    /// yields.
    pub async fn read_to_end(self) -> Result<Bytes, BodyStream> {
        let mut buf = BytesMut::with_capacity(self.len);
        for chunk in &self.chunks {
            buf.extend_from_slice(chunk);
        }
        if let Some(err) = self.error {
            return Err(replay(buf.freeze(), err, self.rest));
        }
        let mut rest = self.rest;
        while let Some(item) = rest.next().await {
            match item {
                Ok(chunk) => buf.extend_from_slice(&chunk),
                Err(err) => return Err(replay(buf.freeze(), err, rest)),
            }
        }
        Ok(buf.freeze())
    }
}

fn replay(read: Bytes, err: io::Error, rest: BodyStream) -> BodyStream {
    Box::pin(
        body_from_bytes(read)
            .chain(stream::once(async move { Err(err) }))
            .chain(rest),
    )
}

pub async fn collect_body(mut body: BodyStream) -> Result<Bytes, io::Error> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked(parts: &[&'static [u8]]) -> BodyStream {
        let items: Vec<Result<Bytes, io::Error>> = parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part)))
            .collect();
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn peek_across_single_byte_chunks_keeps_everything() {
        let peeked = PeekedBody::peek(chunked(&[b"\x1f", b"\x8b", b"rest"]), 2).await;
        assert_eq!(peeked.buffered_len(), 2);
        assert!(peeked.starts_with(&[0x1f, 0x8b]));
        let all = collect_body(peeked.into_stream()).await.unwrap();
        assert_eq!(&all[..], b"\x1f\x8brest");
    }

    #[tokio::test]
    async fn short_body_reports_no_prefix_match() {
        let peeked = PeekedBody::peek(chunked(&[b"\x1f"]), 2).await;
        assert_eq!(peeked.buffered_len(), 1);
        assert!(!peeked.starts_with(&[0x1f, 0x8b]));
        let all = collect_body(peeked.into_stream()).await.unwrap();
        assert_eq!(&all[..], b"\x1f");
    }

    #[tokio::test]
    async fn empty_chunks_are_skipped_while_peeking() {
        let peeked = PeekedBody::peek(chunked(&[b"", b"ab", b"c"]), 2).await;
        assert!(peeked.starts_with(b"ab"));
        assert_eq!(peeked.read_to_end().await.ok().unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn read_error_replays_consumed_bytes_first() {
        let items: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
            Err(io::Error::other("reset")),
        ];
        let peeked = PeekedBody::peek(Box::pin(stream::iter(items)), 2).await;
        let Err(mut restored) = peeked.read_to_end().await else {
            panic!("expected read error");
        };
        assert_eq!(
            restored.next().await.unwrap().unwrap(),
            Bytes::from_static(b"abcd")
        );
        assert!(restored.next().await.unwrap().is_err());
        assert!(restored.next().await.is_none());
    }
}
