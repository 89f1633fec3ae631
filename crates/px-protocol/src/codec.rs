//! Tokio codec for newline-delimited JSON envelopes

use std::fmt;
use std::marker::PhantomData;

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Default frame limit (16MB)
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Codec for encoding/decoding one JSON envelope per line
///
/// The same codec type is used on both ends of a connection: the control
/// plane decodes `InboundEnvelope` and encodes `OutboundEnvelope`, the backend
/// does the reverse.
pub struct EnvelopeCodec<T> {
    /// Bytes already scanned for a newline without finding one
    next_index: usize,
    /// Maximum accepted line length, excluding the newline
    max_length: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EnvelopeCodec<T> {
    /// Create a new codec with the default frame limit
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    /// Create a codec with a custom frame limit
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
            _marker: PhantomData,
        }
    }

    /// Configured frame limit
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl<T> Default for EnvelopeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EnvelopeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeCodec")
            .field("next_index", &self.next_index)
            .field("max_length", &self.max_length)
            .finish()
    }
}

impl<T: DeserializeOwned> Decoder for EnvelopeCodec<T> {
    type Item = T;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

            let Some(offset) = newline else {
                if src.len() > self.max_length {
                    return Err(ProtocolError::FrameTooLarge {
                        size: src.len(),
                        max: self.max_length,
                    });
                }
                // Need more data
                self.next_index = src.len();
                return Ok(None);
            };

            let line_end = self.next_index + offset;
            self.next_index = 0;

            if line_end > self.max_length {
                return Err(ProtocolError::FrameTooLarge {
                    size: line_end,
                    max: self.max_length,
                });
            }

            let line = src.split_to(line_end + 1);
            let line = trim_line(&line[..line_end]);
            if line.is_empty() {
                continue;
            }

            return Ok(Some(serde_json::from_slice(line)?));
        }
    }
}

impl<T: Serialize> Encoder<T> for EnvelopeCodec<T> {
    type Error = ProtocolError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;

        if payload.len() > self.max_length {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: self.max_length,
            });
        }

        dst.reserve(payload.len() + 1);
        dst.extend_from_slice(&payload);
        dst.put_u8(b'\n');

        Ok(())
    }
}

/// Strip a trailing carriage return and surrounding whitespace
fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &line[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{InboundEnvelope, OutboundEnvelope, Verb};
    use crate::request_id::RequestId;

    #[test]
    fn test_codec_encodes_one_line_per_envelope() {
        let mut codec = EnvelopeCodec::<OutboundEnvelope>::new();

        let env = OutboundEnvelope::new(RequestId::new(5), Verb::Put, "/proxies/GLOBAL")
            .with_body(r#"{"name":"node-a"}"#);

        let mut buf = BytesMut::new();
        codec.encode(env.clone(), &mut buf).unwrap();

        assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(buf.last(), Some(&b'\n'));

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, env);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = EnvelopeCodec::<InboundEnvelope>::new();

        let mut full = BytesMut::new();
        codec
            .encode(InboundEnvelope::ok(RequestId::new(1), "{}"), &mut full)
            .unwrap();

        let mut partial = full.split_to(10);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded.request_id, RequestId::new(1));
    }

    #[test]
    fn test_codec_skips_blank_lines_and_crlf() {
        let mut codec = EnvelopeCodec::<InboundEnvelope>::new();
        let mut buf = BytesMut::from(
            &b"\r\n\n{\"request_id\":4,\"success\":true,\"body\":\"ok\"}\r\n"[..],
        );

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.request_id, RequestId::new(4));
        assert_eq!(decoded.body, "ok");
    }

    #[test]
    fn test_codec_rejects_oversized_line() {
        let mut codec = EnvelopeCodec::<InboundEnvelope>::with_max_length(16);
        let mut buf = BytesMut::from(&[b'x'; 32][..]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { max: 16, .. }));
    }

    #[test]
    fn test_codec_reports_invalid_json() {
        let mut codec = EnvelopeCodec::<InboundEnvelope>::new();
        let mut buf = BytesMut::from(&b"not json\n"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::Json(_))
        ));
    }
}
