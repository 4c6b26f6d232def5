//! RESP serialization.
//!
//! Frames render straight into the caller's `BytesMut`, so a batch of
//! pipelined replies accumulates in one output buffer with no
//! intermediate allocations. Counts and integers are formatted on the
//! stack with `itoa`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::Frame;

const CRLF: &[u8] = b"\r\n";

impl Frame {
    /// Appends this frame's wire form to `out`.
    pub fn serialize(&self, out: &mut BytesMut) {
        match self {
            Frame::Simple(text) => tagged_line(out, b'+', text.as_bytes()),
            Frame::Error(message) => tagged_line(out, b'-', message.as_bytes()),
            Frame::Integer(value) => {
                let mut digits = itoa::Buffer::new();
                tagged_line(out, b':', digits.format(*value).as_bytes());
            }
            Frame::Bulk(payload) => {
                length_header(out, b'$', payload.len() as i64);
                out.put_slice(payload);
                out.put_slice(CRLF);
            }
            Frame::Array(elements) => {
                length_header(out, b'*', elements.len() as i64);
                for element in elements {
                    element.serialize(out);
                }
            }
            Frame::NullBulk => out.put_slice(b"$-1\r\n"),
            Frame::NullArray => out.put_slice(b"*-1\r\n"),
        }
    }

    /// Renders this frame into a fresh, frozen buffer. Convenience for
    /// callers that want an owned wire image, e.g. the command log.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.serialize(&mut out);
        out.freeze()
    }
}

/// Writes `<tag><body>\r\n`.
fn tagged_line(out: &mut BytesMut, tag: u8, body: &[u8]) {
    out.put_u8(tag);
    out.put_slice(body);
    out.put_slice(CRLF);
}

/// Writes `<tag><count>\r\n`, the header shared by bulk strings and
/// arrays.
fn length_header(out: &mut BytesMut, tag: u8, count: i64) {
    let mut digits = itoa::Buffer::new();
    tagged_line(out, tag, digits.format(count).as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_frame;

    /// Renders a frame and hands back the raw wire bytes.
    fn wire(frame: &Frame) -> Vec<u8> {
        frame.to_bytes().to_vec()
    }

    #[test]
    fn scalar_frames() {
        assert_eq!(wire(&Frame::Simple("OK".into())), b"+OK\r\n");
        assert_eq!(wire(&Frame::Error("ERR bad".into())), b"-ERR bad\r\n");
        assert_eq!(wire(&Frame::Integer(0)), b":0\r\n");
        assert_eq!(wire(&Frame::Integer(42)), b":42\r\n");
        assert_eq!(wire(&Frame::Integer(-1)), b":-1\r\n");
    }

    #[test]
    fn bulk_frames_carry_a_length_prefix() {
        assert_eq!(
            wire(&Frame::Bulk(Bytes::from_static(b"hello"))),
            b"$5\r\nhello\r\n"
        );
        assert_eq!(wire(&Frame::Bulk(Bytes::new())), b"$0\r\n\r\n");
    }

    #[test]
    fn both_null_forms() {
        assert_eq!(wire(&Frame::NullBulk), b"$-1\r\n");
        assert_eq!(wire(&Frame::NullArray), b"*-1\r\n");
    }

    #[test]
    fn arrays_render_elements_in_order() {
        assert_eq!(wire(&Frame::Array(vec![])), b"*0\r\n");

        let reply = Frame::Array(vec![
            Frame::Simple("first".into()),
            Frame::Integer(2),
            Frame::NullBulk,
        ]);
        assert_eq!(wire(&reply), b"*3\r\n+first\r\n:2\r\n$-1\r\n");
    }

    #[test]
    fn replies_accumulate_in_one_buffer() {
        let mut out = BytesMut::new();
        Frame::Simple("OK".into()).serialize(&mut out);
        Frame::Integer(7).serialize(&mut out);
        assert_eq!(&out[..], &b"+OK\r\n:7\r\n"[..]);
    }

    #[test]
    fn parser_inverts_the_serializer() {
        let samples = [
            Frame::Simple("PONG".into()),
            Frame::Error("WRONGTYPE nope".into()),
            Frame::Integer(i64::MIN),
            Frame::Integer(i64::MAX),
            Frame::Bulk(Bytes::from_static(b"with\x00binary\r\ndata")),
            Frame::Bulk(Bytes::new()),
            Frame::NullBulk,
            Frame::NullArray,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from_static(b"SET")),
                Frame::Bulk(Bytes::from_static(b"key")),
                Frame::Bulk(Bytes::from_static(b"value")),
            ]),
            Frame::Array(vec![
                Frame::Array(vec![Frame::NullBulk]),
                Frame::Integer(0),
            ]),
        ];

        for sample in &samples {
            let encoded = sample.to_bytes();
            let (decoded, used) = parse_frame(&encoded)
                .expect("serialized frame should parse")
                .expect("serialized frame should be complete");
            assert_eq!(&decoded, sample);
            assert_eq!(used, encoded.len());
        }
    }
}
