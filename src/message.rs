//! Wire format and the text formats built on top of it.
//!
//! The wire is plain newline-terminated text:
//!
//! `<username>: <text>\n`
//!
//! There is no header, length prefix or escaping. A line received from a peer is opaque chat
//! text, whatever it looks like.

use std::io;
use std::net::SocketAddr;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::peer::PeerId;

/// Frames a byte stream into lines.
///
/// Lines end at `\n`; a `\r` right before it is dropped. Bytes that are not valid UTF-8 are
/// replaced rather than failing the connection. At end of stream, a trailing line without a
/// terminator is still delivered.
#[derive(Debug, Default)]
pub struct LineCodec {
    // Where to resume scanning for '\n', so a long partial line isn't rescanned every read.
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> LineCodec {
        LineCodec::default()
    }
}

fn into_text(mut raw: BytesMut) -> String {
    if raw.last() == Some(&b'\r') {
        raw.truncate(raw.len() - 1);
    }
    String::from_utf8_lossy(&raw).into_owned()
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        match buf[self.next_index..].iter().position(|byte| *byte == b'\n') {
            Some(offset) => {
                let end = self.next_index + offset;
                self.next_index = 0;
                let mut line = buf.split_to(end + 1);
                line.truncate(end);
                Ok(Some(into_text(line)))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split_to(buf.len());
        Ok(Some(into_text(rest)))
    }
}

impl Encoder<String> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// The line a broadcast puts on the wire.
pub fn payload(username: &str, text: &str) -> String {
    format!("{}: {}", username, text)
}

/// How a line received from a peer is shown and recorded.
pub fn incoming(peer: PeerId, addr: SocketAddr, line: &str) -> String {
    format!("[peer#{}@{}] {}", peer, addr, line)
}

/// How our own broadcast is shown and recorded.
pub fn local_echo(username: &str, text: &str) -> String {
    format!("[{}@me] {}", username, text)
}
