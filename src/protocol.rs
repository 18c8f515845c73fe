use std::io::{self, BufRead, BufReader, Read};

use crate::error::FrameError;

/// Frame terminator
pub const DELIMITER: u8 = b'\n';

/// Encodes one chat line as a wire frame: the UTF-8 text plus a single `\n`.
pub fn encode_frame(text: &str) -> Result<Vec<u8>, FrameError> {
    if text.contains('\n') {
        return Err(FrameError::EmbeddedNewline);
    }
    let mut frame = Vec::with_capacity(text.len() + 1);
    frame.extend_from_slice(text.as_bytes());
    frame.push(DELIMITER);
    Ok(frame)
}

/// Turns the raw bytes of one frame back into text.
///
/// The terminator and an optional `\r` before it are stripped. Invalid UTF-8 is
/// replaced rather than rejected so a misbehaving peer cannot stall the reader.
pub fn decode_frame(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(&[DELIMITER]).unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Reads newline-terminated frames from a byte stream
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next frame, or `None` once the stream is closed.
    ///
    /// Bytes left over without a terminator at end of stream still count as a
    /// final frame.
    pub fn next_frame(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let read = self.inner.read_until(DELIMITER, &mut self.buf)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(decode_frame(&self.buf)))
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}
