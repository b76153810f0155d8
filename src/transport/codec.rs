//! Line-delimited JSON wire codec
//!
//! One complete JSON object per line, `\n` terminated, no length prefix:
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}\n
//! ```

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::Error;

/// Sanity limit for a single line; anything larger is treated as garbage
const MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

/// Read one line from the stream, without its terminator
///
/// Returns `Ok(None)` at end of stream. Blank lines are skipped.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>, Error> {
    read_line_limited(reader, MAX_LINE_BYTES).await
}

/// `read_line` with an explicit cap on buffered line length
///
/// An oversized line is discarded up to its terminator so the next read
/// starts on a fresh line.
pub(crate) async fn read_line_limited<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    limit: usize,
) -> Result<Option<String>, Error> {
    loop {
        let mut buf = Vec::new();
        let bytes_read = (&mut *reader)
            .take(limit as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if bytes_read == 0 {
            return Ok(None);
        }

        if buf.last() != Some(&b'\n') && buf.len() > limit {
            let skipped = discard_rest_of_line(reader).await?;
            return Err(Error::MalformedResponse(format!(
                "line too large: {} bytes",
                buf.len() + skipped
            )));
        }

        let line = String::from_utf8(buf)
            .map_err(|e| Error::MalformedResponse(format!("invalid UTF-8: {}", e)))?;
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }
        return Ok(Some(line.to_string()));
    }
}

/// Consume input through the next newline without buffering it
async fn discard_rest_of_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<usize> {
    let mut skipped = 0;
    loop {
        let (consumed, done) = {
            let chunk = reader.fill_buf().await?;
            if chunk.is_empty() {
                return Ok(skipped);
            }
            match chunk.iter().position(|b| *b == b'\n') {
                Some(i) => (i + 1, true),
                None => (chunk.len(), false),
            }
        };
        reader.consume(consumed);
        skipped += consumed;
        if done {
            return Ok(skipped);
        }
    }
}

/// Write one line to the stream and flush
///
/// A closed pipe on the other end is reported as `BrokenPipe`.
pub async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<(), Error> {
    debug_assert!(!line.contains('\n'), "wire lines must not contain newlines");

    let result = async {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }
    .await;

    result.map_err(|e| match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => Error::BrokenPipe,
        _ => Error::Io(e),
    })
}
