use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Default cap on a single log line. Longer lines are skipped, not parsed.
pub const DEFAULT_MAX_LINE_BYTES: usize = 256 * 1024;

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// One newline-terminated line. `bytes` is empty when `truncated` is set.
#[derive(Debug, Clone, Copy)]
pub struct Line<'a> {
    pub bytes: &'a [u8],
    pub truncated: bool,
}

impl Line<'_> {
    pub fn contains(&self, needle: &str) -> bool {
        let needle = needle.as_bytes();
        !needle.is_empty()
            && self.bytes.len() >= needle.len()
            && self.bytes.windows(needle.len()).any(|w| w == needle)
    }
}

/// Feed every complete line from `offset` onward to `on_line` and return the
/// offset just past the last newline seen. A trailing unterminated line is
/// left for the next call.
pub fn scan_lines<F>(path: &Path, offset: u64, max_line_bytes: usize, mut on_line: F) -> Result<u64>
where
    F: FnMut(Line<'_>),
{
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset))
            .with_context(|| format!("Failed to seek {} to {}", path.display(), offset))?;
    }
    let mut reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);

    let mut consumed = offset;
    let mut pending: Vec<u8> = Vec::new();
    let mut pending_len: u64 = 0;
    let mut truncated = false;

    loop {
        let chunk = reader
            .fill_buf()
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if chunk.is_empty() {
            break;
        }

        let newline = chunk.iter().position(|b| *b == b'\n');
        let part_len = newline.unwrap_or(chunk.len());
        let part = &chunk[..part_len];

        if !truncated {
            if pending.len() + part.len() > max_line_bytes {
                truncated = true;
                pending.clear();
            } else {
                pending.extend_from_slice(part);
            }
        }
        pending_len += part_len as u64;

        match newline {
            Some(idx) => {
                let mut bytes = pending.as_slice();
                if let Some(stripped) = bytes.strip_suffix(b"\r") {
                    bytes = stripped;
                }
                on_line(Line { bytes, truncated });
                consumed += pending_len + 1;
                pending.clear();
                pending_len = 0;
                truncated = false;
                reader.consume(idx + 1);
            }
            None => reader.consume(part_len),
        }
    }

    Ok(consumed)
}
