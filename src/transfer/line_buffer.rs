// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Chunk-to-line assembly for subprocess output.
//!
//! Progress bars redraw with a bare `\r`, so both `\r` and `\n` end a line.
//! A trailing fragment is held until its terminator arrives, or until
//! [`LineBuffer::finish`] at end of stream. A fragment that outgrows the cap
//! is emitted as a line of its own.

/// Longest fragment held while waiting for a terminator.
pub const MAX_PENDING: usize = 64 * 1024;

/// Per-stream line assembler. Works on bytes so a UTF-8 sequence split
/// across reads is reassembled before decoding.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_pending: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_pending(MAX_PENDING)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_pending: max_pending.max(4),
        }
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines: Vec<String> = match self.pending.iter().rposition(|b| *b == b'\n' || *b == b'\r') {
            Some(last_break) => {
                let rest = self.pending.split_off(last_break + 1);
                let complete = std::mem::replace(&mut self.pending, rest);
                complete
                    .split(|b| *b == b'\n' || *b == b'\r')
                    .filter_map(clean_line)
                    .collect()
            }
            None => Vec::new(),
        };

        while self.pending.len() > self.max_pending {
            // Never cut inside a UTF-8 sequence
            let mut cut = self.max_pending;
            while cut > 0 && (self.pending[cut] & 0xC0) == 0x80 {
                cut -= 1;
            }
            if cut == 0 {
                cut = self.max_pending;
            }
            let rest = self.pending.split_off(cut);
            let forced = std::mem::replace(&mut self.pending, rest);
            tracing::debug!("Unterminated output exceeded {} bytes, emitting it as a line", self.max_pending);
            lines.extend(clean_line(&forced));
        }

        lines
    }

    /// Flush the held-back fragment at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.pending);
        clean_line(&tail)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Strip ANSI escapes, decode, trim; `None` for blank lines.
fn clean_line(raw: &[u8]) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let stripped = strip_ansi_escapes::strip(raw);
    let text = String::from_utf8_lossy(&stripped);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
