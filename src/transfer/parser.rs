// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Heuristic classification of croc output lines.
//!
//! croc's text is meant for humans and changes between releases, so every
//! rule here is best effort. Rules are tried in a fixed order and the first
//! match wins; a line no rule recognizes still yields an event carrying the
//! raw text.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::events::{Phase, TransferKind, TransferProgress};
use crate::utils::now_millis;

static CODE_ANNOUNCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:code-phrase|receive code|code)\b(?:\s+is)?\s*([:=])?\s*([A-Za-z0-9-]{6,})")
        .expect("code regex is valid")
});

static CODE_ENV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"CROC_SECRET=["']?([A-Za-z0-9-]{6,})"#).expect("code env regex is valid")
});

/// croc's progress bar, e.g.
/// `a.txt  42% |████      | (4.2/10 MB, 1.2 MB/s) [3s:5s]`
static CROC_BAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<name>.*?)\s*
        (?P<pct>\d{1,3}(?:\.\d+)?)%\s*\|[^|]*\|\s*
        \(\s*(?P<done>[\d.]+)\s*(?P<done_unit>[kKMGT]?i?B)?\s*/\s*
        (?P<total>[\d.]+)\s*(?P<unit>[kKMGT]?i?B)\s*
        (?:,\s*(?P<rate>[^)]*?))?\s*\)
        (?:\s*\[(?P<elapsed>[^:\]]*):(?P<eta>[^\]]*)\])?",
    )
    .expect("progress bar regex is valid")
});

/// Condensed form: `50% | 1.2 MB/s | 10s`
static SIMPLE_PROGRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<pct>\d{1,3}(?:\.\d+)?)%\s*\|\s*(?P<speed>[^|]*?)\s*\|\s*(?P<eta>[^|]*?)\s*$")
        .expect("simple progress regex is valid")
});

static CONNECTING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)connect|establish").expect("connecting regex is valid"));

static SENDING_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsending\s+(?:file\s+)?(?:'(?P<q1>[^']+)'|"(?P<q2>[^"]+)"|(?P<bare>[^\s'"]+\.[A-Za-z0-9]+)\b)"#)
        .expect("sending regex is valid")
});

static RECEIVING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)receiv").expect("receiving regex is valid"));

static RECEIVING_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\breceiving\s+(?:'(?P<q1>[^']+)'|"(?P<q2>[^"]+)")"#).expect("receiving file regex is valid")
});

static DONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:done|complete)").expect("done regex is valid"));

static FAILED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error|failed|time(?:d)?\s?out").expect("failed regex is valid"));

/// What the parser remembers about one session between lines.
#[derive(Debug, Clone)]
pub struct ParseState {
    pub id: String,
    pub kind: TransferKind,
    pub code: Option<String>,
    pub file_name: Option<String>,
    pub bytes_transferred: Option<u64>,
}

impl ParseState {
    pub fn new(id: impl Into<String>, kind: TransferKind) -> Self {
        Self {
            id: id.into(),
            kind,
            code: None,
            file_name: None,
            bytes_transferred: None,
        }
    }
}

/// Turns one trimmed, non-empty line into at most one progress event.
pub trait LineParser: Send + Sync {
    fn parse(&self, state: &mut ParseState, line: &str) -> Option<TransferProgress>;
}

/// The default regex rule table.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicParser;

impl LineParser for HeuristicParser {
    fn parse(&self, state: &mut ParseState, line: &str) -> Option<TransferProgress> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let mut event = TransferProgress::new(state.id.clone(), state.kind, state.kind.active_phase(), now_millis());
        event.raw = Some(line.to_string());

        if let Some(code) = extract_code(line) {
            state.code = Some(code.clone());
            event.code = Some(code);
            event.message = Some(line.to_string());
        } else if let Some(caps) = CROC_BAR.captures(line) {
            fill_percent(&mut event, &caps);
            event.speed = non_empty(caps.name("rate").map(|m| m.as_str()));
            event.eta = non_empty(caps.name("eta").map(|m| m.as_str()));
            if let Some(bytes) = bar_bytes(&caps) {
                state.bytes_transferred = Some(bytes);
            }
            if let Some(name) = non_empty(caps.name("name").map(|m| m.as_str())) {
                state.file_name = Some(name);
            }
            event.file_name = state.file_name.clone();
        } else if let Some(caps) = SIMPLE_PROGRESS.captures(line) {
            fill_percent(&mut event, &caps);
            event.speed = non_empty(caps.name("speed").map(|m| m.as_str()));
            event.eta = non_empty(caps.name("eta").map(|m| m.as_str()));
            event.file_name = state.file_name.clone();
        } else if CONNECTING.is_match(line) {
            event.phase = Phase::Connecting;
            event.message = Some(line.to_string());
        } else if let Some(name) = sending_file(state.kind, line) {
            event.phase = Phase::Sending;
            state.file_name = Some(name.clone());
            event.file_name = Some(name);
            event.message = Some(line.to_string());
        } else if state.kind == TransferKind::Receive && RECEIVING.is_match(line) {
            event.phase = Phase::Receiving;
            if let Some(name) = RECEIVING_FILE.captures(line).and_then(|c| quoted(&c)) {
                state.file_name = Some(name);
            }
            event.file_name = state.file_name.clone();
            event.message = Some(line.to_string());
        } else if DONE.is_match(line) {
            event.phase = Phase::Done;
            event.message = Some(line.to_string());
        } else if FAILED.is_match(line) {
            event.phase = Phase::Failed;
            event.message = Some(line.to_string());
        } else {
            event.message = Some(line.to_string());
        }

        Some(event)
    }
}

/// After `:` or `=` any token is the code. Without a separator the token
/// must contain a digit or hyphen, so prose like "code phrase" is skipped.
fn extract_code(line: &str) -> Option<String> {
    let looks_like_code = |token: &str| token.chars().any(|c| c.is_ascii_digit() || c == '-');

    let announced = CODE_ANNOUNCE.captures_iter(line).filter_map(|c| {
        let token = c[2].trim_end_matches('-').to_string();
        (c.get(1).is_some() || looks_like_code(&token)).then_some(token)
    });
    let from_env = CODE_ENV
        .captures_iter(line)
        .map(|c| c[1].trim_end_matches('-').to_string());

    announced.chain(from_env).find(|token| token.len() >= 6)
}

fn sending_file(kind: TransferKind, line: &str) -> Option<String> {
    if kind != TransferKind::Send {
        return None;
    }
    let caps = SENDING_FILE.captures(line)?;
    quoted(&caps).or_else(|| caps.name("bare").map(|m| m.as_str().to_string()))
}

fn quoted(caps: &Captures<'_>) -> Option<String> {
    caps.name("q1")
        .or_else(|| caps.name("q2"))
        .map(|m| m.as_str().to_string())
}

fn fill_percent(event: &mut TransferProgress, caps: &Captures<'_>) {
    event.percent = caps
        .name("pct")
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|p| p.clamp(0.0, 100.0));
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Bytes done from the `(done/total unit, ...)` group. The unit after `done`
/// wins when present, otherwise the total's unit applies to both.
fn bar_bytes(caps: &Captures<'_>) -> Option<u64> {
    let done: f64 = caps.name("done")?.as_str().parse().ok()?;
    let unit = caps.name("done_unit").or_else(|| caps.name("unit"))?.as_str();
    Some((done * unit_multiplier(unit)).round() as u64)
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "KiB" | "kiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    }
}
