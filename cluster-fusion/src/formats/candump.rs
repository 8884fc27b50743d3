//! candump text log parser
//!
//! Accepts the two layouts produced by `candump` from can-utils:
//!
//! - default / `-ta`:  `(1700000000.123456)  can0  123   [8]  11 00 00 00 00 00 00 00`
//!   (the timestamp column is optional)
//! - log file `-L`:    `(1700000000.123456) can0 123#1100000000000000`
//!
//! Remote frames (`remote request`, `123#R`) are kept with an empty payload.
//! Blank lines and `#` comments are skipped.

use super::LogFileParser;
use crate::types::{CanFrame, FusionError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// Largest 29-bit extended identifier
const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// candump log file parser
pub struct CandumpParser;

impl CandumpParser {
    /// Open a candump log and return an iterator over its frames
    pub fn parse(path: &Path) -> Result<CandumpFrameIterator> {
        log::info!("Parsing candump log: {:?}", path);

        let file = File::open(path).map_err(|e| {
            log::error!("Failed to open candump log {:?}: {}", path, e);
            FusionError::Io(e)
        })?;

        Ok(CandumpFrameIterator {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

/// Iterator over CAN frames from a candump log
pub struct CandumpFrameIterator {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl Iterator for CandumpFrameIterator {
    type Item = Result<CanFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let text = match line {
                Ok(text) => text,
                Err(e) => return Some(Err(FusionError::Io(e))),
            };
            match parse_candump_line(&text, self.line_no) {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl LogFileParser for CandumpFrameIterator {
    fn parse(path: &Path) -> Result<Self> {
        CandumpParser::parse(path)
    }
}

/// Parse every frame in a candump text blob
pub fn parse_candump_str(text: &str) -> Result<Vec<CanFrame>> {
    let mut frames = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if let Some(frame) = parse_candump_line(line, idx + 1)? {
            frames.push(frame);
        }
    }
    Ok(frames)
}

/// Parse one candump line; `Ok(None)` for blank lines and comments
pub fn parse_candump_line(line: &str, line_no: usize) -> Result<Option<CanFrame>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = trimmed.split_whitespace().peekable();

    let timestamp_ns = match tokens.peek() {
        Some(tok) if tok.starts_with('(') => {
            let tok = tokens.next().unwrap_or_default();
            Some(parse_timestamp(tok, line_no)?)
        }
        _ => None,
    };

    let channel = tokens
        .next()
        .ok_or_else(|| parse_error(line_no, "missing interface name"))?;
    let id_token = tokens
        .next()
        .ok_or_else(|| parse_error(line_no, "missing CAN ID"))?;

    let (can_id, data) = match id_token.split_once('#') {
        Some((id, payload)) => (parse_id(id, line_no)?, parse_compact_payload(payload, line_no)?),
        None => {
            let can_id = parse_id(id_token, line_no)?;
            let dlc_token = tokens
                .next()
                .ok_or_else(|| parse_error(line_no, "missing DLC"))?;
            let dlc = dlc_token
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| parse_error(line_no, format!("bad DLC {:?}", dlc_token)))?;

            if tokens.peek() == Some(&"remote") {
                (can_id, Vec::new())
            } else {
                let data = tokens
                    .take(dlc)
                    .map(|tok| parse_byte(tok, line_no))
                    .collect::<Result<Vec<u8>>>()?;
                if data.len() != dlc {
                    return Err(parse_error(
                        line_no,
                        format!("expected {} data bytes, found {}", dlc, data.len()),
                    ));
                }
                (can_id, data)
            }
        }
    };

    Ok(Some(CanFrame {
        can_id,
        data,
        timestamp_ns,
        channel: Some(channel.to_string()),
    }))
}

fn parse_error(line: usize, reason: impl Into<String>) -> FusionError {
    FusionError::CandumpParse {
        line,
        reason: reason.into(),
    }
}

/// `(secs.fraction)` -> nanoseconds
fn parse_timestamp(token: &str, line_no: usize) -> Result<u64> {
    let inner = token
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| parse_error(line_no, format!("bad timestamp {:?}", token)))?;

    let (secs, frac) = inner.split_once('.').unwrap_or((inner, ""));
    let secs: u64 = secs
        .parse()
        .map_err(|_| parse_error(line_no, format!("bad timestamp {:?}", token)))?;

    let mut nanos: u64 = 0;
    for (idx, ch) in frac.chars().take(9).enumerate() {
        let digit = ch
            .to_digit(10)
            .ok_or_else(|| parse_error(line_no, format!("bad timestamp {:?}", token)))?;
        nanos += u64::from(digit) * 10u64.pow(8 - idx as u32);
    }

    secs.checked_mul(1_000_000_000)
        .and_then(|ns| ns.checked_add(nanos))
        .ok_or_else(|| parse_error(line_no, format!("timestamp out of range {:?}", token)))
}

fn parse_id(token: &str, line_no: usize) -> Result<u32> {
    u32::from_str_radix(token, 16)
        .ok()
        .filter(|id| *id <= MAX_EXTENDED_ID)
        .ok_or_else(|| parse_error(line_no, format!("bad CAN ID {:?}", token)))
}

fn parse_byte(token: &str, line_no: usize) -> Result<u8> {
    if token.len() != 2 {
        return Err(parse_error(line_no, format!("bad data byte {:?}", token)));
    }
    u8::from_str_radix(token, 16)
        .map_err(|_| parse_error(line_no, format!("bad data byte {:?}", token)))
}

/// Payload after `#`: hex pairs, `R` for remote, or `#<flags>` for CAN-FD
fn parse_compact_payload(payload: &str, line_no: usize) -> Result<Vec<u8>> {
    if payload.starts_with('R') {
        return Ok(Vec::new());
    }

    // CAN-FD: "##<flags nibble><data>"
    let payload = match payload.strip_prefix('#') {
        Some(rest) => rest.get(1..).unwrap_or(""),
        None => payload,
    };

    let hex: String = payload.chars().filter(|c| *c != '.').collect();
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(parse_error(
            line_no,
            format!("non-hex payload {:?}", payload),
        ));
    }
    if hex.len() % 2 != 0 {
        return Err(parse_error(
            line_no,
            format!("odd number of hex digits in {:?}", payload),
        ));
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| parse_byte(&hex[i..i + 2], line_no))
        .collect()
}
