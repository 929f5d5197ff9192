//! SMTP reply parser.
//!
//! A reply is one or more lines sharing a three-digit code. Every line but
//! the last has `-` after the code, the last has a space (or nothing):
//!
//! ```text
//! 250-mx.example.com
//! 250-AUTH LOGIN PLAIN
//! 250 8BITMIME
//! ```

use crate::types::{Reply, ReplyCode};

/// A server line that could not be parsed as an SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed reply: {0}")]
pub struct MalformedReply(pub String);

/// Parses the lines of one reply, terminators already stripped.
///
/// # Errors
///
/// Returns an error if there are no lines, a code is not three ASCII digits,
/// the code changes between lines, or a line lacks its separator.
pub fn parse_reply(lines: &[String]) -> Result<Reply, MalformedReply> {
    let first = lines
        .first()
        .ok_or_else(|| MalformedReply("empty reply".into()))?;
    let code = split_code(first)?.0;

    let message = lines
        .iter()
        .map(|line| match split_code(line)? {
            (c, _) if c != code => Err(MalformedReply(format!("code changed mid-reply: {line}"))),
            (_, text) => Ok(text.to_string()),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Reply::new(ReplyCode::new(code), message))
}

/// Splits a line into its numeric code and the text after the separator.
fn split_code(line: &str) -> Result<(u16, &str), MalformedReply> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(MalformedReply(format!("no reply code: {line}")));
    }

    let code = bytes[..3]
        .iter()
        .fold(0u16, |acc, digit| acc * 10 + u16::from(digit - b'0'));

    match bytes.get(3) {
        None => Ok((code, "")),
        Some(b' ' | b'-') => Ok((code, &line[4..])),
        Some(_) => Err(MalformedReply(format!("missing separator: {line}"))),
    }
}

/// Returns true unless `line` is a continuation line (`-` after the code).
///
/// Anything that is not a continuation ends the reply, so garbage surfaces as
/// a parse error instead of an endless read.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.as_bytes().get(3) != Some(&b'-')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn greeting() {
        let reply = parse_reply(&lines(&["220 mx.example.com ESMTP ready"])).unwrap();
        assert_eq!(reply.code, ReplyCode::SERVICE_READY);
        assert_eq!(reply.message, vec!["mx.example.com ESMTP ready"]);
    }

    #[test]
    fn ehlo_continuation_lines() {
        let reply = parse_reply(&lines(&[
            "250-mx.example.com",
            "250-AUTH LOGIN PLAIN",
            "250 8BITMIME",
        ]))
        .unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.message.len(), 3);
        assert_eq!(reply.message[1], "AUTH LOGIN PLAIN");
    }

    #[test]
    fn bare_code() {
        let reply = parse_reply(&lines(&["354"])).unwrap();
        assert_eq!(reply.code, ReplyCode::START_DATA);
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&lines(&["25"])).is_err());
        assert!(parse_reply(&lines(&["ABC OK"])).is_err());
        assert!(parse_reply(&lines(&["+25 OK"])).is_err());
        assert!(parse_reply(&lines(&["250OK"])).is_err());
        assert!(parse_reply(&lines(&["250-first", "251 second"])).is_err());
    }

    #[test]
    fn last_line_detection() {
        assert!(is_last_reply_line("250 OK"));
        assert!(is_last_reply_line("250"));
        assert!(is_last_reply_line("25"));
        assert!(!is_last_reply_line("250-AUTH LOGIN"));
    }
}
