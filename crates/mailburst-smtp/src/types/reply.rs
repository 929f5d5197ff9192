//! Server replies and the reply-code table.

/// Class of a reply, taken from the first digit of its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyClass {
    /// 2xx: the command was accepted.
    Completed,
    /// 3xx: the server waits for more input (credentials, message data).
    Intermediate,
    /// 4xx: temporary refusal; the same command may succeed later.
    Transient,
    /// 5xx: permanent refusal.
    Permanent,
    /// Anything outside 200..=599.
    Unknown,
}

/// Three-digit SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 214 help text
    pub const HELP: Self = Self(214);
    /// 220 greeting: service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 answer to QUIT
    pub const CLOSING: Self = Self(221);
    /// 235 AUTH accepted
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 command completed
    pub const OK: Self = Self(250);
    /// 251 recipient not local, will forward
    pub const FORWARD: Self = Self(251);
    /// 252 recipient not verified, delivery will be attempted
    pub const CANNOT_VERIFY: Self = Self(252);
    /// 334 AUTH challenge
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 send the message, end with `<CRLF>.<CRLF>`
    pub const START_DATA: Self = Self(354);
    /// 421 service shutting down
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 450 mailbox busy
    pub const MAILBOX_BUSY: Self = Self(450);
    /// 451 local processing error
    pub const LOCAL_ERROR: Self = Self(451);
    /// 452 out of storage
    pub const INSUFFICIENT_STORAGE: Self = Self(452);
    /// 500 unknown command
    pub const SYNTAX_ERROR: Self = Self(500);
    /// 501 bad arguments
    pub const PARAMETER_ERROR: Self = Self(501);
    /// 502 command not implemented
    pub const NOT_IMPLEMENTED: Self = Self(502);
    /// 503 commands out of order
    pub const BAD_SEQUENCE: Self = Self(503);
    /// 504 parameter not implemented
    pub const PARAMETER_NOT_IMPLEMENTED: Self = Self(504);
    /// 530 STARTTLS required first
    pub const STARTTLS_REQUIRED: Self = Self(530);
    /// 535 credentials rejected
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 mailbox unavailable
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
    /// 551 recipient not local
    pub const USER_NOT_LOCAL: Self = Self(551);
    /// 552 storage allocation exceeded
    pub const EXCEEDED_STORAGE: Self = Self(552);
    /// 553 mailbox name not allowed
    pub const MAILBOX_NAME_INVALID: Self = Self(553);
    /// 554 transaction failed
    pub const TRANSACTION_FAILED: Self = Self(554);

    /// Wraps a raw code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Class of this code.
    #[must_use]
    pub const fn class(self) -> ReplyClass {
        match self.0 / 100 {
            2 => ReplyClass::Completed,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::Transient,
            5 => ReplyClass::Permanent,
            _ => ReplyClass::Unknown,
        }
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self.class(), ReplyClass::Completed)
    }

    /// 3xx.
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        matches!(self.class(), ReplyClass::Intermediate)
    }

    /// 4xx.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self.class(), ReplyClass::Transient)
    }

    /// 5xx.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(self.class(), ReplyClass::Permanent)
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One complete server reply: a code plus the text of each line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code shared by every line.
    pub code: ReplyCode,
    /// Text after the code on each line, in order.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Class of the reply code.
    #[must_use]
    pub const fn class(&self) -> ReplyClass {
        self.code.class()
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Text of all lines joined with newlines.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }
}

/// Renders as `<code> <text>`, or just the code when there is no text.
impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = self.message_text();
        if text.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {text}", self.code)
        }
    }
}
