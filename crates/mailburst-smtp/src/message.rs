//! The outgoing message and its wire format.

use chrono::{DateTime, FixedOffset};

use crate::buffer::LineBuffer;

/// Date header format (RFC 1123 with a numeric zone).
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// End-of-data marker that terminates the DATA payload.
pub const END_OF_DATA: &str = "\r\n.\r\n";

/// Validation error for an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Sender address is empty.
    #[error("sender (From) is required")]
    EmptySender,
    /// Primary recipient is empty.
    #[error("recipient (To) is required")]
    EmptyRecipient,
    /// Subject is empty.
    #[error("subject is required")]
    EmptySubject,
    /// Body is empty.
    #[error("body is required")]
    EmptyBody,
    /// Sender has no `@`.
    #[error("invalid sender format: {0}")]
    InvalidSender(String),
    /// Primary recipient has no `@`.
    #[error("invalid recipient format: {0}")]
    InvalidRecipient(String),
}

impl ValidationError {
    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptySender | Self::InvalidSender(_) => "from",
            Self::EmptyRecipient | Self::InvalidRecipient(_) => "to",
            Self::EmptySubject => "subject",
            Self::EmptyBody => "body",
        }
    }
}

/// A single email to send: one primary recipient plus optional Cc/Bcc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Identifier assigned by whoever created the message.
    pub id: u64,
    /// Sender address.
    pub from: String,
    /// Primary recipient.
    pub to: String,
    /// CC addresses.
    pub cc: Vec<String>,
    /// BCC addresses (envelope only, never rendered).
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
}

impl Message {
    /// Creates a message without Cc or Bcc recipients.
    #[must_use]
    pub fn new(
        id: u64,
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id,
            from: from.into(),
            to: to.into(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Adds CC recipients.
    #[must_use]
    pub fn with_cc<I, S>(mut self, cc: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cc.extend(cc.into_iter().map(Into::into));
        self
    }

    /// Adds BCC recipients.
    #[must_use]
    pub fn with_bcc<I, S>(mut self, bcc: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bcc.extend(bcc.into_iter().map(Into::into));
        self
    }

    /// Checks the message before any network activity.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.from.is_empty() {
            return Err(ValidationError::EmptySender);
        }
        if self.to.is_empty() {
            return Err(ValidationError::EmptyRecipient);
        }
        if self.subject.is_empty() {
            return Err(ValidationError::EmptySubject);
        }
        if self.body.is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        if !self.from.contains('@') {
            return Err(ValidationError::InvalidSender(self.from.clone()));
        }
        if !self.to.contains('@') {
            return Err(ValidationError::InvalidRecipient(self.to.clone()));
        }
        Ok(())
    }

    /// Returns the envelope recipients: To, then non-empty Cc, then non-empty Bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.to.as_str()).chain(
            self.cc
                .iter()
                .chain(&self.bcc)
                .map(String::as_str)
                .filter(|addr| !addr.is_empty()),
        )
    }

    /// Writes the DATA payload into `buf`: headers, blank line, body and the
    /// end-of-data marker.
    ///
    /// Lines of the body starting with `.` are sent as-is.
    pub fn write_payload(&self, buf: &mut LineBuffer, date: &DateTime<FixedOffset>) {
        buf.append(["From: ", self.from.as_str(), "\r\n"]);
        buf.append(["To: ", self.to.as_str(), "\r\n"]);

        let cc: Vec<&str> = self
            .cc
            .iter()
            .map(String::as_str)
            .filter(|addr| !addr.is_empty())
            .collect();
        if !cc.is_empty() {
            buf.append(["Cc: ".to_string(), cc.join(", "), "\r\n".to_string()]);
        }

        buf.append(["Subject: ", self.subject.as_str(), "\r\n"]);
        buf.push("Content-Type: text/plain; charset=utf-8\r\n");
        buf.append([
            "Date: ".to_string(),
            date.format(DATE_FORMAT).to_string(),
            "\r\n".to_string(),
        ]);
        buf.push("\r\n");
        buf.push(self.body.as_str());
        buf.push(END_OF_DATA);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message::new(7, "me@example.com", "you@example.com", "Hello", "Hi there")
    }

    fn date() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-05T09:07:03-03:00").unwrap()
    }

    #[test]
    fn valid_message_passes() {
        assert_eq!(message().validate(), Ok(()));
    }

    #[test]
    fn missing_fields_are_named() {
        let mut msg = message();
        msg.from.clear();
        assert_eq!(msg.validate(), Err(ValidationError::EmptySender));

        let mut msg = message();
        msg.to.clear();
        assert_eq!(msg.validate(), Err(ValidationError::EmptyRecipient));

        let mut msg = message();
        msg.subject.clear();
        assert_eq!(msg.validate().unwrap_err().field(), "subject");

        let mut msg = message();
        msg.body.clear();
        assert_eq!(msg.validate().unwrap_err().field(), "body");
    }

    #[test]
    fn addresses_need_an_at_sign() {
        let mut msg = message();
        msg.from = "me.example.com".into();
        assert_eq!(
            msg.validate().unwrap_err().to_string(),
            "invalid sender format: me.example.com"
        );

        let mut msg = message();
        msg.to = "you".into();
        assert_eq!(
            msg.validate(),
            Err(ValidationError::InvalidRecipient("you".into()))
        );
    }

    #[test]
    fn recipients_skip_empty_cc_and_bcc() {
        let msg = message()
            .with_cc(["cc@example.com", ""])
            .with_bcc(["", "bcc@example.com"]);
        let recipients: Vec<&str> = msg.recipients().collect();
        assert_eq!(
            recipients,
            vec!["you@example.com", "cc@example.com", "bcc@example.com"]
        );
    }

    #[test]
    fn payload_layout() {
        let mut buf = LineBuffer::new(4, 2);
        message().write_payload(&mut buf, &date());
        assert_eq!(
            buf.render(),
            "From: me@example.com\r\n\
             To: you@example.com\r\n\
             Subject: Hello\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Date: Tue, 05 Mar 2024 09:07:03 -0300\r\n\
             \r\n\
             Hi there\r\n.\r\n"
        );
    }

    #[test]
    fn payload_cc_header_and_hidden_bcc() {
        let msg = message()
            .with_cc(["a@example.com", "", "b@example.com"])
            .with_bcc(["secret@example.com"]);
        let mut buf = LineBuffer::new(4, 2);
        msg.write_payload(&mut buf, &date());
        let payload = buf.render();

        assert!(payload.contains("\r\nCc: a@example.com, b@example.com\r\nSubject: Hello\r\n"));
        assert!(!payload.contains("secret@example.com"));
    }

    #[test]
    fn payload_omits_cc_when_all_empty() {
        let msg = message().with_cc([""]);
        let mut buf = LineBuffer::new(4, 2);
        msg.write_payload(&mut buf, &date());
        assert!(!buf.render().contains("Cc:"));
    }

    #[test]
    fn leading_dots_are_not_stuffed() {
        let mut msg = message();
        msg.body = "line one\r\n.hidden\r\n".into();
        let mut buf = LineBuffer::new(4, 2);
        msg.write_payload(&mut buf, &date());
        assert!(buf.render().ends_with("line one\r\n.hidden\r\n\r\n.\r\n"));
    }
}
