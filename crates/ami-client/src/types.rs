//! AMI wire types.
//!
//! AMI is line oriented: every message is a block of `Key: Value` lines
//! terminated by CRLF, and the block itself ends with an empty line.

use crate::error::AmiError;

/// Line terminator used on the wire.
pub const CRLF: &str = "\r\n";

/// An outgoing manager action.
#[derive(Debug, Clone)]
pub struct Action {
    name: String,
    action_id: String,
    headers: Vec<(String, String)>,
}

impl Action {
    /// Create an action with the given name and correlation id.
    pub fn new(name: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action_id: action_id.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header to the action.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    /// Serialize the action into its wire form.
    ///
    /// Fails if any value contains a line break, since that would let a
    /// value inject extra headers or terminate the message early.
    pub fn to_wire(&self) -> Result<String, AmiError> {
        let mut out = String::new();
        let fields = [("Action", self.name.as_str()), ("ActionID", self.action_id.as_str())];

        for (key, value) in fields
            .into_iter()
            .chain(self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        {
            if key.contains(['\r', '\n', ':']) || value.contains(['\r', '\n']) {
                return Err(AmiError::Protocol(format!(
                    "Header {:?} of action {} contains a line break",
                    key, self.name
                )));
            }
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push_str(CRLF);
        }

        out.push_str(CRLF);
        Ok(out)
    }
}

/// Outcome carried by the `Response` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    Success,
    Error,
    Goodbye,
    Other(String),
}

/// An incoming message (response or event).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    headers: Vec<(String, String)>,
}

impl Message {
    /// Parse a message from its header lines (without the terminating blank line).
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let headers = lines
            .into_iter()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                Some((key.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        Self { headers }
    }

    /// Look up a header value (keys are case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn action_id(&self) -> Option<&str> {
        self.get("ActionID")
    }

    pub fn is_event(&self) -> bool {
        self.get("Event").is_some()
    }

    /// Kind of response, if this message is a response at all.
    pub fn response(&self) -> Option<ResponseKind> {
        self.get("Response").map(|value| match value.to_ascii_lowercase().as_str() {
            "success" => ResponseKind::Success,
            "error" => ResponseKind::Error,
            "goodbye" => ResponseKind::Goodbye,
            _ => ResponseKind::Other(value.to_string()),
        })
    }

    /// Human readable `Message` header, or an empty string.
    pub fn message(&self) -> &str {
        self.get("Message").unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_format() {
        let action = Action::new("Reload", "ami-client-2").header("Module", "res_pjsip.so");

        assert_eq!(
            action.to_wire().unwrap(),
            "Action: Reload\r\nActionID: ami-client-2\r\nModule: res_pjsip.so\r\n\r\n"
        );
    }

    #[test]
    fn test_action_rejects_line_break_in_value() {
        let action = Action::new("Login", "ami-client-1").header("Secret", "pw\r\nAction: Logoff");

        assert!(matches!(action.to_wire(), Err(AmiError::Protocol(_))));
    }

    #[test]
    fn test_message_parsing() {
        let message = Message::from_lines([
            "Response: Error",
            "ActionID: ami-client-2",
            "Message: Module 'res_foo.so' not found",
        ]);

        assert_eq!(message.response(), Some(ResponseKind::Error));
        assert_eq!(message.action_id(), Some("ami-client-2"));
        assert_eq!(message.message(), "Module 'res_foo.so' not found");
        assert!(!message.is_event());
    }

    #[test]
    fn test_message_header_lookup_is_case_insensitive() {
        let message = Message::from_lines(["response: success", "actionid: x-1"]);

        assert_eq!(message.get("Response"), Some("success"));
        assert_eq!(message.response(), Some(ResponseKind::Success));
        assert_eq!(message.action_id(), Some("x-1"));
    }

    #[test]
    fn test_event_detection() {
        let message = Message::from_lines(["Event: FullyBooted", "Privilege: system,all"]);

        assert!(message.is_event());
        assert_eq!(message.response(), None);
    }

    #[test]
    fn test_lines_without_separator_are_ignored() {
        let message = Message::from_lines(["Response: Follows", "free form output"]);

        assert_eq!(
            message.response(),
            Some(ResponseKind::Other("Follows".to_string()))
        );
        assert_eq!(message.get("free form output"), None);
    }
}
