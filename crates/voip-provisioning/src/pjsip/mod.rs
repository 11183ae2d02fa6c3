//! PJSIP account configuration.

mod writer;

pub use writer::PjsipConfigWriter;

use crate::error::ProvisioningError;
use crate::registry::AccountRecord;
use crate::secret::RawSecret;
use async_trait::async_trait;

/// Persists account definitions where the telephony server reads them.
///
/// Appending the same account twice produces two definitions; callers rely
/// on the registry to prevent that.
#[async_trait]
pub trait ConfigWriter: Send + Sync {
    /// Append the account as a single unit: all of it or none of it.
    async fn append(&self, record: &AccountRecord, secret: &RawSecret)
        -> Result<(), ProvisioningError>;
}

/// An account section read back from a PJSIP configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PjsipAccount {
    pub identifier: String,
    pub template: Option<String>,
    pub auth_username: Option<String>,
    pub password: Option<String>,
}

/// Render an account section bound to `template`.
///
/// The leading blank line keeps the section separate from whatever the file
/// ended with, even when that was not a newline.
pub fn render_account(identifier: &str, template: &str, secret: &str) -> String {
    format!(
        "\n[{identifier}]({template})\nauth_username={identifier}\npassword={secret}\n"
    )
}

/// Parse the account sections of a PJSIP configuration file.
///
/// Only section headers and `key=value` lines are interpreted; comments
/// (`;`) and unknown keys are skipped.
pub fn parse_accounts(text: &str) -> Vec<PjsipAccount> {
    let mut accounts: Vec<PjsipAccount> = Vec::new();

    for line in text.lines() {
        let line = line.split(';').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let Some((name, tail)) = rest.split_once(']') else {
                continue;
            };
            let template = tail
                .trim()
                .strip_prefix('(')
                .and_then(|t| t.strip_suffix(')'))
                .map(String::from);

            accounts.push(PjsipAccount {
                identifier: name.trim().to_string(),
                template,
                ..Default::default()
            });
            continue;
        }

        let (Some(account), Some((key, value))) = (accounts.last_mut(), line.split_once('='))
        else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "auth_username" => account.auth_username = Some(value),
            "password" => account.password = Some(value),
            _ => {}
        }
    }

    accounts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_account() {
        assert_eq!(
            render_account("alice123", "user-template", "abc_DEF-123"),
            "\n[alice123](user-template)\nauth_username=alice123\npassword=abc_DEF-123\n"
        );
    }

    #[test]
    fn test_rendered_block_parses_back() {
        let block = render_account("alice123", "user-template", "Zm9vYmFyYmF6cXV4LTEyMzQ1");
        let accounts = parse_accounts(&block);

        assert_eq!(
            accounts,
            vec![PjsipAccount {
                identifier: "alice123".into(),
                template: Some("user-template".into()),
                auth_username: Some("alice123".into()),
                password: Some("Zm9vYmFyYmF6cXV4LTEyMzQ1".into()),
            }]
        );
    }

    #[test]
    fn test_parse_mixed_file() {
        let text = "\
; managed by hand
[user-template](!)
type=endpoint
context=internal

[bob](user-template) ; added 2024
auth_username = bob
password = hunter2
";
        let accounts = parse_accounts(text);

        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].identifier, "user-template");
        assert_eq!(accounts[0].template.as_deref(), Some("!"));
        assert_eq!(accounts[1].identifier, "bob");
        assert_eq!(accounts[1].auth_username.as_deref(), Some("bob"));
        assert_eq!(accounts[1].password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_parse_ignores_keys_before_first_section() {
        let accounts = parse_accounts("password=orphan\n[carol]\n");

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].template, None);
        assert_eq!(accounts[0].password, None);
    }
}
