//! File-backed PJSIP configuration writer.

use super::{render_account, ConfigWriter};
use crate::error::ProvisioningError;
use crate::registry::{validate_identifier, AccountRecord};
use crate::secret::RawSecret;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Appends account sections to a PJSIP include file.
///
/// Appends are serialized by an internal lock. Each one writes the previous
/// contents plus the new section to a temp file next to the target, syncs
/// it and renames it into place, so readers only ever see the file before
/// or after a complete section.
///
/// A symlinked path is resolved first and the link itself is left alone.
/// The file mode is carried over but ownership is not: the rewritten file
/// belongs to the user the service runs as.
pub struct PjsipConfigWriter {
    path: PathBuf,
    template: String,
    lock: Mutex<()>,
}

impl PjsipConfigWriter {
    /// Create a writer for `path` binding new accounts to `template`.
    pub fn new(path: impl Into<PathBuf>, template: impl Into<String>) -> Result<Self, ProvisioningError> {
        let template = template.into();
        if template.is_empty()
            || !template
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(ProvisioningError::Internal(format!(
                "Invalid account template name: {:?}",
                template
            )));
        }

        Ok(Self {
            path: path.into(),
            template,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// The file the configured path points at, following symlinks.
    async fn target(&self) -> std::io::Result<PathBuf> {
        match fs::canonicalize(&self.path).await {
            Ok(resolved) => Ok(resolved),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(self.path.clone()),
            Err(e) => Err(e),
        }
    }

    async fn write_atomically(&self, block: &str) -> std::io::Result<()> {
        let target = self.target().await?;
        let current = match fs::read(&target).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        let temp_path = target.with_extension("conf.tmp");
        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            if let Some(bytes) = &current {
                file.write_all(bytes).await?;
            }
            file.write_all(block.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);

            // Keep the original mode so the telephony server can still read it.
            if current.is_some() {
                let permissions = fs::metadata(&target).await?.permissions();
                fs::set_permissions(&temp_path, permissions).await?;
            }

            fs::rename(&temp_path, &target).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        result
    }
}

#[async_trait]
impl ConfigWriter for PjsipConfigWriter {
    #[instrument(skip(self, record, secret), fields(identifier = %record.identifier))]
    async fn append(
        &self,
        record: &AccountRecord,
        secret: &RawSecret,
    ) -> Result<(), ProvisioningError> {
        validate_identifier(&record.identifier)?;

        let block = render_account(&record.identifier, &self.template, secret.expose());

        let _guard = self.lock.lock().await;
        debug!(path = ?self.path, "Appending account section");

        self.write_atomically(&block)
            .await
            .map_err(|e| ProvisioningError::Write {
                identifier: record.identifier.clone(),
                message: format!("{}: {}", self.path.display(), e),
            })?;

        info!(path = ?self.path, "Account section written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pjsip::parse_accounts;
    use crate::registry::hash_secret;
    use std::sync::Arc;

    fn record(identifier: &str) -> AccountRecord {
        AccountRecord::reserved(
            identifier.into(),
            "ops@example.com".into(),
            hash_secret("secret"),
        )
    }

    #[tokio::test]
    async fn test_append_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pjsip_custom.conf");
        let writer = PjsipConfigWriter::new(&path, "user-template").unwrap();

        writer
            .append(&record("alice123"), &RawSecret::from("pw-alice".to_string()))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents
            .contains("[alice123](user-template)\nauth_username=alice123\npassword=pw-alice\n"));
        assert!(!dir.path().join("pjsip_custom.conf.tmp").exists());
    }

    #[tokio::test]
    async fn test_append_preserves_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pjsip_custom.conf");
        std::fs::write(&path, "[user-template](!)\ntype=endpoint").unwrap();
        let writer = PjsipConfigWriter::new(&path, "user-template").unwrap();

        writer
            .append(&record("alice123"), &RawSecret::from("pw".to_string()))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("[user-template](!)\ntype=endpoint\n"));
        let accounts = parse_accounts(&contents);
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[1].identifier, "alice123");
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pjsip_custom.conf");
        let writer = Arc::new(PjsipConfigWriter::new(&path, "user-template").unwrap());

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let writer = writer.clone();
                tokio::spawn(async move {
                    let id = format!("user{}", i);
                    let secret = RawSecret::from(format!("secret{}", i));
                    writer.append(&record(&id), &secret).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let accounts = parse_accounts(&std::fs::read_to_string(&path).unwrap());
        assert_eq!(accounts.len(), 20);
        for account in accounts {
            let n = account.identifier.strip_prefix("user").unwrap();
            assert_eq!(account.auth_username.as_deref(), Some(account.identifier.as_str()));
            assert_eq!(account.password, Some(format!("secret{}", n)));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_append_through_symlink_keeps_link() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("shared").join("pjsip_accounts.conf");
        std::fs::create_dir(real.parent().unwrap()).unwrap();
        std::fs::write(&real, "; managed accounts\n").unwrap();
        let link = dir.path().join("pjsip_custom.conf");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let writer = PjsipConfigWriter::new(&link, "user-template").unwrap();
        writer
            .append(&record("alice123"), &RawSecret::from("pw".to_string()))
            .await
            .unwrap();

        assert!(std::fs::symlink_metadata(&link)
            .unwrap()
            .file_type()
            .is_symlink());
        let contents = std::fs::read_to_string(&real).unwrap();
        assert!(contents.starts_with("; managed accounts\n"));
        assert_eq!(parse_accounts(&contents).len(), 1);
        assert!(!dir.path().join("shared").join("pjsip_accounts.conf.tmp").exists());
    }

    #[tokio::test]
    async fn test_append_to_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("pjsip_custom.conf");
        let writer = PjsipConfigWriter::new(&path, "user-template").unwrap();

        let result = writer
            .append(&record("alice123"), &RawSecret::from("pw".to_string()))
            .await;

        assert!(matches!(
            result,
            Err(ProvisioningError::Write { ref identifier, .. }) if identifier == "alice123"
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_append_rejects_unsafe_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pjsip_custom.conf");
        let writer = PjsipConfigWriter::new(&path, "user-template").unwrap();

        let result = writer
            .append(&record("evil]\n[x"), &RawSecret::from("pw".to_string()))
            .await;

        assert!(matches!(result, Err(ProvisioningError::Validation { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_invalid_template_name() {
        assert!(PjsipConfigWriter::new("/tmp/x.conf", "").is_err());
        assert!(PjsipConfigWriter::new("/tmp/x.conf", "tpl)\n[evil").is_err());
    }
}
