//! Asterisk Manager Interface (AMI) client.

mod client;
mod error;
mod types;

pub use client::AmiClient;
pub use error::AmiError;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reload_when_nothing_listens() {
        // Port 1 on localhost is reserved and refuses connections.
        let client = AmiClient::new("127.0.0.1", 1, "admin", "pw", Duration::from_secs(1));
        let result = client.reload("res_pjsip.so").await;

        assert!(result.is_err());
        assert!(result.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_health_check_when_nothing_listens() {
        let client = AmiClient::new("127.0.0.1", 1, "admin", "pw", Duration::from_secs(1));
        assert!(!client.health_check().await);
    }

    #[test]
    fn test_transient_classification() {
        assert!(AmiError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(AmiError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_transient());
        assert!(!AmiError::AuthenticationFailed("bad".into()).is_transient());
        assert!(!AmiError::Protocol("garbage".into()).is_transient());
    }
}
