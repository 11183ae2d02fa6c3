//! Asterisk Manager Interface client implementation.

use crate::error::AmiError;
use crate::types::{Action, Message, ResponseKind};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Prefix for generated `ActionID` headers.
const ACTION_ID_PREFIX: &str = "ami-client";

/// Client for the Asterisk Manager Interface.
///
/// Every operation opens a fresh connection, logs in, runs one action and
/// logs off. Reloads are rare, so there is no connection to keep healthy
/// between requests.
#[derive(Clone)]
pub struct AmiClient {
    addr: String,
    username: String,
    secret: SecretString,
    timeout: Duration,
}

impl AmiClient {
    /// Create a new AMI client.
    pub fn new(
        host: impl AsRef<str>,
        port: u16,
        username: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            addr: format!("{}:{}", host.as_ref(), port),
            username: username.into(),
            secret: SecretString::new(secret.into()),
            timeout,
        }
    }

    /// Address the client connects to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Ask Asterisk to reload a single module.
    #[instrument(skip(self), fields(addr = %self.addr))]
    pub async fn reload(&self, module: &str) -> Result<(), AmiError> {
        self.run("Reload", &[("Module", module)]).await?;
        debug!(module, "Module reload accepted");
        Ok(())
    }

    /// Round-trip a `Ping` action.
    #[instrument(skip(self), fields(addr = %self.addr))]
    pub async fn ping(&self) -> Result<(), AmiError> {
        self.run("Ping", &[]).await.map(|_| ())
    }

    /// Health check - returns true if the manager interface answers.
    pub async fn health_check(&self) -> bool {
        self.ping().await.is_ok()
    }

    async fn run(&self, action: &str, headers: &[(&str, &str)]) -> Result<Message, AmiError> {
        let stream = timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| AmiError::Timeout(self.timeout))?
            .map_err(|source| AmiError::Connect {
                addr: self.addr.clone(),
                source,
            })?;

        let mut session = Session::new(stream, self.timeout);
        session.read_banner().await?;
        session
            .login(&self.username, self.secret.expose_secret())
            .await?;

        let result = session.execute(action, headers).await;
        session.logoff().await;
        result
    }
}

/// A single logged-in conversation with the manager.
pub(crate) struct Session<S> {
    stream: BufReader<S>,
    timeout: Duration,
    next_id: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            timeout,
            next_id: 1,
        }
    }

    /// Read the `Asterisk Call Manager/x.y` greeting.
    pub(crate) async fn read_banner(&mut self) -> Result<String, AmiError> {
        let line = self
            .read_line()
            .await?
            .ok_or_else(|| AmiError::Protocol("Connection closed before banner".into()))?;

        if !line.contains("Call Manager") {
            return Err(AmiError::Protocol(format!("Unexpected banner: {}", line)));
        }

        debug!(banner = %line, "Connected to manager interface");
        Ok(line)
    }

    pub(crate) async fn login(&mut self, username: &str, secret: &str) -> Result<(), AmiError> {
        let action = self
            .action("Login")
            .header("Username", username)
            .header("Secret", secret)
            .header("Events", "off");

        let response = self.send(action).await?;
        match response.response() {
            Some(ResponseKind::Success) => Ok(()),
            _ => Err(AmiError::AuthenticationFailed(
                response.message().to_string(),
            )),
        }
    }

    /// Run an action and require a `Success` response.
    pub(crate) async fn execute(
        &mut self,
        name: &str,
        headers: &[(&str, &str)],
    ) -> Result<Message, AmiError> {
        let action = headers
            .iter()
            .fold(self.action(name), |action, (k, v)| action.header(*k, *v));

        let response = self.send(action).await?;
        match response.response() {
            Some(ResponseKind::Success) => Ok(response),
            _ => Err(AmiError::ActionFailed {
                action: name.to_string(),
                message: response.message().to_string(),
            }),
        }
    }

    /// Best-effort logoff; the action already succeeded or failed by now.
    pub(crate) async fn logoff(&mut self) {
        let action = self.action("Logoff");
        if let Err(e) = self.send(action).await {
            debug!("Logoff failed: {}", e);
        }
    }

    fn action(&mut self, name: &str) -> Action {
        let id = format!("{}-{}", ACTION_ID_PREFIX, self.next_id);
        self.next_id += 1;
        Action::new(name, id)
    }

    /// Write an action and wait for the response carrying its `ActionID`.
    async fn send(&mut self, action: Action) -> Result<Message, AmiError> {
        let wire = action.to_wire()?;
        let limit = self.timeout;
        let stream = self.stream.get_mut();
        let write = async {
            stream.write_all(wire.as_bytes()).await?;
            stream.flush().await
        };
        timeout(limit, write)
            .await
            .map_err(|_| AmiError::Timeout(limit))??;

        loop {
            let message = self.read_message().await?.ok_or_else(|| {
                AmiError::Protocol(format!(
                    "Connection closed while waiting for {} response",
                    action.name()
                ))
            })?;

            if message.action_id() == Some(action.action_id()) {
                return Ok(message);
            }

            if message.is_event() {
                debug!(event = ?message.get("Event"), "Skipping manager event");
            } else {
                warn!(
                    action_id = ?message.action_id(),
                    "Skipping response for a different action"
                );
            }
        }
    }

    /// Read one message; `None` on a clean EOF between messages.
    async fn read_message(&mut self) -> Result<Option<Message>, AmiError> {
        let mut lines = Vec::new();

        loop {
            match self.read_line().await? {
                None if lines.is_empty() => return Ok(None),
                None => {
                    return Err(AmiError::Protocol(
                        "Connection closed in the middle of a message".into(),
                    ))
                }
                Some(line) if line.is_empty() => {
                    if lines.is_empty() {
                        continue;
                    }
                    break;
                }
                Some(line) => lines.push(line),
            }
        }

        Ok(Some(Message::from_lines(lines.iter().map(String::as_str))))
    }

    /// Read one line with the terminator stripped; `None` on EOF.
    async fn read_line(&mut self) -> Result<Option<String>, AmiError> {
        let mut line = String::new();
        let read = timeout(self.timeout, self.stream.read_line(&mut line))
            .await
            .map_err(|_| AmiError::Timeout(self.timeout))??;

        if read == 0 {
            return Ok(None);
        }

        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}
