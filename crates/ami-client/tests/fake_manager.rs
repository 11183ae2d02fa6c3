//! Integration tests against an in-process fake manager interface.

use ami_client::{AmiClient, AmiError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Actions received by the fake server, as `(action, headers)` pairs.
type Received = Arc<Mutex<Vec<Vec<(String, String)>>>>;

/// Spawn a fake manager that accepts `connections` sessions.
///
/// Logins succeed only for `admin`/`secret`; `Reload` succeeds only for
/// `res_pjsip.so`.
async fn spawn_manager(connections: usize) -> (u16, Received) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();

    tokio::spawn(async move {
        for _ in 0..connections {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut reader = BufReader::new(read);

            write
                .write_all(b"Asterisk Call Manager/5.0.1\r\n")
                .await
                .unwrap();
            // Unsolicited event before any response.
            write
                .write_all(b"Event: FullyBooted\r\nPrivilege: system,all\r\n\r\n")
                .await
                .unwrap();

            loop {
                let mut headers = Vec::new();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).await.unwrap() == 0 {
                        break;
                    }
                    let line = line.trim_end().to_string();
                    if line.is_empty() {
                        break;
                    }
                    let (k, v) = line.split_once(": ").unwrap();
                    headers.push((k.to_string(), v.to_string()));
                }
                if headers.is_empty() {
                    break;
                }

                let get = |key: &str| {
                    headers
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                };
                let action = get("Action");
                let id = get("ActionID");
                log.lock().unwrap().push(headers.clone());

                let reply = match action.as_str() {
                    "Login" if get("Username") == "admin" && get("Secret") == "secret" => {
                        format!("Response: Success\r\nActionID: {id}\r\nMessage: Authentication accepted\r\n\r\n")
                    }
                    "Login" => {
                        format!("Response: Error\r\nActionID: {id}\r\nMessage: Authentication failed\r\n\r\n")
                    }
                    "Reload" if get("Module") == "res_pjsip.so" => {
                        format!("Response: Success\r\nActionID: {id}\r\nMessage: Module Reloaded\r\n\r\n")
                    }
                    "Reload" => {
                        format!("Response: Error\r\nActionID: {id}\r\nMessage: No such module\r\n\r\n")
                    }
                    "Ping" => format!("Response: Success\r\nActionID: {id}\r\nPing: Pong\r\n\r\n"),
                    "Logoff" => {
                        format!("Response: Goodbye\r\nActionID: {id}\r\nMessage: Thanks for all the fish.\r\n\r\n")
                    }
                    _ => format!("Response: Error\r\nActionID: {id}\r\nMessage: Invalid/unknown command\r\n\r\n"),
                };
                write.write_all(reply.as_bytes()).await.unwrap();

                if action == "Logoff" || (action == "Login" && reply.starts_with("Response: Error")) {
                    break;
                }
            }
        }
    });

    (port, received)
}

fn client(port: u16, secret: &str) -> AmiClient {
    AmiClient::new("127.0.0.1", port, "admin", secret, Duration::from_secs(2))
}

fn actions(received: &Received) -> Vec<String> {
    received
        .lock()
        .unwrap()
        .iter()
        .map(|headers| headers[0].1.clone())
        .collect()
}

#[tokio::test]
async fn test_reload_logs_in_reloads_and_logs_off() {
    let (port, received) = spawn_manager(1).await;

    client(port, "secret").reload("res_pjsip.so").await.unwrap();

    assert_eq!(actions(&received), vec!["Login", "Reload", "Logoff"]);
    let reload = &received.lock().unwrap()[1];
    assert!(reload.contains(&("Module".to_string(), "res_pjsip.so".to_string())));
}

#[tokio::test]
async fn test_login_turns_events_off() {
    let (port, received) = spawn_manager(1).await;

    client(port, "secret").ping().await.unwrap();

    let login = &received.lock().unwrap()[0];
    assert!(login.contains(&("Events".to_string(), "off".to_string())));
}

#[tokio::test]
async fn test_bad_credentials() {
    let (port, received) = spawn_manager(1).await;

    let err = client(port, "wrong").reload("res_pjsip.so").await.unwrap_err();

    assert!(matches!(err, AmiError::AuthenticationFailed(_)));
    assert!(!err.is_transient());
    assert_eq!(actions(&received), vec!["Login"]);
}

#[tokio::test]
async fn test_rejected_reload() {
    let (port, _) = spawn_manager(1).await;

    let err = client(port, "secret").reload("res_missing.so").await.unwrap_err();

    assert!(matches!(err, AmiError::ActionFailed { ref action, .. } if action == "Reload"));
}

#[tokio::test]
async fn test_health_check() {
    let (port, _) = spawn_manager(1).await;

    assert!(client(port, "secret").health_check().await);
}

#[tokio::test]
async fn test_each_operation_uses_its_own_connection() {
    let (port, received) = spawn_manager(2).await;
    let client = client(port, "secret");

    client.reload("res_pjsip.so").await.unwrap();
    client.reload("res_pjsip.so").await.unwrap();

    assert_eq!(
        actions(&received),
        vec!["Login", "Reload", "Logoff", "Login", "Reload", "Logoff"]
    );
}
