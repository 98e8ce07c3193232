//! Bidirectional relay between the frontend and backend sockets.

use std::path::PathBuf;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::rules::{RuleSet, Verdict};
use crate::{ProxyError, Result};

const RELAY_BUF: usize = 8192;

/// One proxy instance: the rule set plus the backend address.
pub struct SecurityProxy {
    rules: RuleSet,
    backend_path: PathBuf,
}

impl SecurityProxy {
    pub fn new(rules: RuleSet, backend_path: PathBuf) -> Self {
        Self {
            rules,
            backend_path,
        }
    }

    /// Bind the listening socket, replacing a stale file from a previous run.
    pub fn bind(path: &std::path::Path) -> Result<UnixListener> {
        let _ = std::fs::remove_file(path);
        UnixListener::bind(path).map_err(|source| ProxyError::Bind {
            path: path.to_owned(),
            source,
        })
    }

    /// Accept frontend connections forever, one at a time. A failed
    /// connection is logged and does not stop the accept loop.
    pub async fn serve(&self, listener: UnixListener) -> Result<()> {
        info!(backend = %self.backend_path.display(), "proxy serving");
        loop {
            let (frontend, _addr) = listener.accept().await?;
            debug!("frontend connected");
            if let Err(error) = self.handle_connection(frontend).await {
                warn!(%error, "frontend connection ended with error");
            }
        }
    }

    /// Relay one frontend connection. Frontend-to-backend traffic is checked
    /// per message; a blocked message is answered locally and the backend
    /// never sees it. Backend-to-frontend traffic is forwarded untouched.
    async fn handle_connection(&self, mut frontend: UnixStream) -> Result<()> {
        let mut backend = match UnixStream::connect(&self.backend_path).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(%error, "backend unreachable, dropping frontend connection");
                let _ = frontend.write_all(b"ERROR:backend unavailable").await;
                return Ok(());
            }
        };

        let mut from_frontend = [0u8; RELAY_BUF];
        let mut from_backend = [0u8; RELAY_BUF];
        loop {
            tokio::select! {
                read = frontend.read(&mut from_frontend) => {
                    let n = read?;
                    if n == 0 {
                        break;
                    }
                    let payload = String::from_utf8_lossy(&from_frontend[..n]);
                    match self.rules.validate(payload.trim_end_matches('\n')) {
                        Verdict::Allow => backend.write_all(&from_frontend[..n]).await?,
                        Verdict::Block(reason) => {
                            warn!(%reason, "blocked outbound message");
                            frontend.write_all(reason.notice().as_bytes()).await?;
                        }
                    }
                }
                read = backend.read(&mut from_backend) => {
                    let n = read?;
                    if n == 0 {
                        break;
                    }
                    frontend.write_all(&from_backend[..n]).await?;
                }
            }
        }
        debug!("frontend disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend double that echoes every message prefixed with `echo:`.
    async fn spawn_echo_backend(path: std::path::PathBuf) {
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; RELAY_BUF];
                    while let Ok(n) = stream.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                        let mut reply = b"echo:".to_vec();
                        reply.extend_from_slice(&buf[..n]);
                        if stream.write_all(&reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
    }

    async fn start_proxy(dir: &std::path::Path) -> UnixStream {
        let backend_path = dir.join("backend.sock");
        let proxy_path = dir.join("proxy.sock");
        spawn_echo_backend(backend_path.clone()).await;

        let proxy = SecurityProxy::new(RuleSet::compile().unwrap(), backend_path);
        let listener = SecurityProxy::bind(&proxy_path).unwrap();
        tokio::spawn(async move {
            let _ = proxy.serve(listener).await;
        });
        UnixStream::connect(&proxy_path).await.unwrap()
    }

    #[tokio::test]
    async fn allowed_message_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut frontend = start_proxy(dir.path()).await;

        frontend.write_all(b"QUERY:what time is it").await.unwrap();
        let mut buf = [0u8; RELAY_BUF];
        let n = frontend.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"echo:QUERY:what time is it");
    }

    #[tokio::test]
    async fn blocked_message_is_answered_locally() {
        let dir = tempfile::tempdir().unwrap();
        let mut frontend = start_proxy(dir.path()).await;

        frontend.write_all(b"QUERY:run rm -rf / now").await.unwrap();
        let mut buf = [0u8; RELAY_BUF];
        let n = frontend.read(&mut buf).await.unwrap();
        let reply = std::str::from_utf8(&buf[..n]).unwrap();
        assert!(reply.starts_with("SECURITY_BLOCKED:"), "got {reply}");

        // The connection stays usable afterwards.
        frontend.write_all(b"STATUS").await.unwrap();
        let n = frontend.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"echo:STATUS");
    }

    #[tokio::test]
    async fn unreachable_backend_reports_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let proxy_path = dir.path().join("proxy.sock");
        let proxy = SecurityProxy::new(
            RuleSet::compile().unwrap(),
            dir.path().join("nobody-home.sock"),
        );
        let listener = SecurityProxy::bind(&proxy_path).unwrap();
        tokio::spawn(async move {
            let _ = proxy.serve(listener).await;
        });

        let mut frontend = UnixStream::connect(&proxy_path).await.unwrap();
        let mut buf = [0u8; RELAY_BUF];
        let n = frontend.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ERROR:backend unavailable");
    }
}
