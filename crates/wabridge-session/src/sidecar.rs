//! Session provider backed by an external helper process.
//!
//! The helper (typically a `whatsapp-web.js` script driving Chromium) speaks
//! newline-delimited JSON: events on stdout, commands on stdin.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use wabridge_core::{InboundMessage, ProviderError, SendReceipt, SessionEvent, SessionProvider};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const STOP_GRACE: Duration = Duration::from_secs(5);
const STARTUP_GRACE: Duration = Duration::from_secs(3);
const STDERR_DRAIN: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct SidecarConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Exported as `WA_BROWSER_PATH`.
    pub browser_path: Option<PathBuf>,
    /// Exported space-joined as `WA_BROWSER_ARGS`.
    pub browser_args: Vec<String>,
    /// Exported as `WA_SESSION_DIR`.
    pub session_dir: PathBuf,
    pub send_timeout: Duration,
    /// How long `initialize` watches a fresh helper for an early exit.
    pub startup_grace: Duration,
}

impl SidecarConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>, session_dir: PathBuf) -> Self {
        Self {
            command: command.into(),
            args,
            browser_path: None,
            browser_args: Vec::new(),
            session_dir,
            send_timeout: SEND_TIMEOUT,
            startup_grace: STARTUP_GRACE,
        }
    }
}

/// A line the helper writes to stdout.
#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum SidecarFrame {
    Qr {
        code: String,
    },
    Ready {
        #[serde(default)]
        account: Option<String>,
    },
    AuthFailure {
        #[serde(default)]
        reason: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Message(InboundMessage),
    Sent {
        id: u64,
        #[serde(default, rename = "messageId")]
        message_id: Option<String>,
    },
    SendError {
        id: u64,
        error: String,
    },
}

/// A line the bridge writes to the helper's stdin.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum SidecarCommand<'a> {
    Send { id: u64, to: &'a str, text: &'a str },
    Shutdown,
}

type PendingSends = DashMap<u64, oneshot::Sender<Result<Option<String>, ProviderError>>>;

struct Running {
    child: Child,
    stdin: ChildStdin,
}

pub struct SidecarProvider {
    config: SidecarConfig,
    running: Mutex<Option<Running>>,
    pending: Arc<PendingSends>,
    next_id: AtomicU64,
    /// Bumped on every (re)start and on shutdown; a reader whose generation
    /// is stale exits without reporting anything.
    generation: Arc<AtomicU64>,
}

impl SidecarProvider {
    pub fn new(config: SidecarConfig) -> Self {
        Self {
            config,
            running: Mutex::new(None),
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .env("WA_SESSION_DIR", &self.config.session_dir)
            .env("WA_BROWSER_ARGS", self.config.browser_args.join(" "))
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref path) = self.config.browser_path {
            cmd.env("WA_BROWSER_PATH", path);
        }
        cmd
    }
}

#[async_trait]
impl SessionProvider for SidecarProvider {
    fn name(&self) -> &str {
        "sidecar"
    }

    async fn initialize(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), ProviderError> {
        let mut running = self.running.lock().await;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = running.take() {
            info!("stopping previous sidecar before restart");
            stop(old).await;
        }
        fail_pending(&self.pending);

        let mut child = self.command().spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProviderError::Launch(format!("sidecar command not found: {}", self.config.command))
            } else {
                ProviderError::Io(e.to_string())
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Launch("sidecar stdout not captured".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProviderError::Launch("sidecar stdin not captured".into()))?;
        let last_stderr = Arc::new(parking_lot::Mutex::new(None::<String>));
        let stderr_task = child.stderr.take().map(|stderr| {
            let last_stderr = Arc::clone(&last_stderr);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "wabridge_session::sidecar::stderr", "{line}");
                    if !line.trim().is_empty() {
                        *last_stderr.lock() = Some(line);
                    }
                }
            })
        });

        info!(pid = child.id(), generation, command = %self.config.command, "sidecar started");

        let (started_tx, started_rx) = oneshot::channel();
        tokio::spawn(read_frames(
            stdout,
            events,
            Arc::clone(&self.pending),
            Arc::clone(&self.generation),
            generation,
            started_tx,
        ));

        // A helper that dies before saying anything (missing script, bad
        // install) will not get better by retrying.
        if let Ok(Ok(Startup::Exited)) =
            tokio::time::timeout(self.config.startup_grace, started_rx).await
        {
            if let Some(task) = stderr_task {
                let _ = tokio::time::timeout(STDERR_DRAIN, task).await;
            }
            let status = match child.try_wait() {
                Ok(Some(status)) => status.to_string(),
                _ => "closed stdout".to_string(),
            };
            let detail = match last_stderr.lock().take() {
                Some(line) => format!("sidecar exited before reporting any event ({status}): {line}"),
                None => format!("sidecar exited before reporting any event ({status})"),
            };
            return Err(ProviderError::Launch(detail));
        }

        *running = Some(Running { child, stdin });
        Ok(())
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<SendReceipt, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut line = serde_json::to_string(&SidecarCommand::Send { id, to, text })
            .map_err(|e| ProviderError::Protocol(e.to_string()))?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        {
            let mut running = self.running.lock().await;
            let Some(run) = running.as_mut() else {
                self.pending.remove(&id);
                return Err(ProviderError::Disconnected);
            };
            if let Err(e) = write_line(&mut run.stdin, &line).await {
                self.pending.remove(&id);
                return Err(e);
            }
        }

        match tokio::time::timeout(self.config.send_timeout, rx).await {
            Ok(Ok(result)) => result.map(|message_id| SendReceipt::new(to, message_id)),
            Ok(Err(_)) => Err(ProviderError::Disconnected),
            Err(_) => {
                self.pending.remove(&id);
                Err(ProviderError::Timeout(self.config.send_timeout))
            }
        }
    }

    async fn shutdown(&self) {
        let mut running = self.running.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(run) = running.take() {
            stop(run).await;
            info!("sidecar stopped");
        }
        fail_pending(&self.pending);
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> Result<(), ProviderError> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

/// Ask the helper to exit, then kill it if it lingers.
async fn stop(mut run: Running) {
    if let Ok(line) = serde_json::to_string(&SidecarCommand::Shutdown) {
        let _ = write_line(&mut run.stdin, &format!("{line}\n")).await;
    }
    drop(run.stdin);
    match tokio::time::timeout(STOP_GRACE, run.child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "sidecar exited"),
        Ok(Err(e)) => warn!(error = %e, "failed to wait for sidecar"),
        Err(_) => {
            warn!("sidecar ignored shutdown, killing it");
            let _ = run.child.kill().await;
        }
    }
}

fn fail_pending(pending: &PendingSends) {
    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Err(ProviderError::Disconnected));
        }
    }
}

/// First thing the reader learns about a fresh helper.
#[derive(Debug, PartialEq)]
enum Startup {
    FirstFrame,
    Exited,
}

fn parse_frame(line: &str) -> Result<SidecarFrame, serde_json::Error> {
    serde_json::from_str(line)
}

async fn read_frames(
    stdout: ChildStdout,
    events: mpsc::Sender<SessionEvent>,
    pending: Arc<PendingSends>,
    current: Arc<AtomicU64>,
    generation: u64,
    started: oneshot::Sender<Startup>,
) {
    let mut started = Some(started);
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_frame(line) {
                    Ok(frame) => {
                        if let Some(tx) = started.take() {
                            let _ = tx.send(Startup::FirstFrame);
                        }
                        dispatch(frame, &events, &pending).await
                    }
                    Err(e) => warn!(error = %e, line = %line, "ignoring unparseable sidecar output"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "sidecar stdout read failed");
                break;
            }
        }
    }

    // `initialize` is still watching: it reports the failure itself.
    if let Some(tx) = started.take() {
        if tx.send(Startup::Exited).is_ok() {
            return;
        }
    }

    if current.load(Ordering::SeqCst) == generation {
        fail_pending(&pending);
        let _ = events
            .send(SessionEvent::Disconnected {
                reason: "sidecar exited".into(),
            })
            .await;
    }
}

async fn dispatch(frame: SidecarFrame, events: &mpsc::Sender<SessionEvent>, pending: &PendingSends) {
    let event = match frame {
        SidecarFrame::Qr { code } => SessionEvent::PairingChallenge { code },
        SidecarFrame::Ready { account } => SessionEvent::Ready { account },
        SidecarFrame::AuthFailure { reason } => SessionEvent::AuthFailure { reason },
        SidecarFrame::Disconnected { reason } => SessionEvent::Disconnected { reason },
        SidecarFrame::Message(message) => SessionEvent::Message(message),
        SidecarFrame::Sent { id, message_id } => {
            if let Some((_, tx)) = pending.remove(&id) {
                let _ = tx.send(Ok(message_id));
            }
            return;
        }
        SidecarFrame::SendError { id, error } => {
            if let Some((_, tx)) = pending.remove(&id) {
                let _ = tx.send(Err(ProviderError::SendFailed(error)));
            }
            return;
        }
    };
    let _ = events.send(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> SidecarConfig {
        SidecarConfig {
            send_timeout: Duration::from_secs(5),
            startup_grace: Duration::from_millis(200),
            ..SidecarConfig::new(
                "sh",
                vec!["-c".into(), script.into()],
                PathBuf::from("/tmp/wabridge-session-test"),
            )
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[test]
    fn parses_lifecycle_frames() {
        assert_eq!(
            parse_frame(r#"{"event":"qr","code":"2@abc"}"#).unwrap(),
            SidecarFrame::Qr { code: "2@abc".into() }
        );
        assert_eq!(
            parse_frame(r#"{"event":"ready","account":"5511999999999"}"#).unwrap(),
            SidecarFrame::Ready {
                account: Some("5511999999999".into())
            }
        );
        assert_eq!(
            parse_frame(r#"{"event":"auth_failure"}"#).unwrap(),
            SidecarFrame::AuthFailure { reason: String::new() }
        );
        assert_eq!(
            parse_frame(r#"{"event":"disconnected","reason":"LOGOUT"}"#).unwrap(),
            SidecarFrame::Disconnected { reason: "LOGOUT".into() }
        );
    }

    #[test]
    fn parses_message_frame() {
        let frame = parse_frame(
            r#"{"event":"message","from":"5511@c.us","body":"oi","timestamp":1700000000,"hasMedia":true,"type":"image","isGroup":false}"#,
        )
        .unwrap();
        let SidecarFrame::Message(msg) = frame else {
            panic!("expected message frame");
        };
        assert_eq!(msg.from, "5511@c.us");
        assert_eq!(msg.body, "oi");
        assert!(msg.has_media);
        assert_eq!(msg.kind, "image");
    }

    #[test]
    fn parses_send_acks() {
        assert_eq!(
            parse_frame(r#"{"event":"sent","id":3,"messageId":"wamid.x"}"#).unwrap(),
            SidecarFrame::Sent {
                id: 3,
                message_id: Some("wamid.x".into())
            }
        );
        assert_eq!(
            parse_frame(r#"{"event":"send_error","id":4,"error":"invalid wid"}"#).unwrap(),
            SidecarFrame::SendError {
                id: 4,
                error: "invalid wid".into()
            }
        );
    }

    #[test]
    fn rejects_unknown_frames() {
        assert!(parse_frame(r#"{"event":"battery","level":80}"#).is_err());
        assert!(parse_frame("Chromium revision downloaded").is_err());
    }

    #[test]
    fn send_command_wire_format() {
        let json = serde_json::to_value(SidecarCommand::Send {
            id: 7,
            to: "1@c.us",
            text: "hi",
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"op": "send", "id": 7, "to": "1@c.us", "text": "hi"}));
        let json = serde_json::to_value(SidecarCommand::Shutdown).unwrap();
        assert_eq!(json, serde_json::json!({"op": "shutdown"}));
    }

    #[tokio::test]
    async fn forwards_lifecycle_events() {
        let provider = SidecarProvider::new(sh(
            r#"echo '{"event":"qr","code":"2@abc"}'; echo 'not json'; echo '{"event":"ready","account":"5511"}'; read line"#,
        ));
        let (tx, mut rx) = mpsc::channel(16);
        provider.initialize(tx).await.unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            SessionEvent::PairingChallenge { code: "2@abc".into() }
        );
        assert_eq!(
            next_event(&mut rx).await,
            SessionEvent::Ready {
                account: Some("5511".into())
            }
        );
        provider.shutdown().await;
    }

    #[tokio::test]
    async fn exit_reports_disconnect() {
        let provider = SidecarProvider::new(sh(r#"echo '{"event":"ready"}'"#));
        let (tx, mut rx) = mpsc::channel(16);
        provider.initialize(tx).await.unwrap();

        assert_eq!(next_event(&mut rx).await, SessionEvent::Ready { account: None });
        assert_eq!(
            next_event(&mut rx).await,
            SessionEvent::Disconnected {
                reason: "sidecar exited".into()
            }
        );
    }

    #[tokio::test]
    async fn exports_session_environment() {
        let mut config = sh(
            r#"echo "{\"event\":\"ready\",\"account\":\"$WA_SESSION_DIR|$WA_BROWSER_ARGS\"}"; read line"#,
        );
        config.browser_args = vec!["--no-sandbox".into(), "--disable-gpu".into()];
        let provider = SidecarProvider::new(config);
        let (tx, mut rx) = mpsc::channel(16);
        provider.initialize(tx).await.unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            SessionEvent::Ready {
                account: Some("/tmp/wabridge-session-test|--no-sandbox --disable-gpu".into())
            }
        );
        provider.shutdown().await;
    }

    #[tokio::test]
    async fn send_resolves_on_ack() {
        let provider = SidecarProvider::new(sh(
            r#"read line; echo '{"event":"sent","id":1,"messageId":"wamid.1"}'; read line"#,
        ));
        let (tx, _rx) = mpsc::channel(16);
        provider.initialize(tx).await.unwrap();

        let receipt = provider.send_text("5511@c.us", "hello").await.unwrap();
        assert_eq!(receipt.to, "5511@c.us");
        assert_eq!(receipt.message_id.as_deref(), Some("wamid.1"));
        provider.shutdown().await;
    }

    #[tokio::test]
    async fn send_error_surfaces_cause() {
        let provider = SidecarProvider::new(sh(
            r#"read line; echo '{"event":"send_error","id":1,"error":"invalid wid"}'; read line"#,
        ));
        let (tx, _rx) = mpsc::channel(16);
        provider.initialize(tx).await.unwrap();

        let err = provider.send_text("bogus", "hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::SendFailed(ref cause) if cause == "invalid wid"));
        provider.shutdown().await;
    }

    #[tokio::test]
    async fn exit_before_first_frame_is_launch_error() {
        let provider = SidecarProvider::new(sh(
            "echo \"Error: Cannot find module '/srv/sidecar/index.js'\" >&2; exit 1",
        ));
        let (tx, mut rx) = mpsc::channel(16);
        let err = provider.initialize(tx).await.unwrap_err();

        assert!(err.is_fatal());
        assert!(err.to_string().contains("Cannot find module"), "{err}");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert!(matches!(
            provider.send_text("1@c.us", "hi").await,
            Err(ProviderError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn silent_helper_is_considered_started() {
        let provider = SidecarProvider::new(sh("read line"));
        let (tx, _rx) = mpsc::channel(16);
        assert!(provider.initialize(tx).await.is_ok());
        provider.shutdown().await;
    }

    #[tokio::test]
    async fn send_before_initialize_is_disconnected() {
        let provider = SidecarProvider::new(sh("exit 0"));
        let err = provider.send_text("1@c.us", "hi").await.unwrap_err();
        assert!(matches!(err, ProviderError::Disconnected));
    }

    #[tokio::test]
    async fn missing_command_is_launch_error() {
        let provider = SidecarProvider::new(SidecarConfig::new(
            "/nonexistent/wabridge-sidecar",
            Vec::new(),
            PathBuf::from("/tmp"),
        ));
        let (tx, _rx) = mpsc::channel(16);
        let err = provider.initialize(tx).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn restart_does_not_report_old_process() {
        let provider = SidecarProvider::new(sh("read line"));
        let (tx, mut rx) = mpsc::channel(16);
        provider.initialize(tx.clone()).await.unwrap();
        provider.initialize(tx).await.unwrap();
        provider.shutdown().await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
    }
}
