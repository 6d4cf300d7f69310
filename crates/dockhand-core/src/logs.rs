//! Live log streaming sessions
//!
//! A session is a spawned task that owns the engine log stream and the
//! sending half of a bounded channel. The caller holds a [`LogSubscriber`];
//! closing or dropping it cancels the session, which drops the engine
//! stream and with it the engine-side tail.

use crate::service::bounded;
use crate::{ContainerService, CoreError, ErrorKind, Result};
use dockhand_engine::{ContainerEngine, LogConfig, LogStream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What to stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogRequest {
    pub container: String,
    /// Empty or `all`, a duration like `30m`, an RFC 3339 timestamp, or unix seconds
    #[serde(default)]
    pub since: Option<String>,
    /// Last N lines only (None = everything)
    #[serde(default)]
    pub tail: Option<u64>,
    #[serde(default)]
    pub follow: bool,
}

impl LogRequest {
    pub fn new(container: &str) -> Self {
        Self {
            container: container.to_string(),
            ..Self::default()
        }
    }

    pub fn follow(mut self) -> Self {
        self.follow = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The engine stream ended
    EndOfStream,
    /// The container went away while following
    ContainerRemoved,
}

/// One message on a log session channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LogFrame {
    Line(String),
    Error { kind: ErrorKind, message: String },
    Closed(CloseReason),
}

impl LogFrame {
    /// Whether no frame follows this one
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LogFrame::Line(_))
    }
}

/// Caller end of a log session
pub struct LogSubscriber {
    id: Uuid,
    rx: mpsc::Receiver<LogFrame>,
    cancel: CancellationToken,
}

impl LogSubscriber {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next frame; `None` once the session has finished
    pub async fn recv(&mut self) -> Option<LogFrame> {
        self.rx.recv().await
    }

    /// Stop the session and release the engine stream
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    /// Token that closes the session when cancelled, for use from other tasks
    pub fn close_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for LogSubscriber {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Resolve a `since` value to unix seconds relative to `now`
pub fn parse_since(since: &str, now: i64) -> Result<Option<i64>> {
    let since = since.trim();
    if since.is_empty() || since.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    if since.bytes().all(|b| b.is_ascii_digit()) {
        return since
            .parse::<i64>()
            .map(Some)
            .map_err(|_| CoreError::InvalidParams(format!("invalid since value {:?}", since)));
    }

    let unit = match since.chars().last() {
        Some('s') => Some(1),
        Some('m') => Some(60),
        Some('h') => Some(3600),
        Some('d') => Some(86400),
        _ => None,
    };
    if let Some(unit) = unit {
        if let Ok(n) = since[..since.len() - 1].parse::<i64>() {
            if n < 0 {
                return Err(CoreError::InvalidParams(format!(
                    "since must not be negative: {}",
                    since
                )));
            }
            return n
                .checked_mul(unit)
                .and_then(|secs| now.checked_sub(secs))
                .map(Some)
                .ok_or_else(|| {
                    CoreError::InvalidParams(format!("since is out of range: {}", since))
                });
        }
    }

    chrono::DateTime::parse_from_rfc3339(since)
        .map(|t| Some(t.timestamp()))
        .map_err(|_| {
            CoreError::InvalidParams(format!(
                "invalid since value {:?}: use all, 30m, 24h, 7d, RFC 3339 or unix seconds",
                since
            ))
        })
}

impl ContainerService {
    /// Open a log session for one container
    ///
    /// Request problems and a missing container are returned here; once the
    /// subscriber is handed out, every failure arrives as a frame.
    pub async fn open_logs(&self, req: LogRequest) -> Result<LogSubscriber> {
        let container = req.container.trim().to_string();
        if container.is_empty() {
            return Err(CoreError::InvalidParams("container name is required".into()));
        }
        let since = parse_since(
            req.since.as_deref().unwrap_or_default(),
            chrono::Utc::now().timestamp(),
        )?;

        self.call(self.engine.inspect_container(&container)).await?;

        let config = LogConfig {
            follow: req.follow,
            stdout: true,
            stderr: true,
            tail: req.tail.or(self.config.default_log_tail),
            timestamps: false,
            since,
            until: None,
        };
        let stream = self.call(self.engine.logs(&container, &config)).await?;

        let (tx, rx) = mpsc::channel(self.config.log_channel_capacity.max(1));
        let cancel = CancellationToken::new();
        let session = Session {
            id: Uuid::new_v4(),
            engine: self.engine.clone(),
            container,
            follow: req.follow,
            probe_interval: self.config.log_probe_interval,
            call_timeout: self.config.call_timeout,
            tx,
            cancel: cancel.clone(),
        };
        let id = session.id;
        tracing::debug!(
            "Log session {} opened for {} (follow: {})",
            id,
            session.container,
            session.follow
        );
        tokio::spawn(session.run(stream));

        Ok(LogSubscriber { id, rx, cancel })
    }
}

struct Session {
    id: Uuid,
    engine: Arc<dyn ContainerEngine>,
    container: String,
    follow: bool,
    probe_interval: Duration,
    call_timeout: Duration,
    tx: mpsc::Sender<LogFrame>,
    cancel: CancellationToken,
}

impl Session {
    async fn run(self, stream: LogStream) {
        let mut reader = BufReader::new(stream.stream);
        // read_until keeps partial input in buf when another branch wins
        let mut buf = Vec::new();
        let mut probe = tokio::time::interval(self.probe_interval);
        probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        probe.tick().await;

        let last = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break None,

                read = reader.read_until(b'\n', &mut buf) => match read {
                    Ok(0) => break Some(self.end_of_stream().await),
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf)
                            .trim_end_matches(['\n', '\r'])
                            .to_string();
                        buf.clear();
                        if !self.deliver(LogFrame::Line(line)).await {
                            break None;
                        }
                    }
                    Err(e) => {
                        let err = CoreError::StreamClosed(e.to_string());
                        break Some(LogFrame::Error {
                            kind: err.kind(),
                            message: err.to_string(),
                        });
                    }
                },

                _ = probe.tick(), if self.follow => {
                    if self.container_removed().await {
                        break Some(LogFrame::Closed(CloseReason::ContainerRemoved));
                    }
                }
            }
        };

        match last {
            Some(frame) => {
                tracing::debug!("Log session {} for {} ended: {:?}", self.id, self.container, frame);
                self.deliver(frame).await;
            }
            None => tracing::debug!("Log session {} for {} closed by caller", self.id, self.container),
        }
    }

    /// Send a frame unless the caller goes away first
    async fn deliver(&self, frame: LogFrame) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(frame) => sent.is_ok(),
        }
    }

    async fn container_removed(&self) -> bool {
        match bounded(self.call_timeout, self.engine.inspect_container(&self.container)).await {
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => {
                tracing::debug!("Liveness probe for {} failed: {}", self.container, e);
                false
            }
            Ok(_) => false,
        }
    }

    async fn end_of_stream(&self) -> LogFrame {
        if self.follow && self.container_removed().await {
            LogFrame::Closed(CloseReason::ContainerRemoved)
        } else {
            LogFrame::Closed(CloseReason::EndOfStream)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::ServiceConfig;
    use dockhand_engine::ContainerStatus;

    fn service(mock: &Arc<MockEngine>) -> ContainerService {
        let config = ServiceConfig {
            log_probe_interval: Duration::from_millis(20),
            ..ServiceConfig::default()
        };
        ContainerService::new(mock.clone(), config)
    }

    async fn next(sub: &mut LogSubscriber) -> Option<LogFrame> {
        tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("log frame within 2s")
    }

    fn line(s: &str) -> Option<LogFrame> {
        Some(LogFrame::Line(s.to_string()))
    }

    // ==================== Since parsing ====================

    #[test]
    fn test_parse_since() {
        let now = 1_700_000_000;
        assert_eq!(parse_since("", now).unwrap(), None);
        assert_eq!(parse_since("all", now).unwrap(), None);
        assert_eq!(parse_since("30m", now).unwrap(), Some(now - 1800));
        assert_eq!(parse_since("24h", now).unwrap(), Some(now - 86400));
        assert_eq!(parse_since("7d", now).unwrap(), Some(now - 7 * 86400));
        assert_eq!(parse_since("1699990000", now).unwrap(), Some(1_699_990_000));
        assert_eq!(
            parse_since("2023-11-14T22:13:20Z", now).unwrap(),
            Some(1_700_000_000)
        );

        for bad in ["yesterday", "5w", "-3h", "2023-13-01", "999999999999999d"] {
            let err = parse_since(bad, now).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParams, "{}", bad);
        }
    }

    // ==================== Sessions ====================

    #[tokio::test]
    async fn test_buffered_lines_then_end_of_stream() {
        let mock = Arc::new(MockEngine::new());
        mock.add_container("web", ContainerStatus::Running);
        mock.set_log_lines(&["one", "two", "three"]);
        let svc = service(&mock);

        let mut req = LogRequest::new("web");
        req.tail = Some(2);
        let mut sub = svc.open_logs(req).await.unwrap();

        assert_eq!(next(&mut sub).await, line("two"));
        assert_eq!(next(&mut sub).await, line("three"));
        assert_eq!(
            next(&mut sub).await,
            Some(LogFrame::Closed(CloseReason::EndOfStream))
        );
        assert_eq!(next(&mut sub).await, None);
    }

    #[tokio::test]
    async fn test_follow_delivers_new_lines() {
        let mock = Arc::new(MockEngine::new());
        mock.add_container("web", ContainerStatus::Running);
        mock.set_log_lines(&["boot"]);
        let svc = service(&mock);

        let mut sub = svc.open_logs(LogRequest::new("web").follow()).await.unwrap();
        assert_eq!(next(&mut sub).await, line("boot"));

        mock.push_log_line("GET / 200").await;
        assert_eq!(next(&mut sub).await, line("GET / 200"));

        mock.end_log_streams();
        assert_eq!(
            next(&mut sub).await,
            Some(LogFrame::Closed(CloseReason::EndOfStream))
        );
    }

    #[tokio::test]
    async fn test_read_error_sends_one_error_frame_then_closes() {
        let mock = Arc::new(MockEngine::new());
        mock.add_container("web", ContainerStatus::Running);
        mock.set_log_lines(&["boot"]);
        let svc = service(&mock);

        let mut sub = svc.open_logs(LogRequest::new("web").follow()).await.unwrap();
        assert_eq!(next(&mut sub).await, line("boot"));

        mock.push_log_line("GET / 200").await;
        mock.fail_log_stream(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by engine",
        ));

        assert_eq!(next(&mut sub).await, line("GET / 200"));
        match next(&mut sub).await {
            Some(LogFrame::Error { kind, message }) => {
                assert_eq!(kind, ErrorKind::StreamClosed);
                assert!(message.contains("connection reset by engine"));
            }
            other => panic!("expected an error frame, got {:?}", other),
        }
        assert_eq!(next(&mut sub).await, None);

        for _ in 0..100 {
            if mock.log_stream_dropped() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(mock.log_stream_dropped());
    }

    #[tokio::test]
    async fn test_closing_follow_session_releases_engine_stream() {
        let mock = Arc::new(MockEngine::new());
        mock.add_container("web", ContainerStatus::Running);
        mock.set_log_lines(&["boot"]);
        let svc = service(&mock);

        let mut sub = svc.open_logs(LogRequest::new("web").follow()).await.unwrap();
        assert_eq!(next(&mut sub).await, line("boot"));
        assert!(!mock.log_stream_dropped());

        sub.close();

        let released = tokio::time::timeout(Duration::from_secs(2), async {
            while !mock.log_stream_dropped() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(released.is_ok(), "engine stream still held after close");
    }

    #[tokio::test]
    async fn test_dropping_subscriber_releases_engine_stream() {
        let mock = Arc::new(MockEngine::new());
        mock.add_container("web", ContainerStatus::Running);
        let svc = service(&mock);

        let sub = svc.open_logs(LogRequest::new("web").follow()).await.unwrap();
        drop(sub);

        let released = tokio::time::timeout(Duration::from_secs(2), async {
            while !mock.log_stream_dropped() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(released.is_ok());
    }

    #[tokio::test]
    async fn test_container_removal_closes_session() {
        let mock = Arc::new(MockEngine::new());
        mock.add_container("web", ContainerStatus::Running);
        mock.set_log_lines(&["boot"]);
        let svc = service(&mock);

        let mut sub = svc.open_logs(LogRequest::new("web").follow()).await.unwrap();
        assert_eq!(next(&mut sub).await, line("boot"));

        mock.remove("web", true).await.unwrap();

        assert_eq!(
            next(&mut sub).await,
            Some(LogFrame::Closed(CloseReason::ContainerRemoved))
        );
        assert_eq!(next(&mut sub).await, None);
    }

    #[tokio::test]
    async fn test_request_validation_happens_before_session() {
        let mock = Arc::new(MockEngine::new());
        mock.add_container("web", ContainerStatus::Running);
        let svc = service(&mock);

        let mut req = LogRequest::new("web");
        req.since = Some("last tuesday".into());
        let err = svc.open_logs(req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);

        let err = svc.open_logs(LogRequest::new("  ")).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);

        let err = svc.open_logs(LogRequest::new("ghost")).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert!(!mock
            .get_calls()
            .iter()
            .any(|c| matches!(c, MockCall::Logs { .. })));
    }

    #[tokio::test]
    async fn test_default_tail_applies() {
        let mock = Arc::new(MockEngine::new());
        mock.add_container("web", ContainerStatus::Running);
        mock.set_log_lines(&["a", "b", "c"]);
        let config = ServiceConfig {
            default_log_tail: Some(1),
            ..ServiceConfig::default()
        };
        let svc = ContainerService::new(mock.clone(), config);

        let mut sub = svc.open_logs(LogRequest::new("web")).await.unwrap();
        assert_eq!(next(&mut sub).await, line("c"));
        assert!(next(&mut sub).await.unwrap().is_terminal());
    }

    #[test]
    fn test_frame_wire_format() {
        let json = serde_json::to_string(&LogFrame::Closed(CloseReason::ContainerRemoved)).unwrap();
        assert_eq!(json, r#"{"type":"closed","data":"container_removed"}"#);
    }
}
