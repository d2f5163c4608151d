use super::*;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use wabridge_core::event::{ClientEvent, CloseReason};

// -----------------------------------------------------------------------
// Mock transport
// -----------------------------------------------------------------------

#[derive(Default)]
struct MockSession {
    sent: std::sync::Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
    fail_send: bool,
}

#[async_trait]
impl Session for MockSession {
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, BridgeError> {
        if self.fail_send {
            return Err(BridgeError::Transport("connection reset".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((jid.to_string(), text.to_string()));
        Ok(format!("3EB0{}", uuid::Uuid::new_v4().simple()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Counts opens and keeps every sink/session it handed out.
#[derive(Default)]
struct MockTransport {
    opens: AtomicUsize,
    fail_open: AtomicBool,
    fail_send: bool,
    open_delay: Duration,
    sinks: std::sync::Mutex<Vec<EventSink>>,
    sessions: std::sync::Mutex<Vec<Arc<MockSession>>>,
}

impl MockTransport {
    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn sink(&self, index: usize) -> EventSink {
        self.sinks.lock().unwrap()[index].clone()
    }

    fn latest_sink(&self) -> EventSink {
        self.sinks.lock().unwrap().last().cloned().unwrap()
    }

    fn session(&self, index: usize) -> Arc<MockSession> {
        self.sessions.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(
        &self,
        session_dir: &Path,
        events: EventSink,
    ) -> Result<Arc<dyn Session>, BridgeError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        assert!(session_dir.is_dir(), "store must exist before open");
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(BridgeError::Transport("dial failed".to_string()));
        }
        let session = Arc::new(MockSession {
            fail_send: self.fail_send,
            ..Default::default()
        });
        self.sinks.lock().unwrap().push(events);
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

// -----------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------

struct Harness {
    manager: ConnectionManager,
    transport: Arc<MockTransport>,
    _tmp: tempfile::TempDir,
}

fn harness_with(transport: MockTransport, delay: Duration) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let store = SessionStore::new(tmp.path().join("wasi-session"));
    let transport = Arc::new(transport);
    let manager = ConnectionManager::start(
        transport.clone(),
        store,
        ReconnectPolicy::fixed(delay),
        ManagerOptions::default(),
    );
    Harness {
        manager,
        transport,
        _tmp: tmp,
    }
}

fn harness(delay: Duration) -> Harness {
    harness_with(MockTransport::default(), delay)
}

async fn wait_for_state(manager: &ConnectionManager, want: ConnectionState) {
    for _ in 0..300 {
        if manager.state().await == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "state never reached {want}, stuck at {}",
        manager.state().await
    );
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 3s");
}

async fn open_connection(h: &Harness) {
    h.manager.connect().await.unwrap();
    h.transport
        .latest_sink()
        .emit(ClientEvent::Open(Some(UserInfo {
            id: "15550001111:7@s.whatsapp.net".to_string(),
            name: Some("Bridge".to_string()),
        })))
        .await;
    wait_for_state(&h.manager, ConnectionState::Open).await;
}

// -----------------------------------------------------------------------
// connect()
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_initial_state() {
    let h = harness(Duration::from_secs(10));
    let status = h.manager.status().await;
    assert!(!status.is_connected);
    assert_eq!(status.qr_code, None);
    assert_eq!(status.state, ConnectionState::Uninitialized);
    assert_eq!(h.transport.opens(), 0);
}

#[tokio::test]
async fn test_connect_opens_session_and_awaits_pairing() {
    let h = harness(Duration::from_secs(10));
    h.manager.connect().await.unwrap();

    assert_eq!(h.transport.opens(), 1);
    assert_eq!(h.manager.state().await, ConnectionState::AwaitingPairing);
    assert!(h.manager.session_store().exists());
}

#[tokio::test]
async fn test_connect_is_idempotent_while_live() {
    let h = harness(Duration::from_secs(10));
    let first = h.manager.connect().await.unwrap();
    let second = h.manager.connect().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.transport.opens(), 1);

    open_connection(&h).await;
    h.manager.connect().await.unwrap();
    assert_eq!(h.transport.opens(), 1, "open session must be reused");
}

#[tokio::test]
async fn test_concurrent_connects_open_once() {
    let h = harness_with(
        MockTransport {
            open_delay: Duration::from_millis(50),
            ..Default::default()
        },
        Duration::from_secs(10),
    );

    let (a, b) = tokio::join!(h.manager.connect(), h.manager.connect());
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(h.transport.opens(), 1);
}

#[tokio::test]
async fn test_failed_open_restores_state() {
    let h = harness(Duration::from_secs(10));
    h.transport.fail_open.store(true, Ordering::SeqCst);

    let err = h.manager.connect().await.err().unwrap();
    assert!(err.to_string().contains("dial failed"));
    assert_eq!(h.manager.state().await, ConnectionState::Uninitialized);

    h.transport.fail_open.store(false, Ordering::SeqCst);
    h.manager.connect().await.unwrap();
    assert_eq!(h.manager.state().await, ConnectionState::AwaitingPairing);
}

// -----------------------------------------------------------------------
// Event reactions
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_status_after_open() {
    let h = harness(Duration::from_secs(10));
    open_connection(&h).await;

    let status = h.manager.status().await;
    assert!(status.is_connected);
    assert_eq!(status.qr_code, None);
    assert_eq!(
        h.manager.user().await.unwrap().name.as_deref(),
        Some("Bridge")
    );
    assert_eq!(status.user, h.manager.user().await);
}

#[tokio::test]
async fn test_pairing_code_then_open_clears_code() {
    let h = harness(Duration::from_secs(10));
    h.manager.connect().await.unwrap();
    let sink = h.transport.latest_sink();

    sink.emit(ClientEvent::PairingCode("2@abc,def".to_string()))
        .await;
    let manager = h.manager.clone();
    for _ in 0..300 {
        if manager.pairing_code().await.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let status = h.manager.status().await;
    assert_eq!(status.qr_code.as_deref(), Some("2@abc,def"));
    assert!(!status.is_connected);

    sink.emit(ClientEvent::Open(None)).await;
    wait_for_state(&h.manager, ConnectionState::Open).await;
    assert_eq!(h.manager.pairing_code().await, None);
}

#[tokio::test]
async fn test_pairing_code_ignored_while_open() {
    let h = harness(Duration::from_secs(10));
    open_connection(&h).await;
    let sink = h.transport.latest_sink();

    sink.emit(ClientEvent::PairingCode("2@late".to_string()))
        .await;
    // Credentials update is a no-op; use it as a barrier behind the code.
    sink.emit(ClientEvent::CredentialsUpdated).await;
    sink.emit(ClientEvent::Open(None)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = h.manager.status().await;
    assert!(status.is_connected);
    assert_eq!(status.qr_code, None);
}

#[tokio::test]
async fn test_logged_out_wipes_store_without_reconnect() {
    let h = harness(Duration::from_millis(30));
    open_connection(&h).await;
    let creds = h.manager.session_store().path().join("whatsapp.db");
    std::fs::write(&creds, b"creds").unwrap();

    h.transport
        .latest_sink()
        .emit(ClientEvent::Close(CloseReason::LoggedOut))
        .await;
    wait_for_state(&h.manager, ConnectionState::ClosedTerminal).await;
    wait_until(|| !h.manager.session_store().path().exists()).await;

    // Well past the reconnect delay.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.transport.opens(), 1);
    assert_eq!(h.manager.state().await, ConnectionState::ClosedTerminal);
    assert!(h.transport.session(0).closed.load(Ordering::SeqCst));

    let status = h.manager.status().await;
    assert!(!status.is_connected);
    assert_eq!(status.qr_code, None);
}

#[tokio::test]
async fn test_unexpected_close_reconnects_exactly_once_after_delay() {
    let h = harness(Duration::from_millis(150));
    open_connection(&h).await;

    h.transport
        .latest_sink()
        .emit(ClientEvent::Close(CloseReason::ConnectionLost))
        .await;
    wait_for_state(&h.manager, ConnectionState::ClosedRetrying).await;
    assert_eq!(h.transport.opens(), 1, "must wait for the delay");
    wait_until(|| h.transport.session(0).closed.load(Ordering::SeqCst)).await;
    assert!(h.manager.session_store().exists(), "credentials are kept");

    wait_until(|| h.transport.opens() == 2).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.transport.opens(), 2);
    assert_eq!(h.manager.state().await, ConnectionState::AwaitingPairing);
}

#[tokio::test]
async fn test_close_clears_pairing_code() {
    let h = harness(Duration::from_secs(10));
    h.manager.connect().await.unwrap();
    let sink = h.transport.latest_sink();
    sink.emit(ClientEvent::PairingCode("2@abc".to_string()))
        .await;
    sink.emit(ClientEvent::Close(CloseReason::ConnectionReplaced))
        .await;
    wait_for_state(&h.manager, ConnectionState::ClosedRetrying).await;
    assert_eq!(h.manager.pairing_code().await, None);
}

#[tokio::test]
async fn test_duplicate_close_schedules_one_reconnect() {
    let h = harness(Duration::from_millis(50));
    open_connection(&h).await;
    let sink = h.transport.latest_sink();

    sink.emit(ClientEvent::Close(CloseReason::ConnectionClosed))
        .await;
    sink.emit(ClientEvent::Close(CloseReason::ConnectionClosed))
        .await;

    wait_until(|| h.transport.opens() == 2).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.transport.opens(), 2);
}

#[tokio::test]
async fn test_explicit_connect_supersedes_pending_reconnect() {
    let h = harness(Duration::from_millis(150));
    open_connection(&h).await;

    h.transport
        .latest_sink()
        .emit(ClientEvent::Close(CloseReason::RestartRequired))
        .await;
    wait_for_state(&h.manager, ConnectionState::ClosedRetrying).await;

    h.manager.connect().await.unwrap();
    assert_eq!(h.transport.opens(), 2);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.transport.opens(), 2, "pending reconnect must not fire");
}

#[tokio::test]
async fn test_stale_generation_events_are_dropped() {
    let h = harness(Duration::from_millis(20));
    open_connection(&h).await;
    let old = h.transport.sink(0);

    old.emit(ClientEvent::Close(CloseReason::ConnectionLost))
        .await;
    wait_until(|| h.transport.opens() == 2).await;
    let fresh = h.transport.sink(1);
    assert!(fresh.generation() > old.generation());

    old.emit(ClientEvent::Open(None)).await;
    fresh
        .emit(ClientEvent::PairingCode("2@fresh".to_string()))
        .await;
    let manager = h.manager.clone();
    for _ in 0..300 {
        if manager.pairing_code().await.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(h.manager.pairing_code().await.as_deref(), Some("2@fresh"));
    assert_eq!(h.manager.state().await, ConnectionState::AwaitingPairing);
}

#[tokio::test]
async fn test_reconnect_retries_after_failed_open() {
    let h = harness(Duration::from_millis(30));
    open_connection(&h).await;

    h.transport.fail_open.store(true, Ordering::SeqCst);
    h.transport
        .latest_sink()
        .emit(ClientEvent::Close(CloseReason::UnavailableService))
        .await;

    wait_until(|| h.transport.opens() >= 3).await;
    assert_eq!(h.manager.state().await, ConnectionState::ClosedRetrying);

    h.transport.fail_open.store(false, Ordering::SeqCst);
    wait_for_state(&h.manager, ConnectionState::AwaitingPairing).await;
}

#[tokio::test]
async fn test_inbound_message_does_not_change_state() {
    let h = harness(Duration::from_secs(10));
    open_connection(&h).await;
    h.transport
        .latest_sink()
        .emit(ClientEvent::Inbound(wabridge_core::event::InboundMessage {
            id: "ABC".to_string(),
            from: "15551234567@s.whatsapp.net".to_string(),
            text: Some("hello".to_string()),
            timestamp: chrono::Utc::now(),
        }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.manager.state().await, ConnectionState::Open);
}

// -----------------------------------------------------------------------
// logout()
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_logout_wipes_and_closes() {
    let h = harness(Duration::from_millis(30));
    open_connection(&h).await;

    h.manager.logout().await.unwrap();
    assert_eq!(h.manager.state().await, ConnectionState::ClosedTerminal);
    assert!(!h.manager.session_store().path().exists());
    assert!(h.transport.session(0).closed.load(Ordering::SeqCst));

    // Late events from the logged-out session are ignored.
    h.transport.sink(0).emit(ClientEvent::Open(None)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.manager.state().await, ConnectionState::ClosedTerminal);

    // A fresh connect starts over.
    h.manager.connect().await.unwrap();
    assert_eq!(h.transport.opens(), 2);
    assert_eq!(h.manager.state().await, ConnectionState::AwaitingPairing);
}

// -----------------------------------------------------------------------
// send_text()
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_send_without_connect_is_error() {
    let h = harness(Duration::from_secs(10));
    let err = h.manager.send_text("+15551234567", "hi").await.unwrap_err();
    assert!(matches!(err, BridgeError::NotConnected));
}

#[tokio::test]
async fn test_send_while_reconnecting_is_failed_outcome() {
    let h = harness(Duration::from_secs(10));
    open_connection(&h).await;
    h.transport
        .latest_sink()
        .emit(ClientEvent::Close(CloseReason::ConnectionLost))
        .await;
    wait_for_state(&h.manager, ConnectionState::ClosedRetrying).await;

    let outcome = h.manager.send_text("+15551234567", "hi").await.unwrap();
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("WhatsApp connection not established")
    );
    assert!(h.transport.session(0).sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_send_after_logout_is_failed_outcome() {
    let h = harness(Duration::from_secs(10));
    open_connection(&h).await;
    h.manager.logout().await.unwrap();

    let outcome = h.manager.send_text("+15551234567", "hi").await.unwrap();
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("WhatsApp connection not established")
    );
}

#[tokio::test]
async fn test_send_rejects_bad_numbers_without_transport() {
    let h = harness(Duration::from_secs(10));
    open_connection(&h).await;

    let outcome = h.manager.send_text("555-1234", "hi").await.unwrap();
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("Phone number must start with +")
    );

    let outcome = h.manager.send_text("+555-1234", "hi").await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("too short"));

    assert!(h.transport.session(0).sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_send_success() {
    let h = harness(Duration::from_secs(10));
    open_connection(&h).await;

    let outcome = h
        .manager
        .send_text("+1 (555) 123-4567", "hi")
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(!outcome.message_id.unwrap().is_empty());

    let sent = h.transport.session(0).sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![(
            "15551234567@s.whatsapp.net".to_string(),
            "hi".to_string()
        )]
    );
}

#[tokio::test]
async fn test_send_transport_failure_is_reported() {
    let h = harness_with(
        MockTransport {
            fail_send: true,
            ..Default::default()
        },
        Duration::from_secs(10),
    );
    open_connection(&h).await;

    let outcome = h.manager.send_text("+15551234567", "hi").await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("connection reset"));
}
