//! Weighbridge indicator link.
//!
//! Owns the connection to one weight indicator and turns its text stream
//! into weight updates.
//!
//! Key design goals:
//! - **One reader**: a single cancellable background task per connection;
//!   `connect()` while connecting/connected fails fast
//! - **Fire-and-forget events**: state changes and decoded weights go out on
//!   a broadcast channel; a slow subscriber can lag but never stalls the loop
//! - **Guaranteed release**: the device handle is owned by the reader task
//!   and dropped exactly once when it exits, whatever the exit path
//! - **Faults are states**: open/read failures move the link to `Error`;
//!   an explicit reconnect is the only way out

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::ScaleError;
use crate::serial::{PortProvider, ReadOutcome, ScaleSource, SCALE_LINE};
use crate::weight_frame::{match_frame, Framer, Framing};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Link connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        })
    }
}

/// Events published to subscribers, in the order they happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScaleEvent {
    StateChanged { state: ConnectionState },
    Weight { value: f64 },
}

/// Point-in-time view of the link.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleStatus {
    pub state: ConnectionState,
    pub device: Option<String>,
    pub last_weight: Option<f64>,
}

const EVENT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct LinkShared {
    state: Mutex<ConnectionState>,
    last_weight: Mutex<Option<f64>>,
    device: Mutex<Option<String>>,
    events: broadcast::Sender<ScaleEvent>,
}

impl LinkShared {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, next: ConnectionState) {
        let changed = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let changed = *state != next;
            *state = next;
            changed
        };
        if changed {
            self.announce(next);
        }
    }

    /// Publish a state that was already stored under the state lock.
    fn announce(&self, state: ConnectionState) {
        info!(state = %state, "Scale link state changed");
        let _ = self.events.send(ScaleEvent::StateChanged { state });
    }

    /// Store and publish a weight unless the reader has been cancelled.
    ///
    /// The check runs under the weight lock, so nothing from a cancelled
    /// reader lands after [`LinkShared::clear`].
    fn publish_weight(&self, value: f64, cancel: &CancellationToken) {
        let mut last = self.last_weight.lock().unwrap_or_else(|e| e.into_inner());
        if cancel.is_cancelled() {
            return;
        }
        *last = Some(value);
        let _ = self.events.send(ScaleEvent::Weight { value });
    }

    fn clear(&self) {
        *self.last_weight.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.device.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// The running reader of one connection.
struct ReaderSession {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// ScaleLink
// ---------------------------------------------------------------------------

/// Connection to a single weight indicator.
pub struct ScaleLink {
    provider: Arc<dyn PortProvider>,
    framing: Framing,
    shared: Arc<LinkShared>,
    reader: Mutex<Option<ReaderSession>>,
}

impl ScaleLink {
    pub fn new(provider: Arc<dyn PortProvider>, framing: Framing) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            provider,
            framing,
            shared: Arc::new(LinkShared {
                state: Mutex::new(ConnectionState::Disconnected),
                last_weight: Mutex::new(None),
                device: Mutex::new(None),
                events,
            }),
            reader: Mutex::new(None),
        }
    }

    /// Subscribe to state changes and weight updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScaleEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Most recent decoded weight, cleared on disconnect.
    pub fn last_weight(&self) -> Option<f64> {
        *self.shared.last_weight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> ScaleStatus {
        ScaleStatus {
            state: self.state(),
            device: self
                .shared
                .device
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            last_weight: self.last_weight(),
        }
    }

    /// Open the indicator and start the background reader.
    ///
    /// Fails fast with [`ScaleError::AlreadyActive`] if a connection is
    /// already in flight or up. Any other failure leaves the link in
    /// [`ConnectionState::Error`].
    pub async fn connect(&self) -> Result<(), ScaleError> {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    return Err(ScaleError::AlreadyActive(*state));
                }
                ConnectionState::Disconnected | ConnectionState::Error => {}
            }
            if !self.provider.is_supported() {
                drop(state);
                warn!("Serial I/O not available on this host");
                self.shared.transition(ConnectionState::Error);
                return Err(ScaleError::Unsupported);
            }
            *state = ConnectionState::Connecting;
        }
        self.shared.announce(ConnectionState::Connecting);

        // A reader left over from a faulted connection has already exited;
        // reap it before starting a new one.
        self.reap_reader().await;

        let provider = self.provider.clone();
        let opened = tokio::task::spawn_blocking(move || provider.open(&SCALE_LINE))
            .await
            .map_err(|e| ScaleError::Open(format!("open task failed: {e}")))
            .and_then(|r| r);

        let source = match opened {
            Ok(source) => source,
            Err(e) => {
                warn!(error = %e, "Failed to connect to indicator");
                if self.state() == ConnectionState::Connecting {
                    self.shared.transition(ConnectionState::Error);
                }
                return Err(e);
            }
        };

        let device = source.description();

        // The reader slot is held from the state flip until the session is
        // stored, so a concurrent disconnect() either supersedes this attempt
        // or finds the session and cancels it.
        let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != ConnectionState::Connecting {
                drop(state);
                drop(reader);
                info!("Connection attempt superseded by disconnect");
                drop(source);
                return Err(ScaleError::Cancelled);
            }
            *state = ConnectionState::Connected;
        }
        *self.shared.device.lock().unwrap_or_else(|e| e.into_inner()) = Some(device);
        self.shared.announce(ConnectionState::Connected);

        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            let shared = self.shared.clone();
            let framing = self.framing;
            tokio::task::spawn_blocking(move || run_reader(source, framing, shared, cancel))
        };
        *reader = Some(ReaderSession { cancel, task });
        Ok(())
    }

    /// Stop the reader, release the device and clear the last weight.
    ///
    /// Idempotent and safe to call when never connected, or while
    /// `connect()` is in flight. Returns once the device handle is released.
    pub async fn disconnect(&self) {
        let session = {
            let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
            let session = reader.take();
            if let Some(session) = &session {
                session.cancel.cancel();
            }
            self.shared.clear();
            self.shared.transition(ConnectionState::Disconnected);
            session
        };
        if let Some(session) = session {
            if let Err(e) = session.task.await {
                warn!(error = %e, "Scale reader task ended abnormally");
            }
        }
    }

    /// Cancel the current reader (if any) and wait for it to release the
    /// device.
    async fn reap_reader(&self) {
        let session = self.reader.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(session) = session {
            session.cancel.cancel();
            if let Err(e) = session.task.await {
                warn!(error = %e, "Scale reader task ended abnormally");
            }
        }
    }
}

impl Drop for ScaleLink {
    fn drop(&mut self) {
        // The reader owns the device; cancelling is enough for it to exit
        // within one poll interval and drop the handle.
        if let Some(session) = self
            .reader
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            session.cancel.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

fn run_reader(
    mut source: Box<dyn ScaleSource>,
    framing: Framing,
    shared: Arc<LinkShared>,
    cancel: CancellationToken,
) {
    let device = source.description();
    info!(device = %device, framing = %framing, "Scale background reader started");
    let mut framer = Framer::new(framing);

    while !cancel.is_cancelled() {
        match source.read_chunk() {
            Ok(ReadOutcome::Data(chunk)) => {
                if cancel.is_cancelled() {
                    break;
                }
                debug!(raw = ?chunk, "Raw data from scale");
                for frame in framer.push(&chunk) {
                    match match_frame(&frame) {
                        Some(m) => {
                            trace!(rule = m.rule, weight = m.value, "Decoded weight frame");
                            shared.publish_weight(m.value, &cancel);
                        }
                        None => trace!(frame = ?frame, "No weight in frame"),
                    }
                }
            }
            Ok(ReadOutcome::Idle) => {}
            Ok(ReadOutcome::Closed) => {
                info!(device = %device, "Indicator stream ended");
                if !cancel.is_cancelled() {
                    shared.clear();
                    shared.transition(ConnectionState::Disconnected);
                }
                break;
            }
            Err(e) => {
                if !cancel.is_cancelled() {
                    warn!(device = %device, error = %e, "Error reading from serial port");
                    shared.transition(ConnectionState::Error);
                }
                break;
            }
        }
    }

    drop(source);
    info!(device = %device, "Scale background reader stopped");
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::LineSettings;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    /// What the scripted indicator does on its next read.
    enum Scripted {
        Text(&'static str),
        Fault,
        Eof,
    }

    struct ScriptedSource {
        rx: mpsc::Receiver<Scripted>,
        released: Arc<AtomicUsize>,
        describe_delay: Duration,
    }

    impl ScaleSource for ScriptedSource {
        fn read_chunk(&mut self) -> std::io::Result<ReadOutcome> {
            match self.rx.recv_timeout(Duration::from_millis(20)) {
                Ok(Scripted::Text(t)) => Ok(ReadOutcome::Data(t.to_string())),
                Ok(Scripted::Fault) => Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "device unplugged",
                )),
                Ok(Scripted::Eof) => Ok(ReadOutcome::Closed),
                Err(mpsc::RecvTimeoutError::Timeout) => Ok(ReadOutcome::Idle),
                Err(mpsc::RecvTimeoutError::Disconnected) => Ok(ReadOutcome::Closed),
            }
        }

        fn description(&self) -> String {
            std::thread::sleep(self.describe_delay);
            "Scripted(test)".to_string()
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Port provider that hands out scripted sources.
    #[derive(Default)]
    struct ScriptedProvider {
        unsupported: bool,
        fail_open: bool,
        open_delay: Duration,
        describe_delay: Duration,
        opened: AtomicUsize,
        released: Arc<AtomicUsize>,
        feed: Mutex<Option<mpsc::Sender<Scripted>>>,
    }

    impl ScriptedProvider {
        fn send(&self, item: Scripted) {
            let feed = self.feed.lock().unwrap();
            feed.as_ref().expect("no open source").send(item).unwrap();
        }
    }

    impl PortProvider for ScriptedProvider {
        fn is_supported(&self) -> bool {
            !self.unsupported
        }

        fn open(&self, settings: &LineSettings) -> Result<Box<dyn ScaleSource>, ScaleError> {
            assert_eq!(settings.baud_rate, 9600);
            std::thread::sleep(self.open_delay);
            if self.fail_open {
                return Err(ScaleError::Open("access denied".into()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel();
            *self.feed.lock().unwrap() = Some(tx);
            Ok(Box::new(ScriptedSource {
                rx,
                released: self.released.clone(),
                describe_delay: self.describe_delay,
            }))
        }
    }

    fn link_with(provider: Arc<ScriptedProvider>) -> ScaleLink {
        ScaleLink::new(provider, Framing::Chunk)
    }

    async fn next_weight(rx: &mut broadcast::Receiver<ScaleEvent>) -> f64 {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for weight")
                .expect("channel closed");
            if let ScaleEvent::Weight { value } = event {
                return value;
            }
        }
    }

    async fn wait_for_state(link: &ScaleLink, expected: ConnectionState) {
        for _ in 0..200 {
            if link.state() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("link never reached {expected}, stuck at {}", link.state());
    }

    #[tokio::test]
    async fn test_connect_unsupported_host() {
        let provider = Arc::new(ScriptedProvider {
            unsupported: true,
            ..Default::default()
        });
        let link = link_with(provider.clone());
        let result = link.connect().await;
        assert!(matches!(result, Err(ScaleError::Unsupported)));
        assert_eq!(link.state(), ConnectionState::Error);
        assert_eq!(provider.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_open_failure_is_error_state() {
        let provider = Arc::new(ScriptedProvider {
            fail_open: true,
            ..Default::default()
        });
        let link = link_with(provider);
        assert!(matches!(link.connect().await, Err(ScaleError::Open(_))));
        assert_eq!(link.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_connect_emits_states_and_weights() {
        let provider = Arc::new(ScriptedProvider::default());
        let link = link_with(provider.clone());
        let mut rx = link.subscribe();

        link.connect().await.unwrap();
        assert_eq!(link.state(), ConnectionState::Connected);
        assert_eq!(
            rx.recv().await.unwrap(),
            ScaleEvent::StateChanged {
                state: ConnectionState::Connecting
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ScaleEvent::StateChanged {
                state: ConnectionState::Connected
            }
        );

        provider.send(Scripted::Text("garbage"));
        provider.send(Scripted::Text("ST,GS,    1200,kg"));
        assert_eq!(next_weight(&mut rx).await, 1200.0);
        assert_eq!(link.last_weight(), Some(1200.0));
        assert_eq!(link.status().device.as_deref(), Some("Scripted(test)"));

        link.disconnect().await;
    }

    #[tokio::test]
    async fn test_second_connect_fails_fast() {
        let provider = Arc::new(ScriptedProvider::default());
        let link = link_with(provider.clone());
        link.connect().await.unwrap();

        let second = link.connect().await;
        assert!(matches!(
            second,
            Err(ScaleError::AlreadyActive(ConnectionState::Connected))
        ));
        assert_eq!(provider.opened.load(Ordering::SeqCst), 1);

        link.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_releases_once() {
        let provider = Arc::new(ScriptedProvider::default());
        let link = link_with(provider.clone());
        link.connect().await.unwrap();
        provider.send(Scripted::Text("NET 800"));
        for _ in 0..200 {
            if link.last_weight().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(link.last_weight(), Some(800.0));

        link.disconnect().await;
        link.disconnect().await;

        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.last_weight(), None);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected() {
        let provider = Arc::new(ScriptedProvider::default());
        let link = link_with(provider.clone());
        let mut rx = link.subscribe();

        link.disconnect().await;

        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(provider.released.load(Ordering::SeqCst), 0);
        // No transition happened, so nothing was published.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_io_fault_then_reconnect() {
        let provider = Arc::new(ScriptedProvider::default());
        let link = link_with(provider.clone());
        link.connect().await.unwrap();

        provider.send(Scripted::Fault);
        wait_for_state(&link, ConnectionState::Error).await;

        link.connect().await.unwrap();
        assert_eq!(link.state(), ConnectionState::Connected);
        assert_eq!(provider.opened.load(Ordering::SeqCst), 2);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);

        link.disconnect().await;
        assert_eq!(provider.released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_end_of_stream_disconnects() {
        let provider = Arc::new(ScriptedProvider::default());
        let link = link_with(provider.clone());
        link.connect().await.unwrap();

        provider.send(Scripted::Eof);
        wait_for_state(&link, ConnectionState::Disconnected).await;
        assert_eq!(link.last_weight(), None);

        link.disconnect().await;
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_line_framing_reassembles() {
        let provider = Arc::new(ScriptedProvider::default());
        let link = ScaleLink::new(provider.clone(), Framing::Line);
        let mut rx = link.subscribe();
        link.connect().await.unwrap();

        provider.send(Scripted::Text("ST,GS,+  15"));
        provider.send(Scripted::Text("00.5kg\r\n"));
        assert_eq!(next_weight(&mut rx).await, 1500.5);

        link.disconnect().await;
    }

    #[tokio::test]
    async fn test_drop_cancels_reader() {
        let provider = Arc::new(ScriptedProvider::default());
        let link = link_with(provider.clone());
        link.connect().await.unwrap();
        drop(link);

        for _ in 0..200 {
            if provider.released.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("device handle was not released after drop");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disconnect_while_port_opening_cancels_connect() {
        let provider = Arc::new(ScriptedProvider {
            open_delay: Duration::from_millis(300),
            ..Default::default()
        });
        let link = Arc::new(link_with(provider.clone()));
        let connecting = {
            let link = link.clone();
            tokio::spawn(async move { link.connect().await })
        };
        wait_for_state(&link, ConnectionState::Connecting).await;

        link.disconnect().await;
        let result = connecting.await.unwrap();

        assert!(matches!(result, Err(ScaleError::Cancelled)));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(provider.opened.load(Ordering::SeqCst), 1);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disconnect_during_connect_handshake_leaves_no_reader() {
        let provider = Arc::new(ScriptedProvider {
            describe_delay: Duration::from_millis(300),
            ..Default::default()
        });
        let link = Arc::new(link_with(provider.clone()));
        let connecting = {
            let link = link.clone();
            tokio::spawn(async move { link.connect().await })
        };
        // Wait until the port is open and the link is still settling.
        for _ in 0..200 {
            if provider.opened.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        link.disconnect().await;
        let result = connecting.await.unwrap();

        // Whichever side won, no reader may outlive disconnect().
        if result.is_ok() {
            link.disconnect().await;
        } else {
            assert!(matches!(result, Err(ScaleError::Cancelled)));
        }
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
        assert_eq!(link.last_weight(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disconnect_once_connected_releases_before_returning() {
        let provider = Arc::new(ScriptedProvider {
            describe_delay: Duration::from_millis(100),
            ..Default::default()
        });
        let link = Arc::new(link_with(provider.clone()));
        let connecting = {
            let link = link.clone();
            tokio::spawn(async move { link.connect().await })
        };
        wait_for_state(&link, ConnectionState::Connected).await;

        link.disconnect().await;
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
        assert_eq!(link.state(), ConnectionState::Disconnected);

        connecting.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.last_weight(), None);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }
}
