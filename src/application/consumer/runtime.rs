//! Consumer runtime.
//!
//! A single task owns the [`ConsumerCore`] and the live connection. It
//! multiplexes user commands, the dedup cleanup ticker, a pending connection
//! attempt, incoming frames and the reconnect timer; nothing else touches
//! consumer state. Callers talk to it through a [`ConsumerHandle`].

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::state::{ConsumerCore, ConsumerSnapshot, Directive, FrameOutcome};
use crate::domain::PackageFrame;
use crate::error::{Error, Result, TransportError};
use crate::infrastructure::config::consumer::ConsumerConfig;
use crate::port::{PushConnection, PushTransport};

const COMMAND_CAPACITY: usize = 16;
const ACCEPTED_CAPACITY: usize = 256;

type PendingOpen = BoxFuture<'static, std::result::Result<Box<dyn PushConnection>, TransportError>>;

enum Command {
    Connect,
    Disconnect,
    Items(oneshot::Sender<Vec<PackageFrame>>),
}

/// Handle to a running consumer.
pub struct ConsumerHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConsumerSnapshot>,
    accepted: broadcast::Sender<PackageFrame>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConsumerHandle {
    /// Spawn a consumer that connects immediately.
    pub fn spawn(transport: Arc<dyn PushTransport>, config: ConsumerConfig) -> Self {
        Self::spawn_with(transport, ConsumerCore::new(config.clone()), config)
    }

    /// Spawn a consumer that resumes after `from_sequence`.
    pub fn spawn_from(
        transport: Arc<dyn PushTransport>,
        config: ConsumerConfig,
        from_sequence: Option<u64>,
    ) -> Self {
        let core = ConsumerCore::new(config.clone()).with_resume_cursor(from_sequence);
        Self::spawn_with(transport, core, config)
    }

    fn spawn_with(transport: Arc<dyn PushTransport>, core: ConsumerCore, config: ConsumerConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (status_tx, status_rx) = watch::channel(core.snapshot());
        let (accepted_tx, _) = broadcast::channel(ACCEPTED_CAPACITY);
        let cancel = CancellationToken::new();

        let actor = ConsumerActor {
            core,
            config,
            transport,
            opening: None,
            connection: None,
            reconnect_at: None,
            commands: commands_rx,
            status: status_tx,
            accepted: accepted_tx.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            status: status_rx,
            accepted: accepted_tx,
            cancel,
            task: Some(task),
        }
    }

    /// Latest published state.
    #[must_use]
    pub fn status(&self) -> ConsumerSnapshot {
        self.status.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ConsumerSnapshot> {
        self.status.clone()
    }

    /// Receiver of newly accepted packages.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PackageFrame> {
        self.accepted.subscribe()
    }

    /// Re-enable connecting after a manual disconnect or a terminal failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer has stopped.
    pub async fn connect(&self) -> Result<()> {
        self.send(Command::Connect).await
    }

    /// Drop the connection and suppress reconnects until [`connect`].
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer has stopped.
    ///
    /// [`connect`]: Self::connect
    pub async fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect).await
    }

    /// Retained items, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer has stopped.
    pub async fn items(&self) -> Result<Vec<PackageFrame>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Items(tx)).await?;
        rx.await.map_err(|_| stopped())
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| stopped())
    }

    /// Stop the consumer without reconnecting and wait for it to finish.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn stopped() -> Error {
    Error::Connection("consumer has stopped".into())
}

struct ConsumerActor {
    core: ConsumerCore,
    config: ConsumerConfig,
    transport: Arc<dyn PushTransport>,
    opening: Option<PendingOpen>,
    connection: Option<Box<dyn PushConnection>>,
    reconnect_at: Option<Instant>,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<ConsumerSnapshot>,
    accepted: broadcast::Sender<PackageFrame>,
    cancel: CancellationToken,
}

impl ConsumerActor {
    async fn run(mut self) {
        let period = self.config.cleanup_interval();
        let mut cleanup = interval_at(Instant::now() + period, period);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let directive = self.core.start();
        self.apply(directive);

        loop {
            self.publish();
            tokio::select! {
                () = self.cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = cleanup.tick() => {
                    let purged = self.core.purge(Instant::now());
                    trace!(purged, remaining = self.core.dedup().len(), "Dedup cache cleanup");
                }
                opened = finish_open(&mut self.opening) => {
                    self.opening = None;
                    self.handle_opened(opened);
                }
                frame = next_frame(&mut self.connection) => self.handle_frame(frame),
                () = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    let directive = self.core.on_reconnect_due();
                    self.apply(directive);
                }
            }
        }

        self.opening = None;
        self.connection = None;
        self.core.close();
        info!("Consumer stopped");
    }

    fn publish(&self) {
        let snapshot = self.core.snapshot();
        self.status.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                self.opening = None;
                self.connection = None;
                self.reconnect_at = None;
                let directive = self.core.connect();
                self.apply(directive);
            }
            Command::Disconnect => {
                self.opening = None;
                self.connection = None;
                self.reconnect_at = None;
                self.core.disconnect();
            }
            Command::Items(reply) => {
                let _ = reply.send(self.core.items().cloned().collect());
            }
        }
    }

    fn handle_frame(&mut self, frame: std::result::Result<String, TransportError>) {
        match frame {
            Ok(data) => {
                if let FrameOutcome::Accepted(package) = self.core.on_frame(&data, Instant::now()) {
                    let _ = self.accepted.send(package);
                }
            }
            Err(err) => {
                self.connection = None;
                let directive = self.core.on_transport_error(&err);
                self.schedule(directive);
            }
        }
    }

    /// Carry out a directive. An open is started here and finished by the
    /// run loop, so commands still get through while it is pending.
    fn apply(&mut self, directive: Directive) {
        let from_sequence = match directive {
            Directive::Open { from_sequence } => from_sequence,
            other => {
                self.schedule(other);
                return;
            }
        };

        debug!(from_sequence = ?from_sequence, "Opening push connection");
        let transport = Arc::clone(&self.transport);
        let open: PendingOpen = Box::pin(async move { transport.open(from_sequence).await });
        self.opening = Some(open);
    }

    fn handle_opened(
        &mut self,
        opened: std::result::Result<Box<dyn PushConnection>, TransportError>,
    ) {
        match opened {
            Ok(connection) => self.connection = Some(connection),
            Err(err) => {
                let directive = self.core.on_transport_error(&err);
                self.schedule(directive);
            }
        }
    }

    /// Carry out a directive that needs no I/O.
    fn schedule(&mut self, directive: Directive) {
        match directive {
            Directive::Reconnect { delay, .. } => {
                self.reconnect_at = Some(Instant::now() + delay);
            }
            Directive::GiveUp | Directive::Idle => {
                self.reconnect_at = None;
            }
            Directive::Open { .. } => {
                self.reconnect_at = Some(Instant::now());
            }
        }
    }
}

async fn finish_open(
    pending: &mut Option<PendingOpen>,
) -> std::result::Result<Box<dyn PushConnection>, TransportError> {
    match pending {
        Some(open) => open.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(
    connection: &mut Option<Box<dyn PushConnection>>,
) -> std::result::Result<String, TransportError> {
    match connection {
        Some(connection) => connection.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::consumer::state::ConnectionState;
    use crate::testkit::domain::{connected_json, package_frame_json};
    use crate::testkit::push::{ScriptedConnection, ScriptedTransport};

    async fn wait_for(
        status: &mut watch::Receiver<ConsumerSnapshot>,
        predicate: impl Fn(&ConsumerSnapshot) -> bool,
    ) -> ConsumerSnapshot {
        status.wait_for(|s| predicate(s)).await.unwrap().clone()
    }

    #[tokio::test]
    async fn test_receives_and_dedups() {
        let transport = Arc::new(ScriptedTransport::with_connections(vec![ScriptedConnection::open(vec![
            connected_json(),
            package_frame_json(1, "a", "1.0.0"),
            package_frame_json(2, "a", "1.0.0"),
            package_frame_json(3, "b", "1.0.0"),
        ])]));

        let consumer = ConsumerHandle::spawn(transport.clone(), ConsumerConfig::default());
        let mut status = consumer.watch();
        let snapshot = wait_for(&mut status, |s| s.last_sequence == Some(3)).await;

        assert_eq!(snapshot.state, ConnectionState::Open);
        assert_eq!(snapshot.packages_received, 2);
        assert_eq!(snapshot.duplicates_filtered, 1);
        assert_eq!(consumer.items().await.unwrap().len(), 2);
        assert_eq!(transport.opened_from(), vec![None]);

        consumer.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_from_cursor() {
        let transport = Arc::new(ScriptedTransport::with_connections(vec![
            ScriptedConnection::closing(vec![connected_json(), package_frame_json(41, "a", "1")]),
            ScriptedConnection::open(vec![connected_json(), package_frame_json(42, "b", "1")]),
        ]));

        let consumer = ConsumerHandle::spawn(transport.clone(), ConsumerConfig::default());
        let mut status = consumer.watch();
        let snapshot = wait_for(&mut status, |s| s.last_sequence == Some(42)).await;

        assert_eq!(snapshot.state, ConnectionState::Open);
        assert_eq!(transport.opened_from(), vec![None, Some(41)]);
        consumer.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_between_attempts() {
        let transport = Arc::new(ScriptedTransport::with_connections(vec![
            ScriptedConnection::unreachable(),
            ScriptedConnection::unreachable(),
            ScriptedConnection::open(vec![connected_json()]),
        ]));

        let started = Instant::now();
        let consumer = ConsumerHandle::spawn(transport.clone(), ConsumerConfig::default());
        let mut status = consumer.watch();
        wait_for(&mut status, |s| s.state == ConnectionState::Open).await;

        // 3s after the first refusal, 6s after the second
        assert!(started.elapsed() >= Duration::from_secs(9));
        assert_eq!(transport.open_count(), 3);
        consumer.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_after_network_budget() {
        let transport = Arc::new(ScriptedTransport::new());
        let consumer = ConsumerHandle::spawn(transport.clone(), ConsumerConfig::default());
        let mut status = consumer.watch();

        let snapshot = wait_for(&mut status, |s| s.state == ConnectionState::Failed).await;
        assert_eq!(transport.open_count(), 4);
        assert!(snapshot
            .status_message
            .unwrap()
            .starts_with("Network connection lost"));

        transport.push(ScriptedConnection::open(vec![connected_json()]));
        consumer.connect().await.unwrap();
        wait_for(&mut status, |s| s.state == ConnectionState::Open).await;
        consumer.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_disconnect_stops_reconnecting() {
        let transport = Arc::new(ScriptedTransport::new());
        let tx = transport.push_channel();

        let consumer = ConsumerHandle::spawn(transport.clone(), ConsumerConfig::default());
        let mut status = consumer.watch();
        tx.send(Ok(connected_json())).unwrap();
        wait_for(&mut status, |s| s.state == ConnectionState::Open).await;

        consumer.disconnect().await.unwrap();
        wait_for(&mut status, |s| s.state == ConnectionState::ManuallyDisconnected).await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.open_count(), 1);
        assert_eq!(consumer.status().state, ConnectionState::ManuallyDisconnected);
        consumer.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_open_is_pending() {
        let transport = Arc::new(ScriptedTransport::with_connections(vec![ScriptedConnection::Hang]));
        let consumer = ConsumerHandle::spawn(transport.clone(), ConsumerConfig::default());
        let mut status = consumer.watch();
        wait_for(&mut status, |s| s.state == ConnectionState::Connecting).await;

        consumer.disconnect().await.unwrap();
        wait_for(&mut status, |s| s.state == ConnectionState::ManuallyDisconnected).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(consumer.status().state, ConnectionState::ManuallyDisconnected);
        assert_eq!(transport.open_count(), 1);

        transport.push(ScriptedConnection::open(vec![connected_json()]));
        consumer.connect().await.unwrap();
        wait_for(&mut status, |s| s.state == ConnectionState::Open).await;
        assert_eq!(transport.open_count(), 2);
        consumer.close().await;
    }

    #[tokio::test]
    async fn test_close_while_open_is_pending() {
        let transport = Arc::new(ScriptedTransport::with_connections(vec![ScriptedConnection::Hang]));
        let consumer = ConsumerHandle::spawn(transport, ConsumerConfig::default());
        tokio::time::timeout(Duration::from_secs(5), consumer.close())
            .await
            .expect("consumer stops while connecting");
    }

    #[tokio::test]
    async fn test_zero_cleanup_interval_still_runs() {
        let transport = Arc::new(ScriptedTransport::with_connections(vec![ScriptedConnection::open(vec![
            package_frame_json(1, "a", "1.0.0"),
        ])]));
        let config = ConsumerConfig {
            cleanup_interval_secs: 0,
            ..ConsumerConfig::default()
        };

        let consumer = ConsumerHandle::spawn(transport, config);
        let mut status = consumer.watch();
        let snapshot = wait_for(&mut status, |s| s.last_sequence == Some(1)).await;
        assert_eq!(snapshot.packages_received, 1);
        consumer.close().await;
    }

    #[tokio::test]
    async fn test_subscribe_receives_accepted() {
        let transport = Arc::new(ScriptedTransport::new());
        let tx = transport.push_channel();

        let consumer = ConsumerHandle::spawn(transport.clone(), ConsumerConfig::default());
        let mut accepted = consumer.subscribe();
        tx.send(Ok(package_frame_json(5, "left-pad", "1.0.0"))).unwrap();

        let frame = accepted.recv().await.unwrap();
        assert_eq!(frame.sequence_number, Some(5));
        assert_eq!(frame.event.package.name, "left-pad");
        consumer.close().await;
    }
}
