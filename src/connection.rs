use crate::cache::StateCache;
use crate::correlator::PendingTable;
use crate::dispatch::Dispatcher;
use crate::error::{LwrpError, Result};
use crate::protocol::{Command, Frame, FrameAssembler, Topic};
use crate::session::SessionState;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;

/// State shared between callers issuing commands and the read loop
struct Shared {
    /// Commands awaiting replies
    pending: PendingTable,
    /// Channel to the writer task; `None` once the connection is down
    line_tx: Option<mpsc::UnboundedSender<String>>,
}

/// Low-level LWRP connection: owns the socket and the three background
/// tasks (writer, reader, dispatcher) that service it.
///
/// The writer task serializes all outgoing lines so concurrent `issue`
/// calls never interleave bytes on the wire. The reader task assembles
/// frames and either completes a pending command or records the frame in
/// the cache and hands it to the dispatcher task. Callbacks run on the
/// dispatcher task, so a slow subscriber cannot stall the read loop.
pub(crate) struct Connection {
    shared: Arc<Mutex<Shared>>,
    command_timeout: Duration,
    tasks: StdMutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Connection {
    pub async fn connect(
        host: &str,
        port: u16,
        cache: Arc<StateCache>,
        dispatcher: Arc<Dispatcher>,
        session_state: Arc<StdMutex<SessionState>>,
        command_timeout: Duration,
    ) -> Result<Self> {
        tracing::info!(host, port, "connecting");

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| LwrpError::Connect {
                host: host.to_string(),
                port,
                source,
            })?;
        let (read_half, mut write_half) = stream.into_split();

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        let (notif_tx, mut notif_rx) = mpsc::unbounded_channel::<(Topic, Arc<Frame>)>();

        let shared = Arc::new(Mutex::new(Shared {
            pending: PendingTable::default(),
            line_tx: Some(line_tx),
        }));

        // Writer: the only path to the socket's write half
        let writer = tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    tracing::error!("failed to send command: {}", e);
                    break;
                }
            }
        });

        // Dispatcher: invokes subscriber callbacks in wire-arrival order
        let dispatcher_task = tokio::spawn(async move {
            while let Some((topic, frame)) = notif_rx.recv().await {
                dispatcher.dispatch(topic, &frame);
            }
        });

        // Reader: socket -> frame assembler -> correlator/cache/dispatcher
        let shared_clone = shared.clone();
        let state_clone = session_state.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            let mut assembler = FrameAssembler::new();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        tracing::debug!(line = line.as_str(), "received");
                        if let Some(frame) = assembler.push_line(&line) {
                            Self::handle_frame(&shared_clone, &cache, &notif_tx, frame).await;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("connection closed by device");
                        if let Some(frame) = assembler.finish() {
                            Self::handle_frame(&shared_clone, &cache, &notif_tx, frame).await;
                        }
                        break;
                    }
                    Err(e) => {
                        tracing::error!("read error: {}", e);
                        break;
                    }
                }
            }

            // Stream is gone: unblock every waiter and mark the session
            let mut shared = shared_clone.lock().await;
            shared.line_tx = None;
            shared.pending.fail_all();
            let mut state = state_clone.lock().unwrap();
            if *state != SessionState::Closed {
                *state = SessionState::Disconnected;
            }
        });

        Ok(Self {
            shared,
            command_timeout,
            tasks: StdMutex::new(vec![writer, reader, dispatcher_task]),
        })
    }

    /// Route one inbound frame: reply to a pending command, or unsolicited
    /// notification into the cache and out to subscribers
    async fn handle_frame(
        shared: &Arc<Mutex<Shared>>,
        cache: &StateCache,
        notif_tx: &mpsc::UnboundedSender<(Topic, Arc<Frame>)>,
        frame: Frame,
    ) {
        let frame = Arc::new(frame);

        let waiter = shared.lock().await.pending.complete(&frame);
        let frame = match waiter {
            Some(tx) => match tx.send(frame) {
                Ok(()) => return,
                // The caller timed out between our match and its removal of
                // the waiter; the reply is stale, so treat it as unsolicited
                Err(frame) => {
                    tracing::debug!(verb = frame.verb.as_str(), "reply outlived its waiter");
                    frame
                }
            },
            None => frame,
        };

        cache.update(&frame);
        let topic = frame.topic();
        let _ = notif_tx.send((topic, frame.clone()));
        if !frame.is_well_formed() && topic != Topic::Error {
            tracing::warn!(verb = frame.verb.as_str(), "frame contained unparsable lines");
            let _ = notif_tx.send((Topic::Error, frame));
        }
    }

    /// Send a command and wait for its matching reply
    pub async fn issue(&self, command: Command) -> Result<Arc<Frame>> {
        let match_key = command.key().map(str::to_string);
        self.issue_with_match(command, match_key).await
    }

    /// Send a command and wait for a reply matched on verb plus an explicit
    /// key. `None` matches any reply of the verb; used where the device does
    /// not echo the command's arguments (e.g. LOGIN replies with a status
    /// word, not the credentials).
    pub async fn issue_with_match(
        &self,
        command: Command,
        match_key: Option<String>,
    ) -> Result<Arc<Frame>> {
        let verb = command.verb().to_string();
        let (tx, rx) = oneshot::channel();

        // Register the waiter and queue the wire line under one lock so the
        // reply cannot race past an unregistered command
        let waiter_id = {
            let mut shared = self.shared.lock().await;
            let line_tx = shared.line_tx.as_ref().ok_or(LwrpError::ConnectionClosed)?;

            let wire = command.to_wire();
            tracing::debug!(command = wire.trim_end(), "sending");
            line_tx.send(wire).map_err(|_| LwrpError::ConnectionClosed)?;

            shared.pending.insert(&verb, match_key, tx)
        };

        match timeout(self.command_timeout, rx).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(LwrpError::ConnectionClosed),
            Err(_) => {
                // Forget the waiter so a late reply is treated as unsolicited
                self.shared.lock().await.pending.remove(waiter_id);
                Err(LwrpError::Timeout { verb })
            }
        }
    }

    /// Send a command without waiting for a reply
    pub async fn send(&self, command: Command) -> Result<()> {
        let shared = self.shared.lock().await;
        let line_tx = shared.line_tx.as_ref().ok_or(LwrpError::ConnectionClosed)?;

        let wire = command.to_wire();
        tracing::debug!(command = wire.trim_end(), "sending (no reply expected)");
        line_tx.send(wire).map_err(|_| LwrpError::ConnectionClosed)?;
        Ok(())
    }

    /// Tear the connection down and unblock every outstanding `issue`
    pub async fn close(&self) {
        {
            let mut shared = self.shared.lock().await;
            shared.line_tx = None;
            shared.pending.fail_all();
        }
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        tracing::info!("connection closed");
    }
}
