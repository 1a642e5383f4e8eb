use crate::cache::{Category, StateCache};
use crate::connection::Connection;
use crate::dispatch::{Dispatcher, SubscriptionHandle};
use crate::error::{LwrpError, Result};
use crate::protocol::{verb, Command, Frame, Topic, LWRP_PORT};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lifecycle state of a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    LoggedIn,
    Closed,
}

/// Session tuning knobs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// TCP port of the device's LWRP listener
    pub port: u16,
    /// How long `issue` waits for a matching reply
    pub command_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: LWRP_PORT,
            command_timeout: Duration::from_secs(5),
        }
    }
}

/// A live LWRP session with one device.
///
/// The session owns all mutable connection state: the pending-command set,
/// the device-state cache, and the subscription table. It is safe to share
/// behind an `Arc` and call from any task; `issue` suspends only its
/// caller, never the read loop.
pub struct Session {
    connection: Connection,
    cache: Arc<StateCache>,
    dispatcher: Arc<Dispatcher>,
    state: Arc<Mutex<SessionState>>,
    config: SessionConfig,
}

impl Session {
    /// Connect to a device using the default configuration (port 93)
    pub async fn connect(host: impl Into<String>) -> Result<Self> {
        Self::connect_with(host, SessionConfig::default()).await
    }

    /// Connect to a device with explicit configuration
    pub async fn connect_with(host: impl Into<String>, config: SessionConfig) -> Result<Self> {
        let host = host.into();
        let cache = Arc::new(StateCache::default());
        let dispatcher = Arc::new(Dispatcher::default());
        let state = Arc::new(Mutex::new(SessionState::Connecting));

        let connection = Connection::connect(
            &host,
            config.port,
            cache.clone(),
            dispatcher.clone(),
            state.clone(),
            config.command_timeout,
        )
        .await;

        let connection = match connection {
            Ok(connection) => connection,
            Err(e) => {
                *state.lock().unwrap() = SessionState::Disconnected;
                return Err(e);
            }
        };

        *state.lock().unwrap() = SessionState::Connected;
        Ok(Self {
            connection,
            cache,
            dispatcher,
            state,
            config,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// The configuration this session was opened with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Authenticate with the device.
    ///
    /// Most LWRP devices take only a password; both arguments are optional
    /// because some take neither. Any reply other than `LOGIN OK` fails
    /// with [`LwrpError::Auth`].
    pub async fn login(&self, username: Option<&str>, password: Option<&str>) -> Result<()> {
        let mut command = Command::new(verb::LOGIN);
        let credentials: Vec<&str> = [username, password].into_iter().flatten().collect();
        if !credentials.is_empty() {
            command = command.with_key(credentials.join(" "));
        }

        self.ensure_open()?;

        // Match the reply on verb alone: the device answers LOGIN with a
        // status word, not an echo of the credentials
        let reply = self.connection.issue_with_match(command, None).await?;
        match reply.key.as_deref() {
            Some("OK") => {
                *self.state.lock().unwrap() = SessionState::LoggedIn;
                tracing::info!("logged in");
                Ok(())
            }
            other => Err(LwrpError::Auth {
                reply: other.unwrap_or_default().to_string(),
            }),
        }
    }

    /// Send a command and wait for its matching reply frame
    pub async fn issue(&self, command: Command) -> Result<Arc<Frame>> {
        self.ensure_open()?;
        self.connection.issue(command).await
    }

    /// Send a command without waiting for a reply
    pub async fn send(&self, command: Command) -> Result<()> {
        self.ensure_open()?;
        self.connection.send(command).await
    }

    /// Register a callback for a notification topic
    pub fn subscribe(
        &self,
        topic: Topic,
        callback: impl Fn(Arc<Frame>) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.dispatcher.subscribe(topic, callback)
    }

    /// Remove a previously registered callback
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.dispatcher.unsubscribe(handle)
    }

    /// Latest cached record for a device-state category
    pub fn snapshot(&self, category: &Category) -> Option<Arc<Frame>> {
        self.cache.snapshot(category)
    }

    /// Categories for which state has been observed
    pub fn categories(&self) -> Vec<Category> {
        self.cache.categories()
    }

    /// Orderly shutdown: stops the read loop, releases the socket, fails
    /// every outstanding `issue` with `ConnectionClosed`, and clears the
    /// state cache
    pub async fn stop(&self) {
        *self.state.lock().unwrap() = SessionState::Closed;
        self.connection.close().await;
        self.cache.clear();
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            SessionState::Connected | SessionState::LoggedIn => Ok(()),
            SessionState::Closed | SessionState::Disconnected => Err(LwrpError::ConnectionClosed),
            SessionState::Connecting => Err(LwrpError::NotConnected),
        }
    }
}
