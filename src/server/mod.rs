mod command;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub use command::Command;

use crate::contracts::{LockResultExt, PrimeError};
use crate::generator::PrimeGenerator;
use crate::log::ActivityLog;
use crate::oracle::PrimeOracle;
use crate::sequence::PrimeSequence;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4711,
        }
    }
}

/// Latched shutdown flag with wakeup. `wait` registers before checking so
/// a trigger racing with the check cannot be missed.
#[derive(Default)]
struct ShutdownSignal {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.triggered.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}

/// TCP front for the prime oracle.
///
/// Accepts any number of concurrent connections, each on its own task, and
/// translates the line protocol into oracle calls. Sessions never block
/// each other. `stop` drains: no new connections, existing sessions run to
/// their natural end, and only then are the generator and the listening
/// socket released, so no client is left waiting on a stopped generator.
pub struct PrimeServer {
    config: ServerConfig,
    generator: Arc<PrimeGenerator>,
    oracle: Arc<PrimeOracle>,
    server_log: Arc<ActivityLog>,
    generator_log: Arc<ActivityLog>,
    next_session_id: Arc<AtomicU64>,
    sessions: Arc<Mutex<Vec<JoinHandle<()>>>>,
    shutdown: Arc<ShutdownSignal>,
    /// Accept task; yields the listener back on shutdown so the socket
    /// stays bound until the drain completes
    accept_handle: RwLock<Option<JoinHandle<TcpListener>>>,
}

impl PrimeServer {
    pub fn new(config: ServerConfig, partition_size: usize) -> Result<Self, PrimeError> {
        let sequence = Arc::new(PrimeSequence::new());
        let generator_log = Arc::new(ActivityLog::new());
        let generator = Arc::new(PrimeGenerator::new(
            Arc::clone(&sequence),
            Arc::clone(&generator_log),
        ));
        let oracle = Arc::new(PrimeOracle::new(Arc::clone(&sequence), partition_size)?);

        Ok(Self {
            config,
            generator,
            oracle,
            server_log: Arc::new(ActivityLog::new()),
            generator_log,
            next_session_id: Arc::new(AtomicU64::new(1)),
            sessions: Arc::new(Mutex::new(Vec::new())),
            shutdown: Arc::new(ShutdownSignal::default()),
            accept_handle: RwLock::new(None),
        })
    }

    /// Binds the listener, starts the generator with `delay`, and spawns
    /// the accept loop. Returns the bound address immediately.
    pub async fn start(&self, delay: Duration) -> Result<SocketAddr, PrimeError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("listening on {}", local_addr);

        self.generator.start(delay)?;

        let oracle = Arc::clone(&self.oracle);
        let server_log = Arc::clone(&self.server_log);
        let next_session_id = Arc::clone(&self.next_session_id);
        let sessions = Arc::clone(&self.sessions);
        let shutdown = Arc::clone(&self.shutdown);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let id = next_session_id.fetch_add(1, Ordering::SeqCst);
                            tracing::info!(session = id, peer = %peer, "accepted connection");

                            let session = Session {
                                id,
                                oracle: Arc::clone(&oracle),
                                log: Arc::clone(&server_log),
                            };
                            let task = tokio::spawn(async move {
                                if let Err(e) = session.run(stream).await {
                                    tracing::error!(session = id, error = %e, "session failed");
                                }
                            });

                            if let Ok(mut sessions) = sessions.lock() {
                                sessions.push(task);
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to accept connection");
                        }
                    },
                }
            }
            tracing::info!("stopped accepting new connections");
            listener
        });

        let mut accept_handle = self.accept_handle.write().map_lock_err()?;
        *accept_handle = Some(handle);

        Ok(local_addr)
    }

    /// Stops accepting, waits for every active session to end on its own,
    /// then stops the generator and releases the socket.
    pub async fn stop(&self) -> Result<(), PrimeError> {
        self.shutdown.trigger();

        let accept_handle = {
            let mut accept_handle = self.accept_handle.write().map_lock_err()?;
            accept_handle.take()
        };
        let listener = match accept_handle {
            Some(handle) => Some(
                handle
                    .await
                    .map_err(|e| PrimeError::TaskJoin(e.to_string()))?,
            ),
            None => None,
        };

        // no new sessions can be registered once the accept task has exited
        let sessions: Vec<_> = {
            let mut sessions = self.sessions.lock().map_lock_err()?;
            sessions.drain(..).collect()
        };
        for session in sessions {
            if let Err(e) = session.await {
                tracing::error!(error = %e, "session task panicked");
            }
        }

        self.generator.stop().await?;
        drop(listener);
        tracing::info!("server stopped");

        Ok(())
    }

    pub fn oracle(&self) -> &PrimeOracle {
        &self.oracle
    }

    pub fn generator(&self) -> &PrimeGenerator {
        &self.generator
    }

    /// Read-only server diagnostics (connects, disconnects, answered
    /// requests), in creation order.
    pub fn server_log(&self) -> Result<Vec<String>, PrimeError> {
        self.server_log.entries()
    }

    /// Read-only log of the prime-generation subsystem.
    pub fn generator_log(&self) -> Result<Vec<String>, PrimeError> {
        self.generator_log.entries()
    }
}

/// One client connection: its id, the shared oracle, and the server log.
/// The session task is the only writer to its stream.
struct Session {
    id: u64,
    oracle: Arc<PrimeOracle>,
    log: Arc<ActivityLog>,
}

impl Session {
    async fn run(self, stream: TcpStream) -> Result<(), PrimeError> {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        while let Some(line) = lines.next_line().await? {
            match Command::parse(line.trim_end_matches('\r')) {
                Command::Hello => {
                    write_half
                        .write_all(format!("{}\n", self.id).as_bytes())
                        .await?;
                    self.log.append(format!("client connected,{}", self.id))?;
                }
                Command::NextPrime(q) => {
                    let prime = self.oracle.next_prime(q).await?;
                    write_half.write_all(format!("{}\n", prime).as_bytes()).await?;
                    self.log.append(format!(
                        "requested: {},nextprime,{},{}",
                        self.id, q, prime
                    ))?;
                }
                Command::PrimeFactors(q) => match self.oracle.prime_factors(q).await {
                    Ok(factors) => {
                        let rendered: Vec<String> =
                            factors.iter().map(u64::to_string).collect();
                        write_half
                            .write_all(format!("{}\n", rendered.join(" ")).as_bytes())
                            .await?;
                        self.log.append(format!(
                            "requested: {},primefactors,{},[{}]",
                            self.id,
                            q,
                            rendered.join(",")
                        ))?;
                    }
                    Err(e @ PrimeError::QueryOutOfRange { .. }) => {
                        // protocol error: local to this line, no response
                        tracing::warn!(session = self.id, error = %e, "rejected query");
                    }
                    Err(e) => return Err(e),
                },
                Command::Unrecognized(raw) => {
                    tracing::warn!(session = self.id, line = %raw, "unrecognized request");
                }
            }
        }

        self.log
            .append(format!("client disconnected,{}", self.id))?;
        tracing::info!(session = self.id, "session closed");
        Ok(())
    }
}
