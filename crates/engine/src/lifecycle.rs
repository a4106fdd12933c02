use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{info, warn};

use common::{Error, Result};

use crate::polygon::stream::{keepalive, read_loop, write_loop};
use crate::polygon::{connect, ConnectionHandle, Outbound, DEFAULT_STREAM_URL};
use crate::queue::StreamQueue;
use crate::subscription::SubscriptionManager;

const OUTBOUND_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Streaming,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub url: String,
    pub api_key: String,
    pub reconnect_delay: Duration,
    pub keepalive_interval: Duration,
}

impl EngineSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            api_key: api_key.into(),
            reconnect_delay: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(20),
        }
    }
}

/// Cloneable handle for components that write to or observe the stream.
#[derive(Clone)]
pub struct EngineHandle {
    connection: ConnectionHandle,
    state: Arc<RwLock<StreamState>>,
    sessions: Arc<std::sync::atomic::AtomicU64>,
}

impl EngineHandle {
    pub fn connection(&self) -> ConnectionHandle {
        self.connection.clone()
    }

    pub async fn state(&self) -> StreamState {
        *self.state.read().await
    }

    /// Number of sessions that completed the auth handshake.
    pub fn sessions(&self) -> u64 {
        self.sessions.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Owns the upstream connection. Each session runs the reader, the single
/// writer, the keepalive and the subscription manager as one task group;
/// when any of them ends the whole group is torn down and the engine
/// reconnects after a fixed delay.
pub struct Engine {
    settings: EngineSettings,
    queue: Arc<StreamQueue>,
    manager: Arc<SubscriptionManager>,
    connection: ConnectionHandle,
    outbound_rx: Arc<Mutex<mpsc::Receiver<Outbound>>>,
    state: Arc<RwLock<StreamState>>,
    sessions: Arc<std::sync::atomic::AtomicU64>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        queue: Arc<StreamQueue>,
        manager: SubscriptionManager,
    ) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let connection = ConnectionHandle::new(tx);
        let state = Arc::new(RwLock::new(StreamState::Disconnected));
        let sessions = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let handle = EngineHandle {
            connection: connection.clone(),
            state: state.clone(),
            sessions: sessions.clone(),
        };

        let engine = Engine {
            settings,
            queue,
            manager: Arc::new(manager),
            connection,
            outbound_rx: Arc::new(Mutex::new(rx)),
            state,
            sessions,
        };

        (engine, handle)
    }

    /// Run forever. Call from `tokio::spawn`.
    pub async fn run(self) {
        info!(url = %self.settings.url, "Stream engine starting");
        loop {
            *self.state.write().await = StreamState::Connecting;
            match self.run_session().await {
                Ok(()) => info!("Stream session ended"),
                Err(e) => warn!(error = %e, "Stream session failed"),
            }
            *self.state.write().await = StreamState::Disconnected;
            info!(delay_secs = self.settings.reconnect_delay.as_secs_f64(), "Reconnecting after delay");
            tokio::time::sleep(self.settings.reconnect_delay).await;
        }
    }

    async fn run_session(&self) -> Result<()> {
        let ws = connect(&self.settings.url, &self.settings.api_key).await?;
        self.sessions.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        *self.state.write().await = StreamState::Streaming;

        // Frames queued while disconnected belong to the old session.
        let stale = {
            let mut rx = self.outbound_rx.lock().await;
            let mut n = 0usize;
            while rx.try_recv().is_ok() {
                n += 1;
            }
            n
        };
        if stale > 0 {
            info!(stale, "Discarded frames queued before reconnect");
        }

        let (sink, stream) = ws.split();
        let mut tasks = JoinSet::new();
        tasks.spawn(write_loop(sink, self.outbound_rx.clone()));
        tasks.spawn(read_loop(stream, self.queue.clone(), self.connection.clone()));
        tasks.spawn(keepalive(self.connection.clone(), self.settings.keepalive_interval));
        tasks.spawn(self.manager.clone().run(self.connection.clone()));

        let first = tasks.join_next().await;
        tasks.shutdown().await;
        match first {
            Some(Ok(result)) => result,
            Some(Err(join_err)) => Err(Error::Transport(format!("session task panicked: {join_err}"))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::memory_store;
    use crate::subscription::{RegistryCommand, SubscriptionSettings};
    use async_trait::async_trait;
    use common::{Bar, MarketDataSource};
    use futures_util::SinkExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    struct OneSymbol;

    #[async_trait]
    impl MarketDataSource for OneSymbol {
        async fn candidates(&self, _max_price: f64, _limit: usize) -> Result<Vec<String>> {
            Ok(vec!["ABC".into()])
        }

        async fn minute_bars(&self, _symbol: &str, _limit: usize) -> Result<Vec<Bar>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn reconnects_and_resubscribes_after_server_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            for round in 0..2 {
                let (tcp, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(tcp).await.unwrap();
                ws.send(Message::Text(r#"[{"ev":"status","status":"connected","message":""}]"#.into()))
                    .await
                    .unwrap();
                let _auth = ws.next().await;
                ws.send(Message::Text(r#"[{"ev":"status","status":"auth_success","message":""}]"#.into()))
                    .await
                    .unwrap();
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(t) = msg {
                        let _ = seen_tx.send(t);
                        break;
                    }
                }
                ws.send(Message::Text(format!(r#"[{{"ev":"T","sym":"ABC","p":1.0,"s":{round},"t":1}}]"#)))
                    .await
                    .unwrap();
                let _ = ws.close(None).await;
            }
        });

        let store = memory_store().await;
        let (cmd_tx, _cmd_rx) = mpsc::channel::<RegistryCommand>(64);
        let manager = SubscriptionManager::new(
            Arc::new(OneSymbol),
            store,
            cmd_tx,
            SubscriptionSettings::default(),
        );
        let queue = Arc::new(StreamQueue::new());
        let settings = EngineSettings {
            url: format!("ws://{addr}"),
            api_key: "KEY".into(),
            reconnect_delay: Duration::from_millis(50),
            keepalive_interval: Duration::from_secs(30),
        };
        let (engine, handle) = Engine::new(settings, queue.clone(), manager);
        assert_eq!(handle.state().await, StreamState::Disconnected);
        let task = tokio::spawn(engine.run());

        let expected = r#"{"action":"subscribe","params":"AM.ABC,T.ABC"}"#;
        for _ in 0..2 {
            let frame = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame, expected);
        }
        assert!(queue.pop(Duration::from_secs(2)).await.is_some());
        assert!(handle.sessions() >= 2);
        task.abort();
    }
}
