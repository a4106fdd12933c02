use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use common::{Error, Result};

use super::protocol::{parse_frame, statuses, Action, ControlFrame, AUTH_SUCCESS, CONNECTED};
use crate::queue::StreamQueue;

pub const DEFAULT_STREAM_URL: &str = "wss://socket.polygon.io/stocks";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
const SUBSCRIBE_PACING: Duration = Duration::from_millis(50);
const UNSUBSCRIBE_PACING: Duration = Duration::from_millis(100);

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn transport(e: impl std::fmt::Display) -> Error {
    Error::Transport(e.to_string())
}

/// A frame queued for the single connection writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Control(ControlFrame),
    Ping,
    Pong(Vec<u8>),
}

/// Cloneable sender side of the writer channel.
///
/// Every task that needs to write to the socket goes through this handle, so
/// frames are serialized by the one writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }

    pub async fn subscribe(&self, topics: &[String]) -> Result<()> {
        self.send(Outbound::Control(ControlFrame::subscribe(topics))).await
    }

    pub async fn unsubscribe(&self, topics: &[String]) -> Result<()> {
        self.send(Outbound::Control(ControlFrame::unsubscribe(topics))).await
    }

    pub async fn send(&self, frame: Outbound) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| Error::Transport("writer channel closed".into()))
    }

    /// Queue without waiting. Fails if the channel is full or closed.
    pub fn try_send(&self, frame: Outbound) -> Result<()> {
        self.tx.try_send(frame).map_err(transport)
    }
}

/// Open the socket and complete the auth handshake.
pub async fn connect(url: &str, api_key: &str) -> Result<WsStream> {
    let url = Url::parse(url).map_err(transport)?;
    let (mut ws, _) = connect_async(url.as_str()).await.map_err(transport)?;
    tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut ws, api_key))
        .await
        .map_err(|_| Error::Auth("handshake timed out".into()))??;
    Ok(ws)
}

/// Wait for the `connected` status, send the auth frame, and require
/// `auth_success` in the reply.
pub async fn handshake<S>(ws: &mut S, api_key: &str) -> Result<()>
where
    S: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin,
{
    loop {
        let events = next_status_frame(ws).await?;
        if events.iter().any(|(s, _)| s == CONNECTED) {
            break;
        }
    }

    let auth = ControlFrame::auth(api_key).to_json()?;
    ws.send(Message::Text(auth)).await.map_err(transport)?;

    loop {
        let events = next_status_frame(ws).await?;
        if let Some((status, message)) = events.into_iter().next() {
            if status == AUTH_SUCCESS {
                info!("Stream authenticated");
                return Ok(());
            }
            return Err(Error::Auth(format!("{status}: {message}")));
        }
    }
}

async fn next_status_frame<S>(ws: &mut S) -> Result<Vec<(String, String)>>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg = ws
            .next()
            .await
            .ok_or_else(|| Error::Transport("closed during handshake".into()))?
            .map_err(transport)?;
        match msg {
            Message::Text(text) => {
                let events = parse_frame(&text)?;
                return Ok(statuses(&events)
                    .map(|(s, m)| (s.to_string(), m.to_string()))
                    .collect());
            }
            Message::Close(frame) => {
                return Err(Error::Transport(format!("closed during handshake: {frame:?}")))
            }
            _ => continue,
        }
    }
}

/// Single writer: drains the outbound channel onto the socket, pacing
/// successive subscribe and unsubscribe frames.
pub async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    outbound: Arc<Mutex<mpsc::Receiver<Outbound>>>,
) -> Result<()> {
    let mut rx = outbound.lock().await;
    while let Some(frame) = rx.recv().await {
        match frame {
            Outbound::Control(control) => {
                debug!(action = ?control.action, params = %control.params, "Sending control frame");
                sink.send(Message::Text(control.to_json()?)).await.map_err(transport)?;
                match control.action {
                    Action::Subscribe => tokio::time::sleep(SUBSCRIBE_PACING).await,
                    Action::Unsubscribe => tokio::time::sleep(UNSUBSCRIBE_PACING).await,
                    Action::Auth => {}
                }
            }
            Outbound::Ping => sink.send(Message::Ping(Vec::new())).await.map_err(transport)?,
            Outbound::Pong(data) => sink.send(Message::Pong(data)).await.map_err(transport)?,
        }
    }
    Err(Error::Transport("writer channel closed".into()))
}

/// Reader: pushes every text frame onto the queue unparsed.
pub async fn read_loop(
    mut stream: SplitStream<WsStream>,
    queue: Arc<StreamQueue>,
    handle: ConnectionHandle,
) -> Result<()> {
    while let Some(msg) = stream.next().await {
        match msg.map_err(transport)? {
            Message::Text(text) => queue.push(text),
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => queue.push(text),
                Err(_) => warn!("Dropping non-UTF-8 binary frame"),
            },
            Message::Ping(data) => {
                if let Err(e) = handle.try_send(Outbound::Pong(data)) {
                    warn!(error = %e, "Could not queue pong");
                }
            }
            Message::Close(frame) => {
                return Err(Error::Transport(format!("closed by server: {frame:?}")));
            }
            _ => {}
        }
    }
    Err(Error::Transport("stream ended".into()))
}

/// Sends a protocol ping every `interval`. Never waits for the reply.
pub async fn keepalive(handle: ConnectionHandle, interval: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        handle.send(Outbound::Ping).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn serve_once<F, Fut>(script: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = accept_async(tcp).await.unwrap();
            script(ws).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn handshake_succeeds_on_auth_success() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Text(r#"[{"ev":"status","status":"connected","message":"Connected"}]"#.into()))
                .await
                .unwrap();
            let auth = ws.next().await.unwrap().unwrap();
            assert_eq!(auth.into_text().unwrap(), r#"{"action":"auth","params":"KEY"}"#);
            ws.send(Message::Text(r#"[{"ev":"status","status":"auth_success","message":"authenticated"}]"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"[{"ev":"T","sym":"ABC","p":1.0,"s":1,"t":1}]"#.into()))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        })
        .await;

        let ws = connect(&url, "KEY").await.unwrap();
        let (_sink, stream) = ws.split();
        let queue = Arc::new(StreamQueue::new());
        let (tx, _rx) = mpsc::channel(8);
        let reader = tokio::spawn(read_loop(stream, queue.clone(), ConnectionHandle::new(tx)));
        let first = queue.pop(Duration::from_secs(2)).await.unwrap();
        assert!(first.contains(r#""sym":"ABC""#));
        reader.abort();
    }

    #[tokio::test]
    async fn handshake_rejects_auth_failure() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Text(r#"[{"ev":"status","status":"connected","message":"Connected"}]"#.into()))
                .await
                .unwrap();
            let _ = ws.next().await;
            ws.send(Message::Text(r#"[{"ev":"status","status":"auth_failed","message":"bad key"}]"#.into()))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        })
        .await;

        let err = connect(&url, "WRONG").await.unwrap_err();
        assert!(matches!(err, Error::Auth(ref m) if m.contains("auth_failed")));
    }

    #[tokio::test]
    async fn writer_serializes_control_frames() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<Vec<String>>();
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Text(r#"[{"ev":"status","status":"connected","message":""}]"#.into()))
                .await
                .unwrap();
            let _ = ws.next().await;
            ws.send(Message::Text(r#"[{"ev":"status","status":"auth_success","message":""}]"#.into()))
                .await
                .unwrap();
            let mut seen = Vec::new();
            while seen.len() < 2 {
                match ws.next().await {
                    Some(Ok(Message::Text(t))) => seen.push(t),
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
            let _ = done_tx.send(seen);
        })
        .await;

        let ws = connect(&url, "KEY").await.unwrap();
        let (sink, _stream) = ws.split();
        let (tx, rx) = mpsc::channel(8);
        let handle = ConnectionHandle::new(tx);
        let writer = tokio::spawn(write_loop(sink, Arc::new(Mutex::new(rx))));

        handle.subscribe(&["AM.ABC".to_string(), "T.ABC".to_string()]).await.unwrap();
        handle.unsubscribe(&["Q.XYZ".to_string()]).await.unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(2), done_rx).await.unwrap().unwrap();
        assert_eq!(
            seen,
            vec![
                r#"{"action":"subscribe","params":"AM.ABC,T.ABC"}"#.to_string(),
                r#"{"action":"unsubscribe","params":"Q.XYZ"}"#.to_string(),
            ]
        );
        writer.abort();
    }

    async fn accept_auth(ws: &mut WebSocketStream<TcpStream>) {
        ws.send(Message::Text(r#"[{"ev":"status","status":"connected","message":""}]"#.into()))
            .await
            .unwrap();
        let _ = ws.next().await;
        ws.send(Message::Text(r#"[{"ev":"status","status":"auth_success","message":""}]"#.into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn keepalive_puts_ping_on_the_wire() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<usize>();
        let url = serve_once(|mut ws| async move {
            accept_auth(&mut ws).await;
            let mut pings = 0;
            while pings < 2 {
                match ws.next().await {
                    Some(Ok(Message::Ping(_))) => pings += 1,
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
            let _ = done_tx.send(pings);
        })
        .await;

        let ws = connect(&url, "KEY").await.unwrap();
        let (sink, _stream) = ws.split();
        let (tx, rx) = mpsc::channel(8);
        let writer = tokio::spawn(write_loop(sink, Arc::new(Mutex::new(rx))));
        let pinger = tokio::spawn(keepalive(ConnectionHandle::new(tx), Duration::from_millis(50)));

        let pings = tokio::time::timeout(Duration::from_secs(2), done_rx).await.unwrap().unwrap();
        assert_eq!(pings, 2);
        pinger.abort();
        writer.abort();
    }

    #[tokio::test]
    async fn writer_paces_subscription_changes() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<Vec<tokio::time::Instant>>();
        let url = serve_once(|mut ws| async move {
            accept_auth(&mut ws).await;
            let mut arrivals = Vec::new();
            while arrivals.len() < 3 {
                match ws.next().await {
                    Some(Ok(Message::Text(_))) => arrivals.push(tokio::time::Instant::now()),
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
            let _ = done_tx.send(arrivals);
        })
        .await;

        let ws = connect(&url, "KEY").await.unwrap();
        let (sink, _stream) = ws.split();
        let (tx, rx) = mpsc::channel(8);
        let handle = ConnectionHandle::new(tx);
        handle.subscribe(&["AM.AAA".to_string()]).await.unwrap();
        handle.unsubscribe(&["AM.BBB".to_string()]).await.unwrap();
        handle.subscribe(&["AM.CCC".to_string()]).await.unwrap();
        let writer = tokio::spawn(write_loop(sink, Arc::new(Mutex::new(rx))));

        let t = tokio::time::timeout(Duration::from_secs(2), done_rx).await.unwrap().unwrap();
        assert_eq!(t.len(), 3);
        // loopback jitter allowance
        assert!(t[1] - t[0] >= Duration::from_millis(40), "after subscribe: {:?}", t[1] - t[0]);
        assert!(t[2] - t[1] >= Duration::from_millis(90), "after unsubscribe: {:?}", t[2] - t[1]);
        writer.abort();
    }
}
