//! Mock broker WebSocket server for integration tests.
//!
//! Accepts connections, acks auth frames, records every received message,
//! and can broadcast frames (e.g. bar updates) to all connected clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub struct MockBrokerWs {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    messages: Arc<Mutex<Vec<String>>>,
    clients: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>>,
}

impl MockBrokerWs {
    /// Start the server on an ephemeral port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let clients: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>> =
            Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let messages_clone = messages.clone();
        let clients_clone = clients.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        let messages = messages_clone.clone();
                        let clients = clients_clone.clone();
                        tokio::spawn(handle_connection(stream, messages, clients));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            messages,
            clients,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    /// Wait until some received message satisfies `pred`.
    pub async fn wait_for_message<F>(&self, pred: F, timeout: Duration) -> bool
    where
        F: Fn(&str) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.messages.lock().await.iter().any(|m| pred(m)) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// Push a frame to every connected client.
    pub async fn broadcast(&self, text: impl Into<String>) {
        let text = text.into();
        let clients = self.clients.lock().await;
        for tx in clients.iter() {
            let _ = tx.send(text.clone());
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    messages: Arc<Mutex<Vec<String>>>,
    clients: Arc<Mutex<Vec<mpsc::UnboundedSender<String>>>>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut write, mut read) = ws_stream.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    clients.lock().await.push(out_tx);

    loop {
        tokio::select! {
            out = out_rx.recv() => {
                match out {
                    Some(text) => {
                        if write.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text = text.to_string();
                        messages.lock().await.push(text.clone());
                        // Ack auth frames the way the broker stream does.
                        if text.contains("\"action\":\"auth\"") {
                            let ack = r#"[{"T":"success","msg":"authenticated"}]"#;
                            if write.send(Message::Text(ack.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
