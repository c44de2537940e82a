use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// How long [`ServerCmd::ShutDown`] waits for open connections to close.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ── Server commands (launcher → server) ─────────────────────────────

/// Commands sent by the launcher to control the server.
#[derive(Clone, Debug)]
pub enum ServerCmd {
    /// Bind a listener on `addr` and start serving connections.
    StartListening { addr: String },
    /// Stop accepting new connections. Requests in flight are finished.
    StopListening,
    /// Stop accepting, close idle connections, wait up to
    /// [`SHUTDOWN_GRACE`] for requests in flight, then stop the loop.
    ShutDown,
}

// ── Server events (server → launcher) ───────────────────────────────

/// Events emitted by the server for the launcher or tests to observe.
#[derive(Clone, Debug)]
pub enum ServerEvent {
    /// The listener is bound and accepting on `addr`.
    Listening { addr: String },
    /// The listener has been dropped.
    ListeningStopped,
    /// One request was answered.
    RequestServed {
        peer: String,
        method: String,
        path: String,
        status: u16,
    },
    /// A non-fatal error occurred (bind or serve failure).
    Error { message: String },
}

/// Handle returned by [`Server::start`].
pub struct ServerHandle {
    pub cmd_tx: mpsc::Sender<ServerCmd>,
    pub events_tx: broadcast::Sender<ServerEvent>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Sends [`ServerCmd::ShutDown`] and waits until the server loop has
    /// drained its connections and exited.
    ///
    /// # Errors
    ///
    /// Returns an error if the server loop panicked.
    pub async fn shut_down(self) -> anyhow::Result<()> {
        if self.cmd_tx.send(ServerCmd::ShutDown).await.is_err() {
            debug!("Server loop already stopped");
        }
        self.task.await.context("server loop panicked")
    }
}

/// Startup configuration for the page server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen: String,
    /// Directory holding one `<title>.txt` file per page.
    pub data_dir: PathBuf,
    /// Directory with `view.html` and `edit.html`; built-in templates when
    /// unset.
    pub templates_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".into(),
            data_dir: PathBuf::from("."),
            templates_dir: None,
        }
    }
}

/// The page server.
///
/// Serves any [`axum::Router`], normally the one built by
/// [`router`](crate::router::router), and reports every answered request
/// on the event bus.
pub struct Server;

impl Server {
    /// Spawns the server event loop and returns a handle to control it.
    ///
    /// The server starts idle: nothing is bound until
    /// [`ServerCmd::StartListening`] arrives.
    pub fn start(self, app: axum::Router) -> ServerHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ServerCmd>(32);
        let (events_tx, _) = broadcast::channel::<ServerEvent>(256);

        let app = app.layer(middleware::from_fn_with_state(
            events_tx.clone(),
            report_request,
        ));

        info!("Spawning server event loop");
        let task = tokio::spawn(run_server_loop(app, cmd_rx, events_tx.clone()));

        ServerHandle {
            cmd_tx,
            events_tx,
            task,
        }
    }
}

/// Publishes a [`ServerEvent::RequestServed`] for every response.
async fn report_request(
    State(events): State<broadcast::Sender<ServerEvent>>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.to_string());
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let resp = next.run(req).await;

    let status = resp.status().as_u16();
    debug!(peer = %peer, method = %method, path = %path, status, "Request served");
    let _ = events.send(ServerEvent::RequestServed {
        peer,
        method,
        path,
        status,
    });
    resp
}

/// Binds `addr` and serves `app` on it until `stop` fires.
async fn bind_and_serve(
    addr: &str,
    app: axum::Router,
    stop: oneshot::Receiver<()>,
    events: broadcast::Sender<ServerEvent>,
    tasks: &mut JoinSet<()>,
) -> anyhow::Result<String> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind TCP listener on {addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to retrieve local address")?
        .to_string();
    info!(addr = %local_addr, "Page server listening");

    tasks.spawn(async move {
        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            stop.await.ok();
        })
        .await;
        if let Err(e) = served {
            warn!(error = %e, "Serving failed");
            let _ = events.send(ServerEvent::Error {
                message: format!("serving failed: {e}"),
            });
        }
    });
    Ok(local_addr)
}

/// The main server loop, kept out of `Server` so its state stays local.
async fn run_server_loop(
    app: axum::Router,
    mut cmd_rx: mpsc::Receiver<ServerCmd>,
    events: broadcast::Sender<ServerEvent>,
) {
    debug!("Server event loop running");

    // Fires the graceful stop of the current listener.
    let mut stop_listening: Option<oneshot::Sender<()>> = None;
    // One task per listener, kept until its connections have drained.
    let mut serving = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            // ── Commands ────────────────────────────────────────
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ServerCmd::StartListening { addr }) => {
                        info!(addr = %addr, "Received StartListening command");
                        if stop_listening.is_some() {
                            warn!("Already listening, ignoring StartListening");
                            let _ = events.send(ServerEvent::Error {
                                message: "already listening".into(),
                            });
                        } else {
                            let (stop_tx, stop_rx) = oneshot::channel();
                            match bind_and_serve(&addr, app.clone(), stop_rx, events.clone(), &mut serving).await {
                                Ok(bound_addr) => {
                                    stop_listening = Some(stop_tx);
                                    let _ = events.send(ServerEvent::Listening { addr: bound_addr });
                                }
                                Err(e) => {
                                    warn!(error = %e, "Failed to bind listener");
                                    let _ = events.send(ServerEvent::Error {
                                        message: format!("{e:#}"),
                                    });
                                }
                            }
                        }
                    }

                    Some(ServerCmd::StopListening) => {
                        info!("Received StopListening command");
                        if let Some(stop) = stop_listening.take() {
                            stop.send(()).ok();
                        }
                        let _ = events.send(ServerEvent::ListeningStopped);
                    }

                    Some(ServerCmd::ShutDown) => {
                        info!(listeners = serving.len(), "Received ShutDown command");
                        break;
                    }

                    None => {
                        debug!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            // ── Reap listeners that finished draining ───────────
            Some(res) = serving.join_next(), if !serving.is_empty() => {
                if let Err(e) = res {
                    if e.is_panic() {
                        warn!(error = %e, "Serving task panicked");
                    }
                }
            }
        }
    }

    if let Some(stop) = stop_listening.take() {
        stop.send(()).ok();
    }
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while serving.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(grace = ?SHUTDOWN_GRACE, "Connections still open after grace period, aborting");
    }
    serving.shutdown().await;
    info!("Server event loop stopped");
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use wikid_core::page::FilePageStore;
    use wikid_core::render::Templates;
    use wikid_core::title::TitleValidator;

    use super::*;
    use crate::router::router;
    use crate::state::AppState;
    use crate::testing::{http_get, http_post_form, send_raw};

    /// Helper: start a page server storing pages in `dir`.
    fn start_server(dir: &std::path::Path) -> (ServerHandle, broadcast::Receiver<ServerEvent>) {
        let state = AppState::new(
            FilePageStore::new(dir),
            TitleValidator::new(),
            Templates::builtin(),
        );
        let handle = Server.start(router(state));
        let events_rx = handle.events_tx.subscribe();
        (handle, events_rx)
    }

    /// Helper: wait for a matching event, with a timeout.
    async fn wait_for_event(
        rx: &mut broadcast::Receiver<ServerEvent>,
        matches_fn: impl Fn(&ServerEvent) -> bool,
    ) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(ev) if matches_fn(&ev) => return ev,
                    Ok(_) => {}
                    Err(e) => panic!("event channel error: {e}"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    async fn listen(
        handle: &ServerHandle,
        events_rx: &mut broadcast::Receiver<ServerEvent>,
    ) -> String {
        handle
            .cmd_tx
            .send(ServerCmd::StartListening {
                addr: "127.0.0.1:0".into(),
            })
            .await
            .unwrap();

        let ServerEvent::Listening { addr } = wait_for_event(events_rx, |e| {
            matches!(e, ServerEvent::Listening { .. })
        })
        .await
        else {
            unreachable!()
        };
        addr
    }

    #[tokio::test]
    async fn when_start_listening_expect_listening_event() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events_rx) = start_server(dir.path());

        let addr = listen(&handle, &mut events_rx).await;
        assert!(addr.starts_with("127.0.0.1:"));

        handle.shut_down().await.unwrap();
    }

    #[tokio::test]
    async fn when_start_listening_twice_expect_error_event() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events_rx) = start_server(dir.path());
        listen(&handle, &mut events_rx).await;

        handle
            .cmd_tx
            .send(ServerCmd::StartListening {
                addr: "127.0.0.1:0".into(),
            })
            .await
            .unwrap();

        let ev = wait_for_event(&mut events_rx, |e| matches!(e, ServerEvent::Error { .. })).await;
        let ServerEvent::Error { message } = ev else {
            unreachable!()
        };
        assert_eq!(message, "already listening");
        handle.shut_down().await.unwrap();
    }

    #[tokio::test]
    async fn when_stop_listening_expect_stopped_event() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events_rx) = start_server(dir.path());
        listen(&handle, &mut events_rx).await;

        handle.cmd_tx.send(ServerCmd::StopListening).await.unwrap();

        let ev = wait_for_event(&mut events_rx, |e| {
            matches!(e, ServerEvent::ListeningStopped)
        })
        .await;
        assert!(matches!(ev, ServerEvent::ListeningStopped));
        handle.shut_down().await.unwrap();
    }

    #[tokio::test]
    async fn when_bind_fails_expect_error_event() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events_rx) = start_server(dir.path());

        handle
            .cmd_tx
            .send(ServerCmd::StartListening {
                addr: "999.999.999.999:0".into(),
            })
            .await
            .unwrap();

        let ev = wait_for_event(&mut events_rx, |e| matches!(e, ServerEvent::Error { .. })).await;
        let ServerEvent::Error { message } = ev else {
            unreachable!()
        };
        assert!(message.contains("failed to bind TCP listener"), "got: {message}");
        handle.shut_down().await.unwrap();
    }

    #[tokio::test]
    async fn when_shut_down_expect_loop_finished_and_port_closed() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events_rx) = start_server(dir.path());
        let addr = listen(&handle, &mut events_rx).await;

        handle.shut_down().await.unwrap();

        assert!(TcpStream::connect(&addr).await.is_err());
    }

    #[tokio::test]
    async fn when_page_saved_then_view_shows_body_and_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events_rx) = start_server(dir.path());
        let addr = listen(&handle, &mut events_rx).await;

        let saved = send_raw(&addr, &http_post_form("/save/Hello", "body=World")).await;
        assert!(saved.starts_with("HTTP/1.1 302 Found\r\n"), "got: {saved}");
        assert!(saved.contains("location: /view/Hello\r\n"));

        let viewed = send_raw(&addr, &http_get("/view/Hello")).await;
        assert!(viewed.starts_with("HTTP/1.1 200 OK\r\n"), "got: {viewed}");
        assert!(viewed.contains("<div>World</div>"));

        let on_disk = tokio::fs::read(dir.path().join("Hello.txt")).await.unwrap();
        assert_eq!(on_disk, b"World");

        handle.shut_down().await.unwrap();
    }

    #[tokio::test]
    async fn when_missing_page_viewed_then_redirect_to_edit() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events_rx) = start_server(dir.path());
        let addr = listen(&handle, &mut events_rx).await;

        let resp = send_raw(&addr, &http_get("/view/Missing")).await;
        assert!(resp.starts_with("HTTP/1.1 302 Found\r\n"), "got: {resp}");
        assert!(resp.contains("location: /edit/Missing\r\n"));

        handle.shut_down().await.unwrap();
    }

    #[tokio::test]
    async fn when_missing_page_edited_then_empty_form() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events_rx) = start_server(dir.path());
        let addr = listen(&handle, &mut events_rx).await;

        let resp = send_raw(&addr, &http_get("/edit/Missing")).await;
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "got: {resp}");
        assert!(resp.contains("<h1>Editing Missing</h1>"));
        assert!(resp.contains(r#"cols="80"></textarea>"#));

        handle.shut_down().await.unwrap();
    }

    #[tokio::test]
    async fn when_traversal_path_requested_then_404_and_nothing_written() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events_rx) = start_server(dir.path());
        let addr = listen(&handle, &mut events_rx).await;

        let resp = send_raw(&addr, &http_get("/view/../../etc/passwd")).await;
        assert!(resp.starts_with("HTTP/1.1 404 Not Found\r\n"), "got: {resp}");

        for path in ["/save/..%2Fescape", "/save/%2E%2E", "/save/a.txt"] {
            let resp = send_raw(&addr, &http_post_form(path, "body=x")).await;
            assert!(resp.starts_with("HTTP/1.1 404 Not Found\r\n"), "{path}: {resp}");
        }

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());

        handle.shut_down().await.unwrap();
    }

    #[tokio::test]
    async fn when_request_served_expect_request_served_event() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events_rx) = start_server(dir.path());
        let addr = listen(&handle, &mut events_rx).await;

        send_raw(&addr, &http_get("/nowhere")).await;

        let ev = wait_for_event(&mut events_rx, |e| {
            matches!(e, ServerEvent::RequestServed { .. })
        })
        .await;
        let ServerEvent::RequestServed {
            peer,
            method,
            path,
            status,
        } = ev
        else {
            unreachable!()
        };
        assert!(peer.starts_with("127.0.0.1:"), "got: {peer}");
        assert_eq!(method, "GET");
        assert_eq!(path, "/nowhere");
        assert_eq!(status, 404);

        handle.shut_down().await.unwrap();
    }

    #[tokio::test]
    async fn when_keep_alive_connection_then_multiple_requests_served() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut events_rx) = start_server(dir.path());
        let addr = listen(&handle, &mut events_rx).await;

        let mut stream = TcpStream::connect(&addr).await.unwrap();
        let first = "GET /edit/One HTTP/1.1\r\nHost: test\r\n\r\n";
        stream.write_all(first.as_bytes()).await.unwrap();
        wait_for_event(&mut events_rx, |e| {
            matches!(e, ServerEvent::RequestServed { .. })
        })
        .await;

        stream.write_all(http_get("/edit/Two").as_bytes()).await.unwrap();
        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
            .await
            .expect("timed out reading responses")
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);
        assert!(text.contains("Editing One"));
        assert!(text.contains("Editing Two"));

        handle.shut_down().await.unwrap();
    }
}
