//! Watch mode is a three-part system:
//!
//! 1. **File watcher**: the `notify` crate monitors the source root
//!    recursively, with debouncing so rapid saves coalesce into one rebuild.
//! 2. **Dirty mapping**: changed paths are matched against each task's watch
//!    patterns; the dirty tasks plus everything depending on them form the
//!    re-run set. `clean` is never part of that set, so the output wipe
//!    happens at most once per process.
//! 3. **Reload broadcast**: a websocket thread pushes a reload message to
//!    connected browser clients after every successful re-run — either a
//!    full `"reload"` or `"reload:styles"` when only stylesheets changed,
//!    letting clients swap styles in place.

use std::collections::HashSet;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::new_debouncer;
use tungstenite::WebSocket;

use crate::config::BuildContext;
use crate::error::WatchError;
use crate::graph::TaskGraph;
use crate::runner::run_nodes;

const DEBOUNCE: Duration = Duration::from_millis(250);

/// Watch the source tree and re-run the dirty subgraph on every change.
/// Blocks the calling thread; an initial build is the caller's job.
pub fn watch(graph: &TaskGraph, ctx: &BuildContext) -> Result<(), WatchError> {
    let (tcp, port) = reserve_port()?;
    let root = std::fs::canonicalize(ctx.paths.root.as_std_path())?;

    tracing::info!(port, "live-reload socket ready");

    let clients = Arc::new(Mutex::new(vec![]));
    let _thread_incoming = new_thread_ws_incoming(tcp, clients.clone());
    let (tx_reload, _thread_reload) = new_thread_ws_reload(clients.clone());

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(DEBOUNCE, None, tx)?;
    debouncer.watch(
        ctx.paths.root.join(&ctx.paths.src).as_std_path(),
        RecursiveMode::Recursive,
    )?;

    tracing::info!("watching {} for changes...", ctx.paths.root.join(&ctx.paths.src));

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let mut dirty = HashSet::new();

                let relevant = events.iter().filter(|de| {
                    matches!(
                        de.event.kind,
                        EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
                    )
                });

                for event in relevant {
                    for path in &event.event.paths {
                        let rel = path.strip_prefix(&root).unwrap_or(path);
                        let Some(rel) = Utf8Path::from_path(rel) else {
                            continue;
                        };
                        dirty.extend(graph.dirtied_by(rel));
                    }
                }

                if dirty.is_empty() {
                    continue;
                }

                let style_only = dirty
                    .iter()
                    .all(|&index| graph.graph[index].name == "sass");

                let to_rerun = graph.descendants(&dirty);
                tracing::info!("change detected, re-running {} tasks...", to_rerun.len());

                let s = Instant::now();
                match run_nodes(graph, ctx, &to_rerun) {
                    Ok(report) if report.is_success() => {
                        let message = if style_only { "reload:styles" } else { "reload" };
                        let _ = tx_reload.send(message);
                        tracing::info!("refreshed {}", crate::io::as_overhead(s));
                    }
                    Ok(report) => report.summarize(),
                    Err(err) => tracing::error!("error while rebuilding: {err}"),
                }
            }
            Ok(Err(errors)) => {
                for err in errors {
                    tracing::error!("watch error: {err}");
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn reserve_port() -> Result<(TcpListener, u16), WatchError> {
    let listener = match TcpListener::bind("127.0.0.1:1337") {
        Ok(sock) => sock,
        Err(_) => TcpListener::bind("127.0.0.1:0").map_err(WatchError::Bind)?,
    };

    let addr = listener.local_addr().map_err(WatchError::Bind)?;
    let port = addr.port();
    Ok((listener, port))
}

fn new_thread_ws_incoming(
    server: TcpListener,
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for stream in server.incoming() {
            let Ok(stream) = stream else { continue };
            if let Ok(socket) = tungstenite::accept(stream) {
                clients.lock().unwrap().push(socket);
            }
        }
    })
}

fn new_thread_ws_reload(
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
) -> (Sender<&'static str>, JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel::<&'static str>();

    let thread = std::thread::spawn(move || {
        while let Ok(message) = rx.recv() {
            let mut clients = clients.lock().unwrap();
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                match socket.send(message.into()) {
                    Ok(_) => {}
                    Err(tungstenite::error::Error::Io(e)) => {
                        if e.kind() == std::io::ErrorKind::BrokenPipe {
                            broken.push(i);
                        }
                    }
                    Err(e) => {
                        tracing::error!("websocket error: {e:?}");
                    }
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            // Close all but the last 10 connections
            let len = clients.len();
            if len > 10 {
                for mut socket in clients.drain(0..len - 10) {
                    socket.close(None).ok();
                }
            }
        }
    });

    (tx, thread)
}
