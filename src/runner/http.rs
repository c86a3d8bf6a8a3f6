//! A local HTTP server used by the `dev` and `dist:server` tasks. With a
//! configured upstream origin every request is proxied to it; otherwise the
//! active output root is served statically. Runs on a background thread with
//! a current-thread tokio runtime so the watch loop keeps the main thread.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use camino::Utf8PathBuf;
use console::style;
use tower_http::services::ServeDir;
use tracing::info;

use crate::config::ServeOptions;

pub fn start(
    root: Utf8PathBuf,
    opts: ServeOptions,
) -> thread::JoinHandle<Result<(), anyhow::Error>> {
    info!(
        url = %style(format!("http://localhost:{}/", opts.port)).yellow(),
        root = %root,
        "starting a HTTP server"
    );

    thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(serve(root, opts))
    })
}

async fn serve(root: Utf8PathBuf, opts: ServeOptions) -> Result<(), anyhow::Error> {
    let address = SocketAddr::from(([127, 0, 0, 1], opts.port));
    let address = tokio::net::TcpListener::bind(address).await?;

    let router = match opts.proxy {
        Some(origin) => {
            info!(origin = %origin, "proxying requests to the upstream origin");
            let upstream = Arc::new(Upstream {
                origin,
                client: reqwest::Client::new(),
            });
            Router::new().fallback(forward).with_state(upstream)
        }
        None => Router::new().fallback_service(ServeDir::new(root)),
    };

    axum::serve(address, router).await?;

    Ok(())
}

struct Upstream {
    origin: String,
    client: reqwest::Client,
}

async fn forward(State(upstream): State<Arc<Upstream>>, request: Request) -> Response {
    match forward_inner(&upstream, request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!("proxy error: {err:#}");
            Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .body(Body::from("upstream unavailable"))
                .expect("static response")
        }
    }
}

async fn forward_inner(upstream: &Upstream, request: Request) -> anyhow::Result<Response> {
    let url = upstream_url(&upstream.origin, &request);
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await?;

    let mut proxied = upstream.client.request(parts.method, url);
    for (name, value) in &parts.headers {
        // The upstream expects its own host header.
        if name != header::HOST {
            proxied = proxied.header(name, value);
        }
    }

    let reply = proxied.body(bytes).send().await?;

    let mut response = Response::builder().status(reply.status());
    for (name, value) in reply.headers() {
        // The body is re-framed, so framing headers must not leak through.
        if name != header::TRANSFER_ENCODING {
            response = response.header(name, value);
        }
    }

    Ok(response.body(Body::from(reply.bytes().await?))?)
}

fn upstream_url(origin: &str, request: &Request) -> String {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("{}{}", origin.trim_end_matches('/'), path_and_query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn upstream_url_keeps_path_and_query() {
        let url = upstream_url("http://localhost:3000", &request("/styles/app.css?v=2"));
        assert_eq!(url, "http://localhost:3000/styles/app.css?v=2");
    }

    #[test]
    fn upstream_url_tolerates_a_trailing_slash() {
        let url = upstream_url("http://localhost:3000/", &request("/"));
        assert_eq!(url, "http://localhost:3000/");
    }
}
