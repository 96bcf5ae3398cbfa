//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection. Route dispatch is a
//! plain `(Method, path)` match; every arm builds a `Reply` through the
//! route cores and serializes it at this edge.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth;
use crate::limiter;
use crate::routes;
use crate::routes::envelope::Reply;
use crate::server::AppState;
use crate::store::Agent;
use crate::types::ApiError;

pub async fn run(state: Arc<AppState>) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Roundtable listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled");
    }
    if state.args.admin_key.is_none() {
        warn!("ADMIN_KEY not set - admin surface is disabled");
    }

    limiter::spawn_cleanup_task(Arc::clone(&state.limiter));

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Resolve the bearer credential, then touch last_active off the request
/// path. A touch failure never fails the request.
async fn authed(state: &Arc<AppState>, headers: &HeaderMap) -> Result<Agent, ApiError> {
    let token = auth::bearer_token(headers)?;
    let agent = auth::authenticate(state.store.as_ref(), token).await?;

    let store = Arc::clone(&state.store);
    let agent_id = agent.id.clone();
    tokio::spawn(async move {
        if let Err(err) = store.touch_last_active(&agent_id).await {
            debug!("Failed to touch last_active for {}: {}", agent_id, err);
        }
    });

    Ok(agent)
}

fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, X-Admin-Key",
        )
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn not_found(path: &str) -> Reply {
    Reply::from_error(&ApiError::NotFound {
        resource: "Route",
        id: path.to_string(),
    })
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let headers = req.headers().clone();

    debug!("[{}] {} {}", addr, method, path);

    if method == Method::OPTIONS {
        return Ok(preflight_response());
    }

    let body = req.into_body().collect().await?.to_bytes();

    let result: Result<Reply, ApiError> = match (method, path.as_str()) {
        (Method::GET, "/api/health") => routes::health::health().await,

        (Method::POST, "/api/agents/register") => {
            routes::agents::register(&state, &addr.ip().to_string(), &body).await
        }
        (Method::GET, "/api/agents") => routes::agents::list(&state).await,
        (Method::GET, "/api/agents/me") => match authed(&state, &headers).await {
            Ok(agent) => routes::agents::me(&agent).await,
            Err(err) => Err(err),
        },
        (Method::GET, p) if p.starts_with("/api/agents/") => {
            let id = &p["/api/agents/".len()..];
            routes::agents::profile(&state, id).await
        }

        (Method::POST, "/api/ideas") => match authed(&state, &headers).await {
            Ok(agent) => routes::ideas::create(&state, &agent, &body).await,
            Err(err) => Err(err),
        },
        (Method::GET, "/api/ideas") => routes::ideas::list(&state, &query).await,
        (Method::POST, p) if p.starts_with("/api/ideas/") && p.ends_with("/upvote") => {
            let id = &p["/api/ideas/".len()..p.len() - "/upvote".len()];
            match authed(&state, &headers).await {
                Ok(agent) => routes::ideas::upvote(&state, &agent, id).await,
                Err(err) => Err(err),
            }
        }
        (Method::POST, p) if p.starts_with("/api/ideas/") && p.ends_with("/critiques") => {
            let id = &p["/api/ideas/".len()..p.len() - "/critiques".len()];
            match authed(&state, &headers).await {
                Ok(agent) => routes::critiques::create(&state, &agent, id, &body).await,
                Err(err) => Err(err),
            }
        }
        (Method::GET, p) if p.starts_with("/api/ideas/") => {
            let id = &p["/api/ideas/".len()..];
            routes::ideas::detail(&state, id).await
        }

        (Method::POST, p) if p.starts_with("/api/critiques/") && p.ends_with("/upvote") => {
            let id = &p["/api/critiques/".len()..p.len() - "/upvote".len()];
            match authed(&state, &headers).await {
                Ok(agent) => routes::critiques::upvote(&state, &agent, id).await,
                Err(err) => Err(err),
            }
        }

        (Method::GET, "/api/activity") => routes::activity::feed(&state, &query).await,
        (Method::GET, "/api/stats") => routes::stats::public_stats(&state).await,
        (Method::GET, "/api/admin/stats") => routes::stats::admin_stats(&state, &headers).await,

        (Method::GET, p) if p.starts_with("/claim/") => {
            let token = &p["/claim/".len()..];
            routes::claim::claim(&state, token).await
        }

        _ => Ok(not_found(&path)),
    };

    let reply = match result {
        Ok(reply) => reply,
        Err(err) => {
            if let ApiError::Internal(ref detail) = err {
                error!("Internal error on {}: {}", path, detail);
            }
            Reply::from_error(&err)
        }
    };

    Ok(reply.into_response())
}
