//! HTTP surface of the gateway
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | `/health` | gateway liveness |
//! | POST | `/register` | register or re-register a team |
//! | DELETE | `/teams/{id}` | unregister a team |
//! | GET | `/teams?capability=` | team status views |
//! | GET | `/teams/{id}` | one team's status view |
//! | GET | `/capabilities` | capability index |
//! | POST | `/route` | route and forward a task |
//! | POST | `/proxy/{id}/task` | forward a raw task to one team |
//! | GET | `/stats` | gateway and team statistics |
//! | GET | `/metrics` | process counters |

pub mod handlers;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::Gateway;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use warp::Filter;

fn with_gateway(
    gateway: Arc<Gateway>,
) -> impl Filter<Extract = (Arc<Gateway>,), Error = Infallible> + Clone {
    warp::any().map(move || gateway.clone())
}

fn json_body<T: DeserializeOwned + Send>(
    limit: u64,
) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(limit).and(warp::body::json())
}

/// All routes with rejection handling, ready for `warp::serve` or `warp::test`
pub fn routes(
    gateway: Arc<Gateway>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    let limit = gateway.config().forwarding.request_body_limit_bytes;

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_gateway(gateway.clone()))
        .and_then(handlers::health);

    let register = warp::path!("register")
        .and(warp::post())
        .and(json_body(limit))
        .and(with_gateway(gateway.clone()))
        .and_then(handlers::register);

    let unregister = warp::path!("teams" / String)
        .and(warp::delete())
        .and(with_gateway(gateway.clone()))
        .and_then(handlers::unregister);

    let list_teams = warp::path!("teams")
        .and(warp::get())
        .and(warp::query::<handlers::TeamsQuery>())
        .and(with_gateway(gateway.clone()))
        .and_then(handlers::list_teams);

    let get_team = warp::path!("teams" / String)
        .and(warp::get())
        .and(with_gateway(gateway.clone()))
        .and_then(handlers::get_team);

    let capabilities = warp::path!("capabilities")
        .and(warp::get())
        .and(with_gateway(gateway.clone()))
        .and_then(handlers::capabilities);

    let route = warp::path!("route")
        .and(warp::post())
        .and(json_body(limit))
        .and(with_gateway(gateway.clone()))
        .and_then(handlers::route);

    let proxy = warp::path!("proxy" / String / "task")
        .and(warp::post())
        .and(json_body(limit))
        .and(with_gateway(gateway.clone()))
        .and_then(handlers::proxy);

    let stats = warp::path!("stats")
        .and(warp::get())
        .and(with_gateway(gateway))
        .and_then(handlers::stats);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and_then(handlers::metrics_snapshot);

    health
        .or(register)
        .unify()
        .or(unregister)
        .unify()
        .or(list_teams)
        .unify()
        .or(get_team)
        .unify()
        .or(capabilities)
        .unify()
        .or(route)
        .unify()
        .or(proxy)
        .unify()
        .or(stats)
        .unify()
        .or(metrics)
        .unify()
        .recover(handlers::handle_rejection)
        .unify()
        .with(warp::trace::request())
}

/// Serve the API on `addr` until `shutdown` resolves
pub async fn serve<F>(gateway: Arc<Gateway>, addr: SocketAddr, shutdown: F) -> GatewayResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) = warp::serve(routes(gateway))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| GatewayError::internal_error(format!("Failed to bind {addr}: {e}")))?;

    info!(address = %bound, "Gateway API listening");
    server.await;
    info!("Gateway API stopped");
    Ok(())
}
