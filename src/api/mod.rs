mod config;

use actix_cors::Cors;
use actix_web::{delete, get, put, web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use std::sync::Arc;

use crate::cluster::coordinator::{handle_proxied, CoordRequest};
use crate::cluster::ReplicationCoordinator;
use crate::core::engine::LsmEngine;
use crate::infra::error::DispatchError;

pub use config::ServerConfig;

pub struct AppState {
    pub engine: Arc<LsmEngine>,
    pub coordinator: Arc<ReplicationCoordinator>,
    pub topology_size: usize,
    pub default_ack: usize,
    pub default_from: usize,
}

#[derive(Deserialize)]
struct EntityQuery {
    id: Option<String>,
    replicas: Option<String>,
}

/// Parse `ack/from`, falling back to the node defaults when absent.
/// Returns 400 for anything malformed or out of the `0 < ack <= from <= N` range.
fn parse_replicas(
    raw: Option<&str>,
    default_ack: usize,
    default_from: usize,
    topology_size: usize,
) -> Result<(usize, usize), DispatchError> {
    let (ack, from) = match raw {
        None => (default_ack, default_from),
        Some(spec) => {
            let (ack_str, from_str) = spec
                .split_once('/')
                .ok_or_else(|| DispatchError::BadRequest(format!("malformed replicas: {spec}")))?;
            let ack: usize = ack_str
                .parse()
                .map_err(|_| DispatchError::BadRequest(format!("malformed ack: {ack_str}")))?;
            let from: usize = from_str
                .parse()
                .map_err(|_| DispatchError::BadRequest(format!("malformed from: {from_str}")))?;
            (ack, from)
        }
    };

    if ack == 0 || from == 0 || ack > from || from > topology_size {
        return Err(DispatchError::BadRequest(format!(
            "invalid replicas {ack}/{from} for topology of size {topology_size}"
        )));
    }
    Ok((ack, from))
}

fn dispatch_error_response(err: DispatchError) -> HttpResponse {
    let status = actix_web::http::StatusCode::from_u16(err.status_code())
        .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).body(err.to_string())
}

fn is_proxied(req: &HttpRequest) -> bool {
    req.headers()
        .get("Proxy")
        .map(|v| v == "true")
        .unwrap_or(false)
}

#[get("/v0/status")]
async fn status() -> impl Responder {
    HttpResponse::Ok().body("I'm OK")
}

#[get("/v0/stats")]
async fn stats(data: web::Data<AppState>) -> impl Responder {
    match data.engine.stats() {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

#[get("/v0/entity")]
async fn get_entity(
    req: HttpRequest,
    query: web::Query<EntityQuery>,
    data: web::Data<AppState>,
) -> impl Responder {
    let Some(id) = query.id.as_ref().filter(|id| !id.is_empty()) else {
        return dispatch_error_response(DispatchError::BadRequest("missing or empty id".into()));
    };
    let key = id.as_bytes().to_vec();

    if is_proxied(&req) {
        let (status, body, tombstone) = handle_proxied(&data.engine, &CoordRequest::Get { key });
        let status_code = actix_web::http::StatusCode::from_u16(status)
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = HttpResponse::build(status_code);
        if tombstone {
            builder.insert_header(("Tombstone", "true"));
        }
        return builder.body(body);
    }

    let (ack, from) = match parse_replicas(
        query.replicas.as_deref(),
        data.default_ack,
        data.default_from,
        data.topology_size,
    ) {
        Ok(v) => v,
        Err(e) => return dispatch_error_response(e),
    };

    match data.coordinator.dispatch(CoordRequest::Get { key }, ack, from).await {
        Ok((status, body)) => {
            let status_code = actix_web::http::StatusCode::from_u16(status)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
            HttpResponse::build(status_code).body(body)
        }
        Err(e) => dispatch_error_response(e),
    }
}

#[put("/v0/entity")]
async fn put_entity(
    req: HttpRequest,
    query: web::Query<EntityQuery>,
    body: web::Bytes,
    data: web::Data<AppState>,
) -> impl Responder {
    let Some(id) = query.id.as_ref().filter(|id| !id.is_empty()) else {
        return dispatch_error_response(DispatchError::BadRequest("missing or empty id".into()));
    };
    let key = id.as_bytes().to_vec();
    let value = body.to_vec();

    if is_proxied(&req) {
        let (status, body, _) = handle_proxied(&data.engine, &CoordRequest::Put { key, value });
        let status_code = actix_web::http::StatusCode::from_u16(status)
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
        return HttpResponse::build(status_code).body(body);
    }

    let (ack, from) = match parse_replicas(
        query.replicas.as_deref(),
        data.default_ack,
        data.default_from,
        data.topology_size,
    ) {
        Ok(v) => v,
        Err(e) => return dispatch_error_response(e),
    };

    match data.coordinator.dispatch(CoordRequest::Put { key, value }, ack, from).await {
        Ok((status, body)) => {
            let status_code = actix_web::http::StatusCode::from_u16(status)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
            HttpResponse::build(status_code).body(body)
        }
        Err(e) => dispatch_error_response(e),
    }
}

#[delete("/v0/entity")]
async fn delete_entity(
    req: HttpRequest,
    query: web::Query<EntityQuery>,
    data: web::Data<AppState>,
) -> impl Responder {
    let Some(id) = query.id.as_ref().filter(|id| !id.is_empty()) else {
        return dispatch_error_response(DispatchError::BadRequest("missing or empty id".into()));
    };
    let key = id.as_bytes().to_vec();

    if is_proxied(&req) {
        let (status, body, _) = handle_proxied(&data.engine, &CoordRequest::Delete { key });
        let status_code = actix_web::http::StatusCode::from_u16(status)
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
        return HttpResponse::build(status_code).body(body);
    }

    let (ack, from) = match parse_replicas(
        query.replicas.as_deref(),
        data.default_ack,
        data.default_from,
        data.topology_size,
    ) {
        Ok(v) => v,
        Err(e) => return dispatch_error_response(e),
    };

    match data.coordinator.dispatch(CoordRequest::Delete { key }, ack, from).await {
        Ok((status, body)) => {
            let status_code = actix_web::http::StatusCode::from_u16(status)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
            HttpResponse::build(status_code).body(body)
        }
        Err(e) => dispatch_error_response(e),
    }
}

pub async fn start_server(
    engine: Arc<LsmEngine>,
    coordinator: Arc<ReplicationCoordinator>,
    server_config: &ServerConfig,
) -> std::io::Result<()> {
    let topology_size = server_config.topology.len();
    let default_ack = server_config.default_ack;
    let default_from = server_config.default_from;
    let host = server_config.host.clone();
    let port = server_config.port;

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(AppState {
                engine: Arc::clone(&engine),
                coordinator: Arc::clone(&coordinator),
                topology_size,
                default_ack,
                default_from,
            }))
            .service(status)
            .service(stats)
            .service(get_entity)
            .service(put_entity)
            .service(delete_entity)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_replicas_are_used_when_absent() {
        let (ack, from) = parse_replicas(None, 2, 3, 3).unwrap();
        assert_eq!((ack, from), (2, 3));
    }

    #[test]
    fn explicit_replicas_are_parsed() {
        let (ack, from) = parse_replicas(Some("1/2"), 2, 3, 3).unwrap();
        assert_eq!((ack, from), (1, 2));
    }

    #[test]
    fn ack_zero_is_rejected() {
        assert!(parse_replicas(Some("0/3"), 2, 3, 3).is_err());
    }

    #[test]
    fn from_greater_than_topology_is_rejected() {
        assert!(parse_replicas(Some("2/4"), 2, 3, 3).is_err());
    }

    #[test]
    fn ack_greater_than_from_is_rejected() {
        assert!(parse_replicas(Some("3/2"), 2, 3, 3).is_err());
    }
}
