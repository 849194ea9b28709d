//! HTTP front end for point-in-polygon queries.
//!
//! `POST /` takes a JSON query (see [`PointInPolygonRequest`]) and answers
//! with the matching place results. `GET /health` reports liveness.

use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use pip_spatial::SpatialIndex;

use crate::query::{PointInPolygonRequest, query};

/// Shared server state.
pub struct ServerState {
    pub index: Arc<SpatialIndex>,
}

/// Splits `http://host:port` into a bind address.
///
/// # Errors
///
/// Returns a message naming the URI if it isn't `http://` with a host and a
/// numeric port.
pub fn parse_server_uri(uri: &str) -> Result<(String, u16), String> {
    let invalid = || format!("Invalid server URI '{uri}', expected http://host:port");

    let authority = uri.strip_prefix("http://").ok_or_else(invalid)?;
    let authority = authority.trim_end_matches('/');
    let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse().map_err(|_| invalid())?;

    Ok((host.to_string(), port))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::post().to(point_in_polygon))
        .route("/health", web::get().to(health));
}

/// Serves queries against `index` until the process is stopped.
///
/// # Errors
///
/// Fails if the address can't be bound.
pub async fn serve(index: Arc<SpatialIndex>, host: String, port: u16) -> std::io::Result<()> {
    let state = web::Data::new(ServerState { index });

    log::info!("Listening for requests at http://{host}:{port}");

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(routes)
    })
    .bind((host, port))?
    .run()
    .await
}

/// `GET /health`
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST /`
async fn point_in_polygon(
    state: web::Data<ServerState>,
    request: web::Json<PointInPolygonRequest>,
) -> HttpResponse {
    match query(&state.index, &request).await {
        Ok(results) => HttpResponse::Ok().json(results),
        Err(e) if e.is_bad_request() => HttpResponse::BadRequest().json(serde_json::json!({
            "error": e.to_string()
        })),
        Err(e) => {
            log::error!("Point-in-polygon query failed: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": e.to_string()
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test as actix_test;

    use super::*;

    #[test]
    fn parses_server_uris() {
        assert_eq!(
            parse_server_uri("http://localhost:8080"),
            Ok(("localhost".to_string(), 8080))
        );
        assert_eq!(
            parse_server_uri("http://0.0.0.0:9000/"),
            Ok(("0.0.0.0".to_string(), 9000))
        );
        for bad in ["localhost:8080", "http://localhost", "http://:80", "https://a:1"] {
            assert!(parse_server_uri(bad).is_err(), "{bad}");
        }
    }

    #[actix_web::test]
    async fn answers_posted_queries() {
        let state = web::Data::new(ServerState {
            index: Arc::new(crate::query::tests::index()),
        });
        let app = actix_test::init_service(App::new().app_data(state).configure(routes)).await;

        let req = actix_test::TestRequest::post()
            .uri("/")
            .set_json(serde_json::json!({
                "latitude": 0.5,
                "longitude": 0.5,
                "placetypes": ["neighbourhood"],
                "properties": ["wof:country"]
            }))
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], "10");
        assert_eq!(body[0]["wof:country"], "US");
    }

    #[actix_web::test]
    async fn rejects_bad_points() {
        let state = web::Data::new(ServerState {
            index: Arc::new(crate::query::tests::index()),
        });
        let app = actix_test::init_service(App::new().app_data(state).configure(routes)).await;

        let req = actix_test::TestRequest::post()
            .uri("/")
            .set_json(serde_json::json!({ "latitude": 200.0, "longitude": 0.0 }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let req = actix_test::TestRequest::get().uri("/health").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
