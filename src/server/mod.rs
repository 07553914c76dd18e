//! HTTP surface: axum router, shared state, and middleware layering.
//!
//! Layer order matters: CORS is outermost so its headers are present even
//! on rejected requests, then request logging, then the security headers,
//! with the body limit innermost so oversized payloads die before any
//! handler runs.

pub mod handlers;
pub mod security;
pub mod types;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::sim::engine::SimulationEngine;
use crate::store::repository::DeliveryRepository;

/// Requests past this size are rejected with 413 before parsing.
pub const MAX_BODY_BYTES: usize = 1_048_576;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SimulationEngine>,
    pub repo: Arc<dyn DeliveryRepository>,
}

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/grid", grid_routes())
        .nest("/api/bots", bots_routes())
        .nest("/api/orders", orders_routes())
        .nest("/api/simulation", simulation_routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(security::security_headers))
        .layer(middleware::from_fn(security::request_logging))
        .layer(cors)
        .with_state(state)
}

fn simulation_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(handlers::simulation::status))
        .route("/start", post(handlers::simulation::start))
        .route("/stop", post(handlers::simulation::stop))
        .route("/reset", post(handlers::simulation::reset))
        .route("/tick", post(handlers::simulation::tick))
        .route("/bots/positions", get(handlers::simulation::bot_positions))
}

fn orders_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route(
            "/:order_id",
            get(handlers::orders::get_order)
                .put(handlers::orders::update_order)
                .delete(handlers::orders::cancel_order),
        )
        .route("/:order_id/history", get(handlers::orders::order_history))
}

fn grid_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::grid::get_grid))
        .route("/nodes", get(handlers::grid::list_nodes))
        .route("/nodes/:node_id", get(handlers::grid::get_node))
        .route("/restaurants", get(handlers::grid::list_restaurants))
        .route("/delivery-points", get(handlers::grid::list_delivery_points))
        .route("/blocked-edges", get(handlers::grid::list_blocked_edges))
}

fn bots_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::bots::list_bots))
        .route("/:bot_id", get(handlers::bots::get_bot))
        .route("/:bot_id/orders", get(handlers::bots::bot_orders))
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "message": "gridbite API is running" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use crate::metrics::counters::Counters;
    use crate::sim::engine::EngineConfig;
    use crate::store::model::BotStatus;
    use crate::testutil::{MemoryRepository, mark_delivery_at, mk_bot, mk_grid_nodes};

    /// 3x3 town with two restaurants, three houses on the top row, and a
    /// two-bot fleet at the station (1,0).
    async fn test_app() -> (Arc<MemoryRepository>, Router) {
        let mut nodes = mk_grid_nodes(3, 3);
        mark_delivery_at(&mut nodes, 0, 2);
        mark_delivery_at(&mut nodes, 1, 2);
        mark_delivery_at(&mut nodes, 2, 2);
        let repo = Arc::new(MemoryRepository::with_world(
            nodes,
            vec![("RAMEN".to_string(), 1), ("PIZZA".to_string(), 3)],
            vec![],
        ));
        repo.add_bot(mk_bot(1, 2, BotStatus::Idle));
        repo.add_bot(mk_bot(2, 2, BotStatus::Idle));

        let cfg = EngineConfig {
            station_x: 1,
            station_y: 0,
            ..EngineConfig::default()
        };
        let engine = SimulationEngine::bootstrap(repo.clone(), cfg, Counters::default())
            .await
            .expect("bootstrap");

        let state = AppState {
            engine: Arc::new(engine),
            repo: repo.clone(),
        };
        (repo, build_router(state, &[]))
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_carries_security_headers_and_no_server_banner() {
        let (_repo, app) = test_app().await;
        let res = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(res.headers().get("x-frame-options").unwrap(), "DENY");
        assert!(res.headers().get(header::SERVER).is_none());
    }

    #[tokio::test]
    async fn create_order_round_trip() {
        let (_repo, app) = test_app().await;

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/orders",
                r#"{"restaurant_id":1,"delivery_node_id":7}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let body = body_json(res).await;
        assert_eq!(body["status"], "ASSIGNED", "eager assignment kicked in");
        assert_eq!(body["restaurant_name"], "RAMEN");
        assert_eq!(body["pickup_node_id"], 1);

        let res = app.oneshot(get_request("/api/orders/1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["id"], 1);
    }

    #[tokio::test]
    async fn create_order_rejects_bad_targets() {
        let (_repo, app) = test_app().await;

        // Restaurant node is not a delivery point.
        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/orders",
                r#"{"restaurant_id":1,"delivery_node_id":1}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/orders",
                r#"{"restaurant_id":42,"delivery_node_id":7}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fourth_order_in_window_is_throttled() {
        let (_repo, app) = test_app().await;

        for _ in 0..3 {
            let res = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/orders",
                    r#"{"restaurant_id":1,"delivery_node_id":7}"#,
                ))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::CREATED);
        }

        let res = app
            .oneshot(json_request(
                "POST",
                "/api/orders",
                r#"{"restaurant_id":1,"delivery_node_id":7}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (_repo, app) = test_app().await;

        let huge = format!(
            r#"{{"restaurant_id":1,"delivery_node_id":7,"padding":"{}"}}"#,
            "x".repeat(2 * MAX_BODY_BYTES)
        );
        let res = app
            .oneshot(json_request("POST", "/api/orders", &huge))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn tick_reports_not_running() {
        let (_repo, app) = test_app().await;

        let res = app
            .oneshot(json_request("POST", "/api/simulation/tick", ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["message"], "Simulation is not running");
        assert!(body["results"].is_null());
    }

    #[tokio::test]
    async fn simulation_flow_over_http() {
        let (_repo, app) = test_app().await;

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/orders",
                r#"{"restaurant_id":1,"delivery_node_id":7}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/simulation/start", ""))
            .await
            .unwrap();
        assert_eq!(body_json(res).await["is_running"], true);

        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/simulation/tick", ""))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["message"], "Tick processed");
        assert_eq!(body["tick"], 1);

        let res = app
            .clone()
            .oneshot(get_request("/api/simulation/status"))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["is_running"], true);
        assert_eq!(body["tick_count"], 1);
        assert_eq!(body["total_orders"], 1);

        let res = app
            .clone()
            .oneshot(get_request("/api/simulation/bots/positions"))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["tick"], 1);
        let bots = body["bots"].as_array().unwrap();
        assert_eq!(bots.len(), 2);
        assert!(bots[0]["route"].is_array());

        let res = app
            .clone()
            .oneshot(get_request("/api/orders/1/history"))
            .await
            .unwrap();
        let history = body_json(res).await;
        let rows = history.as_array().unwrap();
        assert!(rows.len() >= 2, "create + assignment recorded");
        assert_eq!(rows[0]["new_status"], "PENDING");

        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/simulation/reset", ""))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["tick_count"], 0);

        let res = app
            .oneshot(get_request("/api/simulation/status"))
            .await
            .unwrap();
        let body = body_json(res).await;
        assert_eq!(body["is_running"], false);
        assert_eq!(body["cancelled_orders"], 1);
    }

    #[tokio::test]
    async fn cancel_transitions_and_conflicts() {
        let (_repo, app) = test_app().await;

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/orders",
                r#"{"restaurant_id":1,"delivery_node_id":7}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/orders/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        // Cancelling a cancelled order is an illegal transition.
        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/orders/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/orders/99")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_rejects_unknown_status_value() {
        let (_repo, app) = test_app().await;

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/orders",
                r#"{"restaurant_id":1,"delivery_node_id":7}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app
            .oneshot(json_request(
                "PUT",
                "/api/orders/1",
                r#"{"status":"TELEPORTED"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn grid_and_fleet_views() {
        let (_repo, app) = test_app().await;

        let res = app.clone().oneshot(get_request("/api/grid")).await.unwrap();
        let body = body_json(res).await;
        assert_eq!(body["nodes"].as_array().unwrap().len(), 9);
        assert_eq!(body["restaurants"].as_array().unwrap().len(), 2);
        assert_eq!(body["delivery_points"].as_array().unwrap().len(), 3);

        let res = app.clone().oneshot(get_request("/api/bots")).await.unwrap();
        let body = body_json(res).await;
        let bots = body.as_array().unwrap();
        assert_eq!(bots.len(), 2);
        assert_eq!(bots[0]["available_capacity"], 3);

        let res = app.oneshot(get_request("/api/bots/42")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
