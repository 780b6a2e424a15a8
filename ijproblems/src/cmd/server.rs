use crate::cmd::BackendKind;
use crate::modules::{
    handlers::{liveness, problems, ranking, readiness, users},
    provider::{
        memory::MemoryDataProvider,
        postgres::{postgres_url, PgDataProvider},
        DataProvider,
    },
};
use anyhow::{Context, Result};
use axum::{extract::Extension, routing, Router, Server};
use clap::Args;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, Args)]
pub struct ServerArgs {
    #[arg(long)]
    port: Option<u16>,
    /// Which data provider implementation to serve from.
    #[arg(long, value_enum, default_value_t = BackendKind::Postgres)]
    backend: BackendKind,
}

pub async fn run(args: ServerArgs) -> Result<()> {
    let provider: Arc<dyn DataProvider> = match args.backend {
        BackendKind::Memory => Arc::new(MemoryDataProvider::fixture()?),
        BackendKind::Postgres => {
            let url = postgres_url()?;
            let pool = PgPoolOptions::new().connect(&url).await.with_context(|| {
                let message = "couldn't connect to PostgreSQL. check your database status and the POSTGRES_* environment variables.";
                tracing::error!(message);
                String::from(message)
            })?;
            Arc::new(PgDataProvider::new(pool))
        }
    };

    tracing::info!("Serve rankings with the {} backend", args.backend);
    let app = create_router(provider);
    let port = match args.port {
        Some(port) => port,
        None => {
            tracing::warn!("API server will be launched at default port number 8000");
            8000u16
        }
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server start at port {}", port);
    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to bind server.");

    Ok(())
}

fn create_router(provider: Arc<dyn DataProvider>) -> Router {
    Router::new()
        .route("/api/ranking", routing::get(ranking::get_global_ranking))
        .route("/api/ranking/local", routing::get(ranking::get_local_ranking))
        .route("/api/problems", routing::get(problems::get_problems))
        .route("/api/problems/:problem_id", routing::get(problems::get_problem))
        .route("/api/users/:aoj_userid", routing::get(users::get_user))
        .route("/api/liveness", routing::get(liveness))
        .route("/api/readiness", routing::get(readiness))
        .layer(Extension(provider))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler.");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("SIGINT signal received, starting graceful shutdown.");
}

#[cfg(test)]
mod test {
    use super::*;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    fn fixture_router() -> Router {
        let provider: Arc<dyn DataProvider> =
            Arc::new(MemoryDataProvider::fixture().expect("failed to build fixture"));
        create_router(provider)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);

        (status, value)
    }

    #[tokio::test]
    async fn liveness_is_ok() {
        let response = fixture_router()
            .oneshot(
                Request::builder()
                    .uri("/api/liveness")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn global_ranking_returns_ordered_rows() {
        let (status, body) = get_json(fixture_router(), "/api/ranking?contest_type=0&page=1").await;

        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        assert!(!items.is_empty());

        // Rows are ordered by total_point descending.
        let points: Vec<i64> = items
            .iter()
            .map(|item| item["total_point"].as_i64().unwrap())
            .collect();
        let mut sorted = points.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(points, sorted);

        assert_eq!(body["total_row"]["aoj_userid"], "TOTAL");
    }

    #[tokio::test]
    async fn invalid_contest_type_is_rejected() {
        let (status, _) = get_json(fixture_router(), "/api/ranking?contest_type=7").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn local_ranking_returns_one_row_per_user() {
        let (status, body) = get_json(
            fixture_router(),
            "/api/ranking/local?contest_type=0&users=user0,nonexistent",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);

        let zero_row = items
            .iter()
            .find(|item| item["aoj_userid"] == "nonexistent")
            .unwrap();
        assert_eq!(zero_row["total_point"], 0);
        assert_eq!(zero_row["total_solved"], 0);
    }

    #[tokio::test]
    async fn unknown_problem_is_a_bad_request() {
        let (status, body) = get_json(fixture_router(), "/api/problems/42").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn problem_list_can_hide_solved_problems() {
        let (status, body) = get_json(
            fixture_router(),
            "/api/problems?contest_type=0&aoj_userid=user0&hide_solved=true",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let solved: Vec<i64> = body["user_solved_problems"]
            .as_array()
            .unwrap()
            .iter()
            .map(|problem_id| problem_id.as_i64().unwrap())
            .collect();
        assert!(!solved.is_empty());

        let listed: Vec<i64> = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["problem_id"].as_i64().unwrap())
            .collect();
        for problem_id in solved {
            assert!(!listed.contains(&problem_id));
        }
    }
}
