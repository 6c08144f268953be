//! API server: HTTP REST endpoints plus the Prometheus exporter.

use crate::loyalty_rest as loyalty;
use crate::rest::{self, AppState};
use axum::routing::{get, post, put};
use axum::Router;
use dinepoints_core::config::AppConfig;
use dinepoints_loyalty::LoyaltyEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    engine: Arc<LoyaltyEngine>,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: Arc<LoyaltyEngine>) -> Self {
        Self { config, engine }
    }

    /// All routes with middleware applied.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        Router::new()
            // Accounts
            .route("/v1/accounts", post(loyalty::handle_enroll))
            .route("/v1/accounts/:user_id", get(loyalty::handle_get_account))
            .route("/v1/accounts/:user_id/status", put(loyalty::handle_set_status))
            .route("/v1/accounts/:user_id/history", get(loyalty::handle_history))
            .route("/v1/accounts/:user_id/streaks", post(loyalty::handle_update_streak))
            .route(
                "/v1/accounts/:user_id/streaks/reset-lapsed",
                post(loyalty::handle_reset_lapsed_streaks),
            )
            .route("/v1/accounts/:user_id/occasions", post(loyalty::handle_occasion_bonus))
            // Challenges
            .route(
                "/v1/accounts/:user_id/challenges",
                get(loyalty::handle_active_challenges),
            )
            .route(
                "/v1/accounts/:user_id/challenges/assign",
                post(loyalty::handle_assign_challenges),
            )
            .route(
                "/v1/accounts/:user_id/challenges/:challenge_id/claim",
                post(loyalty::handle_claim),
            )
            // Rewards
            .route("/v1/rewards", get(loyalty::handle_rewards))
            .route("/v1/accounts/:user_id/redeem", post(loyalty::handle_redeem))
            .route(
                "/v1/accounts/:user_id/redemptions/:code/use",
                post(loyalty::handle_mark_used),
            )
            .route("/v1/leaderboard", get(loyalty::handle_leaderboard))
            // Inbound platform events
            .route(
                "/v1/events/booking-completed",
                post(loyalty::handle_booking_completed),
            )
            .route(
                "/v1/events/review-submitted",
                post(loyalty::handle_review_submitted),
            )
            .route("/v1/events/checkin", post(loyalty::handle_checkin))
            .route(
                "/v1/events/referral-confirmed",
                post(loyalty::handle_referral_confirmed),
            )
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Start the metrics exporter on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        if !self.config.metrics.enabled {
            info!("Metrics exporter disabled");
            return Ok(());
        }
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
