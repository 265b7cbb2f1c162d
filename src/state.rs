use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{
    config::Config,
    database::init_pool,
    payments::{HttpGateway, LocalGateway, PaymentGateway, SignatureVerifier},
};

pub struct AppState {
    pub config: Config,
    pub pool: SqlitePool,
    pub gateway: Arc<dyn PaymentGateway>,
    pub verifier: SignatureVerifier,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let pool = init_pool(&config.database_url).await;

        let gateway: Arc<dyn PaymentGateway> = if config.gateway_url.is_empty() {
            Arc::new(LocalGateway)
        } else {
            Arc::new(HttpGateway::new(&config.gateway_url))
        };

        let verifier = SignatureVerifier::new(&config.payment_secret);

        Arc::new(Self {
            config,
            pool,
            gateway,
            verifier,
        })
    }
}
