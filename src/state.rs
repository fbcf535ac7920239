use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::{OneTimeCodes, TokenIssuer};
use crate::config::Config;
use crate::db::Store;
use crate::services::Mailer;

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub tokens: Arc<TokenIssuer>,

    pub codes: OneTimeCodes,

    pub mailer: Arc<Mailer>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let tokens = Arc::new(TokenIssuer::new(
            &config.auth.token_secret,
            config.auth.token_ttl_hours,
        ));

        let codes = OneTimeCodes::new(&config.auth.code_secret, config.auth.code_ttl_minutes);

        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            tokens,
            codes,
            mailer,
        })
    }
}
