use crate::config::AppConfig;
use crate::store::{MemoryStore, PgStore, Store};
use crate::voice::CallRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub calls: CallRegistry,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = if config.uses_memory_store() {
            tracing::warn!("DATABASE_URL=memory; records are lost on restart");
            Arc::new(MemoryStore::new()) as Arc<dyn Store>
        } else {
            let pg = PgStore::connect(&config.database_url, config.max_connections).await?;
            if let Err(e) = pg.migrate().await {
                tracing::warn!(error = %e, "migration failed; continuing");
            }
            Arc::new(pg) as Arc<dyn Store>
        };

        if config.webhook_secret.is_none() {
            tracing::warn!("CLERK_WEBHOOK_SECRET not set; identity webhooks are not verified");
        }

        Ok(Self::from_parts(store, config))
    }

    pub fn from_parts(store: Arc<dyn Store>, config: Arc<AppConfig>) -> Self {
        Self {
            store,
            config,
            calls: CallRegistry::default(),
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::{JwtConfig, VoiceConfig};

        let config = Arc::new(AppConfig {
            database_url: "memory".into(),
            max_connections: 1,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
            },
            webhook_secret: None,
            service_api_key: Some("service-key".into()),
            voice: VoiceConfig {
                api_key: Some("vapi-public-key".into()),
                assistant_id: Some("assistant-123".into()),
                server_secret: None,
            },
        });
        Self::from_parts(Arc::new(MemoryStore::new()), config)
    }
}
