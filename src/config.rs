use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

/// Hosted voice assistant settings handed to the browser and used to
/// authenticate its server messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceConfig {
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub server_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub jwt: JwtConfig,
    pub webhook_secret: Option<String>,
    pub service_api_key: Option<String>,
    pub voice: VoiceConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "fitplan".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "fitplan-users".into()),
        };
        let voice = VoiceConfig {
            api_key: non_empty_var("VAPI_API_KEY"),
            assistant_id: non_empty_var("VAPI_ASSISTANT_ID")
                .or_else(|| non_empty_var("VAPI_WORKFLOW_ID")),
            server_secret: non_empty_var("VAPI_SERVER_SECRET"),
        };
        Ok(Self {
            database_url,
            max_connections,
            jwt,
            webhook_secret: non_empty_var("CLERK_WEBHOOK_SECRET"),
            service_api_key: non_empty_var("SERVICE_API_KEY"),
            voice,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == "memory"
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
