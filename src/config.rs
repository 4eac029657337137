use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Password-reset and credential-check behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub reset_token_ttl_minutes: i64,
    /// Link prefix mailed to the user; the raw reset token is appended.
    pub reset_url_base: String,
    /// Answer unknown-account and bad-password cases with the same message.
    pub uniform_errors: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub auth: AuthConfig,
    /// `None` means outgoing mail is only logged.
    pub smtp: Option<SmtpConfig>,
    pub storage: StorageConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "inkpress".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "inkpress-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60),
        };
        let auth = AuthConfig {
            reset_token_ttl_minutes: env_parse("RESET_TOKEN_TTL_MINUTES", 15),
            reset_url_base: std::env::var("RESET_URL_BASE")
                .unwrap_or_else(|_| "http://localhost:8080/api/users/reset-password".into()),
            uniform_errors: env_parse("AUTH_UNIFORM_ERRORS", false),
        };
        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: env_parse("SMTP_PORT", 587),
                username: std::env::var("SMTP_USERNAME")?,
                password: std::env::var("SMTP_PASSWORD")?,
                from: std::env::var("SMTP_FROM")?,
            }),
            Err(_) => None,
        };
        let storage = StorageConfig {
            endpoint: std::env::var("MINIO_ENDPOINT")?,
            bucket: std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "inkpress".into()),
            access_key: std::env::var("MINIO_ACCESS_KEY")?,
            secret_key: std::env::var("MINIO_SECRET_KEY")?,
        };
        Ok(Self {
            database_url,
            jwt,
            auth,
            smtp,
            storage,
        })
    }
}
