use anyhow::{Context, Result, bail};

const MIN_SECRET_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET missing")?;
        let cors = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into());
        Self::from_parts(jwt_secret, &cors)
    }

    pub fn from_parts(jwt_secret: String, cors_allowed_origins: &str) -> Result<Self> {
        let jwt_secret = jwt_secret.trim().to_string();
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes");
        }
        let cors_allowed_origins = cors_allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            jwt_secret,
            cors_allowed_origins,
        })
    }
}
