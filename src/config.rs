use std::net::SocketAddr;

use anyhow::Context;
use base64::{engine::general_purpose, Engine as _};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Mongo { uri: String, database: String },
    Memory,
}

/// Process-wide settings, read once at start-up.
#[derive(Clone, Debug)]
pub struct Config {
    pub jwt_secret: Vec<u8>,
    pub jwt_expiration: time::Duration,
    pub store: StoreKind,
    pub bind_addr: SocketAddr,
}

impl Config {
    pub const DEFAULT_EXPIRATION_SECONDS: i64 = 86_400;

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let secret = lookup("JWT_SECRET_KEY").context("JWT_SECRET_KEY is not set")?;
        let jwt_secret = general_purpose::STANDARD
            .decode(secret.trim())
            .context("JWT_SECRET_KEY must be base64 encoded")?;
        anyhow::ensure!(!jwt_secret.is_empty(), "JWT_SECRET_KEY must not be empty");

        let expiration = match lookup("JWT_EXPIRATION_SECONDS") {
            Some(it) => it
                .parse::<i64>()
                .context("JWT_EXPIRATION_SECONDS must be an integer")?,
            None => Self::DEFAULT_EXPIRATION_SECONDS,
        };
        anyhow::ensure!(expiration > 0, "JWT_EXPIRATION_SECONDS must be positive");

        let store = match lookup("STORE").as_deref() {
            None | Some("mongo") => StoreKind::Mongo {
                uri: lookup("MONGODB_URI").context("MONGODB_URI is not set")?,
                database: lookup("DATABASE_NAME").unwrap_or_else(|| "colis".to_string()),
            },
            Some("memory") => StoreKind::Memory,
            Some(other) => anyhow::bail!("unknown STORE {other:?}, expected mongo or memory"),
        };

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("BIND_ADDR must be a socket address")?;

        Ok(Self {
            jwt_secret,
            jwt_expiration: time::Duration::seconds(expiration),
            store,
            bind_addr,
        })
    }
}
