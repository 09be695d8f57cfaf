use serde::Deserialize;
use std::env;
use std::str::FromStr;

const DEFAULT_RATE_LIMIT_PER_USER: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(config::ConfigError::Message(format!(
                "unknown storage backend: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageBackend,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub redis_uri: Option<String>,
    pub jwt_secret: String,
    pub listen_addr: String,
    pub catalog_seed_file: Option<String>,
    pub rate_limit_per_user: u32,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then the crate-local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + ENV overrides (prefix: APP_)
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let storage = settings
            .get_string("storage.backend")
            .or_else(|_| env::var("STORAGE"))
            .map(|value| value.parse::<StorageBackend>())
            .unwrap_or(Ok(StorageBackend::Mongo))?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "lessonpath".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .ok()
            .filter(|uri| !uri.trim().is_empty());

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            }
        };

        let listen_addr = settings
            .get_string("server.listen_addr")
            .or_else(|_| env::var("LISTEN_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let catalog_seed_file = settings
            .get_string("catalog.seed_file")
            .or_else(|_| env::var("CATALOG_SEED_FILE"))
            .ok();

        let rate_limit_per_user = settings
            .get_int("rate_limit.per_user")
            .ok()
            .and_then(|value| u32::try_from(value).ok())
            .or_else(|| {
                env::var("RATE_LIMIT_PER_USER")
                    .ok()
                    .and_then(|s| s.parse::<u32>().ok())
            })
            .unwrap_or(DEFAULT_RATE_LIMIT_PER_USER);

        Ok(Config {
            storage,
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            listen_addr,
            catalog_seed_file,
            rate_limit_per_user,
        })
    }

    /// Self-contained settings: in-memory storage, no Redis, no seed file.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Config {
            storage: StorageBackend::Memory,
            mongo_uri: String::new(),
            mongo_database: String::new(),
            redis_uri: None,
            jwt_secret: jwt_secret.into(),
            listen_addr: "127.0.0.1:0".to_string(),
            catalog_seed_file: None,
            rate_limit_per_user: DEFAULT_RATE_LIMIT_PER_USER,
        }
    }
}
