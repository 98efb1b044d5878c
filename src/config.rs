use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenv::dotenv;

use crate::db::Result;

pub const DEFAULT_DATABASE_URL: &str = "data/database/conduit.sqlite";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub pool_size: u32,
    pub busy_timeout: Duration,
}

impl DbConfig {
    pub fn new<S: Into<String>>(url: S) -> Self {
        DbConfig {
            url: url.into(),
            pool_size: 8,
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub seed: u64,
    pub users: usize,
    pub articles: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        SeedConfig {
            seed: 0,
            users: 63,
            articles: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DbConfig,
    pub feed_page_size: i64,
    pub seed: SeedConfig,
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Config> {
        dotenv().ok();

        let defaults = SeedConfig::default();
        let database = DbConfig {
            url: var_or("DATABASE_URL", DEFAULT_DATABASE_URL.to_owned())?,
            pool_size: parsed_or("DATABASE_POOL_SIZE", 8)?,
            busy_timeout: Duration::from_millis(parsed_or("DATABASE_BUSY_TIMEOUT_MS", 5000)?),
        };

        Ok(Config {
            database,
            feed_page_size: parsed_or("FEED_PAGE_SIZE", crate::feed::DEFAULT_PAGE_SIZE)?,
            seed: SeedConfig {
                seed: parsed_or("SEED", defaults.seed)?,
                users: parsed_or("SEED_USERS", defaults.users)?,
                articles: parsed_or("SEED_ARTICLES", defaults.articles)?,
            },
        })
    }
}

fn var_or(key: &str, default: String) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(e.into()),
    }
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr<Err = ::std::num::ParseIntError>,
{
    match env::var(key) {
        Ok(raw) => Ok(raw.trim().parse::<T>()?),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(e.into()),
    }
}
