use std::error::Error;
use std::process;

use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use conduit::feed::{self, FeedKind, Page, HOME_FEEDS};
use conduit::seed::{self, SeedData, ADMIN_ID};
use conduit::users::utils::Sha256Hasher;
use conduit::{Config, Database, Tag};

const PASSWORD_SALT: &str = "conduit";
const POPULAR_TAGS: i64 = 10;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run() {
        error!("{}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env()?;
    let db = Database::open(&config.database)?;

    let data = SeedData::from_config(&config.seed);
    let hasher = Sha256Hasher::new(PASSWORD_SALT);
    if db.write_tx(|tx| seed::seed_if_empty(tx, &data, &hasher))? {
        info!("seeded {}", config.database.url);
    }

    let page = Page::first(config.feed_page_size)?;
    let home = db.read_tx(|tx| {
        let feeds = HOME_FEEDS
            .iter()
            .map(|kind| feed::load(tx, kind.for_user(ADMIN_ID), page))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((feeds, Tag::popular(tx, POPULAR_TAGS)?))
    })?;
    let (feeds, tags) = home;

    for page in &feeds {
        info!(
            "{} feed: {} of {} articles",
            page.kind,
            page.articles.len(),
            page.total
        );
    }
    let global = feeds.iter().find(|page| page.kind == FeedKind::Global);
    let summary = json!({
        "feed": global,
        "popularTags": tags,
        "next": global.filter(|p| p.has_more()).map(|p| p.page.next()),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
