//! Paginated article previews for the home and profile pages.
//!
//! A page is built in two passes: one query selects the window of articles
//! (joined with their authors), then tags and favorite counts for exactly
//! those ids are fetched with one batched query each.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Nullable, Text, Timestamp};
use serde_derive::Serialize;

use crate::db::schema::{article_favorites, articles, followings};
use crate::db::ReadTx;
use crate::engagement;
use crate::tag::Tag;
use crate::types::{ArticleId, CoreError, CoreResult, UserId};
use crate::utils::serialize_date;

pub const DEFAULT_PAGE_SIZE: i64 = 3;

/// Feeds offered on the home page, default first.
pub const HOME_FEEDS: [FeedKind; 2] = [FeedKind::Your, FeedKind::Global];

/// Feeds offered on a user's profile page, default first.
pub const PROFILE_FEEDS: [FeedKind; 2] = [FeedKind::ByAuthor, FeedKind::ByFavoriter];

static SELECT_GLOBAL_PREVIEWS: &str = "select articles.id as article_id,
       articles.author_id as author_id,
       users.username as username,
       users.image as image,
       articles.title as title,
       articles.description as description,
       articles.created_at as created_at
  from articles inner join users on users.id = articles.author_id
 order by articles.id desc
 limit ? offset ?";

static SELECT_FOLLOWING_PREVIEWS: &str = "select articles.id as article_id,
       articles.author_id as author_id,
       users.username as username,
       users.image as image,
       articles.title as title,
       articles.description as description,
       articles.created_at as created_at
  from articles inner join users on users.id = articles.author_id
 where articles.author_id in (select followed_id from followings where follower_id = ?)
 order by articles.id desc
 limit ? offset ?";

static SELECT_AUTHORED_PREVIEWS: &str = "select articles.id as article_id,
       articles.author_id as author_id,
       users.username as username,
       users.image as image,
       articles.title as title,
       articles.description as description,
       articles.created_at as created_at
  from articles inner join users on users.id = articles.author_id
 where articles.author_id = ?
 order by articles.id desc
 limit ? offset ?";

static SELECT_FAVORITED_PREVIEWS: &str = "select articles.id as article_id,
       articles.author_id as author_id,
       users.username as username,
       users.image as image,
       articles.title as title,
       articles.description as description,
       articles.created_at as created_at
  from articles inner join users on users.id = articles.author_id
 where articles.id in (select article_id from article_favorites where user_id = ?)
 order by articles.id desc
 limit ? offset ?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Global,
    Your,
    #[serde(rename = "my")]
    ByAuthor,
    #[serde(rename = "favorited")]
    ByFavoriter,
}

impl FeedKind {
    pub fn name(self) -> &'static str {
        match self {
            FeedKind::Global => "global",
            FeedKind::Your => "your",
            FeedKind::ByAuthor => "my",
            FeedKind::ByFavoriter => "favorited",
        }
    }

    /// Picks a feed from those a page offers. A missing or empty name selects
    /// the first one; any other name must match exactly.
    pub fn select(name: Option<&str>, offered: &[FeedKind]) -> CoreResult<FeedKind> {
        let name = match name {
            None | Some("") => {
                return offered
                    .first()
                    .cloned()
                    .ok_or_else(|| CoreError::invalid("feed", "no feeds offered"))
            }
            Some(name) => name,
        };
        offered
            .iter()
            .cloned()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| CoreError::invalid("feed", format!("invalid feed name: {:?}", name)))
    }

    /// The concrete feed of this kind for `user`: the viewer for `Your`, the
    /// profile owner for `ByAuthor` and `ByFavoriter`. Ignored for `Global`.
    pub fn for_user(self, user: UserId) -> Feed {
        match self {
            FeedKind::Global => Feed::Global,
            FeedKind::Your => Feed::Following(user),
            FeedKind::ByAuthor => Feed::Authored(user),
            FeedKind::ByFavoriter => Feed::Favorited(user),
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeedKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<FeedKind> {
        FeedKind::select(
            Some(s),
            &[
                FeedKind::Global,
                FeedKind::Your,
                FeedKind::ByAuthor,
                FeedKind::ByFavoriter,
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Every article.
    Global,
    /// Articles by the users this user follows.
    Following(UserId),
    /// Articles this user wrote.
    Authored(UserId),
    /// Articles this user favorited.
    Favorited(UserId),
}

impl Feed {
    pub fn kind(&self) -> FeedKind {
        match self {
            Feed::Global => FeedKind::Global,
            Feed::Following(_) => FeedKind::Your,
            Feed::Authored(_) => FeedKind::ByAuthor,
            Feed::Favorited(_) => FeedKind::ByFavoriter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    limit: i64,
    offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> CoreResult<Page> {
        if limit <= 0 {
            return Err(CoreError::invalid("limit", "limit must be positive"));
        }
        if offset < 0 {
            return Err(CoreError::invalid("offset", "offset must not be negative"));
        }
        Ok(Page { limit, offset })
    }

    pub fn first(limit: i64) -> CoreResult<Page> {
        Page::new(limit, 0)
    }

    /// Page starting at a caller-supplied offset; absent or blank means 0.
    pub fn parse(offset: Option<&str>, limit: i64) -> CoreResult<Page> {
        let offset = match offset.map(str::trim) {
            None | Some("") => 0,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| CoreError::invalid("offset", format!("invalid offset: {:?}", raw)))?,
        };
        Page::new(limit, offset)
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// The following window. Offsets saturate at `i64::MAX`, which is
    /// always past the end of a feed.
    pub fn next(&self) -> Page {
        Page {
            limit: self.limit,
            offset: self.offset.saturating_add(self.limit),
        }
    }
}

#[derive(Debug, QueryableByName)]
struct PreviewRow {
    #[diesel(sql_type = BigInt)]
    article_id: ArticleId,
    #[diesel(sql_type = BigInt)]
    author_id: UserId,
    #[diesel(sql_type = Text)]
    username: String,
    #[diesel(sql_type = Nullable<Text>)]
    image: Option<String>,
    #[diesel(sql_type = Text)]
    title: String,
    #[diesel(sql_type = Text)]
    description: String,
    #[diesel(sql_type = Timestamp)]
    created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePreview {
    pub article_id: ArticleId,
    pub author_id: UserId,
    pub username: String,
    pub image: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: NaiveDateTime,
    pub tags: Vec<Tag>,
    pub favorite_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub kind: FeedKind,
    pub page: Page,
    pub articles: Vec<ArticlePreview>,
    /// Size of the whole feed, not just this page.
    pub total: i64,
}

impl FeedPage {
    pub fn has_more(&self) -> bool {
        self.page.offset.saturating_add(self.articles.len() as i64) < self.total
    }
}

/// One page of `feed`, newest first, plus the feed's total size.
pub fn load(tx: &mut ReadTx<'_>, feed: Feed, page: Page) -> CoreResult<FeedPage> {
    let rows = preview_rows(tx, feed, page)?;
    let ids = rows.iter().map(|row| row.article_id).collect::<Vec<_>>();

    let mut tags = Tag::for_articles(tx, &ids)?;
    let counts = engagement::favorite_counts(tx, &ids)?;

    let articles = rows
        .into_iter()
        .map(|row| ArticlePreview {
            tags: tags.remove(&row.article_id).unwrap_or_default(),
            favorite_count: counts.get(&row.article_id).cloned().unwrap_or(0),
            article_id: row.article_id,
            author_id: row.author_id,
            username: row.username,
            image: row.image,
            title: row.title,
            description: row.description,
            created_at: row.created_at,
        })
        .collect();

    Ok(FeedPage {
        kind: feed.kind(),
        page,
        articles,
        total: count(tx, feed)?,
    })
}

/// Number of articles in `feed`, independent of any page window.
pub fn count(tx: &mut ReadTx<'_>, feed: Feed) -> CoreResult<i64> {
    let conn = tx.conn();
    let total = match feed {
        Feed::Global => articles::table.count().get_result(conn)?,
        Feed::Following(user_id) => articles::table
            .filter(
                articles::author_id.eq_any(
                    followings::table
                        .filter(followings::follower_id.eq(user_id))
                        .select(followings::followed_id),
                ),
            )
            .count()
            .get_result(conn)?,
        Feed::Authored(user_id) => articles::table
            .filter(articles::author_id.eq(user_id))
            .count()
            .get_result(conn)?,
        Feed::Favorited(user_id) => articles::table
            .filter(
                articles::id.eq_any(
                    article_favorites::table
                        .filter(article_favorites::user_id.eq(user_id))
                        .select(article_favorites::article_id),
                ),
            )
            .count()
            .get_result(conn)?,
    };
    Ok(total)
}

fn preview_rows(tx: &mut ReadTx<'_>, feed: Feed, page: Page) -> CoreResult<Vec<PreviewRow>> {
    let conn = tx.conn();
    let rows = match feed {
        Feed::Global => sql_query(SELECT_GLOBAL_PREVIEWS)
            .bind::<BigInt, _>(page.limit)
            .bind::<BigInt, _>(page.offset)
            .load(conn)?,
        Feed::Following(user_id) => sql_query(SELECT_FOLLOWING_PREVIEWS)
            .bind::<BigInt, _>(user_id)
            .bind::<BigInt, _>(page.limit)
            .bind::<BigInt, _>(page.offset)
            .load(conn)?,
        Feed::Authored(user_id) => sql_query(SELECT_AUTHORED_PREVIEWS)
            .bind::<BigInt, _>(user_id)
            .bind::<BigInt, _>(page.limit)
            .bind::<BigInt, _>(page.offset)
            .load(conn)?,
        Feed::Favorited(user_id) => sql_query(SELECT_FAVORITED_PREVIEWS)
            .bind::<BigInt, _>(user_id)
            .bind::<BigInt, _>(page.limit)
            .bind::<BigInt, _>(page.offset)
            .load(conn)?,
    };
    Ok(rows)
}
