//! Favorites and follows.
//!
//! Both relations use the same policy: creating a pair that already exists is
//! a `Conflict`, removing a pair that does not exist succeeds quietly.

use std::collections::HashMap;

use diesel::dsl::{count_star, exists};
use diesel::prelude::*;
use tracing::debug;

use crate::article::Article;
use crate::db::schema::{article_favorites, followings};
use crate::db::{ReadTx, WriteTx};
use crate::types::{ArticleId, CoreError, CoreResult, UserId};
use crate::users::User;

pub fn favorite(tx: &mut WriteTx<'_>, user_id: UserId, article_id: ArticleId) -> CoreResult<()> {
    Article::get_by_id(tx, article_id)?;
    if is_favorited(tx, user_id, article_id)? {
        return Err(CoreError::Conflict(format!(
            "article {} already favorited",
            article_id
        )));
    }

    diesel::insert_into(article_favorites::table)
        .values((
            article_favorites::article_id.eq(article_id),
            article_favorites::user_id.eq(user_id),
        ))
        .execute(tx.conn())?;
    Ok(())
}

pub fn unfavorite(tx: &mut WriteTx<'_>, user_id: UserId, article_id: ArticleId) -> CoreResult<()> {
    let removed = diesel::delete(
        article_favorites::table
            .filter(article_favorites::article_id.eq(article_id))
            .filter(article_favorites::user_id.eq(user_id)),
    )
    .execute(tx.conn())?;
    if removed == 0 {
        debug!("user {} had not favorited article {}", user_id, article_id);
    }
    Ok(())
}

pub fn is_favorited(tx: &mut ReadTx<'_>, user_id: UserId, article_id: ArticleId) -> CoreResult<bool> {
    let query = article_favorites::table
        .filter(article_favorites::article_id.eq(article_id))
        .filter(article_favorites::user_id.eq(user_id));
    Ok(diesel::select(exists(query)).get_result(tx.conn())?)
}

pub fn favorite_count(tx: &mut ReadTx<'_>, article_id: ArticleId) -> CoreResult<i64> {
    Ok(article_favorites::table
        .filter(article_favorites::article_id.eq(article_id))
        .count()
        .get_result(tx.conn())?)
}

/// Favorite counts for several articles in one query. Articles nobody
/// favorited are absent from the map.
pub fn favorite_counts(
    tx: &mut ReadTx<'_>,
    article_ids: &[ArticleId],
) -> CoreResult<HashMap<ArticleId, i64>> {
    if article_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = article_favorites::table
        .filter(article_favorites::article_id.eq_any(article_ids))
        .group_by(article_favorites::article_id)
        .select((article_favorites::article_id, count_star()))
        .load::<(ArticleId, i64)>(tx.conn())?;
    Ok(rows.into_iter().collect())
}

pub fn follow(tx: &mut WriteTx<'_>, follower_id: UserId, followed_id: UserId) -> CoreResult<()> {
    if follower_id == followed_id {
        return Err(CoreError::invalid("user", "users cannot follow themselves"));
    }
    if !User::exists(tx, followed_id)? {
        return Err(CoreError::not_found(format!("user {}", followed_id)));
    }
    if is_following(tx, follower_id, followed_id)? {
        return Err(CoreError::Conflict(format!(
            "already following user {}",
            followed_id
        )));
    }

    diesel::insert_into(followings::table)
        .values((
            followings::follower_id.eq(follower_id),
            followings::followed_id.eq(followed_id),
        ))
        .execute(tx.conn())?;
    Ok(())
}

pub fn unfollow(tx: &mut WriteTx<'_>, follower_id: UserId, followed_id: UserId) -> CoreResult<()> {
    let removed = diesel::delete(
        followings::table
            .filter(followings::follower_id.eq(follower_id))
            .filter(followings::followed_id.eq(followed_id)),
    )
    .execute(tx.conn())?;
    if removed == 0 {
        debug!("user {} was not following user {}", follower_id, followed_id);
    }
    Ok(())
}

pub fn is_following(tx: &mut ReadTx<'_>, follower_id: UserId, followed_id: UserId) -> CoreResult<bool> {
    let query = followings::table
        .filter(followings::follower_id.eq(follower_id))
        .filter(followings::followed_id.eq(followed_id));
    Ok(diesel::select(exists(query)).get_result(tx.conn())?)
}
