use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde_derive::Serialize;

use crate::article::Article;
use crate::db::schema::{comments, users};
use crate::db::{ReadTx, WriteTx};
use crate::id::next_id;
use crate::types::{ArticleId, CommentId, CoreError, CoreResult, UserId};
use crate::utils::serialize_date;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations, Insertable, Serialize)]
#[diesel(belongs_to(Article))]
#[diesel(table_name = comments)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub article_id: ArticleId,
    pub author_id: UserId,
    pub body: String,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: NaiveDateTime,
}

/// A comment joined with the name and avatar of whoever wrote it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: CommentId,
    pub body: String,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: NaiveDateTime,
    pub commenter_id: UserId,
    pub commenter_username: String,
    pub commenter_image: Option<String>,
}

impl Comment {
    /// Appends a comment to the article's discussion.
    pub fn add(
        tx: &mut WriteTx<'_>,
        article_id: ArticleId,
        author_id: UserId,
        body: &str,
    ) -> CoreResult<CommentId> {
        let body = body.trim();
        if body.is_empty() {
            return Err(CoreError::invalid("body", "comment body required"));
        }
        Article::get_by_id(tx, article_id)?;

        let now = Utc::now().naive_utc();
        let comment = Comment {
            id: next_id(),
            article_id,
            author_id,
            body: body.to_owned(),
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(comments::table)
            .values(&comment)
            .execute(tx.conn())?;
        Ok(comment.id)
    }

    /// Every comment on the article, oldest first.
    pub fn list_for_article(tx: &mut ReadTx<'_>, article_id: ArticleId) -> CoreResult<Vec<CommentView>> {
        let article = Article::get_by_id(tx, article_id)?;
        let rows = Comment::belonging_to(&article)
            .inner_join(users::table)
            .order(comments::id.asc())
            .select((
                comments::id,
                comments::body,
                comments::created_at,
                users::id,
                users::username,
                users::image,
            ))
            .load::<(CommentId, String, NaiveDateTime, UserId, String, Option<String>)>(tx.conn())?;

        Ok(rows
            .into_iter()
            .map(|(id, body, created_at, commenter_id, commenter_username, commenter_image)| {
                CommentView {
                    id,
                    body,
                    created_at,
                    commenter_id,
                    commenter_username,
                    commenter_image,
                }
            })
            .collect())
    }
}
