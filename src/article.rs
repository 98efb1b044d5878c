use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde_derive::Serialize;
use tracing::{debug, info, warn};

use crate::comment::{Comment, CommentView};
use crate::db::schema::{article_favorites, article_tags, articles, comments};
use crate::db::{ReadTx, WriteTx};
use crate::engagement;
use crate::id::next_id;
use crate::profile::Profile;
use crate::tag::Tag;
use crate::types::{ArticleId, CoreError, CoreResult, TagId, UserId, Validate, ValidationError};
use crate::users::User;
use crate::utils::{serialize_date, slug_for};

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations, Serialize)]
#[diesel(belongs_to(User, foreign_key = author_id))]
#[diesel(table_name = articles)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: ArticleId,
    pub author_id: UserId,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = articles)]
pub struct NewArticle {
    pub id: ArticleId,
    pub author_id: UserId,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl NewArticle {
    /// Allocates an id and derives the slug from the title.
    pub fn new(author_id: UserId, fields: ArticleFields) -> NewArticle {
        let now = Utc::now().naive_utc();
        NewArticle {
            id: next_id(),
            author_id,
            slug: slug_for(&fields.title),
            title: fields.title,
            description: fields.description,
            body: fields.body,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The author-editable part of an article.
#[derive(Debug, Clone, Default)]
pub struct ArticleFields {
    pub title: String,
    pub description: String,
    pub body: String,
}

impl ArticleFields {
    fn trimmed(self) -> Result<ArticleFields, ValidationError> {
        let fields = ArticleFields {
            title: self.title.trim().to_owned(),
            description: self.description.trim().to_owned(),
            body: self.body.trim().to_owned(),
        };

        let mut error = ValidationError::default();
        if fields.title.is_empty() {
            error.add_error("title", "title required");
        }
        if fields.description.is_empty() {
            error.add_error("description", "description required");
        }
        if fields.body.is_empty() {
            error.add_error("body", "body required");
        }
        error.into_result()?;
        Ok(fields)
    }
}

impl Validate for ArticleFields {
    fn validate(self, _tx: &mut ReadTx<'_>) -> CoreResult<Self> {
        Ok(self.trimmed()?)
    }
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = articles)]
struct ArticleChanges<'a> {
    slug: String,
    title: &'a str,
    description: &'a str,
    body: &'a str,
    updated_at: NaiveDateTime,
}

impl Article {
    pub fn create(tx: &mut WriteTx<'_>, new_article: &NewArticle) -> CoreResult<ArticleId> {
        diesel::insert_into(articles::table)
            .values(new_article)
            .execute(tx.conn())?;
        debug!("created article {} by {}", new_article.id, new_article.author_id);
        Ok(new_article.id)
    }

    pub fn get_by_id(tx: &mut ReadTx<'_>, article_id: ArticleId) -> CoreResult<Article> {
        articles::table
            .find(article_id)
            .select(Article::as_select())
            .first(tx.conn())
            .optional()?
            .ok_or_else(|| CoreError::not_found(format!("article {}", article_id)))
    }

    /// Loads the article and checks that `caller` wrote it.
    pub fn owned_by(tx: &mut ReadTx<'_>, article_id: ArticleId, caller: UserId) -> CoreResult<Article> {
        let article = Article::get_by_id(tx, article_id)?;
        if article.author_id != caller {
            warn!("user {} is not the author of article {}", caller, article_id);
            return Err(CoreError::Authorization(format!(
                "only the author may change article {}",
                article_id
            )));
        }
        Ok(article)
    }

    /// Overwrites title, slug, description and body and bumps `updated_at`.
    pub fn update(
        tx: &mut WriteTx<'_>,
        article_id: ArticleId,
        caller: UserId,
        fields: &ArticleFields,
    ) -> CoreResult<Article> {
        let article = Article::owned_by(tx, article_id, caller)?;
        let changes = ArticleChanges {
            slug: slug_for(&fields.title),
            title: &fields.title,
            description: &fields.description,
            body: &fields.body,
            updated_at: Utc::now().naive_utc(),
        };
        diesel::update(&article).set(&changes).execute(tx.conn())?;
        Article::get_by_id(tx, article_id)
    }

    /// Removes the article together with its tag links, favorites and
    /// comments.
    pub fn delete(tx: &mut WriteTx<'_>, article_id: ArticleId, caller: UserId) -> CoreResult<()> {
        let article = Article::owned_by(tx, article_id, caller)?;

        let conn = tx.conn();
        let tag_links = diesel::delete(article_tags::table.filter(article_tags::article_id.eq(article.id)))
            .execute(conn)?;
        let favorites =
            diesel::delete(article_favorites::table.filter(article_favorites::article_id.eq(article.id)))
                .execute(conn)?;
        let discussion = diesel::delete(comments::table.filter(comments::article_id.eq(article.id)))
            .execute(conn)?;
        diesel::delete(&article).execute(conn)?;

        info!(
            "deleted article {} ({} tag links, {} favorites, {} comments)",
            article.id, tag_links, favorites, discussion
        );
        Ok(())
    }

    /// Links tags to the article. Pairs that already exist are skipped.
    /// Returns how many links were new.
    pub fn attach_tags(tx: &mut WriteTx<'_>, article_id: ArticleId, tag_ids: &[TagId]) -> CoreResult<usize> {
        let mut attached = 0;
        for tag_id in tag_ids {
            attached += diesel::insert_into(article_tags::table)
                .values((
                    article_tags::article_id.eq(article_id),
                    article_tags::tag_id.eq(tag_id),
                ))
                .on_conflict((article_tags::article_id, article_tags::tag_id))
                .do_nothing()
                .execute(tx.conn())?;
        }
        Ok(attached)
    }

    /// Unlinks one tag. A tag that was not attached is not an error.
    pub fn detach_tag(
        tx: &mut WriteTx<'_>,
        article_id: ArticleId,
        tag_id: TagId,
        caller: UserId,
    ) -> CoreResult<()> {
        Article::owned_by(tx, article_id, caller)?;
        let removed = diesel::delete(
            article_tags::table
                .filter(article_tags::article_id.eq(article_id))
                .filter(article_tags::tag_id.eq(tag_id)),
        )
        .execute(tx.conn())?;
        if removed == 0 {
            debug!("tag {} was not attached to article {}", tag_id, article_id);
        }
        Ok(())
    }

    /// Validates the fields, resolves the free-text tag field and creates the
    /// article with those tags attached.
    pub fn publish(
        tx: &mut WriteTx<'_>,
        author_id: UserId,
        fields: ArticleFields,
        new_tags: &str,
    ) -> CoreResult<ArticleId> {
        let fields = fields.validate(tx)?;
        let tags = Tag::resolve_all(tx, new_tags)?;
        let article_id = Article::create(tx, &NewArticle::new(author_id, fields))?;
        Article::attach_tags(tx, article_id, &tag_ids(&tags))?;
        Ok(article_id)
    }

    /// Edits an article the caller wrote and attaches any newly named tags.
    pub fn revise(
        tx: &mut WriteTx<'_>,
        article_id: ArticleId,
        caller: UserId,
        fields: ArticleFields,
        new_tags: &str,
    ) -> CoreResult<Article> {
        let fields = fields.validate(tx)?;
        let article = Article::update(tx, article_id, caller, &fields)?;
        let tags = Tag::resolve_all(tx, new_tags)?;
        Article::attach_tags(tx, article_id, &tag_ids(&tags))?;
        Ok(article)
    }
}

fn tag_ids(tags: &[Tag]) -> Vec<TagId> {
    tags.iter().map(|t| t.id).collect()
}

/// Everything the article page shows.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDetail {
    pub article: Article,
    pub author: Profile,
    pub tags: Vec<Tag>,
    pub favorite_count: i64,
    pub favorited: bool,
    pub comments: Vec<CommentView>,
}

impl ArticleDetail {
    pub fn load(tx: &mut ReadTx<'_>, viewer: Option<UserId>, article_id: ArticleId) -> CoreResult<ArticleDetail> {
        let article = Article::get_by_id(tx, article_id)?;
        let author = Profile::load(tx, viewer, article.author_id)?;
        let tags = Tag::for_article(tx, article_id)?;
        let favorite_count = engagement::favorite_count(tx, article_id)?;
        let favorited = match viewer {
            Some(viewer) => engagement::is_favorited(tx, viewer, article_id)?,
            None => false,
        };
        let comments = Comment::list_for_article(tx, article_id)?;

        Ok(ArticleDetail {
            article,
            author,
            tags,
            favorite_count,
            favorited,
            comments,
        })
    }
}
