use std::collections::HashMap;

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text};
use serde_derive::Serialize;
use tracing::debug;

use crate::db::schema::{article_tags, tags};
use crate::db::{ReadTx, WriteTx};
use crate::id::next_id;
use crate::types::{ArticleId, CoreError, CoreResult, TagId};
use crate::utils::tag_candidates;

static SELECT_POPULAR_TAGS: &str = "select tags.id as id,
       tags.name as name,
       count(article_tags.article_id) as uses
  from tags inner join article_tags on article_tags.tag_id = tags.id
 group by tags.id, tags.name
 order by uses desc, tags.name asc
 limit ?";

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Identifiable, Insertable, Serialize)]
#[diesel(table_name = tags)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, QueryableByName, Serialize)]
pub struct PopularTag {
    #[diesel(sql_type = BigInt)]
    pub id: TagId,
    #[diesel(sql_type = Text)]
    pub name: String,
    #[diesel(sql_type = BigInt)]
    pub uses: i64,
}

impl Tag {
    pub fn find_by_name(tx: &mut ReadTx<'_>, name: &str) -> CoreResult<Option<Tag>> {
        Ok(tags::table
            .filter(tags::name.eq(name))
            .select(Tag::as_select())
            .first(tx.conn())
            .optional()?)
    }

    /// Returns the tag called exactly `name`, creating it on first use.
    /// Callers split and trim free-text input with `tag_candidates` first.
    pub fn resolve_or_create(tx: &mut WriteTx<'_>, name: &str) -> CoreResult<Tag> {
        if name.trim().is_empty() {
            return Err(CoreError::invalid("tags", "tag name must not be empty"));
        }

        match Tag::find_by_name(tx, name)? {
            Some(tag) => Ok(tag),
            None => Tag::insert_or_reread(tx, name),
        }
    }

    /// Inserts a fresh tag row. If another writer got there first the
    /// uniqueness constraint on the name rejects ours and the winner's row is
    /// returned instead.
    pub(crate) fn insert_or_reread(tx: &mut WriteTx<'_>, name: &str) -> CoreResult<Tag> {
        let tag = Tag {
            id: next_id(),
            name: name.to_owned(),
        };

        match diesel::insert_into(tags::table).values(&tag).execute(tx.conn()) {
            Ok(_) => {
                debug!("created tag {:?} ({})", tag.name, tag.id);
                Ok(tag)
            }
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                debug!("tag {:?} was created concurrently, re-reading", name);
                Tag::find_by_name(tx, name)?
                    .ok_or_else(|| CoreError::not_found(format!("tag {:?}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves every tag named in a whitespace-separated field. Blank and
    /// repeated names are dropped; the result is sorted by name.
    pub fn resolve_all(tx: &mut WriteTx<'_>, raw: &str) -> CoreResult<Vec<Tag>> {
        tag_candidates(raw)
            .iter()
            .map(|name| Tag::resolve_or_create(tx, name))
            .collect()
    }

    pub fn for_article(tx: &mut ReadTx<'_>, article_id: ArticleId) -> CoreResult<Vec<Tag>> {
        Ok(article_tags::table
            .inner_join(tags::table)
            .filter(article_tags::article_id.eq(article_id))
            .order(tags::name.asc())
            .select(Tag::as_select())
            .load(tx.conn())?)
    }

    /// Tags of several articles in one query, each list sorted by name.
    /// Articles without tags are absent from the map.
    pub fn for_articles(
        tx: &mut ReadTx<'_>,
        article_ids: &[ArticleId],
    ) -> CoreResult<HashMap<ArticleId, Vec<Tag>>> {
        let mut by_article = HashMap::new();
        if article_ids.is_empty() {
            return Ok(by_article);
        }

        let rows = article_tags::table
            .inner_join(tags::table)
            .filter(article_tags::article_id.eq_any(article_ids))
            .order((article_tags::article_id, tags::name.asc()))
            .select((article_tags::article_id, tags::id, tags::name))
            .load::<(ArticleId, TagId, String)>(tx.conn())?;

        for (article_id, id, name) in rows {
            by_article
                .entry(article_id)
                .or_insert_with(Vec::new)
                .push(Tag { id, name });
        }
        Ok(by_article)
    }

    /// The `limit` most used tags, most used first.
    pub fn popular(tx: &mut ReadTx<'_>, limit: i64) -> CoreResult<Vec<PopularTag>> {
        Ok(sql_query(SELECT_POPULAR_TAGS)
            .bind::<BigInt, _>(limit)
            .load::<PopularTag>(tx.conn())?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use rstest::rstest;

    use super::*;
    use crate::db::testing::{db, ScratchDb};

    fn tag_rows(db: &ScratchDb) -> Vec<Tag> {
        db.read_tx(|tx| {
            Ok(tags::table
                .order(tags::name)
                .select(Tag::as_select())
                .load(tx.conn())?)
        })
        .unwrap()
    }

    #[rstest]
    fn duplicate_names_resolve_to_one_row(db: ScratchDb) {
        let tags = db.write_tx(|tx| Tag::resolve_all(tx, "web go  go web")).unwrap();
        let names = tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["go", "web"]);

        let again = db.write_tx(|tx| Tag::resolve_all(tx, "go web")).unwrap();
        assert_eq!(again, tags);
        assert_eq!(tag_rows(&db), tags);
    }

    #[rstest]
    fn names_are_case_sensitive(db: ScratchDb) {
        db.write_tx(|tx| Tag::resolve_all(tx, "Rust rust")).unwrap();
        assert_eq!(tag_rows(&db).len(), 2);
    }

    #[rstest]
    fn empty_name_is_rejected(db: ScratchDb) {
        assert!(matches!(
            db.write_tx(|tx| Tag::resolve_or_create(tx, "   ")),
            Err(CoreError::Validation(_))
        ));
        assert!(db.write_tx(|tx| Tag::resolve_all(tx, "  \t ")).unwrap().is_empty());
    }

    #[rstest]
    fn lookup_uses_the_exact_name(db: ScratchDb) {
        let rust = db.write_tx(|tx| Tag::resolve_or_create(tx, "rust")).unwrap();
        assert_eq!(db.read_tx(|tx| Tag::find_by_name(tx, " rust")).unwrap(), None);

        let padded = db.write_tx(|tx| Tag::resolve_or_create(tx, " rust")).unwrap();
        assert_ne!(padded.id, rust.id);
        assert_eq!(padded.name, " rust");

        let again = db.write_tx(|tx| Tag::resolve_all(tx, " rust ")).unwrap();
        assert_eq!(again, [rust]);
    }

    #[rstest]
    fn losing_insert_returns_the_existing_row(db: ScratchDb) {
        let winner = db.write_tx(|tx| Tag::resolve_or_create(tx, "rust")).unwrap();
        let loser = db.write_tx(|tx| Tag::insert_or_reread(tx, "rust")).unwrap();

        assert_eq!(loser, winner);
        assert_eq!(tag_rows(&db).len(), 1);
    }

    #[rstest]
    fn concurrent_first_use_creates_one_tag(db: ScratchDb) {
        let database = (*db).clone();
        let barrier = Arc::new(Barrier::new(2));
        let handles = (0..2)
            .map(|_| {
                let database = database.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    database
                        .write_tx(|tx| Tag::resolve_or_create(tx, "rust"))
                        .unwrap()
                })
            })
            .collect::<Vec<_>>();

        let ids = handles
            .into_iter()
            .map(|h| h.join().unwrap().id)
            .collect::<Vec<_>>();
        assert_eq!(ids[0], ids[1]);

        let rows = tag_rows(&db);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "rust");
        assert_eq!(rows[0].id, ids[0]);
    }
}
