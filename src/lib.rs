//! Content graph and feeds of a Conduit-style publishing platform.
//!
//! Every operation takes an already-open transaction handle. Callers open
//! one with [`Database::read_tx`] or [`Database::write_tx`], run as many
//! operations as the request needs, and the whole unit commits or rolls back
//! together.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;

pub mod article;
pub mod comment;
pub mod config;
pub mod db;
pub mod engagement;
pub mod feed;
pub mod id;
pub mod profile;
pub mod seed;
pub mod tag;
pub mod types;
pub mod users;
pub mod utils;

pub use crate::article::{Article, ArticleDetail, ArticleFields};
pub use crate::comment::{Comment, CommentView};
pub use crate::config::Config;
pub use crate::db::{CancelToken, Database, ReadTx, WriteTx};
pub use crate::feed::{ArticlePreview, Feed, FeedKind, FeedPage, Page};
pub use crate::profile::Profile;
pub use crate::tag::{PopularTag, Tag};
pub use crate::types::{
    ArticleId, CommentId, CoreError, CoreResult, EntityId, TagId, UserId, ValidationError,
};
pub use crate::users::User;
