//! Demo dataset.
//!
//! `generate` is a pure function of its seed; `seed_if_empty` writes the
//! result into a database that has no users yet.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::article::{Article, ArticleFields, NewArticle};
use crate::comment::Comment;
use crate::config::SeedConfig;
use crate::db::WriteTx;
use crate::engagement;
use crate::id::next_id;
use crate::tag::Tag;
use crate::types::{CoreResult, UserId};
use crate::users::{NewUser, PasswordHasher, User};

pub const ADMIN_ID: UserId = 1;
pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "correctHorseBatteryStapler";

const TAG_COUNT: usize = 20;
const MAX_FOLLOWS: usize = 10;
const MAX_TAGS: usize = 10;
const MAX_FAVORITES: usize = 20;
const MAX_COMMENTS: usize = 10;

static WORDS: &[&str] = &[
    "alias", "amet", "animi", "aperiam", "aspernatur", "aut", "autem", "beatae", "blanditiis",
    "commodi", "consequatur", "culpa", "cumque", "debitis", "delectus", "dicta", "dolor",
    "dolorem", "dolores", "ducimus", "eius", "eligendi", "enim", "error", "esse", "eum",
    "excepturi", "explicabo", "facere", "fuga", "fugiat", "harum", "illo", "impedit", "ipsam",
    "ipsum", "iste", "labore", "laborum", "magnam", "maiores", "minima", "molestiae", "nemo",
    "nesciunt", "nihil", "nobis", "nostrum", "numquam", "officia", "omnis", "optio", "pariatur",
    "placeat", "porro", "possimus", "quae", "quaerat", "quia", "quibusdam", "quidem", "quis",
    "ratione", "recusandae", "rem", "repellat", "saepe", "sapiente", "sequi", "similique",
    "sint", "soluta", "sunt", "tempora", "tenetur", "totam", "ullam", "unde", "veniam",
    "veritatis", "vitae", "voluptas", "voluptate", "voluptatem",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SeedUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub bio: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedComment {
    /// Index into `SeedData::users`.
    pub author: usize,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedArticle {
    pub author: usize,
    pub title: String,
    pub description: String,
    pub body: String,
    /// Indexes into `SeedData::tags`, without repeats.
    pub tags: BTreeSet<usize>,
    pub favorited_by: BTreeSet<usize>,
    pub comments: Vec<SeedComment>,
}

/// Generated entities. Cross references are indexes; the admin is always
/// user 0.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedData {
    pub users: Vec<SeedUser>,
    /// (follower, followed) pairs, never equal, never repeated.
    pub follows: BTreeSet<(usize, usize)>,
    pub tags: Vec<String>,
    pub articles: Vec<SeedArticle>,
}

struct Lorem {
    rng: StdRng,
}

impl Lorem {
    fn word(&mut self) -> &'static str {
        WORDS.choose(&mut self.rng).cloned().unwrap_or("lorem")
    }

    fn sentence(&mut self) -> String {
        let len = self.rng.gen_range(4..10);
        let mut sentence = (0..len).map(|_| self.word()).collect::<Vec<_>>().join(" ");
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');
        sentence
    }

    fn sentences(&mut self, n: usize) -> String {
        (0..n).map(|_| self.sentence()).collect::<Vec<_>>().join("\n")
    }

    fn below(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }
}

pub fn generate(seed: u64, users: usize, articles: usize) -> SeedData {
    let mut lorem = Lorem {
        rng: StdRng::seed_from_u64(seed),
    };

    let mut seed_users = vec![SeedUser {
        username: ADMIN_USERNAME.to_owned(),
        email: ADMIN_EMAIL.to_owned(),
        password: ADMIN_PASSWORD.to_owned(),
        bio: "Admin user".to_owned(),
    }];
    for i in 1..=users {
        let username = format!("{}{}", lorem.word(), i);
        seed_users.push(SeedUser {
            email: format!("{}@example.com", username),
            password: format!("{}-{}", lorem.word(), lorem.word()),
            bio: lorem.sentence(),
            username,
        });
    }

    let user_count = seed_users.len();
    let mut follows = BTreeSet::new();
    for follower in 0..user_count {
        for _ in 0..lorem.below(MAX_FOLLOWS) {
            let followed = lorem.below(user_count);
            if followed != follower {
                follows.insert((follower, followed));
            }
        }
    }

    let tags = (0..TAG_COUNT)
        .map(|i| format!("{}{:04}", lorem.word(), i))
        .collect::<Vec<_>>();

    let seed_articles = (0..articles)
        .map(|_| {
            let author = lorem.below(user_count);
            let title = lorem.sentence();
            let description = lorem.sentences(2);
            let body = lorem.sentences(5);
            let tags = (0..lorem.below(MAX_TAGS))
                .map(|_| lorem.below(TAG_COUNT))
                .collect();
            let favorited_by = (0..lorem.below(MAX_FAVORITES))
                .map(|_| lorem.below(user_count))
                .collect();
            let comments = (0..lorem.below(MAX_COMMENTS))
                .map(|_| SeedComment {
                    author: lorem.below(user_count),
                    body: lorem.sentences(2),
                })
                .collect();
            SeedArticle {
                author,
                title,
                description,
                body,
                tags,
                favorited_by,
                comments,
            }
        })
        .collect();

    SeedData {
        users: seed_users,
        follows,
        tags,
        articles: seed_articles,
    }
}

impl SeedData {
    pub fn from_config(config: &SeedConfig) -> SeedData {
        generate(config.seed, config.users, config.articles)
    }
}

/// Loads `data` unless the database already has users. Returns whether
/// anything was written.
pub fn seed_if_empty(
    tx: &mut WriteTx<'_>,
    data: &SeedData,
    hasher: &dyn PasswordHasher,
) -> CoreResult<bool> {
    let existing = User::count(tx)?;
    if existing > 0 {
        debug!("{} users present, not seeding", existing);
        return Ok(false);
    }

    let mut user_ids = Vec::with_capacity(data.users.len());
    for (i, seed_user) in data.users.iter().enumerate() {
        let id = if i == 0 { ADMIN_ID } else { next_id() };
        User::create(
            tx,
            &NewUser {
                id,
                username: seed_user.username.clone(),
                email: seed_user.email.clone(),
                password_hash: hasher.hash(&seed_user.password),
                bio: Some(seed_user.bio.clone()),
                image: Some(format!("https://i.pravatar.cc/150?u={}", id)),
            },
        )?;
        user_ids.push(id);
    }

    for &(follower, followed) in &data.follows {
        engagement::follow(tx, user_ids[follower], user_ids[followed])?;
    }

    let tag_ids = data
        .tags
        .iter()
        .map(|name| Tag::resolve_or_create(tx, name).map(|tag| tag.id))
        .collect::<CoreResult<Vec<_>>>()?;

    for seed_article in &data.articles {
        let fields = ArticleFields {
            title: seed_article.title.clone(),
            description: seed_article.description.clone(),
            body: seed_article.body.clone(),
        };
        let article_id = Article::create(tx, &NewArticle::new(user_ids[seed_article.author], fields))?;

        let tags = seed_article.tags.iter().map(|&t| tag_ids[t]).collect::<Vec<_>>();
        Article::attach_tags(tx, article_id, &tags)?;

        for &fan in &seed_article.favorited_by {
            engagement::favorite(tx, user_ids[fan], article_id)?;
        }
        for comment in &seed_article.comments {
            Comment::add(tx, article_id, user_ids[comment.author], &comment.body)?;
        }
    }

    info!(
        "seeded {} users, {} follows, {} tags, {} articles",
        user_ids.len(),
        data.follows.len(),
        tag_ids.len(),
        data.articles.len()
    );
    Ok(true)
}
