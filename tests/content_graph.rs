mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use rstest::rstest;

use common::{db, register, TestDb};
use conduit::engagement;
use conduit::feed::{self, Feed, Page};
use conduit::{Article, ArticleDetail, ArticleFields, CancelToken, Comment, CoreError, Tag};

fn fields(title: &str) -> ArticleFields {
    ArticleFields {
        title: title.to_owned(),
        description: "a short summary".to_owned(),
        body: "the long version".to_owned(),
    }
}

#[rstest]
fn tagging_favoriting_and_deleting_an_article(db: TestDb) {
    let (a, b, x) = db
        .write_tx(|tx| {
            let a = register(tx, "author");
            let b = register(tx, "reader");
            let x = Article::publish(tx, a, fields("Go for the web"), "go web go")?;
            Ok((a, b, x))
        })
        .unwrap();

    let tags = db.read_tx(|tx| Tag::for_article(tx, x)).unwrap();
    let names = tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["go", "web"]);

    db.write_tx(|tx| engagement::favorite(tx, b, x)).unwrap();
    assert_eq!(db.read_tx(|tx| engagement::favorite_count(tx, x)).unwrap(), 1);

    db.write_tx(|tx| engagement::unfavorite(tx, b, x)).unwrap();
    assert_eq!(db.read_tx(|tx| engagement::favorite_count(tx, x)).unwrap(), 0);

    db.write_tx(|tx| Article::delete(tx, x, a)).unwrap();
    assert!(matches!(
        db.read_tx(|tx| Article::get_by_id(tx, x)),
        Err(CoreError::NotFound(_))
    ));
    // the tags themselves outlive the article
    assert!(db.read_tx(|tx| Tag::find_by_name(tx, "go")).unwrap().is_some());
}

#[rstest]
fn strangers_cannot_change_an_article(db: TestDb) {
    let (x, mallory) = db
        .write_tx(|tx| {
            let a = register(tx, "author");
            let mallory = register(tx, "mallory");
            let x = Article::publish(tx, a, fields("Original"), "keep")?;
            Ok((x, mallory))
        })
        .unwrap();
    let keep = db
        .read_tx(|tx| Tag::find_by_name(tx, "keep"))
        .unwrap()
        .unwrap();

    assert!(matches!(
        db.write_tx(|tx| Article::update(tx, x, mallory, &fields("Defaced"))),
        Err(CoreError::Authorization(_))
    ));
    assert!(matches!(
        db.write_tx(|tx| Article::detach_tag(tx, x, keep.id, mallory)),
        Err(CoreError::Authorization(_))
    ));
    assert!(matches!(
        db.write_tx(|tx| Article::delete(tx, x, mallory)),
        Err(CoreError::Authorization(_))
    ));

    let detail = db.read_tx(|tx| ArticleDetail::load(tx, Some(mallory), x)).unwrap();
    assert_eq!(detail.article.title, "Original");
    assert_eq!(detail.article.slug, "original");
    assert_eq!(detail.tags, [keep]);
    assert!(!detail.favorited);
}

#[rstest]
fn feed_totals_follow_the_graph(db: TestDb) {
    let (carol, dave) = db
        .write_tx(|tx| {
            let alice = register(tx, "alice");
            let bob = register(tx, "bob");
            let carol = register(tx, "carol");
            let dave = register(tx, "dave");
            for i in 0..5 {
                Article::publish(tx, alice, fields(&format!("Alice {}", i)), "")?;
            }
            for i in 0..2 {
                Article::publish(tx, bob, fields(&format!("Bob {}", i)), "")?;
            }
            engagement::follow(tx, carol, bob)?;
            engagement::follow(tx, dave, alice)?;
            engagement::follow(tx, dave, bob)?;
            Ok((carol, dave))
        })
        .unwrap();

    let (global, carols, daves) = db
        .read_tx(|tx| {
            Ok((
                feed::count(tx, Feed::Global)?,
                feed::count(tx, Feed::Following(carol))?,
                feed::count(tx, Feed::Following(dave))?,
            ))
        })
        .unwrap();
    assert_eq!(global, 7);
    assert_eq!(carols, 2);
    assert_eq!(daves, 7);
}

#[rstest]
fn seven_articles_in_pages_of_three(db: TestDb) {
    let published = db
        .write_tx(|tx| {
            let alice = register(tx, "alice");
            (0..7)
                .map(|i| Article::publish(tx, alice, fields(&format!("Post {}", i)), "rust"))
                .collect::<Result<Vec<_>, _>>()
        })
        .unwrap();

    let mut seen = Vec::new();
    let mut page = Page::first(3).unwrap();
    let mut sizes = Vec::new();
    loop {
        let current = db.read_tx(|tx| feed::load(tx, Feed::Global, page)).unwrap();
        sizes.push(current.articles.len());
        seen.extend(current.articles.iter().map(|a| a.article_id));
        if !current.has_more() {
            break;
        }
        page = page.next();
    }

    assert_eq!(sizes, [3, 3, 1]);
    assert_eq!(seen, published.into_iter().rev().collect::<Vec<_>>());
}

#[rstest]
fn racing_writers_share_one_new_tag(db: TestDb) {
    let barrier = Arc::new(Barrier::new(2));
    let handles = (0..2)
        .map(|_| {
            let database = (*db).clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                database
                    .write_tx(|tx| Tag::resolve_or_create(tx, "rust"))
                    .unwrap()
            })
        })
        .collect::<Vec<_>>();
    let tags = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect::<Vec<_>>();

    assert_eq!(tags[0], tags[1]);
    let popular = db.read_tx(|tx| Tag::popular(tx, 10)).unwrap();
    assert!(popular.is_empty());
    assert_eq!(
        db.read_tx(|tx| Tag::find_by_name(tx, "rust")).unwrap(),
        Some(tags[0].clone())
    );
}

#[rstest]
fn cancelled_request_leaves_no_trace(db: TestDb) {
    let (alice, x) = db
        .write_tx(|tx| {
            let alice = register(tx, "alice");
            let x = Article::publish(tx, alice, fields("Quiet"), "")?;
            Ok((alice, x))
        })
        .unwrap();

    let cancel = CancelToken::new();
    let result = db.write_tx_until(&cancel, |tx| {
        Comment::add(tx, x, alice, "half written")?;
        cancel.cancel();
        Ok(())
    });
    assert!(matches!(result, Err(CoreError::Storage(_))));
    assert!(db
        .read_tx(|tx| Comment::list_for_article(tx, x))
        .unwrap()
        .is_empty());
}
