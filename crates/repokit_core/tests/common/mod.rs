#![allow(dead_code)]

use repokit_core::db::{open_db_in_memory, Migration};
use repokit_core::{
    create_table_sql, payload, BaseRepository, EntitySchema, EntityStore, FieldValue, Record,
};
use rusqlite::Connection;
use std::sync::Arc;

pub const FIXED_NOW_MS: i64 = 1_700_000_000_000;

pub fn fixed_clock() -> i64 {
    FIXED_NOW_MS
}

/// users -< posts -< comments, with `posts.author` pointing back at users.
pub struct Blog {
    pub users: Arc<EntitySchema>,
    pub authors: Arc<EntitySchema>,
    pub posts: Arc<EntitySchema>,
    pub comments: Arc<EntitySchema>,
}

impl Blog {
    pub fn new() -> Self {
        let comments = Arc::new(
            EntitySchema::builder("comments")
                .columns(["post_id", "body"])
                .build()
                .expect("comments schema should build"),
        );
        let authors = Arc::new(
            EntitySchema::builder("users")
                .columns(["name", "email"])
                .build()
                .expect("authors schema should build"),
        );
        let posts = Arc::new(
            EntitySchema::builder("posts")
                .columns(["user_id", "title", "body", "views", "published"])
                .belongs_to("author", Arc::clone(&authors), "user_id")
                .has_many("comments", Arc::clone(&comments), "post_id")
                .has_one("first_comment", Arc::clone(&comments), "post_id")
                .accessor("title_upper", |record| {
                    FieldValue::from(
                        record
                            .get("title")
                            .and_then(FieldValue::as_str)
                            .map(str::to_uppercase),
                    )
                })
                .accessor("comment_count", |record| {
                    FieldValue::Integer(record.related_many("comments").len() as i64)
                })
                .build()
                .expect("posts schema should build"),
        );
        let users = Arc::new(
            EntitySchema::builder("users")
                .columns(["name", "email"])
                .has_many("posts", Arc::clone(&posts), "user_id")
                .build()
                .expect("users schema should build"),
        );

        Self {
            users,
            authors,
            posts,
            comments,
        }
    }

    pub fn ddl(&self) -> String {
        [
            create_table_sql(&self.users),
            create_table_sql(&self.posts),
            create_table_sql(&self.comments),
        ]
        .join("\n")
    }
}

pub fn open_blog_db(blog: &Blog) -> Connection {
    let ddl = blog.ddl();
    open_db_in_memory(&[Migration::new(1, &ddl)]).expect("blog database should open")
}

pub fn repo<'s, S: EntityStore + ?Sized>(
    store: &'s S,
    schema: &Arc<EntitySchema>,
) -> BaseRepository<'s, S> {
    BaseRepository::new(store, Arc::clone(schema)).with_clock(fixed_clock)
}

pub fn create_user<S: EntityStore + ?Sized>(store: &S, blog: &Blog, name: &str) -> Record {
    repo(store, &blog.users)
        .create(&payload([
            ("name", FieldValue::from(name)),
            ("email", FieldValue::from(format!("{name}@example.com"))),
        ]))
        .expect("user fixture should be created")
}

pub fn create_post<S: EntityStore + ?Sized>(
    store: &S,
    blog: &Blog,
    user_id: Option<i64>,
    title: &str,
) -> Record {
    repo(store, &blog.posts)
        .create(&payload([
            ("user_id", FieldValue::from(user_id)),
            ("title", FieldValue::from(title)),
            ("views", FieldValue::from(0i64)),
        ]))
        .expect("post fixture should be created")
}

pub fn create_comment<S: EntityStore + ?Sized>(
    store: &S,
    blog: &Blog,
    post_id: i64,
    body: &str,
) -> Record {
    repo(store, &blog.comments)
        .create(&payload([
            ("post_id", FieldValue::from(post_id)),
            ("body", FieldValue::from(body)),
        ]))
        .expect("comment fixture should be created")
}
