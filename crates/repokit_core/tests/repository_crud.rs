mod common;

use common::{create_post, open_blog_db, repo, Blog, FIXED_NOW_MS};
use repokit_core::{
    payload, Columns, EntityStore, FetchOptions, FieldValue, Payload, RepoError, SqliteStore,
};

#[test]
fn create_then_find_returns_payload_fields() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);

    let created = posts
        .create(&payload([
            ("title", FieldValue::from("first post")),
            ("body", FieldValue::from("hello world")),
            ("views", FieldValue::from(3i64)),
        ]))
        .unwrap();

    let loaded = posts.find_by_id(created.id).unwrap();
    assert_eq!(loaded.get("title"), Some(&FieldValue::from("first post")));
    assert_eq!(loaded.get("body"), Some(&FieldValue::from("hello world")));
    assert_eq!(loaded.get("views"), Some(&FieldValue::Integer(3)));
    assert_eq!(loaded.get("user_id"), Some(&FieldValue::Null));
    assert!(!loaded.is_trashed());
}

#[test]
fn create_returns_fresh_row_with_lifecycle_columns() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);

    let created = posts
        .create(&payload([("title", FieldValue::from("fresh"))]))
        .unwrap();

    assert!(created.id > 0);
    assert_eq!(created.created_at, Some(FIXED_NOW_MS));
    assert_eq!(created.updated_at, Some(FIXED_NOW_MS));
    assert_eq!(created.deleted_at, None);
    assert_eq!(created.attributes.len(), blog.posts.columns().len());
}

#[test]
fn create_stores_booleans_as_integers() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);

    let created = posts
        .create(&payload([("published", FieldValue::from(true))]))
        .unwrap();
    let published = created.get("published").unwrap();

    assert_eq!(published, &FieldValue::Integer(1));
    assert_eq!(published.as_bool(), Some(true));
}

#[test]
fn create_rejects_unknown_columns_without_inserting() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);

    let err = posts
        .create(&payload([("slug", FieldValue::from("nope"))]))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::UnknownColumn { ref table, ref column } if table == "posts" && column == "slug"
    ));
    assert_eq!(posts.query().with_trashed().count().unwrap(), 0);
}

#[test]
fn create_rejects_lifecycle_columns_in_payload() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);

    let err = posts
        .create(&payload([("deleted_at", FieldValue::from(1i64))]))
        .unwrap_err();
    assert!(matches!(err, RepoError::UnknownColumn { column, .. } if column == "deleted_at"));
}

#[test]
fn update_applies_payload_and_returns_true() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let post = create_post(&store, &blog, None, "draft");
    let posts = repo(&store, &blog.posts).with_clock(|| FIXED_NOW_MS + 500);

    let updated = posts
        .update(post.id, &payload([("title", FieldValue::from("final"))]))
        .unwrap();
    assert!(updated);

    let loaded = posts.find_by_id(post.id).unwrap();
    assert_eq!(loaded.get("title"), Some(&FieldValue::from("final")));
    assert_eq!(loaded.created_at, Some(FIXED_NOW_MS));
    assert_eq!(loaded.updated_at, Some(FIXED_NOW_MS + 500));
}

#[test]
fn update_with_empty_payload_only_touches_timestamp() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let post = create_post(&store, &blog, None, "steady");
    let posts = repo(&store, &blog.posts).with_clock(|| FIXED_NOW_MS + 1);

    assert!(posts.update(post.id, &Payload::new()).unwrap());

    let loaded = posts.find_by_id(post.id).unwrap();
    assert_eq!(loaded.get("title"), Some(&FieldValue::from("steady")));
    assert_eq!(loaded.updated_at, Some(FIXED_NOW_MS + 1));
}

#[test]
fn update_missing_record_returns_not_found() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);

    let err = posts
        .update(404, &payload([("title", FieldValue::from("ghost"))]))
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { ref table, id: 404 } if table == "posts"));
    assert!(err.is_not_found());
}

#[test]
fn all_returns_active_records_in_insertion_order() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let first = create_post(&store, &blog, None, "one");
    let second = create_post(&store, &blog, None, "two");
    let third = create_post(&store, &blog, None, "three");
    let posts = repo(&store, &blog.posts);
    posts.delete_by_id(second.id).unwrap();

    let all = posts.all(&FetchOptions::default()).unwrap();
    let ids: Vec<i64> = all.iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![first.id, third.id]);
}

#[test]
fn all_projects_requested_columns() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    create_post(&store, &blog, None, "projected");
    let posts = repo(&store, &blog.posts);

    let all = posts
        .all(&FetchOptions::new().columns(["title"]))
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].attributes.len(), 1);
    assert_eq!(all[0].get("title"), Some(&FieldValue::from("projected")));
    assert_eq!(all[0].get("body"), None);
    assert_eq!(all[0].created_at, Some(FIXED_NOW_MS));

    let star = posts.all(&FetchOptions::new().columns(["*"])).unwrap();
    assert_eq!(star[0].attributes.len(), blog.posts.columns().len());
    assert_eq!(FetchOptions::new().columns(["*"]).columns, Columns::All);
}

#[test]
fn find_by_id_with_appends_computed_attributes() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let post = create_post(&store, &blog, None, "loud");
    let posts = repo(&store, &blog.posts);

    let loaded = posts
        .find_by_id_with(
            post.id,
            &FetchOptions::new().columns(["title"]).append(["title_upper"]),
        )
        .unwrap();
    assert_eq!(loaded.appended.get("title_upper"), Some(&FieldValue::from("LOUD")));
    assert_eq!(loaded.get("title_upper"), Some(&FieldValue::from("LOUD")));

    let json = serde_json::to_value(&loaded).unwrap();
    assert_eq!(json["title_upper"], "LOUD");
    assert_eq!(json["id"], post.id);
}

#[test]
fn unknown_append_fails_before_querying() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let post = create_post(&store, &blog, None, "quiet");
    let posts = repo(&store, &blog.posts);

    let err = posts
        .find_by_id_with(post.id, &FetchOptions::new().append(["slug"]))
        .unwrap_err();
    assert!(matches!(err, RepoError::UnknownAppend { name, .. } if name == "slug"));
}

#[test]
fn find_by_id_missing_record_returns_not_found() {
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);

    let err = posts.find_by_id(1).unwrap_err();
    assert_eq!(err.to_string(), "posts record not found: 1");
}

#[test]
fn store_failures_surface_as_db_errors() {
    let blog = Blog::new();
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);

    let err = posts.find_by_id(1).unwrap_err();
    assert!(matches!(err, RepoError::Db(_)));
    assert!(!err.is_not_found());
    assert!(store.select(&blog.posts, &Default::default()).is_err());
}
