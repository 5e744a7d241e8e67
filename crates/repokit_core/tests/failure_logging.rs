mod common;

use common::{create_post, open_blog_db, repo, Blog};
use log::{Level, LevelFilter, Log, Metadata, Record as LogRecord};
use repokit_core::{
    payload, DiagnosticMode, FetchOptions, FieldValue, MemoryStore, Payload, RepoError,
    SqliteStore,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, Once};
use std::thread::{self, ThreadId};

struct CaptureLogger;

static CAPTURED: Mutex<Vec<(ThreadId, Level, String)>> = Mutex::new(Vec::new());
static CAPTURE_LOGGER: CaptureLogger = CaptureLogger;
static INSTALL: Once = Once::new();

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &LogRecord<'_>) {
        if let Ok(mut entries) = CAPTURED.lock() {
            entries.push((thread::current().id(), record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

fn install_capture() {
    INSTALL.call_once(|| {
        log::set_logger(&CAPTURE_LOGGER).expect("capture logger should be the only logger");
        log::set_max_level(LevelFilter::Trace);
    });
}

/// Error entries logged by the current test thread since the last call.
fn take_errors() -> Vec<String> {
    let current = thread::current().id();
    let mut entries = CAPTURED.lock().expect("capture buffer lock");
    let mut errors = Vec::new();
    entries.retain(|(thread_id, level, message)| {
        if *thread_id != current {
            return true;
        }
        if *level == Level::Error {
            errors.push(message.clone());
        }
        false
    });
    errors
}

fn assert_single_not_found(operation: &str, result: Result<(), RepoError>) {
    let err = result.unwrap_err();
    assert!(err.is_not_found(), "{operation}: unexpected error {err}");

    let errors = take_errors();
    assert_eq!(errors.len(), 1, "{operation}: logged {errors:?}");
    let entry = &errors[0];
    assert!(entry.contains(&format!("event=repo_{operation} ")), "{entry}");
    assert!(entry.contains("module=repo status=error table=posts id=99"), "{entry}");
    assert!(entry.contains("error_code=not_found"), "{entry}");
    assert!(entry.contains("error=posts record not found: 99"), "{entry}");
}

#[test]
fn each_failed_operation_logs_exactly_once() {
    install_capture();
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);
    take_errors();

    assert_single_not_found("find_by_id", posts.find_by_id(99).map(|_| ()));
    assert_single_not_found(
        "find_by_id",
        posts
            .find_by_id_with(99, &FetchOptions::new().with(["comments"]))
            .map(|_| ()),
    );
    assert_single_not_found(
        "find_trashed_by_id",
        posts.find_trashed_by_id(99).map(|_| ()),
    );
    assert_single_not_found(
        "find_only_trashed_by_id",
        posts.find_only_trashed_by_id(99).map(|_| ()),
    );
    assert_single_not_found(
        "update",
        posts
            .update(99, &payload([("title", FieldValue::from("x"))]))
            .map(|_| ()),
    );
    assert_single_not_found("delete_by_id", posts.delete_by_id(99).map(|_| ()));
    assert_single_not_found("restore_by_id", posts.restore_by_id(99).map(|_| ()));
    assert_single_not_found(
        "permanently_delete_by_id",
        posts.permanently_delete_by_id(99).map(|_| ()),
    );
}

#[test]
fn successful_operations_log_no_errors() {
    install_capture();
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);
    take_errors();

    let post = create_post(&store, &blog, None, "clean");
    posts.update(post.id, &Payload::new()).unwrap();
    posts.delete_by_id(post.id).unwrap();
    posts.all_trashed().unwrap();
    posts.restore_by_id(post.id).unwrap();
    posts.all(&FetchOptions::new().with(["comments"])).unwrap();
    posts.permanently_delete_by_id(post.id).unwrap();

    assert!(take_errors().is_empty());
}

#[test]
fn query_builder_failures_are_not_logged() {
    install_capture();
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);
    take_errors();

    assert!(posts.query().find_or_fail(99).is_err());
    assert!(posts.query().where_eq("slug", "x").get().is_err());
    assert!(posts.query().first().unwrap().is_none());

    assert!(take_errors().is_empty());
}

#[test]
fn validation_failures_log_once_with_their_code() {
    install_capture();
    let blog = Blog::new();
    let conn = open_blog_db(&blog);
    let store = SqliteStore::new(&conn);
    let posts = repo(&store, &blog.posts);
    take_errors();

    let err = posts
        .create(&payload([("slug", FieldValue::from("x"))]))
        .unwrap_err();
    assert!(matches!(err, RepoError::UnknownColumn { .. }));
    let errors = take_errors();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("event=repo_create "));
    assert!(errors[0].contains("id=- "));
    assert!(errors[0].contains(&format!("error_code={}", err.code())));

    let err = posts
        .all(&FetchOptions::new().with(["tags"]))
        .unwrap_err();
    let errors = take_errors();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("event=repo_all "));
    assert!(errors[0].contains(&format!("error_code={}", err.code())));
}

#[test]
fn memory_store_failures_log_the_same_way() {
    install_capture();
    let blog = Blog::new();
    let store = MemoryStore::new();
    let posts = repo(&store, &blog.posts);
    take_errors();

    assert_single_not_found("find_by_id", posts.find_by_id(99).map(|_| ()));
    assert_single_not_found("delete_by_id", posts.delete_by_id(99).map(|_| ()));
    assert_single_not_found("restore_by_id", posts.restore_by_id(99).map(|_| ()));
}

#[test]
fn dump_and_halt_panics_without_logging() {
    install_capture();
    let blog = Blog::new();
    let store = MemoryStore::new();
    let posts = repo(&store, &blog.posts).with_diagnostics(DiagnosticMode::DumpAndHalt);
    take_errors();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| posts.delete_by_id(99)));
    let payload = outcome.expect_err("dump mode should halt on failure");
    let message = payload
        .downcast_ref::<String>()
        .expect("dump panics with a formatted message");
    assert!(
        message.contains("repository failure dump: operation=delete_by_id table=posts id=99"),
        "{message}"
    );
    assert!(take_errors().is_empty());
}
