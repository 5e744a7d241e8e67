//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `repokit_core` linkage against an in-memory SQLite database.
//! - Exercise one create/delete/restore cycle with deterministic output.

use repokit_core::db::{open_db_in_memory, Migration};
use repokit_core::{
    create_table_sql, payload, BaseRepository, EntitySchema, FetchOptions, FieldValue, Record,
    RepoResult, RepositoryConfig, RuntimeMode, SqliteStore,
};
use std::ops::Deref;
use std::process::ExitCode;
use std::sync::Arc;

/// Per-entity repository: the generic operations plus note-specific helpers.
struct NoteRepository<'s> {
    base: BaseRepository<'s, SqliteStore<'s>>,
}

impl<'s> NoteRepository<'s> {
    fn new(store: &'s SqliteStore<'s>, schema: Arc<EntitySchema>, config: &RepositoryConfig) -> Self {
        Self {
            base: BaseRepository::from_config(store, schema, config),
        }
    }

    fn pinned(&self) -> RepoResult<Vec<Record>> {
        self.base.query().where_eq("pinned", true).get()
    }
}

impl<'s> Deref for NoteRepository<'s> {
    type Target = BaseRepository<'s, SqliteStore<'s>>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

fn note_schema() -> RepoResult<EntitySchema> {
    EntitySchema::builder("notes")
        .columns(["title", "pinned"])
        .build()
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let schema = Arc::new(note_schema()?);
    let ddl = create_table_sql(&schema);
    let conn = open_db_in_memory(&[Migration::new(1, &ddl)])?;
    let store = SqliteStore::new(&conn);
    store.ensure_table(&schema)?;

    let config = RepositoryConfig::new(RuntimeMode::Production);
    let notes = NoteRepository::new(&store, schema, &config);

    let created = notes.create(&payload([
        ("title", FieldValue::from("hello")),
        ("pinned", true.into()),
    ]))?;
    notes.delete_by_id(created.id)?;
    let trashed = notes.all_trashed()?.len();
    notes.restore_by_id(created.id)?;

    let restored = notes.find_by_id_with(created.id, &FetchOptions::new().columns(["title"]))?;
    println!("repokit_core trashed_after_delete={trashed}");
    println!("repokit_core pinned={}", notes.pinned()?.len());
    println!("repokit_core record={}", serde_json::to_string(&restored)?);
    Ok(())
}

fn main() -> ExitCode {
    println!("repokit_core ping={}", repokit_core::ping());
    println!("repokit_core version={}", repokit_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("repokit_core smoke failed: {err}");
            ExitCode::FAILURE
        }
    }
}
