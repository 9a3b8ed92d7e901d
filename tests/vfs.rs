//! End-to-end tests for the facade over the SQLite backend.

use std::sync::Arc;
use treesql::{Scope, SearchMode, SqliteStore, TreeError, TreeStore, Vfs};

async fn vfs() -> Vfs {
    let store = Arc::new(SqliteStore::memory().await.unwrap());
    Vfs::new(store)
}

fn scope() -> Scope {
    Scope::new(1, "main")
}

async fn names(vfs: &Vfs, s: &Scope, dir: &str) -> Vec<String> {
    vfs.store()
        .readdir(s, dir)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.filename)
        .collect()
}

#[tokio::test]
async fn create_at_top_shifts_existing_siblings() {
    let vfs = vfs().await;
    let s = scope();
    let first = vfs.create_file(&s, "", "a.md", b"a", None).await.unwrap();
    assert_eq!(first, "0000_a.md");
    let second = vfs.create_file(&s, "", "b.md", b"b", None).await.unwrap();
    assert_eq!(second, "0000_b.md");
    // a.md was shifted down to make room
    assert_eq!(names(&vfs, &s, "").await, vec!["0000_b.md", "0001_a.md"]);
}

#[tokio::test]
async fn paste_end_to_end_scenario() {
    let vfs = vfs().await;
    let s = scope();
    vfs.store().mkdir(&s, "", "0001_docs", false).await.unwrap();
    for name in ["0001_a.md", "0002_b.md", "0003_c.md"] {
        vfs.store()
            .write_file(&s, "0001_docs", name, b"x")
            .await
            .unwrap();
    }

    let outcome = vfs
        .paste(
            &s,
            &["0001_docs/0003_c.md".to_string()],
            "0001_docs",
            Some(1),
        )
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(
        names(&vfs, &s, "0001_docs").await,
        vec!["0001_c.md", "0002_a.md", "0003_b.md"]
    );
}

#[tokio::test]
async fn move_up_and_down_swap_neighbors() {
    let vfs = vfs().await;
    let s = scope();
    vfs.store().mkdir(&s, "", "d", false).await.unwrap();
    for name in ["0001_a.md", "0002_b.md", "0003_c.md"] {
        vfs.store().write_file(&s, "d", name, b"x").await.unwrap();
    }

    vfs.move_up(&s, "d/0002_b.md").await.unwrap();
    assert_eq!(
        names(&vfs, &s, "d").await,
        vec!["0001_b.md", "0002_a.md", "0003_c.md"]
    );

    vfs.move_down(&s, "d/0002_a.md").await.unwrap();
    assert_eq!(
        names(&vfs, &s, "d").await,
        vec!["0001_b.md", "0002_c.md", "0003_a.md"]
    );

    // top of the list has no previous neighbor
    assert!(matches!(
        vfs.move_up(&s, "d/0001_b.md").await,
        Err(TreeError::NotFound(_))
    ));
}

#[tokio::test]
async fn failed_swap_restores_original_name() {
    let vfs = vfs().await;
    let s = scope();
    let other = Scope::new(2, "main");
    vfs.store().mkdir(&s, "", "d", false).await.unwrap();
    vfs.store().set_public(&s, "", "d", true, false).await.unwrap();
    // Another tenant's private row occupies the name the neighbor would
    // take, so the middle rename of the swap fails.
    vfs.store()
        .write_file(&other, "d", "0002_a.md", b"theirs")
        .await
        .unwrap();
    vfs.store().write_file(&s, "d", "0001_a.md", b"x").await.unwrap();
    vfs.store().write_file(&s, "d", "0002_b.md", b"x").await.unwrap();

    assert!(matches!(
        vfs.move_up(&s, "d/0002_b.md").await,
        Err(TreeError::Conflict(_))
    ));
    // Both entries keep their names, no temporary leftovers
    assert_eq!(names(&vfs, &s, "d").await, vec!["0001_a.md", "0002_b.md"]);
}

#[tokio::test]
async fn save_file_split_fans_out_sequentially() {
    let vfs = vfs().await;
    let s = scope();
    vfs.store().mkdir(&s, "", "d", false).await.unwrap();
    vfs.store()
        .write_file(&s, "d", "0001_notes.md", b"old")
        .await
        .unwrap();
    vfs.store()
        .write_file(&s, "d", "0002_after.md", b"later")
        .await
        .unwrap();

    let written = vfs
        .save_file(
            &s,
            "d/0001_notes.md",
            "# Intro\nfirst\n---split---\n# Details\nsecond",
            None,
            Some("---split---"),
        )
        .await
        .unwrap();
    assert_eq!(written[0], "0001_notes.md");
    assert_eq!(written[1], "0002_Details.md");
    // the pre-existing sibling moved down to make room
    assert_eq!(
        names(&vfs, &s, "d").await,
        vec!["0001_notes.md", "0002_Details.md", "0003_after.md"]
    );
}

#[tokio::test]
async fn save_file_rename_keeps_ordinal() {
    let vfs = vfs().await;
    let s = scope();
    vfs.create_file(&s, "", "draft.md", b"text", Some(3))
        .await
        .unwrap();
    let written = vfs
        .save_file(&s, "0003_draft.md", "text", Some("final.md"), None)
        .await
        .unwrap();
    assert_eq!(written, vec!["0003_final.md"]);
}

#[tokio::test]
async fn join_files_concatenates_into_lowest_ordinal() {
    let vfs = vfs().await;
    let s = scope();
    vfs.store().mkdir(&s, "", "d", false).await.unwrap();
    vfs.store()
        .write_file(&s, "d", "0002_two.md", b"two")
        .await
        .unwrap();
    vfs.store()
        .write_file(&s, "d", "0001_one.md", b"one")
        .await
        .unwrap();

    let survivor = vfs
        .join_files(
            &s,
            &["d/0002_two.md".to_string(), "d/0001_one.md".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(survivor, "d/0001_one.md");
    assert_eq!(names(&vfs, &s, "d").await, vec!["0001_one.md"]);
    let content = vfs.store().read_file(&s, "d", "0001_one.md").await.unwrap();
    assert_eq!(content.as_text().unwrap(), "one\ntwo");
}

#[tokio::test]
async fn render_subtree_with_pullup() {
    let vfs = vfs().await;
    let s = scope();
    vfs.store().mkdir(&s, "", "0001_top", false).await.unwrap();
    vfs.store()
        .mkdir(&s, "0001_top", "0001_inline+", false)
        .await
        .unwrap();
    vfs.store()
        .write_file(&s, "0001_top/0001_inline+", "0001_a.md", b"inlined")
        .await
        .unwrap();
    vfs.store()
        .write_file(&s, "0001_top", "0002_b.md", b"plain")
        .await
        .unwrap();

    let nested = vfs.render_subtree(&s, "0001_top", false).await.unwrap();
    assert_eq!(nested.len(), 2);
    assert_eq!(nested[0].name, "0001_inline+");
    assert_eq!(nested[0].children.as_ref().unwrap().len(), 1);

    let pulled = vfs.render_subtree(&s, "0001_top", true).await.unwrap();
    assert_eq!(pulled.len(), 2);
    assert_eq!(pulled[0].name, "0001_a.md");
    assert_eq!(pulled[0].content.as_deref(), Some("inlined"));
    assert_eq!(pulled[1].name, "0002_b.md");
}

#[tokio::test]
async fn delete_batch_reports_partial_success() {
    let vfs = vfs().await;
    let s = scope();
    vfs.store().mkdir(&s, "", "d", false).await.unwrap();
    vfs.store().write_file(&s, "d", "f.md", b"x").await.unwrap();

    let outcome = vfs
        .delete(&s, &["d".to_string(), "missing.md".to_string()])
        .await
        .unwrap();
    assert_eq!(outcome.total, 2);
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(!vfs.store().exists(&s, "", "d").await.unwrap());
}

#[tokio::test]
async fn facade_rejects_paths_outside_configured_root() {
    let store = Arc::new(SqliteStore::memory().await.unwrap());
    let s = scope();
    store.mkdir(&s, "", "tenant", false).await.unwrap();
    store.mkdir(&s, "", "other", false).await.unwrap();
    let vfs = Vfs::with_root(store, "tenant");

    assert!(matches!(
        vfs.render_subtree(&s, "other", false).await,
        Err(TreeError::AccessDenied(_))
    ));
    assert!(matches!(
        vfs.set_public(&s, "tenant/../other", true, false).await,
        Err(TreeError::AccessDenied(_))
    ));
    assert!(vfs.render_subtree(&s, "tenant", false).await.is_ok());
}

#[tokio::test]
async fn search_modes_through_facade() {
    let vfs = vfs().await;
    let s = scope();
    vfs.store().mkdir(&s, "", "d", false).await.unwrap();
    vfs.store()
        .write_file(&s, "d", "0001_x.md", b"alpha only")
        .await
        .unwrap();
    vfs.store()
        .write_file(&s, "d", "0002_y.md", b"beta only")
        .await
        .unwrap();
    vfs.store()
        .write_file(&s, "d", "0003_z.md", b"alpha beta both")
        .await
        .unwrap();

    let all = vfs
        .search_text(&s, "alpha beta", "d", SearchMode::MatchAll)
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].filename, "0003_z.md");

    let any = vfs
        .search_text(&s, "alpha beta", "d", SearchMode::MatchAny)
        .await
        .unwrap();
    assert_eq!(any.len(), 3);
}

#[tokio::test]
async fn import_zip_through_facade() {
    use std::io::Write;
    let vfs = vfs().await;
    let s = scope();
    vfs.store().mkdir(&s, "", "0001_docs", false).await.unwrap();

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("notes/readme.md", zip::write::FileOptions::default())
        .unwrap();
    writer.write_all(b"hi").unwrap();
    writer
        .start_file("notes/img.png", zip::write::FileOptions::default())
        .unwrap();
    writer.write_all(&[0x89, 0x50]).unwrap();
    let data = writer.finish().unwrap().into_inner();

    let outcome = vfs
        .import_archive(&s, "0001_docs", "upload.zip", &data)
        .await
        .unwrap();
    assert!(outcome.all_succeeded());

    let children = names(&vfs, &s, "0001_docs").await;
    assert_eq!(children, vec!["0000_notes"]);
    assert_eq!(
        names(&vfs, &s, "0001_docs/0000_notes").await,
        vec!["0000_img.png", "0001_readme.md"]
    );

    assert!(matches!(
        vfs.import_archive(&s, "0001_docs", "upload.rar", &[]).await,
        Err(TreeError::Unsupported(_))
    ));
}
