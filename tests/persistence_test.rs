use tempfile::TempDir;

use quarry::{Document, SearchService, ServiceOptions};

fn options() -> ServiceOptions {
    ServiceOptions::builder()
        .merge_factor(3)
        .build()
        .unwrap()
}

#[test]
fn test_reopen_shows_committed_documents() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();

    // 1. Index and close.
    {
        let service = SearchService::open_or_create(temp_dir.path(), options())?;
        service.add_document(Document::new("1").add_title("first").add_value("persisted words"))?;
        service.add_document(Document::new("2").add_value("more persisted words"))?;
        service.remove_document("2")?;
        service.close()?;
    }

    // 2. Reopen the same directory.
    {
        let service = SearchService::open_or_create(temp_dir.path(), options())?;
        assert_eq!(service.document_count(), 1);
        let results = service.search("persisted")?;
        assert_eq!(results.identifiers(), vec!["1"]);
        assert_eq!(results.result(0)?.title()?.as_deref(), Some("first"));
    }
    Ok(())
}

#[test]
fn test_second_service_cannot_take_the_lock() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let service = SearchService::open_or_create(temp_dir.path(), options())?;
    assert!(SearchService::open_or_create(temp_dir.path(), options()).is_err());

    service.close()?;
    let reopened = SearchService::open_or_create(temp_dir.path(), options())?;
    assert_eq!(reopened.document_count(), 0);
    Ok(())
}

#[test]
fn test_interrupted_commit_is_ignored_on_reopen() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    {
        let service = SearchService::open_or_create(temp_dir.path(), options())?;
        service.add_document(Document::new("1").add_value("durable"))?;
    }

    // Simulate a crash in the middle of the next commit: a segment file and a
    // temporary manifest were written, but the manifest was never renamed.
    std::fs::write(temp_dir.path().join("seg_000099.post"), b"partial")?;
    std::fs::write(temp_dir.path().join("segments_2.json.tmp"), b"{\"generation\": 2")?;
    std::fs::write(temp_dir.path().join("segments_3.json"), b"not json")?;

    let service = SearchService::open_or_create(temp_dir.path(), options())?;
    assert_eq!(service.search("durable")?.identifiers(), vec!["1"]);
    assert!(!temp_dir.path().join("segments_2.json.tmp").exists());

    // Files of the unreadable newer commit are kept until a new commit.
    assert!(temp_dir.path().join("seg_000099.post").exists());
    assert!(temp_dir.path().join("segments_3.json").exists());

    service.add_document(Document::new("2").add_value("durable again"))?;
    assert_eq!(service.search("durable")?.count(), 2);
    assert!(!temp_dir.path().join("seg_000099.post").exists());
    assert!(!temp_dir.path().join("segments_3.json").exists());
    service.close()?;

    // 3. The new commit is numbered past the unreadable one.
    let service = SearchService::open_or_create(temp_dir.path(), options())?;
    assert_eq!(service.search("durable")?.count(), 2);
    assert!(temp_dir.path().join("segments_4.json").exists());
    Ok(())
}

#[test]
fn test_unsupported_manifest_keeps_index_files() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    {
        let service = SearchService::open_or_create(temp_dir.path(), options())?;
        service.add_document(Document::new("1").add_value("precious"))?;
        service.close()?;
    }
    let list = || -> quarry::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(temp_dir.path())? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    };
    let before = list()?;

    // 1. A manifest from a newer format version refuses to open.
    let manifest = temp_dir.path().join("segments_1.json");
    let original = std::fs::read_to_string(&manifest)?;
    std::fs::write(
        &manifest,
        original.replace("\"format_version\": 1", "\"format_version\": 2"),
    )?;
    assert!(SearchService::open_or_create(temp_dir.path(), options()).is_err());
    assert_eq!(list()?, before);

    // 2. Nothing was deleted, so restoring the manifest restores the index.
    std::fs::write(&manifest, original)?;
    let service = SearchService::open_or_create(temp_dir.path(), options())?;
    assert_eq!(service.search("precious")?.identifiers(), vec!["1"]);
    Ok(())
}

#[test]
fn test_optimize_preserves_results() -> quarry::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let service = SearchService::open_or_create(temp_dir.path(), options())?;
    for i in 0..10 {
        service.add_document(Document::new(format!("{i}")).add_value(format!("common token{i}")))?;
    }
    service.remove_document("3")?;
    service.add_document(Document::new("4").add_value("common replaced"))?;

    let before = service.search("common")?;
    service.optimize()?;
    let after = service.search("common")?;

    let mut before_ids = before.identifiers();
    let mut after_ids = after.identifiers();
    before_ids.sort();
    after_ids.sort();
    assert_eq!(before_ids, after_ids);
    assert_eq!(after.count(), 9);
    assert_eq!(service.search("replaced")?.identifiers(), vec!["4"]);

    // Results from before the merge still load their documents.
    for result in &before {
        assert!(result.document().is_ok());
    }
    Ok(())
}
