use std::sync::Arc;

use quarry::{Document, QuarryError, SearchService, ServiceOptions};

fn batch(batch: usize, size: usize) -> Vec<Document> {
    (0..size)
        .map(|i| Document::new(format!("{batch}-{i}")).add_value(format!("item from batch{batch}")))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_keep_every_document() -> quarry::Result<()> {
    let service = Arc::new(SearchService::in_memory(ServiceOptions::default())?);

    let mut handles = Vec::new();
    for b in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move { service.add_documents(batch(b, 50)).await }));
    }
    for handle in handles {
        handle.await.expect("indexing task panicked")?;
    }

    service.add_document(Document::new("sync").add_value("item added synchronously"))?;

    assert_eq!(service.document_count(), 401);
    assert_eq!(service.search("item")?.count(), 401);
    assert_eq!(service.search("batch3")?.count(), 50);
    Ok(())
}

#[tokio::test]
async fn test_invalid_document_fails_whole_batch() -> quarry::Result<()> {
    let service = SearchService::in_memory(ServiceOptions::default())?;
    let mut docs = batch(0, 3);
    docs.push(Document::new("   ").add_value("no identifier"));

    let err = service.add_documents(docs).await.unwrap_err();
    assert!(matches!(err, QuarryError::Validation(_)));
    assert_eq!(service.document_count(), 0);

    service.add_documents(batch(1, 3)).await?;
    assert_eq!(service.document_count(), 3);
    Ok(())
}

#[test]
fn test_wait_and_close_drain_the_queue() -> quarry::Result<()> {
    let service = SearchService::in_memory(ServiceOptions::default())?;
    let first = service.add_documents(batch(0, 10));
    let second = service.add_documents(batch(1, 10));

    // Closing finishes queued batches before stopping the worker.
    service.close()?;
    first.wait()?;
    second.wait()?;

    assert!(matches!(
        service.add_documents(batch(2, 1)).wait(),
        Err(QuarryError::Closed)
    ));
    Ok(())
}
