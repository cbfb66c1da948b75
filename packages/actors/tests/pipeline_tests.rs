#![allow(clippy::disallowed_methods)]

mod common;

use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use actors::{
    ActorRef, ConsumeOutcome, ConsumerHandler, PipelineArgs, PipelineStats, SupervisorMessage,
    WorkerHandler, start_pipeline,
};
use book_core::{
    Book, BookId, METADATA_FETCH_QUEUE, METADATA_FETCHED_EVENT, METADATA_RESULTS_QUEUE,
    MetadataFetchJob, MetadataFetchedEvent, NewBook,
};
use book_metadata::BookMetadata;
use broker::{Broker, Destination};
use db::BookStore;
use ractor::rpc::CallResult;

use common::{FlakyStore, Harness, Lookup, clean_code, eventually, recv};

const ISBN: &str = "9780000000001";

async fn stats(supervisor: &ActorRef<SupervisorMessage>) -> Option<PipelineStats> {
    let result = ractor::rpc::call(
        supervisor,
        |reply| SupervisorMessage::GetStats { reply },
        Some(Duration::from_secs(5)),
    )
    .await;
    match result {
        Ok(CallResult::Success(stats)) => Some(stats),
        _ => None,
    }
}

async fn wait_for_stats(
    supervisor: &ActorRef<SupervisorMessage>,
    check: impl Fn(&PipelineStats) -> bool,
) -> Option<PipelineStats> {
    for _ in 0..100 {
        if let Some(s) = stats(supervisor).await
            && check(&s)
        {
            return Some(s);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    None
}

async fn shutdown(
    supervisor: ActorRef<SupervisorMessage>,
    handle: tokio::task::JoinHandle<()>,
) -> Result<(), Box<dyn Error>> {
    supervisor.send_message(SupervisorMessage::Shutdown)?;
    tokio::time::timeout(Duration::from_secs(5), handle).await??;
    Ok(())
}

#[tokio::test]
async fn test_enriches_book_end_to_end() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    h.provider.answer(ISBN, vec![Lookup::Found(clean_code())]);
    let book = h.repo.create(NewBook::new(ISBN).with_title("pending")).await?;

    let (tap, mut results) = h.tap_results("audit").await?;
    let mut live = h.hub.register()?;

    let args = PipelineArgs::new(
        h.worker(Duration::from_secs(1)),
        h.jobs.clone(),
        h.consumer(),
        h.bus.clone(),
    );
    let (supervisor, handle) = start_pipeline(args).await?;

    h.jobs.enqueue(&MetadataFetchJob::new(book.id, ISBN)).await?;

    let event = recv(&mut results).await.expect("result event");
    assert!(event.success);
    assert_eq!(event.book_id, book.id);
    assert_eq!(event.title, "Foo");
    assert_eq!(event.total_pages, 200);
    assert_eq!(event.error, None);

    let frame = tokio::time::timeout(Duration::from_secs(5), live.recv())
        .await?
        .expect("live frame");
    assert_eq!(&*frame.event, METADATA_FETCHED_EVENT);
    let pushed: Book = serde_json::from_str(&frame.data)?;
    assert_eq!(pushed.id, book.id);
    assert_eq!(pushed.title, "Foo");

    let stored = h.repo.get(book.id).await?;
    assert_eq!(stored.title, "Foo");
    assert_eq!(stored.total_pages, 200);
    assert_eq!(stored.author.as_deref(), Some("Jane Doe"));

    let s = wait_for_stats(&supervisor, |s| s.results_applied == 1).await.expect("stats");
    assert_eq!(s.jobs_processed, 1);
    assert_eq!(s.jobs_failed_lookup, 0);

    shutdown(supervisor, handle).await?;
    tap.cancel().await;
    Ok(())
}

#[tokio::test]
async fn test_lookup_timeout_publishes_failure_and_leaves_book() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    h.provider.answer(
        ISBN,
        vec![Lookup::Slow(Duration::from_secs(5), clean_code())],
    );
    let book = h.repo.create(NewBook::new(ISBN).with_title("pending")).await?;

    let (tap, mut results) = h.tap_results("audit").await?;
    let mut live = h.hub.register()?;

    let args = PipelineArgs::new(
        h.worker(Duration::from_millis(100)),
        h.jobs.clone(),
        h.consumer(),
        h.bus.clone(),
    )
    .with_worker_count(1);
    let (supervisor, handle) = start_pipeline(args).await?;

    h.jobs.enqueue(&MetadataFetchJob::new(book.id, ISBN)).await?;

    let event = recv(&mut results).await.expect("result event");
    assert!(!event.success);
    let error = event.error.expect("error message");
    assert!(error.contains("timed out"), "unexpected error: {error}");

    let s = wait_for_stats(&supervisor, |s| s.results_skipped == 1).await.expect("stats");
    assert_eq!(s.jobs_failed_lookup, 1);
    assert_eq!(s.results_applied, 0);

    assert_eq!(h.repo.get(book.id).await?, book);
    assert!(live.try_recv().is_none());

    shutdown(supervisor, handle).await?;
    tap.cancel().await;
    Ok(())
}

#[tokio::test]
async fn test_not_found_and_incomplete_lookups_fail() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    h.provider.answer(
        "no-title",
        vec![Lookup::Found(BookMetadata::new("no-title").with_total_pages(10))],
    );
    let worker = h.worker(Duration::from_secs(1));

    let missing = worker.fetch(&MetadataFetchJob::new(BookId(1), "unknown")).await;
    assert!(!missing.success);
    assert_eq!(missing.error.as_deref(), Some("book not found"));

    let incomplete = worker.fetch(&MetadataFetchJob::new(BookId(2), "no-title")).await;
    assert!(!incomplete.success);
    assert_eq!(incomplete.error.as_deref(), Some("metadata incomplete: missing title"));
    Ok(())
}

#[tokio::test]
async fn test_crashed_worker_job_is_redelivered() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    // First attempt hangs forever, the retry succeeds.
    h.provider.answer(ISBN, vec![Lookup::Hang, Lookup::Found(clean_code())]);
    let (tap, mut results) = h.tap_results("audit").await?;

    let crashed = h
        .jobs
        .consume(Arc::new(WorkerHandler::new(h.worker(Duration::from_secs(60)))))
        .await?;
    h.jobs.enqueue(&MetadataFetchJob::new(BookId(1), ISBN)).await?;

    let provider = h.provider.clone();
    assert!(eventually(|| provider.calls() == 1).await);
    assert_eq!(h.broker.unacked_count(METADATA_FETCH_QUEUE), 1);

    crashed.abort().await;
    assert_eq!(h.broker.ready_count(METADATA_FETCH_QUEUE), 1);

    let replacement = h
        .jobs
        .consume(Arc::new(WorkerHandler::new(h.worker(Duration::from_secs(1)))))
        .await?;

    let event = recv(&mut results).await.expect("result after redelivery");
    assert!(event.success);
    assert_eq!(event.book_id, BookId(1));

    let broker = h.broker.clone();
    assert!(
        eventually(|| broker.ready_count(METADATA_FETCH_QUEUE) == 0
            && broker.unacked_count(METADATA_FETCH_QUEUE) == 0)
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(results.try_recv().is_err());

    replacement.cancel().await;
    tap.cancel().await;
    Ok(())
}

#[tokio::test]
async fn test_publish_failure_requeues_job() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    h.provider.answer(ISBN, vec![Lookup::Found(clean_code())]);
    let (tap, mut results) = h.tap_results("audit").await?;

    h.jobs.enqueue(&MetadataFetchJob::new(BookId(1), ISBN)).await?;
    h.broker.inject_publish_failures(1);

    let sub = h
        .jobs
        .consume(Arc::new(WorkerHandler::new(h.worker(Duration::from_secs(1)))))
        .await?;

    let event = recv(&mut results).await.expect("result after retry");
    assert!(event.success);
    // The whole attempt, lookup included, ran again.
    assert_eq!(h.provider.calls(), 2);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(results.try_recv().is_err());
    assert_eq!(h.broker.ready_count(METADATA_FETCH_QUEUE), 0);

    sub.cancel().await;
    tap.cancel().await;
    Ok(())
}

#[tokio::test]
async fn test_undecodable_job_is_discarded() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    let (tap, mut results) = h.tap_results("audit").await?;

    h.broker
        .publish(&Destination::queue(METADATA_FETCH_QUEUE), b"not json".to_vec())
        .await?;
    let sub = h
        .jobs
        .consume(Arc::new(WorkerHandler::new(h.worker(Duration::from_secs(1)))))
        .await?;

    let broker = h.broker.clone();
    assert!(
        eventually(|| broker.ready_count(METADATA_FETCH_QUEUE) == 0
            && broker.unacked_count(METADATA_FETCH_QUEUE) == 0)
        .await
    );
    assert_eq!(h.provider.calls(), 0);
    assert!(results.try_recv().is_err());

    sub.cancel().await;
    tap.cancel().await;
    Ok(())
}

#[tokio::test]
async fn test_applying_same_result_twice_is_idempotent() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    let consumer = h.consumer();
    let book = h.repo.create(NewBook::new(ISBN)).await?;

    let job = MetadataFetchJob::new(book.id, ISBN);
    let event = MetadataFetchedEvent::succeeded(&job, "Foo", 200, None, Some("Acme".into()));

    let first = consumer.apply(&event).await?;
    let after_first = h.repo.get(book.id).await?;
    let second = consumer.apply(&event).await?;
    let after_second = h.repo.get(book.id).await?;

    assert_eq!(after_first, after_second);
    assert_eq!(first, ConsumeOutcome::Applied(after_first.clone()));
    assert_eq!(second, ConsumeOutcome::Applied(after_second));
    assert_eq!(after_first.title, "Foo");
    assert_eq!(after_first.total_pages, 200);
    assert_eq!(after_first.publisher.as_deref(), Some("Acme"));
    Ok(())
}

#[tokio::test]
async fn test_failed_and_orphaned_results_are_skipped() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    let consumer = h.consumer();
    let mut live = h.hub.register()?;
    let book = h.repo.create(NewBook::new(ISBN).with_title("pending")).await?;

    let failed = MetadataFetchedEvent::failed(&MetadataFetchJob::new(book.id, ISBN), "book not found");
    assert_eq!(consumer.apply(&failed).await?, ConsumeOutcome::Skipped);
    assert_eq!(h.repo.get(book.id).await?, book);

    let orphan = MetadataFetchedEvent::succeeded(&MetadataFetchJob::new(BookId(999), ISBN), "Foo", 1, None, None);
    assert_eq!(consumer.apply(&orphan).await?, ConsumeOutcome::BookMissing);

    assert!(live.try_recv().is_none());
    Ok(())
}

#[tokio::test]
async fn test_persistence_failure_retries_apply() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    let book = h.repo.create(NewBook::new(ISBN)).await?;
    let store = Arc::new(FlakyStore::new(h.repo.clone(), 1));
    let mut live = h.hub.register()?;

    let sub = h
        .bus
        .subscribe_results(Arc::new(ConsumerHandler::new(h.consumer_with(store))))
        .await?;

    let job = MetadataFetchJob::new(book.id, ISBN);
    h.bus
        .publish_result(&MetadataFetchedEvent::succeeded(&job, "Foo", 200, None, None))
        .await?;

    let frame = tokio::time::timeout(Duration::from_secs(5), live.recv())
        .await?
        .expect("frame after retry");
    let pushed: Book = serde_json::from_str(&frame.data)?;
    assert_eq!(pushed.title, "Foo");
    assert_eq!(h.repo.get(book.id).await?.total_pages, 200);

    let broker = h.broker.clone();
    assert!(
        eventually(|| broker.ready_count(METADATA_RESULTS_QUEUE) == 0
            && broker.unacked_count(METADATA_RESULTS_QUEUE) == 0)
        .await
    );
    assert!(live.try_recv().is_none());

    sub.cancel().await;
    Ok(())
}

#[tokio::test]
async fn test_competing_workers_process_each_job_once() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    for n in 0..10 {
        let isbn = format!("isbn-{}", n);
        h.provider.answer(
            &isbn,
            vec![Lookup::Found(BookMetadata::new(&isbn).with_title(format!("Book {}", n)))],
        );
    }
    let (tap, mut results) = h.tap_results("audit").await?;

    let args = PipelineArgs::new(
        h.worker(Duration::from_secs(1)),
        h.jobs.clone(),
        h.consumer(),
        h.bus.clone(),
    )
    .with_worker_count(3);
    let (supervisor, handle) = start_pipeline(args).await?;

    for n in 0..10 {
        h.jobs
            .enqueue(&MetadataFetchJob::new(BookId(n), format!("isbn-{}", n)))
            .await?;
    }

    let mut seen = HashSet::new();
    for _ in 0..10 {
        let event = recv(&mut results).await.expect("result event");
        assert!(seen.insert(event.book_id), "duplicate result for {}", event.book_id);
    }

    // None of the books exist, so every result is skipped.
    let s = wait_for_stats(&supervisor, |s| s.results_skipped == 10).await.expect("stats");
    assert_eq!(s.jobs_processed, 10);
    assert_eq!(s.results_applied, 0);

    shutdown(supervisor, handle).await?;
    tap.cancel().await;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_stops_consuming() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    let args = PipelineArgs::new(
        h.worker(Duration::from_secs(1)),
        h.jobs.clone(),
        h.consumer(),
        h.bus.clone(),
    );
    let (supervisor, handle) = start_pipeline(args).await?;
    shutdown(supervisor, handle).await?;

    h.jobs.enqueue(&MetadataFetchJob::new(BookId(1), ISBN)).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.broker.ready_count(METADATA_FETCH_QUEUE), 1);
    assert_eq!(h.provider.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_fails_to_start_without_broker() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    h.broker.close();

    let args = PipelineArgs::new(
        h.worker(Duration::from_secs(1)),
        h.jobs.clone(),
        h.consumer(),
        h.bus.clone(),
    );
    assert!(start_pipeline(args).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_discarded_jobs_are_counted() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    let args = PipelineArgs::new(
        h.worker(Duration::from_secs(1)),
        h.jobs.clone(),
        h.consumer(),
        h.bus.clone(),
    )
    .with_worker_count(1);
    let (supervisor, handle) = start_pipeline(args).await?;

    h.broker
        .publish(&Destination::queue(METADATA_FETCH_QUEUE), b"not json".to_vec())
        .await?;

    let s = wait_for_stats(&supervisor, |s| s.jobs_discarded == 1).await.expect("stats");
    assert_eq!(s.jobs_processed, 0);
    assert_eq!(h.provider.calls(), 0);

    shutdown(supervisor, handle).await?;
    Ok(())
}

#[tokio::test]
async fn test_lost_subscriptions_are_resumed() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    h.provider.answer(ISBN, vec![Lookup::Found(clean_code())]);
    let book = h.repo.create(NewBook::new(ISBN)).await?;

    let args = PipelineArgs::new(
        h.worker(Duration::from_secs(1)),
        h.jobs.clone(),
        h.consumer(),
        h.bus.clone(),
    );
    let (supervisor, handle) = start_pipeline(args).await?;

    h.broker.disconnect_consumers();
    h.jobs.enqueue(&MetadataFetchJob::new(book.id, ISBN)).await?;

    let s = wait_for_stats(&supervisor, |s| s.results_applied == 1).await.expect("stats");
    assert_eq!(s.jobs_processed, 1);
    assert_eq!(s.restarts, 0);
    assert_eq!(h.repo.get(book.id).await?.title, "Foo");

    shutdown(supervisor, handle).await?;
    Ok(())
}

#[tokio::test]
async fn test_children_are_restarted_once_broker_returns() -> Result<(), Box<dyn Error>> {
    let h = Harness::new().await?;
    h.provider.answer(ISBN, vec![Lookup::Found(clean_code())]);
    let book = h.repo.create(NewBook::new(ISBN)).await?;

    let args = PipelineArgs::new(
        h.worker(Duration::from_secs(1)),
        h.jobs.clone(),
        h.consumer(),
        h.bus.clone(),
    )
    .with_worker_count(1);
    let (supervisor, handle) = start_pipeline(args).await?;

    // Resubscribing fails while the broker is down, so both children fail
    // and the supervisor keeps retrying.
    h.broker.close();
    h.broker.disconnect_consumers();
    tokio::time::sleep(actors::RESTART_DELAY * 2).await;

    h.broker.reopen();
    h.jobs.enqueue(&MetadataFetchJob::new(book.id, ISBN)).await?;

    let s = wait_for_stats(&supervisor, |s| s.results_applied == 1).await.expect("stats");
    assert_eq!(s.restarts, 2);
    assert_eq!(s.jobs_processed, 1);
    assert_eq!(h.repo.get(book.id).await?.title, "Foo");

    shutdown(supervisor, handle).await?;
    Ok(())
}
