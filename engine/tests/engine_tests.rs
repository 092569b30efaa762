use engine::{Engine, EngineConfig, EngineError, FlushOutcome, SearchMethod};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn fast_config() -> EngineConfig {
    EngineConfig { batch_size: 8, flush_interval_ms: 20, ..EngineConfig::default() }
}

/// Engine whose background flusher effectively never fires on its own.
fn manual_config() -> EngineConfig {
    EngineConfig { batch_size: 1_000, flush_interval_ms: 3_600_000, ..EngineConfig::default() }
}

fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

fn ids(engine: &Engine, q: &str, method: SearchMethod, k: usize) -> Vec<String> {
    engine.search(q, method, k).unwrap().hits.into_iter().map(|h| h.id).collect()
}

#[test]
fn added_document_becomes_visible_after_a_flush_interval() {
    let engine = Engine::new(fast_config()).unwrap();
    assert!(engine.add_document("1", "T", "hello world").unwrap());
    assert!(wait_for(|| ids(&engine, "hello", SearchMethod::Text, 10).contains(&"1".to_string())));
}

#[test]
fn full_batch_flushes_without_waiting_for_the_timer() {
    let config = EngineConfig { batch_size: 4, flush_interval_ms: 3_600_000, ..EngineConfig::default() };
    let engine = Engine::new(config).unwrap();
    for i in 0..4 {
        engine.add_document(i.to_string(), "", "batch trigger").unwrap();
    }
    assert!(wait_for(|| engine.snapshot().doc_count() == 4));
}

#[test]
fn empty_id_is_invalid() {
    let engine = Engine::new(manual_config()).unwrap();
    assert!(matches!(engine.add_document("", "t", "b"), Err(EngineError::InvalidArgument(_))));
}

#[test]
fn self_similar_document_ranks_first_for_vector_search() {
    let engine = Engine::new(manual_config()).unwrap();
    engine.add_document("fruit", "Apple Banana", "apple banana").unwrap();
    engine.add_document("other", "Cherry", "cherry pie with cream").unwrap();
    engine.flush().unwrap();

    let results = engine.search("apple banana", SearchMethod::Vector, 1).unwrap();
    assert_eq!(results.hits.len(), 1);
    assert_eq!(results.hits[0].id, "fruit");
    assert!((results.hits[0].score - 1.0).abs() < 1e-4);
}

#[test]
fn higher_term_frequency_ranks_first() {
    let engine = Engine::new(manual_config()).unwrap();
    engine.add_document("B", "", "apple banana").unwrap();
    engine.add_document("A", "", "apple apple banana").unwrap();
    engine.flush().unwrap();
    assert_eq!(ids(&engine, "apple", SearchMethod::Text, 2), vec!["A", "B"]);
}

#[test]
fn empty_and_unknown_queries_are_not_errors() {
    let engine = Engine::new(manual_config()).unwrap();
    engine.add_document("1", "Document 1", "This is a test document number 1").unwrap();
    engine.flush().unwrap();
    for method in [SearchMethod::Text, SearchMethod::Vector] {
        assert!(engine.search("", method, 10).is_ok());
    }
    assert!(ids(&engine, "nonexistentword123", SearchMethod::Text, 10).is_empty());
    assert!(engine.search("completely unrelated query", SearchMethod::Vector, 10).is_ok());
}

#[test]
fn held_snapshot_is_isolated_from_later_flushes() {
    let engine = Engine::new(manual_config()).unwrap();
    engine.add_document("1", "", "first").unwrap();
    engine.flush().unwrap();

    let held = engine.snapshot();
    engine.add_document("2", "", "second").unwrap();
    engine.flush().unwrap();

    assert_eq!(held.doc_count(), 1);
    assert!(held.get("2").is_none());
    assert_eq!(engine.snapshot().doc_count(), 2);
    assert!(engine.snapshot().generation() > held.generation());
}

#[test]
fn later_commit_of_an_id_is_authoritative() {
    let engine = Engine::new(manual_config()).unwrap();
    engine.add_document("doc", "v1", "original words").unwrap();
    engine.flush().unwrap();
    engine.add_document("doc", "v2", "replacement words").unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.get_document("doc").unwrap().title, "v2");
    assert!(ids(&engine, "original", SearchMethod::Text, 10).is_empty());
    assert_eq!(ids(&engine, "words", SearchMethod::Text, 10), vec!["doc"]);
    assert_eq!(engine.snapshot().doc_count(), 1);
}

#[test]
fn unknown_document_is_not_found() {
    let engine = Engine::new(manual_config()).unwrap();
    assert!(matches!(engine.get_document("missing"), Err(EngineError::NotFound(_))));
}

#[test]
fn flush_with_empty_queue_is_idle() {
    let engine = Engine::new(manual_config()).unwrap();
    assert_eq!(engine.flush().unwrap(), FlushOutcome::Idle);
    assert_eq!(engine.snapshot().generation(), 0);
}

#[test]
fn full_queue_reports_resource_exhausted() {
    let config = EngineConfig { queue_capacity: 2, ..manual_config() };
    let engine = Engine::new(config).unwrap();
    engine.add_document("1", "", "a").unwrap();
    engine.add_document("2", "", "b").unwrap();
    assert!(matches!(engine.add_document("3", "", "c"), Err(EngineError::ResourceExhausted(_))));
    assert_eq!(engine.stats().ingest.rejected, 1);
}

#[test]
fn zero_k_is_invalid_and_large_k_is_clamped() {
    let config = EngineConfig { max_k: 2, default_k: 2, ..manual_config() };
    let engine = Engine::new(config).unwrap();
    for i in 0..5 {
        engine.add_document(i.to_string(), "", "same words").unwrap();
    }
    engine.flush().unwrap();
    assert!(matches!(engine.search("same", SearchMethod::Text, 0), Err(EngineError::InvalidArgument(_))));
    let results = engine.search("same", SearchMethod::Text, 50).unwrap();
    assert_eq!(results.hits.len(), 2);
    assert_eq!(results.total_hits, 5);
}

#[test]
fn exhausted_timeout_returns_deadline_exceeded() {
    let engine = Engine::new(manual_config()).unwrap();
    engine.add_document("1", "", "hello").unwrap();
    engine.flush().unwrap();
    let err = engine.search_within("hello", SearchMethod::Vector, 5, Duration::ZERO).unwrap_err();
    assert!(matches!(err, EngineError::DeadlineExceeded(_)));
    assert_eq!(ids(&engine, "hello", SearchMethod::Text, 5), vec!["1"]);
}

#[test]
fn shutdown_commits_queued_documents_and_refuses_new_ones() {
    let engine = Engine::new(manual_config()).unwrap();
    engine.add_document("1", "", "pending").unwrap();
    engine.shutdown();
    assert_eq!(engine.snapshot().doc_count(), 1);
    assert!(engine.add_document("2", "", "late").is_err());
    engine.shutdown();
}

#[test]
fn concurrent_writers_and_readers() {
    let engine = Arc::new(Engine::new(fast_config()).unwrap());
    let mut handles = Vec::new();
    for w in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                engine.add_document(format!("w{w}-{i}"), "Title", format!("content {i}")).unwrap();
            }
        }));
    }
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            let mut last = 0;
            for _ in 0..50 {
                let snapshot = engine.snapshot();
                assert!(snapshot.generation() >= last);
                last = snapshot.generation();
                engine.search("content", SearchMethod::Text, 10).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert!(wait_for(|| engine.stats().ingest.committed == 200));
    let stats = engine.stats();
    assert_eq!(stats.ingest.accepted, 200);
    assert_eq!(stats.documents, 200);
    assert_eq!(stats.queue_depth, 0);
}

#[test]
fn batch_larger_than_queue_fails_to_start() {
    let config = EngineConfig { batch_size: 50, queue_capacity: 10, ..manual_config() };
    assert!(matches!(Engine::new(config), Err(EngineError::InvalidArgument(_))));
}

#[test]
fn size_trigger_fires_when_batch_equals_capacity() {
    let config = EngineConfig { batch_size: 10, queue_capacity: 10, flush_interval_ms: 3_600_000, ..EngineConfig::default() };
    let engine = Engine::new(config).unwrap();
    for i in 0..10 {
        engine.add_document(i.to_string(), "", "fill").unwrap();
    }
    assert!(wait_for(|| engine.snapshot().doc_count() == 10));
    engine.add_document("10", "", "room again").unwrap();
}

#[test]
fn manual_flushes_never_overlap_the_background_committer() {
    let config = EngineConfig { batch_size: 8, flush_interval_ms: 1, ..EngineConfig::default() };
    let engine = Arc::new(Engine::new(config).unwrap());
    let handles: Vec<_> = (0..8)
        .map(|w| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut errors = 0;
                for i in 0..200 {
                    engine.add_document(format!("w{w}-{i}"), "", format!("shared text {i}")).unwrap();
                    if engine.flush().is_err() {
                        errors += 1;
                    }
                    engine.search("shared text", SearchMethod::Vector, 5).unwrap();
                }
                errors
            })
        })
        .collect();
    let errors: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(errors, 0);

    assert!(wait_for(|| engine.stats().ingest.committed == 1_600));
    let stats = engine.stats();
    assert_eq!(stats.documents, 1_600);
    assert_eq!(stats.ingest.dropped_batches, 0);
    assert_eq!(stats.ingest.flushes, stats.generation);
}

#[test]
fn reader_keeps_its_snapshot_while_the_background_committer_publishes() {
    let engine = Arc::new(Engine::new(fast_config()).unwrap());
    engine.add_document("base", "", "before").unwrap();
    assert!(wait_for(|| engine.snapshot().doc_count() == 1));

    let (held_tx, held_rx) = std::sync::mpsc::channel();
    let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
    let reader = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let held = engine.snapshot();
            held_tx.send(held.generation()).unwrap();
            done_rx.recv().unwrap();
            (held.generation(), held.doc_count(), held.get("later").is_none())
        })
    };
    let held_generation = held_rx.recv().unwrap();
    engine.add_document("later", "", "after").unwrap();
    assert!(wait_for(|| engine.snapshot().generation() > held_generation));
    done_tx.send(()).unwrap();

    let (generation, docs, missing) = reader.join().unwrap();
    assert_eq!((generation, docs), (held_generation, 1));
    assert!(missing);
    assert_eq!(engine.snapshot().doc_count(), 2);
}

#[test]
fn every_accepted_document_survives_a_racing_shutdown() {
    for _ in 0..20 {
        let engine = Arc::new(Engine::new(fast_config()).unwrap());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    let mut accepted = Vec::new();
                    for i in 0..100 {
                        let id = format!("w{w}-{i}");
                        match engine.add_document(id.clone(), "", "racing") {
                            Ok(_) => accepted.push(id),
                            Err(_) => break,
                        }
                    }
                    accepted
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(1));
        engine.shutdown();
        let accepted: Vec<String> = writers.into_iter().flat_map(|h| h.join().unwrap()).collect();

        let snapshot = engine.snapshot();
        for id in &accepted {
            assert!(snapshot.get(id).is_some(), "{id} was accepted but never committed");
        }
        assert_eq!(engine.stats().ingest.committed, accepted.len() as u64);
        assert_eq!(engine.stats().queue_depth, 0);
    }
}
