mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use common::{book, load_library, open};
use tempfile::TempDir;
use vellum::{Query, Record};

#[test]
fn readers_never_observe_a_half_applied_update() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir, common::books_schema());
    engine.insert(Record::new("x").with("title", "alpha beta")).unwrap();
    let done = AtomicBool::new(false);

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..500 {
                let title = if i % 2 == 0 { "gamma delta" } else { "alpha beta" };
                engine.update(Record::new("x").with("title", title)).unwrap();
            }
            done.store(true, Ordering::Release);
        });

        for _ in 0..4 {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let either = engine.search_str("alpha OR gamma").unwrap();
                    assert_eq!(either.total_hits, 1);
                    let torn = engine.search_str("alpha delta").unwrap();
                    assert_eq!(torn.total_hits, 0);
                }
            });
        }
    });
}

#[test]
fn writers_on_distinct_keys_all_land() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir, common::books_schema());
    load_library(&engine);

    std::thread::scope(|s| {
        for t in 0..4 {
            let engine = &engine;
            s.spawn(move || {
                for i in 0..50 {
                    engine
                        .insert(book(&format!("t{}-{}", t, i), "parallel entry", &[], i))
                        .unwrap();
                }
            });
        }
        s.spawn(|| {
            for _ in 0..50 {
                let results = engine.search(&Query::match_all()).unwrap();
                assert!(results.total_hits >= 5);
            }
        });
    });

    assert_eq!(engine.search_str("parallel").unwrap().total_hits, 200);
    assert_eq!(engine.stats().unwrap().records, 205);
}

#[test]
fn racing_inserts_of_one_key_admit_exactly_one() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir, common::books_schema());

    let wins: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = &engine;
                s.spawn(move || engine.insert(book("same", &format!("writer {}", t), &[], t)).is_ok())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap() as usize).sum()
    });

    assert_eq!(wins, 1);
    assert_eq!(engine.stats().unwrap().records, 1);
}

#[test]
fn shutdown_waits_for_running_operations() {
    let dir = TempDir::new().unwrap();
    let engine = open(&dir, common::books_schema());

    let accepted = std::thread::scope(|s| {
        let writer = s.spawn(|| {
            let mut accepted = 0;
            for i in 0..1000 {
                match engine.insert(book(&format!("k{}", i), "late write", &[], i)) {
                    Ok(_) => accepted += 1,
                    Err(e) => {
                        assert!(e.is_unavailable());
                        break;
                    }
                }
            }
            accepted
        });
        std::thread::sleep(std::time::Duration::from_millis(5));
        engine.shutdown().unwrap();
        writer.join().unwrap()
    });

    // every acknowledged write made it into the final snapshot, nothing else did
    let reopened = open(&dir, common::books_schema());
    assert_eq!(reopened.stats().unwrap().records, accepted);
}
