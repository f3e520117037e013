//! Scaling tests with synthetic stores of a few thousand records.
//!
//! Measures the operations whose cost grows with store size:
//! - Population with tracked sort fields (every insert rebuilds them)
//! - Paged queries over tracked and one-off indices
//! - Snapshot save and reload

use serde_json::json;
use std::time::Instant;
use tallydb::{into_record, Query, Record, Store, StoreConfig};
use tempfile::TempDir;

const RECORD_COUNT: usize = 2_000;

/// Timing helper
struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    fn report(&self) {
        println!("  {} took {:.2}ms", self.name, self.elapsed_ms());
    }

    fn report_with_count(&self, count: usize) {
        let ms = self.elapsed_ms();
        let per_item = if count > 0 { ms / count as f64 } else { 0.0 };
        println!(
            "  {} took {:.2}ms ({} items, {:.4}ms/item)",
            self.name, ms, count, per_item
        );
    }
}

fn populate(store: &Store, count: usize) {
    for i in 0..count {
        let record = into_record(json!({
            "author": format!("user{}", i % 17),
            "time": 1_700_000_000_000u64 + i as u64,
            "score": (i * 7919) % 1000,
        }))
        .unwrap();
        store.insert(record, None).unwrap();
    }
}

#[test]
fn test_scaling_tracked_population_and_paging() {
    println!("\n=== {} Records, Two Tracked Fields ===", RECORD_COUNT);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("posts.json");
    let store = Store::open(StoreConfig::file(&path).sort_field("time").sort_field("score"));

    let timer = Timer::new("Populate");
    populate(&store, RECORD_COUNT);
    timer.report_with_count(RECORD_COUNT);
    assert_eq!(store.len(), RECORD_COUNT);

    let timer = Timer::new("Newest 20");
    let latest = store.find(&Query::new().order_by("time").limit(1, -20));
    timer.report();
    assert_eq!(latest.len(), 20);
    assert_eq!(
        latest[0]["time"].as_u64().unwrap(),
        1_700_000_000_000u64 + RECORD_COUNT as u64 - 1
    );

    let timer = Timer::new("Filtered page 5 by score");
    let page = store.find(
        &Query::new()
            .filter(|r: &Record| r["author"] == "user3")
            .order_by("score")
            .limit(5, 10),
    );
    timer.report();
    assert_eq!(page.len(), 10);
    assert!(page.iter().all(|r| r["author"] == "user3"));
    let scores: Vec<u64> = page.iter().map(|r| r["score"].as_u64().unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] <= w[1]));

    let timer = Timer::new("Save");
    store.save().unwrap();
    timer.report();

    let timer = Timer::new("Reopen");
    let reopened = Store::open_strict(StoreConfig::file(&path)).unwrap();
    timer.report();
    assert_eq!(reopened.len(), RECORD_COUNT);
    assert_eq!(reopened.with_database(|db| db.indexes().len()), 2);
}

#[test]
fn test_scaling_one_off_indices() {
    println!("\n=== {} Records, One-Off Filtered Indices ===", RECORD_COUNT);

    let store = Store::open(StoreConfig {
        track_sort_on_query: false,
        ..Default::default()
    });
    populate(&store, RECORD_COUNT);

    let timer = Timer::new("100 filtered queries");
    for round in 0..100 {
        let author = format!("user{}", round % 17);
        let found = store.find(
            &Query::new()
                .filter(move |r: &Record| r["author"] == author.as_str())
                .order_by("score")
                .limit(1, 5),
        );
        assert_eq!(found.len(), 5);
    }
    timer.report_with_count(100);

    assert!(store.with_database(|db| db.indexes().is_empty()));
}
