//! Integration tests for the linkvault storage engine
//!
//! End-to-end scenarios over a real data directory: durability across
//! restarts, delta recovery with torn and corrupt lines, threshold
//! compaction, history sync, and link-click enrichment.

use linkvault::{
    history, Bookmark, Engine, EngineConfig, HistoryEntry, LinkClick, Session, Tab,
};
use std::fs;
use tempfile::tempdir;

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;
// 2023-11-14 00:00:00 UTC
const DAY1: i64 = 1_699_920_000_000;

#[test]
fn test_add_then_read_roundtrip() {
    let dir = tempdir().unwrap();
    let engine = Engine::open_dir(dir.path()).unwrap();

    let stored = engine
        .add_bookmark(Bookmark {
            url: "https://example.com".into(),
            title: "Example".into(),
            tags: vec!["t".into()],
            ..Default::default()
        })
        .unwrap();

    let bookmarks = engine.read_bookmarks().unwrap();
    assert_eq!(bookmarks.len(), 1);
    let b = &bookmarks[0];
    assert_eq!(b.url, "https://example.com");
    assert_eq!(b.title, "Example");
    assert_eq!(b.tags, vec!["t".to_string()]);
    assert_ne!(b.id, 0);
    assert_eq!(b.id, stored.id);
    assert_eq!(b.created_at, b.updated_at);
    assert!(b.created_at > 0);
}

#[test]
fn test_update_preserves_created_at() {
    let dir = tempdir().unwrap();
    let engine = Engine::open_dir(dir.path()).unwrap();

    let stored = engine
        .add_bookmark(Bookmark {
            url: "https://example.com".into(),
            title: "Example".into(),
            ..Default::default()
        })
        .unwrap();

    // Caller zeroes created_at; the engine restores it from the merged view
    let mut updated = stored.clone();
    updated.title = "Updated".into();
    updated.created_at = 0;
    engine.update_bookmark(updated).unwrap();

    let bookmarks = engine.read_bookmarks().unwrap();
    assert_eq!(bookmarks.len(), 1);
    assert_eq!(bookmarks[0].title, "Updated");
    assert_eq!(bookmarks[0].created_at, stored.created_at);
    assert!(bookmarks[0].updated_at >= stored.updated_at);
}

#[test]
fn test_restart_replays_delta() {
    let dir = tempdir().unwrap();

    let stored = {
        let engine = Engine::open_dir(dir.path()).unwrap();
        let stored = engine
            .add_bookmark(Bookmark {
                url: "https://example.com".into(),
                title: "Example".into(),
                ..Default::default()
            })
            .unwrap();
        let mut updated = stored.clone();
        updated.title = "Updated".into();
        engine.update_bookmark(updated).unwrap();
        engine.close().unwrap();
        stored
    };

    let engine = Engine::open_dir(dir.path()).unwrap();
    let bookmarks = engine.read_bookmarks().unwrap();
    assert_eq!(bookmarks.len(), 1);
    assert_eq!(bookmarks[0].id, stored.id);
    assert_eq!(bookmarks[0].title, "Updated");
}

#[test]
fn test_crash_after_ack_preserves_record() {
    let dir = tempdir().unwrap();

    let engine = Engine::open_dir(dir.path()).unwrap();
    let stored = engine
        .add_bookmark(Bookmark {
            url: "https://durable.example".into(),
            title: "Durable".into(),
            ..Default::default()
        })
        .unwrap();
    // No close: the per-append fsync is the durability point
    drop(engine);

    let engine = Engine::open_dir(dir.path()).unwrap();
    let bookmarks = engine.read_bookmarks().unwrap();
    assert_eq!(bookmarks.len(), 1);
    assert_eq!(bookmarks[0].id, stored.id);
}

#[test]
fn test_threshold_compaction_keeps_all_records() {
    let dir = tempdir().unwrap();
    let mut config = EngineConfig::new(dir.path());
    config.compact_threshold = 5;
    let engine = Engine::open(config).unwrap();

    for i in 0..5 {
        engine
            .add_bookmark(Bookmark {
                url: format!("https://example{i}.com"),
                title: format!("Example {i}"),
                ..Default::default()
            })
            .unwrap();
    }

    // The 5th add crossed the threshold: base written, delta truncated
    let base = dir.path().join("bookmarks.parquet");
    assert!(base.exists());
    assert!(!dir.path().join("bookmarks.delta.json").exists());

    for i in 5..10 {
        engine
            .add_bookmark(Bookmark {
                url: format!("https://example{i}.com"),
                title: format!("Example {i}"),
                ..Default::default()
            })
            .unwrap();
    }

    let bookmarks = engine.read_bookmarks().unwrap();
    assert_eq!(bookmarks.len(), 10);
}

#[test]
fn test_delete_survives_restart_and_compaction() {
    let dir = tempdir().unwrap();
    let engine = Engine::open_dir(dir.path()).unwrap();

    let keep = engine
        .add_bookmark(Bookmark {
            url: "https://keep.example".into(),
            title: "Keep".into(),
            ..Default::default()
        })
        .unwrap();
    let gone = engine
        .add_bookmark(Bookmark {
            url: "https://gone.example".into(),
            title: "Gone".into(),
            ..Default::default()
        })
        .unwrap();
    engine.delete_bookmark(gone.id).unwrap();

    assert!(engine.contains_bookmark(keep.id).unwrap());
    assert!(!engine.contains_bookmark(gone.id).unwrap());
    engine.close().unwrap();
    drop(engine);

    let engine = Engine::open_dir(dir.path()).unwrap();
    let before: Vec<i64> = {
        let mut ids: Vec<i64> = engine.read_bookmarks().unwrap().iter().map(|b| b.id).collect();
        ids.sort_unstable();
        ids
    };
    assert_eq!(before, vec![keep.id]);

    engine.compact_all().unwrap();
    let after: Vec<i64> = {
        let mut ids: Vec<i64> = engine.read_bookmarks().unwrap().iter().map(|b| b.id).collect();
        ids.sort_unstable();
        ids
    };
    assert_eq!(before, after);
    assert!(!dir.path().join("bookmarks.delta.json").exists());
}

#[test]
fn test_torn_trailing_delta_line_dropped_on_recovery() {
    let dir = tempdir().unwrap();

    {
        let engine = Engine::open_dir(dir.path()).unwrap();
        engine
            .add_bookmark(Bookmark {
                url: "https://intact.example".into(),
                title: "Intact".into(),
                ..Default::default()
            })
            .unwrap();
        engine.close().unwrap();
    }

    // Simulate a crash mid-append: a torn, unterminated final line
    let delta = dir.path().join("bookmarks.delta.json");
    let mut contents = fs::read_to_string(&delta).unwrap();
    contents.push_str("{\"kind\":\"upsert\",\"record\":{\"url\":\"https://tr");
    fs::write(&delta, contents).unwrap();

    let engine = Engine::open_dir(dir.path()).unwrap();
    let bookmarks = engine.read_bookmarks().unwrap();
    assert_eq!(bookmarks.len(), 1);
    assert_eq!(bookmarks[0].url, "https://intact.example");
}

#[test]
fn test_corrupt_interior_delta_line_skipped_on_recovery() {
    let dir = tempdir().unwrap();

    {
        let engine = Engine::open_dir(dir.path()).unwrap();
        engine
            .add_bookmark(Bookmark {
                url: "https://first.example".into(),
                title: "First".into(),
                ..Default::default()
            })
            .unwrap();
        engine.close().unwrap();
    }

    let delta = dir.path().join("bookmarks.delta.json");
    let mut contents = fs::read_to_string(&delta).unwrap();
    contents.push_str("garbage line, not json\n");
    fs::write(&delta, &contents).unwrap();

    {
        let engine = Engine::open_dir(dir.path()).unwrap();
        engine
            .add_bookmark(Bookmark {
                url: "https://second.example".into(),
                title: "Second".into(),
                ..Default::default()
            })
            .unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open_dir(dir.path()).unwrap();
    let mut urls: Vec<String> = engine
        .read_bookmarks()
        .unwrap()
        .into_iter()
        .map(|b| b.url)
        .collect();
    urls.sort();
    assert_eq!(urls, vec!["https://first.example", "https://second.example"]);
}

#[test]
fn test_legacy_sentinel_delta_format_readable() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path()).unwrap();

    // Delta lines as an older deployment wrote them: full records, with
    // deletion marked by the sentinel title
    let legacy = concat!(
        r#"{"id":1,"url":"https://kept.example","title":"Kept","description":"","tags":[],"created_at":1699920000000,"updated_at":1699920000000}"#,
        "\n",
        r#"{"id":2,"url":"https://gone.example","title":"Gone","description":"","tags":[],"created_at":1699920000000,"updated_at":1699920000000}"#,
        "\n",
        r#"{"id":2,"url":"","title":"__DELETED__","description":"","tags":[],"created_at":0,"updated_at":1699920001000}"#,
        "\n",
    );
    fs::write(dir.path().join("bookmarks.delta.json"), legacy).unwrap();

    let engine = Engine::open_dir(dir.path()).unwrap();
    let bookmarks = engine.read_bookmarks().unwrap();
    assert_eq!(bookmarks.len(), 1);
    assert_eq!(bookmarks[0].id, 1);
    assert_eq!(bookmarks[0].title, "Kept");
}

#[test]
fn test_session_lifecycle_with_tabs() {
    let dir = tempdir().unwrap();
    let engine = Engine::open_dir(dir.path()).unwrap();

    let stored = engine
        .add_session(Session {
            name: "work".into(),
            tabs: vec![
                Tab {
                    url: "https://docs.example".into(),
                    title: "Docs".into(),
                    active: true,
                    index: 0,
                    ..Default::default()
                },
                Tab {
                    url: "https://mail.example".into(),
                    title: "Mail".into(),
                    index: 1,
                    pinned: true,
                    ..Default::default()
                },
            ],
            is_active: true,
            ..Default::default()
        })
        .unwrap();
    engine.close().unwrap();
    drop(engine);

    let engine = Engine::open_dir(dir.path()).unwrap();
    let sessions = engine.read_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, stored.id);
    assert_eq!(sessions[0].tabs.len(), 2);
    assert!(sessions[0].tabs[1].pinned);

    engine.delete_session(stored.id).unwrap();
    assert!(engine.read_sessions().unwrap().is_empty());
}

#[test]
fn test_bulk_replace_clears_delta() {
    let dir = tempdir().unwrap();
    let engine = Engine::open_dir(dir.path()).unwrap();

    engine
        .add_bookmark(Bookmark {
            url: "https://old.example".into(),
            title: "Old".into(),
            ..Default::default()
        })
        .unwrap();
    assert!(dir.path().join("bookmarks.delta.json").exists());

    let imported = vec![
        Bookmark {
            id: 10,
            url: "https://a.example".into(),
            title: "A".into(),
            ..Default::default()
        },
        Bookmark {
            id: 20,
            url: "https://b.example".into(),
            title: "B".into(),
            ..Default::default()
        },
    ];
    engine.replace_bookmarks(&imported).unwrap();

    assert!(!dir.path().join("bookmarks.delta.json").exists());
    let mut ids: Vec<i64> = engine.read_bookmarks().unwrap().iter().map(|b| b.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![10, 20]);
}

#[test]
fn test_history_sync_newer_visit_wins() {
    let dir = tempdir().unwrap();
    let engine = Engine::open_dir(dir.path()).unwrap();
    let t = DAY1 + 10 * HOUR_MS;

    engine
        .append_history(vec![HistoryEntry {
            url: "https://u.example".into(),
            title: "u".into(),
            visit_count: 1,
            last_visit_time: t,
            ..Default::default()
        }])
        .unwrap();

    let synced = history::sync(
        &engine,
        vec![HistoryEntry {
            url: "https://u.example".into(),
            title: "u".into(),
            visit_count: 2,
            last_visit_time: t + 1,
            ..Default::default()
        }],
    )
    .unwrap();
    assert_eq!(synced, 1);

    let entries = engine.read_history().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].last_visit_time, t + 1);

    // An older visit for the same URL changes nothing
    let synced = history::sync(
        &engine,
        vec![HistoryEntry {
            url: "https://u.example".into(),
            title: "u".into(),
            visit_count: 9,
            last_visit_time: t,
            ..Default::default()
        }],
    )
    .unwrap();
    assert_eq!(synced, 0);
    assert_eq!(engine.read_history().unwrap()[0].last_visit_time, t + 1);
}

#[test]
fn test_history_enrichment_same_day_only() {
    let dir = tempdir().unwrap();
    let engine = Engine::open_dir(dir.path()).unwrap();

    engine
        .append_history(vec![HistoryEntry {
            url: "https://u.example".into(),
            title: "u".into(),
            visit_count: 1,
            last_visit_time: DAY1 + 10 * HOUR_MS,
            ..Default::default()
        }])
        .unwrap();
    engine
        .append_link_clicks(vec![LinkClick {
            destination_url: "https://u.example".into(),
            source_url: "https://s.example".into(),
            source_title: "s".into(),
            link_text: "link".into(),
            timestamp: DAY1 + 9 * HOUR_MS,
            ..Default::default()
        }])
        .unwrap();

    let enriched = history::enriched(&engine).unwrap();
    assert_eq!(enriched.len(), 1);
    assert_eq!(enriched[0].source_url, "https://s.example");

    // A click on the next day does not enrich
    engine
        .replace_link_clicks(&[LinkClick {
            id: 1,
            destination_url: "https://u.example".into(),
            source_url: "https://s.example".into(),
            timestamp: DAY1 + DAY_MS + 9 * HOUR_MS,
            ..Default::default()
        }])
        .unwrap();
    let enriched = history::enriched(&engine).unwrap();
    assert!(enriched[0].source_url.is_empty());
}

#[test]
fn test_link_click_batch_gets_distinct_ids() {
    let dir = tempdir().unwrap();
    let engine = Engine::open_dir(dir.path()).unwrap();

    let stored = engine
        .append_link_clicks(vec![
            LinkClick {
                destination_url: "https://a.example".into(),
                ..Default::default()
            },
            LinkClick {
                destination_url: "https://b.example".into(),
                ..Default::default()
            },
            LinkClick {
                destination_url: "https://c.example".into(),
                ..Default::default()
            },
        ])
        .unwrap();

    let mut ids: Vec<i64> = stored.iter().map(|c| c.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| *id != 0));
    assert!(stored.iter().all(|c| c.created_at > 0));
}

#[test]
fn test_compaction_invisible_across_streams() {
    let dir = tempdir().unwrap();
    let engine = Engine::open_dir(dir.path()).unwrap();

    for i in 0..4 {
        engine
            .add_bookmark(Bookmark {
                url: format!("https://b{i}.example"),
                title: format!("B{i}"),
                ..Default::default()
            })
            .unwrap();
    }
    engine
        .append_history(vec![
            HistoryEntry {
                url: "https://h.example".into(),
                last_visit_time: DAY1,
                ..Default::default()
            },
            HistoryEntry {
                url: "https://h.example".into(),
                last_visit_time: DAY1 + 1,
                ..Default::default()
            },
        ])
        .unwrap();

    let mut bookmarks_before: Vec<String> = engine
        .read_bookmarks()
        .unwrap()
        .into_iter()
        .map(|b| b.url)
        .collect();
    bookmarks_before.sort();
    let history_before = engine.read_history().unwrap();

    engine.compact_all().unwrap();

    let mut bookmarks_after: Vec<String> = engine
        .read_bookmarks()
        .unwrap()
        .into_iter()
        .map(|b| b.url)
        .collect();
    bookmarks_after.sort();
    assert_eq!(bookmarks_before, bookmarks_after);
    // append-only streams keep duplicates through compaction
    assert_eq!(engine.read_history().unwrap(), history_before);

    for name in ["bookmarks", "sessions", "history", "link_clicks"] {
        assert!(dir.path().join(format!("{name}.parquet")).exists());
        assert!(!dir.path().join(format!("{name}.delta.json")).exists());
    }
}
