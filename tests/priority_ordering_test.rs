//! Slot validation and ranking
//!
//! Test Scenario:
//! 1. A discovery batch mixes Schengen and National slots, some unbookable
//! 2. Validation drops past, full and unrecognized slots
//! 3. National slots rank first, each category ordered by date
//! 4. Every prioritization leaves an audit event behind

mod common;

use chrono::{Duration, Utc};
use common::*;
use slotline::model::VisaCategory;
use slotline::priority::{
    validate_at, PriorityConfig, PriorityEngine, EARLIEST_FIRST_STRATEGY,
};
use slotline_core_resilience::NoopHealthReporter;
use std::sync::Arc;
use tempfile::TempDir;

fn engine(strategy: &str) -> PriorityEngine {
    PriorityEngine::new(
        PriorityConfig {
            strategy: strategy.to_string(),
            ..PriorityConfig::default()
        },
        Arc::new(NoopHealthReporter),
    )
    .unwrap()
}

fn ids(slots: &[slotline::Slot]) -> Vec<&str> {
    slots.iter().map(|s| s.id.as_str()).collect()
}

#[tokio::test]
async fn test_national_outranks_earlier_schengen() {
    let engine = PriorityEngine::new(PriorityConfig::default(), Arc::new(NoopHealthReporter))
        .unwrap();
    let slots = vec![
        slot("schengen", future_date(2099, 6, 1), VisaCategory::Schengen, 3),
        slot("national", future_date(2099, 6, 5), VisaCategory::National, 1),
    ];

    let ranked = engine.prioritize(slots).await;

    assert_eq!(ids(&ranked), vec!["national", "schengen"]);
}

#[tokio::test]
async fn test_validation_and_ranking_of_mixed_batch() {
    let engine = PriorityEngine::new(PriorityConfig::default(), Arc::new(NoopHealthReporter))
        .unwrap();
    let now = Utc::now();
    let slots = vec![
        slot("sch-late", now + Duration::days(20), VisaCategory::Schengen, 1),
        slot("nat-late", now + Duration::days(10), VisaCategory::National, 1),
        slot("past", now - Duration::days(1), VisaCategory::National, 5),
        slot("full", now + Duration::days(2), VisaCategory::National, 0),
        slot("negative", now + Duration::days(2), VisaCategory::Schengen, -1),
        slot(
            "tourist",
            now + Duration::days(2),
            VisaCategory::Unrecognized("tourist".into()),
            4,
        ),
        slot("sch-early", now + Duration::days(3), VisaCategory::Schengen, 2),
        slot("nat-early", now + Duration::days(5), VisaCategory::National, 1),
    ];

    let ranked = engine.prioritize_at(slots, now).await;

    assert_eq!(
        ids(&ranked),
        vec!["nat-early", "nat-late", "sch-early", "sch-late"]
    );

    let history = engine.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].input_count, 8);
    assert_eq!(history[0].output_count, 4);
}

#[tokio::test]
async fn test_ranking_keeps_input_order_for_equal_keys() {
    let engine = PriorityEngine::new(PriorityConfig::default(), Arc::new(NoopHealthReporter))
        .unwrap();
    let date = future_date(2099, 7, 1);
    let slots = vec![
        slot("b", date, VisaCategory::National, 1),
        slot("a", date, VisaCategory::National, 1),
    ];

    let ranked = engine.prioritize(slots).await;

    assert_eq!(ids(&ranked), vec!["b", "a"]);
}

#[test]
fn test_validation_alone_keeps_input_order() {
    let now = Utc::now();
    let slots = vec![
        slot("sch", now + Duration::days(1), VisaCategory::Schengen, 1),
        slot("nat", now + Duration::days(2), VisaCategory::National, 1),
        slot("now", now, VisaCategory::National, 1),
        slot("gone", now - Duration::seconds(1), VisaCategory::National, 1),
    ];

    let valid = validate_at(slots, now);

    assert_eq!(ids(&valid), vec!["sch", "nat", "now"]);
}

#[tokio::test]
async fn test_earliest_first_ignores_category() {
    let engine = engine(EARLIEST_FIRST_STRATEGY);
    let slots = vec![
        slot("national", future_date(2099, 6, 5), VisaCategory::National, 1),
        slot("schengen", future_date(2099, 6, 1), VisaCategory::Schengen, 1),
    ];

    let ranked = engine.prioritize(slots).await;

    assert_eq!(engine.strategy_name(), EARLIEST_FIRST_STRATEGY);
    assert_eq!(ids(&ranked), vec!["schengen", "national"]);
}

#[tokio::test]
async fn test_history_survives_close_and_reload() {
    let dir = TempDir::new().unwrap();
    let config = PriorityConfig {
        history_file: Some(dir.path().join("prioritization_history.json")),
        ..PriorityConfig::default()
    };

    let engine = PriorityEngine::new(config.clone(), Arc::new(NoopHealthReporter)).unwrap();
    engine
        .prioritize(vec![slot(
            "s1",
            future_date(2099, 6, 1),
            VisaCategory::Schengen,
            1,
        )])
        .await;
    engine.prioritize(Vec::new()).await;
    engine.close().await.unwrap();

    let reloaded = PriorityEngine::new(config, Arc::new(NoopHealthReporter)).unwrap();
    assert_eq!(reloaded.load_history().await.unwrap(), 2);

    let stats = reloaded.stats().await;
    assert_eq!(stats.total_prioritizations, 2);
    assert_eq!(
        stats.last_prioritization.map(|event| event.input_count),
        Some(0)
    );
}
