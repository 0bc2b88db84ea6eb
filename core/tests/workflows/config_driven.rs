// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Configuration-driven behavior workflow tests.
//!
//! These tests build the engine from a parsed `[core]` table and check that
//! the tunables reach the services.

use std::sync::Arc;

use calsync_core::{ChangeSource, Config, EventService, LocalDb, ManualClock};

use crate::common::{DAY, T0, recurring_draft};

fn parse(state_dir: &std::path::Path, sync: &str) -> Config {
    let toml = format!("state_dir = {:?}\n\n[sync]\n{sync}", state_dir.display().to_string());
    toml::from_str(&toml).unwrap()
}

#[tokio::test]
async fn config_horizon_bounds_materialization() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let mut config = parse(dir.path(), r#"horizon = "3d""#);
    config.normalize().unwrap();
    let db = LocalDb::open(config.database_path().as_deref()).await.unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let events = EventService::from_config(db.clone(), &config.sync, clock.clone());
    let cal = db.add_calendar(None, None, "Home").await.unwrap();

    // Act
    let event = events
        .create(recurring_draft(cal.id, "Daily", "FREQ=DAILY"), ChangeSource::User)
        .await
        .unwrap();

    // Assert
    let starts: Vec<_> = events
        .occurrences_of(event.id)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.start)
        .collect();
    assert_eq!(starts, vec![T0, T0 + DAY, T0 + 2 * DAY]);

    // Act - two days later the horizon moves along
    clock.advance(2 * DAY);
    let added = events.extend_horizon(event.id).await.unwrap();

    // Assert
    assert_eq!(added, 2);
    assert_eq!(events.occurrences_of(event.id).await.unwrap().len(), 5);
    db.close().await.unwrap();
}

#[tokio::test]
async fn config_defaults_fill_missing_keys() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();

    // Act
    let config = parse(dir.path(), "max_retries = 2");

    // Assert
    let policy = config.sync.retry_policy();
    assert_eq!(policy.max_retries, 2);
    assert_eq!(policy.base, 30_000);
    assert_eq!(policy.lifetime, 30 * DAY);
    assert_eq!(config.sync.horizon.as_millis(), 365 * DAY);
}

#[tokio::test]
async fn config_state_dir_holds_database_file() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let mut config = parse(dir.path(), "");

    // Act
    config.normalize().unwrap();
    let db = LocalDb::open(config.database_path().as_deref()).await.unwrap();
    db.close().await.unwrap();

    // Assert
    assert!(dir.path().join("calsync.db").exists());
}

#[tokio::test]
async fn config_rejects_unknown_timezone() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let mut config = parse(dir.path(), r#"local_timezone = "Mars/Olympus""#);

    // Act
    let result = config.normalize();

    // Assert
    let err = result.unwrap_err().to_string();
    assert!(err.contains("Mars/Olympus"), "unexpected error: {err}");
}
