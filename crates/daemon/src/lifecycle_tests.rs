// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::Config;
use serial_test::serial;
use tempfile::TempDir;

fn paths_under(dir: &std::path::Path) -> Paths {
    Paths::under(dir.to_path_buf())
}

#[tokio::test]
#[serial(daemon_lock)]
async fn start_boots_every_component_on_an_empty_state_dir() {
    let dir = TempDir::new().expect("tempdir");
    let paths = paths_under(dir.path());

    let daemon = Daemon::start_with_fake_adapter(&paths, Config::default()).await.expect("start");

    assert!(paths.lock_path.exists());
    assert!(daemon.store.list_teams().is_empty());
    daemon.shutdown();
}

#[tokio::test]
#[serial(daemon_lock)]
async fn second_start_against_the_same_state_dir_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let paths = paths_under(dir.path());

    let first = Daemon::start_with_fake_adapter(&paths, Config::default()).await.expect("first start");

    let second = Daemon::start_with_fake_adapter(&paths, Config::default()).await;
    assert!(matches!(second, Err(DaemonError::AlreadyRunning(_))));

    first.shutdown();
}

#[tokio::test]
#[serial(daemon_lock)]
async fn lock_is_released_on_drop_so_a_restart_can_reacquire_it() {
    let dir = TempDir::new().expect("tempdir");
    let paths = paths_under(dir.path());

    {
        let daemon = Daemon::start_with_fake_adapter(&paths, Config::default()).await.expect("start");
        daemon.shutdown();
    }

    let restarted = Daemon::start_with_fake_adapter(&paths, Config::default()).await;
    assert!(restarted.is_ok());
}

#[tokio::test]
#[serial(daemon_lock)]
async fn existing_teams_are_picked_up_and_watched_on_restart() {
    let dir = TempDir::new().expect("tempdir");
    let paths = paths_under(dir.path());

    {
        let daemon = Daemon::start_with_fake_adapter(&paths, Config::default()).await.expect("start");
        daemon.store.create_team("acme", "ship things", 1_000_000).expect("create team");
        daemon.shutdown();
    }

    let daemon = Daemon::start_with_fake_adapter(&paths, Config::default()).await.expect("restart");
    assert_eq!(daemon.store.list_teams().len(), 1);
    daemon.shutdown();
}

#[test]
fn paths_under_state_dir_match_expected_layout() {
    let root = PathBuf::from("/tmp/example-state");
    let paths = Paths::under(root.clone());
    assert_eq!(paths.lock_path, root.join("daemon.lock"));
    assert_eq!(paths.log_dir, root.join("logs"));
    assert_eq!(paths.store_dir, root.join("store"));
    assert_eq!(paths.resources_dir, root.join("resources"));
}
