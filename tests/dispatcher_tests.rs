use fleet_bridge::robot::dispatcher::{Phase, Step};
use fleet_bridge::robot::models::{Command, Pose};
use fleet_bridge::{
    CommandDispatcher, CommandSender, Config, DispatcherSettings, RobotClient, SubmitError,
    TelemetryCache,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::api;

async fn dispatcher_for(config: &Config) -> (CommandDispatcher, CommandSender, TelemetryCache) {
    let client = Arc::new(RobotClient::new(config).unwrap());
    let members = client.discover_fleet().await.unwrap();
    let cache = TelemetryCache::new(&members);
    let (dispatcher, commands) = CommandDispatcher::new(
        client,
        cache.clone(),
        DispatcherSettings::from_config(config),
    );
    (dispatcher, commands, cache)
}

async fn direct_dispatcher(robot: &MockServer) -> (CommandDispatcher, CommandSender, TelemetryCache) {
    dispatcher_for(&common::test_config(robot.uri())).await
}

/// Fleet manager listing one robot per server in `robots`.
async fn fleet_config(fleet: &MockServer, robots: &[&MockServer]) -> Config {
    let listing: Vec<_> = robots
        .iter()
        .enumerate()
        .map(|(i, r)| json!({"id": i + 1, "ip": r.address().to_string()}))
        .collect();
    Mock::given(method("GET"))
        .and(path(api("/robots")))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing))
        .mount(fleet)
        .await;

    let mut config = common::test_config(fleet.uri());
    config.fleet_mode = true;
    config
}

// ---------------------------------------------------------------------------
// Single-slot handoff
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_second_submit_is_pending_until_taken() {
    let robot = MockServer::start().await;
    common::mount_status(&robot, common::status_body(0.0, 0.0, 0.0)).await;
    let (mut dispatcher, commands, _cache) = direct_dispatcher(&robot).await;

    commands.submit(Command::Pause).unwrap();
    match commands.submit(Command::Ready) {
        Err(SubmitError::Pending(cmd)) => assert_eq!(cmd, Command::Ready),
        other => panic!("expected Pending, got {other:?}"),
    }

    // reading phase takes the slot
    dispatcher.step().await;
    assert_eq!(dispatcher.phase(), Phase::Writing);
    commands.submit(Command::Ready).unwrap();
}

#[tokio::test]
async fn test_submit_after_dispatcher_dropped() {
    let robot = MockServer::start().await;
    let (dispatcher, commands, _cache) = direct_dispatcher(&robot).await;
    drop(dispatcher);

    let err = commands.submit(Command::Data).unwrap_err();
    assert!(matches!(err, SubmitError::Stopped(Command::Data)));
    assert_eq!(err.into_command(), Command::Data);
}

// ---------------------------------------------------------------------------
// Phase transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_phase_cycle() {
    let robot = MockServer::start().await;
    common::mount_status(&robot, common::status_body(1.0, 2.0, 3.0)).await;
    common::mount_state_and_queue(&robot).await;
    let (mut dispatcher, commands, cache) = direct_dispatcher(&robot).await;

    assert_eq!(dispatcher.phase(), Phase::Reading);

    // no command: stays reading, telemetry refreshed
    assert_eq!(dispatcher.step().await, Step::Continue);
    assert_eq!(dispatcher.phase(), Phase::Reading);
    assert_eq!(cache.get(0).unwrap().telemetry.position, Pose::new(1.0, 2.0, 3.0));

    commands.submit(Command::Pause).unwrap();
    dispatcher.step().await;
    assert_eq!(dispatcher.phase(), Phase::Writing);

    dispatcher.step().await;
    assert_eq!(dispatcher.phase(), Phase::Idle);

    dispatcher.step().await;
    assert_eq!(dispatcher.phase(), Phase::Reading);

    let mutations = common::mutations(&robot).await;
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].2, json!({"state_id": 4}));
}

#[tokio::test]
async fn test_go_to_relocates_configured_robot() {
    let robot = MockServer::start().await;
    common::mount_status(&robot, common::status_body(0.0, 0.0, 0.0)).await;
    common::mount_relocation(&robot, "move").await;
    let (mut dispatcher, commands, _cache) = direct_dispatcher(&robot).await;

    commands
        .submit(Command::GoTo(Pose::new(2.0, 3.0, 45.0)))
        .unwrap();
    dispatcher.step().await;
    dispatcher.step().await;

    let mutations = common::mutations(&robot).await;
    assert_eq!(mutations.len(), 5);
    assert_eq!(mutations[2].2, json!({"pos_x": 2.0, "pos_y": 3.0, "orientation": 45.0}));
    assert_eq!(mutations[4].2, json!({"state_id": 3}));
}

#[tokio::test]
async fn test_failed_go_to_keeps_dispatcher_running() {
    let robot = MockServer::start().await;
    common::mount_status(&robot, common::status_body(0.0, 0.0, 0.0)).await;
    common::mount_relocation(&robot, "deliver").await;
    let (mut dispatcher, commands, _cache) = direct_dispatcher(&robot).await;

    commands
        .submit(Command::GoTo(Pose::new(2.0, 3.0, 45.0)))
        .unwrap();
    dispatcher.step().await;
    assert_eq!(dispatcher.step().await, Step::Continue);
    assert_eq!(dispatcher.phase(), Phase::Idle);

    // paused and emptied, never resumed
    let mutations = common::mutations(&robot).await;
    assert_eq!(mutations.len(), 2);
    assert_eq!(mutations[0].2, json!({"state_id": 4}));
}

#[tokio::test]
async fn test_idle_and_invalid_commands_touch_nothing() {
    let robot = MockServer::start().await;
    common::mount_status(&robot, common::status_body(0.0, 0.0, 0.0)).await;
    common::mount_state_and_queue(&robot).await;
    let (mut dispatcher, commands, _cache) = direct_dispatcher(&robot).await;

    for cmd in [Command::Idle, Command::Invalid("jump".into())] {
        commands.submit(cmd).unwrap();
        dispatcher.step().await;
        assert_eq!(dispatcher.step().await, Step::Continue);
        dispatcher.step().await;
    }

    assert!(common::mutations(&robot).await.is_empty());
}

#[tokio::test]
async fn test_quit_ends_stepping() {
    let robot = MockServer::start().await;
    common::mount_status(&robot, common::status_body(0.0, 0.0, 0.0)).await;
    let (mut dispatcher, commands, _cache) = direct_dispatcher(&robot).await;

    commands.submit(Command::Quit).unwrap();
    dispatcher.step().await;
    assert_eq!(dispatcher.step().await, Step::Quit);
}

#[tokio::test]
async fn test_data_command_publishes_snapshot() {
    let robot = MockServer::start().await;
    common::mount_status(&robot, common::status_body(0.0, 0.0, 0.0)).await;
    let (mut dispatcher, commands, cache) = direct_dispatcher(&robot).await;
    let mut updates = cache.subscribe();

    commands.submit(Command::Data).unwrap();
    dispatcher.step().await;
    let after_read = cache.generation();
    assert!(after_read > 0);
    assert!(updates.has_changed().unwrap());
    updates.borrow_and_update();

    dispatcher.step().await;
    assert_eq!(cache.generation(), after_read + 1);
    assert!(updates.has_changed().unwrap());
}

// ---------------------------------------------------------------------------
// Telemetry under failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_poll_keeps_last_known_values() {
    let robot = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(api("/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::status_body(4.0, 5.0, 6.0)))
        .up_to_n_times(1)
        .mount(&robot)
        .await;
    Mock::given(method("GET"))
        .and(path(api("/status")))
        .respond_with(ResponseTemplate::new(502))
        .mount(&robot)
        .await;
    let (mut dispatcher, _commands, cache) = direct_dispatcher(&robot).await;

    dispatcher.step().await;
    let first = cache.get(0).unwrap();

    dispatcher.step().await;
    let second = cache.get(0).unwrap();

    assert_eq!(second.telemetry.position, Pose::new(4.0, 5.0, 6.0));
    assert_eq!(second.updated_at, first.updated_at);
}

#[tokio::test]
async fn test_fleet_refresh_updates_healthy_robots() {
    let fleet = MockServer::start().await;
    for id in [1, 3] {
        Mock::given(method("GET"))
            .and(path(api(&format!("/robots/{id}"))))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": common::status_body(id as f64 * 10.0, 0.0, 0.0)
            })))
            .mount(&fleet)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(api("/robots/2")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&fleet)
        .await;
    let robots = [
        MockServer::start().await,
        MockServer::start().await,
        MockServer::start().await,
    ];
    let config = fleet_config(&fleet, &[&robots[0], &robots[1], &robots[2]]).await;
    let (mut dispatcher, _commands, cache) = dispatcher_for(&config).await;

    dispatcher.step().await;

    assert_eq!(cache.get(0).unwrap().telemetry.position.x, 10.0);
    assert!(cache.get(1).is_none());
    assert_eq!(cache.get(2).unwrap().telemetry.position.x, 30.0);
}

#[tokio::test]
async fn test_fleet_pause_reaches_every_robot() {
    let fleet = MockServer::start().await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex(r"^/api/v2\.0\.0/robots/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": common::status_body(0.0, 0.0, 0.0)
        })))
        .mount(&fleet)
        .await;
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    common::mount_state_and_queue(&first).await;
    // a failing robot does not stop the others
    Mock::given(method("PUT"))
        .and(path(api("/status")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&second)
        .await;
    let third = MockServer::start().await;
    common::mount_state_and_queue(&third).await;

    let config = fleet_config(&fleet, &[&first, &second, &third]).await;
    let (mut dispatcher, commands, _cache) = dispatcher_for(&config).await;

    commands.submit(Command::Pause).unwrap();
    dispatcher.step().await;
    dispatcher.step().await;

    for robot in [&first, &second, &third] {
        let mutations = common::mutations(robot).await;
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].2, json!({"state_id": 4}));
    }
}

#[tokio::test]
async fn test_fleet_go_to_targets_configured_index() {
    let fleet = MockServer::start().await;
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    common::mount_relocation(&second, "move").await;

    let mut config = fleet_config(&fleet, &[&first, &second]).await;
    config.goto_robot_index = 1;
    let (mut dispatcher, commands, _cache) = dispatcher_for(&config).await;

    commands
        .submit(Command::GoTo(Pose::new(7.0, 8.0, 9.0)))
        .unwrap();
    dispatcher.step().await;
    dispatcher.step().await;

    assert!(common::mutations(&first).await.is_empty());
    assert_eq!(common::mutations(&second).await.len(), 5);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_stop_shuts_down_loop() {
    let robot = MockServer::start().await;
    common::mount_status(&robot, common::status_body(0.0, 0.0, 0.0)).await;
    let (dispatcher, commands, cache) = direct_dispatcher(&robot).await;

    let handle = dispatcher.start();
    let mut updates = cache.subscribe();
    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("dispatcher polled")
        .unwrap();

    let exited = handle.exited();
    tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("dispatcher stopped");

    assert!(*exited.borrow());
    assert!(commands.is_stopped());
    assert!(matches!(
        commands.submit(Command::Data),
        Err(SubmitError::Stopped(_))
    ));
}

#[tokio::test]
async fn test_quit_exits_running_loop() {
    let robot = MockServer::start().await;
    common::mount_status(&robot, common::status_body(0.0, 0.0, 0.0)).await;
    let (dispatcher, commands, _cache) = direct_dispatcher(&robot).await;

    let handle = dispatcher.start();
    let mut exited = handle.exited();
    commands.submit(Command::Quit).unwrap();

    tokio::time::timeout(Duration::from_secs(5), exited.wait_for(|e| *e))
        .await
        .expect("dispatcher exited")
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap();
    assert!(commands.is_stopped());
}

#[tokio::test]
async fn test_command_wakes_waiting_loop() {
    let robot = MockServer::start().await;
    common::mount_status(&robot, common::status_body(0.0, 0.0, 0.0)).await;
    common::mount_state_and_queue(&robot).await;

    let mut config = common::test_config(robot.uri());
    // long enough that only the command can wake the loop
    config.poll_interval_ms = 60_000;
    let (dispatcher, commands, _cache) = dispatcher_for(&config).await;
    let handle = dispatcher.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    commands.submit(Command::Ready).unwrap();

    let mut executed = false;
    for _ in 0..50 {
        if !common::mutations(&robot).await.is_empty() {
            executed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(executed);

    tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .unwrap();
}
