use clap::Parser;
use sampleholder::cli::{self, build_controller, parse_actions, run_actions, Action, Cli, Command};
use sampleholder::{Config, HolderHandle, HolderState};
use std::str::FromStr;
use tempfile::tempdir;

fn simulated_handle(config: &Config) -> HolderHandle {
    let controller = build_controller(config, true).unwrap();
    HolderHandle::spawn(controller).unwrap()
}

async fn run(config: &Config, actions: &[Action]) -> (anyhow::Result<()>, String, HolderHandle) {
    let handle = simulated_handle(config);
    let mut out = Vec::new();
    let result = run_actions(
        handle.clone(),
        config.holder.occupied.clone(),
        actions,
        &mut out,
    )
    .await;
    (result, String::from_utf8(out).unwrap(), handle)
}

#[test]
fn test_parse_actions() {
    assert_eq!(Action::from_str("enable").unwrap(), Action::Enable);
    assert_eq!(Action::from_str("GOTO:3").unwrap(), Action::Goto(3));
    assert_eq!(Action::from_str("move:-15").unwrap(), Action::Move(-15));
    assert_eq!(Action::from_str("offset: 7").unwrap(), Action::Offset(7));
    assert_eq!(
        parse_actions("enable home  step:2 next").unwrap(),
        vec![Action::Enable, Action::Home, Action::Step(2), Action::Next]
    );
}

#[test]
fn test_parse_rejects_bad_actions() {
    assert!(Action::from_str("move").is_err());
    assert!(Action::from_str("move:abc").is_err());
    assert!(Action::from_str("home:1").is_err());
    assert!(Action::from_str("spin").is_err());
    assert!(parse_actions("enable spin").is_err());
}

#[test]
fn test_action_display_parses_back() {
    for action in [Action::Status, Action::Step(-2), Action::Offset(40), Action::Prev] {
        assert_eq!(Action::from_str(&action.to_string()).unwrap(), action);
    }
}

#[test]
fn test_cli_accepts_global_flags_anywhere() {
    let cli = Cli::try_parse_from([
        "sampleholder",
        "--simulate",
        "run",
        "enable",
        "goto:3",
        "--samples",
        "12",
    ])
    .unwrap();
    assert!(cli.simulate);
    assert_eq!(cli.samples, Some(12));
    match cli.command {
        Command::Run { actions } => assert_eq!(actions, vec![Action::Enable, Action::Goto(3)]),
        other => panic!("unexpected command: {other:?}"),
    }

    assert!(Cli::try_parse_from(["sampleholder", "run"]).is_err());
    assert!(Cli::try_parse_from(["sampleholder", "run", "jump:2"]).is_err());
}

#[test]
fn test_effective_config_layers_flags_over_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("holder.toml");
    let mut file_config = Config::default();
    file_config.connection.port = "/dev/ttyACM0".to_string();
    file_config.holder.sample_count = 12;
    file_config.save_to_file(&path).unwrap();

    let cli = Cli::try_parse_from([
        "sampleholder",
        "--config",
        path.to_str().unwrap(),
        "--baud",
        "115200",
        "config",
        "show",
    ])
    .unwrap();
    let config = cli.effective_config().unwrap();
    assert_eq!(config.connection.port, "/dev/ttyACM0");
    assert_eq!(config.connection.baud_rate, 115_200);
    assert_eq!(config.holder.sample_count, 12);
}

#[test]
fn test_effective_config_rejects_invalid_flags() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("holder.toml");
    let cli = Cli::try_parse_from([
        "sampleholder",
        "--config",
        path.to_str().unwrap(),
        "--samples",
        "0",
        "config",
        "show",
    ])
    .unwrap();
    // an explicit --config that does not exist is an error
    assert!(cli.effective_config().is_err());

    Config::default().save_to_file(&path).unwrap();
    assert!(cli.effective_config().is_err());
}

#[test]
fn test_serial_controller_needs_port() {
    let err = build_controller(&Config::default(), false).err().unwrap();
    assert!(err.to_string().contains("--port"));
}

#[tokio::test]
async fn test_config_init_writes_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let args = [
        "sampleholder",
        "--config",
        path.to_str().unwrap(),
        "--port",
        "/dev/ttyUSB0",
        "config",
        "init",
    ];

    cli::execute(Cli::try_parse_from(args).unwrap()).await.unwrap();
    let written = Config::load_from_file(&path).unwrap();
    assert_eq!(written.connection.port, "/dev/ttyUSB0");

    // refuses to overwrite without --force
    assert!(cli::execute(Cli::try_parse_from(args).unwrap()).await.is_err());
}

#[tokio::test]
async fn test_run_actions_reports_positions_and_status() {
    let config = Config::default();
    let actions = [Action::Enable, Action::Goto(3), Action::Step(-4)];
    let (result, out, handle) = run(&config, &actions).await;
    result.unwrap();

    assert!(out.contains("Connected, 200 steps per revolution"));
    assert!(out.contains("At sample 0 (position 0)"));
    assert!(out.contains("At sample 3 (position 60)"));
    assert!(out.contains("At sample 9 (position 180)"));
    assert!(out.contains("\"state\": \"enabled\""));

    let status = handle.status().await.unwrap();
    assert_eq!(status.state, HolderState::Disconnected);
}

#[tokio::test]
async fn test_run_actions_rejects_moves_beyond_trim_limit() {
    let config = Config::default();
    let actions = [Action::Enable, Action::Move(101), Action::Home];
    let (result, out, handle) = run(&config, &actions).await;

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("exceeds the limit of 100"));
    assert!(err.to_string().contains("move:101"));
    assert!(!out.contains("\"state\""));

    // the holder is disconnected even though an action failed
    let status = handle.status().await.unwrap();
    assert_eq!(status.state, HolderState::Disconnected);
}

#[tokio::test]
async fn test_run_actions_surfaces_controller_errors() {
    let (result, _, _) = run(&Config::default(), &[Action::Goto(2)]).await;
    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("goto:2"));
}

#[tokio::test]
async fn test_next_and_prev_walk_occupied_samples() {
    let mut config = Config::default();
    config.holder.occupied = vec![2, 5];

    let (result, out, _) = run(
        &config,
        &[Action::Enable, Action::Next, Action::Next, Action::Prev],
    )
    .await;
    result.unwrap();

    let positions: Vec<&str> = out.lines().filter(|l| l.starts_with("At sample")).collect();
    assert_eq!(
        positions,
        vec![
            "At sample 0 (position 0)",
            "At sample 2 (position 40)",
            "At sample 5 (position 100)",
            "At sample 2 (position 40)",
        ]
    );
}

#[tokio::test]
async fn test_config_occupy_and_free_update_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("holder.toml");
    let config_arg = path.to_str().unwrap();

    let occupy = ["sampleholder", "--config", config_arg, "config", "occupy", "7", "2"];
    cli::execute(Cli::try_parse_from(occupy).unwrap()).await.unwrap();
    assert_eq!(Config::load_from_file(&path).unwrap().holder.occupied, vec![2, 7]);

    let free = ["sampleholder", "--config", config_arg, "config", "free", "7"];
    cli::execute(Cli::try_parse_from(free).unwrap()).await.unwrap();
    assert_eq!(Config::load_from_file(&path).unwrap().holder.occupied, vec![2]);

    // out of range for a ten-sample holder, the file is left alone
    let bad = ["sampleholder", "--config", config_arg, "config", "occupy", "3", "10"];
    let err = cli::execute(Cli::try_parse_from(bad).unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("sample 10"));
    assert_eq!(Config::load_from_file(&path).unwrap().holder.occupied, vec![2]);

    assert!(Cli::try_parse_from(["sampleholder", "config", "occupy"]).is_err());
}

#[tokio::test]
async fn test_run_actions_rejects_overflowing_step() {
    let config = Config::default();
    let actions = [Action::Enable, Action::Step(i64::MAX)];
    let (result, out, _) = run(&config, &actions).await;

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("out of range"));
    assert_eq!(out.lines().filter(|l| l.starts_with("At sample")).count(), 1);
}
