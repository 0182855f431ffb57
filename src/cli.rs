//! Command-line front end
//!
//! Builds a controller from the effective configuration (defaults, then the
//! config file, then flags), moves it onto a worker thread, and drives it
//! through a list of actions or an interactive session.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use sampleholder_communication::{
    list_ports, HolderConfig, HolderHandle, SampleHolderController, SimulatedHolder, SprSource,
};
use sampleholder_settings::{default_config_path, Config};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Port name reported when running against the simulator
pub const SIMULATOR_PORT: &str = "simulator";

/// Motorized sample holder control
#[derive(Parser, Debug)]
#[command(name = "sampleholder")]
#[command(about = "Control a motorized multi-position sample holder over serial")]
#[command(version)]
pub struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Serial port, e.g. /dev/ttyACM0 or COM4
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(long, global = true)]
    pub baud: Option<u32>,

    /// Per-byte read timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Number of sample slots
    #[arg(long, global = true)]
    pub samples: Option<u32>,

    /// Steps per revolution to use if the device can not report it
    #[arg(long, global = true)]
    pub spr: Option<u32>,

    /// Talk to a simulated holder instead of a serial port
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports that look like devices
    Ports,

    /// Connect, run actions in order, print the final status, and disconnect
    Run {
        /// enable, disable, home, status, move:<steps>, step:<samples>,
        /// goto:<sample>, offset:<steps>, next, prev
        #[arg(required = true)]
        actions: Vec<Action>,
    },

    /// Interactive session, one or more actions per line
    Shell,

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Mark samples as occupied in the config file
    Occupy {
        /// Sample numbers
        #[arg(required = true)]
        samples: Vec<u32>,
    },
    /// Mark samples as free in the config file
    Free {
        /// Sample numbers
        #[arg(required = true)]
        samples: Vec<u32>,
    },
}

/// One holder operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Enable,
    Disable,
    Home,
    Status,
    Move(i64),
    Step(i64),
    Goto(i64),
    Offset(i64),
    Next,
    Prev,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, arg) = match s.trim().split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s.trim(), None),
        };
        let name = name.to_ascii_lowercase();

        let number = || -> std::result::Result<i64, String> {
            let arg = arg.ok_or_else(|| format!("'{}' needs a value, e.g. {}:2", name, name))?;
            arg.trim()
                .parse()
                .map_err(|_| format!("'{}' is not an integer", arg))
        };
        let bare = |action: Action| match arg {
            Some(_) => Err(format!("'{}' takes no value", name)),
            None => Ok(action),
        };

        match name.as_str() {
            "enable" => bare(Action::Enable),
            "disable" => bare(Action::Disable),
            "home" => bare(Action::Home),
            "status" => bare(Action::Status),
            "next" => bare(Action::Next),
            "prev" => bare(Action::Prev),
            "move" => number().map(Action::Move),
            "step" => number().map(Action::Step),
            "goto" => number().map(Action::Goto),
            "offset" => number().map(Action::Offset),
            _ => Err(format!("unknown action '{}'", s)),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Enable => write!(f, "enable"),
            Action::Disable => write!(f, "disable"),
            Action::Home => write!(f, "home"),
            Action::Status => write!(f, "status"),
            Action::Move(n) => write!(f, "move:{}", n),
            Action::Step(n) => write!(f, "step:{}", n),
            Action::Goto(n) => write!(f, "goto:{}", n),
            Action::Offset(n) => write!(f, "offset:{}", n),
            Action::Next => write!(f, "next"),
            Action::Prev => write!(f, "prev"),
        }
    }
}

/// Parse a whitespace separated line of actions
pub fn parse_actions(line: &str) -> Result<Vec<Action>> {
    line.split_whitespace()
        .map(|token| Action::from_str(token).map_err(|e| anyhow!(e)))
        .collect()
}

impl Cli {
    fn config_path(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => default_config_path()
                .map_err(|e| tracing::debug!("No default config path: {}", e))
                .ok(),
        }
    }

    /// Defaults, then the config file, then command-line flags
    pub fn effective_config(&self) -> Result<Config> {
        let mut config = match (&self.config, self.config_path()) {
            (Some(path), _) => Config::load_from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            (None, Some(path)) => Config::load_or_default(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            (None, None) => Config::default(),
        };

        self.apply_overrides(&mut config);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Overwrite `config` with any connection or holder flags given
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.connection.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.connection.baud_rate = baud;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.connection.timeout_ms = timeout_ms;
        }
        if let Some(samples) = self.samples {
            config.holder.sample_count = samples;
        }
        if let Some(spr) = self.spr {
            config.holder.default_spr = spr;
        }
    }
}

/// Controller options for `config`
pub fn holder_config(config: &Config) -> HolderConfig {
    HolderConfig {
        port: config.connection.port.clone(),
        sample_count: config.holder.sample_count,
        default_spr: config.holder.default_spr,
        baud_rate: config.connection.baud_rate,
        timeout: config.connection.timeout(),
        read_attempts: config.connection.read_attempts,
        settle_delay: config.holder.settle_delay(),
    }
}

/// Controller on the configured serial port, or on a simulator
pub fn build_controller(config: &Config, simulate: bool) -> Result<SampleHolderController> {
    let mut options = holder_config(config);

    if simulate {
        options.port = SIMULATOR_PORT.to_string();
        options.settle_delay = Duration::ZERO;
        return Ok(SampleHolderController::new(
            options,
            Box::new(SimulatedHolder::new()),
        )?);
    }

    if options.port.is_empty() {
        bail!("No serial port given; use --port or set connection.port in the config file");
    }
    Ok(SampleHolderController::serial(options)?)
}

/// A connected holder plus the occupied samples `next`/`prev` walk through
pub struct Session {
    handle: HolderHandle,
    occupied: Vec<u32>,
}

impl Session {
    /// Connect the holder behind `handle`, reporting how SPR was resolved to `out`
    pub async fn connect(
        handle: HolderHandle,
        occupied: Vec<u32>,
        out: &mut impl Write,
    ) -> Result<Self> {
        let source = handle.connect().await.context("Failed to connect")?;
        match &source {
            SprSource::Queried { spr } => writeln!(out, "Connected, {} steps per revolution", spr)?,
            SprSource::Fallback { spr, reason } => writeln!(
                out,
                "Connected, using default {} steps per revolution ({})",
                spr, reason
            )?,
        }
        Ok(Self { handle, occupied })
    }

    /// The worker handle
    pub fn handle(&self) -> &HolderHandle {
        &self.handle
    }

    /// Run one action, writing its outcome to `out`
    pub async fn apply(&self, action: Action, out: &mut impl Write) -> Result<()> {
        match action {
            Action::Enable => {
                self.handle.enable().await?;
                self.write_position(out).await?;
            }
            Action::Disable => {
                self.handle.disable().await?;
                writeln!(out, "Motor disabled")?;
            }
            Action::Home => {
                self.handle.home().await?;
                self.write_position(out).await?;
            }
            Action::Status => {
                let status = self.handle.status().await?;
                writeln!(out, "{}", serde_json::to_string_pretty(&status)?)?;
            }
            Action::Move(steps) => {
                self.check_trim(steps).await?;
                self.handle.move_steps(steps).await?;
                self.write_position(out).await?;
            }
            Action::Step(num) => {
                let steps = self.handle.step(num).await?;
                tracing::debug!("Stepped {} samples as {} motor steps", num, steps);
                self.write_position(out).await?;
            }
            Action::Goto(num) => {
                self.handle.goto(num).await?;
                self.write_position(out).await?;
            }
            Action::Offset(steps) => {
                self.check_trim(steps).await?;
                self.handle.offset(steps).await?;
                writeln!(out, "Home reference offset by {} steps", steps)?;
            }
            Action::Next | Action::Prev => {
                let hops = if action == Action::Next { 1 } else { -1 };
                match self.handle.step_occupied(self.occupied.clone(), hops).await? {
                    Some(_) => self.write_position(out).await?,
                    None => writeln!(out, "No occupied sample to move to")?,
                }
            }
        }
        Ok(())
    }

    /// Disconnect the holder
    pub async fn close(self) -> Result<()> {
        self.handle.disconnect().await?;
        Ok(())
    }

    async fn check_trim(&self, steps: i64) -> Result<()> {
        let limit = self.handle.call(|c| Ok(c.trim_limit())).await?;
        if steps.unsigned_abs() > u64::from(limit) {
            bail!(
                "{} steps exceeds the limit of {} (half a revolution)",
                steps,
                limit
            );
        }
        Ok(())
    }

    async fn write_position(&self, out: &mut impl Write) -> Result<()> {
        let status = self.handle.status().await?;
        match (status.sample, status.position) {
            (Some(sample), Some(position)) => {
                writeln!(out, "At sample {} (position {})", sample, position)?
            }
            _ => writeln!(out, "Position unknown")?,
        }
        Ok(())
    }
}

/// Connect, run `actions` in order, print the final status, and disconnect
///
/// The holder is disconnected even when an action fails.
pub async fn run_actions(
    handle: HolderHandle,
    occupied: Vec<u32>,
    actions: &[Action],
    out: &mut impl Write,
) -> Result<()> {
    let session = Session::connect(handle, occupied, out).await?;

    let mut outcome = Ok(());
    for action in actions {
        if let Err(e) = session.apply(*action, out).await {
            outcome = Err(e.context(format!("Action '{}' failed", action)));
            break;
        }
    }
    if outcome.is_ok() {
        outcome = session.apply(Action::Status, out).await;
    }

    session.close().await?;
    outcome
}

const SHELL_HELP: &str = "\
Actions: enable disable home status move:<steps> step:<samples>
         goto:<sample> offset:<steps> next prev
Several actions may share a line. 'quit' leaves.";

async fn shell(session: &Session) -> Result<()> {
    let mut stdout = std::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    writeln!(stdout, "{}", SHELL_HELP)?;

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            "help" | "?" => {
                writeln!(stdout, "{}", SHELL_HELP)?;
                continue;
            }
            _ => {}
        }

        let actions = match parse_actions(&line) {
            Ok(actions) => actions,
            Err(e) => {
                eprintln!("error: {}", e);
                continue;
            }
        };
        for action in actions {
            if let Err(e) = session.apply(action, &mut stdout).await {
                eprintln!("error: {:#}", e);
                break;
            }
        }
    }
    Ok(())
}

fn print_ports(out: &mut impl Write) -> Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        writeln!(out, "No serial devices found")?;
    }
    for port in ports {
        write!(out, "{:<24} {}", port.port_name, port.description)?;
        if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            write!(out, " [{:04x}:{:04x}]", vid, pid)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn spawn_holder(cli: &Cli, config: &Config) -> Result<HolderHandle> {
    let controller = build_controller(config, cli.simulate)?;
    Ok(HolderHandle::spawn(controller)?)
}

/// Run the parsed command line
pub async fn execute(cli: Cli) -> Result<()> {
    let mut stdout = std::io::stdout();

    match &cli.command {
        Command::Ports => print_ports(&mut stdout),
        Command::Run { actions } => {
            let config = cli.effective_config()?;
            let handle = spawn_holder(&cli, &config)?;
            run_actions(handle, config.holder.occupied.clone(), actions, &mut stdout).await
        }
        Command::Shell => {
            let config = cli.effective_config()?;
            let handle = spawn_holder(&cli, &config)?;
            let session = Session::connect(handle, config.holder.occupied, &mut stdout).await?;
            let outcome = shell(&session).await;
            session.close().await?;
            outcome
        }
        Command::Config(ConfigCommand::Show) => {
            let config = cli.effective_config()?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&config)?)?;
            Ok(())
        }
        Command::Config(ConfigCommand::Init { force }) => {
            let path = cli
                .config_path()
                .context("No config directory on this platform; pass --config")?;
            if path.exists() && !force {
                bail!("{} already exists; pass --force to overwrite", path.display());
            }
            let mut config = Config::default();
            cli.apply_overrides(&mut config);
            config.validate().context("Invalid configuration")?;
            config
                .save_to_file(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            writeln!(stdout, "Wrote {}", path.display())?;
            Ok(())
        }
        Command::Config(ConfigCommand::Occupy { samples }) => {
            update_occupied(&cli, samples, true, &mut stdout)
        }
        Command::Config(ConfigCommand::Free { samples }) => {
            update_occupied(&cli, samples, false, &mut stdout)
        }
    }
}

/// Mark `samples` occupied or free in the config file and save it
fn update_occupied(
    cli: &Cli,
    samples: &[u32],
    occupied: bool,
    out: &mut impl Write,
) -> Result<()> {
    let path = cli
        .config_path()
        .context("No config directory on this platform; pass --config")?;
    let mut config = Config::load_or_default(&path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    cli.apply_overrides(&mut config);

    for &sample in samples {
        config
            .set_occupied(sample, occupied)
            .with_context(|| format!("Can not update sample {}", sample))?;
    }
    config
        .save_to_file(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    writeln!(out, "Occupied samples: {:?}", config.holder.occupied)?;
    Ok(())
}
