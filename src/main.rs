//! # CyberOS Control Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # TUI for the project in the current directory
//! cyberos
//!
//! # Another checkout
//! cyberos --project ~/src/CyberOS
//!
//! # Headless
//! cyberos build
//! cyberos launch --cores 4 --memory 1024 --display serial
//! cyberos vms
//! cyberos status
//! cyberos deps
//! cyberos config show
//! ```
//!
//! Diagnostics go through `tracing`, filtered by `CYBEROS_LOG` (default
//! `info`). Headless commands log to stderr; the TUI logs to
//! `<data_dir>/cyberos.log` so the alternate screen stays clean.

use cyberos::activity;
use cyberos::process::{ProcessHandle, ProcessRunner, Termination};
use cyberos::project::{check_dependencies, deps, BuildTask, ProjectLayout, ProjectStatus};
use cyberos::ui::{self, config::UiConfig, App, AppSettings};
use cyberos::vm::{describe, DisplayMode, VmConfig, VmImageStore, VmLauncher, DEFAULT_VM_NAME};

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "CYBEROS_LOG";

/// Trait for reading terminal events (allows dependency injection for testing)
trait EventReader {
    fn read_event(&mut self, timeout: Duration) -> Result<Option<Event>>;
}

/// Production event reader that uses crossterm's event polling + read
struct CrosstermEventReader;

impl EventReader for CrosstermEventReader {
    fn read_event(&mut self, timeout: Duration) -> Result<Option<Event>> {
        if event::poll(timeout).context("Failed to poll for events")? {
            Ok(Some(
                event::read().context("Failed to read keyboard event")?,
            ))
        } else {
            Ok(None)
        }
    }
}

/// CyberOS Control - build CyberOS and run it under QEMU
#[derive(Parser, Debug)]
#[command(name = "cyberos")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build CyberOS and run it under QEMU", long_about = None)]
struct Args {
    /// CyberOS project root (defaults to the current directory)
    #[arg(short, long, value_name = "DIR", global = true)]
    project: Option<PathBuf>,

    /// VM configuration file (defaults to ~/.cyberos_vm.conf)
    #[arg(long, value_name = "FILE", global = true)]
    vm_config: Option<PathBuf>,

    /// Directory holding VM disk images (defaults to ~/.cyberos/vms)
    #[arg(long, value_name = "DIR", global = true)]
    vm_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Interactive control center (default)
    Tui,
    /// Run scripts/build.sh
    Build,
    /// Run scripts/clean.sh
    Clean,
    /// Boot a VM from the built ISO
    Launch(VmOverrides),
    /// List VM disk images
    Vms,
    /// Print the project status report
    Status,
    /// Check for required host tools
    Deps,
    /// Show or save the VM configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
enum ConfigAction {
    /// Print the configuration file path and contents
    Show,
    /// Apply overrides and write the configuration file
    Save(VmOverrides),
}

/// Values that take precedence over the configuration file.
#[derive(ClapArgs, Debug, PartialEq)]
struct VmOverrides {
    /// VM name (selects the disk image)
    #[arg(long, default_value = DEFAULT_VM_NAME)]
    name: String,
    /// CPU cores
    #[arg(long)]
    cores: Option<u32>,
    /// RAM in MB
    #[arg(long)]
    memory: Option<u32>,
    /// Disk size in GB (used when the image is created)
    #[arg(long)]
    disk_size: Option<u32>,
    /// Display mode: sdl, vnc or serial
    #[arg(long)]
    display: Option<DisplayMode>,
    /// Enable or disable user-mode networking
    #[arg(long)]
    network: Option<bool>,
}

impl VmOverrides {
    fn apply(&self, mut config: VmConfig) -> VmConfig {
        if let Some(cores) = self.cores {
            config.cores = cores;
        }
        if let Some(memory) = self.memory {
            config.memory_mb = memory;
        }
        if let Some(disk_size) = self.disk_size {
            config.disk_size_gb = disk_size;
        }
        if let Some(display) = self.display {
            config.display = display;
        }
        if let Some(network) = self.network {
            config.enable_network = network;
        }
        config
    }
}

/// Paths and settings resolved from the arguments.
struct Workspace {
    layout: ProjectLayout,
    vm_config_path: PathBuf,
    vm_dir: PathBuf,
    ui_config: UiConfig,
}

impl Workspace {
    fn resolve(args: &Args) -> Result<Self> {
        let layout = ProjectLayout::locate(args.project.as_deref())?;
        let vm_config_path = match &args.vm_config {
            Some(path) => path.clone(),
            None => VmConfig::default_path()?,
        };
        let vm_dir = match &args.vm_dir {
            Some(dir) => dir.clone(),
            None => VmImageStore::default_dir()?,
        };
        Ok(Self {
            layout,
            vm_config_path,
            vm_dir,
            ui_config: UiConfig::load(),
        })
    }

    fn runner(&self) -> ProcessRunner {
        ProcessRunner::new().with_grace_timeout(self.ui_config.grace_timeout())
    }

    fn launcher(&self) -> VmLauncher {
        VmLauncher::new(
            self.runner(),
            VmImageStore::new(self.vm_dir.clone()),
            self.layout.iso_file(),
        )
    }

    fn load_vm_config(&self) -> Result<VmConfig> {
        let (config, warnings) = VmConfig::load_from(&self.vm_config_path)?;
        for warning in warnings {
            eprintln!("Warning: {}: {warning}", self.vm_config_path.display());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let code = match args.command {
        None | Some(Command::Tui) => {
            init_logging(Some(&activity::data_dir()?.join("cyberos.log")))?;

            // Set up panic hook to ensure terminal is restored on panic
            let original_hook = panic::take_hook();
            panic::set_hook(Box::new(move |panic_info| {
                let _ = disable_raw_mode();
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                original_hook(panic_info);
            }));

            let result = run_tui(&args);

            let _ = panic::take_hook();
            result?;
            0
        }
        Some(_) => {
            init_logging(None)?;
            run_command(&args).await?
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Log to `file` when given, otherwise to stderr.
fn init_logging(file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    match file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory: {}", parent.display())
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

fn run_tui(args: &Args) -> Result<()> {
    let ctx = Workspace::resolve(args)?;
    let settings = AppSettings {
        layout: ctx.layout,
        vm_config_path: ctx.vm_config_path,
        vm_dir: ctx.vm_dir,
        log_dir: activity::default_log_dir()?,
        ui_config: ctx.ui_config,
        ui_config_path: UiConfig::config_path().ok(),
    };
    let mut app = App::new(settings);

    enable_raw_mode().context("Failed to enable raw mode for terminal")?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to setup terminal")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let mut event_reader = CrosstermEventReader;
    let run_result = run_app(&mut terminal, &mut app, &mut event_reader);

    // Restore terminal (always runs, even if run_app failed)
    let cleanup_result = cleanup_terminal(&mut terminal);

    if app.any_running() {
        eprintln!(
            "Stopping running processes (up to {}s)...",
            app.grace_timeout().as_secs()
        );
    }
    app.shutdown();

    run_result?;
    cleanup_result?;
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    event_reader: &mut dyn EventReader,
) -> Result<()> {
    loop {
        app.poll_jobs();

        terminal
            .draw(|f| ui::render(f, app))
            .context("Failed to draw terminal UI")?;

        let poll_timeout = if app.any_running() {
            Duration::from_millis(33)
        } else {
            Duration::from_millis(100)
        };

        if let Some(event) = event_reader.read_event(poll_timeout)? {
            handle_event(app, event);
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn handle_event(app: &mut App, event: Event) {
    if let Event::Key(key) = event {
        ui::handle_key(app, key);
    }
}

/// Clean up terminal state
fn cleanup_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("Failed to restore terminal")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

/// Headless subcommands. Returns the process exit code.
async fn run_command(args: &Args) -> Result<i32> {
    let ctx = Workspace::resolve(args)?;
    match &args.command {
        None | Some(Command::Tui) => Ok(0),
        Some(Command::Build) => run_task(&ctx, BuildTask::Build).await,
        Some(Command::Clean) => run_task(&ctx, BuildTask::Clean).await,
        Some(Command::Launch(overrides)) => launch(&ctx, overrides).await,
        Some(Command::Vms) => {
            let store = VmImageStore::new(ctx.vm_dir.clone());
            let vms = store.list()?;
            if vms.is_empty() {
                println!("No VMs found in {}", store.dir().display());
            }
            for vm in vms {
                println!("{}", vm.summary());
            }
            Ok(0)
        }
        Some(Command::Status) => {
            for line in ProjectStatus::collect(&ctx.layout).report_lines() {
                println!("{line}");
            }
            Ok(0)
        }
        Some(Command::Deps) => {
            let statuses = check_dependencies();
            for status in &statuses {
                println!("{}", status.line());
            }
            let missing = deps::missing(&statuses);
            if missing.is_empty() {
                println!("\nAll dependencies found.");
                Ok(0)
            } else {
                println!("\nMissing: {}", missing.join(", "));
                Ok(1)
            }
        }
        Some(Command::Config { action }) => match action {
            ConfigAction::Show => {
                let config = ctx.load_vm_config()?;
                println!("# {}", ctx.vm_config_path.display());
                print!("{}", config.to_file_string());
                Ok(0)
            }
            ConfigAction::Save(overrides) => {
                let config = overrides.apply(ctx.load_vm_config()?);
                config.validate()?;
                config.save_to(&ctx.vm_config_path)?;
                println!("Configuration saved to {}", ctx.vm_config_path.display());
                Ok(0)
            }
        },
    }
}

async fn run_task(ctx: &Workspace, task: BuildTask) -> Result<i32> {
    let spec = task.command(&ctx.layout)?;
    let runner = ctx.runner();
    println!("{task}: {}", spec.display());
    let handle = runner
        .start(&spec)
        .with_context(|| format!("Failed to start {task}"))?;

    let termination = supervise(handle, runner.grace_timeout()).await?;
    report_exit(&task.to_string(), termination)
}

async fn launch(ctx: &Workspace, overrides: &VmOverrides) -> Result<i32> {
    let launcher = ctx.launcher();
    launcher.preflight()?;

    let config = overrides.apply(ctx.load_vm_config()?);
    let plan = launcher.plan(&overrides.name, config)?;
    for line in plan.summary_lines() {
        println!("{line}");
    }

    let disk_launcher = launcher.clone();
    let disk_plan = plan.clone();
    tokio::task::spawn_blocking(move || {
        disk_launcher.ensure_disk(&disk_plan, |line| println!("{line}"))
    })
    .await
    .context("Disk image task failed")??;

    println!("Launching {}...", plan.name);
    let handle = launcher.start(&plan)?;
    let termination = supervise(handle, ctx.runner().grace_timeout()).await?;
    report_exit("VM", termination)
}

/// Print the merged output until the process ends. Ctrl-C stops it with
/// the grace timeout.
async fn supervise(handle: ProcessHandle, grace: Duration) -> Result<Termination> {
    let printer = handle.spawn_sink(|event| println!("{}", event.line));

    let waiter = handle.clone();
    let mut wait = tokio::task::spawn_blocking(move || waiter.wait());

    let termination = tokio::select! {
        result = &mut wait => result.context("Wait task failed")?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted, stopping PID {} (grace {}s)...", handle.pid(), grace.as_secs());
            let canceller = handle.clone();
            tokio::task::spawn_blocking(move || canceller.cancel(grace))
                .await
                .context("Cancel task failed")?;
            wait.await.context("Wait task failed")?
        }
    };

    let _ = tokio::task::spawn_blocking(move || printer.join()).await;
    Ok(termination)
}

fn report_exit(what: &str, termination: Termination) -> Result<i32> {
    if termination.success() {
        println!("✓ {what} complete");
        Ok(0)
    } else {
        eprintln!("✗ {what} failed ({})", describe(termination));
        Ok(termination.code().unwrap_or(1))
    }
}
