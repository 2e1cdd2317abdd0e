use crate::activity::ActivityLog;
use crate::process::{ProcessHandle, ProcessRunner};
use crate::project::{open_in_file_manager, BuildTask, ProjectLayout, ProjectStatus};
use crate::ui::config::UiConfig;
use crate::ui::jobs::{spawn_build_job, spawn_vm_job, JobEvent, JobOutcome};
use crate::ui::terminal_widget::ConsoleBuffer;
use crate::ui::theme::Theme;
use crate::vm::{
    validate_vm_name, DisplayMode, VmConfig, VmImage, VmImageStore, VmLauncher, CORES_RANGE,
    DEFAULT_VM_NAME, DISK_SIZE_RANGE_GB, MEMORY_RANGE_MB,
};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Dashboard,
    Build,
    Emulator,
    Vms,
    Logs,
}

impl Tab {
    pub const ALL: [Tab; 5] = [Tab::Dashboard, Tab::Build, Tab::Emulator, Tab::Vms, Tab::Logs];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Dashboard => "Dashboard",
            Tab::Build => "Build",
            Tab::Emulator => "Emulator",
            Tab::Vms => "VMs",
            Tab::Logs => "Logs",
        }
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn previous(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// A place in the UI where at most one job runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Build,
    Emulator,
}

impl SlotKind {
    pub fn label(self) -> &'static str {
        match self {
            SlotKind::Build => "Build",
            SlotKind::Emulator => "Emulator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Running,
}

/// Job state and output of one slot.
#[derive(Debug)]
pub struct Slot {
    pub kind: SlotKind,
    pub state: SlotState,
    pub status: String,
    /// Progress messages (pre-flight, disk creation, launch).
    pub status_log: Vec<String>,
    pub console: ConsoleBuffer,
    handle: Option<ProcessHandle>,
    events: Option<Receiver<JobEvent>>,
    stop_requested: bool,
    last_outcome: Option<JobOutcome>,
}

impl Slot {
    fn new(kind: SlotKind) -> Self {
        Self {
            kind,
            state: SlotState::Idle,
            status: "Ready".to_string(),
            status_log: Vec::new(),
            console: ConsoleBuffer::new(),
            handle: None,
            events: None,
            stop_requested: false,
            last_outcome: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SlotState::Running
    }

    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.handle.as_ref()
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn last_outcome(&self) -> Option<JobOutcome> {
        self.last_outcome
    }

    fn begin(&mut self, events: Receiver<JobEvent>, status: &str) {
        self.state = SlotState::Running;
        self.events = Some(events);
        self.handle = None;
        self.stop_requested = false;
        self.last_outcome = None;
        self.status = status.to_string();
        self.status_log.clear();
        self.console.clear();
    }

    fn finish(&mut self, outcome: Option<JobOutcome>, status: String) {
        self.state = SlotState::Idle;
        self.events = None;
        self.handle = None;
        self.stop_requested = false;
        self.last_outcome = outcome;
        self.status = status;
    }

    /// Everything queued so far, without blocking.
    fn drain(&mut self) -> Vec<JobEvent> {
        let mut drained = Vec::new();
        let Some(rx) = &self.events else {
            return drained;
        };
        loop {
            match rx.try_recv() {
                Ok(event) => drained.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Worker ended without a terminal event.
                    if !drained.iter().any(JobEvent::is_terminal) {
                        drained.push(JobEvent::Error(format!(
                            "{} job ended unexpectedly",
                            self.kind.label()
                        )));
                    }
                    break;
                }
            }
        }
        drained
    }
}

/// Editable fields on the Emulator tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Cores,
    Memory,
    DiskSize,
    Display,
    Network,
}

impl FormField {
    pub const ALL: [FormField; 6] = [
        FormField::Name,
        FormField::Cores,
        FormField::Memory,
        FormField::DiskSize,
        FormField::Display,
        FormField::Network,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FormField::Name => "VM Name",
            FormField::Cores => "CPU Cores",
            FormField::Memory => "RAM (MB)",
            FormField::DiskSize => "Disk Size (GB)",
            FormField::Display => "Display",
            FormField::Network => "Networking",
        }
    }
}

pub const MEMORY_STEP_MB: u32 = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    Quit,
    DeleteVm(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    Notice { title: String, lines: Vec<String> },
    Confirm { action: ConfirmAction, prompt: String },
    Help,
}

/// Where the application keeps its files and which project it manages.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub layout: ProjectLayout,
    pub vm_config_path: PathBuf,
    pub vm_dir: PathBuf,
    pub log_dir: PathBuf,
    pub ui_config: UiConfig,
    /// `None` keeps theme changes in memory only.
    pub ui_config_path: Option<PathBuf>,
}

pub struct App {
    pub tab: Tab,
    pub theme: &'static Theme,
    pub ui_config: UiConfig,
    ui_config_path: Option<PathBuf>,

    pub layout: ProjectLayout,
    runner: ProcessRunner,
    pub launcher: VmLauncher,

    pub vm_config: VmConfig,
    pub vm_config_path: PathBuf,
    pub vm_name: String,
    pub form_field: FormField,
    pub editing_name: bool,

    pub build: Slot,
    pub emulator: Slot,

    pub activity: ActivityLog,
    log_dir: PathBuf,
    pub log_scroll: usize,

    pub status_lines: Vec<String>,
    pub vms: Vec<VmImage>,
    pub selected_vm: usize,

    pub modal: Option<Modal>,
    pub should_quit: bool,
}

impl App {
    pub fn new(settings: AppSettings) -> Self {
        let runner = ProcessRunner::new().with_grace_timeout(settings.ui_config.grace_timeout());
        let launcher = VmLauncher::new(
            runner.clone(),
            VmImageStore::new(settings.vm_dir),
            settings.layout.iso_file(),
        );

        let mut activity = ActivityLog::new();
        let vm_config = match VmConfig::load_from(&settings.vm_config_path) {
            Ok((config, warnings)) => {
                for warning in warnings {
                    activity.record("Emulator", format!("Config warning: {warning}"));
                }
                config
            }
            Err(err) => {
                activity.record("Emulator", format!("Using default VM config: {err:#}"));
                VmConfig::default()
            }
        };

        let mut app = Self {
            tab: Tab::Dashboard,
            theme: Theme::resolve(&settings.ui_config.theme),
            ui_config: settings.ui_config,
            ui_config_path: settings.ui_config_path,
            layout: settings.layout,
            runner,
            launcher,
            vm_config,
            vm_config_path: settings.vm_config_path,
            vm_name: DEFAULT_VM_NAME.to_string(),
            form_field: FormField::Name,
            editing_name: false,
            build: Slot::new(SlotKind::Build),
            emulator: Slot::new(SlotKind::Emulator),
            activity,
            log_dir: settings.log_dir,
            log_scroll: 0,
            status_lines: Vec::new(),
            vms: Vec::new(),
            selected_vm: 0,
            modal: None,
            should_quit: false,
        };
        app.activity.record("System", "Control center started");
        app.refresh_status();
        app.refresh_vms();
        app
    }

    pub fn slot(&self, kind: SlotKind) -> &Slot {
        match kind {
            SlotKind::Build => &self.build,
            SlotKind::Emulator => &self.emulator,
        }
    }

    fn slot_mut(&mut self, kind: SlotKind) -> &mut Slot {
        match kind {
            SlotKind::Build => &mut self.build,
            SlotKind::Emulator => &mut self.emulator,
        }
    }

    pub fn any_running(&self) -> bool {
        self.build.is_running() || self.emulator.is_running()
    }

    pub fn grace_timeout(&self) -> Duration {
        self.runner.grace_timeout()
    }

    // -- Tabs, theme, modals --

    pub fn next_tab(&mut self) {
        self.tab = self.tab.next();
    }

    pub fn previous_tab(&mut self) {
        self.tab = self.tab.previous();
    }

    pub fn select_tab(&mut self, index: usize) {
        if let Some(tab) = Tab::ALL.get(index) {
            self.tab = *tab;
        }
    }

    /// Switch to the next built-in theme and persist the choice.
    pub fn cycle_theme(&mut self) {
        self.theme = self.theme.next();
        self.ui_config.theme = self.theme.name.to_string();
        if let Some(path) = &self.ui_config_path {
            if let Err(err) = self.ui_config.save_to(path) {
                tracing::warn!(error = %format!("{err:#}"), "Failed to save UI config");
            }
        }
    }

    pub fn notice(&mut self, title: impl Into<String>, lines: Vec<String>) {
        self.modal = Some(Modal::Notice {
            title: title.into(),
            lines,
        });
    }

    fn report_error(&mut self, source: &str, title: &str, err: &anyhow::Error) {
        let message = format!("{err:#}");
        self.activity.record(source, format!("{title}: {message}"));
        self.notice(title, message.lines().map(str::to_string).collect());
    }

    pub fn dismiss_modal(&mut self) {
        self.modal = None;
    }

    pub fn show_help(&mut self) {
        self.modal = Some(Modal::Help);
    }

    /// Quit right away when idle, otherwise ask first.
    pub fn request_quit(&mut self) {
        if self.any_running() {
            self.modal = Some(Modal::Confirm {
                action: ConfirmAction::Quit,
                prompt: "A build or VM is still running. Stop it and quit?".to_string(),
            });
        } else {
            self.should_quit = true;
        }
    }

    pub fn confirm(&mut self) {
        let Some(Modal::Confirm { action, .. }) = self.modal.take() else {
            return;
        };
        match action {
            ConfirmAction::Quit => self.should_quit = true,
            ConfirmAction::DeleteVm(name) => self.delete_vm(&name),
        }
    }

    // -- Dashboard --

    pub fn refresh_status(&mut self) {
        let status = ProjectStatus::collect(&self.layout);
        let missing = crate::project::deps::missing(&status.dependencies);
        self.status_lines = status.report_lines();
        if missing.is_empty() {
            self.activity.record("System", "All dependencies found");
        } else {
            self.activity
                .record("System", format!("Missing dependencies: {}", missing.join(", ")));
        }
    }

    pub fn open_project_folder(&mut self) {
        let root = self.layout.root().to_path_buf();
        match open_in_file_manager(&root) {
            Ok(()) => self
                .activity
                .record("System", format!("Opened {}", root.display())),
            Err(err) => self.report_error("System", "Failed to open folder", &err),
        }
    }

    // -- Build slot --

    pub fn start_build(&mut self) {
        self.start_build_tasks(vec![BuildTask::Build], "Building...");
    }

    pub fn start_clean(&mut self) {
        self.start_build_tasks(vec![BuildTask::Clean], "Cleaning...");
    }

    pub fn start_rebuild(&mut self) {
        self.start_build_tasks(vec![BuildTask::Clean, BuildTask::Build], "Rebuilding...");
    }

    fn start_build_tasks(&mut self, tasks: Vec<BuildTask>, status: &str) {
        if self.build.is_running() {
            self.notice(
                "Build",
                vec!["A build is already in progress.".to_string()],
            );
            return;
        }
        let events = spawn_build_job(self.runner.clone(), self.layout.clone(), tasks);
        self.build.begin(events, status);
        self.activity.record("Build", status);
    }

    // -- Emulator slot --

    pub fn launch_vm(&mut self) {
        if self.emulator.is_running() {
            self.notice("Emulator", vec!["A VM is already running.".to_string()]);
            return;
        }
        if let Err(err) = validate_vm_name(&self.vm_name) {
            self.report_error("Emulator", "Invalid VM name", &err);
            return;
        }
        let events = spawn_vm_job(self.launcher.clone(), self.vm_name.clone(), self.vm_config);
        self.emulator.begin(events, "Starting...");
        self.activity
            .record("Emulator", format!("Launching VM '{}'", self.vm_name));
    }

    pub fn save_vm_config(&mut self) {
        let result = self
            .vm_config
            .validate()
            .and_then(|()| self.vm_config.save_to(&self.vm_config_path));
        match result {
            Ok(()) => {
                let message = format!("Configuration saved to {}", self.vm_config_path.display());
                self.activity.record("Emulator", message.clone());
                self.emulator.status_log.push(message);
            }
            Err(err) => self.report_error("Emulator", "Failed to save configuration", &err),
        }
    }

    pub fn next_field(&mut self) {
        let i = FormField::ALL.iter().position(|f| *f == self.form_field).unwrap_or(0);
        self.form_field = FormField::ALL[(i + 1) % FormField::ALL.len()];
    }

    pub fn previous_field(&mut self) {
        let i = FormField::ALL.iter().position(|f| *f == self.form_field).unwrap_or(0);
        self.form_field = FormField::ALL[(i + FormField::ALL.len() - 1) % FormField::ALL.len()];
    }

    /// Step the selected field up (`true`) or down, clamped to its range.
    pub fn adjust_field(&mut self, increase: bool) {
        let config = &mut self.vm_config;
        match self.form_field {
            FormField::Name => {}
            FormField::Cores => config.cores = step(config.cores, 1, increase, &CORES_RANGE),
            FormField::Memory => {
                config.memory_mb = step(config.memory_mb, MEMORY_STEP_MB, increase, &MEMORY_RANGE_MB);
            }
            FormField::DiskSize => {
                config.disk_size_gb = step(config.disk_size_gb, 1, increase, &DISK_SIZE_RANGE_GB);
            }
            FormField::Display => {
                config.display = if increase {
                    config.display.next()
                } else {
                    config.display.previous()
                };
            }
            FormField::Network => config.enable_network = !config.enable_network,
        }
    }

    pub fn field_value(&self, field: FormField) -> String {
        let config = &self.vm_config;
        match field {
            FormField::Name => self.vm_name.clone(),
            FormField::Cores => config.cores.to_string(),
            FormField::Memory => config.memory_mb.to_string(),
            FormField::DiskSize => config.disk_size_gb.to_string(),
            FormField::Display => display_label(config.display),
            FormField::Network => {
                let state = if config.enable_network {
                    "Enabled"
                } else {
                    "Disabled"
                };
                state.to_string()
            }
        }
    }

    pub fn start_editing_name(&mut self) {
        if self.form_field == FormField::Name {
            self.editing_name = true;
        }
    }

    pub fn stop_editing_name(&mut self) {
        self.editing_name = false;
        if self.vm_name.trim().is_empty() {
            self.vm_name = DEFAULT_VM_NAME.to_string();
        }
    }

    pub fn name_push_char(&mut self, c: char) {
        if self.vm_name.chars().count() < 64 {
            self.vm_name.push(c);
        }
    }

    pub fn name_pop_char(&mut self) {
        self.vm_name.pop();
    }

    // -- Stopping --

    /// Ask the slot's process to terminate, escalating after the grace
    /// timeout. Runs on a helper thread so the UI keeps drawing.
    pub fn stop_slot(&mut self, kind: SlotKind) {
        let grace = self.grace_timeout();
        let label = kind.label();
        let slot = self.slot_mut(kind);
        if !slot.is_running() || slot.stop_requested {
            return;
        }
        let Some(handle) = slot.handle.clone() else {
            self.notice(
                label,
                vec!["Nothing to stop yet; the process has not started.".to_string()],
            );
            return;
        };
        slot.stop_requested = true;
        slot.status = "Stopping...".to_string();
        let pid = handle.pid();
        thread::spawn(move || handle.cancel(grace));
        self.activity
            .record(label, format!("Stop requested (PID: {pid})"));
    }

    /// Cancel every running process and wait for them, used on exit.
    pub fn shutdown(&mut self) {
        let grace = self.grace_timeout();
        let handles: Vec<ProcessHandle> = [&self.build, &self.emulator]
            .into_iter()
            .filter_map(|slot| slot.handle.clone())
            .filter(ProcessHandle::is_alive)
            .collect();
        let workers: Vec<_> = handles
            .into_iter()
            .map(|handle| thread::spawn(move || handle.cancel(grace)))
            .collect();
        for worker in workers {
            let _ = worker.join();
        }
        self.poll_jobs();
    }

    // -- Job events --

    /// Apply everything the background jobs reported since the last tick.
    pub fn poll_jobs(&mut self) {
        for kind in [SlotKind::Build, SlotKind::Emulator] {
            let events = self.slot_mut(kind).drain();
            for event in events {
                self.apply_event(kind, event);
            }
        }
    }

    fn apply_event(&mut self, kind: SlotKind, event: JobEvent) {
        let label = kind.label();
        match event {
            JobEvent::Status(message) => {
                self.activity.record(label, message.clone());
                let slot = self.slot_mut(kind);
                slot.status_log.push(message.clone());
                slot.status = message;
            }
            JobEvent::Output(line) => self.slot_mut(kind).console.push_line(&line),
            JobEvent::Started(handle) => {
                let pid = handle.pid();
                let command = handle.command_line().join(" ");
                self.activity
                    .record(label, format!("Started: {command} (PID: {pid})"));
                // A stop that landed between two processes of one job applies
                // to the next one as well.
                if self.slot(kind).stop_requested {
                    let grace = self.grace_timeout();
                    let pending = handle.clone();
                    thread::spawn(move || pending.cancel(grace));
                    self.activity
                        .record(label, format!("Stop requested (PID: {pid})"));
                }
                self.slot_mut(kind).handle = Some(handle);
            }
            JobEvent::Error(message) => {
                self.slot_mut(kind)
                    .finish(Some(JobOutcome::Failed), format!("✗ {label} failed"));
                self.activity.record(label, format!("Error: {message}"));
                self.notice(
                    format!("{label} failed"),
                    message.lines().map(str::to_string).collect(),
                );
            }
            JobEvent::Finished { outcome, message } => {
                self.activity.record(label, message.clone());
                let slot = self.slot_mut(kind);
                slot.status_log.push(message.clone());
                slot.finish(Some(outcome), message);
                match kind {
                    SlotKind::Build => self.refresh_status(),
                    SlotKind::Emulator => self.refresh_vms(),
                }
            }
        }
    }

    // -- VM manager --

    pub fn refresh_vms(&mut self) {
        match self.launcher.store().list() {
            Ok(vms) => self.vms = vms,
            Err(err) => {
                self.vms.clear();
                self.report_error("VMs", "Failed to list VMs", &err);
            }
        }
        if self.selected_vm >= self.vms.len() {
            self.selected_vm = self.vms.len().saturating_sub(1);
        }
    }

    pub fn selected_vm(&self) -> Option<&VmImage> {
        self.vms.get(self.selected_vm)
    }

    pub fn next_vm(&mut self) {
        if !self.vms.is_empty() {
            self.selected_vm = (self.selected_vm + 1) % self.vms.len();
        }
    }

    pub fn previous_vm(&mut self) {
        if !self.vms.is_empty() {
            self.selected_vm = (self.selected_vm + self.vms.len() - 1) % self.vms.len();
        }
    }

    pub fn show_vm_info(&mut self) {
        if let Some(vm) = self.selected_vm() {
            let title = format!("VM Info: {}", vm.name);
            let lines = vm.info_lines();
            self.notice(title, lines);
        }
    }

    pub fn request_delete_vm(&mut self) {
        let Some(vm) = self.selected_vm() else {
            return;
        };
        let name = vm.name.clone();
        if self.emulator.is_running() && name == self.vm_name {
            self.notice(
                "VMs",
                vec![format!("'{name}' is running; stop it before deleting.")],
            );
            return;
        }
        self.modal = Some(Modal::Confirm {
            prompt: format!("Delete VM '{name}'? This cannot be undone."),
            action: ConfirmAction::DeleteVm(name),
        });
    }

    fn delete_vm(&mut self, name: &str) {
        match self.launcher.store().delete(name) {
            Ok(()) => self.activity.record("VMs", format!("Deleted VM '{name}'")),
            Err(err) => self.report_error("VMs", "Failed to delete VM", &err),
        }
        self.refresh_vms();
    }

    /// Use the selected image's name for the next launch.
    pub fn use_selected_vm(&mut self) {
        if let Some(name) = self.selected_vm().map(|vm| vm.name.clone()) {
            self.vm_name = name;
            self.tab = Tab::Emulator;
        }
    }

    pub fn open_vm_folder(&mut self) {
        let result = self
            .launcher
            .store()
            .ensure_exists()
            .and_then(|()| open_in_file_manager(self.launcher.store().dir()));
        match result {
            Ok(()) => self.activity.record(
                "VMs",
                format!("Opened {}", self.launcher.store().dir().display()),
            ),
            Err(err) => self.report_error("VMs", "Failed to open folder", &err),
        }
    }

    // -- Activity log --

    pub fn clear_activity(&mut self) {
        self.activity.clear();
        self.log_scroll = 0;
        self.activity.record("System", "Logs cleared");
    }

    pub fn save_activity(&mut self) -> Result<PathBuf> {
        let path = self.activity.save_in(&self.log_dir)?;
        self.activity
            .record("System", format!("Logs saved to {}", path.display()));
        Ok(path)
    }

    pub fn save_activity_with_notice(&mut self) {
        match self.save_activity() {
            Ok(path) => self.notice("Logs", vec![format!("Saved to {}", path.display())]),
            Err(err) => self.report_error("System", "Failed to save logs", &err),
        }
    }

    pub fn scroll_log_up(&mut self, lines: usize) {
        self.log_scroll = (self.log_scroll + lines).min(self.activity.len().saturating_sub(1));
    }

    pub fn scroll_log_down(&mut self, lines: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(lines);
    }
}

fn step(value: u32, amount: u32, increase: bool, range: &std::ops::RangeInclusive<u32>) -> u32 {
    let next = if increase {
        value.saturating_add(amount)
    } else {
        value.saturating_sub(amount)
    };
    next.clamp(*range.start(), *range.end())
}

fn display_label(mode: DisplayMode) -> String {
    format!("{} ({})", mode.as_str(), mode.description())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_cycle() {
        assert_eq!(Tab::Dashboard.next(), Tab::Build);
        assert_eq!(Tab::Logs.next(), Tab::Dashboard);
        assert_eq!(Tab::Dashboard.previous(), Tab::Logs);
        assert_eq!(Tab::Vms.index(), 3);
    }

    #[test]
    fn test_step_clamps() {
        assert_eq!(step(16, 1, true, &CORES_RANGE), 16);
        assert_eq!(step(1, 1, false, &CORES_RANGE), 1);
        assert_eq!(step(512, 128, true, &MEMORY_RANGE_MB), 640);
        assert_eq!(step(128, 128, false, &MEMORY_RANGE_MB), 128);
        assert_eq!(step(0, 1, false, &DISK_SIZE_RANGE_GB), 1);
    }

    #[test]
    fn test_form_field_labels_unique() {
        let mut labels: Vec<&str> = FormField::ALL.iter().map(|f| f.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), FormField::ALL.len());
    }
}
