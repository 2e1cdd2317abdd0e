//! Application state tests
//!
//! Slot lifecycle, the emulator form, the VM manager and the activity log,
//! driven through the public `App` API.

use cyberos::project::ProjectLayout;
use cyberos::ui::app::{ConfirmAction, FormField, Modal, SlotState, Tab};
use cyberos::ui::config::UiConfig;
use cyberos::ui::{App, AppSettings};
use cyberos::vm::{DisplayMode, VmConfig};
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn create_test_app(temp_dir: &TempDir) -> App {
    App::new(AppSettings {
        layout: ProjectLayout::locate(Some(temp_dir.path())).unwrap(),
        vm_config_path: temp_dir.path().join("vm.conf"),
        vm_dir: temp_dir.path().join("vms"),
        log_dir: temp_dir.path().join("logs"),
        ui_config: UiConfig::default(),
        ui_config_path: None,
    })
}

/// Poll until the build slot goes idle.
fn wait_for_build(app: &mut App) {
    let deadline = Instant::now() + Duration::from_secs(20);
    while app.build.state == SlotState::Running {
        assert!(Instant::now() < deadline, "build did not finish");
        app.poll_jobs();
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_initial_state() {
    let temp_dir = TempDir::new().unwrap();
    let app = create_test_app(&temp_dir);

    assert_eq!(app.tab, Tab::Dashboard);
    assert_eq!(app.build.state, SlotState::Idle);
    assert_eq!(app.emulator.state, SlotState::Idle);
    assert_eq!(app.vm_config, VmConfig::default());
    assert!(app.vms.is_empty());
    assert!(app.modal.is_none());
    assert!(!app.should_quit);
    assert!(app
        .status_lines
        .iter()
        .any(|line| line.contains("ISO Not Built")));
}

#[test]
fn test_loads_vm_config_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("vm.conf"),
        "CORES=4\nMEMORY=1024\nbogus line\n",
    )
    .unwrap();

    let app = create_test_app(&temp_dir);
    assert_eq!(app.vm_config.cores, 4);
    assert_eq!(app.vm_config.memory_mb, 1024);
    assert!(app
        .activity
        .entries()
        .iter()
        .any(|e| e.message.starts_with("Config warning")));
}

#[cfg(unix)]
#[test]
fn test_build_slot_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("scripts")).unwrap();
    fs::write(
        temp_dir.path().join("scripts/build.sh"),
        "#!/bin/sh\necho step one\necho step two\n",
    )
    .unwrap();

    let mut app = create_test_app(&temp_dir);
    app.start_build();
    assert_eq!(app.build.state, SlotState::Running);

    // A second start while running is refused and does not spawn anything.
    app.start_build();
    assert!(matches!(app.modal, Some(Modal::Notice { .. })));
    app.dismiss_modal();

    wait_for_build(&mut app);
    assert_eq!(app.build.status, "✓ Build complete");
    let output: Vec<&str> = app.build.console.lines().collect();
    assert_eq!(output, vec!["step one", "step two"]);
    assert!(app.build.handle().is_none());
}

#[test]
fn test_missing_build_script_shows_notice() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = create_test_app(&temp_dir);
    app.start_build();
    wait_for_build(&mut app);

    assert_eq!(app.build.status, "✗ Build failed");
    match &app.modal {
        Some(Modal::Notice { title, lines }) => {
            assert_eq!(title, "Build failed");
            assert!(lines.iter().any(|l| l.contains("Build script not found")));
        }
        other => panic!("expected notice, got {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn test_stop_running_build() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("scripts")).unwrap();
    fs::write(
        temp_dir.path().join("scripts/build.sh"),
        "#!/bin/sh\necho started\nsleep 30\n",
    )
    .unwrap();

    let mut app = create_test_app(&temp_dir);
    app.start_build();

    let deadline = Instant::now() + Duration::from_secs(10);
    while app.build.handle().is_none() {
        assert!(Instant::now() < deadline, "build never started");
        app.poll_jobs();
        std::thread::sleep(Duration::from_millis(20));
    }

    app.stop_slot(cyberos::ui::app::SlotKind::Build);
    assert!(app.build.stop_requested());
    assert_eq!(app.build.status, "Stopping...");

    wait_for_build(&mut app);
    assert_eq!(app.build.status, "Build stopped by user");
}

#[cfg(unix)]
#[test]
fn test_stop_between_rebuild_tasks_stops_build() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("scripts")).unwrap();
    fs::write(
        temp_dir.path().join("scripts/clean.sh"),
        "#!/bin/sh\necho cleaning\nsleep 0.5\n",
    )
    .unwrap();
    fs::write(
        temp_dir.path().join("scripts/build.sh"),
        "#!/bin/sh\necho building\nsleep 30\n",
    )
    .unwrap();

    let mut app = create_test_app(&temp_dir);
    app.start_rebuild();

    let deadline = Instant::now() + Duration::from_secs(10);
    while app.build.handle().is_none() {
        assert!(Instant::now() < deadline, "clean never started");
        app.poll_jobs();
        std::thread::sleep(Duration::from_millis(20));
    }
    let clean = app.build.handle().unwrap().clone();
    assert!(clean.command_line()[0].ends_with("clean.sh"));

    // Stop lands after clean exited but before the build is reported.
    clean.wait();
    app.stop_slot(cyberos::ui::app::SlotKind::Build);
    assert!(app.build.stop_requested());

    wait_for_build(&mut app);
    assert_eq!(app.build.status, "Build stopped by user");
}

#[test]
fn test_emulator_form_adjustments() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = create_test_app(&temp_dir);

    assert_eq!(app.form_field, FormField::Name);
    app.next_field();
    assert_eq!(app.form_field, FormField::Cores);
    app.adjust_field(true);
    assert_eq!(app.vm_config.cores, 3);
    for _ in 0..40 {
        app.adjust_field(true);
    }
    assert_eq!(app.vm_config.cores, 16);

    app.next_field();
    app.adjust_field(false);
    assert_eq!(app.vm_config.memory_mb, 384);

    app.next_field();
    app.next_field();
    assert_eq!(app.form_field, FormField::Display);
    app.adjust_field(true);
    assert_eq!(app.vm_config.display, DisplayMode::Vnc);
    assert!(app.field_value(FormField::Display).starts_with("vnc"));

    app.next_field();
    app.adjust_field(true);
    assert!(app.vm_config.enable_network);
    assert_eq!(app.field_value(FormField::Network), "Enabled");

    app.next_field();
    assert_eq!(app.form_field, FormField::Name);
}

#[test]
fn test_name_editing() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = create_test_app(&temp_dir);

    app.start_editing_name();
    assert!(app.editing_name);
    for _ in 0..app.vm_name.len() {
        app.name_pop_char();
    }
    app.stop_editing_name();
    assert_eq!(app.vm_name, "CyberOS-VM", "empty name falls back to default");

    app.start_editing_name();
    app.name_push_char('2');
    app.stop_editing_name();
    assert_eq!(app.vm_name, "CyberOS-VM2");
}

#[test]
fn test_invalid_vm_name_blocks_launch() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = create_test_app(&temp_dir);
    app.vm_name = "../escape".to_string();
    app.launch_vm();

    assert_eq!(app.emulator.state, SlotState::Idle);
    assert!(matches!(app.modal, Some(Modal::Notice { ref title, .. }) if title == "Invalid VM name"));
}

#[test]
fn test_save_vm_config() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = create_test_app(&temp_dir);
    app.vm_config.cores = 4;
    app.vm_config.display = DisplayMode::Serial;
    app.save_vm_config();

    let (saved, warnings) = VmConfig::load_from(&temp_dir.path().join("vm.conf")).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(saved, app.vm_config);
}

#[test]
fn test_vm_manager_delete_flow() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("vms")).unwrap();
    fs::write(temp_dir.path().join("vms/alpha.qcow2"), b"a").unwrap();
    fs::write(temp_dir.path().join("vms/beta.qcow2"), b"b").unwrap();

    let mut app = create_test_app(&temp_dir);
    assert_eq!(app.vms.len(), 2);
    app.next_vm();
    assert_eq!(app.selected_vm().map(|vm| vm.name.as_str()), Some("beta"));

    app.request_delete_vm();
    assert!(matches!(
        app.modal,
        Some(Modal::Confirm { action: ConfirmAction::DeleteVm(ref name), .. }) if name == "beta"
    ));
    app.confirm();

    assert!(app.modal.is_none());
    assert_eq!(app.vms.len(), 1);
    assert_eq!(app.selected_vm, 0);
    assert!(!temp_dir.path().join("vms/beta.qcow2").exists());
}

#[test]
fn test_use_selected_vm() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("vms")).unwrap();
    fs::write(temp_dir.path().join("vms/devbox.qcow2"), b"a").unwrap();

    let mut app = create_test_app(&temp_dir);
    app.tab = Tab::Vms;
    app.use_selected_vm();
    assert_eq!(app.vm_name, "devbox");
    assert_eq!(app.tab, Tab::Emulator);
}

#[test]
fn test_activity_clear_and_save() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = create_test_app(&temp_dir);
    assert!(!app.activity.is_empty());

    app.clear_activity();
    assert_eq!(app.activity.len(), 1, "only the 'Logs cleared' entry remains");

    let path = app.save_activity().unwrap();
    assert!(path.starts_with(temp_dir.path().join("logs")));
    let content = fs::read_to_string(path).unwrap();
    assert!(content.contains("System: Logs cleared"));
}

#[test]
fn test_quit_when_idle() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = create_test_app(&temp_dir);
    app.request_quit();
    assert!(app.should_quit);
    assert!(app.modal.is_none());
}

#[test]
fn test_cycle_theme_without_persisting() {
    let temp_dir = TempDir::new().unwrap();
    let mut app = create_test_app(&temp_dir);
    let first = app.theme.name;
    app.cycle_theme();
    assert_ne!(app.theme.name, first);
    assert_eq!(app.ui_config.theme, app.theme.name);
}
