//! # Key Bindings
//!
//! ### Everywhere
//! - `q` - Quit (asks first while a build or VM is running)
//! - `Tab` / `Shift+Tab`, `1`-`5` - Switch tab
//! - `t` - Next theme
//! - `?` - Help
//!
//! ### Dashboard
//! - `r` - Refresh status, `o` - Open project folder
//! - `b` - Build, `l` - Launch VM
//!
//! ### Build
//! - `b` build, `c` clean, `r` rebuild, `s` stop, `x` clear output
//! - `j`/`k`, `PgUp`/`PgDn`, `g`/`G` - Scroll output
//!
//! ### Emulator
//! - `j`/`k` - Select field, `h`/`l` or `Left`/`Right` - Change value
//! - `Enter` on the name field - Edit name
//! - `L` launch, `s` stop, `w` save configuration, `PgUp`/`PgDn` scroll
//!
//! ### VMs
//! - `j`/`k` select, `Enter`/`i` info, `u` use for launch
//! - `d` delete, `o` open folder, `r` refresh
//!
//! ### Logs
//! - `j`/`k` scroll, `c` clear, `w` save to file

use crate::ui::app::{App, FormField, Modal, SlotKind, Tab};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

const PAGE: usize = 10;

pub fn handle_key(app: &mut App, key: KeyEvent) {
    if key.kind == KeyEventKind::Release {
        return;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.request_quit();
        return;
    }

    if app.modal.is_some() {
        handle_modal_key(app, key);
        return;
    }

    if app.editing_name {
        match key.code {
            KeyCode::Enter | KeyCode::Esc => app.stop_editing_name(),
            KeyCode::Backspace => app.name_pop_char(),
            KeyCode::Char(c) => app.name_push_char(c),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Char('q') => {
            app.request_quit();
            return;
        }
        KeyCode::Tab => {
            app.next_tab();
            return;
        }
        KeyCode::BackTab => {
            app.previous_tab();
            return;
        }
        KeyCode::Char(c @ '1'..='5') => {
            app.select_tab(c as usize - '1' as usize);
            return;
        }
        KeyCode::Char('t') => {
            app.cycle_theme();
            return;
        }
        KeyCode::Char('?') => {
            app.show_help();
            return;
        }
        _ => {}
    }

    match app.tab {
        Tab::Dashboard => handle_dashboard_key(app, key),
        Tab::Build => handle_build_key(app, key),
        Tab::Emulator => handle_emulator_key(app, key),
        Tab::Vms => handle_vms_key(app, key),
        Tab::Logs => handle_logs_key(app, key),
    }
}

fn handle_modal_key(app: &mut App, key: KeyEvent) {
    match app.modal {
        Some(Modal::Confirm { .. }) => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => app.confirm(),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.dismiss_modal(),
            _ => {}
        },
        Some(Modal::Notice { .. }) | Some(Modal::Help) => match key.code {
            KeyCode::Enter | KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') => {
                app.dismiss_modal();
            }
            _ => {}
        },
        None => {}
    }
}

fn handle_dashboard_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('r') => app.refresh_status(),
        KeyCode::Char('o') => app.open_project_folder(),
        KeyCode::Char('b') => {
            app.start_build();
            app.tab = Tab::Build;
        }
        KeyCode::Char('l') => {
            app.launch_vm();
            app.tab = Tab::Emulator;
        }
        _ => {}
    }
}

fn handle_build_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('b') => app.start_build(),
        KeyCode::Char('c') => app.start_clean(),
        KeyCode::Char('r') => app.start_rebuild(),
        KeyCode::Char('s') => app.stop_slot(SlotKind::Build),
        KeyCode::Char('x') => app.build.console.clear(),
        KeyCode::Char('k') | KeyCode::Up => app.build.console.scroll_up(1),
        KeyCode::Char('j') | KeyCode::Down => app.build.console.scroll_down(1),
        KeyCode::PageUp => app.build.console.scroll_up(PAGE),
        KeyCode::PageDown => app.build.console.scroll_down(PAGE),
        KeyCode::Char('g') | KeyCode::Home => app.build.console.scroll_to_top(),
        KeyCode::Char('G') | KeyCode::End => app.build.console.scroll_to_bottom(),
        _ => {}
    }
}

fn handle_emulator_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.next_field(),
        KeyCode::Char('k') | KeyCode::Up => app.previous_field(),
        KeyCode::Char('l') | KeyCode::Right | KeyCode::Char('+') => app.adjust_field(true),
        KeyCode::Char('h') | KeyCode::Left | KeyCode::Char('-') => app.adjust_field(false),
        KeyCode::Enter if app.form_field == FormField::Name => app.start_editing_name(),
        KeyCode::Char('L') => app.launch_vm(),
        KeyCode::Char('s') => app.stop_slot(SlotKind::Emulator),
        KeyCode::Char('w') => app.save_vm_config(),
        KeyCode::PageUp => app.emulator.console.scroll_up(PAGE),
        KeyCode::PageDown => app.emulator.console.scroll_down(PAGE),
        KeyCode::End => app.emulator.console.scroll_to_bottom(),
        _ => {}
    }
}

fn handle_vms_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.next_vm(),
        KeyCode::Char('k') | KeyCode::Up => app.previous_vm(),
        KeyCode::Enter | KeyCode::Char('i') => app.show_vm_info(),
        KeyCode::Char('u') => app.use_selected_vm(),
        KeyCode::Char('d') | KeyCode::Delete => app.request_delete_vm(),
        KeyCode::Char('o') => app.open_vm_folder(),
        KeyCode::Char('r') => app.refresh_vms(),
        _ => {}
    }
}

fn handle_logs_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('k') | KeyCode::Up => app.scroll_log_up(1),
        KeyCode::Char('j') | KeyCode::Down => app.scroll_log_down(1),
        KeyCode::PageUp => app.scroll_log_up(PAGE),
        KeyCode::PageDown => app.scroll_log_down(PAGE),
        KeyCode::Char('c') => app.clear_activity(),
        KeyCode::Char('w') => app.save_activity_with_notice(),
        _ => {}
    }
}
