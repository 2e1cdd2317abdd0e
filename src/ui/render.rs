use crate::project::{PROJECT_NAME, PROJECT_VERSION};
use crate::ui::app::{App, FormField, Modal, Slot, SlotState, Tab};
use crate::ui::jobs::JobOutcome;
use crate::ui::terminal_widget::ConsoleView;
use crate::ui::theme::Theme;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap},
    Frame,
};

pub fn render(frame: &mut Frame, app: &App) {
    let theme = app.theme;
    frame.render_widget(
        Block::default().style(Style::default().bg(theme.bg).fg(theme.fg)),
        frame.area(),
    );

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header + tabs
            Constraint::Min(0),    // Body
            Constraint::Length(1), // Footer
        ])
        .split(frame.area());

    render_header(frame, app, main_chunks[0]);

    match app.tab {
        Tab::Dashboard => render_dashboard(frame, app, main_chunks[1]),
        Tab::Build => render_build(frame, app, main_chunks[1]),
        Tab::Emulator => render_emulator(frame, app, main_chunks[1]),
        Tab::Vms => render_vms(frame, app, main_chunks[1]),
        Tab::Logs => render_logs(frame, app, main_chunks[1]),
    }

    render_footer(frame, app, main_chunks[2]);

    if let Some(modal) = &app.modal {
        render_modal(frame, theme, modal);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let theme = app.theme;
    let titles: Vec<Line> = Tab::ALL
        .iter()
        .enumerate()
        .map(|(i, tab)| Line::from(format!("{} {}", i + 1, tab.title())))
        .collect();

    let tabs = Tabs::new(titles)
        .select(app.tab.index())
        .style(Style::default().fg(theme.fg_dim))
        .highlight_style(
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.accent))
                .title(Span::styled(
                    format!(" {PROJECT_NAME} Control Center v{PROJECT_VERSION} "),
                    Style::default()
                        .fg(theme.accent)
                        .add_modifier(Modifier::BOLD),
                )),
        );

    frame.render_widget(tabs, area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let hints = match app.tab {
        Tab::Dashboard => "r refresh  o open folder  b build  l launch",
        Tab::Build => "b build  c clean  r rebuild  s stop  x clear  j/k scroll",
        Tab::Emulator if app.editing_name => "type name  Enter/Esc done",
        Tab::Emulator => "j/k field  h/l change  Enter edit name  L launch  s stop  w save",
        Tab::Vms => "Enter info  u use  d delete  o open folder  r refresh",
        Tab::Logs => "c clear  w save  j/k scroll",
    };
    let footer = Paragraph::new(Line::from(vec![
        Span::styled(format!(" {hints}"), Style::default().fg(app.theme.fg_dim)),
        Span::styled(
            "  |  Tab switch  t theme  ? help  q quit",
            Style::default().fg(app.theme.fg_dim),
        ),
    ]));
    frame.render_widget(footer, area);
}

fn panel<'a>(theme: &Theme, title: impl Into<Line<'a>>, focused: bool) -> Block<'a> {
    let color = if focused { theme.accent } else { theme.fg_dim };
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(color))
}

fn status_style(theme: &Theme, slot: &Slot) -> Style {
    let color = match (slot.state, slot.last_outcome()) {
        (SlotState::Running, _) => theme.secondary,
        (SlotState::Idle, Some(JobOutcome::Succeeded)) => theme.success,
        (SlotState::Idle, Some(JobOutcome::Failed)) => theme.error,
        (SlotState::Idle, _) => theme.fg_dim,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn slot_summary<'a>(theme: &Theme, slot: &'a Slot) -> Line<'a> {
    let pid = slot
        .handle()
        .map(|h| format!(" (PID {})", h.pid()))
        .unwrap_or_default();
    Line::from(vec![
        Span::styled(format!("{:9}", slot.kind.label()), Style::default().fg(theme.fg)),
        Span::styled(format!("{}{}", slot.status, pid), status_style(theme, slot)),
    ])
}

fn render_dashboard(frame: &mut Frame, app: &App, area: Rect) {
    let theme = app.theme;
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let status: Vec<Line> = app
        .status_lines
        .iter()
        .map(|line| {
            let color = if line.contains('✓') {
                theme.success
            } else if line.contains('✗') {
                theme.error
            } else {
                theme.fg
            };
            Line::from(Span::styled(line.as_str(), Style::default().fg(color)))
        })
        .collect();
    frame.render_widget(
        Paragraph::new(status)
            .block(panel(theme, " Project Status ", true))
            .wrap(Wrap { trim: false }),
        chunks[0],
    );

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0)])
        .split(chunks[1]);

    frame.render_widget(
        Paragraph::new(vec![
            slot_summary(theme, &app.build),
            slot_summary(theme, &app.emulator),
        ])
        .block(panel(theme, " Jobs ", false)),
        right[0],
    );

    let recent: Vec<Line> = app
        .activity
        .entries()
        .iter()
        .rev()
        .take(right[1].height.saturating_sub(2) as usize)
        .map(|entry| Line::from(entry.line()))
        .collect();
    frame.render_widget(
        Paragraph::new(recent)
            .style(Style::default().fg(theme.fg_dim))
            .block(panel(theme, " Recent Activity ", false))
            .wrap(Wrap { trim: true }),
        right[1],
    );
}

fn render_build(frame: &mut Frame, app: &App, area: Rect) {
    let theme = app.theme;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            app.build.status.as_str(),
            status_style(theme, &app.build),
        )))
        .block(panel(theme, " Build Status ", false)),
        chunks[0],
    );

    render_console(frame, app, &app.build, " Build Output ", chunks[1]);
}

fn render_console(frame: &mut Frame, app: &App, slot: &Slot, title: &str, area: Rect) {
    let theme = app.theme;
    let title = if slot.console.scroll_offset() > 0 {
        format!("{title}[+{} lines below] ", slot.console.scroll_offset())
    } else {
        title.to_string()
    };
    let block = panel(theme, title, slot.is_running());
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if slot.console.is_empty() {
        frame.render_widget(
            Paragraph::new("No output yet.").style(Style::default().fg(theme.fg_dim)),
            inner,
        );
    } else {
        frame.render_widget(
            ConsoleView::new(&slot.console).style(Style::default().fg(theme.fg)),
            inner,
        );
    }
}

fn render_emulator(frame: &mut Frame, app: &App, area: Rect) {
    let theme = app.theme;
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(44), Constraint::Min(0)])
        .split(area);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(0)])
        .split(columns[0]);

    let fields: Vec<ListItem> = FormField::ALL
        .iter()
        .map(|field| {
            let selected = *field == app.form_field;
            let mut value = app.field_value(*field);
            if selected && app.editing_name && *field == FormField::Name {
                value.push('▏');
            }
            let style = if selected {
                Style::default()
                    .fg(theme.bg)
                    .bg(theme.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.fg)
            };
            ListItem::new(format!(" {:15} {}", field.label(), value)).style(style)
        })
        .collect();
    frame.render_widget(
        List::new(fields).block(panel(theme, " VM Configuration ", !app.emulator.is_running())),
        left[0],
    );

    let mut status: Vec<Line> = vec![Line::from(Span::styled(
        app.emulator.status.as_str(),
        status_style(theme, &app.emulator),
    ))];
    status.extend(
        app.emulator
            .status_log
            .iter()
            .map(|line| Line::from(Span::styled(line.as_str(), Style::default().fg(theme.fg_dim)))),
    );
    frame.render_widget(
        Paragraph::new(status)
            .block(panel(theme, " Status ", false))
            .wrap(Wrap { trim: true }),
        left[1],
    );

    render_console(frame, app, &app.emulator, " VM Console ", columns[1]);
}

fn render_vms(frame: &mut Frame, app: &App, area: Rect) {
    let theme = app.theme;
    let title = format!(" VMs in {} ", app.launcher.store().dir().display());

    if app.vms.is_empty() {
        frame.render_widget(
            Paragraph::new("No VMs found. Launch one from the Emulator tab to create it.")
                .style(Style::default().fg(theme.fg_dim))
                .block(panel(theme, title, true)),
            area,
        );
        return;
    }

    let items: Vec<ListItem> = app
        .vms
        .iter()
        .enumerate()
        .map(|(i, vm)| {
            let style = if i == app.selected_vm {
                Style::default()
                    .fg(theme.fg)
                    .bg(theme.selection_bg)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(theme.fg)
            };
            ListItem::new(format!(" {}", vm.summary())).style(style)
        })
        .collect();
    frame.render_widget(List::new(items).block(panel(theme, title, true)), area);
}

fn render_logs(frame: &mut Frame, app: &App, area: Rect) {
    let theme = app.theme;
    let visible = area.height.saturating_sub(2) as usize;
    let entries = app.activity.entries();
    let end = entries.len().saturating_sub(app.log_scroll);
    let start = end.saturating_sub(visible);

    let lines: Vec<Line> = entries[start..end]
        .iter()
        .map(|entry| {
            Line::from(vec![
                Span::styled(
                    format!("[{}] ", entry.timestamp.format("%Y-%m-%d %H:%M:%S")),
                    Style::default().fg(theme.fg_dim),
                ),
                Span::styled(
                    format!("{}: ", entry.source),
                    Style::default().fg(theme.accent),
                ),
                Span::styled(entry.message.as_str(), Style::default().fg(theme.fg)),
            ])
        })
        .collect();

    let title = format!(" Activity Log ({} entries) ", entries.len());
    frame.render_widget(Paragraph::new(lines).block(panel(theme, title, true)), area);
}

fn render_modal(frame: &mut Frame, theme: &Theme, modal: &Modal) {
    let (title, lines, color) = match modal {
        Modal::Notice { title, lines } => (
            title.clone(),
            lines.iter().map(|l| Line::from(l.as_str())).collect::<Vec<_>>(),
            theme.accent,
        ),
        Modal::Confirm { prompt, .. } => (
            "Confirm".to_string(),
            vec![
                Line::from(prompt.as_str()),
                Line::from(""),
                Line::from(Span::styled("y = yes   n = no", Style::default().fg(theme.fg_dim))),
            ],
            theme.secondary,
        ),
        Modal::Help => (
            "Help".to_string(),
            help_lines().into_iter().map(Line::from).collect(),
            theme.accent,
        ),
    };

    let width = lines
        .iter()
        .map(Line::width)
        .max()
        .unwrap_or(0)
        .max(title.len())
        .saturating_add(4)
        .min(frame.area().width as usize) as u16;
    let height = (lines.len() as u16)
        .saturating_add(2)
        .min(frame.area().height);
    let area = centered_rect(width, height, frame.area());

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines)
            .style(Style::default().bg(theme.bg).fg(theme.fg))
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" {title} "))
                    .border_style(Style::default().fg(color)),
            ),
        area,
    );
}

fn help_lines() -> Vec<&'static str> {
    vec![
        "Tab / Shift+Tab / 1-5   switch tab",
        "t                       next theme",
        "q                       quit",
        "",
        "Dashboard  r refresh, o open folder, b build, l launch",
        "Build      b build, c clean, r rebuild, s stop, x clear",
        "Emulator   j/k field, h/l change, Enter edit name,",
        "           L launch, s stop, w save configuration",
        "VMs        Enter info, u use, d delete, o open folder",
        "Logs       c clear, w save to file",
        "",
        "Esc closes this window",
    ]
}

/// A `width` x `height` rectangle centered in `area`.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
