//! # Console Widget
//!
//! Build and emulator output is kept as raw lines and drawn through a `vt100`
//! virtual terminal so ANSI colors and carriage-return progress bars from the
//! scripts and QEMU render the way they would in a real terminal.
//!
//! ## Scrollback
//!
//! `scroll_offset` counts lines from the bottom (0 = follow new output). On
//! every frame only the visible window is parsed into a screen sized to the
//! widget area, so resizing never loses history.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::Widget,
};
use std::collections::VecDeque;

/// Lines kept per console before the oldest are dropped.
pub const MAX_CONSOLE_LINES: usize = 10_000;

fn vt100_color_to_ratatui(color: vt100::Color) -> Option<Color> {
    match color {
        vt100::Color::Default => None,
        vt100::Color::Idx(idx) => Some(Color::Indexed(idx)),
        vt100::Color::Rgb(r, g, b) => Some(Color::Rgb(r, g, b)),
    }
}

/// Output of one slot, owned by the UI thread.
#[derive(Debug, Clone, Default)]
pub struct ConsoleBuffer {
    lines: VecDeque<String>,
    scroll_offset: usize,
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) {
        self.lines.push_back(line.to_string());
        if self.lines.len() > MAX_CONSOLE_LINES {
            self.lines.pop_front();
        }
        // Keep the view anchored on the same lines while scrolled back.
        if self.scroll_offset > 0 {
            self.scroll_offset = (self.scroll_offset + 1).min(self.max_scroll());
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.scroll_offset = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = (self.scroll_offset + lines).min(self.max_scroll());
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = self.max_scroll();
    }

    fn max_scroll(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }

    /// The `height` lines ending `scroll_offset` lines above the bottom.
    fn window(&self, height: usize) -> impl Iterator<Item = &str> {
        let end = self.lines.len().saturating_sub(self.scroll_offset);
        let start = end.saturating_sub(height);
        self.lines.range(start..end).map(String::as_str)
    }
}

/// Draws a [`ConsoleBuffer`] at its current scroll position.
pub struct ConsoleView<'a> {
    console: &'a ConsoleBuffer,
    base_style: Style,
}

impl<'a> ConsoleView<'a> {
    pub fn new(console: &'a ConsoleBuffer) -> Self {
        Self {
            console,
            base_style: Style::default(),
        }
    }

    /// Style for cells that use the terminal's default colors.
    pub fn style(mut self, style: Style) -> Self {
        self.base_style = style;
        self
    }
}

impl Widget for ConsoleView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let mut parser = vt100::Parser::new(area.height, area.width, 0);
        for (i, line) in self.console.window(area.height as usize).enumerate() {
            if i > 0 {
                parser.process(b"\r\n");
            }
            parser.process(line.as_bytes());
        }

        let screen = parser.screen();
        for y in 0..area.height {
            for x in 0..area.width {
                let Some(cell) = screen.cell(y, x) else {
                    continue;
                };
                let contents = cell.contents();
                let ch = if contents.is_empty() { " " } else { contents };

                let mut style = self.base_style;
                if let Some(fg) = vt100_color_to_ratatui(cell.fgcolor()) {
                    style = style.fg(fg);
                }
                if let Some(bg) = vt100_color_to_ratatui(cell.bgcolor()) {
                    style = style.bg(bg);
                }
                if cell.bold() {
                    style = style.add_modifier(Modifier::BOLD);
                }
                if cell.italic() {
                    style = style.add_modifier(Modifier::ITALIC);
                }
                if cell.underline() {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                if cell.inverse() {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                buf.set_string(area.x + x, area.y + y, ch, style);
            }
        }
    }
}
