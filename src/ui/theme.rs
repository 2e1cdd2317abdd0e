//! # Themes
//!
//! Rendering code takes colors from the active [`Theme`] instead of
//! hardcoding them. `t` cycles through the built-in themes and the choice is
//! persisted in [`crate::ui::config::UiConfig`].

use ratatui::style::Color;

/// Colors used by the control center, grouped by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,

    pub bg: Color,
    pub fg: Color,
    /// Hints, separators, idle status.
    pub fg_dim: Color,

    /// Brand, focused borders, selected tab.
    pub accent: Color,
    /// Running jobs, highlighted values.
    pub secondary: Color,

    pub success: Color,
    pub error: Color,

    /// Background of the selected list row.
    pub selection_bg: Color,
}

impl Theme {
    pub fn all() -> &'static [Theme] {
        &BUILT_IN_THEMES
    }

    /// Case-insensitive lookup.
    pub fn by_name(name: &str) -> Option<&'static Theme> {
        BUILT_IN_THEMES
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Lookup that falls back to the default theme.
    pub fn resolve(name: &str) -> &'static Theme {
        Self::by_name(name).unwrap_or_else(Self::default_theme)
    }

    pub fn default_theme() -> &'static Theme {
        &BUILT_IN_THEMES[0]
    }

    /// The theme after `self` in display order, wrapping around.
    pub fn next(&self) -> &'static Theme {
        let index = BUILT_IN_THEMES
            .iter()
            .position(|t| t.name == self.name)
            .map_or(0, |i| (i + 1) % BUILT_IN_THEMES.len());
        &BUILT_IN_THEMES[index]
    }
}

static BUILT_IN_THEMES: [Theme; 4] = [
    Theme {
        name: "Catppuccin Mocha",
        bg: Color::Rgb(30, 30, 46),
        fg: Color::Rgb(205, 214, 244),
        fg_dim: Color::Rgb(108, 112, 134),
        accent: Color::Rgb(137, 180, 250),
        secondary: Color::Rgb(249, 226, 175),
        success: Color::Rgb(166, 227, 161),
        error: Color::Rgb(243, 139, 168),
        selection_bg: Color::Rgb(69, 71, 90),
    },
    // Closest to the green-on-black look of the desktop control center.
    Theme {
        name: "Terminal Green",
        bg: Color::Rgb(10, 14, 10),
        fg: Color::Rgb(0, 255, 0),
        fg_dim: Color::Rgb(0, 136, 0),
        accent: Color::Rgb(0, 255, 136),
        secondary: Color::Rgb(255, 170, 0),
        success: Color::Rgb(0, 255, 0),
        error: Color::Rgb(255, 68, 68),
        selection_bg: Color::Rgb(26, 51, 26),
    },
    Theme {
        name: "Nord",
        bg: Color::Rgb(46, 52, 64),
        fg: Color::Rgb(216, 222, 233),
        fg_dim: Color::Rgb(76, 86, 106),
        accent: Color::Rgb(136, 192, 208),
        secondary: Color::Rgb(235, 203, 139),
        success: Color::Rgb(163, 190, 140),
        error: Color::Rgb(191, 97, 106),
        selection_bg: Color::Rgb(67, 76, 94),
    },
    Theme {
        name: "Gruvbox Dark",
        bg: Color::Rgb(40, 40, 40),
        fg: Color::Rgb(235, 219, 178),
        fg_dim: Color::Rgb(146, 131, 116),
        accent: Color::Rgb(131, 165, 152),
        secondary: Color::Rgb(250, 189, 47),
        success: Color::Rgb(184, 187, 38),
        error: Color::Rgb(251, 73, 52),
        selection_bg: Color::Rgb(80, 73, 69),
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_mocha() {
        assert_eq!(Theme::default_theme().name, "Catppuccin Mocha");
    }

    #[test]
    fn test_by_name_case_insensitive() {
        assert!(Theme::by_name("catppuccin mocha").is_some());
        assert!(Theme::by_name("NORD").is_some());
        assert!(Theme::by_name("nonexistent").is_none());
        assert_eq!(Theme::resolve("nonexistent").name, "Catppuccin Mocha");
    }

    #[test]
    fn test_next_wraps() {
        let mut theme = Theme::default_theme();
        for _ in 0..Theme::all().len() {
            theme = theme.next();
        }
        assert_eq!(theme.name, Theme::default_theme().name);
        assert_eq!(Theme::default_theme().next().name, "Terminal Green");
    }

    #[test]
    fn test_all_themes_have_distinct_names() {
        let names: Vec<&str> = Theme::all().iter().map(|t| t.name).collect();
        let mut unique = names.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(names.len(), unique.len(), "duplicate theme names found");
    }
}
