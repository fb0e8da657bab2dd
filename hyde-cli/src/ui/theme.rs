//! Colour palette and style helpers for the console.
//!
//! Backgrounds stay `Color::Reset` so the terminal's own (often
//! transparent) background shows through.

use ratatui::style::{Color, Modifier, Style};

use hyde_core::log::Severity;

/// Color palette tokens for the theme
#[derive(Clone, Debug)]
pub struct Palette {
    /// Primary text color
    pub text: Color,
    /// Dimmed text (hints, placeholders)
    pub text_dim: Color,
    /// Logo and panel titles
    pub accent: Color,
    /// Selected menu entry
    pub selection: Color,
    pub success: Color,
    pub error: Color,
    /// Panel border color
    pub border: Color,
    /// Key hint text
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::terminal()
    }
}

impl Palette {
    /// The terminal's own 16-colour set
    pub fn terminal() -> Self {
        Self {
            text: Color::White,
            text_dim: Color::DarkGray,
            accent: Color::Cyan,
            selection: Color::Yellow,
            success: Color::Green,
            error: Color::Red,
            border: Color::Reset,
            key_hint: Color::Yellow,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    /// Style for one log line
    pub fn severity_style(&self, severity: Severity) -> Style {
        match severity {
            Severity::Normal => self.text_style(),
            Severity::Error => Style::default().fg(self.palette.error),
        }
    }

    pub fn selection_style(&self) -> Style {
        Style::default()
            .fg(self.palette.selection)
            .add_modifier(Modifier::REVERSED)
    }

    pub fn text_style(&self) -> Style {
        Style::default().fg(self.palette.text)
    }

    pub fn text_dim_style(&self) -> Style {
        Style::default().fg(self.palette.text_dim)
    }

    pub fn accent_style(&self) -> Style {
        Style::default().fg(self.palette.accent)
    }

    pub fn title_style(&self) -> Style {
        Style::default()
            .fg(self.palette.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn success_style(&self) -> Style {
        Style::default().fg(self.palette.success)
    }

    pub fn border_style(&self) -> Style {
        Style::default().fg(self.palette.border)
    }

    pub fn focused_border_style(&self) -> Style {
        Style::default().fg(self.palette.accent)
    }

    pub fn key_hint_style(&self) -> Style {
        Style::default().fg(self.palette.key_hint)
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

/// Get the default theme
pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}

/// Convenience wrappers around the default theme
pub mod styles {
    use super::*;

    pub fn severity(severity: Severity) -> Style {
        theme().severity_style(severity)
    }

    pub fn selection() -> Style {
        theme().selection_style()
    }

    pub fn text() -> Style {
        theme().text_style()
    }

    pub fn text_dim() -> Style {
        theme().text_dim_style()
    }

    pub fn accent() -> Style {
        theme().accent_style()
    }

    pub fn title() -> Style {
        theme().title_style()
    }

    pub fn success() -> Style {
        theme().success_style()
    }

    pub fn border() -> Style {
        theme().border_style()
    }

    pub fn border_focused() -> Style {
        theme().focused_border_style()
    }

    pub fn key_hint() -> Style {
        theme().key_hint_style()
    }
}
