//! Frame drawing for the interactive console.
//!
//! Layout, top to bottom: logo, session log, menu | system info, key help.

pub mod theme;

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use hyde_core::session::{Mode, Prompt, Session};

pub use theme::styles;

const LOGO: [&str; 6] = [
    "        .",
    "       / \\         _       _  _      ___  ___",
    "      /^  \\      _| |_    | || |_  _|   \\| __|",
    "     /  _  \\    |_   _|   | __ | || | |) | _|",
    "    /  | | ~\\     |_|     |_||_|\\_, |___/|___|",
    "   /.-'   '-.\\                  |__/",
];

const LOGO_HEIGHT: u16 = 9;
const BOTTOM_HEIGHT: u16 = 17;
const HELP_HEIGHT: u16 = 3;

pub const HELP_TEXT: &str = "<Q> : quit || <Arrow-Keys> : navigate || <Enter> : continue";
const PROMPT_HELP_TEXT: &str = "<Enter> : submit || <Esc> : cancel";
const BUSY_TEXT: &str = "Working... output streams into the log";

/// Everything one frame shows
pub struct Screen<'a> {
    pub session: &'a Session,
    pub system_info: &'a [String],
    pub welcome: &'a str,
}

pub fn draw(f: &mut Frame, screen: &Screen) {
    let area = f.area();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(LOGO_HEIGHT),
            Constraint::Min(3),
            Constraint::Length(BOTTOM_HEIGHT),
            Constraint::Length(HELP_HEIGHT),
        ])
        .split(area);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[2]);

    draw_logo(f, rows[0]);
    draw_log(f, rows[1], screen.session);
    draw_menu(f, bottom[0], screen.session, screen.welcome);
    draw_system_info(f, bottom[1], screen.system_info);
    draw_help(f, rows[3], screen.session);

    if let Some(prompt) = screen.session.prompt() {
        draw_prompt(f, area, prompt);
    }
}

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border())
        .title(Span::styled(title, styles::title()))
}

fn draw_logo(f: &mut Frame, area: Rect) {
    // Pad to a common width so centring keeps the art aligned
    let width = LOGO.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let lines: Vec<Line> = LOGO
        .iter()
        .map(|l| Line::from(Span::styled(format!("{:<width$}", l), styles::accent())))
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let top = inner.height.saturating_sub(LOGO.len() as u16) / 2;
    let logo_area = Rect {
        y: inner.y + top,
        height: inner.height.saturating_sub(top),
        ..inner
    };
    f.render_widget(Paragraph::new(lines).alignment(Alignment::Center), logo_area);
}

fn draw_log(f: &mut Frame, area: Rect, session: &Session) {
    let block = panel(" Log ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let lines: Vec<Line> = session
        .log
        .visible(inner.height as usize)
        .map(|(text, severity)| Line::from(Span::styled(text.to_string(), styles::severity(severity))))
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_menu(f: &mut Frame, area: Rect, session: &Session, welcome: &str) {
    let block = panel(" Menu ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let mut lines = vec![
        Line::from(Span::styled(welcome.to_string(), styles::success())).alignment(Alignment::Center),
        Line::default(),
    ];
    for (i, option) in session.options().iter().enumerate() {
        let style = if i == session.selected() {
            styles::selection()
        } else {
            styles::text()
        };
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(option.label.clone(), style),
        ]));
    }
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_system_info(f: &mut Frame, area: Rect, system_info: &[String]) {
    let block = panel(" System ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let lines: Vec<Line> = if system_info.is_empty() {
        vec![Line::from(Span::styled("Gathering system info...", styles::text_dim()))]
    } else {
        system_info
            .iter()
            .map(|l| Line::from(Span::styled(l.clone(), styles::text())))
            .collect()
    };
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_help(f: &mut Frame, area: Rect, session: &Session) {
    let (text, style) = if session.prompt().is_some() {
        (PROMPT_HELP_TEXT, styles::key_hint())
    } else if matches!(session.mode(), Mode::Running(_)) {
        (BUSY_TEXT, styles::text_dim())
    } else {
        (HELP_TEXT, styles::key_hint())
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border());
    f.render_widget(
        Paragraph::new(Span::styled(text, style))
            .alignment(Alignment::Center)
            .block(block),
        area,
    );
}

fn draw_prompt(f: &mut Frame, area: Rect, prompt: &Prompt) {
    let width = (prompt.text.chars().count() as u16 + 24)
        .max(40)
        .min(area.width);
    let height = 3.min(area.height);
    let rect = Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    };

    f.render_widget(Clear, rect);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_focused())
        .title(Span::styled(" Input ", styles::title()));

    let line = Line::from(vec![
        Span::styled(prompt.text.clone(), styles::text()),
        Span::styled(prompt.display_input(), styles::accent()),
        Span::styled("_", styles::text_dim()),
    ]);
    f.render_widget(Paragraph::new(line).block(block), rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyde_core::session::{Action, MenuOption};
    use ratatui::{Terminal, backend::TestBackend};

    fn session() -> Session {
        Session::new(vec![
            MenuOption::new("1) Fresh Install", Some(Action::FreshInstall)),
            MenuOption::new("4) Editor", None),
        ])
    }

    fn render(session: &Session) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        let system_info = vec!["OS: Arch Linux".to_string()];
        terminal
            .draw(|f| {
                draw(
                    f,
                    &Screen {
                        session,
                        system_info: &system_info,
                        welcome: "Welcome, ada",
                    },
                )
            })
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_draws_all_panels() {
        let mut session = session();
        session.log.push("hello from the log");
        let screen = render(&session);

        assert!(screen.contains("hello from the log"));
        assert!(screen.contains("Welcome, ada"));
        assert!(screen.contains("1) Fresh Install"));
        assert!(screen.contains("OS: Arch Linux"));
        assert!(screen.contains(HELP_TEXT));
        assert!(screen.contains("|_||_|"));
    }

    #[test]
    fn test_masked_prompt_hides_input() {
        let mut session = session();
        session.begin_prompt("Enter sudo password: ", true);
        if let Some(prompt) = session.prompt_mut() {
            prompt.input.push_str("hunter2");
        }
        let screen = render(&session);

        assert!(screen.contains("Enter sudo password: *******"));
        assert!(!screen.contains("hunter2"));
        assert!(screen.contains(PROMPT_HELP_TEXT));
    }
}
