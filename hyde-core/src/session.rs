//! Session state and the menu state machine.
//!
//! The interactive loop owns exactly one [`Session`]. It is mutated only
//! between reading an input event and drawing the next frame.

use crate::log::LogBuffer;

/// What activating a menu entry does
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Patcher + installer extension lifecycle
    FreshInstall,
    /// Run a named script from the scripts directory
    RunScript { script: String },
}

/// A menu entry. Entries without an action are selectable but inert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuOption {
    pub label: String,
    pub action: Option<Action>,
}

impl MenuOption {
    pub fn new(label: impl Into<String>, action: Option<Action>) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }

    /// Label without its "1) " style ordinal
    pub fn name(&self) -> &str {
        match self.label.split_once(") ") {
            Some((ordinal, rest)) if ordinal.chars().all(|c| c.is_ascii_digit()) => rest,
            _ => &self.label,
        }
    }
}

/// Input events the menu understands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuEvent {
    Previous,
    Next,
    Activate,
    Quit,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Browsing,
    Running(Action),
    Terminal,
}

/// A pending text prompt surfaced by the render loop
#[derive(Clone, Debug, Default)]
pub struct Prompt {
    pub text: String,
    /// Hide typed characters (credentials)
    pub masked: bool,
    pub input: String,
}

impl Prompt {
    /// What the prompt line should show for the typed input
    pub fn display_input(&self) -> String {
        if self.masked {
            "*".repeat(self.input.chars().count())
        } else {
            self.input.clone()
        }
    }
}

pub fn next_index(index: usize, count: usize) -> usize {
    if count == 0 { 0 } else { (index + 1) % count }
}

pub fn previous_index(index: usize, count: usize) -> usize {
    if count == 0 {
        0
    } else {
        (index % count + count - 1) % count
    }
}

#[derive(Debug)]
pub struct Session {
    options: Vec<MenuOption>,
    selected: usize,
    pub log: LogBuffer,
    prompt: Option<Prompt>,
    mode: Mode,
}

impl Session {
    pub fn new(options: Vec<MenuOption>) -> Self {
        Self {
            options,
            selected: 0,
            log: LogBuffer::new(),
            prompt: None,
            mode: Mode::Browsing,
        }
    }

    pub fn options(&self) -> &[MenuOption] {
        &self.options
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn is_terminal(&self) -> bool {
        self.mode == Mode::Terminal
    }

    /// Apply one input event. Returns the action to perform when an entry
    /// with an action was activated; the session is then `Running` until
    /// [`Session::finish_action`] is called.
    pub fn handle(&mut self, event: MenuEvent) -> Option<Action> {
        if self.mode != Mode::Browsing {
            return None;
        }

        let count = self.options.len();
        match event {
            MenuEvent::Previous => {
                self.selected = previous_index(self.selected, count);
                None
            }
            MenuEvent::Next => {
                self.selected = next_index(self.selected, count);
                None
            }
            MenuEvent::Quit => {
                self.mode = Mode::Terminal;
                None
            }
            MenuEvent::Activate => {
                let option = self.options.get(self.selected)?;
                let name = option.name().to_string();
                match option.action.clone() {
                    Some(action) => {
                        let banner = match &action {
                            Action::FreshInstall => "Starting fresh installation...".to_string(),
                            Action::RunScript { .. } => format!("Starting {}...", name),
                        };
                        self.log.push(banner);
                        self.mode = Mode::Running(action.clone());
                        Some(action)
                    }
                    None => {
                        self.log.push(format!("{} is not available yet", name));
                        None
                    }
                }
            }
        }
    }

    /// Return to browsing after the running action completed
    pub fn finish_action(&mut self) {
        if matches!(self.mode, Mode::Running(_)) {
            self.mode = Mode::Browsing;
        }
    }

    pub fn prompt(&self) -> Option<&Prompt> {
        self.prompt.as_ref()
    }

    pub fn prompt_mut(&mut self) -> Option<&mut Prompt> {
        self.prompt.as_mut()
    }

    /// Ask the render loop to collect a line of text
    pub fn begin_prompt(&mut self, text: impl Into<String>, masked: bool) {
        self.prompt = Some(Prompt {
            text: text.into(),
            masked,
            input: String::new(),
        });
    }

    /// Clear the pending prompt, returning whatever was typed
    pub fn end_prompt(&mut self) -> Option<String> {
        self.prompt.take().map(|p| p.input)
    }
}
