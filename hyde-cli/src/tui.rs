//! The interactive console: terminal setup, the event loop, and the bridge
//! between running actions and the session.
//!
//! Actions run on their own task. They report back over channels: log
//! lines on one, prompt requests (answered through a oneshot) on the
//! other. The loop drains both between frames, so the display keeps
//! redrawing while a script or an extension step is still working.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use hyde_core::config::HydeConfig;
use hyde_core::extension::ExtensionProvider;
use hyde_core::lifecycle::{Console, ModulePaths, run_fresh_install};
use hyde_core::session::{Action, MenuEvent, Session};

use crate::actions;
use crate::runner::CommandRunner;
use crate::sysinfo_panel;
use crate::ui::{self, Screen};

const TICK: Duration = Duration::from_millis(50);

// --- Terminal setup/teardown ---
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Map a key to a menu event
pub fn menu_event(code: KeyCode) -> Option<MenuEvent> {
    match code {
        KeyCode::Up | KeyCode::Left => Some(MenuEvent::Previous),
        KeyCode::Down | KeyCode::Right => Some(MenuEvent::Next),
        KeyCode::Enter => Some(MenuEvent::Activate),
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(MenuEvent::Quit),
        _ => None,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PromptKey {
    Editing,
    Submitted(String),
    Cancelled,
}

/// Apply one key to the pending prompt
fn edit_prompt(session: &mut Session, key: KeyEvent) -> PromptKey {
    match key.code {
        KeyCode::Enter => PromptKey::Submitted(session.end_prompt().unwrap_or_default()),
        KeyCode::Esc => {
            session.end_prompt();
            PromptKey::Cancelled
        }
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            session.end_prompt();
            PromptKey::Cancelled
        }
        KeyCode::Backspace => {
            if let Some(prompt) = session.prompt_mut() {
                prompt.input.pop();
            }
            PromptKey::Editing
        }
        KeyCode::Char(c) => {
            if let Some(prompt) = session.prompt_mut() {
                prompt.input.push(c);
            }
            PromptKey::Editing
        }
        _ => PromptKey::Editing,
    }
}

struct PromptRequest {
    text: String,
    masked: bool,
    reply: oneshot::Sender<Option<String>>,
}

/// Console handed to the lifecycle task
struct ChannelConsole {
    lines: mpsc::UnboundedSender<String>,
    prompts: mpsc::UnboundedSender<PromptRequest>,
}

#[async_trait]
impl Console for ChannelConsole {
    fn log(&mut self, line: &str) {
        let _ = self.lines.send(line.to_string());
    }

    async fn prompt(&mut self, text: &str, masked: bool) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        self.prompts
            .send(PromptRequest {
                text: text.to_string(),
                masked,
                reply,
            })
            .ok()?;
        answer.await.ok().flatten()
    }
}

/// An action in flight
struct RunningAction {
    lines: mpsc::UnboundedReceiver<String>,
    prompts: mpsc::UnboundedReceiver<PromptRequest>,
    reply: Option<oneshot::Sender<Option<String>>>,
    task: JoinHandle<()>,
}

impl RunningAction {
    /// Move whatever the task produced into the session
    fn pump(&mut self, session: &mut Session) {
        session
            .log
            .extend(std::iter::from_fn(|| self.lines.try_recv().ok()));
        if self.reply.is_none() {
            if let Ok(request) = self.prompts.try_recv() {
                session.begin_prompt(request.text, request.masked);
                self.reply = Some(request.reply);
            }
        }
    }

    fn answer(&mut self, answer: Option<String>) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(answer);
        }
    }

    async fn finish(mut self, session: &mut Session) {
        self.pump(session);
        session.end_prompt();
        if let Err(e) = (&mut self.task).await {
            tracing::error!(error = %e, "action task failed");
            session.log.push(format!("Error: action aborted: {}", e));
        }
        session.finish_action();
    }
}

struct App {
    session: Session,
    system_info: Vec<String>,
    welcome: String,
    config: HydeConfig,
    provider: Arc<dyn ExtensionProvider>,
    runner: CommandRunner,
}

impl App {
    fn start(&self, action: Action) -> RunningAction {
        let (line_tx, lines) = mpsc::unbounded_channel();
        let (prompt_tx, prompts) = mpsc::unbounded_channel();

        let task = match action {
            Action::RunScript { script } => {
                let path = self.config.script_path(&script);
                let timeout = self.config.timeouts.default_timeout();
                let runner = self.runner.clone();
                tokio::spawn(async move {
                    actions::run_script(&runner, &path, timeout, &line_tx).await;
                })
            }
            Action::FreshInstall => {
                let provider = Arc::clone(&self.provider);
                let patcher: PathBuf = self.config.patcher_module();
                let installer: PathBuf = self.config.installer_module();
                tokio::spawn(async move {
                    let mut console = ChannelConsole {
                        lines: line_tx,
                        prompts: prompt_tx,
                    };
                    let paths = ModulePaths {
                        patcher: &patcher,
                        installer: &installer,
                    };
                    // Failures are already on the console
                    let _ = run_fresh_install(provider.as_ref(), paths, &mut console).await;
                })
            }
        };

        RunningAction {
            lines,
            prompts,
            reply: None,
            task,
        }
    }
}

/// Run the interactive console until the user quits
pub async fn run_tui(config: HydeConfig, provider: Arc<dyn ExtensionProvider>) -> Result<()> {
    let options = config.menu_options()?;
    let runner = CommandRunner::new();

    let (info_tx, info_rx) = oneshot::channel();
    {
        let runner = runner.clone();
        let command = config.sysinfo_command.clone();
        let limit = config.sysinfo_lines;
        tokio::spawn(async move {
            let _ = info_tx.send(sysinfo_panel::panel_lines(&runner, &command, limit).await);
        });
    }

    let mut app = App {
        session: Session::new(options),
        system_info: Vec::new(),
        welcome: sysinfo_panel::welcome_line(),
        config,
        provider,
        runner,
    };

    tracing::info!(provider = app.provider.name(), "starting console");
    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, &mut app, info_rx).await;
    restore_terminal(terminal)?;
    tracing::info!("console closed");
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut info_rx: oneshot::Receiver<Vec<String>>,
) -> Result<()> {
    let mut running: Option<RunningAction> = None;

    loop {
        if let Some(run) = running.as_mut() {
            run.pump(&mut app.session);
            if run.task.is_finished() {
                if let Some(run) = running.take() {
                    run.finish(&mut app.session).await;
                }
            }
        }

        if let Ok(lines) = info_rx.try_recv() {
            app.system_info = lines;
        }

        terminal.draw(|f| {
            ui::draw(
                f,
                &Screen {
                    session: &app.session,
                    system_info: &app.system_info,
                    welcome: &app.welcome,
                },
            )
        })?;

        if app.session.is_terminal() {
            break;
        }

        // Let the runtime make progress on the action task between polls
        if !event::poll(TICK)? {
            tokio::task::yield_now().await;
            continue;
        }

        let CEvent::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if app.session.prompt().is_some() {
            let answer = match edit_prompt(&mut app.session, key) {
                PromptKey::Editing => continue,
                PromptKey::Submitted(input) => Some(input),
                PromptKey::Cancelled => None,
            };
            if let Some(run) = running.as_mut() {
                run.answer(answer);
            }
            continue;
        }

        let Some(event) = menu_event(key.code) else {
            continue;
        };
        if let Some(action) = app.session.handle(event) {
            tracing::info!(?action, "action started");
            running = Some(app.start(action));
        }
    }

    Ok(())
}
