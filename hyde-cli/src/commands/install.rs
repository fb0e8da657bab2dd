use std::io::{self, Write};

use async_trait::async_trait;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};

use hyde_core::config::HydeConfig;
use hyde_core::extension::ExtensionProvider;
use hyde_core::lifecycle::{Console, ModulePaths, run_fresh_install};

use super::print_line;

/// Console on the plain terminal: lines go to stdout, prompts read keys
/// in raw mode so credentials are never echoed.
struct StdioConsole;

#[async_trait]
impl Console for StdioConsole {
    fn log(&mut self, line: &str) {
        print_line(line);
    }

    async fn prompt(&mut self, text: &str, masked: bool) -> Option<String> {
        let text = text.to_string();
        tokio::task::spawn_blocking(move || read_line(&text, masked))
            .await
            .ok()
            .and_then(Result::ok)
            .flatten()
    }
}

fn read_line(text: &str, masked: bool) -> io::Result<Option<String>> {
    print!("{}", text);
    io::stdout().flush()?;

    enable_raw_mode()?;
    let input = read_keys(masked);
    disable_raw_mode()?;
    println!();
    input
}

fn read_keys(masked: bool) -> io::Result<Option<String>> {
    let mut input = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(Some(input)),
            KeyCode::Esc => return Ok(None),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(None),
            KeyCode::Backspace => {
                if input.pop().is_some() && !masked {
                    print!("\x08 \x08");
                    io::stdout().flush()?;
                }
            }
            KeyCode::Char(c) => {
                input.push(c);
                if !masked {
                    print!("{}", c);
                    io::stdout().flush()?;
                }
            }
            _ => {}
        }
    }
}

/// Run the fresh-install flow on the plain terminal. Returns whether it
/// completed.
pub async fn run_install(config: &HydeConfig, provider: &dyn ExtensionProvider) -> bool {
    let patcher = config.patcher_module();
    let installer = config.installer_module();
    let paths = ModulePaths {
        patcher: &patcher,
        installer: &installer,
    };

    println!("Starting fresh installation...");
    run_fresh_install(provider, paths, &mut StdioConsole)
        .await
        .is_ok()
}
