mod doctor;
mod install;
mod run;

pub use doctor::run_doctor;
pub use install::run_install;
pub use run::run_script;

use hyde_core::log::{Severity, classify};

/// Print a session log line to stdout, errors in red
fn print_line(line: &str) {
    match classify(line) {
        Severity::Error => println!("\x1b[31m{}\x1b[0m", line),
        Severity::Normal => println!("{}", line),
    }
}
