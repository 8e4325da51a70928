//! Colored output helpers for the CLI.
//!
//! Provides consistent, colored terminal output for the Delve CLI.

use crate::events::ResearchEvent;
use owo_colors::OwoColorize;
use std::io::{self, Write};

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print the Delve banner
    pub fn banner(&self) {
        if self.colored {
            println!(
                r#"
   {}
   {}
   {}
   {}
"#,
                " ___  ____ _    _  _ ____".bright_cyan().bold(),
                " |  \\ |___ |    |  | |___".bright_cyan().bold(),
                " |__/ |___ |___  \\/  |___".cyan().bold(),
                "".blue().bold(),
            );
            println!(
                "   {} {}\n",
                "Agentic Deep-Research Engine".bright_white().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
            );
        } else {
            println!(
                r#"
 ___  ____ _    _  _ ____
 |  \ |___ |    |  | |___
 |__/ |___ |___  \/  |___
"#
            );
            println!(
                "   Agentic Deep-Research Engine v{}\n",
                env!("CARGO_PKG_VERSION")
            );
        }
    }

    /// Render one orchestration event as a status line. Report tokens are
    /// streamed raw to stdout instead.
    pub fn event(&self, event: &ResearchEvent) {
        match event {
            ResearchEvent::StageTransitioned { to, .. } => {
                self.status(&format!("stage: {}", to));
            }
            ResearchEvent::ClarificationRequested { question } => {
                self.question(question);
            }
            ResearchEvent::UnitStarted {
                round,
                unit,
                instructions,
            } => {
                self.status(&format!(
                    "round {} unit {} started: {}",
                    round,
                    unit,
                    truncate(instructions, 80)
                ));
            }
            ResearchEvent::UnitFinished {
                round,
                unit,
                note_count,
                duration_ms,
                failed,
            } => {
                if *failed {
                    self.warn(&format!(
                        "round {} unit {} failed after {}ms",
                        round, unit, duration_ms
                    ));
                } else {
                    self.status(&format!(
                        "round {} unit {} finished: {} note(s) in {}ms",
                        round, unit, note_count, duration_ms
                    ));
                }
            }
            ResearchEvent::ReportToken { text } => {
                self.report_token(text);
            }
            ResearchEvent::RunCompleted { .. } => {}
        }
    }

    /// Print a dim progress line.
    pub fn status(&self, message: &str) {
        if self.colored {
            eprintln!("{}", message.dimmed());
        } else {
            eprintln!("{}", message);
        }
    }

    /// Print a warning line.
    pub fn warn(&self, message: &str) {
        if self.colored {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        } else {
            eprintln!("warning: {}", message);
        }
    }

    /// Print an error line.
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("{} {}", "error:".red().bold(), message);
        } else {
            eprintln!("error: {}", message);
        }
    }

    /// Print a clarifying question.
    pub fn question(&self, question: &str) {
        if self.colored {
            println!("\n{} {}", "clarification needed:".yellow().bold(), question);
        } else {
            println!("\nclarification needed: {}", question);
        }
    }

    /// Stream a report token without a newline.
    pub fn report_token(&self, text: &str) {
        print!("{}", text);
        let _ = io::stdout().flush();
    }

    /// Print the report header rule.
    pub fn report_header(&self) {
        if self.colored {
            println!("\n{}", "=== Final Report ===".green().bold());
        } else {
            println!("\n=== Final Report ===");
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{}...", cut)
    }
}
