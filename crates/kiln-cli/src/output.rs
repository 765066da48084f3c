//! Terminal output.
//!
//! Reports (`flatten`, `provider`, `config`) and rendered documents go to
//! stdout; status lines go to stderr so `kiln render ... > out.yaml` stays
//! clean.

use std::io::{self, IsTerminal};

use console::Term;
use owo_colors::{OwoColorize, Style};

use crate::cli::GlobalArgs;
use crate::config::AppConfig;

/// Kind of stderr status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Warning,
    Error,
    Info,
}

impl Status {
    fn symbol(self) -> &'static str {
        match self {
            Self::Success => "\u{2713}", // ✓
            Self::Warning => "\u{26a0}", // ⚠
            Self::Error => "\u{2717}",   // ✗
            Self::Info => "\u{2139}",    // ℹ
        }
    }

    fn style(self) -> Style {
        match self {
            Self::Success => Style::new().green(),
            Self::Warning => Style::new().yellow(),
            Self::Error => Style::new().red(),
            Self::Info => Style::new().blue(),
        }
    }
}

/// Writes reports, documents and status lines honouring `--quiet` and
/// `--no-color`.
pub struct OutputManager {
    quiet: bool,
    color: bool,
    verbose: bool,
    stdout: Term,
    stderr: Term,
}

impl OutputManager {
    pub fn new(args: &GlobalArgs, config: &AppConfig) -> Self {
        Self {
            quiet: args.quiet,
            color: !(args.no_color || config.output.no_color) && io::stderr().is_terminal(),
            verbose: args.verbose > 0,
            stdout: Term::stdout(),
            stderr: Term::stderr(),
        }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_owned()
        }
    }

    // ── stdout ────────────────────────────────────────────────────────────

    /// Report line; dropped under `--quiet`.
    pub fn print(&self, msg: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.stdout.write_line(msg)
    }

    pub fn header(&self, text: &str) -> io::Result<()> {
        self.print(&self.paint(text, Style::new().cyan().bold()))
    }

    /// Indented `label: value` line under a header.
    pub fn detail(&self, label: &str, value: &str) -> io::Result<()> {
        let label = self.paint(label, Style::new().dimmed());
        self.print(&format!("    {label}: {value}"))
    }

    /// The command's result.  Written even under `--quiet`.
    pub fn document(&self, text: &str) -> io::Result<()> {
        self.stdout.write_str(text)?;
        if !text.ends_with('\n') {
            self.stdout.write_line("")?;
        }
        Ok(())
    }

    // ── stderr ────────────────────────────────────────────────────────────

    /// Status line on stderr.  Errors survive `--quiet`.
    pub fn status(&self, status: Status, msg: &str) -> io::Result<()> {
        if self.quiet && status != Status::Error {
            return Ok(());
        }
        let symbol = self.paint(status.symbol(), status.style().bold());
        let msg = self.paint(msg, status.style());
        self.stderr.write_line(&format!("{symbol} {msg}"))
    }

    pub fn success(&self, msg: &str) -> io::Result<()> {
        self.status(Status::Success, msg)
    }

    pub fn warning(&self, msg: &str) -> io::Result<()> {
        self.status(Status::Warning, msg)
    }

    pub fn error(&self, msg: &str) -> io::Result<()> {
        self.status(Status::Error, msg)
    }

    pub fn info(&self, msg: &str) -> io::Result<()> {
        self.status(Status::Info, msg)
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn supports_color(&self) -> bool {
        self.color
    }

    /// `true` if `-v` was given at least once.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}
