//! Ambient configuration: library-level startup knobs plus the binary's
//! `clap::Parser` CLI surface.
//!
//! Grounded on `em68k::Configuration` (a plain struct of startup knobs
//! handed to `Emulator::new`) for [`Configuration`], and on the
//! `clap::Parser` derive pattern for [`Cli`].

use clap::Parser;

/// Startup knobs for a library-embedded interpreter. Collaborators are
/// supplied separately (the generic parameter on `Interpreter<C>`), not
/// carried here.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub arena_bytes: u32,
    pub initial_mode: u8,
    pub trace: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration { arena_bytes: 64 * 1024, initial_mode: 0, trace: false }
    }
}

/// Command-line surface for the `bbcbasic` binary.
#[derive(Parser, Debug)]
#[command(name = "bbcbasic", about = "An interpreter for a BBC BASIC V/VI dialect")]
pub struct Cli {
    /// Program file to load and run; omit to start an interactive REPL.
    pub program: Option<String>,

    /// Workspace (arena) size in bytes.
    #[arg(long, default_value_t = 65536)]
    pub arena: u32,

    /// Initial screen MODE number.
    #[arg(long, default_value_t = 0)]
    pub mode: u8,

    /// Enable the TRACE overlay from startup.
    #[arg(long)]
    pub trace: bool,

    /// Verbosity, stacking: `-v`, `-vv`, `-vvv`.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl From<&Cli> for Configuration {
    fn from(cli: &Cli) -> Self {
        Configuration { arena_bytes: cli.arena, initial_mode: cli.mode, trace: cli.trace }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_produce_the_default_configuration() {
        let cli = Cli::parse_from(["bbcbasic"]);
        let config = Configuration::from(&cli);
        assert_eq!(config.arena_bytes, Configuration::default().arena_bytes);
        assert_eq!(config.initial_mode, 0);
        assert!(!config.trace);
    }

    #[test]
    fn cli_flags_override_defaults() {
        let cli = Cli::parse_from(["bbcbasic", "prog.bas", "--arena", "1024", "--mode", "7", "--trace"]);
        let config = Configuration::from(&cli);
        assert_eq!(cli.program.as_deref(), Some("prog.bas"));
        assert_eq!(config.arena_bytes, 1024);
        assert_eq!(config.initial_mode, 7);
        assert!(config.trace);
    }
}
