use std::fs;
use std::io::{self, BufRead, Write};

use bbcbasic::collaborators::HostCollaborators;
use bbcbasic::config::{Cli, Configuration};
use bbcbasic::Interpreter;
use clap::Parser;

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = Configuration::from(&cli);
    let mut interp = Interpreter::with_config(HostCollaborators::new(), &config);

    if let Some(path) = &cli.program {
        if let Err(e) = load_program(&mut interp, path) {
            eprintln!("{}", e.banner());
            std::process::exit(e.code());
        }
        if let Err(e) = interp.run() {
            eprintln!("{}", e.banner());
            std::process::exit(e.code());
        }
        return;
    }

    repl(&mut interp);
}

fn load_program(interp: &mut Interpreter<HostCollaborators>, path: &str) -> bbcbasic::Result<()> {
    let text = fs::read_to_string(path).map_err(|_| {
        bbcbasic::BasicError::new(bbcbasic::ErrorKind::FileNotFound, None)
    })?;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        interp.program.enter(line)?;
    }
    Ok(())
}

/// A minimal direct-mode prompt: numbered lines are entered into the stored
/// program, everything else is executed immediately (`RUN` among them).
fn repl(interp: &mut Interpreter<HostCollaborators>) {
    let stdin = io::stdin();
    print!("> ");
    let _ = io::stdout().flush();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            print!("> ");
            let _ = io::stdout().flush();
            continue;
        }
        let starts_with_digit = line.trim_start().chars().next().is_some_and(|c| c.is_ascii_digit());
        let outcome = if starts_with_digit {
            interp.program.enter(&line)
        } else {
            interp.exec_direct(&line)
        };
        if let Err(e) = outcome {
            println!("{}", e.banner());
        }
        print!("> ");
        let _ = io::stdout().flush();
    }
}
