//! zmx — persists interactive terminal sessions beyond the lifetime of
//! any attached client.
//!
//! ## Subcommands
//!
//! - `attach <name> [cmd...]` — create or attach.
//! - `detach` — detach all clients of `$ZMX_SESSION`.
//! - `list` — print one line per live session.
//! - `kill <name>` — terminate a session's child and its supervisor.

use clap::{CommandFactory, Parser, Subcommand};

use zmx::{dispatcher, logging};

/// Persist interactive terminal sessions across disconnects.
#[derive(Parser)]
#[command(name = "zmx", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a session if absent, then attach to it.
    #[command(visible_alias = "a")]
    Attach {
        name: String,
        /// Command to run on first creation; ignored on re-attach.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        cmd: Vec<String>,
    },
    /// Detach all clients of the current session (`$ZMX_SESSION`).
    #[command(visible_alias = "d")]
    Detach,
    /// List live sessions.
    #[command(visible_alias = "l")]
    List,
    /// Terminate a session's child and its supervisor.
    #[command(visible_alias = "k")]
    Kill { name: String },
    /// Print help.
    #[command(visible_alias = "h")]
    Help,
    /// Print the version.
    #[command(visible_alias = "v")]
    Version,
}

fn main() {
    logging::init_dispatcher();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Command::Attach { name, cmd } => dispatcher::attach_command(&name, cmd),
        Command::Detach => dispatcher::detach_command(),
        Command::List => dispatcher::list_command(),
        Command::Kill { name } => dispatcher::kill_command(&name),
        Command::Help => {
            let _ = Cli::command().print_help();
            println!();
            0
        }
        Command::Version => {
            println!("zmx {}", env!("CARGO_PKG_VERSION"));
            0
        }
    };

    std::process::exit(exit_code);
}
