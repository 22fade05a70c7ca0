use cassia_lang::cli;
use clap::{Parser as ClapParser, Subcommand};

#[derive(ClapParser)]
#[command(name = "cassia")]
#[command(about = "Cassia - an embeddable C-like scripting language")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and execute a script
    Run {
        /// Script file (reads from stdin if not provided)
        file: Option<String>,
    },

    /// Validate a script without executing it
    Check {
        /// Script file (reads from stdin if not provided)
        file: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { file } => cli::read_source(file.as_deref())
            .and_then(|source| cli::run_source(&source, file.as_deref())),
        Commands::Check { file } => cli::read_source(file.as_deref()).and_then(|source| {
            cli::check_source(&source, file.as_deref())?;
            println!("Syntax is valid");
            Ok(())
        }),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
