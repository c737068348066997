use clap::Parser;
use sealvault::cli::commands::{authority::AuthorityArgs, import_cmd::ImportArgs};
use sealvault::cli::{Cli, Commands};
use sealvault::vault::SignPolicy;

fn main() {
    let cli = Cli::parse();

    sealvault::logging::init(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Init { force } => sealvault::cli::commands::init::execute(&cli, force),
        Commands::Import {
            ref label,
            format,
            ref tags,
            ref value,
            max_sign_uses,
            cooldown,
            max_age,
        } => sealvault::cli::commands::import_cmd::execute(
            &cli,
            ImportArgs {
                label,
                format,
                tags,
                value: value.as_deref(),
                policy: SignPolicy {
                    max_sign_uses,
                    cooldown_secs: cooldown,
                    max_age_secs: max_age,
                },
            },
        ),
        Commands::Find {
            ref query,
            ref tags,
            json,
        } => sealvault::cli::commands::find::execute(&cli, query, tags, json),
        Commands::Get { id } => sealvault::cli::commands::get::execute(&cli, id),
        Commands::Sign {
            id,
            ref message,
            ref message_hex,
            repeat,
            json,
        } => sealvault::cli::commands::sign::execute(
            &cli,
            id,
            message.as_deref(),
            message_hex.as_deref(),
            repeat,
            json,
        ),
        Commands::Export { ref output } => {
            sealvault::cli::commands::export::execute(&cli, output.as_deref())
        }
        Commands::Authority {
            json,
            example,
            ref data,
            ref root,
        } => sealvault::cli::commands::authority::execute(AuthorityArgs {
            json,
            example,
            data: data.clone(),
            root: root.clone(),
        }),
    };

    if let Err(e) = result {
        tracing::debug!(error = ?e, "command failed");
        sealvault::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
