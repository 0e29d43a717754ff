//! Point d'entrée CLI pour carto-collectivites

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::{Commands, NavigateArgs};

/// Navigation cartographique des collectivités et statistiques de conformité
#[derive(Parser)]
#[command(name = "carto")]
#[command(author, version)]
#[command(about = "Naviguer dans la carte des collectivités et calculer leurs statistiques")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Configurer le logging
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Navigate {
            data,
            url,
            level,
            code,
            view,
            criterion,
            period,
            services,
            output,
            map_data,
            deployment,
            report,
        } => {
            info!(url = ?url, level = ?level, code = ?code, "Navigation");
            cli::cmd_navigate(NavigateArgs {
                data,
                url,
                level,
                code,
                view,
                criterion,
                period,
                services,
                output,
                map_data,
                deployment,
                report,
            })
            .await?;
        }
        Commands::Dissolve {
            input,
            output,
            parent_areas,
            config,
        } => {
            info!(input = %input.display(), output = %output.display(), "Dissolve EPCI");
            cli::cmd_dissolve(&input, &output, parent_areas.as_deref(), &config)?;
        }
        Commands::Hexbin {
            records,
            coords,
            cell_size,
            services,
            output,
        } => {
            info!(records = %records.display(), cell_size, "Hexbin");
            cli::cmd_hexbin(&records, &coords, cell_size, services, &output)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
