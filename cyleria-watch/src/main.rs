use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cyleria_watch::app::App;
use cyleria_watch::cli::{Args, Commands, render_character, render_record};
use cyleria_watch::config::AppConfig;
use cyleria_watch::logging;
use cyleria_watch::watchlist::read_watchlist;
use profile_parser::Extraction;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = logging::init_logging(&config.logging)?;

    let cancel = CancellationToken::new();
    if let Some(dir) = &config.logging.dir {
        logging::start_retention_cleanup(dir.clone(), config.logging.retention_days, cancel.clone());
    }

    let app = App::build(config)
        .await
        .context("Failed to initialize cyleria-watch")?;

    match args.command {
        Commands::Run => {
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("shutdown requested"),
                    Err(e) => warn!(error = %e, "failed to listen for ctrl-c, shutting down"),
                }
                shutdown.cancel();
            });
            app.run(cancel.clone()).await?;
        }
        Commands::Char { nickname } => {
            let nickname = nickname.join(" ");
            let extraction = app
                .subscriptions()
                .query(&nickname)
                .await
                .with_context(|| format!("Failed to fetch profile of {nickname}"))?;
            match extraction {
                Extraction::Found(snapshot) => println!("{}", render_character(&snapshot)),
                Extraction::NotFound => println!("Nie znaleziono postaci **{nickname}**"),
            }
        }
        Commands::Subscribe {
            scope,
            nickname,
            channel,
        } => {
            let record = app
                .subscriptions()
                .subscribe(&scope, &nickname, channel)
                .await?;
            println!(
                "Obserwuję {} w {} (poziom {})",
                app.subscriptions().normalize(&nickname),
                scope.trim(),
                record.last_level
            );
        }
        Commands::Unsubscribe { scope, nickname } => {
            if app.subscriptions().unsubscribe(&scope, &nickname).await? {
                println!("Usunięto {} z {}", app.subscriptions().normalize(&nickname), scope.trim());
            } else {
                println!("{} nie jest obserwowany w {}", nickname.trim(), scope.trim());
            }
        }
        Commands::List { scope } => {
            let scopes = match scope {
                Some(scope) => vec![scope],
                None => app.subscriptions().scopes().await,
            };
            for scope in scopes {
                let records = app.subscriptions().list(&scope).await;
                println!("[{scope}] {} postaci", records.len());
                for (nickname, record) in &records {
                    println!("  {}", render_record(nickname, record));
                }
            }
        }
        Commands::Watchlist => match &app.config().watchlist.path {
            Some(path) if path.is_file() => {
                let nicknames = read_watchlist(path).await?;
                println!("**Lista graczy:**\n{}", nicknames.join("\n"));
            }
            Some(path) => println!("Brak pliku {}", path.display()),
            None => println!("Lista graczy nie jest skonfigurowana"),
        },
    }

    cancel.cancel();
    Ok(())
}
