//! Binary entry point: load config, register routes, bind listeners.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use hostwire::config::{load_config, EngineConfig};
use hostwire::{App, HttpProtocol, HttpsProtocol, TlsOptions};

#[derive(Parser)]
#[command(name = "hostwire", about = "Virtual-host routing engine")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "hostwire.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("hostwire: {}: {err}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    hostwire::observability::logging::init(&config.log.level);
    tracing::info!(config = %cli.config.display(), "Starting");

    let app = App::new();
    if let Err(err) = run(&app, &config).await {
        tracing::error!(error = %err, "Startup failed");
        return ExitCode::FAILURE;
    }

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("Shutting down");
    app.close();
    ExitCode::SUCCESS
}

async fn run(app: &App, config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    for host in &config.hosts {
        if let Some(body) = &host.body {
            app.route_static(&host.pattern, body.clone().into_bytes())?;
        } else if let Some(file) = &host.file {
            let file = file.clone();
            app.route(&host.pattern, move |_req, res| {
                let file = file.clone();
                tokio::spawn(async move {
                    if res.stream_file(&file).await.is_err() {
                        res.write_status(404);
                        res.end(Some(b"Not Found"));
                    }
                });
            })?;
        }
        tracing::info!(pattern = %host.pattern, "Host registered");
    }

    for listener in &config.listeners {
        let binder = match &listener.tls {
            Some(tls) => HttpsProtocol::new(TlsOptions {
                key_file_name: tls.key_file_name.clone(),
                cert_file_name: tls.cert_file_name.clone(),
            })
            .listen(listener.port),
            None => HttpProtocol::listen(listener.port),
        };
        binder
            .max_connections(listener.max_connections)
            .on_listen(|addr| tracing::info!(addr = %addr, "Accepting connections"))
            .bind(app)
            .await?;
    }

    Ok(())
}
