use anyhow::Context;
use clap::Parser;
use postino_server_common::diagnostic_logging::{DiagnosticFormat, LoggingConfig};
use postino_server_lifecycle::Lifetime;
use postinod::backend::{Backend, DebugBackend};
use postinod::config::AppConfig;
use postinod::smtp_server::Server;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Barrier;

/// postino SMTP daemon.
#[derive(Debug, Parser)]
#[command(about, version)]
struct Opt {
    /// Configuration file to load.
    #[arg(long, default_value = "/etc/postino/postino.toml")]
    config: PathBuf,

    /// Validate the configuration (TLS material, credential stores),
    /// then exit without starting any listeners.
    #[arg(long)]
    validate: bool,

    /// Directory where diagnostic log files will be placed.
    ///
    /// If omitted, diagnostics will be printed to stderr.
    #[arg(long)]
    diag_log_dir: Option<PathBuf>,

    /// How diagnostic logs render. full, compact and pretty are intended
    /// for human consumption; json outputs machine readable records.
    #[arg(long, default_value = "full")]
    diag_format: DiagnosticFormat,
}

fn main() -> anyhow::Result<()> {
    let opts = Opt::parse();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed building the tokio runtime")
        .block_on(run(opts))
}

async fn run(opts: Opt) -> anyhow::Result<()> {
    LoggingConfig {
        log_dir: opts.diag_log_dir.clone(),
        diag_format: opts.diag_format,
        filter_env_var: "POSTINOD_LOG",
        default_filter: "postinod=info,postino_server_common=info,postino_server_lifecycle=info",
    }
    .init()?;

    let app = AppConfig::load(&opts.config)?;
    anyhow::ensure!(
        !app.servers.is_empty(),
        "no [[server]] blocks in {}",
        opts.config.display()
    );

    let backend: Arc<dyn Backend> = Arc::new(DebugBackend);

    if opts.validate {
        for sc in &app.servers {
            Server::new(sc.clone(), backend.clone())
                .with_context(|| format!("validating server [{}]", sc.listen_interface))?;
        }
        println!("configuration OK");
        return Ok(());
    }

    let enabled: Vec<_> = app.servers.into_iter().filter(|sc| sc.is_enabled).collect();
    anyhow::ensure!(!enabled.is_empty(), "every configured server is disabled");

    // every server signals the barrier once its listener is bound (or
    // failed), so initialization is complete after the wait
    let startup = Arc::new(Barrier::new(enabled.len() + 1));
    let mut servers = vec![];
    for sc in enabled {
        let interface = sc.listen_interface.clone();
        let server = Server::new(sc, backend.clone())
            .with_context(|| format!("creating server [{interface}]"))?;
        tokio::spawn({
            let server = server.clone();
            let startup = startup.clone();
            async move {
                if let Err(err) = server.start(startup).await {
                    tracing::error!("server exited: {err:#}");
                }
            }
        });
        servers.push(server);
    }
    startup.wait().await;
    tracing::info!("initialization complete");

    let mut lifetime = Lifetime::new();
    lifetime.wait_for_shutdown_request().await;

    for server in &servers {
        server.shutdown().await;
    }
    tracing::info!("all listeners drained, exiting");
    Ok(())
}
