use cinefetch::app::App;
use cinefetch::cli::Args;
use cinefetch::config::Config;
use cinefetch::logging::setup_logging;
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::info;
use yansi::Paint;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    if args.json || !std::io::stdout().is_terminal() {
        yansi::disable();
    }

    // Config comes first so startup logs go through the configured subscriber.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting cinefetch"
    );

    let app = match App::new(config) {
        Ok(app) => app,
        Err(e) => return fail(&e),
    };

    match app.run(args.command, args.json).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn fail(err: &anyhow::Error) -> ExitCode {
    eprintln!("{} {err:#}", "error:".red().bold());
    ExitCode::FAILURE
}
