use anyhow::{anyhow, Result};
use clap::{arg, command, Parser, Subcommand};
use http::Method;
use session_agent::observability::metrics::render_metrics;
use session_agent::pipeline::session::SessionStatus;
use session_agent::utils::config_loader;
use session_agent::utils::logging;
use session_agent::utils::logging::LogLevel;
use session_agent::{ApiRequest, RequestPipeline};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "session-agent.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    /// print prometheus metrics to stderr before exiting
    #[arg(long)]
    print_metrics: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one request through the session pipeline and print the response body
    Call {
        #[arg(short, long, default_value = "GET")]
        method: String,
        #[arg(short, long)]
        path: String,
        /// JSON request body
        #[arg(long, conflicts_with = "text")]
        json: Option<String>,
        /// plain text request body
        #[arg(long)]
        text: Option<String>,
    },
    /// Report the locally stored session without contacting the backend
    Status,
    /// Check the session against the backend, refreshing it when needed
    Verify {
        /// defaults to settings.auth.probe_path
        #[arg(long)]
        path: Option<String>,
    },
    /// Notify the backend and drop the stored session
    Logout,
    /// Store a credential pair obtained elsewhere
    Import {
        #[arg(long, env = "ACCESS_TOKEN")]
        access_token: String,
        #[arg(long, env = "REFRESH_TOKEN")]
        refresh_token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Read args, load YAML config
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level)?;
    let settings = &service_config.settings;

    // -------------------------------
    // 2. Wire store, refresh coordinator and pipeline
    // -------------------------------

    let pipeline = RequestPipeline::from_settings(settings)?;
    info!("session agent ready, backend: {}", settings.backend.base_url);

    // -------------------------------
    // 3. Run the requested operation
    // -------------------------------

    let outcome = match args.command {
        Command::Call {
            method,
            path,
            json,
            text,
        } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|e| anyhow!("invalid method '{}': {}", method, e))?;
            let mut request = ApiRequest::new(method, path);
            if let Some(json) = json {
                request = request.json(serde_json::from_str(&json)?);
            } else if let Some(text) = text {
                request = request.text(text);
            }
            pipeline
                .execute(request)
                .await
                .map(|response| {
                    println!("{}", response.status);
                    println!("{}", response.body);
                })
                .map_err(anyhow::Error::from)
        }
        Command::Status => {
            print_status(&pipeline.session_status());
            Ok(())
        }
        Command::Verify { path } => {
            let path = path
                .or_else(|| settings.auth.probe_path.clone())
                .ok_or_else(|| anyhow!("no probe path: pass --path or set settings.auth.probe_path"))?;
            pipeline
                .verify_session(ApiRequest::get(path))
                .await
                .map(|status| print_status(&status))
                .map_err(anyhow::Error::from)
        }
        Command::Logout => {
            pipeline.logout(&settings.auth.logout_path).await;
            Ok(())
        }
        Command::Import {
            access_token,
            refresh_token,
        } => {
            pipeline.import_session(&access_token, &refresh_token);
            print_status(&pipeline.session_status());
            Ok(())
        }
    };

    // -------------------------------
    // 4. Metrics
    // -------------------------------

    if args.print_metrics {
        eprintln!("{}", render_metrics().await?);
    }

    outcome
}

fn print_status(status: &SessionStatus) {
    match status {
        SessionStatus::Unauthenticated => println!("unauthenticated"),
        SessionStatus::Authenticated {
            access_expires_at: Some(at),
        } => println!("authenticated (access token expires at {})", at.to_rfc3339()),
        SessionStatus::Authenticated {
            access_expires_at: None,
        } => println!("authenticated"),
    }
}
