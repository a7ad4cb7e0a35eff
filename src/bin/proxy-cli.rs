use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the handler proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy system status
    Status,
    /// List every handler with its lifecycle state
    Handlers,
    /// Show one handler, including its last init outcome
    Handler { name: String },
    /// Reinitialize a handler
    Reinit { name: String },
    /// Reload a handler, re-reading its configuration
    Reload { name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Handlers => client.get(format!("{}/admin/handlers", cli.url)),
        Commands::Handler { name } => client.get(format!("{}/admin/handlers/{name}", cli.url)),
        Commands::Reinit { name } => client.post(format!("{}/admin/handlers/{name}/reinit", cli.url)),
        Commands::Reload { name } => client.post(format!("{}/admin/handlers/{name}/reload", cli.url)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if !text.is_empty() => println!("{text}"),
        Err(_) => {}
    }

    if status.is_success() {
        Ok(())
    } else {
        std::process::exit(1)
    }
}
