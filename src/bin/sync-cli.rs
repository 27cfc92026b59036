use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "sync-cli")]
#[command(about = "Management CLI for the WealthWise sync daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "SYNC_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon version and summary counts
    Status,
    /// Per-key polling state
    Polls,
    /// Circuit breaker states
    Circuits,
    /// Report the app as visible or hidden
    Visible {
        #[arg(action = clap::ArgAction::Set)]
        visible: bool,
    },
    /// Drop cached payloads and last-data snapshots
    ClearCache,
    /// Re-register a key, resuming it if paused
    Restart { key: String },
    /// Stop polling a key
    Stop { key: String },
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
        Commands::Polls => client.get(format!("{}/admin/polls", cli.url)),
        Commands::Circuits => client.get(format!("{}/admin/circuits", cli.url)),
        Commands::Visible { visible } => client
            .post(format!("{}/admin/visibility", cli.url))
            .json(&json!({ "visible": visible })),
        Commands::ClearCache => client.post(format!("{}/admin/cache/clear", cli.url)),
        Commands::Restart { key } => {
            client.post(format!("{}/admin/polls/{}/restart", cli.url, key))
        }
        Commands::Stop { key } => client.delete(format!("{}/admin/polls/{}", cli.url, key)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
