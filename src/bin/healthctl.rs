use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "healthctl")]
#[command(about = "Management CLI for the health engine", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "HEALTHCTL_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check engine status
    Status,
    /// List clusters and the health of every host
    Clusters,
    /// Show one host
    Host { cluster: String, host: String },
    /// Mark a host DRAINING
    Drain { cluster: String, host: String },
    /// Mark a host TIMEOUT
    Timeout { cluster: String, host: String },
    /// Clear a DRAINING/TIMEOUT override
    Clear { cluster: String, host: String },
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
        Commands::Clusters => client.get(format!("{}/admin/clusters", cli.url)),
        Commands::Host { cluster, host } => {
            client.get(format!("{}/admin/clusters/{}/hosts/{}", cli.url, cluster, host))
        }
        Commands::Drain { cluster, host } => override_request(&client, &cli.url, cluster, host, json!("draining")),
        Commands::Timeout { cluster, host } => override_request(&client, &cli.url, cluster, host, json!("timeout")),
        Commands::Clear { cluster, host } => override_request(&client, &cli.url, cluster, host, Value::Null),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

fn override_request(
    client: &reqwest::Client,
    url: &str,
    cluster: &str,
    host: &str,
    value: Value,
) -> reqwest::RequestBuilder {
    client
        .put(format!("{}/admin/clusters/{}/hosts/{}/override", url, cluster, host))
        .json(&json!({ "override": value }))
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
