use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the Policy Gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "admin-secret-key")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List routes
    Routes,
    /// List security policies
    Policies {
        /// Only this kind (auth, ratelimit, waf, cors)
        #[arg(long)]
        kind: Option<String>,
        /// Scope substring, case-insensitive
        #[arg(long)]
        scope: Option<String>,
    },
    /// Policy counts per kind
    Stats,
    /// Show which route a request would resolve to, and why
    Explain {
        method: String,
        path: String,
        /// Context attribute, as name=value
        #[arg(long = "attr", value_parser = parse_pair)]
        attributes: Vec<(String, String)>,
        /// Request header, as name=value
        #[arg(long = "header", value_parser = parse_pair)]
        headers: Vec<(String, String)>,
    },
    /// Enable a route
    EnableRoute { id: String },
    /// Disable a route
    DisableRoute { id: String },
    /// Copy a route under a new id
    DuplicateRoute { id: String },
    /// Delete a route
    DeleteRoute { id: String },
    /// Enable a policy
    EnablePolicy { id: String },
    /// Disable a policy
    DisablePolicy { id: String },
    /// Delete a policy
    DeletePolicy { id: String },
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))
}

fn to_object(pairs: Vec<(String, String)>) -> Value {
    Value::Object(pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect::<Map<_, _>>())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Routes => client.get(format!("{base}/admin/routes")),
        Commands::Policies { kind, scope } => {
            let mut query = Vec::new();
            if let Some(kind) = kind {
                query.push(("kind", kind));
            }
            if let Some(scope) = scope {
                query.push(("scope", scope));
            }
            client.get(format!("{base}/admin/policies")).query(&query)
        }
        Commands::Stats => client.get(format!("{base}/admin/policies/stats")),
        Commands::Explain {
            method,
            path,
            attributes,
            headers,
        } => client.post(format!("{base}/admin/explain")).json(&json!({
            "method": method.to_ascii_uppercase(),
            "path": path,
            "attributes": to_object(attributes),
            "headers": to_object(headers),
        })),
        Commands::EnableRoute { id } => client
            .put(format!("{base}/admin/routes/{id}/enabled"))
            .json(&json!({ "enabled": true })),
        Commands::DisableRoute { id } => client
            .put(format!("{base}/admin/routes/{id}/enabled"))
            .json(&json!({ "enabled": false })),
        Commands::DuplicateRoute { id } => client.post(format!("{base}/admin/routes/{id}/duplicate")),
        Commands::DeleteRoute { id } => client.delete(format!("{base}/admin/routes/{id}")),
        Commands::EnablePolicy { id } => client
            .put(format!("{base}/admin/policies/{id}/enabled"))
            .json(&json!({ "enabled": true })),
        Commands::DisablePolicy { id } => client
            .put(format!("{base}/admin/policies/{id}/enabled"))
            .json(&json!({ "enabled": false })),
        Commands::DeletePolicy { id } => client.delete(format!("{base}/admin/policies/{id}")),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
