//! Operator CLI for a running agent.

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};

use nested_agent::api::types::{CommandInfo, ContainerId};
use nested_agent::api::v1;

#[derive(Parser)]
#[command(name = "agent-cli")]
#[command(about = "Management CLI for the nested-container agent", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:5051")]
    url: String,

    /// Principal to present to the authorization gate.
    #[arg(short, long)]
    principal: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check agent health
    Health,
    /// Show agent version
    Version,
    /// Show agent configuration flags
    Flags,
    /// List known containers
    Containers,
    /// Launch a nested container under an executor's container
    Launch {
        /// Id for the new nested container
        id: String,
        /// The executor's container id (the parent)
        #[arg(long)]
        parent: String,
        /// Shell command to run
        #[arg(long)]
        cmd: String,
    },
    /// Wait for a nested container to terminate
    Wait { id: String },
    /// Kill a nested container
    Kill { id: String },
}

fn call_body(command: &Commands) -> v1::Call {
    match command {
        Commands::Health => v1::Call {
            r#type: v1::CallType::GetHealth as i32,
            ..Default::default()
        },
        Commands::Version => v1::Call {
            r#type: v1::CallType::GetVersion as i32,
            ..Default::default()
        },
        Commands::Flags => v1::Call {
            r#type: v1::CallType::GetFlags as i32,
            ..Default::default()
        },
        Commands::Containers => v1::Call {
            r#type: v1::CallType::GetContainers as i32,
            ..Default::default()
        },
        Commands::Launch { id, parent, cmd } => v1::Call {
            r#type: v1::CallType::LaunchNestedContainer as i32,
            launch_nested_container: Some(v1::LaunchNestedContainer {
                container_id: Some(
                    ContainerId::new(id.clone()).with_parent(ContainerId::new(parent.clone())),
                ),
                command: Some(CommandInfo {
                    shell: true,
                    value: Some(cmd.clone()),
                    ..Default::default()
                }),
                container: None,
            }),
            ..Default::default()
        },
        Commands::Wait { id } => v1::Call {
            r#type: v1::CallType::WaitNestedContainer as i32,
            wait_nested_container: Some(v1::WaitNestedContainer {
                container_id: Some(ContainerId::new(id.clone())),
            }),
            ..Default::default()
        },
        Commands::Kill { id } => v1::Call {
            r#type: v1::CallType::KillNestedContainer as i32,
            kill_nested_container: Some(v1::KillNestedContainer {
                container_id: Some(ContainerId::new(id.clone())),
            }),
            ..Default::default()
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(principal) = &cli.principal {
        headers.insert("x-agent-principal", HeaderValue::from_str(principal)?);
    }

    let response = client
        .post(format!("{}/api/v1", cli.url))
        .headers(headers)
        .json(&call_body(&cli.command))
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        eprintln!("Error: agent returned {status}");
        if !body.is_empty() {
            eprintln!("{body}");
        }
        std::process::exit(1);
    }

    if body.is_empty() {
        println!("OK");
    } else {
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
            Err(_) => println!("{body}"),
        }
    }

    Ok(())
}
