//! Gateway control utility
//!
//! Talks to a running gateway over its HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! # Is the gateway up?
//! gatewayctl health
//!
//! # Register a team and wait for the gateway if it is still starting
//! gatewayctl register --team-id sales-1 --name "Sales Team" \
//!   --endpoint http://localhost:9001 --department sales \
//!   --capability sales --capability proposal-generation --wait
//!
//! # Route a task by capability, excluding one team
//! gatewayctl route --from marketing-1 --capability proposal-generation \
//!   --exclude sales-2 "Draft a proposal for ACME"
//!
//! # Discovery and statistics
//! gatewayctl teams --capability sales
//! gatewayctl stats
//! ```

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::process;
use std::time::Duration;
use team_gateway::client::{AutoRegistration, GatewayClient};
use team_gateway::directory::TeamRegistration;
use team_gateway::observability::init_default_logging;
use team_gateway::routing::RouteRequest;

#[derive(Parser)]
#[command(
    name = "gatewayctl",
    about = "Command-line client for the team gateway",
    version
)]
struct Args {
    /// Gateway base URL
    #[arg(long, env = "GATEWAY_URL", default_value = "http://localhost:8080")]
    gateway_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check gateway liveness
    Health,
    /// Register a team
    Register {
        #[arg(long)]
        team_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        department: String,
        /// Capability (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,
        #[arg(long, default_value = "CrewAI")]
        framework: String,
        #[arg(long)]
        health_endpoint: Option<String>,
        /// Wait for the gateway to come up before registering
        #[arg(long)]
        wait: bool,
    },
    /// Unregister a team
    Unregister { team_id: String },
    /// List teams, optionally by capability
    Teams {
        #[arg(long)]
        capability: Option<String>,
    },
    /// Show one team
    Team { team_id: String },
    /// Show the capability index
    Capabilities,
    /// Show gateway statistics
    Stats,
    /// Route a task
    Route {
        /// Sending team
        #[arg(long = "from")]
        from_team: String,
        /// Explicit target team
        #[arg(long = "to")]
        to_team: Option<String>,
        /// Required capability (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,
        /// Team to skip (repeatable)
        #[arg(long = "exclude")]
        excluded: Vec<String>,
        /// Context as a JSON object
        #[arg(long)]
        context: Option<String>,
        /// Seconds the target team is given
        #[arg(long)]
        timeout: Option<u64>,
        /// Task description
        description: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let client = GatewayClient::new(&args.gateway_url)?;

    match args.command {
        Command::Health => {
            let report = client.liveness().await?;
            print_json(&report)?;
        }
        Command::Register {
            team_id,
            name,
            endpoint,
            department,
            capabilities,
            framework,
            health_endpoint,
            wait,
        } => {
            let mut registration = TeamRegistration::new(team_id, name, endpoint, department)
                .with_capabilities(capabilities)
                .with_framework(framework);
            if let Some(health_endpoint) = health_endpoint {
                registration = registration.with_health_endpoint(health_endpoint);
            }

            if wait {
                let registered = AutoRegistration::new(client, registration)
                    .with_polling(10, Duration::from_secs(5))
                    .run()
                    .await;
                if !registered {
                    return Err("registration did not complete".into());
                }
                println!("registered");
            } else {
                print_json(&client.register_team(&registration).await?)?;
            }
        }
        Command::Unregister { team_id } => {
            print_json(&client.unregister_team(&team_id).await?)?;
        }
        Command::Teams { capability } => {
            print_json(&client.discover_teams(capability.as_deref()).await?)?;
        }
        Command::Team { team_id } => {
            print_json(&client.team_status(&team_id).await?)?;
        }
        Command::Capabilities => {
            print_json(&client.capabilities().await?)?;
        }
        Command::Stats => {
            print_json(&client.statistics().await?)?;
        }
        Command::Route {
            from_team,
            to_team,
            capabilities,
            excluded,
            context,
            timeout,
            description,
        } => {
            let mut request = RouteRequest::new(from_team, description).with_capabilities(capabilities);
            request.to_team = to_team;
            request.excluded_team_ids = excluded.into_iter().collect();
            request.timeout = timeout;
            if let Some(context) = context {
                match serde_json::from_str::<Value>(&context)? {
                    Value::Object(map) => request.context = map,
                    _ => return Err("--context must be a JSON object".into()),
                }
            }

            print_json(&client.route_task(&request).await?)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_default_logging();

    if let Err(e) = run(args).await {
        eprintln!("❌ {e}");
        process::exit(1);
    }
}
