mod args;
mod client;
mod output;

use anyhow::Result;
use clap::Parser;
use reqwest::Client;

use crate::args::{
    AgentCommand, Args, Command, KeypairCommand, MaintenanceCommand, PolicyCommand, SessionCommand,
};
use crate::client::{api_url, auth};
use crate::output::{
    print_agent_detail, print_agents, print_group_usage, print_keypairs, print_policies,
    print_policy_detail, print_session_detail, print_sessions, print_summary, print_usage_report,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = Client::new();
    let token = args.token;

    match args.command {
        Command::Summary { scaling_group } => {
            let mut url = api_url(&args.console_url, "/summary");
            if let Some(group) = &scaling_group {
                url = format!("{}?scaling_group={}", url, group);
            }
            let resp = auth(client.get(&url), token.as_ref()).send().await?;
            if resp.status().is_success() {
                let data: serde_json::Value = resp.json().await?;
                if scaling_group.is_some() {
                    print_group_usage(&data);
                } else {
                    print_summary(&data);
                }
            } else {
                eprintln!("✗ Failed to get summary: {}", resp.text().await?);
            }
        }
        Command::Agents { subcommand } => match subcommand {
            AgentCommand::List { status } => {
                let mut url = api_url(&args.console_url, "/agents");
                if let Some(s) = &status {
                    url = format!("{}?status={}", url, s);
                }
                let resp = auth(client.get(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let data: serde_json::Value = resp.json().await?;
                    let agents = data["agents"].as_array().cloned().unwrap_or_default();
                    print_agents(&agents);
                } else {
                    eprintln!("✗ Failed to list agents: {}", resp.text().await?);
                }
            }
            AgentCommand::Get { id } => {
                let url = api_url(&args.console_url, &format!("/agents/{}", id));
                let resp = auth(client.get(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let agent: serde_json::Value = resp.json().await?;
                    print_agent_detail(&agent);
                } else {
                    eprintln!("✗ Failed to get agent: {}", resp.text().await?);
                }
            }
        },
        Command::Sessions { subcommand } => match subcommand {
            SessionCommand::List { status, access_key } => {
                let mut params = Vec::new();
                if let Some(s) = &status {
                    params.push(format!("status={}", s));
                }
                if let Some(ak) = &access_key {
                    params.push(format!("access_key={}", ak));
                }
                let mut url = api_url(&args.console_url, "/sessions");
                if !params.is_empty() {
                    url = format!("{}?{}", url, params.join("&"));
                }
                let resp = auth(client.get(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let data: serde_json::Value = resp.json().await?;
                    let sessions = data["sessions"].as_array().cloned().unwrap_or_default();
                    print_sessions(&sessions);
                } else {
                    eprintln!("✗ Failed to list sessions: {}", resp.text().await?);
                }
            }
            SessionCommand::Get { id } => {
                let url = api_url(&args.console_url, &format!("/sessions/{}", id));
                let resp = auth(client.get(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let session: serde_json::Value = resp.json().await?;
                    print_session_detail(&session);
                } else {
                    eprintln!("✗ Failed to get session: {}", resp.text().await?);
                }
            }
            SessionCommand::Terminate { id } => {
                let url = api_url(&args.console_url, &format!("/sessions/{}/terminate", id));
                let resp = auth(client.post(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    println!("✓ Termination requested for session '{}'", id);
                } else {
                    eprintln!("✗ Failed to terminate session: {}", resp.text().await?);
                }
            }
        },
        Command::Keypairs { subcommand } => match subcommand {
            KeypairCommand::List => {
                let url = api_url(&args.console_url, "/keypairs");
                let resp = auth(client.get(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let data: serde_json::Value = resp.json().await?;
                    let keypairs = data["keypairs"].as_array().cloned().unwrap_or_default();
                    print_keypairs(&keypairs);
                } else {
                    eprintln!("✗ Failed to list keypairs: {}", resp.text().await?);
                }
            }
            KeypairCommand::Create {
                user_id,
                admin,
                policy,
                rate_limit,
            } => {
                let url = api_url(&args.console_url, "/keypairs");
                let mut body = serde_json::json!({
                    "user_id": user_id,
                    "is_admin": admin,
                });
                if let Some(p) = &policy {
                    body["resource_policy"] = serde_json::json!(p);
                }
                if let Some(r) = rate_limit {
                    body["rate_limit"] = serde_json::json!(r);
                }
                let resp = auth(client.post(&url), token.as_ref())
                    .json(&body)
                    .send()
                    .await?;
                if resp.status().is_success() {
                    let rec: serde_json::Value = resp.json().await?;
                    println!("✓ Keypair created for '{}'", user_id);
                    println!("  Access key: {}", rec["access_key"].as_str().unwrap_or(""));
                    println!("  Secret key: {}", rec["secret_key"].as_str().unwrap_or(""));
                } else {
                    eprintln!("✗ Failed to create keypair: {}", resp.text().await?);
                }
            }
            KeypairCommand::Activate { access_key } => {
                let url = api_url(&args.console_url, &format!("/keypairs/{}", access_key));
                let body = serde_json::json!({ "is_active": true });
                let resp = auth(client.patch(&url), token.as_ref())
                    .json(&body)
                    .send()
                    .await?;
                if resp.status().is_success() {
                    println!("✓ Keypair '{}' activated", access_key);
                } else {
                    eprintln!("✗ Failed to activate keypair: {}", resp.text().await?);
                }
            }
            KeypairCommand::Deactivate { access_key } => {
                let url = api_url(&args.console_url, &format!("/keypairs/{}", access_key));
                let body = serde_json::json!({ "is_active": false });
                let resp = auth(client.patch(&url), token.as_ref())
                    .json(&body)
                    .send()
                    .await?;
                if resp.status().is_success() {
                    println!("✓ Keypair '{}' deactivated", access_key);
                } else {
                    eprintln!("✗ Failed to deactivate keypair: {}", resp.text().await?);
                }
            }
            KeypairCommand::Usage { access_key } => {
                let url = api_url(&args.console_url, &format!("/keypairs/{}/usage", access_key));
                let resp = auth(client.get(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let report: serde_json::Value = resp.json().await?;
                    print_usage_report(&report);
                } else {
                    eprintln!("✗ Failed to get keypair usage: {}", resp.text().await?);
                }
            }
        },
        Command::Policies { subcommand } => match subcommand {
            PolicyCommand::List => {
                let url = api_url(&args.console_url, "/resource-policies");
                let resp = auth(client.get(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let data: serde_json::Value = resp.json().await?;
                    let policies = data["policies"].as_array().cloned().unwrap_or_default();
                    print_policies(&policies);
                } else {
                    eprintln!("✗ Failed to list policies: {}", resp.text().await?);
                }
            }
            PolicyCommand::Get { name } => {
                let url = api_url(&args.console_url, &format!("/resource-policies/{}", name));
                let resp = auth(client.get(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let policy: serde_json::Value = resp.json().await?;
                    print_policy_detail(&policy);
                } else {
                    eprintln!("✗ Failed to get policy: {}", resp.text().await?);
                }
            }
        },
        Command::Maintenance { subcommand } => match subcommand {
            MaintenanceCommand::RecalculateUsage => {
                let url = api_url(&args.console_url, "/maintenance/recalculate-usage");
                let resp = auth(client.post(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let result: serde_json::Value = resp.json().await?;
                    let sessions = result["sessions_considered"].as_u64().unwrap_or(0);
                    let keypairs = result["keypairs_fixed"].as_u64().unwrap_or(0);
                    let agents = result["agents_fixed"].as_u64().unwrap_or(0);
                    let conflicts = result["conflicts"].as_u64().unwrap_or(0);
                    println!(
                        "Recalculation complete: {} keypairs fixed, {} agents fixed ({} sessions considered, {} conflicts)",
                        keypairs, agents, sessions, conflicts
                    );
                } else {
                    eprintln!("✗ Recalculation failed: {}", resp.text().await?);
                }
            }
            MaintenanceCommand::PurgeSessions => {
                let url = api_url(&args.console_url, "/maintenance/purge-terminated-sessions");
                let resp = auth(client.post(&url), token.as_ref()).send().await?;
                if resp.status().is_success() {
                    let result: serde_json::Value = resp.json().await?;
                    println!(
                        "✓ Purged {} terminated session record(s)",
                        result["purged"].as_u64().unwrap_or(0)
                    );
                } else {
                    eprintln!("✗ Failed to purge sessions: {}", resp.text().await?);
                }
            }
        },
        Command::Whoami => {
            let url = api_url(&args.console_url, "/whoami");
            let resp = auth(client.get(&url), token.as_ref()).send().await?;
            println!("{}", resp.text().await?);
        }
    }

    Ok(())
}
