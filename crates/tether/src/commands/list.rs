//! `tether list`: configured servers and whether their configs are valid.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::{Context, target, truncate};

/// Arguments for `tether list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Include disabled servers
    #[arg(long)]
    pub all: bool,
}

/// Run `tether list`.
pub async fn run(args: ListArgs, ctx: &Context) -> Result<()> {
    let servers: Vec<_> = ctx
        .config
        .servers
        .iter()
        .filter(|s| args.all || s.enabled)
        .collect();

    if servers.is_empty() {
        if ctx.json_output {
            println!("[]");
        } else {
            println!("No MCP servers configured.");
            println!();
            println!("Add [[servers]] entries to servers.toml, for example:");
            println!("  [[servers]]");
            println!("  name = \"filesystem\"");
            println!("  command = \"mcp-server-filesystem\"");
        }
        return Ok(());
    }

    if ctx.json_output {
        let output: Vec<_> = servers
            .iter()
            .map(|server| {
                let mut entry = json!({
                    "id": server.id,
                    "name": server.name,
                    "transport": server.transport.to_string(),
                    "enabled": server.enabled,
                    "target": target(server),
                });
                if let Err(e) = server.validate() {
                    entry["invalid"] = json!(e.to_string());
                }
                entry
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{:<16} {:<20} {:<10} {:<9} {:<40}",
        "ID", "NAME", "TRANSPORT", "STATUS", "TARGET"
    );
    println!("{}", "-".repeat(98));

    for server in servers {
        let status = match (server.validate(), server.enabled) {
            (Err(_), _) => "invalid",
            (Ok(()), true) => "enabled",
            (Ok(()), false) => "disabled",
        };
        println!(
            "{:<16} {:<20} {:<10} {:<9} {:<40}",
            truncate(&server.id, 16),
            truncate(&server.name, 20),
            server.transport,
            status,
            truncate(&target(server), 40)
        );

        if ctx.verbose {
            for (key, value) in &server.env {
                println!("  env {}={}", key, value);
            }
            for key in server.headers.keys() {
                println!("  header {}: <redacted>", key);
            }
            if let Err(e) = server.validate() {
                println!("  error: {}", e);
            }
        }
    }

    Ok(())
}
