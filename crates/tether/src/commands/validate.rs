//! `tether validate`: structural checks, no I/O beyond the filesystem.

use anyhow::Result;
use clap::Args;
use serde_json::json;
use tether_mcp::McpClient;

use super::Context;

/// Arguments for `tether validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Server id or name; all servers when omitted
    pub server: Option<String>,
}

/// Run `tether validate`.
pub async fn run(args: ValidateArgs, ctx: &Context) -> Result<()> {
    let servers = match &args.server {
        Some(key) => vec![ctx.server(key)?],
        None => ctx.config.servers.iter().collect(),
    };

    let results: Vec<_> = servers
        .into_iter()
        .map(|server| (server, McpClient::validate_config(server)))
        .collect();
    let invalid = results.iter().filter(|(_, r)| r.is_err()).count();

    if ctx.json_output {
        let output: Vec<_> = results
            .iter()
            .map(|(server, result)| {
                json!({
                    "id": server.id,
                    "name": server.name,
                    "valid": result.is_ok(),
                    "error": result.as_ref().err().map(|e| e.to_string()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for (server, result) in &results {
            match result {
                Ok(()) => println!("✓ {}", server.name),
                Err(e) => println!("✗ {}: {}", server.name, e),
            }
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} of {} server configs are invalid", invalid, results.len());
    }
    Ok(())
}
