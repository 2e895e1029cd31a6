//! `tether tools`: tools from every connected server.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::{Context, truncate};

/// Arguments for `tether tools`.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Only this server (id or name)
    #[arg(long)]
    pub server: Option<String>,

    /// Show input schemas
    #[arg(long)]
    pub full: bool,
}

/// Run `tether tools`.
pub async fn run(args: ToolsArgs, ctx: &Context) -> Result<()> {
    let client = ctx.connected_client(args.server.as_deref()).await?;
    let tools = client.available_tools_by_server();
    client.disconnect_all().await;

    if ctx.json_output {
        let output: Vec<_> = tools
            .iter()
            .map(|(server, tool)| {
                json!({
                    "server": server,
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if tools.is_empty() {
        println!("No tools available.");
        return Ok(());
    }

    println!("{:<16} {:<24} {:<50}", "SERVER", "TOOL", "DESCRIPTION");
    println!("{}", "-".repeat(92));
    for (server, tool) in &tools {
        println!(
            "{:<16} {:<24} {:<50}",
            truncate(server, 16),
            truncate(&tool.name, 24),
            truncate(&tool.description, 50)
        );
        if args.full || ctx.verbose {
            for name in tool.input_schema.properties.keys() {
                let required = if tool.input_schema.is_required(name) {
                    " (required)"
                } else {
                    ""
                };
                println!(
                    "    {}: {}{} {}",
                    name,
                    tool.input_schema.property_type(name).unwrap_or("any"),
                    required,
                    tool.input_schema.property_description(name).unwrap_or("")
                );
            }
        }
    }

    Ok(())
}
