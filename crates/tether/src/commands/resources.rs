//! `tether resources`: resources from every connected server.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::{Context, truncate};

/// Arguments for `tether resources`.
#[derive(Args, Debug)]
pub struct ResourcesArgs {
    /// Only this server (id or name)
    #[arg(long)]
    pub server: Option<String>,
}

/// Run `tether resources`.
pub async fn run(args: ResourcesArgs, ctx: &Context) -> Result<()> {
    let client = ctx.connected_client(args.server.as_deref()).await?;
    let resources = client.available_resources();
    client.disconnect_all().await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&json!(resources))?);
        return Ok(());
    }

    if resources.is_empty() {
        println!("No resources available.");
        return Ok(());
    }

    println!("{:<40} {:<24} {:<20}", "URI", "NAME", "TYPE");
    println!("{}", "-".repeat(86));
    for resource in &resources {
        println!(
            "{:<40} {:<24} {:<20}",
            truncate(&resource.uri, 40),
            truncate(&resource.name, 24),
            resource.mime_type.as_deref().unwrap_or("-")
        );
        if ctx.verbose {
            if let Some(description) = &resource.description {
                println!("    {}", description);
            }
        }
    }

    Ok(())
}
