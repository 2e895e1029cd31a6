//! `tether call`: invoke a tool and print its result.

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::Value;
use tether_mcp::ToolContent;

use super::Context;

/// Arguments for `tether call`.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Tool name
    pub tool: String,

    /// Route to this server (id or name) instead of the first that has the tool
    #[arg(long)]
    pub server: Option<String>,

    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,
}

/// Run `tether call`.
pub async fn run(args: CallArgs, ctx: &Context) -> Result<()> {
    let arguments: Value = serde_json::from_str(&args.args)
        .with_context(|| format!("--args is not valid JSON: {}", args.args))?;
    if !arguments.is_object() {
        anyhow::bail!("--args must be a JSON object");
    }

    let client = ctx.connected_client(args.server.as_deref()).await?;
    let outcome = match &args.server {
        Some(key) => {
            let id = ctx.server(key)?.id.clone();
            client.call_tool_on(&id, &args.tool, arguments).await
        }
        None => client.call_tool(&args.tool, arguments).await,
    };
    client.disconnect_all().await;
    let result = outcome?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for block in &result.content {
            match block {
                ToolContent::Text { text } => println!("{}", text),
                ToolContent::Image { mime_type, data } | ToolContent::Audio { mime_type, data } => {
                    println!("[{} content, {} bytes base64]", mime_type, data.len())
                }
                ToolContent::Resource { resource } => match &resource.text {
                    Some(text) => println!("{}", text),
                    None => println!("[embedded resource {}]", resource.uri),
                },
                ToolContent::Unknown => println!("[unsupported content block]"),
            }
        }
    }

    if result.is_error() {
        anyhow::bail!("tool '{}' reported an error", args.tool);
    }
    Ok(())
}
