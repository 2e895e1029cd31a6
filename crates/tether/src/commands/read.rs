//! `tether read`: print a resource's text.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::Context;

/// Arguments for `tether read`.
#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Resource URI
    pub uri: String,

    /// Read from this server (id or name) instead of the first that lists the URI
    #[arg(long)]
    pub server: Option<String>,
}

/// Run `tether read`.
pub async fn run(args: ReadArgs, ctx: &Context) -> Result<()> {
    let client = ctx.connected_client(args.server.as_deref()).await?;
    let outcome = match &args.server {
        Some(key) => {
            let id = ctx.server(key)?.id.clone();
            client.read_resource_from(&id, &args.uri).await
        }
        None => client.read_resource(&args.uri).await,
    };
    client.disconnect_all().await;
    let text = outcome?;

    if ctx.json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({"uri": args.uri, "text": text}))?
        );
    } else {
        println!("{}", text);
    }
    Ok(())
}
