//! Webhook Server Example
//!
//! Starts a webhook receiver configured from `RECURLY_HOOK_*` environment
//! variables and prints every notification it dispatches.
//!
//! Run with:
//! `RECURLY_HOOK_USERNAME=user RECURLY_HOOK_PASSWORD=pass cargo run -p recurly-hook-server --example webhook_server`
//!
//! Then send a notification:
//! `curl -u user:pass -d '<new_account_notification><account><account_code>1</account_code></account></new_account_notification>' http://127.0.0.1:3420/recurly/callback`

use hook_server::logging::{init_logging_from_env, is_initialized};
use hook_server::{HookConfig, RecurlyHook, TracingLogger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if !is_initialized() {
        init_logging_from_env()?;
    }

    let config = HookConfig::from_env()?.with_logger(TracingLogger);
    if !config.has_credentials() {
        println!("⚠️  RECURLY_HOOK_USERNAME / RECURLY_HOOK_PASSWORD not set, every webhook will be rejected");
    }

    let mut hook = RecurlyHook::new(config);
    hook.on("new_account_notification", |data| {
        let account = &data["new_account_notification"]["account"];
        println!("👤 New account: {}", account["account_code"]);
    })
    .on_any(|name, data| {
        println!("📨 {name}");
        if let Ok(pretty) = serde_json::to_string_pretty(data) {
            println!("{pretty}");
        }
    })
    .on_error(|error, reply| {
        println!("❌ Rejected webhook ({}): {error}", reply.message);
    });

    let server = hook
        .listen_with(|addr| println!("🚀 Listening on {addr}, press Ctrl+C to stop"))
        .await?;
    println!("🔗 Webhook URL: {}", server.url());

    tokio::signal::ctrl_c().await?;
    println!("\n🛑 Shutting down...");
    server.shutdown().await?;

    Ok(())
}
