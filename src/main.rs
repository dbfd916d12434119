/// Roomwatch - operator console engine
///
/// Serves the dashboard and moderation API over a document store.

use roomwatch::{config::ConsoleConfig, error::ConsoleResult, jobs, server, AppContext};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ConsoleResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomwatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Print banner
    print_banner();

    // Load configuration
    let config = ConsoleConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;
    ctx.start_feeds();
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    let result = server::serve((*ctx).clone()).await;
    ctx.shutdown();

    result
}

fn print_banner() {
    println!(
        r#"
    ____                                        __       __
   / __ \____  ____  ____ ___ _      ______ _/ /______/ /_
  / /_/ / __ \/ __ \/ __ `__ \ | /| / / __ `/ __/ ___/ __ \
 / _, _/ /_/ / /_/ / / / / / / |/ |/ / /_/ / /_/ /__/ / / /
/_/ |_|\____/\____/_/ /_/ /_/|__/|__/\__,_/\__/\___/_/ /_/

        Operator console engine v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
