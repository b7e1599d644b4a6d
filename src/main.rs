/// Flowforge: dependency-ordered workflow execution engine
///
/// Main entry point. Reads configuration from the environment and runs the workflow
/// named by FLOWFORGE_WORKFLOW:
/// - Schedule trigger nodes run on their cron schedule
/// - Webhook trigger nodes listen on their configured method and path
/// - A workflow without triggers runs once

use flowforge::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (defaults to 0.0.0.0:5678, overridable via FLOWFORGE_* env vars)
    let config = Config::default();

    start_server(config).await
}
