//! Reference backend command: `slotboard serve`.

use anyhow::Result;
use console::style;
use std::path::PathBuf;

use slotboard::backend::{BoardServer, ServerConfig, shutdown_signal};
use slotboard::config::SlotboardConfig;

pub async fn cmd_serve(
    config: &SlotboardConfig,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    let mut server_config = ServerConfig::from_config(config);
    if let Some(port) = port {
        server_config.port = port;
    }
    if let Some(db_path) = db_path {
        server_config.db_path = db_path;
    }
    server_config.dev_mode = dev;

    let server = BoardServer::bind(&server_config).await?;
    let addr = server.local_addr()?;
    println!(
        "{} http://{}  (db: {})",
        style("Board backend running at").green(),
        addr,
        server_config.db_path.display()
    );

    server
        .serve(async {
            shutdown_signal().await;
            println!("\nShutting down...");
        })
        .await
}
