//! `serve`: run the local session API until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};

use kyco_sessions::server::{ApiServer, ApiState};
use kyco_sessions::services::Services;

pub async fn serve_command(services: Services, port: Option<u16>) -> Result<()> {
    let report = services.recover().await?;
    if report.agents_reset > 0 || report.checkpoints.quarantined > 0 {
        println!(
            "Recovered: {} agents reset, {} unreadable checkpoints set aside",
            report.agents_reset, report.checkpoints.quarantined
        );
    }

    let port = port.unwrap_or(services.config.server.port);
    let token = Some(services.config.server.http_token.clone());
    let server = ApiServer::bind(port, token)?;
    println!("KYCo sessions API on http://{}", server.addr());

    let state = ApiState {
        services: Arc::new(services),
        runtime: tokio::runtime::Handle::current(),
    };
    std::thread::spawn(move || server.run(state));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    println!("Shutting down");
    Ok(())
}
