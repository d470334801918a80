//! WiFi Provisioning Service - Main Entry Point

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wifi_provisioning_service::{
    backend::WifiCtrlLink,
    config::{CliArgs, Settings},
    core::{coordinator::LifecycleCoordinator, endpoint::AckHandler},
    transport::ble::BleTransport,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wifi_provisioning=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();
    info!(?args, "starting WiFi provisioning service");
    let settings = Settings::from(args);

    // Event channels: link/IP layer and provisioning transport feed the
    // coordinator's single delivery loop
    let (link_tx, link_rx) = mpsc::channel(32);
    let (session_tx, session_rx) = mpsc::channel(32);

    // Link driver (wpa_supplicant via its control socket)
    let driver = match WifiCtrlLink::new(settings.interface.clone(), link_tx).await {
        Ok(driver) => Arc::new(driver),
        Err(e) => {
            error!("link driver initialization failed: {}", e);
            return Err(e.into());
        }
    };
    info!("link driver initialized for interface: {}", settings.interface);

    // Provisioning transport (BLE GATT)
    let transport = Arc::new(BleTransport::new(session_tx));

    let coordinator = LifecycleCoordinator::new(
        driver,
        transport,
        settings.provisioning.clone(),
        None,
        link_rx,
        session_rx,
    );

    let ready = coordinator.ready();
    let session = coordinator.session();

    // IdentityUnavailable and InitFailure abort the boot sequence here
    if let Err(e) = coordinator.start().await {
        error!("onboarding startup failed: {}", e);
        return Err(e.into());
    }

    let lifecycle = tokio::spawn(coordinator.run());

    // Baseline custom data endpoint
    if let Err(e) = session
        .register_endpoint("custom-data", Arc::new(AckHandler))
        .await
    {
        error!("endpoint registration failed: {}", e);
    }

    // Block on the ready signal, then idle until shutdown
    tokio::select! {
        _ = ready.wait() => {
            info!("network ready");
            #[cfg(feature = "systemd")]
            {
                let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT before network ready, shutting down");
            session.end().await.ok();
            return Ok(());
        }
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT (Ctrl+C), shutting down gracefully");
        }
        _ = shutdown_signal() => {
            info!("received SIGTERM, shutting down gracefully");
        }
        _ = lifecycle => {
            info!("lifecycle coordinator finished");
        }
    }

    // Idempotent; the session is normally gone by now
    session.end().await.ok();
    info!("shutting down...");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix platforms, just wait forever
    std::future::pending::<()>().await
}
