//! PLCsim Fleet - Bulk control of simulated PLC instances
//!
//! Tracks the instances of a PLC simulation engine, applies lifecycle
//! transitions across the whole fleet with per-instance failure isolation,
//! publishes change and issue events, and pins the engine's worker processes
//! to CPU cores.
//!
//! The engine and the UI stay outside this crate: the engine plugs in through
//! [`SimulationInstance`] and [`InstanceSource`], the UI through
//! [`FleetController::subscribe`] and [`ConfirmationGate`].
//!
//! ```no_run
//! use plcsim_fleet::{FleetCommand, FleetController, FleetSettings, SystemProcessInspector};
//! # fn engine() -> Box<dyn plcsim_fleet::InstanceSource> { unimplemented!() }
//!
//! let settings = FleetSettings::load(&FleetSettings::default_path())?;
//! plcsim_fleet::init_logging(&settings)?;
//!
//! let mut controller =
//!     FleetController::new(settings, engine(), Box::new(SystemProcessInspector::new()));
//! controller.subscribe(|event| println!("{}", event.message()));
//! controller.dispatch(&FleetCommand::Refresh);
//! controller.dispatch(&FleetCommand::RunAll);
//! controller.dispatch(&FleetCommand::AssignAffinity);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod core;
pub mod platform;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::core::*;

/// Application name constant
pub const APP_NAME: &str = "PLCsimFleet";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over the settings. Fails if a global
/// subscriber is already installed.
pub fn init_logging(settings: &FleetSettings) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.log_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::info!("{} v{} logging initialized", APP_NAME, APP_VERSION);
    Ok(())
}
