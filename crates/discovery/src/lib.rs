use thiserror::Error;
use tracing::{info, warn};

use alphaess_client::{AlphaEssClient, ClientError};
use types::EssSystem;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no systems are registered to this AppID")]
    NoSystems,
    #[error("system {serial} is not registered to this AppID (registered: {})", .available.join(", "))]
    NotRegistered {
        serial: String,
        available: Vec<String>,
    },
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl DiscoveryError {
    /// Errors that no amount of retrying will fix without a config change.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DiscoveryError::NoSystems | DiscoveryError::NotRegistered { .. }
        )
    }
}

/// Fetches every system registered to the client's AppID.
pub async fn list_systems(client: &AlphaEssClient) -> Result<Vec<EssSystem>, DiscoveryError> {
    let systems = client.get_ess_list().await?;
    for system in &systems {
        info!(
            serial = %system.sys_sn,
            inverter = system.minv.as_deref().unwrap_or("-"),
            battery_kwh = system.cobat.unwrap_or_default(),
            pv_kwp = system.popv.unwrap_or_default(),
            "registered system"
        );
    }
    Ok(systems)
}

/// Confirms `serial` belongs to the AppID and returns its registration record.
pub async fn resolve_system(
    client: &AlphaEssClient,
    serial: &str,
) -> Result<EssSystem, DiscoveryError> {
    let systems = list_systems(client).await?;
    select_system(systems, serial)
}

pub fn select_system(systems: Vec<EssSystem>, serial: &str) -> Result<EssSystem, DiscoveryError> {
    if systems.is_empty() {
        warn!("ess list is empty");
        return Err(DiscoveryError::NoSystems);
    }

    let wanted = serial.trim();
    let available: Vec<String> = systems.iter().map(|system| system.sys_sn.clone()).collect();
    systems
        .into_iter()
        .find(|system| system.sys_sn.trim().eq_ignore_ascii_case(wanted))
        .ok_or_else(|| DiscoveryError::NotRegistered {
            serial: wanted.to_string(),
            available,
        })
}
