use serde::{Deserialize, Serialize};

/// One energy storage system registered to an AppID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EssSystem {
    pub sys_sn: String,
    /// Installed PV capacity in kWp.
    #[serde(default)]
    pub popv: Option<f64>,
    /// Inverter model.
    #[serde(default)]
    pub minv: Option<String>,
    /// Inverter capacity in kW.
    #[serde(default)]
    pub poinv: Option<f64>,
    /// Battery capacity in kWh.
    #[serde(default)]
    pub cobat: Option<f64>,
    /// Battery model.
    #[serde(default)]
    pub mbat: Option<String>,
    #[serde(default)]
    pub surplus_cobat: Option<f64>,
    /// Usable battery capacity in percent.
    #[serde(default)]
    pub us_capacity: Option<f64>,
    #[serde(default)]
    pub ems_status: Option<String>,
}

/// Latest instantaneous power readings, all in watts except `soc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerSnapshot {
    #[serde(default)]
    pub ppv: Option<f64>,
    /// Battery state of charge in percent.
    #[serde(default)]
    pub soc: Option<f64>,
    /// Negative while the battery is charging.
    #[serde(default)]
    pub pbat: Option<f64>,
    /// Negative while feeding into the grid.
    #[serde(default)]
    pub pgrid: Option<f64>,
    #[serde(default)]
    pub pload: Option<f64>,
    #[serde(default)]
    pub pev: Option<f64>,
}

/// Energy totals for one calendar day, in kWh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyEnergy {
    #[serde(default)]
    pub sys_sn: Option<String>,
    #[serde(default)]
    pub the_date: Option<String>,
    #[serde(default)]
    pub epv: Option<f64>,
    #[serde(default)]
    pub e_output: Option<f64>,
    #[serde(default)]
    pub e_input: Option<f64>,
    #[serde(default)]
    pub e_charge: Option<f64>,
    #[serde(default)]
    pub e_discharge: Option<f64>,
    #[serde(default)]
    pub e_grid_charge: Option<f64>,
    #[serde(default)]
    pub e_charging_pile: Option<f64>,
}

/// One point of the intraday power curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerSample {
    #[serde(default)]
    pub sys_sn: Option<String>,
    pub upload_time: String,
    #[serde(default)]
    pub ppv: Option<f64>,
    #[serde(default)]
    pub load: Option<f64>,
    #[serde(default)]
    pub cbat: Option<f64>,
    #[serde(default)]
    pub feed_in: Option<f64>,
    #[serde(default)]
    pub grid_charge: Option<f64>,
    #[serde(default)]
    pub pcharging_pile: Option<f64>,
}

/// Battery charging windows. Times are `HH:MM`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeConfig {
    /// Charge stops once the battery reaches this percentage.
    pub bat_high_cap: f64,
    /// 1 enables charging from the grid.
    pub grid_charge: u8,
    pub time_chae1: String,
    pub time_chae2: String,
    pub time_chaf1: String,
    pub time_chaf2: String,
}

/// Battery discharging windows. Times are `HH:MM`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DischargeConfig {
    /// Discharge stops once the battery falls to this percentage.
    pub bat_use_cap: f64,
    /// 1 enables time controlled discharge.
    pub ctr_dis: u8,
    pub time_dise1: String,
    pub time_dise2: String,
    pub time_disf1: String,
    pub time_disf2: String,
}

/// Direction of a signed power reading relative to a battery or the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Flow {
    /// Power flowing into the battery or grid; magnitude in watts.
    Into(f64),
    /// Power drawn from the battery or grid; magnitude in watts.
    From(f64),
}

impl Flow {
    pub fn from_signed(value: f64) -> Self {
        // normalises -0.0
        let value = value + 0.0;
        if value < 0.0 {
            Flow::Into(-value)
        } else {
            Flow::From(value)
        }
    }

    pub fn magnitude(self) -> f64 {
        match self {
            Flow::Into(value) | Flow::From(value) => value,
        }
    }
}
