use chrono::{DateTime, Local};

use types::{DailyEnergy, Flow, PowerSnapshot};

const MISSING: &str = "--";
const LEFT_MARGIN: i32 = 10;
const SEPARATOR: &str = "=================================================";

/// One line of text at a fixed position on the landscape panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelLine {
    pub x: i32,
    pub y: i32,
    pub text: String,
}

/// The values shown for one poll, already split into flow directions.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub generated_at: DateTime<Local>,
    pub production: Option<f64>,
    pub battery_level: Option<f64>,
    pub load: Option<f64>,
    pub battery_flow: Option<Flow>,
    pub grid_flow: Option<Flow>,
    pub generation: Option<f64>,
    pub output_to_grid: Option<f64>,
    pub input_from_grid: Option<f64>,
}

impl Report {
    pub fn build(
        snapshot: &PowerSnapshot,
        energy: Option<&DailyEnergy>,
        generated_at: DateTime<Local>,
    ) -> Self {
        Self {
            generated_at,
            production: snapshot.ppv,
            battery_level: snapshot.soc,
            load: snapshot.pload,
            battery_flow: snapshot.pbat.map(Flow::from_signed),
            grid_flow: snapshot.pgrid.map(Flow::from_signed),
            generation: energy.and_then(|energy| energy.epv),
            output_to_grid: energy.and_then(|energy| energy.e_output),
            input_from_grid: energy.and_then(|energy| energy.e_input),
        }
    }

    /// Lines for the terminal, ending with a blank separator line.
    pub fn console_lines(&self) -> Vec<String> {
        vec![
            format!(
                "Current date and time: {}",
                self.generated_at.format("%Y-%m-%d %H:%M:%S")
            ),
            SEPARATOR.to_string(),
            format!("Current power production: {}", format_value(self.production)),
            format!("Current battery level: {}%", format_value(self.battery_level)),
            format!("Current load: {}", format_value(self.load)),
            match self.battery_flow {
                Some(Flow::Into(watts)) => format!("Power to battery: {}", format_value(Some(watts))),
                Some(Flow::From(watts)) => format!("Power from battery: {}", format_value(Some(watts))),
                None => format!("Battery power: {MISSING}"),
            },
            match self.grid_flow {
                Some(Flow::Into(watts)) => format!("Power to grid: {}", format_value(Some(watts))),
                Some(Flow::From(watts)) => format!("Power from grid: {}", format_value(Some(watts))),
                None => format!("Grid power: {MISSING}"),
            },
            format!("Today's power generation: {} kWh", format_value(self.generation)),
            format!("Today's output to the grid: {} kWh", format_value(self.output_to_grid)),
            format!("Today's input from the grid: {} kWh", format_value(self.input_from_grid)),
            String::new(),
        ]
    }

    /// Text placement for the 264x176 landscape panel.
    pub fn panel_lines(&self) -> Vec<PanelLine> {
        let battery = match self.battery_flow {
            Some(Flow::Into(watts)) => format!("Power to Battery: {} w", format_value(Some(watts))),
            Some(Flow::From(watts)) => format!("Power from Battery: {} w", format_value(Some(watts))),
            None => format!("Battery Power: {MISSING} w"),
        };
        let grid = match self.grid_flow {
            Some(Flow::Into(watts)) => format!("Power to Grid: {} w", format_value(Some(watts))),
            Some(Flow::From(watts)) => format!("Power from Grid: {} w", format_value(Some(watts))),
            None => format!("Grid Power: {MISSING} w"),
        };

        [
            (0, format!("Production: {} w", format_value(self.production))),
            (20, format!("Battery: {}%", format_value(self.battery_level))),
            (40, format!("Load: {} w", format_value(self.load))),
            (60, battery),
            (80, grid),
            (110, format!("Power Generation: {} kWh", format_value(self.generation))),
            (130, format!("Output to Grid: {} kWh", format_value(self.output_to_grid))),
            (150, format!("Input from Grid: {} kWh", format_value(self.input_from_grid))),
        ]
        .into_iter()
        .map(|(y, text)| PanelLine {
            x: LEFT_MARGIN,
            y,
            text,
        })
        .collect()
    }
}

/// Shortest decimal form of a reading (`1234`, `12.3`), or `--` when absent.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(value) if value.is_finite() => format!("{}", value + 0.0),
        _ => MISSING.to_string(),
    }
}
