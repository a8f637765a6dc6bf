use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Local, TimeZone};
use display::{
    build_sinks, render, ConsoleSink, FrameSink, PanelConfig, Report, Sink, PANEL_HEIGHT,
    PANEL_WIDTH,
};
use types::{DailyEnergy, PowerSnapshot};

fn snapshot() -> PowerSnapshot {
    PowerSnapshot {
        ppv: Some(1520.0),
        soc: Some(87.5),
        pbat: Some(-400.0),
        pgrid: Some(120.0),
        pload: Some(820.0),
        pev: Some(0.0),
    }
}

fn energy() -> DailyEnergy {
    DailyEnergy {
        epv: Some(21.4),
        e_output: Some(9.8),
        e_input: Some(1.2),
        ..DailyEnergy::default()
    }
}

fn report() -> Report {
    let at = Local
        .with_ymd_and_hms(2024, 5, 1, 12, 30, 5)
        .single()
        .expect("local time");
    Report::build(&snapshot(), Some(&energy()), at)
}

#[test]
fn console_lines_follow_flow_direction() {
    let lines = report().console_lines();
    assert_eq!(
        lines,
        vec![
            "Current date and time: 2024-05-01 12:30:05",
            "=================================================",
            "Current power production: 1520",
            "Current battery level: 87.5%",
            "Current load: 820",
            "Power to battery: 400",
            "Power from grid: 120",
            "Today's power generation: 21.4 kWh",
            "Today's output to the grid: 9.8 kWh",
            "Today's input from the grid: 1.2 kWh",
            "",
        ]
    );
}

#[test]
fn missing_energy_and_flows_render_placeholders() {
    let at = Local::now();
    let snapshot = PowerSnapshot {
        ppv: Some(0.0),
        pgrid: Some(-2500.0),
        ..PowerSnapshot::default()
    };
    let report = Report::build(&snapshot, None, at);
    let lines = report.console_lines();
    assert_eq!(lines[3], "Current battery level: --%");
    assert_eq!(lines[5], "Battery power: --");
    assert_eq!(lines[6], "Power to grid: 2500");
    assert_eq!(lines[7], "Today's power generation: -- kWh");

    let panel = report.panel_lines();
    assert_eq!(panel[0].text, "Production: 0 w");
    assert_eq!(panel[4].text, "Power to Grid: 2500 w");
    assert_eq!(panel[5].text, "Power Generation: -- kWh");
}

#[test]
fn panel_layout_positions() {
    let lines = report().panel_lines();
    let placed: Vec<(i32, i32, &str)> = lines
        .iter()
        .map(|line| (line.x, line.y, line.text.as_str()))
        .collect();
    assert_eq!(
        placed,
        vec![
            (10, 0, "Production: 1520 w"),
            (10, 20, "Battery: 87.5%"),
            (10, 40, "Load: 820 w"),
            (10, 60, "Power to Battery: 400 w"),
            (10, 80, "Power from Grid: 120 w"),
            (10, 110, "Power Generation: 21.4 kWh"),
            (10, 130, "Output to Grid: 9.8 kWh"),
            (10, 150, "Input from Grid: 1.2 kWh"),
        ]
    );
}

#[test]
fn rendered_frame_has_ink_only_inside_text_rows() {
    let frame = render(&report());
    assert_eq!(
        frame.as_bytes().len(),
        (PANEL_WIDTH as usize / 8) * PANEL_HEIGHT as usize
    );

    let ink_in = |x0: u32, x1: u32, y0: u32, y1: u32| {
        (y0..y1).any(|y| (x0..x1).any(|x| frame.is_black(x, y)))
    };
    assert!(ink_in(10, PANEL_HEIGHT, 0, 18), "first line drawn");
    assert!(ink_in(10, PANEL_HEIGHT, 150, 168), "last line drawn");
    assert!(!ink_in(0, 10, 0, PANEL_WIDTH), "left margin stays blank");
    assert!(!ink_in(0, PANEL_HEIGHT, 99, 110), "gap before energy section");
}

#[test]
fn pbm_header_uses_landscape_size() {
    let pbm = render(&report()).to_pbm();
    let header = b"P4\n264 176\n";
    assert_eq!(&pbm[..header.len()], header);
    assert_eq!(pbm.len(), header.len() + 33 * 176);
}

#[test]
fn console_sink_writes_lines() {
    let mut sink = ConsoleSink::new(Vec::new());
    sink.present(&report()).expect("present");
    let text = String::from_utf8(sink.into_inner()).expect("utf8");
    assert!(text.starts_with("Current date and time: 2024-05-01 12:30:05\n"));
    assert!(text.contains("Power to battery: 400\n"));
    assert!(text.ends_with("Today's input from the grid: 1.2 kWh\n\n"));
}

#[test]
fn frame_sink_skips_unchanged_frames() {
    let path = temp_frame_path("frame_sink_skips_unchanged_frames");
    let mut sink = FrameSink::new(&path);

    sink.init().expect("init");
    assert_eq!(sink.writes(), 1);
    let blank = std::fs::read(&path).expect("blank frame");
    assert!(blank[b"P4\n264 176\n".len()..].iter().all(|byte| *byte == 0));

    sink.present(&report()).expect("present");
    assert_eq!(sink.writes(), 2);

    // a later report with identical values only differs in its timestamp
    let mut later = report();
    later.generated_at = Local::now();
    sink.present(&later).expect("present again");
    assert_eq!(sink.writes(), 2);

    let drawn = std::fs::read(&path).expect("drawn frame");
    assert_eq!(drawn, render(&report()).to_pbm());

    cleanup(&path);
}

#[test]
fn build_sinks_follows_config() {
    let sinks = build_sinks(&PanelConfig::default());
    let names: Vec<&str> = sinks.iter().map(|sink| sink.name()).collect();
    assert_eq!(names, vec!["console"]);

    let sinks = build_sinks(&PanelConfig {
        console: false,
        frame_path: Some(PathBuf::from("frame.pbm")),
    });
    let names: Vec<&str> = sinks.iter().map(|sink| sink.name()).collect();
    assert_eq!(names, vec!["frame"]);
}

fn temp_frame_path(prefix: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let pid = std::process::id();
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    path.push(format!("{prefix}-{pid}-{ts}"));
    path.push("frame.pbm");
    path
}

fn cleanup(path: &PathBuf) {
    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}
