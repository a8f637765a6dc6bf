use std::fmt;
use std::fs;
use std::path::Path;

use thiserror::Error;

/// Conventional name of the four-line credentials file.
pub const CREDENTIALS_FILE: &str = "configuration.conf";

const LINE_NAMES: [&str; 4] = ["API base URL", "AppID", "AppSecret", "serial number"];

/// Contents of `configuration.conf`: base URL, AppID, AppSecret and inverter
/// serial number, one per line in that order.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub base_url: String,
    pub app_id: String,
    pub app_secret: String,
    pub serial_number: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("serial_number", &self.serial_number)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("read credentials file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {0} ({name}) is missing", name = line_name(*.0))]
    MissingLine(usize),
    #[error("line {0} ({name}) is empty", name = line_name(*.0))]
    EmptyLine(usize),
    #[error("unexpected content after line 4")]
    TrailingContent,
}

pub fn load_credentials(path: &Path) -> Result<Credentials, CredentialsError> {
    let content = fs::read_to_string(path).map_err(|source| CredentialsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_credentials(&content)
}

/// Parses the four-line format. Lines are trimmed and trailing blank lines
/// are ignored; anything else beyond line 4 is rejected. A blank line is
/// reported before a short file.
pub fn parse_credentials(content: &str) -> Result<Credentials, CredentialsError> {
    let mut lines: Vec<&str> = content.lines().map(str::trim).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    let present = lines.len().min(LINE_NAMES.len());
    if let Some(index) = lines[..present].iter().position(|line| line.is_empty()) {
        return Err(CredentialsError::EmptyLine(index + 1));
    }
    if lines.len() < LINE_NAMES.len() {
        return Err(CredentialsError::MissingLine(lines.len() + 1));
    }
    if lines.len() > LINE_NAMES.len() {
        return Err(CredentialsError::TrailingContent);
    }

    Ok(Credentials {
        base_url: lines[0].to_string(),
        app_id: lines[1].to_string(),
        app_secret: lines[2].to_string(),
        serial_number: lines[3].to_string(),
    })
}

fn line_name(line: usize) -> &'static str {
    line.checked_sub(1)
        .and_then(|index| LINE_NAMES.get(index))
        .copied()
        .unwrap_or("unknown")
}
