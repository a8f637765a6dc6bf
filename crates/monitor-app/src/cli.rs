use anyhow::Result;

pub const USAGE: &str = "\
usage: alphaess-monitor [options]

  --credentials <path>  four-line credentials file (default: configuration.conf)
  --config <path>       TOML or JSON settings file
  --once                poll once, print the report and exit
  --list-systems        list the systems registered to the AppID and exit
  --help                show this message";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CliArgs {
    pub credentials: Option<String>,
    pub config: Option<String>,
    pub once: bool,
    pub list_systems: bool,
    pub help: bool,
}

impl CliArgs {
    /// Parses arguments without the program name. Both `--flag value` and
    /// `--flag=value` are accepted.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg, None),
            };

            match flag.as_str() {
                "--credentials" => {
                    parsed.credentials = Some(take_value(&flag, inline, &mut args)?);
                }
                "--config" => {
                    parsed.config = Some(take_value(&flag, inline, &mut args)?);
                }
                "--once" => parsed.once = true,
                "--list-systems" => parsed.list_systems = true,
                "-h" | "--help" => parsed.help = true,
                other => anyhow::bail!("unknown argument {other}\n\n{USAGE}"),
            }
        }

        if parsed.once && parsed.list_systems {
            anyhow::bail!("--once and --list-systems cannot be combined");
        }

        Ok(parsed)
    }
}

fn take_value(
    flag: &str,
    inline: Option<String>,
    args: &mut impl Iterator<Item = String>,
) -> Result<String> {
    match inline.or_else(|| args.next()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => anyhow::bail!("{flag} requires a value"),
    }
}
