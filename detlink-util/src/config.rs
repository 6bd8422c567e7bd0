//! CLI argument parsing into validated server/client configuration
//! (SPEC_FULL.md §4.F).

use std::path::PathBuf;

use clap::{App, Arg};
use detlink_proto::{AdminCode, DeviceType};

/// Default TCP port both binaries bind or connect to (§6).
pub const DEFAULT_PORT: u16 = 40000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    Usage(String),
    #[error("admin code `{0}` is not a valid 24-bit value")]
    InvalidAdminCode(String),
    #[error("unrecognized device type `{0}`")]
    InvalidDeviceType(String),
    #[error("device serial `{0}` is not a valid 16-bit value")]
    InvalidDeviceSerial(String),
    #[error("port `{0}` is not a valid port number")]
    InvalidPort(String),
}

impl From<clap::Error> for ConfigError {
    fn from(err: clap::Error) -> Self {
        ConfigError::Usage(err.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const VARIANTS: &'static [&'static str] = &["off", "error", "warn", "info", "debug", "trace"];

    fn parse(value: &str) -> Result<LogLevel, String> {
        match value.to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unrecognized log level `{other}`")),
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

fn parse_admin_code(value: &str) -> Result<AdminCode, ConfigError> {
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        value.parse::<u32>()
    }
    .map_err(|_| ConfigError::InvalidAdminCode(value.to_string()))?;

    if parsed > AdminCode::MASK {
        return Err(ConfigError::InvalidAdminCode(value.to_string()));
    }
    Ok(AdminCode::new(parsed))
}

fn parse_device_serial(value: &str) -> Result<u16, ConfigError> {
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidDeviceSerial(value.to_string()))
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidPort(value.to_string()))
}

/// Named bitmask tokens accepted by `--device-type`, so a typo is caught at
/// parse time instead of silently producing the wrong mask.
fn device_type_names() -> &'static [(&'static str, DeviceType)] {
    &[
        ("signal-controller", DeviceType::SIGNAL_CONTROLLER),
        ("coil", DeviceType::COIL),
        ("magnetic", DeviceType::MAGNETIC),
        ("ultrasonic", DeviceType::ULTRASONIC),
        ("video", DeviceType::VIDEO),
        ("microwave", DeviceType::MICROWAVE),
        ("radar", DeviceType::RADAR),
        ("rfid", DeviceType::RFID),
    ]
}

fn parse_device_type(value: &str) -> Result<DeviceType, ConfigError> {
    let lower = value.to_ascii_lowercase();
    device_type_names()
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, ty)| *ty)
        .ok_or_else(|| ConfigError::InvalidDeviceType(value.to_string()))
}

/// Resolved, validated configuration for the server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub admin_code: AdminCode,
    pub device_serial: u16,
    pub log_level: LogLevel,
    pub log_file: Option<PathBuf>,
}

/// Resolved, validated configuration for the client (detector) binary.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub port: u16,
    pub admin_code: AdminCode,
    pub device_type: DeviceType,
    pub device_serial: u16,
    pub log_level: LogLevel,
    pub log_file: Option<PathBuf>,
}

fn log_level_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("log-level")
        .short("l")
        .long("log-level")
        .takes_value(true)
        .default_value("info")
        .possible_values(LogLevel::VARIANTS)
}

fn log_file_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("log-file")
        .short("f")
        .long("log-file")
        .takes_value(true)
        .help("log destination; stderr if omitted")
}

fn admin_code_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("admin-code")
        .short("a")
        .long("admin-code")
        .takes_value(true)
        .required(true)
        .help("24-bit administrative-region code, decimal or 0x-prefixed hex")
}

fn port_arg<'a, 'b: 'a>(default: &'b str) -> Arg<'a, 'b> {
    Arg::with_name("port")
        .short("p")
        .long("port")
        .takes_value(true)
        .default_value(default)
}

fn device_id_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("device-id")
        .short("i")
        .long("device-id")
        .takes_value(true)
        .required(true)
        .help("this device's 16-bit serial number")
}

/// Parses server CLI arguments. `args` includes the program name at index 0,
/// matching `std::env::args()`.
pub fn parse_server_config<I, T>(args: I) -> Result<ServerConfig, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let default_port = DEFAULT_PORT.to_string();
    let matches = App::new("detlink-server")
        .about("GB/T 43229-2023 detector-link controller")
        .arg(port_arg(&default_port))
        .arg(admin_code_arg())
        .arg(device_id_arg())
        .arg(log_level_arg())
        .arg(log_file_arg())
        .get_matches_from_safe(args)?;

    Ok(ServerConfig {
        port: parse_port(matches.value_of("port").unwrap())?,
        admin_code: parse_admin_code(matches.value_of("admin-code").unwrap())?,
        device_serial: parse_device_serial(matches.value_of("device-id").unwrap())?,
        log_level: LogLevel::parse(matches.value_of("log-level").unwrap())
            .map_err(ConfigError::Usage)?,
        log_file: matches.value_of("log-file").map(PathBuf::from),
    })
}

/// Parses client CLI arguments. `args` includes the program name at index 0.
pub fn parse_client_config<I, T>(args: I) -> Result<ClientConfig, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let default_port = DEFAULT_PORT.to_string();
    let device_type_values: Vec<&str> = device_type_names().iter().map(|(name, _)| *name).collect();

    let matches = App::new("detlink-client")
        .about("GB/T 43229-2023 detector-link client")
        .arg(
            Arg::with_name("server")
                .short("s")
                .long("server")
                .takes_value(true)
                .required(true)
                .help("controller host or IP"),
        )
        .arg(port_arg(&default_port))
        .arg(admin_code_arg())
        .arg(
            Arg::with_name("device-type")
                .short("t")
                .long("device-type")
                .takes_value(true)
                .required(true)
                .possible_values(&device_type_values),
        )
        .arg(device_id_arg())
        .arg(log_level_arg())
        .arg(log_file_arg())
        .get_matches_from_safe(args)?;

    Ok(ClientConfig {
        server: matches.value_of("server").unwrap().to_string(),
        port: parse_port(matches.value_of("port").unwrap())?,
        admin_code: parse_admin_code(matches.value_of("admin-code").unwrap())?,
        device_type: parse_device_type(matches.value_of("device-type").unwrap())?,
        device_serial: parse_device_serial(matches.value_of("device-id").unwrap())?,
        log_level: LogLevel::parse(matches.value_of("log-level").unwrap())
            .map_err(ConfigError::Usage)?,
        log_file: matches.value_of("log-file").map(PathBuf::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_parses_hex_admin_code() {
        let cfg = parse_server_config(["detlink-server", "-a", "0x123456", "-i", "7"]).unwrap();
        assert_eq!(cfg.admin_code.value(), 0x123456);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.log_level, LogLevel::Info);
    }

    #[test]
    fn out_of_range_admin_code_is_rejected_before_anything_else() {
        let err = parse_server_config(["detlink-server", "-a", "0xffffffff", "-i", "1"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAdminCode(_)));
    }

    #[test]
    fn unknown_device_type_token_is_rejected() {
        let err = parse_client_config([
            "detlink-client",
            "-s",
            "127.0.0.1",
            "-a",
            "1",
            "-t",
            "not-a-real-type",
            "-i",
            "1",
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Usage(_)));
    }

    #[test]
    fn client_config_resolves_named_device_type() {
        let cfg = parse_client_config([
            "detlink-client",
            "-s",
            "10.0.0.1",
            "-a",
            "99",
            "-t",
            "radar",
            "-i",
            "4",
        ])
        .unwrap();
        assert_eq!(cfg.device_type, DeviceType::RADAR);
        assert_eq!(cfg.server, "10.0.0.1");
    }
}
