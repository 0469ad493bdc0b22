use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tracing::warn;

use crate::model::PalletSpec;
use crate::packing::PackingConfig;
use crate::solver::BetaRange;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub solver: SolverConfig,
    pub packing: PackerConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            solver: SolverConfig::from_env(),
            packing: PackerConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "CASE_PICKING_API_HOST";
    const PORT_VAR: &'static str = "CASE_PICKING_API_PORT";

    fn from_env() -> Self {
        let host_value = env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (Self::DEFAULT_BIND_IP, Self::DEFAULT_HOST.to_string())
            }
        };

        let port = match env_string(Self::PORT_VAR) {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    warn!(
                        "⚠️ {} must not be 0. Using {}.",
                        Self::PORT_VAR,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    warn!(
                        "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                        Self::PORT_VAR,
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Defaults of a search run. Requests may override each of them.
#[derive(Clone, Debug)]
pub struct SolverConfig {
    pallet: PalletSpec,
    max_time: Duration,
    beta_range: BetaRange,
    seed: Option<u64>,
}

impl SolverConfig {
    pub const DEFAULT_MAX_TIME_SECS: f64 = 5.0;
    const PALLET_SIZE_VAR: &'static str = "CASE_PICKING_PALLET_SIZE";
    const PALLET_MAX_WEIGHT_VAR: &'static str = "CASE_PICKING_PALLET_MAX_WEIGHT";
    const MAX_TIME_VAR: &'static str = "CASE_PICKING_MAX_TIME_SECS";
    const BETA_LOW_VAR: &'static str = "CASE_PICKING_BETA_LOW";
    const BETA_HIGH_VAR: &'static str = "CASE_PICKING_BETA_HIGH";
    const SEED_VAR: &'static str = "CASE_PICKING_SEED";

    fn from_env() -> Self {
        let size = env_string(Self::PALLET_SIZE_VAR)
            .and_then(|raw| parse_dims(&raw, Self::PALLET_SIZE_VAR))
            .unwrap_or(PalletSpec::DEFAULT_SIZE);
        let max_weight = load_f64_with_warning(
            Self::PALLET_MAX_WEIGHT_VAR,
            PalletSpec::DEFAULT_MAX_WEIGHT,
            |value| value > 0.0 && value.is_finite(),
            "must be greater than 0",
        );
        // Every component was validated above.
        let pallet = PalletSpec::new(size, max_weight).unwrap_or_default();

        let max_time_secs = load_f64_with_warning(
            Self::MAX_TIME_VAR,
            Self::DEFAULT_MAX_TIME_SECS,
            is_valid_duration_secs,
            "must be a non-negative number of seconds",
        );

        let low = load_f64_with_warning(
            Self::BETA_LOW_VAR,
            BetaRange::DEFAULT_LOW,
            |value| value > 0.0 && value < 1.0,
            "must be between 0 and 1 (exclusive)",
        );
        let high = load_f64_with_warning(
            Self::BETA_HIGH_VAR,
            BetaRange::DEFAULT_HIGH,
            |value| value > 0.0 && value < 1.0,
            "must be between 0 and 1 (exclusive)",
        );
        let beta_range = BetaRange::new(low, high).unwrap_or_else(|err| {
            warn!("⚠️ {}. Using the default beta range.", err);
            BetaRange::default()
        });

        let seed = env_string(Self::SEED_VAR).and_then(|raw| match raw.parse::<u64>() {
            Ok(seed) => Some(seed),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Seeding from entropy.",
                    Self::SEED_VAR,
                    raw,
                    err
                );
                None
            }
        });

        Self {
            pallet,
            max_time: Duration::try_from_secs_f64(max_time_secs)
                .unwrap_or(Self::default_max_time()),
            beta_range,
            seed,
        }
    }

    fn default_max_time() -> Duration {
        Duration::from_secs_f64(Self::DEFAULT_MAX_TIME_SECS)
    }

    pub fn pallet(&self) -> PalletSpec {
        self.pallet
    }

    pub fn max_time(&self) -> Duration {
        self.max_time
    }

    pub fn beta_range(&self) -> BetaRange {
        self.beta_range
    }

    /// Fixed seed for reproducible runs; `None` seeds from entropy.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            pallet: PalletSpec::default(),
            max_time: Self::default_max_time(),
            beta_range: BetaRange::default(),
            seed: None,
        }
    }
}

/// Configuration of the reference packing oracle.
#[derive(Clone, Debug, Default)]
pub struct PackerConfig {
    packing: PackingConfig,
}

impl PackerConfig {
    const GRID_STEP_VAR: &'static str = "CASE_PICKING_PACKING_GRID_STEP";
    const SUPPORT_RATIO_VAR: &'static str = "CASE_PICKING_PACKING_SUPPORT_RATIO";
    const HEIGHT_EPSILON_VAR: &'static str = "CASE_PICKING_PACKING_HEIGHT_EPSILON";
    const GENERAL_EPSILON_VAR: &'static str = "CASE_PICKING_PACKING_GENERAL_EPSILON";
    const BALANCE_RATIO_VAR: &'static str = "CASE_PICKING_PACKING_BALANCE_LIMIT_RATIO";
    const ALLOW_ROTATION_VAR: &'static str = "CASE_PICKING_PACKING_ALLOW_ROTATIONS";

    fn from_env() -> Self {
        let grid_step = load_f64_with_warning(
            Self::GRID_STEP_VAR,
            PackingConfig::DEFAULT_GRID_STEP,
            |value| value > 0.0,
            "must be greater than 0",
        );

        let support_ratio = load_f64_with_warning(
            Self::SUPPORT_RATIO_VAR,
            PackingConfig::DEFAULT_SUPPORT_RATIO,
            |value| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
        );

        let height_epsilon = load_f64_with_warning(
            Self::HEIGHT_EPSILON_VAR,
            PackingConfig::DEFAULT_HEIGHT_EPSILON,
            |value| value > 0.0,
            "must be greater than 0",
        );

        let general_epsilon = load_f64_with_warning(
            Self::GENERAL_EPSILON_VAR,
            PackingConfig::DEFAULT_GENERAL_EPSILON,
            |value| value > 0.0,
            "must be greater than 0",
        );

        let balance_limit_ratio = load_f64_with_warning(
            Self::BALANCE_RATIO_VAR,
            PackingConfig::DEFAULT_BALANCE_LIMIT_RATIO,
            |value| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
        );

        let allow_item_rotation = env_string(Self::ALLOW_ROTATION_VAR)
            .and_then(|raw| parse_bool(&raw, Self::ALLOW_ROTATION_VAR))
            .unwrap_or(PackingConfig::DEFAULT_ALLOW_ITEM_ROTATION);

        let packing = PackingConfig::builder()
            .grid_step(grid_step)
            .support_ratio(support_ratio)
            .height_epsilon(height_epsilon)
            .general_epsilon(general_epsilon)
            .balance_limit_ratio(balance_limit_ratio)
            .allow_item_rotation(allow_item_rotation)
            .build();

        Self { packing }
    }

    pub fn packing_config(&self) -> PackingConfig {
        self.packing
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("⚠️ Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

/// Parses `"w,d,h"` (commas or `x` as separator) into positive dimensions.
fn parse_dims(raw: &str, var_name: &str) -> Option<(f64, f64, f64)> {
    let parts: Vec<f64> = raw
        .split([',', 'x', 'X'])
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()
        .filter(|parts: &Vec<f64>| parts.iter().all(|v| *v > 0.0 && v.is_finite()))?;
    match parts.as_slice() {
        &[w, d, h] => Some((w, d, h)),
        _ => {
            warn!(
                "⚠️ {} ('{}') must contain exactly three dimensions. Using default value.",
                var_name, raw
            );
            None
        }
    }
}

/// Non-negative, finite and small enough to fit a `Duration`.
fn is_valid_duration_secs(value: f64) -> bool {
    Duration::try_from_secs_f64(value).is_ok()
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
) -> f64 {
    match env_string(var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) if validator(value) => value,
            Ok(_) => {
                warn!(
                    "⚠️ {} contains invalid value '{}': {}. Using {}.",
                    var_name, raw, invalid_hint, default
                );
                default
            }
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_true_values() {
        assert_eq!(parse_bool("1", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("true", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("yes", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("on", "TEST_VAR"), Some(true));

        // Test case insensitivity
        assert_eq!(parse_bool("TRUE", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("Yes", "TEST_VAR"), Some(true));

        // Test with whitespace
        assert_eq!(parse_bool(" true ", "TEST_VAR"), Some(true));
    }

    #[test]
    fn test_parse_bool_false_values() {
        assert_eq!(parse_bool("0", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("false", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("no", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("OFF", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("  0  ", "TEST_VAR"), Some(false));
    }

    #[test]
    fn test_parse_bool_invalid_values() {
        assert_eq!(parse_bool("invalid", "TEST_VAR"), None);
        assert_eq!(parse_bool("2", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn test_parse_dims() {
        assert_eq!(
            parse_dims("120,80,150", "TEST_VAR"),
            Some((120.0, 80.0, 150.0))
        );
        assert_eq!(
            parse_dims(" 100 x 60 x 90 ", "TEST_VAR"),
            Some((100.0, 60.0, 90.0))
        );
        assert_eq!(parse_dims("120,80", "TEST_VAR"), None);
        assert_eq!(parse_dims("120,-80,150", "TEST_VAR"), None);
        assert_eq!(parse_dims("a,b,c", "TEST_VAR"), None);
    }

    #[test]
    fn test_duration_secs_validation() {
        assert!(is_valid_duration_secs(0.0));
        assert!(is_valid_duration_secs(2.5));
        assert!(!is_valid_duration_secs(-1.0));
        assert!(!is_valid_duration_secs(f64::NAN));
        assert!(!is_valid_duration_secs(f64::INFINITY));
        assert!(!is_valid_duration_secs(1e300));
    }

    #[test]
    fn test_solver_defaults() {
        let config = SolverConfig::default();
        assert_eq!(config.pallet(), PalletSpec::default());
        assert_eq!(config.max_time(), Duration::from_secs(5));
        assert_eq!(config.beta_range(), BetaRange::default());
        assert_eq!(config.seed(), None);
    }
}
