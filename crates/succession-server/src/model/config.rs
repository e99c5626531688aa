//! Configuration management for Succession nodes
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `SUCCESSION_`-prefixed environment variables (`__` separates key segments,
//! e.g. `SUCCESSION_SERVICE__PORT`), then command line flags.

use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use succession_common::{ELECTION_NAMESPACE, REGISTRY_NAMESPACE, local_host_name};

use crate::service::ClusterSettings;
use crate::startup::LoggingConfig;

const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
const DEFAULT_SCHEME: &str = "http";
const DEFAULT_SERVICE_PORT: u16 = 8080;
const DEFAULT_CLUSTER_SIZE: usize = 3;
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 5;

/// Command line arguments for the node
#[derive(Debug, Default, Parser)]
#[command(
    name = "succession-server",
    version,
    about = "Leader election with worker registration and discovery"
)]
pub struct Cli {
    /// Configuration file (YAML); missing files are ignored
    #[arg(short = 'c', long = "config")]
    pub config_file: Option<String>,
    /// Base port of the published service addresses
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    /// Host name published in service addresses
    #[arg(long = "host")]
    pub host: Option<String>,
    /// Number of in-process participants
    #[arg(short = 'n', long = "cluster-size")]
    pub cluster_size: Option<usize>,
    /// Expire the current leader every N seconds (0 disables)
    #[arg(long = "failover-interval")]
    pub failover_interval: Option<u64>,
    /// Path to watch for create, delete, data and children changes
    #[arg(long = "target-path")]
    pub target_path: Option<String>,
}

/// Application configuration loaded from config files, environment and CLI
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration using the process's command line.
    pub fn new() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> anyhow::Result<Self> {
        let config_file = args
            .config_file
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let mut builder = Config::builder()
            .add_source(File::with_name(&config_file).required(false))
            .add_source(
                Environment::with_prefix("SUCCESSION")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = args.port {
            builder = builder.set_override("service.port", i64::from(v))?;
        }
        if let Some(v) = args.host {
            builder = builder.set_override("service.host", v)?;
        }
        if let Some(v) = args.cluster_size {
            builder = builder.set_override("cluster.size", v as i64)?;
        }
        if let Some(v) = args.failover_interval {
            builder = builder.set_override("cluster.failover_interval_secs", v as i64)?;
        }
        if let Some(v) = args.target_path {
            builder = builder.set_override("watch.target_path", v)?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    // ========================================================================
    // Coordination namespaces
    // ========================================================================

    pub fn election_namespace(&self) -> String {
        self.config
            .get_string("election.namespace")
            .unwrap_or(ELECTION_NAMESPACE.to_string())
    }

    pub fn registry_namespace(&self) -> String {
        self.config
            .get_string("registry.namespace")
            .unwrap_or(REGISTRY_NAMESPACE.to_string())
    }

    // ========================================================================
    // Published service address
    // ========================================================================

    pub fn service_scheme(&self) -> String {
        self.config
            .get_string("service.scheme")
            .unwrap_or(DEFAULT_SCHEME.to_string())
    }

    pub fn service_host(&self) -> String {
        self.config
            .get_string("service.host")
            .unwrap_or_else(|_| local_host_name())
    }

    pub fn service_port(&self) -> u16 {
        self.config
            .get_int("service.port")
            .ok()
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(DEFAULT_SERVICE_PORT)
    }

    // ========================================================================
    // Cluster runner
    // ========================================================================

    pub fn cluster_size(&self) -> usize {
        self.config
            .get_int("cluster.size")
            .ok()
            .and_then(|v| usize::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_CLUSTER_SIZE)
    }

    /// `None` when automatic failover is disabled.
    pub fn failover_interval(&self) -> Option<Duration> {
        self.config
            .get_int("cluster.failover_interval_secs")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v > 0)
            .map(Duration::from_secs)
    }

    pub fn report_interval(&self) -> Duration {
        let secs = self
            .config
            .get_int("cluster.report_interval_secs")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_REPORT_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn target_path(&self) -> Option<String> {
        self.config
            .get_string("watch.target_path")
            .ok()
            .filter(|v| !v.is_empty())
    }

    pub fn cluster_settings(&self) -> ClusterSettings {
        ClusterSettings {
            size: self.cluster_size(),
            election_namespace: self.election_namespace(),
            registry_namespace: self.registry_namespace(),
            scheme: self.service_scheme(),
            host: self.service_host(),
            base_port: self.service_port(),
            report_interval: self.report_interval(),
            failover_interval: self.failover_interval(),
            target_path: self.target_path(),
        }
    }

    // ========================================================================
    // Logging
    // ========================================================================

    /// Logging settings from the `log.*` keys, falling back to the
    /// `SUCCESSION_LOG_*` environment variables.
    pub fn logging_config(&self) -> LoggingConfig {
        let env = LoggingConfig::from_env();
        let level = self
            .config
            .get_string("log.level")
            .unwrap_or_else(|_| env.console_level.to_string());

        let mut logging = LoggingConfig::from_config(
            self.config
                .get_string("log.dir")
                .ok()
                .or_else(|| Some(env.log_dir.display().to_string())),
            self.config
                .get_bool("log.console")
                .unwrap_or(env.console_output),
            self.config.get_bool("log.file").unwrap_or(env.file_logging),
            &level,
        );
        logging.rotation = self
            .config
            .get_string("log.rotation")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(env.rotation);
        logging
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::LogRotation;
    use std::io::Write;

    fn load(args: Cli) -> Configuration {
        Configuration::from_cli(Cli {
            config_file: args
                .config_file
                .or_else(|| Some("does/not/exist.yml".to_string())),
            ..args
        })
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let configuration = load(Cli::default());

        assert_eq!(configuration.election_namespace(), "/election");
        assert_eq!(configuration.registry_namespace(), "/service_registry");
        assert_eq!(configuration.service_scheme(), "http");
        assert_eq!(configuration.cluster_size(), 3);
        assert_eq!(configuration.failover_interval(), None);
        assert_eq!(configuration.report_interval(), Duration::from_secs(5));
        assert!(configuration.target_path().is_none());
        assert!(!configuration.service_host().is_empty());
    }

    #[test]
    fn test_cli_overrides() {
        let configuration = load(Cli {
            port: Some(9000),
            host: Some("node-a".to_string()),
            cluster_size: Some(5),
            failover_interval: Some(30),
            target_path: Some("/target_znode".to_string()),
            ..Cli::default()
        });

        let settings = configuration.cluster_settings();
        assert_eq!(settings.base_port, 9000);
        assert_eq!(settings.host, "node-a");
        assert_eq!(settings.size, 5);
        assert_eq!(settings.failover_interval, Some(Duration::from_secs(30)));
        assert_eq!(settings.target_path.as_deref(), Some("/target_znode"));
    }

    #[test]
    fn test_zero_failover_interval_disables_failover() {
        let configuration = load(Cli {
            failover_interval: Some(0),
            ..Cli::default()
        });
        assert_eq!(configuration.failover_interval(), None);
    }

    #[test]
    fn test_yaml_file_source() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            "election:\n  namespace: /leaders\nservice:\n  scheme: https\n  port: 7000\ncluster:\n  size: 2\n  report_interval_secs: 1"
        )
        .unwrap();

        let configuration = load(Cli {
            config_file: Some(file.path().display().to_string()),
            port: Some(7100),
            ..Cli::default()
        });

        assert_eq!(configuration.election_namespace(), "/leaders");
        assert_eq!(configuration.service_scheme(), "https");
        // CLI wins over the file
        assert_eq!(configuration.service_port(), 7100);
        assert_eq!(configuration.cluster_size(), 2);
        assert_eq!(configuration.report_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_log_section() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            "log:\n  level: debug\n  console: false\n  file: true\n  dir: /tmp/succession-test-logs\n  rotation: hourly"
        )
        .unwrap();

        let configuration = load(Cli {
            config_file: Some(file.path().display().to_string()),
            ..Cli::default()
        });

        let logging = configuration.logging_config();
        assert_eq!(logging.rotation, LogRotation::Hourly);
        assert_eq!(logging.file_level, tracing::Level::DEBUG);
        assert!(!logging.console_output);
        assert_eq!(
            logging.log_dir,
            std::path::PathBuf::from("/tmp/succession-test-logs")
        );
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "succession-server",
            "--port",
            "8100",
            "-n",
            "4",
            "--target-path",
            "/target_znode",
        ]);
        assert_eq!(cli.port, Some(8100));
        assert_eq!(cli.cluster_size, Some(4));
        assert_eq!(cli.target_path.as_deref(), Some("/target_znode"));
        assert!(cli.config_file.is_none());
    }
}
