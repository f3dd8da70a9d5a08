pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "substances-hf")]
#[command(about = "Builds the dispensed-boxes-by-sex artifact for the studied substances")]
pub struct CliConfig {
    /// Path to the TOML build configuration
    #[arg(short, long, default_value = "build-config.toml")]
    pub config: PathBuf,

    /// Directory relative input paths are resolved against (default: the config file's directory)
    #[arg(long)]
    pub data_root: Option<PathBuf>,

    /// Output directory, overrides [output].path
    #[arg(short, long)]
    pub output: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,

    #[arg(long, help = "Validate the configuration and print the plan without building")]
    pub dry_run: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn data_root(&self) -> PathBuf {
        self.data_root.clone().unwrap_or_else(|| {
            self.config
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        })
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = CliConfig::parse_from(["substances-hf"]);
        assert_eq!(cli.config, PathBuf::from("build-config.toml"));
        assert!(!cli.dry_run);
        assert_eq!(cli.data_root(), PathBuf::new());
    }

    #[test]
    fn test_data_root_defaults_to_config_dir() {
        let cli = CliConfig::parse_from(["substances-hf", "--config", "conf/build.toml", "-o", "out"]);
        assert_eq!(cli.data_root(), PathBuf::from("conf"));
        assert_eq!(cli.output.as_deref(), Some("out"));
    }
}
