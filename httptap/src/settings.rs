use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use httptap_common::MAX_DATA_SIZE;
use serde::Deserialize;

use crate::{cli::Cli, output::OutputFormat};

pub const DEFAULT_OUTPUT_FILE: &str = "/traces/http-trace.txt";
pub const DEFAULT_PREVIEW_BYTES: usize = 512;

/// Which tracepoints to attach and how much payload to render.
#[derive(Debug, Deserialize, Clone, Default)]
#[allow(unused)]
pub struct CaptureSettings {
    pub write_enter: Option<bool>,
    pub read_exit: Option<bool>,
    pub preview_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[allow(unused)]
pub struct Settings {
    pub otel_exporter_otlp_endpoint: Option<String>,
    pub output_file: Option<PathBuf>,
    pub output_format: Option<OutputFormat>,
    #[serde(default)]
    pub capture: CaptureSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from an optional YAML file, then `.env` and process environment.
    ///
    /// Nested keys use `__`, e.g. `CAPTURE__READ_EXIT=false`.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Command line flags take precedence over file and environment.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(output) = &cli.output {
            self.output_file = Some(output.clone());
        }
        if let Some(format) = cli.format {
            self.output_format = Some(format);
        }
        if cli.no_inbound {
            self.capture.read_exit = Some(false);
        }
        if let Some(preview) = cli.max_preview {
            self.capture.preview_bytes = Some(preview);
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FILE))
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.unwrap_or_default()
    }

    pub fn preview_bytes(&self) -> usize {
        self.capture
            .preview_bytes
            .unwrap_or(DEFAULT_PREVIEW_BYTES)
            .min(MAX_DATA_SIZE)
    }

    pub fn write_enter_enabled(&self) -> bool {
        self.capture.write_enter.unwrap_or(true)
    }

    pub fn read_exit_enabled(&self) -> bool {
        self.capture.read_exit.unwrap_or(true)
    }
}
