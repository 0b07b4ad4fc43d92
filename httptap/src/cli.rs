use std::path::PathBuf;

use clap::Parser;

use crate::output::OutputFormat;

/// Trace HTTP traffic crossing write(2)/read(2) system-wide.
#[derive(Debug, Parser)]
#[command(name = "httptap", version)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// YAML settings file, overridden by environment variables
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Trace file path (default: /traces/http-trace.txt, or $OUTPUT_FILE)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Trace file format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Do not attach the read-exit probe
    #[arg(long)]
    pub no_inbound: bool,

    /// Payload bytes shown per event in the trace
    #[arg(long, value_name = "BYTES")]
    pub max_preview: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_settings_untouched() {
        let cli = Cli::try_parse_from(["httptap"]).unwrap();
        assert!(!cli.verbose);
        assert!(!cli.no_inbound);
        assert!(cli.config.is_none());
        assert!(cli.output.is_none());
        assert!(cli.format.is_none());
        assert!(cli.max_preview.is_none());
    }

    #[test]
    fn parses_all_flags() {
        let cli = Cli::try_parse_from([
            "httptap",
            "-v",
            "--output",
            "/tmp/trace.ndjson",
            "--format",
            "json",
            "--no-inbound",
            "--max-preview",
            "64",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert!(cli.no_inbound);
        assert_eq!(cli.output, Some(PathBuf::from("/tmp/trace.ndjson")));
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert_eq!(cli.max_preview, Some(64));
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(Cli::try_parse_from(["httptap", "--format", "xml"]).is_err());
    }
}
