//! ajamedia Command-Line Interface
//!
//! Validates output configurations and drives capture sessions against the
//! loopback device, so a setup can be checked without a card installed.

mod colors;
mod commands;
mod exit_codes;
mod logging;

use clap::{Args, Parser, Subcommand, ValueEnum};
use exit_codes::ExitCode;

/// ajamedia - AJA output session CLI
#[derive(Parser, Debug)]
#[command(name = "ajamedia")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check an output configuration without opening the port
    Validate {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Run a capture session on the loopback device
    Run {
        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        options: RunOptions,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the configuration file location
    Path,
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Overrides applied on top of the configuration file.
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Output port, e.g. device0/single1
    #[arg(short, long)]
    port: Option<String>,

    /// Frame width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Frame height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Frame rate: 59.94, 30000/1001, 25, ...
    #[arg(short, long)]
    rate: Option<String>,

    /// Pixel format: yuv8, yuv10, rgba8, rgb10
    #[arg(long)]
    pixel_format: Option<String>,

    /// Send key on the next port (needs an RGB pixel format)
    #[arg(long)]
    key: bool,

    /// Block each frame until the device is ready for the next
    #[arg(long)]
    wait_sync: bool,

    /// Burn the timecode into the top-left corner of each frame
    #[arg(long)]
    burn_timecode: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunOptions {
    /// Number of frames to send
    #[arg(short = 'n', long, default_value_t = 60)]
    frames: u64,

    /// Field to read back from the last frame
    #[arg(long, value_enum, default_value_t = FieldArg::None)]
    field: FieldArg,

    /// Stamp frames with the wall-clock time of day instead of the frame count
    #[arg(long)]
    wall_clock: bool,

    /// Start the viewport with texture alpha ignored
    #[arg(long)]
    ignore_alpha: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldArg {
    /// Progressive readback
    None,
    Even,
    Odd,
}

fn main() {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.quiet || cli.json);

    // Build the async runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    let exit_code = runtime.block_on(run(cli));
    std::process::exit(exit_code.as_i32());
}

async fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Commands::Validate { output } => commands::validate(&output, cli.json, cli.quiet),
        Commands::Run { output, options } => {
            commands::run(output, options, cli.json, cli.quiet).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Path => commands::config_path(cli.json, cli.quiet),
            ConfigAction::Show => commands::config_show(cli.json),
            ConfigAction::Init { force } => commands::config_init(force, cli.json, cli.quiet),
        },
        Commands::Version => {
            commands::version(cli.json);
            ExitCode::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Verify the CLI definition is valid
    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    /// Test parsing 'validate' with no overrides
    #[test]
    fn parse_validate() {
        let cli = Cli::try_parse_from(["ajamedia", "validate"]).unwrap();
        assert!(!cli.json);
        assert!(!cli.quiet);
        assert!(!cli.verbose);
        match cli.command {
            Commands::Validate { output } => {
                assert!(output.port.is_none());
                assert!(!output.key);
            }
            _ => panic!("Expected Validate command"),
        }
    }

    /// Test parsing 'validate' with overrides
    #[test]
    fn parse_validate_with_overrides() {
        let cli = Cli::try_parse_from([
            "ajamedia",
            "validate",
            "--port",
            "device0/single2",
            "--width",
            "1280",
            "--height",
            "720",
            "-r",
            "59.94",
            "--pixel-format",
            "rgba8",
            "--key",
        ])
        .unwrap();
        match cli.command {
            Commands::Validate { output } => {
                assert_eq!(output.port.as_deref(), Some("device0/single2"));
                assert_eq!(output.width, Some(1280));
                assert_eq!(output.height, Some(720));
                assert_eq!(output.rate.as_deref(), Some("59.94"));
                assert_eq!(output.pixel_format.as_deref(), Some("rgba8"));
                assert!(output.key);
            }
            _ => panic!("Expected Validate command"),
        }
    }

    /// Test parsing 'run' defaults
    #[test]
    fn parse_run_defaults() {
        let cli = Cli::try_parse_from(["ajamedia", "run"]).unwrap();
        match cli.command {
            Commands::Run { options, .. } => {
                assert_eq!(options.frames, 60);
                assert_eq!(options.field, FieldArg::None);
                assert!(!options.wall_clock);
            }
            _ => panic!("Expected Run command"),
        }
    }

    /// Test parsing 'run' with options
    #[test]
    fn parse_run_with_options() {
        let cli = Cli::try_parse_from([
            "ajamedia",
            "run",
            "-n",
            "3",
            "--field",
            "odd",
            "--wait-sync",
            "--burn-timecode",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { output, options } => {
                assert_eq!(options.frames, 3);
                assert_eq!(options.field, FieldArg::Odd);
                assert!(output.wait_sync);
                assert!(output.burn_timecode);
            }
            _ => panic!("Expected Run command"),
        }
    }

    /// Test parsing 'config' subcommands
    #[test]
    fn parse_config() {
        let cli = Cli::try_parse_from(["ajamedia", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true }
            }
        ));
        let cli = Cli::try_parse_from(["ajamedia", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path
            }
        ));
    }

    /// Test that global flags work after subcommand
    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ajamedia", "run", "--json", "-q"]).unwrap();
        assert!(cli.json);
        assert!(cli.quiet);
    }

    /// Test invalid field value returns error
    #[test]
    fn parse_invalid_field() {
        let result = Cli::try_parse_from(["ajamedia", "run", "--field", "top"]);
        assert!(result.is_err());
    }

    /// Test invalid command returns error
    #[test]
    fn parse_invalid_command() {
        let result = Cli::try_parse_from(["ajamedia", "invalid"]);
        assert!(result.is_err());
    }
}
