use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use std::path::{Path, PathBuf};

use squareframe::image::PngCompression;
use squareframe::{
    DecodeError, Decoder, FrameConfig, FrameInfo, FramingParameters, Session, SessionError,
    SourceImage,
};

#[derive(Parser)]
#[command(name = "squareframe-cli")]
#[command(about = "Frame a photo inside a white-bordered square", long_about = None)]
#[command(version)]
struct Args {
    /// Input image (JPEG, PNG, WebP, HEIC, ...)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Border thickness, as a percentage of the image's longer side
    #[arg(short, long, value_name = "PERCENT", allow_hyphen_values = true)]
    border: Option<f64>,

    /// JSON config file (default: ~/.config/squareframe/config.json)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JPEG quality (0-100)
    #[arg(long, value_name = "QUALITY")]
    jpeg_quality: Option<u8>,

    /// PNG compression level
    #[arg(long, value_enum)]
    png_compression: Option<PngCompressionArg>,

    /// Verbose output
    #[arg(short, long, default_value_t)]
    verbose: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, default_value_t)]
    quiet: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PngCompressionArg {
    Fast,
    Default,
    Best,
}

impl From<PngCompressionArg> for PngCompression {
    fn from(arg: PngCompressionArg) -> Self {
        match arg {
            PngCompressionArg::Fast => PngCompression::Fast,
            PngCompressionArg::Default => PngCompression::Default,
            PngCompressionArg::Best => PngCompression::Best,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(args.verbose, args.quiet);

    // Validate input file
    if !args.input.exists() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    // Create output directory if it doesn't exist
    if !args.output_dir.exists() {
        std::fs::create_dir_all(&args.output_dir).context("Failed to create output directory")?;
    }

    let config = build_config(&args)?;
    let params = FramingParameters::new(args.border.unwrap_or(config.border_percentage));

    let output_path = run(&args.input, &args.output_dir, &config, &params)?;

    if !args.quiet {
        log::info!("Done: {}", output_path.display());
    }

    Ok(())
}

fn run(
    input: &Path,
    output_dir: &Path,
    config: &FrameConfig,
    params: &FramingParameters,
) -> Result<PathBuf> {
    let source = SourceImage::from_path(input)?;
    let decoder = Decoder::from_config(config);

    let session = match Session::new().select(source, &decoder) {
        Ok(session) => session,
        Err(e) => {
            let help = guidance(&e);
            let err =
                anyhow::Error::new(e).context(format!("Failed to load {}", input.display()));
            return Err(match help {
                Some(help) => err.context(help),
                None => err,
            });
        }
    };

    if let Some(info) = session.source_info() {
        log::info!("Original\n{info}");
    }

    log::info!("Processing...");
    let framed = session.frame(params)?;
    let encoded = session.encode(&framed, config)?;
    log::info!("Framed\n{}", FrameInfo::new(&framed, params, &encoded));

    let output_path = output_dir.join(&encoded.file_name);
    std::fs::write(&output_path, &encoded.data).context("Failed to write output file")?;

    Ok(output_path)
}

/// The longer guidance that goes with a failed selection. It becomes the
/// outermost error message, so it is printed even in quiet mode.
fn guidance(error: &SessionError) -> Option<String> {
    let SessionError::Decode(e) = error else {
        return None;
    };

    let help = e.remediation()?;
    Some(match e {
        DecodeError::UnsupportedVariant(_) => help.to_string(),
        _ => format!("{e}\n\n{help}"),
    })
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<FrameConfig> {
    let mut config = match (&args.config, FrameConfig::default_path()) {
        (Some(path), _) => FrameConfig::load(path)?,
        (None, Some(path)) => FrameConfig::load_or_default(&path)?,
        (None, None) => FrameConfig::default(),
    };

    if let Some(quality) = args.jpeg_quality {
        config.jpeg_quality = quality;
    }

    // Validate quality
    if config.jpeg_quality > 100 {
        anyhow::bail!("Quality must be between 0 and 100");
    }

    if let Some(compression) = args.png_compression {
        config.png_compression = compression.into();
    }

    Ok(config)
}
