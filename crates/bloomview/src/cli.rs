use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use renderer::{BlurMode, GpuPowerPreference, MIN_BRIGHT_RANGE, OFFSET_RANGE, TONE_SCALE_RANGE};

#[derive(Parser, Debug)]
#[command(
    name = "bloomview",
    author,
    version,
    about = "Kawase and dual Kawase bloom viewer"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Configuration file to load instead of the discovered `config.toml`.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Image to texture the scene plane with (defaults to a checkerboard).
    #[arg(long, value_name = "PATH", global = true)]
    pub image: Option<PathBuf>,

    /// Blur used for the bloom (`kawase` or `dual-kawase`).
    #[arg(long, value_name = "MODE", value_parser = parse_blur, global = true)]
    pub blur: Option<BlurMode>,

    /// Strength of the blurred highlights added back onto the scene (0-1).
    #[arg(long, value_name = "SCALE", value_parser = parse_tone_scale, global = true)]
    pub tone_scale: Option<f32>,

    /// Luminance threshold of the bright pass (0-1).
    #[arg(long, value_name = "LUMA", value_parser = parse_min_bright, global = true)]
    pub min_bright: Option<f32>,

    /// Sample spread of the dual Kawase passes (0-10).
    #[arg(long, value_name = "TEXELS", value_parser = parse_offset, global = true)]
    pub offset: Option<f32>,

    /// Sigma increment used when building the blur kernel.
    #[arg(long, value_name = "STEP", value_parser = parse_sigma_step, global = true)]
    pub sigma_step: Option<f32>,

    /// Adapter power preference (`low` or `high`).
    #[arg(long, value_name = "PREFERENCE", value_parser = parse_gpu_power)]
    pub gpu_power: Option<GpuPowerPreference>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a single frame without a window and write it as PNG.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Destination PNG path.
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// Image size (e.g. `640x360`); falls back to the window size.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x720".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{trimmed}'"))?;

    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

pub fn parse_blur(value: &str) -> Result<BlurMode, String> {
    value.parse()
}

pub fn parse_gpu_power(value: &str) -> Result<GpuPowerPreference, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" => Ok(GpuPowerPreference::High),
        other => Err(format!(
            "unknown gpu power preference '{other}'; expected low or high"
        )),
    }
}

fn parse_tone_scale(value: &str) -> Result<f32, String> {
    parse_in_range("tone scale", value, TONE_SCALE_RANGE)
}

fn parse_min_bright(value: &str) -> Result<f32, String> {
    parse_in_range("min bright", value, MIN_BRIGHT_RANGE)
}

fn parse_offset(value: &str) -> Result<f32, String> {
    parse_in_range("offset", value, OFFSET_RANGE)
}

fn parse_sigma_step(value: &str) -> Result<f32, String> {
    let step: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid sigma step '{value}'"))?;
    if !step.is_finite() || step <= 0.0 {
        return Err("sigma step must be a positive number".to_string());
    }
    Ok(step)
}

fn parse_in_range(
    name: &str,
    value: &str,
    range: std::ops::RangeInclusive<f32>,
) -> Result<f32, String> {
    let parsed: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid {name} '{value}'"))?;
    if !range.contains(&parsed) {
        return Err(format!(
            "{name} must be within [{}, {}]",
            range.start(),
            range.end()
        ));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_size_specifications() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size(" 64 X 32 ").unwrap(), (64, 32));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("wide x tall").is_err());
    }

    #[test]
    fn parses_blur_and_power_names() {
        assert_eq!(parse_blur("dual-kawase").unwrap(), BlurMode::DualKawase);
        assert!(parse_blur("box").is_err());
        assert_eq!(parse_gpu_power("LOW").unwrap(), GpuPowerPreference::Low);
        assert!(parse_gpu_power("medium").is_err());
    }

    #[test]
    fn rejects_parameters_outside_their_ranges() {
        assert_eq!(parse_tone_scale("0.25").unwrap(), 0.25);
        assert!(parse_tone_scale("1.5").is_err());
        assert!(parse_offset("11").is_err());
        assert!(parse_sigma_step("0").is_err());
    }

    #[test]
    fn export_subcommand_accepts_run_flags() {
        let cli = Cli::try_parse_from([
            "bloomview",
            "export",
            "--output",
            "frame.png",
            "--size",
            "32x24",
            "--blur",
            "dual-kawase",
        ])
        .expect("parse export");

        assert_eq!(cli.run.blur, Some(BlurMode::DualKawase));
        match cli.command {
            Some(Command::Export(args)) => {
                assert_eq!(args.output, PathBuf::from("frame.png"));
                assert_eq!(args.size, Some((32, 24)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_runs_the_viewer() {
        let cli = Cli::try_parse_from(["bloomview", "--tone-scale", "0.8", "--size", "800x600"])
            .expect("parse run");
        assert!(cli.command.is_none());
        assert_eq!(cli.run.tone_scale, Some(0.8));
        assert_eq!(cli.run.size, Some((800, 600)));
    }
}
