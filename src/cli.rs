//! Command line options
//!
//! Flags override the config file. String options are validated here
//! so the run never starts with a bad value.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::constants::FAR_BACKGROUND_Z_ORIGIN;
use crate::controller::{RunSettings, TransferMode};
use crate::error::OptionsError;
use crate::pipeline::prepare::{Mirror, PrepareSettings};
use crate::pipeline::Placement;
use crate::utils::parse_color_spec;

/// Display images in the terminal using the kitty graphics protocol
#[derive(Parser, Debug, Default)]
#[command(name = "pixcat", version)]
pub struct Args {
    /// Image files or directories ("-" reads an image from standard input)
    pub paths: Vec<String>,

    /// How pixel data reaches the terminal: detect, stream, file or memory
    #[arg(long, value_name = "MODE")]
    pub transfer_mode: Option<String>,

    /// Print the best supported transfer mode (memory, file or stream) and exit
    #[arg(long)]
    pub detect_support: bool,

    /// Seconds to wait for the terminal to answer capability queries
    #[arg(long, value_name = "SECONDS")]
    pub detection_timeout: Option<f64>,

    /// Place the image in a cell rectangle: WIDTHxHEIGHT@LEFTxTOP
    #[arg(long, value_name = "WxH@LxT")]
    pub place: Option<String>,

    /// Z index of the image. Prefix with "--" to draw under text that has a background
    #[arg(short = 'z', long, value_name = "N", allow_hyphen_values = true)]
    pub z_index: Option<String>,

    /// Color for transparent pixels, or "none"
    #[arg(long, value_name = "COLOR")]
    pub background: Option<String>,

    /// Mirror the image: none, horizontal, vertical or both
    #[arg(long, value_name = "AXIS")]
    pub mirror: Option<String>,

    /// Delete all images currently on screen first
    #[arg(long)]
    pub clear: bool,

    /// Wait for Enter before exiting
    #[arg(long)]
    pub hold: bool,

    /// Print the terminal window size in pixels (WIDTHxHEIGHT) and exit
    #[arg(long)]
    pub print_window_size: bool,

    /// Config file to use instead of the default locations
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Validated options for one run
#[derive(Debug, Clone)]
pub struct Options {
    pub paths: Vec<String>,
    pub run: RunSettings,
    /// Screen width is filled in once the terminal is known
    pub prepare: PrepareSettings,
    pub hold: bool,
    pub print_window_size: bool,
}

impl Options {
    pub fn resolve(args: Args, config: &Config) -> Result<Self, OptionsError> {
        let mode = if args.detect_support {
            TransferMode::DetectOnly
        } else {
            parse_transfer_mode(
                args.transfer_mode
                    .as_deref()
                    .unwrap_or(&config.detection.transfer_mode),
            )?
        };
        let timeout = parse_timeout(args.detection_timeout.unwrap_or(config.detection.timeout))?;
        let placement = args.place.as_deref().map(parse_place).transpose()?;
        let z_index = parse_z_index(args.z_index.as_deref().unwrap_or(&config.display.z_index))?;
        let background =
            parse_background(args.background.as_deref().unwrap_or(&config.display.background))?;
        let mirror = parse_mirror(args.mirror.as_deref().unwrap_or(&config.display.mirror))?;

        Ok(Self {
            paths: args.paths,
            run: RunSettings {
                mode,
                detection_timeout: timeout,
                clear: args.clear || config.display.clear,
                z_index,
                placement,
                max_workers: config.workers.max,
            },
            prepare: PrepareSettings {
                mirror,
                background,
                max_width_px: 0,
            },
            hold: args.hold || config.display.hold,
            print_window_size: args.print_window_size,
        })
    }
}

pub fn parse_transfer_mode(s: &str) -> Result<TransferMode, OptionsError> {
    match s {
        "detect" => Ok(TransferMode::Detect),
        "stream" => Ok(TransferMode::Stream),
        "file" => Ok(TransferMode::File),
        "memory" => Ok(TransferMode::Memory),
        other => Err(OptionsError::TransferMode(other.to_string())),
    }
}

fn parse_timeout(secs: f64) -> Result<Duration, OptionsError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(OptionsError::Timeout(secs.to_string()));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| OptionsError::Timeout(e.to_string()))
}

/// WIDTHxHEIGHT@LEFTxTOP, all in cells
pub fn parse_place(spec: &str) -> Result<Placement, OptionsError> {
    let invalid = || OptionsError::Place(spec.to_string());
    let (area, pos) = spec.split_once('@').ok_or_else(invalid)?;
    let (w, h) = area.split_once('x').ok_or_else(invalid)?;
    let (l, t) = pos.split_once('x').ok_or_else(invalid)?;
    let num = |s: &str| s.parse::<u32>().map_err(|_| invalid());
    Ok(Placement {
        width: num(w)?,
        height: num(h)?,
        left: num(l)?,
        top: num(t)?,
    })
}

/// Integer z index. "--N" means -N relative to the far background origin.
pub fn parse_z_index(s: &str) -> Result<i32, OptionsError> {
    let (origin, val) = match s.strip_prefix("--") {
        Some(_) => (FAR_BACKGROUND_Z_ORIGIN, &s[1..]),
        None => (0, s),
    };
    let z: i32 = val
        .parse()
        .map_err(|e: std::num::ParseIntError| OptionsError::ZIndex(e.to_string()))?;
    origin
        .checked_add(z)
        .ok_or_else(|| OptionsError::ZIndex(format!("{} is out of range", s)))
}

/// Background color, `None` for "none" or empty
pub fn parse_background(s: &str) -> Result<Option<(u8, u8, u8)>, OptionsError> {
    if s.is_empty() || s == "none" {
        return Ok(None);
    }
    parse_color_spec(s)
        .map(Some)
        .ok_or_else(|| OptionsError::Background(format!("not a valid color: {}", s)))
}

pub fn parse_mirror(s: &str) -> Result<Mirror, OptionsError> {
    match s {
        "" | "none" => Ok(Mirror::None),
        "horizontal" => Ok(Mirror::Horizontal),
        "vertical" => Ok(Mirror::Vertical),
        "both" => Ok(Mirror::Both),
        other => Err(OptionsError::Mirror(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_place() {
        assert_eq!(
            parse_place("40x20@5x3").unwrap(),
            Placement {
                width: 40,
                height: 20,
                left: 5,
                top: 3,
            }
        );
        for bad in ["40x20", "40@5x3", "40x20@5", "axb@1x1", "1x1@-1x0"] {
            assert_eq!(
                parse_place(bad),
                Err(OptionsError::Place(bad.to_string()))
            );
        }
    }

    #[test]
    fn test_parse_z_index() {
        assert_eq!(parse_z_index("0").unwrap(), 0);
        assert_eq!(parse_z_index("-5").unwrap(), -5);
        assert_eq!(parse_z_index("--1").unwrap(), -1_073_741_825);
        assert_eq!(parse_z_index("--0").unwrap(), FAR_BACKGROUND_Z_ORIGIN);
        assert!(parse_z_index("abc").is_err());
        assert!(parse_z_index("--2147483647").is_err());
        assert!(parse_z_index("")
            .unwrap_err()
            .to_string()
            .starts_with("Invalid value for --z-index with error:"));
    }

    #[test]
    fn test_parse_background() {
        assert_eq!(parse_background("none").unwrap(), None);
        assert_eq!(parse_background("").unwrap(), None);
        assert_eq!(parse_background("#ff0000").unwrap(), Some((255, 0, 0)));
        assert!(parse_background("not-a-color").is_err());
    }

    #[test]
    fn test_parse_mirror_and_mode() {
        assert_eq!(parse_mirror("both").unwrap(), Mirror::Both);
        assert!(parse_mirror("diagonal").is_err());
        assert_eq!(parse_transfer_mode("memory").unwrap(), TransferMode::Memory);
        assert!(parse_transfer_mode("carrier-pigeon").is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let mut config = Config::default();
        config.detection.transfer_mode = "file".to_string();
        config.display.z_index = "3".to_string();
        config.display.hold = true;
        config.workers.max = 2;

        let opts = Options::resolve(Args::default(), &config).unwrap();
        assert_eq!(opts.run.mode, TransferMode::File);
        assert_eq!(opts.run.z_index, 3);
        assert_eq!(opts.run.max_workers, 2);
        assert!(opts.hold);

        let args = Args::parse_from(["pixcat", "--transfer-mode", "stream", "--z-index=--2", "a.png"]);
        let opts = Options::resolve(args, &config).unwrap();
        assert_eq!(opts.run.mode, TransferMode::Stream);
        assert_eq!(opts.run.z_index, FAR_BACKGROUND_Z_ORIGIN - 2);
        assert_eq!(opts.paths, vec!["a.png".to_string()]);
    }

    #[test]
    fn test_detect_support_wins() {
        let args = Args::parse_from(["pixcat", "--detect-support", "--transfer-mode", "file"]);
        let opts = Options::resolve(args, &Config::default()).unwrap();
        assert_eq!(opts.run.mode, TransferMode::DetectOnly);
    }

    #[test]
    fn test_bad_timeout() {
        let args = Args {
            detection_timeout: Some(-1.0),
            ..Args::default()
        };
        assert!(matches!(
            Options::resolve(args, &Config::default()),
            Err(OptionsError::Timeout(_))
        ));
    }
}
