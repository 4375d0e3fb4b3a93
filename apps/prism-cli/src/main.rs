use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use glam::{Vec2, Vec3};
use prism_dispersion::{
    DispersionMaterial, DispersionParams, Fragment, SolidColor, Viewport, shade_fragment,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prism", about = "Tools for prism dispersion parameters")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default parameters as YAML, or validate a parameter file
    Params {
        /// Parameter file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Shade one fragment against a solid background with the CPU reference
    Shade {
        /// Background color as r,g,b
        #[arg(short, long, default_value = "1,0,0", value_parser = parse_rgb)]
        color: Vec3,
        /// Angle between the view ray and the surface normal, in degrees
        #[arg(short, long, default_value = "0")]
        angle: f32,
        /// Parameter file; defaults are used otherwise
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Apply the output resolution convention to a viewport
    Resolution {
        #[arg(long)]
        width: f64,
        #[arg(long)]
        height: f64,
        /// Device pixel ratio
        #[arg(long, default_value = "1")]
        dpr: f64,
    },
}

fn parse_rgb(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(format!("expected r,g,b but got {s:?}"));
    };
    let channel = |c: &str| c.parse::<f32>().map_err(|e| format!("{c:?}: {e}"));
    Ok(Vec3::new(channel(r)?, channel(g)?, channel(b)?))
}

fn load_params(path: Option<&PathBuf>) -> anyhow::Result<DispersionParams> {
    match path {
        Some(path) => DispersionParams::load(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(DispersionParams::default()),
    }
}

/// Fragment at the centre of a 1x1 output, viewed `angle` degrees off the
/// surface normal.
fn centre_fragment(angle: f32) -> Fragment {
    let (sin, cos) = angle.to_radians().sin_cos();
    Fragment {
        position: Vec2::splat(0.5),
        normal: Vec3::Z,
        eye: Vec3::new(sin, 0.0, -cos),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Params { file: None } => {
            print!("{}", DispersionParams::default().to_yaml_string()?);
        }
        Commands::Params { file: Some(path) } => {
            let params = load_params(Some(&path))?;
            println!("{}: ok", path.display());
            print!("{}", params.to_yaml_string()?);
        }
        Commands::Shade {
            color,
            angle,
            config,
        } => {
            if !(0.0..90.0).contains(&angle) {
                bail!("angle must be in [0, 90) degrees, got {angle}");
            }
            let params = load_params(config.as_ref())?;
            let material = DispersionMaterial::new(params)?;
            let background = SolidColor(color);
            let rgb = shade_fragment(&centre_fragment(angle), &material, Some(&background));
            tracing::debug!(?color, angle, "shaded fragment");
            println!("{:.6} {:.6} {:.6}", rgb.x, rgb.y, rgb.z);
        }
        Commands::Resolution { width, height, dpr } => {
            let viewport = Viewport::new(width, height, dpr);
            let resolution = viewport.output_resolution();
            println!(
                "{} x {} (pixel ratio {})",
                resolution.width(),
                resolution.height(),
                viewport.effective_pixel_ratio()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rgb_triples() {
        assert_eq!(parse_rgb("1,0,0"), Ok(Vec3::X));
        assert_eq!(parse_rgb(" 0.5, 0.25 ,1 "), Ok(Vec3::new(0.5, 0.25, 1.0)));
    }

    #[test]
    fn rejects_malformed_rgb() {
        assert!(parse_rgb("1,0").is_err());
        assert!(parse_rgb("1,0,0,0").is_err());
        assert!(parse_rgb("red,0,0").is_err());
    }

    #[test]
    fn head_on_fragment_looks_down_the_normal() {
        let fragment = centre_fragment(0.0);
        assert!((fragment.eye - -Vec3::Z).length() < 1e-6);
        assert!(fragment.eye.is_normalized());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
