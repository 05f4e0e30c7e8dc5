use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rawji_core::recipe::{decode, fields};
use rawji_core::{
    CancelToken, Converter, ConverterConfig, DynamicRange, EffectStrength, FilmSimulation,
    GrainSize, ImageQuality, ImageSize, RecipeBlob, RecipeBuilder, WhiteBalance,
};
use tracing::{error, info, warn};

/// Command-line mirror of a core enum, mapped variant by variant.
macro_rules! arg_enum {
    ($arg:ident => $core:ident { $($variant:ident),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, ValueEnum)]
        enum $arg {
            $($variant,)+
        }

        impl From<$arg> for $core {
            fn from(value: $arg) -> Self {
                match value {
                    $($arg::$variant => $core::$variant,)+
                }
            }
        }
    };
}

arg_enum!(FilmSimArg => FilmSimulation {
    Provia, Velvia, Astia, ProNegHi, ProNegStd, Monochrome, MonochromeYe, MonochromeR,
    MonochromeG, Sepia, ClassicChrome, Acros, AcrosYe, AcrosR, AcrosG, Eterna, EternaBleach,
});

arg_enum!(WhiteBalanceArg => WhiteBalance {
    AsShot, Auto, Daylight, Incandescent, Underwater, Fluorescent1, Fluorescent2,
    Fluorescent3, Shade, Temperature, Custom1, Custom2, Custom3,
});

arg_enum!(StrengthArg => EffectStrength { Off, Weak, Strong });

arg_enum!(GrainSizeArg => GrainSize { Small, Large });

arg_enum!(ImageSizeArg => ImageSize {
    Small3x2, Small16x9, Small1x1, Medium3x2, Medium16x9, Medium1x1, Large3x2, Large16x9,
    Large1x1,
});

arg_enum!(QualityArg => ImageQuality { Fine, Normal });

fn parse_dynamic_range(s: &str) -> Result<DynamicRange, String> {
    let percent: u16 = s.parse().map_err(|_| format!("not a number: {s}"))?;
    DynamicRange::try_from(percent)
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Fujifilm in-camera RAW conversion (USB)", long_about = None)]
struct Args {
    /// RAF file to convert
    #[arg(required_unless_present = "dump_profile")]
    input: Option<PathBuf>,

    /// Where to write the JPEG
    #[arg(required_unless_present = "dump_profile")]
    output: Option<PathBuf>,

    #[arg(long, value_enum)]
    film_sim: Option<FilmSimArg>,

    /// Exposure compensation in EV, third-stop steps (e.g. -0.67, 1.33)
    #[arg(long, allow_negative_numbers = true)]
    exposure: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    highlights: Option<i32>,

    #[arg(long, allow_negative_numbers = true)]
    shadows: Option<i32>,

    #[arg(long, allow_negative_numbers = true)]
    color: Option<i32>,

    #[arg(long, allow_negative_numbers = true)]
    sharpness: Option<i32>,

    /// Noise reduction
    #[arg(long, allow_negative_numbers = true)]
    nr: Option<i32>,

    #[arg(long, allow_negative_numbers = true)]
    clarity: Option<i32>,

    #[arg(long, value_enum)]
    grain: Option<StrengthArg>,

    #[arg(long, value_enum)]
    grain_size: Option<GrainSizeArg>,

    /// Color chrome effect
    #[arg(long, value_enum)]
    chrome: Option<StrengthArg>,

    /// Color chrome FX blue
    #[arg(long, value_enum)]
    chrome_blue: Option<StrengthArg>,

    #[arg(long, value_enum)]
    white_balance: Option<WhiteBalanceArg>,

    #[arg(long, allow_negative_numbers = true)]
    wb_shift_r: Option<i32>,

    #[arg(long, allow_negative_numbers = true)]
    wb_shift_b: Option<i32>,

    /// Color temperature in kelvin (implies --white-balance temperature)
    #[arg(long)]
    wb_temp: Option<u32>,

    /// 100, 200 or 400
    #[arg(long, value_parser = parse_dynamic_range)]
    dynamic_range: Option<DynamicRange>,

    #[arg(long, value_enum)]
    size: Option<ImageSizeArg>,

    #[arg(long, value_enum)]
    quality: Option<QualityArg>,

    /// Recipe TOML file; flags given on the command line take precedence
    #[arg(long)]
    recipe: Option<PathBuf>,

    /// Converter configuration TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the camera's current conversion profile and exit
    #[arg(long)]
    dump_profile: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn recipe_overrides(&self) -> RecipeBuilder {
        RecipeBuilder {
            film_simulation: self.film_sim.map(Into::into),
            exposure: self.exposure,
            dynamic_range: self.dynamic_range,
            highlights: self.highlights,
            shadows: self.shadows,
            color: self.color,
            sharpness: self.sharpness,
            noise_reduction: self.nr,
            clarity: self.clarity,
            grain: self.grain.map(Into::into),
            grain_size: self.grain_size.map(Into::into),
            color_chrome: self.chrome.map(Into::into),
            color_chrome_blue: self.chrome_blue.map(Into::into),
            white_balance: self.white_balance.map(Into::into),
            wb_shift_r: self.wb_shift_r,
            wb_shift_b: self.wb_shift_b,
            color_temperature: self.wb_temp,
            image_size: self.size.map(Into::into),
            image_quality: self.quality.map(Into::into),
        }
    }

    fn builder(&self) -> Result<RecipeBuilder> {
        let base = match &self.recipe {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading recipe {}", path.display()))?;
                RecipeBuilder::from_toml(&content)
                    .with_context(|| format!("parsing recipe {}", path.display()))?
            }
            None => RecipeBuilder::default(),
        };
        Ok(base.merge(self.recipe_overrides()))
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(&args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => ConverterConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConverterConfig::default(),
    };

    // Recipe errors are reported before the camera is touched.
    let builder = args.builder()?;

    let converter = Converter::open(config).context("opening camera")?;
    match converter.model() {
        Some(model) => info!(camera = %model, "Camera connected"),
        None => warn!("Connected body is not in the supported list"),
    }

    if args.dump_profile {
        return dump_profile(&converter);
    }

    let (Some(input), Some(output)) = (&args.input, &args.output) else {
        anyhow::bail!("INPUT and OUTPUT are required");
    };

    let recipe = builder.build_for(&converter.capabilities())?;
    let raf = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    info!(input = %input.display(), bytes = raf.len(), "Converting");

    let jpeg = converter.convert(&raf, &recipe, &CancelToken::new())?;
    write_jpeg(output, &jpeg)
}

fn write_jpeg(path: &Path, jpeg: &[u8]) -> Result<()> {
    if !jpeg.starts_with(&[0xFF, 0xD8]) {
        warn!("Camera output does not start with a JPEG SOI marker");
    }
    std::fs::write(path, jpeg).with_context(|| format!("writing {}", path.display()))?;
    info!(output = %path.display(), bytes = jpeg.len(), "JPEG written");
    Ok(())
}

fn dump_profile<T, O>(converter: &Converter<T, O>) -> Result<()>
where
    T: rawji_core::UsbTransport,
    O: rawji_core::ConversionObserver,
{
    let profile = converter.read_profile()?;
    let blob = match RecipeBlob::try_from(profile.as_slice()) {
        Ok(blob) => blob,
        Err(e) => {
            warn!(error = %e, "Profile is not in the recipe layout, dumping raw bytes");
            for (i, line) in profile.chunks(16).enumerate() {
                let hex: Vec<String> = line.iter().map(|b| format!("{b:02X}")).collect();
                println!("{:04X}  {}", i * 16, hex.join(" "));
            }
            return Ok(());
        }
    };

    for (spec, raw) in fields(&blob) {
        println!("{:>2}  {:<22} {:>6}  {}", spec.index, spec.name, raw, spec.describe(raw));
    }
    if let Err(e) = decode(&blob) {
        warn!(error = %e, "Profile does not decode to a recipe");
    }
    Ok(())
}
