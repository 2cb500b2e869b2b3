//! Command line surface: one subcommand per pipeline stage.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};

use crate::corpus::{Case, CorpusSource, RandomSpec};
use crate::fonts::FontPool;
use crate::generator::{DEFAULT_SHARD_SIZE, RunConfig};
use crate::io::NamingMode;
use crate::render::{Background, ColorSpec, ImageMode, Margins, RenderStyle};
use crate::validate::ValidateConfig;

#[derive(Parser, Debug)]
#[command(
    name = "textsynth",
    version,
    about = "Synthetic text-image dataset generator for text-recognition training"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Filter a font tree down to the fonts that can render the required charset
    FilterFonts(FilterFontsArgs),
    /// Generate a labeled dataset of rendered text images
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
pub struct FilterFontsArgs {
    /// Source tree of candidate font files (family = parent directory)
    #[arg(long)]
    pub source: PathBuf,
    /// Destination of the accepted-font library, recreated from scratch
    #[arg(long)]
    pub output: PathBuf,
    /// Characters every accepted font must cover
    #[arg(long)]
    pub charset: Option<String>,
    /// File with extra blocklisted family names, one per line
    #[arg(long)]
    pub blocklist: Option<PathBuf>,
}

impl FilterFontsArgs {
    pub fn into_config(self) -> anyhow::Result<ValidateConfig> {
        let mut cfg = ValidateConfig::new(self.source, self.output);
        if let Some(charset) = self.charset {
            if charset.is_empty() {
                bail!("--charset must not be empty");
            }
            cfg.charset = charset;
        }
        if let Some(path) = self.blocklist {
            let extra = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read blocklist {}", path.display()))?;
            cfg.blocklist.extend(
                extra
                    .lines()
                    .map(|l| l.trim().to_ascii_lowercase())
                    .filter(|l| !l.is_empty()),
            );
        }
        Ok(cfg)
    }
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Number of samples to generate
    #[arg(short, long, default_value_t = 1000)]
    pub count: usize,
    /// Root output directory; shards get numbered subdirectories
    #[arg(long, default_value = "out")]
    pub output_dir: PathBuf,
    /// Samples per shard directory
    #[arg(long, default_value_t = DEFAULT_SHARD_SIZE)]
    pub shard_size: usize,

    /// Use a single font file
    #[arg(long)]
    pub font: Option<PathBuf>,
    /// Use every font file directly inside this directory
    #[arg(long)]
    pub font_dir: Option<PathBuf>,
    /// Use a library of per-family subdirectories (filter-fonts output)
    #[arg(long)]
    pub font_lib: Option<PathBuf>,

    /// Word list file, one token per line
    #[arg(long)]
    pub dict: Option<PathBuf>,
    /// Generate purely random character sequences
    #[arg(long)]
    pub random_sequences: bool,
    #[arg(long)]
    pub include_letters: bool,
    #[arg(long)]
    pub include_numbers: bool,
    #[arg(long)]
    pub include_symbols: bool,

    #[arg(short, long, default_value = "en")]
    pub language: String,
    /// Words per sample (characters per sample for random sequences)
    #[arg(long, default_value_t = 1)]
    pub length: usize,
    /// Draw each sample's length uniformly from 1..=length
    #[arg(long)]
    pub random_length: bool,
    /// Force upper or lower case
    #[arg(long)]
    pub case: Option<String>,

    /// Image file extension (jpg, png, ...)
    #[arg(long, default_value = "jpg")]
    pub extension: String,
    /// 0 = label_index, 1 = index_label, 2 = index + labels.txt
    #[arg(long, default_value_t = 2)]
    pub name_format: u8,
    /// Worker pool size per shard
    #[arg(long, default_value_t = 1)]
    pub workers: usize,
    /// Seed reused by every shard
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    #[arg(long, default_value_t = 32)]
    pub font_size: u32,
    /// #RRGGBB, or #RRGGBB,#RRGGBB for a per-channel range
    #[arg(long, default_value = "#282828")]
    pub text_color: String,
    /// 0 = light noise, 1 = plain white
    #[arg(long, default_value_t = 1)]
    pub background: u8,
    #[arg(long, default_value_t = 0)]
    pub skew_angle: i32,
    #[arg(long)]
    pub random_skew: bool,
    #[arg(long, default_value_t = 0.0)]
    pub blur: f32,
    #[arg(long)]
    pub random_blur: bool,
    /// Width of spaces as a factor of the font's space advance; 0 removes them
    #[arg(long, default_value_t = 1.0)]
    pub space_width: f32,
    #[arg(long, default_value_t = 0)]
    pub character_spacing: u32,
    #[arg(long, default_value_t = 5)]
    pub margin: u32,
    #[arg(long, default_value_t = 0)]
    pub stroke_width: u32,
    #[arg(long, default_value = "#282828")]
    pub stroke_fill: String,
    /// rgb or gray
    #[arg(long, default_value = "rgb")]
    pub image_mode: String,
    /// Also write a glyph mask next to each image
    #[arg(long)]
    pub output_mask: bool,
}

impl GenerateArgs {
    pub fn into_parts(self) -> anyhow::Result<(RunConfig, CorpusSource, FontPool)> {
        let naming = NamingMode::from_format(self.name_format)
            .with_context(|| format!("name format {} is not 0, 1 or 2", self.name_format))?;
        let case = match self.case.as_deref() {
            None => Case::Keep,
            Some("upper") => Case::Upper,
            Some("lower") => Case::Lower,
            Some(other) => bail!("case must be upper or lower, got {other:?}"),
        };
        let image_mode = match self.image_mode.as_str() {
            "rgb" | "RGB" => ImageMode::Rgb,
            "gray" | "L" => ImageMode::Gray,
            other => bail!("image mode must be rgb or gray, got {other:?}"),
        };
        let background = match self.background {
            0 => Background::Noise,
            1 => Background::Plain(ColorSpec::solid(0xFF, 0xFF, 0xFF)),
            other => bail!("background must be 0 (noise) or 1 (plain), got {other}"),
        };
        if self.shard_size == 0 {
            bail!("--shard-size must be positive");
        }

        let style = RenderStyle {
            font_size: self.font_size,
            text_color: self.text_color.parse()?,
            background,
            margins: Margins::uniform(self.margin),
            character_spacing: self.character_spacing,
            space_width: self.space_width,
            skew_angle: self.skew_angle,
            random_skew: self.random_skew,
            blur: self.blur,
            random_blur: self.random_blur,
            stroke_width: self.stroke_width,
            stroke_fill: self.stroke_fill.parse()?,
            image_mode,
            output_mask: self.output_mask,
        };

        let random = self.random_sequences.then(|| RandomSpec {
            length: self.length,
            variable_length: self.random_length,
            letters: self.include_letters,
            numbers: self.include_numbers,
            symbols: self.include_symbols,
        });
        let corpus = CorpusSource::resolve(self.dict, None, random, &self.language);
        let pool = FontPool::resolve(
            self.font.as_deref(),
            self.font_dir.as_deref(),
            self.font_lib.as_deref(),
            &self.language,
        )?;

        let cfg = RunConfig {
            count: self.count,
            shard_size: self.shard_size,
            output_dir: self.output_dir,
            extension: self.extension,
            language: self.language,
            case,
            naming,
            length: self.length,
            workers: self.workers.max(1),
            seed: self.seed,
            style: Arc::new(style),
        };
        Ok((cfg, corpus, pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_name_format() {
        let args = Cli::try_parse_from([
            "textsynth",
            "generate",
            "--name-format",
            "5",
            "--font",
            "x.ttf",
        ]);
        let Ok(Cli {
            command: Command::Generate(args),
        }) = args
        else {
            panic!("parse failed");
        };
        assert!(args.into_parts().is_err());
    }

    #[test]
    fn rejects_bad_case_value() {
        let Cli {
            command: Command::Generate(args),
        } = Cli::try_parse_from([
            "textsynth",
            "generate",
            "--case",
            "title",
            "--font",
            "x.ttf",
        ])
        .unwrap()
        else {
            panic!("expected generate subcommand");
        };
        assert!(args.into_parts().is_err());
    }
}
