use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::generator::SampleSpec;
use crate::render::{ImageMode, Rendered};

pub const MANIFEST_FILE: &str = "labels.txt";

/// How output files are named. `Manifest` keeps labels out of filenames and
/// records the mapping in `labels.txt` instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamingMode {
    PrefixLabel,
    SuffixLabel,
    Manifest,
}

impl NamingMode {
    pub fn from_format(format: u8) -> Option<Self> {
        match format {
            0 => Some(Self::PrefixLabel),
            1 => Some(Self::SuffixLabel),
            2 => Some(Self::Manifest),
            _ => None,
        }
    }

    pub fn stem(&self, index: usize, label: &str) -> String {
        match self {
            Self::PrefixLabel => format!("{label}_{index}"),
            Self::SuffixLabel => format!("{index}_{label}"),
            Self::Manifest => index.to_string(),
        }
    }

    pub fn filename(&self, index: usize, label: &str, extension: &str) -> String {
        format!("{}.{extension}", self.stem(index, label))
    }
}

/// Persist one rendered sample (and its mask) into the shard directory.
/// Paths are index-derived, so concurrent workers never contend on a file.
pub fn save_sample(
    rendered: Rendered,
    spec: &SampleSpec,
    naming: NamingMode,
    extension: &str,
    shard_dir: &Path,
) -> image::ImageResult<()> {
    let stem = naming.stem(spec.index, &spec.text);
    let path = shard_dir.join(format!("{stem}.{extension}"));
    match spec.style.image_mode {
        ImageMode::Rgb => DynamicImage::ImageRgba8(rendered.image).to_rgb8().save(&path)?,
        ImageMode::Gray => DynamicImage::ImageRgba8(rendered.image)
            .to_luma8()
            .save(&path)?,
    }
    if let Some(mask) = rendered.mask {
        mask.save(shard_dir.join(format!("{stem}_mask.png")))?;
    }
    Ok(())
}

/// Write the shard's label manifest, one `<index>.<ext> <label>` line per
/// sample in index order. The file appears atomically: content goes to a
/// temp file first and is renamed into place once fully flushed.
pub fn write_manifest(
    shard_dir: &Path,
    specs: &[SampleSpec],
    extension: &str,
    strip_spaces: bool,
) -> std::io::Result<PathBuf> {
    let tmp = shard_dir.join(format!("{MANIFEST_FILE}.tmp"));
    let path = shard_dir.join(MANIFEST_FILE);
    let mut writer = BufWriter::new(File::create(&tmp)?);
    for spec in specs {
        let label = if strip_spaces {
            spec.text.replace(' ', "")
        } else {
            spec.text.clone()
        };
        writeln!(writer, "{}.{} {}", spec.index, extension, label)?;
    }
    writer.into_inner()?.sync_all()?;
    fs::rename(&tmp, &path)?;
    Ok(path)
}
