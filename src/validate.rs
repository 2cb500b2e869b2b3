use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use once_cell::sync::Lazy;
use rand::{SeedableRng, rngs::SmallRng};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fonts::{self, FontPoolError};
use crate::render::{self, RenderStyle};

/// Characters every accepted font must be able to render.
pub const DEFAULT_CHARSET: &str =
    "0123456789abcdefghijklmnopqrstuvwxyz!\"#$%&'()*+,-./:;?@[\\]^_`{|}~";

pub const SANITYCHECK_DIR: &str = "_sanitycheck";
const REPORT_FILE: &str = "_report.json";

/// Families known to pass every automated check while rendering nonsense
/// (barcodes, redaction bars, waveforms). Curated by hand.
static DEFAULT_BLOCKLIST: Lazy<HashSet<String>> = Lazy::new(|| {
    [
        "flowblock",
        "flowcircular",
        "flowrounded",
        "jsmathcmex10",
        "jsmathcmsy10",
        "librebarcode39extended",
        "librebarcode39extendedtext",
        "librebarcode128",
        "librebarcode128text",
        "linefont",
        "redacted",
        "redactedscript",
        "wavefont",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
});

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("font source tree {0} does not exist")]
    SourceMissing(PathBuf),
    #[error("cannot reset output tree {path}: {source}")]
    OutputReset {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Scan(#[from] FontPoolError),
    #[error("cannot stage accepted font {path}: {source}")]
    Stage {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write sanity-check image for {path}: {source}")]
    Sanity {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("cannot encode validation report: {0}")]
    ReportEncode(#[from] serde_json::Error),
    #[error("cannot write validation report: {0}")]
    ReportWrite(std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    RejectedMissingGlyphs { missing: char },
    RejectedRenderError { message: String },
    RejectedBlankRender,
    SkippedBlocklisted,
}

#[derive(Clone, Debug, Serialize)]
pub struct FontVerdict {
    pub path: PathBuf,
    pub family: String,
    pub verdict: Verdict,
}

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub verdicts: Vec<FontVerdict>,
}

impl ValidationReport {
    fn count(&self, matches: impl Fn(&Verdict) -> bool) -> usize {
        self.verdicts.iter().filter(|v| matches(&v.verdict)).count()
    }

    pub fn accepted(&self) -> usize {
        self.count(|v| matches!(v, Verdict::Accepted))
    }

    pub fn summary(&self) -> String {
        format!(
            "{} fonts: {} accepted, {} missing glyphs, {} render errors, {} blank, {} blocklisted",
            self.verdicts.len(),
            self.accepted(),
            self.count(|v| matches!(v, Verdict::RejectedMissingGlyphs { .. })),
            self.count(|v| matches!(v, Verdict::RejectedRenderError { .. })),
            self.count(|v| matches!(v, Verdict::RejectedBlankRender)),
            self.count(|v| matches!(v, Verdict::SkippedBlocklisted)),
        )
    }
}

pub struct ValidateConfig {
    pub source: PathBuf,
    pub output: PathBuf,
    pub charset: String,
    pub blocklist: HashSet<String>,
}

impl ValidateConfig {
    pub fn new(source: PathBuf, output: PathBuf) -> Self {
        Self {
            source,
            output,
            charset: DEFAULT_CHARSET.to_string(),
            blocklist: DEFAULT_BLOCKLIST.clone(),
        }
    }
}

/// Classify every font under the source tree and stage the accepted ones
/// into a fresh output library, one subdirectory per family. The output tree
/// is rebuilt from scratch on every run, never merged with a previous one.
pub fn validate(cfg: &ValidateConfig) -> Result<ValidationReport, ValidateError> {
    if !cfg.source.is_dir() {
        return Err(ValidateError::SourceMissing(cfg.source.clone()));
    }
    if cfg.output.exists() {
        fs::remove_dir_all(&cfg.output).map_err(|source| ValidateError::OutputReset {
            path: cfg.output.clone(),
            source,
        })?;
    }
    let sanity_dir = cfg.output.join(SANITYCHECK_DIR);
    fs::create_dir_all(&sanity_dir).map_err(|source| ValidateError::OutputReset {
        path: sanity_dir.clone(),
        source,
    })?;

    let font_files = fonts::scan_font_files(&cfg.source)?;
    info!(
        fonts = font_files.len(),
        source = %cfg.source.display(),
        "validating font tree"
    );

    let mut report = ValidationReport::default();
    let mut seen_families: HashSet<String> = HashSet::new();
    for path in font_files {
        let family = fonts::family_of(&path);
        let (verdict, trial) = check_font(&path, &family, cfg);
        match &verdict {
            Verdict::Accepted => {
                if seen_families.insert(family.clone()) {
                    if let Some(image) = &trial {
                        save_sanity_image(image, &path, &family, &sanity_dir)?;
                    }
                }
                stage_font(&path, &family, &cfg.output)?;
            }
            Verdict::SkippedBlocklisted => {
                debug!(font = %path.display(), "blocklisted family, skipped");
            }
            rejected => {
                warn!(font = %path.display(), verdict = ?rejected, "font rejected");
            }
        }
        report.verdicts.push(FontVerdict {
            path,
            family,
            verdict,
        });
    }

    info!("{}", report.summary());
    let encoded = serde_json::to_string_pretty(&report)?;
    fs::write(cfg.output.join(REPORT_FILE), encoded).map_err(ValidateError::ReportWrite)?;
    Ok(report)
}

/// The checks run in a fixed order and stop at the first failure:
/// blocklist, glyph coverage, trial render, blank render. An unreadable or
/// unparsable file counts as a render error.
fn check_font(path: &Path, family: &str, cfg: &ValidateConfig) -> (Verdict, Option<RgbaImage>) {
    if cfg.blocklist.contains(&family.to_ascii_lowercase()) {
        return (Verdict::SkippedBlocklisted, None);
    }

    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            return (
                Verdict::RejectedRenderError {
                    message: err.to_string(),
                },
                None,
            );
        }
    };
    let face = match ttf_parser::Face::parse(&data, 0) {
        Ok(face) => face,
        Err(err) => {
            return (
                Verdict::RejectedRenderError {
                    message: err.to_string(),
                },
                None,
            );
        }
    };
    if let Some(missing) = first_uncovered_char(&face, &cfg.charset) {
        return (Verdict::RejectedMissingGlyphs { missing }, None);
    }

    let mut rng = SmallRng::seed_from_u64(0);
    let rendered = match render::render(&cfg.charset, path, &RenderStyle::reference(), &mut rng) {
        Ok(rendered) => rendered,
        Err(err) => {
            return (
                Verdict::RejectedRenderError {
                    message: err.to_string(),
                },
                None,
            );
        }
    };
    if rendered.is_blank() {
        return (Verdict::RejectedBlankRender, None);
    }
    (Verdict::Accepted, Some(rendered.image))
}

fn first_uncovered_char(face: &ttf_parser::Face, charset: &str) -> Option<char> {
    charset.chars().find(|&c| !char_in_face(face, c))
}

/// A code point counts as covered only if some Unicode-flagged cmap subtable
/// maps it to a glyph.
fn char_in_face(face: &ttf_parser::Face, c: char) -> bool {
    let Some(cmap) = face.tables().cmap else {
        return false;
    };
    cmap.subtables
        .into_iter()
        .any(|subtable| subtable.is_unicode() && subtable.glyph_index(u32::from(c)).is_some())
}

fn save_sanity_image(
    image: &RgbaImage,
    path: &Path,
    family: &str,
    sanity_dir: &Path,
) -> Result<(), ValidateError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("font");
    let target = sanity_dir.join(format!("{family}___{stem}.png"));
    image.save(&target).map_err(|source| ValidateError::Sanity {
        path: path.to_path_buf(),
        source,
    })
}

fn stage_font(path: &Path, family: &str, output: &Path) -> Result<(), ValidateError> {
    let family_dir = output.join(family);
    fs::create_dir_all(&family_dir).map_err(|source| ValidateError::Stage {
        path: path.to_path_buf(),
        source,
    })?;
    let Some(file_name) = path.file_name() else {
        return Ok(());
    };
    fs::copy(path, family_dir.join(file_name)).map_err(|source| ValidateError::Stage {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tmp: &tempfile::TempDir) -> ValidateConfig {
        ValidateConfig::new(tmp.path().join("source"), tmp.path().join("library"))
    }

    fn plant(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn missing_source_tree_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = validate(&config(&tmp));
        assert!(matches!(err, Err(ValidateError::SourceMissing(_))));
    }

    #[test]
    fn blocklisted_family_short_circuits_before_any_read() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(&tmp);
        // Garbage bytes: would fail parsing if the file were ever read.
        plant(&cfg.source.join("redacted/Redacted-Regular.ttf"), b"junk");
        let report = validate(&cfg).unwrap();
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.verdicts[0].verdict, Verdict::SkippedBlocklisted);
        assert!(!cfg.output.join("redacted").exists());
    }

    #[test]
    fn corrupt_font_takes_the_render_error_path() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(&tmp);
        plant(&cfg.source.join("broken/Broken-Regular.ttf"), b"not a font");
        let report = validate(&cfg).unwrap();
        assert!(matches!(
            report.verdicts[0].verdict,
            Verdict::RejectedRenderError { .. }
        ));
        assert_eq!(report.accepted(), 0);
        assert!(!cfg.output.join("broken").exists());
    }

    #[test]
    fn output_tree_is_rebuilt_from_scratch() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(&tmp);
        fs::create_dir_all(&cfg.source).unwrap();
        plant(&cfg.output.join("stale-family/old.ttf"), b"old");
        let report = validate(&cfg).unwrap();
        assert!(report.verdicts.is_empty());
        assert!(!cfg.output.join("stale-family").exists());
        assert!(cfg.output.join(SANITYCHECK_DIR).is_dir());
        assert!(cfg.output.join(REPORT_FILE).is_file());
    }

    #[test]
    fn summary_tallies_every_verdict() {
        let report = ValidationReport {
            verdicts: vec![
                FontVerdict {
                    path: PathBuf::from("a.ttf"),
                    family: "a".into(),
                    verdict: Verdict::Accepted,
                },
                FontVerdict {
                    path: PathBuf::from("b.ttf"),
                    family: "b".into(),
                    verdict: Verdict::RejectedMissingGlyphs { missing: 'q' },
                },
                FontVerdict {
                    path: PathBuf::from("c.ttf"),
                    family: "c".into(),
                    verdict: Verdict::SkippedBlocklisted,
                },
            ],
        };
        assert_eq!(report.accepted(), 1);
        assert_eq!(
            report.summary(),
            "3 fonts: 1 accepted, 1 missing glyphs, 0 render errors, 0 blank, 1 blocklisted"
        );
    }
}
