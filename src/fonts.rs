use std::fs;
use std::path::{Path, PathBuf};

use rand::{Rng, rngs::SmallRng};
use thiserror::Error;

pub const DEFAULT_FONT_ROOT: &str = "assets/fonts";

#[derive(Debug, Error)]
pub enum FontPoolError {
    #[error("cannot open font {0}")]
    MissingFont(PathBuf),
    #[error("no font files found under {0}")]
    EmptyPool(PathBuf),
    #[error("cannot read font directory {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub fn is_font_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("ttf") | Some("otf")
    )
}

/// Family name of a font file: the name of its immediate parent directory.
pub fn family_of(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// All font files under `root`, any nesting depth, in sorted order so runs
/// are reproducible across filesystems.
pub fn scan_font_files(root: &Path) -> Result<Vec<PathBuf>, FontPoolError> {
    let mut found = Vec::new();
    collect_fonts(root, &mut found)?;
    found.sort();
    Ok(found)
}

fn collect_fonts(dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), FontPoolError> {
    let entries = fs::read_dir(dir).map_err(|source| FontPoolError::Scan {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| FontPoolError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_fonts(&path, found)?;
        } else if is_font_file(&path) {
            found.push(path);
        }
    }
    Ok(())
}

/// The resolved font inventory a generation run draws from.
///
/// The shape matters: `Flat` picks uniformly over files, `Families` picks a
/// family first and a file within it second, which weights small families the
/// same as large ones.
#[derive(Clone, Debug)]
pub enum FontPool {
    Single(PathBuf),
    Flat(Vec<PathBuf>),
    Families(Vec<Vec<PathBuf>>),
}

impl FontPool {
    /// Precedence: explicit file, then flat directory, then family library,
    /// then the bundled per-language default directory.
    pub fn resolve(
        font: Option<&Path>,
        font_dir: Option<&Path>,
        font_lib: Option<&Path>,
        language: &str,
    ) -> Result<Self, FontPoolError> {
        if let Some(file) = font {
            if file.is_file() {
                Ok(Self::Single(file.to_path_buf()))
            } else {
                Err(FontPoolError::MissingFont(file.to_path_buf()))
            }
        } else if let Some(dir) = font_dir {
            Self::flat(dir)
        } else if let Some(lib) = font_lib {
            Self::families(lib)
        } else {
            Self::flat(&Path::new(DEFAULT_FONT_ROOT).join(language))
        }
    }

    fn flat(dir: &Path) -> Result<Self, FontPoolError> {
        let files = direct_font_files(dir)?;
        if files.is_empty() {
            return Err(FontPoolError::EmptyPool(dir.to_path_buf()));
        }
        Ok(Self::Flat(files))
    }

    fn families(lib: &Path) -> Result<Self, FontPoolError> {
        let entries = fs::read_dir(lib).map_err(|source| FontPoolError::Scan {
            path: lib.to_path_buf(),
            source,
        })?;
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        let mut groups = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let files = direct_font_files(&dir)?;
            if !files.is_empty() {
                groups.push(files);
            }
        }
        if groups.is_empty() {
            return Err(FontPoolError::EmptyPool(lib.to_path_buf()));
        }
        Ok(Self::Families(groups))
    }

    /// One uniform draw, with replacement across calls.
    pub fn pick<'a>(&'a self, rng: &mut SmallRng) -> &'a Path {
        match self {
            Self::Single(path) => path,
            Self::Flat(files) => &files[rng.random_range(0..files.len())],
            Self::Families(groups) => {
                let group = &groups[rng.random_range(0..groups.len())];
                &group[rng.random_range(0..group.len())]
            }
        }
    }

    pub fn file_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Flat(files) => files.len(),
            Self::Families(groups) => groups.iter().map(Vec::len).sum(),
        }
    }
}

fn direct_font_files(dir: &Path) -> Result<Vec<PathBuf>, FontPoolError> {
    let entries = fs::read_dir(dir).map_err(|source| FontPoolError::Scan {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_font_file(p))
        .collect();
    files.sort();
    Ok(files)
}
