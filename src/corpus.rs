use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use rand::{Rng, rngs::SmallRng};
use thiserror::Error;

pub const DEFAULT_DICT_ROOT: &str = "assets/dicts";

pub const LETTERS: &str = "abcdefghijklmnopqrstuvwxyz";
pub const DIGITS: &str = "0123456789";
pub const SYMBOLS: &str = "!\"#$%&'()*+,-./:;?@[\\]^_`{|}~";

/// Languages whose strings are rewritten into display order before rendering.
const RTL_LANGUAGES: [&str; 3] = ["ar", "fa", "he"];

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("cannot open dictionary {path}: {source}")]
    Dict {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("dictionary {0} contains no usable entries")]
    EmptyDict(PathBuf),
    #[error("corpus provider failed: {0}")]
    Provider(#[source] anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Case {
    Keep,
    Upper,
    Lower,
}

#[derive(Clone, Copy, Debug)]
pub struct RandomSpec {
    /// Characters per string (upper bound when `variable_length`).
    pub length: usize,
    pub variable_length: bool,
    pub letters: bool,
    pub numbers: bool,
    pub symbols: bool,
}

impl RandomSpec {
    /// Symbols cannot safely appear in filenames, so their presence (or an
    /// unconstrained class selection) forces the explicit label manifest.
    pub fn forces_manifest(&self) -> bool {
        self.symbols || !(self.letters || self.numbers || self.symbols)
    }

    fn char_pool(&self) -> Vec<char> {
        let mut pool = Vec::new();
        if self.letters {
            pool.extend(LETTERS.chars());
        }
        if self.numbers {
            pool.extend(DIGITS.chars());
        }
        if self.symbols {
            pool.extend(SYMBOLS.chars());
        }
        if pool.is_empty() {
            pool.extend(LETTERS.chars());
            pool.extend(DIGITS.chars());
            pool.extend(SYMBOLS.chars());
        }
        pool
    }
}

/// External string source, keyed the way the pipeline consumes it.
pub trait CorpusProvider: Send + Sync {
    fn strings(
        &self,
        length: usize,
        count: usize,
        language: &str,
        rng: &mut SmallRng,
    ) -> anyhow::Result<Vec<String>>;
}

/// Where the label strings come from, decided once at startup.
pub enum CorpusSource {
    DictFile(PathBuf),
    Provider(Box<dyn CorpusProvider>),
    Random(RandomSpec),
    DefaultDict(String),
}

impl CorpusSource {
    /// Precedence: explicit dictionary file, then an external provider, then
    /// random sequences, then the bundled per-language dictionary.
    pub fn resolve(
        dict: Option<PathBuf>,
        provider: Option<Box<dyn CorpusProvider>>,
        random: Option<RandomSpec>,
        language: &str,
    ) -> Self {
        if let Some(path) = dict {
            Self::DictFile(path)
        } else if let Some(provider) = provider {
            Self::Provider(provider)
        } else if let Some(spec) = random {
            Self::Random(spec)
        } else {
            Self::DefaultDict(language.to_string())
        }
    }

    pub fn forces_manifest(&self) -> bool {
        matches!(self, Self::Random(spec) if spec.forces_manifest())
    }

    pub fn strings(
        &self,
        words_per_string: usize,
        count: usize,
        language: &str,
        rng: &mut SmallRng,
    ) -> Result<Vec<String>, CorpusError> {
        match self {
            Self::DictFile(path) => {
                let words = load_wordlist(path)?;
                Ok(strings_from_dict(&words, words_per_string, count, rng))
            }
            Self::DefaultDict(lang) => {
                let path = Path::new(DEFAULT_DICT_ROOT).join(format!("{lang}.txt"));
                let words = load_wordlist(&path)?;
                Ok(strings_from_dict(&words, words_per_string, count, rng))
            }
            Self::Provider(provider) => provider
                .strings(words_per_string, count, language, rng)
                .map_err(CorpusError::Provider),
            Self::Random(spec) => Ok(strings_randomly(spec, count, rng)),
        }
    }
}

pub fn load_wordlist(path: &Path) -> Result<Vec<String>, CorpusError> {
    let file = File::open(path).map_err(|source| CorpusError::Dict {
        path: path.to_path_buf(),
        source,
    })?;
    let mut words = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| CorpusError::Dict {
            path: path.to_path_buf(),
            source,
        })?;
        let word = line.trim();
        if !word.is_empty() {
            words.push(word.to_string());
        }
    }
    if words.is_empty() {
        return Err(CorpusError::EmptyDict(path.to_path_buf()));
    }
    Ok(words)
}

fn strings_from_dict(
    words: &[String],
    words_per_string: usize,
    count: usize,
    rng: &mut SmallRng,
) -> Vec<String> {
    let per_string = words_per_string.max(1);
    (0..count)
        .map(|_| {
            (0..per_string)
                .map(|_| words[rng.random_range(0..words.len())].as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn strings_randomly(spec: &RandomSpec, count: usize, rng: &mut SmallRng) -> Vec<String> {
    let pool = spec.char_pool();
    let max_len = spec.length.max(1);
    (0..count)
        .map(|_| {
            let len = if spec.variable_length {
                rng.random_range(1..=max_len)
            } else {
                max_len
            };
            (0..len)
                .map(|_| pool[rng.random_range(0..pool.len())])
                .collect()
        })
        .collect()
}

/// Display-order rewrite for right-to-left languages, then case transforms.
/// The order matters: case applies to the already reordered text.
pub fn postprocess(mut strings: Vec<String>, language: &str, case: Case) -> Vec<String> {
    if RTL_LANGUAGES.contains(&language) {
        strings = strings
            .iter()
            .map(|s| s.split(' ').rev().collect::<Vec<_>>().join(" "))
            .collect();
    }
    match case {
        Case::Keep => strings,
        Case::Upper => strings.iter().map(|s| s.to_uppercase()).collect(),
        Case::Lower => strings.iter().map(|s| s.to_lowercase()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::io::Write;

    fn random_source(letters: bool, numbers: bool, symbols: bool) -> CorpusSource {
        CorpusSource::Random(RandomSpec {
            length: 8,
            variable_length: false,
            letters,
            numbers,
            symbols,
        })
    }

    #[test]
    fn dict_file_overrides_every_other_source() {
        let source = CorpusSource::resolve(
            Some(PathBuf::from("words.txt")),
            None,
            Some(RandomSpec {
                length: 4,
                variable_length: false,
                letters: true,
                numbers: false,
                symbols: false,
            }),
            "en",
        );
        assert!(matches!(source, CorpusSource::DictFile(_)));
    }

    #[test]
    fn absent_flags_fall_back_to_default_dictionary() {
        let source = CorpusSource::resolve(None, None, None, "en");
        assert!(matches!(source, CorpusSource::DefaultDict(lang) if lang == "en"));
    }

    #[test]
    fn digit_only_sequences_stay_digits() {
        let mut rng = SmallRng::seed_from_u64(3);
        let source = random_source(false, true, false);
        let strings = source.strings(1, 50, "en", &mut rng).unwrap();
        assert_eq!(strings.len(), 50);
        for s in &strings {
            assert_eq!(s.len(), 8);
            assert!(s.chars().all(|c| c.is_ascii_digit()), "{s:?}");
        }
    }

    #[test]
    fn variable_length_stays_within_bounds() {
        let mut rng = SmallRng::seed_from_u64(4);
        let source = CorpusSource::Random(RandomSpec {
            length: 8,
            variable_length: true,
            letters: true,
            numbers: false,
            symbols: false,
        });
        let strings = source.strings(1, 200, "en", &mut rng).unwrap();
        assert!(strings.iter().all(|s| (1..=8).contains(&s.len())));
        assert!(strings.iter().any(|s| s.len() < 8));
    }

    #[test]
    fn symbols_force_the_manifest() {
        assert!(random_source(true, true, true).forces_manifest());
        assert!(random_source(false, false, false).forces_manifest());
        assert!(!random_source(true, false, false).forces_manifest());
        assert!(!CorpusSource::DefaultDict("en".into()).forces_manifest());
    }

    #[test]
    fn dict_strings_join_words_with_single_spaces() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "alpha\n\nbeta\ngamma").unwrap();
        let source = CorpusSource::DictFile(file.path().to_path_buf());
        let mut rng = SmallRng::seed_from_u64(9);
        let strings = source.strings(3, 10, "en", &mut rng).unwrap();
        for s in &strings {
            assert_eq!(s.split(' ').count(), 3);
            assert!(s.split(' ').all(|w| ["alpha", "beta", "gamma"].contains(&w)));
        }
    }

    #[test]
    fn empty_dictionary_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = load_wordlist(file.path());
        assert!(matches!(err, Err(CorpusError::EmptyDict(_))));
    }

    #[test]
    fn rtl_reverses_word_order_before_casing() {
        let strings = postprocess(vec!["abc def ghi".into()], "ar", Case::Upper);
        assert_eq!(strings, ["GHI DEF ABC"]);
        let untouched = postprocess(vec!["abc def".into()], "en", Case::Keep);
        assert_eq!(untouched, ["abc def"]);
    }
}
