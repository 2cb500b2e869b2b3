use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use rand::{RngCore, SeedableRng, rngs::SmallRng};
use rand_xoshiro::SplitMix64;
use tracing::info;

use crate::corpus::{self, Case, CorpusError, CorpusSource};
use crate::dispatch;
use crate::fonts::FontPool;
use crate::io::{self, NamingMode};
use crate::render::RenderStyle;

pub const DEFAULT_SHARD_SIZE: usize = 10_000;

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub count: usize,
    pub shard_size: usize,
    pub output_dir: PathBuf,
    pub extension: String,
    pub language: String,
    pub case: Case,
    pub naming: NamingMode,
    /// Words per sample for dictionary corpora, characters per sample for
    /// random sequences.
    pub length: usize,
    pub workers: usize,
    pub seed: u64,
    pub style: Arc<RenderStyle>,
}

/// Everything one worker needs to produce one sample. Immutable, no shared
/// state beyond the reference-counted style.
#[derive(Clone, Debug)]
pub struct SampleSpec {
    pub index: usize,
    pub text: String,
    pub font: PathBuf,
    /// Drives all renderer-internal randomness, so a sample's pixels do not
    /// depend on which worker picked it up or when.
    pub seed: u64,
    pub style: Arc<RenderStyle>,
}

/// Fixed-size shards, the last one possibly smaller: 25 000 at 10 000 per
/// shard gives [10 000, 10 000, 5 000].
pub fn shard_plan(count: usize, shard_size: usize) -> Vec<usize> {
    debug_assert!(shard_size > 0);
    let mut sizes = Vec::new();
    let mut left = count;
    while left > 0 {
        let size = left.min(shard_size);
        sizes.push(size);
        left -= size;
    }
    sizes
}

/// Build every spec for one shard. The generator re-seeds identically per
/// shard, before any corpus or font randomization: shards are repeats of the
/// same stream into different directories, and identical configuration always
/// reproduces identical specs.
pub fn build_shard_specs(
    corpus: &CorpusSource,
    pool: &FontPool,
    cfg: &RunConfig,
    shard_len: usize,
) -> Result<Vec<SampleSpec>, CorpusError> {
    let mut rng = SmallRng::seed_from_u64(cfg.seed);
    let strings = corpus.strings(cfg.length, shard_len, &cfg.language, &mut rng)?;
    let strings = corpus::postprocess(strings, &cfg.language, cfg.case);

    let mut seeds = SplitMix64::seed_from_u64(cfg.seed);
    Ok(strings
        .into_iter()
        .enumerate()
        .map(|(index, text)| SampleSpec {
            index,
            text,
            font: pool.pick(&mut rng).to_path_buf(),
            seed: seeds.next_u64(),
            style: Arc::clone(&cfg.style),
        })
        .collect())
}

/// The configured naming mode, unless the corpus can emit characters that do
/// not belong in filenames.
pub fn effective_naming(corpus: &CorpusSource, configured: NamingMode) -> NamingMode {
    if corpus.forces_manifest() {
        NamingMode::Manifest
    } else {
        configured
    }
}

/// Generate the whole dataset: shards run strictly one after another, each
/// with its own directory, its own worker pool, and its own manifest.
pub fn run(corpus: &CorpusSource, pool: &FontPool, cfg: &RunConfig) -> anyhow::Result<()> {
    let naming = effective_naming(corpus, cfg.naming);
    let sizes = shard_plan(cfg.count, cfg.shard_size);
    info!(
        count = cfg.count,
        shards = sizes.len(),
        fonts = pool.file_count(),
        "starting generation"
    );

    for (shard, &shard_len) in sizes.iter().enumerate() {
        let shard_dir = cfg.output_dir.join((shard + 1).to_string());
        fs::create_dir_all(&shard_dir)
            .with_context(|| format!("cannot create shard directory {}", shard_dir.display()))?;

        let specs = build_shard_specs(corpus, pool, cfg, shard_len)?;
        let outcome = dispatch::dispatch_shard(&specs, cfg, naming, &shard_dir)?;
        info!(
            shard = shard + 1,
            rendered = outcome.rendered,
            failed = outcome.failed,
            "shard complete"
        );

        if naming == NamingMode::Manifest {
            io::write_manifest(&shard_dir, &specs, &cfg.extension, cfg.style.space_width == 0.0)
                .with_context(|| format!("cannot write manifest in {}", shard_dir.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::RandomSpec;
    use std::fs;
    use std::path::Path;

    fn config(seed: u64) -> RunConfig {
        RunConfig {
            count: 100,
            shard_size: DEFAULT_SHARD_SIZE,
            output_dir: PathBuf::from("out"),
            extension: "jpg".to_string(),
            language: "en".to_string(),
            case: Case::Keep,
            naming: NamingMode::Manifest,
            length: 6,
            workers: 1,
            seed,
            style: Arc::new(RenderStyle::default()),
        }
    }

    fn stub_pool(dir: &Path, names: &[&str]) -> FontPool {
        for name in names {
            fs::write(dir.join(name), b"stub").unwrap();
        }
        FontPool::resolve(None, Some(dir), None, "en").unwrap()
    }

    #[test]
    fn shard_plan_partitions_with_a_short_tail() {
        assert_eq!(shard_plan(25_000, 10_000), [10_000, 10_000, 5_000]);
        assert_eq!(shard_plan(10_000, 10_000), [10_000]);
        assert_eq!(shard_plan(3, 10_000), [3]);
        assert!(shard_plan(0, 10_000).is_empty());
    }

    #[test]
    fn identical_seeds_reproduce_identical_specs() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = stub_pool(tmp.path(), &["a.ttf", "b.ttf", "c.ttf"]);
        let corpus = CorpusSource::Random(RandomSpec {
            length: 6,
            variable_length: true,
            letters: true,
            numbers: true,
            symbols: false,
        });
        let cfg = config(42);
        let first = build_shard_specs(&corpus, &pool, &cfg, 50).unwrap();
        let second = build_shard_specs(&corpus, &pool, &cfg, 50).unwrap();
        assert_eq!(first.len(), 50);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.index, b.index);
            assert_eq!(a.text, b.text);
            assert_eq!(a.font, b.font);
            assert_eq!(a.seed, b.seed);
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = stub_pool(tmp.path(), &["a.ttf", "b.ttf", "c.ttf"]);
        let corpus = CorpusSource::Random(RandomSpec {
            length: 6,
            variable_length: false,
            letters: true,
            numbers: false,
            symbols: false,
        });
        let first = build_shard_specs(&corpus, &pool, &config(1), 20).unwrap();
        let second = build_shard_specs(&corpus, &pool, &config(2), 20).unwrap();
        assert!(first.iter().zip(&second).any(|(a, b)| a.text != b.text));
    }

    #[test]
    fn symbol_sequences_override_embedded_label_naming() {
        let corpus = CorpusSource::Random(RandomSpec {
            length: 8,
            variable_length: false,
            letters: true,
            numbers: true,
            symbols: true,
        });
        assert_eq!(
            effective_naming(&corpus, NamingMode::PrefixLabel),
            NamingMode::Manifest
        );
        let plain = CorpusSource::DefaultDict("en".into());
        assert_eq!(
            effective_naming(&plain, NamingMode::PrefixLabel),
            NamingMode::PrefixLabel
        );
    }

    #[test]
    fn indexes_are_dense_and_ascending() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = stub_pool(tmp.path(), &["a.ttf"]);
        let corpus = CorpusSource::Random(RandomSpec {
            length: 4,
            variable_length: false,
            letters: true,
            numbers: false,
            symbols: false,
        });
        let specs = build_shard_specs(&corpus, &pool, &config(0), 10).unwrap();
        for (i, spec) in specs.iter().enumerate() {
            assert_eq!(spec.index, i);
        }
    }
}
