use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::{SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::generator::{RunConfig, SampleSpec};
use crate::io::{self, NamingMode};
use crate::render;

const PROGRESS_EVERY: usize = 1_000;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("cannot build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Default)]
pub struct ShardOutcome {
    pub rendered: usize,
    pub failed: usize,
}

/// Drain one shard through a bounded worker pool. Completion order is
/// unspecified; every spec is self-contained and writes to its own
/// index-derived path. The pool is dropped on return, so the next shard
/// starts with a fresh set of workers.
///
/// A failed sample is logged and skipped, never fatal to the shard.
pub fn dispatch_shard(
    specs: &[SampleSpec],
    cfg: &RunConfig,
    naming: NamingMode,
    shard_dir: &Path,
) -> Result<ShardOutcome, DispatchError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.workers)
        .build()?;

    let rendered = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let total = specs.len();

    pool.install(|| {
        specs.par_iter().for_each(|spec| {
            match render_one(spec, naming, &cfg.extension, shard_dir) {
                Ok(()) => {
                    let done = rendered.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % PROGRESS_EVERY == 0 || done == total {
                        info!(done, total, "shard progress");
                    }
                }
                Err(err) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        index = spec.index,
                        font = %spec.font.display(),
                        error = %err,
                        "sample skipped"
                    );
                }
            }
        });
    });

    Ok(ShardOutcome {
        rendered: rendered.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    })
}

fn render_one(
    spec: &SampleSpec,
    naming: NamingMode,
    extension: &str,
    shard_dir: &Path,
) -> anyhow::Result<()> {
    let mut rng = SmallRng::seed_from_u64(spec.seed);
    let rendered = render::render(&spec.text, &spec.font, &spec.style, &mut rng)?;
    io::save_sample(rendered, spec, naming, extension, shard_dir)?;
    Ok(())
}
