//! Demo/test harness for the adaptive external sort engine.
//!
//! Sorts a flat file of fixed-size, fixed-key-offset-0 records, or (with
//! `--generate`) synthesizes a workload matching one of the distributions
//! from `spec.md` §8's end-to-end scenarios and reports which finishing
//! algorithm the adaptive controller picked. Neither this binary nor the
//! generator it drives is part of the sort engine itself — both are named
//! as external collaborators in `spec.md` §1.

use std::cmp::Ordering;
use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use adaptive_extsort::common::file_source::FileRecordSource;
use adaptive_extsort::common::generator::{generate_keys, KeyDistribution};
use adaptive_extsort::common::scratch::create_sized;
use adaptive_extsort::{external_sort, AdaptiveDecision, ExternalSortConfig, RecordSource};

#[derive(Parser)]
#[command(name = "extsort", about = "Adaptive external sort for fixed-size binary records")]
struct Cli {
    /// Binary file of fixed-size records to sort; omit with --generate.
    input: Option<PathBuf>,

    /// Generate a synthetic workload instead of reading `input`.
    #[arg(long, value_enum)]
    generate: Option<GenDist>,

    /// Record count for --generate.
    #[arg(long, default_value_t = 10_000)]
    count: usize,

    /// Cardinality for --generate=uniform.
    #[arg(long, default_value_t = 256)]
    cardinality: u32,

    /// Bytes per record. The first 4 bytes are always the sort key.
    #[arg(long, default_value_t = 16)]
    record_size: usize,

    /// Bytes per page, header included.
    #[arg(long, default_value_t = 4096)]
    page_size: usize,

    /// Buffer pages available to the engine (>= 2).
    #[arg(long, default_value_t = 8)]
    pages: u32,

    /// Estimated write-cost-to-read-cost ratio, in tenths.
    #[arg(long, default_value_t = 10)]
    write_to_read_ratio: u32,

    /// Stop after run generation; skip the finishing pass.
    #[arg(long)]
    run_gen_only: bool,

    /// Scratch file path (created, sized, and left behind for inspection).
    #[arg(long, default_value = "extsort.scratch")]
    scratch: PathBuf,
}

#[derive(Copy, Clone, ValueEnum)]
enum GenDist {
    Sorted,
    Reverse,
    Uniform,
    Distinct,
    MostlySorted,
}

struct InMemorySource {
    values: Vec<u32>,
    pos: usize,
}

impl RecordSource for InMemorySource {
    fn next(&mut self, out: &mut [u8]) -> Result<bool, adaptive_extsort::SortError> {
        if self.pos >= self.values.len() {
            return Ok(false);
        }
        out[0..4].copy_from_slice(&self.values[self.pos].to_le_bytes());
        self.pos += 1;
        Ok(true)
    }
}

fn key_cmp(a: &[u8], b: &[u8]) -> Ordering {
    u32::from_le_bytes(a[0..4].try_into().unwrap()).cmp(&u32::from_le_bytes(b[0..4].try_into().unwrap()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = ExternalSortConfig {
        record_size: cli.record_size,
        key_size: 4,
        page_size: cli.page_size,
        num_pages: cli.pages,
        write_to_read_ratio_x10: cli.write_to_read_ratio,
    };
    cfg.validate().context("invalid sort configuration")?;

    let total_records;
    let mut source: Box<dyn RecordSource> = if let Some(dist) = cli.generate {
        let keys = generate_keys(
            match dist {
                GenDist::Sorted => KeyDistribution::Sorted,
                GenDist::Reverse => KeyDistribution::ReverseSorted,
                GenDist::Uniform => KeyDistribution::UniformLowCardinality { cardinality: cli.cardinality },
                GenDist::Distinct => KeyDistribution::AllDistinctRandom,
                GenDist::MostlySorted => KeyDistribution::MostlySorted { sorted_run: (cli.count / 10).max(1) },
            },
            cli.count,
            0x5EED,
        );
        total_records = keys.len() as u64;
        Box::new(InMemorySource { values: keys, pos: 0 })
    } else {
        let path = cli.input.context("either an input file or --generate is required")?;
        let file = OpenOptions::new().read(true).open(&path).with_context(|| format!("opening {}", path.display()))?;
        let source = FileRecordSource::open(file, cli.record_size).context("reading input file")?;
        total_records = source.total_records();
        Box::new(source)
    };

    if cli.record_size < 4 {
        bail!("record_size must be at least 4 (the key occupies the first 4 bytes)");
    }

    // Scratch needs room for the input plus every intermediate merge pass;
    // a generous multiple of the input size keeps the demo simple.
    let scratch_pages = (total_records / cfg.values_per_page() as u64 + 1) * 4 + cfg.num_pages as u64;
    let mut scratch = create_sized(&cli.scratch, scratch_pages * cfg.page_size as u64).context("creating scratch file")?;

    let mut buffer = vec![0u8; (cfg.num_pages as usize - 1) * cfg.values_per_page() * cfg.record_size];
    let mut cmp = key_cmp;

    let outcome = external_sort(source.as_mut(), &mut scratch, &cfg, &mut buffer, &mut cmp, cli.run_gen_only)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("sort failed")?;

    println!("records:        {total_records}");
    println!("runs generated: {}", outcome.metrics.num_runs);
    println!("avg_distinct/10: {}", outcome.metrics.avg_distinct_x10 / 10);
    println!("result offset:  {}", outcome.result_offset);
    println!("reads:          {}", outcome.metrics.num_reads);
    println!("writes:         {}", outcome.metrics.num_writes);
    println!("comparisons:    {}", outcome.metrics.num_compar);
    println!("memcpys:        {}", outcome.metrics.num_memcpys);
    println!("gen time:       {:?}", outcome.metrics.gen_time);
    println!("total time:     {:?}", outcome.metrics.time);
    if let Some(decision) = outcome.decision {
        println!("finisher:       {}", decision_name(decision));
    }

    Ok(())
}

fn decision_name(d: AdaptiveDecision) -> &'static str {
    match d {
        AdaptiveDecision::MinSortSublists => "minsort-sublists",
        AdaptiveDecision::MinSortRegions => "minsort-regions",
        AdaptiveDecision::NobMerge => "nob-merge",
    }
}
