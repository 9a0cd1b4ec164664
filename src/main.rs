//! hnswpage CLI: drive the file-backed storage engine directly, mostly
//! for manual testing and crash-recovery drills — grounded on the
//! teacher's `bin/backup_tool.rs` `clap::Parser`/`Subcommand` shape.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use hnswpage::buffer::{BufferManager, FileHost};
use hnswpage::hnsw::HnswParams;
use hnswpage::index::IndexAccessMethod;
use hnswpage::logging;
use hnswpage::row_id::RowId;
use hnswpage::vector::{Metric, Quantization, Vector};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Page file to operate on.
    #[arg(short, long, value_name = "FILE")]
    pages: PathBuf,

    /// WAL file alongside the page file.
    #[arg(short, long, value_name = "FILE")]
    wal: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an empty index (init-fork image only).
    BuildEmpty {
        #[arg(short, long)]
        dim: u32,
        #[arg(short, long, default_value_t = 16)]
        m: u32,
    },
    /// Insert one random vector of the given dimension.
    Insert {
        #[arg(short, long)]
        dim: u32,
        #[arg(short, long, default_value_t = 16)]
        m: u32,
        #[arg(long)]
        seed: u64,
    },
    /// Search for the nearest neighbors of a random query vector.
    Search {
        #[arg(short, long)]
        k: usize,
        #[arg(long)]
        seed: u64,
    },
    /// Crawl the index checking the universal invariants (`spec.md` §8).
    Validate,
}

fn main() -> Result<()> {
    logging::init_from_env().ok();
    let cli = Cli::parse();
    let host = FileHost::open_at(&cli.pages, &cli.wal).context("failed to open page/WAL files")?;

    match &cli.command {
        Commands::BuildEmpty { dim, m } => {
            let params = HnswParams::new(*m, 128, 64)?;
            host.build_empty(&params, Metric::L2Sq, Quantization::F32, *dim)?;
            println!("empty index initialized (dim={dim}, m={m})");
        }
        Commands::Insert { dim, m, seed } => {
            let params = HnswParams::new(*m, 128, 64)?;
            let vector = random_vector(*dim, *seed);
            let label = RowId::from_page_offset(*seed as u32, 0);
            let state = host.insert(&params, Metric::L2Sq, label, vector, *seed)?;
            println!("insert finished: {state:?}");
        }
        Commands::Search { k, seed } => {
            let header = hnswpage::header::IndexHeader::read_from_page(host.read_shared(0)?.page())?;
            if header.is_empty() {
                bail!("index is empty, nothing to search");
            }
            let query = random_vector(header.dim, *seed);
            let mut scan = host.begin_scan(&query, *k)?;
            let mut rank = 0;
            while let Some((row, dist)) = scan.get_tuple() {
                rank += 1;
                println!("{rank}. {row:?} dist={dist}");
            }
            scan.end_scan();
        }
        Commands::Validate => {
            let report = hnswpage::index::validate(&host)?;
            println!("nodes visited: {}", report.nodes_visited);
            if report.is_clean() {
                println!("OK: no invariant violations");
            } else {
                for violation in &report.violations {
                    println!("invariant {}: {}", violation.invariant, violation.detail);
                }
                bail!("{} invariant violation(s) found", report.violations.len());
            }
        }
    }

    Ok(())
}

fn random_vector(dim: u32, seed: u64) -> Vector {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(seed);
    Vector::F32((0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
}
