use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use manga_core::{CatalogOptions, MetadataStore, PageGeometry, PrefetchWindow, Scanner, Work};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "manga-rs-cli", version, about = "Catalog local manga folders and zip archives")]
struct Cli {
    /// Metadata store file (default: <data dir>/manga-rs/store.json)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// JSON file with catalog options
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a library folder and list the works in it
    Scan {
        /// Library root
        root: PathBuf,

        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,

        /// Also write every cover as a JPEG into this directory
        #[arg(long)]
        covers: Option<PathBuf>,
    },
    /// Load the pages visible at a scroll position and save them as PNG
    Read {
        /// Library root
        root: PathBuf,

        /// Catalog index or path of the work
        work: String,

        /// Scroll offset in pixels
        #[arg(long, default_value_t = 0.0)]
        scroll: f64,

        /// Start from the last page read instead of --scroll
        #[arg(long)]
        resume: bool,

        /// Viewport height in pixels
        #[arg(long, default_value_t = 800.0)]
        viewport: f64,

        /// Output directory for page images
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let t_total = std::time::Instant::now();

    let options = match &cli.config {
        Some(path) => CatalogOptions::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CatalogOptions::default(),
    };
    let store_path = cli
        .store
        .clone()
        .or_else(MetadataStore::default_path)
        .context("no --store given and no platform data directory")?;
    let store = Arc::new(
        MetadataStore::open(&store_path)
            .with_context(|| format!("opening store {}", store_path.display()))?,
    );
    tracing::debug!(store = %store_path.display(), records = store.len(), "Store opened");
    let scanner = Scanner::new(Arc::clone(&store), options.clone());

    match cli.command {
        Command::Scan { root, json, covers } => {
            let seen = AtomicUsize::new(0);
            let works = scanner
                .scan(&root, &|w: &Arc<Work>| {
                    let index = seen.fetch_add(1, Ordering::Relaxed);
                    if !json {
                        print_work(index, w);
                    }
                })
                .await?;

            if json {
                let summaries: Vec<_> = works.iter().map(|w| w.summary()).collect();
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            }
            if let Some(dir) = covers {
                write_covers(&works, &dir)?;
            }
            eprintln!(
                "Done! {} works found ({:.2}s)",
                works.len(),
                t_total.elapsed().as_secs_f64()
            );
        }
        Command::Read {
            root,
            work,
            scroll,
            resume,
            viewport,
            out,
        } => {
            let works = scanner.scan(&root, &|_: &Arc<Work>| {}).await?;
            let work = find_work(&works, &work)
                .with_context(|| format!("no work matching {:?} under {}", work, root.display()))?;

            work.open().await;
            anyhow::ensure!(work.is_opened(), "could not open {}", work.path.display());

            let geometry = PageGeometry::for_work(work).with_padding(options.padding_top);
            let scroll = if resume {
                geometry.resume_offset(work.readed_index())
            } else {
                scroll
            };
            let window = PrefetchWindow::compute(&geometry, scroll, viewport);
            work.read(window.read_index);

            std::fs::create_dir_all(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            let indices: Vec<usize> = window.indices(work.len()).collect();
            let pages = join_all(indices.iter().map(|&i| work.load_entry(i))).await;

            let mut written = 0;
            for (index, page) in indices.iter().zip(pages) {
                let Some(page) = page else {
                    tracing::warn!(index, "Page unavailable");
                    continue;
                };
                let img = image::RgbaImage::from_raw(page.width, page.height, page.rgba)
                    .context("decoded page has an unexpected size")?;
                img.save(out.join(format!("{:04}.png", index)))?;
                written += 1;
            }
            work.close(&store);

            eprintln!(
                "Done! {} of {} pages written, reading position {} ({:.2}s)",
                written,
                indices.len(),
                work.readed_index(),
                t_total.elapsed().as_secs_f64()
            );
        }
    }

    Ok(())
}

fn print_work(index: usize, work: &Work) {
    let author = if work.author.is_empty() {
        String::new()
    } else {
        format!("[{}] ", work.author)
    };
    let tags = if work.tags.is_empty() {
        String::new()
    } else {
        format!(" ({})", work.tags.join(", "))
    };
    println!(
        "{:>4}  {:<9} {:>4}p  at {:>4}  {}{}{}",
        index,
        format!("{:?}", work.kind),
        work.len(),
        work.readed_index(),
        author,
        work.name,
        tags
    );
}

/// Match by catalog position first, then by path.
fn find_work<'a>(works: &'a [Arc<Work>], key: &str) -> Option<&'a Work> {
    if let Ok(index) = key.parse::<usize>() {
        if let Some(work) = works.get(index) {
            return Some(work);
        }
    }
    let key = Path::new(key);
    works
        .iter()
        .find(|w| w.path == key || w.path.ends_with(key))
        .map(|w| w.as_ref())
}

fn write_covers(works: &[Arc<Work>], dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut count = 0u32;
    for (index, work) in works.iter().enumerate() {
        if let Some(jpeg) = manga_core::render::cover_bytes(&work.cover) {
            std::fs::write(dir.join(format!("{:04}.jpg", index)), jpeg)?;
            count += 1;
        }
    }
    eprintln!("Wrote {} cover(s) to {}", count, dir.display());
    Ok(())
}
