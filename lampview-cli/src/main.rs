mod logging;
mod settings;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use lampview_core::{
    compute_distance_matrix_with, load_dataset, load_matrix, neighborhood_preservation, save_matrix, stress,
    tsne, Session, Technique,
};
use tracing::{info, warn};

use crate::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "lampview")]
#[command(about = "Interactive multidimensional projection (LAMP, PLMP, force scheme, t-SNE)")]
#[command(version)]
struct Args {
    /// JSON settings file with optional `session` and `tsne` sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (debug, info, warn, error); RUST_LOG overrides it
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample control points, lay them out and project the dataset
    Project {
        /// Whitespace-separated dataset, label in the last column
        #[arg(short, long)]
        data: PathBuf,

        /// Number of control points (default: ceil(sqrt(N)))
        #[arg(short = 'n', long)]
        control_points: Option<usize>,

        /// Seed for sampling and the initial layout
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, value_enum)]
        technique: Option<TechniqueArg>,

        /// Where to write the N x 2 embedding
        #[arg(short, long, default_value = "embedding.txt")]
        output: PathBuf,

        /// Directory for the control point state
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Re-project a dataset from saved control point state
    Resume {
        #[arg(short, long)]
        data: PathBuf,

        #[arg(long)]
        state_dir: PathBuf,

        #[arg(long, value_enum)]
        technique: Option<TechniqueArg>,

        #[arg(short, long, default_value = "embedding.txt")]
        output: PathBuf,
    },

    /// Embed the whole dataset with t-SNE
    Tsne {
        #[arg(short, long)]
        data: PathBuf,

        #[arg(long)]
        perplexity: Option<f64>,

        #[arg(long)]
        max_iter: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(short, long, default_value = "tsne.txt")]
        output: PathBuf,
    },

    /// Compare a dataset with one of its embeddings
    Metrics {
        #[arg(short, long)]
        data: PathBuf,

        /// N x 2 embedding file
        #[arg(short, long)]
        embedding: PathBuf,

        /// Neighborhood size for neighborhood preservation
        #[arg(short, long, default_value = "10")]
        k: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TechniqueArg {
    Lamp,
    Plmp,
}

impl From<TechniqueArg> for Technique {
    fn from(arg: TechniqueArg) -> Self {
        match arg {
            TechniqueArg::Lamp => Technique::Lamp,
            TechniqueArg::Plmp => Technique::Plmp,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: lampview panicked");
        eprintln!(
            "  Location: {}",
            panic_info
                .location()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        eprintln!(
            "  Message: {}",
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .unwrap_or(&"<no message>")
        );
    }));

    let args = Args::parse();
    logging::init_with_filter(logging::level_directive(&args.log_level));

    info!("lampview {}", env!("CARGO_PKG_VERSION"));
    let mut settings = Settings::load(args.config.as_deref())?;

    match args.command {
        Command::Project {
            data,
            control_points,
            seed,
            technique,
            output,
            state_dir,
        } => {
            if let Some(t) = technique {
                settings.session.technique = t.into();
            }
            let dataset = load_dataset(&data)?;
            let session = Session::bootstrap(dataset.features, settings.session, control_points, seed)?;
            write_embedding(&session, &output)?;
            if let Some(dir) = state_dir {
                session.save_state(&dir)?;
            }
        }

        Command::Resume {
            data,
            state_dir,
            technique,
            output,
        } => {
            if let Some(t) = technique {
                settings.session.technique = t.into();
            }
            let dataset = load_dataset(&data)?;
            let session = Session::resume(dataset.features, &state_dir, settings.session)?;
            write_embedding(&session, &output)?;
        }

        Command::Tsne {
            data,
            perplexity,
            max_iter,
            seed,
            output,
        } => {
            let mut config = settings.tsne;
            if let Some(p) = perplexity {
                config.perplexity = p;
            }
            if let Some(m) = max_iter {
                config.max_iter = m;
            }
            config.seed = seed.or(config.seed);

            let dataset = load_dataset(&data)?;
            let y = tsne(dataset.features.view(), &config);
            save_matrix(&output, y.view())?;
            info!(path = %output.display(), rows = y.nrows(), "t-SNE embedding written");
        }

        Command::Metrics { data, embedding, k } => {
            let dataset = load_dataset(&data)?;
            let y = load_matrix(&embedding)?;
            if y.nrows() != dataset.len() {
                return Err(format!(
                    "embedding has {} rows but dataset has {}",
                    y.nrows(),
                    dataset.len()
                )
                .into());
            }

            let mode = settings.session.execution;
            let high = compute_distance_matrix_with(dataset.features.view(), settings.session.metric, mode);
            let low = compute_distance_matrix_with(y.view(), Default::default(), mode);

            let np = neighborhood_preservation(high.view(), low.view(), k)?;
            println!("neighborhood_preservation(k={}) = {:.6}", k, np.mean().unwrap_or(0.0));
            match stress(high.view(), low.view()) {
                Ok(s) => println!("stress = {:.6}", s),
                Err(e) => warn!(error = %e, "stress undefined for this dataset"),
            }
        }
    }

    Ok(())
}

fn write_embedding(session: &Session, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let y = session.current().ok_or("session has no embedding")?;
    save_matrix(output, y.view())?;
    info!(path = %output.display(), rows = y.nrows(), "embedding written");
    Ok(())
}
