use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info, warn};

use puffin_io::{
    FeatureTable, FieldList, IoError, NotesWriter, RunNotes, classification_dir, mat_to_table,
    read_table, write_table,
};
use puffin_rf::{
    Bucket, BucketCounts, BucketThresholds, ConfusionMatrix, OobMode, RandomForest,
    RandomForestConfig, SplitCriterion,
};

#[derive(Parser)]
#[command(name = "puffin")]
#[command(about = "Random forest classification of puff tracks exported from MATLAB")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Random Forest parameters used when a classifier has to be trained.
#[derive(Args, Debug, Clone)]
struct ForestArgs {
    /// Number of trees in the Random Forest
    #[arg(long, default_value_t = 100)]
    n_trees: usize,

    /// Maximum tree depth (unlimited if not set)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Minimum number of tracks in a leaf
    #[arg(long, default_value_t = 1)]
    min_samples_leaf: usize,

    /// Split criterion: "gini" or "entropy"
    #[arg(long, default_value = "gini")]
    criterion: String,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a MATLAB v7.3 tracks struct into a structured .npy table
    Convert {
        /// HDF5-encoded (v7.3) MATLAB file holding a `tracks` struct
        matfile: PathBuf,

        /// Field(s) to extract; the first is the label field
        #[arg(required = true, num_args = 1..)]
        fields: Vec<String>,

        /// Output directory (defaults to the MATLAB file's directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Train or load a classifier and sort tracks into puff / non-puff / maybe
    Classify {
        /// Classifier to load, or file to save a newly trained classifier in
        classifier: PathBuf,

        /// Training tracks: a .npy table or an HDF5-encoded MATLAB file
        training: PathBuf,

        /// Field(s) to extract from MATLAB files; the first is the label field
        #[arg(long, num_args = 1..)]
        fields: Vec<String>,

        /// Tracks to classify (defaults to the training tracks)
        #[arg(long)]
        testing: Option<PathBuf>,

        /// Puff probability at or above which a track is a puff
        #[arg(long, default_value_t = 0.7)]
        puff_threshold: f64,

        /// Puff probability at or below which a track is a non-puff
        #[arg(long, default_value_t = 0.3)]
        nonpuff_threshold: f64,

        #[command(flatten)]
        forest: ForestArgs,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct ConvertOutput {
    source: PathBuf,
    output_dir: PathBuf,
    n_tracks: usize,
    columns: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ClassifyOutput {
    classifier: PathBuf,
    trained: bool,
    output_dir: PathBuf,
    n_training_tracks: usize,
    counts: BucketCounts,
    oob_error: Option<f64>,
    test_accuracy: Option<f64>,
    feature_importances: Vec<ImportanceOutput>,
}

#[derive(Debug, Serialize)]
struct ImportanceOutput {
    rank: usize,
    name: String,
    importance: f64,
    std: f64,
}

/// Everything `classify` needs besides the input paths.
struct ClassifySettings {
    seed: u64,
    forest: ForestArgs,
    thresholds: BucketThresholds,
}

fn parse_criterion(s: &str) -> Result<SplitCriterion> {
    match s {
        "gini" => Ok(SplitCriterion::Gini),
        "entropy" => Ok(SplitCriterion::Entropy),
        other => anyhow::bail!("unknown split criterion: {other} (expected gini or entropy)"),
    }
}

/// Load a `.npy` table directly, or convert a MATLAB file into `dir`.
///
/// `None` means the source could not be converted and nothing was written.
fn load_tracks(path: &Path, fields: &FieldList, dir: &Path) -> Result<Option<FeatureTable>> {
    if path.extension().is_some_and(|ext| ext == "npy") {
        let table = read_table(path).with_context(|| format!("failed to read {}", path.display()))?;
        info!(path = %path.display(), n_tracks = table.n_rows(), "track table loaded");
        return Ok(Some(table));
    }
    mat_to_table(path, fields, dir).with_context(|| format!("failed to convert {}", path.display()))
}

/// Field list for a training source: the table's own columns for `.npy`,
/// otherwise the requested fields, which must include a label and a feature.
fn training_fields(training: &Path, requested: Vec<String>) -> Result<Option<FieldList>> {
    if training.extension().is_some_and(|ext| ext == "npy") {
        if !requested.is_empty() {
            debug!("--fields ignored for a .npy training table");
        }
        return Ok(None);
    }
    if requested.len() < 2 {
        return Err(IoError::InsufficientFields {
            count: requested.len(),
        }
        .into());
    }
    Ok(Some(FieldList::new(requested)?))
}

fn fields_of(table: &FeatureTable) -> Result<FieldList> {
    let names = table.column_names().into_iter().map(str::to_string).collect();
    FieldList::new(names).context("table column names are not usable as fields")
}

fn classifier_config(settings: &ClassifySettings) -> Result<RandomForestConfig> {
    Ok(RandomForestConfig::new(settings.forest.n_trees)?
        .with_max_depth(settings.forest.max_depth)
        .with_min_samples_leaf(settings.forest.min_samples_leaf)
        .with_criterion(parse_criterion(&settings.forest.criterion)?)
        .with_oob_mode(OobMode::Enabled)
        .with_seed(settings.seed))
}

fn run_convert(matfile: &Path, fields: Vec<String>, output_dir: Option<PathBuf>) -> Result<()> {
    let fields = FieldList::new(fields)?;
    let output_dir = output_dir.unwrap_or_else(|| {
        matfile
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    });

    let Some(table) = mat_to_table(matfile, &fields, &output_dir)
        .with_context(|| format!("failed to convert {}", matfile.display()))?
    else {
        warn!(source = %matfile.display(), "no data available; nothing converted");
        return Ok(());
    };

    let output = ConvertOutput {
        source: matfile.to_path_buf(),
        output_dir,
        n_tracks: table.n_rows(),
        columns: table.column_names().into_iter().map(str::to_string).collect(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_classify(
    classifier: &Path,
    training: &Path,
    fields: Vec<String>,
    testing: Option<&Path>,
    settings: &ClassifySettings,
) -> Result<Option<ClassifyOutput>> {
    // 1. Training tracks
    let train_dir = classification_dir(training);
    let requested = training_fields(training, fields)?;
    let train = match &requested {
        Some(fields) => load_tracks(training, fields, &train_dir)?,
        None => Some(read_table(training).with_context(|| format!("failed to read {}", training.display()))?),
    };
    let Some(train) = train else {
        warn!(source = %training.display(), "no training data available; classification skipped");
        return Ok(None);
    };
    let fields = match requested {
        Some(fields) => fields,
        None => fields_of(&train)?,
    };
    fields.require_features()?;

    // 2. Test tracks, which also decide where results go
    let (test, save_dir) = match testing {
        Some(path) => {
            let test_dir = classification_dir(path);
            let Some(test) = load_tracks(path, &fields, &test_dir)? else {
                warn!(source = %path.display(), "no test data available; classification skipped");
                return Ok(None);
            };
            if test.columns() != train.columns() {
                anyhow::bail!(
                    "testing columns [{}] in {} do not match training columns [{}]",
                    test.column_names().join(", "),
                    path.display(),
                    train.column_names().join(", ")
                );
            }
            (test, test_dir)
        }
        None => (train.clone(), train_dir),
    };

    // 3. Classifier
    let labels = train.labels().context("training labels are invalid")?;
    let train_features = train.feature_rows();
    let trained = !classifier.exists();
    let (forest, oob_error) = if trained {
        let result = classifier_config(settings)?
            .fit(&train_features, &labels, &train.feature_names())
            .context("classifier training failed")?;
        if let Some(parent) = classifier.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let (forest, oob) = result.into_parts();
        forest.save(classifier).context("failed to save classifier")?;
        (forest, oob.map(|s| s.error()))
    } else {
        let forest = RandomForest::load(classifier).context("failed to load classifier")?;
        info!(
            n_trees = forest.n_trees(),
            n_features = forest.n_features(),
            "classifier loaded"
        );
        (forest, None)
    };

    // 4. Classify
    let classification = forest
        .classify_tracks(&test.feature_rows(), &settings.thresholds)
        .context("classification failed")?;
    let counts = classification.counts();

    let test_accuracy = match test.labels() {
        Ok(truth) if truth.is_empty() => {
            debug!("no test tracks; accuracy not reported");
            None
        }
        Ok(truth) => {
            let cm = ConfusionMatrix::from_labels(&truth, classification.predictions(), forest.n_classes())?;
            debug!("confusion matrix against test labels:\n{cm}");
            Some(cm.accuracy())
        }
        Err(e) => {
            debug!(error = %e, "test labels unusable; accuracy not reported");
            None
        }
    };

    // 5. Report
    let importances = forest.feature_importances();
    let ranked: Vec<(String, f64)> = importances
        .iter()
        .map(|f| (f.name.clone(), f.importance))
        .collect();
    NotesWriter::new(&save_dir)?.append(&RunNotes {
        classifier_source: training,
        features: fields.features(),
        total: counts.total,
        puffs: counts.puffs,
        nonpuffs: counts.nonpuffs,
        maybe: counts.maybe,
        oob_error,
        importances: &ranked,
    })?;

    for bucket in [Bucket::NonPuff, Bucket::Puff, Bucket::Maybe] {
        let path = save_dir.join(format!("{}.npy", bucket.plural()));
        write_table(&path, &test.select_rows(&classification.indices(bucket)))?;
    }
    info!(dir = %save_dir.display(), "buckets written");

    Ok(Some(ClassifyOutput {
        classifier: classifier.to_path_buf(),
        trained,
        output_dir: save_dir,
        n_training_tracks: train.n_rows(),
        counts,
        oob_error,
        test_accuracy,
        feature_importances: importances
            .into_iter()
            .map(|f| ImportanceOutput {
                rank: f.rank,
                name: f.name,
                importance: f.importance,
                std: f.std,
            })
            .collect(),
    }))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Convert {
            matfile,
            fields,
            output_dir,
        } => run_convert(&matfile, fields, output_dir)?,

        Command::Classify {
            classifier,
            training,
            fields,
            testing,
            puff_threshold,
            nonpuff_threshold,
            forest,
        } => {
            let settings = ClassifySettings {
                seed: cli.seed,
                forest,
                thresholds: BucketThresholds::new(nonpuff_threshold, puff_threshold)?,
            };
            if let Some(output) = run_classify(&classifier, &training, fields, testing.as_deref(), &settings)? {
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        }
    }

    Ok(())
}
