//! hestat: encrypted aggregate statistics from input files

use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hestat_core::datagen::{generate_batch, generate_vector, ValueDistribution};
use hestat_core::input::{read_batch, read_pair, write_batch, write_pair};
use hestat_core::{
    pipeline, Operands, PackingScheme, PipelineConfig, ScalingContext, SchemeParams, Statistic,
    VarianceMethod,
};

#[derive(Parser)]
#[command(name = "hestat")]
#[command(about = "Sum, inner product, mean and variance over encrypted vectors")]
#[command(version)]
struct Args {
    /// Log every pipeline stage
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute a statistic over an input file
    Run(RunArgs),
    /// Write a synthetic input file
    Generate(GenerateArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Pair file for inner products, batch file otherwise
    #[arg(long)]
    input: PathBuf,

    #[arg(long, value_enum)]
    statistic: StatisticArg,

    #[arg(long, value_enum, default_value = "slot")]
    packing: PackingArg,

    /// Variance method
    #[arg(long, value_enum, default_value = "sum-of-squares")]
    method: MethodArg,

    /// Alpha for coefficient pre-scaling; its inverse is derived
    #[arg(long)]
    alpha: Option<u64>,

    #[arg(long, default_value = "8192")]
    ring_dim: usize,

    /// Plaintext modulus (prime)
    #[arg(long, default_value = "4295049217")]
    modulus: u64,

    /// Append stage timings to this CSV file
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Output file, stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "1")]
    vector_count: usize,

    #[arg(long)]
    vector_size: usize,

    /// Write two vectors in the pair layout instead of a batch
    #[arg(long)]
    pair: bool,

    #[arg(long, value_enum, default_value = "uniform")]
    distribution: DistributionArg,

    /// Uniform lower bound
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    low: i64,

    /// Uniform upper bound
    #[arg(long, default_value = "100", allow_negative_numbers = true)]
    high: i64,

    #[arg(long, default_value = "50.0", allow_negative_numbers = true)]
    mean: f64,

    #[arg(long, default_value = "10.0")]
    std_dev: f64,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatisticArg {
    Sum,
    InnerProduct,
    Mean,
    Variance,
}

#[derive(Clone, Copy, ValueEnum)]
enum PackingArg {
    Slot,
    Coefficient,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    SumOfSquares,
    Deviation,
}

#[derive(Clone, Copy, ValueEnum)]
enum DistributionArg {
    Uniform,
    Normal,
    Cyclic,
}

impl From<StatisticArg> for Statistic {
    fn from(arg: StatisticArg) -> Self {
        match arg {
            StatisticArg::Sum => Statistic::Sum,
            StatisticArg::InnerProduct => Statistic::InnerProduct,
            StatisticArg::Mean => Statistic::Mean,
            StatisticArg::Variance => Statistic::Variance,
        }
    }
}

impl From<PackingArg> for PackingScheme {
    fn from(arg: PackingArg) -> Self {
        match arg {
            PackingArg::Slot => PackingScheme::Slot,
            PackingArg::Coefficient => PackingScheme::Coefficient,
        }
    }
}

impl From<MethodArg> for VarianceMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::SumOfSquares => VarianceMethod::SumOfSquares,
            MethodArg::Deviation => VarianceMethod::Deviation,
        }
    }
}

fn run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let params = SchemeParams {
        ring_dim: args.ring_dim,
        plaintext_modulus: args.modulus,
        ..SchemeParams::default()
    };
    let statistic = Statistic::from(args.statistic);
    let mut config = PipelineConfig::new(statistic, args.packing.into())
        .with_params(params)
        .with_variance_method(args.method.into());
    if let Some(alpha) = args.alpha {
        config = config.with_scaling(ScalingContext::from_alpha(alpha, args.modulus)?);
    }

    let operands = match statistic {
        Statistic::InnerProduct => {
            let (left, right) = read_pair(&args.input)?;
            Operands::Pair(left, right)
        }
        _ => {
            let batch = read_batch(&args.input)?;
            info!(
                "Loaded {} vectors of {} elements",
                batch.vector_count, batch.vector_size
            );
            batch.into()
        }
    };

    let outcome = pipeline::run(&config, &operands)?;
    let t = &outcome.timings;
    println!("{}: {}", t.label, outcome.value());
    println!(
        "  numerator {} / divisor {} at index {}, depth {}",
        outcome.decoded.numerator, outcome.decoded.divisor, outcome.output_index, outcome.depth
    );
    println!(
        "  setup {:.3} ms, encryption {:.3} ms, evaluation {:.3} ms, decryption {:.3} ms, decoding {:.3} ms, total {:.3} ms",
        t.setup_ms, t.encryption_ms, t.evaluation_ms, t.decryption_ms, t.decoding_ms, t.total_ms
    );

    if let Some(path) = &args.csv {
        t.append_csv(path)?;
        info!("Timings appended to {}", path.display());
    }
    Ok(())
}

fn generate(args: GenerateArgs) -> Result<(), Box<dyn Error>> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let dist = match args.distribution {
        DistributionArg::Uniform => ValueDistribution::Uniform {
            low: args.low,
            high: args.high,
        },
        DistributionArg::Normal => ValueDistribution::Normal {
            mean: args.mean,
            std_dev: args.std_dev,
        },
        DistributionArg::Cyclic => ValueDistribution::Cyclic,
    };

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    if args.pair {
        let left = generate_vector(&mut rng, dist, args.vector_size)?;
        let right = generate_vector(&mut rng, dist, args.vector_size)?;
        write_pair(&mut out, &left, &right)?;
    } else {
        let batch = generate_batch(&mut rng, dist, args.vector_count, args.vector_size)?;
        write_batch(&mut out, &batch)?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Run(run_args) => run(run_args),
        Command::Generate(gen_args) => generate(gen_args),
    }
}
