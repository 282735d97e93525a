// src/bin/main.rs

use clap::{Args, Parser, Subcommand};
use rand::Rng;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use distributed_coloring::{
    color_graph_concurrent, dimacs, generators, AdjacencyList, ColoringError, Coloring, ExecutionMode, Graph,
    JsonLinesSink, NoopSink, Simulation, SimulationConfig, TraceConfig, TraceSink,
};

#[derive(Parser)]
#[command(name = "distributed-coloring")]
#[command(about = "Simulate randomized distributed vertex coloring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Color one graph and print the assignment as JSON
    Run(RunArgs),
    /// Color and verify a batch of random graphs of several shapes
    Trials(TrialArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// JSON config file (trace points, round cap, seed, mode)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for reproducible runs (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,

    /// Run one task per node instead of the sequential loop
    #[arg(long, default_value_t = false)]
    concurrent: bool,

    /// Abort after this many rounds
    #[arg(long)]
    max_rounds: Option<u64>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// DIMACS .col file to color instead of a generated graph
    #[arg(long)]
    dimacs: Option<PathBuf>,

    /// Node count of the generated random regular graph
    #[arg(long, default_value_t = 300)]
    nodes: u64,

    /// Degree of the generated random regular graph
    #[arg(long, default_value_t = 120)]
    degree: u64,

    /// Write every trace event as a JSON line to stderr
    #[arg(long, default_value_t = false)]
    trace: bool,

    /// Output file for the coloring (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct TrialArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Graphs generated per graph family
    #[arg(long, default_value_t = 6)]
    per_type: usize,
}

fn load_config(args: &CommonArgs) -> Result<SimulationConfig, ColoringError> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(max_rounds) = args.max_rounds {
        config.max_rounds = Some(max_rounds);
    }
    if args.concurrent {
        config.mode = ExecutionMode::Concurrent;
    }
    config.validate()?;
    Ok(config)
}

async fn color(
    source: &AdjacencyList,
    config: &SimulationConfig,
    sink: &mut dyn TraceSink,
) -> Result<(Graph, Coloring), ColoringError> {
    let graph = Graph::from_source(source)?;
    let coloring = match config.mode {
        ExecutionMode::Sequential => Simulation::new(graph.clone(), config, sink)?.run()?,
        ExecutionMode::Concurrent => color_graph_concurrent(graph.clone(), config, sink).await?,
    };
    Ok((graph, coloring))
}

async fn run(args: RunArgs) -> Result<(), ColoringError> {
    let mut config = load_config(&args.common)?;
    if args.trace {
        config.trace = TraceConfig::all();
    }

    let source = match &args.dimacs {
        Some(path) => dimacs::parse_dimacs_file(path)?,
        None => {
            let mut rng = generators::graph_rng(config.seed);
            generators::random_regular(args.degree, args.nodes, &mut rng)?
        }
    };
    log::info!("Graph: {} nodes, {} edges", source.node_count(), source.edge_count());

    let mut json_sink;
    let mut noop_sink = NoopSink;
    let sink: &mut dyn TraceSink = if config.trace.any() {
        json_sink = JsonLinesSink::new(io::stderr());
        &mut json_sink
    } else {
        &mut noop_sink
    };

    let (_, coloring) = color(&source, &config, sink).await?;
    log::info!(
        "Colored in {} rounds with {} of {} colors",
        coloring.rounds,
        coloring.distinct_colors(),
        coloring.palette_size
    );

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, &coloring)?;
            writer.flush()?;
            log::info!("Coloring written to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, &coloring)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}

fn trial_graphs(per_type: usize, rng: &mut impl Rng) -> Result<Vec<(&'static str, AdjacencyList)>, ColoringError> {
    let mut graphs = Vec::with_capacity(per_type * 4);
    for _ in 0..per_type {
        // n * d must be even
        let degree = rng.gen_range(5..=99);
        let nodes = rng.gen_range(50..=500) * 2;
        graphs.push(("random-regular", generators::random_regular(degree, nodes, rng)?));

        let shells: Vec<(u64, u64, f64)> = (0..rng.gen_range(1..=5))
            .map(|_| {
                let inter_per_intra = rng.gen_range(1..100) as f64;
                (rng.gen_range(1..100), rng.gen_range(1..100), 1.0 / (inter_per_intra + 1.0))
            })
            .collect();
        graphs.push(("random-shell", generators::random_shell(&shells, rng)?));

        let nodes = rng.gen_range(100..=1000);
        let (p_leg, p_leaf) = (rng.gen_range(0.0..0.95), rng.gen_range(0.0..0.95));
        graphs.push(("random-lobster", generators::random_lobster(nodes, p_leg, p_leaf, rng)?));

        let nodes = rng.gen_range(100..=1000);
        let m = rng.gen_range(1..=30);
        graphs.push(("barabasi-albert", generators::barabasi_albert(nodes, m, rng)?));
    }
    Ok(graphs)
}

async fn trials(args: TrialArgs) -> Result<(), ColoringError> {
    let config = load_config(&args.common)?;
    let mut rng = generators::graph_rng(config.seed);
    let graphs = trial_graphs(args.per_type, &mut rng)?;

    println!("Testing {} graphs...", graphs.len());
    let mut total_rounds = 0;
    for (kind, source) in &graphs {
        let (graph, coloring) = color(source, &config, &mut NoopSink).await?;
        println!(
            "  {:<16} {:>6} nodes {:>7} edges  max degree {:>4}  {:>3} rounds",
            kind,
            graph.node_count(),
            graph.edge_count(),
            graph.max_degree(),
            coloring.rounds
        );
        total_rounds += coloring.rounds;
    }
    println!("All {} graphs colored properly ({} rounds in total)", graphs.len(), total_rounds);
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Trials(args) => trials(args).await,
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
