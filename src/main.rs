use bouncer::physics::Bounds;
use bouncer::{BouncerError, RecordingSink, Stage, ToyConfig};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bouncer")]
#[command(about = "Headless driver for the bouncing-ball toy engine")]
struct Cli {
    /// YAML config file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run nodes for a while and print every scheduled note as a JSON line
    Simulate {
        /// Number of nodes
        #[arg(short, long, default_value_t = 1)]
        nodes: usize,

        /// Link the nodes into one relay instead of running them side by side
        #[arg(long)]
        chain: bool,

        #[arg(short, long, default_value_t = 8.0)]
        seconds: f64,

        /// Host frame rate of the simulation loop
        #[arg(long, default_value_t = 60.0)]
        fps: f64,

        /// Drag vector used for the first launch
        #[arg(long, num_args = 2, value_names = ["DX", "DY"], default_values_t = [40.0, -100.0], allow_negative_numbers = true)]
        drag: Vec<f64>,

        /// Put each node's own note on the downbeat of its step track
        #[arg(long)]
        downbeat: bool,
    },

    /// Print the initial state of one node
    Snapshot {
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        #[arg(long, default_value_t = 800.0)]
        width: f64,

        #[arg(long, default_value_t = 600.0)]
        height: f64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), BouncerError> {
    let config = match &cli.config {
        Some(path) => ToyConfig::load(path)?,
        None => ToyConfig::default(),
    };

    match cli.command {
        Commands::Simulate {
            nodes,
            chain,
            seconds,
            fps,
            drag,
            downbeat,
        } => simulate(config, nodes, chain, seconds, fps, &drag, downbeat),
        Commands::Snapshot { format, width, height } => {
            let mut stage = Stage::new(config);
            let state = stage.add_node("node-1", Bounds::new(0.0, 0.0, width, height))?.get_state();
            let text = match format {
                Format::Json => state.to_json()?,
                Format::Yaml => state.to_yaml()?,
            };
            println!("{}", text);
            Ok(())
        }
    }
}

fn simulate(
    config: ToyConfig,
    count: usize,
    chain: bool,
    seconds: f64,
    fps: f64,
    drag: &[f64],
    downbeat: bool,
) -> Result<(), BouncerError> {
    if count == 0 || !(fps.is_finite() && fps > 0.0) || !seconds.is_finite() {
        return Err(BouncerError::ConfigError(
            "simulate needs at least one node, a positive fps and a finite duration".to_string(),
        ));
    }
    let (dx, dy) = (drag.first().copied().unwrap_or(0.0), drag.get(1).copied().unwrap_or(-1.0));

    let mut stage = Stage::new(config);
    let ids: Vec<String> = (1..=count).map(|i| format!("node-{}", i)).collect();
    for (i, id) in ids.iter().enumerate() {
        let node = stage.add_node(id, Bounds::default())?;
        if downbeat {
            node.set_step(0, Some(i));
        }
    }
    if chain {
        for pair in ids.windows(2) {
            stage.link(&pair[0], &pair[1])?;
        }
    }

    stage.start(0.0);
    if chain {
        stage.launch(&ids[0], dx, dy, 0.0)?;
    } else {
        for id in &ids {
            stage.launch(id, dx, dy, 0.0)?;
        }
    }
    info!("Simulating {} node(s) for {}s at {} fps", count, seconds, fps);

    let mut sink = RecordingSink::new();
    let frames = (seconds * fps).ceil() as u64;
    let mut total = 0usize;
    for frame in 0..=frames {
        let now = frame as f64 / fps;
        stage.frame(now, &mut sink);
        for event in sink.drain() {
            let line = serde_json::to_string(&event).map_err(|e| BouncerError::SnapshotError(e.to_string()))?;
            println!("{}", line);
            total += 1;
        }
    }

    info!("{} notes scheduled", total);
    Ok(())
}
