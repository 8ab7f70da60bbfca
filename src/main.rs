use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use clap::Parser;

mod datatypes;
mod error;
mod network;
mod plotter;
mod post_processor;
mod scenario;
mod solver;

use error::RelaxError;
use plotter::{Line, NetworkPlotter};
use solver::{Callback, Monitor};

const FIGSIZE: (f64, f64) = (10.0, 7.0);
const VERTEX_RADIUS: f64 = 0.005;
const PIN_COLOR: &str = "#ff0000";
const INITIAL_COLOR: &str = "#cccccc";

/// Form-finds a bending-active spline by dynamic relaxation
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Scenario json overriding the built-in constants
    input: Option<String>,

    /// Mean residual force at which relaxation stops
    #[arg(long)]
    tol: Option<f64>,

    /// Iteration cap
    #[arg(long)]
    steps: Option<u64>,

    /// Capture a frame every this many iterations (0 for start and end only)
    #[arg(long)]
    refresh: Option<u64>,

    /// Mass scaling factor
    #[arg(long)]
    factor: Option<f64>,

    /// Animated figure
    #[arg(long, default_value = "spline.svg")]
    output: PathBuf,

    /// Also write each frame as a still figure into this directory
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Write <prefix>_vertices.csv and <prefix>_edges.csv
    #[arg(long)]
    csv_prefix: Option<String>,

    /// Seconds each frame stays on screen
    #[arg(long, default_value_t = 0.01)]
    pause: f64,

    /// Log residuals instead of showing a progress bar
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Neither log residuals nor show a progress bar
    #[arg(short, long)]
    quiet: bool,
}

/// Copies solver coordinates into the plotter's network and captures a frame
fn plot_iterations(plotter: Arc<Mutex<NetworkPlotter>>, pause: f64) -> Callback {
    Box::new(move |_k, x| {
        let mut plotter = match plotter.lock() {
            Ok(p) => p,
            Err(_) => return,
        };

        for key in plotter.network().vertices() {
            let xyz = [x[(key, 0)], x[(key, 1)], x[(key, 2)]];
            if let Err(err) = plotter.network_mut().set_vertex_coordinates(key, xyz) {
                println!("warning: {err}");
                return;
            }
        }

        let redrawn = plotter
            .update_vertices(VERTEX_RADIUS)
            .and_then(|_| plotter.update_edges());
        match redrawn {
            Ok(()) => plotter.update(pause),
            Err(err) => println!("warning: {err}"),
        }
    })
}

fn run(args: Args) -> Result<(), RelaxError> {
    let mut scenario = scenario::load(args.input.as_deref())?;
    if let Some(tol) = args.tol {
        scenario.solver.tol = tol;
    }
    if let Some(steps) = args.steps {
        scenario.solver.steps = steps;
    }
    if let Some(refresh) = args.refresh {
        scenario.solver.refresh = refresh;
    }
    if let Some(factor) = args.factor {
        scenario.solver.factor = factor;
    }
    scenario.validate()?;

    let mut network = scenario.build_network()?;

    // Initial configuration
    let mut plotter = NetworkPlotter::new(network.clone(), FIGSIZE);
    let mut lines = Vec::with_capacity(network.number_of_edges());
    for (u, v) in network.edges() {
        lines.push(Line {
            start: network.vertex_xy(u)?,
            end: network.vertex_xy(v)?,
            color: INITIAL_COLOR.to_owned(),
            width: 1.0,
        });
    }
    plotter.draw_lines(lines);
    plotter.draw_vertices(
        VERTEX_RADIUS,
        network
            .vertices_where_fixed()
            .into_iter()
            .map(|key| (key, PIN_COLOR.to_owned()))
            .collect::<HashMap<usize, String>>(),
    )?;
    plotter.draw_edges()?;
    plotter.update(args.pause);

    let plotter = Arc::new(Mutex::new(plotter));
    let monitor = if args.verbose {
        Monitor::Log
    } else if args.quiet {
        Monitor::Quiet
    } else {
        Monitor::ProgressBar
    };

    let result = solver::drx(
        &mut network,
        &scenario.solver,
        monitor,
        Some(plot_iterations(Arc::clone(&plotter), args.pause)),
    )?;

    if !result.converged {
        println!("warning: showing the last state reached, not an equilibrium");
    }

    let plotter = match plotter.lock() {
        Ok(p) => p,
        Err(_) => {
            return Err(RelaxError::PostProcessor(
                "Plotter was poisoned by a failed callback".to_owned(),
            ))
        }
    };
    plotter.show(&args.output)?;
    if let Some(dir) = &args.frames {
        plotter.save_frames(dir)?;
    }

    if let Some(prefix) = &args.csv_prefix {
        post_processor::csv_output(
            &network,
            &format!("{prefix}_vertices.csv"),
            &format!("{prefix}_edges.csv"),
        )?;
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(err) = run(args) {
        println!("{err}");
        std::process::exit(1)
    }
}
