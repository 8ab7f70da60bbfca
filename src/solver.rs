use crate::{
    datatypes::AxialBehaviour,
    error::RelaxError,
    network::Network,
};
use argmin_observer_slog::SlogLogger;
use indicatif::ProgressBar;
use nalgebra::{DMatrix, DVector, Vector3};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use argmin::core::{
    observers::{Observe, ObserverMode},
    ArgminError, Error, Executor, IterState, Operator, Problem, Solver, State, KV,
};

/// Vertex coordinates, one row per vertex
pub type Coordinates = DMatrix<f64>;

/// Called with the iteration number and the current coordinates
pub type Callback = Box<dyn FnMut(u64, &Coordinates) + Send>;

type RelaxState = IterState<Coordinates, (), (), (), (), f64>;

const PROGRESS_LENGTH: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct DrxSettings {
    /// Mean out-of-balance force at which the run stops
    pub tol: f64,
    /// Iteration cap
    pub steps: u64,
    /// Mass scaling. Larger values mean smaller, steadier pseudo time steps.
    pub factor: f64,
    /// Callback cadence in iterations; 0 calls back only once, at the end
    pub refresh: u64,
    /// Write coordinates, forces and reactions back into the network
    pub update: bool,
}

/// What to show on the terminal while relaxing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Monitor {
    ProgressBar,
    Log,
    Quiet,
}

#[derive(Debug, Clone)]
pub struct RelaxationResult {
    pub coordinates: Coordinates,
    pub forces: DVector<f64>,
    pub lengths: DVector<f64>,
    /// Support reactions, zero on free axes
    pub reactions: DMatrix<f64>,
    pub residual: f64,
    pub iterations: u64,
    pub converged: bool,
}

/// Out-of-balance forces at one configuration
#[derive(Debug, Clone)]
pub struct Residual {
    /// Loads minus beam shear minus axial forces, one row per vertex,
    /// before restrained axes are masked out
    pub forces: DMatrix<f64>,
    pub axial_forces: DVector<f64>,
    pub lengths: DVector<f64>,
}

/// Consecutive node triples along every beam
#[derive(Debug, Clone, Default)]
struct BeamTriples {
    start: Vec<usize>,
    inner: Vec<usize>,
    end: Vec<usize>,
    eix: Vec<f64>,
    eiy: Vec<f64>,
}

/// Evaluates the residual of a network for given coordinates
#[derive(Debug, Clone)]
struct RelaxationOperator {
    connectivity: CsrMatrix<f64>,
    connectivity_t: CsrMatrix<f64>,
    stiffness: DVector<f64>,
    prestress: DVector<f64>,
    rest_lengths: DVector<f64>,
    axial: Vec<AxialBehaviour>,
    loads: DMatrix<f64>,
    beams: BeamTriples,
}

impl Operator for RelaxationOperator {
    type Param = Coordinates;
    type Output = Residual;

    fn apply(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.residual(x))
    }
}

fn row3(x: &DMatrix<f64>, i: usize) -> Vector3<f64> {
    Vector3::new(x[(i, 0)], x[(i, 1)], x[(i, 2)])
}

fn add_row3(x: &mut DMatrix<f64>, i: usize, v: &Vector3<f64>) {
    for j in 0..3 {
        x[(i, j)] += v[j];
    }
}

impl RelaxationOperator {
    /// Collects the static arrays of a network
    ///
    /// # Arguments
    /// * `network` - The network to relax
    fn new(network: &Network) -> Result<RelaxationOperator, RelaxError> {
        let n = network.number_of_vertices();
        let m = network.number_of_edges();

        let mut coo = CooMatrix::new(m, n);
        let mut stiffness = DVector::zeros(m);
        let mut prestress = DVector::zeros(m);
        let mut rest_lengths = DVector::zeros(m);
        let mut axial = Vec::with_capacity(m);

        for (index, (u, v)) in network.edges().enumerate() {
            let attributes = network.edge_attributes(index)?;
            if !(attributes.l0 > 0.0) {
                return Err(RelaxError::Solver(format!(
                    "Edge {index} ({u}, {v}) has non-positive rest length {}",
                    attributes.l0
                )));
            }

            coo.push(index, u, -1.0);
            coo.push(index, v, 1.0);
            stiffness[index] = attributes.e * attributes.a / attributes.l0;
            prestress[index] = attributes.s0 * attributes.a;
            rest_lengths[index] = attributes.l0;
            axial.push(attributes.axial);
        }

        let mut loads = DMatrix::zeros(n, 3);
        for key in network.vertices() {
            let attributes = network.vertex_attributes(key)?;
            for j in 0..3 {
                loads[(key, j)] = attributes.load[j];
            }
        }

        let mut beams = BeamTriples::default();
        for beam in network.beams() {
            for triple in beam.nodes.windows(3) {
                let attributes = network.vertex_attributes(triple[1])?;
                beams.start.push(triple[0]);
                beams.inner.push(triple[1]);
                beams.end.push(triple[2]);
                beams.eix.push(attributes.eix);
                beams.eiy.push(attributes.eiy);
            }
        }

        let connectivity = CsrMatrix::from(&coo);
        let connectivity_t = connectivity.transpose();

        Ok(RelaxationOperator {
            connectivity,
            connectivity_t,
            stiffness,
            prestress,
            rest_lengths,
            axial,
            loads,
            beams,
        })
    }

    /// Lumped mass of each vertex: the axial and prestress stiffness of
    /// the edges meeting there, scaled by `factor`
    fn masses(&self, factor: f64) -> DVector<f64> {
        let mut edge_stiffness = self.stiffness.clone();
        for e in 0..edge_stiffness.len() {
            edge_stiffness[e] += self.prestress[e] / self.rest_lengths[e];
        }

        let mut masses = DVector::zeros(self.loads.nrows());
        for (row, col, value) in self.connectivity.triplet_iter() {
            masses[col] += value.abs() * edge_stiffness[row];
        }

        masses * factor
    }

    /// Equivalent nodal forces resisting curvature at interior beam nodes
    fn beam_shear(&self, x: &Coordinates) -> DMatrix<f64> {
        let mut shear = DMatrix::zeros(x.nrows(), 3);
        let beams = &self.beams;

        for t in 0..beams.inner.len() {
            let (s, i, f) = (beams.start[t], beams.inner[t], beams.end[t]);
            let xs = row3(x, s);
            let xi = row3(x, i);
            let xf = row3(x, f);

            let qa = xi - xs;
            let qb = xf - xi;
            let qc = xf - xs;
            let qn = qa.cross(&qb);
            let mu = 0.5 * qc;

            let la = qa.norm();
            let lb = qb.norm();
            let lc = qc.norm();
            let lqn = qn.norm();
            let lmu = mu.norm();

            // straight or collapsed triple
            if la == 0.0 || lb == 0.0 || lc == 0.0 || lqn == 0.0 || lmu == 0.0 {
                continue;
            }

            let cos_alpha = ((la * la + lb * lb - lc * lc) / (2.0 * la * lb)).clamp(-1.0, 1.0);
            let k = 2.0 * cos_alpha.acos().sin() / lc;

            let ex = qn / lqn;
            let ez = mu / lmu;
            let ey = ez.cross(&ex);

            let curvature = qn * (k / lqn);
            let kx = ex * curvature.dot(&ex);
            let ky = ey * curvature.dot(&ey);
            let moment = kx * beams.eix[t] + ky * beams.eiy[t];

            let cma = moment.cross(&qa);
            let cmb = moment.cross(&qb);
            let ua = cma / cma.norm();
            let ub = cmb / cmb.norm();
            let c1 = qa.cross(&ua);
            let c2 = qb.cross(&ub);
            let ms = moment.norm_squared();

            let mut sa = ua * (ms * c1.norm() / (la * moment.dot(&c1)));
            let mut sb = ub * (ms * c2.norm() / (lb * moment.dot(&c2)));
            for component in sa.iter_mut().chain(sb.iter_mut()) {
                if !component.is_finite() {
                    *component = 0.0;
                }
            }

            add_row3(&mut shear, s, &sa);
            add_row3(&mut shear, i, &(-(sa + sb)));
            add_row3(&mut shear, f, &sb);
        }

        shear
    }

    fn residual(&self, x: &Coordinates) -> Residual {
        let mut uvw: DMatrix<f64> = &self.connectivity * x;
        let m = uvw.nrows();

        let mut lengths = DVector::zeros(m);
        let mut axial_forces = DVector::zeros(m);
        for e in 0..m {
            let length = uvw.row(e).norm();
            let mut force =
                self.prestress[e] + self.stiffness[e] * (length - self.rest_lengths[e]);
            match self.axial[e] {
                AxialBehaviour::Both => {}
                AxialBehaviour::TensionOnly => force = force.max(0.0),
                AxialBehaviour::CompressionOnly => force = force.min(0.0),
            }

            let force_density = if length > 0.0 { force / length } else { 0.0 };
            uvw.row_mut(e).scale_mut(force_density);

            lengths[e] = length;
            axial_forces[e] = force;
        }

        let internal: DMatrix<f64> = &self.connectivity_t * &uvw;
        let forces = &self.loads - self.beam_shear(x) - internal;

        Residual {
            forces,
            axial_forces,
            lengths,
        }
    }
}

/// Explicit dynamic relaxation with kinetic damping
struct DynamicRelaxation {
    masses: DVector<f64>,
    freedom: DMatrix<f64>,
    velocities: DMatrix<f64>,
    kinetic_energy: f64,
}

impl DynamicRelaxation {
    /// Mean norm of the unrestrained part of the residual
    fn out_of_balance(&self, forces: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
        let masked = forces.component_mul(&self.freedom);
        let n = masked.nrows();
        if n == 0 {
            return (masked, 0.0);
        }
        let total: f64 = (0..n).map(|i| masked.row(i).norm()).sum();
        (masked, total / n as f64)
    }
}

impl Solver<RelaxationOperator, RelaxState> for DynamicRelaxation {
    const NAME: &'static str = "Dynamic Relaxation";

    fn init(
        &mut self,
        problem: &mut Problem<RelaxationOperator>,
        state: RelaxState,
    ) -> Result<(RelaxState, Option<KV>), Error> {
        let x = state.get_param().ok_or_else(|| ArgminError::NotInitialized {
            text: "Dynamic relaxation needs initial coordinates".to_string(),
        })?;
        let residual = problem.apply(x)?;
        let (_, cost) = self.out_of_balance(&residual.forces);

        Ok((state.cost(cost), None))
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<RelaxationOperator>,
        mut state: RelaxState,
    ) -> Result<(RelaxState, Option<KV>), Error> {
        let mut x = state.take_param().ok_or_else(|| ArgminError::NotInitialized {
            text: "Dynamic relaxation lost its coordinates".to_string(),
        })?;

        let residual = problem.apply(&x)?;
        let (forces, cost) = self.out_of_balance(&residual.forces);

        let mut kinetic_energy = 0.0;
        for i in 0..self.velocities.nrows() {
            for j in 0..3 {
                self.velocities[(i, j)] += forces[(i, j)] / self.masses[i];
                kinetic_energy += self.masses[i] * self.velocities[(i, j)].powi(2);
            }
        }

        // kinetic damping: stop everything once energy peaks
        if kinetic_energy < self.kinetic_energy {
            self.velocities.fill(0.0);
        }
        self.kinetic_energy = kinetic_energy;

        x += &self.velocities;

        if x.iter().any(|v| !v.is_finite()) {
            return Err(ArgminError::ConditionViolated {
                text: format!(
                    "Coordinates diverged at iteration {}; try a larger factor",
                    state.get_iter()
                ),
            }
            .into());
        }

        Ok((state.param(x).cost(cost), None))
    }
}

/// Hands the current coordinates to a user callback
struct CallbackObserver {
    callback: Callback,
}

impl Observe<RelaxState> for CallbackObserver {
    fn observe_iter(&mut self, state: &RelaxState, _kv: &KV) -> Result<(), Error> {
        if let Some(x) = state.get_param() {
            (self.callback)(state.get_iter(), x);
        }
        Ok(())
    }

    fn observe_final(&mut self, state: &RelaxState) -> Result<(), Error> {
        if let Some(x) = state.get_param() {
            (self.callback)(state.get_iter(), x);
        }
        Ok(())
    }
}

/// Progress bar that fills as the residual falls towards the tolerance
/// on a log scale
struct ResidualObserverBar {
    bar: ProgressBar,
    initial_mag: f64,
    final_mag: f64,
}

impl ResidualObserverBar {
    fn new(tol: f64) -> ResidualObserverBar {
        ResidualObserverBar {
            bar: ProgressBar::new(PROGRESS_LENGTH),
            initial_mag: f64::NAN,
            final_mag: tol.log10(),
        }
    }

    fn progress(&self, residual: f64) -> u64 {
        let span = self.initial_mag - self.final_mag;
        if !(span > 0.0) || !(residual > 0.0) {
            return PROGRESS_LENGTH;
        }
        let fraction = (self.initial_mag - residual.log10()) / span;
        (fraction.clamp(0.0, 1.0) * PROGRESS_LENGTH as f64) as u64
    }
}

impl Observe<RelaxState> for ResidualObserverBar {
    fn observe_init(&mut self, _name: &str, state: &RelaxState, _kv: &KV) -> Result<(), Error> {
        self.initial_mag = state.get_cost().log10();
        Ok(())
    }

    fn observe_iter(&mut self, state: &RelaxState, _kv: &KV) -> Result<(), Error> {
        self.bar.set_position(self.progress(state.get_cost()));
        Ok(())
    }

    fn observe_final(&mut self, _state: &RelaxState) -> Result<(), Error> {
        self.bar.finish();
        Ok(())
    }
}

fn initial_coordinates(network: &Network) -> Result<Coordinates, RelaxError> {
    let mut x = DMatrix::zeros(network.number_of_vertices(), 3);
    for key in network.vertices() {
        let p = network.vertex_coordinates(key)?;
        for j in 0..3 {
            x[(key, j)] = p[j];
        }
    }
    Ok(x)
}

/// Per-axis residual multipliers; rows of fixed vertices are zero
fn freedom_mask(network: &Network) -> Result<DMatrix<f64>, RelaxError> {
    let mut freedom = DMatrix::zeros(network.number_of_vertices(), 3);
    for key in network.vertices() {
        let attributes = network.vertex_attributes(key)?;
        if attributes.is_fixed {
            continue;
        }
        for j in 0..3 {
            freedom[(key, j)] = attributes.freedom[j];
        }
    }
    Ok(freedom)
}

/// Writes the relaxed state back into the network
fn update_network(network: &mut Network, result: &RelaxationResult) -> Result<(), RelaxError> {
    let x = &result.coordinates;
    for key in network.vertices() {
        network.set_vertex_coordinates(key, [x[(key, 0)], x[(key, 1)], x[(key, 2)]])?;
        let r = &result.reactions;
        network.set_vertex_reaction(key, [r[(key, 0)], r[(key, 1)], r[(key, 2)]])?;
    }
    for index in 0..network.number_of_edges() {
        network.set_edge_results(index, result.forces[index], result.lengths[index])?;
    }
    Ok(())
}

/// Relaxes a network to equilibrium by dynamic relaxation
///
/// # Arguments
/// * `network` - The network to relax. Updated in place when `settings.update` is set.
/// * `settings` - Tolerance, iteration cap, mass factor and callback cadence
/// * `monitor` - Terminal feedback while running
/// * `callback` - Called every `settings.refresh` iterations (if non-zero) and once at the end
///
/// # Returns
/// The relaxed coordinates with edge forces, lengths and support reactions
pub fn drx(
    network: &mut Network,
    settings: &DrxSettings,
    monitor: Monitor,
    callback: Option<Callback>,
) -> Result<RelaxationResult, RelaxError> {
    if network.number_of_vertices() == 0 {
        return Err(RelaxError::Solver("Network has no vertices".to_owned()));
    }

    let operator = RelaxationOperator::new(network)?;
    let masses = operator.masses(settings.factor);
    if let Some(key) = masses.iter().position(|m| !(*m > 0.0) || !m.is_finite()) {
        return Err(RelaxError::Solver(format!(
            "Vertex {key} has no mass; check that it is connected by a stiff edge"
        )));
    }

    let x0 = initial_coordinates(network)?;
    let freedom = freedom_mask(network)?;
    let solver = DynamicRelaxation {
        masses,
        freedom: freedom.clone(),
        velocities: DMatrix::zeros(x0.nrows(), 3),
        kinetic_energy: 0.0,
    };

    println!(
        "info: relaxing {} vertices and {} edges (tol {}, factor {})...",
        network.number_of_vertices(),
        network.number_of_edges(),
        settings.tol,
        settings.factor
    );
    let start = std::time::Instant::now();

    let mut executor = Executor::new(operator.clone(), solver).configure(|state| {
        state
            .param(x0)
            .max_iters(settings.steps)
            .target_cost(settings.tol)
    });
    match monitor {
        Monitor::ProgressBar => {
            executor = executor.add_observer(
                ResidualObserverBar::new(settings.tol),
                ObserverMode::NewBest,
            )
        }
        Monitor::Log if settings.refresh > 0 => {
            executor = executor.add_observer(
                SlogLogger::term(),
                ObserverMode::Every(settings.refresh),
            )
        }
        _ => {}
    }
    if let Some(callback) = callback {
        // refresh 0 still reports the final state
        let mode = match settings.refresh {
            0 => ObserverMode::Never,
            k => ObserverMode::Every(k),
        };
        executor = executor.add_observer(CallbackObserver { callback }, mode);
    }

    let res = executor.run()?;

    let coordinates = match res.state().get_param() {
        Some(x) => x.clone(),
        None => {
            return Err(RelaxError::Solver(
                "Dynamic relaxation could not produce coordinates".to_owned(),
            ))
        }
    };
    let residual = res.state().get_cost();
    let iterations = res.state().get_iter();
    let converged = residual <= settings.tol;

    let elapsed = start.elapsed().as_secs_f32();
    if converged {
        println!(
            "info: converged in {} iterations ({:.3} seconds), residual {:.3e}",
            iterations, elapsed, residual
        );
    } else {
        println!(
            "warning: stopped after {} iterations ({:.3} seconds) \
             with residual {:.3e} above tolerance {}",
            iterations, elapsed, residual, settings.tol
        );
    }

    // final forces and reactions at the relaxed shape
    let balance = operator.residual(&coordinates);
    let mut reactions = DMatrix::zeros(coordinates.nrows(), 3);
    for i in 0..reactions.nrows() {
        for j in 0..3 {
            if freedom[(i, j)] == 0.0 {
                reactions[(i, j)] = -balance.forces[(i, j)];
            }
        }
    }

    let result = RelaxationResult {
        coordinates,
        forces: balance.axial_forces,
        lengths: balance.lengths,
        reactions,
        residual,
        iterations,
        converged,
    };

    if settings.update {
        update_network(network, &result)?;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        datatypes::{EdgePatch, VertexPatch},
        scenario::SplineScenario,
    };

    fn settings(tol: f64, steps: u64) -> DrxSettings {
        DrxSettings {
            tol,
            steps,
            factor: 1.0,
            refresh: 0,
            update: true,
        }
    }

    /// Two bars between supports at x = 0 and x = 2, loaded at mid-span
    fn hanging_pair() -> Network {
        let mut network = Network::from_vertices_and_edges(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            &[[0, 1], [1, 2]],
        )
        .unwrap();
        network.update_default_edge_attributes(&EdgePatch {
            e: Some(100.0),
            a: Some(1.0),
            l0: Some(1.0),
            ..Default::default()
        });
        network
            .set_vertices_attributes(
                &[1],
                &VertexPatch {
                    load: Some([0.0, -1.0, 0.0]),
                    ..Default::default()
                },
            )
            .unwrap();
        network
            .set_vertices_attributes(
                &[0, 2],
                &VertexPatch {
                    is_fixed: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        network
    }

    #[test]
    fn hanging_pair_reaches_equilibrium() {
        let mut network = hanging_pair();
        let result = drx(&mut network, &settings(1e-6, 50000), Monitor::Quiet, None).unwrap();

        assert!(result.converged);
        let mid = network.vertex_coordinates(1).unwrap();
        assert!((mid.x - 1.0).abs() < 1e-4);
        assert!(mid.y < 0.0);

        // vertical balance at the loaded node
        let length = (1.0 + mid.y * mid.y).sqrt();
        let force = 100.0 * (length - 1.0);
        assert!((2.0 * force * mid.y.abs() / length - 1.0).abs() < 1e-3);

        let tension = network.edge_attributes(0).unwrap();
        assert!(tension.force > 0.0);
        assert!((tension.length - length).abs() < 1e-9);

        let r0 = network.vertex_attributes(0).unwrap().reaction;
        let r2 = network.vertex_attributes(2).unwrap().reaction;
        assert!((r0[1] + r2[1] - 1.0).abs() < 1e-3);
        assert!((r0[0] + r2[0]).abs() < 1e-3);
        assert_eq!(network.vertex_attributes(1).unwrap().reaction, [0.0; 3]);
    }

    #[test]
    fn update_false_leaves_network_alone() {
        let mut network = hanging_pair();
        let mut config = settings(1e-3, 50000);
        config.update = false;
        let result = drx(&mut network, &config, Monitor::Quiet, None).unwrap();

        assert!(result.coordinates[(1, 1)] < 0.0);
        assert_eq!(network.vertex_coordinates(1).unwrap().y, 0.0);
        assert_eq!(network.edge_attributes(0).unwrap().force, 0.0);
    }

    #[test]
    fn spline_pins_stay_put_and_callback_follows_refresh() {
        let scenario = SplineScenario::default();
        let mut network = scenario.build_network().unwrap();
        let before: Vec<_> = scenario
            .pins
            .iter()
            .map(|&p| network.vertex_coordinates(p).unwrap())
            .collect();

        let calls: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let callback: Callback = Box::new(move |k, x| {
            assert_eq!(x.nrows(), 40);
            recorded.lock().unwrap().push(k);
        });

        let config = DrxSettings {
            steps: 200,
            refresh: 50,
            ..scenario.solver.clone()
        };
        let result = drx(&mut network, &config, Monitor::Quiet, Some(callback)).unwrap();

        for (&pin, point) in scenario.pins.iter().zip(before) {
            assert_eq!(network.vertex_coordinates(pin).unwrap(), point);
        }
        assert!(result.iterations <= 200);
        assert!(result.coordinates.iter().all(|v| v.is_finite()));

        let calls = calls.lock().unwrap();
        assert!(calls.len() >= 2);
        for k in &calls[..calls.len() - 1] {
            assert_eq!(k % 50, 0);
        }
    }

    #[test]
    fn straight_beam_has_no_shear() {
        let mut network = Network::from_vertices_and_edges(
            &[[0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [2.0, 2.0, 0.0]],
            &[[0, 1], [1, 2]],
        )
        .unwrap();
        network.update_default_vertex_attributes(&VertexPatch {
            eix: Some(1.0),
            eiy: Some(1.0),
            ..Default::default()
        });
        network.add_beam("beam", vec![0, 1, 2]).unwrap();

        let operator = RelaxationOperator::new(&network).unwrap();
        let x = initial_coordinates(&network).unwrap();
        assert!(operator.beam_shear(&x).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn bent_beam_pushes_back_to_straight() {
        let h = 0.1;
        let mut network = Network::from_vertices_and_edges(
            &[[-1.0, 0.0, 0.0], [0.0, h, 0.0], [1.0, 0.0, 0.0]],
            &[[0, 1], [1, 2]],
        )
        .unwrap();
        network.update_default_vertex_attributes(&VertexPatch {
            eix: Some(1.0),
            eiy: Some(1.0),
            ..Default::default()
        });
        network.add_beam("beam", vec![0, 1, 2]).unwrap();

        let operator = RelaxationOperator::new(&network).unwrap();
        let x = initial_coordinates(&network).unwrap();
        let shear = operator.beam_shear(&x);

        let expected = 4.0 * h / (1.0 + h * h).powi(2);
        assert!((shear[(1, 1)] - expected).abs() < 1e-9);
        assert!(shear[(1, 0)].abs() < 1e-12);
        for j in 0..3 {
            let total: f64 = (0..3).map(|i| shear[(i, j)]).sum();
            assert!(total.abs() < 1e-12);
        }
    }

    #[test]
    fn tension_only_edges_go_slack() {
        let mut network = Network::from_vertices_and_edges(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            &[[0, 1]],
        )
        .unwrap();
        network.update_default_edge_attributes(&EdgePatch {
            l0: Some(2.0),
            axial: Some(AxialBehaviour::TensionOnly),
            ..Default::default()
        });

        let operator = RelaxationOperator::new(&network).unwrap();
        let x = initial_coordinates(&network).unwrap();
        let residual = operator.apply(&x).unwrap();
        assert_eq!(residual.axial_forces[0], 0.0);
        assert!(residual.forces.iter().all(|v| *v == 0.0));

        network
            .set_edges_attributes(
                &[0],
                &EdgePatch {
                    axial: Some(AxialBehaviour::Both),
                    ..Default::default()
                },
            )
            .unwrap();
        let operator = RelaxationOperator::new(&network).unwrap();
        let residual = operator.apply(&x).unwrap();
        assert_eq!(residual.axial_forces[0], -0.5);
        // a compressed bar pushes its ends apart
        assert_eq!(residual.forces[(1, 0)], 0.5);
        assert_eq!(residual.forces[(0, 0)], -0.5);
    }

    #[test]
    fn masses_sum_connected_stiffness() {
        let network = hanging_pair();
        let operator = RelaxationOperator::new(&network).unwrap();
        let masses = operator.masses(30.0);
        assert_eq!(masses.as_slice(), &[3000.0, 6000.0, 3000.0]);
    }

    #[test]
    fn rejects_unconnected_vertices_and_bad_rest_lengths() {
        let mut lonely =
            Network::from_vertices_and_edges(&[[0.0; 3], [1.0, 0.0, 0.0]], &[]).unwrap();
        let err = drx(&mut lonely, &settings(0.01, 10), Monitor::Quiet, None);
        assert!(matches!(err, Err(RelaxError::Solver(_))));

        let mut empty = Network::default();
        assert!(drx(&mut empty, &settings(0.01, 10), Monitor::Quiet, None).is_err());

        let mut zero_rest = hanging_pair();
        zero_rest.update_default_edge_attributes(&EdgePatch {
            l0: Some(0.0),
            ..Default::default()
        });
        assert!(drx(&mut zero_rest, &settings(0.01, 10), Monitor::Quiet, None).is_err());
    }

    #[test]
    fn default_spline_relaxes_to_tolerance() {
        let scenario = SplineScenario::default();
        let mut network = scenario.build_network().unwrap();
        let before: Vec<_> = scenario
            .pins
            .iter()
            .map(|&p| network.vertex_coordinates(p).unwrap())
            .collect();

        let result = drx(&mut network, &scenario.solver, Monitor::Quiet, None).unwrap();

        assert!(result.converged);
        assert!(result.residual <= 0.01);
        assert!(result.iterations < scenario.solver.steps);
        for (&pin, point) in scenario.pins.iter().zip(before) {
            assert_eq!(network.vertex_coordinates(pin).unwrap(), point);
        }
        // squeezed edges push the free vertices off the straight line
        let free = network.vertex_coordinates(10).unwrap();
        assert!((free.x - free.y).abs() > 1e-3);
    }

    #[test]
    fn too_small_factor_diverges() {
        let scenario = SplineScenario::default();
        let mut network = scenario.build_network().unwrap();
        let config = DrxSettings {
            factor: 0.01,
            ..scenario.solver.clone()
        };

        let result = drx(&mut network, &config, Monitor::Quiet, None);
        assert!(matches!(result, Err(RelaxError::Solver(_))));
    }

    #[test]
    fn zero_refresh_calls_back_once_at_the_end() {
        let mut network = hanging_pair();
        let calls: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let callback: Callback = Box::new(move |k, _x| recorded.lock().unwrap().push(k));

        let result = drx(
            &mut network,
            &settings(1e-3, 50000),
            Monitor::Quiet,
            Some(callback),
        )
        .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![result.iterations]);
    }

    #[test]
    fn compression_only_edges_drop_tension() {
        let mut network = Network::from_vertices_and_edges(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            &[[0, 1]],
        )
        .unwrap();
        network.update_default_edge_attributes(&EdgePatch {
            l0: Some(0.5),
            axial: Some(AxialBehaviour::CompressionOnly),
            ..Default::default()
        });

        let x = initial_coordinates(&network).unwrap();
        let operator = RelaxationOperator::new(&network).unwrap();
        assert_eq!(operator.apply(&x).unwrap().axial_forces[0], 0.0);

        network.update_default_edge_attributes(&EdgePatch {
            l0: Some(2.0),
            ..Default::default()
        });
        let operator = RelaxationOperator::new(&network).unwrap();
        assert_eq!(operator.apply(&x).unwrap().axial_forces[0], -0.5);
    }

    #[test]
    fn prestress_adds_force_and_mass() {
        let mut network = Network::from_vertices_and_edges(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            &[[0, 1]],
        )
        .unwrap();
        network.update_default_edge_attributes(&EdgePatch {
            a: Some(2.0),
            s0: Some(3.0),
            ..Default::default()
        });

        let x = initial_coordinates(&network).unwrap();
        let operator = RelaxationOperator::new(&network).unwrap();
        let residual = operator.apply(&x).unwrap();
        assert_eq!(residual.axial_forces[0], 6.0);
        assert_eq!(residual.forces[(0, 0)], 6.0);

        // k0 = E A / l0 = 2, plus f0 / l0 = 6
        assert_eq!(operator.masses(1.0).as_slice(), &[8.0, 8.0]);
    }
}
