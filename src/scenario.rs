use json::JsonValue;

use crate::{
    datatypes::{AxialBehaviour, EdgePatch, VertexPatch},
    error::RelaxError,
    network::Network,
    solver::DrxSettings,
};

pub const INITIAL_LENGTH: f64 = 1.0;
pub const TARGET_LENGTH: f64 = 1.5;
pub const SAMPLES: usize = 40;
pub const BENDING_STIFFNESS: f64 = 0.2;
pub const ELASTICITY: f64 = 50.0;
pub const AREA: f64 = 1.0;
pub const LOAD: [f64; 3] = [1.0, -2.0, 0.0];
pub const MAX_SAMPLES: usize = 100_000;

pub const TOLERANCE: f64 = 0.01;
pub const REFRESH: u64 = 10;
pub const FACTOR: f64 = 30.0;
pub const MAX_STEPS: u64 = 10000;

/// The spline set-up: a straight chain of points squeezed by edges whose
/// rest lengths add up to more than the chain, pinned at a few supports
#[derive(Debug, Clone, PartialEq)]
pub struct SplineScenario {
    pub initial_length: f64,
    pub target_length: f64,
    pub samples: usize,
    pub bending_stiffness: f64,
    pub elasticity: f64,
    pub area: f64,
    pub prestress: f64,
    pub axial: AxialBehaviour,
    pub load: [f64; 3],
    pub pins: Vec<usize>,
    pub solver: DrxSettings,
}

impl Default for SplineScenario {
    fn default() -> Self {
        SplineScenario {
            initial_length: INITIAL_LENGTH,
            target_length: TARGET_LENGTH,
            samples: SAMPLES,
            bending_stiffness: BENDING_STIFFNESS,
            elasticity: ELASTICITY,
            area: AREA,
            prestress: 0.0,
            axial: AxialBehaviour::Both,
            load: LOAD,
            pins: default_pins(SAMPLES),
            solver: DrxSettings {
                tol: TOLERANCE,
                steps: MAX_STEPS,
                factor: FACTOR,
                refresh: REFRESH,
                update: true,
            },
        }
    }
}

/// Supports at both ends of the first stretch, mid-chain and near the far end
pub fn default_pins(samples: usize) -> Vec<usize> {
    vec![0, 5, 20, samples.saturating_sub(5)]
}

/// `samples` evenly spaced values from `start` to `stop`, both included
fn linspace(start: f64, stop: f64, samples: usize) -> Vec<f64> {
    match samples {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (samples - 1) as f64;
            (0..samples).map(|i| start + step * i as f64).collect()
        }
    }
}

impl SplineScenario {
    /// Edge rest length: the target length shared out between the samples
    pub fn rest_length(&self) -> f64 {
        self.target_length / self.samples as f64
    }

    pub fn validate(&self) -> Result<(), RelaxError> {
        if self.samples > MAX_SAMPLES {
            return Err(RelaxError::Input(format!(
                "Spline has {} samples, at most {MAX_SAMPLES} are supported",
                self.samples
            )));
        }
        if self.samples < 3 {
            return Err(RelaxError::Input(format!(
                "Spline needs at least 3 samples, got {}",
                self.samples
            )));
        }
        if !(self.initial_length > 0.0) || !(self.target_length > 0.0) {
            return Err(RelaxError::Input(
                "Initial and target lengths must be positive".to_owned(),
            ));
        }
        if !(self.elasticity > 0.0) || !(self.area > 0.0) {
            return Err(RelaxError::Input(
                "Elasticity and area must be positive".to_owned(),
            ));
        }
        if !self.prestress.is_finite() {
            return Err(RelaxError::Input("Prestress must be finite".to_owned()));
        }
        if !(self.bending_stiffness >= 0.0) {
            return Err(RelaxError::Input(
                "Bending stiffness must not be negative".to_owned(),
            ));
        }
        if self.pins.is_empty() {
            return Err(RelaxError::Input("At least one pin is required".to_owned()));
        }
        for (i, pin) in self.pins.iter().enumerate() {
            if *pin >= self.samples {
                return Err(RelaxError::Input(format!(
                    "Pin {pin} is outside the chain of {} samples",
                    self.samples
                )));
            }
            if self.pins[..i].contains(pin) {
                return Err(RelaxError::Input(format!("Pin {pin} is listed twice")));
            }
        }
        if !(self.solver.tol > 0.0) || !(self.solver.factor > 0.0) {
            return Err(RelaxError::Input(
                "Solver tolerance and factor must be positive".to_owned(),
            ));
        }

        Ok(())
    }

    /// Builds the network: vertices along the diagonal `[t, t, 0]`,
    /// sequential edges, pinned supports and one beam over the whole chain
    pub fn build_network(&self) -> Result<Network, RelaxError> {
        self.validate()?;

        let vertices: Vec<[f64; 3]> = linspace(0.0, self.initial_length, self.samples)
            .into_iter()
            .map(|t| [t, t, 0.0])
            .collect();
        let edges: Vec<[usize; 2]> = (0..self.samples - 1).map(|i| [i, i + 1]).collect();

        let mut network = Network::from_vertices_and_edges(&vertices, &edges)?;
        network.update_default_vertex_attributes(&VertexPatch {
            is_fixed: Some(false),
            load: Some(self.load),
            eix: Some(self.bending_stiffness),
            eiy: Some(self.bending_stiffness),
            ..Default::default()
        });
        network.update_default_edge_attributes(&EdgePatch {
            e: Some(self.elasticity),
            a: Some(self.area),
            l0: Some(self.rest_length()),
            s0: Some(self.prestress),
            axial: Some(self.axial),
            ..Default::default()
        });
        network.set_vertices_attributes(
            &self.pins,
            &VertexPatch {
                freedom: Some([0.0; 3]),
                is_fixed: Some(true),
                ..Default::default()
            },
        )?;
        network.add_beam("beam", (0..self.samples).collect())?;

        println!(
            "info: built spline network with {} vertices, {} edges and {} pins",
            network.number_of_vertices(),
            network.number_of_edges(),
            self.pins.len()
        );

        Ok(network)
    }
}

/// Parses the input json into a JsonValue object
///
/// # Arguments
/// * `input_file` - The path to the input file
fn load_input_file(input_file: &str) -> Result<JsonValue, RelaxError> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(_err) => {
            return Err(RelaxError::Input(format!(
                "Unable to open input file {}",
                input_file
            )))
        }
    };

    parse_input(&file_string)
}

fn parse_input(contents: &str) -> Result<JsonValue, RelaxError> {
    let input_json = match json::parse(contents) {
        Ok(f) => f,
        Err(err) => {
            return Err(RelaxError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    if !input_json.is_object() {
        return Err(RelaxError::Input(
            "Input json must be an object".to_string(),
        ));
    }

    Ok(input_json)
}

/// Reads an optional number from a section, rejecting non-numeric values
fn optional_f64(section: &JsonValue, key: &str, name: &str) -> Result<Option<f64>, RelaxError> {
    if !section.has_key(key) {
        return Ok(None);
    }
    match section[key].as_f64() {
        Some(v) => Ok(Some(v)),
        None => Err(RelaxError::Input(format!(
            "Bad value for {key} in {name} section"
        ))),
    }
}

fn optional_u64(section: &JsonValue, key: &str, name: &str) -> Result<Option<u64>, RelaxError> {
    if !section.has_key(key) {
        return Ok(None);
    }
    match section[key].as_u64() {
        Some(v) => Ok(Some(v)),
        None => Err(RelaxError::Input(format!(
            "Bad value for {key} in {name} section, expected a non-negative integer"
        ))),
    }
}

/// Applies the sections found in the input json over a scenario
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
/// * `scenario` - The scenario to overwrite
fn apply_input(input_json: &JsonValue, scenario: &mut SplineScenario) -> Result<(), RelaxError> {
    let geometry = &input_json["geometry"];
    if let Some(v) = optional_f64(geometry, "initial_length", "geometry")? {
        scenario.initial_length = v;
    }
    if let Some(v) = optional_f64(geometry, "target_length", "geometry")? {
        scenario.target_length = v;
    }
    let mut samples_changed = false;
    if let Some(v) = optional_u64(geometry, "samples", "geometry")? {
        scenario.samples = v as usize;
        samples_changed = true;
    }

    let material = &input_json["material"];
    if let Some(v) = optional_f64(material, "elasticity", "material")? {
        scenario.elasticity = v;
    }
    if let Some(v) = optional_f64(material, "area", "material")? {
        scenario.area = v;
    }
    if let Some(v) = optional_f64(material, "bending_stiffness", "material")? {
        scenario.bending_stiffness = v;
    }
    if let Some(v) = optional_f64(material, "prestress", "material")? {
        scenario.prestress = v;
    }
    if material.has_key("axial") {
        scenario.axial = match material["axial"].as_str() {
            Some("both") => AxialBehaviour::Both,
            Some("tension") => AxialBehaviour::TensionOnly,
            Some("compression") => AxialBehaviour::CompressionOnly,
            _ => {
                return Err(RelaxError::Input(format!(
                    "Bad value for axial in material section: {}, \
                     expected \"both\", \"tension\" or \"compression\"",
                    material["axial"]
                )))
            }
        };
    }

    if input_json.has_key("load") {
        let load = &input_json["load"];
        if !load.is_array() || load.len() != 3 {
            return Err(RelaxError::Input(
                "Input json load must be an array of 3 numbers".to_owned(),
            ));
        }
        for (i, component) in load.members().enumerate() {
            scenario.load[i] = component.as_f64().ok_or_else(|| {
                RelaxError::Input(format!("Bad value for load component {i}"))
            })?;
        }
    }

    if input_json.has_key("pins") {
        let pins = &input_json["pins"];
        if !pins.is_array() {
            return Err(RelaxError::Input(
                "Input json pins must be an array of vertex indices".to_owned(),
            ));
        }
        scenario.pins = pins
            .members()
            .map(|p| {
                p.as_usize()
                    .ok_or_else(|| RelaxError::Input(format!("Bad pin index {p}")))
            })
            .collect::<Result<Vec<usize>, RelaxError>>()?;
    } else if samples_changed {
        println!("warning: samples changed without pins, using default pin layout");
        scenario.pins = default_pins(scenario.samples);
    }

    let solver = &input_json["solver"];
    if let Some(v) = optional_f64(solver, "tol", "solver")? {
        scenario.solver.tol = v;
    }
    if let Some(v) = optional_u64(solver, "steps", "solver")? {
        scenario.solver.steps = v;
    }
    if let Some(v) = optional_f64(solver, "factor", "solver")? {
        scenario.solver.factor = v;
    }
    if let Some(v) = optional_u64(solver, "refresh", "solver")? {
        scenario.solver.refresh = v;
    }

    Ok(())
}

/// Loads a scenario, starting from the built-in constants
///
/// # Arguments
/// * `input_file` - Optional path to a json file overriding the constants
pub fn load(input_file: Option<&str>) -> Result<SplineScenario, RelaxError> {
    let mut scenario = SplineScenario::default();

    if let Some(path) = input_file {
        let input_json = load_input_file(path)?;
        apply_input(&input_json, &mut scenario)?;
        println!("info: loaded scenario from {path}");
    }

    scenario.validate()?;
    Ok(scenario)
}
