use std::{
    collections::HashMap,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::{error::RelaxError, network::Network};

/// Pixels per inch of figure size
const DPI: f64 = 100.0;
/// Shortest time a frame stays on screen in the animation
const MIN_FRAME_SECONDS: f64 = 0.01;
const MARGIN: f64 = 0.05;

pub const VERTEX_FACECOLOR: &str = "#ffffff";
pub const VERTEX_EDGECOLOR: &str = "#000000";
pub const EDGE_COLOR: &str = "#000000";
pub const EDGE_WIDTH: f64 = 1.0;

/// A free-standing segment in the xy plane
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub start: [f64; 2],
    pub end: [f64; 2],
    pub color: String,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Circle {
    center: [f64; 2],
    radius: f64,
    facecolor: String,
}

#[derive(Debug, Clone)]
struct Frame {
    edges: Vec<Line>,
    vertices: Vec<Circle>,
    pause: f64,
}

/// Records snapshots of a network as it moves and writes them as SVG
#[derive(Debug, Clone)]
pub struct NetworkPlotter {
    network: Network,
    figsize: (f64, f64),
    lines: Vec<Line>,
    facecolor: HashMap<usize, String>,
    vertices: Vec<Circle>,
    edges: Vec<Line>,
    frames: Vec<Frame>,
}

fn element(name: &str, attributes: &[(&str, String)]) -> Element {
    let mut el = Element::new(name);
    for (key, value) in attributes {
        el.attributes.insert(key.to_string(), value.clone());
    }
    el
}

fn number(v: f64) -> String {
    format!("{:.6}", v)
}

fn line_element(line: &Line) -> Element {
    element(
        "line",
        &[
            ("x1", number(line.start[0])),
            ("y1", number(-line.start[1])),
            ("x2", number(line.end[0])),
            ("y2", number(-line.end[1])),
            ("stroke", line.color.clone()),
            ("stroke-width", number(line.width)),
            ("vector-effect", "non-scaling-stroke".to_owned()),
        ],
    )
}

fn circle_element(circle: &Circle) -> Element {
    element(
        "circle",
        &[
            ("cx", number(circle.center[0])),
            ("cy", number(-circle.center[1])),
            ("r", number(circle.radius)),
            ("fill", circle.facecolor.clone()),
            ("stroke", VERTEX_EDGECOLOR.to_owned()),
            ("stroke-width", "0.5".to_owned()),
            ("vector-effect", "non-scaling-stroke".to_owned()),
        ],
    )
}

impl NetworkPlotter {
    /// # Arguments
    /// * `network` - The structure to draw; the plotter keeps its own copy
    /// * `figsize` - Width and height of the figure in inches
    pub fn new(network: Network, figsize: (f64, f64)) -> NetworkPlotter {
        NetworkPlotter {
            network,
            figsize,
            lines: Vec::new(),
            facecolor: HashMap::new(),
            vertices: Vec::new(),
            edges: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// The display structure. Move vertices here, then redraw.
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn number_of_frames(&self) -> usize {
        self.frames.len()
    }

    /// Adds static segments drawn under the network in every frame
    pub fn draw_lines(&mut self, lines: Vec<Line>) {
        self.lines.extend(lines);
    }

    /// Draws every vertex as a circle
    ///
    /// # Arguments
    /// * `radius` - Circle radius in model units
    /// * `facecolor` - Fill colours by vertex key; other vertices are white
    pub fn draw_vertices(
        &mut self,
        radius: f64,
        facecolor: HashMap<usize, String>,
    ) -> Result<(), RelaxError> {
        if let Some(key) = facecolor
            .keys()
            .find(|&&key| key >= self.network.number_of_vertices())
        {
            return Err(RelaxError::PostProcessor(format!(
                "Cannot colour vertex {key}, it is not in the network"
            )));
        }
        self.facecolor = facecolor;
        self.update_vertices(radius)
    }

    pub fn draw_edges(&mut self) -> Result<(), RelaxError> {
        self.update_edges()
    }

    /// Redraws the vertex circles at the current coordinates
    pub fn update_vertices(&mut self, radius: f64) -> Result<(), RelaxError> {
        let mut vertices = Vec::with_capacity(self.network.number_of_vertices());
        for key in self.network.vertices() {
            vertices.push(Circle {
                center: self.network.vertex_xy(key)?,
                radius,
                facecolor: self
                    .facecolor
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| VERTEX_FACECOLOR.to_owned()),
            });
        }
        self.vertices = vertices;
        Ok(())
    }

    /// Redraws the edge segments at the current coordinates
    pub fn update_edges(&mut self) -> Result<(), RelaxError> {
        let mut edges = Vec::with_capacity(self.network.number_of_edges());
        for (u, v) in self.network.edges() {
            edges.push(Line {
                start: self.network.vertex_xy(u)?,
                end: self.network.vertex_xy(v)?,
                color: EDGE_COLOR.to_owned(),
                width: EDGE_WIDTH,
            });
        }
        self.edges = edges;
        Ok(())
    }

    /// Captures what is currently drawn as a frame held for `pause` seconds
    pub fn update(&mut self, pause: f64) {
        self.frames.push(Frame {
            edges: self.edges.clone(),
            vertices: self.vertices.clone(),
            pause: pause.max(MIN_FRAME_SECONDS),
        });
    }

    /// Smallest box around everything ever drawn, padded by a margin
    fn bounds(&self) -> [f64; 4] {
        let mut bounds = [f64::MAX, f64::MAX, f64::MIN, f64::MIN];
        let mut grow = |x: f64, y: f64, r: f64| {
            bounds[0] = bounds[0].min(x - r);
            bounds[1] = bounds[1].min(y - r);
            bounds[2] = bounds[2].max(x + r);
            bounds[3] = bounds[3].max(y + r);
        };

        let segments = self
            .lines
            .iter()
            .chain(self.frames.iter().flat_map(|f| f.edges.iter()));
        for line in segments {
            grow(line.start[0], line.start[1], 0.0);
            grow(line.end[0], line.end[1], 0.0);
        }
        for circle in self.frames.iter().flat_map(|f| f.vertices.iter()) {
            grow(circle.center[0], circle.center[1], circle.radius);
        }

        if bounds[0] > bounds[2] {
            return [0.0, 0.0, 1.0, 1.0];
        }
        let span = (bounds[2] - bounds[0]).max(bounds[3] - bounds[1]).max(1e-9);
        let pad = span * MARGIN;
        [
            bounds[0] - pad,
            bounds[1] - pad,
            bounds[2] + pad,
            bounds[3] + pad,
        ]
    }

    /// The `<svg>` root with the background lines already drawn
    fn figure(&self) -> Element {
        let [xmin, ymin, xmax, ymax] = self.bounds();
        let mut svg = element(
            "svg",
            &[
                ("xmlns", "http://www.w3.org/2000/svg".to_owned()),
                ("width", number(self.figsize.0 * DPI)),
                ("height", number(self.figsize.1 * DPI)),
                (
                    "viewBox",
                    format!(
                        "{} {} {} {}",
                        number(xmin),
                        number(-ymax),
                        number(xmax - xmin),
                        number(ymax - ymin)
                    ),
                ),
            ],
        );

        let mut background = element("g", &[("id", "lines".to_owned())]);
        for line in &self.lines {
            background.children.push(XMLNode::Element(line_element(line)));
        }
        svg.children.push(XMLNode::Element(background));
        svg
    }

    fn frame_group(frame: &Frame, index: usize) -> Element {
        let mut group = element("g", &[("id", format!("frame{index}"))]);
        for edge in &frame.edges {
            group.children.push(XMLNode::Element(line_element(edge)));
        }
        for circle in &frame.vertices {
            group.children.push(XMLNode::Element(circle_element(circle)));
        }
        group
    }

    /// Writes an animated figure: frames play in order, the last one stays
    pub fn write_animation<W: Write>(&self, writer: W) -> Result<(), RelaxError> {
        let mut svg = self.figure();
        let mut begin = 0.0;

        for (index, frame) in self.frames.iter().enumerate() {
            let mut group = NetworkPlotter::frame_group(frame, index);
            group
                .attributes
                .insert("visibility".to_owned(), "hidden".to_owned());

            let mut timing = vec![
                ("attributeName", "visibility".to_owned()),
                ("to", "visible".to_owned()),
                ("begin", format!("{:.3}s", begin)),
            ];
            if index + 1 == self.frames.len() {
                timing.push(("fill", "freeze".to_owned()));
            } else {
                timing.push(("dur", format!("{:.3}s", frame.pause)));
            }
            group.children.push(XMLNode::Element(element("set", &timing)));

            svg.children.push(XMLNode::Element(group));
            begin += frame.pause;
        }

        match svg.write_with_config(writer, EmitterConfig::new().perform_indent(true)) {
            Ok(()) => Ok(()),
            Err(err) => Err(RelaxError::PostProcessor(format!(
                "Failed to write svg: {err}"
            ))),
        }
    }

    /// Writes the animated figure to `path`
    pub fn show(&self, path: &Path) -> Result<(), RelaxError> {
        if self.frames.is_empty() {
            println!("warning: no frames captured, the figure only shows the background");
        }

        let file = match File::create(path) {
            Ok(f) => f,
            Err(err) => {
                return Err(RelaxError::PostProcessor(format!(
                    "Failed to create {}: {err}",
                    path.display()
                )))
            }
        };
        self.write_animation(BufWriter::new(file))?;

        println!(
            "info: wrote {} frames to {}",
            self.number_of_frames(),
            path.display()
        );
        Ok(())
    }

    /// Writes every frame as its own still figure, `frame_0000.svg` onwards
    pub fn save_frames(&self, dir: &Path) -> Result<(), RelaxError> {
        if let Err(err) = std::fs::create_dir_all(dir) {
            return Err(RelaxError::PostProcessor(format!(
                "Failed to create frame directory {}: {err}",
                dir.display()
            )));
        }

        for (index, frame) in self.frames.iter().enumerate() {
            let mut svg = self.figure();
            svg.children
                .push(XMLNode::Element(NetworkPlotter::frame_group(frame, index)));

            let path = dir.join(format!("frame_{index:04}.svg"));
            let file = match File::create(&path) {
                Ok(f) => f,
                Err(err) => {
                    return Err(RelaxError::PostProcessor(format!(
                        "Failed to create {}: {err}",
                        path.display()
                    )))
                }
            };
            let config = EmitterConfig::new().perform_indent(true);
            if let Err(err) = svg.write_with_config(BufWriter::new(file), config) {
                return Err(RelaxError::PostProcessor(format!(
                    "Failed to write {}: {err}",
                    path.display()
                )));
            }
        }

        println!(
            "info: wrote {} frame files to {}",
            self.number_of_frames(),
            dir.display()
        );
        Ok(())
    }
}
