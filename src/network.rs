use std::collections::HashSet;

use crate::{
    datatypes::{
        Beam, Edge, EdgeAttributes, EdgePatch, Point, Vertex, VertexAttributes, VertexPatch,
    },
    error::RelaxError,
};

/// Vertices and edges with per-item attributes that fall back to
/// network-wide defaults
#[derive(Debug, Clone, Default)]
pub struct Network {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    default_vertex: VertexPatch,
    default_edge: EdgePatch,
    beams: Vec<Beam>,
}

impl Network {
    /// Builds a network from coordinates and vertex index pairs
    ///
    /// # Arguments
    /// * `vertices` - Coordinates of each vertex; the position is the key
    /// * `edges` - Pairs of vertex keys
    ///
    /// # Returns
    /// A network with default attributes everywhere
    pub fn from_vertices_and_edges(
        vertices: &[[f64; 3]],
        edges: &[[usize; 2]],
    ) -> Result<Network, RelaxError> {
        let mut network = Network {
            vertices: vertices
                .iter()
                .map(|xyz| Vertex {
                    point: Point::new(xyz[0], xyz[1], xyz[2]),
                    overrides: VertexPatch::default(),
                    reaction: [0.0; 3],
                })
                .collect(),
            ..Default::default()
        };

        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for (i, [u, v]) in edges.iter().copied().enumerate() {
            if u >= vertices.len() || v >= vertices.len() {
                return Err(RelaxError::Network(format!(
                    "Edge {i} ({u}, {v}) references a missing vertex"
                )));
            }
            if u == v {
                return Err(RelaxError::Network(format!(
                    "Edge {i} joins vertex {u} to itself"
                )));
            }
            if !seen.insert((u.min(v), u.max(v))) {
                return Err(RelaxError::Network(format!(
                    "Edge {i} ({u}, {v}) is a duplicate"
                )));
            }

            network.edges.push(Edge {
                u,
                v,
                overrides: EdgePatch::default(),
                force: 0.0,
                length: 0.0,
            });
        }

        Ok(network)
    }

    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn number_of_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn vertices(&self) -> std::ops::Range<usize> {
        0..self.vertices.len()
    }

    /// Edge endpoints in insertion order. The position is the edge index.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.edges.iter().map(|e| (e.u, e.v))
    }

    pub fn beams(&self) -> &[Beam] {
        &self.beams
    }

    fn check_vertex(&self, key: usize) -> Result<(), RelaxError> {
        if key >= self.vertices.len() {
            return Err(RelaxError::Network(format!(
                "Vertex {key} is not in the network ({} vertices)",
                self.vertices.len()
            )));
        }
        Ok(())
    }

    fn check_edge(&self, index: usize) -> Result<(), RelaxError> {
        if index >= self.edges.len() {
            return Err(RelaxError::Network(format!(
                "Edge {index} is not in the network ({} edges)",
                self.edges.len()
            )));
        }
        Ok(())
    }

    pub fn vertex_coordinates(&self, key: usize) -> Result<Point, RelaxError> {
        self.check_vertex(key)?;
        Ok(self.vertices[key].point)
    }

    /// Projection of a vertex onto the xy plane
    pub fn vertex_xy(&self, key: usize) -> Result<[f64; 2], RelaxError> {
        let p = self.vertex_coordinates(key)?;
        Ok([p.x, p.y])
    }

    pub fn set_vertex_coordinates(&mut self, key: usize, xyz: [f64; 3]) -> Result<(), RelaxError> {
        self.check_vertex(key)?;
        self.vertices[key].point = Point::new(xyz[0], xyz[1], xyz[2]);
        Ok(())
    }

    pub fn update_default_vertex_attributes(&mut self, patch: &VertexPatch) {
        self.default_vertex.merge(patch);
    }

    pub fn update_default_edge_attributes(&mut self, patch: &EdgePatch) {
        self.default_edge.merge(patch);
    }

    pub fn set_vertices_attributes(
        &mut self,
        keys: &[usize],
        patch: &VertexPatch,
    ) -> Result<(), RelaxError> {
        for &key in keys {
            self.check_vertex(key)?;
        }
        for &key in keys {
            self.vertices[key].overrides.merge(patch);
        }
        Ok(())
    }

    pub fn set_edges_attributes(
        &mut self,
        indices: &[usize],
        patch: &EdgePatch,
    ) -> Result<(), RelaxError> {
        for &index in indices {
            self.check_edge(index)?;
        }
        for &index in indices {
            self.edges[index].overrides.merge(patch);
        }
        Ok(())
    }

    /// Resolved attributes of a vertex: its overrides, else the defaults
    pub fn vertex_attributes(&self, key: usize) -> Result<VertexAttributes, RelaxError> {
        self.check_vertex(key)?;
        let vertex = &self.vertices[key];

        let mut attributes = VertexAttributes::default();
        self.default_vertex.apply(&mut attributes);
        vertex.overrides.apply(&mut attributes);
        attributes.reaction = vertex.reaction;

        Ok(attributes)
    }

    pub fn edge_attributes(&self, index: usize) -> Result<EdgeAttributes, RelaxError> {
        self.check_edge(index)?;
        let edge = &self.edges[index];

        let mut attributes = EdgeAttributes::default();
        self.default_edge.apply(&mut attributes);
        edge.overrides.apply(&mut attributes);
        attributes.force = edge.force;
        attributes.length = edge.length;

        Ok(attributes)
    }

    pub fn vertices_where_fixed(&self) -> Vec<usize> {
        self.vertices()
            .filter(|&key| {
                self.vertex_attributes(key)
                    .map(|a| a.is_fixed)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn has_edge(&self, u: usize, v: usize) -> bool {
        self.edges
            .iter()
            .any(|e| (e.u == u && e.v == v) || (e.u == v && e.v == u))
    }

    /// Registers a run of vertices that resists bending
    ///
    /// # Arguments
    /// * `name` - Identifier of the beam
    /// * `nodes` - Vertex keys in order along the beam
    pub fn add_beam(&mut self, name: &str, nodes: Vec<usize>) -> Result<(), RelaxError> {
        if self.beams.iter().any(|b| b.name == name) {
            return Err(RelaxError::Network(format!("Beam '{name}' already exists")));
        }
        if nodes.len() < 3 {
            return Err(RelaxError::Network(format!(
                "Beam '{name}' needs at least three nodes, got {}",
                nodes.len()
            )));
        }
        for &key in &nodes {
            self.check_vertex(key)?;
        }
        for pair in nodes.windows(2) {
            if !self.has_edge(pair[0], pair[1]) {
                return Err(RelaxError::Network(format!(
                    "Beam '{name}' steps from {} to {} without an edge",
                    pair[0], pair[1]
                )));
            }
        }

        self.beams.push(Beam {
            name: name.to_owned(),
            nodes,
        });

        Ok(())
    }

    pub fn set_vertex_reaction(
        &mut self,
        key: usize,
        reaction: [f64; 3],
    ) -> Result<(), RelaxError> {
        self.check_vertex(key)?;
        self.vertices[key].reaction = reaction;
        Ok(())
    }

    pub fn set_edge_results(
        &mut self,
        index: usize,
        force: f64,
        length: f64,
    ) -> Result<(), RelaxError> {
        self.check_edge(index)?;
        self.edges[index].force = force;
        self.edges[index].length = length;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> Network {
        let vertices: Vec<[f64; 3]> = (0..n).map(|i| [i as f64, 0.0, 0.0]).collect();
        let edges: Vec<[usize; 2]> = (0..n - 1).map(|i| [i, i + 1]).collect();
        Network::from_vertices_and_edges(&vertices, &edges).unwrap()
    }

    #[test]
    fn rejects_bad_edges() {
        let vertices = [[0.0; 3], [1.0, 0.0, 0.0]];

        let missing = Network::from_vertices_and_edges(&vertices, &[[0, 2]]);
        assert!(matches!(missing, Err(RelaxError::Network(_))));

        let looped = Network::from_vertices_and_edges(&vertices, &[[1, 1]]);
        assert!(matches!(looped, Err(RelaxError::Network(_))));

        let duplicate = Network::from_vertices_and_edges(&vertices, &[[0, 1], [1, 0]]);
        assert!(matches!(duplicate, Err(RelaxError::Network(_))));
    }

    #[test]
    fn overrides_survive_later_default_updates() {
        let mut network = chain(4);
        network.update_default_vertex_attributes(&VertexPatch {
            is_fixed: Some(false),
            eix: Some(0.2),
            ..Default::default()
        });
        network
            .set_vertices_attributes(
                &[0, 3],
                &VertexPatch {
                    is_fixed: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        network.update_default_vertex_attributes(&VertexPatch {
            is_fixed: Some(false),
            eix: Some(0.5),
            ..Default::default()
        });

        assert!(network.vertex_attributes(0).unwrap().is_fixed);
        assert!(!network.vertex_attributes(1).unwrap().is_fixed);
        assert_eq!(network.vertex_attributes(3).unwrap().eix, 0.5);
        assert_eq!(network.vertices_where_fixed(), vec![0, 3]);
    }

    #[test]
    fn unknown_keys_leave_network_untouched() {
        let mut network = chain(3);
        let result = network.set_vertices_attributes(
            &[1, 7],
            &VertexPatch {
                is_fixed: Some(true),
                ..Default::default()
            },
        );

        assert!(result.is_err());
        assert!(network.vertices_where_fixed().is_empty());
        assert!(network.edge_attributes(2).is_err());
    }

    #[test]
    fn edge_defaults_and_overrides() {
        let mut network = chain(3);
        network.update_default_edge_attributes(&EdgePatch {
            e: Some(50.0),
            l0: Some(0.5),
            ..Default::default()
        });
        network
            .set_edges_attributes(
                &[1],
                &EdgePatch {
                    l0: Some(2.0),
                    ..Default::default()
                },
            )
            .unwrap();

        let first = network.edge_attributes(0).unwrap();
        let second = network.edge_attributes(1).unwrap();
        assert_eq!((first.e, first.l0, first.a), (50.0, 0.5, 1.0));
        assert_eq!((second.e, second.l0), (50.0, 2.0));
    }

    #[test]
    fn beams_follow_edges() {
        let mut network = chain(5);
        assert!(network.add_beam("short", vec![0, 1]).is_err());
        assert!(network.add_beam("gap", vec![0, 2, 3]).is_err());
        network.add_beam("beam", (0..5).collect()).unwrap();
        assert!(network.add_beam("beam", vec![1, 2, 3]).is_err());

        assert_eq!(network.beams().len(), 1);
        assert_eq!(network.beams()[0].nodes, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn coordinates_round_trip_through_setters() {
        let mut network = chain(2);
        network.set_vertex_coordinates(1, [0.5, -0.25, 2.0]).unwrap();

        assert_eq!(network.vertex_xy(1).unwrap(), [0.5, -0.25]);
        assert_eq!(network.vertex_coordinates(1).unwrap().z, 2.0);
        assert!(network.set_vertex_coordinates(2, [0.0; 3]).is_err());
    }
}
