use nalgebra::Point3;

pub type Point = Point3<f64>;

/// How an edge carries axial force
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxialBehaviour {
    Both,
    TensionOnly,
    CompressionOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexAttributes {
    pub is_fixed: bool,
    /// Applied load
    pub load: [f64; 3],
    /// Per-axis multiplier on the residual. Zero on restrained axes.
    pub freedom: [f64; 3],
    pub eix: f64,
    pub eiy: f64,
    /// Support reaction, filled in by the solver
    pub reaction: [f64; 3],
}

impl Default for VertexAttributes {
    fn default() -> Self {
        VertexAttributes {
            is_fixed: false,
            load: [0.0; 3],
            freedom: [1.0; 3],
            eix: 0.0,
            eiy: 0.0,
            reaction: [0.0; 3],
        }
    }
}

/// Partial set of vertex attributes. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexPatch {
    pub is_fixed: Option<bool>,
    pub load: Option<[f64; 3]>,
    pub freedom: Option<[f64; 3]>,
    pub eix: Option<f64>,
    pub eiy: Option<f64>,
}

impl VertexPatch {
    /// Copies every set field of `other` over this patch
    pub fn merge(&mut self, other: &VertexPatch) {
        if other.is_fixed.is_some() {
            self.is_fixed = other.is_fixed;
        }
        if other.load.is_some() {
            self.load = other.load;
        }
        if other.freedom.is_some() {
            self.freedom = other.freedom;
        }
        if other.eix.is_some() {
            self.eix = other.eix;
        }
        if other.eiy.is_some() {
            self.eiy = other.eiy;
        }
    }

    pub fn apply(&self, attributes: &mut VertexAttributes) {
        if let Some(is_fixed) = self.is_fixed {
            attributes.is_fixed = is_fixed;
        }
        if let Some(load) = self.load {
            attributes.load = load;
        }
        if let Some(freedom) = self.freedom {
            attributes.freedom = freedom;
        }
        if let Some(eix) = self.eix {
            attributes.eix = eix;
        }
        if let Some(eiy) = self.eiy {
            attributes.eiy = eiy;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeAttributes {
    /// Modulus of elasticity
    pub e: f64,
    /// Cross-section area
    pub a: f64,
    /// Rest length
    pub l0: f64,
    /// Prestress
    pub s0: f64,
    pub axial: AxialBehaviour,
    /// Axial force, filled in by the solver
    pub force: f64,
    /// Deformed length, filled in by the solver
    pub length: f64,
}

impl Default for EdgeAttributes {
    fn default() -> Self {
        EdgeAttributes {
            e: 1.0,
            a: 1.0,
            l0: 1.0,
            s0: 0.0,
            axial: AxialBehaviour::Both,
            force: 0.0,
            length: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgePatch {
    pub e: Option<f64>,
    pub a: Option<f64>,
    pub l0: Option<f64>,
    pub s0: Option<f64>,
    pub axial: Option<AxialBehaviour>,
}

impl EdgePatch {
    pub fn merge(&mut self, other: &EdgePatch) {
        if other.e.is_some() {
            self.e = other.e;
        }
        if other.a.is_some() {
            self.a = other.a;
        }
        if other.l0.is_some() {
            self.l0 = other.l0;
        }
        if other.s0.is_some() {
            self.s0 = other.s0;
        }
        if other.axial.is_some() {
            self.axial = other.axial;
        }
    }

    pub fn apply(&self, attributes: &mut EdgeAttributes) {
        if let Some(e) = self.e {
            attributes.e = e;
        }
        if let Some(a) = self.a {
            attributes.a = a;
        }
        if let Some(l0) = self.l0 {
            attributes.l0 = l0;
        }
        if let Some(s0) = self.s0 {
            attributes.s0 = s0;
        }
        if let Some(axial) = self.axial {
            attributes.axial = axial;
        }
    }
}

/// An ordered run of vertices that resists bending at its interior nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Beam {
    pub name: String,
    pub nodes: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Vertex {
    pub point: Point,
    pub overrides: VertexPatch,
    pub reaction: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub u: usize,
    pub v: usize,
    pub overrides: EdgePatch,
    pub force: f64,
    pub length: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_only_touches_set_fields() {
        let mut attributes = VertexAttributes {
            eix: 0.2,
            ..Default::default()
        };
        let patch = VertexPatch {
            is_fixed: Some(true),
            freedom: Some([0.0; 3]),
            ..Default::default()
        };
        patch.apply(&mut attributes);

        assert!(attributes.is_fixed);
        assert_eq!(attributes.freedom, [0.0; 3]);
        assert_eq!(attributes.eix, 0.2);
        assert_eq!(attributes.load, [0.0; 3]);
    }

    #[test]
    fn merge_keeps_earlier_fields() {
        let mut patch = EdgePatch {
            e: Some(50.0),
            ..Default::default()
        };
        patch.merge(&EdgePatch {
            l0: Some(0.0375),
            ..Default::default()
        });

        assert_eq!(patch.e, Some(50.0));
        assert_eq!(patch.l0, Some(0.0375));
        assert_eq!(patch.a, None);
    }
}
