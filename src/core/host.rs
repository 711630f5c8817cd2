//! A neuron-free [`EnsembleHost`] for running a realized network.
//!
//! Each ensemble represents its vector exactly: its value is the sum of the
//! filtered signals arriving on its `Ensemble` endpoint. Lowpass synapses
//! are integrated exactly over one tick (`y <- a y + (1 - a) u` with
//! `a = exp(-dt / tau)`), direct synapses pass the signal through, and a
//! neuron-targeted drive whose mean is at or below `-1` silences the
//! ensemble for that tick. No spiking or tuning curves are modelled.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::config::{EnsembleOptions, LmuConfig, NetworkConfig};
use crate::error::{expect_width, LmuError, Result};
use crate::network::{endpoint_width, Endpoint, EnsembleHost, LmuNetwork, Synapse};

/// Drive at or below this mean level silences an ensemble.
const SILENCE_LEVEL: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnsembleId(usize);

type HostEndpoint = Endpoint<NodeId, EnsembleId>;

#[derive(Debug, Clone)]
struct Node {
    label: String,
    value: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Ensemble {
    label: String,
    n_neurons: usize,
    value: Vec<f64>,
    silenced: bool,
}

#[derive(Debug, Clone)]
struct Connection {
    pre: HostEndpoint,
    post: HostEndpoint,
    transform: DMatrix<f64>,
    // Per-tick decay of the filter; zero for direct connections.
    decay: f64,
    filtered: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct IdealHost {
    dt: f64,
    nodes: Vec<Node>,
    ensembles: Vec<Ensemble>,
    connections: Vec<Connection>,
    ticks: u64,
}

impl IdealHost {
    pub fn new(dt: f64) -> Result<Self> {
        LmuConfig::validate_dt(dt)?;
        Ok(Self {
            dt,
            nodes: Vec::new(),
            ensembles: Vec::new(),
            connections: Vec::new(),
            ticks: 0,
        })
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Set the value a node will emit on the next tick.
    ///
    /// Fails if `id` was not created by this host.
    pub fn set_node(&mut self, id: NodeId, value: &[f64]) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or(LmuError::InvalidConfiguration("node does not belong to this host"))?;
        expect_width(node.value.len(), value.len())?;
        node.value.copy_from_slice(value);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if `id` was created by a different host. The same holds for
    /// the label and ensemble lookups below.
    pub fn node_value(&self, id: NodeId) -> &[f64] {
        &self.nodes[id.0].value
    }

    pub fn node_label(&self, id: NodeId) -> &str {
        &self.nodes[id.0].label
    }

    pub fn ensemble_value(&self, id: EnsembleId) -> &[f64] {
        &self.ensembles[id.0].value
    }

    pub fn ensemble_label(&self, id: EnsembleId) -> &str {
        &self.ensembles[id.0].label
    }

    /// Whether the ensemble was silenced on the last tick.
    pub fn is_silenced(&self, id: EnsembleId) -> bool {
        self.ensembles[id.0].silenced
    }

    /// Advance every connection and ensemble by one tick of `dt`.
    ///
    /// Connections read node values as currently set and ensemble values
    /// from the previous tick.
    pub fn step(&mut self) {
        for conn in &mut self.connections {
            let signal = source_value(&self.nodes, &self.ensembles, &conn.pre);
            let drive = &conn.transform * DVector::from_column_slice(&signal);
            if conn.decay == 0.0 {
                conn.filtered = drive;
            } else {
                conn.filtered = &conn.filtered * conn.decay + drive * (1.0 - conn.decay);
            }
        }

        for (idx, ens) in self.ensembles.iter_mut().enumerate() {
            let id = EnsembleId(idx);
            let mut value = vec![0.0; ens.value.len()];
            let mut neuron_drive = 0.0;
            let mut has_neuron_input = false;

            for conn in &self.connections {
                match conn.post {
                    Endpoint::Ensemble(e) if e == id => {
                        for (v, f) in value.iter_mut().zip(conn.filtered.iter()) {
                            *v += f;
                        }
                    }
                    Endpoint::Neurons(e) if e == id => {
                        neuron_drive += conn.filtered.sum();
                        has_neuron_input = true;
                    }
                    _ => {}
                }
            }

            let mean = neuron_drive / ens.n_neurons as f64;
            ens.silenced = has_neuron_input && mean <= SILENCE_LEVEL;
            if ens.silenced {
                value.fill(0.0);
            }
            ens.value = value;
        }
        self.ticks += 1;
    }

    /// Zero every node, ensemble and filter.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.value.fill(0.0);
        }
        for ens in &mut self.ensembles {
            ens.value.fill(0.0);
            ens.silenced = false;
        }
        for conn in &mut self.connections {
            conn.filtered.fill(0.0);
        }
        self.ticks = 0;
    }

    fn width(&self, endpoint: &HostEndpoint) -> Result<usize> {
        endpoint_width(
            endpoint,
            |n| self.nodes[n.0].value.len(),
            |e| self.ensembles[e.0].value.len(),
            |e| self.ensembles[e.0].n_neurons,
        )
    }
}

fn source_value(nodes: &[Node], ensembles: &[Ensemble], pre: &HostEndpoint) -> Vec<f64> {
    match pre {
        Endpoint::NodeDim(n, d) => vec![nodes[n.0].value[*d]],
        Endpoint::Node(n) => nodes[n.0].value.clone(),
        Endpoint::Ensemble(e) => ensembles[e.0].value.clone(),
        // Rejected by `connect`.
        Endpoint::Neurons(_) => Vec::new(),
    }
}

impl EnsembleHost for IdealHost {
    type Node = NodeId;
    type Ensemble = EnsembleId;

    fn node(&mut self, label: &str, size: usize) -> NodeId {
        self.nodes.push(Node {
            label: label.to_string(),
            value: vec![0.0; size],
        });
        NodeId(self.nodes.len() - 1)
    }

    fn ensemble(
        &mut self,
        label: &str,
        n_neurons: usize,
        dimensions: usize,
        options: &EnsembleOptions,
    ) -> EnsembleId {
        if !options.is_empty() {
            debug!(label, options = options.len(), "ideal host ignores ensemble options");
        }
        self.ensembles.push(Ensemble {
            label: label.to_string(),
            n_neurons,
            value: vec![0.0; dimensions],
            silenced: false,
        });
        EnsembleId(self.ensembles.len() - 1)
    }

    fn connect(
        &mut self,
        pre: HostEndpoint,
        post: HostEndpoint,
        transform: &DMatrix<f64>,
        synapse: Synapse,
    ) -> Result<()> {
        if matches!(pre, Endpoint::Neurons(_)) {
            return Err(LmuError::InvalidConfiguration(
                "neurons cannot be a connection source",
            ));
        }
        if matches!(post, Endpoint::Node(_) | Endpoint::NodeDim(..)) {
            return Err(LmuError::InvalidConfiguration("nodes only provide input"));
        }
        expect_width(self.width(&pre)?, transform.ncols())?;
        expect_width(self.width(&post)?, transform.nrows())?;

        let decay = match synapse {
            Synapse::Direct => 0.0,
            Synapse::Lowpass { tau } => {
                if !tau.is_finite() || tau <= 0.0 {
                    return Err(LmuError::InvalidConfiguration(
                        "synapse tau must be finite and > 0",
                    ));
                }
                (-self.dt / tau).exp()
            }
        };

        self.connections.push(Connection {
            pre,
            post,
            transform: transform.clone(),
            decay,
            filtered: DVector::zeros(transform.nrows()),
        });
        Ok(())
    }
}

/// A network realization running on an [`IdealHost`].
///
/// The state is the concatenation of the channel ensembles' values, in the
/// same channel-major layout as the discrete steppers.
#[derive(Debug, Clone)]
pub struct RealizedMemory {
    host: IdealHost,
    network: LmuNetwork<NodeId, EnsembleId>,
    output: Vec<f64>,
    steps: u64,
}

impl RealizedMemory {
    /// Build the network for `cfg`, ticking at `cfg.dt` (required).
    pub fn new(cfg: &LmuConfig, net: &NetworkConfig) -> Result<Self> {
        cfg.validate()?;
        let dt = cfg.require_dt()?;
        let mut host = IdealHost::new(dt)?;
        let network = LmuNetwork::build(&mut host, cfg, net)?;
        Ok(Self {
            host,
            output: vec![0.0; cfg.state_len()],
            network,
            steps: 0,
        })
    }

    pub fn size_in(&self) -> usize {
        self.network.size_in()
    }

    /// Drive the input node with `x` for one tick, with the reset node at
    /// one when `reset` is set.
    pub fn step(&mut self, x: &[f64], reset: bool) -> Result<&[f64]> {
        expect_width(self.size_in(), x.len())?;
        self.host.set_node(self.network.input, x)?;
        self.host
            .set_node(self.network.reset, &[if reset { 1.0 } else { 0.0 }])?;
        self.host.step();

        let q = self.network.q();
        for (chunk, ens) in self.output.chunks_mut(q).zip(&self.network.ensembles) {
            chunk.copy_from_slice(self.host.ensemble_value(*ens));
        }
        self.steps += 1;
        Ok(&self.output)
    }

    pub fn output(&self) -> &[f64] {
        &self.output
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn host(&self) -> &IdealHost {
        &self.host
    }

    pub fn network(&self) -> &LmuNetwork<NodeId, EnsembleId> {
        &self.network
    }

    pub fn clear(&mut self) {
        self.host.reset();
        self.output.fill(0.0);
        self.steps = 0;
    }
}
