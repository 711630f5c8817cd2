//! Realizing the memory as recurrent neural ensembles.
//!
//! Nothing here simulates neurons. [`LmuNetwork::build`] computes the
//! connection weights from the continuous matrices and hands them to an
//! [`EnsembleHost`], which owns the ensembles and runs them.
//!
//! With a first-order lowpass synapse of time constant `tau` on every
//! connection, the weights below make the closed loop follow
//! `dx/dt = A x + B u`:
//!
//! - feedforward (input channel `c` -> ensemble `c`): `tau * B`
//! - recurrent (ensemble `c` -> itself): `tau * A + I`
//! - reset (reset node -> every neuron of every ensemble): a large negative
//!   weight with no synapse, which silences the population while asserted

use nalgebra::DMatrix;
use tracing::info;

use crate::config::{EnsembleOptions, LmuConfig, NetworkConfig};
use crate::error::{LmuError, Result};
use crate::matrices::ContinuousMatrices;

/// Filter applied by the host on a connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Synapse {
    /// First-order exponential filter, `tau` in seconds.
    Lowpass { tau: f64 },
    /// No filtering; the signal arrives on the same tick.
    Direct,
}

/// One end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<N, E> {
    /// A single dimension of a node.
    NodeDim(N, usize),
    Node(N),
    /// The represented vector of an ensemble.
    Ensemble(E),
    /// The individual neurons of an ensemble, bypassing its encoders.
    Neurons(E),
}

/// A simulation runtime that can hold the realized network.
///
/// Handles are small copyable ids owned by the host. Ensemble options are
/// forwarded verbatim from [`NetworkConfig::ensemble`].
pub trait EnsembleHost {
    type Node: Copy + std::fmt::Debug;
    type Ensemble: Copy + std::fmt::Debug;

    fn node(&mut self, label: &str, size: usize) -> Self::Node;

    fn ensemble(
        &mut self,
        label: &str,
        n_neurons: usize,
        dimensions: usize,
        options: &EnsembleOptions,
    ) -> Self::Ensemble;

    /// `transform` has shape `(post width, pre width)`.
    fn connect(
        &mut self,
        pre: Endpoint<Self::Node, Self::Ensemble>,
        post: Endpoint<Self::Node, Self::Ensemble>,
        transform: &DMatrix<f64>,
        synapse: Synapse,
    ) -> Result<()>;
}

/// The three weight sets, identical for every channel.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkWeights {
    pub tau: f64,
    /// `q × 1`.
    pub feedforward: DMatrix<f64>,
    /// `q × q`.
    pub recurrent: DMatrix<f64>,
    /// `n_neurons × 1`.
    pub reset: DMatrix<f64>,
}

impl NetworkWeights {
    pub fn compute(m: &ContinuousMatrices, net: &NetworkConfig) -> Result<Self> {
        net.validate()?;
        let q = m.q;
        let tau = net.tau;
        Ok(Self {
            tau,
            feedforward: m.b_column() * tau,
            recurrent: &m.a * tau + DMatrix::<f64>::identity(q, q),
            reset: DMatrix::from_element(net.n_neurons, 1, net.reset_weight),
        })
    }

    pub fn synapse(&self) -> Synapse {
        Synapse::Lowpass { tau: self.tau }
    }
}

/// Handles to a network built inside a host.
#[derive(Debug, Clone)]
pub struct LmuNetwork<N, E> {
    /// `size_in` wide.
    pub input: N,
    /// One dimension; nonzero silences every ensemble.
    pub reset: N,
    /// One ensemble per input channel, each `q` dimensional.
    pub ensembles: Vec<E>,
    weights: NetworkWeights,
    q: usize,
}

impl<N: Copy, E: Copy> LmuNetwork<N, E> {
    /// Create the nodes, ensembles and connections for `cfg` inside `host`.
    ///
    /// The weights are fixed here; the host must not expect them to change
    /// once simulation starts.
    pub fn build<H>(host: &mut H, cfg: &LmuConfig, net: &NetworkConfig) -> Result<Self>
    where
        H: EnsembleHost<Node = N, Ensemble = E>,
    {
        cfg.validate()?;
        let matrices = ContinuousMatrices::for_config(cfg)?;
        let weights = NetworkWeights::compute(&matrices, net)?;
        let synapse = weights.synapse();

        let input = host.node("input", cfg.size_in);
        let reset = host.node("reset", 1);

        let mut ensembles = Vec::with_capacity(cfg.size_in);
        for c in 0..cfg.size_in {
            let ens = host.ensemble(&format!("lmu[{c}]"), net.n_neurons, cfg.q, &net.ensemble);
            host.connect(
                Endpoint::NodeDim(input, c),
                Endpoint::Ensemble(ens),
                &weights.feedforward,
                synapse,
            )?;
            host.connect(
                Endpoint::Ensemble(ens),
                Endpoint::Ensemble(ens),
                &weights.recurrent,
                synapse,
            )?;
            host.connect(
                Endpoint::Node(reset),
                Endpoint::Neurons(ens),
                &weights.reset,
                Synapse::Direct,
            )?;
            ensembles.push(ens);
        }

        info!(
            q = cfg.q,
            size_in = cfg.size_in,
            n_neurons = net.n_neurons,
            tau = net.tau,
            "built LMU network"
        );

        Ok(Self {
            input,
            reset,
            ensembles,
            weights,
            q: cfg.q,
        })
    }

    /// The ensembles whose concatenated values form the memory state.
    pub fn output(&self) -> &[E] {
        &self.ensembles
    }

    pub fn weights(&self) -> &NetworkWeights {
        &self.weights
    }

    pub fn q(&self) -> usize {
        self.q
    }

    pub fn size_in(&self) -> usize {
        self.ensembles.len()
    }
}

/// Width of `endpoint` given the sizes a host recorded for it.
pub(crate) fn endpoint_width<N, E>(
    endpoint: &Endpoint<N, E>,
    node_size: impl Fn(&N) -> usize,
    ensemble_dims: impl Fn(&E) -> usize,
    ensemble_neurons: impl Fn(&E) -> usize,
) -> Result<usize> {
    match endpoint {
        Endpoint::NodeDim(n, d) => {
            if *d >= node_size(n) {
                return Err(LmuError::InvalidConfiguration(
                    "node dimension out of range",
                ));
            }
            Ok(1)
        }
        Endpoint::Node(n) => Ok(node_size(n)),
        Endpoint::Ensemble(e) => Ok(ensemble_dims(e)),
        Endpoint::Neurons(e) => Ok(ensemble_neurons(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Recorded {
        pre: Endpoint<usize, usize>,
        post: Endpoint<usize, usize>,
        transform: DMatrix<f64>,
        synapse: Synapse,
    }

    /// Records what the network asks for without simulating anything.
    #[derive(Default)]
    struct RecordingHost {
        nodes: Vec<(String, usize)>,
        ensembles: Vec<(String, usize, usize, EnsembleOptions)>,
        connections: Vec<Recorded>,
    }

    impl EnsembleHost for RecordingHost {
        type Node = usize;
        type Ensemble = usize;

        fn node(&mut self, label: &str, size: usize) -> usize {
            self.nodes.push((label.to_string(), size));
            self.nodes.len() - 1
        }

        fn ensemble(
            &mut self,
            label: &str,
            n_neurons: usize,
            dimensions: usize,
            options: &EnsembleOptions,
        ) -> usize {
            self.ensembles
                .push((label.to_string(), n_neurons, dimensions, options.clone()));
            self.ensembles.len() - 1
        }

        fn connect(
            &mut self,
            pre: Endpoint<usize, usize>,
            post: Endpoint<usize, usize>,
            transform: &DMatrix<f64>,
            synapse: Synapse,
        ) -> Result<()> {
            self.connections.push(Recorded {
                pre,
                post,
                transform: transform.clone(),
                synapse,
            });
            Ok(())
        }
    }

    #[test]
    fn weights_follow_the_continuous_matrices() {
        let m = ContinuousMatrices::new(0.8, 4).unwrap();
        let net = NetworkConfig::default().with_tau(0.1);
        let w = NetworkWeights::compute(&m, &net).unwrap();

        assert_eq!(w.feedforward.shape(), (4, 1));
        assert_eq!(w.recurrent.shape(), (4, 4));
        assert_eq!(w.reset.shape(), (100, 1));
        for i in 0..4 {
            assert!((w.feedforward[(i, 0)] - 0.1 * m.b[i]).abs() < 1e-15);
            for j in 0..4 {
                let id = if i == j { 1.0 } else { 0.0 };
                assert!((w.recurrent[(i, j)] - (0.1 * m.a[(i, j)] + id)).abs() < 1e-15);
            }
        }
        assert!(w.reset.iter().all(|v| *v == -2.5));
    }

    #[test]
    fn recovers_a_and_b_from_the_weights() {
        // (recurrent - I) / tau == A, feedforward / tau == B.
        let m = ContinuousMatrices::new(1.0, 6).unwrap();
        let net = NetworkConfig::default().with_tau(0.02);
        let w = NetworkWeights::compute(&m, &net).unwrap();
        let a = (&w.recurrent - DMatrix::<f64>::identity(6, 6)) / 0.02;
        let b = &w.feedforward / 0.02;
        assert!((a - &m.a).norm() < 1e-9);
        assert!((b - m.b_column()).norm() < 1e-12);
    }

    #[test]
    fn builds_one_ensemble_per_channel() {
        let cfg = LmuConfig::new(1.0, 3).with_size_in(2);
        let net = NetworkConfig::with_neurons(40).with_option("radius", serde_json::json!(2.0));
        let mut host = RecordingHost::default();
        let network = LmuNetwork::build(&mut host, &cfg, &net).unwrap();

        assert_eq!(
            host.nodes,
            vec![("input".to_string(), 2), ("reset".to_string(), 1)]
        );
        assert_eq!(host.ensembles.len(), 2);
        for (label, n, dims, options) in &host.ensembles {
            assert!(label.starts_with("lmu["));
            assert_eq!((*n, *dims), (40, 3));
            assert_eq!(options["radius"], serde_json::json!(2.0));
        }
        assert_eq!(network.output(), &[0, 1]);
        assert_eq!(network.size_in(), 2);
        assert_eq!(host.connections.len(), 6);
    }

    #[test]
    fn connections_use_the_right_synapses() {
        let cfg = LmuConfig::new(1.0, 3).with_size_in(2);
        let net = NetworkConfig::default();
        let mut host = RecordingHost::default();
        let network = LmuNetwork::build(&mut host, &cfg, &net).unwrap();
        let lowpass = Synapse::Lowpass { tau: 0.05 };

        for (c, &ens) in network.ensembles.iter().enumerate() {
            let into: Vec<&Recorded> = host
                .connections
                .iter()
                .filter(|r| matches!(r.post, Endpoint::Ensemble(e) | Endpoint::Neurons(e) if e == ens))
                .collect();
            assert_eq!(into.len(), 3);

            let ff = into
                .iter()
                .find(|r| r.pre == Endpoint::NodeDim(network.input, c))
                .unwrap();
            assert_eq!(ff.synapse, lowpass);
            assert_eq!(ff.transform, network.weights().feedforward);

            let rec = into
                .iter()
                .find(|r| r.pre == Endpoint::Ensemble(ens))
                .unwrap();
            assert_eq!(rec.synapse, lowpass);
            assert_eq!(rec.post, Endpoint::Ensemble(ens));

            let reset = into
                .iter()
                .find(|r| r.pre == Endpoint::Node(network.reset))
                .unwrap();
            assert_eq!(reset.synapse, Synapse::Direct);
            assert_eq!(reset.post, Endpoint::Neurons(ens));
            assert_eq!(reset.transform.nrows(), 100);
        }
    }

    #[test]
    fn invalid_parameters_build_nothing() {
        let mut host = RecordingHost::default();
        let bad_net = NetworkConfig::default().with_tau(-1.0);
        assert!(LmuNetwork::build(&mut host, &LmuConfig::new(1.0, 3), &bad_net).is_err());

        let bad_cfg = LmuConfig::new(0.0, 3);
        assert!(LmuNetwork::build(&mut host, &bad_cfg, &NetworkConfig::default()).is_err());
        assert!(host.nodes.is_empty());
        assert!(host.connections.is_empty());
    }
}
