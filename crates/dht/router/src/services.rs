//! Collaborators the router consults but does not own the logic of.

use std::collections::HashMap;

use tokio::sync::mpsc;
use vertex_dht_primitives::{Hello, Identifier, PeerPath};
use vertex_dht_routing::{Connectivity, NoConnectivity};

use crate::{Block, BlockEvaluator, ContentStore, DefaultBlockEvaluator};

/// Source of the network size estimate.
pub trait NetworkSize: Send {
    /// Estimated `log2` of the number of peers in the network.
    fn log_estimate(&self) -> f64;
}

/// A network size estimate that never changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedNetworkSize(pub f64);

impl NetworkSize for FixedNetworkSize {
    fn log_estimate(&self) -> f64 {
        self.0
    }
}

/// HELLOs of the local node and of known peers.
pub trait HelloSource: Send {
    fn local_hello(&self) -> Option<Hello>;

    fn hello_for(&self, peer: &Identifier) -> Option<Hello>;

    /// Record a HELLO learned from the network.
    fn remember(&mut self, _hello: &Hello) {}
}

/// In-memory [`HelloSource`].
#[derive(Debug, Default, Clone)]
pub struct HelloBook {
    local: Option<Hello>,
    known: HashMap<Identifier, Hello>,
}

impl HelloBook {
    pub fn new(local: Hello) -> Self {
        Self {
            local: Some(local),
            known: HashMap::new(),
        }
    }

    pub fn insert(&mut self, hello: Hello) {
        self.known.insert(*hello.peer(), hello);
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

impl HelloSource for HelloBook {
    fn local_hello(&self) -> Option<Hello> {
        self.local.clone()
    }

    fn hello_for(&self, peer: &Identifier) -> Option<Hello> {
        self.known.get(peer).cloned()
    }

    fn remember(&mut self, hello: &Hello) {
        self.insert(hello.clone());
    }
}

/// A block handed to local clients, with the path it took to get here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDelivery {
    pub block: Block,
    pub get_path: PeerPath,
}

/// Local subscribers of PUTs and RESULTs seen by this node.
pub trait LocalClients: Send {
    fn deliver(&mut self, block: &Block, get_path: &PeerPath);
}

/// [`LocalClients`] without any subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocalClients;

impl LocalClients for NoLocalClients {
    fn deliver(&mut self, _block: &Block, _get_path: &PeerPath) {}
}

impl LocalClients for mpsc::UnboundedSender<LocalDelivery> {
    fn deliver(&mut self, block: &Block, get_path: &PeerPath) {
        // a closed receiver just means nobody is listening any more
        let _ = self.send(LocalDelivery {
            block: block.clone(),
            get_path: get_path.clone(),
        });
    }
}

/// Everything the router calls out to.
pub struct RouterServices {
    pub store: Box<dyn ContentStore>,
    pub network_size: Box<dyn NetworkSize>,
    pub connectivity: Box<dyn Connectivity>,
    pub hellos: Box<dyn HelloSource>,
    pub evaluator: Box<dyn BlockEvaluator>,
    pub clients: Box<dyn LocalClients>,
}

impl RouterServices {
    /// Services with the given store and size estimate; the rest do nothing or
    /// use the defaults.
    pub fn new(store: impl ContentStore + 'static, network_size: impl NetworkSize + 'static) -> Self {
        Self {
            store: Box::new(store),
            network_size: Box::new(network_size),
            connectivity: Box::new(NoConnectivity),
            hellos: Box::new(HelloBook::default()),
            evaluator: Box::new(DefaultBlockEvaluator),
            clients: Box::new(NoLocalClients),
        }
    }

    pub fn with_store(mut self, store: impl ContentStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn with_connectivity(mut self, connectivity: impl Connectivity + 'static) -> Self {
        self.connectivity = Box::new(connectivity);
        self
    }

    pub fn with_hellos(mut self, hellos: impl HelloSource + 'static) -> Self {
        self.hellos = Box::new(hellos);
        self
    }

    pub fn with_evaluator(mut self, evaluator: impl BlockEvaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    pub fn with_clients(mut self, clients: impl LocalClients + 'static) -> Self {
        self.clients = Box::new(clients);
        self
    }
}

impl std::fmt::Debug for RouterServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterServices")
            .field("network_size", &self.network_size.log_estimate())
            .finish_non_exhaustive()
    }
}
