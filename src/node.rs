//! Nodes are the geographic or energy balance points of the system.
//!
//! Every carrier present at a node (through demand, imports, technologies or network arcs) is
//! balanced there in every time step and period.
use crate::asset::InstallationDescription;
use crate::carrier::CarrierID;
use crate::id::{define_id_getter, define_id_type};
use crate::parameter::{PeriodTable, SparseParameter};
use crate::time_series::SeriesID;
use crate::units::{Dimensionless, EmissionsPerEnergy, Flow, MoneyPerEnergy};
use indexmap::IndexMap;
use serde::Deserialize;

define_id_type! {NodeID}

/// A map of [`Node`]s, keyed by node ID
pub type NodeMap = IndexMap<NodeID, Node>;

/// Imports or exports of a carrier across the system boundary as described in the input
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExchangeDescription {
    /// Price paid for imports or received for exports
    pub price: SparseParameter<MoneyPerEnergy>,
    /// Maximum rate of exchange (unlimited if absent)
    #[serde(default)]
    pub limit: Option<Flow>,
    /// Emissions per unit of energy exchanged
    #[serde(default)]
    pub emission_factor: EmissionsPerEnergy,
}

/// The treatment of a carrier at a node as described in the input
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NodeCarrierDescription {
    /// The demand profile for this carrier
    #[serde(default)]
    pub demand: Option<SeriesID>,
    /// Multiplier applied to the demand profile in each period
    #[serde(default)]
    pub demand_scale: Option<SparseParameter<Dimensionless>>,
    /// Imports from outside the system
    #[serde(default)]
    pub import: Option<ExchangeDescription>,
    /// Exports to outside the system
    #[serde(default)]
    pub export: Option<ExchangeDescription>,
}

/// A node as described in the input
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NodeDescription {
    /// A unique identifier for the node (e.g. "north")
    pub id: NodeID,
    /// A text description of the node
    #[serde(default)]
    pub description: String,
    /// Technologies installed or installable at the node
    #[serde(default)]
    pub technologies: Vec<InstallationDescription>,
    /// Demand and exchange for carriers at the node
    #[serde(default)]
    pub carriers: IndexMap<CarrierID, NodeCarrierDescription>,
}

/// Imports or exports of a carrier across the system boundary
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    /// Price paid for imports or received for exports
    pub price: PeriodTable<MoneyPerEnergy>,
    /// Maximum rate of exchange (may be infinite)
    pub limit: Flow,
    /// Emissions per unit of energy exchanged
    pub emission_factor: EmissionsPerEnergy,
}

/// A carrier which is balanced at a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCarrier {
    /// Position of the node in the registry
    pub node: usize,
    /// Position of the carrier in the registry
    pub carrier: usize,
    /// Position of the demand series, if there is demand
    pub demand: Option<usize>,
    /// Multiplier applied to the demand profile in each period
    pub demand_scale: PeriodTable<Dimensionless>,
    /// Imports from outside the system
    pub import: Option<Exchange>,
    /// Exports to outside the system
    pub export: Option<Exchange>,
}

/// A node of the energy system
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// A unique identifier for the node (e.g. "north")
    pub id: NodeID,
    /// A text description of the node
    pub description: String,
    /// Positions of the assets at this node
    pub assets: Vec<usize>,
    /// Positions of the network arcs which start or end at this node
    pub arcs: Vec<usize>,
    /// Positions of the carriers balanced at this node in the registry's node-carrier list
    pub carriers: Vec<usize>,
}
define_id_getter! {Node, NodeID}
