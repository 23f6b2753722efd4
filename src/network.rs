//! Network arcs transport a single carrier between two nodes.
use crate::asset::CapacityParameters;
use crate::carrier::CarrierID;
use crate::id::{define_id_getter, define_id_type};
use crate::node::NodeID;
use crate::parameter::{PeriodTable, SparseParameter};
use crate::units::{
    Capacity, Dimensionless, MoneyPerCapacity, MoneyPerCapacityPerYear, MoneyPerEnergy,
};
use indexmap::IndexMap;
use serde::Deserialize;

define_id_type! {ArcID}

/// A map of [`NetworkArc`]s, keyed by arc ID
pub type ArcMap = IndexMap<ArcID, NetworkArc>;

fn default_bidirectional() -> bool {
    true
}

/// A network arc as described in the input
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ArcDescription {
    /// A unique identifier for the arc
    pub id: ArcID,
    /// The node at which flow in the forward direction starts
    pub from: NodeID,
    /// The node at which flow in the forward direction ends
    pub to: NodeID,
    /// The carrier transported
    pub carrier: CarrierID,
    /// Fraction of the energy sent which is lost in transit
    #[serde(default)]
    pub loss_factor: Dimensionless,
    /// Whether flow is allowed in both directions
    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,
    /// Capacity already installed at the start of the first period
    #[serde(default)]
    pub existing_capacity: Capacity,
    /// Remaining lifetime of the existing capacity in years
    #[serde(default)]
    pub existing_lifetime: u32,
    /// The maximum total capacity (unlimited if absent)
    #[serde(default)]
    pub max_capacity: Option<Capacity>,
    /// The maximum capacity which can be added in a single period (unlimited if absent)
    #[serde(default)]
    pub max_addition: Option<SparseParameter<Capacity>>,
    /// Lifetime of new capacity in years
    pub lifetime: u32,
    /// Overnight capital cost per unit of capacity
    #[serde(default)]
    pub capital_cost: Option<SparseParameter<MoneyPerCapacity>>,
    /// Annual fixed operating cost per unit of capacity
    #[serde(default)]
    pub fixed_operating_cost: Option<SparseParameter<MoneyPerCapacityPerYear>>,
    /// Cost per unit of energy sent
    #[serde(default)]
    pub flow_cost: Option<SparseParameter<MoneyPerEnergy>>,
}

/// A capacity-constrained link between two nodes
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkArc {
    /// A unique identifier for the arc
    pub id: ArcID,
    /// Position of the node at which forward flow starts
    pub from: usize,
    /// Position of the node at which forward flow ends
    pub to: usize,
    /// Position of the carrier transported
    pub carrier: usize,
    /// Fraction of the energy sent which is lost in transit
    pub loss_factor: Dimensionless,
    /// Whether flow is allowed in both directions
    pub bidirectional: bool,
    /// Capacity and investment parameters
    pub capacity: CapacityParameters,
    /// Cost per unit of energy sent
    pub flow_cost: PeriodTable<MoneyPerEnergy>,
}
define_id_getter! {NetworkArc, ArcID}

impl NetworkArc {
    /// Fraction of the energy sent which is delivered
    pub fn delivery_factor(&self) -> Dimensionless {
        Dimensionless(1.0) - self.loss_factor
    }
}
