//! The entity registry holds the validated, immutable definitions of a system.
//!
//! Every reference between entities is resolved to a dense position here, so that the formulation
//! can index flat arrays instead of looking IDs up in maps.
use crate::asset::{Asset, CapacityParameters};
use crate::carrier::{Carrier, CarrierMap};
use crate::error::{ModelResult, ensure_valid};
use crate::id::{IDIndex, collect_unique};
use crate::network::{ArcDescription, ArcMap, NetworkArc};
use crate::node::{
    Exchange, ExchangeDescription, Node, NodeCarrier, NodeCarrierDescription, NodeDescription,
    NodeID, NodeMap,
};
use crate::parameter::{Interpolation, PeriodTable};
use crate::period::PeriodInfo;
use crate::technology::{Technology, TechnologyDescription, TechnologyMap};
use crate::time_series::{RawTimeSeries, SeriesID};
use crate::units::{
    Capacity, Dimensionless, Flow, MoneyPerCapacity, MoneyPerCapacityPerYear, MoneyPerEnergy,
};
use indexmap::IndexSet;
use log::{debug, warn};
use petgraph::graph::UnGraph;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};

/// The entities of a system as described in the input
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SystemDescription {
    /// Energy carriers
    pub carriers: Vec<Carrier>,
    /// Technologies which can be installed at nodes
    pub technologies: Vec<TechnologyDescription>,
    /// Nodes with their installations, demand and exchanges
    pub nodes: Vec<NodeDescription>,
    /// Network arcs between nodes
    #[serde(default)]
    pub arcs: Vec<ArcDescription>,
}

/// Validated entities of a system with their period-indexed parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRegistry {
    /// The investment periods
    pub periods: PeriodInfo,
    /// Energy carriers
    pub carriers: CarrierMap,
    /// Technologies
    pub technologies: TechnologyMap,
    /// Nodes
    pub nodes: NodeMap,
    /// Network arcs
    pub arcs: ArcMap,
    /// Technologies installed (or installable) at nodes
    pub assets: Vec<Asset>,
    /// Carriers balanced at each node, ordered by node then carrier
    pub node_carriers: Vec<NodeCarrier>,
    node_carrier_lookup: HashMap<(usize, usize), usize>,
}

impl EntityRegistry {
    /// Validate a system description and build the registry.
    ///
    /// # Arguments
    ///
    /// * `description` - The entities as described in the input
    /// * `periods` - The investment periods
    /// * `time_series` - The raw time series, used to resolve demand and capacity-factor profiles
    /// * `interpolation` - How to fill gaps in sparse parameters
    pub fn build(
        description: &SystemDescription,
        periods: PeriodInfo,
        time_series: &RawTimeSeries,
        interpolation: Interpolation,
    ) -> ModelResult<Self> {
        let carriers: CarrierMap = collect_unique(description.carriers.iter().cloned(), "carrier")?;
        let technologies: TechnologyMap = collect_unique(
            description
                .technologies
                .iter()
                .map(|desc| Technology::from_description(desc, &carriers, &periods, interpolation))
                .collect::<ModelResult<Vec<_>>>()?,
            "technology",
        )?;
        let node_ids: IndexSet<_> = {
            let mut ids = IndexSet::new();
            for node in &description.nodes {
                ensure_valid!(ids.insert(node.id.clone()), &node.id, "Duplicate node ID");
            }
            ids
        };

        let mut nodes = NodeMap::new();
        let mut assets = Vec::new();
        for (node_index, node_desc) in description.nodes.iter().enumerate() {
            let mut asset_indexes = Vec::new();
            for installation in &node_desc.technologies {
                let entity = format!("{}/{}", node_desc.id, installation.technology);
                let technology_index =
                    technologies.index_of(&installation.technology, &node_desc.id.to_string())?;
                ensure_valid!(
                    !assets.iter().any(|asset: &Asset| asset.node == node_index
                        && asset.technology == technology_index),
                    &entity,
                    "Technology is installed more than once at this node"
                );
                let technology = &technologies[technology_index];
                let capacity_factor = resolve_capacity_factor(
                    technology,
                    installation.capacity_factor.as_ref(),
                    time_series,
                    &entity,
                )?;
                let capacity = Asset::capacity_parameters(installation, technology);
                capacity.validate(&entity)?;

                asset_indexes.push(assets.len());
                assets.push(Asset {
                    node: node_index,
                    technology: technology_index,
                    capacity,
                    capacity_factor,
                });
            }

            nodes.insert(
                node_desc.id.clone(),
                Node {
                    id: node_desc.id.clone(),
                    description: node_desc.description.clone(),
                    assets: asset_indexes,
                    arcs: Vec::new(),
                    carriers: Vec::new(),
                },
            );
        }

        let arcs: ArcMap = collect_unique(
            description
                .arcs
                .iter()
                .map(|arc| resolve_arc(arc, &node_ids, &carriers, &periods, interpolation))
                .collect::<ModelResult<Vec<_>>>()?,
            "arc",
        )?;
        for (arc_index, arc) in arcs.values().enumerate() {
            nodes[arc.from].arcs.push(arc_index);
            nodes[arc.to].arcs.push(arc_index);
        }

        let node_carriers = build_node_carriers(
            description,
            &nodes,
            &technologies,
            &assets,
            &arcs,
            &carriers,
            &periods,
            time_series,
            interpolation,
        )?;
        let mut node_carrier_lookup = HashMap::new();
        for (index, node_carrier) in node_carriers.iter().enumerate() {
            nodes[node_carrier.node].carriers.push(index);
            node_carrier_lookup.insert((node_carrier.node, node_carrier.carrier), index);
        }

        let registry = Self {
            periods,
            carriers,
            technologies,
            nodes,
            arcs,
            assets,
            node_carriers,
            node_carrier_lookup,
        };
        registry.warn_about_islands();
        debug!(
            "Entity registry: {} nodes, {} assets, {} arcs, {} balanced carriers",
            registry.nodes.len(),
            registry.assets.len(),
            registry.arcs.len(),
            registry.node_carriers.len()
        );

        Ok(registry)
    }

    /// The position of the balance for a carrier at a node, if the carrier is present there
    pub fn node_carrier(&self, node: usize, carrier: usize) -> Option<usize> {
        self.node_carrier_lookup.get(&(node, carrier)).copied()
    }

    /// The technology of an asset
    pub fn technology_of(&self, asset: &Asset) -> &Technology {
        &self.technologies[asset.technology]
    }

    /// A human-readable name for an asset, e.g. `north/CCGT`
    pub fn asset_name(&self, asset: &Asset) -> String {
        format!(
            "{}/{}",
            self.nodes[asset.node].id,
            self.technologies[asset.technology].id
        )
    }

    /// Warn if the network splits the nodes into disconnected groups
    fn warn_about_islands(&self) {
        if self.nodes.len() < 2 {
            return;
        }

        let mut graph = UnGraph::<(), ()>::new_undirected();
        let indexes: Vec<_> = (0..self.nodes.len()).map(|_| graph.add_node(())).collect();
        for arc in self.arcs.values() {
            graph.add_edge(indexes[arc.from], indexes[arc.to], ());
        }

        let num_islands = petgraph::algo::connected_components(&graph);
        if num_islands > 1 {
            warn!(
                "The network is split into {num_islands} disconnected groups of nodes. Each group \
                must balance on its own."
            );
        }
    }
}

/// Check and resolve the capacity-factor profile of an installation
fn resolve_capacity_factor(
    technology: &Technology,
    series_id: Option<&SeriesID>,
    time_series: &RawTimeSeries,
    entity: &str,
) -> ModelResult<Option<usize>> {
    let Some(series_id) = series_id else {
        ensure_valid!(
            !technology.kind.uses_capacity_factor(),
            entity,
            "Renewable technologies need a `capacity_factor` series"
        );
        return Ok(None);
    };

    ensure_valid!(
        technology.kind.uses_capacity_factor(),
        entity,
        "`capacity_factor` is only valid for renewable technologies"
    );
    let index = time_series.index_of(series_id);
    ensure_valid!(index.is_some(), entity, "Unknown time series {series_id}");
    let values = time_series.get(&series_id.0).unwrap_or_default();
    ensure_valid!(
        values.iter().all(|value| (0.0..=1.0).contains(value)),
        entity,
        "Capacity factors in series {series_id} must be between zero and one"
    );

    Ok(index)
}

/// Validate an arc description and resolve its references
fn resolve_arc(
    description: &ArcDescription,
    node_ids: &IndexSet<NodeID>,
    carriers: &CarrierMap,
    periods: &PeriodInfo,
    interpolation: Interpolation,
) -> ModelResult<NetworkArc> {
    let id = &description.id;
    let entity = id.to_string();
    let from = node_ids.index_of(&description.from, &entity)?;
    let to = node_ids.index_of(&description.to, &entity)?;
    ensure_valid!(from != to, id, "Arc must connect two different nodes");
    let carrier = carriers.index_of(&description.carrier, &entity)?;
    ensure_valid!(
        description.loss_factor.0 >= 0.0 && description.loss_factor.0 < 1.0,
        id,
        "`loss_factor` must be at least zero and less than one"
    );
    ensure_valid!(description.lifetime > 0, id, "`lifetime` must be greater than zero");

    let capacity = CapacityParameters {
        existing_capacity: description.existing_capacity,
        existing_lifetime: description.existing_lifetime,
        lifetime: description.lifetime,
        max_capacity: description
            .max_capacity
            .unwrap_or(Capacity(f64::INFINITY)),
        min_capacity: Capacity(0.0),
        max_addition: PeriodTable::normalise(
            description.max_addition.as_ref(),
            Some(Capacity(f64::INFINITY)),
            periods,
            interpolation,
            &entity,
            "max_addition",
        )?,
        discrete: false,
        capital_cost: PeriodTable::normalise(
            description.capital_cost.as_ref(),
            Some(MoneyPerCapacity(0.0)),
            periods,
            interpolation,
            &entity,
            "capital_cost",
        )?,
        fixed_operating_cost: PeriodTable::normalise(
            description.fixed_operating_cost.as_ref(),
            Some(MoneyPerCapacityPerYear(0.0)),
            periods,
            interpolation,
            &entity,
            "fixed_operating_cost",
        )?,
        discount_rate: None,
    };
    capacity.validate(&entity)?;

    Ok(NetworkArc {
        id: id.clone(),
        from,
        to,
        carrier,
        loss_factor: description.loss_factor,
        bidirectional: description.bidirectional,
        capacity,
        flow_cost: PeriodTable::normalise(
            description.flow_cost.as_ref(),
            Some(MoneyPerEnergy(0.0)),
            periods,
            interpolation,
            &entity,
            "flow_cost",
        )?,
    })
}

/// Validate an import or export description
fn resolve_exchange(
    description: &ExchangeDescription,
    periods: &PeriodInfo,
    interpolation: Interpolation,
    entity: &str,
) -> ModelResult<Exchange> {
    let limit = description.limit.unwrap_or(Flow(f64::INFINITY));
    ensure_valid!(limit.0 >= 0.0, entity, "Exchange `limit` must be non-negative");
    Ok(Exchange {
        price: PeriodTable::normalise(
            Some(&description.price),
            None,
            periods,
            interpolation,
            entity,
            "price",
        )?,
        limit,
        emission_factor: description.emission_factor,
    })
}

/// Work out which carriers must be balanced at each node.
///
/// A carrier is balanced at a node if it has demand or exchanges there, if a technology at the
/// node uses it or if an arc carrying it starts or ends there.
#[allow(clippy::too_many_arguments)]
fn build_node_carriers(
    description: &SystemDescription,
    nodes: &NodeMap,
    technologies: &TechnologyMap,
    assets: &[Asset],
    arcs: &ArcMap,
    carriers: &CarrierMap,
    periods: &PeriodInfo,
    time_series: &RawTimeSeries,
    interpolation: Interpolation,
) -> ModelResult<Vec<NodeCarrier>> {
    let mut present: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];
    for asset in assets {
        present[asset.node].extend(technologies[asset.technology].kind.iter_carriers());
    }
    for arc in arcs.values() {
        present[arc.from].insert(arc.carrier);
        present[arc.to].insert(arc.carrier);
    }

    let mut explicit: Vec<HashMap<usize, &NodeCarrierDescription>> = Vec::new();
    for node_desc in &description.nodes {
        let mut by_carrier = HashMap::new();
        for (carrier_id, carrier_desc) in &node_desc.carriers {
            let carrier = carriers.index_of(carrier_id, &node_desc.id.to_string())?;
            by_carrier.insert(carrier, carrier_desc);
        }
        explicit.push(by_carrier);
    }
    for (node, by_carrier) in explicit.iter().enumerate() {
        present[node].extend(by_carrier.keys().copied());
    }

    let default_description = NodeCarrierDescription::default();
    let mut node_carriers = Vec::new();
    for (node, carrier_set) in present.iter().enumerate() {
        for &carrier in carrier_set {
            let entity = format!("{}/{}", nodes[node].id, carriers[carrier].id);
            let carrier_desc = explicit[node]
                .get(&carrier)
                .copied()
                .unwrap_or(&default_description);

            let demand = match &carrier_desc.demand {
                Some(series_id) => {
                    let index = time_series.index_of(series_id);
                    ensure_valid!(index.is_some(), &entity, "Unknown time series {series_id}");
                    ensure_valid!(
                        time_series
                            .get(&series_id.0)
                            .unwrap_or_default()
                            .iter()
                            .all(|value| *value >= 0.0),
                        &entity,
                        "Demand series {series_id} must be non-negative"
                    );
                    index
                }
                None => None,
            };
            let demand_scale = PeriodTable::normalise(
                carrier_desc.demand_scale.as_ref(),
                Some(Dimensionless(1.0)),
                periods,
                interpolation,
                &entity,
                "demand_scale",
            )?;
            ensure_valid!(
                demand_scale.iter().all(|scale| scale.0 >= 0.0),
                &entity,
                "`demand_scale` must be non-negative"
            );

            node_carriers.push(NodeCarrier {
                node,
                carrier,
                demand,
                demand_scale,
                import: carrier_desc
                    .import
                    .as_ref()
                    .map(|exchange| resolve_exchange(exchange, periods, interpolation, &entity))
                    .transpose()?,
                export: carrier_desc
                    .export
                    .as_ref()
                    .map(|exchange| resolve_exchange(exchange, periods, interpolation, &entity))
                    .transpose()?,
            });
        }
    }

    Ok(node_carriers)
}
