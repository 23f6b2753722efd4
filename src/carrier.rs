//! Energy carriers are the forms of energy balanced at nodes (e.g. electricity, heat, hydrogen).
use crate::id::{define_id_getter, define_id_type};
use indexmap::IndexMap;
use serde::Deserialize;

define_id_type! {CarrierID}

/// A map of [`Carrier`]s, keyed by carrier ID
pub type CarrierMap = IndexMap<CarrierID, Carrier>;

/// An energy carrier
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Carrier {
    /// A unique identifier for the carrier (e.g. "electricity")
    pub id: CarrierID,
    /// A text description of the carrier
    #[serde(default)]
    pub description: String,
}
define_id_getter! {Carrier, CarrierID}
