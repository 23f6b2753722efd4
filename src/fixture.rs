//! Fixtures for tests

use crate::aggregation::TimeStructure;
use crate::asset::CapacityParameters;
use crate::carrier::{Carrier, CarrierMap};
use crate::parameter::{Interpolation, PeriodTable};
use crate::parameters::ModelParameters;
use crate::period::PeriodInfo;
use crate::registry::{EntityRegistry, SystemDescription};
use crate::technology::TechnologyDescription;
use crate::time_series::RawTimeSeries;
use crate::units::{Capacity, MoneyPerCapacity, MoneyPerCapacityPerYear};
use indexmap::indexmap;
use rstest::fixture;
use std::f64::consts::TAU;

/// Assert that a validation error naming the given entity occurs
macro_rules! assert_validation_error {
    ($result:expr, $entity:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err(),
            $crate::error::ModelError::validation($entity, $msg)
        );
    };
}
pub(crate) use assert_validation_error;

/// Two nodes joined by an electricity line. Gas is imported in the north and burnt in a CCGT;
/// the south has electricity demand, wind and a battery.
pub const SYSTEM_TOML: &str = r#"
[[carriers]]
id = "electricity"

[[carriers]]
id = "gas"

[[technologies]]
id = "CCGT"
type = "conversion"
inputs = { gas = 1.0 }
outputs = { electricity = 0.5 }
lifetime = 30
capital_cost = 600.0
fixed_operating_cost = 10.0
variable_operating_cost = 2.0
emission_factor = 0.2

[[technologies]]
id = "wind"
type = "renewable"
outputs = { electricity = 1.0 }
curtailable = true
lifetime = 25
capital_cost = 1000.0

[[technologies]]
id = "battery"
type = "storage"
carrier = "electricity"
charge_efficiency = 0.9
discharge_efficiency = 1.0
max_charge_rate = 0.25
max_discharge_rate = 0.25
lifetime = 15
capital_cost = 200.0

[[nodes]]
id = "north"
technologies = [{ technology = "CCGT" }]
carriers.gas.import = { price = 20.0 }

[[nodes]]
id = "south"
technologies = [
    { technology = "wind", capacity_factor = "wind" },
    { technology = "battery" },
]
carriers.electricity.demand = "demand"

[[arcs]]
id = "north-south"
from = "north"
to = "south"
carrier = "electricity"
loss_factor = 0.05
lifetime = 40
capital_cost = 100.0
"#;

#[fixture]
pub fn carriers() -> CarrierMap {
    indexmap! {
        "electricity".into() => Carrier { id: "electricity".into(), description: String::new() },
        "gas".into() => Carrier { id: "gas".into(), description: String::new() },
    }
}

#[fixture]
pub fn periods() -> PeriodInfo {
    PeriodInfo::new(&[2020, 2030, 2040], 10).unwrap()
}

#[fixture]
pub fn technology_description() -> TechnologyDescription {
    toml::from_str(
        r#"
        id = "CCGT"
        type = "conversion"
        inputs = { gas = 1.0 }
        outputs = { electricity = 0.5 }
        lifetime = 30
        capital_cost = 600.0
        "#,
    )
    .unwrap()
}

#[fixture]
pub fn capacity_parameters() -> CapacityParameters {
    CapacityParameters {
        existing_capacity: Capacity(0.0),
        existing_lifetime: 0,
        lifetime: 10,
        max_capacity: Capacity(100.0),
        min_capacity: Capacity(0.0),
        max_addition: PeriodTable::constant(3, Capacity(f64::INFINITY)),
        discrete: false,
        capital_cost: PeriodTable::constant(3, MoneyPerCapacity(0.0)),
        fixed_operating_cost: PeriodTable::constant(3, MoneyPerCapacityPerYear(0.0)),
        discount_rate: None,
    }
}

#[fixture]
pub fn system_description() -> SystemDescription {
    toml::from_str(SYSTEM_TOML).unwrap()
}

/// Two days of hourly data with a daily demand cycle and wind which is stronger on the first day
#[fixture]
pub fn time_series() -> RawTimeSeries {
    let phase = |hour: usize| (hour % 24) as f64 / 24.0 * TAU;
    let demand = (0..48).map(|hour| 10.0 - 4.0 * phase(hour).cos()).collect();
    let wind = (0..48)
        .map(|hour| {
            let base = if hour < 24 { 0.5 } else { 0.2 };
            base + 0.1 * phase(hour).sin()
        })
        .collect();

    RawTimeSeries::new(1.0, indexmap! {"demand".into() => demand, "wind".into() => wind})
        .unwrap()
}

#[fixture]
pub fn model_parameters() -> ModelParameters {
    toml::from_str(
        r#"
        periods = [2020, 2030, 2040]
        final_period_length = 10

        [aggregation]
        method = "full"
        block_length = 24
        "#,
    )
    .unwrap()
}

#[fixture]
pub fn registry(
    system_description: SystemDescription,
    periods: PeriodInfo,
    time_series: RawTimeSeries,
) -> EntityRegistry {
    EntityRegistry::build(
        &system_description,
        periods,
        &time_series,
        Interpolation::Step,
    )
    .unwrap()
}

#[fixture]
pub fn time_structure(
    time_series: RawTimeSeries,
    model_parameters: ModelParameters,
) -> TimeStructure {
    TimeStructure::aggregate(
        &time_series,
        &model_parameters.aggregation,
        model_parameters.hours_per_year,
    )
    .unwrap()
}
