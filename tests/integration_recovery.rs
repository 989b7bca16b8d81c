//! Recovery properties of the builder + solver pipeline on a feeder
//! with a known operating point.

mod common;

use rand::SeedableRng;
use rand::rngs::StdRng;

use dse_sim::measurement::builder;
use dse_sim::measurement::reading::{Measurand, Phase, Reading};
use dse_sim::measurement::table::MeasurementTable;
use dse_sim::estimator::wls;
use dse_sim::units::Bases;

fn bases() -> Bases {
    Bases::new(1000.0, 2400.0)
}

/// Feeds exact phasor voltage readings (raw volts and radians) for the
/// given devices into a fresh table.
fn table_with_phasor_readings(
    devices: &[dse_sim::measurement::device::Device],
) -> MeasurementTable {
    let (magnitudes, angles) = common::true_state();
    let mut table = MeasurementTable::new(devices, bases(), common::POWER_FACTOR);
    for (index, device) in devices.iter().enumerate() {
        if device.line.is_some() {
            continue;
        }
        let mut measurands = Vec::new();
        for phase in Phase::ALL {
            let slot = 3 * device.bus + phase.index();
            measurands.push(Measurand::PhaseVoltage {
                phase,
                magnitude: magnitudes[slot] * 2400.0,
                angle: angles[slot],
            });
        }
        measurands.push(Measurand::SentAt { time: 0 });
        table.apply(
            index,
            &Reading {
                device: device.id.clone(),
                measurands,
            },
        );
    }
    table
}

#[test]
fn estimator_recovers_feeder_state_from_noiseless_phasors() {
    let devices = vec![
        common::phasor_device("Phasor_0", 0),
        common::phasor_device("Phasor_1", 1),
        common::phasor_device("Phasor_2", 2),
    ];
    let table = table_with_phasor_readings(&devices);
    let pseudo = common::exact_pseudo_profile();
    let ybus = common::ybus();

    let set = builder::build(&table, &devices, &pseudo, common::SLOTS, 0, 12);
    // Injection pairs for six non-reference slots plus voltage pairs for
    // all nine instrumented slots.
    assert_eq!(set.len(), 6 * 2 + 9 * 2);
    assert_eq!(set.z.len(), set.kinds.len());
    assert_eq!(set.z.len(), set.variances.len());

    let mut rng = StdRng::seed_from_u64(17);
    let estimate = wls::estimate(&ybus, &set, 50, 1e-9, &mut rng).expect("solvable system");
    assert!(estimate.iterations > 1, "solve should actually move");
    assert!(estimate.iterations < 50, "solve should converge early");

    for (found, expected) in estimate.voltages.iter().zip(common::true_voltages()) {
        assert!(
            (found - expected).norm() < 1e-6,
            "voltage mismatch: {found} vs {expected}"
        );
    }
}

#[test]
fn line_current_measurements_blend_into_the_same_estimate() {
    let mut devices = vec![
        common::phasor_device("Phasor_0", 0),
        common::phasor_device("Phasor_1", 1),
        common::phasor_device("Phasor_2", 2),
    ];
    devices.push(common::current_device("Flow_0_1", 0, 1));
    let mut table = table_with_phasor_readings(&devices);

    // The flow device reports the true series current in raw amperes.
    let currents = common::line_currents(0, 1);
    let current_base = bases().current();
    let mut measurands = Vec::new();
    for phase in Phase::ALL {
        let current = currents[phase.index()];
        measurands.push(Measurand::PhaseCurrent {
            phase,
            magnitude: current.norm() * current_base,
            angle: current.arg(),
        });
    }
    table.apply(
        3,
        &Reading {
            device: "Flow_0_1".to_string(),
            measurands,
        },
    );

    let pseudo = common::exact_pseudo_profile();
    let ybus = common::ybus();
    let set = builder::build(&table, &devices, &pseudo, common::SLOTS, 0, 12);
    // Six extra rows: a real/imaginary pair per phase.
    assert_eq!(set.len(), 6 * 2 + 9 * 2 + 6);

    let mut rng = StdRng::seed_from_u64(23);
    let estimate = wls::estimate(&ybus, &set, 50, 1e-9, &mut rng).expect("solvable system");
    for (found, expected) in estimate.voltages.iter().zip(common::true_voltages()) {
        assert!(
            (found - expected).norm() < 1e-6,
            "voltage mismatch: {found} vs {expected}"
        );
    }
}

#[test]
fn builder_output_is_identical_for_a_frozen_table() {
    let devices = vec![
        common::phasor_device("Phasor_0", 0),
        common::smart_meter_device("Meter_1", 1),
    ];
    let table = table_with_phasor_readings(&devices);
    let pseudo = common::exact_pseudo_profile();

    let first = builder::build(&table, &devices, &pseudo, common::SLOTS, 0, 7);
    let second = builder::build(&table, &devices, &pseudo, common::SLOTS, 0, 7);
    assert_eq!(first.z, second.z);
    assert_eq!(first.kinds, second.kinds);
    assert_eq!(first.variances, second.variances);
}
