#![allow(dead_code)]

use std::path::{Path, PathBuf};

use mvd_reader::mvd::container::Dataset;
use mvd_reader::{ContainerWriter, MemoryContainer};

pub const MVD3_CELLS: usize = 1000;
pub const MORPHOLOGY_COUNT: usize = 7;
pub const COMBO_COUNT: usize = 10;
/// Deliberately not sorted.
pub const MTYPE_LIBRARY: [&str; 4] = ["L5_TTPC", "L1_DAC", "L4_SS", "L23_PC"];
pub const ETYPE_LIBRARY: [&str; 3] = ["cADpyr", "bAC", "dSTUT"];
pub const REGION_LIBRARY: [&str; 2] = ["SSp-ll", "SSp-ul"];
pub const SYNAPSE_CLASS_LIBRARY: [&str; 2] = ["EXC", "INH"];

pub const SONATA_DEFAULT_CELLS: usize = 20;
pub const SONATA_TRUNCATED_CELLS: usize = 10;
pub const TRUNCATED_KEY_9: &str = "dSTUT_1_87dd39e6b0255ec053001f16da85b0e0";
/// Stored orientation of cell 0 of the `truncated` population.
pub const TRUNCATED_ROTATION_0: [f64; 4] = [0.0, -0.010005561, 0.0, 0.999949943];

pub fn fixture_path(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    for part in parts {
        p.push(part);
    }
    p
}

pub fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() < 1e-8,
        "{}: expected {}, got {}",
        what,
        expected,
        actual
    );
}

pub fn write_store(dir: &Path, name: &str, store: &MemoryContainer, compress_text: bool) -> PathBuf {
    let path = dir.join(name);
    ContainerWriter::new(store)
        .compress_text(compress_text)
        .write(&path)
        .unwrap_or_else(|e| panic!("failed to write {}: {}", path.display(), e));
    path
}

fn cycle(n: usize, modulo: usize) -> Vec<i64> {
    (0..n).map(|i| (i % modulo) as i64).collect()
}

pub fn mvd3_position(i: usize) -> [f64; 3] {
    [i as f64, i as f64 * 0.5, -(i as f64)]
}

pub fn mvd3_orientation(i: usize) -> [f64; 4] {
    let half = i as f64 * 0.0005;
    [0.0, half.sin(), 0.0, half.cos()]
}

/// Expected synapse class index of MVD3 cell `i`: only L1_DAC is inhibitory.
pub fn mvd3_synapse_class(i: usize) -> i64 {
    if i % MTYPE_LIBRARY.len() == 1 { 1 } else { 0 }
}

pub fn mvd3_store() -> MemoryContainer {
    let n = MVD3_CELLS;
    let positions: Vec<[f64; 3]> = (0..n).map(mvd3_position).collect();
    let orientations: Vec<[f64; 4]> = (0..n).map(mvd3_orientation).collect();

    let mut store = MemoryContainer::new();
    store
        .insert("cells/positions", Dataset::rows(positions.as_slice()))
        .insert("cells/orientations", Dataset::rows(orientations.as_slice()))
        .insert("cells/properties/morphology", Dataset::ints(cycle(n, MORPHOLOGY_COUNT)))
        .insert(
            "library/morphology",
            Dataset::texts((0..MORPHOLOGY_COUNT).map(|i| format!("morph_{}", i))),
        )
        .insert("cells/properties/mtype", Dataset::ints(cycle(n, MTYPE_LIBRARY.len())))
        .insert("library/mtype", Dataset::texts(MTYPE_LIBRARY))
        .insert("cells/properties/etype", Dataset::ints(cycle(n, ETYPE_LIBRARY.len())))
        .insert("library/etype", Dataset::texts(ETYPE_LIBRARY))
        .insert("cells/properties/region", Dataset::ints(cycle(n, REGION_LIBRARY.len())))
        .insert("library/region", Dataset::texts(REGION_LIBRARY))
        .insert(
            "cells/properties/synapse_class",
            Dataset::ints((0..n).map(mvd3_synapse_class).collect()),
        )
        .insert("library/synapse_class", Dataset::texts(SYNAPSE_CLASS_LIBRARY))
        .insert("cells/properties/me_combo", Dataset::ints(cycle(n, COMBO_COUNT)))
        .insert(
            "library/me_combo",
            Dataset::texts((0..COMBO_COUNT).map(|i| format!("combo_{}", i))),
        )
        .insert(
            "cells/properties/layer",
            Dataset::ints((0..n).map(|i| (i % 6 + 1) as i64).collect()),
        )
        .insert(
            "cells/properties/hypercolumn",
            Dataset::ints((0..n).map(|i| (i / 100) as i64).collect()),
        )
        .insert(
            "cells/properties/exc_mini_frequency",
            Dataset::floats((0..n).map(|i| i as f64 * 0.01).collect()),
        )
        .insert(
            "cells/properties/inh_mini_frequency",
            Dataset::floats((0..n).map(|i| i as f64 * 0.02).collect()),
        )
        .insert("circuit/seeds", Dataset::floats(vec![10.0, 20.0, 30.0, 40.0]));
    store
}

pub fn mvd3_file(dir: &Path) -> PathBuf {
    write_store(dir, "circuit.mvd3", &mvd3_store(), false)
}

pub fn truncated_me_combo(i: usize) -> String {
    if i == 9 { TRUNCATED_KEY_9.to_string() } else { format!("cADpyr_1_{}", i) }
}

pub fn truncated_template(i: usize) -> String {
    if i == 9 { "hoc:dSTUT_321707905".to_string() } else { format!("hoc:cADpyr_e{}", i) }
}

/// Rotation around Y stored for cell `i` of the `truncated` population.
pub fn truncated_y_angle(i: usize) -> f64 {
    if i == 0 {
        2.0 * TRUNCATED_ROTATION_0[1].atan2(TRUNCATED_ROTATION_0[3])
    } else {
        i as f64 * 0.1
    }
}

fn insert_positions(store: &mut MemoryContainer, group: &str, n: usize) {
    store
        .insert(&format!("{}/x", group), Dataset::floats((0..n).map(|i| i as f64).collect()))
        .insert(&format!("{}/y", group), Dataset::floats((0..n).map(|i| 2.0 * i as f64).collect()))
        .insert(&format!("{}/z", group), Dataset::floats((0..n).map(|i| 3.0 * i as f64).collect()));
}

/// Two populations: `default` (quaternion orientations, currents as
/// dynamics parameters) and `truncated` (Euler angles, emodel templates).
pub fn sonata_store() -> MemoryContainer {
    let mut store = MemoryContainer::new();

    let n = SONATA_DEFAULT_CELLS;
    let group = "nodes/default/0";
    store
        .insert("nodes/default/node_type_id", Dataset::ints(vec![-1; n]))
        .insert("nodes/default/node_group_id", Dataset::ints(vec![0; n]));
    insert_positions(&mut store, group, n);
    store
        .insert(&format!("{}/orientation_x", group), Dataset::floats(vec![0.0; n]))
        .insert(&format!("{}/orientation_y", group), Dataset::floats(vec![0.0; n]))
        .insert(&format!("{}/orientation_z", group), Dataset::floats((0..n).map(|i| i as f64 * 0.01).collect()))
        .insert(&format!("{}/orientation_w", group), Dataset::floats(vec![1.0; n]))
        .insert(&format!("{}/mtype", group), Dataset::ints(cycle(n, 2)))
        .insert(&format!("{}/@library/mtype", group), Dataset::texts(["L23_PC", "L5_TTPC"]))
        .insert(&format!("{}/synapse_class", group), Dataset::ints(cycle(n, 2)))
        .insert(&format!("{}/@library/synapse_class", group), Dataset::texts(["EXC", "INH"]))
        .insert(
            &format!("{}/etype", group),
            Dataset::texts((0..n).map(|i| if i % 2 == 0 { "bAC" } else { "dSTUT" })),
        )
        .insert(
            &format!("{}/morphology", group),
            Dataset::texts((0..n).map(|i| format!("morph_{}", (i * 7) % 3))),
        )
        .insert(
            &format!("{}/model_template", group),
            Dataset::texts((0..n).map(|i| format!("hoc:emodel_{}", i % 4))),
        )
        .insert(
            &format!("{}/me_combo", group),
            Dataset::texts((0..n).map(|i| format!("combo_{}", i % 5))),
        )
        .insert(
            &format!("{}/layer", group),
            Dataset::texts((0..n).map(|i| if i % 2 == 0 { "2" } else { "5" })),
        )
        .insert(
            &format!("{}/dynamics_params/threshold_current", group),
            Dataset::floats((0..n).map(|i| i as f64 * 0.1).collect()),
        )
        .insert(
            &format!("{}/dynamics_params/holding_current", group),
            Dataset::floats((0..n).map(|i| -(i as f64) * 0.01).collect()),
        );

    let n = SONATA_TRUNCATED_CELLS;
    let group = "nodes/truncated/0";
    store
        .insert("nodes/truncated/node_type_id", Dataset::ints(vec![-1; n]))
        .insert("nodes/truncated/node_group_id", Dataset::ints(vec![0; n]));
    insert_positions(&mut store, group, n);
    store
        .insert(
            &format!("{}/rotation_angle_yaxis", group),
            Dataset::floats((0..n).map(truncated_y_angle).collect()),
        )
        .insert(
            &format!("{}/model_template", group),
            Dataset::texts((0..n).map(truncated_template)),
        )
        .insert(&format!("{}/me_combo", group), Dataset::texts((0..n).map(truncated_me_combo)))
        .insert(&format!("{}/mtype", group), Dataset::ints(vec![0; n]))
        .insert(&format!("{}/@library/mtype", group), Dataset::texts(["L1_DAC"]))
        .insert(&format!("{}/etype", group), Dataset::texts((0..n).map(|_| "cADpyr")));
    store
}

pub fn sonata_file(dir: &Path) -> PathBuf {
    write_store(dir, "nodes.sonata", &sonata_store(), false)
}

/// Two populations, neither named `default`.
pub fn ambiguous_sonata_store() -> MemoryContainer {
    let mut store = MemoryContainer::new();
    for population in ["left", "right"] {
        store.insert(
            &format!("nodes/{}/node_type_id", population),
            Dataset::ints(vec![-1; 3]),
        );
        insert_positions(&mut store, &format!("nodes/{}/0", population), 3);
    }
    store
}
