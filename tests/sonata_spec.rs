mod common;

use std::sync::Arc;

use common::*;
use mvd_reader::mvd::reader::sonata::strip_template_prefix;
use mvd_reader::{
    AttributeKind, CircuitFile, CircuitFormat, DataType, MvdError, OpenOptions, Selected, Selector,
    detect_format,
};

fn open_population(population: Option<&str>) -> (tempfile::TempDir, CircuitFile) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = sonata_file(dir.path());
    let circuit = CircuitFile::open(&path, population).expect("open sonata");
    (dir, circuit)
}

#[test]
fn default_population_is_used_when_none_is_requested() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = sonata_file(dir.path());
    assert_eq!(detect_format(&path).expect("detect"), Some(CircuitFormat::Sonata));

    let circuit = CircuitFile::open(&path, None).expect("open");
    assert_eq!(circuit.format(), CircuitFormat::Sonata);
    assert_eq!(circuit.population(), Some("default"));
    assert_eq!(circuit.len(), SONATA_DEFAULT_CELLS);
}

#[test]
fn populations_are_sized_independently() {
    let (_dir, circuit) = open_population(Some("truncated"));
    assert_eq!(circuit.population(), Some("truncated"));
    assert_eq!(circuit.len(), SONATA_TRUNCATED_CELLS);
    assert!(matches!(
        circuit.positions(&Selector::single(SONATA_TRUNCATED_CELLS)),
        Err(MvdError::IndexOutOfRange { len: SONATA_TRUNCATED_CELLS, .. })
    ));
}

#[test]
fn unknown_population_lists_the_available_ones() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = sonata_file(dir.path());
    match CircuitFile::open(&path, Some("thalamus")) {
        Err(MvdError::PopulationNotFound { population, available }) => {
            assert_eq!(population, "thalamus");
            assert_eq!(available, vec!["default", "truncated"]);
        }
        other => panic!("expected PopulationNotFound, got {:?}", other),
    }
}

#[test]
fn several_populations_without_default_are_ambiguous() {
    let store = Arc::new(ambiguous_sonata_store());
    match CircuitFile::from_container(store.clone(), &OpenOptions::new()) {
        Err(MvdError::AmbiguousPopulation(names)) => assert_eq!(names, vec!["left", "right"]),
        other => panic!("expected AmbiguousPopulation, got {:?}", other),
    }

    let right = CircuitFile::from_container(store, &OpenOptions::new().population("right"))
        .expect("explicit population");
    assert_eq!(right.len(), 3);
    assert!(!right.has_orientations());
}

#[test]
fn positions_come_from_component_datasets() {
    let (_dir, circuit) = open_population(None);
    assert_eq!(
        circuit.positions(&Selector::indices(vec![4, 1])).expect("positions"),
        Selected::Many(vec![[4.0, 8.0, 12.0], [1.0, 2.0, 3.0]])
    );
}

#[test]
fn quaternion_components_are_read_as_x_y_z_w() {
    let (_dir, circuit) = open_population(None);
    assert!(circuit.has_orientations());
    let quaternion = circuit
        .orientations(&Selector::single(5))
        .expect("orientation")
        .one()
        .expect("single");
    assert_eq!(quaternion, [0.0, 0.0, 5.0 * 0.01, 1.0]);
}

#[test]
fn rotation_angles_become_quaternions() {
    let (_dir, circuit) = open_population(Some("truncated"));
    assert!(circuit.has_orientations());

    let rotations = circuit.orientations(&Selector::all()).expect("orientations").into_vec();
    assert_eq!(rotations.len(), SONATA_TRUNCATED_CELLS);
    for (component, expected) in rotations[0].iter().zip(TRUNCATED_ROTATION_0) {
        assert_close(*component, expected, "rotation of cell 0");
    }

    let half = truncated_y_angle(3) / 2.0;
    let [x, y, z, w] = rotations[3];
    assert_close(x, 0.0, "x");
    assert_close(y, half.sin(), "y");
    assert_close(z, 0.0, "z");
    assert_close(w, half.cos(), "w");
}

#[test]
fn emodels_strip_the_template_prefix() {
    let (_dir, circuit) = open_population(Some("truncated"));
    let emodels = circuit.emodels(&Selector::all()).expect("emodels").into_vec();
    assert_eq!(emodels[9], "dSTUT_321707905");
    assert_eq!(emodels[0], "cADpyr_e0");

    let combos = circuit.me_combos(&Selector::all()).expect("me_combos").into_vec();
    assert_eq!(combos[9], TRUNCATED_KEY_9);

    assert_eq!(strip_template_prefix("hoc:a:b".to_string()), "a:b");
    assert_eq!(strip_template_prefix("plain".to_string()), "plain");
}

#[test]
fn dynamics_parameters_are_plain_attributes() {
    let (_dir, circuit) = open_population(None);
    assert!(circuit.has_attribute("threshold_current"));
    assert!(circuit.has_currents());

    let threshold = circuit.threshold_currents(&Selector::single(3)).expect("threshold");
    assert_close(threshold.one().expect("single"), 0.3, "threshold[3]");
    let holding = circuit.holding_currents(&Selector::range(2, 1)).expect("holding").into_vec();
    assert_close(holding[0], -0.02, "holding[2]");

    assert!(!circuit.has_mini_frequencies());
    assert!(matches!(
        circuit.exc_mini_frequencies(&Selector::all()),
        Err(MvdError::AttributeNotFound(_))
    ));
}

#[test]
fn attribute_sets_differ_per_population() {
    let (_dir, default) = open_population(None);
    let (_dir2, truncated) = open_population(Some("truncated"));

    assert!(default.has_attribute("layer"));
    assert!(!truncated.has_attribute("layer"));
    assert!(matches!(
        truncated.layers(&Selector::all()),
        Err(MvdError::AttributeNotFound(_))
    ));
    assert!(!truncated.has_currents());
}

#[test]
fn enumerated_and_plain_string_attributes() {
    let (_dir, circuit) = open_population(None);

    assert_eq!(circuit.attribute_kind("mtype"), Some(AttributeKind::Enumerated));
    assert_eq!(
        circuit.attribute_kind("etype"),
        Some(AttributeKind::Scalar { dtype: DataType::Text, width: 1 })
    );

    assert_eq!(circuit.mtype_library().expect("mtype library"), vec!["L23_PC", "L5_TTPC"]);
    assert_eq!(circuit.raw_mtypes(&Selector::range(0, 3)).expect("raw"), Selected::Many(vec![0, 1, 0]));
    assert_eq!(
        circuit.etypes(&Selector::single(1)).expect("etype"),
        Selected::One("dSTUT".to_string())
    );

    assert!(matches!(circuit.raw_etypes(&Selector::all()), Err(MvdError::NotEnumerated(_))));
    assert_eq!(circuit.etype_library().expect("distinct etypes"), vec!["bAC", "dSTUT"]);
    assert_eq!(
        circuit.morphology_library().expect("distinct morphologies"),
        vec!["morph_0", "morph_1", "morph_2"]
    );
    assert_eq!(
        circuit.layers(&Selector::range(0, 2)).expect("layers").into_vec(),
        vec!["2", "5"]
    );
}

#[test]
fn sonata_files_have_no_circuit_seeds() {
    let (_dir, circuit) = open_population(None);
    assert!(matches!(circuit.circuit_seeds(), Err(MvdError::AttributeNotFound(_))));
}

#[test]
fn backend_reader_exposes_population_layout() {
    use mvd_reader::CircuitBackend;
    use mvd_reader::mvd::reader::SonataReader;
    use mvd_reader::mvd::reader::sonata::populations;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = sonata_file(dir.path());
    let reader = SonataReader::open(&path, Some("truncated")).expect("open backend");
    assert_eq!(reader.available_populations(), ["default", "truncated"]);
    assert_eq!(reader.group_path(), "nodes/truncated/0");
    assert_eq!(reader.len(), SONATA_TRUNCATED_CELLS);
    assert_eq!(reader.population(), Some("truncated"));

    assert_eq!(populations(&sonata_store()), vec!["default", "truncated"]);
    assert!(populations(&mvd3_store()).is_empty());
}
