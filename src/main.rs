use std::env;

use mvd_reader::mvd::format::legacy;
use mvd_reader::mvd::reader::Backend;
use mvd_reader::{CircuitFile, ContainerWriter, OpenOptions, Selector, Value};

const SAMPLE_ROWS: usize = 5;

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <circuit-file> [--population <NAME>] [--combo <TSV>]", program);
    eprintln!("       {} convert <input.mvd2> <output>", program);
    std::process::exit(1);
}

/// Value following `flag`, exiting if the flag is present without one.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let index = args.iter().position(|arg| arg == flag)?;
    match args.get(index + 1) {
        Some(value) => Some(value),
        None => {
            eprintln!("ERROR: {} flag requires an argument.", flag);
            std::process::exit(1);
        }
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        usage(&args[0]);
    }

    if args[1] == "convert" {
        if args.len() != 4 {
            usage(&args[0]);
        }
        convert(&args[2], &args[3]);
        return;
    }

    let circuit_path = &args[1];
    let mut options = OpenOptions::new();
    if let Some(population) = flag_value(&args, "--population") {
        options = options.population(population);
    }
    if let Some(combo) = flag_value(&args, "--combo") {
        options = options.combo_table(combo);
    }

    println!("Reading circuit file: {}", circuit_path);
    println!("{}", "=".repeat(60));

    let circuit = match CircuitFile::open_with(circuit_path, &options) {
        Ok(circuit) => circuit,
        Err(e) => {
            eprintln!("\nERROR: Failed to read circuit file");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("\nCircuit Information:");
    println!("  Format: {}", circuit.format());
    if let Some(population) = circuit.population() {
        println!("  Population: {}", population);
    }
    if let Backend::Sonata(reader) = circuit.backend() {
        println!("  Available populations: {}", reader.available_populations().join(", "));
        println!("  Attribute group: {}", reader.group_path());
    }
    println!("  Cells: {}", circuit.len());
    println!("  Orientations: {}", if circuit.has_orientations() { "yes" } else { "no" });
    println!("  Currents: {}", if circuit.has_currents() { "yes" } else { "no" });
    println!("  Mini frequencies: {}", if circuit.has_mini_frequencies() { "yes" } else { "no" });
    if let Ok(seeds) = circuit.circuit_seeds() {
        println!("  Seeds: {:?}", seeds);
    }

    println!("\nAttributes:");
    for name in circuit.attribute_names() {
        if let Some(kind) = circuit.attribute_kind(&name) {
            println!("  {:<24} {:?}", name, kind);
        }
    }

    let shown = SAMPLE_ROWS.min(circuit.len());
    let sample = Selector::range(0, shown);
    println!("\nSample Cells (first {}):", shown);
    match circuit.positions(&sample) {
        Ok(positions) => {
            for (i, position) in positions.into_vec().iter().enumerate() {
                println!("  {}. position {:?}", i, position);
            }
        }
        Err(e) => eprintln!("  positions: {}", e),
    }
    for name in circuit.attribute_names() {
        match circuit.attribute(&name, &sample) {
            Ok(values) => {
                let rendered: Vec<String> = values.into_vec().iter().map(Value::to_string).collect();
                println!("  {}: {}", name, rendered.join(", "));
            }
            Err(e) => eprintln!("  {}: {}", name, e),
        }
    }
    if circuit.combo_table().is_some() {
        match circuit.emodels(&sample) {
            Ok(emodels) => println!("  emodel (joined): {}", emodels.into_vec().join(", ")),
            Err(e) => eprintln!("  emodel (joined): {}", e),
        }
    }
}

fn convert(input: &str, output: &str) {
    println!("Converting {} -> {}", input, output);
    let result = legacy::to_container(input)
        .and_then(|store| ContainerWriter::new(&store).write(output).map(|()| store.len()));
    match result {
        Ok(datasets) => println!("Wrote {} datasets.", datasets),
        Err(e) => {
            eprintln!("\nERROR: Conversion failed");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
