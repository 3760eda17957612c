use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_labcalc(working_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_labcalc"))
        .current_dir(working_dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("labcalc should run")
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent directory should be created");
    }
    fs::write(path, content).expect("file should be written");
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn dilute_prints_volumes_and_exports_protocol_csv() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_labcalc(
        temp.path(),
        &[
            "dilute",
            "--stock",
            "1",
            "--stock-unit",
            "M",
            "--target",
            "10",
            "--target-unit",
            "mM",
            "--volume",
            "1",
            "--volume-unit",
            "L",
            "--reagent",
            "NaCl",
            "--csv-dir",
            "out",
        ],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Dilution factor: 100.00"), "stdout: {text}");
    assert!(text.contains("Stock volume: 10,000.00 µL"), "stdout: {text}");
    assert!(text.contains("Diluent volume: 990,000.00 µL"), "stdout: {text}");

    let csv_path = temp.path().join("out/dilution_calculation_NaCl.csv");
    let csv = fs::read_to_string(&csv_path).expect("protocol csv should exist");
    assert!(csv.starts_with("Task,Action,Source,Destination\n"), "csv: {csv}");
    assert!(csv.contains("Final Dilution"), "csv: {csv}");
}

#[test]
fn dilute_with_reversed_concentrations_exits_with_input_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_labcalc(
        temp.path(),
        &[
            "dilute",
            "--stock",
            "1",
            "--stock-unit",
            "mM",
            "--target",
            "1",
            "--target-unit",
            "M",
            "--volume",
            "1",
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    assert!(
        stderr(&output).contains("ERROR: [INPUT.CONCENTRATION_ORDER]"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn mass_stock_without_molecular_weight_is_rejected() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_labcalc(
        temp.path(),
        &[
            "dilute",
            "--stock",
            "10",
            "--stock-unit",
            "mg/mL",
            "--target",
            "1",
            "--target-unit",
            "mM",
            "--volume",
            "1",
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("[INPUT.MISSING_MW]"));
}

#[test]
fn stored_reagent_supplies_the_molecular_weight() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_file(
        &temp.path().join("reagents.json"),
        r#"{ "NaCl": { "mw": 58.44, "manufacturer": "Sigma" } }"#,
    );

    let output = run_labcalc(
        temp.path(),
        &[
            "dilute",
            "--stock",
            "58.44",
            "--stock-unit",
            "g/L",
            "--target",
            "10",
            "--target-unit",
            "mM",
            "--volume",
            "1",
            "--volume-unit",
            "L",
            "--reagent",
            "NaCl",
            "--json",
        ],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let parsed: Value = serde_json::from_str(&stdout(&output)).expect("stdout should be JSON");
    let factor = parsed["dilution_factor"].as_f64().expect("dilution factor");
    assert!((factor - 100.0).abs() < 1e-9);
    assert_eq!(parsed["reagent_name"], "NaCl");
}

#[test]
fn serial_writes_protocol_and_summary_csv() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_labcalc(
        temp.path(),
        &[
            "serial",
            "--stock",
            "10",
            "--stock-unit",
            "uM",
            "--factor",
            "10",
            "--tubes",
            "3",
            "--volume",
            "1000",
            "--reagent",
            "Compound X",
            "--csv-dir",
            "out",
        ],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Transfer volume: 111.11 µL"), "stdout: {text}");

    let summary = fs::read_to_string(temp.path().join("out/serial_dilution_Compound_X.csv"))
        .expect("summary csv should exist");
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(
        lines[0],
        "Tube #,Final Concentration (Raw),Final Concentration (Formatted)"
    );
    assert_eq!(lines[1], "1,1 µM,1 µM");
    assert_eq!(lines[3], "3,0.01 µM,10 nM");
    assert!(
        temp.path()
            .join("out/serial_dilution_protocol_Compound_X.csv")
            .exists()
    );
}

#[test]
fn serial_rejects_factor_of_one() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_labcalc(
        temp.path(),
        &["serial", "--stock", "10", "--factor", "1", "--tubes", "3"],
    );

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("[INPUT.INVALID_PARAMETER]"));
}

#[test]
fn ic50_json_lists_points_across_ranges() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_labcalc(
        temp.path(),
        &[
            "ic50",
            "--main-stock",
            "10",
            "--main-stock-unit",
            "mM",
            "--highest",
            "10",
            "--highest-unit",
            "µM",
            "--upper-points",
            "2",
            "--dense-points",
            "3",
            "--lower-points",
            "0",
            "--json",
        ],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let parsed: Value = serde_json::from_str(&stdout(&output)).expect("stdout should be JSON");
    let points = parsed["points"].as_array().expect("points array");
    let formatted: Vec<&str> = points
        .iter()
        .map(|point| point["formatted"].as_str().expect("formatted"))
        .collect();
    assert_eq!(formatted, vec!["10 µM", "1 µM", "100 nM", "50 nM", "25 nM"]);
    assert_eq!(parsed["ranges"].as_array().map(Vec::len), Some(2));
}

#[test]
fn ic50_summary_csv_is_named_after_the_reagent() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_labcalc(
        temp.path(),
        &[
            "ic50",
            "--main-stock",
            "10",
            "--highest",
            "100",
            "--reagent",
            "Drug",
            "--csv-dir",
            "out",
        ],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let summary = fs::read_to_string(temp.path().join("out/IC50_protocol_summary_Drug.csv"))
        .expect("summary csv should exist");
    assert!(summary.starts_with("Point #,Range,Final Concentration\n"));
    assert_eq!(summary.lines().count(), 11);
}

#[test]
fn policy_file_changes_the_two_stage_threshold() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_file(
        &temp.path().join("policy.json"),
        r#"{ "twoStageThreshold": 1000 }"#,
    );
    let args = [
        "dilute", "--stock", "10", "--stock-unit", "mM", "--target", "20", "--target-unit", "µM",
        "--volume", "1", "--json",
    ];

    let default_run = run_labcalc(temp.path(), &args);
    assert!(default_run.status.success(), "stderr: {}", stderr(&default_run));
    let parsed: Value = serde_json::from_str(&stdout(&default_run)).expect("JSON");
    assert_eq!(parsed["plan"]["kind"], "two_stage", "plan: {}", parsed["plan"]);

    let mut with_policy = args.to_vec();
    with_policy.extend(["--policy", "policy.json"]);
    let policy_run = run_labcalc(temp.path(), &with_policy);
    assert!(policy_run.status.success(), "stderr: {}", stderr(&policy_run));
    let parsed: Value = serde_json::from_str(&stdout(&policy_run)).expect("JSON");
    assert_eq!(parsed["plan"]["kind"], "direct");
}

#[test]
fn box_behnken_exports_size_named_csv() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_labcalc(
        temp.path(),
        &[
            "doe",
            "box-behnken",
            "--factors",
            "3",
            "--center-points",
            "3",
            "--csv-dir",
            "out",
        ],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("15 runs"));
    let csv = fs::read_to_string(temp.path().join("out/BBD_3factors_15runs.csv"))
        .expect("design csv should exist");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "Run,A,B,C");
    assert_eq!(lines[1], "1,-1,-1,0");
    assert_eq!(lines.len(), 16);
}

#[test]
fn factorial_exports_combinations() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_labcalc(
        temp.path(),
        &[
            "doe",
            "factorial",
            "--levels",
            "low,high",
            "--levels",
            "1,2,3",
            "--csv-dir",
            ".",
        ],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let csv = fs::read_to_string(temp.path().join("combinations_data.csv"))
        .expect("combinations csv should exist");
    assert_eq!(csv.lines().next(), Some("A,B"));
    assert_eq!(csv.lines().count(), 7);
}

#[test]
fn reagent_lifecycle_round_trips_through_the_store_file() {
    let temp = TempDir::new().expect("tempdir should be created");

    let added = run_labcalc(
        temp.path(),
        &[
            "reagents", "add", "Tris", "--mw", "121.14", "--manufacturer", "Sigma", "--field",
            "cas=77-86-1",
        ],
    );
    assert!(added.status.success(), "stderr: {}", stderr(&added));

    let duplicate = run_labcalc(temp.path(), &["reagents", "add", "Tris", "--mw", "121.14"]);
    assert_eq!(duplicate.status.code(), Some(2));
    assert!(stderr(&duplicate).contains("[INPUT.DUPLICATE_REAGENT]"));

    let edited = run_labcalc(temp.path(), &["reagents", "edit", "Tris", "--mw", "121.1"]);
    assert!(edited.status.success(), "stderr: {}", stderr(&edited));

    let store: Value = serde_json::from_str(
        &fs::read_to_string(temp.path().join("reagents.json")).expect("store should exist"),
    )
    .expect("store should be JSON");
    assert_eq!(store["Tris"]["mw"], 121.1);
    assert_eq!(store["Tris"]["manufacturer"], "Sigma");
    assert_eq!(store["Tris"]["cas"], "77-86-1");

    let listed = run_labcalc(temp.path(), &["reagents", "list", "--csv-dir", "."]);
    assert!(listed.status.success(), "stderr: {}", stderr(&listed));
    assert!(stdout(&listed).contains("Tris"));
    assert!(temp.path().join("reagent_list.csv").exists());

    let deleted = run_labcalc(temp.path(), &["reagents", "delete", "Tris"]);
    assert!(deleted.status.success(), "stderr: {}", stderr(&deleted));
    let missing = run_labcalc(temp.path(), &["reagents", "delete", "Tris"]);
    assert_eq!(missing.status.code(), Some(2));
    assert!(stderr(&missing).contains("[INPUT.UNKNOWN_REAGENT]"));
}

#[test]
fn reagent_list_json_keeps_reagent_names() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_file(
        &temp.path().join("reagents.json"),
        r#"{"NaCl": {"mw": 58.44, "manufacturer": "Sigma"}, "Tris": {"mw": 121.14}}"#,
    );

    let output = run_labcalc(temp.path(), &["reagents", "list", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let parsed: Value = serde_json::from_str(&stdout(&output)).expect("stdout should be JSON");
    let reagents = parsed["reagents"].as_object().expect("reagents keyed by name");
    let names: Vec<&str> = reagents.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["NaCl", "Tris"]);
    assert_eq!(reagents["NaCl"]["mw"], 58.44);
    assert_eq!(reagents["NaCl"]["manufacturer"], "Sigma");
}

#[test]
fn malformed_store_is_an_io_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    write_file(&temp.path().join("reagents.json"), "{ broken");

    let output = run_labcalc(temp.path(), &["reagents", "list"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("[IO.REAGENT_STORE]"));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_labcalc(temp.path(), &["titrate"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("[INPUT.CLI_USAGE]"));
}

#[test]
fn units_lists_every_table() {
    let temp = TempDir::new().expect("tempdir should be created");
    let output = run_labcalc(temp.path(), &["units", "--json"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let parsed: Value = serde_json::from_str(&stdout(&output)).expect("stdout should be JSON");
    assert!(
        parsed["solvent"]
            .as_array()
            .is_some_and(|solvents| solvents.iter().any(|s| s == "DMSO"))
    );
    assert_eq!(parsed.as_object().map(|map| map.len()), Some(4));
}
