use std::fs;
use std::process::Command;

use markov_cohort::params::ModelInputs;
use tempfile::tempdir;

#[test]
fn written_config_drives_a_simulation_with_survival_csv() {
    let tmp = tempdir().expect("temporary directory");
    let config_path = tmp.path().join("inputs.toml");
    let csv_path = tmp.path().join("survival.csv");

    let exe = env!("CARGO_BIN_EXE_markov-cohort");
    let status = Command::new(exe)
        .current_dir(tmp.path())
        .args(["write-config", config_path.to_str().expect("path str")])
        .status()
        .expect("run markov-cohort cli");
    assert!(status.success(), "write-config exited with status {status:?}");
    let written = ModelInputs::load(&config_path).expect("written config loads");
    assert_eq!(written, ModelInputs::default());

    let output = Command::new(exe)
        .current_dir(tmp.path())
        .args([
            "simulate",
            "--config",
            config_path.to_str().expect("path str"),
            "--population",
            "200",
            "--therapy",
            "combo",
            "--survival-csv",
            csv_path.to_str().expect("path str"),
        ])
        .output()
        .expect("run markov-cohort cli");
    assert!(output.status.success(), "simulate failed: {output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Patient survival time"), "{stdout}");
    assert!(stdout.contains("200 patients"), "{stdout}");
    assert!(stdout.contains("combination therapy"), "{stdout}");
    assert!(stdout.contains("Alive at the end of the horizon"), "{stdout}");

    let csv = fs::read_to_string(&csv_path).expect("survival csv");
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("time,alive"));
    assert_eq!(lines.next(), Some("0,200"));
}

#[test]
fn invalid_population_exits_with_an_error() {
    let exe = env!("CARGO_BIN_EXE_markov-cohort");
    let output = Command::new(exe)
        .args(["simulate", "--population", "0"])
        .output()
        .expect("run markov-cohort cli");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "{stderr}");
}
