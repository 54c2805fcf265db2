use std::{fs, process::Command};

#[test]
fn bundled_level_runs_and_persists_the_ledger() {
    let dir = std::env::temp_dir().join(format!("cafe-defence-cli-{}", std::process::id()));
    let ledger = dir.join("ledger.toml");
    let _ = fs::remove_file(&ledger);

    let output = Command::new(env!("CARGO_BIN_EXE_cafe-defence"))
        .args(["--max-seconds", "20", "--starting-coins", "120", "--turret", "sniper@6,0"])
        .arg("--ledger")
        .arg(&ledger)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run the cafe-defence binary");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("outcome:"), "{stdout}");
    assert!(stdout.contains("simulated:     20.0s"), "{stdout}");

    let persisted = fs::read_to_string(&ledger).expect("ledger written on suspend");
    assert!(persisted.contains("[balances]"), "{persisted}");
    let _ = fs::remove_dir_all(dir);
}
