//! Integration tests for the `kasane` binary using `assert_cmd`.

use std::fs;

use anyhow::{Context, Result, ensure};
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const MANIFEST: &str = "tests/data/app.yml";

fn kasane() -> Result<Command> {
    Command::cargo_bin("kasane").context("locate kasane binary")
}

#[test]
fn targets_lists_declared_targets() -> Result<()> {
    kasane()?
        .args(["-f", MANIFEST, "targets"])
        .assert()
        .success()
        .stdout("//app:main\tcxx_binary\n//app:lib\tcxx_library\n//app:dep\tcxx_library\n");
    Ok(())
}

#[test]
fn derive_prints_rules_as_json() -> Result<()> {
    let output = kasane()?
        .args(["-f", MANIFEST, "derive", "//app:lib", "--stage", "capture-all"])
        .output()
        .context("run kasane derive")?;
    ensure!(output.status.success(), "derive should succeed");
    let rules: serde_json::Value =
        serde_json::from_slice(&output.stdout).context("derive output is JSON")?;
    let entries = rules.as_array().context("derive prints an array")?;
    let root = entries
        .iter()
        .find(|rule| rule["kind"] == "infer_capture_transitive")
        .context("flattened capture rule present")?;
    ensure!(
        root["target"] == "//app:lib#infer-capture-all",
        "unexpected root {root}"
    );
    ensure!(
        entries.iter().all(|rule| rule["kind"] != "infer_analyze"),
        "capture-all must not analyse"
    );
    Ok(())
}

#[test]
fn link_prints_archives_in_dependency_order() -> Result<()> {
    let output = kasane()?
        .args(["-f", MANIFEST, "link", "//app:main"])
        .output()
        .context("run kasane link")?;
    ensure!(output.status.success(), "link should succeed");
    let stdout = String::from_utf8(output.stdout)?;
    let lib = stdout.find("liblib.a").context("library archive listed")?;
    let flag = stdout.find("-lz").context("exported flag listed")?;
    let dep = stdout.find("libdep.a").context("dependency archive listed")?;
    ensure!(lib < flag && flag < dep, "unexpected order: {stdout}");
    Ok(())
}

#[test]
fn directory_option_locates_the_manifest() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    fs::copy(MANIFEST, temp.path().join("kasane.yml")).context("copy manifest")?;
    kasane()?
        .arg("-C")
        .arg(temp.path())
        .arg("headers")
        .arg("//app:main")
        .assert()
        .success()
        .stdout(predicate::str::contains("app/lib#headers,linux"));
    Ok(())
}

#[test]
fn undeclared_target_fails() -> Result<()> {
    kasane()?
        .args(["-f", MANIFEST, "derive", "//app:missing", "--stage", "report"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("//app:missing"));
    Ok(())
}

#[test]
fn missing_manifest_fails() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    kasane()?
        .current_dir(temp.path())
        .arg("targets")
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading manifest"));
    Ok(())
}

#[test]
fn malformed_target_is_a_usage_error() -> Result<()> {
    kasane()?
        .args(["-f", MANIFEST, "derive", "app:lib"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must start with `//`"));
    Ok(())
}
