use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

fn combined_output(output: &std::process::Output) -> String {
    format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn help_documents_the_pipeline_flags() {
    let output = Command::new(assert_cmd::cargo::cargo_bin!("stillcast"))
        .arg("--help")
        .output()
        .expect("--help runs");

    assert!(output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("--resolution"),
        "help text missing --resolution: {text}"
    );
    assert!(
        text.contains("--container"),
        "help text missing --container: {text}"
    );
    assert!(
        text.contains("--workers"),
        "help text missing --workers: {text}"
    );
    assert!(
        text.contains("--progress"),
        "help text missing --progress: {text}"
    );
}

#[test]
fn malformed_resolution_is_rejected_before_any_work() {
    let tmp = TempDir::new().expect("tempdir");

    for bad in ["1920", "axb", "0x1080", "1920x"] {
        let output = Command::new(assert_cmd::cargo::cargo_bin!("stillcast"))
            .arg(tmp.path())
            .arg("--resolution")
            .arg(bad)
            .output()
            .expect("run");
        assert!(
            !output.status.success(),
            "resolution {bad:?} was accepted: {}",
            combined_output(&output)
        );
    }
}

#[test]
fn missing_root_directory_fails() {
    let tmp = TempDir::new().expect("tempdir");
    let missing = tmp.path().join("does-not-exist");

    let output = Command::new(assert_cmd::cargo::cargo_bin!("stillcast"))
        .arg(&missing)
        .output()
        .expect("run");

    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("not an existing directory"),
        "unexpected error text: {text}"
    );
}

#[test]
fn root_that_is_a_file_fails() {
    let tmp = TempDir::new().expect("tempdir");
    let file = tmp.path().join("plain.txt");
    fs::write(&file, b"x").expect("write");

    let output = Command::new(assert_cmd::cargo::cargo_bin!("stillcast"))
        .arg(&file)
        .output()
        .expect("run");
    assert!(!output.status.success());
}

#[test]
fn empty_tree_reports_no_images_and_exits_cleanly() {
    let tmp = TempDir::new().expect("tempdir");
    fs::create_dir(tmp.path().join("empty-sub")).expect("mkdir");
    fs::write(tmp.path().join("readme.txt"), b"no images here").expect("write");

    // No output path given, so this must work even without ffmpeg installed.
    let output = Command::new(assert_cmd::cargo::cargo_bin!("stillcast"))
        .arg(tmp.path())
        .arg("--progress")
        .arg("plain")
        .output()
        .expect("run");

    assert!(output.status.success(), "{}", combined_output(&output));
    let text = combined_output(&output);
    assert!(text.contains("no images found"), "missing outcome: {text}");
}

#[test]
fn omitted_output_path_cancels_without_writing() {
    let tmp = TempDir::new().expect("tempdir");
    fs::write(tmp.path().join("a.png"), b"placeholder").expect("write");

    let output = Command::new(assert_cmd::cargo::cargo_bin!("stillcast"))
        .arg(tmp.path())
        .arg("--progress")
        .arg("quiet")
        .output()
        .expect("run");

    assert!(output.status.success(), "{}", combined_output(&output));
    let text = combined_output(&output);
    assert!(
        text.contains("cancelled, nothing written"),
        "missing cancellation notice: {text}"
    );

    // Nothing video-like may appear next to the inputs.
    let leftovers: Vec<_> = fs::read_dir(tmp.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n != "a.png")
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
}

#[test]
fn plain_progress_lines_carry_scan_counters() {
    let tmp = TempDir::new().expect("tempdir");
    fs::create_dir(tmp.path().join("sub")).expect("mkdir");
    fs::write(tmp.path().join("sub/one.png"), b"placeholder").expect("write");

    let output = Command::new(assert_cmd::cargo::cargo_bin!("stillcast"))
        .arg(tmp.path())
        .arg("--progress")
        .arg("plain")
        .output()
        .expect("run");

    assert!(output.status.success(), "{}", combined_output(&output));
    let text = combined_output(&output);
    assert!(
        text.contains("[PROGRESS] convert"),
        "missing plain progress: {text}"
    );
    assert!(text.contains("folders="), "missing counters: {text}");
}
