use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn cli() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gdrive-path"));
    cmd.env_remove("GDRIVE_PATH_TOKEN");
    cmd
}

#[test]
fn test_help_lists_commands() -> anyhow::Result<()> {
    let output = cli().arg("--help").output()?;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["stat", "ls", "mkdir", "mv", "put", "get", "touch", "sync"] {
        assert!(stdout.contains(command), "missing {command} in:\n{stdout}");
    }

    Ok(())
}

#[test]
fn test_missing_token_file_is_reported() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let token_file = temp_dir.path().join("token");

    let output = cli()
        .args(["stat", "/", "--token-file", token_file.to_str().unwrap()])
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No access token found"), "stderr: {stderr}");

    Ok(())
}

#[test]
fn test_empty_token_file_is_rejected() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let token_file = temp_dir.path().join("token");
    fs::write(&token_file, "\n")?;

    let output = cli()
        .args(["ls", "--token-file", token_file.to_str().unwrap()])
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("is empty"), "stderr: {stderr}");

    Ok(())
}

#[test]
fn test_touch_rejects_bad_date_before_any_request() -> anyhow::Result<()> {
    let output = cli()
        .args(["touch", "notes.txt", "--date", "yesterday", "--token", "not-a-real-token"])
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid date"), "stderr: {stderr}");

    Ok(())
}
