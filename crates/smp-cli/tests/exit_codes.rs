//! Exit codes of whole invocations that end before a device is reached.

use smp_cli::{run, ExitCode};

async fn exit_code(words: &[&str]) -> ExitCode {
    run(std::iter::once("smpmgmt").chain(words.iter().copied())).await
}

#[tokio::test]
async fn test_help_and_version() {
    assert_eq!(exit_code(&["--help"]).await, ExitCode::Success);
    assert_eq!(exit_code(&["--version"]).await, ExitCode::Success);
}

#[tokio::test]
async fn test_argument_errors() {
    assert_eq!(exit_code(&[]).await, ExitCode::MissingRequiredArguments);
    assert_eq!(exit_code(&["--frobnicate"]).await, ExitCode::UnknownArguments);
    assert_eq!(
        exit_code(&["--transport", "can", "--group", "os", "--command", "echo"]).await,
        ExitCode::InvalidTransport
    );
    assert_eq!(
        exit_code(&[
            "--transport", "uart", "--port", "COM1", "--mtu", "20", "--group", "os", "--command",
            "tasks"
        ])
        .await,
        ExitCode::NumericOutOfRange
    );
}

#[tokio::test]
async fn test_unavailable_transport() {
    assert_eq!(
        exit_code(&[
            "--transport", "lorawan", "--host", "mqtt.example", "--topic", "v3/dev", "--group",
            "os", "--command", "tasks"
        ])
        .await,
        ExitCode::TransportOpenFailed
    );
}

#[tokio::test]
async fn test_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.yaml");
    std::fs::write(&bad, "mtu: [1, 2]\n").unwrap();
    let bad = bad.to_string_lossy().into_owned();
    assert_eq!(
        exit_code(&["--config", bad.as_str(), "--group", "os", "--command", "tasks"]).await,
        ExitCode::InvalidArgumentValue
    );

    let small_mtu = dir.path().join("small.yaml");
    std::fs::write(&small_mtu, "mtu: 64\n").unwrap();
    let small_mtu = small_mtu.to_string_lossy().into_owned();
    assert_eq!(
        exit_code(&[
            "--config",
            small_mtu.as_str(),
            "--transport",
            "bt",
            "--name",
            "dev",
            "--group",
            "os",
            "--command",
            "tasks"
        ])
        .await,
        ExitCode::NumericOutOfRange
    );
}
