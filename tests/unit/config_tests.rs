use std::time::Duration;

use session_worker::{config::GlobalConfig, AppError};

fn full_toml(root: &str) -> String {
    format!(
        r#"
workspace_root = '{root}/workspaces'
storage_root = '{root}/storage'
log_dir = '{root}/logs'
http_port = 9090

[agent]
host_cli = "claude"
host_cli_args = ["--print", "--output-format", "stream-json"]
resume_flag = "--resume"
timeout_seconds = 600

[agent.credential_env]
anthropic = "ANTHROPIC_API_KEY"
bedrock = "AWS_BEARER_TOKEN_BEDROCK"

[repository]
token_hosts = ["github.com", "gitlab.example.com"]
branch_prefix = "bot/"
author_name = "Bot"
author_email = "bot@example.com"

[commit]
fallback_message = "Automated changes"
max_diff_chars = 500

[summarizer]
model = "claude-haiku"

[remote_sink]
base_url = "https://sink.example.com"
drain_timeout_seconds = 5
"#
    )
}

fn minimal_toml(root: &str) -> String {
    format!(
        r#"
workspace_root = '{root}/workspaces'
storage_root = '{root}/storage'

[agent]
host_cli = "claude"
"#
    )
}

#[test]
fn parses_full_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let config = GlobalConfig::from_toml_str(&full_toml(root)).expect("config parses");

    assert_eq!(config.http_port, 9090);
    assert_eq!(config.agent.host_cli_args.len(), 3);
    assert_eq!(
        config.agent.credential_env.get("bedrock").map(String::as_str),
        Some("AWS_BEARER_TOKEN_BEDROCK")
    );
    assert_eq!(config.agent.timeout(), Some(Duration::from_secs(600)));
    assert_eq!(config.repository.branch_prefix, "bot/");
    assert_eq!(config.repository.git_binary, "git");
    assert_eq!(config.commit.max_diff_chars, 500);
    assert_eq!(config.log_dir(), temp.path().join("logs"));

    let summarizer = config.summarizer.expect("summarizer section");
    assert_eq!(summarizer.model, "claude-haiku");
    assert!(summarizer.endpoint.starts_with("https://"));
    assert!(summarizer.api_key.is_empty(), "key is loaded at runtime");

    let sink = config.remote_sink.expect("remote sink section");
    assert_eq!(sink.drain_timeout_seconds, 5);
    assert_eq!(sink.request_timeout_seconds, 10);
}

#[test]
fn minimal_config_uses_defaults() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let config = GlobalConfig::from_toml_str(&minimal_toml(root)).expect("config parses");

    assert_eq!(config.http_port, 8080);
    assert_eq!(config.agent.resume_flag, "--resume");
    assert!(config.agent.credential_env.contains_key("anthropic"));
    assert_eq!(config.agent.timeout(), None);
    assert!(config
        .repository
        .token_hosts
        .iter()
        .any(|h| h == "github.com"));
    assert!(!config.commit.fallback_message.is_empty());
    assert!(config.summarizer.is_none());
    assert!(config.remote_sink.is_none());
    assert_eq!(config.log_dir(), config.storage_root.join("logs"));
}

#[test]
fn roots_are_created_and_canonicalized() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let config = GlobalConfig::from_toml_str(&minimal_toml(root)).expect("config parses");

    assert!(config.workspace_root.is_dir());
    assert!(config.storage_root.is_dir());
    assert!(config.workspace_root.is_absolute());
}

#[test]
fn empty_host_cli_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let toml = minimal_toml(root).replace("host_cli = \"claude\"", "host_cli = \"  \"");

    let err = GlobalConfig::from_toml_str(&toml).expect_err("should fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("host_cli")));
}

#[test]
fn empty_fallback_message_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let toml = format!("{}\n[commit]\nfallback_message = \"\"\n", minimal_toml(root));

    let err = GlobalConfig::from_toml_str(&toml).expect_err("should fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("fallback_message")));
}

#[test]
fn empty_remote_sink_url_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let toml = format!("{}\n[remote_sink]\nbase_url = \"\"\n", minimal_toml(root));

    let err = GlobalConfig::from_toml_str(&toml).expect_err("should fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("base_url")));
}

#[test]
fn missing_agent_section_is_a_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let toml = format!("workspace_root = '{root}/w'\nstorage_root = '{root}/s'\n");

    let err = GlobalConfig::from_toml_str(&toml).expect_err("should fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_missing_path_fails() {
    let err = GlobalConfig::load_from_path("/nonexistent/session-worker.toml")
        .expect_err("should fail");
    assert!(err.to_string().starts_with("config: failed to read config"));
}
