//! Environment-variable configuration resolution.
//!
//! Runs as its own process, so mutating `COMFYUI_*` variables here
//! cannot race with the library's unit tests. All assertions share one
//! test function because integration tests within a binary still run on
//! parallel threads.

use comfykit::{Config, ExecutorKind};

#[test]
fn explicit_values_beat_environment_beat_defaults() {
    std::env::set_var("COMFYUI_BASE_URL", "http://env-host:8188");
    std::env::set_var("COMFYUI_EXECUTOR", "websocket");
    std::env::set_var("COMFYUI_API_KEY", "env-token");

    // Environment fills in everything the builder leaves unset.
    let from_env = Config::builder().build();
    assert_eq!(from_env.comfyui_url, "http://env-host:8188");
    assert_eq!(from_env.executor, ExecutorKind::WebSocket);
    assert_eq!(from_env.api_key.as_deref(), Some("env-token"));

    // An explicit value wins over the environment.
    let explicit = Config::builder()
        .comfyui_url("http://param-host:8188")
        .executor(ExecutorKind::Http)
        .build();
    assert_eq!(explicit.comfyui_url, "http://param-host:8188");
    assert_eq!(explicit.executor, ExecutorKind::Http);
    // Fields the builder left unset still come from the environment.
    assert_eq!(explicit.api_key.as_deref(), Some("env-token"));

    std::env::remove_var("COMFYUI_BASE_URL");
    std::env::remove_var("COMFYUI_EXECUTOR");
    std::env::remove_var("COMFYUI_API_KEY");

    // With the environment cleared, defaults apply.
    let defaults = Config::builder().build();
    assert_eq!(defaults.comfyui_url, "http://127.0.0.1:8188");
    assert_eq!(defaults.executor, ExecutorKind::Http);
    assert!(defaults.api_key.is_none());
}
