//! Local ComfyUI backend.
//!
//! Wraps the ComfyUI HTTP API and WebSocket event stream behind the
//! [`WorkflowExecutor`](comfykit_core::WorkflowExecutor) contract.
//! [`HttpExecutor`] submits then polls the history endpoint;
//! [`WebSocketExecutor`] submits then consumes progress events over a
//! persistent connection.

pub mod api;
pub mod http_executor;
pub mod messages;
pub mod outputs;
pub mod ws_executor;

pub use api::{ComfyUIApi, HistoryEntry};
pub use http_executor::HttpExecutor;
pub use outputs::bundle_from_outputs;
pub use ws_executor::WebSocketExecutor;
