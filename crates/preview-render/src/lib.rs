//! Downloader, uploader, temporary-file registry, the per-kind render
//! agents, and the render-agent manager that dispatches work between them.
//!
//! This crate has no HTTP types of its own; a process wiring layer
//! (`preview-daemon`) constructs the repositories from `preview-storage`,
//! builds a [`manager::RenderAgentManager`], registers one or more agents
//! per renderer kind, and runs the result to completion.

mod document_agent;
mod downloader;
mod error;
mod hashring;
mod image_agent;
mod manager;
mod process;
mod status;
mod tempfile_registry;
mod uploader;

pub use document_agent::{DerivedWorkSink, DocumentRenderAgent};
pub use downloader::{DefaultDownloader, Downloader};
pub use error::{Error, Result};
pub use image_agent::ImageRenderAgent;
pub use manager::{PoolSnapshot, RenderAgent, RenderAgentManager};
pub use process::tool_on_path;
pub use status::{RenderStatus, WorkChannelReceiver, WorkChannelSender, STATUS_CHANNEL_CAPACITY, WORK_CHANNEL_CAPACITY};
pub use tempfile_registry::{TemporaryFile, TemporaryFileRegistry};
pub use uploader::{LocalUploader, ObjectStoreUploader, Uploader};
