// Copyright (c) 2024-2026 Nervosys LLC
// SPDX-License-Identifier: Apache-2.0
//! Error types for cachesync

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid sync configuration: {0}")]
    Config(String),

    #[error("Resource not registered: {0}")]
    ResourceNotRegistered(String),

    #[error("Record for resource '{resource}' is missing primary key field '{field}'")]
    MissingPrimaryKey { resource: String, field: String },

    #[error("Remote data source error: {0}")]
    Network(String),

    #[error("Record not found on remote: {resource}/{id}")]
    RemoteRecordNotFound { resource: String, id: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
