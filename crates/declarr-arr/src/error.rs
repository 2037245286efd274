// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArrError>;

#[derive(Debug, Error)]
pub enum ArrError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),

    #[error("API key rejected")]
    Unauthorized,

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("service responded with status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("invalid response from service: {0}")]
    InvalidResponse(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}
