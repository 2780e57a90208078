//! ACME contact email, stored as `ACME_EMAIL=<address>` in the proxy env file.

use std::io::ErrorKind;
use std::path::Path;

use srv_core::constants::ENV_ACME_EMAIL;
use srv_core::fsutil;

use crate::error::{io_err, ProxyError};

pub fn load_email(path: &Path) -> Result<Option<String>, ProxyError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    Ok(text.lines().find_map(|line| {
        let (key, value) = line.trim().split_once('=')?;
        if key.trim() != ENV_ACME_EMAIL {
            return None;
        }
        let value = value.trim().trim_matches('"').trim_matches('\'');
        (!value.is_empty()).then(|| value.to_string())
    }))
}

pub fn save_email(path: &Path, email: &str) -> Result<(), ProxyError> {
    let email = validate_email(email)?;
    fsutil::atomic_write(path, format!("{ENV_ACME_EMAIL}={email}\n")).map_err(|e| io_err(path, e))
}

pub fn validate_email(email: &str) -> Result<&str, ProxyError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ProxyError::InvalidEmail(email.to_string())),
    }
}
