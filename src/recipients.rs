use crate::error::IntegrityError;
use crate::models::{NotificationConfig, UserDirectory};

/// Resolves a host's mail notification config into delivery addresses.
///
/// A missing config, or one without mail users, resolves to nothing. Every
/// configured user must exist in `directory`.
pub fn resolve(
    host_id: &str,
    config: Option<&NotificationConfig>,
    directory: &UserDirectory,
) -> Result<Vec<String>, IntegrityError> {
    match config {
        Some(config) => resolve_identifiers(host_id, config.mail_users(), directory),
        None => Ok(Vec::new()),
    }
}

// Addresses are collected in encounter order. Duplicates reached through
// different users are kept.
fn resolve_identifiers(
    host_id: &str,
    identifiers: &[String],
    directory: &UserDirectory,
) -> Result<Vec<String>, IntegrityError> {
    let mut addresses = Vec::new();

    for identifier in identifiers {
        let user = directory
            .get(identifier)
            .ok_or_else(|| IntegrityError::UnknownRecipient {
                host_id: host_id.to_string(),
                recipient: identifier.clone(),
            })?;

        if let Some(email) = user.email.as_deref() {
            addresses.extend(split_addresses(email));
        }
    }

    Ok(addresses)
}

fn split_addresses(email: &str) -> impl Iterator<Item = String> + '_ {
    email
        .split(',')
        .map(|piece| piece.split_whitespace().collect::<String>())
        .filter(|piece| !piece.is_empty())
}
