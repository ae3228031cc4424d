use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "fieldcache";

/// Remembered 121 passwords, keyed by username.
pub struct CredentialStore;

impl CredentialStore {
    /// Store username and password in the OS keychain
    pub fn store(username: &str, password: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, username)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(password)
            .context("Failed to store password in keychain")?;
        Ok(())
    }

    /// Retrieve a remembered password, if there is one
    pub fn get_password(username: &str) -> Option<String> {
        Entry::new(SERVICE_NAME, username)
            .and_then(|entry| entry.get_password())
            .ok()
    }

    /// Forget the stored password for a username
    pub fn delete(username: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, username)
            .context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}
