use std::sync::{PoisonError, RwLock};

use {secrecy::Secret, tracing::info};

/// Process-wide completion-service credential.
///
/// Seeded once at startup and replaced at runtime by the `set credential`
/// command. Readers always see either the old or the new key, never a torn
/// value.
#[derive(Default)]
pub struct CredentialCell {
    inner: RwLock<Option<Secret<String>>>,
}

impl CredentialCell {
    pub fn new(initial: Option<Secret<String>>) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub fn get(&self) -> Option<Secret<String>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn set(&self, credential: Secret<String>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(credential);
        info!("completion credential updated");
    }
}

impl std::fmt::Debug for CredentialCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCell")
            .field("set", &self.is_set())
            .finish()
    }
}
