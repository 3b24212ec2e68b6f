//! Shared test providers and fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use fieldseal::error::KeyProviderError;
use fieldseal::kdf::generate_key;
use fieldseal::key_provider::{DataKey, DataKeyProvider};
use fieldseal::record::{Record, Value};
use secrecy::{ExposeSecret, SecretVec};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Key provider that counts how many keys it issued and unwrapped.
///
/// Keys are random; the wrapped form is the plaintext itself.
#[derive(Default)]
pub struct CountingProvider {
    issued: AtomicUsize,
    unwrapped: AtomicUsize,
    failures_left: AtomicUsize,
    slow: AtomicBool,
    yielding: AtomicBool,
}

impl CountingProvider {
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn unwrapped(&self) -> usize {
        self.unwrapped.load(Ordering::SeqCst)
    }

    /// The next `n` generate calls fail with `Unavailable`.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Makes generate calls take one second.
    pub fn set_slow(&self, slow: bool) {
        self.slow.store(slow, Ordering::SeqCst);
    }

    /// Makes generate calls yield to the scheduler before issuing a key.
    pub fn set_yielding(&self, yielding: bool) {
        self.yielding.store(yielding, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataKeyProvider for CountingProvider {
    async fn generate_data_key(&self) -> Result<DataKey, KeyProviderError> {
        if self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        if self.yielding.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(KeyProviderError::Unavailable("injected failure".to_string()));
        }

        self.issued.fetch_add(1, Ordering::SeqCst);
        let key = generate_key();
        let wrapped = key.expose_secret().clone();
        Ok(DataKey::new(key, wrapped))
    }

    async fn decrypt_data_key(
        &self,
        wrapped: &[u8],
        _key_index: Option<u32>,
    ) -> Result<SecretVec<u8>, KeyProviderError> {
        self.unwrapped.fetch_add(1, Ordering::SeqCst);
        Ok(SecretVec::new(wrapped.to_vec()))
    }
}

/// The bank account record used across tests.
pub fn bank_account() -> Record {
    Record::from([
        ("pk".to_string(), Value::from("account-123")),
        ("sk".to_string(), Value::from("Flava Flav")),
        ("accountNumber".to_string(), Value::from("123")),
        ("balance".to_string(), Value::from(100)),
        (
            "notes".to_string(),
            Value::Object(BTreeMap::from([(
                "previousBalances".to_string(),
                Value::from(vec![0, 50]),
            )])),
        ),
    ])
}

/// A record with a string primary key, for batch ordering checks.
pub fn numbered_record(n: usize) -> Record {
    Record::from([
        ("pk".to_string(), Value::from(format!("item-{n}"))),
        ("secret".to_string(), Value::from(format!("secret-{n}"))),
    ])
}
