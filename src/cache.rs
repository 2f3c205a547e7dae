use crate::certificate::Certificate;
use crate::signer::MappedSigner;
use alloy_primitives::Address;
use std::sync::{Arc, RwLock};

/// Identifies the (wallet account, chain connection) pair a signer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub evm_address: Address,
    pub connection_id: u64,
}

/// Thread-safe in-memory cache of the session's signer and certificate
#[derive(Clone, Debug, Default)]
pub struct SessionCache {
    inner: Arc<RwLock<Option<CacheEntry>>>,
}

/// Inner implementation of the session cache
#[derive(Debug)]
struct CacheEntry {
    key: SessionKey,
    signer: Arc<MappedSigner>,
    /// Requested lazily by the first query
    certificate: Option<Arc<Certificate>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signer cached for `key`
    pub fn signer(&self, key: &SessionKey) -> Option<Arc<MappedSigner>> {
        if let Ok(inner) = self.inner.read() {
            inner
                .as_ref()
                .filter(|entry| entry.key == *key)
                .map(|entry| entry.signer.clone())
        } else {
            None
        }
    }

    /// The cached signer, whatever its key
    pub fn current(&self) -> Option<(SessionKey, Arc<MappedSigner>)> {
        if let Ok(inner) = self.inner.read() {
            inner
                .as_ref()
                .map(|entry| (entry.key, entry.signer.clone()))
        } else {
            None
        }
    }

    /// Store the signer for `key`, replacing any previous signer and its certificate
    pub fn insert_signer(&self, key: SessionKey, signer: Arc<MappedSigner>) {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(old) = inner.as_ref().filter(|entry| entry.key != key) {
                log::info!(
                    "CACHE: replacing signer for {} on connection {}",
                    old.key.evm_address,
                    old.key.connection_id
                );
            }
            *inner = Some(CacheEntry {
                key,
                signer,
                certificate: None,
            });
        }
    }

    /// Certificate cached for `key`
    pub fn certificate(&self, key: &SessionKey) -> Option<Arc<Certificate>> {
        if let Ok(inner) = self.inner.read() {
            inner
                .as_ref()
                .filter(|entry| entry.key == *key)
                .and_then(|entry| entry.certificate.clone())
        } else {
            None
        }
    }

    /// Attach a certificate to the signer cached for `key`
    ///
    /// Returns `false` when the signer was replaced or invalidated in the meantime.
    pub fn insert_certificate(&self, key: &SessionKey, certificate: Arc<Certificate>) -> bool {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(entry) = inner.as_mut().filter(|entry| entry.key == *key) {
                entry.certificate = Some(certificate);
                return true;
            }
        }
        false
    }

    /// Drop the signer and certificate
    pub fn invalidate(&self) {
        if let Ok(mut inner) = self.inner.write() {
            if inner.take().is_some() {
                log::info!("CACHE: signer and certificate invalidated");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.current().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeSettings, DerivedAccount};
    use crate::wallet::DevWallet;
    use evm_mapping_primitives::EcdsaSignature;
    use subxt::utils::AccountId32;

    fn create_signer(address: Address, connection_id: u64) -> Arc<MappedSigner> {
        let identity = DerivedAccount {
            evm_address: address,
            public_key: [2u8; 33],
            account_id: AccountId32([1u8; 32]),
        };
        Arc::new(MappedSigner::new(
            BridgeSettings::default(),
            identity,
            AccountId32([1u8; 32]),
            Arc::new(DevWallet::alith()),
            connection_id,
        ))
    }

    fn create_certificate(address: Address) -> Arc<Certificate> {
        Arc::new(Certificate {
            evm_address: address,
            account_id: AccountId32([1u8; 32]),
            body: "body".into(),
            signature: EcdsaSignature([0u8; 65]),
        })
    }

    fn key(byte: u8, connection_id: u64) -> SessionKey {
        SessionKey {
            evm_address: Address::repeat_byte(byte),
            connection_id,
        }
    }

    #[test]
    fn test_insert_and_retrieve() {
        let cache = SessionCache::new();
        let signer = create_signer(Address::repeat_byte(1), 1);

        cache.insert_signer(key(1, 1), signer.clone());

        assert!(Arc::ptr_eq(&cache.signer(&key(1, 1)).unwrap(), &signer));
        assert!(cache.signer(&key(1, 2)).is_none());
        assert!(cache.signer(&key(2, 1)).is_none());
    }

    #[test]
    fn test_certificate_follows_signer() {
        let cache = SessionCache::new();
        let certificate = create_certificate(Address::repeat_byte(1));

        // nothing to attach to yet
        assert!(!cache.insert_certificate(&key(1, 1), certificate.clone()));

        cache.insert_signer(key(1, 1), create_signer(Address::repeat_byte(1), 1));
        assert!(cache.insert_certificate(&key(1, 1), certificate.clone()));
        assert_eq!(cache.certificate(&key(1, 1)), Some(certificate));

        // another account replaces both
        cache.insert_signer(key(2, 1), create_signer(Address::repeat_byte(2), 1));
        assert!(cache.certificate(&key(1, 1)).is_none());
        assert!(cache.certificate(&key(2, 1)).is_none());
        assert!(cache.signer(&key(1, 1)).is_none());
    }

    #[test]
    fn test_invalidate() {
        let cache = SessionCache::new();
        cache.insert_signer(key(1, 1), create_signer(Address::repeat_byte(1), 1));
        cache.insert_certificate(&key(1, 1), create_certificate(Address::repeat_byte(1)));

        cache.invalidate();

        assert!(cache.is_empty());
        assert!(cache.signer(&key(1, 1)).is_none());
        assert!(cache.certificate(&key(1, 1)).is_none());
    }
}
