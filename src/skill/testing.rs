//! Fakes for the skill's collaborators.

use crate::services::catalog::StreamDescriptor;
use crate::services::geolocation::{DeviceAddress, DeviceLookup, GeoError, Geolocator};
use crate::services::preferences::{
    ListenerPreference, MemoryPreferenceStore, PreferenceStore, StoreError,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Listener id used by the event fixtures.
pub const LISTENER: &str = "amzn1.ask.account.listener";

/// In-memory store that counts reads and writes made through the trait.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryPreferenceStore,
    gets: AtomicUsize,
    puts: AtomicUsize,
    broken: bool,
}

impl CountingStore {
    /// Every call fails with an I/O error.
    pub fn failing() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    /// Stores a preference without counting the write.
    pub async fn seed(&self, listener_id: &str, stream: StreamDescriptor) {
        self.inner.put(listener_id, &stream).await.unwrap();
    }

    pub async fn stored(&self, listener_id: &str) -> Option<StreamDescriptor> {
        self.inner
            .get(listener_id)
            .await
            .unwrap()
            .map(|preference| preference.stream)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn broken_error(&self) -> StoreError {
        StoreError::Io {
            path: "memory".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "store offline"),
        }
    }
}

#[async_trait]
impl PreferenceStore for CountingStore {
    async fn get(&self, listener_id: &str) -> Result<Option<ListenerPreference>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(self.broken_error());
        }
        self.inner.get(listener_id).await
    }

    async fn put(&self, listener_id: &str, stream: &StreamDescriptor) -> Result<(), StoreError> {
        if self.broken {
            return Err(self.broken_error());
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(listener_id, stream).await
    }

    fn backend(&self) -> &'static str {
        "counting"
    }
}

#[derive(Debug, Clone)]
enum GeoAnswer {
    Address(DeviceAddress),
    Denied,
    Failed,
    Hang,
}

/// Geolocator with a fixed answer.
#[derive(Debug, Clone)]
pub struct StaticGeolocator {
    answer: GeoAnswer,
    calls: std::sync::Arc<AtomicUsize>,
}

impl StaticGeolocator {
    fn answering(answer: GeoAnswer) -> Self {
        Self {
            answer,
            calls: Default::default(),
        }
    }

    pub fn country(code: &str) -> Self {
        Self::answering(GeoAnswer::Address(DeviceAddress::with_country(code)))
    }

    /// Address is known but carries no country.
    pub fn no_country() -> Self {
        Self::answering(GeoAnswer::Address(DeviceAddress::default()))
    }

    pub fn denied() -> Self {
        Self::answering(GeoAnswer::Denied)
    }

    pub fn failing() -> Self {
        Self::answering(GeoAnswer::Failed)
    }

    /// Never answers within any reasonable timeout.
    pub fn hanging() -> Self {
        Self::answering(GeoAnswer::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geolocator for StaticGeolocator {
    async fn resolve(&self, _device: &DeviceLookup) -> Result<DeviceAddress, GeoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            GeoAnswer::Address(address) => Ok(address.clone()),
            GeoAnswer::Denied => Err(GeoError::PermissionDenied),
            GeoAnswer::Failed => Err(GeoError::LookupFailed("HTTP 500".to_string())),
            GeoAnswer::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(GeoError::LookupFailed("late".to_string()))
            }
        }
    }
}
