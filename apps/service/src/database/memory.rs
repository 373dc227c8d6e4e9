use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::models::{Failure, Hit};
use super::repository::Database;
use crate::monitoring::types::Service;

/// In-memory `Database` used by tests
#[derive(Default)]
pub struct MemoryDatabase {
    services: Mutex<Vec<Service>>,
    hits: Mutex<Vec<Hit>>,
    failures: Mutex<Vec<Failure>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<Failure> {
        self.failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn get_enabled_services(&self) -> Result<Vec<Service>> {
        Ok(self.services.lock().unwrap().iter().filter(|s| s.enabled).cloned().collect())
    }

    async fn get_service(&self, id: i64) -> Result<Option<Service>> {
        Ok(self.services.lock().unwrap().iter().find(|s| s.id == id).cloned())
    }

    async fn save_service(&self, service: &Service) -> Result<i64> {
        let mut services = self.services.lock().unwrap();
        if let Some(existing) = services.iter_mut().find(|s| s.id == service.id && service.id > 0) {
            *existing = service.clone();
            return Ok(service.id);
        }

        let id = services.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        let mut inserted = service.clone();
        inserted.id = id;
        services.push(inserted);
        Ok(id)
    }

    async fn create_hit(&self, hit: &Hit) -> Result<i64> {
        let mut hits = self.hits.lock().unwrap();
        let mut stored = hit.clone();
        stored.id = Some(hits.len() as i64 + 1);
        hits.push(stored);
        Ok(hits.len() as i64)
    }

    async fn create_failure(&self, failure: &Failure) -> Result<i64> {
        let mut failures = self.failures.lock().unwrap();
        let mut stored = failure.clone();
        stored.id = Some(failures.len() as i64 + 1);
        failures.push(stored);
        Ok(failures.len() as i64)
    }

    async fn get_recent_failures(&self, service_id: i64, limit: usize) -> Result<Vec<Failure>> {
        let mut failures: Vec<Failure> = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.service_id == service_id)
            .cloned()
            .collect();
        failures.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        failures.truncate(limit);
        Ok(failures)
    }
}
