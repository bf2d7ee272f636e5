// libs/scheduling-cell/src/store/supabase.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentStatus, BlockedRange, NewAppointment, SchedulingError, Service,
    WorkingHours,
};
use crate::store::{BookingStore, ScheduleStore, ServiceCatalog};

/// PostgREST-backed store. Tables:
/// `business_hours(provider_id, weekday, start_time, end_time, breaks, timezone)`,
/// `blocked_times(provider_id NULLABLE, start_time, end_time, reason)`,
/// `services(id, duration_minutes, buffer_before_minutes, buffer_after_minutes)`,
/// `appointments(id, provider_id, service_id, customer_id, start_time, end_time, status, ...)`,
/// `scheduling_locks(lock_key, acquired_at, expires_at)`.
pub struct SupabaseSchedulingStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseSchedulingStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn store_err(e: anyhow::Error) -> SchedulingError {
        SchedulingError::Store(e.to_string())
    }

    fn parse_rows<T: serde::de::DeserializeOwned>(
        rows: Vec<Value>,
    ) -> Result<Vec<T>, SchedulingError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| SchedulingError::Store(format!("Failed to parse rows: {}", e)))
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }

    fn lock_key(provider_id: i64) -> String {
        format!("provider_{}", provider_id)
    }

    /// Insert the lock row once; a unique violation on `lock_key` means
    /// another booking holds the lock.
    async fn try_insert_lock(
        &self,
        lock_key: &str,
        ttl: Duration,
    ) -> Result<bool, SchedulingError> {
        let now = Utc::now();
        let lock_data = json!({
            "lock_key": lock_key,
            "acquired_at": now.to_rfc3339(),
            "expires_at": (now + ttl).to_rfc3339(),
        });

        // return=representation keeps the response a JSON array; PostgREST
        // sends an empty body otherwise
        match self
            .supabase
            .request_with_headers::<Vec<Value>>(
                Method::POST,
                "/rest/v1/scheduling_locks",
                Some(lock_data),
                Some(Self::representation_headers()),
            )
            .await
        {
            Ok(_) => {
                debug!("Scheduling lock acquired: {}", lock_key);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Reap the lock row if its TTL has passed. Returns true when a stale
    /// lock was removed and acquisition is worth retrying.
    async fn cleanup_expired_lock(&self, lock_key: &str) -> Result<bool, SchedulingError> {
        let path = format!("/rest/v1/scheduling_locks?lock_key=eq.{}", lock_key);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(Self::store_err)?;

        if let Some(lock) = rows.first() {
            if let Some(expires_at_str) = lock.get("expires_at").and_then(|v| v.as_str()) {
                if let Ok(expires_at) = DateTime::parse_from_rfc3339(expires_at_str) {
                    if expires_at.with_timezone(&Utc) < Utc::now() {
                        self.delete_lock(lock_key).await?;
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }

    async fn delete_lock(&self, lock_key: &str) -> Result<(), SchedulingError> {
        let path = format!("/rest/v1/scheduling_locks?lock_key=eq.{}", lock_key);
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                None,
                Some(Self::representation_headers()),
            )
            .await
            .map_err(Self::store_err)?;
        debug!("Scheduling lock released: {}", lock_key);
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for SupabaseSchedulingStore {
    async fn working_hours(
        &self,
        provider_id: i64,
        weekday: u8,
    ) -> Result<Option<WorkingHours>, SchedulingError> {
        debug!(
            "Fetching working hours for provider {} weekday {}",
            provider_id, weekday
        );

        let path = format!(
            "/rest/v1/business_hours?provider_id=eq.{}&weekday=eq.{}&limit=1",
            provider_id, weekday
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(Self::store_err)?;

        let mut hours: Vec<WorkingHours> = Self::parse_rows(rows)?;
        match hours.pop() {
            Some(wh) => {
                wh.validate()?;
                Ok(Some(wh))
            }
            None => Ok(None),
        }
    }

    async fn blocked_ranges(
        &self,
        provider_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BlockedRange>, SchedulingError> {
        let from_enc = urlencoding::encode(&from.to_rfc3339()).into_owned();
        let to_enc = urlencoding::encode(&to.to_rfc3339()).into_owned();

        // Provider-specific plus global (null provider) rows overlapping the window
        let path = format!(
            "/rest/v1/blocked_times?or=(provider_id.eq.{},provider_id.is.null)&start_time=lt.{}&end_time=gt.{}&order=start_time.asc",
            provider_id, to_enc, from_enc
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(Self::store_err)?;

        Self::parse_rows(rows)
    }
}

#[async_trait]
impl ServiceCatalog for SupabaseSchedulingStore {
    async fn service(&self, service_id: i64) -> Result<Option<Service>, SchedulingError> {
        let path = format!("/rest/v1/services?id=eq.{}", service_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(Self::store_err)?;

        let mut services: Vec<Service> = Self::parse_rows(rows)?;
        match services.pop() {
            Some(service) => {
                service.validate()?;
                Ok(Some(service))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BookingStore for SupabaseSchedulingStore {
    async fn appointments_in_range(
        &self,
        provider_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let from_enc = urlencoding::encode(&from.to_rfc3339()).into_owned();
        let to_enc = urlencoding::encode(&to.to_rfc3339()).into_owned();

        let mut query_parts = vec![
            format!("provider_id=eq.{}", provider_id),
            format!("start_time=lt.{}", to_enc),
            format!("end_time=gt.{}", from_enc),
            "status=neq.cancelled".to_string(),
        ];
        if let Some(exclude_id) = exclude {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=start_time.asc",
            query_parts.join("&")
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(Self::store_err)?;

        Self::parse_rows(rows)
    }

    async fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, SchedulingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(Self::store_err)?;

        let mut appointments: Vec<Appointment> = Self::parse_rows(rows)?;
        Ok(appointments.pop())
    }

    async fn insert_appointment(
        &self,
        new: NewAppointment,
    ) -> Result<Appointment, SchedulingError> {
        let now = Utc::now();
        let appointment_data = json!({
            "id": Uuid::new_v4(),
            "provider_id": new.provider_id,
            "service_id": new.service_id,
            "customer_id": new.customer_id,
            "start_time": new.start_time.to_rfc3339(),
            "end_time": new.end_time.to_rfc3339(),
            "status": AppointmentStatus::Pending.to_string(),
            "buffer_before_minutes": new.buffer_before_minutes,
            "buffer_after_minutes": new.buffer_after_minutes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(appointment_data),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(Self::store_err)?;

        let mut appointments: Vec<Appointment> = Self::parse_rows(rows)?;
        appointments
            .pop()
            .ok_or_else(|| SchedulingError::Store("Failed to create appointment".to_string()))
    }

    async fn reschedule_appointment(
        &self,
        id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        let update_data = json!({
            "start_time": new_start.to_rfc3339(),
            "end_time": new_end.to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let rows: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(update_data),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(Self::store_err)?;

        let mut appointments: Vec<Appointment> = Self::parse_rows(rows)?;
        appointments
            .pop()
            .ok_or(SchedulingError::AppointmentNotFound)
    }

    async fn try_acquire_provider_lock(
        &self,
        provider_id: i64,
        ttl: Duration,
    ) -> Result<bool, SchedulingError> {
        let lock_key = Self::lock_key(provider_id);

        if self.try_insert_lock(&lock_key, ttl).await? {
            return Ok(true);
        }

        // Lock row exists; reap it if stale and try once more
        if self.cleanup_expired_lock(&lock_key).await? {
            return self.try_insert_lock(&lock_key, ttl).await;
        }

        Ok(false)
    }

    async fn release_provider_lock(&self, provider_id: i64) -> Result<(), SchedulingError> {
        self.delete_lock(&Self::lock_key(provider_id)).await
    }
}
