// libs/scheduling-cell/src/store/memory.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentStatus, BlockedRange, NewAppointment, SchedulingError, Service,
    WorkingHours,
};
use crate::store::{BookingStore, ScheduleStore, ServiceCatalog};

#[derive(Default)]
struct Inner {
    working_hours: Vec<WorkingHours>,
    blocked_ranges: Vec<BlockedRange>,
    services: HashMap<i64, Service>,
    appointments: HashMap<Uuid, Appointment>,
    locks: HashMap<i64, DateTime<Utc>>,
}

/// In-process store used by the engine tests and by embedded deployments
/// that do not carry a database. Mirrors the PostgREST store's semantics,
/// including the TTL'd provider locks.
#[derive(Default)]
pub struct InMemorySchedulingStore {
    inner: Mutex<Inner>,
}

impl InMemorySchedulingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_working_hours(&self, hours: WorkingHours) {
        self.inner.lock().unwrap().working_hours.push(hours);
    }

    pub fn add_blocked_range(&self, range: BlockedRange) {
        self.inner.lock().unwrap().blocked_ranges.push(range);
    }

    pub fn add_service(&self, service: Service) {
        self.inner.lock().unwrap().services.insert(service.id, service);
    }

    pub fn add_appointment(&self, appointment: Appointment) {
        self.inner
            .lock()
            .unwrap()
            .appointments
            .insert(appointment.id, appointment);
    }

    pub fn appointment_count(&self) -> usize {
        self.inner.lock().unwrap().appointments.len()
    }

    pub fn set_status(&self, id: Uuid, status: AppointmentStatus) {
        if let Some(apt) = self.inner.lock().unwrap().appointments.get_mut(&id) {
            apt.status = status;
        }
    }
}

#[async_trait]
impl ScheduleStore for InMemorySchedulingStore {
    async fn working_hours(
        &self,
        provider_id: i64,
        weekday: u8,
    ) -> Result<Option<WorkingHours>, SchedulingError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .working_hours
            .iter()
            .find(|wh| wh.provider_id == provider_id && wh.weekday == weekday)
            .cloned())
    }

    async fn blocked_ranges(
        &self,
        provider_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BlockedRange>, SchedulingError> {
        let inner = self.inner.lock().unwrap();
        let mut ranges: Vec<BlockedRange> = inner
            .blocked_ranges
            .iter()
            .filter(|r| r.applies_to(provider_id) && r.start_time < to && r.end_time > from)
            .cloned()
            .collect();
        ranges.sort_by_key(|r| r.start_time);
        Ok(ranges)
    }
}

#[async_trait]
impl ServiceCatalog for InMemorySchedulingStore {
    async fn service(&self, service_id: i64) -> Result<Option<Service>, SchedulingError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.services.get(&service_id).cloned())
    }
}

#[async_trait]
impl BookingStore for InMemorySchedulingStore {
    async fn appointments_in_range(
        &self,
        provider_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let inner = self.inner.lock().unwrap();
        let mut appointments: Vec<Appointment> = inner
            .appointments
            .values()
            .filter(|apt| {
                apt.provider_id == provider_id
                    && apt.status != AppointmentStatus::Cancelled
                    && apt.start_time < to
                    && apt.end_time > from
                    && Some(apt.id) != exclude
            })
            .cloned()
            .collect();
        appointments.sort_by_key(|apt| apt.start_time);
        Ok(appointments)
    }

    async fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, SchedulingError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.appointments.get(&id).cloned())
    }

    async fn insert_appointment(
        &self,
        new: NewAppointment,
    ) -> Result<Appointment, SchedulingError> {
        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            provider_id: new.provider_id,
            service_id: new.service_id,
            customer_id: new.customer_id,
            start_time: new.start_time,
            end_time: new.end_time,
            status: AppointmentStatus::Pending,
            buffer_before_minutes: new.buffer_before_minutes,
            buffer_after_minutes: new.buffer_after_minutes,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .lock()
            .unwrap()
            .appointments
            .insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn reschedule_appointment(
        &self,
        id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        let mut inner = self.inner.lock().unwrap();
        let apt = inner
            .appointments
            .get_mut(&id)
            .ok_or(SchedulingError::AppointmentNotFound)?;
        apt.start_time = new_start;
        apt.end_time = new_end;
        apt.updated_at = Utc::now();
        Ok(apt.clone())
    }

    async fn try_acquire_provider_lock(
        &self,
        provider_id: i64,
        ttl: Duration,
    ) -> Result<bool, SchedulingError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        match inner.locks.get(&provider_id) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                inner.locks.insert(provider_id, now + ttl);
                Ok(true)
            }
        }
    }

    async fn release_provider_lock(&self, provider_id: i64) -> Result<(), SchedulingError> {
        self.inner.lock().unwrap().locks.remove(&provider_id);
        Ok(())
    }
}
