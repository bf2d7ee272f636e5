// libs/scheduling-cell/src/services/availability.rs
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::sync::Arc;
use tracing::debug;

use crate::models::{
    SchedulingContext, SchedulingError, Slot, WorkingHours, MAX_BUFFER_MINUTES,
};
use crate::store::{BookingStore, ScheduleStore, ServiceCatalog};
use crate::timeline::{free_gaps, local_instant, merge_intervals, Interval};

/// Computes bookable slots by subtracting breaks, blocked ranges and
/// buffered appointment spans from the provider's working window.
pub struct AvailabilityService {
    schedule: Arc<dyn ScheduleStore>,
    catalog: Arc<dyn ServiceCatalog>,
    bookings: Arc<dyn BookingStore>,
}

pub(crate) fn weekday_index(date: NaiveDate) -> u8 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

impl AvailabilityService {
    pub fn new(
        schedule: Arc<dyn ScheduleStore>,
        catalog: Arc<dyn ServiceCatalog>,
        bookings: Arc<dyn BookingStore>,
    ) -> Self {
        Self {
            schedule,
            catalog,
            bookings,
        }
    }

    /// Calculate available slots for a provider, service and date.
    pub async fn available_slots(
        &self,
        provider_id: i64,
        service_id: i64,
        date: NaiveDate,
        ctx: &SchedulingContext,
    ) -> Result<Vec<Slot>, SchedulingError> {
        if provider_id <= 0 || service_id <= 0 {
            return Err(SchedulingError::InvalidInput(
                "Provider and service ids must be positive".to_string(),
            ));
        }

        debug!(
            "Calculating available slots for provider {} service {} on {}",
            provider_id, service_id, date
        );

        let Some(hours) = self
            .schedule
            .working_hours(provider_id, weekday_index(date))
            .await?
        else {
            debug!("Provider {} is off on {}", provider_id, date);
            return Ok(vec![]);
        };

        let service = self
            .catalog
            .service(service_id)
            .await?
            .ok_or(SchedulingError::ServiceNotFound)?;
        service.validate()?;

        let tz = hours.timezone;
        let window = Interval::new(
            local_instant(date, hours.start_time, tz)?,
            local_instant(date, hours.end_time, tz)?,
        );
        if window.is_empty() {
            return Ok(vec![]);
        }

        let mut busy: Vec<Interval> = Vec::new();

        for brk in &hours.breaks {
            busy.push(Interval::new(
                local_instant(date, brk.start, tz)?,
                local_instant(date, brk.end, tz)?,
            ));
        }

        let blocked = self
            .schedule
            .blocked_ranges(provider_id, window.start, window.end)
            .await?;
        busy.extend(blocked.iter().map(|range| range.interval()));

        // Widen the appointment query by the buffer cap so buffered spans
        // reaching into the window from outside it are still picked up
        let slack = Duration::minutes(MAX_BUFFER_MINUTES);
        let appointments = self
            .bookings
            .appointments_in_range(provider_id, window.start - slack, window.end + slack, None)
            .await?;
        busy.extend(
            appointments
                .iter()
                .filter(|apt| apt.blocks_bookings())
                .map(|apt| apt.buffered_span()),
        );

        let merged = merge_intervals(busy);
        let gaps = free_gaps(window, &merged);

        let mut slots = Vec::new();
        for gap in gaps {
            // The full buffered span must fit inside the gap; only the
            // unbuffered duration is visible in the slot itself.
            let mut candidate = gap.start + service.buffer_before();
            while candidate + service.duration() + service.buffer_after() <= gap.end {
                if candidate > ctx.now {
                    slots.push(Slot {
                        start_time: candidate,
                        end_time: candidate + service.duration(),
                    });
                }
                candidate += ctx.slot_granularity;
            }
        }

        debug!("Found {} available slots", slots.len());
        Ok(slots)
    }

    /// Re-validate that a buffered candidate span sits inside the provider's
    /// working window and intersects no break or blocked range. Used by the
    /// conflict guard at commit time, when the schedule may have changed
    /// since the client fetched availability.
    pub async fn span_within_availability(
        &self,
        provider_id: i64,
        span: Interval,
    ) -> Result<bool, SchedulingError> {
        // The lookup is keyed by weekday, but the provider's zone only
        // becomes known once a row is loaded. Start from the UTC date and
        // correct to the local date afterwards; near local midnight the two
        // can disagree by one day.
        let mut date = span.start.date_naive();
        let mut hours = self
            .schedule
            .working_hours(provider_id, weekday_index(date))
            .await?;

        if let Some(ref wh) = hours {
            let local_date = span.start.with_timezone(&wh.timezone).date_naive();
            if local_date != date {
                date = local_date;
                hours = self
                    .schedule
                    .working_hours(provider_id, weekday_index(date))
                    .await?;
            }
        } else {
            for delta in [-1i64, 1] {
                let neighbor = date + Duration::days(delta);
                if let Some(wh) = self
                    .schedule
                    .working_hours(provider_id, weekday_index(neighbor))
                    .await?
                {
                    if span.start.with_timezone(&wh.timezone).date_naive() == neighbor {
                        date = neighbor;
                        hours = Some(wh);
                        break;
                    }
                }
            }
        }

        let Some(hours) = hours else {
            return Ok(false);
        };
        if !self.window_admits(&hours, date, span).await? {
            return Ok(false);
        }

        let blocked = self
            .schedule
            .blocked_ranges(provider_id, span.start, span.end)
            .await?;
        Ok(!blocked.iter().any(|range| range.interval().overlaps(&span)))
    }

    async fn window_admits(
        &self,
        hours: &WorkingHours,
        date: NaiveDate,
        span: Interval,
    ) -> Result<bool, SchedulingError> {
        let tz = hours.timezone;
        let window = Interval::new(
            local_instant(date, hours.start_time, tz)?,
            local_instant(date, hours.end_time, tz)?,
        );
        if !window.contains(&span) {
            return Ok(false);
        }
        for brk in &hours.breaks {
            let brk_iv = Interval::new(
                local_instant(date, brk.start, tz)?,
                local_instant(date, brk.end, tz)?,
            );
            if brk_iv.overlaps(&span) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
