use std::sync::Arc;

use chrono::{Duration, NaiveTime, TimeZone, Utc};

use scheduling_cell::models::{
    AppointmentStatus, BookAppointmentRequest, BreakWindow, ConflictKind,
    RescheduleAppointmentRequest, SchedulingContext, SchedulingError, Service, WorkingHours,
};
use scheduling_cell::services::BookingService;
use scheduling_cell::store::InMemorySchedulingStore;
use shared_config::AppConfig;

const PROVIDER: i64 = 7;

fn test_config() -> AppConfig {
    AppConfig {
        supabase_url: String::new(),
        supabase_anon_key: String::new(),
        supabase_service_key: String::new(),
        slot_granularity_minutes: 30,
        booking_lock_ttl_seconds: 30,
    }
}

fn t(hour: u32, min: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, 0).unwrap()
}

// 2025-06-02 is a Monday
fn at(hour: u32, min: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, hour, min, 0).unwrap()
}

fn ctx() -> SchedulingContext {
    SchedulingContext::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        Duration::minutes(30),
    )
}

fn seeded_store() -> Arc<InMemorySchedulingStore> {
    let store = Arc::new(InMemorySchedulingStore::new());
    store.add_working_hours(
        WorkingHours::new(
            PROVIDER,
            1,
            t(9, 0),
            t(17, 0),
            vec![BreakWindow {
                start: t(12, 0),
                end: t(13, 0),
            }],
            chrono_tz::UTC,
        )
        .unwrap(),
    );
    store.add_service(Service {
        id: 1,
        duration_minutes: 30,
        buffer_before_minutes: 0,
        buffer_after_minutes: 0,
    });
    store
}

fn guard(store: &Arc<InMemorySchedulingStore>) -> BookingService {
    BookingService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        &test_config(),
    )
}

fn request(start: chrono::DateTime<Utc>) -> BookAppointmentRequest {
    BookAppointmentRequest {
        provider_id: PROVIDER,
        service_id: 1,
        customer_id: Some(42),
        start_time: start,
    }
}

#[tokio::test]
async fn booking_inside_availability_succeeds() {
    let store = seeded_store();
    let appointment = guard(&store)
        .try_book(request(at(9, 0)), &ctx())
        .await
        .unwrap();

    assert_eq!(appointment.provider_id, PROVIDER);
    assert_eq!(appointment.start_time, at(9, 0));
    assert_eq!(appointment.end_time, at(9, 30));
    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(store.appointment_count(), 1);
}

#[tokio::test]
async fn double_booking_the_same_slot_fails() {
    let store = seeded_store();
    let guard = guard(&store);

    let first = guard.try_book(request(at(10, 0)), &ctx()).await.unwrap();
    let err = guard.try_book(request(at(10, 0)), &ctx()).await.unwrap_err();

    match err {
        SchedulingError::Conflict(ConflictKind::SlotTaken {
            conflicting_appointment_id,
        }) => assert_eq!(conflicting_appointment_id, first.id),
        other => panic!("expected slot conflict, got {:?}", other),
    }
    assert_eq!(store.appointment_count(), 1);
}

#[tokio::test]
async fn concurrent_bookings_admit_exactly_one() {
    let store = seeded_store();
    let guard = Arc::new(guard(&store));

    let a = {
        let guard = guard.clone();
        tokio::spawn(async move { guard.try_book(request(at(11, 0)), &ctx()).await })
    };
    let b = {
        let guard = guard.clone();
        tokio::spawn(async move { guard.try_book(request(at(11, 0)), &ctx()).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();

    assert_eq!(successes, 1);
    assert_eq!(store.appointment_count(), 1);
    for result in results {
        if let Err(e) = result {
            assert_matches::assert_matches!(
                e,
                SchedulingError::Conflict(ConflictKind::SlotTaken { .. })
            );
        }
    }
}

#[tokio::test]
async fn booking_outside_working_hours_is_rejected() {
    let store = seeded_store();
    let err = guard(&store)
        .try_book(request(at(8, 0)), &ctx())
        .await
        .unwrap_err();
    assert_matches::assert_matches!(
        err,
        SchedulingError::Conflict(ConflictKind::OutsideAvailability)
    );
    assert_eq!(store.appointment_count(), 0);
}

#[tokio::test]
async fn booking_over_a_break_is_rejected() {
    let store = seeded_store();
    let err = guard(&store)
        .try_book(request(at(11, 45)), &ctx())
        .await
        .unwrap_err();
    assert_matches::assert_matches!(
        err,
        SchedulingError::Conflict(ConflictKind::OutsideAvailability)
    );
}

#[tokio::test]
async fn cancelled_appointments_free_their_slot() {
    let store = seeded_store();
    let guard = guard(&store);

    let first = guard.try_book(request(at(14, 0)), &ctx()).await.unwrap();
    store.set_status(first.id, AppointmentStatus::Cancelled);

    let second = guard.try_book(request(at(14, 0)), &ctx()).await.unwrap();
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn long_trailing_buffer_blocks_bookings_hours_later() {
    let store = seeded_store();
    // 30-minute service whose trailing buffer reaches four hours out
    store.add_service(Service {
        id: 2,
        duration_minutes: 30,
        buffer_before_minutes: 0,
        buffer_after_minutes: 240,
    });
    let guard = guard(&store);

    let mut first_req = request(at(9, 0));
    first_req.service_id = 2;
    let first = guard.try_book(first_req, &ctx()).await.unwrap();

    // 09:00-09:30 buffered to 13:30; 13:00 sits inside that buffer
    let err = guard.try_book(request(at(13, 0)), &ctx()).await.unwrap_err();
    match err {
        SchedulingError::Conflict(ConflictKind::SlotTaken {
            conflicting_appointment_id,
        }) => assert_eq!(conflicting_appointment_id, first.id),
        other => panic!("expected slot conflict, got {:?}", other),
    }
    assert_eq!(store.appointment_count(), 1);
}

#[tokio::test]
async fn buffer_beyond_the_cap_is_rejected() {
    let store = seeded_store();
    store.add_service(Service {
        id: 3,
        duration_minutes: 30,
        buffer_before_minutes: 0,
        buffer_after_minutes: 330,
    });

    let mut req = request(at(9, 0));
    req.service_id = 3;
    let err = guard(&store).try_book(req, &ctx()).await.unwrap_err();
    assert_matches::assert_matches!(err, SchedulingError::InvalidInput(_));
    assert_eq!(store.appointment_count(), 0);
}

#[tokio::test]
async fn booking_in_the_past_is_rejected() {
    let store = seeded_store();
    let late_ctx = SchedulingContext::new(at(12, 0), Duration::minutes(30));
    let err = guard(&store)
        .try_book(request(at(9, 0)), &late_ctx)
        .await
        .unwrap_err();
    assert_matches::assert_matches!(err, SchedulingError::InvalidInput(_));
}

#[tokio::test]
async fn unknown_service_is_rejected() {
    let store = seeded_store();
    let mut req = request(at(9, 0));
    req.service_id = 99;
    let err = guard(&store).try_book(req, &ctx()).await.unwrap_err();
    assert_matches::assert_matches!(err, SchedulingError::ServiceNotFound);
}

#[tokio::test]
async fn reschedule_ignores_the_appointment_itself() {
    let store = seeded_store();
    let guard = guard(&store);

    let booked = guard.try_book(request(at(9, 0)), &ctx()).await.unwrap();

    // Overlaps its own old span, which must not count as a conflict
    let moved = guard
        .reschedule(
            booked.id,
            RescheduleAppointmentRequest {
                new_start_time: at(9, 15),
            },
            &ctx(),
        )
        .await
        .unwrap();

    assert_eq!(moved.id, booked.id);
    assert_eq!(moved.start_time, at(9, 15));
    assert_eq!(moved.end_time, at(9, 45));
    assert_eq!(store.appointment_count(), 1);
}

#[tokio::test]
async fn reschedule_onto_another_appointment_fails() {
    let store = seeded_store();
    let guard = guard(&store);

    let first = guard.try_book(request(at(9, 0)), &ctx()).await.unwrap();
    let second = guard.try_book(request(at(10, 0)), &ctx()).await.unwrap();

    let err = guard
        .reschedule(
            second.id,
            RescheduleAppointmentRequest {
                new_start_time: at(9, 0),
            },
            &ctx(),
        )
        .await
        .unwrap_err();

    match err {
        SchedulingError::Conflict(ConflictKind::SlotTaken {
            conflicting_appointment_id,
        }) => assert_eq!(conflicting_appointment_id, first.id),
        other => panic!("expected slot conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn reschedule_of_unknown_appointment_fails() {
    let store = seeded_store();
    let err = guard(&store)
        .reschedule(
            uuid::Uuid::new_v4(),
            RescheduleAppointmentRequest {
                new_start_time: at(9, 0),
            },
            &ctx(),
        )
        .await
        .unwrap_err();
    assert_matches::assert_matches!(err, SchedulingError::AppointmentNotFound);
}

#[tokio::test]
async fn successful_booking_emits_a_created_event() {
    let store = seeded_store();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let guard = BookingService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        &test_config(),
    )
    .with_event_sink(tx);

    let appointment = guard.try_book(request(at(15, 0)), &ctx()).await.unwrap();

    let event = rx.try_recv().unwrap();
    assert_eq!(event.appointment_id, appointment.id);
    assert_eq!(
        event.event_type,
        scheduling_cell::models::AppointmentEventType::Created
    );
}

#[tokio::test]
async fn failed_booking_emits_no_event() {
    let store = seeded_store();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let guard = BookingService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        &test_config(),
    )
    .with_event_sink(tx);

    let _ = guard.try_book(request(at(8, 0)), &ctx()).await.unwrap_err();
    assert!(rx.try_recv().is_err());
}
