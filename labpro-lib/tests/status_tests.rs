//! Status polling state machine and snapshot construction.

mod common;

use std::time::Duration;

use common::{MockLink, status_body};
use labpro_lib::status::{DeviceStatus, SENTINEL_INDEX, STATUS_SENTINEL};
use labpro_lib::{LabPro, LabProError, RetryPolicy};

fn fast_poll(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn polls_until_the_sentinel_appears() {
    let mut link = MockLink::new();
    // Two warm-up frames without the sentinel, then a complete snapshot.
    link.push_response("{1.1,0,2.5}\r\n");
    link.push_response("{0,0}\r\n");
    link.push_response(&status_body(117.0));

    let mut device = LabPro::from_link(link).with_poll_policy(fast_poll(5));
    let snapshot = device.get_device_status().await.unwrap();
    assert_eq!(snapshot.system_id, 117.0);

    // Exactly three status commands went out.
    let link = device.into_link();
    assert_eq!(link.written.len(), 3);
    for frame in &link.written {
        assert_eq!(frame, &b"s{7}\r\r".to_vec());
    }
}

#[tokio::test]
async fn snapshot_fields_map_positionally() {
    let mut link = MockLink::new();
    link.push_response(&status_body(42.0));

    let mut device = LabPro::from_link(link).with_poll_policy(fast_poll(1));
    let snapshot = device.get_device_status().await.unwrap();

    assert_eq!(snapshot.software_id, 1.1);
    assert_eq!(snapshot.battery, 2.5);
    assert_eq!(snapshot.sample_time, 60.0);
    assert_eq!(snapshot.num_samples, 100.0);
    assert_eq!(snapshot.temperature, 21.5);
    assert_eq!(snapshot.system_state, 3.0);
    assert_eq!(snapshot.system_id, 42.0);

    // The snapshot is cached on the connection for later callers.
    assert_eq!(device.status(), Some(&snapshot));
}

#[tokio::test]
async fn exhausting_the_poll_budget_times_out() {
    let mut link = MockLink::new();
    link.push_response("{1.0}\r\n");
    link.push_response("{1.0}\r\n");

    let mut device = LabPro::from_link(link).with_poll_policy(fast_poll(2));
    let err = device.get_device_status().await.unwrap_err();
    match err {
        LabProError::StatusTimeout { attempts } => assert_eq!(attempts, 2),
        other => panic!("expected StatusTimeout, got {other:?}"),
    }
}

#[test]
fn sentinel_at_documented_position_is_accepted() {
    let mut values = vec![0.0; 17];
    values[SENTINEL_INDEX] = STATUS_SENTINEL;
    values[16] = 9.0;

    let snapshot = DeviceStatus::from_vector(&values).unwrap();
    assert_eq!(snapshot.system_id, 9.0);
}

#[test]
fn full_length_vector_without_sentinel_is_rejected() {
    let values = vec![1.0; 17];
    assert!(DeviceStatus::from_vector(&values).is_none());
}

#[test]
fn short_vector_with_sentinel_is_rejected() {
    let mut values = vec![0.0; 16];
    values[SENTINEL_INDEX] = STATUS_SENTINEL;
    assert!(DeviceStatus::from_vector(&values).is_none());
}

#[test]
fn collection_state_is_derived_mod_16() {
    let mut values = vec![0.0; 17];
    values[SENTINEL_INDEX] = STATUS_SENTINEL;

    values[13] = 3.0;
    assert!(DeviceStatus::from_vector(&values).unwrap().is_collecting());

    values[13] = 19.0;
    assert!(DeviceStatus::from_vector(&values).unwrap().is_collecting());

    values[13] = 4.0;
    assert!(!DeviceStatus::from_vector(&values).unwrap().is_collecting());
}
