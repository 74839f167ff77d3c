//! Tests for the simulated device runtime.

use super::*;

#[test]
fn event_completes_only_after_retire() {
    let rt = SimRuntime::default();
    let stream = rt.create_stream(0).unwrap();
    rt.enqueue(stream);
    let event = rt.record_event(stream).unwrap();
    assert!(!rt.event_completed(event).unwrap());
    rt.retire(stream);
    assert!(rt.event_completed(event).unwrap());
}

#[test]
fn event_on_idle_stream_is_complete() {
    let rt = SimRuntime::default();
    let event = rt.record_event(Stream::default_for(0)).unwrap();
    assert!(rt.event_completed(event).unwrap());
}

#[test]
fn later_work_does_not_delay_earlier_event() {
    let rt = SimRuntime::default();
    let stream = rt.create_stream(0).unwrap();
    rt.enqueue(stream);
    let event = rt.record_event(stream).unwrap();
    rt.retire(stream);
    rt.enqueue(stream);
    assert!(rt.event_completed(event).unwrap());
    assert_eq!(rt.pending_work(stream), 1);
}

#[test]
fn current_stream_is_per_thread() {
    let rt = std::sync::Arc::new(SimRuntime::default());
    let side = rt.create_stream(0).unwrap();
    rt.set_current_stream(side);
    assert_eq!(rt.current_stream(0), side);

    let rt2 = rt.clone();
    let other = std::thread::spawn(move || rt2.current_stream(0)).join().unwrap();
    assert!(other.is_default());
}

#[test]
fn reserve_respects_capacity() {
    let rt = SimRuntime::with_devices(1, 1024);
    let ptr = rt.reserve(MemoryLocation::Device(0), 1024).unwrap();
    let over = rt.reserve(MemoryLocation::Device(0), 1);
    assert!(matches!(over, Err(RuntimeError::OutOfMemory { available: 0, .. })));
    rt.release(MemoryLocation::Device(0), ptr, 1024).unwrap();
    assert_eq!(rt.reserved_bytes(MemoryLocation::Device(0)), 0);
}

#[test]
fn release_unknown_pointer_fails() {
    let rt = SimRuntime::default();
    let result = rt.release(MemoryLocation::Device(0), DevicePtr(42), 16);
    assert!(matches!(result, Err(RuntimeError::OperationFailed(_))));
}

#[test]
fn invalid_device_is_rejected() {
    let rt = SimRuntime::with_devices(2, 1024);
    assert!(rt.set_current_device(2).is_err());
    assert!(matches!(
        rt.reserve(MemoryLocation::Device(5), 8),
        Err(RuntimeError::InvalidDevice { index: 5, count: 2 })
    ));
}

#[test]
fn injected_event_failure_is_reported_once() {
    let rt = SimRuntime::default();
    rt.fail_next_event_records(1);
    assert!(matches!(
        rt.record_event(Stream::default_for(0)),
        Err(RuntimeError::EventFailed(_))
    ));
    assert!(rt.record_event(Stream::default_for(0)).is_ok());
}

#[test]
fn wait_is_logged() {
    let rt = SimRuntime::default();
    let side = rt.create_stream(0).unwrap();
    let event = rt.record_event(Stream::default_for(0)).unwrap();
    rt.stream_wait_event(side, event).unwrap();
    assert_eq!(rt.waits(), vec![(side, Stream::default_for(0))]);
}

#[test]
fn injected_release_failure_keeps_memory_reserved() {
    let rt = SimRuntime::default();
    let ptr = rt.reserve(MemoryLocation::Device(0), 4096).unwrap();
    rt.fail_next_releases(1);
    assert!(rt.release(MemoryLocation::Device(0), ptr, 4096).is_err());
    assert_eq!(rt.reserved_bytes(MemoryLocation::Device(0)), 4096);
    rt.release(MemoryLocation::Device(0), ptr, 4096).unwrap();
    assert_eq!(rt.reserved_bytes(MemoryLocation::Device(0)), 0);
}
