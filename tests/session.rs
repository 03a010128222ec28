// candriver/tests/session.rs
//
// Integration tests for CAN sessions.
//
// Most of these need a live 'vcan0' interface and the "vcan_tests" feature:
//
//   $ sudo modprobe vcan
//   $ sudo ip link add dev vcan0 type vcan
//   $ sudo ip link set up vcan0
//   $ cargo test --features=vcan_tests
//

use candriver::{InitError, Session};

#[cfg(feature = "vcan_tests")]
use candriver::{
    CanAddr, CanMessage, EmbeddedFrame, ErrorClass, FilterSet, FrameKind, ReceiveError, SendError,
    SessionConfig, StandardId, TelemetrySnapshot,
};
#[cfg(feature = "vcan_tests")]
use serial_test::serial;
#[cfg(feature = "vcan_tests")]
use std::{thread, time::Duration};

// The virtual CAN interface to use for tests.
#[cfg(feature = "vcan_tests")]
const VCAN: &str = "vcan0";

#[cfg(feature = "vcan_tests")]
const WAIT: Duration = Duration::from_millis(100);

#[test]
fn test_nonexistant_device() {
    let err = Session::open("invalid").unwrap_err();
    assert!(matches!(err, InitError::InterfaceNotFound { .. }));
}

/// A session that only sees frames with the given standard id.
#[cfg(feature = "vcan_tests")]
fn listener(id: u32) -> Session {
    let config = SessionConfig::new().with_filters(FilterSet::try_from(&[(id, 0x7FF)][..]).unwrap());
    Session::open_with(VCAN, &config).unwrap()
}

#[cfg(feature = "vcan_tests")]
fn frame(id: u32, data: &[u8]) -> CanMessage {
    CanMessage::from_raw_id(id, data).unwrap()
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_wait_on_empty_queue() {
    let mut rx = listener(0x489);
    let mut tx = Session::open(VCAN).unwrap();

    assert!(!rx.wait_for_messages(Duration::ZERO).unwrap());
    assert!(matches!(
        rx.read_message(),
        Err(ReceiveError::NoMessagePending)
    ));

    tx.send_message(&frame(0x489, &[1])).unwrap();
    assert!(rx.wait_for_messages(WAIT).unwrap());

    // Waiting doesn't consume the frame
    assert!(rx.wait_for_messages(Duration::ZERO).unwrap());
    rx.read_message().unwrap();
    assert!(!rx.wait_for_messages(Duration::ZERO).unwrap());
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_filter_scenario() {
    let mut rx = Session::open(VCAN).unwrap();
    rx.set_error_filter().unwrap();
    rx.set_error_filter().unwrap();
    rx.set_can_filter_mask(0x489, 0x7FF).unwrap();

    let mut tx = Session::open(VCAN).unwrap();
    tx.send_message(&frame(0x123, &[0x00])).unwrap();
    tx.send_message(&frame(0x489, &[0xFF, 0xFF, 0xFF, 0xFF]))
        .unwrap();

    assert!(rx.wait_for_messages(WAIT).unwrap());
    let msg = rx.read_message().unwrap();
    assert_eq!(0x489, msg.raw_id());
    assert_eq!(&[0xFF, 0xFF, 0xFF, 0xFF], msg.data());
    assert!(!msg.is_error_frame());
    assert!(msg.timestamp().is_some());

    // 0x123 was dropped by the kernel
    assert!(!rx.wait_for_messages(WAIT).unwrap());
}

/// Writes an error frame on the bus, the way a controller driver would.
/// A session refuses to send these, so this goes through a plain socket.
#[cfg(feature = "vcan_tests")]
fn inject_error_frame(class: u32) {
    let sock = socket2::Socket::new_raw(
        socket2::Domain::from(libc::AF_CAN),
        socket2::Type::RAW,
        Some(socket2::Protocol::from(libc::CAN_RAW)),
    )
    .unwrap();
    sock.bind(&CanAddr::from_iface(VCAN).unwrap().into()).unwrap();

    let frame = CanMessage::new_error(class, &[]).unwrap().to_can_frame();
    let buf = unsafe {
        std::slice::from_raw_parts(
            &frame as *const libc::can_frame as *const u8,
            std::mem::size_of::<libc::can_frame>(),
        )
    };
    assert_eq!(buf.len(), sock.send(buf).unwrap());
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_error_frame_before_data() {
    let mut rx = Session::open(VCAN).unwrap();
    rx.set_error_filter().unwrap();
    rx.set_can_filter_mask(0x489, 0x7FF).unwrap();

    inject_error_frame(ErrorClass::BUS_OFF.bits());
    let mut tx = Session::open(VCAN).unwrap();
    tx.send_message(&frame(0x489, &[0x01])).unwrap();

    assert!(rx.wait_for_messages(WAIT).unwrap());
    let err = rx.read_message().unwrap();
    assert!(err.is_error_frame());
    assert_eq!(FrameKind::Error, err.kind());
    assert!(err.error_class().contains(ErrorClass::BUS_OFF));

    assert!(rx.wait_for_messages(WAIT).unwrap());
    let data = rx.read_message().unwrap();
    assert_eq!(FrameKind::Data, data.kind());
    assert_eq!(0x489, data.raw_id());
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_error_frames_off_by_default() {
    let mut rx = Session::open(VCAN).unwrap();
    inject_error_frame(ErrorClass::BUS_OFF.bits());
    assert!(!rx.wait_for_messages(WAIT).unwrap());
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_echo_own_messages() {
    let config = SessionConfig::new()
        .with_filters(FilterSet::try_from(&[(0x321, 0x7FF)][..]).unwrap())
        .with_receive_own_messages()
        .with_telemetry();
    let mut sess = Session::open_with(VCAN, &config).unwrap();

    let sent = frame(0x321, &[1, 2, 3]);
    sess.send_message(&sent).unwrap();

    assert!(sess.wait_for_messages(WAIT).unwrap());
    let echo = sess.read_message().unwrap();
    assert_eq!(sent.id(), echo.id());
    assert_eq!(sent.data(), echo.data());

    let t = sess.telemetry();
    assert_eq!(1, t.frames_sent);
    assert_eq!(1, t.frames_received);
    assert_eq!(1, t.own_frames);
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_relative_timestamps() {
    let mut rx = listener(0x222);
    rx.set_return_relative_timestamps();
    rx.set_collect_telemetry();
    let mut abs = listener(0x222);
    let mut tx = Session::open(VCAN).unwrap();

    for i in 0..3 {
        tx.send_message(&frame(0x222, &[i])).unwrap();
        thread::sleep(Duration::from_millis(20));
    }

    let msgs = rx.read_queued_messages().unwrap();
    assert_eq!(3, msgs.len());

    let stamps: Vec<Duration> = msgs.iter().filter_map(|m| m.timestamp()).collect();
    assert_eq!(3, stamps.len());
    for ts in &stamps[1..] {
        assert!(*ts >= Duration::from_millis(10), "delta too small: {:?}", ts);
        assert!(*ts < Duration::from_secs(1), "delta too large: {:?}", ts);
    }

    // The same frames, timed from the session start
    let abs_stamps: Vec<Duration> = abs
        .read_queued_messages()
        .unwrap()
        .iter()
        .filter_map(|m| m.timestamp())
        .collect();
    assert_eq!(3, abs_stamps.len());
    let span = abs_stamps[2] - abs_stamps[0];
    assert!(span >= Duration::from_millis(30), "span too small: {:?}", span);
    assert!(
        stamps[2] + Duration::from_millis(10) <= span,
        "not a delta: {:?} vs {:?}",
        stamps[2],
        span
    );

    let t = rx.telemetry();
    assert_eq!(3, t.frames_received);
    assert_eq!(Some(stamps[2]), t.last_interval);
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_telemetry() {
    let mut quiet = listener(0x333);
    let mut counted = listener(0x333);
    counted.set_collect_telemetry();
    counted.set_collect_telemetry();

    let mut tx = Session::open(VCAN).unwrap();
    tx.send_message(&frame(0x333, &[0xAA; 8])).unwrap();

    assert!(counted.wait_for_messages(WAIT).unwrap());
    let before = counted.telemetry();
    counted.read_message().unwrap();
    let after = counted.telemetry();
    assert_eq!(before.frames_received + 1, after.frames_received);
    assert_eq!(8, after.bytes_received);

    assert!(quiet.wait_for_messages(WAIT).unwrap());
    quiet.read_message().unwrap();
    assert_eq!(TelemetrySnapshot::default(), quiet.telemetry());
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_send_rules() {
    let mut sess = Session::open(VCAN).unwrap();

    assert!(matches!(
        sess.send_data(&[1, 2]),
        Err(SendError::NoDefaultSender)
    ));

    let err_frame = CanMessage::new_error(0x40, &[]).unwrap();
    assert!(matches!(
        sess.send_message(&err_frame),
        Err(SendError::ErrorFrame)
    ));

    sess.set_default_sender_id(Some(StandardId::new(0x444).unwrap().into()));
    assert!(matches!(
        sess.send_data(&[0; 9]),
        Err(SendError::TooMuchData(9))
    ));
    sess.send_data(&[1, 2]).unwrap();

    let msgs = [frame(0x444, &[1]), frame(0x444, &[2])];
    assert_eq!(2, sess.send_message_queue(&msgs, Duration::from_millis(1)).unwrap());
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_embedded_can() {
    use candriver::embedded_can::nb::Can;

    let mut rx = listener(0x555);
    let mut tx = Session::open(VCAN).unwrap();

    assert!(matches!(Can::receive(&mut rx), Err(nb::Error::WouldBlock)));

    let msg = <CanMessage as EmbeddedFrame>::new(StandardId::new(0x555).unwrap(), &[5]).unwrap();
    assert!(matches!(Can::transmit(&mut tx, &msg), Ok(None)));

    assert!(rx.wait_for_messages(WAIT).unwrap());
    let got = Can::receive(&mut rx).unwrap();
    assert_eq!(&[5], got.data());
}
