use super::*;
use crate::commands::{CompositeCommand, ZBM_COMMANDS};
use crate::device::{ConnectionState, DeviceField};
use crate::error::ZbmError;
use crate::registers::{REG_APPLICATION, REG_DEVICE, REG_FIRMWARE_VERSION, REG_SERIAL};
use crate::transport::{RegisterTransport, shared};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

type Requests = Arc<Mutex<Vec<(u8, u16, u16)>>>;

/// Answers reads from the devices in `responding`; every other address times out
struct MockTransport {
    responding: HashSet<u8>,
    replies: HashMap<u16, Vec<u16>>,
    requests: Requests,
}

impl MockTransport {
    fn new(responding: &[u8]) -> Self {
        let mut replies = HashMap::new();
        replies.insert(REG_DEVICE, vec![0x10]);
        replies.insert(REG_SERIAL, vec![0x0001, 0x0002]);
        replies.insert(REG_FIRMWARE_VERSION, vec![42, 0]);
        replies.insert(REG_APPLICATION, vec![0x0101, 0]);
        replies.insert(0x9011, vec![300, 0, 500, 0xFF9C, 215, 20, 0]);
        Self {
            responding: responding.iter().copied().collect(),
            replies,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait::async_trait]
impl RegisterTransport for MockTransport {
    async fn read_registers(
        &mut self,
        device_address: u8,
        start: u16,
        count: u16,
    ) -> crate::error::Result<Vec<u16>> {
        self.requests
            .lock()
            .unwrap()
            .push((device_address, start, count));
        if !self.responding.contains(&device_address) {
            return Err(ZbmError::timeout("no reply"));
        }
        Ok(self
            .replies
            .get(&start)
            .cloned()
            .unwrap_or_else(|| vec![0; usize::from(count)]))
    }

    async fn write_register(
        &mut self,
        device_address: u8,
        register: u16,
        value: u16,
    ) -> crate::error::Result<()> {
        self.requests
            .lock()
            .unwrap()
            .push((device_address, register, value));
        Ok(())
    }
}

fn updater() -> Updater {
    Updater::new(
        DeviceRecord::new("/dev/ttyUSB0", 1),
        &AcquisitionConfig::default(),
    )
}

fn read(words: &[u16]) -> Event {
    Event::new(1, EventKind::ReadCompleted(words.to_vec()))
}

fn event(kind: EventKind) -> Event {
    Event::new(1, kind)
}

fn states_of(record: &mut DeviceRecord) -> Arc<Mutex<Vec<ConnectionState>>> {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    record.on_change(DeviceField::ConnectionState, move |r, _| {
        sink.lock().unwrap().push(r.connection_state())
    });
    states
}

/// Drive a fresh updater through identification and one acquisition pass
fn connect(u: &mut Updater) {
    for reply in [&[0x10][..], &[1, 2], &[42, 0], &[0x0101, 0]] {
        u.next_action();
        u.handle(read(reply));
    }
    for _ in &ZBM_COMMANDS {
        u.next_action();
        u.handle(read(&[0; 7]));
    }
    assert_eq!(u.next_action(), Action::Sleep(Duration::from_millis(5000)));
}

#[test]
fn test_happy_path_identifies_and_connects() {
    let mut u = updater();
    let states = states_of(u.record_mut());

    assert_eq!(
        u.next_action(),
        Action::Read {
            start: REG_DEVICE,
            count: 1
        }
    );
    assert_eq!(u.record().connection_state(), ConnectionState::Searching);
    u.handle(read(&[0x10]));

    assert_eq!(
        u.next_action(),
        Action::Read {
            start: REG_SERIAL,
            count: 2
        }
    );
    u.handle(read(&[0x0001, 0x0002]));
    assert_eq!(u.record().serial(), "2");

    assert_eq!(
        u.next_action(),
        Action::Read {
            start: REG_FIRMWARE_VERSION,
            count: 2
        }
    );
    u.handle(read(&[42, 0]));
    assert_eq!(u.record().firmware_version(), 42);

    // Settings are created and the setup check issued without waiting
    assert_eq!(
        u.next_action(),
        Action::Read {
            start: REG_APPLICATION,
            count: 2
        }
    );
    assert_eq!(u.record().connection_state(), ConnectionState::Detected);
    assert_eq!(u.record().settings().unwrap().serial(), "2");
    u.handle(read(&[0x0101, 0]));
    assert_eq!(u.application(), 0x0101);

    for cmd in &ZBM_COMMANDS {
        assert_eq!(
            u.next_action(),
            Action::Read {
                start: cmd.register,
                count: 7
            }
        );
        assert_ne!(u.record().connection_state(), ConnectionState::Connected);
        u.handle(read(&[0; 7]));
    }

    assert_eq!(u.next_action(), Action::Sleep(Duration::from_millis(5000)));
    assert_eq!(u.phase(), Phase::Wait);
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            ConnectionState::Searching,
            ConnectionState::Detected,
            ConnectionState::Connected
        ]
    );
}

#[test]
fn test_wait_expiry_restarts_table() {
    let mut u = updater();
    connect(&mut u);
    u.handle(event(EventKind::TimerExpired));
    assert_eq!(
        u.next_action(),
        Action::Read {
            start: 0x9011,
            count: 7
        }
    );
}

#[test]
fn test_acquisition_reply_is_decoded() {
    let mut u = updater();
    connect(&mut u);
    u.handle(event(EventKind::TimerExpired));
    u.next_action();
    u.handle(read(&[300, 0, 500, 0xFF9C, 215, 20, 0]));

    let r = u.record();
    assert!((r.battery_voltage() - 50.0).abs() < 1e-9);
    assert!((r.battery_current() - 10.0).abs() < 1e-9);
    assert!((r.soc() - 3.0).abs() < 1e-9);
    assert!((r.battery_temperature() - 21.5).abs() < 1e-9);
    assert_eq!(r.air_temperature(), 20);
}

#[test]
fn test_short_reply_updates_present_fields_only() {
    let mut u = updater();
    connect(&mut u);
    u.handle(event(EventKind::TimerExpired));
    u.next_action();
    u.handle(read(&[300]));
    assert!((u.record().soc() - 3.0).abs() < 1e-9);
    assert_eq!(u.record().battery_voltage(), 0.0);
    assert_eq!(
        u.next_action(),
        Action::Read {
            start: 0x9001,
            count: 7
        }
    );
}

#[test]
fn test_five_timeouts_lose_connection() {
    let mut u = updater();
    connect(&mut u);
    u.handle(event(EventKind::TimerExpired));

    for _ in 0..4 {
        assert_eq!(
            u.next_action(),
            Action::Read {
                start: 0x9011,
                count: 7
            }
        );
        u.handle(event(EventKind::Timeout));
        assert_eq!(u.record().connection_state(), ConnectionState::Connected);
    }
    u.next_action();
    u.handle(event(EventKind::Timeout));

    assert_eq!(u.record().connection_state(), ConnectionState::Disconnected);
    assert_eq!(u.record().serial(), "");
    assert!(u.record().settings().is_none());
    assert_eq!(u.timeout_count(), 4);
    assert_eq!(u.next_action(), Action::Sleep(Duration::from_secs(60)));

    u.handle(event(EventKind::TimerExpired));
    assert_eq!(
        u.next_action(),
        Action::Read {
            start: REG_DEVICE,
            count: 1
        }
    );
    assert_eq!(u.record().connection_state(), ConnectionState::Searching);

    // One more silence after a loss is enough
    u.handle(event(EventKind::Timeout));
    assert_eq!(u.phase(), Phase::Lost);
}

#[test]
fn test_last_values_survive_exception_and_loss() {
    let mut u = updater();
    connect(&mut u);
    u.handle(event(EventKind::TimerExpired));
    u.next_action();
    u.handle(read(&[300, 12, 500, 0xFF9C, 215, 20, 0]));
    u.next_action();
    u.handle(read(&[7, 1, 2, 3, 0, 0, 0]));

    // Exception on the next block leaves everything decoded so far
    u.next_action();
    u.handle(event(EventKind::Exception(0x04)));
    assert!((u.record().soc() - 3.0).abs() < 1e-9);
    assert_eq!(u.record().status_summary(), 7);

    for _ in 0..5 {
        u.next_action();
        u.handle(event(EventKind::Timeout));
    }

    let r = u.record();
    assert_eq!(r.connection_state(), ConnectionState::Disconnected);
    assert_eq!(r.serial(), "");
    assert!((r.soc() - 3.0).abs() < 1e-9);
    assert!((r.battery_voltage() - 50.0).abs() < 1e-9);
    assert!((r.battery_current() - 10.0).abs() < 1e-9);
    assert_eq!(r.soc_amp_hours(), 12);
    assert_eq!(r.status_summary(), 7);
    assert_eq!(r.status_hardware_failure(), 1);
    assert_eq!(r.status_warning(), 3);
}

#[test]
fn test_reply_resets_timeout_count() {
    let mut u = updater();
    connect(&mut u);
    u.handle(event(EventKind::TimerExpired));
    for _ in 0..4 {
        u.next_action();
        u.handle(event(EventKind::Timeout));
    }
    u.next_action();
    u.handle(read(&[0; 7]));
    assert_eq!(u.timeout_count(), 0);
    for _ in 0..4 {
        u.next_action();
        u.handle(event(EventKind::Timeout));
    }
    assert_eq!(u.record().connection_state(), ConnectionState::Connected);
}

#[test]
fn test_exception_advances_without_data() {
    let mut u = updater();
    u.next_action();
    u.handle(read(&[0x10]));
    u.next_action();
    u.handle(event(EventKind::Exception(0x02)));
    assert_eq!(u.record().serial(), "");
    assert_eq!(u.phase(), Phase::Identify(IdentifyStep::Firmware));

    let mut u = updater();
    connect(&mut u);
    u.handle(event(EventKind::TimerExpired));
    u.next_action();
    u.handle(event(EventKind::Exception(0x04)));
    assert_eq!(u.record().soc(), 0.0);
    assert_eq!(
        u.next_action(),
        Action::Read {
            start: 0x9001,
            count: 7
        }
    );
}

#[test]
fn test_exception_does_not_touch_timeout_count() {
    let mut u = updater();
    u.next_action();
    u.handle(event(EventKind::Timeout));
    u.handle(event(EventKind::Timeout));
    u.handle(event(EventKind::Exception(0x06)));
    assert_eq!(u.timeout_count(), 2);
}

#[test]
fn test_events_for_other_devices_are_ignored() {
    let mut u = updater();
    u.next_action();
    u.handle(Event::new(7, EventKind::ReadCompleted(vec![0x10])));
    u.handle(Event::new(7, EventKind::Timeout));
    assert_eq!(u.phase(), Phase::Identify(IdentifyStep::Device));
    assert_eq!(u.timeout_count(), 0);
}

#[test]
fn test_unexpected_reply_without_settings_reidentifies() {
    let mut u = updater();
    u.next_action();
    for _ in 0..5 {
        u.handle(event(EventKind::Timeout));
    }
    assert_eq!(u.phase(), Phase::Lost);
    u.handle(read(&[1]));
    assert_eq!(u.phase(), Phase::Identify(IdentifyStep::Device));
}

#[test]
fn test_write_ack_returns_to_acquisition() {
    let mut u = updater();
    connect(&mut u);
    u.handle(event(EventKind::WriteCompleted {
        register: 0x9008,
        value: 1,
    }));
    assert_eq!(u.phase(), Phase::Acquire);
}

#[test]
fn test_interval_commands_run_in_their_cycle() {
    let mut sparse = ZBM_COMMANDS[3];
    sparse.interval = 1;
    let table: &'static [CompositeCommand] =
        Box::leak(vec![ZBM_COMMANDS[0], sparse].into_boxed_slice());
    let config = AcquisitionConfig {
        cycle_count: 2,
        ..Default::default()
    };
    let mut u = Updater::new(DeviceRecord::new("/dev/ttyUSB0", 1), &config).with_commands(table);
    for reply in [&[0x10][..], &[1, 2], &[42, 0], &[0x0101, 0]] {
        u.next_action();
        u.handle(read(reply));
    }

    // Cycle 0: the sparse command is skipped and the pass is not complete yet
    assert_eq!(
        u.next_action(),
        Action::Read {
            start: 0x9011,
            count: 7
        }
    );
    u.handle(read(&[0; 7]));
    assert!(matches!(u.next_action(), Action::Sleep(_)));
    assert_eq!(u.cycle_index(), 1);
    assert_eq!(u.record().connection_state(), ConnectionState::Detected);

    // Cycle 1: both commands run and the pass wraps
    u.handle(event(EventKind::TimerExpired));
    u.next_action();
    u.handle(read(&[0; 7]));
    assert_eq!(
        u.next_action(),
        Action::Read {
            start: 0x9017,
            count: 7
        }
    );
    u.handle(read(&[0; 7]));
    assert!(matches!(u.next_action(), Action::Sleep(_)));
    assert_eq!(u.cycle_index(), 0);
    assert_eq!(u.record().connection_state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_session_connects_and_publishes_snapshots() {
    let mock = MockTransport::new(&[1]);
    let mut session = DeviceSession::new(
        DeviceRecord::new("/dev/ttyUSB0", 1),
        shared(mock),
        &AcquisitionConfig::default(),
    );
    let mut snapshots = session.subscribe_snapshot();
    let shutdown = session.shutdown_sender();
    let handle = tokio::spawn(async move {
        let result = session.run().await;
        (result, session)
    });

    snapshots
        .wait_for(|s| s.connection_state == ConnectionState::Connected)
        .await
        .unwrap();
    {
        let snapshot = snapshots.borrow();
        assert_eq!(snapshot.serial, "2");
        assert_eq!(snapshot.firmware_version, 42);
        assert!((snapshot.battery_voltage - 50.0).abs() < 1e-9);
        assert!(snapshot.settings.is_some());
    }

    shutdown.send(()).unwrap();
    let (result, _) = handle.await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_session_applies_commands_while_waiting() {
    let mut session = DeviceSession::new(
        DeviceRecord::new("/dev/ttyUSB0", 1),
        shared(MockTransport::new(&[1])),
        &AcquisitionConfig::default(),
    );
    let mut snapshots = session.subscribe_snapshot();
    let commands = session.command_sender();
    let shutdown = session.shutdown_sender();
    let handle = tokio::spawn(async move {
        let result = session.run().await;
        (result, session)
    });

    snapshots
        .wait_for(|s| s.connection_state == ConnectionState::Connected)
        .await
        .unwrap();
    commands
        .send(DeviceCommand::SetCustomName("Bank A".to_string()))
        .unwrap();
    commands
        .send(DeviceCommand::Write {
            field: DeviceField::RequestImmediateSelfMaintenance,
            value: 1,
        })
        .unwrap();
    snapshots
        .wait_for(|s| {
            s.settings
                .as_ref()
                .is_some_and(|settings| settings.custom_name() == "Bank A")
        })
        .await
        .unwrap();

    shutdown.send(()).unwrap();
    let (_, session) = handle.await.unwrap();
    assert_eq!(
        session
            .record()
            .raw(DeviceField::RequestImmediateSelfMaintenance),
        Some(1)
    );
}

#[tokio::test(start_paused = true)]
async fn test_sessions_share_one_transport() {
    let mock = MockTransport::new(&[1]);
    let requests = mock.requests.clone();
    let transport = shared(mock);
    let config = AcquisitionConfig::default();

    let mut live = DeviceSession::new(DeviceRecord::new("/dev/ttyUSB0", 1), transport.clone(), &config);
    let mut silent = DeviceSession::new(DeviceRecord::new("/dev/ttyUSB0", 2), transport, &config);
    let silent_states = states_of(silent.record_mut());

    let mut live_snapshots = live.subscribe_snapshot();
    let shutdowns = [live.shutdown_sender(), silent.shutdown_sender()];
    let live_task = tokio::spawn(async move { live.run().await });
    let silent_task = tokio::spawn(async move { silent.run().await });

    live_snapshots
        .wait_for(|s| s.connection_state == ConnectionState::Connected)
        .await
        .unwrap();
    while !silent_states
        .lock()
        .unwrap()
        .contains(&ConnectionState::Disconnected)
    {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for tx in &shutdowns {
        tx.send(()).unwrap();
    }
    assert!(live_task.await.unwrap().is_ok());
    assert!(silent_task.await.unwrap().is_ok());

    let requests = requests.lock().unwrap();
    let silent_reads: Vec<_> = requests.iter().filter(|r| r.0 == 2).take(5).collect();
    assert_eq!(silent_reads.len(), 5);
    assert!(silent_reads.iter().all(|r| r.1 == REG_DEVICE && r.2 == 1));
    assert_eq!(
        silent_states.lock().unwrap()[..2],
        [ConnectionState::Searching, ConnectionState::Disconnected]
    );
}
