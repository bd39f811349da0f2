// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Whole-system scenarios: boot the full runtime with the real slot
//! timer, watch telemetry and events arrive on a ground pipe, and wind
//! it down cooperatively.

use std::sync::Arc;

use abi::{
    EventRecord, EventSink, HealthAndStatus, ModuleId, PacketId, PipeId,
    TaskId, HEADER_SIZE,
};
use events::EventMessenger;
use msgbus::MessageBus;
use osal::{time, Timeout};
use sched::TaskManager;
use telemetry::Telemetry;
use zerocopy::FromBytes;

const MAIN_TASK_ID: TaskId = TaskId(1);
const TELEMETRY_TASK_ID: TaskId = TaskId(2);

const GROUND_MSG_SIZE: usize = std::mem::size_of::<HealthAndStatus>();

struct System {
    bus: Arc<MessageBus>,
    events: Arc<EventMessenger>,
    manager: Arc<TaskManager>,
    ground: PipeId,
}

/// Builds the system the way the bootstrap does: bus, events wired in
/// as the bus sink, task manager, telemetry task, a monitor record for
/// the test's own context, and a ground pipe watching telemetry and
/// event traffic.
fn boot() -> System {
    let bus = Arc::new(MessageBus::new());
    let events = Arc::new(EventMessenger::new(Arc::clone(&bus)));
    bus.set_event_sink(Arc::clone(&events) as Arc<dyn EventSink>);

    let manager = TaskManager::new().unwrap();
    manager.monitor_task("main", MAIN_TASK_ID).unwrap();

    let telemetry = Telemetry::new(
        Arc::clone(&bus),
        Arc::clone(&events),
        Arc::clone(&manager),
    );
    telemetry.attach(TELEMETRY_TASK_ID).unwrap();

    let ground = bus.create_pipe(32, GROUND_MSG_SIZE).unwrap();
    bus.register_packet(ground, PacketId::HealthAndStatus).unwrap();
    bus.register_packet(ground, PacketId::Event).unwrap();

    manager.start().unwrap();
    System {
        bus,
        events,
        manager,
        ground,
    }
}

fn drain(system: &System) -> (Vec<HealthAndStatus>, Vec<EventRecord>) {
    let mut health = Vec::new();
    let mut events = Vec::new();
    let mut buffer = [0u8; GROUND_MSG_SIZE];
    while let Ok(n) =
        system
            .bus
            .receive(system.ground, &mut buffer, Timeout::NoWait)
    {
        let frame = &buffer[..n];
        let (header, _) = abi::MsgHeader::read_from_prefix(frame).unwrap();
        match header.packet_id() {
            Some(PacketId::HealthAndStatus) => {
                health.push(HealthAndStatus::read_from_bytes(frame).unwrap());
            }
            Some(PacketId::Event) => {
                events.push(EventRecord::read_from_bytes(frame).unwrap());
            }
            other => panic!("unexpected packet on the ground pipe: {other:?}"),
        }
    }
    (health, events)
}

#[test]
fn boot_publish_and_cooperative_shutdown() {
    let system = boot();

    // Telemetry publishes at 1 Hz; run long enough for two
    // publications plus margin.
    time::task_delay(250);

    // raise a couple of events mid-flight
    system.events.event(ModuleId::Em, 42, 7, [1, 2, 3, 4, 5]);
    system.events.event(ModuleId::Em, 43, 8, [0; 5]);
    time::task_delay(120);

    assert!(system.manager.running(MAIN_TASK_ID));
    system.manager.stop();
    time::task_delay(10);
    assert!(!system.manager.running(MAIN_TASK_ID));

    let (health, event_records) = drain(&system);
    assert!(
        health.len() >= 2,
        "expected at least two health packets, got {}",
        health.len()
    );
    assert_eq!(event_records.len(), 2);
    assert_eq!(event_records[0].event_id.get(), 42);
    assert_eq!(event_records[0].module.get(), ModuleId::Em as u32);
    assert_eq!(
        event_records[0].params.map(|p| p.get()),
        [1, 2, 3, 4, 5]
    );

    // the scheduler saw every slot and released the telemetry task
    let status = system.manager.get_status();
    assert!(status.cycle.get() >= 200, "cycle {}", status.cycle.get());
    assert_ne!(
        status.tasks_scheduled.get() & (1 << TELEMETRY_TASK_ID.0),
        0
    );
    assert_eq!(
        status.tasks_missed_heartbeat.get()
            & (1 << TELEMETRY_TASK_ID.0),
        0
    );
}

#[test]
fn event_task_round_trip_through_the_running_system() {
    use std::sync::atomic::{AtomicU32, Ordering};

    let system = boot();

    // An event task serviced by external signals, alongside the
    // scheduler-driven ones.
    let responder_id = TaskId(3);
    let handled = Arc::new(AtomicU32::new(0));
    // Registration is closed once the system is up, so build a second
    // system for the event task; this also keeps the ground traffic
    // above uncontaminated.
    let manager = TaskManager::new().unwrap();
    {
        let worker_manager = Arc::clone(&manager);
        let handled = Arc::clone(&handled);
        manager
            .event_task(
                "responder",
                responder_id,
                move || {
                    while worker_manager.next_event(responder_id) {
                        handled.fetch_add(1, Ordering::SeqCst);
                    }
                },
                // generous window: signals arrive at human cadence here
                10 * sched::SLOTS_PER_SECOND,
                abi::DEFAULT_STACK_SIZE,
                abi::Priority(20),
            )
            .unwrap();
    }
    manager.start().unwrap();

    for _ in 0..3 {
        manager.signal(responder_id).unwrap();
    }
    let deadline = std::time::Instant::now()
        + std::time::Duration::from_secs(5);
    while handled.load(Ordering::SeqCst) < 3 {
        assert!(
            std::time::Instant::now() < deadline,
            "event task never caught up"
        );
        time::task_delay(1);
    }

    // no heartbeat misses for the responder, and shutdown releases it
    // from its gate
    assert_eq!(
        manager.get_status().tasks_missed_heartbeat.get()
            & (1 << responder_id.0),
        0
    );
    manager.stop();
    time::task_delay(10);
    assert!(!manager.running(responder_id));

    system.manager.stop();
}

#[test]
fn failed_initialization_reports_a_single_init_error_event() {
    let system = boot();

    // Emulate the bootstrap's failure path: modules 1 (init) and 4
    // (telemetry) failed, tasks started anyway.
    let failures: u64 = (1 << ModuleId::Init as u32)
        | (1 << ModuleId::Tlm as u32);
    system.events.event(
        ModuleId::Init,
        abi::EVENT_ID_INIT_ERROR,
        1,
        [(failures >> 32) as u32, failures as u32, 1, 0, 0],
    );

    system.manager.stop();
    time::task_delay(10);

    let (_health, events) = drain(&system);
    assert_eq!(events.len(), 1);
    let record = &events[0];
    assert_eq!(record.module.get(), ModuleId::Init as u32);
    assert_eq!(record.event_id.get(), abi::EVENT_ID_INIT_ERROR);
    assert_eq!(record.params[0].get(), 0);
    assert_eq!(record.params[1].get(), failures as u32);
    assert_eq!(record.params[2].get(), 1);
}

#[test]
fn health_packet_counters_are_monotonic() {
    let system = boot();

    // several publications with event traffic in between
    for burst in 0..3u32 {
        time::task_delay(120);
        system
            .events
            .event(ModuleId::Mb, 1, burst, [burst, 0, 0, 0, 0]);
    }
    system.manager.stop();
    time::task_delay(10);

    let (health, _events) = drain(&system);
    assert!(health.len() >= 2);

    for pair in health.windows(2) {
        let (earlier, later) = (&pair[0], &pair[1]);
        assert!(
            later.tlm.telemetry_sent.get()
                >= earlier.tlm.telemetry_sent.get()
        );
        assert!(
            later.mb.messages_sent.get() >= earlier.mb.messages_sent.get()
        );
        assert!(
            later.em.messages_sent.get() >= earlier.em.messages_sent.get()
        );
        assert!(later.tm.cycle.get() >= earlier.tm.cycle.get());
    }

    // headers all claim the same fixed payload
    for packet in &health {
        assert_eq!(
            usize::from(packet.header.length.get()) + HEADER_SIZE,
            GROUND_MSG_SIZE
        );
    }
}
