// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flight software bootstrap.
//!
//! Wires the runtime together: message bus, event module (installed as
//! the bus's diagnostic sink), task manager, and telemetry producer,
//! plus a downlink task that drains a pipe subscribed to telemetry and
//! event packets and prints them. Initialization failures are collected
//! into a module bitmask and reported through a single init-error event;
//! the process then exits nonzero.
//!
//! The main thread registers itself as a monitor task and idles in the
//! cooperative shutdown protocol: Ctrl-C (or the optional deadline)
//! requests a stop, the scheduler winds everything down, and the
//! process exits 0.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use abi::{
    EventRecord, HealthAndStatus, ModuleId, PacketId, TaskId,
    EVENT_ID_INIT_ERROR,
};
use anyhow::Context;
use clap::Parser;
use events::EventMessenger;
use msgbus::MessageBus;
use osal::Timeout;
use sched::TaskManager;
use telemetry::Telemetry;
use zerocopy::FromBytes;

const MAIN_TASK_ID: TaskId = TaskId(1);
const TELEMETRY_TASK_ID: TaskId = TaskId(2);
const DOWNLINK_TASK_ID: TaskId = TaskId(3);

/// Largest packet the downlink pipe must carry.
const DOWNLINK_MSG_SIZE: usize = std::mem::size_of::<HealthAndStatus>();

#[derive(Parser)]
#[command(name = "fsw", about = "flight software runtime")]
struct Options {
    /// Shut down after this many seconds; runs until Ctrl-C if unset.
    #[arg(long)]
    run_seconds: Option<u64>,

    /// Schedule period of the downlink drain task, in slots.
    #[arg(long, default_value_t = 10)]
    downlink_period_slots: u32,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    match run(Options::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(options: Options) -> anyhow::Result<()> {
    let bus = Arc::new(MessageBus::new());
    let events = Arc::new(EventMessenger::new(Arc::clone(&bus)));
    bus.set_event_sink(Arc::clone(&events) as Arc<dyn abi::EventSink>);

    // Bits in this mask mark modules that failed to come up.
    let mut module_failures: u64 = 0;

    let manager = match TaskManager::new() {
        Ok(manager) => manager,
        Err(error) => {
            // Without a task manager nothing can run; report what we
            // can and give up.
            events.event(
                ModuleId::Init,
                EVENT_ID_INIT_ERROR,
                line!(),
                [0, 1 << ModuleId::Tm as u32, 0, 0, 0],
            );
            anyhow::bail!("task manager initialization failed: {error:?}");
        }
    };

    if manager.monitor_task("main", MAIN_TASK_ID).is_err() {
        module_failures |= 1 << ModuleId::Init as u32;
    }

    let telemetry = Telemetry::new(
        Arc::clone(&bus),
        Arc::clone(&events),
        Arc::clone(&manager),
    );
    if telemetry.attach(TELEMETRY_TASK_ID).is_err() {
        module_failures |= 1 << ModuleId::Tlm as u32;
    }

    match setup_downlink(&bus, &manager, options.downlink_period_slots) {
        Ok(()) => {}
        Err(module) => module_failures |= 1 << module as u32,
    }

    let tasks_started = manager.start().is_ok();

    if module_failures != 0 || !tasks_started {
        events.event(
            ModuleId::Init,
            EVENT_ID_INIT_ERROR,
            line!(),
            [
                (module_failures >> 32) as u32,
                module_failures as u32,
                u32::from(tasks_started),
                0,
                0,
            ],
        );
        anyhow::bail!(
            "initialization failed: module mask {module_failures:#x}, \
             tasks started: {tasks_started}"
        );
    }

    {
        let manager = Arc::clone(&manager);
        ctrlc::set_handler(move || manager.stop())
            .context("installing the shutdown handler")?;
    }

    let deadline = options
        .run_seconds
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));

    log::info!("flight software running");
    while manager.running(MAIN_TASK_ID) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            manager.stop();
        }
        osal::time::task_delay(10);
    }

    // Give the scheduler a moment to wake the workers before the
    // process tears their threads down.
    osal::time::task_delay(2 * sched::TICKS_PER_SLOT);
    log::info!("shutdown complete");
    Ok(())
}

/// Creates the downlink pipe, subscribes it to telemetry and event
/// packets, and registers the periodic task that drains it. Returns the
/// module to blame on failure.
fn setup_downlink(
    bus: &Arc<MessageBus>,
    manager: &Arc<TaskManager>,
    period_slots: u32,
) -> Result<(), ModuleId> {
    let pipe = bus
        .create_pipe(16, DOWNLINK_MSG_SIZE)
        .map_err(|_| ModuleId::Mb)?;
    bus.register_packet(pipe, PacketId::HealthAndStatus)
        .map_err(|_| ModuleId::Mb)?;
    bus.register_packet(pipe, PacketId::Event)
        .map_err(|_| ModuleId::Mb)?;

    let drain_bus = Arc::clone(bus);
    let drain_manager = Arc::clone(manager);
    manager
        .periodic_task(
            "downlink",
            DOWNLINK_TASK_ID,
            move || {
                while drain_manager.running(DOWNLINK_TASK_ID) {
                    drain(&drain_bus, pipe);
                }
            },
            period_slots,
            2 * period_slots,
            abi::DEFAULT_STACK_SIZE,
            abi::Priority(30),
        )
        .map_err(|_| ModuleId::Init)?;
    Ok(())
}

/// Empties the downlink pipe, printing each packet.
fn drain(bus: &MessageBus, pipe: abi::PipeId) {
    let mut buffer = [0u8; DOWNLINK_MSG_SIZE];
    while let Ok(n) = bus.receive(pipe, &mut buffer, Timeout::NoWait) {
        print_packet(&buffer[..n]);
    }
}

fn print_packet(frame: &[u8]) {
    let Ok((header, _)) = abi::MsgHeader::read_from_prefix(frame) else {
        log::warn!("downlink: runt frame of {} bytes", frame.len());
        return;
    };
    match header.packet_id() {
        Some(PacketId::Event) => {
            match EventRecord::read_from_bytes(frame) {
                Ok(record) => log::warn!(
                    "event: module {:?} id {} line {} params {:?}",
                    ModuleId::from_raw(record.module.get()),
                    record.event_id.get(),
                    record.line_number.get(),
                    record.params.map(|p| p.get()),
                ),
                Err(_) => log::warn!(
                    "downlink: malformed event record ({} bytes)",
                    frame.len()
                ),
            }
        }
        Some(PacketId::HealthAndStatus) => {
            match HealthAndStatus::read_from_bytes(frame) {
                Ok(packet) => log::info!(
                    "health: cycle {} telemetry {} events {} bus {}",
                    packet.tm.cycle.get(),
                    packet.tlm.telemetry_sent.get(),
                    packet.em.messages_sent.get(),
                    packet.mb.messages_sent.get(),
                ),
                Err(_) => log::warn!(
                    "downlink: malformed health packet ({} bytes)",
                    frame.len()
                ),
            }
        }
        other => {
            log::debug!(
                "downlink: packet id {other:?}, {} payload bytes",
                header.length.get()
            );
        }
    }
}
