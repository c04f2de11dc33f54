//! pirbeacon — PIR presence beacon firmware
//!
//! Sleeps until the PIR sensor fires, then broadcasts a one-minute presence
//! summary as a non-connectable BLE advertisement every minute, until the
//! room has been empty for ten minutes.
//!
//! One task owns the aggregator, its timer queue and the PIR input, so the
//! aggregator's entry points never interleave. The radio runs in `main` and
//! is only reached through `RADIO_CHANNEL`.

#![no_std]
#![no_main]

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

#[cfg(not(any(feature = "xiao", feature = "m5stickc")))]
compile_error!("select a board feature: `xiao` or `m5stickc`");

use core::cell::Cell;
use critical_section::Mutex;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use static_cell::StaticCell;

use trouble_host::prelude::*;

use pirbeacon::aggregator::{PresenceAggregator, Snapshot, Transition};
use pirbeacon::config::AggregatorConfig;
use pirbeacon::packet::{self, PACKET_LEN};
use pirbeacon::platform::{Broadcaster, MotionInput, TimerHandle, TimerKind, TimerService};
use pirbeacon::protocol::{MsgBuffer, VERSION};
use pirbeacon::timers::TimerQueue;
use pirbeacon::{board, comm};

/// Fire-and-forget commands for the radio loop
enum RadioCommand {
    Start([u8; PACKET_LEN]),
    Stop,
}

// ── Channel type aliases ──────────────────────────────────────────────

type RadioChannel = Channel<CriticalSectionRawMutex, RadioCommand, 4>;
type OutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 8>;

// ── Static channels and shared state ─────────────────────────────────

/// Radio commands from the presence task to the advertising loop
static RADIO_CHANNEL: RadioChannel = Channel::new();

/// Serialized NDJSON lines for the serial log
static OUTPUT_CHANNEL: OutputChannel = Channel::new();

/// Last aggregator snapshot, for the status task
static SNAPSHOT: Mutex<Cell<Snapshot>> = Mutex::new(Cell::new(Snapshot::dormant()));

fn uptime_millis_u32() -> u32 {
    (Instant::now().as_millis() & 0xFFFF_FFFF) as u32
}

fn send_output(buf: Option<MsgBuffer>) {
    if let Some(buf) = buf {
        let _ = OUTPUT_CHANNEL.try_send(buf);
    }
}

// ── Platform binding for the aggregator ──────────────────────────────

/// Hardware seen by the aggregator during one dispatch.
struct NodeHw<'a> {
    pir: &'a Input<'static>,
    timers: &'a mut TimerQueue,
}

impl Broadcaster for NodeHw<'_> {
    fn start_broadcast(&mut self, payload: &[u8; PACKET_LEN]) {
        if RADIO_CHANNEL.try_send(RadioCommand::Start(*payload)).is_err() {
            log::warn!("Radio queue full, packet dropped");
        }
    }

    fn stop_broadcast(&mut self) {
        if RADIO_CHANNEL.try_send(RadioCommand::Stop).is_err() {
            log::warn!("Radio queue full, stop dropped");
        }
    }
}

impl TimerService for NodeHw<'_> {
    fn schedule(&mut self, kind: TimerKind, period_ms: u32, repeating: bool) -> TimerHandle {
        self.timers.schedule(kind, period_ms, repeating)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.cancel(handle);
    }
}

impl MotionInput for NodeHw<'_> {
    fn is_high(&self) -> bool {
        self.pir.is_high()
    }
}

fn report(transition: &Transition) {
    if let Some(msg) = comm::transition_message(transition, uptime_millis_u32()) {
        send_output(comm::encode_message(&msg));
    }
}

fn set_led(led: &mut Output<'static>, on: bool) {
    if on != board::LED_ACTIVE_LOW {
        led.set_high();
    } else {
        led.set_low();
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Heap for the BLE controller
    esp_alloc::heap_allocator!(size: 64 * 1024);

    // Start the RTOS — requires timer + software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("pirbeacon v{} starting on {}", VERSION, board::BOARD_NAME);

    // Hold power on (M5StickC Plus2 needs GPIO4 HIGH to stay powered)
    #[cfg(feature = "m5stickc")]
    let _power_hold = Output::new(peripherals.GPIO4, Level::High, OutputConfig::default());

    #[cfg(feature = "xiao")]
    let (pir_pin, led_pin) = (peripherals.GPIO1, peripherals.GPIO21);
    #[cfg(feature = "m5stickc")]
    let (pir_pin, led_pin) = (peripherals.GPIO36, peripherals.GPIO19);

    let pull = if board::PIR_PULL_DOWN { Pull::Down } else { Pull::None };
    let pir = Input::new(pir_pin, InputConfig::default().with_pull(pull));

    let idle_level = if board::LED_ACTIVE_LOW { Level::High } else { Level::Low };
    let mut led = Output::new(led_pin, idle_level, OutputConfig::default());

    spawner.spawn(presence_task(pir)).unwrap();
    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(status_task()).unwrap();

    // ── BLE radio initialization ───────────────────────────────────────

    let connector =
        esp_radio::ble::controller::BleConnector::new(peripherals.BT, Default::default())
            .expect("BLE connector init failed");

    let controller: ExternalController<_, 20> = ExternalController::new(connector);

    static HOST_RESOURCES: StaticCell<HostResources<DefaultPacketPool, 1, 2>> = StaticCell::new();
    let resources = HOST_RESOURCES.init(HostResources::new());

    let address = Address::random(board::BLE_ADDRESS);

    let stack = trouble_host::new(controller, resources).set_random_address(address);
    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    log::info!("BLE radio initialized, waiting for motion");

    let params = AdvertisementParameters {
        interval_min: Duration::from_millis(board::ADV_INTERVAL_MS),
        interval_max: Duration::from_millis(board::ADV_INTERVAL_MS),
        ..Default::default()
    };

    // ── BLE orchestration ──────────────────────────────────────────────
    //
    // Two concurrent futures via join:
    //   1. BLE stack runner (drives HCI)
    //   2. Broadcaster (advertise on Start, drop the advertiser on Stop)

    let _ = embassy_futures::join::join(
        // ── Runner: drives the BLE stack ────────────────────────────────
        async {
            loop {
                if let Err(e) = runner.run().await {
                    log::error!("BLE runner error: {:?}", e);
                    Timer::after(Duration::from_secs(1)).await;
                }
            }
        },
        // ── Broadcaster: one advertisement per presence packet ──────────
        async {
            let radio_rx = RADIO_CHANNEL.receiver();
            let mut command = radio_rx.receive().await;

            loop {
                let payload = match command {
                    RadioCommand::Stop => {
                        set_led(&mut led, false);
                        command = radio_rx.receive().await;
                        continue;
                    }
                    RadioCommand::Start(payload) => payload,
                };

                let adv_data = packet::ad_structure(&payload);
                let advertiser = match peripheral
                    .advertise(
                        &params,
                        Advertisement::NonconnectableNonscannableUndirected {
                            adv_data: &adv_data[..],
                        },
                    )
                    .await
                {
                    Ok(adv) => adv,
                    Err(e) => {
                        log::error!("BLE advertise error: {:?}", e);
                        set_led(&mut led, false);
                        command = radio_rx.receive().await;
                        continue;
                    }
                };

                set_led(&mut led, true);
                log::debug!("Advertising presence packet");

                command = radio_rx.receive().await;
                // Dropping the advertiser stops advertising.
                drop(advertiser);
            }
        },
    )
    .await;
}

/// Presence task: owns the aggregator and drives it from PIR edges and
/// its own timer deadlines.
#[embassy_executor::task]
async fn presence_task(mut pir: Input<'static>) {
    log::info!("Presence task started, PIR on GPIO{}", board::PIR_PIN);

    let mut aggregator = PresenceAggregator::new(AggregatorConfig::new());
    let mut timers = TimerQueue::new();
    let boot = Instant::now();

    loop {
        let wake = match timers.next_deadline() {
            Some(deadline) => {
                let at = boot + Duration::from_millis(deadline);
                select(pir.wait_for_rising_edge(), Timer::at(at)).await
            }
            None => {
                pir.wait_for_rising_edge().await;
                Either::First(())
            }
        };

        timers.advance_to(boot.elapsed().as_millis());
        let mut hw = NodeHw {
            pir: &pir,
            timers: &mut timers,
        };

        // Timers that expired first are handled before the edge.
        while let Some(kind) = hw.timers.pop_due() {
            let transition = aggregator.on_timer(kind, &mut hw);
            report(&transition);
        }

        if let Either::First(()) = wake {
            let transition = aggregator.on_detection(&mut hw);
            report(&transition);
        }

        let snapshot = aggregator.snapshot();
        critical_section::with(|cs| SNAPSHOT.borrow(cs).set(snapshot));
    }
}

/// Serial output task: reads from output channel and logs each line.
#[embassy_executor::task]
async fn output_serial_task() {
    log::info!("Serial output task started");

    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;

        if let Ok(s) = core::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}

/// Periodic status reporting task
#[embassy_executor::task]
async fn status_task() {
    loop {
        Timer::after(Duration::from_secs(comm::STATUS_INTERVAL_SECS)).await;

        let snapshot = critical_section::with(|cs| SNAPSHOT.borrow(cs).get());
        let uptime_secs = (Instant::now().as_millis() / 1000) as u32;

        let msg = comm::status_message(
            &snapshot,
            uptime_secs,
            esp_alloc::HEAP.free() as u32,
            board::BOARD_NAME,
        );
        send_output(comm::encode_message(&msg));
    }
}
