#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};
use embassy_sync::pipe::Pipe;
use hal::{self, clocks::Clocks, pac};

use turntable_algo::config::{COMMAND_QUEUE_CAPACITY, SAMPLE_QUEUE_CAPACITY};
use turntable_algo::telemetry::TelemetrySink;
use turntable_algo::{
    Command, CommandParser, DurationSample, FrequencyCounter, Outputs, SpeedConfig, SpeedController,
};
use turntable_drivers::{clock, pinout, pwm, serial, status::StatusPin};

use cortex_m;

type Mutex = CriticalSectionRawMutex;

const TELEMETRY_BUF: usize = 256;
const PWM_FREQ: u16 = 1000;

static SAMPLES: Channel<Mutex, DurationSample, SAMPLE_QUEUE_CAPACITY> = Channel::new();
static COMMANDS: Channel<Mutex, Command, COMMAND_QUEUE_CAPACITY> = Channel::new();
static TELEMETRY: Pipe<Mutex, TELEMETRY_BUF> = Pipe::new();

/// Telemetry goes out through a byte pipe drained by the transmit task; a full pipe
/// drops the excess.
pub struct PipeSink(&'static Pipe<Mutex, TELEMETRY_BUF>);

impl TelemetrySink for PipeSink {
    fn emit(&mut self, bytes: &[u8]) {
        let _ = self.0.try_write(bytes);
    }
}

type Counter = FrequencyCounter<Sender<'static, Mutex, DurationSample, SAMPLE_QUEUE_CAPACITY>>;
type Controller = SpeedController<pwm::TimPWM, StatusPin, PipeSink>;

#[rtic::app(device = pac, peripherals = true, dispatchers = [TIM7])]
mod app {
    use super::*;

    #[shared]
    struct Shared {
        counter: Counter,
        clock: clock::MicrosClock,
        console: serial::Console,
    }

    #[local]
    struct Local {
        pulse: clock::PulseInput,
        deadman: clock::DeadmanTimer,
        parser: CommandParser,
        controller: Controller,
    }

    #[init]
    fn init(ctx: init::Context) -> (Shared, Local) {
        let dp = ctx.device;
        let clock_cfg = Clocks::default();
        clock_cfg.setup().unwrap();

        let sysclk_freq = clock_cfg.sysclk(); // System clock frequency in Hz
        defmt::debug!("SYSTEM: Clock frequency is {} MHz", sysclk_freq / 1000000);

        let config = SpeedConfig::DEFAULT;
        let outputs = Outputs {
            pwm: pwm::TimPWM::new(dp.TIM3, &clock_cfg, PWM_FREQ),
            signal_lost: StatusPin::new(&pinout::led::RED),
            on_target: StatusPin::new(&pinout::led::GRN),
            heartbeat: StatusPin::new(&pinout::led::BLU),
            relay: StatusPin::new(&pinout::driver::RELAY),
        };
        let controller = match SpeedController::new(config, outputs, PipeSink(&TELEMETRY)) {
            Ok(controller) => controller,
            Err(err) => defmt::panic!("CONFIG: {}", err),
        };

        let clock = clock::MicrosClock::new(dp.TIM2, &clock_cfg);
        let counter = FrequencyCounter::new(SAMPLES.sender(), config.dt_off_us);
        let deadman = clock::DeadmanTimer::new(dp.TIM6, &clock_cfg, config.timeout_period_us);
        let pulse = clock::PulseInput::new();
        let console = serial::Console::new(dp.USART1, &clock_cfg);

        control::spawn().ok();
        serial_tx::spawn().ok();

        (
            Shared {
                counter,
                clock,
                console,
            },
            Local {
                pulse,
                deadman,
                parser: CommandParser::new(),
                controller,
            },
        )
    }

    #[task(binds = EXTI9_5, shared = [counter, clock], local = [pulse], priority = 3)]
    fn pulse_edge(cx: pulse_edge::Context) {
        cx.local.pulse.clear();
        (cx.shared.counter, cx.shared.clock).lock(|counter, clock| counter.on_edge(clock.now()));
    }

    #[task(binds = TIM6_DACUNDER, shared = [counter, clock], local = [deadman], priority = 3)]
    fn deadman_tick(cx: deadman_tick::Context) {
        cx.local.deadman.clear();
        (cx.shared.counter, cx.shared.clock)
            .lock(|counter, clock| counter.on_timeout_tick(clock.now()));
    }

    #[task(binds = USART1, shared = [console], local = [parser], priority = 2)]
    fn serial_rx(mut cx: serial_rx::Context) {
        let byte = cx.shared.console.lock(|console| {
            console.clear();
            console.read()
        });
        if let Some(command) = cx.local.parser.push(byte) {
            if COMMANDS.try_send(command).is_err() {
                defmt::warn!("SERIAL: command queue full, dropped {}", command);
            }
        }
    }

    #[task(priority = 1, local = [controller], shared = [clock])]
    async fn control(cx: control::Context) {
        let mut clock = cx.shared.clock;
        cx.local
            .controller
            .run(SAMPLES.receiver(), COMMANDS.receiver(), move || {
                clock.lock(|clock| clock.now())
            })
            .await
    }

    #[task(priority = 1, shared = [console])]
    async fn serial_tx(mut cx: serial_tx::Context) {
        let mut buf = [0u8; 16];
        loop {
            let n = TELEMETRY.read(&mut buf).await;
            for byte in &buf[..n] {
                cx.shared.console.lock(|console| console.write(*byte));
            }
        }
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
