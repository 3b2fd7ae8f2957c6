use std::sync::Arc;

use controller_manager::ControllerManager;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use gpio_ctl::hal::sim::{
    HalCall, SimBoard, SimConfig, SimFactory, SimOp, DEFAULT_PWM_RANGE,
};
use gpio_ctl::icd::{
    CommandRecord, Direction, InvalidPin, Pin, PullMode, Request, Response,
    UnknownCode, ARG_ABSENT, MAX_PWM,
};
use gpio_ctl::pin_state::PinState;
use gpio_ctl::{Dispatcher, Error};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type SimDispatcher = Dispatcher<NoopRawMutex, SimFactory>;

fn setup_with(board: SimBoard) -> (SimDispatcher, SimBoard) {
    let manager = Arc::new(ControllerManager::new(board.clone()));
    (Dispatcher::new(manager), board)
}

fn setup() -> (SimDispatcher, SimBoard) {
    setup_with(SimBoard::default())
}

fn cmd(code: i32, pin: i32, arg: i32) -> Request {
    CommandRecord::with_arg(code, pin, arg).into()
}

fn pin(n: i32) -> Pin {
    Pin::try_from(n).unwrap()
}

fn range_calls(board: &SimBoard) -> usize {
    board
        .calls()
        .iter()
        .filter(|call| matches!(call, HalCall::SetPwmRange(..)))
        .count()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn out_of_range_pins_never_reach_hardware() {
    let (mut dispatcher, board) = setup();

    for bad in [-1, 54, 1000] {
        for code in 0..=5 {
            assert_eq!(
                dispatcher.dispatch(cmd(code, bad, 0)),
                Err(Error::InvalidPin(InvalidPin(bad)))
            );
        }
    }

    assert!(board.calls().is_empty());
    assert_eq!(board.open_count(), 0);
}

#[test]
fn unknown_code_rejected_before_open() {
    let (mut dispatcher, board) = setup();

    assert_eq!(
        dispatcher.dispatch(cmd(9, 4, 0)),
        Err(Error::UnknownCommand(UnknownCode(9)))
    );
    assert_eq!(board.open_count(), 0);
}

#[test]
fn missing_arguments_never_reach_hardware() {
    let (mut dispatcher, board) = setup();

    for code in 1..=5 {
        assert!(matches!(
            dispatcher.dispatch(cmd(code, 4, ARG_ABSENT)),
            Err(Error::MissingArgument { .. })
        ));
    }
    assert!(board.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Pin operations
// ---------------------------------------------------------------------------

#[test]
fn direction_write_read_scenario() {
    let (mut dispatcher, board) = setup();

    assert_eq!(dispatcher.dispatch(cmd(3, 17, 1)), Ok(Response::Done));
    assert_eq!(dispatcher.dispatch(cmd(1, 17, 1)), Ok(Response::Done));
    assert_eq!(
        dispatcher.dispatch(cmd(0, 17, ARG_ABSENT)),
        Ok(Response::Value(1))
    );

    assert_eq!(dispatcher.pin_state(pin(17)).direction, Some(Direction::Output));
    assert_eq!(board.pin(pin(17)).direction, Direction::Output);
}

#[test]
fn pull_recorded_and_applied() {
    let (mut dispatcher, board) = setup();

    assert_eq!(dispatcher.dispatch(cmd(4, 4, 1)), Ok(Response::Done));
    assert_eq!(dispatcher.dispatch(cmd(0, 4, ARG_ABSENT)), Ok(Response::Value(1)));
    assert_eq!(board.pin(pin(4)).pull, PullMode::PullUp);
    assert_eq!(dispatcher.pin_state(pin(4)).pull, Some(PullMode::PullUp));

    assert_eq!(dispatcher.dispatch(cmd(4, 4, -1)), Ok(Response::Done));
    assert_eq!(dispatcher.dispatch(cmd(0, 4, ARG_ABSENT)), Ok(Response::Value(0)));
}

#[test]
fn revision_query() {
    let (mut dispatcher, _board) =
        setup_with(SimBoard::new(SimConfig { revision: 0x00c0_3111 }));

    assert_eq!(
        dispatcher.dispatch(Request::QueryRevision),
        Ok(Response::Value(0x00c0_3111))
    );
}

#[test]
fn read_passes_hardware_code_through() {
    let (mut dispatcher, board) = setup();
    board.fail_next(SimOp::Read, -3);

    assert_eq!(
        dispatcher.dispatch(cmd(0, 22, ARG_ABSENT)),
        Ok(Response::Value(-3))
    );
    assert_eq!(
        dispatcher.dispatch(cmd(0, 22, ARG_ABSENT)),
        Ok(Response::Value(0))
    );
}

#[test]
fn write_failure_reports_operation_and_code() {
    let (mut dispatcher, board) = setup();
    board.fail_next(SimOp::Write, -41);

    assert_eq!(
        dispatcher.dispatch(cmd(1, 5, 1)),
        Err(Error::HardwareOperationFailed {
            operation: "write",
            pin: pin(5),
            code: -41,
        })
    );
    // The controller stays usable.
    assert_eq!(dispatcher.dispatch(cmd(1, 5, 1)), Ok(Response::Done));
}

#[test]
fn failed_direction_not_recorded() {
    let (mut dispatcher, board) = setup();
    board.fail_next(SimOp::SetDirection, -4);

    assert!(matches!(
        dispatcher.dispatch(cmd(3, 6, 1)),
        Err(Error::HardwareOperationFailed { operation: "set-direction", .. })
    ));
    assert_eq!(dispatcher.pin_state(pin(6)), PinState::default());
}

// ---------------------------------------------------------------------------
// PWM
// ---------------------------------------------------------------------------

#[test]
fn pwm_bounds() {
    let (mut dispatcher, board) = setup();

    assert_eq!(dispatcher.dispatch(cmd(2, 18, 1024)), Ok(Response::Done));
    assert_eq!(board.pin(pin(18)).duty, MAX_PWM);
    assert_eq!(board.pin(pin(18)).pwm_range, u32::from(MAX_PWM));

    assert_eq!(
        dispatcher.dispatch(cmd(2, 18, 1025)),
        Err(Error::InvalidRange { command: "pwm", value: 1025 })
    );
    assert_eq!(
        dispatcher.dispatch(cmd(2, 18, -5)),
        Err(Error::MissingArgument { command: "pwm" })
    );
}

#[test]
fn rejected_duty_leaves_range_untouched() {
    let (mut dispatcher, board) = setup();

    assert_eq!(
        dispatcher.dispatch(cmd(2, 18, 2000)),
        Err(Error::InvalidRange { command: "pwm", value: 2000 })
    );
    assert_eq!(board.pin(pin(18)).pwm_range, DEFAULT_PWM_RANGE);
    assert!(board.mutations().is_empty());
    assert!(!dispatcher.pin_state(pin(18)).pwm_ranged);
}

#[test]
fn pwm_range_set_once_per_open() {
    let (mut dispatcher, board) = setup();

    dispatcher.dispatch(cmd(2, 18, 100)).unwrap();
    dispatcher.dispatch(cmd(2, 18, 200)).unwrap();
    dispatcher.dispatch(cmd(2, 12, 300)).unwrap();

    assert_eq!(range_calls(&board), 2);
    assert!(dispatcher.pin_state(pin(18)).pwm_ranged);
    assert!(dispatcher.pin_state(pin(12)).pwm_ranged);
}

#[test]
fn pwm_outside_first_bank_fails_in_hardware() {
    let (mut dispatcher, _board) = setup();

    assert_eq!(
        dispatcher.dispatch(cmd(2, 40, 10)),
        Err(Error::HardwareOperationFailed {
            operation: "pwm-range",
            pin: pin(40),
            code: -2,
        })
    );
    assert!(!dispatcher.pin_state(pin(40)).pwm_ranged);
}

#[test]
fn range_survives_failed_duty_write() {
    let (mut dispatcher, board) = setup();
    board.fail_next(SimOp::SetPwm, -8);

    assert!(matches!(
        dispatcher.dispatch(cmd(2, 13, 512)),
        Err(Error::HardwareOperationFailed { operation: "pwm", code: -8, .. })
    ));
    assert!(dispatcher.pin_state(pin(13)).pwm_ranged);
    assert_eq!(board.pin(pin(13)).pwm_range, u32::from(MAX_PWM));

    dispatcher.dispatch(cmd(2, 13, 512)).unwrap();
    assert_eq!(range_calls(&board), 1);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn controller_opened_once_across_commands() {
    let (mut dispatcher, board) = setup();

    dispatcher.dispatch(cmd(0, 4, ARG_ABSENT)).unwrap();
    dispatcher.dispatch(cmd(1, 4, 0)).unwrap();
    dispatcher.dispatch(Request::QueryRevision).unwrap();

    assert_eq!(board.open_count(), 1);
    assert_eq!(dispatcher.manager().open_count(), 1);
}

#[test]
fn reopen_clears_pin_state() {
    let (mut dispatcher, board) = setup();

    dispatcher.dispatch(cmd(3, 17, 1)).unwrap();
    dispatcher.dispatch(cmd(2, 18, 10)).unwrap();
    dispatcher.release().unwrap();
    board.clear_calls();

    assert_eq!(board.close_count(), 1);
    assert_eq!(dispatcher.pin_state(pin(17)), PinState::default());
    assert_eq!(board.pin(pin(18)).pwm_range, DEFAULT_PWM_RANGE);

    // The first PWM after reopening ranges the pin again.
    dispatcher.dispatch(cmd(2, 18, 10)).unwrap();
    assert_eq!(range_calls(&board), 1);
    assert_eq!(board.open_count(), 2);
}

#[test]
fn release_behind_the_dispatchers_back() {
    let (mut dispatcher, board) = setup();

    dispatcher.dispatch(cmd(4, 9, 1)).unwrap();
    dispatcher.manager().release().unwrap();

    dispatcher.dispatch(cmd(0, 3, ARG_ABSENT)).unwrap();
    assert_eq!(board.open_count(), 2);
    assert_eq!(dispatcher.pin_state(pin(9)), PinState::default());
}

#[test]
fn failed_open_is_retried() {
    let (mut dispatcher, board) = setup();
    board.refuse_next_open();

    assert!(matches!(
        dispatcher.dispatch(cmd(0, 4, ARG_ABSENT)),
        Err(Error::Initialization(_))
    ));
    assert!(board.calls().is_empty());

    assert_eq!(
        dispatcher.dispatch(cmd(0, 4, ARG_ABSENT)),
        Ok(Response::Value(0))
    );
    assert_eq!(board.open_count(), 1);
}

#[test]
fn release_guard_closes_controller() {
    let board = SimBoard::default();
    let manager: Arc<ControllerManager<NoopRawMutex, SimFactory>> =
        Arc::new(ControllerManager::new(board.clone()));

    {
        let _release = manager.release_on_drop();
        let mut dispatcher = Dispatcher::new(Arc::clone(&manager));
        dispatcher.dispatch(cmd(1, 17, 1)).unwrap();
        assert_eq!(manager.is_open(), Some(true));
    }

    assert_eq!(manager.is_open(), Some(false));
    assert_eq!(board.close_count(), 1);
}
