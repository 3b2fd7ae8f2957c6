use std::io::Cursor;
use std::sync::Arc;

use controller_manager::ControllerManager;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use gpio_ctl::hal::sim::{SimBoard, SimFactory};
use gpio_ctl::icd::Pin;
use gpio_ctl::{serve, Dispatcher};
use serde_json::{json, Value};

fn run(input: &str) -> (Vec<Value>, usize, SimBoard) {
    run_bytes(input.as_bytes())
}

fn run_bytes(input: &[u8]) -> (Vec<Value>, usize, SimBoard) {
    let board = SimBoard::default();
    let manager: Arc<ControllerManager<NoopRawMutex, SimFactory>> =
        Arc::new(ControllerManager::new(board.clone()));
    let mut dispatcher = Dispatcher::new(manager);

    let mut output = Vec::new();
    let handled =
        serve(&mut dispatcher, Cursor::new(input), &mut output).unwrap();

    let replies = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    (replies, handled, board)
}

#[test]
fn answers_each_request_line() {
    let input = r#"
"query_revision"
{"command": {"code": 3, "pin": 17, "arg": 1}}
{"code": 1, "pin": 17, "arg": 1}
# comment lines are skipped

{"code": 0, "pin": 17}
"#;

    let (replies, handled, board) = run(input);

    assert_eq!(handled, 4);
    assert_eq!(
        replies,
        vec![
            json!({"value": 0x00a0_2082}),
            json!("done"),
            json!("done"),
            json!({"value": 1}),
        ]
    );
    assert_eq!(board.open_count(), 1);
}

#[test]
fn errors_do_not_stop_the_stream() {
    let input = r#"{"code": 2, "pin": 18, "arg": 2000}
not json
{"code": 1, "pin": 60, "arg": 1}
{"code": 1, "pin": 18, "arg": 1}
"#;

    let (replies, handled, board) = run(input);

    assert_eq!(handled, 4);
    assert_eq!(replies[0], json!({"error": "pwm: argument 2000 out of range"}));
    assert!(replies[1]["error"]
        .as_str()
        .unwrap()
        .starts_with("malformed request"));
    assert_eq!(replies[2], json!({"error": "pin 60 outside 0..=53"}));
    assert_eq!(replies[3], json!("done"));
    assert!(board.pin(Pin::try_from(18).unwrap()).level.is_high());
}

#[test]
fn non_utf8_line_is_answered_and_skipped() {
    let mut input = Vec::new();
    input.extend_from_slice(b"{\"code\": 1, \"pin\": 17, \"arg\": 1}\n");
    input.extend_from_slice(b"\xff\xfe garbage\n");
    input.extend_from_slice(b"{\"code\": 0, \"pin\": 17}\n");

    let (replies, handled, _board) = run_bytes(&input);

    assert_eq!(handled, 3);
    assert_eq!(replies[0], json!("done"));
    assert!(replies[1]["error"]
        .as_str()
        .unwrap()
        .starts_with("malformed request"));
    assert_eq!(replies[2], json!({"value": 1}));
}
