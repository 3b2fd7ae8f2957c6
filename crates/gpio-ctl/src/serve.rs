//! JSON-lines front end for a [`Dispatcher`].
//!
//! Each input line is a [`Request`] (`"query_revision"` or
//! `{"command": {...}}`) or a bare `{code, pin, arg}` record. Each produces
//! one output line: the [`Response`] or `{"error": "..."}`. Blank lines and
//! lines starting with `#` are skipped.

use std::fmt;
use std::io::{self, BufRead, Write};

use controller_manager::ControllerFactory;
use embassy_sync::blocking_mutex::raw::RawMutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::hal::PinController;
use crate::icd::{CommandRecord, Request, Response};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Incoming {
    Request(Request),
    Record(CommandRecord),
}

impl From<Incoming> for Request {
    fn from(incoming: Incoming) -> Self {
        match incoming {
            Incoming::Request(request) => request,
            Incoming::Record(record) => Request::Command(record),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Reply {
    Ok(Response),
    Err { error: String },
}

fn handle_line<M, F>(dispatcher: &mut Dispatcher<M, F>, line: &str) -> Reply
where
    M: RawMutex,
    F: ControllerFactory,
    F::Controller: PinController,
    F::Error: fmt::Display,
{
    let request = match serde_json::from_str::<Incoming>(line) {
        Ok(incoming) => Request::from(incoming),
        Err(err) => {
            return Reply::Err { error: format!("malformed request: {err}") }
        }
    };

    debug!(?request, "request");
    match dispatcher.dispatch(request) {
        Ok(response) => Reply::Ok(response),
        Err(err) => Reply::Err { error: err.to_string() },
    }
}

/// Answer requests from `input` until it ends. Returns the number of
/// requests handled.
pub fn serve<M, F>(
    dispatcher: &mut Dispatcher<M, F>,
    mut input: impl BufRead,
    mut output: impl Write,
) -> io::Result<usize>
where
    M: RawMutex,
    F: ControllerFactory,
    F::Controller: PinController,
    F::Error: fmt::Display,
{
    let mut handled = 0;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            break;
        }

        let reply = match std::str::from_utf8(&buf) {
            Ok(text) => {
                let line = text.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                handle_line(dispatcher, line)
            }
            Err(err) => {
                Reply::Err { error: format!("malformed request: {err}") }
            }
        };
        serde_json::to_writer(&mut output, &reply)?;
        output.write_all(b"\n")?;
        output.flush()?;
        handled += 1;
    }
    info!(handled, "input closed");
    Ok(handled)
}
