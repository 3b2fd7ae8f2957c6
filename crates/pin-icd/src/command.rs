use core::fmt;

use serde::{Deserialize, Serialize};

use crate::ARG_ABSENT;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct UnknownCode(pub i32);

impl fmt::Display for UnknownCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command code {}", self.0)
    }
}

define_code_enum!(CommandCode, UnknownCode, {
    Read = 0,
    Write = 1,
    Pwm = 2,
    SetDirection = 3,
    SetPull = 4,
    WaitEdge = 5,
});

impl CommandCode {
    pub const fn name(self) -> &'static str {
        match self {
            CommandCode::Read => "read",
            CommandCode::Write => "write",
            CommandCode::Pwm => "pwm",
            CommandCode::SetDirection => "set-direction",
            CommandCode::SetPull => "set-pull",
            CommandCode::WaitEdge => "wait-edge",
        }
    }
}

const fn arg_absent() -> i32 {
    ARG_ABSENT
}

/// A raw `{code, pin, arg}` command as received from a caller.
///
/// Fields stay unvalidated integers; the dispatcher decides what is legal.
/// A missing `arg` deserializes to [`ARG_ABSENT`].
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
pub struct CommandRecord {
    pub code: i32,
    pub pin: i32,
    #[serde(default = "arg_absent")]
    pub arg: i32,
}

impl CommandRecord {
    pub const fn new(code: i32, pin: i32) -> Self {
        Self { code, pin, arg: ARG_ABSENT }
    }

    pub const fn with_arg(code: i32, pin: i32, arg: i32) -> Self {
        Self { code, pin, arg }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// Zero-argument form: read the board revision.
    QueryRevision,
    Command(CommandRecord),
}

impl From<CommandRecord> for Request {
    fn from(record: CommandRecord) -> Self {
        Request::Command(record)
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    /// Single numeric result: revision, level, raw read code or edge status.
    Value(i64),
    /// Pure-write command completed.
    Done,
}

impl Response {
    pub const fn value(self) -> Option<i64> {
        match self {
            Response::Value(v) => Some(v),
            Response::Done => None,
        }
    }
}
