use std::fmt;

/// A call a [`MockRecorder`](crate::MockRecorder) can receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecorderCall {
    RecordAdd,
    RecordDelete,
    RecordChange,
    SavingChanges,
    TakeCommit,
    Commit,
    Discard,
}

impl fmt::Display for RecorderCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecorderCall::RecordAdd => "record_add",
            RecorderCall::RecordDelete => "record_delete",
            RecorderCall::RecordChange => "record_change",
            RecorderCall::SavingChanges => "on_saving_changes",
            RecorderCall::TakeCommit => "take_commit",
            RecorderCall::Commit => "commit",
            RecorderCall::Discard => "discard",
        };
        f.write_str(name)
    }
}

/// An expectation for a recorder call
#[derive(Debug, Clone)]
pub struct Expectation {
    pub(crate) call: RecorderCall,
    pub(crate) times: Times,
}

impl Expectation {
    /// Create a new expectation, by default for exactly one call
    pub fn new(call: RecorderCall) -> Self {
        Self {
            call,
            times: Times::Once,
        }
    }

    /// Expect the call exactly once
    pub fn once(mut self) -> Self {
        self.times = Times::Once;
        self
    }

    /// Expect the call exactly n times
    pub fn times(mut self, n: usize) -> Self {
        self.times = Times::Exactly(n);
        self
    }

    /// Expect the call at least once
    pub fn at_least_once(mut self) -> Self {
        self.times = Times::AtLeast(1);
        self
    }

    pub fn at_most(mut self, n: usize) -> Self {
        self.times = Times::AtMost(n);
        self
    }

    /// Expect the call to never happen
    pub fn never(mut self) -> Self {
        self.times = Times::Exactly(0);
        self
    }

    pub fn call(&self) -> RecorderCall {
        self.call
    }

    /// Compare against the observed number of calls
    pub fn check(&self, count: usize) -> Result<(), String> {
        if self.times.allows(count) {
            Ok(())
        } else {
            Err(format!(
                "expected {} to be called {}, got {} call(s)",
                self.call, self.times, count
            ))
        }
    }
}

/// Define how many times an expectation should be matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Times {
    Once,
    Exactly(usize),
    AtLeast(usize),
    AtMost(usize),
    Any,
}

impl Times {
    pub fn allows(&self, count: usize) -> bool {
        match *self {
            Times::Once => count == 1,
            Times::Exactly(n) => count == n,
            Times::AtLeast(n) => count >= n,
            Times::AtMost(n) => count <= n,
            Times::Any => true,
        }
    }
}

impl fmt::Display for Times {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Times::Once => write!(f, "once"),
            Times::Exactly(n) => write!(f, "exactly {} time(s)", n),
            Times::AtLeast(n) => write!(f, "at least {} time(s)", n),
            Times::AtMost(n) => write!(f, "at most {} time(s)", n),
            Times::Any => write!(f, "any number of times"),
        }
    }
}
