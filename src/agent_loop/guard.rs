//! Round budget and the forced-final-answer guard.

/// Instruction sent with the round that follows tool execution.
pub const FORCED_FINAL_DIRECTIVE: &str = "You just ran tools and their results are above. \
Now answer the user in plain text. Do not call any tools.";

/// Instruction sent after the backend tried to call tools in a forced round.
pub const CORRECTIVE_DIRECTIVE: &str = "Your previous reply tried to call tools again, which \
is not allowed now. Answer the user in plain text using the tool results above. Do not call tools.";

/// Bounded count of model rounds in one turn.
///
/// `rounds_used` never exceeds `max_rounds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundBudget {
    rounds_used: u32,
    max_rounds: u32,
}

impl RoundBudget {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            rounds_used: 0,
            max_rounds,
        }
    }

    pub fn rounds_used(&self) -> u32 {
        self.rounds_used
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn is_exhausted(&self) -> bool {
        self.rounds_used >= self.max_rounds
    }

    /// Count one finished round. Saturates at `max_rounds`.
    pub fn consume(&mut self) {
        if !self.is_exhausted() {
            self.rounds_used += 1;
        }
    }
}

/// Guard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaunchState {
    Normal,
    /// The previous round ran tools; only a text answer is accepted.
    ForcedFinal,
}

/// Caps a turn at one tool-executing round followed by a text answer.
///
/// Several calls inside one round are fine; another round of calls after
/// tools ran is dropped and answered with a corrective directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaunchGuard {
    state: RelaunchState,
    tool_calls_blocked: bool,
}

impl Default for RelaunchGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl RelaunchGuard {
    pub fn new() -> Self {
        Self {
            state: RelaunchState::Normal,
            tool_calls_blocked: false,
        }
    }

    pub fn state(&self) -> RelaunchState {
        self.state
    }

    pub fn is_forced(&self) -> bool {
        self.state == RelaunchState::ForcedFinal
    }

    /// Whether tool schemas may be offered this round.
    pub fn tools_allowed(&self) -> bool {
        !self.is_forced()
    }

    /// A round executed at least one tool call.
    pub fn on_tools_executed(&mut self) {
        self.state = RelaunchState::ForcedFinal;
        self.tool_calls_blocked = false;
    }

    /// Filter a round's calls. In a forced round every call is dropped.
    ///
    /// Returns the accepted calls and how many were dropped.
    pub fn admit<T>(&mut self, calls: Vec<T>) -> (Vec<T>, usize) {
        if !self.is_forced() || calls.is_empty() {
            return (calls, 0);
        }
        let dropped = calls.len();
        self.tool_calls_blocked = true;
        (Vec::new(), dropped)
    }

    /// A round produced a text answer with no accepted calls.
    pub fn on_text_answer(&mut self) {
        self.state = RelaunchState::Normal;
        self.tool_calls_blocked = false;
    }

    /// Instruction to append to the next request, if any.
    pub fn directive(&self) -> Option<&'static str> {
        match (self.state, self.tool_calls_blocked) {
            (RelaunchState::Normal, _) => None,
            (RelaunchState::ForcedFinal, false) => Some(FORCED_FINAL_DIRECTIVE),
            (RelaunchState::ForcedFinal, true) => Some(CORRECTIVE_DIRECTIVE),
        }
    }
}
