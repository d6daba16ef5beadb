//! Interpreter error taxonomy
//!
//! Every trap is surfaced to the user as its one-line `Display` message and
//! recovered from; the interpreter never aborts.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Trap {
    /// A line-number literal above the accepted maximum while editing.
    #[error("Invalid line number")]
    BadLine,
    /// The evaluator error flag was set, or an expression ended early.
    #[error("Invalid expression")]
    InvalidExpr,
    /// An expected token was missing; reported with a caret into the line.
    #[error("Syntax Error")]
    Syntax,
    /// A named byte stream could not be opened for SAVE or LOAD.
    #[error("IO Error")]
    Io,
    /// The control stack would collide with the program region.
    #[error("Not enough memory!")]
    NoMem,
    /// An unknown tag was found while walking the control stack.
    #[error("Stack is stuffed!")]
    StackStuffed,
    /// Ctrl-C during execution, or the STOP statement.
    #[error("break!")]
    Break,
}

impl Trap {
    /// Traps that reset the control stack before returning to the prompt.
    pub fn warmstarts(self) -> bool {
        matches!(self, Trap::NoMem | Trap::StackStuffed | Trap::Break)
    }
}
