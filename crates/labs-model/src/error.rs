//! Model-level errors

/// Rejected lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Edge is not in the entity's transition table
    #[error("illegal {entity} transition: {from} -> {to}")]
    Illegal {
        /// Entity kind
        entity: &'static str,
        /// Status before
        from: String,
        /// Requested status
        to: String,
    },
}

/// Procedure definition that the pipeline cannot work with
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SopError {
    /// Step orders must run 1..=n with no gaps or repeats
    #[error("step at position {position} has order {found}; steps must be numbered 1..=n")]
    StepOrder {
        /// 1-based position in the step list
        position: u32,
        /// Order the step declared
        found: u32,
    },

    /// Review can never be passed
    #[error("review pass threshold {threshold} exceeds the {questions} questions in the review")]
    PassThreshold {
        /// Correct answers required
        threshold: u32,
        /// Questions asked
        questions: u32,
    },
}
