use super::violation::Violation;

/// The enclosing activity, told how the session ended.
///
/// Both methods consume the sink, so at most one of them runs and it runs
/// at most once.
pub trait ViolationSink: Send {
    /// The activity must halt and record `violation` as its outcome.
    fn on_violation(self: Box<Self>, violation: Violation);

    /// The session was stopped without a violation.
    fn on_finish(self: Box<Self>) {}
}

impl<F> ViolationSink for F
where
    F: FnOnce(Violation) + Send,
{
    fn on_violation(self: Box<Self>, violation: Violation) {
        (*self)(violation)
    }
}
