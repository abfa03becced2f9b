use crate::Completion;

/// Receives "download finished" notifications.
pub trait Notifier: Send + Sync {
    fn completed(&self, completion: &Completion);
}

/// Receives the swarm-wide progress value, in `[0, 1]` or
/// [`PROGRESS_IDLE`](crate::PROGRESS_IDLE).
pub trait ProgressSink: Send + Sync {
    fn publish(&self, value: f64);
}

impl<F> Notifier for F
where
    F: Fn(&Completion) + Send + Sync,
{
    fn completed(&self, completion: &Completion) {
        self(completion)
    }
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn publish(&self, value: f64) {
        self(value)
    }
}

/// Sink that drops everything; used where no desktop integration exists.
#[derive(Clone, Copy, Debug, Default)]
pub struct Discard;

impl Notifier for Discard {
    fn completed(&self, _completion: &Completion) {}
}

impl ProgressSink for Discard {
    fn publish(&self, _value: f64) {}
}
