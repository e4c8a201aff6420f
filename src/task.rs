/// An owned unit of work.
///
/// Everything a task touches is moved into it when it is built, so it can
/// never observe storage from a scope that has already returned.
pub struct Task {
    job: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    /// Wraps a closure as a task.
    pub fn new<F>(job: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task { job: Box::new(job) }
    }

    /// Builds a task that receives `payload` by value when it runs.
    ///
    /// Borrowed data must be copied into an owned payload first, e.g. a
    /// stack buffer into a `String`.
    pub fn with_payload<P, F>(payload: P, job: F) -> Self
    where
        P: Send + 'static,
        F: FnOnce(P) + Send + 'static,
    {
        Task::new(move || job(payload))
    }

    pub(crate) fn run(self) {
        (self.job)()
    }
}

#[cfg(test)]
mod tests {
    use crossbeam::channel;

    use super::*;

    #[test]
    fn payload_is_delivered_by_value() {
        let (tx, rx) = channel::unbounded();
        let mut buffer = String::from("Hello");
        let task = Task::with_payload(buffer.clone(), move |msg: String| {
            tx.send(msg).unwrap();
        });
        buffer.replace_range(.., "#####");

        task.run();
        assert_eq!(rx.recv().unwrap(), "Hello");
        assert_eq!(buffer, "#####");
    }
}
