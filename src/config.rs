/// Default prefix for worker thread names.
pub const DEFAULT_NAME_PREFIX: &str = "worker";

/// Settings applied to every thread a group spawns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub(crate) name_prefix: String,
    pub(crate) stack_size: Option<usize>,
}

impl GroupConfig {
    /// Creates the default configuration: threads named `worker-<id>`
    /// with the platform's default stack size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the thread name prefix. Threads are named `<prefix>-<id>`.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Sets the stack size in bytes for spawned threads.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        GroupConfig {
            name_prefix: DEFAULT_NAME_PREFIX.to_owned(),
            stack_size: None,
        }
    }
}
