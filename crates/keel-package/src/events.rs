//! Collaborators notified after the package state is persisted

use crate::state::PackageState;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// Error type returned by external collaborators
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Cache of compiled artifacts keyed by source path
pub trait CompiledCodeCache {
    /// Mark artifacts compiled from `path` as stale
    fn invalidate(&self, path: &Path) -> Result<(), BoxError>;
}

/// Subscriber to "package states updated" notifications
pub trait PackageStatesListener {
    fn package_states_updated(&self, state: &PackageState) -> Result<(), BoxError>;
}

impl<F> PackageStatesListener for F
where
    F: Fn(&PackageState) -> Result<(), BoxError>,
{
    fn package_states_updated(&self, state: &PackageState) -> Result<(), BoxError> {
        self(state)
    }
}

/// Fans out post-save notifications
///
/// Errors and panics from collaborators are logged and swallowed; a
/// notification never fails a save.
#[derive(Default)]
pub struct StateNotifier {
    compiled_cache: Option<Box<dyn CompiledCodeCache>>,
    listeners: Vec<Box<dyn PackageStatesListener>>,
}

impl StateNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compiled-code cache invalidated after each save
    pub fn set_compiled_cache(&mut self, cache: Box<dyn CompiledCodeCache>) {
        self.compiled_cache = Some(cache);
    }

    /// Register a state listener
    pub fn subscribe(&mut self, listener: Box<dyn PackageStatesListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Invalidate compiled artifacts for the written artifact path
    pub fn invalidate_compiled(&self, path: &Path) {
        if let Some(cache) = &self.compiled_cache {
            match panic::catch_unwind(AssertUnwindSafe(|| cache.invalidate(path))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(path = %path.display(), error = %err, "compiled-code cache invalidation failed");
                }
                Err(_) => {
                    tracing::warn!(path = %path.display(), "compiled-code cache invalidation panicked");
                }
            }
        }
    }

    /// Tell every listener that the package states changed
    pub fn notify_updated(&self, state: &PackageState) {
        for (index, listener) in self.listeners.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.package_states_updated(state))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(listener = index, error = %err, "package states listener failed");
                }
                Err(_) => {
                    tracing::warn!(listener = index, "package states listener panicked");
                }
            }
        }
    }
}

impl std::fmt::Debug for StateNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateNotifier")
            .field("compiled_cache", &self.compiled_cache.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;
    use std::rc::Rc;

    struct RecordingCache(Rc<RefCell<Vec<PathBuf>>>);

    impl CompiledCodeCache for RecordingCache {
        fn invalidate(&self, path: &Path) -> Result<(), BoxError> {
            self.0.borrow_mut().push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn test_failing_listener_does_not_stop_others() {
        let calls = Rc::new(Cell::new(0));
        let mut notifier = StateNotifier::new();

        notifier.subscribe(Box::new(|_: &PackageState| -> Result<(), BoxError> {
            Err("subscriber exploded".into())
        }));
        let counter = Rc::clone(&calls);
        notifier.subscribe(Box::new(move |_: &PackageState| -> Result<(), BoxError> {
            counter.set(counter.get() + 1);
            Ok(())
        }));

        notifier.notify_updated(&PackageState::default());
        assert_eq!(calls.get(), 1);
        assert_eq!(notifier.listener_count(), 2);
    }

    #[test]
    fn test_compiled_cache_receives_path() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut notifier = StateNotifier::new();
        notifier.set_compiled_cache(Box::new(RecordingCache(Rc::clone(&seen))));

        notifier.invalidate_compiled(Path::new("/tmp/states.bin"));
        assert_eq!(*seen.borrow(), vec![PathBuf::from("/tmp/states.bin")]);
    }

    #[test]
    fn test_empty_notifier_is_noop() {
        let notifier = StateNotifier::new();
        notifier.invalidate_compiled(Path::new("x"));
        notifier.notify_updated(&PackageState::default());
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let calls = Rc::new(Cell::new(0));
        let mut notifier = StateNotifier::new();

        notifier.subscribe(Box::new(|_: &PackageState| -> Result<(), BoxError> {
            panic!("listener bug")
        }));
        let counter = Rc::clone(&calls);
        notifier.subscribe(Box::new(move |_: &PackageState| -> Result<(), BoxError> {
            counter.set(counter.get() + 1);
            Ok(())
        }));

        notifier.notify_updated(&PackageState::default());
        assert_eq!(calls.get(), 1);
    }
}
