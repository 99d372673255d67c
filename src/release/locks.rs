use std::collections::HashSet;

use parking_lot::{Condvar, Mutex};

use crate::domain::ModuleNamespace;

/// Held while a namespace is being released; frees it on drop
#[derive(Debug)]
pub struct NamespaceGuard<'a> {
    locks: &'a NamespaceLocks,
    namespace: ModuleNamespace,
}

impl Drop for NamespaceGuard<'_> {
    fn drop(&mut self) {
        self.locks.busy.lock().remove(&self.namespace);
        self.locks.freed.notify_all();
    }
}

/// Set of namespaces currently being released.
///
/// Releases of different namespaces proceed in parallel; two releases of the
/// same namespace in this process run one after the other. Nothing here
/// coordinates separate processes.
#[derive(Debug, Default)]
pub struct NamespaceLocks {
    busy: Mutex<HashSet<ModuleNamespace>>,
    freed: Condvar,
}

impl NamespaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the namespace is free
    pub fn lock(&self, namespace: &ModuleNamespace) -> NamespaceGuard<'_> {
        let mut busy = self.busy.lock();
        while busy.contains(namespace) {
            self.freed.wait(&mut busy);
        }
        busy.insert(namespace.clone());
        self.guard(namespace)
    }

    pub fn try_lock(&self, namespace: &ModuleNamespace) -> Option<NamespaceGuard<'_>> {
        if self.busy.lock().insert(namespace.clone()) {
            Some(self.guard(namespace))
        } else {
            None
        }
    }

    fn guard(&self, namespace: &ModuleNamespace) -> NamespaceGuard<'_> {
        NamespaceGuard {
            locks: self,
            namespace: namespace.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_same_namespace_is_exclusive() {
        let locks = NamespaceLocks::new();
        let api = ModuleNamespace::new("api").unwrap();

        let guard = locks.lock(&api);
        assert!(locks.try_lock(&api).is_none());
        drop(guard);
        assert!(locks.try_lock(&api).is_some());
    }

    #[test]
    fn test_namespaces_are_independent() {
        let locks = NamespaceLocks::new();
        let api = ModuleNamespace::new("api").unwrap();
        let web = ModuleNamespace::new("web").unwrap();

        let _api = locks.lock(&api);
        assert!(locks.try_lock(&web).is_some());
        assert!(locks.try_lock(&ModuleNamespace::root()).is_some());
    }

    #[test]
    fn test_lock_across_threads() {
        let locks = Arc::new(NamespaceLocks::new());
        let api = ModuleNamespace::new("api").unwrap();
        let counter = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let locks = Arc::clone(&locks);
                let counter = Arc::clone(&counter);
                let api = api.clone();
                std::thread::spawn(move || {
                    let _guard = locks.lock(&api);
                    counter.lock().push(i);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.lock().len(), 4);
    }
}
