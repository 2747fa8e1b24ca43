//! Condition variables and the condition-wait registry
//!
//! A condition variable is a named reactive cell. Writing it evaluates, on the
//! spot, the predicates registered under its name; satisfied waits are removed
//! and their tasks recorded as woken until the scheduler queues them at its
//! next flush point. Predicates declare their dependencies explicitly. A
//! predicate that declares none lands in a catch-all bucket evaluated on every
//! write.

use crate::error::{SchedError, SchedResult};
use crate::task::TaskId;
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

struct VariableCell<T> {
    name: String,
    value: RefCell<T>,
    waits: Rc<ConditionWaits>,
}

/// Named reactive cell shared between tasks and the host
///
/// Clones refer to the same cell.
pub struct ConditionVariable<T> {
    inner: Rc<VariableCell<T>>,
}

impl<T> Clone for ConditionVariable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ConditionVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionVariable")
            .field("name", &self.inner.name)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

impl<T: Clone + 'static> ConditionVariable<T> {
    /// Registry key of this variable
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current value
    pub fn read(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Store a value and evaluate the predicates depending on this variable
    pub fn write(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.inner.waits.notify(&self.inner.name);
    }

    /// Read-modify-write; counts as a write
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut *self.inner.value.borrow_mut());
        self.inner.waits.notify(&self.inner.name);
    }

    /// Condition on this variable alone
    pub fn when(&self, predicate: impl Fn(&T) -> bool + 'static) -> Condition {
        let var = self.clone();
        Condition::new(move || predicate(&*var.inner.value.borrow())).depends_on(self.name())
    }
}

/// Predicate plus the names of the variables it reads
#[derive(Clone)]
pub struct Condition {
    predicate: Rc<dyn Fn() -> bool>,
    dependencies: Vec<String>,
}

impl Condition {
    /// Create a condition with no declared dependencies
    pub fn new(predicate: impl Fn() -> bool + 'static) -> Self {
        Self {
            predicate: Rc::new(predicate),
            dependencies: Vec::new(),
        }
    }

    /// Declare a dependency by variable name
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    /// Declare a dependency on a variable
    pub fn depends_on_var<T: Clone + 'static>(self, var: &ConditionVariable<T>) -> Self {
        self.depends_on(var.name())
    }

    /// Declared dependency names
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Evaluate the predicate
    pub fn evaluate(&self) -> bool {
        (self.predicate)()
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Named variables known to one scheduler
#[derive(Default)]
pub(crate) struct ConditionBoard {
    variables: RefCell<FxHashMap<String, Rc<dyn Any>>>,
    waits: Rc<ConditionWaits>,
}

impl ConditionBoard {
    pub(crate) fn register<T: Clone + 'static>(
        &self,
        name: &str,
        initial: T,
    ) -> SchedResult<ConditionVariable<T>> {
        let mut variables = self.variables.borrow_mut();
        if variables.contains_key(name) {
            return Err(SchedError::DuplicateCondition(name.to_string()));
        }
        let inner = Rc::new(VariableCell {
            name: name.to_string(),
            value: RefCell::new(initial),
            waits: self.waits.clone(),
        });
        let erased: Rc<dyn Any> = inner.clone();
        variables.insert(name.to_string(), erased);
        Ok(ConditionVariable { inner })
    }

    /// Look up a variable; `None` if absent or of a different type
    pub(crate) fn lookup<T: Clone + 'static>(&self, name: &str) -> Option<ConditionVariable<T>> {
        let erased = self.variables.borrow().get(name)?.clone();
        erased
            .downcast::<VariableCell<T>>()
            .ok()
            .map(|inner| ConditionVariable { inner })
    }

    pub(crate) fn waits(&self) -> &ConditionWaits {
        &self.waits
    }

    pub(crate) fn len(&self) -> usize {
        self.variables.borrow().len()
    }
}

pub(crate) type WaitId = u64;

pub(crate) struct ConditionWait {
    pub(crate) task: TaskId,
    pub(crate) condition: Condition,
}

/// Condition-wait registry: variable name -> waits depending on it
#[derive(Default)]
pub(crate) struct ConditionRegistry {
    next_wait: WaitId,
    waits: FxHashMap<WaitId, ConditionWait>,
    by_name: FxHashMap<String, Vec<WaitId>>,
    catch_all: Vec<WaitId>,
    /// Tasks paused while parked; their waits are not evaluated
    held: FxHashSet<TaskId>,
}

impl ConditionRegistry {
    pub(crate) fn register(&mut self, task: TaskId, condition: Condition) -> WaitId {
        let wait = self.next_wait;
        self.next_wait += 1;

        if condition.dependencies().is_empty() {
            self.catch_all.push(wait);
        } else {
            for name in condition.dependencies() {
                self.by_name.entry(name.clone()).or_default().push(wait);
            }
        }
        self.waits.insert(wait, ConditionWait { task, condition });
        wait
    }

    /// Remove a wait from every name it was registered under
    pub(crate) fn remove(&mut self, wait: WaitId) -> Option<ConditionWait> {
        let entry = self.waits.remove(&wait)?;
        if entry.condition.dependencies().is_empty() {
            self.catch_all.retain(|w| *w != wait);
        }
        for name in entry.condition.dependencies() {
            if let Some(list) = self.by_name.get_mut(name) {
                list.retain(|w| *w != wait);
                if list.is_empty() {
                    self.by_name.remove(name);
                }
            }
        }
        Some(entry)
    }

    /// Drop every wait held by `task`
    pub(crate) fn remove_task(&mut self, task: TaskId) -> usize {
        self.held.remove(&task);
        let mut owned: Vec<WaitId> = self
            .waits
            .iter()
            .filter(|(_, w)| w.task == task)
            .map(|(id, _)| *id)
            .collect();
        owned.sort_unstable();
        for wait in &owned {
            self.remove(*wait);
        }
        owned.len()
    }

    /// Snapshot of the waits to evaluate when `name` changes, in registration
    /// order per bucket, skipping held tasks
    pub(crate) fn candidates(&self, name: &str) -> Vec<(WaitId, Condition)> {
        let named = self.by_name.get(name).map(Vec::as_slice).unwrap_or_default();
        named
            .iter()
            .chain(&self.catch_all)
            .filter_map(|wait| {
                let entry = self.waits.get(wait)?;
                if self.held.contains(&entry.task) {
                    return None;
                }
                Some((*wait, entry.condition.clone()))
            })
            .collect()
    }

    pub(crate) fn set_held(&mut self, task: TaskId, held: bool) {
        if held {
            self.held.insert(task);
        } else {
            self.held.remove(&task);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waits.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waits.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn has_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

/// Condition-wait registry shared by the scheduler and every variable, plus
/// the tasks woken by writes since the scheduler last collected them
#[derive(Default)]
pub(crate) struct ConditionWaits {
    registry: RefCell<ConditionRegistry>,
    woken: RefCell<Vec<TaskId>>,
}

impl ConditionWaits {
    pub(crate) fn register(&self, task: TaskId, condition: Condition) -> WaitId {
        self.registry.borrow_mut().register(task, condition)
    }

    pub(crate) fn remove_task(&self, task: TaskId) -> usize {
        self.registry.borrow_mut().remove_task(task)
    }

    /// Exclude (or re-admit) `task`'s waits from evaluation
    pub(crate) fn set_held(&self, task: TaskId, held: bool) {
        self.registry.borrow_mut().set_held(task, held);
    }

    /// Evaluate the waits registered under `name` now
    ///
    /// Satisfied waits are removed from every name and their tasks appended to
    /// the woken list. Returns how many were satisfied. No borrow is held while
    /// a predicate runs, so a predicate may itself write a variable.
    pub(crate) fn notify(&self, name: &str) -> usize {
        let candidates = self.registry.borrow().candidates(name);
        let mut satisfied = 0;
        for (wait, condition) in candidates {
            if !condition.evaluate() {
                continue;
            }
            // A nested write may already have resolved this wait
            let Some(entry) = self.registry.borrow_mut().remove(wait) else {
                continue;
            };
            self.woken.borrow_mut().push(entry.task);
            satisfied += 1;
        }
        satisfied
    }

    /// Tasks woken since the last call, in wake order
    pub(crate) fn take_woken(&self) -> Vec<TaskId> {
        std::mem::take(&mut *self.woken.borrow_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.registry.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.registry.borrow().is_empty()
    }
}
