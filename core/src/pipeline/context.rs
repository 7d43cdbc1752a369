// core/src/pipeline/context.rs

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Shared, lockable state of one flow run, handed to every step handler.
///
/// Lock guards obtained from this struct are blocking and MUST NOT be held
/// across `.await` points; read what you need in a scope, drop the guard, then await.
#[derive(Debug)]
pub struct StepContext<T: Send + Sync + 'static>(Arc<RwLock<T>>);

impl<T: Send + Sync + 'static> StepContext<T> {
  pub fn new(data: T) -> Self {
    StepContext(Arc::new(RwLock::new(data)))
  }

  pub fn read(&self) -> RwLockReadGuard<'_, T> {
    self.0.read()
  }

  pub fn write(&self) -> RwLockWriteGuard<'_, T> {
    self.0.write()
  }
}

impl<T: Send + Sync + 'static> Clone for StepContext<T> {
  fn clone(&self) -> Self {
    StepContext(Arc::clone(&self.0))
  }
}

impl<T: Send + Sync + 'static + Default> Default for StepContext<T> {
  fn default() -> Self {
    Self::new(Default::default())
  }
}
