use std::{cell::RefCell, fmt, rc::Rc};

use log::debug;

use super::{Class, ClassId};
use crate::{
    error::{ErrorKind, LinkError},
    vm::{LoaderId, Vm},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LazyState {
    Pending(LoaderId),
    Resolved(ClassId),
}

/// Reference to a class that is only loaded when first dereferenced.
///
/// Parents and interfaces are held this way so a class can be built before
/// the classes it names are available.
pub struct LazyClass {
    name: Rc<str>,
    state: RefCell<LazyState>,
}

impl LazyClass {
    pub fn pending(loader: LoaderId, name: Rc<str>) -> Self {
        Self {
            name,
            state: RefCell::new(LazyState::Pending(loader)),
        }
    }

    pub fn resolved(class: &Class) -> Self {
        Self {
            name: class.name.clone(),
            state: RefCell::new(LazyState::Resolved(class.id)),
        }
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.state.borrow(), LazyState::Resolved(_))
    }

    /// Resolve the reference, loading the class if needed.
    pub fn get(&self, vm: &Vm) -> Result<Rc<Class>> {
        let loader = match *self.state.borrow() {
            LazyState::Resolved(id) => return Ok(vm.class(id)),
            LazyState::Pending(loader) => loader,
        };
        let class = vm.load_class_in(loader, &self.name)?;
        *self.state.borrow_mut() = LazyState::Resolved(class.id);
        Ok(class)
    }

    /// Like [`LazyClass::get`], but a class that cannot be found is `None`
    /// instead of an error.
    pub fn try_get(&self, vm: &Vm) -> Result<Option<Rc<Class>>> {
        match self.get(vm) {
            Ok(class) => Ok(Some(class)),
            Err(e) if matches!(e.kind(), ErrorKind::Link(LinkError::ClassNotFound(_))) => {
                debug!("{} is not available: {}", self.name, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl fmt::Debug for LazyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LazyClass({}, {:?})", self.name, self.state.borrow())
    }
}
