use crate::error::UndefinedVariable;
use crate::value::Value;
use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
pub(crate) struct Environment {
    enclosing: Option<Rc<RefCell<Environment>>>,
    values: AHashMap<String, Value>,
}

impl Environment {
    pub(crate) fn new() -> Self {
        Environment::default()
    }

    pub(crate) fn with(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            enclosing: Some(enclosing),
            values: AHashMap::new(),
        }
    }

    pub(crate) fn define(&mut self, key: &str, value: Value) {
        self.values.insert(String::from(key), value);
    }

    pub(crate) fn get(&self, key: &str) -> Result<Value, UndefinedVariable> {
        if let Some(val) = self.values.get(key) {
            Ok(val.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(key)
        } else {
            Err(UndefinedVariable::new(key))
        }
    }

    pub(crate) fn assign(&mut self, key: &str, value: Value) -> Result<(), UndefinedVariable> {
        if let Some(val) = self.values.get_mut(key) {
            *val = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(key, value)
        } else {
            Err(UndefinedVariable::new(key))
        }
    }

    // Resolved lookups never walk past the frame they target, unlike `get` and `assign`. The
    // resolver guarantees the binding is there, so a miss is reported rather than searched for.
    pub(crate) fn get_at(
        env: &Rc<RefCell<Environment>>,
        dist: usize,
        key: &str,
    ) -> Result<Value, UndefinedVariable> {
        let frame = Environment::ancestor(env, dist).ok_or_else(|| UndefinedVariable::new(key))?;
        let value = frame.borrow().values.get(key).cloned();
        value.ok_or_else(|| UndefinedVariable::new(key))
    }

    pub(crate) fn assign_at(
        env: &Rc<RefCell<Environment>>,
        dist: usize,
        key: &str,
        value: Value,
    ) -> Result<(), UndefinedVariable> {
        let frame = Environment::ancestor(env, dist).ok_or_else(|| UndefinedVariable::new(key))?;
        let mut frame = frame.borrow_mut();
        match frame.values.get_mut(key) {
            Some(val) => {
                *val = value;
                Ok(())
            }
            None => Err(UndefinedVariable::new(key)),
        }
    }

    fn ancestor(env: &Rc<RefCell<Environment>>, dist: usize) -> Option<Rc<RefCell<Environment>>> {
        let mut frame = Rc::clone(env);
        for _ in 0..dist {
            let parent = frame.borrow().enclosing.clone()?;
            frame = parent;
        }
        Some(frame)
    }
}
