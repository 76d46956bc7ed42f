// Environment / call frame.
//
// Kept as a direct generalization of `Env<T>`: a RefCell-guarded scope
// table plus a non-owning parent link, chained with `Env::chain`.
// Variable names and function names never collide with each other, so
// this Environment carries two tables instead of being generic over T.
//
// `depth` and `config` back the recursion guard `EvalConfig::max_call_depth`
// introduces, so a runaway user function fails with a catchable
// EvalError instead of overrunning the native stack. `config` rides
// along the parent chain rather than being threaded through every
// evaluator function signature.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{FnCell, VarCell};
use crate::config::EvalConfig;

pub struct Environment {
    vars: RefCell<HashMap<String, VarCell>>,
    fns: RefCell<HashMap<String, FnCell>>,
    parent: Option<Rc<Environment>>,
    pub depth: usize,
    pub config: Rc<EvalConfig>,
}

impl Environment {
    fn new(parent: Option<Rc<Environment>>, config: Rc<EvalConfig>) -> Environment {
        let depth = parent.as_ref().map_or(0, |p| p.depth + 1);
        Environment {
            vars: RefCell::new(HashMap::new()),
            fns: RefCell::new(HashMap::new()),
            parent,
            depth,
            config,
        }
    }

    // The global environment, created once at startup.
    pub fn root(config: EvalConfig) -> Environment {
        Self::new(None, Rc::new(config))
    }

    // A per-call frame, created on user function entry and discarded
    // on return.
    pub fn chain(parent: &Rc<Environment>) -> Environment {
        Self::new(Some(parent.clone()), parent.config.clone())
    }

    pub fn get_var(&self, name: &str) -> Option<VarCell> {
        if let Some(v) = self.vars.borrow().get(name) {
            Some(v.clone())
        } else if let Some(parent) = &self.parent {
            parent.get_var(name)
        } else {
            None
        }
    }

    // Frame-local lookup, used by the `default` statement: optional
    // parameters live in the callee's own frame, so this deliberately
    // does not walk the parent chain.
    pub fn get_var_local(&self, name: &str) -> Option<VarCell> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn get_fn(&self, name: &str) -> Option<FnCell> {
        if let Some(f) = self.fns.borrow().get(name) {
            Some(f.clone())
        } else if let Some(parent) = &self.parent {
            parent.get_fn(name)
        } else {
            None
        }
    }

    // Creation always targets the current environment.
    pub fn put_var(&self, var: VarCell) {
        let name = var.borrow().name.to_string();
        self.vars.borrow_mut().insert(name, var);
    }

    pub fn put_fn(&self, fun: FnCell) {
        let name = fun.name().to_string();
        self.fns.borrow_mut().insert(name, fun);
    }
}
