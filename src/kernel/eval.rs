use std::rc::Rc;

use crate::kernel::coerce::{Deferral, Raw};
use crate::kernel::error::{Error, Result};
use crate::kernel::memory::{Memory, ScopeId};
use crate::kernel::routine::Routine;
use crate::kernel::text::{split_suffix, split_top_level};
use crate::kernel::values::{Data, Payload};

impl Memory {
    /// Evaluate `f(args)`, `target[index]`, or a plain literal/name.
    ///
    /// Call and index syntax only apply when the head before `(`/`[` is bound;
    /// otherwise the whole text is coerced as it stands.
    pub fn evaluate_value(&mut self, scope: ScopeId, expression: &str, file: &str) -> Result<Data> {
        if let Some((head, args)) = split_suffix(expression, '(', ')')
            && self.contains(scope, head)
        {
            let target = self.resolve(scope, head)?;
            return self.apply(scope, target, args, file);
        }
        if let Some((head, index)) = split_suffix(expression, '[', ']')
            && self.contains(scope, head)
        {
            let target = self.resolve(scope, head)?;
            let index = self.evaluate_value(scope, index, file)?;
            return target.list_element(&index);
        }
        self.coerce(scope, expression, Deferral::Allow)
    }

    fn apply(&mut self, caller: ScopeId, target: Data, args: &str, file: &str) -> Result<Data> {
        match target.value() {
            Payload::Callable(routine) => {
                let routine = Rc::clone(routine);
                self.call(caller, routine, args, file)
            }
            Payload::Object(object) => {
                let copy = self.instantiate(object)?;
                Ok(Data::new(Payload::Object(copy)))
            }
            _ => Err(Error::NotCallable(target.name().to_string())),
        }
    }

    /// Run `routine` with the comma-separated `args`, each evaluated in `caller`.
    pub fn call(&mut self, caller: ScopeId, routine: Rc<dyn Routine>, args: &str, file: &str) -> Result<Data> {
        let limit = self.config.max_call_depth;
        if self.call_depth >= limit {
            return Err(Error::CallDepthExceeded(limit));
        }
        let mut values = Vec::new();
        for (arg, param) in split_top_level(args, ',').into_iter().map(str::trim).zip(routine.params()) {
            if arg.is_empty() {
                continue;
            }
            values.push((param.clone(), self.evaluate_value(caller, arg, file)?));
        }

        let frame = self.spawn(routine.scope())?;
        tracing::trace!(%frame, depth = self.call_depth, "call");
        self.call_depth += 1;
        let result = self.run_frame(frame, routine.as_ref(), values, file);
        self.call_depth -= 1;
        self.release(frame);
        result.map(Data::detach)
    }

    fn run_frame(&mut self, frame: ScopeId, routine: &dyn Routine, args: Vec<(String, Data)>, file: &str) -> Result<Data> {
        for (param, value) in args {
            self.bind(frame, &param, Raw::Value(value))?;
        }
        routine.run(self, frame, file).map_err(|err| match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(other) => Error::Routine(other),
        })
    }
}
