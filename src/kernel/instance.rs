// Object instantiation: deep copy of a member scope subtree.
use std::collections::HashMap;
use std::rc::Rc;

use crate::kernel::error::Result;
use crate::kernel::memory::{Memory, ScopeId};
use crate::kernel::routine::Routine;
use crate::kernel::values::{Data, ObjectRef, Payload};

type Remap = HashMap<ScopeId, ScopeId>;

impl Memory {
    /// Copy `object` into an independent instance.
    ///
    /// Phase one clones the member scope and everything below it, re-linking
    /// any handle that points inside the cloned subtree. Phase two puts the
    /// entry binding back to the pre-copy value in every cloned scope, so all
    /// instances share that one entity.
    ///
    /// The copy hangs off the original's parent and lives as long as the
    /// returned handle or one of its clones. A root scope is never copied:
    /// objects whose members are a root share it.
    pub fn instantiate(&mut self, object: &ObjectRef) -> Result<ObjectRef> {
        let Some(members) = object.members else {
            return Ok(object.clone());
        };
        let Some(parent) = self.scope(members)?.parent else {
            tracing::debug!(%members, "object members are a root scope; sharing it");
            return Ok(object.clone());
        };

        let mut remap = Remap::new();
        let copy = self.clone_subtree(members, parent, &mut remap)?;
        for &cloned in remap.values() {
            let scope = self.scope_mut(cloned)?;
            let bindings = std::mem::take(&mut scope.bindings);
            scope.bindings = bindings
                .into_iter()
                .map(|(name, data)| (name, relink(data, &remap)))
                .collect();
        }

        let anchor = self.config.entry_binding.clone();
        for (&source, &cloned) in &remap {
            let Some(shared) = self.scope(source)?.bindings.get(&anchor).cloned() else {
                continue;
            };
            self.scope_mut(cloned)?
                .bindings
                .insert(anchor.clone(), shared.rehome(cloned, anchor.as_str()));
        }

        tracing::debug!(scopes = remap.len(), %copy, "instantiated object");
        let mut instance = relink_object(object.clone(), &remap);
        instance.lease = Some(self.lease(copy));
        Ok(instance)
    }

    fn clone_subtree(&mut self, source: ScopeId, parent: ScopeId, remap: &mut Remap) -> Result<ScopeId> {
        let (bindings, block, children) = {
            let s = self.scope(source)?;
            (s.bindings.clone(), s.block, s.children.clone())
        };
        let copy = self.attach(parent, block)?;
        self.scope_mut(copy)?.bindings = bindings;
        remap.insert(source, copy);
        for child in children {
            self.clone_subtree(child, copy, remap)?;
        }
        Ok(copy)
    }
}

fn relink(mut data: Data, remap: &Remap) -> Data {
    data.scope = data.scope.map(|s| remap.get(&s).copied().unwrap_or(s));
    data.payload = match data.payload {
        Payload::List(items) => Payload::List(items.into_iter().map(|d| relink(d, remap)).collect()),
        Payload::Object(obj) => Payload::Object(relink_object(obj, remap)),
        Payload::Callable(routine) => Payload::Callable(relink_routine(routine, remap)),
        other => other,
    };
    data
}

// A handle into the cloned subtree is owned by the copy root, not by its own lease.
fn relink_object(obj: ObjectRef, remap: &Remap) -> ObjectRef {
    let moved = obj.members.and_then(|s| remap.get(&s).copied());
    ObjectRef {
        members: moved.or(obj.members),
        routine: obj.routine.map(|r| relink_routine(r, remap)),
        lease: if moved.is_some() { None } else { obj.lease },
    }
}

fn relink_routine(routine: Rc<dyn Routine>, remap: &Remap) -> Rc<dyn Routine> {
    match remap.get(&routine.scope()) {
        Some(&scope) => routine.rebind(scope),
        None => routine,
    }
}
