use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::rc::Rc;

use crate::kernel::coerce::{self, Deferral, Raw};
use crate::kernel::config::Config;
use crate::kernel::error::{Error, Result};
use crate::kernel::input::{LineSource, StdinLines};
use crate::kernel::values::Data;

/// Handle to a scope inside a [`Memory`]. Stale handles (to released scopes)
/// are detected through the generation counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Scope {
    pub(crate) parent: Option<ScopeId>,
    pub(crate) children: Vec<ScopeId>,
    pub(crate) bindings: HashMap<String, Data>,
    pub(crate) block: bool,
}

struct Slot {
    generation: u32,
    scope: Option<Scope>,
}

/// Scopes whose last owner has gone away, waiting for [`Memory::reclaim`].
pub(crate) type Graveyard = Rc<RefCell<Vec<ScopeId>>>;

/// Ownership of an instance scope. Every value holding the instance shares
/// one lease; when the last clone drops, the scope is queued for release.
#[derive(Debug)]
pub(crate) struct Lease {
    scope: ScopeId,
    graveyard: Graveyard,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.graveyard.borrow_mut().push(self.scope);
    }
}

/// The scope tree. Every scope lives in this arena; children are owned through
/// it and parents are plain handles, so values can point back at the scope they
/// came from without forming cycles.
pub struct Memory {
    slots: Vec<Slot>,
    free: Vec<u32>,
    global: ScopeId,
    input: Box<dyn LineSource>,
    graveyard: Graveyard,
    pub(crate) config: Config,
    pub(crate) call_depth: usize,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Memory {
    pub fn new(config: Config) -> Self {
        Self::with_input(config, Box::new(StdinLines))
    }

    pub fn with_input(config: Config, input: Box<dyn LineSource>) -> Self {
        let mut memory = Self {
            slots: Vec::new(),
            free: Vec::new(),
            global: ScopeId { index: 0, generation: 0 },
            input,
            graveyard: Graveyard::default(),
            config,
            call_depth: 0,
        };
        memory.global = memory.insert(Scope::default());
        memory
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The top-level scope created with this memory.
    pub fn global(&self) -> ScopeId {
        self.global
    }

    // ---- tree ----

    pub(crate) fn insert(&mut self, scope: Scope) -> ScopeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.scope = Some(scope);
            return ScopeId { index, generation: slot.generation };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot { generation: 0, scope: Some(scope) });
        ScopeId { index, generation: 0 }
    }

    pub(crate) fn scope(&self, id: ScopeId) -> Result<&Scope> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.scope.as_ref())
            .ok_or(Error::ReleasedScope(id))
    }

    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> Result<&mut Scope> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.scope.as_mut())
            .ok_or(Error::ReleasedScope(id))
    }

    pub(crate) fn attach(&mut self, parent: ScopeId, block: bool) -> Result<ScopeId> {
        self.reclaim();
        self.scope(parent)?;
        let child = self.insert(Scope { parent: Some(parent), block, ..Scope::default() });
        self.scope_mut(parent)?.children.push(child);
        Ok(child)
    }

    /// New child scope, e.g. for a call frame.
    pub fn spawn(&mut self, parent: ScopeId) -> Result<ScopeId> {
        self.attach(parent, false)
    }

    /// New child scope that stops `bind_global` from climbing further.
    pub fn spawn_block(&mut self, parent: ScopeId) -> Result<ScopeId> {
        self.attach(parent, true)
    }

    pub fn set_block(&mut self, scope: ScopeId, block: bool) -> Result<()> {
        self.scope_mut(scope)?.block = block;
        Ok(())
    }

    /// Drop a scope and everything below it.
    pub fn release(&mut self, scope: ScopeId) {
        if scope == self.global {
            tracing::warn!("refusing to release the global scope");
            return;
        }
        let Ok(parent) = self.scope(scope).map(|s| s.parent) else {
            return;
        };
        if let Some(parent) = parent
            && let Ok(p) = self.scope_mut(parent)
        {
            p.children.retain(|c| *c != scope);
        }
        let mut stack = vec![scope];
        while let Some(id) = stack.pop() {
            let Some(slot) = self.slots.get_mut(id.index as usize) else { continue };
            if slot.generation != id.generation {
                continue;
            }
            if let Some(dead) = slot.scope.take() {
                stack.extend(dead.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
            }
        }
        tracing::trace!(%scope, "released scope");
    }

    pub(crate) fn lease(&self, scope: ScopeId) -> Rc<Lease> {
        Rc::new(Lease { scope, graveyard: Rc::clone(&self.graveyard) })
    }

    /// Release every instance scope nothing refers to any more. Runs on its
    /// own whenever a scope is created.
    pub fn reclaim(&mut self) {
        loop {
            let dead = std::mem::take(&mut *self.graveyard.borrow_mut());
            if dead.is_empty() {
                break;
            }
            tracing::trace!(count = dead.len(), "reclaiming instances");
            // releasing may drop further leases held in the released bindings
            for scope in dead {
                self.release(scope);
            }
        }
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scope(scope).ok().and_then(|s| s.parent)
    }

    pub fn children(&self, scope: ScopeId) -> &[ScopeId] {
        self.scope(scope).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    pub fn is_block(&self, scope: ScopeId) -> bool {
        self.scope(scope).is_ok_and(|s| s.block)
    }

    /// Binding held directly by `scope`, ignoring its parents.
    pub fn local(&self, scope: ScopeId, name: &str) -> Option<&Data> {
        self.scope(scope).ok()?.bindings.get(name)
    }

    pub fn local_names(&self, scope: ScopeId) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .scope(scope)
            .map(|s| s.bindings.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    pub fn root(&self, scope: ScopeId) -> ScopeId {
        let mut current = scope;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    // ---- bindings ----

    pub fn coerce(&mut self, scope: ScopeId, raw: impl Into<Raw>, deferral: Deferral) -> Result<Data> {
        self.scope(scope)?;
        coerce::coerce(self, scope, raw.into(), deferral)
    }

    /// Declare `name` in `scope`, shadowing anything further up. `a.b` binds `b`
    /// inside the members of `a`.
    pub fn bind(&mut self, scope: ScopeId, name: &str, raw: impl Into<Raw>) -> Result<()> {
        match name.split_once('.') {
            None => {
                let data = self.coerce(scope, raw, Deferral::Allow)?.rehome(scope, name);
                self.scope_mut(scope)?.bindings.insert(name.to_string(), data);
                Ok(())
            }
            Some((head, rest)) => {
                let members = self.member_scope(scope, head, name)?;
                self.bind(members, rest, raw)
            }
        }
    }

    /// Bind in the nearest scope that has no parent or is a block boundary.
    pub fn bind_global(&mut self, scope: ScopeId, name: &str, raw: impl Into<Raw>) -> Result<()> {
        let mut target = scope;
        loop {
            let s = self.scope(target)?;
            match s.parent {
                Some(parent) if !s.block => target = parent,
                _ => break,
            }
        }
        self.bind(target, name, raw)
    }

    /// Overwrite the nearest existing binding of `name`. Unknown names are ignored.
    pub fn assign(&mut self, scope: ScopeId, name: &str, raw: impl Into<Raw>) -> Result<()> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id)?;
            if s.bindings.contains_key(name) {
                let data = self.coerce(id, raw, Deferral::Allow)?.rehome(id, name);
                self.scope_mut(id)?.bindings.insert(name.to_string(), data);
                return Ok(());
            }
            current = s.parent;
        }
        tracing::debug!(name, "assign to unbound name ignored");
        Ok(())
    }

    /// Whether the head of `name` is bound anywhere up the chain.
    pub fn contains(&self, scope: ScopeId, name: &str) -> bool {
        let head = name.split_once('.').map_or(name, |(head, _)| head);
        let mut current = Some(scope);
        while let Some(id) = current {
            let Ok(s) = self.scope(id) else { return false };
            if s.bindings.contains_key(head) {
                return true;
            }
            current = s.parent;
        }
        false
    }

    /// Look `name` up the chain, descending into members for `a.b`. A name the
    /// root does not know is read as a literal.
    pub fn resolve(&mut self, scope: ScopeId, name: &str) -> Result<Data> {
        let (head, rest) = match name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (name, None),
        };
        let mut current = scope;
        loop {
            let s = self.scope(current)?;
            if let Some(found) = s.bindings.get(head) {
                let Some(rest) = rest else {
                    return Ok(found.clone());
                };
                let members = found.member_scope().ok_or_else(|| Error::UnresolvedTarget {
                    head: head.to_string(),
                    name: name.to_string(),
                })?;
                return self.resolve(members, rest);
            }
            match s.parent {
                Some(parent) => current = parent,
                None => return self.coerce(current, name, Deferral::Allow),
            }
        }
    }

    fn member_scope(&mut self, scope: ScopeId, head: &str, name: &str) -> Result<ScopeId> {
        let unresolved = || Error::UnresolvedTarget {
            head: head.to_string(),
            name: name.to_string(),
        };
        if !self.contains(scope, head) {
            return Err(unresolved());
        }
        self.resolve(scope, head)?.member_scope().ok_or_else(unresolved)
    }

    pub(crate) fn read_input(&mut self) -> io::Result<String> {
        if self.config.prompts_noninteractive {
            return Err(io::Error::other("input disabled in noninteractive mode"));
        }
        self.input.read_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::values::{Kind, ObjectRef};
    use anyhow::Result;

    #[test]
    fn call_scope_reads_and_mutates_global() -> Result<()> {
        let mut mem = Memory::default();
        let global = mem.global();
        let call = mem.spawn(global)?;
        mem.bind(global, "x", "5")?;

        let x = mem.resolve(call, "x")?;
        assert_eq!(x.kind(), Kind::Int);
        assert_eq!(x.as_int(), Some(5));

        mem.assign(call, "x", "7")?;
        assert_eq!(mem.resolve(global, "x")?.as_int(), Some(7));
        assert!(mem.local(call, "x").is_none());
        Ok(())
    }

    #[test]
    fn bind_shadows_without_touching_parent() -> Result<()> {
        let mut mem = Memory::default();
        let global = mem.global();
        let call = mem.spawn(global)?;
        mem.bind(global, "x", "1")?;
        mem.bind(call, "x", "'inner'")?;
        assert_eq!(mem.resolve(call, "x")?.as_str(), Some("inner"));
        assert_eq!(mem.resolve(global, "x")?.as_int(), Some(1));

        mem.assign(call, "x", "'changed'")?;
        assert_eq!(mem.resolve(call, "x")?.as_str(), Some("changed"));
        assert_eq!(mem.resolve(global, "x")?.as_int(), Some(1));
        Ok(())
    }

    #[test]
    fn bind_global_skips_intermediate_scopes() -> Result<()> {
        let mut mem = Memory::default();
        let global = mem.global();
        let outer = mem.spawn(global)?;
        let inner = mem.spawn(outer)?;
        mem.bind_global(inner, "g", "1")?;
        assert!(mem.local(global, "g").is_some());
        assert!(mem.local(outer, "g").is_none());
        assert!(mem.local(inner, "g").is_none());
        Ok(())
    }

    #[test]
    fn bind_global_stops_at_block_boundary() -> Result<()> {
        let mut mem = Memory::default();
        let global = mem.global();
        let module = mem.spawn_block(global)?;
        let call = mem.spawn(module)?;
        let nested = mem.spawn(call)?;
        assert!(mem.is_block(module));
        assert!(!mem.is_block(call));
        mem.bind_global(nested, "g", "2")?;
        assert!(mem.local(module, "g").is_some());
        assert!(mem.local(call, "g").is_none());
        assert!(mem.local(global, "g").is_none());

        mem.set_block(module, false)?;
        assert!(!mem.is_block(module));
        mem.bind_global(nested, "h", "3")?;
        assert!(mem.local(global, "h").is_some());
        Ok(())
    }

    #[test]
    fn assign_to_unknown_name_changes_nothing() -> Result<()> {
        let mut mem = Memory::default();
        let global = mem.global();
        let call = mem.spawn(global)?;
        mem.bind(global, "a", "1")?;
        mem.bind(call, "b", "2")?;
        let before = (mem.local(global, "a").cloned(), mem.local(call, "b").cloned());

        mem.assign(call, "missing", "3")?;
        assert_eq!(mem.local_names(global), vec!["a"]);
        assert_eq!(mem.local_names(call), vec!["b"]);
        assert_eq!((mem.local(global, "a").cloned(), mem.local(call, "b").cloned()), before);
        Ok(())
    }

    #[test]
    fn contains_checks_head_segment() -> Result<()> {
        let mut mem = Memory::default();
        let global = mem.global();
        let call = mem.spawn(global)?;
        mem.bind(global, "obj", "1")?;
        assert!(mem.contains(call, "obj"));
        assert!(mem.contains(call, "obj.field.deep"));
        assert!(!mem.contains(call, "other"));

        mem.release(call);
        assert!(!mem.contains(call, "obj"));
        Ok(())
    }

    #[test]
    fn dotted_names_reach_members() -> Result<()> {
        let mut mem = Memory::default();
        let global = mem.global();
        let members = mem.spawn(global)?;
        mem.bind(global, "point", ObjectRef::new(members))?;
        mem.bind(global, "point.x", "3")?;
        assert_eq!(mem.local(members, "x").and_then(Data::as_int), Some(3));
        assert_eq!(mem.resolve(global, "point.x")?.as_int(), Some(3));

        let err = mem.bind(global, "ghost.x", "1").unwrap_err();
        assert!(matches!(err, Error::UnresolvedTarget { ref head, .. } if head == "ghost"));
        mem.bind(global, "n", "1")?;
        assert!(matches!(mem.resolve(global, "n.x"), Err(Error::UnresolvedTarget { .. })));
        Ok(())
    }

    #[test]
    fn root_reads_literals() -> Result<()> {
        let mut mem = Memory::default();
        let global = mem.global();
        let call = mem.spawn(global)?;
        assert_eq!(mem.resolve(call, "2.75")?.as_float(), Some(2.75));
        assert_eq!(mem.resolve(call, "'a.b'")?.as_str(), Some("a.b"));
        assert_eq!(mem.resolve(call, "nobody")?.kind(), Kind::Unresolved);
        Ok(())
    }

    #[test]
    fn release_drops_subtree() -> Result<()> {
        let mut mem = Memory::default();
        let global = mem.global();
        let call = mem.spawn(global)?;
        let inner = mem.spawn(call)?;
        mem.bind(inner, "v", "1")?;
        assert_eq!(mem.root(inner), global);
        assert_eq!(mem.children(global), &[call]);

        mem.release(call);
        assert!(mem.children(global).is_empty());
        assert!(matches!(mem.resolve(inner, "v"), Err(Error::ReleasedScope(id)) if id == inner));

        // slot reuse does not revive stale handles
        let fresh = mem.spawn(global)?;
        assert_ne!(fresh, call);
        assert!(mem.local(call, "v").is_none());

        mem.release(global);
        assert!(mem.scope(global).is_ok());
        Ok(())
    }
}
