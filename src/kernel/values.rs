// values.rs
use std::fmt;
use std::rc::Rc;

use crate::kernel::coerce::{Deferral, Raw};
use crate::kernel::error::{Error, Result};
use crate::kernel::memory::{Lease, Memory, ScopeId};
use crate::kernel::routine::Routine;
use crate::kernel::text::normalize_index;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Str,
    Int,
    Float,
    List,
    Callable,
    Object,
    Bool,
    Unresolved,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Str => "str",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::List => "list",
            Kind::Callable => "callable",
            Kind::Object => "object",
            Kind::Bool => "bool",
            Kind::Unresolved => "unresolved name",
        };
        f.write_str(name)
    }
}

/// Handle to an object instance: the scope its members resolve in, plus the
/// routine that built it, when there is one.
///
/// Instances made by calling an object own their member scope through a
/// shared lease; it is released once the last handle is dropped.
#[derive(Clone, Debug, Default)]
pub struct ObjectRef {
    pub members: Option<ScopeId>,
    pub routine: Option<Rc<dyn Routine>>,
    pub(crate) lease: Option<Rc<Lease>>,
}

impl ObjectRef {
    pub fn new(members: ScopeId) -> Self {
        Self { members: Some(members), routine: None, lease: None }
    }

    pub fn with_routine(routine: Rc<dyn Routine>) -> Self {
        Self { members: Some(routine.scope()), routine: Some(routine), lease: None }
    }

    /// Whether this handle keeps its member scope alive.
    pub fn is_owned(&self) -> bool {
        self.lease.is_some()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
            && match (&self.routine, &other.routine) {
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

#[derive(Clone, Debug)]
pub enum Payload {
    Str(String),
    Int(i64),
    Float(f64),
    List(Vec<Data>),
    Callable(Rc<dyn Routine>),
    Object(ObjectRef),
    Bool(bool),
    Unresolved,
}

impl Payload {
    pub fn kind(&self) -> Kind {
        match self {
            Payload::Str(_) => Kind::Str,
            Payload::Int(_) => Kind::Int,
            Payload::Float(_) => Kind::Float,
            Payload::List(_) => Kind::List,
            Payload::Callable(_) => Kind::Callable,
            Payload::Object(_) => Kind::Object,
            Payload::Bool(_) => Kind::Bool,
            Payload::Unresolved => Kind::Unresolved,
        }
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Payload::Str(a), Payload::Str(b)) => a == b,
            (Payload::Int(a), Payload::Int(b)) => a == b,
            (Payload::Float(a), Payload::Float(b)) => a == b,
            (Payload::List(a), Payload::List(b)) => a == b,
            (Payload::Callable(a), Payload::Callable(b)) => Rc::ptr_eq(a, b),
            (Payload::Object(a), Payload::Object(b)) => a == b,
            (Payload::Bool(a), Payload::Bool(b)) => a == b,
            (Payload::Unresolved, Payload::Unresolved) => true,
            _ => false,
        }
    }
}

/// A coerced runtime value together with the scope and name it was bound under.
///
/// Equality is structural over all three parts: two values holding the same
/// payload under different names are different values.
#[derive(Clone, Debug, PartialEq)]
pub struct Data {
    pub(crate) payload: Payload,
    pub(crate) scope: Option<ScopeId>,
    pub(crate) name: String,
}

impl Data {
    /// A value that belongs to no scope, e.g. a routine's result.
    pub fn new(payload: Payload) -> Self {
        Self { payload, scope: None, name: String::new() }
    }

    pub(crate) fn bound(payload: Payload, scope: ScopeId, name: impl Into<String>) -> Self {
        Self { payload, scope: Some(scope), name: name.into() }
    }

    pub fn str(s: impl Into<String>) -> Self {
        Self::new(Payload::Str(s.into()))
    }
    pub fn int(n: i64) -> Self {
        Self::new(Payload::Int(n))
    }
    pub fn float(n: f64) -> Self {
        Self::new(Payload::Float(n))
    }
    pub fn bool(b: bool) -> Self {
        Self::new(Payload::Bool(b))
    }

    pub fn kind(&self) -> Kind {
        self.payload.kind()
    }
    pub fn value(&self) -> &Payload {
        &self.payload
    }
    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.payload {
            Payload::Int(n) => Some(n),
            _ => None,
        }
    }
    pub fn as_float(&self) -> Option<f64> {
        match self.payload {
            Payload::Float(n) => Some(n),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::Str(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self.payload {
            Payload::Bool(b) => Some(b),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&[Data]> {
        match &self.payload {
            Payload::List(items) => Some(items),
            _ => None,
        }
    }

    /// Scope that dotted member access descends into.
    pub fn member_scope(&self) -> Option<ScopeId> {
        match &self.payload {
            Payload::Object(obj) => obj.members,
            Payload::Callable(routine) => Some(routine.scope()),
            _ => None,
        }
    }

    pub(crate) fn rehome(mut self, scope: ScopeId, name: impl Into<String>) -> Self {
        self.scope = Some(scope);
        self.name = name.into();
        self
    }

    pub(crate) fn detach(mut self) -> Self {
        self.scope = None;
        self.name.clear();
        self
    }

    /// Canonical text form. Strings keep their quotes so the text coerces back
    /// to the same value.
    pub fn render(&self) -> String {
        match &self.payload {
            Payload::Str(s) => format!("'{s}'"),
            Payload::Int(n) => n.to_string(),
            Payload::Float(n) => format!("{n:?}"),
            Payload::List(items) => {
                let parts: Vec<String> = items.iter().map(Data::render).collect();
                format!("[{}]", parts.join(","))
            }
            Payload::Callable(_) => "<fn>".to_string(),
            Payload::Object(_) => "<object>".to_string(),
            Payload::Bool(b) => b.to_string(),
            Payload::Unresolved => self.name.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match &self.payload {
            Payload::Str(s) => Json::String(s.clone()),
            Payload::Int(n) => Json::from(*n),
            Payload::Float(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Payload::List(items) => Json::Array(items.iter().map(Data::to_json).collect()),
            Payload::Bool(b) => Json::Bool(*b),
            Payload::Callable(_) | Payload::Object(_) => Json::String(self.render()),
            Payload::Unresolved => Json::Null,
        }
    }

    /// Element at `index`; negative indices count from the end.
    pub fn list_element(&self, index: &Data) -> Result<Data> {
        let at = index_of(index)?;
        match &self.payload {
            Payload::List(items) => normalize_index(at, items.len())
                .map(|i| items[i].clone())
                .ok_or(Error::IndexOutOfRange { index: at, len: items.len() }),
            Payload::Str(s) => {
                let len = s.chars().count();
                normalize_index(at, len)
                    .and_then(|i| s.chars().nth(i))
                    .map(Data::str)
                    .ok_or(Error::IndexOutOfRange { index: at, len })
            }
            _ => Err(Error::NotIndexable(self.name.clone())),
        }
    }

    /// Replace the payload and echo the change into the owning scope.
    pub fn set_value(&mut self, memory: &mut Memory, raw: impl Into<Raw>) -> Result<()> {
        let home = self.scope.unwrap_or_else(|| memory.global());
        let fresh = memory.coerce(home, raw.into(), Deferral::Allow)?;
        if fresh.kind() != self.kind() {
            return Err(Error::KindMismatch {
                name: self.name.clone(),
                expected: self.kind(),
                found: fresh.kind(),
            });
        }
        self.payload = fresh.payload;
        self.persist(memory)
    }

    pub fn set_list_element(
        &mut self,
        memory: &mut Memory,
        index: impl Into<Raw>,
        raw: impl Into<Raw>,
    ) -> Result<()> {
        let home = self.scope.unwrap_or_else(|| memory.global());
        let index = memory.coerce(home, index.into(), Deferral::Allow)?;
        let at = index_of(&index)?;
        let element = memory.coerce(home, raw.into(), Deferral::Allow)?;
        let Payload::List(items) = &mut self.payload else {
            return Err(Error::NotIndexable(self.name.clone()));
        };
        let len = items.len();
        let slot = normalize_index(at, len).ok_or(Error::IndexOutOfRange { index: at, len })?;
        items[slot] = element;
        self.persist(memory)
    }

    fn persist(&self, memory: &mut Memory) -> Result<()> {
        match self.scope {
            Some(scope) if !self.name.is_empty() => {
                memory.assign(scope, &self.name, Raw::Value(self.clone()))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn index_of(index: &Data) -> Result<i64> {
    match &index.payload {
        Payload::Int(n) => Ok(*n),
        Payload::Float(n) if n.is_finite() => Ok(n.trunc() as i64),
        Payload::Str(s) => s.trim().parse().map_err(|_| Error::InvalidIndex(index.render())),
        _ => Err(Error::InvalidIndex(index.render())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::memory::Memory;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_canonical_text() -> Result<()> {
        let mut mem = Memory::default();
        let g = mem.global();
        let nested = Raw::List(vec![true.into()]);
        let list = mem.coerce(g, Raw::List(vec![1.into(), "'a'".into(), 2.0.into(), nested]), Deferral::Deny)?;
        assert_eq!(list.render(), "[1,'a',2.0,[true]]");
        assert_eq!(Data::float(2.5).render(), "2.5");
        assert_eq!(Data::str("hi").to_string(), "'hi'");
        Ok(())
    }

    #[test]
    fn rendered_scalars_and_lists_coerce_back() -> Result<()> {
        let mut mem = Memory::default();
        let g = mem.global();
        for src in ["'hello world'", "42", "-7", "3.0", "[1,'two',[3.5]]"] {
            let first = mem.coerce(g, src, Deferral::Deny)?;
            let again = mem.coerce(g, first.render(), Deferral::Deny)?;
            assert_eq!(again.kind(), first.kind(), "{src}");
            assert_eq!(again.value(), first.value(), "{src}");
        }
        Ok(())
    }

    #[test]
    fn equality_is_structural() -> Result<()> {
        let mut mem = Memory::default();
        let g = mem.global();
        mem.bind(g, "a", "1")?;
        mem.bind(g, "b", "1")?;
        let a = mem.resolve(g, "a")?;
        let b = mem.resolve(g, "b")?;
        assert_eq!(a.value(), b.value());
        assert_ne!(a, b);
        assert_eq!(a, mem.resolve(g, "a")?);
        Ok(())
    }

    #[test]
    fn set_value_echoes_into_scope() -> Result<()> {
        let mut mem = Memory::default();
        let g = mem.global();
        let call = mem.spawn(g)?;
        mem.bind(g, "x", "5")?;
        let mut x = mem.resolve(call, "x")?;
        x.set_value(&mut mem, "9")?;
        assert_eq!(mem.resolve(g, "x")?.as_int(), Some(9));
        assert!(mem.local(call, "x").is_none());
        Ok(())
    }

    #[test]
    fn set_value_keeps_kind() -> Result<()> {
        let mut mem = Memory::default();
        let g = mem.global();
        mem.bind(g, "x", "5")?;
        let mut x = mem.resolve(g, "x")?;
        let err = x.set_value(&mut mem, "'five'").unwrap_err();
        assert!(matches!(err, Error::KindMismatch { expected: Kind::Int, found: Kind::Str, .. }));
        assert_eq!(mem.resolve(g, "x")?.as_int(), Some(5));
        Ok(())
    }

    #[test]
    fn list_elements_index_and_persist() -> Result<()> {
        let mut mem = Memory::default();
        let g = mem.global();
        mem.bind(g, "lst", Raw::List(vec![1.into(), 2.into(), 3.into()]))?;
        let mut lst = mem.resolve(g, "lst")?;
        assert_eq!(lst.list_element(&Data::int(-1))?.as_int(), Some(3));
        assert!(matches!(
            lst.list_element(&Data::int(3)),
            Err(Error::IndexOutOfRange { index: 3, len: 3 })
        ));

        lst.set_list_element(&mut mem, -1, "'last'")?;
        let stored = mem.resolve(g, "lst")?;
        assert_eq!(stored.render(), "[1,2,'last']");
        Ok(())
    }

    #[test]
    fn strings_index_by_char() -> Result<()> {
        let s = Data::str("héllo");
        assert_eq!(s.list_element(&Data::int(1))?.as_str(), Some("é"));
        assert_eq!(s.list_element(&Data::str("-1"))?.as_str(), Some("o"));
        assert!(Data::int(3).list_element(&Data::int(0)).is_err());
        Ok(())
    }

    #[test]
    fn json_view() {
        let list = Data::new(Payload::List(vec![Data::int(1), Data::str("a"), Data::bool(true)]));
        assert_eq!(list.to_json(), serde_json::json!([1, "a", true]));
        assert_eq!(Data::float(f64::NAN).to_json(), serde_json::Value::Null);
    }
}
