use std::fmt;
use std::rc::Rc;

use anyhow::{Result, bail};

use crate::kernel::memory::{Memory, ScopeId};
use crate::kernel::text::split_top_level;
use crate::kernel::values::Data;

/// A callable node of the executable tree.
///
/// `scope` is the routine's own scope: call frames are spawned under it and
/// dotted member access on the callable descends into it.
pub trait Routine: fmt::Debug {
    fn params(&self) -> &[String];
    fn scope(&self) -> ScopeId;
    /// Run the body with arguments already bound in `frame`.
    fn run(&self, memory: &mut Memory, frame: ScopeId, file: &str) -> Result<Data>;
    /// The same routine attached to another scope; used when objects are copied.
    fn rebind(&self, scope: ScopeId) -> Rc<dyn Routine>;
}

/// Routine whose body is a single expression.
#[derive(Clone, Debug)]
pub struct ExprRoutine {
    params: Vec<String>,
    scope: ScopeId,
    body: String,
}

impl ExprRoutine {
    pub fn new(scope: ScopeId, params: Vec<String>, body: impl Into<String>) -> Self {
        Self { params, scope, body: body.into() }
    }

    /// Parse `name(a, b)=body` defined in `parent`, returning the name and the
    /// routine. The routine gets its own scope, a child of `parent`.
    pub fn parse(memory: &mut Memory, parent: ScopeId, src: &str) -> Result<(String, Self)> {
        let Some((sig, body)) = src.split_once('=') else {
            bail!("routine needs `name(params)=body`, got `{src}`");
        };
        let sig = sig.trim();
        let (name, params) = match sig.split_once('(') {
            Some((name, rest)) => {
                let Some(inner) = rest.strip_suffix(')') else {
                    bail!("unclosed parameter list in `{sig}`");
                };
                let params = split_top_level(inner, ',')
                    .into_iter()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect();
                (name.trim(), params)
            }
            None => (sig, Vec::new()),
        };
        if name.is_empty() || name.contains('.') {
            bail!("bad routine name `{name}`");
        }
        let scope = memory.spawn(parent)?;
        Ok((name.to_string(), Self::new(scope, params, body.trim())))
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl Routine for ExprRoutine {
    fn params(&self) -> &[String] {
        &self.params
    }

    fn scope(&self) -> ScopeId {
        self.scope
    }

    fn run(&self, memory: &mut Memory, frame: ScopeId, file: &str) -> Result<Data> {
        Ok(memory.evaluate_value(frame, &self.body, file)?)
    }

    fn rebind(&self, scope: ScopeId) -> Rc<dyn Routine> {
        Rc::new(Self { scope, ..self.clone() })
    }
}
